// id.rs — Variable handles shared by the IR and the liveness analysis
//
// Program binders and analysis-minted tensor identities live in one index
// space. Resolve numbers program binders first, in textual order; the
// analysis continues numbering from there, so every handle is a plain
// integer comparison and iteration over ordered maps is reproducible.

use std::fmt;

use serde::Serialize;

/// Opaque handle for a program binder or a synthetic identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Var(pub u32);

impl Var {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Allocator for variable handles. Produces monotonically increasing
/// handles in allocation order, ensuring deterministic assignment.
#[derive(Debug, Default, Clone)]
pub struct IdAllocator {
    next_var: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue numbering after `count` already-allocated handles.
    pub fn starting_at(count: usize) -> Self {
        Self {
            next_var: count as u32,
        }
    }

    pub fn alloc_var(&mut self) -> Var {
        let id = Var(self.next_var);
        self.next_var += 1;
        id
    }

    /// Number of handles allocated so far (including the starting offset).
    pub fn count(&self) -> usize {
        self.next_var as usize
    }
}
