// vset.rs — Tensor identity sets and the identity/tuple maps
//
// Every handle the analysis touches maps to the set of canonical tensor
// identities it denotes. A leaf tensor identity maps to `{itself}`; aliases,
// tuples and intermediate unions map to larger sets. Merge and remove never
// mutate an existing entry: they mint a fresh handle for the result.
//
// Preconditions: created with the size of the program's `VarTable` so
//   synthetic handles never collide with program binders.
// Postconditions: `vset` grows monotonically; entries are never rebound.
// Failure modes: lookups of unbound handles return `InvariantError`.
// Side effects: none.

use std::collections::{BTreeMap, BTreeSet};

use crate::id::{IdAllocator, Var};
use crate::ir::{Type, VarTable};
use crate::liveness::InvariantError;

/// A set of tensor identities. Ordered so iteration is reproducible.
pub type VSet = BTreeSet<Var>;

/// Identity map (`Var → VSet`) plus per-field tuple records.
#[derive(Debug, Clone)]
pub struct IdentityStore {
    alloc: IdAllocator,
    first_synthetic: u32,
    hints: BTreeMap<Var, String>,
    vset: BTreeMap<Var, VSet>,
    vtuple: BTreeMap<Var, Vec<Option<Var>>>,
}

impl IdentityStore {
    /// `program_vars` is the number of program binders already allocated.
    pub fn new(program_vars: usize) -> Self {
        Self {
            alloc: IdAllocator::starting_at(program_vars),
            first_synthetic: program_vars as u32,
            hints: BTreeMap::new(),
            vset: BTreeMap::new(),
            vtuple: BTreeMap::new(),
        }
    }

    fn mint(&mut self, hint: impl Into<String>) -> Var {
        let var = self.alloc.alloc_var();
        self.hints.insert(var, hint.into());
        var
    }

    pub fn is_synthetic(&self, var: Var) -> bool {
        var.0 >= self.first_synthetic
    }

    /// Mint a leaf tensor identity: `{t}`.
    pub fn create_tensor(&mut self, hint: impl Into<String>) -> Var {
        let var = self.mint(hint);
        self.vset.insert(var, BTreeSet::from([var]));
        var
    }

    /// Mint a handle denoting no buffer: `{}`.
    pub fn create_null(&mut self, hint: impl Into<String>) -> Var {
        let var = self.mint(hint);
        self.vset.insert(var, VSet::new());
        var
    }

    /// Mint a handle with an explicit set (used for liveness snapshots).
    pub fn create_with(&mut self, hint: impl Into<String>, set: VSet) -> Var {
        let var = self.mint(hint);
        self.vset.insert(var, set);
        var
    }

    /// Mint identities for a value of type `ty`. Tuples get one identity per
    /// field (recursively) plus an aggregate handle with a tuple record.
    pub fn create_for_type(&mut self, ty: &Type, hint: &str) -> Result<Var, InvariantError> {
        match ty {
            Type::Tensor | Type::Other(_) => Ok(self.create_tensor(hint)),
            Type::Func => Ok(self.create_null(hint)),
            Type::Tuple(fields) => {
                let mut vars = Vec::with_capacity(fields.len());
                for (i, field) in fields.iter().enumerate() {
                    vars.push(Some(self.create_for_type(field, &format!("{}.{}", hint, i))?));
                }
                let aggregate = self.merge(&vars)?;
                self.vtuple.insert(aggregate, vars);
                Ok(aggregate)
            }
        }
    }

    /// Bind `var` to `def`'s identity set (and tuple record) unless `var`
    /// is already bound.
    pub fn init(&mut self, var: Var, def: Var) -> Result<(), InvariantError> {
        if self.is_bound(var) {
            return Ok(());
        }
        let set = self.tensors(def)?.clone();
        self.vset.insert(var, set);
        if let Some(fields) = self.vtuple.get(&def).cloned() {
            self.vtuple.insert(var, fields);
        }
        Ok(())
    }

    /// Mint a handle whose set is the union of the given handles' sets.
    /// `None` entries (untracked tuple fields) are skipped; an unbound handle
    /// is an error.
    pub fn merge(&mut self, vars: &[Option<Var>]) -> Result<Var, InvariantError> {
        let mut set = VSet::new();
        for &var in vars.iter().flatten() {
            set.extend(self.tensors(var)?.iter().copied());
        }
        Ok(self.create_with("merge", set))
    }

    pub fn merge_vars(&mut self, vars: &[Var]) -> Result<Var, InvariantError> {
        let opts: Vec<Option<Var>> = vars.iter().copied().map(Some).collect();
        self.merge(&opts)
    }

    /// Mint a handle whose set is `vset(a) − vset(b)`.
    pub fn remove(&mut self, a: Var, b: Var) -> Result<Var, InvariantError> {
        let removed = self.tensors(b)?.clone();
        let set: VSet = self
            .tensors(a)?
            .iter()
            .filter(|v| !removed.contains(v))
            .copied()
            .collect();
        Ok(self.create_with("remove", set))
    }

    /// The identity set of `var`.
    pub fn tensors(&self, var: Var) -> Result<&VSet, InvariantError> {
        self.vset
            .get(&var)
            .ok_or(InvariantError::MissingIdentity { var })
    }

    pub fn is_bound(&self, var: Var) -> bool {
        self.vset.contains_key(&var)
    }

    pub fn set_tuple(&mut self, var: Var, fields: Vec<Option<Var>>) {
        self.vtuple.insert(var, fields);
    }

    pub fn tuple_fields(&self, var: Var) -> Option<&[Option<Var>]> {
        self.vtuple.get(&var).map(Vec::as_slice)
    }

    /// A leaf identity denotes exactly itself.
    pub fn is_leaf(&self, var: Var) -> bool {
        self.vset
            .get(&var)
            .is_some_and(|s| s.len() == 1 && s.contains(&var))
    }

    /// All leaf identities in handle order.
    pub fn leaves(&self) -> impl Iterator<Item = Var> + '_ {
        self.vset
            .iter()
            .filter(|(k, s)| s.len() == 1 && s.contains(k))
            .map(|(k, _)| *k)
    }

    /// Every bound handle with its set, in handle order.
    pub fn entries(&self) -> impl Iterator<Item = (Var, &VSet)> + '_ {
        self.vset.iter().map(|(k, s)| (*k, s))
    }

    /// Human-readable name: `%x` for program binders, `$hint` for minted
    /// tensor identities, `~hint#n` for other synthetic handles.
    pub fn describe(&self, var: Var, vars: &VarTable) -> String {
        if !self.is_synthetic(var) {
            return vars.display(var);
        }
        match self.hints.get(&var) {
            Some(hint) if self.is_leaf(var) => format!("${}", hint),
            Some(hint) => format!("~{}#{}", hint, var.0),
            None => format!("{}", var),
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
