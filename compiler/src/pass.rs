// pass.rs — Pass descriptor module: metadata, dependency resolution, artifact IDs
//
// Declares the liveness analysis's five passes, their dependency edges, and
// the artifacts they produce. The orchestrator runs the minimal pass prefix
// for a requested terminal pass (e.g. `--emit identities` stops after the
// forward pass).

use std::collections::HashSet;

use serde::Serialize;

// ── Pass and Artifact identifiers ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassId {
    FormCheck,
    InitParams,
    Forward,
    Backward,
    MergeValidate,
}

/// Machine-readable artifact identifiers. Each maps to a piece of analyzer
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactId {
    FormReport,     // Vec<Diagnostic>
    ParamIdentity,  // vset entries for parameters
    IdentityMap,    // vset / vtuple
    PendingMerges,  // Vec<PendingMerge>
    LivenessMap,    // live
    InverseLive,    // inv_live
    Forest,         // UnionFind<Var>
}

// ── Pass descriptor ────────────────────────────────────────────────────────

/// Static metadata about an analysis pass.
pub struct PassDescriptor {
    /// Human-readable name for logs and reports.
    pub name: &'static str,
    /// Passes whose outputs this pass consumes.
    pub inputs: &'static [PassId],
    /// Artifacts this pass produces.
    pub outputs: &'static [ArtifactId],
    /// Pre/post conditions (documentation only).
    pub invariants: &'static str,
}

/// Return the static descriptor for a given pass.
pub fn descriptor(id: PassId) -> PassDescriptor {
    match id {
        PassId::FormCheck => PassDescriptor {
            name: "form_check",
            inputs: &[],
            outputs: &[ArtifactId::FormReport],
            invariants: "body is ANF: op callees, var/constant args, var conditions",
        },
        PassId::InitParams => PassDescriptor {
            name: "init_params",
            inputs: &[PassId::FormCheck],
            outputs: &[ArtifactId::ParamIdentity],
            invariants: "every parameter bound to one identity per tensor field",
        },
        PassId::Forward => PassDescriptor {
            name: "forward",
            inputs: &[PassId::InitParams],
            outputs: &[ArtifactId::IdentityMap, ArtifactId::PendingMerges],
            invariants: "every binder, including branch binders, has an identity set",
        },
        PassId::Backward => PassDescriptor {
            name: "backward",
            inputs: &[PassId::Forward],
            outputs: &[ArtifactId::LivenessMap],
            invariants: "every binding and sequence exit has a live set",
        },
        PassId::MergeValidate => PassDescriptor {
            name: "merge_validate",
            inputs: &[PassId::Backward],
            outputs: &[ArtifactId::InverseLive, ArtifactId::Forest],
            invariants: "no two simultaneously live identities share a class",
        },
    }
}

// ── Dependency resolution ──────────────────────────────────────────────────

/// All pass IDs in declaration order.
pub const ALL_PASSES: [PassId; 5] = [
    PassId::FormCheck,
    PassId::InitParams,
    PassId::Forward,
    PassId::Backward,
    PassId::MergeValidate,
];

/// Compute the minimal ordered set of passes needed to produce `terminal`.
/// Returns passes in topological (execution) order.
pub fn required_passes(terminal: PassId) -> Vec<PassId> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    visit(terminal, &mut visited, &mut order);
    order
}

fn visit(id: PassId, visited: &mut HashSet<PassId>, order: &mut Vec<PassId>) {
    if !visited.insert(id) {
        return;
    }
    for &dep in descriptor(id).inputs {
        visit(dep, visited, order);
    }
    order.push(id);
}

// ── Tests ──────────────────────────────────────────────────────────────────
