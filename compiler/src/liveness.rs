// liveness.rs — Tensor liveness and mandatory buffer-sharing analysis
//
// Computes, for every program point of a function in A-normal form, the set
// of tensor identities that are live after that point, and validates the
// buffer sharing that conditionals demand between their branch results and
// their own result.
//
// Preconditions: `func` comes from a resolved program with unique binders;
//   its parameters are tensors or tuples of tensors.
// Postconditions: on `AnalysisStatus::Valid`, every binding and sequence exit
//   has a live set over canonical identities, and no equivalence class holds
//   two identities that are simultaneously live.
// Failure modes: unsupported forms produce E01xx diagnostics (no liveness);
//   sharing conflicts produce E0200 diagnostics (liveness available only for
//   diagnostics); internal inconsistencies return `InvariantError`.
// Side effects: `tracing` events only.

mod backward;
mod form_check;
mod forward;
mod merge;

pub use form_check::check_form;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, debug_span};

use crate::diag::{has_errors, Diagnostic};
use crate::free_vars::FreeVarCache;
use crate::id::Var;
use crate::ir::{Function, Type, VarTable};
use crate::pass::{descriptor, required_passes, PassId};
use crate::union_find::UnionFind;
use crate::vset::{IdentityStore, VSet};

// ── Errors ──────────────────────────────────────────────────────────────────

/// A violated internal invariant. Returned instead of panicking; a form that
/// reaches the passes despite the form check also ends up here.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantError {
    #[error("parameter '{name}' has unsupported type {ty}")]
    UnsupportedParamType { name: String, ty: String },

    #[error("parameter {var} has no recorded type")]
    MissingParamType { var: Var },

    #[error("no identity recorded for {var}")]
    MissingIdentity { var: Var },

    #[error("no tuple fields recorded for {var}")]
    MissingTupleFields { var: Var },

    #[error("tuple index {index} out of range for {var} with {arity} fields")]
    TupleIndexOutOfRange { var: Var, index: usize, arity: usize },

    #[error("tuple shape mismatch between {out} and {input}")]
    TupleShapeMismatch { out: Var, input: Var },

    #[error("unsupported {kind} bound to {var}")]
    UnsupportedForm { var: Var, kind: &'static str },

    #[error("sequence result is not a variable")]
    NonVariableResult,

    #[error("no live set recorded for point {var}")]
    MissingLiveness { var: Var },

    #[error("identity {var} is not in the sharing forest")]
    NotCanonical { var: Var },
}

// ── Options and outcome ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct AnalysisOptions {
    /// Last pass to run; earlier terminals leave later artifacts empty.
    pub terminal: PassId,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            terminal: PassId::MergeValidate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    /// All passes ran and every mandatory sharing is safe.
    Valid,
    /// The form check rejected the body; no passes after it ran.
    UnsupportedForm,
    /// At least one mandatory sharing would merge simultaneously live buffers.
    AliasingConflict,
    /// Stopped at a terminal pass before merge validation.
    Partial,
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AnalysisStatus::Valid => "valid",
            AnalysisStatus::UnsupportedForm => "unsupported form",
            AnalysisStatus::AliasingConflict => "aliasing conflict",
            AnalysisStatus::Partial => "partial",
        };
        f.write_str(s)
    }
}

/// A sequence whose exit point is recorded: the function body or one branch
/// of the conditional bound to the given variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Body,
    Then(Var),
    Else(Var),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Body => f.write_str("body"),
            Scope::Then(v) => write!(f, "then.{}", v),
            Scope::Else(v) => write!(f, "else.{}", v),
        }
    }
}

/// A sharing the forward pass requested: `input` (a branch result) must reuse
/// the buffer of `out` (the conditional's result) at the conditional `site`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PendingMerge {
    pub out: Var,
    pub input: Var,
    pub site: Var,
}

/// A rejected sharing and the points where both classes are live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeConflict {
    pub out: Var,
    pub input: Var,
    pub site: Var,
    pub shared_points: Vec<Var>,
}

// ── Liveness result ─────────────────────────────────────────────────────────

/// Live sets plus the identity partition, detached from the analyzer.
#[derive(Debug, Clone, Default)]
pub struct Liveness {
    live: BTreeMap<Var, VSet>,
    identities: BTreeMap<Var, VSet>,
    representatives: BTreeMap<Var, Var>,
    classes: Vec<Vec<Var>>,
    exits: BTreeMap<Scope, Var>,
    names: BTreeMap<Var, String>,
}

impl Liveness {
    /// Identities live after `point` (a binder or a sequence exit).
    pub fn live_at(&self, point: Var) -> Option<&VSet> {
        self.live.get(&point)
    }

    /// Every recorded point with its live set, in handle order.
    pub fn points(&self) -> impl Iterator<Item = (Var, &VSet)> + '_ {
        self.live.iter().map(|(k, s)| (*k, s))
    }

    /// Identity set of a program binder.
    pub fn identities_of(&self, var: Var) -> Option<&VSet> {
        self.identities.get(&var)
    }

    pub fn binders(&self) -> impl Iterator<Item = (Var, &VSet)> + '_ {
        self.identities.iter().map(|(k, s)| (*k, s))
    }

    /// Canonical representative of an identity's sharing class.
    pub fn representative(&self, identity: Var) -> Option<Var> {
        self.representatives.get(&identity).copied()
    }

    /// Sharing classes, each sorted, ordered by smallest member.
    pub fn classes(&self) -> &[Vec<Var>] {
        &self.classes
    }

    pub fn exit_point(&self, scope: Scope) -> Option<Var> {
        self.exits.get(&scope).copied()
    }

    /// Display name of any handle appearing in this result.
    pub fn name(&self, var: Var) -> String {
        self.names
            .get(&var)
            .cloned()
            .unwrap_or_else(|| var.to_string())
    }

    /// Names of a set of handles, in set order.
    pub fn names_of(&self, set: &VSet) -> Vec<String> {
        set.iter().map(|v| self.name(*v)).collect()
    }
}

/// Outcome of one analysis run.
#[derive(Debug, Clone)]
pub struct LivenessResult {
    status: AnalysisStatus,
    liveness: Liveness,
    pub pending: Vec<PendingMerge>,
    pub conflicts: Vec<MergeConflict>,
    pub diagnostics: Vec<Diagnostic>,
    pub passes_run: Vec<PassId>,
}

impl LivenessResult {
    pub fn status(&self) -> AnalysisStatus {
        self.status
    }

    pub fn is_valid(&self) -> bool {
        self.status == AnalysisStatus::Valid
    }

    /// The liveness, only when the run completed without conflicts.
    pub fn liveness(&self) -> Option<&Liveness> {
        self.is_valid().then_some(&self.liveness)
    }

    /// Whatever the passes produced, regardless of status. Must not be used
    /// for memory planning.
    pub fn diagnostic_liveness(&self) -> &Liveness {
        &self.liveness
    }
}

// ── Entry points ────────────────────────────────────────────────────────────

/// Run the full analysis on `func`.
pub fn analyze(func: &Function, vars: &VarTable) -> Result<LivenessResult, InvariantError> {
    analyze_with(func, vars, AnalysisOptions::default())
}

/// Run the passes up to `options.terminal`.
pub fn analyze_with(
    func: &Function,
    vars: &VarTable,
    options: AnalysisOptions,
) -> Result<LivenessResult, InvariantError> {
    let mut analyzer = LivenessAnalyzer::new(func, vars);
    analyzer.run(options.terminal)?;
    Ok(analyzer.finish())
}

// ── Analyzer state ──────────────────────────────────────────────────────────

pub(crate) struct LivenessAnalyzer<'a> {
    vars: &'a VarTable,
    func: &'a Function,
    store: IdentityStore,
    free_vars: FreeVarCache,
    live: BTreeMap<Var, VSet>,
    exits: BTreeMap<Scope, Var>,
    pending: Vec<PendingMerge>,
    forest: UnionFind<Var>,
    inv_live: BTreeMap<Var, BTreeSet<Var>>,
    conflicts: Vec<MergeConflict>,
    diagnostics: Vec<Diagnostic>,
    status: AnalysisStatus,
    passes_run: Vec<PassId>,
}

impl<'a> LivenessAnalyzer<'a> {
    fn new(func: &'a Function, vars: &'a VarTable) -> Self {
        Self {
            vars,
            func,
            store: IdentityStore::new(vars.len()),
            free_vars: FreeVarCache::new(),
            live: BTreeMap::new(),
            exits: BTreeMap::new(),
            pending: Vec::new(),
            forest: UnionFind::new(),
            inv_live: BTreeMap::new(),
            conflicts: Vec::new(),
            diagnostics: Vec::new(),
            status: AnalysisStatus::Valid,
            passes_run: Vec::new(),
        }
    }

    fn run(&mut self, terminal: PassId) -> Result<(), InvariantError> {
        let func = self.func;
        for pass in required_passes(terminal) {
            let name = descriptor(pass).name;
            let _span = debug_span!("pass", pass = name).entered();
            let started = Instant::now();
            match pass {
                PassId::FormCheck => {
                    let diags = check_form(func, self.vars);
                    let rejected = has_errors(&diags);
                    self.diagnostics.extend(diags);
                    if rejected {
                        self.status = AnalysisStatus::UnsupportedForm;
                        self.passes_run.push(pass);
                        debug!(errors = self.diagnostics.len(), "form check rejected body");
                        return Ok(());
                    }
                }
                PassId::InitParams => self.init_params()?,
                PassId::Forward => {
                    self.forward(&func.body)?;
                }
                PassId::Backward => {
                    let seed = self.store.create_null("exit.seed");
                    self.live.insert(seed, VSet::new());
                    self.backward(&func.body, seed, Scope::Body)?;
                }
                PassId::MergeValidate => self.validate_merges()?,
            }
            self.passes_run.push(pass);
            debug!(
                elapsed_us = started.elapsed().as_micros() as u64,
                "pass complete"
            );
        }
        if terminal != PassId::MergeValidate && self.status == AnalysisStatus::Valid {
            self.status = AnalysisStatus::Partial;
        }
        Ok(())
    }

    /// Bind each parameter to fresh identities: one for a tensor, one per
    /// field for a tuple of tensors.
    fn init_params(&mut self) -> Result<(), InvariantError> {
        let func = self.func;
        for &param in &func.params {
            let name = self.vars.name(param).unwrap_or("param").to_string();
            let ty = self
                .vars
                .ty(param)
                .cloned()
                .ok_or(InvariantError::MissingParamType { var: param })?;
            match &ty {
                Type::Tensor => {
                    let t = self.store.create_tensor(name.as_str());
                    self.store.init(param, t)?;
                }
                Type::Tuple(fields) => {
                    let mut ids = Vec::with_capacity(fields.len());
                    for (i, field) in fields.iter().enumerate() {
                        if *field != Type::Tensor {
                            return Err(InvariantError::UnsupportedParamType {
                                name,
                                ty: ty.to_string(),
                            });
                        }
                        ids.push(Some(self.store.create_tensor(format!("{}.{}", name, i))));
                    }
                    let aggregate = self.store.merge(&ids)?;
                    self.store.init(param, aggregate)?;
                    self.store.set_tuple(param, ids);
                }
                other => {
                    return Err(InvariantError::UnsupportedParamType {
                        name,
                        ty: other.to_string(),
                    })
                }
            }
        }
        Ok(())
    }

    fn hint(&self, var: Var) -> String {
        self.vars
            .name(var)
            .map(str::to_string)
            .unwrap_or_else(|| var.to_string())
    }

    fn finish(self) -> LivenessResult {
        let mut identities = BTreeMap::new();
        for (var, set) in self.store.entries() {
            if !self.store.is_synthetic(var) {
                identities.insert(var, set.clone());
            }
        }

        let mut mentioned: BTreeSet<Var> = BTreeSet::new();
        for (point, set) in &self.live {
            mentioned.insert(*point);
            mentioned.extend(set.iter().copied());
        }
        for (var, set) in &identities {
            mentioned.insert(*var);
            mentioned.extend(set.iter().copied());
        }
        let representatives = self.forest.representatives();
        mentioned.extend(representatives.keys().copied());
        for pm in &self.pending {
            mentioned.extend([pm.out, pm.input, pm.site]);
        }
        let names = mentioned
            .into_iter()
            .map(|v| (v, self.store.describe(v, self.vars)))
            .collect();

        LivenessResult {
            status: self.status,
            liveness: Liveness {
                live: self.live,
                identities,
                classes: self.forest.classes(),
                representatives,
                exits: self.exits,
                names,
            },
            pending: self.pending,
            conflicts: self.conflicts,
            diagnostics: self.diagnostics,
            passes_run: self.passes_run,
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Expr, IrProgram};

    fn program(source: &str) -> IrProgram {
        let parsed = crate::parser::parse(source);
        assert!(parsed.errors.is_empty(), "parse errors: {:?}", parsed.errors);
        let resolved = crate::resolve::resolve(&parsed.module.expect("module"));
        assert!(resolved.diagnostics.is_empty(), "{:?}", resolved.diagnostics);
        resolved.program
    }

    fn run(source: &str) -> (IrProgram, LivenessResult) {
        let prog = program(source);
        let result = analyze(prog.function("main").unwrap(), &prog.vars).unwrap();
        (prog, result)
    }

    fn var(prog: &IrProgram, name: &str) -> Var {
        prog.vars.lookup(name).unwrap()
    }

    fn ids(live: &Liveness, prog: &IrProgram, name: &str) -> VSet {
        live.identities_of(var(prog, name)).cloned().unwrap()
    }

    #[test]
    fn straight_line_liveness() {
        let (prog, result) = run(
            "fn @main(%x: Tensor) { let %a = relu(%x); let %b = add(%a, %x); %b }",
        );
        assert!(result.is_valid());
        let live = result.liveness().unwrap();
        let x = ids(live, &prog, "x");
        let a = ids(live, &prog, "a");
        let b = ids(live, &prog, "b");
        // a point's set holds its uses plus whatever survives the definition
        assert_eq!(live.live_at(var(&prog, "a")).unwrap(), &x);
        let at_b = live.live_at(var(&prog, "b")).unwrap();
        assert_eq!(*at_b, x.union(&a).copied().collect::<VSet>());
        let exit = live.exit_point(Scope::Body).unwrap();
        assert_eq!(live.live_at(exit).unwrap(), &b);
    }

    #[test]
    fn alias_shares_identity() {
        let (prog, result) = run("fn @main(%x: Tensor) { let %y = %x; %y }");
        let live = result.liveness().unwrap();
        assert_eq!(ids(live, &prog, "y"), ids(live, &prog, "x"));
        assert_eq!(
            live.live_at(var(&prog, "y")).unwrap(),
            &ids(live, &prog, "x")
        );
    }

    #[test]
    fn tuple_parameter_gets_one_identity_per_field() {
        let (prog, result) = run(
            "fn @main(%p: (Tensor, Tensor)) { let %a = %p.0; let %b = %p.1; let %c = add(%a, %b); %c }",
        );
        let live = result.liveness().unwrap();
        let p = ids(live, &prog, "p");
        let a = ids(live, &prog, "a");
        let b = ids(live, &prog, "b");
        assert_eq!(p.len(), 2);
        assert_ne!(a, b);
        assert_eq!(p, a.union(&b).copied().collect::<VSet>());
    }

    #[test]
    fn unsupported_parameter_type_is_fatal() {
        let prog = program("fn @main(%n: int64) { %n }");
        let err = analyze(prog.function("main").unwrap(), &prog.vars).unwrap_err();
        assert!(matches!(err, InvariantError::UnsupportedParamType { ref name, .. } if name == "n"));
    }

    #[test]
    fn untyped_parameter_is_fatal() {
        let vars = VarTable::new();
        let p = Var(3);
        let func = Function {
            params: vec![p],
            body: Box::new(Expr::Var(p)),
        };
        let err = analyze(&func, &vars).unwrap_err();
        assert_eq!(err, InvariantError::MissingParamType { var: p });
    }

    #[test]
    fn conditional_merges_branch_results() {
        let (prog, result) = run(
            "fn @main(%c: Tensor, %x: Tensor, %y: Tensor) { let %z = if (%c) { %x } else { %y }; %z }",
        );
        assert!(result.is_valid(), "{:?}", result.diagnostics);
        let live = result.liveness().unwrap();
        let x = *ids(live, &prog, "x").iter().next().unwrap();
        let y = *ids(live, &prog, "y").iter().next().unwrap();
        let z = *ids(live, &prog, "z").iter().next().unwrap();
        assert_eq!(live.representative(x), live.representative(z));
        assert_eq!(live.representative(y), live.representative(z));
    }

    #[test]
    fn conditional_conflict_is_reported() {
        let (_, result) = run(
            "fn @main(%c: Tensor, %x: Tensor) { let %z = if (%c) { %x } else { %c }; let %w = add(%z, %x); %w }",
        );
        assert_eq!(result.status(), AnalysisStatus::AliasingConflict);
        assert!(result.liveness().is_none());
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.diagnostics[0].code.map(|c| c.0), Some("E0200"));
    }

    #[test]
    fn unsupported_form_stops_before_liveness() {
        let (_, result) = run(
            "fn @main(%x: Tensor) { let %f = fn(%y: Tensor) { relu(%y) }; let %r = %f(%x); %r }",
        );
        assert_eq!(result.status(), AnalysisStatus::UnsupportedForm);
        assert_eq!(result.passes_run, vec![PassId::FormCheck]);
        assert!(result.diagnostic_liveness().points().next().is_none());
    }

    #[test]
    fn terminal_pass_limits_work() {
        let prog = program("fn @main(%x: Tensor) { let %a = relu(%x); %a }");
        let result = analyze_with(
            prog.function("main").unwrap(),
            &prog.vars,
            AnalysisOptions {
                terminal: PassId::Forward,
            },
        )
        .unwrap();
        assert_eq!(result.status(), AnalysisStatus::Partial);
        assert!(result.liveness().is_none());
        let diag = result.diagnostic_liveness();
        assert!(diag.identities_of(var(&prog, "a")).is_some());
        assert!(diag.points().next().is_none());
    }

    #[test]
    fn hand_built_non_variable_result_is_an_invariant_error() {
        let mut vars = VarTable::new();
        let x = vars.fresh("x", Type::Tensor, (0..0).into());
        let func = Function {
            params: vec![x],
            body: Box::new(Expr::op_call("relu", vec![Expr::Var(x)])),
        };
        let result = analyze(&func, &vars).unwrap();
        assert_eq!(result.status(), AnalysisStatus::UnsupportedForm);
        assert_eq!(result.diagnostics[0].code.map(|c| c.0), Some("E0104"));
    }
}
