// merge.rs — Union-find validation of mandatory buffer sharing
//
// After both propagation passes: every leaf identity becomes a singleton
// class, the live map is inverted into identity → points, and each pending
// merge is accepted (union) or rejected (E0200) in collection order. A
// rejection marks the run failed but checking continues so every conflict is
// reported.

use std::collections::BTreeSet;

use tracing::{trace, warn};

use crate::diag::{codes, Diagnostic};
use crate::id::Var;

use super::{AnalysisStatus, InvariantError, LivenessAnalyzer, MergeConflict, PendingMerge};

impl LivenessAnalyzer<'_> {
    pub(super) fn validate_merges(&mut self) -> Result<(), InvariantError> {
        let leaves: Vec<Var> = self.store.leaves().collect();
        for leaf in leaves {
            self.forest.make_set(leaf);
        }

        for (point, set) in &self.live {
            for identity in set {
                self.inv_live.entry(*identity).or_default().insert(*point);
            }
        }

        let pending = self.pending.clone();
        for pm in &pending {
            self.validate_one(pm)?;
        }
        Ok(())
    }

    fn validate_one(&mut self, pm: &PendingMerge) -> Result<(), InvariantError> {
        let Some(out) = self.store.tensors(pm.out)?.first().copied() else {
            trace!(out = %pm.out, "merge skipped: result has no buffer");
            return Ok(());
        };
        let Some(input) = self.store.tensors(pm.input)?.first().copied() else {
            trace!(input = %pm.input, "merge skipped: branch result has no buffer");
            return Ok(());
        };
        let out = self
            .forest
            .find(out)
            .ok_or(InvariantError::NotCanonical { var: out })?;
        let input = self
            .forest
            .find(input)
            .ok_or(InvariantError::NotCanonical { var: input })?;
        if out == input {
            trace!(class = %out, "merge already satisfied");
            return Ok(());
        }

        let shared = self.shared_points(out, input, pm.site);
        if !shared.is_empty() {
            self.report_conflict(pm, out, input, shared);
            return Ok(());
        }

        let root = self
            .forest
            .union(out, input)
            .ok_or(InvariantError::NotCanonical { var: out })?;
        let absorbed = if root == out { input } else { out };
        let moved = self.inv_live.remove(&absorbed).unwrap_or_default();
        self.inv_live.entry(root).or_default().extend(moved);
        trace!(root = %root, absorbed = %absorbed, "merge accepted");
        Ok(())
    }

    /// Points where both classes are live, other than the conditional that
    /// defines the merged result.
    fn shared_points(&self, a: Var, b: Var, site: Var) -> Vec<Var> {
        let empty = BTreeSet::new();
        let at_a = self.inv_live.get(&a).unwrap_or(&empty);
        let at_b = self.inv_live.get(&b).unwrap_or(&empty);
        at_a.intersection(at_b)
            .filter(|p| **p != site)
            .copied()
            .collect()
    }

    fn report_conflict(&mut self, pm: &PendingMerge, out: Var, input: Var, shared: Vec<Var>) {
        let name = |v: Var| self.store.describe(v, self.vars);
        let points: Vec<String> = shared.iter().map(|p| name(*p)).collect();
        warn!(
            out = %name(out),
            input = %name(input),
            site = %name(pm.site),
            "mandatory memory sharing is invalid"
        );
        let span = self
            .vars
            .span(pm.site)
            .unwrap_or_else(|| (0..0).into());
        let diag = Diagnostic::error(
            codes::E0200,
            span,
            format!(
                "{} cannot share a buffer with the result of {}",
                name(pm.input),
                name(pm.site)
            ),
        )
        .with_cause(
            format!(
                "{} and {} are both live at {}",
                name(input),
                name(out),
                points.join(", ")
            ),
            None,
        )
        .with_hint("this in-place reuse is not memory-safe; plan memory without it");
        self.diagnostics.push(diag);
        self.conflicts.push(MergeConflict {
            out: pm.out,
            input: pm.input,
            site: pm.site,
            shared_points: shared,
        });
        self.status = AnalysisStatus::AliasingConflict;
    }
}

#[cfg(test)]
mod tests {
    use crate::ir::IrProgram;
    use crate::liveness::{analyze, AnalysisStatus, LivenessResult};

    fn run(source: &str) -> (IrProgram, LivenessResult) {
        let parsed = crate::parser::parse(source);
        assert!(parsed.errors.is_empty(), "parse errors: {:?}", parsed.errors);
        let resolved = crate::resolve::resolve(&parsed.module.expect("module"));
        assert!(resolved.diagnostics.is_empty(), "{:?}", resolved.diagnostics);
        let prog = resolved.program;
        let result = analyze(prog.function("main").unwrap(), &prog.vars).unwrap();
        (prog, result)
    }

    fn leaf(prog: &IrProgram, result: &LivenessResult, name: &str) -> crate::id::Var {
        let var = prog.vars.lookup(name).unwrap();
        *result
            .diagnostic_liveness()
            .identities_of(var)
            .and_then(|s| s.first())
            .unwrap()
    }

    #[test]
    fn branch_results_join_the_conditional_class() {
        let (prog, result) = run(
            "fn @main(%c: Tensor, %x: Tensor) {
               let %z = if (%c) { let %a = relu(%x); %a } else { let %b = exp(%x); %b };
               %z
             }",
        );
        assert!(result.is_valid(), "{:?}", result.diagnostics);
        let live = result.liveness().unwrap();
        let z = live.representative(leaf(&prog, &result, "z"));
        assert_eq!(z, live.representative(leaf(&prog, &result, "a")));
        assert_eq!(z, live.representative(leaf(&prog, &result, "b")));
        assert_ne!(z, live.representative(leaf(&prog, &result, "x")));
        assert!(live
            .classes()
            .iter()
            .any(|class| class.len() == 3));
    }

    #[test]
    fn conflict_is_not_unioned_and_checking_continues() {
        let (prog, result) = run(
            "fn @main(%c: Tensor, %x: Tensor, %y: Tensor) {
               let %z = if (%c) { %x } else { %y };
               let %w = add(%z, %x);
               %w
             }",
        );
        assert_eq!(result.status(), AnalysisStatus::AliasingConflict);
        assert_eq!(result.conflicts.len(), 1);
        let conflict = &result.conflicts[0];
        assert_eq!(conflict.input, prog.vars.lookup("x").unwrap());
        assert_eq!(conflict.shared_points, vec![prog.vars.lookup("w").unwrap()]);

        let live = result.diagnostic_liveness();
        let z = live.representative(leaf(&prog, &result, "z"));
        assert_ne!(z, live.representative(leaf(&prog, &result, "x")));
        // the second branch was still checked and accepted
        assert_eq!(z, live.representative(leaf(&prog, &result, "y")));
    }

    #[test]
    fn every_conflict_is_reported() {
        let (_, result) = run(
            "fn @main(%c: Tensor, %x: Tensor, %y: Tensor) {
               let %z = if (%c) { %x } else { %y };
               let %w = add(%z, %x);
               let %v = add(%w, %y);
               %v
             }",
        );
        assert_eq!(result.conflicts.len(), 2);
        assert_eq!(result.diagnostics.len(), 2);
        assert!(result
            .diagnostics
            .iter()
            .all(|d| d.code.map(|c| c.0) == Some("E0200")));
    }

    #[test]
    fn null_branch_results_are_skipped() {
        let (_, result) = run(
            "fn @main(%c: Tensor, %x: Tensor) {
               let %z = if (%c) { let %k = 1.0; %k } else { %x };
               %z
             }",
        );
        assert!(result.is_valid(), "{:?}", result.diagnostics);
        assert_eq!(result.pending.len(), 2);
    }

    #[test]
    fn repeated_runs_give_identical_partitions() {
        let source = "fn @main(%c: Tensor, %p: (Tensor, Tensor)) {
               let %q: (Tensor, Tensor) = split(%c);
               let %z = if (%c) { %p } else { %q };
               let %a = %z.0;
               %a
             }";
        let (_, first) = run(source);
        let (_, second) = run(source);
        assert_eq!(
            first.diagnostic_liveness().classes(),
            second.diagnostic_liveness().classes()
        );
        assert_eq!(first.status(), second.status());
    }
}
