// backward.rs — Backward liveness propagation
//
// Bottom-up over each let sequence. Every sequence gets an exit sentinel
// holding what is live after its result is produced; each binding point then
// gets `uses ∪ (live(next) − defs)`. Conditional branches are walked with a
// branch-local successor that excludes the conditional's own result.

use crate::id::Var;
use crate::ir::{Expr, LetList};
use crate::vset::VSet;

use super::{InvariantError, LivenessAnalyzer, Scope};

impl<'a> LivenessAnalyzer<'a> {
    /// Propagate liveness through one sequence whose successor point is
    /// `next`.
    pub(super) fn backward(
        &mut self,
        body: &'a Expr,
        next: Var,
        scope: Scope,
    ) -> Result<(), InvariantError> {
        let list = LetList::flatten(body);
        let result = list.result_var().ok_or(InvariantError::NonVariableResult)?;

        let exit = self.store.create_null(format!("{}.exit", scope));
        let exit_live = self.merge_live(result, None, next)?;
        self.live.insert(exit, exit_live);
        self.exits.insert(scope, exit);

        let mut successor = exit;
        for &(var, value) in list.bindings.iter().rev() {
            self.backward_binding(var, value, successor)?;
            successor = var;
        }
        Ok(())
    }

    /// `vset(uses) ∪ (live(next) − vset(def))`; nothing is subtracted
    /// without `def`.
    fn merge_live(&mut self, uses: Var, def: Option<Var>, next: Var) -> Result<VSet, InvariantError> {
        self.store.tensors(uses)?;
        let after = self
            .live
            .get(&next)
            .cloned()
            .ok_or(InvariantError::MissingLiveness { var: next })?;
        let snapshot = self.store.create_with("live", after);
        let remaining = match def {
            Some(def) => self.store.remove(snapshot, def)?,
            None => snapshot,
        };
        let merged = self.store.merge_vars(&[uses, remaining])?;
        Ok(self.store.tensors(merged)?.clone())
    }

    fn backward_binding(&mut self, var: Var, value: &'a Expr, next: Var) -> Result<(), InvariantError> {
        let live = match value {
            Expr::Var(_)
            | Expr::Constant(_)
            | Expr::Tuple(_)
            | Expr::TupleGetItem { .. }
            | Expr::Function(_) => self.merge_live(var, None, next)?,
            // An operator reference keeps whatever the following point
            // defines and needs.
            Expr::Op(_) => self.merge_live(next, None, next)?,
            Expr::Call { callee, args, .. } => {
                if !matches!(callee.as_ref(), Expr::Op(_)) {
                    return Err(InvariantError::UnsupportedForm {
                        var,
                        kind: "closure application",
                    });
                }
                let mut uses = Vec::with_capacity(args.len());
                for arg in args {
                    match arg {
                        Expr::Var(u) => uses.push(*u),
                        Expr::Constant(_) => {}
                        _ => {
                            return Err(InvariantError::UnsupportedForm {
                                var,
                                kind: "non-variable call argument",
                            })
                        }
                    }
                }
                let used = self.store.merge_vars(&uses)?;
                self.merge_live(used, Some(var), next)?
            }
            Expr::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => {
                let cond = cond.as_var().ok_or(InvariantError::UnsupportedForm {
                    var,
                    kind: "non-variable condition",
                })?;
                let free_then = self.free_vars.free_vars(then_branch);
                let free_else = self.free_vars.free_vars(else_branch);
                let free_then = self.store.merge_vars(&free_then)?;
                let free_else = self.store.merge_vars(&free_else)?;
                let used = self.store.merge_vars(&[free_then, free_else, cond])?;
                let live = self.merge_live(used, Some(var), next)?;
                self.live.insert(var, live);
                self.backward_branch(then_branch, var, next, Scope::Then(var))?;
                self.backward_branch(else_branch, var, next, Scope::Else(var))?;
                return Ok(());
            }
            Expr::Let { .. } => {
                return Err(InvariantError::UnsupportedForm {
                    var,
                    kind: "nested let sequence",
                })
            }
        };
        self.live.insert(var, live);
        Ok(())
    }

    /// Walk one branch of the conditional bound to `def`. The branch's
    /// successor is the conditional's successor minus `def`'s identities,
    /// which cannot be live before `def` exists.
    fn backward_branch(
        &mut self,
        branch: &'a Expr,
        def: Var,
        next: Var,
        scope: Scope,
    ) -> Result<(), InvariantError> {
        let after = self
            .live
            .get(&next)
            .cloned()
            .ok_or(InvariantError::MissingLiveness { var: next })?;
        let snapshot = self.store.create_with("live", after);
        let branch_next = self.store.remove(snapshot, def)?;
        let set = self.store.tensors(branch_next)?.clone();
        self.live.insert(branch_next, set);
        self.backward(branch, branch_next, scope)
    }
}
