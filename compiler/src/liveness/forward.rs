// forward.rs — Forward identity propagation
//
// Top-down over each let sequence: every binder receives the set of tensor
// identities its value denotes. Conditionals record the sharing they demand
// between each branch result and their own result as pending merges.

use tracing::trace;

use crate::id::Var;
use crate::ir::{Expr, LetList};

use super::{InvariantError, LivenessAnalyzer, PendingMerge};

impl<'a> LivenessAnalyzer<'a> {
    /// Propagate identities through one sequence and return its result
    /// variable.
    pub(super) fn forward(&mut self, body: &'a Expr) -> Result<Var, InvariantError> {
        let list = LetList::flatten(body);
        for &(var, value) in &list.bindings {
            self.forward_binding(var, value)?;
        }
        list.result_var().ok_or(InvariantError::NonVariableResult)
    }

    fn forward_binding(&mut self, var: Var, value: &'a Expr) -> Result<(), InvariantError> {
        match value {
            Expr::Var(referenced) => self.store.init(var, *referenced),
            // Constants and operator references are not planned buffers.
            Expr::Constant(_) | Expr::Op(_) => {
                let hint = self.hint(var);
                let null = self.store.create_null(hint);
                self.store.init(var, null)
            }
            Expr::Function(func) => {
                let captured = self.free_vars.closure_free_vars(&func.params, &func.body);
                let merged = self.store.merge_vars(&captured)?;
                self.store.init(var, merged)
            }
            Expr::Call { callee, ty, .. } => {
                if !matches!(callee.as_ref(), Expr::Op(_)) {
                    return Err(InvariantError::UnsupportedForm {
                        var,
                        kind: "closure application",
                    });
                }
                let hint = self.hint(var);
                let result = self.store.create_for_type(ty, &hint)?;
                self.store.init(var, result)
            }
            Expr::Tuple(fields) => {
                if fields
                    .iter()
                    .any(|f| !matches!(f, Expr::Var(_) | Expr::Constant(_)))
                {
                    return Err(InvariantError::UnsupportedForm {
                        var,
                        kind: "non-variable tuple field",
                    });
                }
                // constant fields keep their position but carry no identity
                let ids: Vec<Option<Var>> = fields.iter().map(Expr::as_var).collect();
                let merged = self.store.merge(&ids)?;
                self.store.init(var, merged)?;
                self.store.set_tuple(var, ids);
                Ok(())
            }
            Expr::TupleGetItem { tuple, index } => {
                let source = tuple.as_var().ok_or(InvariantError::UnsupportedForm {
                    var,
                    kind: "projection of a non-variable",
                })?;
                let field = {
                    let fields = self
                        .store
                        .tuple_fields(source)
                        .ok_or(InvariantError::MissingTupleFields { var: source })?;
                    let arity = fields.len();
                    *fields
                        .get(*index)
                        .ok_or(InvariantError::TupleIndexOutOfRange {
                            var: source,
                            index: *index,
                            arity,
                        })?
                };
                match field {
                    Some(field) => self.store.init(var, field),
                    None => {
                        let hint = self.hint(var);
                        let null = self.store.create_null(hint);
                        self.store.init(var, null)
                    }
                }
            }
            Expr::If {
                then_branch,
                else_branch,
                ty,
                ..
            } => {
                let then_ret = self.forward(then_branch)?;
                let else_ret = self.forward(else_branch)?;
                let hint = self.hint(var);
                let ret = self.store.create_for_type(ty, &hint)?;
                self.match_results(ret, then_ret, var)?;
                self.match_results(ret, else_ret, var)?;
                self.store.init(var, ret)
            }
            Expr::Let { .. } => Err(InvariantError::UnsupportedForm {
                var,
                kind: "nested let sequence",
            }),
        }
    }

    /// Record that `input` must share `out`'s buffers, field by field for
    /// tuples.
    fn match_results(&mut self, out: Var, input: Var, site: Var) -> Result<(), InvariantError> {
        let out_fields = self.store.tuple_fields(out).map(<[_]>::to_vec);
        let in_fields = self.store.tuple_fields(input).map(<[_]>::to_vec);
        match (out_fields, in_fields) {
            (None, None) => {
                trace!(out = %out, input = %input, site = %site, "merge pending");
                self.pending.push(PendingMerge { out, input, site });
                Ok(())
            }
            (Some(outs), Some(ins)) if outs.len() == ins.len() => {
                for (o, i) in outs.into_iter().zip(ins) {
                    // untracked fields have no buffer to share
                    if let (Some(o), Some(i)) = (o, i) {
                        self.match_results(o, i, site)?;
                    }
                }
                Ok(())
            }
            _ => Err(InvariantError::TupleShapeMismatch { out, input }),
        }
    }
}
