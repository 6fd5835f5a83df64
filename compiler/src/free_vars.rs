// free_vars.rs — Memoized free-variable collection
//
// Free variables of a closure or branch body: variables referenced inside
// that are not bound inside (by a `let` or a closure parameter). Results are
// cached per subexpression address, so each branch/closure is scanned once
// per analysis run regardless of how many passes ask. Plain and closure
// queries keep separate caches: a closure's answer excludes its parameters.
//
// Preconditions: binders are unique (guaranteed by resolve); the expressions
//   queried outlive the cache.
// Postconditions: variables are returned in first-occurrence order.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::id::Var;
use crate::ir::Expr;

fn expr_key(expr: &Expr) -> usize {
    expr as *const Expr as usize
}

#[derive(Debug, Default)]
pub struct FreeVarCache {
    memo: HashMap<usize, Rc<Vec<Var>>>,
    closure_memo: HashMap<usize, Rc<Vec<Var>>>,
}

impl FreeVarCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Free variables of `expr`.
    pub fn free_vars(&mut self, expr: &Expr) -> Rc<Vec<Var>> {
        let key = expr_key(expr);
        if let Some(hit) = self.memo.get(&key) {
            return Rc::clone(hit);
        }
        let result = Rc::new(collect(expr, &[]));
        self.memo.insert(key, Rc::clone(&result));
        result
    }

    /// Free variables of a closure: its body minus its parameters.
    pub fn closure_free_vars(&mut self, params: &[Var], body: &Expr) -> Rc<Vec<Var>> {
        let key = expr_key(body);
        if let Some(hit) = self.closure_memo.get(&key) {
            return Rc::clone(hit);
        }
        let result = Rc::new(collect(body, params));
        self.closure_memo.insert(key, Rc::clone(&result));
        result
    }

    pub fn cached(&self) -> usize {
        self.memo.len() + self.closure_memo.len()
    }
}

fn collect(expr: &Expr, prebound: &[Var]) -> Vec<Var> {
    let mut walk = Collector {
        bound: prebound.iter().copied().collect(),
        seen: HashSet::new(),
        out: Vec::new(),
    };
    walk.expr(expr);
    walk.out
}

struct Collector {
    bound: HashSet<Var>,
    seen: HashSet<Var>,
    out: Vec<Var>,
}

impl Collector {
    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Var(v) => {
                if !self.bound.contains(v) && self.seen.insert(*v) {
                    self.out.push(*v);
                }
            }
            Expr::Constant(_) | Expr::Op(_) => {}
            Expr::Call { callee, args, .. } => {
                self.expr(callee);
                for arg in args {
                    self.expr(arg);
                }
            }
            Expr::Tuple(fields) => {
                for field in fields {
                    self.expr(field);
                }
            }
            Expr::TupleGetItem { tuple, .. } => self.expr(tuple),
            Expr::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => {
                self.expr(cond);
                self.expr(then_branch);
                self.expr(else_branch);
            }
            Expr::Function(func) => {
                self.bound.extend(func.params.iter().copied());
                self.expr(&func.body);
            }
            Expr::Let { var, value, body } => {
                // non-recursive: the binder is not visible in its own value
                self.expr(value);
                self.bound.insert(*var);
                self.expr(body);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(n: u32) -> Var {
        Var(n)
    }

    #[test]
    fn let_binders_are_not_free() {
        // let %2 = add(%0, %1); add(%2, %0)
        let body = Expr::let_in(
            v(2),
            Expr::op_call("add", vec![Expr::Var(v(0)), Expr::Var(v(1))]),
            Expr::op_call("add", vec![Expr::Var(v(2)), Expr::Var(v(0))]),
        );
        let mut cache = FreeVarCache::new();
        assert_eq!(*cache.free_vars(&body), vec![v(0), v(1)]);
    }

    #[test]
    fn closure_params_are_not_free() {
        let body = Expr::op_call("add", vec![Expr::Var(v(5)), Expr::Var(v(1))]);
        let mut cache = FreeVarCache::new();
        assert_eq!(*cache.closure_free_vars(&[v(5)], &body), vec![v(1)]);
    }

    #[test]
    fn results_are_memoized_by_address() {
        let body = Expr::Var(v(3));
        let mut cache = FreeVarCache::new();
        let first = cache.free_vars(&body);
        let second = cache.free_vars(&body);
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(cache.cached(), 1);
    }

    #[test]
    fn closure_and_plain_queries_do_not_share_entries() {
        let body = Expr::op_call("mul", vec![Expr::Var(v(4)), Expr::Var(v(0))]);
        let mut cache = FreeVarCache::new();
        assert_eq!(*cache.free_vars(&body), vec![v(4), v(0)]);
        assert_eq!(*cache.closure_free_vars(&[v(4)], &body), vec![v(0)]);
        assert_eq!(*cache.free_vars(&body), vec![v(4), v(0)]);
        assert_eq!(cache.cached(), 2);
    }
}
