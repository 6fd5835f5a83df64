// resolve.rs — Name resolution and lowering from AST to IR
//
// Allocates one `Var` per binder in textual order (function params, then
// each let binder and closure param as encountered), resolves `%name`
// references through lexical scopes, and converts type syntax. A binder
// without an annotation gets a structurally inferred type; that type is
// also recorded as the checked type of a `Call` or `If` value.
//
// Preconditions: `module` is a parsed AST.
// Postconditions: returns an `IrProgram` whose binders are unique; if any
//   error-level diagnostic is present the program must not be analyzed.
// Failure modes: undefined variables (E0001), duplicate binders (E0002),
//   duplicate function names (E0003).
// Side effects: none.

use std::collections::HashMap;

use crate::ast::{self, Block, Callee, ExprKind, FnDef, Module, Param, Span, TypeExpr};
use crate::diag::{codes, Diagnostic};
use crate::id::Var;
use crate::ir::{Expr, Function, IrProgram, LetList, Type, VarTable};

/// Result of resolution: the lowered program plus diagnostics.
#[derive(Debug)]
pub struct ResolveResult {
    pub program: IrProgram,
    pub diagnostics: Vec<Diagnostic>,
}

/// Resolve every function of `module`.
pub fn resolve(module: &Module) -> ResolveResult {
    let mut ctx = ResolveCtx::default();
    let mut functions: Vec<(String, Function)> = Vec::new();
    let mut fn_spans: HashMap<String, Span> = HashMap::new();

    for def in &module.functions {
        if let Some(first) = fn_spans.get(&def.name.name) {
            ctx.diagnostics.push(
                Diagnostic::error(
                    codes::E0003,
                    def.name.span,
                    format!("duplicate function '@{}'", def.name.name),
                )
                .with_related(*first, "first defined here"),
            );
            continue;
        }
        fn_spans.insert(def.name.name.clone(), def.name.span);
        let func = ctx.lower_fn_def(def);
        functions.push((def.name.name.clone(), func));
    }

    ResolveResult {
        program: IrProgram {
            vars: ctx.vars,
            functions,
        },
        diagnostics: ctx.diagnostics,
    }
}

/// Convert type syntax. `Tensor` is the only buffer type; any other name is
/// carried as `Type::Other`.
pub fn lower_type(ty: &TypeExpr) -> Type {
    match ty {
        TypeExpr::Named(id) if id.name == "Tensor" => Type::Tensor,
        TypeExpr::Named(id) if id.name == "Func" => Type::Func,
        TypeExpr::Named(id) => Type::Other(id.name.clone()),
        TypeExpr::Tuple(fields, _) => Type::Tuple(fields.iter().map(lower_type).collect()),
    }
}

// ── Internal context ────────────────────────────────────────────────────────

#[derive(Default)]
struct ResolveCtx {
    vars: VarTable,
    scopes: Vec<HashMap<String, Var>>,
    binder_spans: HashMap<String, Span>,
    diagnostics: Vec<Diagnostic>,
}

impl ResolveCtx {
    fn lower_fn_def(&mut self, def: &FnDef) -> Function {
        self.scopes.push(HashMap::new());
        let params = self.bind_params(&def.params);
        let body = self.lower_block(&def.body);
        self.scopes.pop();
        Function {
            params,
            body: Box::new(body),
        }
    }

    fn bind_params(&mut self, params: &[Param]) -> Vec<Var> {
        params
            .iter()
            .map(|p| self.bind(&p.name, lower_type(&p.ty), p.span))
            .collect()
    }

    /// Allocate a binder in the innermost scope, reporting module-wide
    /// duplicates.
    fn bind(&mut self, name: &ast::Ident, ty: Type, span: Span) -> Var {
        if let Some(first) = self.binder_spans.get(&name.name) {
            self.diagnostics.push(
                Diagnostic::error(
                    codes::E0002,
                    name.span,
                    format!("duplicate binder '%{}'", name.name),
                )
                .with_related(*first, "first bound here")
                .with_hint("binders must be unique (single-assignment form)"),
            );
        } else {
            self.binder_spans.insert(name.name.clone(), name.span);
        }
        let var = self.vars.fresh(name.name.clone(), ty, span);
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.name.clone(), var);
        }
        var
    }

    fn lookup(&mut self, name: &ast::Ident) -> Option<Var> {
        let found = self
            .scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(&name.name).copied());
        if found.is_none() {
            self.diagnostics.push(Diagnostic::error(
                codes::E0001,
                name.span,
                format!("undefined variable '%{}'", name.name),
            ));
        }
        found
    }

    fn lower_block(&mut self, block: &Block) -> Expr {
        self.scopes.push(HashMap::new());
        let mut bindings = Vec::with_capacity(block.lets.len());
        for stmt in &block.lets {
            let mut value = self.lower_expr(&stmt.value);
            let ty = match &stmt.ty {
                Some(ty) => lower_type(ty),
                None => self.infer_type(&value),
            };
            set_checked_type(&mut value, &ty);
            let var = self.bind(&stmt.name, ty, stmt.span);
            bindings.push((var, value));
        }
        let result = self.lower_expr(&block.result);
        self.scopes.pop();

        bindings
            .into_iter()
            .rev()
            .fold(result, |body, (var, value)| Expr::let_in(var, value, body))
    }

    fn lower_expr(&mut self, expr: &ast::Expr) -> Expr {
        match &expr.kind {
            ExprKind::Var(id) => match self.lookup(id) {
                Some(v) => Expr::Var(v),
                // Placeholder; the program is rejected because of the E0001.
                None => Expr::Constant(0.0),
            },
            ExprKind::Number(n) => Expr::Constant(*n),
            ExprKind::OpRef(id) => Expr::Op(id.name.clone()),
            ExprKind::Call { callee, args } => {
                let callee = match callee {
                    Callee::Op(id) => Expr::Op(id.name.clone()),
                    Callee::Var(id) => match self.lookup(id) {
                        Some(v) => Expr::Var(v),
                        None => Expr::Constant(0.0),
                    },
                };
                Expr::Call {
                    callee: Box::new(callee),
                    args: args.iter().map(|a| self.lower_expr(a)).collect(),
                    ty: Type::Tensor,
                }
            }
            ExprKind::Tuple(fields) => {
                Expr::Tuple(fields.iter().map(|f| self.lower_expr(f)).collect())
            }
            ExprKind::Proj { tuple, index } => Expr::TupleGetItem {
                tuple: Box::new(self.lower_expr(tuple)),
                index: *index,
            },
            ExprKind::If {
                cond,
                then_block,
                else_block,
            } => {
                let cond = self.lower_expr(cond);
                let then_branch = self.lower_block(then_block);
                let else_branch = self.lower_block(else_block);
                Expr::If {
                    cond: Box::new(cond),
                    then_branch: Box::new(then_branch),
                    else_branch: Box::new(else_branch),
                    ty: Type::Tensor,
                }
            }
            ExprKind::Closure { params, body } => {
                self.scopes.push(HashMap::new());
                let params = self.bind_params(params);
                let body = self.lower_block(body);
                self.scopes.pop();
                Expr::Function(Function {
                    params,
                    body: Box::new(body),
                })
            }
        }
    }

    /// Structural type of an unannotated binding value.
    fn infer_type(&self, expr: &Expr) -> Type {
        match expr {
            Expr::Var(v) => self.vars.ty(*v).cloned().unwrap_or(Type::Tensor),
            Expr::Constant(_) | Expr::Call { .. } => Type::Tensor,
            Expr::Op(_) | Expr::Function(_) => Type::Func,
            Expr::Tuple(fields) => Type::Tuple(fields.iter().map(|f| self.infer_type(f)).collect()),
            Expr::TupleGetItem { tuple, index } => match self.infer_type(tuple) {
                Type::Tuple(fields) => fields.get(*index).cloned().unwrap_or(Type::Tensor),
                _ => Type::Tensor,
            },
            Expr::If { then_branch, .. } => self.infer_type(LetList::flatten(then_branch).result),
            Expr::Let { .. } => self.infer_type(LetList::flatten(expr).result),
        }
    }
}

fn set_checked_type(value: &mut Expr, ty: &Type) {
    match value {
        Expr::Call { ty: slot, .. } | Expr::If { ty: slot, .. } => *slot = ty.clone(),
        _ => {}
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
