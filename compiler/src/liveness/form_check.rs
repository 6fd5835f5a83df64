// form_check.rs — Reject bodies outside the supported A-normal form
//
// Walks the whole function body, including conditional branches and closure
// bodies, and reports every shape the propagators cannot handle. The walk
// never stops early, so one run lists every problem.
//
// Preconditions: `func` is resolved.
// Postconditions: an empty (or warning-only) result means the forward and
//   backward passes will not meet an unsupported form.
// Side effects: none.

use crate::ast::Span;
use crate::diag::{codes, Diagnostic};
use crate::id::Var;
use crate::ir::{Expr, Function, LetList, VarTable};

/// Check `func` and return one diagnostic per unsupported form.
pub fn check_form(func: &Function, vars: &VarTable) -> Vec<Diagnostic> {
    let mut checker = FormChecker {
        vars,
        current: None,
        diagnostics: Vec::new(),
    };
    checker.sequence(&func.body);
    checker.diagnostics
}

struct FormChecker<'a> {
    vars: &'a VarTable,
    /// Binding under inspection; locates diagnostics.
    current: Option<Var>,
    diagnostics: Vec<Diagnostic>,
}

impl FormChecker<'_> {
    fn span(&self) -> Span {
        self.current
            .and_then(|v| self.vars.span(v))
            .unwrap_or_else(|| (0..0).into())
    }

    fn where_(&self) -> String {
        match self.current {
            Some(v) => format!(" in the binding of {}", self.vars.display(v)),
            None => String::new(),
        }
    }

    fn report(&mut self, diag: Diagnostic) {
        self.diagnostics.push(diag);
    }

    /// A let sequence whose result must be a variable: the function body or
    /// a conditional branch.
    fn sequence(&mut self, body: &Expr) {
        let outer = self.current;
        let list = LetList::flatten(body);
        for (var, value) in &list.bindings {
            self.current = Some(*var);
            if let Expr::Let { .. } = value {
                let msg = format!("nested let sequence{}", self.where_());
                self.report(
                    Diagnostic::error(codes::E0105, self.span(), msg)
                        .with_hint("flatten the sequence into the enclosing one"),
                );
            }
            self.expr(value);
        }
        self.current = outer;
        if list.result_var().is_none() {
            let msg = format!(
                "sequence result is a {}, not a variable{}",
                list.result.kind_name(),
                self.where_()
            );
            self.report(
                Diagnostic::error(codes::E0104, self.span(), msg)
                    .with_hint("bind the result with `let` and return the variable"),
            );
        }
        self.expr(list.result);
    }

    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Var(_) | Expr::Constant(_) | Expr::Op(_) => {}
            Expr::Call { callee, args, .. } => {
                if !matches!(callee.as_ref(), Expr::Op(_)) {
                    let msg = format!(
                        "call of a {} is not supported{}",
                        callee.kind_name(),
                        self.where_()
                    );
                    self.report(
                        Diagnostic::error(codes::E0100, self.span(), msg)
                            .with_hint("only primitive operators may be called"),
                    );
                }
                for arg in args {
                    if !matches!(arg, Expr::Var(_) | Expr::Constant(_)) {
                        let msg = format!(
                            "call argument is a {}, not a variable or constant{}",
                            arg.kind_name(),
                            self.where_()
                        );
                        self.report(
                            Diagnostic::error(codes::E0101, self.span(), msg)
                                .with_hint("bind the argument with `let` first"),
                        );
                    }
                }
                self.expr(callee);
                for arg in args {
                    self.expr(arg);
                }
            }
            Expr::Tuple(fields) => {
                for (i, field) in fields.iter().enumerate() {
                    if !matches!(field, Expr::Var(_) | Expr::Constant(_)) {
                        let msg = format!(
                            "tuple field {} is a {}, not a variable or constant{}",
                            i,
                            field.kind_name(),
                            self.where_()
                        );
                        self.report(
                            Diagnostic::error(codes::E0106, self.span(), msg)
                                .with_hint("bind the field with `let` first"),
                        );
                    }
                    self.expr(field);
                }
            }
            Expr::TupleGetItem { tuple, .. } => {
                if tuple.as_var().is_none() {
                    let msg = format!(
                        "projection of a {}, not a variable{}",
                        tuple.kind_name(),
                        self.where_()
                    );
                    self.report(Diagnostic::error(codes::E0103, self.span(), msg));
                }
                self.expr(tuple);
            }
            Expr::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => {
                if cond.as_var().is_none() {
                    let msg = format!(
                        "condition is a {}, not a variable{}",
                        cond.kind_name(),
                        self.where_()
                    );
                    self.report(
                        Diagnostic::error(codes::E0102, self.span(), msg)
                            .with_hint("bind the condition with `let` first"),
                    );
                }
                self.expr(cond);
                self.sequence(then_branch);
                self.sequence(else_branch);
            }
            // Closure bodies are only scanned for their free variables, but
            // an unsupported form inside one is still rejected.
            Expr::Function(func) => self.expr(&func.body),
            Expr::Let { value, body, .. } => {
                self.expr(value);
                self.expr(body);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::IrProgram;

    fn program(source: &str) -> IrProgram {
        let parsed = crate::parser::parse(source);
        assert!(parsed.errors.is_empty(), "parse errors: {:?}", parsed.errors);
        let resolved = crate::resolve::resolve(&parsed.module.expect("module"));
        assert!(resolved.diagnostics.is_empty(), "{:?}", resolved.diagnostics);
        resolved.program
    }

    fn codes_for(source: &str) -> Vec<&'static str> {
        let prog = program(source);
        check_form(prog.function("main").unwrap(), &prog.vars)
            .iter()
            .filter_map(|d| d.code.map(|c| c.0))
            .collect()
    }

    #[test]
    fn anf_body_is_accepted() {
        let codes = codes_for(
            "fn @main(%c: Tensor, %x: Tensor) {
               let %a = nn.relu(%x);
               let %t = (%a, %x);
               let %p = %t.1;
               let %z = if (%c) { let %q = add(%p, 1.0); %q } else { %a };
               %z
             }",
        );
        assert!(codes.is_empty(), "{:?}", codes);
    }

    #[test]
    fn nested_call_argument_rejected() {
        assert_eq!(
            codes_for("fn @main(%x: Tensor) { let %a = add(relu(%x), %x); %a }"),
            vec!["E0101"]
        );
    }

    #[test]
    fn closure_application_rejected() {
        assert_eq!(
            codes_for("fn @main(%x: Tensor) { let %f = fn(%y: Tensor) { %y }; let %r = %f(%x); %r }"),
            vec!["E0100"]
        );
    }

    #[test]
    fn non_variable_condition_rejected() {
        assert_eq!(
            codes_for("fn @main(%x: Tensor) { let %z = if (relu(%x)) { %x } else { %x }; %z }"),
            vec!["E0102"]
        );
    }

    #[test]
    fn non_variable_projection_rejected() {
        assert_eq!(
            codes_for("fn @main(%x: Tensor) { let %a = (%x, %x).0; %a }"),
            vec!["E0103"]
        );
    }

    #[test]
    fn non_variable_results_rejected_in_body_and_branch() {
        assert_eq!(
            codes_for("fn @main(%c: Tensor, %x: Tensor) { let %z = if (%c) { relu(%x) } else { %x }; relu(%z) }"),
            vec!["E0104", "E0104"]
        );
    }

    #[test]
    fn compound_tuple_fields_rejected() {
        assert_eq!(
            codes_for(
                "fn @main(%x: Tensor, %y: Tensor) {
                   let %t = (nn.relu(%y), %x, 1.0, (%x, %y));
                   let %a = %t.1;
                   %a
                 }"
            ),
            vec!["E0106", "E0106"]
        );
    }

    #[test]
    fn problems_inside_closures_are_found() {
        assert_eq!(
            codes_for("fn @main(%x: Tensor) { let %f = fn(%y: Tensor) { add(relu(%y), %x) }; %f }"),
            vec!["E0101"]
        );
    }

    #[test]
    fn all_problems_reported_in_one_run() {
        assert_eq!(
            codes_for("fn @main(%x: Tensor) { let %a = add(relu(%x), (%x, %x)); let %b = (%a, %a).1; %b }"),
            vec!["E0101", "E0101", "E0103"]
        );
    }

    #[test]
    fn nested_let_value_rejected() {
        let mut vars = VarTable::new();
        let x = vars.fresh("x", crate::ir::Type::Tensor, (0..0).into());
        let a = vars.fresh("a", crate::ir::Type::Tensor, (0..0).into());
        let b = vars.fresh("b", crate::ir::Type::Tensor, (0..0).into());
        let inner = Expr::let_in(b, Expr::Var(x), Expr::Var(b));
        let func = Function {
            params: vec![x],
            body: Box::new(Expr::let_in(a, inner, Expr::Var(a))),
        };
        let diags = check_form(&func, &vars);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code.map(|c| c.0), Some("E0105"));
    }
}
