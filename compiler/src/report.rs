// report.rs — Human-readable and JSON renderings of an analysis result
//
// Preconditions: `result` was produced from `func` and `vars`.
// Postconditions: output depends only on the result, so equal inputs render
//   byte-identical text and JSON.
// Side effects: none.

use std::fmt::Write as _;

use serde::Serialize;

use crate::diag::{DiagLevel, Diagnostic};
use crate::id::Var;
use crate::ir::{Expr, Function, LetList, VarTable};
use crate::liveness::{AnalysisStatus, Liveness, LivenessResult, Scope};
use crate::pass::PassId;
use crate::vset::VSet;

// ── Text ────────────────────────────────────────────────────────────────────

fn set_text(liveness: &Liveness, set: &VSet) -> String {
    format!("{{{}}}", liveness.names_of(set).join(", "))
}

/// Per-binding live sets in textual order (branch exits included), the
/// non-trivial sharing classes, the status and any diagnostics.
pub fn render_text(name: &str, func: &Function, vars: &VarTable, result: &LivenessResult) -> String {
    let liveness = result.diagnostic_liveness();
    let mut out = String::new();
    let _ = writeln!(out, "liveness @{}: {}", name, result.status());

    let mut points = Vec::new();
    collect_points(&func.body, Scope::Body, 0, &mut points);
    for point in &points {
        let indent = "  ".repeat(point.depth + 1);
        match point.kind {
            PointKind::Binding(var) => {
                if let Some(set) = liveness.live_at(var) {
                    let _ = writeln!(out, "{}{}: {}", indent, vars.display(var), set_text(liveness, set));
                }
            }
            PointKind::Branch(label) => {
                let _ = writeln!(out, "{}{}:", indent, label);
            }
            PointKind::Exit(scope) => {
                let set = liveness
                    .exit_point(scope)
                    .and_then(|exit| liveness.live_at(exit));
                if let Some(set) = set {
                    let _ = writeln!(out, "{}exit: {}", indent, set_text(liveness, set));
                }
            }
        }
    }

    let shared: Vec<&Vec<Var>> = liveness.classes().iter().filter(|c| c.len() > 1).collect();
    if !shared.is_empty() {
        let _ = writeln!(out, "shared:");
        for class in shared {
            let names: Vec<String> = class.iter().map(|v| liveness.name(*v)).collect();
            let _ = writeln!(out, "  {{{}}}", names.join(", "));
        }
    }
    if !result.diagnostics.is_empty() {
        let _ = writeln!(out, "diagnostics:");
        for diag in &result.diagnostics {
            for line in diag.to_string().lines() {
                let _ = writeln!(out, "  {}", line);
            }
        }
    }
    out
}

/// Identity set of every program binder that has one.
pub fn render_identities(name: &str, vars: &VarTable, result: &LivenessResult) -> String {
    let liveness = result.diagnostic_liveness();
    let mut out = String::new();
    let _ = writeln!(out, "identities @{}: {}", name, result.status());
    for (var, set) in liveness.binders() {
        let _ = writeln!(out, "  {}: {}", vars.display(var), set_text(liveness, set));
    }
    out
}

fn scope_label(scope: Scope, vars: &VarTable) -> String {
    match scope {
        Scope::Body => "body".to_string(),
        Scope::Then(v) => format!("then {}", vars.display(v)),
        Scope::Else(v) => format!("else {}", vars.display(v)),
    }
}

enum PointKind {
    Binding(Var),
    Branch(&'static str),
    Exit(Scope),
}

struct Point {
    depth: usize,
    scope: Scope,
    kind: PointKind,
}

fn collect_points(body: &Expr, scope: Scope, depth: usize, out: &mut Vec<Point>) {
    let list = LetList::flatten(body);
    for &(var, value) in &list.bindings {
        out.push(Point {
            depth,
            scope,
            kind: PointKind::Binding(var),
        });
        if let Expr::If {
            then_branch,
            else_branch,
            ..
        } = value
        {
            out.push(Point {
                depth: depth + 1,
                scope,
                kind: PointKind::Branch("then"),
            });
            collect_points(then_branch, Scope::Then(var), depth + 2, out);
            out.push(Point {
                depth: depth + 1,
                scope,
                kind: PointKind::Branch("else"),
            });
            collect_points(else_branch, Scope::Else(var), depth + 2, out);
        }
    }
    out.push(Point {
        depth,
        scope,
        kind: PointKind::Exit(scope),
    });
}

// ── JSON ────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct JsonReport {
    pub function: String,
    pub status: AnalysisStatus,
    pub passes: Vec<PassId>,
    pub identities: Vec<BinderReport>,
    pub points: Vec<PointReport>,
    pub classes: Vec<Vec<String>>,
    pub conflicts: Vec<ConflictReport>,
    pub diagnostics: Vec<DiagnosticReport>,
}

#[derive(Debug, Serialize)]
pub struct BinderReport {
    pub binder: String,
    pub identities: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PointReport {
    pub point: String,
    pub scope: String,
    pub live: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ConflictReport {
    pub out: String,
    pub input: String,
    pub site: String,
    pub shared_points: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct DiagnosticReport {
    pub code: Option<&'static str>,
    pub level: DiagLevel,
    pub message: String,
    pub span: [usize; 2],
    pub causes: Vec<String>,
    pub hint: Option<String>,
}

impl From<&Diagnostic> for DiagnosticReport {
    fn from(diag: &Diagnostic) -> Self {
        DiagnosticReport {
            code: diag.code.map(|c| c.0),
            level: diag.level,
            message: diag.message.clone(),
            span: [diag.span.start, diag.span.end],
            causes: diag.cause_chain.iter().map(|c| c.message.clone()).collect(),
            hint: diag.hint.clone(),
        }
    }
}

/// Build the serializable report. Points follow textual order, like the
/// text rendering.
pub fn json_report(name: &str, func: &Function, vars: &VarTable, result: &LivenessResult) -> JsonReport {
    let liveness = result.diagnostic_liveness();

    let mut raw = Vec::new();
    collect_points(&func.body, Scope::Body, 0, &mut raw);
    let mut points = Vec::new();
    for point in &raw {
        let (label, set) = match point.kind {
            PointKind::Binding(var) => (vars.display(var), liveness.live_at(var)),
            PointKind::Exit(scope) => (
                "exit".to_string(),
                liveness.exit_point(scope).and_then(|e| liveness.live_at(e)),
            ),
            PointKind::Branch(_) => continue,
        };
        if let Some(set) = set {
            points.push(PointReport {
                point: label,
                scope: scope_label(point.scope, vars),
                live: liveness.names_of(set),
            });
        }
    }

    JsonReport {
        function: name.to_string(),
        status: result.status(),
        passes: result.passes_run.clone(),
        identities: liveness
            .binders()
            .map(|(var, set)| BinderReport {
                binder: vars.display(var),
                identities: liveness.names_of(set),
            })
            .collect(),
        points,
        classes: liveness
            .classes()
            .iter()
            .map(|class| class.iter().map(|v| liveness.name(*v)).collect())
            .collect(),
        conflicts: result
            .conflicts
            .iter()
            .map(|c| ConflictReport {
                out: liveness.name(c.out),
                input: liveness.name(c.input),
                site: liveness.name(c.site),
                shared_points: c.shared_points.iter().map(|p| liveness.name(*p)).collect(),
            })
            .collect(),
        diagnostics: result.diagnostics.iter().map(DiagnosticReport::from).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::IrProgram;
    use crate::liveness::analyze;

    fn program(source: &str) -> IrProgram {
        let parsed = crate::parser::parse(source);
        let resolved = crate::resolve::resolve(&parsed.module.expect("module"));
        assert!(resolved.diagnostics.is_empty(), "{:?}", resolved.diagnostics);
        resolved.program
    }

    #[test]
    fn straight_line_text() {
        let prog = program("fn @main(%x: Tensor) { let %a = relu(%x); let %b = add(%a, %x); %b }");
        let func = prog.function("main").unwrap();
        let result = analyze(func, &prog.vars).unwrap();
        assert_eq!(
            render_text("main", func, &prog.vars, &result),
            "liveness @main: valid\n  %a: {$x}\n  %b: {$x, $a}\n  exit: {$b}\n"
        );
    }

    #[test]
    fn identity_dump_lists_binders() {
        let prog = program("fn @main(%p: (Tensor, Tensor)) { let %a = %p.1; %a }");
        let func = prog.function("main").unwrap();
        let result = analyze(func, &prog.vars).unwrap();
        assert_eq!(
            render_identities("main", &prog.vars, &result),
            "identities @main: valid\n  %p: {$p.0, $p.1}\n  %a: {$p.1}\n"
        );
    }

    #[test]
    fn json_points_carry_branch_scopes() {
        let prog = program(
            "fn @main(%c: Tensor, %x: Tensor) { let %z = if (%c) { let %t = relu(%x); %t } else { %x }; %z }",
        );
        let func = prog.function("main").unwrap();
        let result = analyze(func, &prog.vars).unwrap();
        let report = json_report("main", func, &prog.vars, &result);
        let scopes: Vec<(&str, &str)> = report
            .points
            .iter()
            .map(|p| (p.point.as_str(), p.scope.as_str()))
            .collect();
        assert_eq!(
            scopes,
            vec![
                ("%z", "body"),
                ("%t", "then %z"),
                ("exit", "then %z"),
                ("exit", "else %z"),
                ("exit", "body"),
            ]
        );
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"status\":\"valid\""));
    }
}
