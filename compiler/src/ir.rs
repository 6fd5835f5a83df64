// ir.rs — Single-assignment tensor dataflow IR consumed by the liveness analysis
//
// A closed set of expression kinds: variable reference, constant, operator
// reference, call, tuple construction, tuple projection, conditional, closure
// literal, and `let`. Sequences are right-nested `Let` chains ending in a
// result expression; `LetList` flattens them for the dataflow passes.
//
// Preconditions: produced by `resolve` (or built directly by an embedding
//   compiler) with every binder allocated exactly once in `VarTable`.
// Postconditions: none (data-only module, plus a pretty printer).
// Failure modes: none.
// Side effects: none.

use std::collections::HashMap;
use std::fmt;

use crate::ast::Span;
use crate::id::{IdAllocator, Var};

// ── Types ───────────────────────────────────────────────────────────────────

/// Checked type of a binder or value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Tensor,
    Tuple(Vec<Type>),
    Func,
    /// Any other named type (scalars, handles, ...). Never a planned buffer
    /// parameter.
    Other(String),
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Tensor => write!(f, "Tensor"),
            Type::Tuple(fields) => {
                write!(f, "(")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", field)?;
                }
                write!(f, ")")
            }
            Type::Func => write!(f, "Func"),
            Type::Other(name) => write!(f, "{}", name),
        }
    }
}

// ── Variable table ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct VarInfo {
    pub name: String,
    pub ty: Type,
    pub span: Span,
}

/// Arena of program binders, indexed by `Var`.
#[derive(Debug, Clone, Default)]
pub struct VarTable {
    infos: Vec<VarInfo>,
    by_name: HashMap<String, Var>,
    alloc: IdAllocator,
}

impl VarTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a binder. Names are expected to be unique per program;
    /// `lookup` returns the first binder registered under a name.
    pub fn fresh(&mut self, name: impl Into<String>, ty: Type, span: Span) -> Var {
        let var = self.alloc.alloc_var();
        let name = name.into();
        self.by_name.entry(name.clone()).or_insert(var);
        self.infos.push(VarInfo { name, ty, span });
        var
    }

    pub fn info(&self, var: Var) -> Option<&VarInfo> {
        self.infos.get(var.index())
    }

    pub fn name(&self, var: Var) -> Option<&str> {
        self.info(var).map(|i| i.name.as_str())
    }

    pub fn ty(&self, var: Var) -> Option<&Type> {
        self.info(var).map(|i| &i.ty)
    }

    pub fn span(&self, var: Var) -> Option<Span> {
        self.info(var).map(|i| i.span)
    }

    /// Find a binder by name (without the `%` sigil).
    pub fn lookup(&self, name: &str) -> Option<Var> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// `%name` for program binders, the raw handle otherwise.
    pub fn display(&self, var: Var) -> String {
        match self.name(var) {
            Some(name) => format!("%{}", name),
            None => format!("{}", var),
        }
    }
}

// ── Expressions ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Var(Var),
    Constant(f64),
    /// Reference to a primitive operator, e.g. `nn.relu`.
    Op(String),
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        /// Checked result type.
        ty: Type,
    },
    Tuple(Vec<Expr>),
    TupleGetItem {
        tuple: Box<Expr>,
        index: usize,
    },
    If {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
        /// Checked result type.
        ty: Type,
    },
    Function(Function),
    Let {
        var: Var,
        value: Box<Expr>,
        body: Box<Expr>,
    },
}

impl Expr {
    /// Call of a primitive operator with a single-tensor result.
    pub fn op_call(op: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr::Call {
            callee: Box::new(Expr::Op(op.into())),
            args,
            ty: Type::Tensor,
        }
    }

    pub fn let_in(var: Var, value: Expr, body: Expr) -> Expr {
        Expr::Let {
            var,
            value: Box::new(value),
            body: Box::new(body),
        }
    }

    pub fn as_var(&self) -> Option<Var> {
        match self {
            Expr::Var(v) => Some(*v),
            _ => None,
        }
    }

    /// Short kind name used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Expr::Var(_) => "variable",
            Expr::Constant(_) => "constant",
            Expr::Op(_) => "operator reference",
            Expr::Call { .. } => "call",
            Expr::Tuple(_) => "tuple",
            Expr::TupleGetItem { .. } => "tuple projection",
            Expr::If { .. } => "conditional",
            Expr::Function(_) => "closure",
            Expr::Let { .. } => "let sequence",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub params: Vec<Var>,
    pub body: Box<Expr>,
}

/// A resolved module: binder table plus named functions in source order.
#[derive(Debug, Clone, Default)]
pub struct IrProgram {
    pub vars: VarTable,
    pub functions: Vec<(String, Function)>,
}

impl IrProgram {
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, f)| f)
    }

    pub fn display_function<'a>(&'a self, name: &'a str) -> Option<FunctionDisplay<'a>> {
        self.function(name).map(|func| FunctionDisplay {
            vars: &self.vars,
            name,
            func,
        })
    }
}

// ── Let lists ───────────────────────────────────────────────────────────────

/// A flattened `let` chain: bindings in program order plus the trailing
/// result expression.
#[derive(Debug)]
pub struct LetList<'a> {
    pub bindings: Vec<(Var, &'a Expr)>,
    pub result: &'a Expr,
}

impl<'a> LetList<'a> {
    pub fn flatten(expr: &'a Expr) -> Self {
        let mut bindings = Vec::new();
        let mut cur = expr;
        while let Expr::Let { var, value, body } = cur {
            bindings.push((*var, value.as_ref()));
            cur = body;
        }
        LetList {
            bindings,
            result: cur,
        }
    }

    pub fn result_var(&self) -> Option<Var> {
        self.result.as_var()
    }
}

// ── Pretty printer ──────────────────────────────────────────────────────────

pub struct FunctionDisplay<'a> {
    vars: &'a VarTable,
    name: &'a str,
    func: &'a Function,
}

impl fmt::Display for FunctionDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let printer = Printer { vars: self.vars };
        write!(f, "fn @{}(", self.name)?;
        printer.params(f, &self.func.params)?;
        writeln!(f, ") {{")?;
        printer.sequence(f, &self.func.body, 1)?;
        writeln!(f, "}}")
    }
}

struct Printer<'a> {
    vars: &'a VarTable,
}

impl Printer<'_> {
    fn indent(f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        for _ in 0..depth {
            write!(f, "  ")?;
        }
        Ok(())
    }

    fn params(&self, f: &mut fmt::Formatter<'_>, params: &[Var]) -> fmt::Result {
        for (i, p) in params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            let ty = self.vars.ty(*p).cloned().unwrap_or(Type::Tensor);
            write!(f, "{}: {}", self.vars.display(*p), ty)?;
        }
        Ok(())
    }

    fn sequence(&self, f: &mut fmt::Formatter<'_>, body: &Expr, depth: usize) -> fmt::Result {
        let list = LetList::flatten(body);
        for (var, value) in &list.bindings {
            Self::indent(f, depth)?;
            let ty = self.vars.ty(*var).cloned().unwrap_or(Type::Tensor);
            write!(f, "let {}: {} = ", self.vars.display(*var), ty)?;
            self.expr(f, value, depth)?;
            writeln!(f, ";")?;
        }
        Self::indent(f, depth)?;
        self.expr(f, list.result, depth)?;
        writeln!(f)
    }

    fn list(&self, f: &mut fmt::Formatter<'_>, items: &[Expr], depth: usize) -> fmt::Result {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            self.expr(f, item, depth)?;
        }
        Ok(())
    }

    fn expr(&self, f: &mut fmt::Formatter<'_>, expr: &Expr, depth: usize) -> fmt::Result {
        match expr {
            Expr::Var(v) => write!(f, "{}", self.vars.display(*v)),
            Expr::Constant(c) => write!(f, "{}", c),
            Expr::Op(name) => write!(f, "{}", name),
            Expr::Call { callee, args, .. } => {
                self.expr(f, callee, depth)?;
                write!(f, "(")?;
                self.list(f, args, depth)?;
                write!(f, ")")
            }
            Expr::Tuple(fields) => {
                write!(f, "(")?;
                self.list(f, fields, depth)?;
                if fields.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Expr::TupleGetItem { tuple, index } => {
                self.expr(f, tuple, depth)?;
                write!(f, ".{}", index)
            }
            Expr::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => {
                write!(f, "if (")?;
                self.expr(f, cond, depth)?;
                writeln!(f, ") {{")?;
                self.sequence(f, then_branch, depth + 1)?;
                Self::indent(f, depth)?;
                writeln!(f, "}} else {{")?;
                self.sequence(f, else_branch, depth + 1)?;
                Self::indent(f, depth)?;
                write!(f, "}}")
            }
            Expr::Function(func) => {
                write!(f, "fn(")?;
                self.params(f, &func.params)?;
                writeln!(f, ") {{")?;
                self.sequence(f, &func.body, depth + 1)?;
                Self::indent(f, depth)?;
                write!(f, "}}")
            }
            Expr::Let { .. } => {
                writeln!(f, "{{")?;
                self.sequence(f, expr, depth + 1)?;
                Self::indent(f, depth)?;
                write!(f, "}}")
            }
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
