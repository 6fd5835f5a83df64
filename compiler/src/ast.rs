// AST node types for `.tir` tensor IR text.
//
// Every node carries a `SimpleSpan` for error reporting in downstream phases.
// The AST deliberately admits shapes the analysis does not support (nested
// calls, non-variable conditions, closure application) so the form validator
// can reject them with proper diagnostics.
//
// Preconditions: produced by the parser from a valid or partially-valid token stream.
// Postconditions: each node's span covers the source range of the construct.
// Failure modes: none (data-only module).
// Side effects: none.

use chumsky::span::SimpleSpan;

/// Byte-offset span (alias for chumsky's `SimpleSpan`).
pub type Span = SimpleSpan;

// ── Root ──

/// A module: a sequence of function definitions.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub functions: Vec<FnDef>,
    pub span: Span,
}

// ── fn_def: 'fn' GLOBAL '(' params? ')' block ──

#[derive(Debug, Clone, PartialEq)]
pub struct FnDef {
    pub name: Ident,
    pub params: Vec<Param>,
    pub body: Block,
    pub span: Span,
}

/// `%name: type`
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Ident,
    pub ty: TypeExpr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    /// A named type; `Tensor` is the only one the analysis plans buffers for.
    Named(Ident),
    Tuple(Vec<TypeExpr>, Span),
}

// ── block: '{' (let_stmt ';')* expr '}' ──

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub lets: Vec<LetStmt>,
    pub result: Box<Expr>,
    pub span: Span,
}

/// `let %name (: type)? = expr`
#[derive(Debug, Clone, PartialEq)]
pub struct LetStmt {
    pub name: Ident,
    pub ty: Option<TypeExpr>,
    pub value: Expr,
    pub span: Span,
}

// ── Expressions ──

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// `%name`
    Var(Ident),
    /// Numeric constant.
    Number(f64),
    /// Bare operator name in value position.
    OpRef(Ident),
    /// `op(args)` or `%f(args)`.
    Call { callee: Callee, args: Vec<Expr> },
    /// `(a, b, ...)`
    Tuple(Vec<Expr>),
    /// `expr.N`
    Proj { tuple: Box<Expr>, index: usize },
    /// `if (cond) { ... } else { ... }`
    If {
        cond: Box<Expr>,
        then_block: Block,
        else_block: Block,
    },
    /// `fn(params) { ... }`
    Closure { params: Vec<Param>, body: Block },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Callee {
    Op(Ident),
    Var(Ident),
}

// ── Identifier ──

/// An identifier with its source text (sigil stripped) and span.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}
