// tlc — Tensor Liveness Checker
//
// Library root. Front end (lexer, parser, resolve), the identity and
// union-find building blocks, the liveness analysis and its reports.

pub mod ast;
pub mod diag;
pub mod free_vars;
pub mod id;
pub mod ir;
pub mod lexer;
pub mod liveness;
pub mod parser;
pub mod pass;
pub mod pipeline;
pub mod report;
pub mod resolve;
pub mod union_find;
pub mod vset;
