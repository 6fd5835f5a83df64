// Parser for `.tir` tensor IR text.
//
// Parses a token stream (from the lexer) into an AST. Uses chumsky
// combinators.
//
// Preconditions: input is a valid token stream from `lexer::lex()`.
// Postconditions: returns an AST plus any parse errors (non-fatal).
// Failure modes: syntax errors produce `Rich` diagnostics.
// Side effects: none.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use crate::ast::*;
use crate::lexer::Token;

/// Result of parsing: AST plus any errors.
#[derive(Debug)]
pub struct ParseResult {
    pub module: Option<Module>,
    pub errors: Vec<Rich<'static, Token, SimpleSpan>>,
}

/// Parse a `.tir` source string. Lexes then parses.
pub fn parse(source: &str) -> ParseResult {
    let lex_result = crate::lexer::lex(source);
    let len = source.len();

    // Convert lexer output to chumsky stream.
    let token_iter = lex_result.tokens.into_iter().map(|(tok, span)| {
        let cspan: SimpleSpan = (span.start..span.end).into();
        (tok, cspan)
    });
    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));

    let parser = module_parser(source);
    let (module, parse_errors) = parser.parse(stream).into_output_errors();

    // Merge lex errors + parse errors.
    let mut all_errors: Vec<Rich<'static, Token, SimpleSpan>> = lex_result
        .errors
        .into_iter()
        .map(|e| {
            let span: SimpleSpan = (e.span.start..e.span.end).into();
            Rich::custom(span, e.message)
        })
        .collect();
    all_errors.extend(parse_errors.into_iter().map(|e| e.into_owned()));

    ParseResult {
        module,
        errors: all_errors,
    }
}

// ── Main parser builder ──
//
// All grammar rules are built inside `module_parser` so that the `source`
// reference is captured once and shared by all combinators.

fn module_parser<'tokens, 'src: 'tokens, I>(
    source: &'src str,
) -> impl Parser<'tokens, I, Module, extra::Err<Rich<'tokens, Token, SimpleSpan>>> + 'src
where
    'tokens: 'src,
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    // ── Names ──
    //
    // `%x` and `@f` keep their span but drop the sigil from the name.

    let local = just(Token::Local).map_with(move |_, e| {
        let span: SimpleSpan = e.span();
        Ident {
            name: source[span.start() + 1..span.end()].to_string(),
            span,
        }
    });

    let global = just(Token::Global).map_with(move |_, e| {
        let span: SimpleSpan = e.span();
        Ident {
            name: source[span.start() + 1..span.end()].to_string(),
            span,
        }
    });

    let ident = just(Token::Ident).map_with(move |_, e| {
        let span: SimpleSpan = e.span();
        Ident {
            name: source[span.start()..span.end()].to_string(),
            span,
        }
    });

    // ── Types: IDENT | '(' type (',' type)* ')' ──

    let ty = recursive(|ty| {
        let tuple = ty
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LParen), just(Token::RParen))
            .map_with(|fields, e| TypeExpr::Tuple(fields, e.span()));
        ident.clone().map(TypeExpr::Named).or(tuple)
    });

    // ── Params: '(' (LOCAL ':' type),* ')' ──

    let params = local
        .clone()
        .then_ignore(just(Token::Colon))
        .then(ty.clone())
        .map_with(|(name, ty), e| Param {
            name,
            ty,
            span: e.span(),
        })
        .separated_by(just(Token::Comma))
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LParen), just(Token::RParen));

    // ── Blocks and expressions (mutually recursive) ──

    let block = recursive(|block| {
        let expr = recursive(|expr| {
            let args = expr
                .clone()
                .separated_by(just(Token::Comma))
                .allow_trailing()
                .collect::<Vec<_>>()
                .delimited_by(just(Token::LParen), just(Token::RParen));

            // `%x` or `%f(args)`
            let local_primary =
                local
                    .clone()
                    .then(args.clone().or_not())
                    .map(|(name, args)| match args {
                        Some(args) => ExprKind::Call {
                            callee: Callee::Var(name),
                            args,
                        },
                        None => ExprKind::Var(name),
                    });

            // `op(args)` or a bare operator reference
            let op_primary =
                ident
                    .clone()
                    .then(args.clone().or_not())
                    .map(|(name, args)| match args {
                        Some(args) => ExprKind::Call {
                            callee: Callee::Op(name),
                            args,
                        },
                        None => ExprKind::OpRef(name),
                    });

            let number = select! {
                Token::Number(n) => ExprKind::Number(n),
            };

            let tuple = args.clone().map(ExprKind::Tuple);

            let if_expr = just(Token::If)
                .ignore_then(
                    expr.clone()
                        .delimited_by(just(Token::LParen), just(Token::RParen)),
                )
                .then(block.clone())
                .then_ignore(just(Token::Else))
                .then(block.clone())
                .map(|((cond, then_block), else_block)| ExprKind::If {
                    cond: Box::new(cond),
                    then_block,
                    else_block,
                });

            let closure = just(Token::Fn)
                .ignore_then(params.clone())
                .then(block.clone())
                .map(|(params, body)| ExprKind::Closure { params, body });

            let primary = choice((local_primary, op_primary, number, tuple, if_expr, closure))
                .map_with(|kind, e| Expr {
                    kind,
                    span: e.span(),
                });

            // Postfix projections: `primary (.N)*`
            let index = select! {
                Token::Index(i) = e => (i, e.span()),
            };

            primary
                .then(index.repeated().collect::<Vec<_>>())
                .map(|(base, indices)| {
                    indices.into_iter().fold(base, |acc, (index, idx_span): (usize, SimpleSpan)| {
                        let span: SimpleSpan = (acc.span.start()..idx_span.end()).into();
                        Expr {
                            kind: ExprKind::Proj {
                                tuple: Box::new(acc),
                                index,
                            },
                            span,
                        }
                    })
                })
                .boxed()
        });

        let let_stmt = just(Token::Let)
            .ignore_then(local.clone())
            .then(just(Token::Colon).ignore_then(ty.clone()).or_not())
            .then_ignore(just(Token::Equals))
            .then(expr.clone())
            .then_ignore(just(Token::Semi))
            .map_with(|((name, ty), value), e| LetStmt {
                name,
                ty,
                value,
                span: e.span(),
            });

        let_stmt
            .repeated()
            .collect::<Vec<_>>()
            .then(expr)
            .delimited_by(just(Token::LBrace), just(Token::RBrace))
            .map_with(|(lets, result), e| Block {
                lets,
                result: Box::new(result),
                span: e.span(),
            })
            .boxed()
    });

    // ── fn_def: 'fn' GLOBAL params block ──

    let fn_def = just(Token::Fn)
        .ignore_then(global)
        .then(params)
        .then(block)
        .map_with(|((name, params), body), e| FnDef {
            name,
            params,
            body,
            span: e.span(),
        });

    fn_def
        .repeated()
        .collect::<Vec<_>>()
        .map_with(|functions, e| Module {
            functions,
            span: e.span(),
        })
}

// ── Tests ──
