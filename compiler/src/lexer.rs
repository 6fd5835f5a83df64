// Lexer for `.tir` tensor IR text.
//
// Uses the `logos` crate for DFA-based lexing. Whitespace, including
// newlines, is insignificant; `#` starts a line comment.
//
// Preconditions: input is valid UTF-8.
// Postconditions: returns all tokens with byte-offset spans, plus any lex errors.
// Failure modes: unrecognized characters produce `LexError`; lexing continues.
// Side effects: none.

use logos::Logos;
use std::fmt;

/// Byte-offset span in source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// A lexer error with location.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub span: Span,
    pub message: String,
}

/// Result of lexing: tokens plus any errors (non-fatal).
#[derive(Debug)]
pub struct LexResult {
    pub tokens: Vec<(Token, Span)>,
    pub errors: Vec<LexError>,
}

/// Tensor IR token types.
///
/// Names carry no value; use the span to retrieve the text from the source.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+|#[^\n]*")]
pub enum Token {
    // ── Keywords ──
    #[token("fn")]
    Fn,
    #[token("let")]
    Let,
    #[token("if")]
    If,
    #[token("else")]
    Else,

    // ── Symbols ──
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(";")]
    Semi,
    #[token(":")]
    Colon,
    #[token("=")]
    Equals,

    // ── Names ──
    /// Local variable: `%name`.
    #[regex(r"%[a-zA-Z_][a-zA-Z0-9_]*")]
    Local,

    /// Global function name: `@name`.
    #[regex(r"@[a-zA-Z_][a-zA-Z0-9_]*")]
    Global,

    /// Operator or type name, optionally dotted (`nn.conv2d`).
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*(\.[a-zA-Z_][a-zA-Z0-9_]*)*")]
    Ident,

    // ── Literals ──
    /// Tuple projection index: `.0`, `.12`.
    #[regex(r"\.[0-9]+", parse_index)]
    Index(usize),

    /// Numeric constant (int, float, exponent, negative).
    #[regex(r"-?[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?", parse_number)]
    Number(f64),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Fn => write!(f, "fn"),
            Token::Let => write!(f, "let"),
            Token::If => write!(f, "if"),
            Token::Else => write!(f, "else"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::Comma => write!(f, ","),
            Token::Semi => write!(f, ";"),
            Token::Colon => write!(f, ":"),
            Token::Equals => write!(f, "="),
            Token::Local => write!(f, "<local>"),
            Token::Global => write!(f, "<global>"),
            Token::Ident => write!(f, "<ident>"),
            Token::Index(i) => write!(f, ".{i}"),
            Token::Number(v) => write!(f, "{v}"),
        }
    }
}

// ── Callbacks ──

fn parse_number(lex: &mut logos::Lexer<'_, Token>) -> Option<f64> {
    lex.slice().parse().ok()
}

fn parse_index(lex: &mut logos::Lexer<'_, Token>) -> Option<usize> {
    lex.slice()[1..].parse().ok()
}

// ── Public API ──

/// Lex a `.tir` source string into tokens.
///
/// Lexing is non-fatal: errors are collected and the lexer continues past
/// bad characters.
pub fn lex(source: &str) -> LexResult {
    let lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    for (result, range) in lexer.spanned() {
        let span = Span {
            start: range.start,
            end: range.end,
        };
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => errors.push(LexError {
                span,
                message: format!("unexpected character: {:?}", &source[span.start..span.end]),
            }),
        }
    }

    LexResult { tokens, errors }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_ok(source: &str) -> Vec<Token> {
        let result = lex(source);
        assert!(
            result.errors.is_empty(),
            "unexpected lex errors: {:?}",
            result.errors
        );
        result.tokens.into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn keywords_and_symbols() {
        let tokens = lex_ok("fn let if else ( ) { } , ; : =");
        assert_eq!(
            tokens,
            vec![
                Token::Fn,
                Token::Let,
                Token::If,
                Token::Else,
                Token::LParen,
                Token::RParen,
                Token::LBrace,
                Token::RBrace,
                Token::Comma,
                Token::Semi,
                Token::Colon,
                Token::Equals,
            ]
        );
    }

    #[test]
    fn keyword_vs_ident() {
        let tokens = lex_ok("if iffy fnord");
        assert_eq!(tokens, vec![Token::If, Token::Ident, Token::Ident]);
    }

    #[test]
    fn dotted_operator_name_is_one_ident() {
        let result = lex("nn.conv2d");
        assert_eq!(result.tokens.len(), 1);
        assert_eq!(result.tokens[0].0, Token::Ident);
        assert_eq!(result.tokens[0].1, Span { start: 0, end: 9 });
    }

    #[test]
    fn projection_chain() {
        let tokens = lex_ok("%t.0.1");
        assert_eq!(tokens, vec![Token::Local, Token::Index(0), Token::Index(1)]);
    }

    #[test]
    fn numbers() {
        let tokens = lex_ok("1 -2.5 3e2");
        assert_eq!(
            tokens,
            vec![Token::Number(1.0), Token::Number(-2.5), Token::Number(300.0)]
        );
    }

    #[test]
    fn locals_and_globals() {
        let tokens = lex_ok("@main(%x_1)");
        assert_eq!(
            tokens,
            vec![Token::Global, Token::LParen, Token::Local, Token::RParen]
        );
    }

    #[test]
    fn comments_and_newlines_skipped() {
        let tokens = lex_ok("let # binder\n%a");
        assert_eq!(tokens, vec![Token::Let, Token::Local]);
    }

    #[test]
    fn error_recovery() {
        let result = lex("%a ~ %b");
        let tokens: Vec<Token> = result.tokens.into_iter().map(|(t, _)| t).collect();
        assert_eq!(tokens, vec![Token::Local, Token::Local]);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].span, Span { start: 3, end: 4 });
    }
}
