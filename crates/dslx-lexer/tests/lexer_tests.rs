//! Lexer tests: keywords, operators, number forms, spans, comments and
//! error recovery.

use dslx_lexer::{Lexer, TokenKind};
use dslx_types::{ErrorCode, SourceFile, Span};

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

/// Lex source text and return just the token kinds (excluding final Eof).
fn kinds(source: &str) -> Vec<TokenKind> {
    let sf = SourceFile::new("test.x", source);
    Lexer::new(&sf)
        .lex()
        .tokens
        .into_iter()
        .filter(|t| t.kind != TokenKind::Eof)
        .map(|t| t.kind)
        .collect()
}

fn spans(source: &str) -> Vec<Span> {
    let sf = SourceFile::new("test.x", source);
    Lexer::new(&sf).lex().tokens.into_iter().map(|t| t.span).collect()
}

fn ident(name: &str) -> TokenKind {
    TokenKind::Ident(name.to_string())
}

// ─────────────────────────────────────────────────────────────────────
// Keywords & identifiers
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_function_header() {
    assert_eq!(
        kinds("fn id(x: u32) -> u32 { x }"),
        vec![
            TokenKind::Fn,
            ident("id"),
            TokenKind::LParen,
            ident("x"),
            TokenKind::Colon,
            ident("u32"),
            TokenKind::RParen,
            TokenKind::Arrow,
            ident("u32"),
            TokenKind::LBrace,
            ident("x"),
            TokenKind::RBrace,
        ]
    );
}

#[test]
fn test_proc_keywords() {
    assert_eq!(
        kinds("proc p { c: chan in u32; }"),
        vec![
            TokenKind::Proc,
            ident("p"),
            TokenKind::LBrace,
            ident("c"),
            TokenKind::Colon,
            TokenKind::Chan,
            TokenKind::In,
            ident("u32"),
            TokenKind::Semi,
            TokenKind::RBrace,
        ]
    );
}

#[test]
fn test_underscore_vs_identifier() {
    assert_eq!(
        kinds("_ _x"),
        vec![TokenKind::Underscore, ident("_x")]
    );
}

// ─────────────────────────────────────────────────────────────────────
// Numbers
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_number_forms() {
    assert_eq!(
        kinds("42 0x1F 0b101 1_000"),
        vec![
            TokenKind::Number(42),
            TokenKind::Number(31),
            TokenKind::Number(5),
            TokenKind::Number(1000),
        ]
    );
}

#[test]
fn test_typed_literal_tokens() {
    assert_eq!(
        kinds("s8:-1"),
        vec![
            ident("s8"),
            TokenKind::Colon,
            TokenKind::Minus,
            TokenKind::Number(1),
        ]
    );
}

#[test]
fn test_number_overflow_is_error() {
    let sf = SourceFile::new("test.x", "0x1_0000_0000_0000_0000_0000_0000_0000_0000");
    let result = Lexer::new(&sf).lex();
    assert_eq!(result.errors.total_errors, 1);
    assert_eq!(result.errors.errors[0].code, ErrorCode::INVALID_LITERAL);
}

#[test]
fn test_range_and_tuple_index() {
    assert_eq!(
        kinds("0..4 t.1"),
        vec![
            TokenKind::Number(0),
            TokenKind::DotDot,
            TokenKind::Number(4),
            ident("t"),
            TokenKind::Dot,
            TokenKind::Number(1),
        ]
    );
}

// ─────────────────────────────────────────────────────────────────────
// Operators
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_multi_char_operators() {
    assert_eq!(
        kinds("++ +: << >> && || == != <= >= => :: ..."),
        vec![
            TokenKind::PlusPlus,
            TokenKind::PlusColon,
            TokenKind::Shl,
            TokenKind::Shr,
            TokenKind::AmpAmp,
            TokenKind::PipePipe,
            TokenKind::EqEq,
            TokenKind::BangEq,
            TokenKind::LtEq,
            TokenKind::GtEq,
            TokenKind::FatArrow,
            TokenKind::ColonColon,
            TokenKind::Ellipsis,
        ]
    );
}

#[test]
fn test_attribute_tokens() {
    assert_eq!(
        kinds("#![test_proc()]"),
        vec![
            TokenKind::Hash,
            TokenKind::Bang,
            TokenKind::LBracket,
            ident("test_proc"),
            TokenKind::LParen,
            TokenKind::RParen,
            TokenKind::RBracket,
        ]
    );
}

#[test]
fn test_format_string() {
    assert_eq!(
        kinds(r#"trace_fmt!("x={}\n", x)"#),
        vec![
            ident("trace_fmt"),
            TokenKind::Bang,
            TokenKind::LParen,
            TokenKind::Str("x={}\n".into()),
            TokenKind::Comma,
            ident("x"),
            TokenKind::RParen,
        ]
    );
}

// ─────────────────────────────────────────────────────────────────────
// Spans, comments, recovery
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_spans_are_half_open() {
    let s = spans("  interposer(x, y)");
    assert_eq!(s[0], Span::new(1, 3, 1, 13));
    // `(` starts at column 13, `)` ends before column 19.
    assert_eq!(s[1].start.col, 13);
    assert_eq!(s[5].limit.col, 19);
}

#[test]
fn test_spans_track_lines() {
    let s = spans("\nfn f\n  x");
    assert_eq!(s[0], Span::new(2, 1, 2, 3));
    assert_eq!(s[2], Span::new(3, 3, 3, 4));
}

#[test]
fn test_comments_are_skipped() {
    assert_eq!(
        kinds("x // comment ++ ??\ny"),
        vec![ident("x"), ident("y")]
    );
}

#[test]
fn test_unexpected_character_recovers() {
    let sf = SourceFile::new("test.x", "x $ y");
    let result = Lexer::new(&sf).lex();
    assert_eq!(result.errors.total_errors, 1);
    let kinds: Vec<_> = result.tokens.into_iter().map(|t| t.kind).collect();
    assert_eq!(kinds, vec![ident("x"), ident("y"), TokenKind::Eof]);
}

#[test]
fn test_unterminated_string() {
    let sf = SourceFile::new("test.x", "\"abc");
    let result = Lexer::new(&sf).lex();
    assert_eq!(result.errors.errors[0].code, ErrorCode::UNCLOSED_DELIMITER);
}

#[test]
fn test_error_cap() {
    let source = "$".repeat(50);
    let sf = SourceFile::new("test.x", source);
    let result = Lexer::new(&sf).lex();
    assert_eq!(result.errors.errors.len(), dslx_types::MAX_ERRORS);
    assert_eq!(result.tokens.last().map(|t| &t.kind), Some(&TokenKind::Eof));
}
