//! Token types for the DSLX lexer.
//!
//! Defines [`TokenKind`] covering every lexeme the front end accepts and
//! [`Token`], which pairs a kind with a source [`Span`].
//!
//! Type names (`u32`, `uN`, `bits`, `token`, ...) and proc section names
//! (`config`, `next`) are ordinary identifiers; the parser gives them meaning
//! by position.

use dslx_types::Span;
use std::fmt;

/// Reserved words. These cannot be used as user-defined names.
pub const ALL_KEYWORDS: &[&str] = &[
    "fn", "proc", "pub", "let", "if", "else", "match", "for", "in", "struct", "enum", "const",
    "type", "as", "spawn", "chan", "true", "false",
];

// ─────────────────────────────────────────────────────────────────────
// Token
// ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn is_keyword(&self) -> bool {
        self.kind.is_keyword()
    }
}

// ─────────────────────────────────────────────────────────────────────
// TokenKind
// ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // ── Literals ──────────────────────────────────────────────

    /// Unsigned magnitude of a decimal, hex (`0x`) or binary (`0b`) literal.
    Number(u128),
    /// `"..."`: only used for format strings.
    Str(String),

    Ident(String),

    // ── Keywords ──────────────────────────────────────────────

    Fn,
    Proc,
    Pub,
    Let,
    If,
    Else,
    Match,
    For,
    In,
    Struct,
    Enum,
    Const,
    Type,
    As,
    Spawn,
    Chan,
    True,
    False,

    // ── Operators ─────────────────────────────────────────────

    Plus,
    /// `++`
    PlusPlus,
    /// `+:`
    PlusColon,
    Minus,
    Star,
    Slash,
    Percent,
    /// `<<`
    Shl,
    /// `>>`
    Shr,
    Amp,
    /// `&&`
    AmpAmp,
    Pipe,
    /// `||`
    PipePipe,
    Caret,
    Bang,
    Eq,
    /// `==`
    EqEq,
    /// `!=`
    BangEq,
    Lt,
    /// `<=`
    LtEq,
    Gt,
    /// `>=`
    GtEq,
    /// `->`
    Arrow,
    /// `=>`
    FatArrow,

    // ── Punctuation ───────────────────────────────────────────

    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semi,
    Colon,
    /// `::`
    ColonColon,
    Dot,
    /// `..`
    DotDot,
    /// `...`
    Ellipsis,
    Hash,
    Underscore,

    Eof,
}

impl TokenKind {
    /// Map reserved text to its keyword token.
    pub fn from_keyword(text: &str) -> Option<TokenKind> {
        let kind = match text {
            "fn" => TokenKind::Fn,
            "proc" => TokenKind::Proc,
            "pub" => TokenKind::Pub,
            "let" => TokenKind::Let,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "match" => TokenKind::Match,
            "for" => TokenKind::For,
            "in" => TokenKind::In,
            "struct" => TokenKind::Struct,
            "enum" => TokenKind::Enum,
            "const" => TokenKind::Const,
            "type" => TokenKind::Type,
            "as" => TokenKind::As,
            "spawn" => TokenKind::Spawn,
            "chan" => TokenKind::Chan,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            _ => return None,
        };
        Some(kind)
    }

    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            TokenKind::Fn
                | TokenKind::Proc
                | TokenKind::Pub
                | TokenKind::Let
                | TokenKind::If
                | TokenKind::Else
                | TokenKind::Match
                | TokenKind::For
                | TokenKind::In
                | TokenKind::Struct
                | TokenKind::Enum
                | TokenKind::Const
                | TokenKind::Type
                | TokenKind::As
                | TokenKind::Spawn
                | TokenKind::Chan
                | TokenKind::True
                | TokenKind::False
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenKind::Number(n) => return write!(f, "{n}"),
            TokenKind::Str(s) => return write!(f, "\"{s}\""),
            TokenKind::Ident(name) => return f.write_str(name),
            TokenKind::Fn => "fn",
            TokenKind::Proc => "proc",
            TokenKind::Pub => "pub",
            TokenKind::Let => "let",
            TokenKind::If => "if",
            TokenKind::Else => "else",
            TokenKind::Match => "match",
            TokenKind::For => "for",
            TokenKind::In => "in",
            TokenKind::Struct => "struct",
            TokenKind::Enum => "enum",
            TokenKind::Const => "const",
            TokenKind::Type => "type",
            TokenKind::As => "as",
            TokenKind::Spawn => "spawn",
            TokenKind::Chan => "chan",
            TokenKind::True => "true",
            TokenKind::False => "false",
            TokenKind::Plus => "+",
            TokenKind::PlusPlus => "++",
            TokenKind::PlusColon => "+:",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Shl => "<<",
            TokenKind::Shr => ">>",
            TokenKind::Amp => "&",
            TokenKind::AmpAmp => "&&",
            TokenKind::Pipe => "|",
            TokenKind::PipePipe => "||",
            TokenKind::Caret => "^",
            TokenKind::Bang => "!",
            TokenKind::Eq => "=",
            TokenKind::EqEq => "==",
            TokenKind::BangEq => "!=",
            TokenKind::Lt => "<",
            TokenKind::LtEq => "<=",
            TokenKind::Gt => ">",
            TokenKind::GtEq => ">=",
            TokenKind::Arrow => "->",
            TokenKind::FatArrow => "=>",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::Comma => ",",
            TokenKind::Semi => ";",
            TokenKind::Colon => ":",
            TokenKind::ColonColon => "::",
            TokenKind::Dot => ".",
            TokenKind::DotDot => "..",
            TokenKind::Ellipsis => "...",
            TokenKind::Hash => "#",
            TokenKind::Underscore => "_",
            TokenKind::Eof => "end of file",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_roundtrip() {
        for &kw in ALL_KEYWORDS {
            let kind = TokenKind::from_keyword(kw).unwrap();
            assert!(kind.is_keyword());
            assert_eq!(kind.to_string(), kw);
        }
    }

    #[test]
    fn test_type_names_are_not_keywords() {
        for name in ["u32", "uN", "bits", "token", "config", "next", "out"] {
            assert!(TokenKind::from_keyword(name).is_none(), "{name}");
        }
    }

    #[test]
    fn test_display_operators() {
        assert_eq!(TokenKind::PlusColon.to_string(), "+:");
        assert_eq!(TokenKind::ColonColon.to_string(), "::");
        assert_eq!(TokenKind::Ellipsis.to_string(), "...");
        assert_eq!(TokenKind::Number(42).to_string(), "42");
    }
}
