//! Core DSLX lexer: converts source text to a token stream.
//!
//! - Line comments (`//`) are stripped; newlines are plain whitespace.
//! - Number literals accept decimal, `0x` and `0b` forms with `_` separators.
//! - Error recovery: collects up to [`MAX_ERRORS`] errors instead of stopping
//!   at the first.
//!
//! Spans are half-open: `limit` is the column just past the last character.

use dslx_types::{CompileErrors, DslxError, ErrorCode, SourceFile, Span, MAX_ERRORS};

use crate::token::{Token, TokenKind};

pub struct Lexer<'src> {
    source: &'src [u8],
    source_file: &'src SourceFile,
    /// Current byte offset into `source`.
    pos: usize,
    /// 1-based.
    line: u32,
    /// 1-based.
    col: u32,
    errors: CompileErrors,
}

/// Result of lexing: tokens + any errors collected.
pub struct LexResult {
    /// Always ends with [`TokenKind::Eof`].
    pub tokens: Vec<Token>,
    pub errors: CompileErrors,
}

impl<'src> Lexer<'src> {
    pub fn new(source_file: &'src SourceFile) -> Self {
        Self {
            source: source_file.source.as_bytes(),
            source_file,
            pos: 0,
            line: 1,
            col: 1,
            errors: CompileErrors::empty(),
        }
    }

    /// Lex the entire source file into a token stream.
    pub fn lex(mut self) -> LexResult {
        let mut tokens = Vec::new();
        loop {
            if self.errors.total_errors >= MAX_ERRORS {
                break;
            }
            let token = self.scan();
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        if tokens.last().is_none_or(|t| t.kind != TokenKind::Eof) {
            tokens.push(Token::new(TokenKind::Eof, self.current_span()));
        }
        LexResult {
            tokens,
            errors: self.errors,
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Character-level helpers
    // ─────────────────────────────────────────────────────────────

    fn peek(&self) -> Option<u8> {
        self.source.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.source.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let ch = self.source.get(self.pos).copied()?;
        self.pos += 1;
        if ch == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn eat(&mut self, expected: u8) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn current_span(&self) -> Span {
        Span::point(self.line, self.col)
    }

    fn span_from(&self, start_line: u32, start_col: u32) -> Span {
        Span::new(start_line, start_col, self.line, self.col)
    }

    fn emit_error(&mut self, code: ErrorCode, message: impl Into<String>, span: Span) {
        let source_line = self.source_file.line(span.start.line).unwrap_or("");
        let err = DslxError::new(&self.source_file.name, code, message, span, source_line);
        self.errors.push_error(err);
    }

    // ─────────────────────────────────────────────────────────────
    // Whitespace & comments
    // ─────────────────────────────────────────────────────────────

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(b' ' | b'\t' | b'\r' | b'\n') => {
                    self.advance();
                }
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    while let Some(ch) = self.peek() {
                        if ch == b'\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Scanning
    // ─────────────────────────────────────────────────────────────

    fn scan(&mut self) -> Token {
        loop {
            self.skip_trivia();
            let start_line = self.line;
            let start_col = self.col;
            let Some(ch) = self.advance() else {
                return Token::new(TokenKind::Eof, self.current_span());
            };

            let kind = match ch {
                b'"' => self.scan_string(start_line, start_col),
                b'0'..=b'9' => self.scan_number(ch, start_line, start_col),
                b'a'..=b'z' | b'A'..=b'Z' => self.scan_identifier(),
                b'_' => {
                    if matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == b'_') {
                        self.scan_identifier()
                    } else {
                        TokenKind::Underscore
                    }
                }

                b'+' => {
                    if self.eat(b'+') {
                        TokenKind::PlusPlus
                    } else if self.eat(b':') {
                        TokenKind::PlusColon
                    } else {
                        TokenKind::Plus
                    }
                }
                b'-' => {
                    if self.eat(b'>') {
                        TokenKind::Arrow
                    } else {
                        TokenKind::Minus
                    }
                }
                b'*' => TokenKind::Star,
                b'/' => TokenKind::Slash,
                b'%' => TokenKind::Percent,
                b'^' => TokenKind::Caret,
                b'&' => {
                    if self.eat(b'&') {
                        TokenKind::AmpAmp
                    } else {
                        TokenKind::Amp
                    }
                }
                b'|' => {
                    if self.eat(b'|') {
                        TokenKind::PipePipe
                    } else {
                        TokenKind::Pipe
                    }
                }
                b'!' => {
                    if self.eat(b'=') {
                        TokenKind::BangEq
                    } else {
                        TokenKind::Bang
                    }
                }
                b'=' => {
                    if self.eat(b'=') {
                        TokenKind::EqEq
                    } else if self.eat(b'>') {
                        TokenKind::FatArrow
                    } else {
                        TokenKind::Eq
                    }
                }
                b'<' => {
                    if self.eat(b'<') {
                        TokenKind::Shl
                    } else if self.eat(b'=') {
                        TokenKind::LtEq
                    } else {
                        TokenKind::Lt
                    }
                }
                b'>' => {
                    if self.eat(b'>') {
                        TokenKind::Shr
                    } else if self.eat(b'=') {
                        TokenKind::GtEq
                    } else {
                        TokenKind::Gt
                    }
                }
                b':' => {
                    if self.eat(b':') {
                        TokenKind::ColonColon
                    } else {
                        TokenKind::Colon
                    }
                }
                b'.' => {
                    if self.eat(b'.') {
                        if self.eat(b'.') {
                            TokenKind::Ellipsis
                        } else {
                            TokenKind::DotDot
                        }
                    } else {
                        TokenKind::Dot
                    }
                }
                b'(' => TokenKind::LParen,
                b')' => TokenKind::RParen,
                b'{' => TokenKind::LBrace,
                b'}' => TokenKind::RBrace,
                b'[' => TokenKind::LBracket,
                b']' => TokenKind::RBracket,
                b',' => TokenKind::Comma,
                b';' => TokenKind::Semi,
                b'#' => TokenKind::Hash,

                other => {
                    let span = self.span_from(start_line, start_col);
                    self.emit_error(
                        ErrorCode::UNEXPECTED_TOKEN,
                        format!("Unexpected character '{}'", other as char),
                        span,
                    );
                    if self.errors.total_errors >= MAX_ERRORS {
                        return Token::new(TokenKind::Eof, self.current_span());
                    }
                    continue;
                }
            };
            return Token::new(kind, self.span_from(start_line, start_col));
        }
    }

    fn text_from(&self, start: usize) -> &'src str {
        std::str::from_utf8(&self.source[start..self.pos]).unwrap_or("")
    }

    fn scan_identifier(&mut self) -> TokenKind {
        // First character was already consumed.
        let start = self.pos - 1;
        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == b'_' {
                self.advance();
            } else {
                break;
            }
        }
        let text = self.text_from(start);
        TokenKind::from_keyword(text).unwrap_or_else(|| TokenKind::Ident(text.to_string()))
    }

    fn scan_number(&mut self, first: u8, start_line: u32, start_col: u32) -> TokenKind {
        let radix = match (first, self.peek()) {
            (b'0', Some(b'x')) => 16,
            (b'0', Some(b'b')) => 2,
            _ => 10,
        };
        let start = if radix == 10 {
            self.pos - 1
        } else {
            self.advance();
            self.pos
        };
        while let Some(ch) = self.peek() {
            if ch.is_ascii_hexdigit() || ch == b'_' {
                // Hex digits only belong to hex literals.
                if radix != 16 && !ch.is_ascii_digit() && ch != b'_' {
                    break;
                }
                self.advance();
            } else {
                break;
            }
        }
        let digits: String = self.text_from(start).chars().filter(|c| *c != '_').collect();
        match u128::from_str_radix(&digits, radix) {
            Ok(value) => TokenKind::Number(value),
            Err(_) => {
                let span = self.span_from(start_line, start_col);
                self.emit_error(
                    ErrorCode::INVALID_LITERAL,
                    format!("Invalid number literal '{}'", self.text_from(start)),
                    span,
                );
                TokenKind::Number(0)
            }
        }
    }

    /// Scan a string literal; the opening `"` was already consumed.
    fn scan_string(&mut self, start_line: u32, start_col: u32) -> TokenKind {
        let mut buf = Vec::new();
        loop {
            match self.advance() {
                None | Some(b'\n') => {
                    let span = self.span_from(start_line, start_col);
                    self.emit_error(ErrorCode::UNCLOSED_DELIMITER, "Unterminated string literal", span);
                    return TokenKind::Str(String::from_utf8_lossy(&buf).into_owned());
                }
                Some(b'"') => return TokenKind::Str(String::from_utf8_lossy(&buf).into_owned()),
                Some(b'\\') => match self.advance() {
                    Some(b'n') => buf.push(b'\n'),
                    Some(b't') => buf.push(b'\t'),
                    Some(b'\\') => buf.push(b'\\'),
                    Some(b'"') => buf.push(b'"'),
                    other => {
                        let span = self.span_from(start_line, start_col);
                        let shown = other.map(|c| c as char).unwrap_or(' ');
                        self.emit_error(
                            ErrorCode::INVALID_LITERAL,
                            format!("Unknown escape sequence '\\{shown}'"),
                            span,
                        );
                    }
                },
                Some(ch) => buf.push(ch),
            }
        }
    }
}
