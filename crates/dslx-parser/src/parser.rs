//! Core parser infrastructure: token cursor, error reporting, helpers.

use dslx_lexer::token::{Token, TokenKind};
use dslx_types::ast::{ExprId, ExprKind, Ident, Module, TypeAnnotationKind, TypeId};
use dslx_types::{CompileErrors, DslxError, ErrorCode, SourceFile, Span, MAX_ERRORS};

/// The DSLX parser.
///
/// Consumes a token stream produced by the lexer and builds a [`Module`]
/// arena. Collects errors and attempts recovery at item and statement
/// boundaries.
pub struct Parser<'src> {
    tokens: Vec<Token>,
    pos: usize,
    source_file: &'src SourceFile,
    errors: CompileErrors,
    /// Returned by `peek` once the cursor runs past the stream.
    eof: Token,
    pub(crate) module: Module,
}

/// Result of parsing. The module is always produced; callers must check
/// `errors` before trusting it.
pub struct ParseResult {
    pub module: Module,
    pub errors: CompileErrors,
}

impl<'src> Parser<'src> {
    pub fn new(
        tokens: Vec<Token>,
        source_file: &'src SourceFile,
        module_name: impl Into<String>,
    ) -> Self {
        let eof_span = tokens.last().map(|t| t.span).unwrap_or_else(|| Span::point(1, 1));
        Self {
            tokens,
            pos: 0,
            source_file,
            errors: CompileErrors::empty(),
            eof: Token::new(TokenKind::Eof, eof_span),
            module: Module::new(module_name, source_file.name.clone()),
        }
    }

    // ── Token Cursor ──────────────────────────────────────────────────────────

    pub(crate) fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&self.eof)
    }

    pub(crate) fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    pub(crate) fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    pub(crate) fn previous_span(&self) -> Span {
        if self.pos > 0 {
            self.tokens[self.pos - 1].span
        } else {
            Span::point(1, 1)
        }
    }

    pub(crate) fn current_span(&self) -> Span {
        self.peek().span
    }

    pub(crate) fn at_end(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    pub(crate) fn check(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    pub(crate) fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Look ahead by `n` tokens from the current position.
    pub(crate) fn look_ahead(&self, n: usize) -> &TokenKind {
        self.tokens
            .get(self.pos + n)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    /// Span from `start` through the last consumed token.
    pub(crate) fn span_since(&self, start: Span) -> Span {
        Span {
            start: start.start,
            limit: self.previous_span().limit,
        }
    }

    // ── Expect Helpers ────────────────────────────────────────────────────────

    pub(crate) fn expect(&mut self, expected: &TokenKind) -> Option<Token> {
        if self.check(expected) {
            Some(self.advance())
        } else {
            let code = match expected {
                TokenKind::RParen | TokenKind::RBrace | TokenKind::RBracket => {
                    ErrorCode::UNCLOSED_DELIMITER
                }
                _ => ErrorCode::UNEXPECTED_TOKEN,
            };
            self.error_at_current(
                code,
                format!("expected '{}', got '{}'", expected, self.peek_kind()),
            );
            None
        }
    }

    pub(crate) fn expect_identifier(&mut self) -> Option<Ident> {
        match self.peek_kind().clone() {
            TokenKind::Ident(name) => {
                let span = self.advance().span;
                Some(Ident::new(name, span))
            }
            _ => {
                self.error_at_current(
                    ErrorCode::UNEXPECTED_TOKEN,
                    format!("expected identifier, got '{}'", self.peek_kind()),
                );
                None
            }
        }
    }

    /// Expect a specific contextual word such as `config` or `next`.
    pub(crate) fn expect_word(&mut self, word: &str) -> Option<Span> {
        match self.peek_kind() {
            TokenKind::Ident(name) if name == word => Some(self.advance().span),
            other => {
                let message = format!("expected '{word}', got '{other}'");
                self.error_at_current(ErrorCode::UNEXPECTED_TOKEN, message);
                None
            }
        }
    }

    pub(crate) fn check_word(&self, word: &str) -> bool {
        matches!(self.peek_kind(), TokenKind::Ident(name) if name == word)
    }

    /// Parse `item (, item)* [,]` up to (and consuming) `close`.
    pub(crate) fn parse_comma_list<T>(
        &mut self,
        close: &TokenKind,
        mut item: impl FnMut(&mut Self) -> Option<T>,
    ) -> Option<Vec<T>> {
        let mut items = Vec::new();
        while !self.check(close) && !self.at_end() {
            items.push(item(self)?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(close)?;
        Some(items)
    }

    // ── Arena helpers ─────────────────────────────────────────────────────────

    pub(crate) fn mk_expr(&mut self, kind: ExprKind, span: Span) -> ExprId {
        self.module.add_expr(kind, span)
    }

    pub(crate) fn mk_type(&mut self, kind: TypeAnnotationKind, span: Span) -> TypeId {
        self.module.add_type(kind, span)
    }

    // ── Error Reporting ───────────────────────────────────────────────────────

    pub(crate) fn error_at_current(&mut self, code: ErrorCode, message: impl Into<String>) {
        let span = self.current_span();
        self.error_at(code, message, span);
    }

    pub(crate) fn error_at(&mut self, code: ErrorCode, message: impl Into<String>, span: Span) {
        let source_line = self.source_file.line(span.start.line).unwrap_or("");
        let error = DslxError::new(&self.source_file.name, code, message, span, source_line);
        self.errors.push_error(error);
    }

    pub(crate) fn too_many_errors(&self) -> bool {
        self.errors.total_errors >= MAX_ERRORS
    }

    // ── Synchronization ───────────────────────────────────────────────────────

    /// Skip to the start of the next top-level item.
    pub(crate) fn synchronize_item(&mut self) {
        let mut depth = 0usize;
        while !self.at_end() {
            match self.peek_kind() {
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        self.advance();
                        return;
                    }
                }
                TokenKind::Fn
                | TokenKind::Proc
                | TokenKind::Pub
                | TokenKind::Struct
                | TokenKind::Enum
                | TokenKind::Const
                | TokenKind::Type
                | TokenKind::Hash
                    if depth == 0 =>
                {
                    return;
                }
                _ => {}
            }
            self.advance();
        }
    }

    // ── Public API ────────────────────────────────────────────────────────────

    /// Parse the token stream into a [`Module`].
    pub fn parse(mut self) -> ParseResult {
        self.parse_module();
        ParseResult {
            module: self.module,
            errors: self.errors,
        }
    }
}
