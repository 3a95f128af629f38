//! Expression parsing with full operator precedence.
//!
//! Precedence (lowest → highest):
//! 12. `..` (range)
//! 11. `||`
//! 10. `&&`
//!  9. `==`, `!=`, `<`, `>`, `<=`, `>=` (no chaining)
//!  8. `|`
//!  7. `^`
//!  6. `&`
//!  5. `<<`, `>>`
//!  4. `+`, `-`, `++`
//!  3. `*`, `/`, `%`
//!  2. `as` (cast)
//!  1. unary `!`, `-`
//!  0. postfix: call `()`, explicit parametrics `<..>()`, index/slice `[]`,
//!     field `.name`, tuple index `.N`

use dslx_lexer::token::TokenKind;
use dslx_types::ast::*;
use dslx_types::{ErrorCode, Span};

use crate::parse_type::builtin_bits;
use crate::parser::Parser;

impl<'src> Parser<'src> {
    // ══════════════════════════════════════════════════════════════════════════
    // Entry Point
    // ══════════════════════════════════════════════════════════════════════════

    pub(crate) fn parse_expression(&mut self) -> Option<ExprId> {
        let start = self.parse_logical_or()?;
        if self.eat(&TokenKind::DotDot) {
            let limit = self.parse_logical_or()?;
            let span = self.span_of(start).merge(self.span_of(limit));
            return Some(self.mk_expr(ExprKind::Range { start, limit }, span));
        }
        Some(start)
    }

    pub(crate) fn span_of(&self, id: ExprId) -> Span {
        self.module.expr(id).span
    }

    fn mk_binary(&mut self, op: BinOp, lhs: ExprId, rhs: ExprId) -> ExprId {
        let span = self.span_of(lhs).merge(self.span_of(rhs));
        self.mk_expr(ExprKind::Binary { op, lhs, rhs }, span)
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Precedence Chain
    // ══════════════════════════════════════════════════════════════════════════

    /// Parse a left-associative level: `Next { op Next }`.
    fn parse_left_assoc(
        &mut self,
        next: fn(&mut Self) -> Option<ExprId>,
        op_for: fn(&TokenKind) -> Option<BinOp>,
    ) -> Option<ExprId> {
        let mut lhs = next(self)?;
        while let Some(op) = op_for(self.peek_kind()) {
            self.advance();
            let rhs = next(self)?;
            lhs = self.mk_binary(op, lhs, rhs);
        }
        Some(lhs)
    }

    fn parse_logical_or(&mut self) -> Option<ExprId> {
        self.parse_left_assoc(Self::parse_logical_and, |k| {
            matches!(k, TokenKind::PipePipe).then_some(BinOp::LogicalOr)
        })
    }

    fn parse_logical_and(&mut self) -> Option<ExprId> {
        self.parse_left_assoc(Self::parse_comparison, |k| {
            matches!(k, TokenKind::AmpAmp).then_some(BinOp::LogicalAnd)
        })
    }

    /// Comparison operators do NOT chain: `a < b < c` is a parse error.
    fn parse_comparison(&mut self) -> Option<ExprId> {
        let lhs = self.parse_bit_or()?;
        let Some(op) = comparison_op(self.peek_kind()) else {
            return Some(lhs);
        };
        self.advance();
        let rhs = self.parse_bit_or()?;
        let expr = self.mk_binary(op, lhs, rhs);
        if comparison_op(self.peek_kind()).is_some() {
            self.error_at_current(
                ErrorCode::UNEXPECTED_TOKEN,
                "comparison operators cannot be chained; use parentheses",
            );
            return None;
        }
        Some(expr)
    }

    fn parse_bit_or(&mut self) -> Option<ExprId> {
        self.parse_left_assoc(Self::parse_bit_xor, |k| {
            matches!(k, TokenKind::Pipe).then_some(BinOp::BitOr)
        })
    }

    fn parse_bit_xor(&mut self) -> Option<ExprId> {
        self.parse_left_assoc(Self::parse_bit_and, |k| {
            matches!(k, TokenKind::Caret).then_some(BinOp::BitXor)
        })
    }

    fn parse_bit_and(&mut self) -> Option<ExprId> {
        self.parse_left_assoc(Self::parse_shift, |k| {
            matches!(k, TokenKind::Amp).then_some(BinOp::BitAnd)
        })
    }

    fn parse_shift(&mut self) -> Option<ExprId> {
        self.parse_left_assoc(Self::parse_additive, |k| match k {
            TokenKind::Shl => Some(BinOp::Shl),
            TokenKind::Shr => Some(BinOp::Shr),
            _ => None,
        })
    }

    fn parse_additive(&mut self) -> Option<ExprId> {
        self.parse_left_assoc(Self::parse_multiplicative, |k| match k {
            TokenKind::Plus => Some(BinOp::Add),
            TokenKind::Minus => Some(BinOp::Sub),
            TokenKind::PlusPlus => Some(BinOp::Concat),
            _ => None,
        })
    }

    fn parse_multiplicative(&mut self) -> Option<ExprId> {
        self.parse_left_assoc(Self::parse_cast, |k| match k {
            TokenKind::Star => Some(BinOp::Mul),
            TokenKind::Slash => Some(BinOp::Div),
            TokenKind::Percent => Some(BinOp::Mod),
            _ => None,
        })
    }

    /// `Unary { "as" Type }`
    fn parse_cast(&mut self) -> Option<ExprId> {
        let mut expr = self.parse_unary()?;
        while self.eat(&TokenKind::As) {
            let ty = self.parse_type()?;
            let span = self
                .span_of(expr)
                .merge(self.module.type_annotation(ty).span);
            expr = self.mk_expr(ExprKind::Cast { expr, ty }, span);
        }
        Some(expr)
    }

    fn parse_unary(&mut self) -> Option<ExprId> {
        let op = match self.peek_kind() {
            TokenKind::Bang => UnaryOp::Invert,
            TokenKind::Minus => UnaryOp::Negate,
            _ => return self.parse_postfix(),
        };
        let start = self.advance().span;
        let operand = self.parse_unary()?;
        let span = start.merge(self.span_of(operand));
        Some(self.mk_expr(ExprKind::Unary { op, operand }, span))
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Postfix
    // ══════════════════════════════════════════════════════════════════════════

    fn parse_postfix(&mut self) -> Option<ExprId> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek_kind() {
                TokenKind::LParen => {
                    expr = self.parse_invocation(expr, Vec::new())?;
                }
                TokenKind::Lt
                    if matches!(self.module.expr(expr).kind, ExprKind::Name(_))
                        && self.at_parametric_call() =>
                {
                    let parametrics = self.parse_parametric_args()?;
                    expr = self.parse_invocation(expr, parametrics)?;
                }
                TokenKind::LBracket => {
                    expr = self.parse_index(expr)?;
                }
                TokenKind::Dot => {
                    self.advance();
                    match self.peek_kind().clone() {
                        TokenKind::Number(n) => {
                            self.advance();
                            let span = self.span_of(expr).merge(self.previous_span());
                            expr = self.mk_expr(
                                ExprKind::TupleIndex {
                                    lhs: expr,
                                    index: n as u32,
                                },
                                span,
                            );
                        }
                        _ => {
                            let field = self.expect_identifier()?;
                            let span = self.span_of(expr).merge(field.span);
                            expr = self.mk_expr(ExprKind::FieldAccess { lhs: expr, field }, span);
                        }
                    }
                }
                _ => return Some(expr),
            }
        }
    }

    /// `callee(args)`; the current token is `(`.
    fn parse_invocation(&mut self, callee: ExprId, parametrics: Vec<ExprId>) -> Option<ExprId> {
        let open = self.current_span();
        self.expect(&TokenKind::LParen)?;
        let args = self.parse_comma_list(&TokenKind::RParen, |p| p.parse_expression())?;
        let args_span = self.span_since(open);
        let span = self.span_of(callee).merge(args_span);
        Some(self.mk_expr(
            ExprKind::Invocation(Invocation {
                callee,
                parametrics,
                args,
                args_span,
            }),
            span,
        ))
    }

    /// Decide whether the `<` at the cursor opens an explicit parametric list
    /// (`f<u32:8>(x)`) rather than a comparison.
    fn at_parametric_call(&self) -> bool {
        let mut brace_depth = 0usize;
        let mut i = 1;
        loop {
            match self.look_ahead(i) {
                TokenKind::Eof | TokenKind::Semi => return false,
                TokenKind::LBrace => brace_depth += 1,
                TokenKind::RBrace => {
                    if brace_depth == 0 {
                        return false;
                    }
                    brace_depth -= 1;
                }
                _ if brace_depth > 0 => {}
                TokenKind::Gt => return matches!(self.look_ahead(i + 1), TokenKind::LParen),
                TokenKind::Ident(_)
                | TokenKind::Number(_)
                | TokenKind::Colon
                | TokenKind::ColonColon
                | TokenKind::Comma
                | TokenKind::Minus
                | TokenKind::LBracket
                | TokenKind::RBracket
                | TokenKind::True
                | TokenKind::False => {}
                _ => return false,
            }
            i += 1;
        }
    }

    /// `<arg, ...>` where each arg is a primary or `{expr}`.
    pub(crate) fn parse_parametric_args(&mut self) -> Option<Vec<ExprId>> {
        self.expect(&TokenKind::Lt)?;
        self.parse_comma_list(&TokenKind::Gt, |p| {
            if p.eat(&TokenKind::LBrace) {
                let e = p.parse_expression()?;
                p.expect(&TokenKind::RBrace)?;
                Some(e)
            } else {
                p.parse_primary()
            }
        })
    }

    /// `x[i]`, `x[lo:hi]`, `x[:hi]`, `x[lo:]`, `x[start +: uW]`
    fn parse_index(&mut self, lhs: ExprId) -> Option<ExprId> {
        self.expect(&TokenKind::LBracket)?;
        let kind = if self.eat(&TokenKind::Colon) {
            let limit = self.parse_optional_slice_bound()?;
            ExprKind::Slice {
                lhs,
                start: None,
                limit,
            }
        } else {
            let first = self.parse_expression()?;
            if self.eat(&TokenKind::Colon) {
                let limit = self.parse_optional_slice_bound()?;
                ExprKind::Slice {
                    lhs,
                    start: Some(first),
                    limit,
                }
            } else if self.eat(&TokenKind::PlusColon) {
                let width = self.parse_type()?;
                ExprKind::WidthSlice {
                    lhs,
                    start: first,
                    width,
                }
            } else {
                ExprKind::Index { lhs, index: first }
            }
        };
        self.expect(&TokenKind::RBracket)?;
        let span = self.span_of(lhs).merge(self.previous_span());
        Some(self.mk_expr(kind, span))
    }

    fn parse_optional_slice_bound(&mut self) -> Option<Option<ExprId>> {
        if self.check(&TokenKind::RBracket) {
            Some(None)
        } else {
            Some(Some(self.parse_expression()?))
        }
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Primary
    // ══════════════════════════════════════════════════════════════════════════

    pub(crate) fn parse_primary(&mut self) -> Option<ExprId> {
        let start = self.current_span();
        match self.peek_kind().clone() {
            TokenKind::Number(value) => {
                self.advance();
                Some(self.mk_expr(
                    ExprKind::Number {
                        value,
                        negative: false,
                        annotation: None,
                    },
                    start,
                ))
            }
            TokenKind::True | TokenKind::False => {
                let value = self.check(&TokenKind::True);
                self.advance();
                Some(self.mk_expr(ExprKind::Bool(value), start))
            }
            TokenKind::Ident(name) => self.parse_identifier_expr(name),
            TokenKind::LParen => self.parse_paren_or_tuple(),
            TokenKind::LBracket => self.parse_array_literal(None, start),
            TokenKind::LBrace => self.parse_block_expr(),
            TokenKind::If => self.parse_if(),
            TokenKind::Match => self.parse_match(),
            TokenKind::For => self.parse_for(),
            TokenKind::Spawn => self.parse_spawn(),
            TokenKind::Chan => {
                self.advance();
                let payload = if self.eat(&TokenKind::Lt) {
                    let ty = self.parse_type()?;
                    self.expect(&TokenKind::Gt)?;
                    ty
                } else {
                    self.parse_type()?
                };
                let span = self.span_since(start);
                Some(self.mk_expr(ExprKind::Channel { payload }, span))
            }
            other => {
                self.error_at_current(
                    ErrorCode::UNEXPECTED_TOKEN,
                    format!("expected an expression, got '{other}'"),
                );
                None
            }
        }
    }

    fn parse_identifier_expr(&mut self, name: String) -> Option<ExprId> {
        let start = self.current_span();

        // `u32:42`, `uN[8]:3`, `u32[2]:[1, 2]`
        if builtin_bits(&name).is_some()
            && matches!(self.look_ahead(1), TokenKind::Colon | TokenKind::LBracket)
        {
            return self.parse_typed_literal();
        }

        match self.look_ahead(1).clone() {
            TokenKind::ColonColon => {
                let subject = self.expect_identifier()?;
                self.advance();
                let member = self.expect_identifier()?;
                let span = self.span_since(start);
                Some(self.mk_expr(ExprKind::ColonRef { subject, member }, span))
            }
            TokenKind::Bang if matches!(self.look_ahead(2), TokenKind::LParen) => {
                self.parse_macro()
            }
            TokenKind::LBrace if self.at_struct_instance() => self.parse_struct_instance(),
            _ => {
                self.advance();
                Some(self.mk_expr(ExprKind::Name(name), start))
            }
        }
    }

    /// `Name { field: ...` or `Name { ..base }`; anything else after a name
    /// is a block (e.g. the body of an `if`).
    fn at_struct_instance(&self) -> bool {
        match (self.look_ahead(2), self.look_ahead(3)) {
            // `{ u32:1 ...` opens a block holding a typed literal.
            (TokenKind::Ident(field), TokenKind::Colon) => builtin_bits(field).is_none(),
            (TokenKind::DotDot, _) => true,
            _ => false,
        }
    }

    fn parse_struct_instance(&mut self) -> Option<ExprId> {
        let start = self.current_span();
        let name = self.expect_identifier()?;
        self.expect(&TokenKind::LBrace)?;
        let mut fields = Vec::new();
        let mut base = None;
        while !self.check(&TokenKind::RBrace) && !self.at_end() {
            if self.eat(&TokenKind::DotDot) {
                base = Some(self.parse_expression()?);
                break;
            }
            let field = self.expect_identifier()?;
            self.expect(&TokenKind::Colon)?;
            let value = self.parse_expression()?;
            fields.push((field, value));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace)?;
        let span = self.span_since(start);
        Some(self.mk_expr(ExprKind::StructInstance { name, fields, base }, span))
    }

    /// A literal with a leading type: `u32:42`, `s8:-1`, `u32[3]:[1, 2, 3]`.
    fn parse_typed_literal(&mut self) -> Option<ExprId> {
        let start = self.current_span();
        let annotation = self.parse_type()?;
        self.expect(&TokenKind::Colon)?;
        if self.check(&TokenKind::LBracket) {
            return self.parse_array_literal(Some(annotation), start);
        }
        let negative = self.eat(&TokenKind::Minus);
        let value = match self.peek_kind().clone() {
            TokenKind::Number(value) => value,
            TokenKind::True => 1,
            TokenKind::False => 0,
            other => {
                self.error_at_current(
                    ErrorCode::INVALID_LITERAL,
                    format!("expected a number after type annotation, got '{other}'"),
                );
                return None;
            }
        };
        self.advance();
        let span = self.span_since(start);
        Some(self.mk_expr(
            ExprKind::Number {
                value,
                negative,
                annotation: Some(annotation),
            },
            span,
        ))
    }

    /// `[a, b, c]` or `[a, b, ...]`; the cursor is on `[`.
    fn parse_array_literal(&mut self, annotation: Option<TypeId>, start: Span) -> Option<ExprId> {
        self.expect(&TokenKind::LBracket)?;
        let mut elements = Vec::new();
        let mut has_ellipsis = false;
        while !self.check(&TokenKind::RBracket) && !self.at_end() {
            if self.eat(&TokenKind::Ellipsis) {
                has_ellipsis = true;
                break;
            }
            elements.push(self.parse_expression()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBracket)?;
        let span = self.span_since(start);
        if has_ellipsis && elements.is_empty() {
            self.error_at(
                ErrorCode::INVALID_LITERAL,
                "'...' must follow at least one array element",
                span,
            );
            return None;
        }
        Some(self.mk_expr(
            ExprKind::Array {
                annotation,
                elements,
                has_ellipsis,
            },
            span,
        ))
    }

    /// `()`, `(e)`, `(e,)`, `(a, b)`
    fn parse_paren_or_tuple(&mut self) -> Option<ExprId> {
        let start = self.current_span();
        self.expect(&TokenKind::LParen)?;
        if self.eat(&TokenKind::RParen) {
            let span = self.span_since(start);
            return Some(self.mk_expr(ExprKind::Tuple(Vec::new()), span));
        }
        let first = self.parse_expression()?;
        if self.eat(&TokenKind::RParen) {
            return Some(first);
        }
        self.expect(&TokenKind::Comma)?;
        let mut elements = vec![first];
        elements.extend(self.parse_comma_list(&TokenKind::RParen, |p| p.parse_expression())?);
        let span = self.span_since(start);
        Some(self.mk_expr(ExprKind::Tuple(elements), span))
    }

    /// `name!(...)`: `trace_fmt!("fmt", args)`, `trace!(x)`, `fail!()`.
    fn parse_macro(&mut self) -> Option<ExprId> {
        let start = self.current_span();
        let name = self.expect_identifier()?;
        self.expect(&TokenKind::Bang)?;
        let open = self.current_span();
        self.expect(&TokenKind::LParen)?;
        let mut format = String::new();
        if let TokenKind::Str(s) = self.peek_kind().clone() {
            self.advance();
            format = s;
            if !self.check(&TokenKind::RParen) {
                self.expect(&TokenKind::Comma)?;
            }
        }
        let args = self.parse_comma_list(&TokenKind::RParen, |p| p.parse_expression())?;
        let args_span = self.span_since(open);
        let span = self.span_since(start);
        Some(self.mk_expr(
            ExprKind::FormatMacro {
                name,
                format,
                args,
                args_span,
            },
            span,
        ))
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Control flow
    // ══════════════════════════════════════════════════════════════════════════

    /// `if c { .. } [else if .. | else { .. }]`
    fn parse_if(&mut self) -> Option<ExprId> {
        let start = self.current_span();
        self.expect(&TokenKind::If)?;
        let cond = self.parse_expression()?;
        let then_block = self.parse_block_expr()?;
        let else_branch = if self.eat(&TokenKind::Else) {
            if self.check(&TokenKind::If) {
                Some(self.parse_if()?)
            } else {
                Some(self.parse_block_expr()?)
            }
        } else {
            None
        };
        let span = self.span_since(start);
        Some(self.mk_expr(
            ExprKind::If {
                cond,
                then_block,
                else_branch,
            },
            span,
        ))
    }

    /// `match e { p | q => body, _ => body }`
    fn parse_match(&mut self) -> Option<ExprId> {
        let start = self.current_span();
        self.expect(&TokenKind::Match)?;
        let subject = self.parse_expression()?;
        self.expect(&TokenKind::LBrace)?;
        let mut arms = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_end() {
            let arm_start = self.current_span();
            let mut patterns = vec![self.parse_pattern()?];
            while self.eat(&TokenKind::Pipe) {
                patterns.push(self.parse_pattern()?);
            }
            self.expect(&TokenKind::FatArrow)?;
            let body = self.parse_expression()?;
            let block_like = matches!(self.module.expr(body).kind, ExprKind::Block(_));
            arms.push(MatchArm {
                patterns,
                body,
                span: self.span_since(arm_start),
            });
            if !self.eat(&TokenKind::Comma) && !block_like {
                break;
            }
        }
        self.expect(&TokenKind::RBrace)?;
        let span = self.span_since(start);
        Some(self.mk_expr(ExprKind::Match { subject, arms }, span))
    }

    /// `for (i, acc)[: (T, U)] in iterable { body }(init)`
    fn parse_for(&mut self) -> Option<ExprId> {
        let start = self.current_span();
        self.expect(&TokenKind::For)?;
        let pattern = self.parse_pattern()?;
        let annotation = if self.eat(&TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        self.expect(&TokenKind::In)?;
        let iterable = self.parse_expression()?;
        let body = self.parse_block_expr()?;
        self.expect(&TokenKind::LParen)?;
        let init = self.parse_expression()?;
        self.expect(&TokenKind::RParen)?;
        let span = self.span_since(start);
        Some(self.mk_expr(
            ExprKind::For(Box::new(ForLoop {
                pattern,
                annotation,
                iterable,
                body,
                init,
            })),
            span,
        ))
    }

    /// `spawn P[<params>](config_args)(next_args)`
    fn parse_spawn(&mut self) -> Option<ExprId> {
        let start = self.current_span();
        self.expect(&TokenKind::Spawn)?;
        let proc_name = self.expect_identifier()?;
        let parametrics = if self.check(&TokenKind::Lt) {
            self.parse_parametric_args()?
        } else {
            Vec::new()
        };
        let open = self.current_span();
        self.expect(&TokenKind::LParen)?;
        let config_args = self.parse_comma_list(&TokenKind::RParen, |p| p.parse_expression())?;
        let args_span = self.span_since(open);
        self.expect(&TokenKind::LParen)?;
        let next_args = self.parse_comma_list(&TokenKind::RParen, |p| p.parse_expression())?;
        let span = self.span_since(start);
        Some(self.mk_expr(
            ExprKind::Spawn(Spawn {
                proc_name,
                parametrics,
                config_args,
                next_args,
                args_span,
            }),
            span,
        ))
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Patterns
    // ══════════════════════════════════════════════════════════════════════════

    pub(crate) fn parse_pattern(&mut self) -> Option<Pattern> {
        let start = self.current_span();
        let kind = match self.peek_kind().clone() {
            TokenKind::Underscore => {
                self.advance();
                PatternKind::Wildcard
            }
            TokenKind::LParen => {
                self.advance();
                PatternKind::Tuple(self.parse_comma_list(&TokenKind::RParen, |p| p.parse_pattern())?)
            }
            TokenKind::Number(_) | TokenKind::True | TokenKind::False | TokenKind::Minus => {
                PatternKind::Literal(self.parse_unary()?)
            }
            TokenKind::Ident(name) => {
                let typed_literal = builtin_bits(&name).is_some()
                    && matches!(self.look_ahead(1), TokenKind::Colon | TokenKind::LBracket);
                if typed_literal {
                    PatternKind::Literal(self.parse_typed_literal()?)
                } else if matches!(self.look_ahead(1), TokenKind::ColonColon) {
                    PatternKind::ColonRef(self.parse_primary()?)
                } else {
                    let span = self.advance().span;
                    PatternKind::Name(Ident::new(name, span))
                }
            }
            other => {
                self.error_at_current(
                    ErrorCode::UNEXPECTED_TOKEN,
                    format!("expected a pattern, got '{other}'"),
                );
                return None;
            }
        };
        Some(Pattern {
            kind,
            span: self.span_since(start),
        })
    }
}

fn comparison_op(kind: &TokenKind) -> Option<BinOp> {
    match kind {
        TokenKind::EqEq => Some(BinOp::Eq),
        TokenKind::BangEq => Some(BinOp::Ne),
        TokenKind::Lt => Some(BinOp::Lt),
        TokenKind::LtEq => Some(BinOp::Le),
        TokenKind::Gt => Some(BinOp::Gt),
        TokenKind::GtEq => Some(BinOp::Ge),
        _ => None,
    }
}
