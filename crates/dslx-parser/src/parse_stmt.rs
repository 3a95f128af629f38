//! Block and statement parsing.

use dslx_lexer::token::TokenKind;
use dslx_types::ast::*;
use dslx_types::ErrorCode;

use crate::parser::Parser;

impl<'src> Parser<'src> {
    /// `{ stmt; ... [value] }` as an [`ExprKind::Block`] expression.
    pub(crate) fn parse_block_expr(&mut self) -> Option<ExprId> {
        let start = self.current_span();
        self.expect(&TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        let mut value = None;

        while !self.check(&TokenKind::RBrace) && !self.at_end() {
            if self.too_many_errors() {
                return None;
            }
            if self.check(&TokenKind::Let) {
                stmts.push(self.parse_let()?);
                continue;
            }
            let expr = self.parse_expression()?;
            if self.eat(&TokenKind::Semi) {
                stmts.push(Stmt::Expr(expr));
            } else if self.check(&TokenKind::RBrace) {
                value = Some(expr);
            } else if self.is_block_like(expr) {
                stmts.push(Stmt::Expr(expr));
            } else {
                self.error_at_current(
                    ErrorCode::UNEXPECTED_TOKEN,
                    format!("expected ';' or '}}', got '{}'", self.peek_kind()),
                );
                return None;
            }
        }
        self.expect(&TokenKind::RBrace)?;
        let span = self.span_since(start);
        Some(self.mk_expr(ExprKind::Block(Block { stmts, value }), span))
    }

    /// `let pattern[: T] = value;`
    fn parse_let(&mut self) -> Option<Stmt> {
        let start = self.current_span();
        self.expect(&TokenKind::Let)?;
        let pattern = self.parse_pattern()?;
        let annotation = if self.eat(&TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        self.expect(&TokenKind::Eq)?;
        let value = self.parse_expression()?;
        self.expect(&TokenKind::Semi)?;
        Some(Stmt::Let {
            pattern,
            annotation,
            value,
            span: self.span_since(start),
        })
    }

    fn is_block_like(&self, expr: ExprId) -> bool {
        matches!(
            self.module.expr(expr).kind,
            ExprKind::Block(_) | ExprKind::If { .. } | ExprKind::Match { .. } | ExprKind::For(_)
        )
    }
}
