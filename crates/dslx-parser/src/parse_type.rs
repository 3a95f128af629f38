//! Type annotation parsing.
//!
//! ```text
//! Type      = BaseType { "[" Expr "]" }
//! BaseType  = "u1".."u128" | "s1".."s128" | "bool" | "token"
//!           | ("uN" | "sN" | "bits") "[" Expr "]"
//!           | "(" [ Type { "," Type } [","] ] ")"
//!           | "chan" ("in" | "out") Type
//!           | Ident
//! ```

use dslx_lexer::token::TokenKind;
use dslx_types::ast::*;
use dslx_types::ErrorCode;

use crate::parser::Parser;

/// Classify a builtin bits keyword: `u8` → `(false, Some(8))`, `uN` →
/// `(false, None)`. `None` for names that are not builtin bits types.
pub(crate) fn builtin_bits(name: &str) -> Option<(bool, Option<u32>)> {
    match name {
        "bool" => return Some((false, Some(1))),
        "uN" | "bits" => return Some((false, None)),
        "sN" => return Some((true, None)),
        _ => {}
    }
    let (signed, digits) = match name.as_bytes().first()? {
        b'u' => (false, &name[1..]),
        b's' => (true, &name[1..]),
        _ => return None,
    };
    if digits.is_empty() || digits.starts_with('0') || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let width: u32 = digits.parse().ok()?;
    Some((signed, Some(width)))
}

impl<'src> Parser<'src> {
    pub(crate) fn parse_type(&mut self) -> Option<TypeId> {
        let start = self.current_span();
        let mut ty = self.parse_base_type()?;
        while self.check(&TokenKind::LBracket) {
            self.advance();
            let size = self.parse_expression()?;
            self.expect(&TokenKind::RBracket)?;
            let span = self.span_since(start);
            ty = self.mk_type(TypeAnnotationKind::Array { element: ty, size }, span);
        }
        Some(ty)
    }

    fn parse_base_type(&mut self) -> Option<TypeId> {
        let start = self.current_span();
        match self.peek_kind().clone() {
            TokenKind::LParen => {
                self.advance();
                let items = self.parse_comma_list(&TokenKind::RParen, |p| p.parse_type())?;
                let span = self.span_since(start);
                Some(self.mk_type(TypeAnnotationKind::Tuple(items), span))
            }
            TokenKind::Chan => {
                self.advance();
                let direction = if self.eat(&TokenKind::In) {
                    ChannelDirection::In
                } else if self.check_word("out") {
                    self.advance();
                    ChannelDirection::Out
                } else {
                    self.error_at_current(
                        ErrorCode::UNEXPECTED_TOKEN,
                        format!("expected 'in' or 'out' after 'chan', got '{}'", self.peek_kind()),
                    );
                    return None;
                };
                let payload = self.parse_type()?;
                let span = self.span_since(start);
                Some(self.mk_type(TypeAnnotationKind::Channel { direction, payload }, span))
            }
            TokenKind::Ident(name) => {
                self.advance();
                if name == "token" {
                    return Some(self.mk_type(TypeAnnotationKind::Token, start));
                }
                match builtin_bits(&name) {
                    Some((signed, Some(width))) => Some(self.mk_type(
                        TypeAnnotationKind::Bits {
                            signed,
                            width: BitsWidth::Fixed(width),
                        },
                        start,
                    )),
                    Some((signed, None)) => {
                        self.expect(&TokenKind::LBracket)?;
                        let width = self.parse_expression()?;
                        self.expect(&TokenKind::RBracket)?;
                        let span = self.span_since(start);
                        Some(self.mk_type(
                            TypeAnnotationKind::Bits {
                                signed,
                                width: BitsWidth::Expr(width),
                            },
                            span,
                        ))
                    }
                    None => Some(self.mk_type(
                        TypeAnnotationKind::Named(Ident::new(name, start)),
                        start,
                    )),
                }
            }
            other => {
                self.error_at_current(
                    ErrorCode::UNEXPECTED_TOKEN,
                    format!("expected a type, got '{other}'"),
                );
                None
            }
        }
    }
}
