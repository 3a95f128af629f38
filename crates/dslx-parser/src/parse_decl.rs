//! Top-level item parsing: functions, procs, structs, enums, constants,
//! type aliases and the `#[test]` / `#![test_proc()]` attributes.

use dslx_lexer::token::TokenKind;
use dslx_types::ast::*;
use dslx_types::{ErrorCode, Span};

use crate::parser::Parser;

/// Attribute attached to the next item.
enum Attribute {
    Test,
    TestProc(TestProcAttr),
}

impl<'src> Parser<'src> {
    // ══════════════════════════════════════════════════════════════════════════
    // Module
    // ══════════════════════════════════════════════════════════════════════════

    pub(crate) fn parse_module(&mut self) {
        while !self.at_end() {
            if self.too_many_errors() {
                break;
            }
            if self.parse_item().is_none() {
                self.synchronize_item();
            }
        }
    }

    fn parse_item(&mut self) -> Option<()> {
        let attribute = if self.check(&TokenKind::Hash) {
            Some(self.parse_attribute()?)
        } else {
            None
        };
        let is_public = self.eat(&TokenKind::Pub);

        match (self.peek_kind().clone(), attribute) {
            (TokenKind::Fn, attr) => {
                let is_test = matches!(attr, Some(Attribute::Test));
                if let Some(Attribute::TestProc(a)) = attr {
                    self.error_at(
                        ErrorCode::UNKNOWN_ATTRIBUTE,
                        "'test_proc' attribute applies to procs only",
                        a.span,
                    );
                }
                let function = self.parse_function(is_public, is_test)?;
                let id = self.module.add_function(function);
                self.module.items.push(ModuleItem::Function(id));
            }
            (TokenKind::Proc, attr) => {
                let test_attr = match attr {
                    Some(Attribute::TestProc(a)) => Some(a),
                    Some(Attribute::Test) => {
                        self.error_at_current(
                            ErrorCode::UNKNOWN_ATTRIBUTE,
                            "use '#![test_proc()]' to mark a test proc",
                        );
                        None
                    }
                    None => None,
                };
                self.parse_proc(is_public, test_attr)?;
            }
            (kind, Some(_)) => {
                self.error_at_current(
                    ErrorCode::UNEXPECTED_TOKEN,
                    format!("expected 'fn' or 'proc' after attribute, got '{kind}'"),
                );
                return None;
            }
            (TokenKind::Struct, None) => self.parse_struct(is_public)?,
            (TokenKind::Enum, None) => self.parse_enum(is_public)?,
            (TokenKind::Const, None) => self.parse_const(is_public)?,
            (TokenKind::Type, None) => self.parse_type_alias()?,
            (other, None) => {
                self.error_at_current(
                    ErrorCode::UNEXPECTED_TOKEN,
                    format!("expected a module item, got '{other}'"),
                );
                self.advance();
                return None;
            }
        }
        Some(())
    }

    /// `#[test]` or `#![test_proc(init...)]`
    fn parse_attribute(&mut self) -> Option<Attribute> {
        let start = self.current_span();
        self.expect(&TokenKind::Hash)?;
        let inner = self.eat(&TokenKind::Bang);
        self.expect(&TokenKind::LBracket)?;
        let name = self.expect_identifier()?;
        let attribute = match (name.name.as_str(), inner) {
            ("test", false) => Attribute::Test,
            ("test_proc", true) => {
                self.expect(&TokenKind::LParen)?;
                let init = self.parse_comma_list(&TokenKind::RParen, |p| p.parse_expression())?;
                Attribute::TestProc(TestProcAttr {
                    init,
                    span: Span::fake(),
                })
            }
            (other, _) => {
                self.error_at(
                    ErrorCode::UNKNOWN_ATTRIBUTE,
                    format!("unknown attribute '{other}'"),
                    name.span,
                );
                return None;
            }
        };
        self.expect(&TokenKind::RBracket)?;
        Some(match attribute {
            Attribute::TestProc(mut a) => {
                a.span = self.span_since(start);
                Attribute::TestProc(a)
            }
            other => other,
        })
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Functions
    // ══════════════════════════════════════════════════════════════════════════

    fn parse_function(&mut self, is_public: bool, is_test: bool) -> Option<Function> {
        let start = self.current_span();
        self.expect(&TokenKind::Fn)?;
        let name = self.expect_identifier()?;
        let parametrics = self.parse_parametric_bindings()?;
        let params = self.parse_params()?;
        let return_type = if self.eat(&TokenKind::Arrow) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let body = self.parse_block_expr()?;
        Some(Function {
            name,
            parametrics,
            params,
            return_type,
            body,
            is_public,
            is_test,
            tag: FunctionTag::Normal,
            span: self.span_since(start),
        })
    }

    /// `<N: u32, M: u32 = {N + 1}>`; empty when no `<` follows.
    fn parse_parametric_bindings(&mut self) -> Option<Vec<ParametricBinding>> {
        if !self.eat(&TokenKind::Lt) {
            return Some(Vec::new());
        }
        self.parse_comma_list(&TokenKind::Gt, |p| {
            let start = p.current_span();
            let name = p.expect_identifier()?;
            p.expect(&TokenKind::Colon)?;
            let ty = p.parse_type()?;
            let default = if p.eat(&TokenKind::Eq) {
                p.expect(&TokenKind::LBrace)?;
                let e = p.parse_expression()?;
                p.expect(&TokenKind::RBrace)?;
                Some(e)
            } else {
                None
            };
            Some(ParametricBinding {
                name,
                ty,
                default,
                span: p.span_since(start),
            })
        })
    }

    /// `(name: T, ...)`
    fn parse_params(&mut self) -> Option<Vec<Param>> {
        self.expect(&TokenKind::LParen)?;
        self.parse_comma_list(&TokenKind::RParen, |p| p.parse_param())
    }

    fn parse_param(&mut self) -> Option<Param> {
        let start = self.current_span();
        let name = self.expect_identifier()?;
        self.expect(&TokenKind::Colon)?;
        let ty = self.parse_type()?;
        Some(Param {
            name,
            ty,
            span: self.span_since(start),
        })
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Procs
    // ══════════════════════════════════════════════════════════════════════════

    /// ```text
    /// proc Name<P: T> {
    ///   member: T;
    ///   config(params) { ... }
    ///   next(tok: token, state...) { ... }
    /// }
    /// ```
    fn parse_proc(&mut self, is_public: bool, test_attr: Option<TestProcAttr>) -> Option<()> {
        let start = self.current_span();
        self.expect(&TokenKind::Proc)?;
        let name = self.expect_identifier()?;
        let parametrics = self.parse_parametric_bindings()?;
        self.expect(&TokenKind::LBrace)?;

        let proc_id = ProcDeclId(self.module.procs.len() as u32);
        let mut members = Vec::new();
        let mut config = None;
        let mut next = None;

        while !self.check(&TokenKind::RBrace) && !self.at_end() {
            let section = self.current_span();
            match (self.peek_kind().clone(), self.look_ahead(1).clone()) {
                (TokenKind::Ident(word), TokenKind::LParen) if word == "config" || word == "next" => {
                    let is_config = word == "config";
                    self.advance();
                    let params = self.parse_params()?;
                    let body = self.parse_block_expr()?;
                    let tag = if is_config {
                        FunctionTag::ProcConfig(proc_id)
                    } else {
                        FunctionTag::ProcNext(proc_id)
                    };
                    let function = Function {
                        name: Ident::new(format!("{}.{word}", name.name), section),
                        parametrics: parametrics.clone(),
                        params,
                        return_type: None,
                        body,
                        is_public,
                        is_test: false,
                        tag,
                        span: self.span_since(section),
                    };
                    let slot = if is_config { &mut config } else { &mut next };
                    if slot.is_some() {
                        self.error_at(
                            ErrorCode::MALFORMED_PROC,
                            format!("proc '{}' defines '{word}' more than once", name.name),
                            section,
                        );
                    }
                    *slot = Some(function);
                }
                (TokenKind::Ident(_), TokenKind::Colon) => {
                    members.push(self.parse_param()?);
                    self.expect(&TokenKind::Semi)?;
                }
                (other, _) => {
                    self.error_at_current(
                        ErrorCode::MALFORMED_PROC,
                        format!("expected a member, 'config' or 'next' in proc body, got '{other}'"),
                    );
                    return None;
                }
            }
        }
        self.expect(&TokenKind::RBrace)?;
        let span = self.span_since(start);

        let (Some(config), Some(next)) = (config, next) else {
            self.error_at(
                ErrorCode::MALFORMED_PROC,
                format!("proc '{}' must define both 'config' and 'next'", name.name),
                span,
            );
            return None;
        };
        let config = self.module.add_function(config);
        let next = self.module.add_function(next);
        self.module.procs.push(ProcDecl {
            name,
            parametrics,
            members,
            config,
            next,
            is_public,
            test_attr,
            span,
        });
        self.module.items.push(ModuleItem::Proc(proc_id));
        Some(())
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Type definitions & constants
    // ══════════════════════════════════════════════════════════════════════════

    /// `struct Name { field: T, ... }`
    fn parse_struct(&mut self, is_public: bool) -> Option<()> {
        let start = self.current_span();
        self.expect(&TokenKind::Struct)?;
        let name = self.expect_identifier()?;
        self.expect(&TokenKind::LBrace)?;
        let fields = self.parse_comma_list(&TokenKind::RBrace, |p| p.parse_param())?;
        let id = StructId(self.module.structs.len() as u32);
        self.module.structs.push(StructDef {
            name,
            fields,
            is_public,
            span: self.span_since(start),
        });
        self.module.items.push(ModuleItem::Struct(id));
        Some(())
    }

    /// `enum Name : uW { A = 0, B = 1 }`
    fn parse_enum(&mut self, is_public: bool) -> Option<()> {
        let start = self.current_span();
        self.expect(&TokenKind::Enum)?;
        let name = self.expect_identifier()?;
        self.expect(&TokenKind::Colon)?;
        let underlying = self.parse_type()?;
        self.expect(&TokenKind::LBrace)?;
        let variants = self.parse_comma_list(&TokenKind::RBrace, |p| {
            let name = p.expect_identifier()?;
            p.expect(&TokenKind::Eq)?;
            let value = p.parse_expression()?;
            Some(EnumVariant { name, value })
        })?;
        let id = EnumId(self.module.enums.len() as u32);
        self.module.enums.push(EnumDef {
            name,
            underlying,
            variants,
            is_public,
            span: self.span_since(start),
        });
        self.module.items.push(ModuleItem::Enum(id));
        Some(())
    }

    /// `const NAME[: T] = expr;`
    fn parse_const(&mut self, is_public: bool) -> Option<()> {
        let start = self.current_span();
        self.expect(&TokenKind::Const)?;
        let name = self.expect_identifier()?;
        let annotation = if self.eat(&TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        self.expect(&TokenKind::Eq)?;
        let value = self.parse_expression()?;
        self.expect(&TokenKind::Semi)?;
        let id = ConstId(self.module.consts.len() as u32);
        self.module.consts.push(ConstDef {
            name,
            annotation,
            value,
            is_public,
            span: self.span_since(start),
        });
        self.module.items.push(ModuleItem::Const(id));
        Some(())
    }

    /// `type Alias = T;`
    fn parse_type_alias(&mut self) -> Option<()> {
        let start = self.current_span();
        self.expect(&TokenKind::Type)?;
        let name = self.expect_identifier()?;
        self.expect(&TokenKind::Eq)?;
        let ty = self.parse_type()?;
        self.expect(&TokenKind::Semi)?;
        let id = AliasId(self.module.aliases.len() as u32);
        self.module.aliases.push(TypeAlias {
            name,
            ty,
            span: self.span_since(start),
        });
        self.module.items.push(ModuleItem::Alias(id));
        Some(())
    }
}
