//! Semantic type representation.
//!
//! [`Type`] is the deduced type recorded for every expression and type
//! annotation. It is distinct from [`TypeAnnotation`](dslx_types::ast::TypeAnnotation),
//! the syntactic form produced by the parser.
//!
//! Dimensions (bit widths and array sizes) that depend on parametric values
//! stay [`Dim::Symbolic`]: they name the expression that computes them, and
//! the interpreter evaluates it under the active parametric bindings.

use dslx_types::ast::{ChannelDirection, EnumId, ExprId, ExprKind, FunctionId, Module, StructId};

use crate::builtins::Builtin;

// ══════════════════════════════════════════════════════════════════════════════
// Dim
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dim {
    Known(u64),
    /// Computed at run time by evaluating this expression.
    Symbolic(ExprId),
    /// Could not be determined (error recovery, or an unresolvable
    /// dependency on another function's parametrics).
    Unknown,
}

impl Dim {
    pub fn known(self) -> Option<u64> {
        match self {
            Dim::Known(n) => Some(n),
            _ => None,
        }
    }

    /// Known dims must agree; anything else is accepted.
    pub fn compatible(self, other: Dim) -> bool {
        match (self, other) {
            (Dim::Known(a), Dim::Known(b)) => a == b,
            _ => true,
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Type
// ══════════════════════════════════════════════════════════════════════════════

/// What a function-typed name refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Callee {
    User(FunctionId),
    Builtin(Builtin),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Bits { signed: bool, width: Dim },
    Array { element: Box<Type>, size: Dim },
    /// `()` is the empty tuple.
    Tuple(Vec<Type>),
    Struct(StructId),
    Enum(EnumId),
    Token,
    Channel {
        direction: ChannelDirection,
        payload: Box<Type>,
    },
    Function(Callee),
    /// Type could not be determined (error recovery); compatible with
    /// everything so one error does not cascade.
    Unknown,
}

impl Type {
    pub fn bits(signed: bool, width: u64) -> Type {
        Type::Bits {
            signed,
            width: Dim::Known(width),
        }
    }

    pub fn bool() -> Type {
        Type::bits(false, 1)
    }

    pub fn u32() -> Type {
        Type::bits(false, 32)
    }

    pub fn s32() -> Type {
        Type::bits(true, 32)
    }

    pub fn unit() -> Type {
        Type::Tuple(Vec::new())
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Type::Unknown)
    }

    /// Bits and enums: the types arithmetic, casts and literals apply to.
    pub fn is_bits_like(&self) -> bool {
        matches!(self, Type::Bits { .. } | Type::Enum(_))
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, Type::Tuple(items) if items.is_empty())
    }

    /// True when every dimension inside is [`Dim::Known`].
    pub fn is_concrete(&self) -> bool {
        match self {
            Type::Bits { width, .. } => matches!(width, Dim::Known(_)),
            Type::Array { element, size } => matches!(size, Dim::Known(_)) && element.is_concrete(),
            Type::Tuple(items) => items.iter().all(Type::is_concrete),
            Type::Channel { payload, .. } => payload.is_concrete(),
            Type::Unknown => false,
            Type::Struct(_) | Type::Enum(_) | Type::Token | Type::Function(_) => true,
        }
    }

    /// True when some dimension is [`Dim::Unknown`].
    pub fn has_unknown_dim(&self) -> bool {
        match self {
            Type::Bits { width, .. } => matches!(width, Dim::Unknown),
            Type::Array { element, size } => {
                matches!(size, Dim::Unknown) || element.has_unknown_dim()
            }
            Type::Tuple(items) => items.iter().any(Type::has_unknown_dim),
            Type::Channel { payload, .. } => payload.has_unknown_dim(),
            _ => false,
        }
    }

    /// Structural compatibility: identical shapes whose known dims agree.
    pub fn compatible(&self, other: &Type) -> bool {
        match (self, other) {
            (Type::Unknown, _) | (_, Type::Unknown) => true,
            (
                Type::Bits {
                    signed: s1,
                    width: w1,
                },
                Type::Bits {
                    signed: s2,
                    width: w2,
                },
            ) => s1 == s2 && w1.compatible(*w2),
            (
                Type::Array {
                    element: e1,
                    size: n1,
                },
                Type::Array {
                    element: e2,
                    size: n2,
                },
            ) => n1.compatible(*n2) && e1.compatible(e2),
            (Type::Tuple(a), Type::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.compatible(y))
            }
            (
                Type::Channel {
                    direction: d1,
                    payload: p1,
                },
                Type::Channel {
                    direction: d2,
                    payload: p2,
                },
            ) => d1 == d2 && p1.compatible(p2),
            (Type::Struct(a), Type::Struct(b)) => a == b,
            (Type::Enum(a), Type::Enum(b)) => a == b,
            (Type::Token, Type::Token) => true,
            (Type::Function(_), Type::Function(_)) => true,
            _ => false,
        }
    }

    /// Human-readable form for diagnostics: `uN[32]` renders as `u32`.
    pub fn render(&self, module: &Module) -> String {
        match self {
            Type::Bits { signed, width } => {
                let prefix = if *signed { 's' } else { 'u' };
                match width {
                    Dim::Known(w) => format!("{prefix}{w}"),
                    other => format!("{prefix}N[{}]", render_dim(*other, module)),
                }
            }
            Type::Array { element, size } => {
                format!("{}[{}]", element.render(module), render_dim(*size, module))
            }
            Type::Tuple(items) => {
                let inner: Vec<String> = items.iter().map(|t| t.render(module)).collect();
                if items.len() == 1 {
                    format!("({},)", inner[0])
                } else {
                    format!("({})", inner.join(", "))
                }
            }
            Type::Struct(id) => module.struct_def(*id).name.name.clone(),
            Type::Enum(id) => module.enum_def(*id).name.name.clone(),
            Type::Token => "token".to_string(),
            Type::Channel { direction, payload } => {
                format!("chan {direction} {}", payload.render(module))
            }
            Type::Function(Callee::User(id)) => format!("fn {}", module.function(*id).name.name),
            Type::Function(Callee::Builtin(b)) => format!("fn {}", b.name()),
            Type::Unknown => "<unknown>".to_string(),
        }
    }
}

fn render_dim(dim: Dim, module: &Module) -> String {
    match dim {
        Dim::Known(n) => n.to_string(),
        Dim::Symbolic(e) => match &module.expr(e).kind {
            ExprKind::Name(name) => name.clone(),
            _ => "<expr>".to_string(),
        },
        Dim::Unknown => "?".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbolic_dims_are_compatible_with_known() {
        let a = Type::Bits {
            signed: false,
            width: Dim::Symbolic(ExprId(3)),
        };
        assert!(a.compatible(&Type::u32()));
        assert!(!Type::u32().compatible(&Type::s32()));
        assert!(!Type::u32().compatible(&Type::bits(false, 8)));
    }

    #[test]
    fn test_unknown_is_compatible_with_everything() {
        assert!(Type::Unknown.compatible(&Type::Token));
        assert!(Type::unit().compatible(&Type::Unknown));
    }

    #[test]
    fn test_render() {
        let m = Module::new("test", "test.x");
        let t = Type::Tuple(vec![
            Type::Array {
                element: Box::new(Type::bits(false, 8)),
                size: Dim::Known(4),
            },
            Type::Token,
        ]);
        assert_eq!(t.render(&m), "(u8[4], token)");
        assert_eq!(Type::Tuple(vec![Type::bool()]).render(&m), "(u1,)");
    }

    #[test]
    fn test_concreteness() {
        assert!(Type::u32().is_concrete());
        let sym = Type::Array {
            element: Box::new(Type::u32()),
            size: Dim::Symbolic(ExprId(0)),
        };
        assert!(!sym.is_concrete());
        assert!(!sym.has_unknown_dim());
    }
}
