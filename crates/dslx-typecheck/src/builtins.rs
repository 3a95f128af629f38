//! Builtin functions callable by name.
//!
//! `fail!`, `trace!` and `trace_fmt!` are macros and are handled by name at
//! their [`FormatMacro`](dslx_types::ast::ExprKind::FormatMacro) sites instead.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    AssertEq,
    AssertLt,
    Send,
    SendIf,
    Recv,
    RecvIf,
    RecvNonBlocking,
    Join,
    Update,
    Clz,
    Ctz,
    Rev,
    AndReduce,
    OrReduce,
    XorReduce,
    ArraySize,
    BitSliceUpdate,
    Signex,
    Map,
    Range,
}

impl Builtin {
    pub const ALL: &'static [Builtin] = &[
        Builtin::AssertEq,
        Builtin::AssertLt,
        Builtin::Send,
        Builtin::SendIf,
        Builtin::Recv,
        Builtin::RecvIf,
        Builtin::RecvNonBlocking,
        Builtin::Join,
        Builtin::Update,
        Builtin::Clz,
        Builtin::Ctz,
        Builtin::Rev,
        Builtin::AndReduce,
        Builtin::OrReduce,
        Builtin::XorReduce,
        Builtin::ArraySize,
        Builtin::BitSliceUpdate,
        Builtin::Signex,
        Builtin::Map,
        Builtin::Range,
    ];

    pub fn from_name(name: &str) -> Option<Builtin> {
        Builtin::ALL.iter().copied().find(|b| b.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::AssertEq => "assert_eq",
            Builtin::AssertLt => "assert_lt",
            Builtin::Send => "send",
            Builtin::SendIf => "send_if",
            Builtin::Recv => "recv",
            Builtin::RecvIf => "recv_if",
            Builtin::RecvNonBlocking => "recv_non_blocking",
            Builtin::Join => "join",
            Builtin::Update => "update",
            Builtin::Clz => "clz",
            Builtin::Ctz => "ctz",
            Builtin::Rev => "rev",
            Builtin::AndReduce => "and_reduce",
            Builtin::OrReduce => "or_reduce",
            Builtin::XorReduce => "xor_reduce",
            Builtin::ArraySize => "array_size",
            Builtin::BitSliceUpdate => "bit_slice_update",
            Builtin::Signex => "signex",
            Builtin::Map => "map",
            Builtin::Range => "range",
        }
    }

    /// Fixed argument count; `None` for variadic builtins (`join`).
    pub fn arity(self) -> Option<usize> {
        match self {
            Builtin::Join => None,
            Builtin::Clz
            | Builtin::Ctz
            | Builtin::Rev
            | Builtin::AndReduce
            | Builtin::OrReduce
            | Builtin::XorReduce
            | Builtin::ArraySize => Some(1),
            Builtin::AssertEq
            | Builtin::AssertLt
            | Builtin::Recv
            | Builtin::Signex
            | Builtin::Map
            | Builtin::Range => Some(2),
            Builtin::Send
            | Builtin::RecvNonBlocking
            | Builtin::Update
            | Builtin::BitSliceUpdate => Some(3),
            Builtin::SendIf | Builtin::RecvIf => Some(4),
        }
    }

    /// Channel operations: only legal inside proc `next` bodies.
    pub fn is_channel_op(self) -> bool {
        matches!(
            self,
            Builtin::Send
                | Builtin::SendIf
                | Builtin::Recv
                | Builtin::RecvIf
                | Builtin::RecvNonBlocking
        )
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_roundtrip() {
        for &b in Builtin::ALL {
            assert_eq!(Builtin::from_name(b.name()), Some(b));
        }
        assert_eq!(Builtin::from_name("assert"), None);
    }
}
