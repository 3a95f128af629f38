//! Runtime values and their concrete types.
//!
//! Values are immutable; every operation builds a new one. Equality is
//! structural and sensitive to bit width and signedness, so `u32:1` and
//! `u8:1` are different values.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use dslx_typecheck::Builtin;
use dslx_types::ast::{ChannelDirection, FunctionId};
use serde::{Serialize, Serializer};

/// Widest bit-vector the value model represents.
pub const MAX_BITS_WIDTH: u32 = 128;

// ══════════════════════════════════════════════════════════════════════════════
// Bits
// ══════════════════════════════════════════════════════════════════════════════

/// A fixed-width bit-vector. The payload is always masked to `width` bits;
/// signed values are stored in two's complement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bits {
    signed: bool,
    width: u32,
    value: u128,
}

fn mask(width: u32) -> u128 {
    if width >= MAX_BITS_WIDTH {
        u128::MAX
    } else {
        (1u128 << width) - 1
    }
}

impl Bits {
    /// Build from a raw pattern; bits above `width` are dropped.
    pub fn new(signed: bool, width: u32, raw: u128) -> Self {
        Self {
            signed,
            width,
            value: raw & mask(width),
        }
    }

    pub fn unsigned(width: u32, value: u128) -> Self {
        Self::new(false, width, value)
    }

    pub fn signed(width: u32, value: i128) -> Self {
        Self::new(true, width, value as u128)
    }

    pub fn from_bool(b: bool) -> Self {
        Self::unsigned(1, u128::from(b))
    }

    pub fn u32(value: u32) -> Self {
        Self::unsigned(32, u128::from(value))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn is_signed(&self) -> bool {
        self.signed
    }

    /// The raw (zero-extended) bit pattern.
    pub fn raw(&self) -> u128 {
        self.value
    }

    /// The numeric value, sign-extended for signed types.
    pub fn to_i128(&self) -> i128 {
        if self.signed && self.width > 0 && self.width < MAX_BITS_WIDTH {
            let shift = MAX_BITS_WIDTH - self.width;
            ((self.value << shift) as i128) >> shift
        } else {
            self.value as i128
        }
    }

    pub fn to_u64(&self) -> Option<u64> {
        if self.signed && self.to_i128() < 0 {
            return None;
        }
        u64::try_from(self.value).ok()
    }

    pub fn is_true(&self) -> bool {
        self.value != 0
    }

    pub fn is_negative(&self) -> bool {
        self.signed && self.to_i128() < 0
    }

    fn with(&self, raw: u128) -> Self {
        Self::new(self.signed, self.width, raw)
    }

    // ── Arithmetic ───────────────────────────────────────────────────────

    pub fn add(&self, rhs: &Bits) -> Bits {
        self.with(self.value.wrapping_add(rhs.value))
    }

    pub fn sub(&self, rhs: &Bits) -> Bits {
        self.with(self.value.wrapping_sub(rhs.value))
    }

    pub fn mul(&self, rhs: &Bits) -> Bits {
        self.with(self.value.wrapping_mul(rhs.value))
    }

    /// Division never traps: unsigned `x / 0` is all ones; signed `x / 0` is
    /// the most positive value for `x >= 0` and the most negative otherwise.
    pub fn div(&self, rhs: &Bits) -> Bits {
        if rhs.value == 0 {
            return match (self.signed, self.is_negative()) {
                (false, _) => self.with(u128::MAX),
                (true, false) => self.with(mask(self.width) >> 1),
                (true, true) => self.with(1u128 << self.width.saturating_sub(1)),
            };
        }
        if self.signed {
            self.with(self.to_i128().wrapping_div(rhs.to_i128()) as u128)
        } else {
            self.with(self.value / rhs.value)
        }
    }

    /// `x % 0` is zero.
    pub fn rem(&self, rhs: &Bits) -> Bits {
        if rhs.value == 0 {
            return self.with(0);
        }
        if self.signed {
            self.with(self.to_i128().wrapping_rem(rhs.to_i128()) as u128)
        } else {
            self.with(self.value % rhs.value)
        }
    }

    pub fn neg(&self) -> Bits {
        self.with(self.value.wrapping_neg())
    }

    // ── Bitwise ──────────────────────────────────────────────────────────

    pub fn not(&self) -> Bits {
        self.with(!self.value)
    }

    pub fn and(&self, rhs: &Bits) -> Bits {
        self.with(self.value & rhs.value)
    }

    pub fn or(&self, rhs: &Bits) -> Bits {
        self.with(self.value | rhs.value)
    }

    pub fn xor(&self, rhs: &Bits) -> Bits {
        self.with(self.value ^ rhs.value)
    }

    pub fn shl(&self, amount: u128) -> Bits {
        if amount >= u128::from(self.width) {
            return self.with(0);
        }
        self.with(self.value << amount)
    }

    /// Logical for unsigned values, arithmetic for signed ones.
    pub fn shr(&self, amount: u128) -> Bits {
        if amount >= u128::from(self.width) {
            let fill = if self.is_negative() { u128::MAX } else { 0 };
            return self.with(fill);
        }
        if self.signed {
            self.with((self.to_i128() >> amount) as u128)
        } else {
            self.with(self.value >> amount)
        }
    }

    /// Numeric ordering; signed types compare as two's complement.
    pub fn compare(&self, rhs: &Bits) -> Ordering {
        if self.signed {
            self.to_i128().cmp(&rhs.to_i128())
        } else {
            self.value.cmp(&rhs.value)
        }
    }

    /// `self ++ rhs`: `self` lands in the high bits. `None` when the result
    /// would be wider than [`MAX_BITS_WIDTH`].
    pub fn concat(&self, rhs: &Bits) -> Option<Bits> {
        let width = self.width.checked_add(rhs.width)?;
        if width > MAX_BITS_WIDTH {
            return None;
        }
        let high = if rhs.width >= MAX_BITS_WIDTH {
            0
        } else {
            self.value << rhs.width
        };
        Some(Bits::unsigned(width, high | rhs.value))
    }

    /// Width conversion as done by `as`: widening sign-extends signed
    /// sources, narrowing truncates.
    pub fn resize(&self, signed: bool, width: u32) -> Bits {
        let raw = if self.signed {
            self.to_i128() as u128
        } else {
            self.value
        };
        Bits::new(signed, width, raw)
    }

    /// `width` bits starting at `start`; bits past the top read as zero.
    pub fn slice(&self, start: u32, width: u32) -> Bits {
        let shifted = if start >= MAX_BITS_WIDTH {
            0
        } else {
            self.value >> start
        };
        Bits::unsigned(width, shifted)
    }

    /// Replace the bits at `start..` with `update`, keeping the width.
    pub fn update_slice(&self, start: u32, update: &Bits) -> Bits {
        if start >= self.width {
            return *self;
        }
        let field = mask(update.width.min(self.width - start)) << start;
        let placed = (update.value << start) & field;
        self.with((self.value & !field) | placed)
    }

    pub fn leading_zeros(&self) -> Bits {
        let lz = if self.width == 0 {
            0
        } else {
            self.value.leading_zeros() - (MAX_BITS_WIDTH - self.width)
        };
        self.with(u128::from(lz))
    }

    pub fn trailing_zeros(&self) -> Bits {
        let tz = self.value.trailing_zeros().min(self.width);
        self.with(u128::from(tz))
    }

    pub fn reverse(&self) -> Bits {
        if self.width == 0 {
            return *self;
        }
        self.with(self.value.reverse_bits() >> (MAX_BITS_WIDTH - self.width))
    }

    pub fn and_reduce(&self) -> bool {
        self.value == mask(self.width)
    }

    pub fn or_reduce(&self) -> bool {
        self.value != 0
    }

    pub fn xor_reduce(&self) -> bool {
        self.value.count_ones() % 2 == 1
    }

    /// Decimal digits without the type prefix.
    pub fn format_plain(&self) -> String {
        if self.signed {
            self.to_i128().to_string()
        } else {
            self.value.to_string()
        }
    }
}

impl fmt::Display for Bits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = if self.signed { 's' } else { 'u' };
        write!(f, "{prefix}{}:{}", self.width, self.format_plain())
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Value
// ══════════════════════════════════════════════════════════════════════════════

/// What a function value calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FunctionRef {
    User {
        function: FunctionId,
        /// `module::name`
        qualified_name: String,
    },
    Builtin(Builtin),
}

/// One endpoint of a channel. Both endpoints of a pair share `id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelRef {
    pub id: u32,
    pub direction: ChannelDirection,
}

#[derive(Debug, Clone)]
pub enum Value {
    Bits(Bits),
    /// `()` is the empty tuple.
    Tuple(Vec<Value>),
    Array(Vec<Value>),
    Struct {
        name: String,
        /// In declaration order.
        fields: Vec<(String, Value)>,
    },
    /// Compares and hashes by `name` and `bits` only.
    Enum {
        name: String,
        /// Display name: the variant the value was written as, or the first
        /// variant whose value equals `bits`.
        variant: Option<String>,
        bits: Bits,
    },
    Function(FunctionRef),
    Channel(ChannelRef),
    Token,
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bits(a), Value::Bits(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) | (Value::Array(a), Value::Array(b)) => a == b,
            (
                Value::Struct { name: a, fields: fa },
                Value::Struct { name: b, fields: fb },
            ) => a == b && fa == fb,
            (
                Value::Enum { name: a, bits: ba, .. },
                Value::Enum { name: b, bits: bb, .. },
            ) => a == b && ba == bb,
            (Value::Function(a), Value::Function(b)) => a == b,
            (Value::Channel(a), Value::Channel(b)) => a == b,
            (Value::Token, Value::Token) => true,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Bits(b) => b.hash(state),
            Value::Tuple(items) | Value::Array(items) => items.hash(state),
            Value::Struct { name, fields } => {
                name.hash(state);
                fields.hash(state);
            }
            Value::Enum { name, bits, .. } => {
                name.hash(state);
                bits.hash(state);
            }
            Value::Function(f) => f.hash(state),
            Value::Channel(c) => c.hash(state),
            Value::Token => {}
        }
    }
}

impl Value {
    pub fn unit() -> Value {
        Value::Tuple(Vec::new())
    }

    pub fn bool(b: bool) -> Value {
        Value::Bits(Bits::from_bool(b))
    }

    pub fn u32(v: u32) -> Value {
        Value::Bits(Bits::u32(v))
    }

    pub fn ubits(width: u32, v: u128) -> Value {
        Value::Bits(Bits::unsigned(width, v))
    }

    pub fn sbits(width: u32, v: i128) -> Value {
        Value::Bits(Bits::signed(width, v))
    }

    /// The bit-vector inside a bits or enum value.
    pub fn as_bits(&self) -> Option<&Bits> {
        match self {
            Value::Bits(b) | Value::Enum { bits: b, .. } => Some(b),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Bits(_) => "bits",
            Value::Tuple(_) => "tuple",
            Value::Array(_) => "array",
            Value::Struct { .. } => "struct",
            Value::Enum { .. } => "enum",
            Value::Function(_) => "function",
            Value::Channel(_) => "channel",
            Value::Token => "token",
        }
    }

    pub fn concrete_type(&self) -> ConcreteType {
        match self {
            Value::Bits(b) => ConcreteType::Bits {
                signed: b.is_signed(),
                width: b.width(),
            },
            Value::Tuple(items) => {
                ConcreteType::Tuple(items.iter().map(Value::concrete_type).collect())
            }
            Value::Array(items) => ConcreteType::Array {
                element: Box::new(
                    items
                        .first()
                        .map(Value::concrete_type)
                        .unwrap_or_else(ConcreteType::unit),
                ),
                size: items.len() as u32,
            },
            Value::Struct { name, .. } => ConcreteType::Struct(name.clone()),
            Value::Enum { name, bits, .. } => ConcreteType::Enum {
                name: name.clone(),
                signed: bits.is_signed(),
                width: bits.width(),
            },
            Value::Function(_) => ConcreteType::Function,
            Value::Channel(c) => ConcreteType::Channel {
                direction: c.direction,
            },
            Value::Token => ConcreteType::Token,
        }
    }

    /// Rendering used by `trace_fmt!` placeholders: numbers without type
    /// prefixes.
    pub fn format_plain(&self) -> String {
        match self {
            Value::Bits(b) => b.format_plain(),
            Value::Tuple(items) => format!("({})", join_plain(items)),
            Value::Array(items) => format!("[{}]", join_plain(items)),
            Value::Struct { name, fields } => {
                let inner: Vec<String> = fields
                    .iter()
                    .map(|(n, v)| format!("{n}: {}", v.format_plain()))
                    .collect();
                format!("{name} {{ {} }}", inner.join(", "))
            }
            other => other.to_string(),
        }
    }
}

fn join_plain(items: &[Value]) -> String {
    items
        .iter()
        .map(Value::format_plain)
        .collect::<Vec<_>>()
        .join(", ")
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bits(b) => write!(f, "{b}"),
            Value::Tuple(items) => {
                f.write_str("(")?;
                write_list(f, items)?;
                if items.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            Value::Array(items) => {
                f.write_str("[")?;
                write_list(f, items)?;
                f.write_str("]")
            }
            Value::Struct { name, fields } => {
                write!(f, "{name} {{ ")?;
                for (i, (field, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{field}: {value}")?;
                }
                f.write_str(" }")
            }
            Value::Enum {
                name,
                variant: Some(variant),
                ..
            } => write!(f, "{name}::{variant}"),
            Value::Enum {
                name,
                variant: None,
                bits,
            } => write!(f, "{name}:{}", bits.format_plain()),
            Value::Function(FunctionRef::User { qualified_name, .. }) => {
                write!(f, "fn:{qualified_name}")
            }
            Value::Function(FunctionRef::Builtin(b)) => write!(f, "fn:{b}"),
            Value::Channel(c) => write!(f, "chan#{}({})", c.id, c.direction),
            Value::Token => f.write_str("token"),
        }
    }
}

/// Values export as their rendered text.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// ConcreteType
// ══════════════════════════════════════════════════════════════════════════════

/// A fully resolved type: every dimension is a number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConcreteType {
    Bits { signed: bool, width: u32 },
    Array { element: Box<ConcreteType>, size: u32 },
    Tuple(Vec<ConcreteType>),
    Struct(String),
    Enum { name: String, signed: bool, width: u32 },
    Token,
    Channel { direction: ChannelDirection },
    Function,
}

impl ConcreteType {
    pub fn unit() -> ConcreteType {
        ConcreteType::Tuple(Vec::new())
    }

    pub fn bool() -> ConcreteType {
        ConcreteType::Bits {
            signed: false,
            width: 1,
        }
    }
}

impl fmt::Display for ConcreteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConcreteType::Bits { signed, width } => {
                write!(f, "{}{width}", if *signed { 's' } else { 'u' })
            }
            ConcreteType::Array { element, size } => write!(f, "{element}[{size}]"),
            ConcreteType::Tuple(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                if items.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            ConcreteType::Struct(name) | ConcreteType::Enum { name, .. } => f.write_str(name),
            ConcreteType::Token => f.write_str("token"),
            ConcreteType::Channel { direction } => write!(f, "chan {direction}"),
            ConcreteType::Function => f.write_str("fn"),
        }
    }
}

impl Serialize for ConcreteType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
