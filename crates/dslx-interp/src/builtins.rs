//! Builtin function dispatch.

use dslx_typecheck::Builtin;
use dslx_types::Span;

use crate::error::{EvalError, EvalResult, FailureKind};
use crate::evaluator::Evaluator;
use crate::value::{Bits, FunctionRef, Value};

impl Evaluator<'_, '_> {
    /// Apply `builtin` to already evaluated arguments. `span` is the whole
    /// invocation.
    pub(crate) fn call_builtin(&mut self, builtin: Builtin, args: Vec<Value>, span: Span) -> EvalResult<Value> {
        match (builtin, args.as_slice()) {
            (Builtin::AssertEq, [lhs, rhs]) => {
                if lhs == rhs {
                    Ok(Value::unit())
                } else {
                    Err(self.failure(
                        FailureKind::Assertion,
                        format!("assert_eq failed: {lhs} != {rhs}"),
                        span,
                    ))
                }
            }
            (Builtin::AssertLt, [lhs, rhs]) => match (lhs.as_bits(), rhs.as_bits()) {
                (Some(a), Some(b)) if a.compare(b).is_lt() => Ok(Value::unit()),
                (Some(_), Some(_)) => Err(self.failure(
                    FailureKind::Assertion,
                    format!("assert_lt failed: {lhs} is not less than {rhs}"),
                    span,
                )),
                _ => Err(self.invalid_args(builtin, &args, span)),
            },

            // ── Channels ─────────────────────────────────────────────────
            (Builtin::Send, [_, Value::Channel(ch), value]) => {
                let sent = self.effects_send(*ch, value.clone());
                self.effect(sent, span)?;
                Ok(Value::Token)
            }
            (Builtin::SendIf, [_, Value::Channel(ch), Value::Bits(pred), value]) => {
                if pred.is_true() {
                    let sent = self.effects_send(*ch, value.clone());
                    self.effect(sent, span)?;
                }
                Ok(Value::Token)
            }
            (Builtin::Recv, [_, Value::Channel(ch)]) => {
                let received = self.effects_recv(*ch, true);
                match self.effect(received, span)? {
                    Some(v) => Ok(Value::Tuple(vec![Value::Token, v])),
                    None => Err(self.internal("blocking receive produced no value", span)),
                }
            }
            (Builtin::RecvIf, [_, Value::Channel(ch), Value::Bits(pred), default]) => {
                if !pred.is_true() {
                    return Ok(Value::Tuple(vec![Value::Token, default.clone()]));
                }
                let received = self.effects_recv(*ch, true);
                match self.effect(received, span)? {
                    Some(v) => Ok(Value::Tuple(vec![Value::Token, v])),
                    None => Err(self.internal("blocking receive produced no value", span)),
                }
            }
            (Builtin::RecvNonBlocking, [_, Value::Channel(ch), default]) => {
                let received = self.effects_recv(*ch, false);
                Ok(match self.effect(received, span)? {
                    Some(v) => Value::Tuple(vec![Value::Token, v, Value::bool(true)]),
                    None => Value::Tuple(vec![Value::Token, default.clone(), Value::bool(false)]),
                })
            }
            (Builtin::Join, _) => Ok(Value::Token),

            // ── Arrays ───────────────────────────────────────────────────
            // Out-of-range updates leave the array unchanged.
            (Builtin::Update, [Value::Array(items), index, value]) => {
                let mut items = items.clone();
                let slot = index
                    .as_bits()
                    .and_then(|b| usize::try_from(b.raw()).ok())
                    .and_then(|i| items.get_mut(i));
                if let Some(slot) = slot {
                    *slot = value.clone();
                }
                Ok(Value::Array(items))
            }
            (Builtin::ArraySize, [Value::Array(items)]) => Ok(Value::u32(items.len() as u32)),
            (Builtin::Map, [Value::Array(items), Value::Function(f)]) => {
                let (items, f) = (items.clone(), f.clone());
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(match &f {
                        FunctionRef::User { function, .. } => {
                            self.call_function(*function, vec![item], Vec::new(), span)?
                        }
                        FunctionRef::Builtin(b) => self.call_builtin(*b, vec![item], span)?,
                    });
                }
                Ok(Value::Array(out))
            }
            (Builtin::Range, [Value::Bits(start), Value::Bits(limit)]) => {
                self.range_values(*start, *limit, span)
            }

            // ── Bits ─────────────────────────────────────────────────────
            (Builtin::Clz, [Value::Bits(b)]) => Ok(Value::Bits(b.leading_zeros())),
            (Builtin::Ctz, [Value::Bits(b)]) => Ok(Value::Bits(b.trailing_zeros())),
            (Builtin::Rev, [Value::Bits(b)]) => Ok(Value::Bits(b.reverse())),
            (Builtin::AndReduce, [Value::Bits(b)]) => Ok(Value::bool(b.and_reduce())),
            (Builtin::OrReduce, [Value::Bits(b)]) => Ok(Value::bool(b.or_reduce())),
            (Builtin::XorReduce, [Value::Bits(b)]) => Ok(Value::bool(b.xor_reduce())),
            (Builtin::BitSliceUpdate, [Value::Bits(subject), start, Value::Bits(update)]) => {
                let Some(start) = start.as_bits() else {
                    return Err(self.invalid_args(builtin, &args, span));
                };
                let start = u32::try_from(start.raw()).unwrap_or(u32::MAX);
                Ok(Value::Bits(subject.update_slice(start, update)))
            }
            // Sign-extend `x` from its own width to the witness's type.
            (Builtin::Signex, [Value::Bits(x), Value::Bits(witness)]) => {
                let extended = Bits::new(true, x.width(), x.raw()).to_i128();
                Ok(Value::Bits(Bits::new(
                    witness.is_signed(),
                    witness.width(),
                    extended as u128,
                )))
            }

            _ => Err(self.invalid_args(builtin, &args, span)),
        }
    }

    fn invalid_args(&self, builtin: Builtin, args: &[Value], span: Span) -> EvalError {
        let rendered: Vec<String> = args.iter().map(Value::to_string).collect();
        self.internal(
            format!("invalid arguments to '{}': ({})", builtin.name(), rendered.join(", ")),
            span,
        )
    }
}
