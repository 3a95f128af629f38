//! Side effects the evaluator delegates to its caller.
//!
//! Plain function evaluation, proc `config`, and proc `next` ticks allow
//! different operations; each supplies its own [`Effects`] implementation.

use dslx_types::ast::ProcDeclId;
use dslx_types::Span;
use thiserror::Error;

use crate::value::{ChannelRef, ConcreteType, Value};

/// A `spawn` recorded during `config`, elaborated after `config` returns.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnRequest {
    pub proc: ProcDeclId,
    pub parametrics: Vec<Value>,
    pub config_args: Vec<Value>,
    pub next_args: Vec<Value>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EffectError {
    #[error("blocked on channel {0}")]
    Blocked(u32),
    #[error("{0}")]
    Unsupported(String),
    #[error("{0}")]
    Internal(String),
}

pub trait Effects {
    fn send(&mut self, channel: ChannelRef, value: Value) -> Result<(), EffectError>;

    /// `Ok(None)` only for a non-blocking receive on an empty channel.
    fn recv(&mut self, channel: ChannelRef, blocking: bool) -> Result<Option<Value>, EffectError>;

    fn make_channel(&mut self, payload: ConcreteType, span: Span) -> Result<(ChannelRef, ChannelRef), EffectError>;

    fn spawn(&mut self, request: SpawnRequest) -> Result<(), EffectError>;

    /// Whether a trace reached at this point should be emitted. A replayed
    /// tick answers `false` for traces it already emitted.
    fn trace(&mut self) -> Result<bool, EffectError>;
}

/// Effects for ordinary function evaluation: no channels, no spawns.
#[derive(Debug, Default, Clone, Copy)]
pub struct FunctionEffects;

impl Effects for FunctionEffects {
    fn send(&mut self, _: ChannelRef, _: Value) -> Result<(), EffectError> {
        Err(outside_proc("send"))
    }

    fn recv(&mut self, _: ChannelRef, _: bool) -> Result<Option<Value>, EffectError> {
        Err(outside_proc("recv"))
    }

    fn make_channel(&mut self, _: ConcreteType, _: Span) -> Result<(ChannelRef, ChannelRef), EffectError> {
        Err(outside_proc("chan"))
    }

    fn spawn(&mut self, _: SpawnRequest) -> Result<(), EffectError> {
        Err(outside_proc("spawn"))
    }

    fn trace(&mut self) -> Result<bool, EffectError> {
        Ok(true)
    }
}

fn outside_proc(what: &str) -> EffectError {
    EffectError::Unsupported(format!("'{what}' is only available inside a proc"))
}
