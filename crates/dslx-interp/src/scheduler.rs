//! Cooperative round-robin scheduling of an elaborated proc network.
//!
//! Each round visits every instance in elaboration order and runs one
//! `next` tick. A `recv` on an empty channel abandons the tick; it is
//! retried from the start in a later round. Channel operations already
//! performed by the abandoned attempt are kept in a journal and replayed,
//! not repeated, so a `send` before a blocking `recv` is delivered once.

use std::collections::BTreeMap;

use dslx_types::ast::ChannelDirection;
use dslx_types::Span;
use serde::Serialize;
use tracing::{debug, info, trace};

use crate::channel::ChannelTable;
use crate::effects::{EffectError, Effects, SpawnRequest};
use crate::elaborator::Elaboration;
use crate::error::{EvalError, Failure, FailureKind};
use crate::evaluator::{Context, Evaluator, RunState};
use crate::proc_id::ProcId;
use crate::value::{ChannelRef, ConcreteType, Value};

/// A channel operation performed by the tick in progress.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum JournalEntry {
    Send { channel: u32 },
    /// `None` records a non-blocking receive that found nothing.
    Recv { channel: u32, value: Option<Value> },
    Trace,
}

/// Outcome of a completed test-proc run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcRunSummary {
    pub rounds: u64,
    /// Completed `next` ticks per instance.
    pub ticks: BTreeMap<ProcId, u64>,
}

// ══════════════════════════════════════════════════════════════════════════════
// Tick effects
// ══════════════════════════════════════════════════════════════════════════════

struct TickEffects<'t> {
    channels: &'t mut ChannelTable,
    journal: &'t mut Vec<JournalEntry>,
    cursor: usize,
    /// A channel operation not seen by an earlier attempt happened.
    performed: bool,
}

impl TickEffects<'_> {
    fn replay(&mut self) -> Option<JournalEntry> {
        let entry = self.journal.get(self.cursor)?.clone();
        self.cursor += 1;
        Some(entry)
    }

    fn record(&mut self, entry: JournalEntry) {
        self.journal.push(entry);
        self.cursor = self.journal.len();
    }

    fn check_endpoint(&self, channel: ChannelRef, direction: ChannelDirection) -> Result<(), EffectError> {
        if self.channels.get(channel.id).is_none() {
            return Err(EffectError::Internal(format!("unknown channel {}", channel.id)));
        }
        if channel.direction != direction {
            return Err(EffectError::Internal(format!(
                "channel {} used from the wrong endpoint",
                channel.id
            )));
        }
        Ok(())
    }
}

fn diverged(recorded: &JournalEntry, now: String) -> EffectError {
    EffectError::Internal(format!(
        "retried tick diverged from its first attempt: recorded {recorded:?}, now {now}"
    ))
}

impl Effects for TickEffects<'_> {
    fn send(&mut self, channel: ChannelRef, value: Value) -> Result<(), EffectError> {
        self.check_endpoint(channel, ChannelDirection::Out)?;
        if let Some(entry) = self.replay() {
            return match entry {
                JournalEntry::Send { channel: id } if id == channel.id => Ok(()),
                other => Err(diverged(&other, format!("send on channel {}", channel.id))),
            };
        }
        if self.channels.get(channel.id).is_some_and(|c| c.is_full()) {
            return Err(EffectError::Blocked(channel.id));
        }
        self.channels.push(channel.id, value);
        self.record(JournalEntry::Send { channel: channel.id });
        self.performed = true;
        Ok(())
    }

    fn recv(&mut self, channel: ChannelRef, blocking: bool) -> Result<Option<Value>, EffectError> {
        self.check_endpoint(channel, ChannelDirection::In)?;
        if let Some(entry) = self.replay() {
            return match entry {
                JournalEntry::Recv { channel: id, value } if id == channel.id => Ok(value),
                other => Err(diverged(&other, format!("recv on channel {}", channel.id))),
            };
        }
        match self.channels.pop(channel.id) {
            Some(value) => {
                self.record(JournalEntry::Recv {
                    channel: channel.id,
                    value: Some(value.clone()),
                });
                self.performed = true;
                Ok(Some(value))
            }
            None if blocking => Err(EffectError::Blocked(channel.id)),
            None => {
                self.record(JournalEntry::Recv {
                    channel: channel.id,
                    value: None,
                });
                Ok(None)
            }
        }
    }

    fn make_channel(&mut self, _: ConcreteType, _: Span) -> Result<(ChannelRef, ChannelRef), EffectError> {
        Err(EffectError::Unsupported(
            "'chan' is only allowed in a proc's config".to_string(),
        ))
    }

    fn spawn(&mut self, _: SpawnRequest) -> Result<(), EffectError> {
        Err(EffectError::Unsupported(
            "'spawn' is only allowed in a proc's config".to_string(),
        ))
    }

    fn trace(&mut self) -> Result<bool, EffectError> {
        if let Some(entry) = self.replay() {
            return match entry {
                JournalEntry::Trace => Ok(false),
                other => Err(diverged(&other, "trace".to_string())),
            };
        }
        self.record(JournalEntry::Trace);
        Ok(true)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Scheduler
// ══════════════════════════════════════════════════════════════════════════════

enum TickOutcome {
    Completed { progressed: bool },
    Blocked { channel: u32, progressed: bool },
}

pub struct Scheduler<'a, 'r> {
    ctx: Context<'a>,
    state: &'r mut RunState,
}

impl<'a, 'r> Scheduler<'a, 'r> {
    pub fn new(ctx: Context<'a>, state: &'r mut RunState) -> Self {
        Self { ctx, state }
    }

    /// Run rounds until the root reports on its terminator channel.
    pub fn run(&mut self, elab: &mut Elaboration) -> Result<ProcRunSummary, Failure> {
        let module = self.ctx.module;
        let file = module.file.as_str();
        let root_span = elab
            .instances
            .first()
            .map(|i| module.proc_decl(i.proc).span)
            .unwrap_or_else(Span::fake);
        let Some(terminator) = elab.terminator else {
            return Err(Failure::internal("proc network has no terminator channel", file, root_span));
        };

        let max_rounds = self.ctx.options.max_rounds;
        for round in 1..=max_rounds {
            let mut progressed = false;
            let mut blocked = Vec::new();
            for index in 0..elab.instances.len() {
                match self.tick(elab, index)? {
                    TickOutcome::Completed { progressed: p } => progressed |= p,
                    TickOutcome::Blocked { channel, progressed: p } => {
                        progressed |= p;
                        blocked.push((index, channel));
                    }
                }
                if let Some(verdict) = elab.channels.pop(terminator.id) {
                    return self.finish(elab, round, verdict, root_span);
                }
            }
            debug!(round, progressed, blocked = blocked.len(), "scheduler round finished");
            // An idle round with nobody waiting repeats until the round limit.
            if !progressed && !blocked.is_empty() {
                return Err(self.deadlock(elab, round, &blocked, root_span));
            }
        }
        Err(Failure::new(
            FailureKind::RoundLimit,
            format!("proc network did not terminate within {max_rounds} round(s)"),
            file,
            root_span,
        ))
    }

    /// One `next` attempt for `elab.instances[index]`.
    fn tick(&mut self, elab: &mut Elaboration, index: usize) -> Result<TickOutcome, Failure> {
        let module = self.ctx.module;
        let Elaboration {
            instances,
            channels,
            members,
            ..
        } = elab;
        let inst = &mut instances[index];
        let decl = module.proc_decl(inst.proc);
        let next = module.function(decl.next);

        let mut locals = members.get(&inst.id).cloned().ok_or_else(|| {
            Failure::internal(
                format!(
                    "members of proc instance {} not found in the per-instance argument mapping",
                    inst.id
                ),
                &module.file,
                decl.span,
            )
            .in_instance(&inst.id)
        })?;
        let mut params = next.params.iter();
        if let Some(token) = params.next() {
            locals.push((token.name.name.clone(), Value::Token));
        }
        for (param, value) in params.zip(&inst.state) {
            locals.push((param.name.name.clone(), value.clone()));
        }

        let mut effects = TickEffects {
            channels,
            journal: &mut inst.journal,
            cursor: 0,
            performed: false,
        };
        let result = {
            let mut ev = Evaluator::new(self.ctx, self.state, &mut effects);
            ev.run_body(decl.next, &inst.bindings, locals)
        };
        let performed = effects.performed;
        trace!(proc_id = %inst.id, performed, ok = result.is_ok(), "tick attempt");

        let value = match result {
            Ok(value) => value,
            Err(EvalError::Blocked { channel }) => {
                return Ok(TickOutcome::Blocked {
                    channel,
                    progressed: performed,
                })
            }
            Err(EvalError::Failure(failure)) => return Err((*failure).in_instance(&inst.id)),
        };

        let state_len = next.params.len().saturating_sub(1);
        let new_state = match value {
            Value::Tuple(items) if items.len() == state_len => items,
            single if state_len == 1 => vec![single],
            other => {
                return Err(Failure::internal(
                    format!(
                        "{}.next returned {other} but the proc has {state_len} state value(s)",
                        decl.name.name
                    ),
                    &module.file,
                    next.span,
                )
                .in_instance(&inst.id))
            }
        };
        let changed = new_state != inst.state;
        inst.state = new_state;
        inst.journal.clear();
        inst.ticks += 1;
        Ok(TickOutcome::Completed {
            progressed: performed || changed,
        })
    }

    fn finish(
        &self,
        elab: &Elaboration,
        rounds: u64,
        verdict: Value,
        span: Span,
    ) -> Result<ProcRunSummary, Failure> {
        let file = self.ctx.module.file.as_str();
        let root = elab.instances.first().map(|i| i.id.clone());
        let root_name = root.as_ref().map(ToString::to_string).unwrap_or_default();
        match verdict.as_bits() {
            Some(b) if b.width() == 1 && b.is_true() => {
                info!(proc_id = %root_name, rounds, "test proc terminated");
                Ok(ProcRunSummary {
                    rounds,
                    ticks: elab
                        .instances
                        .iter()
                        .map(|i| (i.id.clone(), i.ticks))
                        .collect(),
                })
            }
            Some(b) if b.width() == 1 => {
                info!(proc_id = %root_name, rounds, "test proc reported failure");
                Err(Failure::new(
                    FailureKind::Assertion,
                    format!("test proc {root_name} sent false on its terminator channel"),
                    file,
                    span,
                )
                .in_instance(root_name))
            }
            _ => Err(Failure::internal(
                format!("terminator channel carried {verdict}"),
                file,
                span,
            )),
        }
    }

    fn deadlock(&self, elab: &Elaboration, round: u64, blocked: &[(usize, u32)], span: Span) -> Failure {
        info!(round, blocked = blocked.len(), "proc network deadlocked");
        let waiting: Vec<String> = blocked
            .iter()
            .map(|(index, channel)| {
                let name = elab
                    .channels
                    .get(*channel)
                    .map(|c| c.name.as_str())
                    .unwrap_or("?");
                format!("{} on channel {channel} ({name})", elab.instances[*index].id)
            })
            .collect();
        let message = format!(
            "no proc instance can make progress after {round} round(s); blocked: {}",
            waiting.join(", ")
        );
        Failure::new(FailureKind::Deadlock, message, &self.ctx.module.file, span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::FlowControl;

    const U32: ConcreteType = ConcreteType::Bits {
        signed: false,
        width: 32,
    };

    fn effects<'t>(channels: &'t mut ChannelTable, journal: &'t mut Vec<JournalEntry>) -> TickEffects<'t> {
        TickEffects {
            channels,
            journal,
            cursor: 0,
            performed: false,
        }
    }

    #[test]
    fn test_replayed_send_is_not_repeated() {
        let mut channels = ChannelTable::new();
        let (tx, rx) = channels.allocate("c", U32, FlowControl::None);
        let mut journal = Vec::new();
        effects(&mut channels, &mut journal)
            .send(tx, Value::u32(1))
            .expect("first attempt sends");
        let mut retry = effects(&mut channels, &mut journal);
        retry.send(tx, Value::u32(1)).expect("replayed");
        assert!(!retry.performed);
        assert_eq!(channels.get(rx.id).map(|c| c.len()), Some(1));
    }

    #[test]
    fn test_diverging_retry_is_internal() {
        let mut channels = ChannelTable::new();
        let (tx, _) = channels.allocate("a", U32, FlowControl::None);
        let (_, rx) = channels.allocate("b", U32, FlowControl::None);
        let mut journal = vec![JournalEntry::Send { channel: tx.id }];
        let err = effects(&mut channels, &mut journal)
            .recv(rx, true)
            .expect_err("recorded a send, now a recv");
        match err {
            EffectError::Internal(message) => {
                assert!(message.contains("diverged from its first attempt"), "{message}")
            }
            other => panic!("expected an internal error, got {other:?}"),
        }
    }

    #[test]
    fn test_ready_valid_send_blocks_while_occupied() {
        let mut channels = ChannelTable::new();
        let (tx, rx) = channels.allocate("c", U32, FlowControl::ReadyValid);
        let mut journal = Vec::new();
        let mut tick = effects(&mut channels, &mut journal);
        tick.send(tx, Value::u32(1)).expect("empty channel accepts");
        assert_eq!(tick.send(tx, Value::u32(2)), Err(EffectError::Blocked(tx.id)));
        assert_eq!(channels.pop(rx.id), Some(Value::u32(1)));
        assert_eq!(channels.pop(rx.id), None);
    }
}
