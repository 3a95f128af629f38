//! Proc network elaboration.
//!
//! Starting from a root proc, runs every instance's `config` exactly once,
//! binds the returned tuple to the proc's members, allocates the channels
//! `config` declares and recursively elaborates each `spawn`, depth first.
//! Arguments travel through per-instance tables keyed by [`ProcId`].

use std::collections::{BTreeMap, HashMap};

use dslx_types::ast::ProcDeclId;
use dslx_types::Span;
use serde::Serialize;
use tracing::debug;

use crate::channel::{ChannelTable, FlowControl};
use crate::effects::{EffectError, Effects, SpawnRequest};
use crate::error::{EvalError, Failure};
use crate::evaluator::{Context, Evaluator, RunState};
use crate::parametric::SymbolicBindings;
use crate::proc_id::ProcId;
use crate::scheduler::JournalEntry;
use crate::value::{ChannelRef, ConcreteType, Value};

/// One elaborated proc instance and its evolving `next` state.
#[derive(Debug, Clone, Serialize)]
pub struct ProcInstance {
    pub id: ProcId,
    pub proc: ProcDeclId,
    pub proc_name: String,
    pub bindings: SymbolicBindings,
    /// Current values of the `next` state parameters.
    pub state: Vec<Value>,
    /// Completed `next` invocations.
    pub ticks: u64,
    /// Channel operations of the tick in progress, replayed when a blocked
    /// tick is retried.
    #[serde(skip)]
    pub(crate) journal: Vec<JournalEntry>,
}

/// A fully elaborated proc network.
#[derive(Debug, Default, Serialize)]
pub struct Elaboration {
    /// In elaboration order: each parent precedes its children.
    pub instances: Vec<ProcInstance>,
    /// `config` arguments per instance.
    pub config_args: BTreeMap<ProcId, Vec<Value>>,
    /// Initial `next` state per instance.
    pub initial_state: BTreeMap<ProcId, Vec<Value>>,
    /// Member bindings per instance, in declaration order.
    pub members: BTreeMap<ProcId, Vec<(String, Value)>>,
    pub channels: ChannelTable,
    /// Receive end of the root test proc's terminator channel.
    #[serde(skip)]
    pub terminator: Option<ChannelRef>,
}

impl Elaboration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tables seeded with the root instance's arguments.
    pub fn with_root(root: &ProcId, config_args: Vec<Value>, initial_state: Vec<Value>) -> Self {
        let mut elab = Self::new();
        elab.config_args.insert(root.clone(), config_args);
        elab.initial_state.insert(root.clone(), initial_state);
        elab
    }

    pub fn instance(&self, id: &ProcId) -> Option<&ProcInstance> {
        self.instances.iter().find(|i| &i.id == id)
    }

    pub fn member(&self, id: &ProcId, name: &str) -> Option<&Value> {
        self.members
            .get(id)?
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Config effects
// ══════════════════════════════════════════════════════════════════════════════

/// `config` may declare channels and spawn children, but not communicate.
struct ConfigEffects<'e> {
    owner: &'e ProcId,
    channels: &'e mut ChannelTable,
    flow_control: FlowControl,
    spawns: Vec<SpawnRequest>,
}

impl Effects for ConfigEffects<'_> {
    fn send(&mut self, _: ChannelRef, _: Value) -> Result<(), EffectError> {
        Err(EffectError::Unsupported(
            "'send' is not allowed in a proc's config".to_string(),
        ))
    }

    fn recv(&mut self, _: ChannelRef, _: bool) -> Result<Option<Value>, EffectError> {
        Err(EffectError::Unsupported(
            "'recv' is not allowed in a proc's config".to_string(),
        ))
    }

    fn make_channel(&mut self, payload: ConcreteType, span: Span) -> Result<(ChannelRef, ChannelRef), EffectError> {
        let name = format!("{}@{}", self.owner, span.start);
        Ok(self.channels.allocate(name, payload, self.flow_control))
    }

    fn spawn(&mut self, request: SpawnRequest) -> Result<(), EffectError> {
        self.spawns.push(request);
        Ok(())
    }

    fn trace(&mut self) -> Result<bool, EffectError> {
        Ok(true)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Elaborator
// ══════════════════════════════════════════════════════════════════════════════

pub struct Elaborator<'a, 'r> {
    ctx: Context<'a>,
    state: &'r mut RunState,
}

impl<'a, 'r> Elaborator<'a, 'r> {
    pub fn new(ctx: Context<'a>, state: &'r mut RunState) -> Self {
        Self { ctx, state }
    }

    /// Elaborate instance `id` of `proc` and everything it spawns. The
    /// instance's `config` arguments and initial state must already be in
    /// `elab`'s tables.
    pub fn elaborate(
        &mut self,
        proc: ProcDeclId,
        id: ProcId,
        explicit: Vec<Value>,
        elab: &mut Elaboration,
    ) -> Result<(), Failure> {
        let module = self.ctx.module;
        let file = module.file.as_str();
        let decl = module.proc_decl(proc);
        let config = module.function(decl.config);
        let next = module.function(decl.next);
        let internal = |message: String| Failure::internal(message, file, decl.span).in_instance(&id);
        let not_found = |what: String| internal(format!("{what} not found in the per-instance argument mapping"));

        if id.depth() > self.ctx.options.max_call_depth {
            return Err(internal(format!("spawn nesting deeper than {}", self.ctx.options.max_call_depth)));
        }

        let Some(args) = elab.config_args.get(&id).cloned() else {
            return Err(not_found(format!("config arguments for proc instance {id}")));
        };
        let mut locals = Vec::with_capacity(config.params.len());
        for (i, param) in config.params.iter().enumerate() {
            match args.get(i) {
                Some(v) => locals.push((param.name.name.clone(), v.clone())),
                None => {
                    return Err(not_found(format!(
                        "argument '{}' (#{i}) of {}.config for proc instance {id}",
                        param.name.name, decl.name.name
                    )))
                }
            }
        }
        if args.len() > config.params.len() {
            return Err(internal(format!(
                "proc instance {id} was given {} config argument(s) but {}.config takes {}",
                args.len(),
                decl.name.name,
                config.params.len()
            )));
        }

        let Some(initial) = elab.initial_state.get(&id).cloned() else {
            return Err(not_found(format!("initial state for proc instance {id}")));
        };
        let mut state = Vec::new();
        for (i, param) in next.params.iter().skip(1).enumerate() {
            match initial.get(i) {
                Some(v) => state.push(v.clone()),
                None => {
                    return Err(not_found(format!(
                        "initial value of state '{}' of {}.next for proc instance {id}",
                        param.name.name, decl.name.name
                    )))
                }
            }
        }

        let mut effects = ConfigEffects {
            owner: &id,
            channels: &mut elab.channels,
            flow_control: self.ctx.options.flow_control,
            spawns: Vec::new(),
        };
        let to_failure = |e: EvalError| e.into_failure(file, decl.span).in_instance(&id);
        let (bindings, returned) = {
            let mut ev = Evaluator::new(self.ctx, self.state, &mut effects);
            let bindings = ev
                .resolve_bindings(decl.config, explicit, &args, decl.span)
                .map_err(to_failure)?;
            let returned = ev.run_body(decl.config, &bindings, locals).map_err(to_failure)?;
            (bindings, returned)
        };
        let spawns = effects.spawns;

        let values = match returned {
            Value::Tuple(items) if items.len() == decl.members.len() => items,
            single if decl.members.len() == 1 => vec![single],
            other => {
                return Err(internal(format!(
                    "{}.config returned {other} but the proc declares {} member(s)",
                    decl.name.name,
                    decl.members.len()
                )))
            }
        };
        let members = decl
            .members
            .iter()
            .map(|m| m.name.name.clone())
            .zip(values)
            .collect();
        elab.members.insert(id.clone(), members);

        debug!(
            proc_id = %id,
            bindings = %bindings,
            spawns = spawns.len(),
            "proc instance elaborated"
        );
        elab.instances.push(ProcInstance {
            id: id.clone(),
            proc,
            proc_name: decl.name.name.clone(),
            bindings,
            state,
            ticks: 0,
            journal: Vec::new(),
        });

        let mut siblings: HashMap<&str, u32> = HashMap::new();
        for request in spawns {
            let child_name = module.proc_decl(request.proc).name.name.as_str();
            let counter = siblings.entry(child_name).or_insert(0);
            let child = id.child(child_name, *counter);
            *counter += 1;
            elab.config_args.insert(child.clone(), request.config_args);
            elab.initial_state.insert(child.clone(), request.next_args);
            if let Err(mut failure) = self.elaborate(request.proc, child, request.parametrics, elab) {
                failure.push_frame(module.qualified_name(decl.config), file, request.span);
                return Err(failure);
            }
        }
        Ok(())
    }
}
