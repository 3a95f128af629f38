//! Entry points: run a function, elaborate a proc network, run a test proc.

use dslx_typecheck::{parse_and_typecheck, TypecheckedModule};
use dslx_types::ast::{FunctionTag, Module, ProcDeclId};
use dslx_types::{CompileErrors, Span};
use tracing::{debug, info};

use crate::channel::FlowControl;
use crate::effects::FunctionEffects;
use crate::elaborator::{Elaboration, Elaborator};
use crate::error::Failure;
use crate::evaluator::{Context, Evaluator, RunState};
use crate::options::InterpreterOptions;
use crate::proc_id::ProcId;
use crate::scheduler::{ProcRunSummary, Scheduler};
use crate::value::{ConcreteType, Value};

/// Interprets one type-checked module.
///
/// The parametric instantiation cache, constant values and the trace log
/// persist across calls on the same interpreter.
#[derive(Debug)]
pub struct Interpreter {
    typed: TypecheckedModule,
    options: InterpreterOptions,
    state: RunState,
}

impl Interpreter {
    pub fn new(typed: TypecheckedModule) -> Self {
        Self::with_options(typed, InterpreterOptions::default())
    }

    pub fn with_options(typed: TypecheckedModule, options: InterpreterOptions) -> Self {
        Self {
            typed,
            options,
            state: RunState::default(),
        }
    }

    /// Lex, parse and type-check `source`, then wrap it.
    pub fn from_source(source: &str, file_name: &str, module_name: &str) -> Result<Self, CompileErrors> {
        Ok(Self::new(parse_and_typecheck(source, file_name, module_name)?))
    }

    pub fn module(&self) -> &Module {
        &self.typed.module
    }

    pub fn options(&self) -> &InterpreterOptions {
        &self.options
    }

    /// Messages emitted by `trace!`/`trace_fmt!` so far.
    pub fn trace_log(&self) -> &[String] {
        &self.state.trace_log
    }

    pub fn take_trace_log(&mut self) -> Vec<String> {
        std::mem::take(&mut self.state.trace_log)
    }

    /// Distinct parametric instantiations created so far.
    pub fn cache_size(&self) -> usize {
        self.state.cache.len()
    }

    fn parts(&mut self) -> (Context<'_>, &mut RunState) {
        (
            Context {
                module: &self.typed.module,
                type_info: &self.typed.type_info,
                options: &self.options,
            },
            &mut self.state,
        )
    }

    fn not_found(&self, message: String) -> Failure {
        Failure::internal(message, &self.typed.module.file, Span::fake())
    }

    // ══════════════════════════════════════════════════════════════════════
    // Functions
    // ══════════════════════════════════════════════════════════════════════

    /// Evaluate the module function `name` on `args`.
    pub fn run_function(&mut self, name: &str, args: Vec<Value>) -> Result<Value, Failure> {
        let Some(function) = self.module().find_function(name) else {
            return Err(self.not_found(format!("no function named '{name}'")));
        };
        let decl = self.module().function(function);
        if decl.tag != FunctionTag::Normal {
            return Err(self.not_found(format!("'{name}' is part of a proc")));
        }
        let span = decl.span;
        debug!(function = name, args = args.len(), "running function");

        let (ctx, state) = self.parts();
        let mut effects = FunctionEffects;
        let mut ev = Evaluator::new(ctx, state, &mut effects);
        ev.call_function(function, args, Vec::new(), span)
            .map_err(|e| e.into_failure(&ctx.module.file, span))
    }

    // ══════════════════════════════════════════════════════════════════════
    // Procs
    // ══════════════════════════════════════════════════════════════════════

    fn find_proc(&self, name: &str) -> Result<ProcDeclId, Failure> {
        self.module()
            .find_proc(name)
            .ok_or_else(|| self.not_found(format!("no proc named '{name}'")))
    }

    /// Elaborate the network rooted at proc `name`.
    pub fn elaborate(
        &mut self,
        name: &str,
        config_args: Vec<Value>,
        initial_state: Vec<Value>,
    ) -> Result<Elaboration, Failure> {
        let proc = self.find_proc(name)?;
        let root = ProcId::root(name);
        let mut elab = Elaboration::with_root(&root, config_args, initial_state);
        let (ctx, state) = self.parts();
        Elaborator::new(ctx, state).elaborate(proc, root, Vec::new(), &mut elab)?;
        info!(
            proc = name,
            instances = elab.instances.len(),
            channels = elab.channels.len(),
            "proc network elaborated"
        );
        Ok(elab)
    }

    /// Elaborate instance `id` of proc `name` using whatever `elab`'s
    /// argument tables already hold for it.
    pub fn elaborate_instance(&mut self, name: &str, id: ProcId, elab: &mut Elaboration) -> Result<(), Failure> {
        let proc = self.find_proc(name)?;
        let (ctx, state) = self.parts();
        Elaborator::new(ctx, state).elaborate(proc, id, Vec::new(), elab)
    }

    /// Elaborate the test proc `name` with its terminator channel attached
    /// and its initial state taken from the `test_proc` attribute.
    pub fn elaborate_test_proc(&mut self, name: &str) -> Result<Elaboration, Failure> {
        let proc = self.find_proc(name)?;
        let (ctx, state) = self.parts();
        let Some(attr) = ctx.module.proc_decl(proc).test_attr.as_ref() else {
            return Err(Failure::internal(
                format!("'{name}' is not a test proc"),
                &ctx.module.file,
                Span::fake(),
            ));
        };
        let attr_span = attr.span;

        let mut initial = Vec::with_capacity(attr.init.len());
        {
            let mut effects = FunctionEffects;
            let mut ev = Evaluator::new(ctx, &mut *state, &mut effects);
            for expr in &attr.init {
                initial.push(
                    ev.eval_expr(*expr)
                        .map_err(|e| e.into_failure(&ctx.module.file, attr_span))?,
                );
            }
        }

        let root = ProcId::root(name);
        let mut elab = Elaboration::with_root(&root, Vec::new(), initial);
        let (tx, rx) = elab
            .channels
            .allocate("terminator", ConcreteType::bool(), FlowControl::None);
        elab.config_args.insert(root.clone(), vec![Value::Channel(tx)]);
        elab.terminator = Some(rx);

        Elaborator::new(ctx, state).elaborate(proc, root, Vec::new(), &mut elab)?;
        info!(
            proc = name,
            instances = elab.instances.len(),
            channels = elab.channels.len(),
            "test proc network elaborated"
        );
        Ok(elab)
    }

    /// Schedule an elaborated network until its root reports on the
    /// terminator channel.
    pub fn schedule(&mut self, elab: &mut Elaboration) -> Result<ProcRunSummary, Failure> {
        let (ctx, state) = self.parts();
        Scheduler::new(ctx, state).run(elab)
    }

    /// Elaborate and schedule the test proc `name` until it reports on its
    /// terminator channel.
    pub fn run_test_proc(&mut self, name: &str) -> Result<ProcRunSummary, Failure> {
        let mut elab = self.elaborate_test_proc(name)?;
        self.schedule(&mut elab)
    }
}
