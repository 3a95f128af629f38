//! Core expression evaluator.
//!
//! Walks the arena AST of a type-checked module and produces [`Value`]s.
//! Literal and dimension types come from the checker's [`TypeInfo`];
//! symbolic dimensions are evaluated in the current environment, which
//! holds the active parametric bindings.

use std::collections::HashMap;

use dslx_typecheck::{Dim, Type, TypeInfo};
use dslx_types::ast::{
    BinOp, Block, ConstId, EnumId, ExprId, ExprKind, ForLoop, FunctionId, Ident, Invocation,
    MatchArm, Module, ModuleItem, Pattern, PatternKind, Spawn, Stmt, StructId, TypeId, UnaryOp,
};
use dslx_types::Span;
use tracing::{info, trace};

use crate::effects::{EffectError, Effects, SpawnRequest};
use crate::env::Environment;
use crate::error::{EvalError, EvalResult, Failure, FailureKind};
use crate::options::InterpreterOptions;
use crate::parametric::{BindingSolver, Instantiation, ParametricCache, ResolveError, SymbolicBindings};
use crate::value::{Bits, ChannelRef, ConcreteType, FunctionRef, Value, MAX_BITS_WIDTH};

/// Longest `a..b` range materialized as an array.
const MAX_RANGE_LEN: i128 = 1 << 20;

/// Read-only inputs shared by every evaluator of one interpreter.
#[derive(Debug, Clone, Copy)]
pub struct Context<'a> {
    pub module: &'a Module,
    pub type_info: &'a TypeInfo,
    pub options: &'a InterpreterOptions,
}

/// Mutable state that outlives a single evaluation.
#[derive(Debug, Default)]
pub struct RunState {
    pub cache: ParametricCache,
    /// Messages from `trace!`/`trace_fmt!`, in emission order.
    pub trace_log: Vec<String>,
    consts: HashMap<ConstId, Value>,
    enum_variants: HashMap<EnumId, Vec<(String, Bits)>>,
}

/// Evaluates expressions of one module.
///
/// Channel operations, `chan` and `spawn` go through the [`Effects`]
/// supplied by the caller, so the same evaluator serves plain functions,
/// proc `config` and proc `next` ticks.
pub struct Evaluator<'a, 'r> {
    ctx: Context<'a>,
    state: &'r mut RunState,
    effects: &'r mut dyn Effects,
    env: Environment,
    /// Function whose body is being evaluated; names backtrace frames.
    current_fn: Option<FunctionId>,
    depth: usize,
}

impl<'a, 'r> Evaluator<'a, 'r> {
    pub fn new(ctx: Context<'a>, state: &'r mut RunState, effects: &'r mut dyn Effects) -> Self {
        Self {
            ctx,
            state,
            effects,
            env: Environment::new(),
            current_fn: None,
            depth: 0,
        }
    }

    fn module(&self) -> &'a Module {
        self.ctx.module
    }

    fn file(&self) -> &'a str {
        &self.ctx.module.file
    }

    pub(crate) fn failure(&self, kind: FailureKind, message: impl Into<String>, span: Span) -> EvalError {
        Failure::new(kind, message, self.file(), span).into()
    }

    pub(crate) fn internal(&self, message: impl Into<String>, span: Span) -> EvalError {
        self.failure(FailureKind::Internal, message, span)
    }

    pub(crate) fn effect<T>(&self, result: Result<T, EffectError>, span: Span) -> EvalResult<T> {
        result.map_err(|e| match e {
            EffectError::Blocked(channel) => EvalError::Blocked { channel },
            EffectError::Unsupported(message) => self.failure(FailureKind::Unsupported, message, span),
            EffectError::Internal(message) => self.internal(message, span),
        })
    }

    pub(crate) fn effects_send(&mut self, channel: ChannelRef, value: Value) -> Result<(), EffectError> {
        self.effects.send(channel, value)
    }

    pub(crate) fn effects_recv(&mut self, channel: ChannelRef, blocking: bool) -> Result<Option<Value>, EffectError> {
        self.effects.recv(channel, blocking)
    }

    /// `module::function` for the body being evaluated.
    fn frame_name(&self) -> String {
        match self.current_fn {
            Some(f) => self.module().qualified_name(f),
            None => self.module().name.clone(),
        }
    }

    /// Record the call at `args_span` on a failure unwinding through it.
    fn annotate(&self, err: EvalError, args_span: Span) -> EvalError {
        match err {
            EvalError::Failure(mut failure) => {
                failure.push_frame(self.frame_name(), self.file(), args_span);
                EvalError::Failure(failure)
            }
            blocked => blocked,
        }
    }

    fn with_env<T>(&mut self, env: Environment, f: impl FnOnce(&mut Self) -> T) -> T {
        let saved = std::mem::replace(&mut self.env, env);
        let out = f(self);
        self.env = saved;
        out
    }

    fn bindings_env(bindings: &SymbolicBindings) -> Environment {
        let mut env = Environment::new();
        for (name, value) in bindings.iter() {
            env.define(name, value.clone());
        }
        env
    }

    // ══════════════════════════════════════════════════════════════════════
    // Functions
    // ══════════════════════════════════════════════════════════════════════

    /// Call a user function: resolve its parametrics, check the arguments
    /// against the instantiated signature and evaluate the body.
    pub fn call_function(
        &mut self,
        function: FunctionId,
        args: Vec<Value>,
        explicit: Vec<Value>,
        span: Span,
    ) -> EvalResult<Value> {
        let decl = self.module().function(function);
        if args.len() != decl.params.len() {
            return Err(self.internal(
                format!(
                    "'{}' takes {} argument(s) but was given {}",
                    decl.name.name,
                    decl.params.len(),
                    args.len()
                ),
                span,
            ));
        }
        let bindings = self.resolve_bindings(function, explicit, &args, span)?;
        let inst = self.instantiate(function, &bindings, span)?;
        for ((param, arg), ty) in decl.params.iter().zip(&args).zip(&inst.param_types) {
            if !conforms(arg, ty) {
                return Err(self.internal(
                    format!(
                        "argument '{}' of '{}' is {arg} but the signature expects {ty}",
                        param.name.name, decl.name.name
                    ),
                    span,
                ));
            }
        }
        let locals = decl
            .params
            .iter()
            .map(|p| p.name.name.clone())
            .zip(args)
            .collect();
        let result = self.run_body(function, &bindings, locals)?;
        if !conforms(&result, &inst.return_type) {
            return Err(self.internal(
                format!(
                    "'{}' returned {result} but the signature declares {}",
                    decl.name.name, inst.return_type
                ),
                span,
            ));
        }
        Ok(result)
    }

    /// Evaluate a function body with `bindings` and `locals` in scope. The
    /// caller's environment is restored afterwards, failure or not.
    pub fn run_body(
        &mut self,
        function: FunctionId,
        bindings: &SymbolicBindings,
        locals: Vec<(String, Value)>,
    ) -> EvalResult<Value> {
        let decl = self.module().function(function);
        if self.depth >= self.ctx.options.max_call_depth {
            return Err(self.internal(
                format!(
                    "call depth limit of {} exceeded in '{}'",
                    self.ctx.options.max_call_depth, decl.name.name
                ),
                decl.span,
            ));
        }
        let mut env = Self::bindings_env(bindings);
        for (name, value) in locals {
            env.define(&name, value);
        }
        let saved_fn = self.current_fn.replace(function);
        self.depth += 1;
        let result = self.with_env(env, |this| this.eval_expr(decl.body));
        self.depth -= 1;
        self.current_fn = saved_fn;
        result
    }

    /// Bind every parametric of `function` for a call with `args`.
    pub fn resolve_bindings(
        &mut self,
        function: FunctionId,
        explicit: Vec<Value>,
        args: &[Value],
        span: Span,
    ) -> EvalResult<SymbolicBindings> {
        let module = self.module();
        let type_info = self.ctx.type_info;
        let decl = module.function(function);
        if explicit.len() > decl.parametrics.len() {
            return Err(self.internal(
                format!(
                    "'{}' takes {} parametric(s) but was given {}",
                    decl.name.name,
                    decl.parametrics.len(),
                    explicit.len()
                ),
                span,
            ));
        }
        if decl.parametrics.is_empty() {
            return Ok(SymbolicBindings::new());
        }

        let mut binding_types = Vec::with_capacity(decl.parametrics.len());
        for binding in &decl.parametrics {
            binding_types.push(self.annotation_type(binding.ty, binding.span)?);
        }
        let mut solver = BindingSolver::new(module, decl, binding_types);
        for (binding, value) in decl.parametrics.iter().zip(explicit) {
            solver
                .bind(&binding.name.name, value)
                .map_err(|e| self.resolve_failure(e, decl.name.name.as_str(), span))?;
        }
        for (param, arg) in decl.params.iter().zip(args) {
            if let Some(ty) = type_info.annotation_type(param.ty) {
                solver
                    .unify(ty, arg)
                    .map_err(|e| self.resolve_failure(e, decl.name.name.as_str(), span))?;
            }
        }
        for binding in &decl.parametrics {
            let Some(default) = binding.default else {
                continue;
            };
            let partial = solver.partial();
            let value = self.with_env(Self::bindings_env(&partial), |this| this.eval_expr(default))?;
            solver
                .bind(&binding.name.name, value)
                .map_err(|e| self.resolve_failure(e, decl.name.name.as_str(), span))?;
        }
        solver
            .finish()
            .map_err(|e| self.resolve_failure(e, decl.name.name.as_str(), span))
    }

    fn resolve_failure(&self, err: ResolveError, function: &str, span: Span) -> EvalError {
        self.internal(format!("in call to '{function}': {err}"), span)
    }

    /// Signature of `function` under `bindings`, memoized for parametric
    /// functions.
    fn instantiate(
        &mut self,
        function: FunctionId,
        bindings: &SymbolicBindings,
        span: Span,
    ) -> EvalResult<Instantiation> {
        if !bindings.is_empty() {
            if let Some(inst) = self.state.cache.lookup(function, bindings) {
                let inst = inst.clone();
                trace!(function = function.0, bindings = %bindings, "instantiation cache hit");
                return Ok(inst);
            }
        }
        let decl = self.module().function(function);
        let built = self.with_env(Self::bindings_env(bindings), |this| {
            let mut param_types = Vec::with_capacity(decl.params.len());
            for param in &decl.params {
                param_types.push(this.annotation_type(param.ty, param.span)?);
            }
            let return_type = match decl.return_type {
                Some(ty) => this.annotation_type(ty, span)?,
                None => ConcreteType::unit(),
            };
            Ok::<_, EvalError>((param_types, return_type))
        });
        let (param_types, return_type) = built?;
        let inst = Instantiation {
            function,
            bindings: bindings.clone(),
            param_types,
            return_type,
        };
        if !bindings.is_empty() {
            self.state.cache.insert(inst.clone());
        }
        Ok(inst)
    }

    // ══════════════════════════════════════════════════════════════════════
    // Types
    // ══════════════════════════════════════════════════════════════════════

    /// Resolve every dimension of `ty` in the current environment.
    pub fn concretize(&mut self, ty: &Type, span: Span) -> EvalResult<ConcreteType> {
        let module = self.module();
        Ok(match ty {
            Type::Bits { signed, width } => {
                let width = self.dim(*width, span)?;
                self.check_width(width, span)?;
                ConcreteType::Bits {
                    signed: *signed,
                    width,
                }
            }
            Type::Array { element, size } => {
                let size = self.dim(*size, span)?;
                ConcreteType::Array {
                    element: Box::new(self.concretize(element, span)?),
                    size,
                }
            }
            Type::Tuple(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.concretize(item, span)?);
                }
                ConcreteType::Tuple(out)
            }
            Type::Struct(id) => ConcreteType::Struct(module.struct_def(*id).name.name.clone()),
            Type::Enum(id) => {
                let def = module.enum_def(*id);
                match self.annotation_type(def.underlying, def.span)? {
                    ConcreteType::Bits { signed, width } => ConcreteType::Enum {
                        name: def.name.name.clone(),
                        signed,
                        width,
                    },
                    other => {
                        return Err(self.internal(
                            format!("enum '{}' has non-bits underlying type {other}", def.name.name),
                            span,
                        ))
                    }
                }
            }
            Type::Token => ConcreteType::Token,
            Type::Channel { direction, .. } => ConcreteType::Channel {
                direction: *direction,
            },
            Type::Function(_) => ConcreteType::Function,
            Type::Unknown => return Err(self.internal("type was not resolved by the checker", span)),
        })
    }

    fn dim(&mut self, dim: Dim, span: Span) -> EvalResult<u32> {
        match dim {
            Dim::Known(n) => u32::try_from(n).map_err(|_| {
                self.failure(FailureKind::Unsupported, format!("dimension {n} is too large"), span)
            }),
            Dim::Symbolic(expr) => {
                let value = self.eval_expr(expr)?;
                value
                    .as_bits()
                    .and_then(Bits::to_u64)
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| self.internal(format!("dimension evaluated to {value}"), span))
            }
            Dim::Unknown => Err(self.internal("dimension could not be resolved", span)),
        }
    }

    fn check_width(&self, width: u32, span: Span) -> EvalResult<()> {
        if width > MAX_BITS_WIDTH {
            return Err(self.failure(
                FailureKind::Unsupported,
                format!("bit widths above {MAX_BITS_WIDTH} are not supported (got {width})"),
                span,
            ));
        }
        Ok(())
    }

    fn expr_type(&mut self, id: ExprId) -> EvalResult<ConcreteType> {
        let type_info = self.ctx.type_info;
        let span = self.module().expr(id).span;
        match type_info.expr_type(id) {
            Some(ty) => self.concretize(ty, span),
            None => Err(self.internal("no type recorded for expression", span)),
        }
    }

    pub(crate) fn annotation_type(&mut self, id: TypeId, span: Span) -> EvalResult<ConcreteType> {
        let type_info = self.ctx.type_info;
        match type_info.annotation_type(id) {
            Some(ty) => self.concretize(ty, span),
            None => Err(self.internal("no type recorded for annotation", span)),
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Expression evaluation
    // ══════════════════════════════════════════════════════════════════════

    pub fn eval_expr(&mut self, id: ExprId) -> EvalResult<Value> {
        let expr = self.module().expr(id);
        let span = expr.span;
        match &expr.kind {
            ExprKind::Number {
                value, negative, ..
            } => self.eval_number(id, *value, *negative, span),
            ExprKind::Bool(b) => Ok(Value::bool(*b)),
            ExprKind::Name(name) => self.eval_name(name, span),
            ExprKind::ColonRef { subject, member } => self.eval_colon_ref(subject, member, span),
            ExprKind::Unary { op, operand } => self.eval_unary(*op, *operand, span),
            ExprKind::Binary { op, lhs, rhs } => self.eval_binary(*op, *lhs, *rhs, span),
            ExprKind::Cast { expr, ty } => self.eval_cast(*expr, *ty, span),
            ExprKind::Tuple(items) => Ok(Value::Tuple(self.eval_all(items)?)),
            ExprKind::Array {
                elements,
                has_ellipsis,
                ..
            } => self.eval_array(id, elements, *has_ellipsis, span),
            ExprKind::StructInstance { name, fields, base } => {
                self.eval_struct_instance(name, fields, *base, span)
            }
            ExprKind::Index { lhs, index } => self.eval_index(*lhs, *index, span),
            ExprKind::Slice { lhs, start, limit } => self.eval_slice(*lhs, *start, *limit, span),
            ExprKind::WidthSlice { lhs, start, width } => {
                self.eval_width_slice(*lhs, *start, *width, span)
            }
            ExprKind::TupleIndex { lhs, index } => match self.eval_expr(*lhs)? {
                Value::Tuple(mut items) if (*index as usize) < items.len() => {
                    Ok(items.swap_remove(*index as usize))
                }
                other => Err(self.internal(format!("cannot take element {index} of {other}"), span)),
            },
            ExprKind::FieldAccess { lhs, field } => self.eval_field_access(*lhs, field, span),
            ExprKind::Invocation(inv) => self.eval_invocation(inv, span),
            ExprKind::FormatMacro {
                name,
                format,
                args,
                args_span,
            } => self.eval_macro(name, format, args, *args_span, span),
            ExprKind::If {
                cond,
                then_block,
                else_branch,
            } => {
                if self.eval_condition(*cond)? {
                    self.eval_expr(*then_block)
                } else {
                    match else_branch {
                        Some(e) => self.eval_expr(*e),
                        None => Ok(Value::unit()),
                    }
                }
            }
            ExprKind::Match { subject, arms } => self.eval_match(*subject, arms, span),
            ExprKind::Block(block) => {
                self.env.push_scope();
                let result = self.eval_block(block);
                self.env.pop_scope();
                result
            }
            ExprKind::For(for_loop) => self.eval_for(for_loop, span),
            ExprKind::Range { start, limit } => {
                let start = self.eval_bits(*start)?;
                let limit = self.eval_bits(*limit)?;
                self.range_values(start, limit, span)
            }
            ExprKind::Spawn(spawn) => self.eval_spawn(spawn, span),
            ExprKind::Channel { payload } => {
                let payload = self.annotation_type(*payload, span)?;
                let made = self.effects.make_channel(payload, span);
                let (tx, rx) = self.effect(made, span)?;
                Ok(Value::Tuple(vec![Value::Channel(tx), Value::Channel(rx)]))
            }
        }
    }

    fn eval_all(&mut self, exprs: &[ExprId]) -> EvalResult<Vec<Value>> {
        let mut values = Vec::with_capacity(exprs.len());
        for e in exprs {
            values.push(self.eval_expr(*e)?);
        }
        Ok(values)
    }

    fn eval_bits(&mut self, id: ExprId) -> EvalResult<Bits> {
        match self.eval_expr(id)? {
            Value::Bits(b) | Value::Enum { bits: b, .. } => Ok(b),
            other => {
                let span = self.module().expr(id).span;
                Err(self.internal(format!("expected a bits value, got {other}"), span))
            }
        }
    }

    fn eval_condition(&mut self, id: ExprId) -> EvalResult<bool> {
        Ok(self.eval_bits(id)?.is_true())
    }

    // ── Literals and names ────────────────────────────────────────────────

    fn eval_number(&mut self, id: ExprId, value: u128, negative: bool, span: Span) -> EvalResult<Value> {
        let raw = if negative { value.wrapping_neg() } else { value };
        match self.expr_type(id)? {
            ConcreteType::Bits { signed, width } => Ok(Value::Bits(Bits::new(signed, width, raw))),
            other => Err(self.internal(format!("number literal typed as {other}"), span)),
        }
    }

    /// Locals shadow module constants, which shadow functions and builtins.
    fn eval_name(&mut self, name: &str, span: Span) -> EvalResult<Value> {
        if let Some(value) = self.env.get(name) {
            return Ok(value.clone());
        }
        let module = self.module();
        if let Some(c) = module.find_const(name) {
            return self.const_value(c);
        }
        if let Some(f) = module.find_function(name) {
            return Ok(Value::Function(FunctionRef::User {
                function: f,
                qualified_name: module.qualified_name(f),
            }));
        }
        if let Some(b) = dslx_typecheck::Builtin::from_name(name) {
            return Ok(Value::Function(FunctionRef::Builtin(b)));
        }
        Err(self.internal(format!("unresolved name '{name}'"), span))
    }

    /// Module constants are evaluated once, outside any function.
    fn const_value(&mut self, id: ConstId) -> EvalResult<Value> {
        if let Some(value) = self.state.consts.get(&id) {
            return Ok(value.clone());
        }
        let def = self.module().const_def(id);
        let saved_fn = self.current_fn.take();
        let value = self.with_env(Environment::new(), |this| this.eval_expr(def.value));
        self.current_fn = saved_fn;
        let value = value?;
        self.state.consts.insert(id, value.clone());
        Ok(value)
    }

    fn enum_for_name(&self, name: &str) -> Option<EnumId> {
        let module = self.module();
        match module.find_type_item(name)? {
            ModuleItem::Enum(e) => Some(e),
            ModuleItem::Alias(a) => match self.ctx.type_info.annotation_type(module.alias(a).ty)? {
                Type::Enum(e) => Some(*e),
                _ => None,
            },
            _ => None,
        }
    }

    fn struct_for_name(&self, name: &str) -> Option<StructId> {
        let module = self.module();
        match module.find_type_item(name)? {
            ModuleItem::Struct(s) => Some(s),
            ModuleItem::Alias(a) => match self.ctx.type_info.annotation_type(module.alias(a).ty)? {
                Type::Struct(s) => Some(*s),
                _ => None,
            },
            _ => None,
        }
    }

    fn enum_variants(&mut self, id: EnumId) -> EvalResult<Vec<(String, Bits)>> {
        if let Some(variants) = self.state.enum_variants.get(&id) {
            return Ok(variants.clone());
        }
        let def = self.module().enum_def(id);
        let saved_fn = self.current_fn.take();
        let evaluated = self.with_env(Environment::new(), |this| {
            let mut out = Vec::with_capacity(def.variants.len());
            for variant in &def.variants {
                out.push((variant.name.name.clone(), this.eval_bits(variant.value)?));
            }
            Ok::<_, EvalError>(out)
        });
        self.current_fn = saved_fn;
        let variants = evaluated?;
        self.state.enum_variants.insert(id, variants.clone());
        Ok(variants)
    }

    /// An enum value carrying `bits`, named by the first matching variant.
    fn make_enum(&mut self, id: EnumId, bits: Bits) -> EvalResult<Value> {
        let variants = self.enum_variants(id)?;
        let variant = variants
            .into_iter()
            .find(|(_, v)| v.raw() == bits.raw())
            .map(|(name, _)| name);
        Ok(Value::Enum {
            name: self.module().enum_def(id).name.name.clone(),
            variant,
            bits,
        })
    }

    fn eval_colon_ref(&mut self, subject: &Ident, member: &Ident, span: Span) -> EvalResult<Value> {
        let Some(id) = self.enum_for_name(&subject.name) else {
            return Err(self.internal(format!("'{}' is not an enum", subject.name), span));
        };
        let variants = self.enum_variants(id)?;
        match variants.into_iter().find(|(name, _)| name == &member.name) {
            Some((variant, bits)) => Ok(Value::Enum {
                name: self.module().enum_def(id).name.name.clone(),
                variant: Some(variant),
                bits,
            }),
            None => Err(self.internal(
                format!("enum '{}' has no variant '{}'", subject.name, member.name),
                span,
            )),
        }
    }

    // ── Operators ─────────────────────────────────────────────────────────

    fn eval_unary(&mut self, op: UnaryOp, operand: ExprId, span: Span) -> EvalResult<Value> {
        match (op, self.eval_expr(operand)?) {
            (UnaryOp::Invert, Value::Bits(b)) => Ok(Value::Bits(b.not())),
            (UnaryOp::Negate, Value::Bits(b)) => Ok(Value::Bits(b.neg())),
            (op, other) => Err(self.internal(format!("cannot apply {op:?} to {other}"), span)),
        }
    }

    /// Both operands are always evaluated, `&&` and `||` included.
    fn eval_binary(&mut self, op: BinOp, lhs: ExprId, rhs: ExprId, span: Span) -> EvalResult<Value> {
        let l = self.eval_expr(lhs)?;
        let r = self.eval_expr(rhs)?;
        match op {
            BinOp::Eq => return Ok(Value::bool(l == r)),
            BinOp::Ne => return Ok(Value::bool(l != r)),
            BinOp::Concat => return self.concat(l, r, span),
            _ => {}
        }
        let (Some(a), Some(b)) = (l.as_bits(), r.as_bits()) else {
            return Err(self.internal(
                format!("operator '{}' needs bits operands, got {l} and {r}", op.symbol()),
                span,
            ));
        };
        Ok(match op {
            BinOp::Add => Value::Bits(a.add(b)),
            BinOp::Sub => Value::Bits(a.sub(b)),
            BinOp::Mul => Value::Bits(a.mul(b)),
            BinOp::Div => Value::Bits(a.div(b)),
            BinOp::Mod => Value::Bits(a.rem(b)),
            BinOp::Shl => Value::Bits(a.shl(b.raw())),
            BinOp::Shr => Value::Bits(a.shr(b.raw())),
            BinOp::BitAnd => Value::Bits(a.and(b)),
            BinOp::BitOr => Value::Bits(a.or(b)),
            BinOp::BitXor => Value::Bits(a.xor(b)),
            BinOp::LogicalAnd => Value::bool(a.is_true() && b.is_true()),
            BinOp::LogicalOr => Value::bool(a.is_true() || b.is_true()),
            BinOp::Lt => Value::bool(a.compare(b).is_lt()),
            BinOp::Le => Value::bool(a.compare(b).is_le()),
            BinOp::Gt => Value::bool(a.compare(b).is_gt()),
            BinOp::Ge => Value::bool(a.compare(b).is_ge()),
            BinOp::Eq | BinOp::Ne | BinOp::Concat => {
                return Err(self.internal(format!("operator '{}' fell through", op.symbol()), span))
            }
        })
    }

    fn concat(&self, l: Value, r: Value, span: Span) -> EvalResult<Value> {
        match (l, r) {
            (Value::Bits(a), Value::Bits(b)) => a.concat(&b).map(Value::Bits).ok_or_else(|| {
                self.failure(
                    FailureKind::Unsupported,
                    format!(
                        "concatenation is {} bits wide; widths above {MAX_BITS_WIDTH} are not supported",
                        u64::from(a.width()) + u64::from(b.width())
                    ),
                    span,
                )
            }),
            (Value::Array(mut a), Value::Array(b)) => {
                a.extend(b);
                Ok(Value::Array(a))
            }
            (l, r) => Err(self.internal(format!("cannot concatenate {l} and {r}"), span)),
        }
    }

    fn eval_cast(&mut self, expr: ExprId, ty: TypeId, span: Span) -> EvalResult<Value> {
        let value = self.eval_expr(expr)?;
        let target = self.annotation_type(ty, span)?;
        match (value, target) {
            (Value::Bits(b) | Value::Enum { bits: b, .. }, ConcreteType::Bits { signed, width }) => {
                Ok(Value::Bits(b.resize(signed, width)))
            }
            (Value::Bits(b) | Value::Enum { bits: b, .. }, ConcreteType::Enum { name, signed, width }) => {
                let Some(id) = self.module().find_enum(&name) else {
                    return Err(self.internal(format!("unknown enum '{name}'"), span));
                };
                self.make_enum(id, b.resize(signed, width))
            }
            // Array to bits: element 0 lands in the most significant bits.
            (Value::Array(items), ConcreteType::Bits { signed, width }) => {
                let mut acc = Bits::unsigned(0, 0);
                for item in &items {
                    let Some(b) = item.as_bits() else {
                        return Err(self.internal(format!("cannot cast array element {item} to bits"), span));
                    };
                    acc = acc.concat(b).ok_or_else(|| {
                        self.failure(FailureKind::Unsupported, "array is too wide to cast to bits", span)
                    })?;
                }
                if acc.width() != width {
                    return Err(self.internal(
                        format!("array of {} bits cast to a {width}-bit type", acc.width()),
                        span,
                    ));
                }
                Ok(Value::Bits(Bits::new(signed, width, acc.raw())))
            }
            (value, target) => Err(self.internal(format!("cannot cast {value} to {target}"), span)),
        }
    }

    // ── Aggregates ────────────────────────────────────────────────────────

    fn eval_array(&mut self, id: ExprId, elements: &[ExprId], has_ellipsis: bool, span: Span) -> EvalResult<Value> {
        let mut items = self.eval_all(elements)?;
        if has_ellipsis {
            let ConcreteType::Array { size, .. } = self.expr_type(id)? else {
                return Err(self.internal("array literal with '...' is not an array", span));
            };
            let Some(last) = items.last().cloned() else {
                return Err(self.internal("'...' needs at least one element to repeat", span));
            };
            items.resize(size as usize, last);
        }
        Ok(Value::Array(items))
    }

    fn eval_struct_instance(
        &mut self,
        name: &Ident,
        fields: &[(Ident, ExprId)],
        base: Option<ExprId>,
        span: Span,
    ) -> EvalResult<Value> {
        let Some(id) = self.struct_for_name(&name.name) else {
            return Err(self.internal(format!("'{}' is not a struct", name.name), span));
        };
        let def = self.module().struct_def(id);
        let mut provided = Vec::with_capacity(fields.len());
        for (field, expr) in fields {
            provided.push((field.name.as_str(), self.eval_expr(*expr)?));
        }
        let base_fields = match base {
            Some(b) => match self.eval_expr(b)? {
                Value::Struct { fields, .. } => fields,
                other => return Err(self.internal(format!("struct update base is {other}"), span)),
            },
            None => Vec::new(),
        };

        let mut out = Vec::with_capacity(def.fields.len());
        for field in &def.fields {
            let name = field.name.name.as_str();
            let value = provided
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, v)| v)
                .or_else(|| base_fields.iter().find(|(n, _)| n == name).map(|(_, v)| v));
            match value {
                Some(v) => out.push((name.to_string(), v.clone())),
                None => {
                    return Err(self.internal(
                        format!("struct '{}' instance has no value for field '{name}'", def.name.name),
                        span,
                    ))
                }
            }
        }
        Ok(Value::Struct {
            name: def.name.name.clone(),
            fields: out,
        })
    }

    /// Out-of-range indices read the last element.
    fn eval_index(&mut self, lhs: ExprId, index: ExprId, span: Span) -> EvalResult<Value> {
        let array = self.eval_expr(lhs)?;
        let index = self.eval_bits(index)?;
        let mut items = match array {
            Value::Array(items) => items,
            other => return Err(self.internal(format!("cannot index {other}"), span)),
        };
        if items.is_empty() {
            return Err(self.internal("index into an empty array", span));
        }
        let i = usize::try_from(index.raw()).unwrap_or(usize::MAX).min(items.len() - 1);
        Ok(items.swap_remove(i))
    }

    /// `x[lo:hi]`: negative bounds count from the top, everything clamps to
    /// the value's width.
    fn eval_slice(&mut self, lhs: ExprId, start: Option<ExprId>, limit: Option<ExprId>, span: Span) -> EvalResult<Value> {
        let Value::Bits(bits) = self.eval_expr(lhs)? else {
            return Err(self.internal("only bits values can be sliced", span));
        };
        let width = i128::from(bits.width());
        let start = match start {
            Some(e) => self.eval_bits(e)?.to_i128(),
            None => 0,
        };
        let limit = match limit {
            Some(e) => self.eval_bits(e)?.to_i128(),
            None => width,
        };
        let clamp = |x: i128| if x < 0 { (width + x).max(0) } else { x.min(width) };
        let (s, l) = (clamp(start), clamp(limit));
        Ok(Value::Bits(bits.slice(s as u32, (l - s).max(0) as u32)))
    }

    fn eval_width_slice(&mut self, lhs: ExprId, start: ExprId, width: TypeId, span: Span) -> EvalResult<Value> {
        let Value::Bits(bits) = self.eval_expr(lhs)? else {
            return Err(self.internal("only bits values can be sliced", span));
        };
        let start = u32::try_from(self.eval_bits(start)?.raw()).unwrap_or(u32::MAX);
        match self.annotation_type(width, span)? {
            ConcreteType::Bits { signed, width } => {
                Ok(Value::Bits(Bits::new(signed, width, bits.slice(start, width).raw())))
            }
            other => Err(self.internal(format!("width slice to non-bits type {other}"), span)),
        }
    }

    fn eval_field_access(&mut self, lhs: ExprId, field: &Ident, span: Span) -> EvalResult<Value> {
        match self.eval_expr(lhs)? {
            Value::Struct { fields, name } => fields
                .into_iter()
                .find(|(n, _)| n == &field.name)
                .map(|(_, v)| v)
                .ok_or_else(|| self.internal(format!("struct '{name}' has no field '{}'", field.name), span)),
            other => Err(self.internal(format!("cannot access field '{}' of {other}", field.name), span)),
        }
    }

    // ── Control flow ──────────────────────────────────────────────────────

    fn eval_block(&mut self, block: &Block) -> EvalResult<Value> {
        for stmt in &block.stmts {
            match stmt {
                Stmt::Let {
                    pattern, value, span, ..
                } => {
                    let value = self.eval_expr(*value)?;
                    if !self.bind_pattern(pattern, &value, false)? {
                        return Err(self.internal(format!("let pattern does not match {value}"), *span));
                    }
                }
                Stmt::Expr(e) => {
                    self.eval_expr(*e)?;
                }
            }
        }
        match block.value {
            Some(e) => self.eval_expr(e),
            None => Ok(Value::unit()),
        }
    }

    fn eval_match(&mut self, subject: ExprId, arms: &[MatchArm], span: Span) -> EvalResult<Value> {
        let subject = self.eval_expr(subject)?;
        for arm in arms {
            for pattern in &arm.patterns {
                self.env.push_scope();
                let result = match self.bind_pattern(pattern, &subject, true) {
                    Ok(true) => Some(self.eval_expr(arm.body)),
                    Ok(false) => None,
                    Err(e) => Some(Err(e)),
                };
                self.env.pop_scope();
                if let Some(result) = result {
                    return result;
                }
            }
        }
        Err(self.internal(format!("no match arm matched {subject}"), span))
    }

    /// Bind `pattern` against `value` in the innermost scope. In a `match`,
    /// a name that refers to a module constant compares instead of binding.
    fn bind_pattern(&mut self, pattern: &Pattern, value: &Value, in_match: bool) -> EvalResult<bool> {
        match &pattern.kind {
            PatternKind::Wildcard => Ok(true),
            PatternKind::Name(ident) => {
                if in_match && self.env.get(&ident.name).is_none() {
                    if let Some(c) = self.module().find_const(&ident.name) {
                        return Ok(&self.const_value(c)? == value);
                    }
                }
                self.env.define(&ident.name, value.clone());
                Ok(true)
            }
            PatternKind::Tuple(items) => {
                let Value::Tuple(values) = value else {
                    return Err(self.internal(format!("tuple pattern against {value}"), pattern.span));
                };
                if values.len() != items.len() {
                    return Err(self.internal(
                        format!("{}-element pattern against {value}", items.len()),
                        pattern.span,
                    ));
                }
                for (p, v) in items.iter().zip(values) {
                    if !self.bind_pattern(p, v, in_match)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            PatternKind::Literal(e) | PatternKind::ColonRef(e) => Ok(&self.eval_expr(*e)? == value),
        }
    }

    /// `for (i, acc) in xs { body }(init)`
    fn eval_for(&mut self, for_loop: &ForLoop, span: Span) -> EvalResult<Value> {
        let Value::Array(items) = self.eval_expr(for_loop.iterable)? else {
            return Err(self.internal("for loop over a non-array value", span));
        };
        let mut acc = self.eval_expr(for_loop.init)?;
        for item in items {
            let pair = Value::Tuple(vec![item, acc]);
            self.env.push_scope();
            let step = match self.bind_pattern(&for_loop.pattern, &pair, false) {
                Ok(true) => self.eval_expr(for_loop.body),
                Ok(false) => Err(self.internal("for loop pattern does not match", span)),
                Err(e) => Err(e),
            };
            self.env.pop_scope();
            acc = step?;
        }
        Ok(acc)
    }

    pub(crate) fn range_values(&self, start: Bits, limit: Bits, span: Span) -> EvalResult<Value> {
        if start.compare(&limit).is_ge() {
            return Ok(Value::Array(Vec::new()));
        }
        let count = limit.to_i128().wrapping_sub(start.to_i128());
        if !(0..=MAX_RANGE_LEN).contains(&count) {
            return Err(self.failure(
                FailureKind::Unsupported,
                format!("range {start}..{limit} is too long"),
                span,
            ));
        }
        Ok(Value::Array(
            (0..count)
                .map(|i| Value::Bits(start.add(&Bits::new(start.is_signed(), start.width(), i as u128))))
                .collect(),
        ))
    }

    // ── Calls, macros and procs ───────────────────────────────────────────

    /// A failure raised inside the callee gains a frame for this call site.
    fn eval_invocation(&mut self, inv: &Invocation, span: Span) -> EvalResult<Value> {
        let callee = self.eval_expr(inv.callee)?;
        let explicit = self.eval_all(&inv.parametrics)?;
        let args = self.eval_all(&inv.args)?;
        let result = match callee {
            Value::Function(FunctionRef::User { function, .. }) => {
                self.call_function(function, args, explicit, span)
            }
            Value::Function(FunctionRef::Builtin(b)) => self.call_builtin(b, args, span),
            other => Err(self.internal(format!("{other} is not callable"), span)),
        };
        result.map_err(|e| self.annotate(e, inv.args_span))
    }

    fn eval_macro(
        &mut self,
        name: &Ident,
        format: &str,
        args: &[ExprId],
        args_span: Span,
        span: Span,
    ) -> EvalResult<Value> {
        let mut values = self.eval_all(args)?;
        match name.name.as_str() {
            "trace_fmt" => {
                let message = render_format(format, &values);
                self.emit_trace(message, span)?;
                Ok(Value::unit())
            }
            "trace" => {
                let Some(value) = values.pop() else {
                    return Err(self.internal("trace! needs an argument", span));
                };
                self.emit_trace(value.to_string(), span)?;
                Ok(value)
            }
            "fail" => {
                let message = if format.is_empty() && values.is_empty() {
                    "fail!() reached".to_string()
                } else {
                    render_format(format, &values)
                };
                let err = self.failure(FailureKind::Assertion, message, span);
                Err(self.annotate(err, args_span))
            }
            other => Err(self.failure(
                FailureKind::Unsupported,
                format!("macro '{other}!' is not supported"),
                span,
            )),
        }
    }

    fn emit_trace(&mut self, message: String, span: Span) -> EvalResult<()> {
        let emit = self.effects.trace();
        if self.effect(emit, span)? && self.ctx.options.trace_enabled {
            info!(target: "dslx::trace", function = %self.frame_name(), "{message}");
            self.state.trace_log.push(message);
        }
        Ok(())
    }

    fn eval_spawn(&mut self, spawn: &Spawn, span: Span) -> EvalResult<Value> {
        let Some(proc) = self.module().find_proc(&spawn.proc_name.name) else {
            return Err(self.internal(format!("unknown proc '{}'", spawn.proc_name.name), span));
        };
        let request = SpawnRequest {
            proc,
            parametrics: self.eval_all(&spawn.parametrics)?,
            config_args: self.eval_all(&spawn.config_args)?,
            next_args: self.eval_all(&spawn.next_args)?,
            span,
        };
        let spawned = self.effects.spawn(request);
        self.effect(spawned, span)?;
        Ok(Value::unit())
    }
}

/// Replace each `{}` in `format` with the next value, without type prefixes.
fn render_format(format: &str, values: &[Value]) -> String {
    let mut out = String::with_capacity(format.len());
    let mut values = values.iter();
    let mut rest = format;
    while let Some(pos) = rest.find("{}") {
        out.push_str(&rest[..pos]);
        match values.next() {
            Some(v) => out.push_str(&v.format_plain()),
            None => out.push_str("{}"),
        }
        rest = &rest[pos + 2..];
    }
    out.push_str(rest);
    out
}

/// Whether `value` has the shape of `ty`.
pub(crate) fn conforms(value: &Value, ty: &ConcreteType) -> bool {
    match (value, ty) {
        (Value::Bits(b), ConcreteType::Bits { signed, width }) => {
            b.is_signed() == *signed && b.width() == *width
        }
        (Value::Enum { name, .. }, ConcreteType::Enum { name: expected, .. }) => name == expected,
        (Value::Tuple(items), ConcreteType::Tuple(types)) => {
            items.len() == types.len() && items.iter().zip(types).all(|(v, t)| conforms(v, t))
        }
        (Value::Array(items), ConcreteType::Array { element, size }) => {
            items.len() == *size as usize && items.iter().all(|v| conforms(v, element))
        }
        (Value::Struct { name, .. }, ConcreteType::Struct(expected)) => name == expected,
        (Value::Channel(c), ConcreteType::Channel { direction }) => c.direction == *direction,
        (Value::Token, ConcreteType::Token) | (Value::Function(_), ConcreteType::Function) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_format() {
        let values = [Value::u32(7), Value::sbits(8, -2)];
        assert_eq!(render_format("a={} b={}!", &values), "a=7 b=-2!");
        assert_eq!(render_format("no placeholders", &[]), "no placeholders");
        assert_eq!(render_format("{} {}", &values[..1]), "7 {}");
    }

    #[test]
    fn test_conforms() {
        let u8_ty = ConcreteType::Bits {
            signed: false,
            width: 8,
        };
        assert!(conforms(&Value::ubits(8, 1), &u8_ty));
        assert!(!conforms(&Value::sbits(8, 1), &u8_ty));
        let arr = ConcreteType::Array {
            element: Box::new(u8_ty.clone()),
            size: 2,
        };
        assert!(conforms(&Value::Array(vec![Value::ubits(8, 1); 2]), &arr));
        assert!(!conforms(&Value::Array(vec![Value::ubits(8, 1)]), &arr));
        assert!(conforms(&Value::unit(), &ConcreteType::unit()));
    }
}
