//! DSLX type checker: walks a parsed [`Module`] and records a [`Type`] for
//! every expression and type annotation.
//!
//! Entry point: [`TypeChecker::check`].
//!
//! Untyped number literals take their type from context (the other operand,
//! the parameter, the annotation, the return type). Index and range literals
//! with no context default to `u32`, slice bounds to `s32`; any other
//! unconstrained literal is an error.
//!
//! Error codes emitted:
//! - E200: unknown type
//! - E201: type mismatch
//! - E202: wrong argument count
//! - E203: literal does not fit its type
//! - E204: cannot infer a literal's type
//! - E205: not indexable
//! - E300: undefined name
//! - E301: duplicate definition
//! - E302: unknown struct field
//! - E400: malformed proc
//! - E401: `spawn`/`chan` outside a proc `config`
//! - E402: recursion

use std::collections::{HashMap, HashSet};

use dslx_types::ast::*;
use dslx_types::{CompileErrors, DslxError, ErrorCode, SourceFile, Span};
use tracing::debug;

use crate::builtins::Builtin;
use crate::env::{ScopeKind, TypeEnv};
use crate::ty::{Callee, Dim, Type};
use crate::TypeInfo;

// ══════════════════════════════════════════════════════════════════════════════
// TypeChecker
// ══════════════════════════════════════════════════════════════════════════════

pub struct TypeChecker<'a> {
    module: &'a Module,
    source: &'a SourceFile,
    errors: &'a mut CompileErrors,
    env: TypeEnv,
    info: TypeInfo,
    const_types: HashMap<String, Type>,
    /// Function whose body is being checked.
    current_fn: Option<FunctionId>,
    /// Parametric names in scope for annotation resolution.
    parametrics: Vec<String>,
}

impl<'a> TypeChecker<'a> {
    pub fn new(module: &'a Module, source: &'a SourceFile, errors: &'a mut CompileErrors) -> Self {
        Self {
            module,
            source,
            errors,
            env: TypeEnv::new(),
            info: TypeInfo::new(module),
            const_types: HashMap::new(),
            current_fn: None,
            parametrics: Vec::new(),
        }
    }

    /// Type-check the whole module and return the recorded type facts.
    pub fn check(mut self) -> TypeInfo {
        self.check_duplicates();
        for item in &self.module().items {
            match *item {
                ModuleItem::Const(id) => self.check_const(id),
                ModuleItem::Struct(id) => {
                    for field in &self.module().struct_def(id).fields {
                        self.resolve_annotation(field.ty);
                    }
                }
                ModuleItem::Enum(id) => self.check_enum(id),
                ModuleItem::Alias(id) => {
                    self.resolve_annotation(self.module().alias(id).ty);
                }
                ModuleItem::Function(_) | ModuleItem::Proc(_) => {}
            }
        }
        for item in &self.module().items {
            match *item {
                ModuleItem::Function(id) => self.check_function(id, &[]),
                ModuleItem::Proc(id) => self.check_proc(id),
                _ => {}
            }
        }
        debug!(module = %self.module().name, errors = self.errors.total_errors, "typecheck finished");
        self.info
    }

    // ══════════════════════════════════════════════════════════════════════
    // Errors
    // ══════════════════════════════════════════════════════════════════════

    fn error(&mut self, code: ErrorCode, message: impl Into<String>, span: Span) {
        let source_line = self.source.line(span.start.line).unwrap_or("");
        self.errors.push_error(DslxError::new(
            &self.source.name,
            code,
            message,
            span,
            source_line,
        ));
    }

    fn mismatch(&mut self, expected: &Type, got: &Type, span: Span) {
        let message = format!(
            "expected {}, got {}",
            expected.render(self.module),
            got.render(self.module)
        );
        self.error(ErrorCode::TYPE_MISMATCH, message, span);
    }

    fn expect_compatible(&mut self, expected: &Type, got: &Type, span: Span) {
        if !expected.compatible(got) {
            self.mismatch(expected, got, span);
        }
    }

    fn span(&self, id: ExprId) -> Span {
        self.module().expr(id).span
    }

    /// The module reference, detached from the borrow of `self`.
    fn module(&self) -> &'a Module {
        self.module
    }

    // ══════════════════════════════════════════════════════════════════════
    // Module-level items
    // ══════════════════════════════════════════════════════════════════════

    fn check_duplicates(&mut self) {
        let m = self.module;
        let names = m
            .functions
            .iter()
            .filter(|f| f.tag == FunctionTag::Normal)
            .map(|f| &f.name)
            .chain(m.procs.iter().map(|p| &p.name))
            .chain(m.structs.iter().map(|s| &s.name))
            .chain(m.enums.iter().map(|e| &e.name))
            .chain(m.consts.iter().map(|c| &c.name))
            .chain(m.aliases.iter().map(|a| &a.name));
        let mut seen = HashSet::new();
        for name in names {
            if !seen.insert(name.name.as_str()) {
                self.error(
                    ErrorCode::DUPLICATE_DEFINITION,
                    format!("'{}' is defined more than once", name.name),
                    name.span,
                );
            }
        }
    }

    fn check_const(&mut self, id: ConstId) {
        let c = self.module().const_def(id);
        let expected = c.annotation.map(|t| self.resolve_annotation(t));
        let ty = self.check_expr(c.value, expected.as_ref());
        if let Some(expected) = &expected {
            self.expect_compatible(expected, &ty, c.span);
        }
        self.const_types.insert(c.name.name.clone(), ty);
    }

    fn check_enum(&mut self, id: EnumId) {
        let e = self.module().enum_def(id);
        let underlying = self.resolve_annotation(e.underlying);
        if !matches!(underlying, Type::Bits { .. } | Type::Unknown) {
            let message = format!(
                "enum '{}' must have a bits underlying type, got {}",
                e.name.name,
                underlying.render(self.module)
            );
            self.error(ErrorCode::TYPE_MISMATCH, message, e.span);
        }
        let mut seen = HashSet::new();
        for variant in &e.variants {
            if !seen.insert(variant.name.name.as_str()) {
                self.error(
                    ErrorCode::DUPLICATE_DEFINITION,
                    format!("variant '{}' is defined more than once", variant.name.name),
                    variant.name.span,
                );
            }
            let ty = self.check_expr(variant.value, Some(&underlying));
            self.expect_compatible(&underlying, &ty, variant.name.span);
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Functions & procs
    // ══════════════════════════════════════════════════════════════════════

    /// Check one function body. `members` are proc members visible in
    /// `next` bodies.
    fn check_function(&mut self, id: FunctionId, members: &[Param]) {
        let f = self.module().function(id);
        let kind = match f.tag {
            FunctionTag::Normal => ScopeKind::Function,
            FunctionTag::ProcConfig(_) => ScopeKind::ProcConfig,
            FunctionTag::ProcNext(_) => ScopeKind::ProcNext,
        };
        self.current_fn = Some(id);
        self.parametrics = f.parametrics.iter().map(|p| p.name.name.clone()).collect();
        self.env.push_scope(kind);

        for binding in &f.parametrics {
            let ty = self.resolve_annotation(binding.ty);
            if let Some(default) = binding.default {
                let got = self.check_expr(default, Some(&ty));
                self.expect_compatible(&ty, &got, binding.span);
            }
            self.env.define(&binding.name.name, ty);
        }
        for param in &f.params {
            let ty = self.resolve_annotation(param.ty);
            self.env.define(&param.name.name, ty);
        }
        for member in members {
            let ty = self.resolve_annotation(member.ty);
            self.env.define(&member.name.name, ty);
        }

        if f.is_test && !f.params.is_empty() {
            self.error(
                ErrorCode::WRONG_ARG_COUNT,
                format!("test function '{}' must not take parameters", f.name.name),
                f.name.span,
            );
        }

        let ret = f.return_type.map(|t| self.resolve_annotation(t));
        let body_ty = self.check_expr(f.body, ret.as_ref());
        if let Some(ret) = &ret {
            if !ret.compatible(&body_ty) {
                let span = self.block_value_span(f.body);
                self.mismatch(ret, &body_ty, span);
            }
        }

        self.env.pop_scope();
        self.current_fn = None;
        self.parametrics.clear();
    }

    fn block_value_span(&self, body: ExprId) -> Span {
        match &self.module().expr(body).kind {
            ExprKind::Block(Block {
                value: Some(value), ..
            }) => self.span(*value),
            _ => self.span(body),
        }
    }

    fn check_proc(&mut self, id: ProcDeclId) {
        let p = self.module().proc_decl(id);
        self.check_function(p.config, &[]);
        let config = self.module().function(p.config);
        let returned = match self.info.expr_type(config.body) {
            Some(Type::Tuple(items)) => Some(items.len()),
            _ => None,
        };
        if let Some(returned) = returned {
            if returned != p.members.len() {
                let message = format!(
                    "proc '{}' declares {} member(s) but config returns {returned} value(s)",
                    p.name.name,
                    p.members.len(),
                );
                let span = self.block_value_span(config.body);
                self.error(ErrorCode::MALFORMED_PROC, message, span);
            }
        }

        let next = self.module().function(p.next);
        let first_is_token = next
            .params
            .first()
            .map(|param| {
                matches!(
                    self.module().type_annotation(param.ty).kind,
                    TypeAnnotationKind::Token
                )
            })
            .unwrap_or(false);
        if !first_is_token {
            self.error(
                ErrorCode::MALFORMED_PROC,
                format!("first parameter of '{}.next' must be a token", p.name.name),
                next.span,
            );
        }
        self.check_function(p.next, &p.members);

        if let Some(attr) = &p.test_attr {
            let state = self.state_types(p.next);
            for (i, init) in attr.init.iter().enumerate() {
                let expected = state.get(i).cloned().flatten();
                self.check_expr(*init, expected.as_ref());
            }
        }
    }

    /// Types of a `next` function's state parameters (everything after the
    /// token). Entries with symbolic dims are `None` because they depend on
    /// the spawning instance's bindings.
    fn state_types(&mut self, next: FunctionId) -> Vec<Option<Type>> {
        let params: Vec<TypeId> = self
            .module
            .function(next)
            .params
            .iter()
            .skip(1)
            .map(|p| p.ty)
            .collect();
        params
            .into_iter()
            .map(|t| Some(self.resolve_foreign(next, t)).filter(Type::is_concrete))
            .collect()
    }

    // ══════════════════════════════════════════════════════════════════════
    // Type annotations
    // ══════════════════════════════════════════════════════════════════════

    /// Resolve an annotation that belongs to `owner`, with `owner`'s
    /// parametrics in scope.
    fn resolve_foreign(&mut self, owner: FunctionId, id: TypeId) -> Type {
        if let Some(ty) = self.info.annotation_type(id) {
            return ty.clone();
        }
        let names = self
            .module()
            .function(owner)
            .parametrics
            .iter()
            .map(|p| p.name.name.clone())
            .collect();
        let saved = std::mem::replace(&mut self.parametrics, names);
        let ty = self.resolve_annotation(id);
        self.parametrics = saved;
        ty
    }

    pub(crate) fn resolve_annotation(&mut self, id: TypeId) -> Type {
        if let Some(ty) = self.info.annotation_type(id) {
            return ty.clone();
        }
        let ty = self.resolve_annotation_uncached(id);
        self.info.set_annotation_type(id, ty.clone());
        ty
    }

    fn resolve_annotation_uncached(&mut self, id: TypeId) -> Type {
        let annotation = self.module().type_annotation(id);
        match &annotation.kind {
            TypeAnnotationKind::Bits { signed, width } => {
                let width = match width {
                    BitsWidth::Fixed(w) => Dim::Known(u64::from(*w)),
                    BitsWidth::Expr(e) => self.resolve_dim(*e),
                };
                Type::Bits {
                    signed: *signed,
                    width,
                }
            }
            TypeAnnotationKind::Array { element, size } => {
                let element = self.resolve_annotation(*element);
                let size = self.resolve_dim(*size);
                Type::Array {
                    element: Box::new(element),
                    size,
                }
            }
            TypeAnnotationKind::Tuple(items) => {
                Type::Tuple(items.iter().map(|t| self.resolve_annotation(*t)).collect())
            }
            TypeAnnotationKind::Token => Type::Token,
            TypeAnnotationKind::Channel { direction, payload } => Type::Channel {
                direction: *direction,
                payload: Box::new(self.resolve_annotation(*payload)),
            },
            TypeAnnotationKind::Named(name) => match self.module().find_type_item(&name.name) {
                Some(ModuleItem::Struct(s)) => Type::Struct(s),
                Some(ModuleItem::Enum(e)) => Type::Enum(e),
                Some(ModuleItem::Alias(a)) => self.resolve_annotation(self.module().alias(a).ty),
                _ => {
                    self.error(
                        ErrorCode::UNKNOWN_TYPE,
                        format!("unknown type '{}'", name.name),
                        name.span,
                    );
                    Type::Unknown
                }
            },
        }
    }

    /// Resolve a dimension expression: constants fold to [`Dim::Known`];
    /// anything depending on a parametric in scope stays symbolic.
    fn resolve_dim(&mut self, expr: ExprId) -> Dim {
        self.type_dim_literals(expr);
        match self.fold_dim(expr, &HashMap::new()) {
            Dim::Unknown if self.mentions_parametric(expr) => Dim::Symbolic(expr),
            Dim::Unknown => {
                if let ExprKind::Name(name) = &self.module().expr(expr).kind {
                    if self.module().find_const(name).is_none() {
                        let message = format!("undefined name '{name}'");
                        self.error(ErrorCode::UNDEFINED_NAME, message, self.span(expr));
                    }
                }
                Dim::Unknown
            }
            known => known,
        }
    }

    /// Record `u32` for untyped literals inside a dimension expression.
    fn type_dim_literals(&mut self, expr: ExprId) {
        match &self.module().expr(expr).kind {
            ExprKind::Number { annotation, .. } => {
                let ty = match annotation {
                    Some(t) => self.resolve_annotation(*t),
                    None => Type::u32(),
                };
                self.info.set_expr_type(expr, ty);
            }
            ExprKind::Name(name) => {
                let ty = self
                    .env
                    .lookup(name)
                    .or_else(|| self.const_types.get(name))
                    .cloned()
                    .unwrap_or_else(Type::u32);
                self.info.set_expr_type(expr, ty);
            }
            ExprKind::Binary { lhs, rhs, .. } => {
                let (lhs, rhs) = (*lhs, *rhs);
                self.type_dim_literals(lhs);
                self.type_dim_literals(rhs);
                let ty = self.info.expr_type(lhs).cloned().unwrap_or_else(Type::u32);
                self.info.set_expr_type(expr, ty);
            }
            ExprKind::Unary { operand, .. } => {
                let operand = *operand;
                self.type_dim_literals(operand);
                let ty = self.info.expr_type(operand).cloned().unwrap_or_else(Type::u32);
                self.info.set_expr_type(expr, ty);
            }
            _ => {
                self.check_expr(expr, Some(&Type::u32()));
            }
        }
    }

    fn mentions_parametric(&self, expr: ExprId) -> bool {
        match &self.module().expr(expr).kind {
            ExprKind::Name(name) => self.parametrics.iter().any(|p| p == name),
            ExprKind::Binary { lhs, rhs, .. } => {
                self.mentions_parametric(*lhs) || self.mentions_parametric(*rhs)
            }
            ExprKind::Unary { operand, .. } => self.mentions_parametric(*operand),
            ExprKind::Invocation(inv) => inv.args.iter().any(|a| self.mentions_parametric(*a)),
            _ => false,
        }
    }

    /// Constant-fold a dimension expression. Names resolve through
    /// `bindings` first, then module constants.
    fn fold_dim(&self, expr: ExprId, bindings: &HashMap<String, Dim>) -> Dim {
        match &self.module().expr(expr).kind {
            ExprKind::Number {
                value,
                negative: false,
                ..
            } => u64::try_from(*value).map(Dim::Known).unwrap_or(Dim::Unknown),
            ExprKind::Name(name) => {
                if let Some(dim) = bindings.get(name) {
                    return *dim;
                }
                match self.module().find_const(name) {
                    Some(c) => self.fold_dim(self.module().const_def(c).value, &HashMap::new()),
                    None => Dim::Unknown,
                }
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let (Dim::Known(a), Dim::Known(b)) =
                    (self.fold_dim(*lhs, bindings), self.fold_dim(*rhs, bindings))
                else {
                    return Dim::Unknown;
                };
                let folded = match op {
                    BinOp::Add => a.checked_add(b),
                    BinOp::Sub => a.checked_sub(b),
                    BinOp::Mul => a.checked_mul(b),
                    BinOp::Div => a.checked_div(b),
                    BinOp::Mod => a.checked_rem(b),
                    BinOp::Shl => u32::try_from(b).ok().and_then(|b| a.checked_shl(b)),
                    BinOp::Shr => u32::try_from(b).ok().and_then(|b| a.checked_shr(b)),
                    BinOp::BitAnd => Some(a & b),
                    BinOp::BitOr => Some(a | b),
                    BinOp::BitXor => Some(a ^ b),
                    _ => None,
                };
                folded.map(Dim::Known).unwrap_or(Dim::Unknown)
            }
            _ => Dim::Unknown,
        }
    }

    /// Replace a callee's symbolic dims using the bindings inferred at a
    /// call site.
    fn substitute(&self, ty: &Type, bindings: &HashMap<String, Dim>) -> Type {
        let dim = |d: Dim| match d {
            Dim::Symbolic(e) => self.fold_dim(e, bindings),
            other => other,
        };
        match ty {
            Type::Bits { signed, width } => Type::Bits {
                signed: *signed,
                width: dim(*width),
            },
            Type::Array { element, size } => Type::Array {
                element: Box::new(self.substitute(element, bindings)),
                size: dim(*size),
            },
            Type::Tuple(items) => {
                Type::Tuple(items.iter().map(|t| self.substitute(t, bindings)).collect())
            }
            Type::Channel { direction, payload } => Type::Channel {
                direction: *direction,
                payload: Box::new(self.substitute(payload, bindings)),
            },
            other => other.clone(),
        }
    }

    /// Bind callee parametric names that appear directly as dims of `param`
    /// to the corresponding dims of `arg`.
    fn unify(&self, param: &Type, arg: &Type, names: &[String], bindings: &mut HashMap<String, Dim>) {
        let mut bind = |d: Dim, actual: Dim| {
            if let Dim::Symbolic(e) = d {
                if let ExprKind::Name(name) = &self.module().expr(e).kind {
                    if names.contains(name) && !matches!(actual, Dim::Unknown) {
                        bindings.entry(name.clone()).or_insert(actual);
                    }
                }
            }
        };
        match (param, arg) {
            (Type::Bits { width: w, .. }, Type::Bits { width: a, .. }) => bind(*w, *a),
            (
                Type::Array {
                    element: pe,
                    size: ps,
                },
                Type::Array {
                    element: ae,
                    size: asz,
                },
            ) => {
                bind(*ps, *asz);
                self.unify(pe, ae, names, bindings);
            }
            (Type::Tuple(ps), Type::Tuple(args)) => {
                for (p, a) in ps.iter().zip(args) {
                    self.unify(p, a, names, bindings);
                }
            }
            _ => {}
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Expressions
    // ══════════════════════════════════════════════════════════════════════

    /// Check an expression, record its type, and return it.
    pub(crate) fn check_expr(&mut self, id: ExprId, expected: Option<&Type>) -> Type {
        let ty = self.check_expr_kind(id, expected);
        self.info.set_expr_type(id, ty.clone());
        ty
    }

    /// An untyped literal (possibly negated) whose type comes from context.
    fn needs_context(&self, id: ExprId) -> bool {
        match &self.module().expr(id).kind {
            ExprKind::Number {
                annotation: None, ..
            } => true,
            ExprKind::Unary { operand, .. } => self.needs_context(*operand),
            _ => false,
        }
    }

    fn check_expr_kind(&mut self, id: ExprId, expected: Option<&Type>) -> Type {
        let m = self.module;
        let span = self.span(id);
        match &m.expr(id).kind {
            ExprKind::Number {
                value,
                negative,
                annotation,
            } => self.check_number(*value, *negative, *annotation, expected, span),
            ExprKind::Bool(_) => Type::bool(),
            ExprKind::Name(name) => self.check_name(name, span),
            ExprKind::ColonRef { subject, member } => self.check_colon_ref(subject, member),
            ExprKind::Unary { operand, .. } => {
                let ty = self.check_expr(*operand, expected);
                if !ty.is_bits_like() && !ty.is_unknown() {
                    let message = format!("unary operator requires bits, got {}", ty.render(m));
                    self.error(ErrorCode::TYPE_MISMATCH, message, span);
                }
                ty
            }
            ExprKind::Binary { op, lhs, rhs } => self.check_binary(*op, *lhs, *rhs, expected),
            ExprKind::Cast { expr, ty } => {
                let from = self.check_expr(*expr, None);
                let to = self.resolve_annotation(*ty);
                let castable = |t: &Type| t.is_bits_like() || t.is_unknown();
                if !castable(&from) || !castable(&to) {
                    let message = format!(
                        "cannot cast {} to {}",
                        from.render(m),
                        to.render(m)
                    );
                    self.error(ErrorCode::TYPE_MISMATCH, message, span);
                }
                to
            }
            ExprKind::Tuple(items) => {
                let expected_items = match expected {
                    Some(Type::Tuple(ts)) if ts.len() == items.len() => Some(ts.clone()),
                    _ => None,
                };
                let tys = items
                    .iter()
                    .enumerate()
                    .map(|(i, e)| {
                        let exp = expected_items.as_ref().map(|ts| &ts[i]);
                        self.check_expr(*e, exp)
                    })
                    .collect();
                Type::Tuple(tys)
            }
            ExprKind::Array {
                annotation,
                elements,
                has_ellipsis,
            } => self.check_array(*annotation, elements, *has_ellipsis, expected, span),
            ExprKind::StructInstance { name, fields, base } => {
                self.check_struct_instance(name, fields, *base, span)
            }
            ExprKind::Index { lhs, index } => {
                let lhs_ty = self.check_expr(*lhs, None);
                let exp = self.needs_context(*index).then(Type::u32);
                self.check_expr(*index, exp.as_ref());
                match lhs_ty {
                    Type::Array { element, .. } => *element,
                    Type::Unknown => Type::Unknown,
                    other => {
                        let message = format!("cannot index into {}", other.render(m));
                        self.error(ErrorCode::NOT_INDEXABLE, message, span);
                        Type::Unknown
                    }
                }
            }
            ExprKind::Slice { lhs, start, limit } => self.check_slice(*lhs, *start, *limit, span),
            ExprKind::WidthSlice { lhs, start, width } => {
                let lhs_ty = self.check_expr(*lhs, None);
                if !matches!(lhs_ty, Type::Bits { .. } | Type::Unknown) {
                    let message = format!("cannot slice {}", lhs_ty.render(m));
                    self.error(ErrorCode::NOT_INDEXABLE, message, span);
                }
                let exp = self.needs_context(*start).then(Type::u32);
                self.check_expr(*start, exp.as_ref());
                self.resolve_annotation(*width)
            }
            ExprKind::TupleIndex { lhs, index } => match self.check_expr(*lhs, None) {
                Type::Tuple(items) => match items.get(*index as usize) {
                    Some(t) => t.clone(),
                    None => {
                        let message = format!(
                            "tuple index {index} is out of range for a {}-tuple",
                            items.len()
                        );
                        self.error(ErrorCode::NOT_INDEXABLE, message, span);
                        Type::Unknown
                    }
                },
                Type::Unknown => Type::Unknown,
                other => {
                    let message = format!("cannot tuple-index into {}", other.render(m));
                    self.error(ErrorCode::NOT_INDEXABLE, message, span);
                    Type::Unknown
                }
            },
            ExprKind::FieldAccess { lhs, field } => match self.check_expr(*lhs, None) {
                Type::Struct(s) => {
                    let def = m.struct_def(s);
                    match def.fields.iter().find(|f| f.name.name == field.name) {
                        Some(f) => self.resolve_annotation(f.ty),
                        None => {
                            let message = format!(
                                "struct '{}' has no field '{}'",
                                def.name.name, field.name
                            );
                            self.error(ErrorCode::UNKNOWN_FIELD, message, field.span);
                            Type::Unknown
                        }
                    }
                }
                Type::Unknown => Type::Unknown,
                other => {
                    let message = format!("{} has no fields", other.render(m));
                    self.error(ErrorCode::UNKNOWN_FIELD, message, field.span);
                    Type::Unknown
                }
            },
            ExprKind::Invocation(inv) => self.check_invocation(inv, expected, span),
            ExprKind::FormatMacro { name, format, args, .. } => {
                self.check_macro(name, format, args, span)
            }
            ExprKind::If {
                cond,
                then_block,
                else_branch,
            } => {
                let cond_ty = self.check_expr(*cond, Some(&Type::bool()));
                self.expect_compatible(&Type::bool(), &cond_ty, self.span(*cond));
                let then_ty = self.check_expr(*then_block, expected);
                match else_branch {
                    Some(e) => {
                        let exp = expected.cloned().unwrap_or_else(|| then_ty.clone());
                        let else_ty = self.check_expr(*e, Some(&exp));
                        self.expect_compatible(&then_ty, &else_ty, self.span(*e));
                    }
                    None => {
                        if !then_ty.is_unit() && !then_ty.is_unknown() {
                            self.error(
                                ErrorCode::TYPE_MISMATCH,
                                "'if' without 'else' must produce ()",
                                span,
                            );
                        }
                    }
                }
                then_ty
            }
            ExprKind::Match { subject, arms } => {
                let subject_ty = self.check_expr(*subject, None);
                let mut result: Option<Type> = expected.cloned();
                for arm in arms {
                    self.env.push_scope(ScopeKind::Block);
                    for pattern in &arm.patterns {
                        self.check_pattern(pattern, &subject_ty, true);
                    }
                    let ty = self.check_expr(arm.body, result.as_ref());
                    match &result {
                        Some(r) => self.expect_compatible(r, &ty, self.span(arm.body)),
                        None => result = Some(ty),
                    }
                    self.env.pop_scope();
                }
                result.unwrap_or_else(Type::unit)
            }
            ExprKind::Block(block) => {
                self.env.push_scope(ScopeKind::Block);
                for stmt in &block.stmts {
                    match stmt {
                        Stmt::Let {
                            pattern,
                            annotation,
                            value,
                            span,
                        } => {
                            let ann = annotation.map(|t| self.resolve_annotation(t));
                            let ty = self.check_expr(*value, ann.as_ref());
                            if let Some(ann) = &ann {
                                self.expect_compatible(ann, &ty, *span);
                            }
                            self.check_pattern(pattern, ann.as_ref().unwrap_or(&ty), false);
                        }
                        Stmt::Expr(e) => {
                            self.check_expr(*e, None);
                        }
                    }
                }
                let ty = match block.value {
                    Some(v) => self.check_expr(v, expected),
                    None => Type::unit(),
                };
                self.env.pop_scope();
                ty
            }
            ExprKind::For(for_loop) => self.check_for(for_loop, span),
            ExprKind::Range { start, limit } => self.check_range(*start, *limit),
            ExprKind::Spawn(spawn) => {
                self.check_spawn(spawn, span);
                Type::unit()
            }
            ExprKind::Channel { payload } => {
                self.require_config("chan", span);
                let payload = Box::new(self.resolve_annotation(*payload));
                Type::Tuple(vec![
                    Type::Channel {
                        direction: ChannelDirection::Out,
                        payload: payload.clone(),
                    },
                    Type::Channel {
                        direction: ChannelDirection::In,
                        payload,
                    },
                ])
            }
        }
    }

    fn check_number(
        &mut self,
        value: u128,
        negative: bool,
        annotation: Option<TypeId>,
        expected: Option<&Type>,
        span: Span,
    ) -> Type {
        let ty = match annotation {
            Some(t) => self.resolve_annotation(t),
            None => match expected {
                Some(Type::Unknown) => return Type::Unknown,
                Some(t @ Type::Bits { width, .. }) if *width != Dim::Unknown => t.clone(),
                _ => {
                    self.error(
                        ErrorCode::CANNOT_INFER,
                        format!("cannot infer a type for literal {value}; annotate it, e.g. u32:{value}"),
                        span,
                    );
                    return Type::Unknown;
                }
            },
        };
        match &ty {
            Type::Bits {
                signed,
                width: Dim::Known(w),
            } => {
                if !literal_fits(value, negative, *signed, *w) {
                    let sign = if negative { "-" } else { "" };
                    let message = format!(
                        "literal {sign}{value} does not fit in {}",
                        ty.render(self.module)
                    );
                    self.error(ErrorCode::LITERAL_DOES_NOT_FIT, message, span);
                }
            }
            Type::Bits { .. } | Type::Unknown => {}
            other => {
                let message = format!("a number literal cannot have type {}", other.render(self.module));
                self.error(ErrorCode::TYPE_MISMATCH, message, span);
            }
        }
        ty
    }

    fn check_name(&mut self, name: &str, span: Span) -> Type {
        if let Some(ty) = self.env.lookup(name) {
            return ty.clone();
        }
        if let Some(ty) = self.const_types.get(name) {
            return ty.clone();
        }
        if let Some(f) = self.module().find_function(name) {
            return Type::Function(Callee::User(f));
        }
        if let Some(b) = Builtin::from_name(name) {
            return Type::Function(Callee::Builtin(b));
        }
        self.error(
            ErrorCode::UNDEFINED_NAME,
            format!("undefined name '{name}'"),
            span,
        );
        Type::Unknown
    }

    fn check_colon_ref(&mut self, subject: &Ident, member: &Ident) -> Type {
        let enum_id = match self.module().find_type_item(&subject.name) {
            Some(ModuleItem::Enum(e)) => Some(e),
            Some(ModuleItem::Alias(a)) => match self.resolve_annotation(self.module().alias(a).ty) {
                Type::Enum(e) => Some(e),
                _ => None,
            },
            _ => None,
        };
        let Some(enum_id) = enum_id else {
            self.error(
                ErrorCode::UNDEFINED_NAME,
                format!("'{}' is not an enum", subject.name),
                subject.span,
            );
            return Type::Unknown;
        };
        let def = self.module().enum_def(enum_id);
        if !def.variants.iter().any(|v| v.name.name == member.name) {
            self.error(
                ErrorCode::UNDEFINED_NAME,
                format!("enum '{}' has no variant '{}'", def.name.name, member.name),
                member.span,
            );
        }
        Type::Enum(enum_id)
    }

    fn check_binary(&mut self, op: BinOp, lhs: ExprId, rhs: ExprId, expected: Option<&Type>) -> Type {
        let m = self.module;
        let span = self.span(lhs).merge(self.span(rhs));
        match op {
            BinOp::LogicalAnd | BinOp::LogicalOr => {
                for side in [lhs, rhs] {
                    let ty = self.check_expr(side, Some(&Type::bool()));
                    self.expect_compatible(&Type::bool(), &ty, self.span(side));
                }
                Type::bool()
            }
            BinOp::Shl | BinOp::Shr => {
                let lhs_ty = self.check_expr(lhs, expected);
                let amount = self.needs_context(rhs).then(Type::u32);
                let rhs_ty = self.check_expr(rhs, amount.as_ref());
                if !matches!(rhs_ty, Type::Bits { signed: false, .. } | Type::Unknown) {
                    let message = format!("shift amount must be unsigned, got {}", rhs_ty.render(m));
                    self.error(ErrorCode::TYPE_MISMATCH, message, self.span(rhs));
                }
                lhs_ty
            }
            BinOp::Concat => {
                let lhs_ty = self.check_expr(lhs, None);
                let rhs_ty = self.check_expr(rhs, None);
                match (&lhs_ty, &rhs_ty) {
                    (
                        Type::Bits {
                            signed: false,
                            width: a,
                        },
                        Type::Bits {
                            signed: false,
                            width: b,
                        },
                    ) => Type::Bits {
                        signed: false,
                        width: match (a, b) {
                            (Dim::Known(a), Dim::Known(b)) => Dim::Known(a + b),
                            _ => Dim::Unknown,
                        },
                    },
                    (
                        Type::Array {
                            element: ea,
                            size: a,
                        },
                        Type::Array { size: b, .. },
                    ) => Type::Array {
                        element: ea.clone(),
                        size: match (a, b) {
                            (Dim::Known(a), Dim::Known(b)) => Dim::Known(a + b),
                            _ => Dim::Unknown,
                        },
                    },
                    (Type::Unknown, _) | (_, Type::Unknown) => Type::Unknown,
                    _ => {
                        let message = format!(
                            "'++' requires two unsigned bits values or two arrays, got {} and {}",
                            lhs_ty.render(m),
                            rhs_ty.render(m)
                        );
                        self.error(ErrorCode::TYPE_MISMATCH, message, span);
                        Type::Unknown
                    }
                }
            }
            _ => {
                let operand_expected = if op.is_comparison() { None } else { expected };
                let (lhs_ty, rhs_ty) = if self.needs_context(lhs) && !self.needs_context(rhs) {
                    let rhs_ty = self.check_expr(rhs, operand_expected);
                    (self.check_expr(lhs, Some(&rhs_ty)), rhs_ty)
                } else {
                    let lhs_ty = self.check_expr(lhs, operand_expected);
                    (lhs_ty.clone(), self.check_expr(rhs, Some(&lhs_ty)))
                };
                if !lhs_ty.compatible(&rhs_ty) {
                    let message = format!(
                        "operands of '{op}' differ: {} vs {}",
                        lhs_ty.render(m),
                        rhs_ty.render(m)
                    );
                    self.error(ErrorCode::TYPE_MISMATCH, message, span);
                }
                if op.is_comparison() {
                    Type::bool()
                } else {
                    if !lhs_ty.is_bits_like() && !lhs_ty.is_unknown() {
                        let message = format!("'{op}' requires bits operands, got {}", lhs_ty.render(m));
                        self.error(ErrorCode::TYPE_MISMATCH, message, span);
                    }
                    lhs_ty
                }
            }
        }
    }

    fn check_array(
        &mut self,
        annotation: Option<TypeId>,
        elements: &[ExprId],
        has_ellipsis: bool,
        expected: Option<&Type>,
        span: Span,
    ) -> Type {
        let declared = match annotation {
            Some(t) => Some(self.resolve_annotation(t)),
            None => expected.filter(|t| matches!(t, Type::Array { .. })).cloned(),
        };
        let (mut element, declared_size) = match &declared {
            Some(Type::Array { element, size }) => (Some((**element).clone()), Some(*size)),
            Some(other) if !other.is_unknown() => {
                let message = format!("array literal annotated with non-array type {}", other.render(self.module));
                self.error(ErrorCode::TYPE_MISMATCH, message, span);
                (None, None)
            }
            _ => (None, None),
        };
        for e in elements {
            let ty = self.check_expr(*e, element.as_ref());
            match &element {
                Some(el) => self.expect_compatible(el, &ty, self.span(*e)),
                None => element = Some(ty),
            }
        }
        let size = match (declared_size, has_ellipsis) {
            (Some(size), true) => size,
            (Some(size), false) => {
                if let Dim::Known(n) = size {
                    if n != elements.len() as u64 && annotation.is_some() {
                        let message = format!(
                            "array annotated with {n} element(s) but {} given",
                            elements.len()
                        );
                        self.error(ErrorCode::TYPE_MISMATCH, message, span);
                    }
                }
                Dim::Known(elements.len() as u64)
            }
            (None, true) => {
                self.error(
                    ErrorCode::CANNOT_INFER,
                    "array literal with '...' needs a type annotation",
                    span,
                );
                Dim::Unknown
            }
            (None, false) => Dim::Known(elements.len() as u64),
        };
        match element {
            Some(element) => Type::Array {
                element: Box::new(element),
                size,
            },
            None => {
                self.error(ErrorCode::CANNOT_INFER, "cannot infer the type of an empty array", span);
                Type::Unknown
            }
        }
    }

    fn check_struct_instance(
        &mut self,
        name: &Ident,
        fields: &[(Ident, ExprId)],
        base: Option<ExprId>,
        span: Span,
    ) -> Type {
        let struct_id = match self.module().find_type_item(&name.name) {
            Some(ModuleItem::Struct(s)) => Some(s),
            Some(ModuleItem::Alias(a)) => match self.resolve_annotation(self.module().alias(a).ty) {
                Type::Struct(s) => Some(s),
                _ => None,
            },
            _ => None,
        };
        let Some(struct_id) = struct_id else {
            self.error(
                ErrorCode::UNKNOWN_TYPE,
                format!("'{}' is not a struct", name.name),
                name.span,
            );
            for (_, e) in fields {
                self.check_expr(*e, None);
            }
            return Type::Unknown;
        };
        let def = self.module().struct_def(struct_id);
        let mut provided = HashSet::new();
        for (field, value) in fields {
            match def.fields.iter().find(|f| f.name.name == field.name) {
                Some(decl) => {
                    let ty = self.resolve_annotation(decl.ty);
                    let got = self.check_expr(*value, Some(&ty));
                    self.expect_compatible(&ty, &got, self.span(*value));
                    if !provided.insert(field.name.as_str()) {
                        self.error(
                            ErrorCode::DUPLICATE_DEFINITION,
                            format!("field '{}' given more than once", field.name),
                            field.span,
                        );
                    }
                }
                None => {
                    self.error(
                        ErrorCode::UNKNOWN_FIELD,
                        format!("struct '{}' has no field '{}'", def.name.name, field.name),
                        field.span,
                    );
                    self.check_expr(*value, None);
                }
            }
        }
        let ty = Type::Struct(struct_id);
        match base {
            Some(b) => {
                let got = self.check_expr(b, Some(&ty));
                self.expect_compatible(&ty, &got, self.span(b));
            }
            None => {
                let missing: Vec<&str> = def
                    .fields
                    .iter()
                    .map(|f| f.name.name.as_str())
                    .filter(|n| !provided.contains(n))
                    .collect();
                if !missing.is_empty() {
                    self.error(
                        ErrorCode::TYPE_MISMATCH,
                        format!(
                            "struct '{}' instance is missing field(s): {}",
                            def.name.name,
                            missing.join(", ")
                        ),
                        span,
                    );
                }
            }
        }
        ty
    }

    fn check_slice(&mut self, lhs: ExprId, start: Option<ExprId>, limit: Option<ExprId>, span: Span) -> Type {
        let lhs_ty = self.check_expr(lhs, None);
        for bound in [start, limit].into_iter().flatten() {
            let exp = self.needs_context(bound).then(Type::s32);
            self.check_expr(bound, exp.as_ref());
        }
        let width = match lhs_ty {
            Type::Bits { width, .. } => width,
            Type::Unknown => return Type::Unknown,
            other => {
                let message = format!("cannot slice {}", other.render(self.module));
                self.error(ErrorCode::NOT_INDEXABLE, message, span);
                return Type::Unknown;
            }
        };
        let result = match width {
            Dim::Known(w) => {
                let w = i128::from(w);
                let resolve = |bound: Option<ExprId>, default: i128| -> Option<i128> {
                    match bound {
                        None => Some(default),
                        Some(b) => self
                            .const_value(b)
                            .map(|v| if v < 0 { (w + v).max(0) } else { v.min(w) }),
                    }
                };
                match (resolve(start, 0), resolve(limit, w)) {
                    (Some(s), Some(l)) => Dim::Known((l - s).max(0) as u64),
                    _ => Dim::Unknown,
                }
            }
            _ => Dim::Unknown,
        };
        Type::Bits {
            signed: false,
            width: result,
        }
    }

    /// Constant value of a literal, negated literal or module constant.
    fn const_value(&self, expr: ExprId) -> Option<i128> {
        match &self.module().expr(expr).kind {
            ExprKind::Number {
                value, negative, ..
            } => {
                let v = i128::try_from(*value).ok()?;
                Some(if *negative { -v } else { v })
            }
            ExprKind::Unary {
                op: UnaryOp::Negate,
                operand,
            } => self.const_value(*operand).map(|v| -v),
            ExprKind::Name(name) => {
                let c = self.module().find_const(name)?;
                self.const_value(self.module().const_def(c).value)
            }
            _ => None,
        }
    }

    fn check_range(&mut self, start: ExprId, limit: ExprId) -> Type {
        let (start_ty, limit_ty) = if self.needs_context(start) && self.needs_context(limit) {
            let ty = Type::u32();
            (self.check_expr(start, Some(&ty)), self.check_expr(limit, Some(&ty)))
        } else if self.needs_context(start) {
            let limit_ty = self.check_expr(limit, None);
            (self.check_expr(start, Some(&limit_ty)), limit_ty)
        } else {
            let start_ty = self.check_expr(start, None);
            (start_ty.clone(), self.check_expr(limit, Some(&start_ty)))
        };
        self.expect_compatible(&start_ty, &limit_ty, self.span(limit));
        let size = match (self.const_value(start), self.const_value(limit)) {
            (Some(a), Some(b)) => Dim::Known((b - a).max(0) as u64),
            _ => Dim::Unknown,
        };
        Type::Array {
            element: Box::new(start_ty),
            size,
        }
    }

    fn check_for(&mut self, for_loop: &ForLoop, span: Span) -> Type {
        let iter_ty = self.check_expr(for_loop.iterable, None);
        let element = match &iter_ty {
            Type::Array { element, .. } => (**element).clone(),
            Type::Unknown => Type::Unknown,
            other => {
                let message = format!("cannot iterate over {}", other.render(self.module));
                self.error(ErrorCode::TYPE_MISMATCH, message, self.span(for_loop.iterable));
                Type::Unknown
            }
        };
        let annotation = for_loop.annotation.map(|t| self.resolve_annotation(t));
        let acc_expected = match &annotation {
            Some(Type::Tuple(items)) if items.len() == 2 => Some(items[1].clone()),
            _ => None,
        };
        let acc_ty = self.check_expr(for_loop.init, acc_expected.as_ref());
        let acc_ty = acc_expected.unwrap_or(acc_ty);

        self.env.push_scope(ScopeKind::Block);
        match &for_loop.pattern.kind {
            PatternKind::Tuple(items) if items.len() == 2 => {
                let loop_ty = Type::Tuple(vec![element, acc_ty.clone()]);
                self.check_pattern(&for_loop.pattern, &loop_ty, false);
            }
            _ => {
                self.error(
                    ErrorCode::TYPE_MISMATCH,
                    "'for' binds a pair: (element, accumulator)",
                    for_loop.pattern.span,
                );
            }
        }
        let body_ty = self.check_expr(for_loop.body, Some(&acc_ty));
        self.expect_compatible(&acc_ty, &body_ty, span);
        self.env.pop_scope();
        acc_ty
    }

    fn require_config(&mut self, what: &str, span: Span) {
        if self.env.body_kind() != ScopeKind::ProcConfig {
            self.error(
                ErrorCode::SPAWN_OUTSIDE_CONFIG,
                format!("'{what}' is only allowed in a proc 'config' body"),
                span,
            );
        }
    }

    /// Argument counts are not checked here; the elaborator reports missing
    /// config arguments when the instance is built.
    fn check_spawn(&mut self, spawn: &Spawn, span: Span) {
        self.require_config("spawn", span);
        for p in &spawn.parametrics {
            self.check_expr(*p, None);
        }
        let Some(proc_id) = self.module().find_proc(&spawn.proc_name.name) else {
            self.error(
                ErrorCode::UNDEFINED_NAME,
                format!("undefined proc '{}'", spawn.proc_name.name),
                spawn.proc_name.span,
            );
            for a in spawn.config_args.iter().chain(&spawn.next_args) {
                self.check_expr(*a, None);
            }
            return;
        };
        let p = self.module().proc_decl(proc_id);
        let config_params: Vec<Option<Type>> = self
            .module
            .function(p.config)
            .params
            .iter()
            .map(|param| param.ty)
            .collect::<Vec<_>>()
            .into_iter()
            .map(|t| Some(self.resolve_annotation(t)).filter(Type::is_concrete))
            .collect();
        for (i, arg) in spawn.config_args.iter().enumerate() {
            let expected = config_params.get(i).cloned().flatten();
            let got = self.check_expr(*arg, expected.as_ref());
            if let Some(expected) = &expected {
                self.expect_compatible(expected, &got, self.span(*arg));
            }
        }
        let state = self.state_types(p.next);
        for (i, arg) in spawn.next_args.iter().enumerate() {
            let expected = state.get(i).cloned().flatten();
            self.check_expr(*arg, expected.as_ref());
        }
    }

    fn check_macro(&mut self, name: &Ident, format: &str, args: &[ExprId], span: Span) -> Type {
        match name.name.as_str() {
            "trace_fmt" => {
                for a in args {
                    self.check_expr(*a, None);
                }
                let placeholders = format.matches("{}").count();
                if placeholders != args.len() {
                    self.error(
                        ErrorCode::WRONG_ARG_COUNT,
                        format!(
                            "format string has {placeholders} placeholder(s) but {} argument(s) given",
                            args.len()
                        ),
                        span,
                    );
                }
                Type::unit()
            }
            "trace" => {
                if args.len() != 1 {
                    self.error(ErrorCode::WRONG_ARG_COUNT, "trace! takes exactly one argument", span);
                    return Type::Unknown;
                }
                self.check_expr(args[0], None)
            }
            "fail" => {
                for a in args {
                    self.check_expr(*a, None);
                }
                Type::Unknown
            }
            other => {
                self.error(
                    ErrorCode::UNDEFINED_NAME,
                    format!("unknown macro '{other}!'"),
                    name.span,
                );
                Type::Unknown
            }
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Invocations
    // ══════════════════════════════════════════════════════════════════════

    fn check_invocation(&mut self, inv: &Invocation, expected: Option<&Type>, span: Span) -> Type {
        let callee_ty = self.check_expr(inv.callee, None);
        match callee_ty {
            Type::Function(Callee::User(f)) => self.check_user_call(f, inv, span),
            Type::Function(Callee::Builtin(b)) => self.check_builtin_call(b, inv, expected),
            Type::Unknown => {
                for a in &inv.args {
                    self.check_expr(*a, None);
                }
                Type::Unknown
            }
            other => {
                let message = format!("{} is not callable", other.render(self.module));
                self.error(ErrorCode::TYPE_MISMATCH, message, self.span(inv.callee));
                Type::Unknown
            }
        }
    }

    fn check_user_call(&mut self, fid: FunctionId, inv: &Invocation, span: Span) -> Type {
        let callee = self.module().function(fid);
        if Some(fid) == self.current_fn {
            self.error(
                ErrorCode::RECURSION_NOT_ALLOWED,
                format!("function '{}' calls itself", callee.name.name),
                span,
            );
        }
        if inv.args.len() != callee.params.len() {
            self.error(
                ErrorCode::WRONG_ARG_COUNT,
                format!(
                    "'{}' takes {} argument(s) but {} given",
                    callee.name.name,
                    callee.params.len(),
                    inv.args.len()
                ),
                inv.args_span,
            );
        }
        if inv.parametrics.len() > callee.parametrics.len() {
            self.error(
                ErrorCode::WRONG_ARG_COUNT,
                format!(
                    "'{}' takes {} parametric(s) but {} given",
                    callee.name.name,
                    callee.parametrics.len(),
                    inv.parametrics.len()
                ),
                span,
            );
        }

        let names: Vec<String> = callee.parametrics.iter().map(|p| p.name.name.clone()).collect();
        let mut bindings: HashMap<String, Dim> = HashMap::new();
        for (binding, arg) in callee.parametrics.iter().zip(&inv.parametrics) {
            let ty = self.resolve_foreign(fid, binding.ty);
            let exp = Some(ty).filter(Type::is_concrete);
            self.check_expr(*arg, exp.as_ref());
            let dim = match self.fold_dim(*arg, &HashMap::new()) {
                Dim::Unknown if self.mentions_parametric(*arg) => Dim::Symbolic(*arg),
                other => other,
            };
            bindings.insert(binding.name.name.clone(), dim);
        }

        let param_tys: Vec<Type> = callee
            .params
            .iter()
            .map(|p| self.resolve_foreign(fid, p.ty))
            .collect();
        let mut arg_tys = Vec::with_capacity(inv.args.len());
        for (i, arg) in inv.args.iter().enumerate() {
            let expected = param_tys
                .get(i)
                .map(|t| self.substitute(t, &bindings))
                .filter(|t| !t.has_unknown_dim());
            arg_tys.push(self.check_expr(*arg, expected.as_ref()));
        }
        for (param, arg) in param_tys.iter().zip(&arg_tys) {
            self.unify(param, arg, &names, &mut bindings);
        }
        for binding in &callee.parametrics {
            if bindings.contains_key(&binding.name.name) {
                continue;
            }
            if let Some(default) = binding.default {
                let dim = self.fold_dim(default, &bindings);
                bindings.insert(binding.name.name.clone(), dim);
            }
        }
        for ((param, arg_ty), arg) in param_tys.iter().zip(&arg_tys).zip(&inv.args) {
            let param = self.substitute(param, &bindings);
            self.expect_compatible(&param, arg_ty, self.span(*arg));
        }

        match callee.return_type {
            Some(t) => {
                let ret = self.resolve_foreign(fid, t);
                self.substitute(&ret, &bindings)
            }
            None => Type::unit(),
        }
    }

    fn check_args_exact(&mut self, b: Builtin, inv: &Invocation) -> bool {
        match b.arity() {
            Some(n) if n != inv.args.len() => {
                self.error(
                    ErrorCode::WRONG_ARG_COUNT,
                    format!("'{}' takes {n} argument(s) but {} given", b.name(), inv.args.len()),
                    inv.args_span,
                );
                for a in &inv.args {
                    self.check_expr(*a, None);
                }
                false
            }
            _ => true,
        }
    }

    /// Check a pair of operands that type each other (`assert_eq(x, 1)`).
    fn check_peer_pair(&mut self, a: ExprId, b: ExprId) -> Type {
        let (a_ty, b_ty) = if self.needs_context(a) && !self.needs_context(b) {
            let b_ty = self.check_expr(b, None);
            (self.check_expr(a, Some(&b_ty)), b_ty)
        } else {
            let a_ty = self.check_expr(a, None);
            (a_ty.clone(), self.check_expr(b, Some(&a_ty)))
        };
        self.expect_compatible(&a_ty, &b_ty, self.span(b));
        a_ty
    }

    fn check_channel_arg(&mut self, arg: ExprId, direction: ChannelDirection, b: Builtin) -> Type {
        match self.check_expr(arg, None) {
            Type::Channel {
                direction: d,
                payload,
            } => {
                if d != direction {
                    self.error(
                        ErrorCode::TYPE_MISMATCH,
                        format!("'{}' needs a 'chan {direction}' endpoint, got 'chan {d}'", b.name()),
                        self.span(arg),
                    );
                }
                *payload
            }
            Type::Unknown => Type::Unknown,
            other => {
                let message = format!("'{}' needs a channel, got {}", b.name(), other.render(self.module));
                self.error(ErrorCode::TYPE_MISMATCH, message, self.span(arg));
                Type::Unknown
            }
        }
    }

    fn check_token_arg(&mut self, arg: ExprId) {
        let ty = self.check_expr(arg, None);
        self.expect_compatible(&Type::Token, &ty, self.span(arg));
    }

    fn check_builtin_call(
        &mut self,
        b: Builtin,
        inv: &Invocation,
        expected: Option<&Type>,
    ) -> Type {
        if !self.check_args_exact(b, inv) {
            return Type::Unknown;
        }
        let args = &inv.args;
        match b {
            Builtin::AssertEq | Builtin::AssertLt => {
                self.check_peer_pair(args[0], args[1]);
                Type::unit()
            }
            Builtin::Send | Builtin::SendIf => {
                self.check_token_arg(args[0]);
                let payload = self.check_channel_arg(args[1], ChannelDirection::Out, b);
                let value = if b == Builtin::SendIf {
                    let pred = self.check_expr(args[2], Some(&Type::bool()));
                    self.expect_compatible(&Type::bool(), &pred, self.span(args[2]));
                    args[3]
                } else {
                    args[2]
                };
                let got = self.check_expr(value, Some(&payload));
                self.expect_compatible(&payload, &got, self.span(value));
                Type::Token
            }
            Builtin::Recv => {
                self.check_token_arg(args[0]);
                let payload = self.check_channel_arg(args[1], ChannelDirection::In, b);
                Type::Tuple(vec![Type::Token, payload])
            }
            Builtin::RecvIf => {
                self.check_token_arg(args[0]);
                let payload = self.check_channel_arg(args[1], ChannelDirection::In, b);
                let pred = self.check_expr(args[2], Some(&Type::bool()));
                self.expect_compatible(&Type::bool(), &pred, self.span(args[2]));
                let default = self.check_expr(args[3], Some(&payload));
                self.expect_compatible(&payload, &default, self.span(args[3]));
                Type::Tuple(vec![Type::Token, payload])
            }
            Builtin::RecvNonBlocking => {
                self.check_token_arg(args[0]);
                let payload = self.check_channel_arg(args[1], ChannelDirection::In, b);
                let default = self.check_expr(args[2], Some(&payload));
                self.expect_compatible(&payload, &default, self.span(args[2]));
                Type::Tuple(vec![Type::Token, payload, Type::bool()])
            }
            Builtin::Join => {
                for a in args {
                    self.check_token_arg(*a);
                }
                Type::Token
            }
            Builtin::Update => {
                let arr = self.check_expr(args[0], expected);
                let exp = self.needs_context(args[1]).then(Type::u32);
                self.check_expr(args[1], exp.as_ref());
                let element = match &arr {
                    Type::Array { element, .. } => Some((**element).clone()),
                    Type::Unknown => None,
                    other => {
                        let message = format!("'update' needs an array, got {}", other.render(self.module));
                        self.error(ErrorCode::TYPE_MISMATCH, message, self.span(args[0]));
                        None
                    }
                };
                let value = self.check_expr(args[2], element.as_ref());
                if let Some(element) = &element {
                    self.expect_compatible(element, &value, self.span(args[2]));
                }
                arr
            }
            Builtin::Clz | Builtin::Ctz | Builtin::Rev => {
                let ty = self.check_expr(args[0], expected);
                self.require_bits(&ty, b, args[0]);
                ty
            }
            Builtin::AndReduce | Builtin::OrReduce | Builtin::XorReduce => {
                let ty = self.check_expr(args[0], None);
                self.require_bits(&ty, b, args[0]);
                Type::bool()
            }
            Builtin::ArraySize => {
                let ty = self.check_expr(args[0], None);
                if !matches!(ty, Type::Array { .. } | Type::Unknown) {
                    let message = format!("'array_size' needs an array, got {}", ty.render(self.module));
                    self.error(ErrorCode::TYPE_MISMATCH, message, self.span(args[0]));
                }
                Type::u32()
            }
            Builtin::BitSliceUpdate => {
                let ty = self.check_expr(args[0], expected);
                self.require_bits(&ty, b, args[0]);
                let exp = self.needs_context(args[1]).then(Type::u32);
                self.check_expr(args[1], exp.as_ref());
                let value = self.check_expr(args[2], None);
                self.require_bits(&value, b, args[2]);
                ty
            }
            Builtin::Signex => {
                let value = self.check_expr(args[0], None);
                self.require_bits(&value, b, args[0]);
                let witness = self.check_expr(args[1], expected);
                self.require_bits(&witness, b, args[1]);
                witness
            }
            Builtin::Map => {
                let arr = self.check_expr(args[0], None);
                let f = self.check_expr(args[1], None);
                let (element, size) = match &arr {
                    Type::Array { element, size } => ((**element).clone(), *size),
                    Type::Unknown => return Type::Unknown,
                    other => {
                        let message = format!("'map' needs an array, got {}", other.render(self.module));
                        self.error(ErrorCode::TYPE_MISMATCH, message, self.span(args[0]));
                        return Type::Unknown;
                    }
                };
                let ret = match f {
                    Type::Function(Callee::User(fid)) => self.mapped_return(fid, &element),
                    Type::Function(Callee::Builtin(inner)) => match inner {
                        Builtin::Clz | Builtin::Ctz | Builtin::Rev => element,
                        Builtin::AndReduce | Builtin::OrReduce | Builtin::XorReduce => Type::bool(),
                        _ => Type::Unknown,
                    },
                    Type::Unknown => Type::Unknown,
                    other => {
                        let message = format!("'map' needs a function, got {}", other.render(self.module));
                        self.error(ErrorCode::TYPE_MISMATCH, message, self.span(args[1]));
                        Type::Unknown
                    }
                };
                Type::Array {
                    element: Box::new(ret),
                    size,
                }
            }
            Builtin::Range => self.check_range(args[0], args[1]),
        }
    }

    /// Return type of a unary function applied to one array element.
    fn mapped_return(&mut self, fid: FunctionId, element: &Type) -> Type {
        let callee = self.module().function(fid);
        if callee.params.len() != 1 {
            self.error(
                ErrorCode::WRONG_ARG_COUNT,
                format!("'map' needs a one-argument function; '{}' takes {}", callee.name.name, callee.params.len()),
                callee.name.span,
            );
            return Type::Unknown;
        }
        let names: Vec<String> = callee.parametrics.iter().map(|p| p.name.name.clone()).collect();
        let param = self.resolve_foreign(fid, callee.params[0].ty);
        let mut bindings = HashMap::new();
        self.unify(&param, element, &names, &mut bindings);
        for binding in &callee.parametrics {
            if let (false, Some(default)) = (bindings.contains_key(&binding.name.name), binding.default) {
                let dim = self.fold_dim(default, &bindings);
                bindings.insert(binding.name.name.clone(), dim);
            }
        }
        match callee.return_type {
            Some(t) => {
                let ret = self.resolve_foreign(fid, t);
                self.substitute(&ret, &bindings)
            }
            None => Type::unit(),
        }
    }

    fn require_bits(&mut self, ty: &Type, b: Builtin, arg: ExprId) {
        if !matches!(ty, Type::Bits { .. } | Type::Unknown) {
            let message = format!("'{}' needs a bits value, got {}", b.name(), ty.render(self.module));
            self.error(ErrorCode::TYPE_MISMATCH, message, self.span(arg));
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Patterns
    // ══════════════════════════════════════════════════════════════════════

    /// Bind the names in `pattern` against `ty`. In a `match`, a bare name
    /// that refers to a module constant compares instead of binding.
    fn check_pattern(&mut self, pattern: &Pattern, ty: &Type, in_match: bool) {
        match &pattern.kind {
            PatternKind::Wildcard => {}
            PatternKind::Name(ident) => {
                if in_match && self.module().find_const(&ident.name).is_some() {
                    if let Some(const_ty) = self.const_types.get(&ident.name).cloned() {
                        self.expect_compatible(ty, &const_ty, ident.span);
                    }
                } else {
                    self.env.define(&ident.name, ty.clone());
                }
            }
            PatternKind::Tuple(items) => match ty {
                Type::Tuple(tys) if tys.len() == items.len() => {
                    for (p, t) in items.iter().zip(tys) {
                        self.check_pattern(p, t, in_match);
                    }
                }
                Type::Unknown => {
                    for p in items {
                        self.check_pattern(p, &Type::Unknown, in_match);
                    }
                }
                other => {
                    let message = format!(
                        "{}-element tuple pattern cannot match {}",
                        items.len(),
                        other.render(self.module)
                    );
                    self.error(ErrorCode::TYPE_MISMATCH, message, pattern.span);
                    for p in items {
                        self.check_pattern(p, &Type::Unknown, in_match);
                    }
                }
            },
            PatternKind::Literal(e) | PatternKind::ColonRef(e) => {
                if !in_match {
                    self.error(
                        ErrorCode::TYPE_MISMATCH,
                        "literal patterns are only allowed in 'match'",
                        pattern.span,
                    );
                }
                let got = self.check_expr(*e, Some(ty));
                self.expect_compatible(ty, &got, pattern.span);
            }
        }
    }
}

/// Whether `value` (negated if `negative`) is representable in a `width`-bit
/// type. Non-negative literals may use the full bit pattern of signed types.
fn literal_fits(value: u128, negative: bool, signed: bool, width: u64) -> bool {
    if width >= 128 {
        return !negative || signed || value == 0;
    }
    let width = width as u32;
    if negative {
        if !signed {
            return value == 0;
        }
        if width == 0 {
            return value == 0;
        }
        value <= 1u128 << (width - 1)
    } else {
        value < (1u128 << width)
    }
}

#[cfg(test)]
mod tests {
    use super::literal_fits;

    #[test]
    fn test_literal_fits() {
        assert!(literal_fits(255, false, false, 8));
        assert!(!literal_fits(256, false, false, 8));
        assert!(literal_fits(128, true, true, 8));
        assert!(!literal_fits(129, true, true, 8));
        assert!(!literal_fits(1, true, false, 8));
        assert!(literal_fits(u128::MAX, false, false, 128));
    }
}
