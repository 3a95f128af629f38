//! Parametric binding resolution and the instantiation cache.
//!
//! A call to `fn f<N: u32>(x: uN[N])` with a `u8` argument binds `N` to
//! `u32:8`. Bindings come, in priority order, from explicit parametrics at
//! the call site, from unifying declared parameter types with the argument
//! values, and from derived defaults (`M: u32 = {N + 1}`). Each distinct
//! (function, bindings) pair is instantiated once.

use std::collections::HashMap;
use std::fmt;

use dslx_typecheck::{Dim, Type};
use dslx_types::ast::{ExprKind, Function, FunctionId, Module};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::value::{Bits, ConcreteType, Value};

// ══════════════════════════════════════════════════════════════════════════════
// SymbolicBindings
// ══════════════════════════════════════════════════════════════════════════════

/// Parametric name → value, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct SymbolicBindings {
    entries: Vec<(String, Value)>,
}

impl SymbolicBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: Value) {
        self.entries.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for SymbolicBindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        f.write_str("}")
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Resolution
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolveError {
    #[error("conflicting values for parametric '{name}': {first} vs {second}")]
    Conflict {
        name: String,
        first: Value,
        second: Value,
    },
    #[error("could not infer a value for parametric '{name}'")]
    Unbound { name: String },
    #[error("parametric '{name}' has non-bits type {ty}")]
    NotBits { name: String, ty: ConcreteType },
}

/// Accumulates bindings for one call and checks them for consistency.
pub struct BindingSolver<'a> {
    module: &'a Module,
    function: &'a Function,
    /// Concrete type of each parametric, in declaration order.
    binding_types: Vec<ConcreteType>,
    known: HashMap<String, Value>,
}

impl<'a> BindingSolver<'a> {
    pub fn new(module: &'a Module, function: &'a Function, binding_types: Vec<ConcreteType>) -> Self {
        Self {
            module,
            function,
            binding_types,
            known: HashMap::new(),
        }
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.known.contains_key(name)
    }

    /// Record `name = value`; a different value for an already bound name
    /// is a conflict.
    pub fn bind(&mut self, name: &str, value: Value) -> Result<(), ResolveError> {
        match self.known.get(name) {
            Some(existing) if !same_number(existing, &value) => Err(ResolveError::Conflict {
                name: name.to_string(),
                first: existing.clone(),
                second: value,
            }),
            Some(_) => Ok(()),
            None => {
                self.known.insert(name.to_string(), value);
                Ok(())
            }
        }
    }

    /// Bind the parametrics that appear as dimensions of `declared` from
    /// the shape of `arg`.
    pub fn unify(&mut self, declared: &Type, arg: &Value) -> Result<(), ResolveError> {
        match (declared, arg) {
            (Type::Bits { width, .. }, Value::Bits(b) | Value::Enum { bits: b, .. }) => {
                self.bind_dim(*width, u64::from(b.width()))
            }
            (Type::Array { element, size }, Value::Array(items)) => {
                self.bind_dim(*size, items.len() as u64)?;
                match items.first() {
                    Some(first) => self.unify(element, first),
                    None => Ok(()),
                }
            }
            (Type::Tuple(types), Value::Tuple(items)) => {
                for (ty, item) in types.iter().zip(items) {
                    self.unify(ty, item)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn bind_dim(&mut self, dim: Dim, actual: u64) -> Result<(), ResolveError> {
        let Dim::Symbolic(expr) = dim else {
            return Ok(());
        };
        let ExprKind::Name(name) = &self.module.expr(expr).kind else {
            return Ok(());
        };
        let Some(index) = self
            .function
            .parametrics
            .iter()
            .position(|p| &p.name.name == name)
        else {
            return Ok(());
        };
        let value = self.dim_value(index, actual)?;
        self.bind(name, value)
    }

    fn dim_value(&self, index: usize, n: u64) -> Result<Value, ResolveError> {
        let name = &self.function.parametrics[index].name.name;
        match self.binding_types.get(index) {
            Some(ConcreteType::Bits { signed, width }) => {
                Ok(Value::Bits(Bits::new(*signed, *width, u128::from(n))))
            }
            Some(other) => Err(ResolveError::NotBits {
                name: name.clone(),
                ty: other.clone(),
            }),
            None => Ok(Value::u32(n as u32)),
        }
    }

    /// Bindings found so far, in declaration order.
    pub fn partial(&self) -> SymbolicBindings {
        let mut out = SymbolicBindings::new();
        for binding in &self.function.parametrics {
            if let Some(v) = self.known.get(&binding.name.name) {
                out.push(&binding.name.name, v.clone());
            }
        }
        out
    }

    /// Every parametric must be bound.
    pub fn finish(self) -> Result<SymbolicBindings, ResolveError> {
        let mut out = SymbolicBindings::new();
        for binding in &self.function.parametrics {
            match self.known.get(&binding.name.name) {
                Some(v) => out.push(&binding.name.name, v.clone()),
                None => {
                    return Err(ResolveError::Unbound {
                        name: binding.name.name.clone(),
                    })
                }
            }
        }
        Ok(out)
    }
}

fn same_number(a: &Value, b: &Value) -> bool {
    match (a.as_bits(), b.as_bits()) {
        (Some(x), Some(y)) => x.raw() == y.raw(),
        _ => a == b,
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Instantiation cache
// ══════════════════════════════════════════════════════════════════════════════

/// A function specialized to one set of bindings.
#[derive(Debug, Clone, PartialEq)]
pub struct Instantiation {
    pub function: FunctionId,
    pub bindings: SymbolicBindings,
    pub param_types: Vec<ConcreteType>,
    pub return_type: ConcreteType,
}

#[derive(Debug, Default)]
pub struct ParametricCache {
    entries: HashMap<(FunctionId, SymbolicBindings), Instantiation>,
    hits: u64,
}

impl ParametricCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&mut self, function: FunctionId, bindings: &SymbolicBindings) -> Option<&Instantiation> {
        let found = self.entries.get(&(function, bindings.clone()));
        if found.is_some() {
            self.hits += 1;
        }
        found
    }

    pub fn insert(&mut self, instantiation: Instantiation) {
        debug!(
            function = instantiation.function.0,
            bindings = %instantiation.bindings,
            "parametric instantiation"
        );
        let key = (instantiation.function, instantiation.bindings.clone());
        self.entries.entry(key).or_insert(instantiation);
    }

    /// Number of distinct instantiations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dslx_types::ast::{ExprId, Ident, ParametricBinding, TypeId};
    use dslx_types::Span;

    fn parametric_fn(module: &mut Module, names: &[&str]) -> (Function, Vec<ExprId>) {
        let exprs: Vec<ExprId> = names
            .iter()
            .map(|n| module.add_expr(ExprKind::Name((*n).to_string()), Span::fake()))
            .collect();
        let body = module.add_expr(ExprKind::Bool(true), Span::fake());
        let function = Function {
            name: Ident::new("f", Span::fake()),
            parametrics: names
                .iter()
                .map(|n| ParametricBinding {
                    name: Ident::new(*n, Span::fake()),
                    ty: TypeId(0),
                    default: None,
                    span: Span::fake(),
                })
                .collect(),
            params: Vec::new(),
            return_type: None,
            body,
            is_public: false,
            is_test: false,
            tag: dslx_types::ast::FunctionTag::Normal,
            span: Span::fake(),
        };
        (function, exprs)
    }

    fn u32_ty() -> ConcreteType {
        ConcreteType::Bits {
            signed: false,
            width: 32,
        }
    }

    #[test]
    fn test_unify_bits_width() {
        let mut module = Module::new("test", "test.x");
        let (function, exprs) = parametric_fn(&mut module, &["N"]);
        let mut solver = BindingSolver::new(&module, &function, vec![u32_ty()]);
        let declared = Type::Bits {
            signed: false,
            width: Dim::Symbolic(exprs[0]),
        };
        solver.unify(&declared, &Value::ubits(8, 3)).expect("unifies");
        let bindings = solver.finish().expect("bound");
        assert_eq!(bindings.get("N"), Some(&Value::u32(8)));
        assert_eq!(bindings.to_string(), "{N: u32:8}");
    }

    #[test]
    fn test_conflicting_widths() {
        let mut module = Module::new("test", "test.x");
        let (function, exprs) = parametric_fn(&mut module, &["N"]);
        let mut solver = BindingSolver::new(&module, &function, vec![u32_ty()]);
        let declared = Type::Tuple(vec![
            Type::Bits {
                signed: false,
                width: Dim::Symbolic(exprs[0]),
            },
            Type::Bits {
                signed: false,
                width: Dim::Symbolic(exprs[0]),
            },
        ]);
        let arg = Value::Tuple(vec![Value::ubits(8, 0), Value::ubits(16, 0)]);
        let err = solver.unify(&declared, &arg).expect_err("conflict");
        assert!(matches!(err, ResolveError::Conflict { .. }));
    }

    #[test]
    fn test_array_size_and_unbound() {
        let mut module = Module::new("test", "test.x");
        let (function, exprs) = parametric_fn(&mut module, &["N", "M"]);
        let mut solver = BindingSolver::new(&module, &function, vec![u32_ty(), u32_ty()]);
        let declared = Type::Array {
            element: Box::new(Type::u32()),
            size: Dim::Symbolic(exprs[0]),
        };
        solver
            .unify(&declared, &Value::Array(vec![Value::u32(1); 3]))
            .expect("unifies");
        assert_eq!(solver.partial().get("N"), Some(&Value::u32(3)));
        assert!(!solver.is_bound("M"));
        assert_eq!(
            solver.finish(),
            Err(ResolveError::Unbound { name: "M".into() })
        );
    }

    #[test]
    fn test_cache_counts_distinct_bindings() {
        let mut cache = ParametricCache::new();
        let mut bindings = SymbolicBindings::new();
        bindings.push("N", Value::u32(8));
        let inst = Instantiation {
            function: FunctionId(0),
            bindings: bindings.clone(),
            param_types: vec![],
            return_type: ConcreteType::unit(),
        };
        cache.insert(inst.clone());
        cache.insert(inst);
        assert_eq!(cache.len(), 1);
        assert!(cache.lookup(FunctionId(0), &bindings).is_some());
        assert!(cache.lookup(FunctionId(1), &bindings).is_none());
        assert_eq!(cache.hits(), 1);
    }
}
