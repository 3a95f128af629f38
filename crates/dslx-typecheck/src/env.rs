//! Type environment with lexically scoped bindings.
//!
//! [`TypeEnv`] manages a stack of scopes, each carrying variable bindings
//! and the kind of code context it represents.

use std::collections::HashMap;

use crate::ty::Type;

// ══════════════════════════════════════════════════════════════════════════════
// Scope Kind
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Module,
    /// A free function body.
    Function,
    /// A proc `config` body: `spawn` and `chan` are allowed.
    ProcConfig,
    /// A proc `next` body: channel operations are allowed.
    ProcNext,
    /// A nested block, match arm or loop body.
    Block,
}

// ══════════════════════════════════════════════════════════════════════════════
// Scope
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
struct Scope {
    kind: ScopeKind,
    bindings: HashMap<String, Type>,
}

// ══════════════════════════════════════════════════════════════════════════════
// TypeEnv
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
pub struct TypeEnv {
    scopes: Vec<Scope>,
}

impl TypeEnv {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope {
                kind: ScopeKind::Module,
                bindings: HashMap::new(),
            }],
        }
    }

    pub fn push_scope(&mut self, kind: ScopeKind) {
        self.scopes.push(Scope {
            kind,
            bindings: HashMap::new(),
        });
    }

    /// Pop the top scope. The module scope is never popped.
    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Bind in the innermost scope; shadows outer bindings.
    pub fn define(&mut self, name: &str, ty: Type) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.bindings.insert(name.to_string(), ty);
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Type> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.bindings.get(name))
    }

    /// The nearest enclosing function-level scope kind.
    pub fn body_kind(&self) -> ScopeKind {
        self.scopes
            .iter()
            .rev()
            .map(|s| s.kind)
            .find(|k| *k != ScopeKind::Block)
            .unwrap_or(ScopeKind::Module)
    }
}

impl Default for TypeEnv {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shadowing_and_pop() {
        let mut env = TypeEnv::new();
        env.push_scope(ScopeKind::Function);
        env.define("x", Type::u32());
        env.push_scope(ScopeKind::Block);
        env.define("x", Type::bool());
        assert_eq!(env.lookup("x"), Some(&Type::bool()));
        env.pop_scope();
        assert_eq!(env.lookup("x"), Some(&Type::u32()));
    }

    #[test]
    fn test_body_kind_skips_blocks() {
        let mut env = TypeEnv::new();
        env.push_scope(ScopeKind::ProcConfig);
        env.push_scope(ScopeKind::Block);
        env.push_scope(ScopeKind::Block);
        assert_eq!(env.body_kind(), ScopeKind::ProcConfig);
    }
}
