//! Scoped variable environment for the evaluator.

use std::collections::BTreeMap;

use crate::value::Value;

/// A single scope level.
#[derive(Debug, Clone, Default)]
struct Scope {
    bindings: BTreeMap<String, Value>,
}

/// Scoped variable environment with push/pop semantics.
///
/// Variables are looked up from innermost scope outward. `define` always
/// creates in the current (innermost) scope, so a later `let` of the same
/// name shadows rather than overwrites.
#[derive(Debug, Clone)]
pub struct Environment {
    scopes: Vec<Scope>,
}

impl Environment {
    /// Create a new environment with one outermost scope.
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    /// Pop the innermost scope. The outermost scope is never popped.
    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn define(&mut self, name: &str, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.bindings.insert(name.to_string(), value);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.bindings.get(name))
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shadowing() {
        let mut env = Environment::new();
        env.define("x", Value::u32(1));
        env.push_scope();
        env.define("x", Value::u32(2));
        assert_eq!(env.get("x"), Some(&Value::u32(2)));
        env.pop_scope();
        assert_eq!(env.get("x"), Some(&Value::u32(1)));
    }

    #[test]
    fn test_outermost_scope_survives_pop() {
        let mut env = Environment::new();
        env.define("y", Value::Token);
        env.pop_scope();
        assert_eq!(env.depth(), 1);
        assert_eq!(env.get("y"), Some(&Value::Token));
        assert_eq!(env.get("z"), None);
    }
}
