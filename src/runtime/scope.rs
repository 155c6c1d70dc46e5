//! Namespaces and scopes
//!
//! [`Namespace`] is the reflection capability the scanner relies on: enumerate
//! names, resolve a name to a value. Modules and [`Scope`]s both implement it.

use super::Value;
use indexmap::IndexMap;

/// Something exposing enumerable named values
pub trait Namespace {
    /// Visible names, in the namespace's enumeration order
    fn names(&self) -> Vec<String>;

    /// Resolve a name
    fn lookup(&self, name: &str) -> Option<Value>;
}

/// A caller's local or global variable table
///
/// Iteration follows insertion order; rebinding an existing name keeps its
/// position.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    bindings: IndexMap<String, Value>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    /// Bind a name, returning the previous value
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.bindings.insert(name.into(), value.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.bindings.shift_remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.bindings.iter()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl Namespace for Scope {
    fn names(&self) -> Vec<String> {
        self.bindings.keys().cloned().collect()
    }

    fn lookup(&self, name: &str) -> Option<Value> {
        self.bindings.get(name).cloned()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Scope {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            bindings: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }
}
