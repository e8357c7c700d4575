//! The sandbox container
//!
//! A SandboxContainer is the script-owned namespace that stands in for the
//! real global object. Everything a script assigns to an undeclared name, and
//! everything the host injects, lives here.

use std::collections::BTreeMap;

use crate::engine::Value;

/// Identifier → value map owned by one isolation view
#[derive(Default)]
pub struct SandboxContainer {
    entries: BTreeMap<String, Value>,
}

impl SandboxContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Insert or replace an entry, returning the previous value
    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(name.into(), value)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.entries.remove(name)
    }

    /// Names in sorted order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_replace() {
        let mut container = SandboxContainer::new();
        assert!(container.is_empty());
        assert!(container.insert("x", Value::Number(1.0)).is_none());
        let previous = container.insert("x", Value::Number(2.0));
        assert_eq!(previous.map(|v| v.to_number()), Some(1.0));
        assert_eq!(container.get("x").map(Value::to_number), Some(2.0));
        assert_eq!(container.len(), 1);
    }

    #[test]
    fn test_keys_are_sorted() {
        let mut container = SandboxContainer::new();
        container.insert("zeta", Value::Null);
        container.insert("alpha", Value::Null);
        let keys: Vec<&str> = container.keys().collect();
        assert_eq!(keys, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_remove() {
        let mut container = SandboxContainer::new();
        container.insert("x", Value::Bool(true));
        assert!(container.remove("x").is_some());
        assert!(!container.contains("x"));
    }
}
