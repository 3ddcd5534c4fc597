/*
 * context.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The variable environment threaded through template execution.
//!
//! Bindings are an ordered name → value map. Scoped constructs take an
//! explicit [`Bindings::fork`] and either discard it (conditional
//! branches, parameterized apply) or fold a single rendered value back
//! into the parent with [`Bindings::merge_back`] (multi-part variables).

use sxd_xpath::Value;

/// Ordered variable environment. Values are either strings or node-set
/// handles; both are late-bound into the query context at evaluation
/// time.
#[derive(Debug, Clone, Default)]
pub struct Bindings<'d> {
    entries: Vec<(String, Value<'d>)>,
}

impl<'d> Bindings<'d> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Bind `name`, replacing any existing binding of the same name.
    pub fn set(&mut self, name: &str, value: Value<'d>) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value<'d>> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Independent copy for a nested scope. Writes to the fork do not
    /// affect `self`.
    pub fn fork(&self) -> Self {
        self.clone()
    }

    /// Fold a value produced in a forked scope back into this
    /// environment as a string binding.
    pub fn merge_back(&mut self, name: &str, rendered: String) {
        self.set(name, Value::String(rendered));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value<'d>)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
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
    fn test_set_replaces_existing_binding() {
        let mut bindings = Bindings::new();
        bindings.set("color", Value::String("red".into()));
        bindings.set("color", Value::String("blue".into()));
        assert_eq!(bindings.len(), 1);
        match bindings.get("color") {
            Some(Value::String(s)) => assert_eq!(s, "blue"),
            other => panic!("unexpected binding: {other:?}"),
        }
    }

    #[test]
    fn test_fork_is_isolated() {
        let mut parent = Bindings::new();
        parent.set("a", Value::String("1".into()));
        let mut child = parent.fork();
        child.set("a", Value::String("2".into()));
        child.set("b", Value::String("3".into()));
        match parent.get("a") {
            Some(Value::String(s)) => assert_eq!(s, "1"),
            other => panic!("unexpected binding: {other:?}"),
        }
        assert!(parent.get("b").is_none());
    }

    #[test]
    fn test_merge_back_binds_string() {
        let mut parent = Bindings::new();
        parent.merge_back("built", "hello".to_string());
        match parent.get("built") {
            Some(Value::String(s)) => assert_eq!(s, "hello"),
            other => panic!("unexpected binding: {other:?}"),
        }
    }
}
