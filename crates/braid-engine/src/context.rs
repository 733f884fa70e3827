use serde::{Deserialize, Serialize};

use braid_core::types::{InstanceId, Variables};

/// Per-execution mutable state.
///
/// Each context is owned by exactly one traversal at a time; parallel
/// branches work on forked copies that are merged back at the join.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    pub process_id: String,
    pub instance_id: InstanceId,
    variables: Variables,
    current_element: Option<String>,
    execution_path: Vec<String>,
}

impl Context {
    pub fn new(process_id: impl Into<String>, variables: Variables) -> Self {
        Self {
            process_id: process_id.into(),
            instance_id: InstanceId::new(),
            variables,
            current_element: None,
            execution_path: Vec::new(),
        }
    }

    /// Get a variable by key.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.variables.get(key)
    }

    /// Get a variable as a string, if it's a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.variables.get(key).and_then(|v| v.as_str())
    }

    /// Set a variable.
    pub fn set(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.variables.insert(key.into(), value);
    }

    /// Set a string variable.
    pub fn set_str(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.variables
            .insert(key.into(), serde_json::Value::String(value.into()));
    }

    /// Merge another variable set into this one (overwrites on conflict).
    pub fn merge_variables(&mut self, other: &Variables) {
        for (k, v) in other {
            self.variables.insert(k.clone(), v.clone());
        }
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn into_variables(self) -> Variables {
        self.variables
    }

    /// Record a visit to `element_id`.
    pub fn visit(&mut self, element_id: &str) {
        self.execution_path.push(element_id.to_string());
        self.current_element = Some(element_id.to_string());
    }

    /// Append a branch's path segment after this context's own path.
    pub(crate) fn extend_path(&mut self, segment: &[String]) {
        self.execution_path.extend_from_slice(segment);
    }

    pub fn current_element(&self) -> Option<&str> {
        self.current_element.as_deref()
    }

    /// Visited element ids in visitation order.
    pub fn path(&self) -> &[String] {
        &self.execution_path
    }

    /// Copy for the `index`-th branch of a fork: same process, suffixed
    /// instance id, copied variables, empty path.
    pub fn fork(&self, index: usize) -> Self {
        Self {
            process_id: self.process_id.clone(),
            instance_id: self.instance_id.branch(index),
            variables: self.variables.clone(),
            current_element: self.current_element.clone(),
            execution_path: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_basic_operations() {
        let mut ctx = Context::new("p", Variables::new());
        ctx.set_str("name", "Alice");
        ctx.set("count", json!(42));

        assert_eq!(ctx.get_str("name"), Some("Alice"));
        assert_eq!(ctx.get("count"), Some(&json!(42)));
        assert_eq!(ctx.get("missing"), None);
    }

    #[test]
    fn test_merge() {
        let mut ctx = Context::new("p", Variables::new());
        ctx.set_str("a", "1");
        ctx.set_str("b", "2");

        let mut other = Variables::new();
        other.insert("b".into(), json!("overwritten"));
        other.insert("c".into(), json!("3"));

        ctx.merge_variables(&other);

        assert_eq!(ctx.get_str("a"), Some("1"));
        assert_eq!(ctx.get_str("b"), Some("overwritten"));
        assert_eq!(ctx.get_str("c"), Some("3"));
    }

    #[test]
    fn test_visit_appends() {
        let mut ctx = Context::new("p", Variables::new());
        assert_eq!(ctx.current_element(), None);
        ctx.visit("start");
        ctx.visit("task");
        assert_eq!(ctx.path(), ["start", "task"]);
        assert_eq!(ctx.current_element(), Some("task"));
    }

    #[test]
    fn test_fork_isolates_variables() {
        let mut parent = Context::new("p", Variables::new());
        parent.set_str("shared", "parent");
        parent.visit("fork");

        let mut branch = parent.fork(1);
        branch.set_str("shared", "branch");
        branch.visit("x");

        assert_eq!(parent.get_str("shared"), Some("parent"));
        assert_eq!(branch.process_id, "p");
        assert_eq!(branch.instance_id.0, format!("{}.1", parent.instance_id));
        assert_eq!(branch.path(), ["x"]);
        assert_eq!(parent.path(), ["fork"]);
    }

    #[test]
    fn test_fresh_instance_ids() {
        let a = Context::new("p", Variables::new());
        let b = Context::new("p", Variables::new());
        assert_ne!(a.instance_id, b.instance_id);
    }
}
