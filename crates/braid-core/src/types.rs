use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Process variables. Values are opaque JSON to the engine.
pub type Variables = HashMap<String, serde_json::Value>;

/// Unique identifier of one process execution.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct InstanceId(pub String);

impl InstanceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_str(s: &str) -> Self {
        Self(s.to_string())
    }

    /// Id of the `index`-th branch forked from this instance.
    pub fn branch(&self, index: usize) -> Self {
        Self(format!("{}.{}", self.0, index))
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One observability record of a task execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpan {
    pub task_id: String,
    /// Element kind, e.g. `serviceTask`.
    pub kind: String,
    pub process_id: String,
    pub instance_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskSpan {
    /// Wall-clock duration in milliseconds.
    pub fn elapsed_ms(&self) -> i64 {
        (self.end_time - self.start_time).num_milliseconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_ids_are_unique() {
        let a = InstanceId::new();
        let b = InstanceId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_branch_id() {
        let id = InstanceId::from_str("root");
        assert_eq!(id.branch(0).0, "root.0");
        assert_eq!(id.branch(1).branch(2).0, "root.1.2");
    }

    #[test]
    fn test_span_skips_missing_error() {
        let now = Utc::now();
        let span = TaskSpan {
            task_id: "t".into(),
            kind: "serviceTask".into(),
            process_id: "p".into(),
            instance_id: "i".into(),
            start_time: now,
            end_time: now,
            success: true,
            error: None,
        };
        let json = serde_json::to_value(&span).unwrap();
        assert!(json.get("error").is_none());
        assert_eq!(json["success"], serde_json::json!(true));
        assert_eq!(span.elapsed_ms(), 0);
    }
}
