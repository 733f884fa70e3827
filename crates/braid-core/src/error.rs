use thiserror::Error;

#[derive(Debug, Error)]
pub enum BraidError {
    // Registry errors
    #[error("Unknown process: {0}")]
    UnknownProcess(String),

    #[error("Malformed process: {0}")]
    MalformedProcess(String),

    #[error("Unknown agent '{agent}' referenced by element {element}")]
    UnknownAgent { element: String, agent: String },

    // Dispatch errors
    #[error("Unsupported task type for element {element}: {kind}")]
    UnsupportedTaskType { element: String, kind: String },

    #[error("No outgoing condition matched at gateway {gateway}")]
    NoMatchingCondition { gateway: String },

    #[error("Capability execution failed: {element}: {message}")]
    CapabilityExecution { element: String, message: String },

    /// Raised by capability executors; wrapped into `CapabilityExecution`
    /// by the agent that invoked them.
    #[error("Capability error: {0}")]
    Capability(String),

    #[error("Execution exceeded max steps ({0})")]
    StepLimitExceeded(usize),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BraidError {
    /// The element that caused the failure, when the error names one.
    pub fn element_id(&self) -> Option<&str> {
        match self {
            Self::UnknownAgent { element, .. }
            | Self::UnsupportedTaskType { element, .. }
            | Self::CapabilityExecution { element, .. } => Some(element),
            Self::NoMatchingCondition { gateway } => Some(gateway),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, BraidError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_id() {
        let err = BraidError::NoMatchingCondition {
            gateway: "gw1".into(),
        };
        assert_eq!(err.element_id(), Some("gw1"));

        let err = BraidError::CapabilityExecution {
            element: "task".into(),
            message: "boom".into(),
        };
        assert_eq!(err.element_id(), Some("task"));

        assert_eq!(BraidError::UnknownProcess("p".into()).element_id(), None);
    }

    #[test]
    fn test_display() {
        let err = BraidError::UnknownAgent {
            element: "t1".into(),
            agent: "writer".into(),
        };
        assert_eq!(
            err.to_string(),
            "Unknown agent 'writer' referenced by element t1"
        );
    }
}
