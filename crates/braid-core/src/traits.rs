use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::{TaskSpan, Variables};

/// Performs the actual work of a task.
///
/// One implementation per task category (generative, rule-based,
/// transform). The call may suspend for arbitrary external latency.
pub trait CapabilityExecutor: Send + Sync + 'static {
    /// Executor name (used in logs).
    fn name(&self) -> &str;

    /// Execute with the task's instruction text, its resolved inputs,
    /// and a snapshot of the process variables.
    fn execute(
        &self,
        instructions: String,
        inputs: Variables,
        variables: Variables,
    ) -> BoxFuture<'_, Result<serde_json::Value>>;
}

/// Decides exclusive-gateway guards.
///
/// Must be pure and deterministic.
pub trait ConditionEvaluator: Send + Sync + 'static {
    fn evaluate(&self, expression: &str, variables: &Variables) -> bool;
}

impl<F> ConditionEvaluator for F
where
    F: Fn(&str, &Variables) -> bool + Send + Sync + 'static,
{
    fn evaluate(&self, expression: &str, variables: &Variables) -> bool {
        self(expression, variables)
    }
}

/// Receives one span per task execution.
///
/// Fire-and-forget: implementations must swallow their own failures.
pub trait ObservabilitySink: Send + Sync + 'static {
    fn emit(&self, span: TaskSpan);
}

/// Sink that drops every span.
pub struct NullSink;

impl ObservabilitySink for NullSink {
    fn emit(&self, _span: TaskSpan) {}
}
