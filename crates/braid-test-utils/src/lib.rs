//! Mocks shared by the Braid test suites.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value;

use braid_core::error::{BraidError, Result};
use braid_core::traits::{CapabilityExecutor, ObservabilitySink};
use braid_core::types::{TaskSpan, Variables};

/// Returns its single input unchanged, or an object of all inputs.
pub struct EchoExecutor;

impl CapabilityExecutor for EchoExecutor {
    fn name(&self) -> &str {
        "echo"
    }

    fn execute(
        &self,
        _instructions: String,
        inputs: Variables,
        _variables: Variables,
    ) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            if inputs.len() == 1 {
                return Ok(inputs.into_values().next().unwrap_or(Value::Null));
            }
            Ok(Value::Object(inputs.into_iter().collect()))
        })
    }
}

/// Returns a fixed value, optionally after a delay, and counts calls.
pub struct ConstantExecutor {
    value: Value,
    delay: Duration,
    calls: AtomicUsize,
}

impl ConstantExecutor {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CapabilityExecutor for ConstantExecutor {
    fn name(&self) -> &str {
        "constant"
    }

    fn execute(
        &self,
        _instructions: String,
        _inputs: Variables,
        _variables: Variables,
    ) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(self.value.clone())
        })
    }
}

/// Always fails with `BraidError::Capability`, optionally after a delay.
pub struct FailingExecutor {
    message: String,
    delay: Duration,
}

impl FailingExecutor {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl CapabilityExecutor for FailingExecutor {
    fn name(&self) -> &str {
        "failing"
    }

    fn execute(
        &self,
        _instructions: String,
        _inputs: Variables,
        _variables: Variables,
    ) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Err(BraidError::Capability(self.message.clone()))
        })
    }
}

/// Records every emitted span, in emission order.
#[derive(Default)]
pub struct RecordingSink {
    spans: Mutex<Vec<TaskSpan>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spans(&self) -> Vec<TaskSpan> {
        self.spans.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Task ids of recorded spans, in emission order.
    pub fn task_ids(&self) -> Vec<String> {
        self.spans().into_iter().map(|s| s.task_id).collect()
    }
}

impl ObservabilitySink for RecordingSink {
    fn emit(&self, span: TaskSpan) {
        if let Ok(mut spans) = self.spans.lock() {
            spans.push(span);
        }
    }
}

/// Panics on every emission.
pub struct PanickingSink;

impl ObservabilitySink for PanickingSink {
    fn emit(&self, _span: TaskSpan) {
        panic!("sink exploded");
    }
}

/// Shorthand for building a variable map in tests.
pub fn vars(pairs: &[(&str, Value)]) -> Variables {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// Convenience: an `Arc` of a fresh `RecordingSink`.
pub fn recording_sink() -> Arc<RecordingSink> {
    Arc::new(RecordingSink::new())
}
