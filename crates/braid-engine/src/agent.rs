use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, warn};

use braid_core::error::{BraidError, Result};
use braid_core::traits::{CapabilityExecutor, ObservabilitySink};
use braid_core::types::{TaskSpan, Variables};

use crate::context::Context;
use crate::process::{Element, ElementKind, TaskSpec};

/// Which capability executor a task kind is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskCategory {
    /// Service and user tasks.
    Generative,
    /// Business-rule tasks.
    RuleBased,
    /// Script tasks.
    Transform,
}

impl TaskCategory {
    /// Category for an element kind; `None` for kinds agents cannot run.
    pub fn of(kind: &ElementKind) -> Option<Self> {
        match kind {
            ElementKind::ServiceTask(_) | ElementKind::UserTask(_) => Some(Self::Generative),
            ElementKind::BusinessRuleTask(_) => Some(Self::RuleBased),
            ElementKind::ScriptTask(_) => Some(Self::Transform),
            ElementKind::SendTask(_)
            | ElementKind::ReceiveTask(_)
            | ElementKind::StartEvent
            | ElementKind::EndEvent
            | ElementKind::ExclusiveGateway
            | ElementKind::ParallelGateway => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Generative => "generative",
            Self::RuleBased => "rule-based",
            Self::Transform => "transform",
        }
    }

    /// Instruction text this category reads from a task payload.
    fn instructions(self, spec: &TaskSpec) -> String {
        match self {
            Self::Generative => spec.documentation.clone().unwrap_or_default(),
            Self::RuleBased => spec.rules.join("\n"),
            Self::Transform => spec.script.clone().unwrap_or_default(),
        }
    }
}

/// Executes task elements through category-specific capability executors.
///
/// Agents hold no per-execution state; one agent may serve any number of
/// concurrent branches.
pub struct Agent {
    generative: Option<Arc<dyn CapabilityExecutor>>,
    rule: Option<Arc<dyn CapabilityExecutor>>,
    transform: Option<Arc<dyn CapabilityExecutor>>,
    sink: Arc<dyn ObservabilitySink>,
}

impl Agent {
    /// Create an agent with no executors that reports spans to `sink`.
    pub fn new(sink: Arc<dyn ObservabilitySink>) -> Self {
        Self {
            generative: None,
            rule: None,
            transform: None,
            sink,
        }
    }

    /// Set the executor for service and user tasks.
    pub fn with_generative(mut self, executor: Arc<dyn CapabilityExecutor>) -> Self {
        self.generative = Some(executor);
        self
    }

    /// Set the executor for business-rule tasks.
    pub fn with_rule(mut self, executor: Arc<dyn CapabilityExecutor>) -> Self {
        self.rule = Some(executor);
        self
    }

    /// Set the executor for script tasks.
    pub fn with_transform(mut self, executor: Arc<dyn CapabilityExecutor>) -> Self {
        self.transform = Some(executor);
        self
    }

    fn executor(&self, category: TaskCategory) -> Option<&Arc<dyn CapabilityExecutor>> {
        match category {
            TaskCategory::Generative => self.generative.as_ref(),
            TaskCategory::RuleBased => self.rule.as_ref(),
            TaskCategory::Transform => self.transform.as_ref(),
        }
    }

    /// Run one task element against `context`.
    ///
    /// The result is written under the task's declared output key and
    /// returned. Exactly one span is emitted, whether or not the call fails.
    pub async fn execute_task(
        &self,
        element: &Element,
        context: &mut Context,
    ) -> Result<serde_json::Value> {
        let start_time = Utc::now();
        let result = self.invoke(element, context).await;
        let end_time = Utc::now();

        if let Err(ref e) = result {
            error!(
                element_id = %element.id,
                instance_id = %context.instance_id,
                error = %e,
                "Task failed"
            );
        }

        emit_span(
            self.sink.as_ref(),
            element,
            context,
            start_time,
            end_time,
            result.as_ref().err(),
        );
        result
    }

    async fn invoke(&self, element: &Element, context: &mut Context) -> Result<serde_json::Value> {
        let unsupported = |kind: String| BraidError::UnsupportedTaskType {
            element: element.id.clone(),
            kind,
        };

        let (spec, category) = match (element.kind.task(), TaskCategory::of(&element.kind)) {
            (Some(spec), Some(category)) => (spec, category),
            _ => return Err(unsupported(element.kind.name().to_string())),
        };

        let executor = self.executor(category).ok_or_else(|| {
            unsupported(format!(
                "{} (agent has no {} executor)",
                element.kind.name(),
                category.label()
            ))
        })?;

        let instructions = category.instructions(spec);
        let inputs = resolve_inputs(spec, context.variables());

        debug!(
            element_id = %element.id,
            executor = executor.name(),
            inputs = inputs.len(),
            "Invoking capability executor"
        );

        let value = executor
            .execute(instructions, inputs, context.variables().clone())
            .await
            .map_err(|e| match e {
                BraidError::CapabilityExecution { .. } => e,
                BraidError::Capability(message) => BraidError::CapabilityExecution {
                    element: element.id.clone(),
                    message,
                },
                other => BraidError::CapabilityExecution {
                    element: element.id.clone(),
                    message: other.to_string(),
                },
            })?;

        if let Some(ref key) = spec.output {
            context.set(key.clone(), value.clone());
        }

        Ok(value)
    }
}

/// Report one task execution to `sink`.
///
/// A panicking sink is logged and otherwise ignored.
pub(crate) fn emit_span(
    sink: &dyn ObservabilitySink,
    element: &Element,
    context: &Context,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    error: Option<&BraidError>,
) {
    let span = TaskSpan {
        task_id: element.id.clone(),
        kind: element.kind.name().to_string(),
        process_id: context.process_id.clone(),
        instance_id: context.instance_id.to_string(),
        start_time,
        end_time,
        success: error.is_none(),
        error: error.map(|e| e.to_string()),
    };

    if std::panic::catch_unwind(AssertUnwindSafe(|| sink.emit(span))).is_err() {
        warn!(element_id = %element.id, "Observability sink panicked, span dropped");
    }
}

/// Build the executor input map from the task's input associations.
///
/// A missing source variable resolves to `null` rather than failing.
fn resolve_inputs(spec: &TaskSpec, variables: &Variables) -> Variables {
    spec.inputs
        .iter()
        .map(|assoc| {
            let value = variables
                .get(&assoc.source)
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            (assoc.target_name().to_string(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use braid_test_utils::{EchoExecutor, FailingExecutor, PanickingSink, RecordingSink};
    use serde_json::json;

    use crate::process::InputAssociation;

    fn agent_with(sink: Arc<RecordingSink>) -> Agent {
        Agent::new(sink)
            .with_generative(Arc::new(EchoExecutor))
            .with_rule(Arc::new(EchoExecutor))
            .with_transform(Arc::new(EchoExecutor))
    }

    fn ctx() -> Context {
        let mut ctx = Context::new("proc", Variables::new());
        ctx.set_str("x", "hi");
        ctx
    }

    #[test]
    fn test_category_mapping() {
        let spec = TaskSpec::new("a");
        assert_eq!(
            TaskCategory::of(&ElementKind::ServiceTask(spec.clone())),
            Some(TaskCategory::Generative)
        );
        assert_eq!(
            TaskCategory::of(&ElementKind::UserTask(spec.clone())),
            Some(TaskCategory::Generative)
        );
        assert_eq!(
            TaskCategory::of(&ElementKind::BusinessRuleTask(spec.clone())),
            Some(TaskCategory::RuleBased)
        );
        assert_eq!(
            TaskCategory::of(&ElementKind::ScriptTask(spec.clone())),
            Some(TaskCategory::Transform)
        );
        assert_eq!(TaskCategory::of(&ElementKind::SendTask(spec)), None);
        assert_eq!(TaskCategory::of(&ElementKind::ExclusiveGateway), None);
    }

    #[test]
    fn test_instruction_payloads() {
        let spec = TaskSpec::new("a")
            .with_documentation("summarize")
            .with_rules(vec!["a > 1".into(), "b".into()])
            .with_script("{{x}}");
        assert_eq!(TaskCategory::Generative.instructions(&spec), "summarize");
        assert_eq!(TaskCategory::RuleBased.instructions(&spec), "a > 1\nb");
        assert_eq!(TaskCategory::Transform.instructions(&spec), "{{x}}");
        assert_eq!(TaskCategory::Transform.instructions(&TaskSpec::new("a")), "");
    }

    #[test]
    fn test_missing_input_resolves_to_null() {
        let spec = TaskSpec::new("a")
            .with_input(InputAssociation::new("x"))
            .with_input(InputAssociation::renamed("absent", "other"));
        let mut vars = Variables::new();
        vars.insert("x".into(), json!(1));
        let inputs = resolve_inputs(&spec, &vars);
        assert_eq!(inputs.get("x"), Some(&json!(1)));
        assert_eq!(inputs.get("other"), Some(&serde_json::Value::Null));
    }

    #[tokio::test]
    async fn test_execute_writes_output_and_emits_span() {
        let sink = Arc::new(RecordingSink::new());
        let agent = agent_with(sink.clone());
        let element = Element::new(
            "t1",
            ElementKind::ServiceTask(TaskSpec::new("echo").with_inputs(&["x"]).with_output("y")),
        );
        let mut ctx = ctx();

        let value = agent.execute_task(&element, &mut ctx).await.unwrap();

        assert_eq!(value, json!("hi"));
        assert_eq!(ctx.get_str("y"), Some("hi"));
        let spans = sink.spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].task_id, "t1");
        assert_eq!(spans[0].kind, "serviceTask");
        assert_eq!(spans[0].process_id, "proc");
        assert_eq!(spans[0].instance_id, ctx.instance_id.0);
        assert!(spans[0].success);
    }

    #[tokio::test]
    async fn test_executor_failure_wrapped_and_span_emitted() {
        let sink = Arc::new(RecordingSink::new());
        let agent =
            Agent::new(sink.clone()).with_transform(Arc::new(FailingExecutor::new("bad script")));
        let element = Element::new(
            "s1",
            ElementKind::ScriptTask(TaskSpec::new("tx").with_output("out")),
        );
        let mut ctx = ctx();

        let err = agent.execute_task(&element, &mut ctx).await.unwrap_err();

        match err {
            BraidError::CapabilityExecution { element, message } => {
                assert_eq!(element, "s1");
                assert_eq!(message, "bad script");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(ctx.get("out").is_none());
        let spans = sink.spans();
        assert_eq!(spans.len(), 1);
        assert!(!spans[0].success);
        assert!(spans[0].error.as_deref().unwrap().contains("bad script"));
    }

    #[tokio::test]
    async fn test_send_task_unsupported() {
        let sink = Arc::new(RecordingSink::new());
        let agent = agent_with(sink.clone());
        let element = Element::new("send", ElementKind::SendTask(TaskSpec::new("echo")));
        let mut ctx = ctx();

        let err = agent.execute_task(&element, &mut ctx).await.unwrap_err();

        assert!(matches!(
            err,
            BraidError::UnsupportedTaskType { ref element, ref kind } if element == "send" && kind == "sendTask"
        ));
        assert_eq!(sink.spans().len(), 1);
        assert!(!sink.spans()[0].success);
    }

    #[tokio::test]
    async fn test_missing_executor_unsupported() {
        let sink = Arc::new(RecordingSink::new());
        let agent = Agent::new(sink.clone()).with_generative(Arc::new(EchoExecutor));
        let element = Element::new("rule", ElementKind::BusinessRuleTask(TaskSpec::new("a")));
        let mut ctx = ctx();

        let err = agent.execute_task(&element, &mut ctx).await.unwrap_err();
        assert!(matches!(err, BraidError::UnsupportedTaskType { .. }));
        assert_eq!(sink.spans().len(), 1);
    }

    #[tokio::test]
    async fn test_panicking_sink_does_not_propagate() {
        let agent = Agent::new(Arc::new(PanickingSink)).with_generative(Arc::new(EchoExecutor));
        let element = Element::new(
            "t1",
            ElementKind::UserTask(TaskSpec::new("a").with_inputs(&["x"]).with_output("y")),
        );
        let mut ctx = ctx();

        let value = agent.execute_task(&element, &mut ctx).await.unwrap();
        assert_eq!(value, json!("hi"));
    }
}
