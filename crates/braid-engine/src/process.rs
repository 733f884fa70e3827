use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use braid_core::error::{BraidError, Result};

/// A directed, optionally guarded edge between two elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flow {
    /// Source element id.
    pub source_ref: String,
    /// Target element id.
    pub target_ref: String,
    /// Guard expression, only consulted at exclusive gateways.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl Flow {
    /// Create an unguarded flow.
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source_ref: source.into(),
            target_ref: target.into(),
            condition: None,
        }
    }

    /// Create a guarded flow.
    pub fn guarded(
        source: impl Into<String>,
        target: impl Into<String>,
        condition: impl Into<String>,
    ) -> Self {
        Self {
            source_ref: source.into(),
            target_ref: target.into(),
            condition: Some(condition.into()),
        }
    }
}

/// Maps a process variable onto a task input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputAssociation {
    /// Variable to read from the context.
    pub source: String,
    /// Input name seen by the executor (defaults to `source`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl InputAssociation {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: None,
        }
    }

    pub fn renamed(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: Some(target.into()),
        }
    }

    /// Name of the input as passed to the executor.
    pub fn target_name(&self) -> &str {
        self.target.as_deref().unwrap_or(&self.source)
    }
}

/// Payload shared by every task kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Id of the registered agent that runs this task.
    pub agent: String,
    /// Instruction text for generative tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
    /// Rule lines for business-rule tasks.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<String>,
    /// Script text for script tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<InputAssociation>,
    /// Variable that receives the task result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl TaskSpec {
    pub fn new(agent: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            ..Default::default()
        }
    }

    pub fn with_documentation(mut self, text: impl Into<String>) -> Self {
        self.documentation = Some(text.into());
        self
    }

    pub fn with_rules(mut self, rules: Vec<String>) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_script(mut self, script: impl Into<String>) -> Self {
        self.script = Some(script.into());
        self
    }

    /// Read each named variable as an input of the same name.
    pub fn with_inputs(mut self, sources: &[&str]) -> Self {
        self.inputs = sources.iter().map(|s| InputAssociation::new(*s)).collect();
        self
    }

    pub fn with_input(mut self, association: InputAssociation) -> Self {
        self.inputs.push(association);
        self
    }

    pub fn with_output(mut self, key: impl Into<String>) -> Self {
        self.output = Some(key.into());
        self
    }
}

/// The closed set of element kinds the interpreter understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ElementKind {
    StartEvent,
    EndEvent,
    ServiceTask(TaskSpec),
    UserTask(TaskSpec),
    BusinessRuleTask(TaskSpec),
    ScriptTask(TaskSpec),
    /// Loads, but executing it fails with `UnsupportedTaskType`.
    SendTask(TaskSpec),
    /// Loads, but executing it fails with `UnsupportedTaskType`.
    ReceiveTask(TaskSpec),
    ExclusiveGateway,
    ParallelGateway,
}

impl ElementKind {
    /// BPMN tag name of this kind.
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartEvent => "startEvent",
            Self::EndEvent => "endEvent",
            Self::ServiceTask(_) => "serviceTask",
            Self::UserTask(_) => "userTask",
            Self::BusinessRuleTask(_) => "businessRuleTask",
            Self::ScriptTask(_) => "scriptTask",
            Self::SendTask(_) => "sendTask",
            Self::ReceiveTask(_) => "receiveTask",
            Self::ExclusiveGateway => "exclusiveGateway",
            Self::ParallelGateway => "parallelGateway",
        }
    }

    /// Task payload, if this is a task kind.
    pub fn task(&self) -> Option<&TaskSpec> {
        match self {
            Self::ServiceTask(spec)
            | Self::UserTask(spec)
            | Self::BusinessRuleTask(spec)
            | Self::ScriptTask(spec)
            | Self::SendTask(spec)
            | Self::ReceiveTask(spec) => Some(spec),
            Self::StartEvent | Self::EndEvent | Self::ExclusiveGateway | Self::ParallelGateway => {
                None
            }
        }
    }
}

/// A node in a process graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    /// Unique identifier within the definition.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub kind: ElementKind,
}

impl Element {
    pub fn new(id: impl Into<String>, kind: ElementKind) -> Self {
        Self {
            id: id.into(),
            name: None,
            kind,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// A named graph of elements and flows.
///
/// Immutable once built: both the builder and the loader validate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessDefinition {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    elements: Vec<Element>,
    #[serde(default)]
    flows: Vec<Flow>,
}

impl ProcessDefinition {
    pub fn builder(id: impl Into<String>) -> ProcessBuilder {
        ProcessBuilder {
            id: id.into(),
            name: None,
            elements: vec![],
            flows: vec![],
        }
    }

    /// Check that element ids are unique and every flow endpoint exists.
    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for element in &self.elements {
            if !ids.insert(element.id.as_str()) {
                return Err(BraidError::MalformedProcess(format!(
                    "duplicate element id '{}' in process '{}'",
                    element.id, self.id
                )));
            }
        }

        for flow in &self.flows {
            for endpoint in [&flow.source_ref, &flow.target_ref] {
                if !ids.contains(endpoint.as_str()) {
                    return Err(BraidError::MalformedProcess(format!(
                        "flow {} -> {} references unknown element '{}'",
                        flow.source_ref, flow.target_ref, endpoint
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn flows(&self) -> &[Flow] {
        &self.flows
    }

    /// Look up an element by id.
    pub fn element(&self, id: &str) -> Option<&Element> {
        self.elements.iter().find(|e| e.id == id)
    }

    /// The first start event in declaration order.
    pub fn start_element(&self) -> Result<&Element> {
        let mut starts = self
            .elements
            .iter()
            .filter(|e| matches!(e.kind, ElementKind::StartEvent));

        let first = starts.next().ok_or_else(|| {
            BraidError::MalformedProcess(format!("process '{}' has no start event", self.id))
        })?;

        if starts.next().is_some() {
            warn!(
                process_id = %self.id,
                start = %first.id,
                "Process has several start events, using the first"
            );
        }

        Ok(first)
    }

    /// Flows leaving `id`, in declaration order.
    pub fn outgoing<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Flow> + 'a {
        self.flows.iter().filter(move |f| f.source_ref == id)
    }

    /// Flows entering `id`, in declaration order.
    pub fn incoming<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Flow> + 'a {
        self.flows.iter().filter(move |f| f.target_ref == id)
    }

    /// Agent ids referenced by task elements, deduplicated, in order.
    pub fn agent_refs(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.elements
            .iter()
            .filter_map(|e| e.kind.task())
            .map(|t| t.agent.as_str())
            .filter(|a| seen.insert(*a))
            .collect()
    }
}

/// Incremental builder for `ProcessDefinition`.
pub struct ProcessBuilder {
    id: String,
    name: Option<String>,
    elements: Vec<Element>,
    flows: Vec<Flow>,
}

impl ProcessBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn element(mut self, element: Element) -> Self {
        self.elements.push(element);
        self
    }

    pub fn start(self, id: &str) -> Self {
        self.element(Element::new(id, ElementKind::StartEvent))
    }

    pub fn end(self, id: &str) -> Self {
        self.element(Element::new(id, ElementKind::EndEvent))
    }

    pub fn service_task(self, id: &str, spec: TaskSpec) -> Self {
        self.element(Element::new(id, ElementKind::ServiceTask(spec)))
    }

    pub fn user_task(self, id: &str, spec: TaskSpec) -> Self {
        self.element(Element::new(id, ElementKind::UserTask(spec)))
    }

    pub fn business_rule_task(self, id: &str, spec: TaskSpec) -> Self {
        self.element(Element::new(id, ElementKind::BusinessRuleTask(spec)))
    }

    pub fn script_task(self, id: &str, spec: TaskSpec) -> Self {
        self.element(Element::new(id, ElementKind::ScriptTask(spec)))
    }

    pub fn exclusive_gateway(self, id: &str) -> Self {
        self.element(Element::new(id, ElementKind::ExclusiveGateway))
    }

    pub fn parallel_gateway(self, id: &str) -> Self {
        self.element(Element::new(id, ElementKind::ParallelGateway))
    }

    pub fn flow(mut self, source: &str, target: &str) -> Self {
        self.flows.push(Flow::new(source, target));
        self
    }

    pub fn guarded_flow(mut self, source: &str, target: &str, condition: &str) -> Self {
        self.flows.push(Flow::guarded(source, target, condition));
        self
    }

    /// Chain flows through the given ids in order.
    pub fn sequence(mut self, ids: &[&str]) -> Self {
        for pair in ids.windows(2) {
            self.flows.push(Flow::new(pair[0], pair[1]));
        }
        self
    }

    pub fn build(self) -> Result<ProcessDefinition> {
        let definition = ProcessDefinition {
            id: self.id,
            name: self.name,
            elements: self.elements,
            flows: self.flows,
        };
        definition.validate()?;
        Ok(definition)
    }
}
