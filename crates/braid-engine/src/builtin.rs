//! Built-in capability executors.
//!
//! Enough to run a definition end to end without external services: the
//! CLI wires these into every agent a definition references.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use braid_core::error::{BraidError, Result};
use braid_core::traits::{CapabilityExecutor, ConditionEvaluator, ObservabilitySink};
use braid_core::types::Variables;

use crate::agent::Agent;
use crate::condition::ExpressionEvaluator;

/// Returns its single input unchanged, an object of several inputs, or the
/// instruction text when there are none.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoExecutor;

impl CapabilityExecutor for EchoExecutor {
    fn name(&self) -> &str {
        "echo"
    }

    fn execute(
        &self,
        instructions: String,
        inputs: Variables,
        _variables: Variables,
    ) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            Ok(match inputs.len() {
                0 => Value::String(instructions),
                1 => inputs.into_values().next().unwrap_or(Value::Null),
                _ => Value::Object(inputs.into_iter().collect()),
            })
        })
    }
}

/// Evaluates each non-empty instruction line as a condition.
///
/// Inputs shadow process variables of the same name. The result is `true`
/// only when every rule holds; a rule set with no rules is an error.
pub struct RuleExecutor {
    evaluator: Arc<dyn ConditionEvaluator>,
}

impl RuleExecutor {
    pub fn new(evaluator: Arc<dyn ConditionEvaluator>) -> Self {
        Self { evaluator }
    }
}

impl Default for RuleExecutor {
    fn default() -> Self {
        Self::new(Arc::new(ExpressionEvaluator))
    }
}

impl CapabilityExecutor for RuleExecutor {
    fn name(&self) -> &str {
        "rules"
    }

    fn execute(
        &self,
        instructions: String,
        inputs: Variables,
        variables: Variables,
    ) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            let rules: Vec<&str> = instructions
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .collect();
            if rules.is_empty() {
                return Err(BraidError::Capability("no rules to evaluate".into()));
            }

            let mut scope = variables;
            scope.extend(inputs);

            let passed = rules.iter().all(|rule| self.evaluator.evaluate(rule, &scope));
            Ok(Value::Bool(passed))
        })
    }
}

/// Renders `{{name}}` placeholders in the script text.
///
/// Inputs take precedence over process variables. Unknown placeholders
/// render as the empty string.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateExecutor;

impl CapabilityExecutor for TemplateExecutor {
    fn name(&self) -> &str {
        "template"
    }

    fn execute(
        &self,
        instructions: String,
        inputs: Variables,
        variables: Variables,
    ) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            let rendered = render(&instructions, |name| {
                inputs.get(name).or_else(|| variables.get(name))
            });
            Ok(Value::String(rendered))
        })
    }
}

fn render<'v>(template: &str, lookup: impl Fn(&str) -> Option<&'v Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        match after.find("}}") {
            Some(close) => {
                let name = after[..close].trim();
                match lookup(name) {
                    Some(Value::String(s)) => out.push_str(s),
                    Some(Value::Null) | None => {}
                    Some(other) => out.push_str(&other.to_string()),
                }
                rest = &after[close + 2..];
            }
            None => {
                // Unterminated placeholder: keep the text as written.
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// An agent with every built-in executor wired in.
pub fn builtin_agent(sink: Arc<dyn ObservabilitySink>, evaluator: Arc<dyn ConditionEvaluator>) -> Agent {
    Agent::new(sink)
        .with_generative(Arc::new(EchoExecutor))
        .with_rule(Arc::new(RuleExecutor::new(evaluator)))
        .with_transform(Arc::new(TemplateExecutor))
}
