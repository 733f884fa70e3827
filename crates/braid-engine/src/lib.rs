//! Workflow interpreter for BPMN-style process graphs driven through agents.
//!
//! A process is a graph of `Element`s connected by `Flow`s. The `Engine`
//! walks it from the start event, running task elements through registered
//! `Agent`s, choosing one guarded flow at exclusive gateways, and running
//! the branches of parallel gateways concurrently before merging their
//! variables back in declaration order.

pub mod agent;
pub mod builtin;
pub mod condition;
pub mod context;
pub mod engine;
pub mod loader;
pub mod process;
pub mod sinks;

pub use agent::{Agent, TaskCategory};
pub use builtin::{builtin_agent, EchoExecutor, RuleExecutor, TemplateExecutor};
pub use condition::{evaluate_condition, ExpressionEvaluator};
pub use context::Context;
pub use engine::Engine;
pub use process::{
    Element, ElementKind, Flow, InputAssociation, ProcessBuilder, ProcessDefinition, TaskSpec,
};
pub use sinks::{FanoutSink, JsonlSpanSink, TracingSink};
