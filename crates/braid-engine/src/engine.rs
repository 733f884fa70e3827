use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::BoxFuture;
use tracing::{debug, error, info, warn};

use braid_core::config::EngineConfig;
use braid_core::error::{BraidError, Result};
use braid_core::traits::{ConditionEvaluator, NullSink, ObservabilitySink};
use braid_core::types::Variables;

use crate::agent::{emit_span, Agent};
use crate::condition::ExpressionEvaluator;
use crate::context::Context;
use crate::process::{Element, ElementKind, Flow, ProcessDefinition, TaskSpec};

/// How one traversal segment stopped.
#[derive(Debug, Clone, PartialEq)]
enum Halt {
    /// End event, or an element with no outgoing flow.
    End,
    /// Parallel branches stopped at this join gateway, arriving on
    /// `arrivals` of its incoming flows.
    Join { id: String, arrivals: usize },
}

/// Workflow interpreter.
///
/// Owns the loaded process definitions and the agent registry. Both are
/// mutated only through `&mut self`, so registration necessarily happens
/// before any `execute_process` call borrows the engine.
pub struct Engine {
    processes: HashMap<String, Arc<ProcessDefinition>>,
    agents: HashMap<String, Arc<Agent>>,
    evaluator: Arc<dyn ConditionEvaluator>,
    config: EngineConfig,
    /// Receives spans for task failures that happen before any agent runs.
    sink: Arc<dyn ObservabilitySink>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(Arc::new(ExpressionEvaluator), EngineConfig::default())
    }
}

impl Engine {
    pub fn new(evaluator: Arc<dyn ConditionEvaluator>, config: EngineConfig) -> Self {
        Self {
            processes: HashMap::new(),
            agents: HashMap::new(),
            evaluator,
            config,
            sink: Arc::new(NullSink),
        }
    }

    /// Report failures that no agent sees (an unregistered agent id) to
    /// `sink`. Usually the same sink the agents report to.
    pub fn with_sink(mut self, sink: Arc<dyn ObservabilitySink>) -> Self {
        self.sink = sink;
        self
    }

    /// Register an agent. Re-registering an id replaces the previous agent.
    pub fn register_agent(&mut self, agent_id: impl Into<String>, agent: Arc<Agent>) {
        let agent_id = agent_id.into();
        if self.agents.insert(agent_id.clone(), agent).is_some() {
            debug!(agent_id = %agent_id, "Replaced registered agent");
        }
    }

    /// Load a process definition. Re-loading an id replaces it wholesale.
    pub fn load_process(&mut self, process_id: impl Into<String>, definition: ProcessDefinition) {
        let process_id = process_id.into();
        info!(
            process_id = %process_id,
            elements = definition.elements().len(),
            flows = definition.flows().len(),
            "Loaded process"
        );
        self.processes.insert(process_id, Arc::new(definition));
    }

    pub fn process(&self, process_id: &str) -> Option<&ProcessDefinition> {
        self.processes.get(process_id).map(|p| p.as_ref())
    }

    pub fn agent(&self, agent_id: &str) -> Option<&Arc<Agent>> {
        self.agents.get(agent_id)
    }

    /// Ids of all loaded processes, sorted.
    pub fn process_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.processes.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Create a fresh context for `process_id` without running it.
    pub fn new_context(&self, process_id: &str, initial_variables: Variables) -> Result<Context> {
        if !self.processes.contains_key(process_id) {
            return Err(BraidError::UnknownProcess(process_id.to_string()));
        }
        Ok(Context::new(process_id, initial_variables))
    }

    /// Run a process to completion and return its final context.
    pub async fn execute_process(
        &self,
        process_id: &str,
        initial_variables: Variables,
    ) -> Result<Context> {
        let mut context = self.new_context(process_id, initial_variables)?;
        self.run(&mut context).await?;
        Ok(context)
    }

    /// Drive `context` from its process's start event.
    ///
    /// On failure the context keeps the path visited so far, ending at the
    /// failing element.
    pub async fn run(&self, context: &mut Context) -> Result<()> {
        let definition = self
            .processes
            .get(&context.process_id)
            .cloned()
            .ok_or_else(|| BraidError::UnknownProcess(context.process_id.clone()))?;
        let start_id = definition.start_element()?.id.clone();

        let started = Instant::now();
        info!(
            process_id = %context.process_id,
            instance_id = %context.instance_id,
            start = %start_id,
            "Executing process"
        );

        self.traverse(&definition, context, start_id, false).await?;

        info!(
            process_id = %context.process_id,
            instance_id = %context.instance_id,
            visited = context.path().len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Process complete"
        );
        Ok(())
    }

    /// Walk the graph from `from` until an end, an implicit end, or (for a
    /// parallel branch) a join gateway.
    fn traverse<'a>(
        &'a self,
        definition: &'a ProcessDefinition,
        context: &'a mut Context,
        from: String,
        in_branch: bool,
    ) -> BoxFuture<'a, Result<Halt>> {
        Box::pin(async move {
            let mut current = from;
            // Join this segment forked into and now continues through.
            let mut resumed_join: Option<String> = None;
            let mut steps = 0usize;

            loop {
                let element = definition.element(&current).ok_or_else(|| {
                    BraidError::MalformedProcess(format!(
                        "element '{}' not found in process '{}'",
                        current, definition.id
                    ))
                })?;

                if in_branch
                    && resumed_join.as_deref() != Some(element.id.as_str())
                    && is_join(definition, element)
                {
                    debug!(
                        instance_id = %context.instance_id,
                        join = %element.id,
                        "Branch reached join"
                    );
                    return Ok(Halt::Join {
                        id: element.id.clone(),
                        arrivals: 1,
                    });
                }
                resumed_join = None;

                steps += 1;
                if steps > self.config.max_steps {
                    warn!(
                        element_id = %element.id,
                        max_steps = self.config.max_steps,
                        "Step limit exceeded, aborting traversal"
                    );
                    return Err(BraidError::StepLimitExceeded(self.config.max_steps));
                }

                context.visit(&element.id);
                debug!(
                    instance_id = %context.instance_id,
                    element_id = %element.id,
                    kind = element.kind.name(),
                    "Visiting element"
                );

                let next = match &element.kind {
                    ElementKind::EndEvent => return Ok(Halt::End),
                    ElementKind::StartEvent => first_target(definition, &element.id),
                    ElementKind::ServiceTask(spec)
                    | ElementKind::UserTask(spec)
                    | ElementKind::BusinessRuleTask(spec)
                    | ElementKind::ScriptTask(spec)
                    | ElementKind::SendTask(spec)
                    | ElementKind::ReceiveTask(spec) => {
                        self.run_task(element, spec, context).await?;
                        first_target(definition, &element.id)
                    }
                    ElementKind::ExclusiveGateway => {
                        Some(self.choose_flow(definition, element, context)?)
                    }
                    ElementKind::ParallelGateway => {
                        let outgoing: Vec<&Flow> = definition.outgoing(&element.id).collect();
                        if outgoing.len() > 1 {
                            match self.fork(definition, element, &outgoing, context).await? {
                                // Flows from outside this fork still converge
                                // on the join: the enclosing fork owns it.
                                Some((join, arrivals))
                                    if in_branch
                                        && arrivals < definition.incoming(&join).count() =>
                                {
                                    return Ok(Halt::Join { id: join, arrivals });
                                }
                                Some((join, _)) => {
                                    resumed_join = Some(join.clone());
                                    Some(join)
                                }
                                None => return Ok(Halt::End),
                            }
                        } else {
                            outgoing.first().map(|f| f.target_ref.clone())
                        }
                    }
                };

                match next {
                    Some(next) => current = next,
                    None => {
                        debug!(element_id = %element.id, "No outgoing flow, traversal complete");
                        return Ok(Halt::End);
                    }
                }
            }
        })
    }

    async fn run_task(
        &self,
        element: &Element,
        spec: &TaskSpec,
        context: &mut Context,
    ) -> Result<()> {
        let Some(agent) = self.agents.get(&spec.agent) else {
            let err = BraidError::UnknownAgent {
                element: element.id.clone(),
                agent: spec.agent.clone(),
            };
            error!(
                element_id = %element.id,
                instance_id = %context.instance_id,
                agent = %spec.agent,
                "No agent registered for task"
            );
            let now = Utc::now();
            emit_span(self.sink.as_ref(), element, context, now, now, Some(&err));
            return Err(err);
        };

        agent.execute_task(element, context).await?;
        Ok(())
    }

    /// Pick the first outgoing flow whose guard holds, in declaration order.
    ///
    /// Unguarded flows are never taken as a default. The one exception is a
    /// gateway with a single unguarded outgoing flow, which merges paths.
    fn choose_flow(
        &self,
        definition: &ProcessDefinition,
        gateway: &Element,
        context: &Context,
    ) -> Result<String> {
        let outgoing: Vec<&Flow> = definition.outgoing(&gateway.id).collect();

        if let [only] = outgoing.as_slice() {
            if only.condition.is_none() {
                return Ok(only.target_ref.clone());
            }
        }

        for flow in outgoing {
            let Some(condition) = flow.condition.as_deref() else {
                continue;
            };
            if self.evaluator.evaluate(condition, context.variables()) {
                debug!(
                    gateway = %gateway.id,
                    target = %flow.target_ref,
                    condition,
                    "Exclusive gateway selected flow"
                );
                return Ok(flow.target_ref.clone());
            }
        }

        Err(BraidError::NoMatchingCondition {
            gateway: gateway.id.clone(),
        })
    }

    /// Run every branch of a fork concurrently and merge the results.
    ///
    /// Returns the join to continue from together with the number of its
    /// incoming flows the branches arrived on, or `None` when no branch
    /// reached one. All branches settle before any failure is reported.
    async fn fork(
        &self,
        definition: &ProcessDefinition,
        gateway: &Element,
        outgoing: &[&Flow],
        context: &mut Context,
    ) -> Result<Option<(String, usize)>> {
        info!(
            instance_id = %context.instance_id,
            gateway = %gateway.id,
            branches = outgoing.len(),
            "Forking parallel branches"
        );

        let mut branches: Vec<Context> = (0..outgoing.len()).map(|i| context.fork(i)).collect();

        let futs = branches
            .iter_mut()
            .zip(outgoing)
            .map(|(branch, flow)| self.traverse(definition, branch, flow.target_ref.clone(), true));
        let results: Vec<Result<Halt>> = futures::future::join_all(futs).await;

        for branch in &branches {
            context.extend_path(branch.path());
        }

        let mut join: Option<(String, usize)> = None;
        let mut failure: Option<BraidError> = None;
        for (index, result) in results.into_iter().enumerate() {
            match result {
                Ok(Halt::Join { id, arrivals }) => {
                    if let Some((ref expected, ref mut total)) = join {
                        if *expected == id {
                            *total += arrivals;
                        } else {
                            warn!(
                                gateway = %gateway.id,
                                branch = index,
                                expected = %expected,
                                found = %id,
                                "Branch converged on a different join"
                            );
                        }
                    } else {
                        join = Some((id, arrivals));
                    }
                }
                Ok(Halt::End) => {}
                Err(e) => {
                    warn!(gateway = %gateway.id, branch = index, error = %e, "Parallel branch failed");
                    if failure.is_none() {
                        failure = Some(e);
                    }
                }
            }
        }

        if let Some(e) = failure {
            return Err(e);
        }

        // Declaration order: later branches overwrite earlier ones.
        for branch in &branches {
            context.merge_variables(branch.variables());
        }

        debug!(
            gateway = %gateway.id,
            join = join.as_ref().map(|(id, _)| id.as_str()).unwrap_or("-"),
            "Parallel branches merged"
        );
        Ok(join)
    }
}

/// Target of the first outgoing flow, in declaration order.
fn first_target(definition: &ProcessDefinition, id: &str) -> Option<String> {
    definition.outgoing(id).next().map(|f| f.target_ref.clone())
}

/// A parallel gateway that several flows converge on. It may fork again
/// once resumed.
fn is_join(definition: &ProcessDefinition, element: &Element) -> bool {
    matches!(element.kind, ElementKind::ParallelGateway)
        && definition.incoming(&element.id).count() > 1
}
