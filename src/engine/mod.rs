//! The executor engine: walks a flow graph node by node, renders inputs,
//! dispatches hoop handlers, records outputs, routes on branch results, and
//! emits one execution event per attempted node.
//!
//! One execution owns its context exclusively; the flow, registry, and
//! collaborators are shared read-only. Within a run, progression is strictly
//! sequential. Cycles are permitted by design: callers bound loops with the
//! whole-flow deadline or guard branches.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

use crate::events::{EventStatus, ExecutionEvent, MessageSink};
use crate::flow::context::FlowContext;
use crate::flow::{Flow, Node, loader, wire};
use crate::hoops::{Classification, Hoop, HoopError, HoopOutcome, Registry};
use crate::metrics::Metrics;
use crate::render::{self, JsonMap};

/// Node whose output stands in for the terminal result when the last
/// executed action is not what the caller wants addressed.
const TERMINAL_OUTPUT_NODE: &str = "fetch_answer";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Fail,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Fail => "fail",
        }
    }
}

/// What the caller gets back: the terminal output on success, a structured
/// failure descriptor otherwise.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub output: JsonMap,
    pub failure: Option<NodeFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeFailure {
    pub node_id: String,
    pub hoop: String,
    pub kind: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Whole-flow deadline. Exceeding it at any suspension point cancels the
    /// in-flight handler and fails the run.
    pub flow_deadline: Option<Duration>,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no handler registered for hoop `{hoop}`")]
    UnknownHoop { node_id: String, hoop: String },
    #[error("no output recorded for upstream node `{from}`")]
    MissingUpstreamOutput { node_id: String, from: String },
    #[error("control flow points to unknown node `{target}`")]
    DanglingNext { node_id: String, target: String },
    #[error("flow deadline exceeded")]
    FlowTimeout { node_id: String },
    #[error("{source}")]
    Hoop {
        node_id: String,
        hoop: String,
        #[source]
        source: HoopError,
    },
}

impl EngineError {
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::UnknownHoop { .. } => "unknown_hoop",
            EngineError::MissingUpstreamOutput { .. } => "missing_upstream_output",
            EngineError::DanglingNext { .. } => "dangling_next",
            EngineError::FlowTimeout { .. } => "flow_timeout",
            EngineError::Hoop { source, .. } => source.kind(),
        }
    }

    fn node_id(&self) -> &str {
        match self {
            EngineError::UnknownHoop { node_id, .. }
            | EngineError::MissingUpstreamOutput { node_id, .. }
            | EngineError::DanglingNext { node_id, .. }
            | EngineError::FlowTimeout { node_id }
            | EngineError::Hoop { node_id, .. } => node_id,
        }
    }

    fn hoop(&self) -> Option<&str> {
        match self {
            EngineError::UnknownHoop { hoop, .. } | EngineError::Hoop { hoop, .. } => {
                Some(hoop)
            }
            _ => None,
        }
    }
}

/// Bounded exponential backoff applied only to `remote_unavailable`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub factor: u32,
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base: Duration::from_millis(200),
            factor: 2,
            cap: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self, retry: u32) -> Duration {
        self.base
            .saturating_mul(self.factor.saturating_pow(retry))
            .min(self.cap)
    }
}

enum InvokeError {
    Hoop(HoopError),
    FlowTimeout,
}

pub struct Engine {
    registry: Registry,
    events: Arc<dyn MessageSink>,
    metrics: Arc<Metrics>,
    retry: RetryPolicy,
    timeout_override: Option<Duration>,
}

impl Engine {
    pub fn new(registry: Registry, events: Arc<dyn MessageSink>, metrics: Arc<Metrics>) -> Self {
        Self {
            registry,
            events,
            metrics,
            retry: RetryPolicy::default(),
            timeout_override: None,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replace every handler's per-call deadline with a single value.
    pub fn with_hoop_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_override = Some(timeout);
        self
    }

    pub async fn run(&self, flow: &Flow, input: JsonMap) -> RunReport {
        self.run_with_options(flow, input, RunOptions::default())
            .await
    }

    pub async fn run_with_options(
        &self,
        flow: &Flow,
        input: JsonMap,
        options: RunOptions,
    ) -> RunReport {
        let run_id = Uuid::new_v4().to_string();
        let short_id = &run_id[..8];
        let span = tracing::info_span!("flow_run", flow = %flow.flow_id, run = %short_id);

        let mut ctx = FlowContext::new(&flow.context);
        ctx.merge_input(input);
        ctx.promote_identity();

        let flow_deadline = options.flow_deadline.map(|d| Instant::now() + d);

        tracing::info!(parent: &span, nodes = flow.nodes.len(), "▶ Started");
        let started = Instant::now();
        let result = self
            .execute_flow(flow, &mut ctx, flow_deadline)
            .instrument(span.clone())
            .await;
        let elapsed = started.elapsed();

        let report = match result {
            Ok(output) => {
                tracing::info!(
                    parent: &span,
                    elapsed = format_args!("{:.1}s", elapsed.as_secs_f64()),
                    "✓ Completed"
                );
                RunReport {
                    status: RunStatus::Success,
                    output,
                    failure: None,
                }
            }
            Err(err) => {
                let node_id = err.node_id().to_string();
                let hoop = err.hoop().map(str::to_string).unwrap_or_else(|| {
                    flow.nodes
                        .iter()
                        .find(|n| n.id == node_id)
                        .map(|n| n.hoop.clone())
                        .unwrap_or_default()
                });
                tracing::error!(
                    parent: &span,
                    elapsed = format_args!("{:.1}s", elapsed.as_secs_f64()),
                    node = %node_id,
                    error = %err,
                    "✗ Failed"
                );
                RunReport {
                    status: RunStatus::Fail,
                    output: JsonMap::new(),
                    failure: Some(NodeFailure {
                        node_id,
                        hoop,
                        kind: err.kind(),
                        message: err.to_string(),
                    }),
                }
            }
        };

        self.metrics
            .flow_executions_total
            .with_label_values(&[&flow.flow_id, report.status.as_str()])
            .inc();
        report
    }

    async fn execute_flow(
        &self,
        flow: &Flow,
        ctx: &mut FlowContext,
        flow_deadline: Option<Instant>,
    ) -> Result<JsonMap, EngineError> {
        let index: HashMap<&str, usize> = flow
            .nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.id.as_str(), i))
            .collect();

        let mut pos = 0usize;
        let mut last_output: Option<JsonMap> = None;

        while pos < flow.nodes.len() {
            let node = &flow.nodes[pos];

            // Empty hoop: pass-through. No handler, no event, no output.
            if node.hoop.is_empty() {
                tracing::debug!(node = %node.id, "Pass-through node");
                pos += 1;
                continue;
            }

            let Some(hoop) = self.registry.get(&node.hoop).cloned() else {
                self.emit_event(flow, ctx, node, &node.parameters, None, EventStatus::Fail)
                    .await;
                return Err(EngineError::UnknownHoop {
                    node_id: node.id.clone(),
                    hoop: node.hoop.clone(),
                });
            };

            if !node.input_from.is_empty() && !ctx.outputs.contains_key(&node.input_from) {
                self.emit_event(flow, ctx, node, &node.parameters, None, EventStatus::Fail)
                    .await;
                return Err(EngineError::MissingUpstreamOutput {
                    node_id: node.id.clone(),
                    from: node.input_from.clone(),
                });
            }

            // Raw input: branches always evaluate their declared parameters;
            // actions take the upstream output when input_from is set
            // (declared parameters are ignored in that case).
            let raw = match hoop.classification() {
                Classification::Branch => node.parameters.clone(),
                Classification::Action if !node.input_from.is_empty() => ctx
                    .outputs
                    .get(&node.input_from)
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default(),
                Classification::Action => node.parameters.clone(),
            };

            let snapshot = ctx.snapshot();
            let rendered = render::render_params(&raw, &snapshot);

            if let Some(missing) = hoop
                .required_fields()
                .iter()
                .find(|field| !rendered.contains_key(**field))
            {
                self.emit_event(flow, ctx, node, &rendered, None, EventStatus::Fail)
                    .await;
                return Err(EngineError::Hoop {
                    node_id: node.id.clone(),
                    hoop: node.hoop.clone(),
                    source: HoopError::InvalidInput(format!(
                        "missing required field `{missing}`"
                    )),
                });
            }

            tracing::debug!(node = %node.id, hoop = %node.hoop, "Executing node");
            let node_started = Instant::now();
            let invoked = self
                .invoke(hoop.as_ref(), ctx, node, &rendered, flow_deadline)
                .await;
            self.metrics
                .node_execution_duration_seconds
                .with_label_values(&[&node.id, &node.hoop])
                .observe(node_started.elapsed().as_secs_f64());

            let outcome = match invoked {
                Ok(outcome) => outcome,
                Err(err) => {
                    self.emit_event(flow, ctx, node, &rendered, None, EventStatus::Fail)
                        .await;
                    return Err(match err {
                        InvokeError::FlowTimeout => EngineError::FlowTimeout {
                            node_id: node.id.clone(),
                        },
                        InvokeError::Hoop(source) => EngineError::Hoop {
                            node_id: node.id.clone(),
                            hoop: node.hoop.clone(),
                            source,
                        },
                    });
                }
            };

            let explicit_next = outcome.next.filter(|target| !target.is_empty());

            match hoop.classification() {
                Classification::Action => {
                    let output = outcome.output.unwrap_or_default();
                    ctx.outputs
                        .insert(node.id.clone(), Value::Object(output.clone()));
                    self.emit_event(flow, ctx, node, &rendered, Some(&output), EventStatus::Success)
                        .await;
                    last_output = Some(output);
                }
                Classification::Branch => {
                    self.emit_event(flow, ctx, node, &rendered, None, EventStatus::Success)
                        .await;
                }
            }

            // Routing precedence: handler next, then jump_to, then the next
            // declared node.
            let declared_jump = || (!node.jump_to.is_empty()).then(|| node.jump_to.clone());
            match explicit_next.or_else(declared_jump) {
                Some(target) => match index.get(target.as_str()) {
                    Some(&next_pos) => pos = next_pos,
                    None => {
                        return Err(EngineError::DanglingNext {
                            node_id: node.id.clone(),
                            target,
                        });
                    }
                },
                None => pos += 1,
            }
        }

        let final_output = last_output
            .or_else(|| {
                ctx.outputs
                    .get(TERMINAL_OUTPUT_NODE)
                    .and_then(Value::as_object)
                    .cloned()
            })
            .unwrap_or_default();
        Ok(final_output)
    }

    /// Dispatch an action handler under its deadline budget, retrying only
    /// `remote_unavailable`. Branch handlers do no I/O and run bare.
    async fn invoke(
        &self,
        hoop: &dyn Hoop,
        ctx: &FlowContext,
        node: &Node,
        input: &JsonMap,
        flow_deadline: Option<Instant>,
    ) -> Result<HoopOutcome, InvokeError> {
        if hoop.classification() == Classification::Branch {
            return hoop.execute(ctx, node, input).await.map_err(InvokeError::Hoop);
        }

        let budget = self.timeout_override.unwrap_or_else(|| hoop.timeout());
        let hoop_deadline = Instant::now() + budget;
        let (deadline, flow_bound) = match flow_deadline {
            Some(fd) if fd < hoop_deadline => (fd, true),
            _ => (hoop_deadline, false),
        };
        let timeout_error = || {
            if flow_bound {
                InvokeError::FlowTimeout
            } else {
                InvokeError::Hoop(HoopError::Timeout)
            }
        };

        let mut attempt: u32 = 0;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(timeout_error());
            }

            match tokio::time::timeout(deadline - now, hoop.execute(ctx, node, input)).await {
                Ok(Ok(outcome)) => return Ok(outcome),
                Ok(Err(HoopError::RemoteUnavailable(message))) => {
                    attempt += 1;
                    if attempt >= self.retry.max_attempts {
                        return Err(InvokeError::Hoop(HoopError::RemoteUnavailable(message)));
                    }
                    let backoff = self.retry.backoff(attempt - 1);
                    if Instant::now() + backoff >= deadline {
                        // No budget left to retry in.
                        return Err(timeout_error());
                    }
                    tracing::warn!(
                        node = %node.id,
                        hoop = %node.hoop,
                        attempt,
                        error = %message,
                        "Collaborator unavailable, retrying in {:?}",
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
                Ok(Err(other)) => return Err(InvokeError::Hoop(other)),
                Err(_elapsed) => return Err(timeout_error()),
            }
        }
    }

    async fn emit_event(
        &self,
        flow: &Flow,
        ctx: &FlowContext,
        node: &Node,
        input: &JsonMap,
        output: Option<&JsonMap>,
        status: EventStatus,
    ) {
        let event = ExecutionEvent {
            flow_id: flow.flow_id.clone(),
            node_id: node.id.clone(),
            hoop: node.hoop.clone(),
            input: Value::Object(input.clone()),
            output: output
                .map(|o| Value::Object(o.clone()))
                .unwrap_or(Value::Null),
            user_id: ctx.user_id.clone(),
            tenant_id: ctx.tenant_id.clone(),
            status,
            timestamp: Utc::now(),
        };

        let payload = match serde_json::to_vec(&event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(node = %node.id, error = %e, "Failed to serialize execution event");
                return;
            }
        };

        // Publication is fire-and-forget: a dead broker never fails a node.
        if let Err(e) = self.events.publish(&ctx.user_id, &payload).await {
            tracing::warn!(node = %node.id, error = %e, "Failed to publish execution event");
        }
    }

    // -- file-based entry points ------------------------------------------

    /// Load a textual flow and run it with no caller input.
    pub async fn run_flow_from_file(&self, path: &Path) -> Result<RunReport> {
        self.run_flow_with_input(path, JsonMap::new()).await
    }

    /// Load a textual flow, merge caller input, run.
    pub async fn run_flow_with_input(&self, path: &Path, input: JsonMap) -> Result<RunReport> {
        let flow = loader::from_json_file(path)?;
        Ok(self.run(&flow, input).await)
    }

    /// As [`run_flow_with_input`], but hand back the terminal output map and
    /// turn a failed run into an error.
    pub async fn run_flow_and_return_output(
        &self,
        path: &Path,
        input: JsonMap,
    ) -> Result<JsonMap> {
        let report = self.run_flow_with_input(path, input).await?;
        match report.failure {
            None => Ok(report.output),
            Some(failure) => Err(anyhow::anyhow!(
                "node `{}` failed with {}: {}",
                failure.node_id,
                failure.kind,
                failure.message
            )),
        }
    }

    /// Run a compiled flow. A `.json` path is compiled to a sibling `.pb`
    /// first, so callers can point at either form.
    pub async fn run_compiled_flow_from_file(
        &self,
        path: &Path,
        input: JsonMap,
    ) -> Result<RunReport> {
        let flow = wire::load_or_compile(path)?;
        Ok(self.run(&flow, input).await)
    }
}
