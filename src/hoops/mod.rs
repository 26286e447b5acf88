//! Hoop handlers: the polymorphic node implementations the engine dispatches
//! to by kind. Handlers never mutate the flow graph; they see their rendered
//! input and a read-only view of the execution context.

pub mod branch;
pub mod complaint;
pub mod documents;
pub mod notify;
pub mod rag;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::clients::{ClientError, Collaborators};
use crate::flow::Node;
use crate::flow::context::FlowContext;
use crate::render::JsonMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Produces an output, routes to the declared next node.
    Action,
    /// Selects between `true_path` and `false_path`; stores no output.
    Branch,
}

#[derive(Debug, Error)]
pub enum HoopError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("collaborator unavailable: {0}")]
    RemoteUnavailable(String),
    #[error("collaborator failed: {0}")]
    RemoteError(String),
    #[error("deadline exceeded")]
    Timeout,
}

impl HoopError {
    pub fn kind(&self) -> &'static str {
        match self {
            HoopError::InvalidInput(_) => "invalid_input",
            HoopError::RemoteUnavailable(_) => "remote_unavailable",
            HoopError::RemoteError(_) => "remote_error",
            HoopError::Timeout => "timeout",
        }
    }
}

impl From<ClientError> for HoopError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Unavailable(msg) => HoopError::RemoteUnavailable(msg),
            ClientError::Remote(msg) => HoopError::RemoteError(msg),
        }
    }
}

/// What a handler hands back: an output map, an explicit next node, or both.
#[derive(Debug, Default)]
pub struct HoopOutcome {
    pub output: Option<JsonMap>,
    pub next: Option<String>,
}

impl HoopOutcome {
    pub fn output(map: JsonMap) -> Self {
        Self {
            output: Some(map),
            next: None,
        }
    }

    pub fn route(next: impl Into<String>) -> Self {
        Self {
            output: None,
            next: Some(next.into()),
        }
    }
}

#[async_trait]
pub trait Hoop: Send + Sync {
    fn kind(&self) -> &'static str;

    fn classification(&self) -> Classification {
        Classification::Action
    }

    /// Field names the engine asserts are present in the rendered input
    /// before dispatch.
    fn required_fields(&self) -> &'static [&'static str] {
        &[]
    }

    /// Per-call deadline; the retry budget lives inside it.
    fn timeout(&self) -> Duration {
        Duration::from_secs(5)
    }

    async fn execute(
        &self,
        ctx: &FlowContext,
        node: &Node,
        input: &JsonMap,
    ) -> Result<HoopOutcome, HoopError>;
}

/// Process-wide table from hoop kind to handler. Read-only after startup and
/// shared by reference across concurrent executions.
pub struct Registry {
    hoops: HashMap<&'static str, Arc<dyn Hoop>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            hoops: HashMap::new(),
        }
    }

    /// All built-in handlers wired to the given collaborators.
    pub fn builtin(collab: Collaborators) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(branch::IfNode));
        registry.register(Arc::new(rag::RagSearchFaq::new(collab.search)));
        registry.register(Arc::new(rag::RagLlmAnswer::new(collab.answer)));
        registry.register(Arc::new(complaint::LogComplaint::new(collab.complaints)));
        registry.register(Arc::new(documents::CreateDocument::new(
            collab.documents.clone(),
        )));
        registry.register(Arc::new(documents::UpdateDocument::new(
            collab.documents.clone(),
        )));
        registry.register(Arc::new(documents::DeleteDocument::new(
            collab.documents.clone(),
        )));
        registry.register(Arc::new(documents::UpdateDocumentBySearch::new(
            collab.documents,
        )));
        registry.register(Arc::new(notify::SendNotification::new(
            collab.notifier.clone(),
        )));
        registry.register(Arc::new(notify::SendBotReply::new(collab.notifier)));
        registry
    }

    pub fn register(&mut self, hoop: Arc<dyn Hoop>) {
        self.hoops.insert(hoop.kind(), hoop);
    }

    pub fn get(&self, kind: &str) -> Option<&Arc<dyn Hoop>> {
        self.hoops.get(kind)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Fetch a required string field from a rendered input map.
pub(crate) fn require_str<'a>(input: &'a JsonMap, field: &str) -> Result<&'a str, HoopError> {
    match input.get(field) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(HoopError::InvalidInput(format!(
            "field `{field}` must be a string"
        ))),
        None => Err(HoopError::InvalidInput(format!(
            "missing required field `{field}`"
        ))),
    }
}

/// Optional string field, defaulting to empty.
pub(crate) fn optional_str<'a>(input: &'a JsonMap, field: &str) -> &'a str {
    input.get(field).and_then(Value::as_str).unwrap_or("")
}
