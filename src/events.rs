//! Execution events and the message sink they are published through.
//!
//! The engine treats publication as fire-and-forget: it serializes the event,
//! hands it to the sink keyed by user id, and moves on. Delivery guarantees
//! beyond at-least-once hand-off belong to the sink.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Record of one attempted node execution, success or failure.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionEvent {
    pub flow_id: String,
    pub node_id: String,
    pub hoop: String,
    pub input: Value,
    pub output: Value,
    pub user_id: String,
    pub tenant_id: String,
    pub status: EventStatus,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Success,
    Fail,
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("transport error: {0}")]
    Transport(String),
}

/// Partition-keyed message delivery. Events for the same key are ordered at
/// the sink.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn publish(&self, key: &str, payload: &[u8]) -> Result<(), SinkError>;
}

/// Used when no broker is configured: publishing silently succeeds.
pub struct NoopSink;

#[async_trait]
impl MessageSink for NoopSink {
    async fn publish(&self, _key: &str, _payload: &[u8]) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Delivers payloads to the first healthy endpoint of the configured broker
/// list. The routing key travels in a header so the sink can partition.
pub struct HttpMessageSink {
    client: Arc<reqwest::Client>,
    endpoints: Vec<String>,
}

impl HttpMessageSink {
    pub fn new(client: Arc<reqwest::Client>, endpoints: Vec<String>) -> Self {
        Self { client, endpoints }
    }
}

#[async_trait]
impl MessageSink for HttpMessageSink {
    async fn publish(&self, key: &str, payload: &[u8]) -> Result<(), SinkError> {
        let mut last_error = String::from("no endpoints configured");

        for endpoint in &self.endpoints {
            let result = self
                .client
                .post(endpoint)
                .header("content-type", "application/json")
                .header("x-routing-key", key)
                .body(payload.to_vec())
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) => {
                    last_error = format!("{endpoint} returned {}", resp.status());
                }
                Err(e) => {
                    last_error = format!("{endpoint}: {e}");
                }
            }
        }

        Err(SinkError::Transport(last_error))
    }
}
