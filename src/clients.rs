//! Collaborator clients: one trait per remote service the hoops call, plus
//! HTTP implementations. Handlers depend on the traits only, so tests inject
//! mocks and never touch the network.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::events::MessageSink;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level failure (connect, DNS, reset). Retriable.
    #[error("collaborator unreachable: {0}")]
    Unavailable(String),
    /// The peer answered and reported failure. Not retriable.
    #[error("collaborator error: {0}")]
    Remote(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScoredDocument {
    pub content: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewComplaint {
    pub user_id: String,
    pub message: String,
    pub product: String,
    pub source: String,
    pub emotion: String,
}

#[async_trait]
pub trait SearchClient: Send + Sync {
    async fn fuzzy_search(
        &self,
        tenant_id: &str,
        query: &str,
        threshold: f64,
    ) -> Result<Vec<ScoredDocument>, ClientError>;
}

#[async_trait]
pub trait AnswerClient: Send + Sync {
    async fn generate_answer(&self, tenant_id: &str, question: &str)
    -> Result<String, ClientError>;
}

#[async_trait]
pub trait ComplaintClient: Send + Sync {
    async fn create(&self, complaint: NewComplaint) -> Result<String, ClientError>;
}

#[async_trait]
pub trait DocumentClient: Send + Sync {
    async fn create(&self, tenant_id: &str, content: &Value) -> Result<Value, ClientError>;
    async fn update(
        &self,
        tenant_id: &str,
        document_id: &str,
        content: &Value,
    ) -> Result<Value, ClientError>;
    async fn delete(&self, tenant_id: &str, document_id: &str) -> Result<Value, ClientError>;
    async fn update_by_search(
        &self,
        tenant_id: &str,
        query: &str,
        content: &Value,
    ) -> Result<Value, ClientError>;
}

/// Everything the built-in hoops need from the outside world, constructed
/// once at startup and shared by reference across executions.
pub struct Collaborators {
    pub search: Arc<dyn SearchClient>,
    pub answer: Arc<dyn AnswerClient>,
    pub complaints: Arc<dyn ComplaintClient>,
    pub documents: Arc<dyn DocumentClient>,
    pub notifier: Arc<dyn MessageSink>,
}

// ---------------------------------------------------------------------------
// HTTP implementations
// ---------------------------------------------------------------------------

pub struct HttpSearchClient {
    client: Arc<Client>,
    base_url: String,
}

impl HttpSearchClient {
    pub fn new(client: Arc<Client>, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl SearchClient for HttpSearchClient {
    async fn fuzzy_search(
        &self,
        tenant_id: &str,
        query: &str,
        threshold: f64,
    ) -> Result<Vec<ScoredDocument>, ClientError> {
        #[derive(Deserialize)]
        struct SearchResponse {
            documents: Vec<ScoredDocument>,
        }

        let url = format!("{}/fuzzy-search", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "tenant_id": tenant_id,
                "query": query,
                "threshold": threshold,
            }))
            .send()
            .await
            .map_err(|e| ClientError::Unavailable(e.to_string()))?;

        let body: SearchResponse = check_status(resp)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Remote(format!("invalid search response: {e}")))?;
        Ok(body.documents)
    }
}

pub struct HttpAnswerClient {
    client: Arc<Client>,
    base_url: String,
}

impl HttpAnswerClient {
    pub fn new(client: Arc<Client>, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl AnswerClient for HttpAnswerClient {
    async fn generate_answer(
        &self,
        tenant_id: &str,
        question: &str,
    ) -> Result<String, ClientError> {
        #[derive(Deserialize)]
        struct AnswerResponse {
            answer: String,
        }

        let url = format!("{}/generate-answer", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "tenant_id": tenant_id,
                "question": question,
            }))
            .send()
            .await
            .map_err(|e| ClientError::Unavailable(e.to_string()))?;

        let body: AnswerResponse = check_status(resp)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Remote(format!("invalid answer response: {e}")))?;
        Ok(body.answer)
    }
}

pub struct HttpComplaintClient {
    client: Arc<Client>,
    base_url: String,
}

impl HttpComplaintClient {
    pub fn new(client: Arc<Client>, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl ComplaintClient for HttpComplaintClient {
    async fn create(&self, complaint: NewComplaint) -> Result<String, ClientError> {
        #[derive(Deserialize)]
        struct ComplaintResponse {
            complaint_id: String,
        }

        let url = format!("{}/complaints", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&complaint)
            .send()
            .await
            .map_err(|e| ClientError::Unavailable(e.to_string()))?;

        let body: ComplaintResponse = check_status(resp)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Remote(format!("invalid complaint response: {e}")))?;
        Ok(body.complaint_id)
    }
}

pub struct HttpDocumentClient {
    client: Arc<Client>,
    base_url: String,
}

impl HttpDocumentClient {
    pub fn new(client: Arc<Client>, base_url: String) -> Self {
        Self { client, base_url }
    }

    async fn post_json(&self, path: &str, body: Value) -> Result<Value, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ClientError::Unavailable(e.to_string()))?;

        check_status(resp)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Remote(format!("invalid document response: {e}")))
    }
}

#[async_trait]
impl DocumentClient for HttpDocumentClient {
    async fn create(&self, tenant_id: &str, content: &Value) -> Result<Value, ClientError> {
        self.post_json(
            "/documents",
            serde_json::json!({"tenant_id": tenant_id, "content": content}),
        )
        .await
    }

    async fn update(
        &self,
        tenant_id: &str,
        document_id: &str,
        content: &Value,
    ) -> Result<Value, ClientError> {
        self.post_json(
            "/documents/update",
            serde_json::json!({
                "tenant_id": tenant_id,
                "document_id": document_id,
                "content": content,
            }),
        )
        .await
    }

    async fn delete(&self, tenant_id: &str, document_id: &str) -> Result<Value, ClientError> {
        self.post_json(
            "/documents/delete",
            serde_json::json!({"tenant_id": tenant_id, "document_id": document_id}),
        )
        .await
    }

    async fn update_by_search(
        &self,
        tenant_id: &str,
        query: &str,
        content: &Value,
    ) -> Result<Value, ClientError> {
        self.post_json(
            "/documents/update-by-search",
            serde_json::json!({
                "tenant_id": tenant_id,
                "query": query,
                "content": content,
            }),
        )
        .await
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ClientError::Remote(format!(
        "collaborator returned {status}: {body}"
    )))
}
