//! Tenant-scoped document CRUD hoops, all backed by the document
//! collaborator. Each returns the collaborator's result under `result`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{Hoop, HoopError, HoopOutcome, require_str};
use crate::clients::DocumentClient;
use crate::flow::Node;
use crate::flow::context::FlowContext;
use crate::render::JsonMap;

fn result_output(result: Value) -> HoopOutcome {
    let output = json!({"result": result})
        .as_object()
        .cloned()
        .unwrap_or_default();
    HoopOutcome::output(output)
}

fn content_of(input: &JsonMap) -> Value {
    input.get("content").cloned().unwrap_or(Value::Null)
}

pub struct CreateDocument {
    documents: Arc<dyn DocumentClient>,
}

impl CreateDocument {
    pub fn new(documents: Arc<dyn DocumentClient>) -> Self {
        Self { documents }
    }
}

#[async_trait]
impl Hoop for CreateDocument {
    fn kind(&self) -> &'static str {
        "create_document"
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &["tenant_id", "content"]
    }

    async fn execute(
        &self,
        _ctx: &FlowContext,
        _node: &Node,
        input: &JsonMap,
    ) -> Result<HoopOutcome, HoopError> {
        let tenant_id = require_str(input, "tenant_id")?;
        let result = self.documents.create(tenant_id, &content_of(input)).await?;
        Ok(result_output(result))
    }
}

pub struct UpdateDocument {
    documents: Arc<dyn DocumentClient>,
}

impl UpdateDocument {
    pub fn new(documents: Arc<dyn DocumentClient>) -> Self {
        Self { documents }
    }
}

#[async_trait]
impl Hoop for UpdateDocument {
    fn kind(&self) -> &'static str {
        "update_document"
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &["tenant_id", "document_id", "content"]
    }

    async fn execute(
        &self,
        _ctx: &FlowContext,
        _node: &Node,
        input: &JsonMap,
    ) -> Result<HoopOutcome, HoopError> {
        let tenant_id = require_str(input, "tenant_id")?;
        let document_id = require_str(input, "document_id")?;
        let result = self
            .documents
            .update(tenant_id, document_id, &content_of(input))
            .await?;
        Ok(result_output(result))
    }
}

pub struct DeleteDocument {
    documents: Arc<dyn DocumentClient>,
}

impl DeleteDocument {
    pub fn new(documents: Arc<dyn DocumentClient>) -> Self {
        Self { documents }
    }
}

#[async_trait]
impl Hoop for DeleteDocument {
    fn kind(&self) -> &'static str {
        "delete_document"
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &["tenant_id", "document_id"]
    }

    async fn execute(
        &self,
        _ctx: &FlowContext,
        _node: &Node,
        input: &JsonMap,
    ) -> Result<HoopOutcome, HoopError> {
        let tenant_id = require_str(input, "tenant_id")?;
        let document_id = require_str(input, "document_id")?;
        let result = self.documents.delete(tenant_id, document_id).await?;
        Ok(result_output(result))
    }
}

pub struct UpdateDocumentBySearch {
    documents: Arc<dyn DocumentClient>,
}

impl UpdateDocumentBySearch {
    pub fn new(documents: Arc<dyn DocumentClient>) -> Self {
        Self { documents }
    }
}

#[async_trait]
impl Hoop for UpdateDocumentBySearch {
    fn kind(&self) -> &'static str {
        "update_document_by_search"
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &["tenant_id", "query", "content"]
    }

    async fn execute(
        &self,
        _ctx: &FlowContext,
        _node: &Node,
        input: &JsonMap,
    ) -> Result<HoopOutcome, HoopError> {
        let tenant_id = require_str(input, "tenant_id")?;
        let query = require_str(input, "query")?;
        let result = self
            .documents
            .update_by_search(tenant_id, query, &content_of(input))
            .await?;
        Ok(result_output(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::ClientError;
    use crate::flow::FlowSeed;

    struct EchoDocuments;

    #[async_trait]
    impl DocumentClient for EchoDocuments {
        async fn create(&self, tenant_id: &str, content: &Value) -> Result<Value, ClientError> {
            Ok(json!({"op": "create", "tenant_id": tenant_id, "content": content}))
        }

        async fn update(
            &self,
            tenant_id: &str,
            document_id: &str,
            _content: &Value,
        ) -> Result<Value, ClientError> {
            Ok(json!({"op": "update", "tenant_id": tenant_id, "document_id": document_id}))
        }

        async fn delete(&self, tenant_id: &str, document_id: &str) -> Result<Value, ClientError> {
            Ok(json!({"op": "delete", "tenant_id": tenant_id, "document_id": document_id}))
        }

        async fn update_by_search(
            &self,
            tenant_id: &str,
            query: &str,
            _content: &Value,
        ) -> Result<Value, ClientError> {
            Ok(json!({"op": "update_by_search", "tenant_id": tenant_id, "query": query}))
        }
    }

    fn input(value: Value) -> JsonMap {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn test_create_document() {
        let hoop = CreateDocument::new(Arc::new(EchoDocuments));
        let ctx = FlowContext::new(&FlowSeed::default());
        let outcome = hoop
            .execute(
                &ctx,
                &Node::default(),
                &input(json!({"tenant_id": "t1", "content": {"title": "faq"}})),
            )
            .await
            .unwrap();

        let result = &outcome.output.unwrap()["result"];
        assert_eq!(result["op"], json!("create"));
        assert_eq!(result["content"]["title"], json!("faq"));
    }

    #[tokio::test]
    async fn test_delete_requires_document_id() {
        let hoop = DeleteDocument::new(Arc::new(EchoDocuments));
        let ctx = FlowContext::new(&FlowSeed::default());
        let err = hoop
            .execute(&ctx, &Node::default(), &input(json!({"tenant_id": "t1"})))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[tokio::test]
    async fn test_update_by_search() {
        let hoop = UpdateDocumentBySearch::new(Arc::new(EchoDocuments));
        let ctx = FlowContext::new(&FlowSeed::default());
        let outcome = hoop
            .execute(
                &ctx,
                &Node::default(),
                &input(json!({"tenant_id": "t1", "query": "jam buka", "content": "x"})),
            )
            .await
            .unwrap();
        assert_eq!(
            outcome.output.unwrap()["result"]["query"],
            json!("jam buka")
        );
    }
}
