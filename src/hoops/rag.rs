//! Retrieval hoops: FAQ lookup against the search collaborator and free-form
//! answering against the LLM collaborator.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{Hoop, HoopError, HoopOutcome, require_str};
use crate::clients::{AnswerClient, SearchClient};
use crate::flow::Node;
use crate::flow::context::FlowContext;
use crate::render::JsonMap;

const DEFAULT_FAQ_THRESHOLD: f64 = 0.75;

pub struct RagSearchFaq {
    search: Arc<dyn SearchClient>,
}

impl RagSearchFaq {
    pub fn new(search: Arc<dyn SearchClient>) -> Self {
        Self { search }
    }
}

#[async_trait]
impl Hoop for RagSearchFaq {
    fn kind(&self) -> &'static str {
        "rag_search_faq"
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &["query", "tenant_id"]
    }

    async fn execute(
        &self,
        _ctx: &FlowContext,
        _node: &Node,
        input: &JsonMap,
    ) -> Result<HoopOutcome, HoopError> {
        let query = require_str(input, "query")?;
        let tenant_id = require_str(input, "tenant_id")?;
        let threshold = input
            .get("threshold")
            .and_then(Value::as_f64)
            .unwrap_or(DEFAULT_FAQ_THRESHOLD);

        let documents = self.search.fuzzy_search(tenant_id, query, threshold).await?;

        // Best match wins; a miss is a normal outcome downstream branches
        // inspect via the score.
        let (answer, score) = documents
            .iter()
            .max_by(|a, b| a.score.total_cmp(&b.score))
            .map(|doc| (doc.content.clone(), doc.score))
            .unwrap_or_default();

        let output = json!({"answer": answer, "score": score})
            .as_object()
            .cloned()
            .unwrap_or_default();
        Ok(HoopOutcome::output(output))
    }
}

pub struct RagLlmAnswer {
    answer: Arc<dyn AnswerClient>,
}

impl RagLlmAnswer {
    pub fn new(answer: Arc<dyn AnswerClient>) -> Self {
        Self { answer }
    }
}

#[async_trait]
impl Hoop for RagLlmAnswer {
    fn kind(&self) -> &'static str {
        "rag_llm_answer"
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &["query", "tenant_id"]
    }

    fn timeout(&self) -> Duration {
        // Generation is the slowest collaborator.
        Duration::from_secs(10)
    }

    async fn execute(
        &self,
        _ctx: &FlowContext,
        _node: &Node,
        input: &JsonMap,
    ) -> Result<HoopOutcome, HoopError> {
        let query = require_str(input, "query")?;
        let tenant_id = require_str(input, "tenant_id")?;

        let answer = self.answer.generate_answer(tenant_id, query).await?;

        let output = json!({"answer": answer})
            .as_object()
            .cloned()
            .unwrap_or_default();
        Ok(HoopOutcome::output(output))
    }
}
