//! Complaint logging against the complaint collaborator.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use super::{Hoop, HoopError, HoopOutcome, optional_str, require_str};
use crate::clients::{ComplaintClient, NewComplaint};
use crate::flow::Node;
use crate::flow::context::FlowContext;
use crate::render::JsonMap;

pub struct LogComplaint {
    complaints: Arc<dyn ComplaintClient>,
}

impl LogComplaint {
    pub fn new(complaints: Arc<dyn ComplaintClient>) -> Self {
        Self { complaints }
    }
}

#[async_trait]
impl Hoop for LogComplaint {
    fn kind(&self) -> &'static str {
        "log_complaint"
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &["user_id", "message"]
    }

    async fn execute(
        &self,
        _ctx: &FlowContext,
        _node: &Node,
        input: &JsonMap,
    ) -> Result<HoopOutcome, HoopError> {
        let complaint = NewComplaint {
            user_id: require_str(input, "user_id")?.to_string(),
            message: require_str(input, "message")?.to_string(),
            product: optional_str(input, "product").to_string(),
            source: optional_str(input, "source").to_string(),
            emotion: optional_str(input, "emotion").to_string(),
        };

        let complaint_id = self.complaints.create(complaint).await?;

        let output = json!({"complaint_id": complaint_id})
            .as_object()
            .cloned()
            .unwrap_or_default();
        Ok(HoopOutcome::output(output))
    }
}
