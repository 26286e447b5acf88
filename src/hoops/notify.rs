//! Notification hoops: deliver payloads to the message sink, keyed by user
//! so the sink can keep per-user ordering.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{Hoop, HoopError, HoopOutcome};
use crate::events::MessageSink;
use crate::flow::Node;
use crate::flow::context::FlowContext;
use crate::render::JsonMap;

/// Serializes its whole rendered input as the message payload.
pub struct SendNotification {
    notifier: Arc<dyn MessageSink>,
}

impl SendNotification {
    pub fn new(notifier: Arc<dyn MessageSink>) -> Self {
        Self { notifier }
    }
}

#[async_trait]
impl Hoop for SendNotification {
    fn kind(&self) -> &'static str {
        "send_notification"
    }

    async fn execute(
        &self,
        ctx: &FlowContext,
        _node: &Node,
        input: &JsonMap,
    ) -> Result<HoopOutcome, HoopError> {
        let payload = serde_json::to_vec(&Value::Object(input.clone()))
            .map_err(|e| HoopError::InvalidInput(format!("unserializable payload: {e}")))?;

        self.notifier
            .publish(&ctx.user_id, &payload)
            .await
            .map_err(|e| HoopError::RemoteUnavailable(e.to_string()))?;

        let output = json!({"status": "sent"})
            .as_object()
            .cloned()
            .unwrap_or_default();
        Ok(HoopOutcome::output(output))
    }
}

/// Sends a chat reply back to the user. The reply text comes from `message`,
/// falling back to `answer` (the shape the retrieval hoops produce), so a
/// reply node can take its input straight from an upstream answer node.
pub struct SendBotReply {
    notifier: Arc<dyn MessageSink>,
}

impl SendBotReply {
    pub fn new(notifier: Arc<dyn MessageSink>) -> Self {
        Self { notifier }
    }
}

#[async_trait]
impl Hoop for SendBotReply {
    fn kind(&self) -> &'static str {
        "SendBotReply"
    }

    async fn execute(
        &self,
        ctx: &FlowContext,
        _node: &Node,
        input: &JsonMap,
    ) -> Result<HoopOutcome, HoopError> {
        let text = input
            .get("message")
            .or_else(|| input.get("answer"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                HoopError::InvalidInput("reply needs a `message` or `answer` string".to_string())
            })?;

        let payload = serde_json::to_vec(&json!({
            "user_id": ctx.user_id,
            "session_id": ctx.session_id,
            "message": text,
        }))
        .map_err(|e| HoopError::InvalidInput(format!("unserializable payload: {e}")))?;

        self.notifier
            .publish(&ctx.user_id, &payload)
            .await
            .map_err(|e| HoopError::RemoteUnavailable(e.to_string()))?;

        let output = json!({"message": text, "status": "sent"})
            .as_object()
            .cloned()
            .unwrap_or_default();
        Ok(HoopOutcome::output(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{NoopSink, SinkError};
    use crate::flow::FlowSeed;
    use std::sync::Mutex;

    struct RecordingSink {
        sent: Mutex<Vec<(String, Vec<u8>)>>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MessageSink for RecordingSink {
        async fn publish(&self, key: &str, payload: &[u8]) -> Result<(), SinkError> {
            self.sent
                .lock()
                .unwrap()
                .push((key.to_string(), payload.to_vec()));
            Ok(())
        }
    }

    fn user_ctx() -> FlowContext {
        FlowContext::new(&FlowSeed {
            user_id: "u1".into(),
            ..FlowSeed::default()
        })
    }

    fn input(value: Value) -> JsonMap {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn test_reply_uses_message_field() {
        let sink = Arc::new(RecordingSink::new());
        let hoop = SendBotReply::new(sink.clone());
        let outcome = hoop
            .execute(
                &user_ctx(),
                &Node::default(),
                &input(json!({"message": "08:00-17:00"})),
            )
            .await
            .unwrap();

        let output = outcome.output.unwrap();
        assert_eq!(output["message"], json!("08:00-17:00"));
        assert_eq!(output["status"], json!("sent"));

        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "u1");
        let payload: Value = serde_json::from_slice(&sent[0].1).unwrap();
        assert_eq!(payload["message"], json!("08:00-17:00"));
    }

    #[tokio::test]
    async fn test_reply_falls_back_to_answer_field() {
        let hoop = SendBotReply::new(Arc::new(NoopSink));
        let outcome = hoop
            .execute(
                &user_ctx(),
                &Node::default(),
                &input(json!({"answer": "08:00-17:00", "score": 0.9})),
            )
            .await
            .unwrap();
        assert_eq!(outcome.output.unwrap()["message"], json!("08:00-17:00"));
    }

    #[tokio::test]
    async fn test_reply_without_text_is_invalid_input() {
        let hoop = SendBotReply::new(Arc::new(NoopSink));
        let err = hoop
            .execute(&user_ctx(), &Node::default(), &input(json!({"score": 1})))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[tokio::test]
    async fn test_notification_publishes_whole_input() {
        let sink = Arc::new(RecordingSink::new());
        let hoop = SendNotification::new(sink.clone());
        let outcome = hoop
            .execute(
                &user_ctx(),
                &Node::default(),
                &input(json!({"channel": "wa", "body": {"text": "halo"}})),
            )
            .await
            .unwrap();
        assert_eq!(outcome.output.unwrap()["status"], json!("sent"));

        let sent = sink.sent.lock().unwrap();
        let payload: Value = serde_json::from_slice(&sent[0].1).unwrap();
        assert_eq!(payload["body"]["text"], json!("halo"));
    }
}
