//! Per-execution mutable state. One `FlowContext` per run, never shared.

use serde_json::Value;
use uuid::Uuid;

use super::FlowSeed;
use crate::render::JsonMap;

#[derive(Debug, Clone)]
pub struct FlowContext {
    pub user_id: String,
    pub tenant_id: String,
    pub session_id: String,
    pub input: JsonMap,
    pub outputs: JsonMap,
}

impl FlowContext {
    pub fn new(seed: &FlowSeed) -> Self {
        let session_id = if seed.session_id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            seed.session_id.clone()
        };

        Self {
            user_id: seed.user_id.clone(),
            tenant_id: seed.tenant_id.clone(),
            session_id,
            input: seed.input.clone(),
            outputs: JsonMap::new(),
        }
    }

    /// Merge caller-supplied input over the flow's declared input. Caller
    /// keys win.
    pub fn merge_input(&mut self, caller_input: JsonMap) {
        for (key, value) in caller_input {
            self.input.insert(key, value);
        }
    }

    /// Promote `input.input.{user_id,tenant_id}` into the identity fields.
    /// Only empty identity fields are filled; this runs once, at bootstrap.
    pub fn promote_identity(&mut self) {
        let Some(nested) = self.input.get("input").and_then(Value::as_object) else {
            return;
        };

        if self.user_id.is_empty() {
            if let Some(user_id) = nested.get("user_id").and_then(Value::as_str) {
                self.user_id = user_id.to_string();
            }
        }
        if self.tenant_id.is_empty() {
            if let Some(tenant_id) = nested.get("tenant_id").and_then(Value::as_str) {
                self.tenant_id = tenant_id.to_string();
            }
        }
    }

    /// The merged view the renderer resolves against, rebuilt per node.
    ///
    /// Layering, later keys winning: identity fields, the nested `input`
    /// mirror, the input entries spread into the root, then one entry per
    /// produced node output.
    pub fn snapshot(&self) -> JsonMap {
        let mut snapshot = JsonMap::new();
        snapshot.insert("user_id".into(), Value::String(self.user_id.clone()));
        snapshot.insert("tenant_id".into(), Value::String(self.tenant_id.clone()));
        snapshot.insert("session_id".into(), Value::String(self.session_id.clone()));
        snapshot.insert("input".into(), Value::Object(self.input.clone()));

        for (key, value) in &self.input {
            snapshot.insert(key.clone(), value.clone());
        }
        for (node_id, output) in &self.outputs {
            snapshot.insert(node_id.clone(), output.clone());
        }

        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seed() -> FlowSeed {
        FlowSeed {
            tenant_id: "t1".into(),
            ..FlowSeed::default()
        }
    }

    fn as_map(value: Value) -> JsonMap {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_session_id_generated_when_absent() {
        let ctx = FlowContext::new(&seed());
        assert!(!ctx.session_id.is_empty());

        let fixed = FlowSeed {
            session_id: "s-42".into(),
            ..FlowSeed::default()
        };
        assert_eq!(FlowContext::new(&fixed).session_id, "s-42");
    }

    #[test]
    fn test_caller_input_wins_over_seed() {
        let mut ctx = FlowContext::new(&FlowSeed {
            input: as_map(json!({"lang": "id", "kept": true})),
            ..FlowSeed::default()
        });
        ctx.merge_input(as_map(json!({"lang": "en"})));
        assert_eq!(ctx.input["lang"], json!("en"));
        assert_eq!(ctx.input["kept"], json!(true));
    }

    #[test]
    fn test_identity_promotion_fills_empty_fields_only() {
        let mut ctx = FlowContext::new(&seed());
        ctx.merge_input(as_map(json!({
            "input": {"user_id": "u9", "tenant_id": "t9"}
        })));
        ctx.promote_identity();

        assert_eq!(ctx.user_id, "u9");
        // tenant_id was already set by the flow; not overridden.
        assert_eq!(ctx.tenant_id, "t1");
    }

    #[test]
    fn test_identity_promotion_ignores_non_strings() {
        let mut ctx = FlowContext::new(&FlowSeed::default());
        ctx.merge_input(as_map(json!({"input": {"user_id": 42}})));
        ctx.promote_identity();
        assert_eq!(ctx.user_id, "");
    }

    #[test]
    fn test_snapshot_layering() {
        let mut ctx = FlowContext::new(&seed());
        ctx.merge_input(as_map(json!({"query": "jam buka"})));
        ctx.outputs
            .insert("fetch".into(), json!({"answer": "08:00-17:00"}));

        let snap = ctx.snapshot();
        assert_eq!(snap["tenant_id"], json!("t1"));
        assert_eq!(snap["query"], json!("jam buka"));
        assert_eq!(snap["input"], json!({"query": "jam buka"}));
        assert_eq!(snap["fetch"]["answer"], json!("08:00-17:00"));
    }

    #[test]
    fn test_snapshot_outputs_win_over_input() {
        let mut ctx = FlowContext::new(&FlowSeed::default());
        ctx.merge_input(as_map(json!({"fetch": "stale"})));
        ctx.outputs.insert("fetch".into(), json!({"answer": "fresh"}));

        let snap = ctx.snapshot();
        assert_eq!(snap["fetch"], json!({"answer": "fresh"}));
    }

    #[test]
    fn test_snapshot_nested_input_mirror() {
        let mut ctx = FlowContext::new(&FlowSeed::default());
        ctx.merge_input(as_map(json!({"user_id": "u1"})));

        let snap = ctx.snapshot();
        // Both the flattened and the nested addressing styles resolve.
        assert_eq!(snap["user_id"], json!("u1"));
        assert_eq!(snap["input"]["user_id"], json!("u1"));
    }
}
