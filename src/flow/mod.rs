pub mod context;
pub mod loader;
pub mod wire;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::render::JsonMap;
use loader::LoadError;

/// A named execution plan: an ordered graph of hoops. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    #[serde(default)]
    pub flow_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub trigger_id: String,
    #[serde(default, skip_serializing_if = "FlowSeed::is_empty")]
    pub context: FlowSeed,
    #[serde(default)]
    pub nodes: Vec<Node>,
}

/// Identity fields and starting input declared on the flow itself. Caller
/// input is merged on top at execution time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowSeed {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tenant_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub session_id: String,
    #[serde(default, skip_serializing_if = "JsonMap::is_empty")]
    pub input: JsonMap,
}

impl FlowSeed {
    pub fn is_empty(&self) -> bool {
        self.user_id.is_empty()
            && self.tenant_id.is_empty()
            && self.session_id.is_empty()
            && self.input.is_empty()
    }
}

/// A single step. An empty `hoop` marks a pass-through node the engine skips
/// without dispatching or emitting events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hoop: String,
    #[serde(default, skip_serializing_if = "JsonMap::is_empty")]
    pub parameters: JsonMap,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub input_from: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub true_path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub false_path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub jump_to: String,
}

impl Flow {
    /// Structural validation run after any parse, textual or binary. No
    /// partially valid flow ever leaves the loader.
    pub fn validate(&self) -> Result<(), LoadError> {
        if self.flow_id.is_empty() {
            return Err(LoadError::MissingField { field: "flow_id" });
        }
        if self.nodes.is_empty() {
            return Err(LoadError::MissingField { field: "nodes" });
        }

        let mut ids = HashSet::new();
        for node in &self.nodes {
            if node.id.is_empty() {
                return Err(LoadError::MissingField { field: "node.id" });
            }
            if !ids.insert(node.id.as_str()) {
                return Err(LoadError::DuplicateId {
                    id: node.id.clone(),
                });
            }
        }

        for node in &self.nodes {
            for (field, target) in [
                ("input_from", &node.input_from),
                ("true_path", &node.true_path),
                ("false_path", &node.false_path),
                ("jump_to", &node.jump_to),
            ] {
                if !target.is_empty() && !ids.contains(target.as_str()) {
                    return Err(LoadError::DanglingReference {
                        node_id: node.id.clone(),
                        field,
                        target: target.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn flow_from(value: serde_json::Value) -> Flow {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_valid_flow() {
        let flow = flow_from(json!({
            "flow_id": "faq",
            "nodes": [
                {"id": "fetch", "hoop": "rag_search_faq", "parameters": {"query": "{{input.query}}"}},
                {"id": "reply", "hoop": "SendBotReply", "input_from": "fetch"},
            ],
        }));
        assert!(flow.validate().is_ok());
    }

    #[test]
    fn test_empty_flow_id_rejected() {
        let flow = flow_from(json!({"nodes": [{"id": "a", "hoop": "x"}]}));
        assert!(matches!(
            flow.validate(),
            Err(LoadError::MissingField { field: "flow_id" })
        ));
    }

    #[test]
    fn test_no_nodes_rejected() {
        let flow = flow_from(json!({"flow_id": "f"}));
        assert!(matches!(
            flow.validate(),
            Err(LoadError::MissingField { field: "nodes" })
        ));
    }

    #[test]
    fn test_duplicate_node_id_rejected() {
        let flow = flow_from(json!({
            "flow_id": "f",
            "nodes": [{"id": "a"}, {"id": "a"}],
        }));
        assert!(matches!(flow.validate(), Err(LoadError::DuplicateId { id }) if id == "a"));
    }

    #[test]
    fn test_dangling_reference_rejected() {
        let flow = flow_from(json!({
            "flow_id": "f",
            "nodes": [{"id": "a", "hoop": "IfNode", "true_path": "missing"}],
        }));
        match flow.validate() {
            Err(LoadError::DanglingReference {
                node_id,
                field,
                target,
            }) => {
                assert_eq!(node_id, "a");
                assert_eq!(field, "true_path");
                assert_eq!(target, "missing");
            }
            other => panic!("expected dangling reference, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_references_allowed() {
        let flow = flow_from(json!({
            "flow_id": "f",
            "nodes": [{"id": "a", "hoop": "x", "jump_to": ""}],
        }));
        assert!(flow.validate().is_ok());
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let flow = flow_from(json!({
            "flow_id": "f",
            "made_up": true,
            "nodes": [{"id": "a", "hoop": "x", "color": "red"}],
        }));
        assert_eq!(flow.nodes[0].id, "a");
        assert!(flow.validate().is_ok());
    }
}
