//! Flow loading: textual (JSON) and compiled (wire) forms.
//!
//! Both paths end in [`Flow::validate`], so a flow that loads is a flow the
//! engine can route through without dangling ids.

use std::path::Path;

use thiserror::Error;

use super::{Flow, wire};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("malformed flow: {0}")]
    Malformed(String),
    #[error("missing required field `{field}`")]
    MissingField { field: &'static str },
    #[error("duplicate node id `{id}`")]
    DuplicateId { id: String },
    #[error("node `{node_id}` field `{field}` references unknown node `{target}`")]
    DanglingReference {
        node_id: String,
        field: &'static str,
        target: String,
    },
    #[error("failed to read flow file `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Parse and validate a textual flow.
pub fn from_json_str(content: &str) -> Result<Flow, LoadError> {
    let flow: Flow =
        serde_json::from_str(content).map_err(|e| LoadError::Malformed(e.to_string()))?;
    flow.validate()?;
    Ok(flow)
}

pub fn from_json_file(path: &Path) -> Result<Flow, LoadError> {
    let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    from_json_str(&content)
}

/// Decode and validate a compiled flow.
pub fn from_wire_bytes(bytes: &[u8]) -> Result<Flow, LoadError> {
    let flow = wire::decode(bytes)?;
    flow.validate()?;
    Ok(flow)
}

pub fn from_wire_file(path: &Path) -> Result<Flow, LoadError> {
    let bytes = std::fs::read(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    from_wire_bytes(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_minimal_flow() {
        let flow = from_json_str(
            r#"{"flow_id": "f", "nodes": [{"id": "a", "hoop": "rag_search_faq"}]}"#,
        )
        .unwrap();
        assert_eq!(flow.flow_id, "f");
        assert_eq!(flow.nodes.len(), 1);
    }

    #[test]
    fn test_invalid_json_is_malformed() {
        assert!(matches!(
            from_json_str("not json at all"),
            Err(LoadError::Malformed(_))
        ));
    }

    #[test]
    fn test_validation_runs_on_parse() {
        let err = from_json_str(r#"{"flow_id": "", "nodes": [{"id": "a"}]}"#).unwrap_err();
        assert!(matches!(err, LoadError::MissingField { field: "flow_id" }));
    }

    #[test]
    fn test_idempotent_load() {
        let content = r#"{
            "flow_id": "faq",
            "trigger_id": "greeting",
            "context": {"tenant_id": "t1", "input": {"lang": "id"}},
            "nodes": [
                {"id": "fetch", "hoop": "rag_search_faq", "parameters": {"query": "{{input.query}}", "threshold": 0.7}},
                {"id": "reply", "hoop": "SendBotReply", "input_from": "fetch"}
            ]
        }"#;
        let a = from_json_str(content).unwrap();
        let b = from_json_str(content).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_file_is_io() {
        let err = from_json_file(Path::new("/nonexistent/flow.json")).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.json");
        std::fs::write(&path, r#"{"flow_id": "f", "nodes": [{"id": "a", "hoop": "x"}]}"#)
            .unwrap();
        let flow = from_json_file(&path).unwrap();
        assert_eq!(flow.flow_id, "f");
    }
}
