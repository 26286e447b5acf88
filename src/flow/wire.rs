//! Compiled flow format: one length-delimited, field-tagged record per file.
//!
//! The wire schema mirrors the textual schema one-for-one with stable field
//! tags. Freeform maps (node parameters, context input) have no native
//! protobuf shape, so they travel as canonical JSON strings; a
//! text -> binary -> text round trip preserves every declared field.

use std::path::Path;

use anyhow::{Context, Result};
use prost::Message;

use super::loader::LoadError;
use super::{Flow, FlowSeed, Node, loader};
use crate::render::JsonMap;

#[derive(Clone, PartialEq, Message)]
pub struct FlowWire {
    #[prost(string, tag = "1")]
    pub flow_id: String,
    #[prost(string, tag = "2")]
    pub trigger_id: String,
    #[prost(message, optional, tag = "3")]
    pub context: Option<ContextWire>,
    #[prost(message, repeated, tag = "4")]
    pub nodes: Vec<NodeWire>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ContextWire {
    #[prost(string, tag = "1")]
    pub user_id: String,
    #[prost(string, tag = "2")]
    pub tenant_id: String,
    #[prost(string, tag = "3")]
    pub session_id: String,
    #[prost(string, tag = "4")]
    pub input_json: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct NodeWire {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub hoop: String,
    #[prost(string, tag = "3")]
    pub parameters_json: String,
    #[prost(string, tag = "4")]
    pub input_from: String,
    #[prost(string, tag = "5")]
    pub true_path: String,
    #[prost(string, tag = "6")]
    pub false_path: String,
    #[prost(string, tag = "7")]
    pub jump_to: String,
}

pub fn encode(flow: &Flow) -> Result<Vec<u8>> {
    let wire = FlowWire {
        flow_id: flow.flow_id.clone(),
        trigger_id: flow.trigger_id.clone(),
        context: Some(ContextWire {
            user_id: flow.context.user_id.clone(),
            tenant_id: flow.context.tenant_id.clone(),
            session_id: flow.context.session_id.clone(),
            input_json: map_to_json(&flow.context.input)?,
        }),
        nodes: flow
            .nodes
            .iter()
            .map(|node| {
                Ok(NodeWire {
                    id: node.id.clone(),
                    hoop: node.hoop.clone(),
                    parameters_json: map_to_json(&node.parameters)?,
                    input_from: node.input_from.clone(),
                    true_path: node.true_path.clone(),
                    false_path: node.false_path.clone(),
                    jump_to: node.jump_to.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?,
    };

    Ok(wire.encode_length_delimited_to_vec())
}

pub fn decode(bytes: &[u8]) -> Result<Flow, LoadError> {
    let wire = FlowWire::decode_length_delimited(bytes)
        .map_err(|e| LoadError::Malformed(e.to_string()))?;

    let context = match wire.context {
        Some(ctx) => FlowSeed {
            user_id: ctx.user_id,
            tenant_id: ctx.tenant_id,
            session_id: ctx.session_id,
            input: map_from_json(&ctx.input_json)?,
        },
        None => FlowSeed::default(),
    };

    let nodes = wire
        .nodes
        .into_iter()
        .map(|node| {
            Ok(Node {
                id: node.id,
                hoop: node.hoop,
                parameters: map_from_json(&node.parameters_json)?,
                input_from: node.input_from,
                true_path: node.true_path,
                false_path: node.false_path,
                jump_to: node.jump_to,
            })
        })
        .collect::<Result<Vec<_>, LoadError>>()?;

    Ok(Flow {
        flow_id: wire.flow_id,
        trigger_id: wire.trigger_id,
        context,
        nodes,
    })
}

/// Compile a textual flow into its wire form. The textual flow is fully
/// validated before anything is written.
pub fn compile(json_path: &Path, output_path: &Path) -> Result<()> {
    let flow = loader::from_json_file(json_path)
        .with_context(|| format!("failed to load flow from {}", json_path.display()))?;

    let bytes = encode(&flow).context("failed to encode flow")?;

    std::fs::write(output_path, &bytes)
        .with_context(|| format!("failed to write compiled flow to {}", output_path.display()))?;

    tracing::info!(
        flow_id = %flow.flow_id,
        input = %json_path.display(),
        output = %output_path.display(),
        size = bytes.len(),
        "Compiled flow"
    );
    Ok(())
}

/// Load a compiled flow, compiling first when handed a `.json` path. The
/// compiled artifact lands next to the source.
pub fn load_or_compile(path: &Path) -> Result<Flow> {
    if path.extension().and_then(|e| e.to_str()) == Some("json") {
        let compiled = path.with_extension("pb");
        compile(path, &compiled)?;
        return Ok(loader::from_wire_file(&compiled)?);
    }
    Ok(loader::from_wire_file(path)?)
}

fn map_to_json(map: &JsonMap) -> Result<String> {
    if map.is_empty() {
        return Ok(String::new());
    }
    serde_json::to_string(map).context("failed to serialize parameter map")
}

fn map_from_json(content: &str) -> Result<JsonMap, LoadError> {
    if content.is_empty() {
        return Ok(JsonMap::new());
    }
    serde_json::from_str(content).map_err(|e| LoadError::Malformed(e.to_string()))
}
