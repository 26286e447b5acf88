//! IfNode: routes to `true_path` or `false_path` by comparing a field of the
//! upstream node's output against a rendered value.
//!
//! Comparison is deliberately strict: both operands must already be numbers
//! for numeric comparison (strings are never parsed), and only `==`/`!=`
//! apply to strings. Everything else is an input contract violation.

use async_trait::async_trait;
use serde_json::Value;

use super::{Classification, Hoop, HoopError, HoopOutcome, require_str};
use crate::flow::Node;
use crate::flow::context::FlowContext;
use crate::render::JsonMap;

pub struct IfNode;

#[async_trait]
impl Hoop for IfNode {
    fn kind(&self) -> &'static str {
        "IfNode"
    }

    fn classification(&self) -> Classification {
        Classification::Branch
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &["field", "operator", "value"]
    }

    async fn execute(
        &self,
        ctx: &FlowContext,
        node: &Node,
        input: &JsonMap,
    ) -> Result<HoopOutcome, HoopError> {
        if node.input_from.is_empty() {
            return Err(HoopError::InvalidInput(
                "IfNode requires input_from".to_string(),
            ));
        }

        let field = require_str(input, "field")?;
        let operator = require_str(input, "operator")?;
        let expected = input
            .get("value")
            .ok_or_else(|| HoopError::InvalidInput("missing required field `value`".to_string()))?;

        let actual = ctx
            .outputs
            .get(&node.input_from)
            .and_then(Value::as_object)
            .and_then(|output| output.get(field))
            .ok_or_else(|| {
                HoopError::InvalidInput(format!(
                    "field `{field}` not present in output of `{}`",
                    node.input_from
                ))
            })?;

        let taken = compare(actual, operator, expected)?;
        let next = if taken {
            node.true_path.clone()
        } else {
            node.false_path.clone()
        };

        tracing::debug!(
            node = %node.id,
            field = %field,
            operator = %operator,
            taken,
            "Branch evaluated"
        );
        Ok(HoopOutcome::route(next))
    }
}

fn compare(lhs: &Value, operator: &str, rhs: &Value) -> Result<bool, HoopError> {
    if let (Some(a), Some(b)) = (lhs.as_f64(), rhs.as_f64()) {
        return Ok(match operator {
            "==" => a == b,
            "!=" => a != b,
            ">" => a > b,
            "<" => a < b,
            ">=" => a >= b,
            "<=" => a <= b,
            other => {
                return Err(HoopError::InvalidInput(format!(
                    "unknown operator `{other}`"
                )));
            }
        });
    }

    match operator {
        "==" | "!=" => {
            let (Some(a), Some(b)) = (lhs.as_str(), rhs.as_str()) else {
                return Err(HoopError::InvalidInput(
                    "equality operands must both be numbers or both be strings".to_string(),
                ));
            };
            Ok(if operator == "==" { a == b } else { a != b })
        }
        ">" | "<" | ">=" | "<=" => Err(HoopError::InvalidInput(
            "ordering comparison requires numeric operands".to_string(),
        )),
        other => Err(HoopError::InvalidInput(format!(
            "unknown operator `{other}`"
        ))),
    }
}
