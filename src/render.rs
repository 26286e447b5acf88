//! Template rendering for node parameters.
//!
//! Placeholders look like `{{fetch.answer}}`: one or more `[A-Za-z0-9_]+`
//! segments separated by dots, with optional whitespace inside the braces.
//! Rendering is shallow: only top-level string values of a parameter map are
//! scanned, so nested maps used as structured payloads pass through untouched.
//! A placeholder whose path does not resolve is left in place byte-for-byte,
//! which is what makes optional variables work.

use serde_json::{Map, Value};

pub type JsonMap = Map<String, Value>;

/// Render every top-level string value of `params` against `ctx`.
pub fn render_params(params: &JsonMap, ctx: &JsonMap) -> JsonMap {
    params
        .iter()
        .map(|(key, value)| {
            let rendered = match value {
                Value::String(s) => Value::String(render_str(s, ctx)),
                other => other.clone(),
            };
            (key.clone(), rendered)
        })
        .collect()
}

/// Substitute every resolvable `{{path}}` in `template`.
pub fn render_str(template: &str, ctx: &JsonMap) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            // Unterminated braces: keep the tail as-is.
            out.push_str(&rest[open..]);
            return out;
        };

        let raw = &after[..close];
        let path = raw.trim();
        match resolve_path(ctx, path) {
            Some(value) => out.push_str(&stringify(value)),
            None => out.push_str(&rest[open..open + 2 + close + 2]),
        }
        rest = &after[close + 2..];
    }

    out.push_str(rest);
    out
}

/// Walk `ctx` along a dotted path. Every intermediate value must be an
/// object containing the next segment.
pub fn resolve_path<'a>(ctx: &'a JsonMap, path: &str) -> Option<&'a Value> {
    if !is_valid_path(path) {
        return None;
    }

    let mut segments = path.split('.');
    let mut current = ctx.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn is_valid_path(path: &str) -> bool {
    !path.is_empty()
        && path.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

/// Textual form of a resolved value. Primitives print naturally; compound
/// values fall back to their canonical JSON encoding.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        compound => compound.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> JsonMap {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_basic_substitution() {
        let ctx = obj(json!({"name": "world"}));
        assert_eq!(render_str("Hello {{name}}!", &ctx), "Hello world!");
    }

    #[test]
    fn test_dotted_path() {
        let ctx = obj(json!({"fetch": {"answer": "08:00-17:00"}}));
        assert_eq!(render_str("{{fetch.answer}}", &ctx), "08:00-17:00");
    }

    #[test]
    fn test_deep_path() {
        let ctx = obj(json!({"a": {"b": {"c": 42}}}));
        assert_eq!(render_str("val={{a.b.c}}", &ctx), "val=42");
    }

    #[test]
    fn test_multiple_placeholders() {
        let ctx = obj(json!({"tenant_id": "t1", "input": {"query": "jam buka"}}));
        assert_eq!(
            render_str("{{tenant_id}}: {{input.query}}", &ctx),
            "t1: jam buka"
        );
    }

    #[test]
    fn test_repeated_placeholder() {
        let ctx = obj(json!({"repo": "my/repo"}));
        assert_eq!(
            render_str("{{repo}} - reviewing {{repo}}", &ctx),
            "my/repo - reviewing my/repo"
        );
    }

    #[test]
    fn test_unmatched_placeholder_left_intact() {
        let ctx = obj(json!({"known": "yes"}));
        assert_eq!(
            render_str("Known: {{known}}, Unknown: {{unknown}}", &ctx),
            "Known: yes, Unknown: {{unknown}}"
        );
    }

    #[test]
    fn test_partial_path_left_intact() {
        let ctx = obj(json!({"fetch": {"answer": "x"}}));
        assert_eq!(render_str("{{fetch.score}}", &ctx), "{{fetch.score}}");
    }

    #[test]
    fn test_path_through_non_object_left_intact() {
        let ctx = obj(json!({"fetch": "plain string"}));
        assert_eq!(render_str("{{fetch.answer}}", &ctx), "{{fetch.answer}}");
    }

    #[test]
    fn test_whitespace_inside_braces() {
        let ctx = obj(json!({"name": "world"}));
        assert_eq!(render_str("{{ name }}", &ctx), "world");
    }

    #[test]
    fn test_invalid_segment_chars_left_intact() {
        let ctx = obj(json!({"a b": "x"}));
        assert_eq!(render_str("{{a b}}", &ctx), "{{a b}}");
        assert_eq!(render_str("{{}}", &ctx), "{{}}");
        assert_eq!(render_str("{{a..b}}", &ctx), "{{a..b}}");
    }

    #[test]
    fn test_unterminated_braces_kept() {
        let ctx = obj(json!({"name": "world"}));
        assert_eq!(render_str("Hello {{name", &ctx), "Hello {{name");
    }

    #[test]
    fn test_number_bool_null_stringified() {
        let ctx = obj(json!({"n": 0.82, "i": 7, "b": true, "z": null}));
        assert_eq!(render_str("{{n}}/{{i}}/{{b}}/{{z}}", &ctx), "0.82/7/true/null");
    }

    #[test]
    fn test_compound_value_stringified_as_json() {
        let ctx = obj(json!({"doc": {"a": 1}}));
        assert_eq!(render_str("{{doc}}", &ctx), r#"{"a":1}"#);
    }

    #[test]
    fn test_empty_value() {
        let ctx = obj(json!({"var": ""}));
        assert_eq!(render_str("Before{{var}}After", &ctx), "BeforeAfter");
    }

    #[test]
    fn test_no_placeholders_passthrough() {
        let ctx = obj(json!({"name": "world"}));
        assert_eq!(render_str("No variables here.", &ctx), "No variables here.");
    }

    #[test]
    fn test_params_only_top_level_strings_rendered() {
        let ctx = obj(json!({"user_id": "u1"}));
        let params = obj(json!({
            "greeting": "hi {{user_id}}",
            "payload": {"inner": "{{user_id}}"},
            "count": 3,
        }));
        let rendered = render_params(&params, &ctx);
        assert_eq!(rendered["greeting"], json!("hi u1"));
        // Nested maps are structured payloads, not templates.
        assert_eq!(rendered["payload"], json!({"inner": "{{user_id}}"}));
        assert_eq!(rendered["count"], json!(3));
    }
}
