//! Argument validation against a catalog entry's parameter schema.
//!
//! The schema is compiled with `jsonschema` on every check; issues are
//! reported with the offending location written as `args.<path>`.

use serde_json::Value;

const MAX_REPORTED_ISSUES: usize = 5;

/// Validate `args` and return a human-readable message on failure.
/// Missing (null) arguments are checked as an empty object.
pub fn validate_arguments(tool: &str, args: &Value, schema: &Value) -> Result<(), String> {
    let validator = jsonschema::validator_for(schema)
        .map_err(|e| format!("Invalid parameter schema for tool '{tool}': {e}"))?;

    let empty = Value::Object(Default::default());
    let args = if args.is_null() { &empty } else { args };
    if validator.is_valid(args) {
        return Ok(());
    }

    let mut issues: Vec<String> = validator
        .iter_errors(args)
        .map(|error| format!("{}: {error}", location(&error.instance_path.to_string())))
        .collect();
    let more = issues.len().saturating_sub(MAX_REPORTED_ISSUES);
    issues.truncate(MAX_REPORTED_ISSUES);
    let mut message = format!("Invalid arguments for tool '{tool}': {}", issues.join("; "));
    if more > 0 {
        message.push_str(&format!("; +{more} more issues"));
    }
    Err(message)
}

/// `/tags/0` becomes `args.tags.0`; the root is `args`.
fn location(pointer: &str) -> String {
    format!("args{}", pointer.replace('/', "."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "maxLength": 8},
                "limit": {"type": "integer", "minimum": 1},
                "mode": {"type": "string", "enum": ["fast", "deep"]},
                "tags": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["query"],
            "additionalProperties": false
        })
    }

    #[test]
    fn valid_arguments_pass() {
        let args = json!({"query": "rust", "limit": 3, "mode": "fast", "tags": ["a"]});
        assert!(validate_arguments("search", &args, &schema()).is_ok());
    }

    #[test]
    fn integral_floats_are_integers() {
        assert!(validate_arguments("search", &json!({"query": "rust", "limit": 3.0}), &schema()).is_ok());
        assert!(validate_arguments("search", &json!({"query": "rust", "limit": 2.5}), &schema()).is_err());
    }

    #[test]
    fn numeric_and_length_bounds_are_enforced() {
        let message = validate_arguments("search", &json!({"query": "rust", "limit": -5}), &schema()).unwrap_err();
        assert!(message.contains("args.limit"));

        let tight = json!({"type": "object", "properties": {"s": {"type": "string", "maxLength": 2}}});
        let message = validate_arguments("note", &json!({"s": "toolong"}), &tight).unwrap_err();
        assert!(message.starts_with("Invalid arguments for tool 'note'"));
        assert!(message.contains("args.s"));
    }

    #[test]
    fn combinators_and_patterns_apply() {
        let schema = json!({
            "type": "object",
            "properties": {
                "id": {"type": "string", "pattern": "^[a-z]+-[0-9]+$"},
                "target": {"oneOf": [{"type": "string"}, {"type": "integer"}]}
            }
        });
        assert!(validate_arguments("t", &json!({"id": "abc-12", "target": 4}), &schema).is_ok());
        assert!(validate_arguments("t", &json!({"id": "ABC"}), &schema).is_err());
        assert!(validate_arguments("t", &json!({"target": true}), &schema).is_err());
    }

    #[test]
    fn open_schema_accepts_anything_object_shaped() {
        let open = swarmloop_core::tool::open_parameters_schema();
        assert!(validate_arguments("x", &json!({"any": 1}), &open).is_ok());
        assert!(validate_arguments("x", &Value::Null, &open).is_ok());
    }

    #[test]
    fn reports_each_issue_with_its_location() {
        let args = json!({"limit": "3", "mode": "slow", "tags": [1], "extra": true});
        let message = validate_arguments("search", &args, &schema()).unwrap_err();
        assert!(message.starts_with("Invalid arguments for tool 'search'"));
        assert!(message.contains("query"));
        assert!(message.contains("extra"));
        assert!(message.contains("args.limit"));
        assert!(message.contains("args.mode"));
        assert!(message.contains("args.tags.0"));
    }

    #[test]
    fn long_issue_lists_are_capped() {
        let schema = json!({
            "type": "object",
            "required": ["a", "b", "c", "d", "e", "f", "g"]
        });
        let message = validate_arguments("wide", &json!({}), &schema).unwrap_err();
        assert!(message.ends_with("; +2 more issues"));
    }

    #[test]
    fn broken_schema_is_reported() {
        let message = validate_arguments("bad", &json!({}), &json!({"type": 12})).unwrap_err();
        assert!(message.starts_with("Invalid parameter schema for tool 'bad'"));
    }
}
