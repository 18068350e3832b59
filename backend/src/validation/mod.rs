//! JSON Schema validation for pipeline definition files.
//!
//! The CLI and HTTP API accept pipelines as JSON documents; before any
//! operation is constructed, the document is checked against the embedded
//! draft-7 schema so malformed definitions are rejected with readable
//! messages instead of serde noise.
//!
//! The schema is embedded at compile time from `schemas/pipeline.json`.

use serde_json::Value;

use crate::transform::ops::Operation;

/// Validate a JSON document against a JSON schema.
///
/// # Returns
/// * `Ok(())` when valid
/// * `Err(Vec<String>)` with one message per violation
pub fn validate(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    let validator = jsonschema::draft7::new(schema)
        .map_err(|e| vec![format!("Invalid schema: {}", e)])?;

    let errors: Vec<String> = validator
        .iter_errors(data)
        .map(|e| e.to_string())
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Quick true/false check.
pub fn is_valid(schema: &Value, data: &Value) -> bool {
    jsonschema::draft7::is_valid(schema, data)
}

fn pipeline_schema() -> Value {
    serde_json::from_str(include_str!("../../schemas/pipeline.json"))
        .expect("Invalid embedded schema")
}

/// Validate a pipeline definition document against the embedded schema.
pub fn validate_pipeline_definition(data: &Value) -> Result<(), Vec<String>> {
    validate(&pipeline_schema(), data)
}

/// Quick check against the pipeline definition schema.
pub fn is_valid_pipeline_definition(data: &Value) -> bool {
    is_valid(&pipeline_schema(), data)
}

/// Validate and deserialize a pipeline definition into operations.
///
/// Schema-valid documents can still fail against the typed model (e.g. a
/// constant fill without a value); those errors are reported the same way.
pub fn parse_pipeline_definition(data: &Value) -> Result<Vec<Operation>, Vec<String>> {
    validate_pipeline_definition(data)?;
    serde_json::from_value(data.clone()).map_err(|e| vec![e.to_string()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_definition() {
        let doc = json!([
            {"type": "fill_missing", "column": "score", "strategy": "mean"},
            {"type": "drop_rows_with_missing", "columns": ["id"]},
            {"type": "filter_rows", "column": "score", "predicate": "gte", "value": 10},
            {"type": "drop_columns", "columns": ["notes"]}
        ]);
        assert!(validate_pipeline_definition(&doc).is_ok());

        let ops = parse_pipeline_definition(&doc).unwrap();
        assert_eq!(ops.len(), 4);
    }

    #[test]
    fn test_unknown_operation_kind_rejected() {
        let doc = json!([{"type": "explode", "column": "score"}]);
        let errors = validate_pipeline_definition(&doc).unwrap_err();
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_bad_predicate_rejected() {
        let doc = json!([
            {"type": "filter_rows", "column": "score", "predicate": "matches", "value": "x"}
        ]);
        assert!(!is_valid_pipeline_definition(&doc));
    }

    #[test]
    fn test_drop_columns_requires_names() {
        let doc = json!([{"type": "drop_columns", "columns": []}]);
        assert!(validate_pipeline_definition(&doc).is_err());
    }

    #[test]
    fn test_not_an_array_rejected() {
        let doc = json!({"type": "drop_columns", "columns": ["a"]});
        assert!(validate_pipeline_definition(&doc).is_err());
    }

    #[test]
    fn test_empty_pipeline_is_valid() {
        let doc = json!([]);
        let ops = parse_pipeline_definition(&doc).unwrap();
        assert!(ops.is_empty());
    }
}
