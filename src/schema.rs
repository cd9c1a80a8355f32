//! JSON schema validation for model documents.
//!
//! The schema ships inside the binary and checks the shape the JSON writer
//! produces, so a hand-edited or externally produced model can be rejected
//! before it is previewed or edited.

use crate::errors::ConverterError;
use log::info;
use serde_json::Value;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

pub const MODEL_SCHEMA: &str = include_str!("../schemas/sfr_model.schema.json");

/// Validates an in-memory instance against a schema string.
pub fn validate_value(schema_str: &str, instance: &Value) -> Result<(), ConverterError> {
    let schema_json: Value = serde_json::from_str(schema_str).map_err(ConverterError::Serde)?;
    let compiled_schema = jsonschema::validator_for(&schema_json)
        .map_err(|e| ConverterError::Validation(e.to_string()))?;

    let errors: Vec<String> = compiled_schema
        .iter_errors(instance)
        .take(5)
        .map(|e| format!("{} at '{}'", e, e.instance_path))
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConverterError::Validation(format!(
            "Model failed schema validation: {}",
            errors.join("; ")
        )))
    }
}

/// Validates a model JSON file against the bundled schema.
pub fn validate_model_file(json_file_path: &Path) -> Result<(), ConverterError> {
    info!("Loading and parsing model for validation...");
    let file = File::open(json_file_path)
        .map_err(|e| ConverterError::Io(e, "Failed to open input for validation".to_string()))?;
    let reader = BufReader::new(file);
    let instance: Value = serde_json::from_reader(reader).map_err(ConverterError::Serde)?;

    info!("Validating model against schema...");
    validate_value(MODEL_SCHEMA, &instance)?;
    info!("Validation successful!");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_minimal_document_is_valid() {
        let doc = json!({
            "components": [{
                "name": "FCS_CKM.1",
                "elements": [{
                    "name": "FCS_CKM.1.1",
                    "title": [{"text": "The TSF shall"}, {"selections": "group-1"}],
                    "selectables": {},
                    "selectableGroups": {
                        "group-1": {"kind": "plain", "groups": []}
                    }
                }]
            }]
        });
        assert!(validate_value(MODEL_SCHEMA, &doc).is_ok());
    }

    #[test]
    fn test_segment_with_two_keys_is_rejected() {
        let doc = json!({
            "components": [{
                "name": "FCS_CKM.1",
                "elements": [{
                    "name": "FCS_CKM.1.1",
                    "title": [{"text": "a", "selections": "group-1"}],
                    "selectables": {},
                    "selectableGroups": {}
                }]
            }]
        });
        let err = validate_value(MODEL_SCHEMA, &doc).unwrap_err();
        assert!(matches!(err, ConverterError::Validation(_)));
    }

    #[test]
    fn test_unknown_group_kind_is_rejected() {
        let doc = json!({
            "components": [{
                "name": "X",
                "elements": [{
                    "name": "X.1",
                    "title": [],
                    "selectables": {},
                    "selectableGroups": {"group-1": {"kind": "nested"}}
                }]
            }]
        });
        assert!(validate_value(MODEL_SCHEMA, &doc).is_err());
    }

    #[test]
    fn test_missing_components_is_rejected() {
        assert!(validate_value(MODEL_SCHEMA, &json!({"generator": "x"})).is_err());
    }
}
