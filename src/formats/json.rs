//! Model JSON format handler

use crate::errors::ConverterError;
use crate::models_sfr::{Component, SfrDocument};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

pub const GENERATOR: &str = concat!("sfr-converter ", env!("CARGO_PKG_VERSION"));

/// On-disk wrapper around the parsed components.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelEnvelope {
    #[serde(default)]
    pub generator: String,
    #[serde(default)]
    pub generated: String,
    pub components: Vec<Component>,
}

impl ModelEnvelope {
    pub fn new(document: SfrDocument) -> Self {
        Self {
            generator: GENERATOR.to_string(),
            generated: chrono::Utc::now().to_rfc3339(),
            components: document.components,
        }
    }

    pub fn into_document(self) -> SfrDocument {
        SfrDocument {
            components: self.components,
        }
    }
}

/// Parse a model document from JSON
pub fn read_model<R: Read>(reader: R) -> Result<SfrDocument, ConverterError> {
    let envelope: ModelEnvelope = serde_json::from_reader(reader)
        .map_err(|e| ConverterError::ParseError(format!("Failed to parse model JSON: {}", e)))?;
    Ok(envelope.into_document())
}

/// Write a model document as pretty JSON
pub fn write_model<W: Write>(writer: W, document: SfrDocument) -> Result<(), ConverterError> {
    serde_json::to_writer_pretty(writer, &ModelEnvelope::new(document)).map_err(|e| {
        ConverterError::SerializationError(format!("Failed to write model JSON: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models_sfr::ElementModel;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn document() -> SfrDocument {
        SfrDocument {
            components: vec![Component {
                name: "FCS_CKM.1".to_string(),
                elements: vec![ElementModel {
                    name: "FCS_CKM.1.1".to_string(),
                    ..Default::default()
                }],
                ..Default::default()
            }],
        }
    }

    #[test]
    fn test_envelope_metadata() {
        let mut out = Vec::new();
        write_model(&mut out, document()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert!(value["generator"].as_str().unwrap().starts_with("sfr-converter "));
        assert!(chrono::DateTime::parse_from_rfc3339(value["generated"].as_str().unwrap()).is_ok());
        assert_eq!(value["components"][0]["elements"][0]["name"], "FCS_CKM.1.1");
    }

    #[test]
    fn test_read_accepts_bare_components() {
        let json = r#"{"components": []}"#;
        let doc = read_model(Cursor::new(json)).unwrap();
        assert!(doc.components.is_empty());
    }

    #[test]
    fn test_read_back_written_model() {
        let mut out = Vec::new();
        write_model(&mut out, document()).unwrap();
        let doc = read_model(Cursor::new(out)).unwrap();
        assert_eq!(doc, document());
    }

    #[test]
    fn test_read_rejects_garbage() {
        let result = read_model(Cursor::new("not json"));
        assert!(matches!(result, Err(ConverterError::ParseError(_))));
    }
}
