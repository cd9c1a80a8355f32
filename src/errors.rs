//! Defines the custom error types for the application.
//!
//! Parsing is permissive about document shape, so most variants here are
//! raised by I/O, malformed XML, serialization, or model edits that name an
//! element or id that does not exist.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConverterError {
    #[error("I/O Error: {1} - {0}")]
    Io(#[source] std::io::Error, String),

    #[error("JSON Deserialization Error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Validation Error: {0}")]
    Validation(String),

    #[error("XML Error: {0}")]
    XmlParse(String),

    #[error("Parse Error: {0}")]
    ParseError(String),

    #[error("Serialization Error: {0}")]
    SerializationError(String),

    #[error("Invalid Input: {0}")]
    InvalidInput(String),

    #[error("Not Found: {0}")]
    NotFound(String),
}

impl From<std::io::Error> for ConverterError {
    fn from(err: std::io::Error) -> Self {
        ConverterError::Io(err, "IO operation failed".to_string())
    }
}

impl From<quick_xml::Error> for ConverterError {
    fn from(err: quick_xml::Error) -> Self {
        ConverterError::XmlParse(err.to_string())
    }
}
