//! Input/output formats.
//!
//! Protection Profile sources are XML; parsed models are exchanged as JSON.
//! A JSON input is taken to be a previously written model.

pub mod json;
pub mod xml;

use crate::errors::ConverterError;
use std::path::Path;

/// Supported document formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// JSON model document
    Json,
    /// Protection Profile XML
    Xml,
}

impl Format {
    /// Detect format from file extension
    pub fn from_extension(path: &Path) -> Result<Self, ConverterError> {
        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                ConverterError::InvalidInput(format!(
                    "Could not determine file extension for: {}",
                    path.display()
                ))
            })?;

        match extension.to_lowercase().as_str() {
            "json" => Ok(Format::Json),
            "xml" => Ok(Format::Xml),
            ext => Err(ConverterError::InvalidInput(format!(
                "Unsupported file format: .{}. Supported formats: .json, .xml",
                ext
            ))),
        }
    }

    /// Detect format from the first non-whitespace byte, skipping a UTF-8 BOM.
    pub fn from_content(content: &[u8]) -> Result<Self, ConverterError> {
        let content = content.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(content);
        let first = content.iter().find(|b| !b.is_ascii_whitespace());

        let Some(first) = first else {
            return Err(ConverterError::InvalidInput(
                "Empty file content".to_string(),
            ));
        };

        match *first {
            b'{' | b'[' => Ok(Format::Json),
            b'<' => Ok(Format::Xml),
            _ => Err(ConverterError::InvalidInput(
                "Could not detect format from content. Expected JSON (starts with '{' or '[') or XML (starts with '<')".to_string()
            )),
        }
    }

    /// Format from an explicit override, else the path's extension, else
    /// the content.
    pub fn resolve(explicit: Option<Format>, path: &Path, content: &[u8]) -> Result<Self, ConverterError> {
        if let Some(format) = explicit {
            return Ok(format);
        }
        Format::from_extension(path).or_else(|_| Format::from_content(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_from_extension() {
        assert_eq!(
            Format::from_extension(&PathBuf::from("test.json")).unwrap(),
            Format::Json
        );
        assert_eq!(
            Format::from_extension(&PathBuf::from("test.xml")).unwrap(),
            Format::Xml
        );
        assert_eq!(
            Format::from_extension(&PathBuf::from("TEST.JSON")).unwrap(),
            Format::Json
        );
        assert!(Format::from_extension(&PathBuf::from("test.txt")).is_err());
        assert!(Format::from_extension(&PathBuf::from("test")).is_err());
    }

    #[test]
    fn test_from_content() {
        assert_eq!(
            Format::from_content(b"{\"test\": true}").unwrap(),
            Format::Json
        );
        assert_eq!(Format::from_content(b"[1, 2, 3]").unwrap(), Format::Json);
        assert_eq!(
            Format::from_content(b"<?xml version=\"1.0\"?>").unwrap(),
            Format::Xml
        );
        assert_eq!(Format::from_content(b"<root></root>").unwrap(), Format::Xml);
        assert_eq!(
            Format::from_content(b"  \n  {\"test\": true}").unwrap(),
            Format::Json
        );
        assert!(Format::from_content(b"").is_err());
        assert!(Format::from_content(b"invalid").is_err());
    }

    #[test]
    fn test_from_content_skips_bom() {
        assert_eq!(
            Format::from_content(b"\xEF\xBB\xBF<PP/>").unwrap(),
            Format::Xml
        );
    }

    #[test]
    fn test_resolve_prefers_explicit_then_extension() {
        let path = PathBuf::from("pp.xml");
        assert_eq!(
            Format::resolve(Some(Format::Json), &path, b"<PP/>").unwrap(),
            Format::Json
        );
        assert_eq!(Format::resolve(None, &path, b"{}").unwrap(), Format::Xml);
        assert_eq!(
            Format::resolve(None, &PathBuf::from("pp.txt"), b"{}").unwrap(),
            Format::Json
        );
    }
}
