//! Protection Profile XML reader

use crate::dom::XmlDocument;
use crate::errors::ConverterError;
use std::io::Read;

/// Parse a Protection Profile document into the in-memory tree
pub fn parse<R: Read>(mut reader: R) -> Result<XmlDocument, ConverterError> {
    let mut content = String::new();
    reader
        .read_to_string(&mut content)
        .map_err(|e| ConverterError::Io(e, "Failed to read XML input".to_string()))?;
    let content = content.strip_prefix('\u{FEFF}').unwrap_or(&content);
    XmlDocument::parse_str(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_with_prolog() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<PP xmlns="https://niap-ccevs.org/cc/v1"><f-component cc-id="fcs_ckm.1"/></PP>"#;
        let doc = parse(Cursor::new(xml.as_bytes())).unwrap();
        assert_eq!(doc.root.local_name(), "PP");
        assert!(doc.root.find_first("f-component").is_some());
    }

    #[test]
    fn test_parse_skips_byte_order_mark() {
        let doc = parse(Cursor::new("\u{FEFF}<PP/>".as_bytes())).unwrap();
        assert_eq!(doc.root.local_name(), "PP");
    }

    #[test]
    fn test_parse_rejects_truncated_document() {
        let result = parse(Cursor::new(b"<PP><f-component>".as_slice()));
        assert!(matches!(result, Err(ConverterError::XmlParse(_))));
    }
}
