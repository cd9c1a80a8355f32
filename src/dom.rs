//! Owned XML node tree.
//!
//! The SFR parser needs sibling look-ahead, ancestor context, and repeated
//! descendant searches, so the quick-xml event stream is folded into a small
//! owned tree once and then walked by reference.

use crate::errors::ConverterError;
use log::warn;
use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};

/// A node in the document tree.
#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    Comment(String),
}

impl XmlNode {
    pub fn as_element(&self) -> Option<&XmlElement> {
        match self {
            XmlNode::Element(e) => Some(e),
            _ => None,
        }
    }

    /// Text of this node the way `textContent` reads it: comments contribute nothing.
    pub fn text_content(&self) -> String {
        match self {
            XmlNode::Element(e) => e.text_content(),
            XmlNode::Text(t) => t.clone(),
            XmlNode::Comment(_) => String::new(),
        }
    }
}

/// An element with its attributes in document order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlElement {
    /// Qualified name as written, e.g. `sec:FCS_CKM`.
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Name without namespace prefix.
    pub fn local_name(&self) -> &str {
        match self.name.split_once(':') {
            Some((_, local)) => local,
            None => &self.name,
        }
    }

    /// Case-insensitive comparison against the local name.
    pub fn is(&self, tag: &str) -> bool {
        self.local_name().eq_ignore_ascii_case(tag)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Attribute value, treating an empty value as absent.
    pub fn non_empty_attr(&self, name: &str) -> Option<&str> {
        self.attr(name).filter(|v| !v.is_empty())
    }

    /// Attributes re-serialized as ` name="value"` pairs.
    pub fn attributes_string(&self) -> String {
        self.attributes
            .iter()
            .map(|(k, v)| format!(" {}=\"{}\"", k, escape(v.as_str())))
            .collect()
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(XmlNode::as_element)
    }

    pub fn direct_children<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.child_elements().filter(move |c| c.is(tag))
    }

    pub fn has_direct_child(&self, tag: &str) -> bool {
        self.direct_children(tag).next().is_some()
    }

    /// All descendants (not including `self`) with the given local name, in document order.
    pub fn find_all<'a>(&'a self, tag: &str) -> Vec<&'a XmlElement> {
        let mut found = Vec::new();
        collect_by_tag(self, tag, &mut found);
        found
    }

    pub fn find_first<'a>(&'a self, tag: &str) -> Option<&'a XmlElement> {
        for child in self.child_elements() {
            if child.is(tag) {
                return Some(child);
            }
            if let Some(found) = child.find_first(tag) {
                return Some(found);
            }
        }
        None
    }

    /// Like [`find_all`](Self::find_all) but also hands back each match's ancestor chain,
    /// nearest ancestor last.
    pub fn find_all_with_ancestors<'a>(&'a self, tag: &str) -> Vec<(&'a XmlElement, Vec<&'a XmlElement>)> {
        let mut found = Vec::new();
        let mut path = vec![self];
        collect_with_ancestors(self, tag, &mut path, &mut found);
        found
    }

    pub fn has_descendant(&self, tag: &str) -> bool {
        self.find_first(tag).is_some()
    }

    pub fn text_content(&self) -> String {
        let mut out = String::new();
        push_text(self, &mut out);
        out
    }
}

fn collect_by_tag<'a>(node: &'a XmlElement, tag: &str, found: &mut Vec<&'a XmlElement>) {
    for child in node.child_elements() {
        if child.is(tag) {
            found.push(child);
        }
        collect_by_tag(child, tag, found);
    }
}

fn collect_with_ancestors<'a>(
    node: &'a XmlElement,
    tag: &str,
    path: &mut Vec<&'a XmlElement>,
    found: &mut Vec<(&'a XmlElement, Vec<&'a XmlElement>)>,
) {
    for child in node.child_elements() {
        if child.is(tag) {
            found.push((child, path.clone()));
        }
        path.push(child);
        collect_with_ancestors(child, tag, path, found);
        path.pop();
    }
}

fn push_text(node: &XmlElement, out: &mut String) {
    for child in &node.children {
        match child {
            XmlNode::Text(t) => out.push_str(t),
            XmlNode::Element(e) => push_text(e, out),
            XmlNode::Comment(_) => {}
        }
    }
}

/// A parsed document. Only the root element is kept; prolog items are dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlDocument {
    pub root: XmlElement,
}

impl XmlDocument {
    pub fn parse_str(xml: &str) -> Result<Self, ConverterError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(false);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => stack.push(start_element(&e)),
                Ok(Event::Empty(e)) => {
                    let element = start_element(&e);
                    attach(&mut stack, &mut root, XmlNode::Element(element));
                }
                Ok(Event::End(_)) => {
                    let element = stack.pop().ok_or_else(|| {
                        ConverterError::XmlParse("unbalanced closing tag".to_string())
                    })?;
                    attach(&mut stack, &mut root, XmlNode::Element(element));
                }
                Ok(Event::Text(t)) => {
                    let text = match t.unescape() {
                        Ok(text) => text.into_owned(),
                        Err(e) => {
                            warn!("Keeping unescaped text after entity error: {}", e);
                            String::from_utf8_lossy(&t).into_owned()
                        }
                    };
                    push_text_node(&mut stack, text);
                }
                Ok(Event::CData(c)) => {
                    let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                    push_text_node(&mut stack, text);
                }
                Ok(Event::Comment(c)) => {
                    if let Some(parent) = stack.last_mut() {
                        let text = String::from_utf8_lossy(&c).into_owned();
                        parent.children.push(XmlNode::Comment(text));
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(ConverterError::XmlParse(format!(
                        "at byte {}: {}",
                        reader.buffer_position(),
                        e
                    )));
                }
            }
        }

        if let Some(open) = stack.last() {
            return Err(ConverterError::XmlParse(format!(
                "unexpected end of document inside <{}>",
                open.name
            )));
        }

        root.map(|root| XmlDocument { root })
            .ok_or_else(|| ConverterError::XmlParse("document has no root element".to_string()))
    }
}

fn start_element(e: &BytesStart) -> XmlElement {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let attributes = e
        .attributes()
        .flatten()
        .map(|a| {
            let key = String::from_utf8_lossy(a.key.as_ref()).into_owned();
            let value = match a.unescape_value() {
                Ok(v) => v.into_owned(),
                Err(_) => String::from_utf8_lossy(&a.value).into_owned(),
            };
            (key, value)
        })
        .collect();
    XmlElement {
        name,
        attributes,
        children: Vec::new(),
    }
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, node: XmlNode) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => {
            if let XmlNode::Element(e) = node
                && root.is_none()
            {
                *root = Some(e);
            }
        }
    }
}

// Adjacent text and CDATA runs become one text node, matching a normalized DOM.
fn push_text_node(stack: &mut [XmlElement], text: String) {
    let Some(parent) = stack.last_mut() else {
        return;
    };
    if let Some(XmlNode::Text(prev)) = parent.children.last_mut() {
        prev.push_str(&text);
    } else {
        parent.children.push(XmlNode::Text(text));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keeps_mixed_content() {
        let doc = XmlDocument::parse_str("<title>The TSF shall <b>use</b> keys.</title>").unwrap();
        assert_eq!(doc.root.name, "title");
        assert_eq!(doc.root.children.len(), 3);
        assert_eq!(doc.root.text_content(), "The TSF shall use keys.");
    }

    #[test]
    fn test_local_name_and_attributes() {
        let doc = XmlDocument::parse_str(
            r#"<cc:selectables xmlns:cc="urn:x" onlyone="yes" linebreak="no"/>"#,
        )
        .unwrap();
        assert_eq!(doc.root.local_name(), "selectables");
        assert!(doc.root.is("SELECTABLES"));
        assert_eq!(doc.root.attr("onlyone"), Some("yes"));
        assert_eq!(
            doc.root.attributes_string(),
            r#" xmlns:cc="urn:x" onlyone="yes" linebreak="no""#
        );
    }

    #[test]
    fn test_attribute_values_are_escaped_on_output() {
        let doc = XmlDocument::parse_str(r#"<xref to="a&gt;b" title="&quot;x&quot; &lt; y"/>"#).unwrap();
        assert_eq!(doc.root.attr("to"), Some("a>b"));
        assert_eq!(
            doc.root.attributes_string(),
            r#" to="a&gt;b" title="&quot;x&quot; &lt; y""#
        );
    }

    #[test]
    fn test_entities_and_cdata_merge_into_one_text_node() {
        let doc = XmlDocument::parse_str("<a>x &lt; y<![CDATA[ & z]]></a>").unwrap();
        assert_eq!(doc.root.children, vec![XmlNode::Text("x < y & z".to_string())]);
    }

    #[test]
    fn test_comments_excluded_from_text_content() {
        let doc = XmlDocument::parse_str("<a>one<!-- hidden -->two</a>").unwrap();
        assert_eq!(doc.root.text_content(), "onetwo");
        assert!(matches!(doc.root.children[1], XmlNode::Comment(_)));
    }

    #[test]
    fn test_find_all_and_ancestors() {
        let doc = XmlDocument::parse_str(
            "<root><man-sfrs><section id='fcs_ckm'><f-component cc-id='fcs_ckm.1'/></section></man-sfrs></root>",
        )
        .unwrap();
        let found = doc.root.find_all_with_ancestors("f-component");
        assert_eq!(found.len(), 1);
        let (node, ancestors) = &found[0];
        assert_eq!(node.attr("cc-id"), Some("fcs_ckm.1"));
        let names: Vec<&str> = ancestors.iter().map(|a| a.local_name()).collect();
        assert_eq!(names, vec!["root", "man-sfrs", "section"]);
    }

    #[test]
    fn test_malformed_document_is_an_error() {
        assert!(XmlDocument::parse_str("<a><b></a>").is_err());
        assert!(XmlDocument::parse_str("<a>").is_err());
        assert!(XmlDocument::parse_str("").is_err());
    }
}
