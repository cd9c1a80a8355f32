//! Rich-text flattening.
//!
//! Mixed XML content (titles, notes, evaluation activities) is flattened into
//! an HTML-ish string. Style tags survive as markup, a fixed set of document
//! tags are carried as escaped literal XML, and `<selectables>`/`<assignable>`
//! children are routed into the selectable machinery when a segment target is
//! attached.

use crate::dom::{XmlElement, XmlNode};
use crate::models_sfr::{Segment, Selectable};
use crate::sfr_parser::{ElementContext, check_nested_groups, process_selectables};
use regex::Regex;
use std::sync::LazyLock;
use uuid::Uuid;

pub const STYLE_TAGS: &[&str] = &[
    "b", "p", "s", "i", "strike", "h3", "span", "u", "ol", "ul", "li", "sup", "sub", "pre", "code",
    "table",
];

/// Tags carried through as escaped XML rather than interpreted.
pub const RAW_XML_TAGS: &[&str] = &[
    "xref", "rule", "figure", "ctr", "snip", "if-opt-app", "also", "_", "no-link", "comment",
];

/// Marks a literal `<` so exporters can tell it from markup.
pub const LT_MARKER: char = '\u{200C}';

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern"));
static XML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<([^>]+)>").expect("tag pattern"));
static REF_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"ref-id="([^"]+)""#).expect("ref-id pattern"));
static ALSO_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"&lt;also\s+ref-id="[^"]*"\s*(?:/&gt;|&gt;&lt;/also&gt;)"#).expect("also pattern")
});

pub fn is_style_tag(tag: &str) -> bool {
    STYLE_TAGS.contains(&tag)
}

pub fn is_raw_xml_tag(tag: &str) -> bool {
    RAW_XML_TAGS.contains(&tag)
}

/// Collapses runs of whitespace to one space and trims.
pub fn remove_whitespace(content: &str) -> String {
    WHITESPACE.replace_all(content, " ").trim().to_string()
}

pub fn escape_lt_sign(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    for ch in content.chars() {
        if ch == '<' {
            out.push(LT_MARKER);
        }
        out.push(ch);
    }
    out
}

/// Turns `<tag ...>` into `&lt;tag ...&gt;` so it displays literally.
pub fn escape_xml_tags(content: &str) -> String {
    XML_TAG.replace_all(content, "&lt;$1&gt;").into_owned()
}

/// `"Key Size"` becomes `"keySize"`.
pub fn to_camel_case(value: &str) -> String {
    value
        .to_lowercase()
        .split(' ')
        .enumerate()
        .map(|(i, word)| {
            if i == 0 {
                return word.to_string();
            }
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect()
}

pub fn ref_ids(content: &str) -> Vec<String> {
    REF_ID
        .captures_iter(content)
        .map(|c| c[1].to_string())
        .collect()
}

pub fn remove_also_tags(content: &str) -> String {
    ALSO_TAG.replace_all(content, "").into_owned()
}

/// Serializes a node back to XML text with normalized whitespace.
pub fn node_content(node: &XmlNode) -> String {
    match node {
        XmlNode::Text(t) => format!("{} ", remove_whitespace(&escape_lt_sign(t))),
        XmlNode::Comment(c) => format!("<!--  {}  -->", c),
        XmlNode::Element(e) => element_content(e),
    }
}

pub fn element_content(e: &XmlElement) -> String {
    let name = e.local_name();
    let attrs = e.attributes_string();
    let is_empty = match e.children.as_slice() {
        [] => true,
        [XmlNode::Text(t)] => t.trim().is_empty(),
        _ => false,
    };
    if is_empty {
        format!("<{}{}/>", name, attrs)
    } else {
        let inner: String = e.children.iter().map(node_content).collect();
        format!("<{}{}>{}</{}> ", name, attrs, inner, name)
    }
}

/// Text of all descendants, each run whitespace-normalized and space-joined.
pub fn direct_text_content(node: &XmlElement) -> String {
    fn walk(node: &XmlElement, out: &mut String) {
        for child in &node.children {
            match child {
                XmlNode::Text(t) => {
                    out.push_str(&remove_whitespace(&escape_lt_sign(t)));
                    out.push(' ');
                }
                XmlNode::Element(e) => walk(e, out),
                XmlNode::Comment(_) => {}
            }
        }
    }
    let mut out = String::new();
    walk(node, &mut out);
    out.trim().to_string()
}

/// Pops the last segment when it carries text, returning that text.
pub fn take_last_text(segments: &mut Vec<Segment>) -> Option<String> {
    match segments.last() {
        Some(Segment::Text(_)) | Some(Segment::Description(_)) => match segments.pop() {
            Some(Segment::Text(t)) | Some(Segment::Description(t)) => Some(t),
            _ => None,
        },
        _ => None,
    }
}

/// Flattens an element's children without a segment target.
pub fn parse_rich_text(parent: &XmlElement) -> String {
    RichText::plain().parse_children(parent, String::new())
}

/// Walker state for one flattening pass.
pub struct RichText<'s, 'd> {
    target: Option<(&'s mut ElementContext<'d>, &'s mut Vec<Segment>)>,
    within_tests: bool,
    content_pushed: bool,
}

impl<'s, 'd> RichText<'s, 'd> {
    pub fn plain() -> Self {
        Self {
            target: None,
            within_tests: false,
            content_pushed: false,
        }
    }

    /// For content under a `<tests>` element, where `<div>` is test markup.
    pub fn in_tests() -> Self {
        Self {
            within_tests: true,
            ..Self::plain()
        }
    }

    /// Routes nested selectables and assignables into `ctx`, emitting segments.
    pub fn with_segments(ctx: &'s mut ElementContext<'d>, segments: &'s mut Vec<Segment>) -> Self {
        Self {
            target: Some((ctx, segments)),
            ..Self::plain()
        }
    }

    /// True when the most recent walk pushed a selections segment.
    pub fn content_pushed(&self) -> bool {
        self.content_pushed
    }

    pub fn parse_children(&mut self, parent: &XmlElement, mut contents: String) -> String {
        self.content_pushed = false;

        for (index, child) in parent.children.iter().enumerate() {
            let c = match child {
                XmlNode::Text(t) => {
                    contents.push_str(&escape_lt_sign(t));
                    continue;
                }
                XmlNode::Comment(_) => continue,
                XmlNode::Element(c) => c,
            };
            let tag = c.local_name().to_ascii_lowercase();

            if tag == "refinement" {
                let inner = self.parse_children(c, String::new());
                contents.push_str(&format!("<b{}>{}</b>", c.attributes_string(), inner));
            } else if tag == "a" {
                contents.push_str(&anchor(c, ""));
            } else if is_raw_xml_tag(&tag) {
                if tag == "snip" {
                    contents.push_str(&c.text_content());
                } else {
                    contents.push_str(&escape_xml_tags(&element_content(c)));
                }
            } else if tag == "br" {
                contents.push_str("<br/>");
            } else if is_style_tag(&tag) || tag == "tr" || tag == "td" {
                let inner = self.parse_children(c, String::new());
                let name = c.local_name();
                let mut full = format!("<{}{}>{}</{}>", name, c.attributes_string(), inner, name);
                let next_is_style = parent
                    .children
                    .get(index + 1)
                    .and_then(XmlNode::as_element)
                    .is_some_and(|n| is_style_tag(&n.local_name().to_ascii_lowercase()));
                if next_is_style && !full.ends_with(char::is_whitespace) {
                    full.push(' ');
                }
                contents.push_str(&full);
            } else if tag == "div" {
                if !self.within_tests {
                    contents.push_str(&format!(" {} ", escape_xml_tags(&element_content(c))));
                } else if !c.has_descendant("depends") {
                    contents.push_str(&format!("<div{}>", c.attributes_string()));
                    contents = self.parse_children(c, contents);
                    contents.push_str("</div>");
                }
            } else if tag == "selectables" || tag == "assignable" {
                match self.target.as_mut() {
                    Some((ctx, segments)) => {
                        if tag == "selectables" {
                            flush_pending_text(segments, &contents);
                            let group = process_selectables(c, ctx);
                            check_nested_groups(&group, &mut ctx.selectable_groups);
                            segments.push(Segment::Selections(group.id));
                            self.content_pushed = true;
                        } else {
                            let uuid = Uuid::new_v4();
                            let id = match c.non_empty_attr("id") {
                                Some(id) => id.to_string(),
                                None => ctx.next_selectable_id(),
                            };
                            let description = remove_whitespace(&c.text_content());
                            ctx.selectables
                                .insert(uuid, Selectable::assignment(id, description));
                            flush_pending_text(segments, &contents);
                            segments.push(Segment::Assignment(uuid));
                        }
                        contents.clear();
                    }
                    None => {
                        contents.push_str(&format!(" {} ", escape_xml_tags(&element_content(c))));
                    }
                }
            }
        }

        contents
    }
}

/// `<a href="...">text</a>`, or a bare `<a>` with a leading space when no href is set.
pub fn anchor(node: &XmlElement, lead: &str) -> String {
    match node.non_empty_attr("href") {
        Some(href) => format!("{}<a href=\"{}\">{}</a>", lead, href, node.text_content()),
        None => format!(" <a>{}</a>", node.text_content()),
    }
}

/// Moves pending text into the previous text segment (or a new description)
/// ahead of a selections or assignment segment.
fn flush_pending_text(segments: &mut Vec<Segment>, contents: &str) {
    let text = remove_whitespace(contents);
    match take_last_text(segments) {
        Some(prev) if text.is_empty() => segments.push(Segment::Description(prev)),
        Some(prev) => segments.push(Segment::Description(format!("{} {}", prev, text))),
        None if !text.is_empty() => segments.push(Segment::Description(text)),
        None => {}
    }
}
