//! Management function tables (`<management-function-set>`).
//!
//! Each `<manager>` becomes a column keyed by its upper-cased `cid`; each
//! `<management-function>` becomes a row whose text is parsed into segments
//! like a title, with per-manager status markers (`M`, `O`, `NA`, `X`).

use crate::dom::XmlElement;
use crate::evaluation_activity::parse_evaluation_activity;
use crate::models_sfr::{
    ManagementFunctionRow, ManagementFunctionTable, ManagerColumn, Note, Segment,
};
use crate::rich_text::{RichText, parse_rich_text, ref_ids, remove_also_tags, take_last_text};
use crate::sfr_parser::ElementContext;
use log::warn;
use std::collections::BTreeSet;

pub const TABLE_NAME: &str = "Management Functions";

/// Legend text for a status marker.
pub fn marker_legend(marker: &str) -> Option<&'static str> {
    match marker {
        "M" => Some("Indicates that this function is mandatory for this role."),
        "O" => Some("Indicates that this function is optional for this role"),
        "NA" => Some("Indicates that this function is not applicable for this role"),
        "X" => Some("Indicates that this function is not permitted for this role"),
        _ => None,
    }
}

pub fn parse_management_function_set(
    node: &XmlElement,
    ctx: &mut ElementContext,
) -> ManagementFunctionTable {
    let default = node.attr("default").unwrap_or_default().to_string();
    let mut table = ManagementFunctionTable {
        table_name: TABLE_NAME.to_string(),
        ..Default::default()
    };
    let mut found_markers = BTreeSet::new();
    let mut row_counter = 0;

    for child in node.child_elements() {
        if child.is("manager") {
            let Some(cid) = child.non_empty_attr("cid") else {
                warn!("Skipping <manager> without a cid attribute");
                continue;
            };
            table.columns.push(ManagerColumn {
                header_name: child.text_content(),
                field: cid.to_uppercase(),
                default: default.clone(),
            });
        } else if child.is("management-function") {
            let id = match child.non_empty_attr("id") {
                Some(id) => id.to_string(),
                None => {
                    row_counter += 1;
                    format!("mf-{}", row_counter)
                }
            };
            let row = parse_row(child, id, &table.columns, &default, &mut found_markers, ctx);
            table.rows.push(row);
        }
    }

    table.status_markers = status_legend(&default, &found_markers);
    table
}

fn parse_row(
    node: &XmlElement,
    id: String,
    columns: &[ManagerColumn],
    default: &str,
    found_markers: &mut BTreeSet<String>,
    ctx: &mut ElementContext,
) -> ManagementFunctionRow {
    let mut row = ManagementFunctionRow {
        id,
        ..Default::default()
    };

    for child in node.child_elements() {
        let tag = child.local_name();
        match tag.to_ascii_lowercase().as_str() {
            "text" => parse_text(child, ctx, &mut row.text_array),
            "note" | "app-note" => {
                let note = parse_rich_text(child);
                row.notes.push(Note {
                    ref_ids: ref_ids(&note),
                    note: remove_also_tags(&note),
                });
            }
            "aactivity" => row.evaluation_activity = Some(parse_evaluation_activity(child)),
            _ => {
                let marker = tag.to_uppercase();
                if marker_legend(&marker).is_some() {
                    found_markers.insert(marker);
                }
                let Some(reference) = child.attr("ref") else {
                    continue;
                };
                let field = reference.to_uppercase();
                if columns.iter().any(|c| c.field == field) {
                    let value = if tag == "NA" { "-" } else { tag };
                    row.markers.insert(field, value.to_string());
                }
            }
        }
    }

    for column in columns {
        let value = row.markers.entry(column.field.clone()).or_default();
        if value.is_empty() {
            *value = default.to_string();
        }
    }

    row
}

/// Parses a row's `<text>` into segments. Trailing text after the last
/// selection joins the previous description with a double space.
fn parse_text(node: &XmlElement, ctx: &mut ElementContext, segments: &mut Vec<Segment>) {
    let rest = RichText::with_segments(ctx, segments).parse_children(node, String::new());
    let rest = rest.trim();
    if rest.is_empty() {
        return;
    }
    match take_last_text(segments) {
        Some(prev) => segments.push(Segment::Description(format!("{}  {}", prev, rest))),
        None => segments.push(Segment::Description(rest.to_string())),
    }
}

fn status_legend(default: &str, found: &BTreeSet<String>) -> String {
    let mut legend = String::new();
    if let Some(text) = marker_legend(default) {
        legend.push_str(&format!("{} - {}<br/>", default, text));
    }
    for marker in found.iter().filter(|m| m.as_str() != default) {
        if let Some(text) = marker_legend(marker) {
            legend.push_str(&format!("{} - {}<br/>", marker, text));
        }
    }
    legend
}
