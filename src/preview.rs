//! Preview rendering.
//!
//! Walks the selectable graph of one element back into HTML-ish requirement
//! text. Each resolver first builds a [`Fragment`] tree, with strike-through
//! and assignment wrappers decided from the model flags, and then renders it
//! in one pass. The public entry points never fail: a fault such as a
//! reference cycle is logged and the preview degrades to an empty string.

use crate::models_sfr::{
    CellValue, ComplexSegment, ComplexSelectable, ElementModel, PlainGroup, Ref, Segment,
    Selectable, SelectableGroup, TabularizeTable,
};
use crate::rich_text::is_style_tag;
use crate::tabularize::SELECTABLE_ID_FIELD;
use log::error;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use thiserror::Error;
use uuid::Uuid;

/// Nesting deeper than this is treated as a reference cycle.
const MAX_DEPTH: usize = 64;

static CARET_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\^\s+").expect("caret pattern"));
static BRACKET_BEFORE_CLOSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\]\s*(</[a-zA-Z0-9]+>\])").expect("bracket pattern")
});
static TRAILING_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<\s*(/?)([a-zA-Z0-9:_-]+)[^>]*>\s*$").expect("trailing tag pattern")
});
static LEADING_SELECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(<\s*selectables\b|<\s*selectable\b|<\s*assignable\b|\[\s*<\s*b\s*>selection|<\s*ul\b)")
        .expect("leading selection pattern")
});

#[derive(Error, Debug)]
pub enum PreviewFault {
    #[error("selection nesting too deep at '{0}'")]
    TooDeep(String),
}

type Resolved = Result<Option<Fragment>, PreviewFault>;

/// Structured preview output, rendered once by [`Fragment::render`].
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    Text(String),
    Struck(Box<Fragment>),
    Assignment(Box<Fragment>),
    Selection { choose_one: bool, body: Box<Fragment> },
    BulletItem(Box<Fragment>),
    BulletList(Vec<Fragment>),
    Spaced(Vec<Fragment>),
}

impl Fragment {
    pub fn render(&self) -> String {
        match self {
            Fragment::Text(t) => t.clone(),
            Fragment::Struck(inner) => format!("<i><s>{}</s></i>", inner.render()),
            Fragment::Assignment(inner) => format!("[<b>assignment</b>: {}]", inner.render()),
            Fragment::Selection { choose_one, body } => format!(
                "[<b>selection{}</b>: {}]",
                if *choose_one { ", choose one of" } else { "" },
                body.render()
            ),
            Fragment::BulletItem(inner) => format!("<li><i>{}</i></li>", inner.render()),
            Fragment::BulletList(items) => {
                let inner: String = items.iter().map(Fragment::render).collect();
                format!("<ul>{}</ul>", inner)
            }
            Fragment::Spaced(items) => items
                .iter()
                .map(Fragment::render)
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    fn struck_if(self, not_selectable: bool) -> Self {
        if not_selectable {
            Fragment::Struck(Box::new(self))
        } else {
            self
        }
    }

    fn bulleted_if(self, is_bullet: bool) -> Self {
        if is_bullet {
            Fragment::BulletItem(Box::new(self))
        } else {
            self
        }
    }
}

fn push_unique(items: &mut Vec<Fragment>, fragment: Fragment) {
    if !items.contains(&fragment) {
        items.push(fragment);
    }
}

/// Trims, drops leading slashes, and tightens whitespace around brackets.
pub fn clean_up(text: &str) -> String {
    let text = text.trim().trim_start_matches('/').trim_start();
    let text = CARET_SPACE.replace_all(text, "^");
    BRACKET_BEFORE_CLOSE.replace_all(&text, "]$1").into_owned()
}

/// True when `acc` ends with an opening style tag such as `<b>`.
fn preceded_by_rich_text(acc: &str) -> bool {
    let Some(caps) = TRAILING_TAG.captures(acc.trim_end()) else {
        return false;
    };
    if &caps[1] == "/" {
        return false;
    }
    let tag = caps[2].to_ascii_lowercase();
    let base = tag.rsplit(':').next().unwrap_or_default();
    is_style_tag(base)
}

fn starts_with_selection(next: &str) -> bool {
    LEADING_SELECTION.is_match(next.trim_start())
}

/// Joins with a single space unless whitespace is already there or a style
/// tag opens right before a selection.
pub fn smart_append(acc: String, next: &str) -> String {
    if acc.is_empty() {
        return next.to_string();
    }
    if acc.ends_with(char::is_whitespace)
        || next.starts_with(char::is_whitespace)
        || (preceded_by_rich_text(&acc) && starts_with_selection(next))
    {
        return acc + next;
    }
    acc + " " + next
}

/// Read-only view of the maps a preview resolves against.
#[derive(Debug, Clone, Copy)]
pub struct Preview<'a> {
    selectables: &'a BTreeMap<Uuid, Selectable>,
    groups: &'a BTreeMap<String, SelectableGroup>,
    tabularize: Option<&'a BTreeMap<Uuid, TabularizeTable>>,
}

impl<'a> Preview<'a> {
    pub fn new(
        selectables: &'a BTreeMap<Uuid, Selectable>,
        groups: &'a BTreeMap<String, SelectableGroup>,
    ) -> Self {
        Self {
            selectables,
            groups,
            tabularize: None,
        }
    }

    pub fn with_tabularize(mut self, tabularize: &'a BTreeMap<Uuid, TabularizeTable>) -> Self {
        self.tabularize = Some(tabularize);
        self
    }

    pub fn for_element(element: &'a ElementModel) -> Self {
        Self::new(&element.selectables, &element.selectable_groups)
            .with_tabularize(&element.tabularize)
    }

    /// Renders a segment array (title, management function text, or a table cell).
    pub fn get_text_string(&self, segments: &[Segment]) -> String {
        let mut parts: Vec<String> = Vec::new();

        for (index, segment) in segments.iter().enumerate() {
            let part = match segment {
                Segment::Assignment(uuid) => {
                    self.get_group_items_by_type(&Ref::Selectable(*uuid), false, false)
                }
                Segment::Selections(id) => {
                    self.get_group_items_by_type(&Ref::Group(id.clone()), false, false)
                }
                Segment::Text(t) | Segment::Description(t) => {
                    if t.trim().is_empty() {
                        continue;
                    }
                    t.replace("<p>", "<div>").replace("</p>", "</div>")
                }
                Segment::Tabularize(uuid) => {
                    match self.tabularize.and_then(|tables| tables.get(uuid)) {
                        Some(table) => self.get_tabularized_section(table, index),
                        None => continue,
                    }
                }
            };
            if !part.is_empty() && !parts.contains(&part) {
                parts.push(part);
            }
        }

        let joined = parts
            .iter()
            .fold(String::new(), |acc, part| smart_append(acc, part));
        clean_up(&joined)
    }

    /// Resolves one reference, wrapping it as a bullet item when requested.
    pub fn get_group_items_by_type(&self, reference: &Ref, is_bullet: bool, not_selectable: bool) -> String {
        self.total(self.resolve_ref(reference, is_bullet, not_selectable, 0))
    }

    pub fn get_selectable(selectable: &Selectable, is_bullet: bool) -> String {
        let fragment = selectable_fragment(selectable, selectable.not_selectable).bulleted_if(is_bullet);
        clean_up(&fragment.render())
    }

    pub fn get_complex_selectable_text(&self, complex: &ComplexSelectable) -> String {
        self.total(self.complex_fragment(complex, 0))
    }

    pub fn get_selectables_group(&self, group: &PlainGroup, not_selectable: bool) -> String {
        self.total(self.plain_fragment(group, not_selectable, 0))
    }

    /// Inline HTML table for a tabularize segment at `index` in its array.
    pub fn get_tabularized_section(&self, table: &TabularizeTable, index: usize) -> String {
        let padding = if index > 0 { r#"<div class="pt-5"/>"# } else { "" };
        format!(
            r#"{}{}<br/><br/><div class="text-center font-bold">Table: {}</div><br/><table>{}{}</table>"#,
            padding,
            table.definition_string,
            table.title,
            self.tabularized_columns(table),
            self.tabularized_rows(table)
        )
    }

    fn tabularized_columns(&self, table: &TabularizeTable) -> String {
        let headers: String = table
            .columns
            .iter()
            .filter(|c| c.field != SELECTABLE_ID_FIELD)
            .map(|c| format!("<th>{}</th>", c.header_name))
            .collect();
        format!("<thead><tr>{}</tr></thead>", headers)
    }

    fn tabularized_rows(&self, table: &TabularizeTable) -> String {
        // Cells never nest another table.
        let cells = Preview::new(self.selectables, self.groups);
        let rows: String = table
            .rows
            .iter()
            .map(|row| {
                let tds: String = table
                    .columns
                    .iter()
                    .filter(|c| c.field != SELECTABLE_ID_FIELD)
                    .map(|c| {
                        let text = match row.get(&c.field) {
                            Some(CellValue::Segments(segments)) => cells.get_text_string(segments),
                            Some(CellValue::Text(text)) => text.clone(),
                            None => String::new(),
                        };
                        format!("<td>{}</td>", text)
                    })
                    .collect();
                format!("<tr>{}</tr>", tds)
            })
            .collect();
        format!("<tbody>{}</tbody>", rows)
    }

    fn total(&self, resolved: Resolved) -> String {
        match resolved {
            Ok(Some(fragment)) => clean_up(&fragment.render()),
            Ok(None) => String::new(),
            Err(fault) => {
                error!("Preview generation failed: {}", fault);
                String::new()
            }
        }
    }

    fn resolve_ref(&self, reference: &Ref, is_bullet: bool, not_selectable: bool, depth: usize) -> Resolved {
        let fragment = match reference {
            Ref::Selectable(uuid) => self
                .selectables
                .get(uuid)
                .map(|s| selectable_fragment(s, s.not_selectable)),
            Ref::Group(id) => {
                if depth >= MAX_DEPTH {
                    return Err(PreviewFault::TooDeep(id.clone()));
                }
                match self.groups.get(id) {
                    Some(SelectableGroup::Complex(c)) => self.complex_fragment(c, depth + 1)?,
                    Some(SelectableGroup::Plain(p)) => self.plain_fragment(p, not_selectable, depth + 1)?,
                    None => None,
                }
            }
        };
        Ok(fragment.map(|f| f.bulleted_if(is_bullet)))
    }

    fn plain_fragment(&self, group: &PlainGroup, not_selectable: bool, depth: usize) -> Resolved {
        let is_bullet = group.groups.len() > 1;
        let mut members = Vec::new();
        for reference in &group.groups {
            if let Some(member) = self.resolve_ref(reference, is_bullet, false, depth)? {
                push_unique(&mut members, member);
            }
        }
        if members.is_empty() {
            return Ok(None);
        }

        let choose_one = group.only_one && members.len() > 1;
        let body = if is_bullet {
            Fragment::BulletList(members)
        } else {
            Fragment::Spaced(members)
        };
        Ok(Some(Fragment::Selection {
            choose_one,
            body: Box::new(body.struck_if(not_selectable)),
        }))
    }

    fn complex_fragment(&self, complex: &ComplexSelectable, depth: usize) -> Resolved {
        let mut parts = Vec::new();

        for segment in &complex.description {
            match segment {
                ComplexSegment::Text(text) => {
                    let text = text.trim();
                    if !text.is_empty() {
                        push_unique(&mut parts, Fragment::Text(text.to_string()));
                    }
                }
                ComplexSegment::Groups(refs) if refs.len() > 1 => {
                    let mut members = Vec::new();
                    for reference in refs {
                        if let Some(member) = self.resolve_ref(reference, true, false, depth)? {
                            push_unique(&mut members, member);
                        }
                    }
                    if members.is_empty() {
                        continue;
                    }
                    let choose_one = complex.exclusive && members.len() > 1;
                    let body = Fragment::BulletList(members).struck_if(complex.not_selectable);
                    push_unique(
                        &mut parts,
                        Fragment::Selection {
                            choose_one,
                            body: Box::new(body),
                        },
                    );
                }
                ComplexSegment::Groups(refs) => {
                    let Some(reference) = refs.first() else {
                        continue;
                    };
                    let fragment = match reference {
                        Ref::Selectable(uuid) => match self.selectables.get(uuid) {
                            Some(sel) => {
                                let struck = sel.not_selectable || complex.not_selectable;
                                let leaf = selectable_fragment(sel, struck);
                                if sel.assignment {
                                    Some(leaf)
                                } else {
                                    Some(Fragment::Selection {
                                        choose_one: false,
                                        body: Box::new(leaf),
                                    })
                                }
                            }
                            None => None,
                        },
                        Ref::Group(_) => {
                            self.resolve_ref(reference, false, complex.not_selectable, depth)?
                        }
                    };
                    if let Some(fragment) = fragment {
                        push_unique(&mut parts, fragment);
                    }
                }
            }
        }

        if parts.is_empty() {
            return Ok(None);
        }
        Ok(Some(Fragment::Spaced(parts)))
    }
}

/// A leaf with strike-through applied inside any assignment bracket.
fn selectable_fragment(selectable: &Selectable, not_selectable: bool) -> Fragment {
    let leaf = Fragment::Text(selectable.description.clone()).struck_if(not_selectable);
    if selectable.assignment {
        Fragment::Assignment(Box::new(leaf))
    } else {
        leaf
    }
}

/// Renders an element's title.
pub fn render_preview(element: &ElementModel) -> String {
    Preview::for_element(element).get_text_string(&element.title)
}
