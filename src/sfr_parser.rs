//! SFR import: `f-component` XML into the selectable document model.
//!
//! Id generation is the subtle part. Group ids (`group-{n}`) come from one
//! counter per document, while selectable and assignment ids that are not
//! given in the XML share a single per-element counter (`{element}_{n}`).
//! Both live in explicit context structs threaded through the recursion.

use crate::dom::{XmlElement, XmlNode};
use crate::evaluation_activity::parse_evaluation_activity;
use crate::management_function::parse_management_function_set;
use crate::models_sfr::{
    ActivityLevel, ComplexSegment, ComplexSelectable, Component, ElementModel, Feature,
    ManagementFunctionTable, PlainGroup, Ref, Segment, SelectableGroup, Selectable,
    SelectionDependencies, SfrDocument, SfrType, TabularizeTable,
};
use crate::rich_text::{
    RichText, anchor, direct_text_content, element_content, escape_lt_sign, escape_xml_tags,
    is_raw_xml_tag, is_style_tag, parse_rich_text, remove_whitespace, take_last_text,
};
use crate::tabularize::parse_tabularize;
use log::{debug, info, warn};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Attributes a `depends` tag may name its targets under.
const DEPENDS_ATTRIBUTES: &[&str] = &[
    "on", "and", "on-se1", "on1", "on2", "on3", "on4", "on5", "on-sel", "also", "on-incl",
    "on-use", "on-uc", "on-fcomp",
];

/// Document-wide parse state.
#[derive(Debug, Default)]
pub struct ParseContext {
    group_counter: u32,
    features: Vec<Feature>,
    /// Selectable id to the XML id of the `f-element` holding it.
    selectable_owners: BTreeMap<String, String>,
}

impl ParseContext {
    /// Context for a whole document: its `feature` list and the owning
    /// element of every selectable id.
    pub fn for_document(root: &XmlElement) -> Self {
        let features = root
            .find_all("feature")
            .into_iter()
            .map(|f| Feature {
                id: f.attr("id").unwrap_or_default().to_string(),
                title: f.attr("title").unwrap_or_default().to_string(),
                description: f
                    .find_first("description")
                    .map(|d| remove_whitespace(&d.text_content()))
                    .unwrap_or_default(),
            })
            .collect();

        let mut selectable_owners = BTreeMap::new();
        for element in root.find_all("f-element") {
            let Some(owner) = element.non_empty_attr("id") else {
                continue;
            };
            for selectable in element.find_all("selectable") {
                if let Some(id) = selectable.non_empty_attr("id") {
                    selectable_owners
                        .entry(id.to_string())
                        .or_insert_with(|| owner.to_string());
                }
            }
        }

        Self {
            group_counter: 0,
            features,
            selectable_owners,
        }
    }

    fn feature(&self, id: &str) -> Option<&Feature> {
        self.features.iter().find(|f| f.id == id)
    }

    /// Starts a fresh element scope; the selectable counter restarts at zero.
    pub fn element(&mut self, element_name: impl Into<String>) -> ElementContext<'_> {
        ElementContext {
            element_name: element_name.into(),
            selectable_counter: 0,
            group_counter: &mut self.group_counter,
            selectables: BTreeMap::new(),
            selectable_groups: BTreeMap::new(),
            tabularize: BTreeMap::new(),
        }
    }
}

/// Per-element accumulation of selectables, groups, and tables.
#[derive(Debug)]
pub struct ElementContext<'d> {
    pub element_name: String,
    selectable_counter: u32,
    group_counter: &'d mut u32,
    pub selectables: BTreeMap<Uuid, Selectable>,
    pub selectable_groups: BTreeMap<String, SelectableGroup>,
    pub tabularize: BTreeMap<Uuid, TabularizeTable>,
}

impl ElementContext<'_> {
    pub fn next_selectable_id(&mut self) -> String {
        self.selectable_counter += 1;
        format!("{}_{}", self.element_name, self.selectable_counter)
    }

    pub fn next_group_id(&mut self) -> String {
        *self.group_counter += 1;
        format!("group-{}", self.group_counter)
    }

    /// `id` attribute when present, otherwise the next generated id.
    fn id_for(&mut self, node: &XmlElement) -> String {
        match node.non_empty_attr("id") {
            Some(id) => id.to_string(),
            None => self.next_selectable_id(),
        }
    }
}

/// A `<selectables>` node before it is folded into `selectableGroups`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedGroup {
    pub id: String,
    pub only_one: bool,
    pub linebreak: bool,
    pub exclusive: bool,
    pub selectables: Vec<ParsedSelectable>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSelectable {
    pub uuid: Uuid,
    pub id: String,
    pub description: String,
    pub exclusive: bool,
    pub nested: Vec<NestedEntry>,
}

/// Content that follows a selectable's leading description.
#[derive(Debug, Clone, PartialEq)]
pub enum NestedEntry {
    Text(String),
    Assignable { uuid: Uuid, id: String, content: String },
    Group(ParsedGroup),
}

#[derive(Default)]
struct SelectableState {
    description: String,
    description_set: bool,
    contents: String,
    nested: Vec<NestedEntry>,
}

impl SelectableState {
    /// Pending text becomes the description the first time, a text entry after that.
    fn flush(&mut self) {
        let contents = std::mem::take(&mut self.contents);
        if !self.description_set {
            self.description = contents;
            self.description_set = true;
        } else if !contents.trim().is_empty() {
            self.nested.push(NestedEntry::Text(contents));
        }
    }

    fn walk(&mut self, node: &XmlElement, ctx: &mut ElementContext) {
        for child in &node.children {
            let c = match child {
                XmlNode::Text(t) => {
                    self.contents.push_str(&escape_lt_sign(t));
                    continue;
                }
                XmlNode::Comment(_) => continue,
                XmlNode::Element(c) => c,
            };
            let tag = c.local_name().to_ascii_lowercase();

            if tag == "selectables" {
                self.flush();
                let group = process_selectables(c, ctx);
                self.nested.push(NestedEntry::Group(group));
            } else if tag == "assignable" {
                self.flush();
                let uuid = Uuid::new_v4();
                let id = ctx.id_for(c);
                self.nested.push(NestedEntry::Assignable {
                    uuid,
                    id,
                    content: direct_text_content(c),
                });
            } else if tag == "refinement" {
                self.contents.push_str("<b>");
                self.walk(c, ctx);
                self.contents.push_str("</b>");
            } else if is_style_tag(&tag) {
                self.contents.push_str(&format!("<{}>", c.local_name()));
                self.walk(c, ctx);
                self.contents.push_str(&format!("</{}>", c.local_name()));
            } else if is_raw_xml_tag(&tag) {
                if tag == "snip" {
                    self.contents.push_str(&c.text_content());
                } else {
                    self.contents
                        .push_str(&format!(" {}", escape_xml_tags(&element_content(c))));
                }
            } else if tag == "a" {
                self.contents.push_str(&anchor(c, " "));
            }
        }
    }
}

/// Parses one `<selectables>` node.
///
/// Simple selectables are recorded in `ctx.selectables` right away. A
/// selectable with nested selectables or assignables is returned with its
/// `nested` entries for [`check_nested_groups`]; only its leaf descendants
/// reach the selectable map.
pub fn process_selectables(node: &XmlElement, ctx: &mut ElementContext) -> ParsedGroup {
    let mut group = ParsedGroup {
        id: ctx.next_group_id(),
        only_one: node.attr("onlyone") == Some("yes"),
        linebreak: node.attr("linebreak") == Some("yes"),
        exclusive: node.attr("exclusive") == Some("yes"),
        selectables: Vec::new(),
    };

    for child in node.direct_children("selectable") {
        let uuid = Uuid::new_v4();
        let id = ctx.id_for(child);
        let exclusive = child.attr("exclusive") == Some("yes");

        let mut state = SelectableState::default();
        state.walk(child, ctx);
        if !state.contents.is_empty() {
            state.flush();
        }

        let mut description = remove_whitespace(&state.description);
        let mut nested = state.nested;

        // Only styling followed the description: fold it back into a plain leaf.
        let has_nested_child = nested.iter().any(|n| !matches!(n, NestedEntry::Text(_)));
        if !nested.is_empty() && !has_nested_child {
            for entry in nested.drain(..) {
                if let NestedEntry::Text(text) = entry {
                    description.push(' ');
                    description.push_str(&text);
                }
            }
            description = remove_whitespace(&description);
        }

        if nested.is_empty() {
            ctx.selectables.insert(
                uuid,
                Selectable {
                    id: id.clone(),
                    description: description.clone(),
                    exclusive,
                    ..Default::default()
                },
            );
        } else {
            for entry in &nested {
                if let NestedEntry::Assignable { uuid, id, content } = entry {
                    ctx.selectables
                        .insert(*uuid, Selectable::assignment(id.clone(), content.clone()));
                }
            }
        }

        group.selectables.push(ParsedSelectable {
            uuid,
            id,
            description,
            exclusive,
            nested,
        });
    }

    group
}

/// Folds a parsed group into `selectable_groups`, creating complex selectables
/// for members that mix text with nested groups or assignments.
pub fn check_nested_groups(group: &ParsedGroup, selectable_groups: &mut BTreeMap<String, SelectableGroup>) {
    let mut subgroup = 0;
    build_group(group, selectable_groups, &mut subgroup);
}

fn build_group(group: &ParsedGroup, groups: &mut BTreeMap<String, SelectableGroup>, subgroup: &mut u32) {
    groups.entry(group.id.clone()).or_insert_with(|| {
        SelectableGroup::Plain(PlainGroup {
            only_one: group.only_one,
            linebreak: group.linebreak,
            groups: Vec::new(),
        })
    });

    for sel in &group.selectables {
        if sel.nested.is_empty() {
            push_member(groups, &group.id, Ref::Selectable(sel.uuid));
            continue;
        }

        let complex_id = if sel.id.is_empty() {
            *subgroup += 1;
            format!("{}_{}", group.id, subgroup)
        } else {
            sel.id.clone()
        };

        let mut description = Vec::new();
        if !sel.description.is_empty() {
            description.push(ComplexSegment::Text(remove_whitespace(&sel.description)));
        }

        for entry in &sel.nested {
            match entry {
                NestedEntry::Assignable { uuid, .. } => {
                    if !sel.description.is_empty() || sel.nested.len() != 1 {
                        description.push(ComplexSegment::Groups(vec![Ref::Selectable(*uuid)]));
                    } else {
                        // A lone assignment needs no complex wrapper.
                        push_member(groups, &group.id, Ref::Selectable(*uuid));
                    }
                }
                NestedEntry::Text(text) => {
                    let text = remove_whitespace(text);
                    if text.is_empty() {
                        continue;
                    }
                    match description.last_mut() {
                        Some(ComplexSegment::Text(prev)) => {
                            prev.push(' ');
                            prev.push_str(&text);
                        }
                        _ => description.push(ComplexSegment::Text(text)),
                    }
                }
                NestedEntry::Group(nested) => {
                    description.push(ComplexSegment::Groups(vec![Ref::Group(nested.id.clone())]));
                    build_group(nested, groups, subgroup);
                }
            }
        }

        if !description.is_empty() {
            groups.insert(
                complex_id.clone(),
                SelectableGroup::Complex(ComplexSelectable {
                    exclusive: sel.exclusive,
                    not_selectable: false,
                    description,
                }),
            );
            push_member(groups, &group.id, Ref::Group(complex_id));
        }
    }
}

fn push_member(groups: &mut BTreeMap<String, SelectableGroup>, group_id: &str, member: Ref) {
    if let Some(SelectableGroup::Plain(plain)) = groups.get_mut(group_id) {
        plain.groups.push(member);
    }
}

/// Walks a `<title>` and appends its segments.
///
/// Returns the management function table when the title holds a
/// `management-function-set`.
pub fn parse_title(
    title: &XmlElement,
    ctx: &mut ElementContext,
    segments: &mut Vec<Segment>,
) -> Option<ManagementFunctionTable> {
    let mut management_functions = None;

    for child in &title.children {
        let c = match child {
            XmlNode::Comment(_) => continue,
            XmlNode::Text(t) => {
                let text = escape_lt_sign(t);
                match segments.last_mut() {
                    Some(Segment::Description(prev)) => prev.push_str(&text),
                    _ => segments.push(Segment::Text(text)),
                }
                continue;
            }
            XmlNode::Element(c) => c,
        };
        let tag = c.local_name().to_ascii_lowercase();

        if tag == "selectables" {
            if c.has_direct_child("tabularize") {
                let (uuid, table) = parse_tabularize(c, ctx);
                ctx.tabularize.insert(uuid, table);
                segments.push(Segment::Tabularize(uuid));
            } else {
                let group = process_selectables(c, ctx);
                check_nested_groups(&group, &mut ctx.selectable_groups);
                segments.push(Segment::Selections(group.id));
            }
        } else if tag == "assignable" {
            let uuid = Uuid::new_v4();
            let id = ctx.id_for(c);
            let description = remove_whitespace(&c.text_content());
            ctx.selectables
                .insert(uuid, Selectable::assignment(id, description));
            segments.push(Segment::Assignment(uuid));
        } else if is_style_tag(&tag) || tag == "refinement" {
            let tag_name = if tag == "refinement" {
                "b".to_string()
            } else {
                c.local_name().to_string()
            };
            let (content, pushed) = {
                let mut walker = RichText::with_segments(&mut *ctx, &mut *segments);
                let content = walker.parse_children(c, format!("<{}>", tag_name));
                (content, walker.content_pushed())
            };

            if !pushed || !content.is_empty() {
                let closed = format!("{}</{}>", content, tag_name);
                let merged = match take_last_text(segments) {
                    Some(prev) => prev + &closed,
                    None => closed,
                };
                segments.push(Segment::Description(merged));
            } else {
                segments.push(Segment::Description(format!("</{}>", tag_name)));
            }
        } else if is_raw_xml_tag(&tag) {
            segments.push(Segment::Description(format!(
                " {}",
                escape_xml_tags(&element_content(c))
            )));
        } else if tag == "management-function-set" {
            management_functions = Some(parse_management_function_set(c, ctx));
        }
    }

    management_functions
}

/// Parses one `f-element` under the given derived name.
///
/// Component-level evaluation activities found on the element are handed back
/// separately so the caller can attach them to the component.
pub fn parse_element(
    element: &XmlElement,
    element_name: String,
    parse_ctx: &mut ParseContext,
) -> (ElementModel, Option<crate::models_sfr::EvaluationActivity>) {
    let xml_id = match element.non_empty_attr("id") {
        Some(id) => id.to_string(),
        None => element_name.replace('.', "-"),
    };

    let ext_comp_def_title = element
        .find_first("ext-comp-def-title")
        .and_then(|t| t.find_first("title"))
        .map(|t| escape_xml_tags(&element_content(t)));

    let title_node = element
        .direct_children("title")
        .next()
        .or_else(|| element.find_first("title"));

    let mut ctx = parse_ctx.element(element_name.clone());
    let mut title = Vec::new();
    let management_functions = match title_node {
        Some(node) => parse_title(node, &mut ctx, &mut title),
        None => {
            warn!("f-element {} has no <title>; leaving it empty", element_name);
            None
        }
    };
    let ElementContext {
        selectables,
        selectable_groups,
        tabularize,
        ..
    } = ctx;

    let note = element
        .direct_children("note")
        .find(|n| {
            n.attr("role")
                .is_some_and(|r| r.eq_ignore_ascii_case("application"))
        })
        .map(parse_rich_text)
        .unwrap_or_default();

    let mut element_activity = None;
    let mut component_activity = None;
    for activity in element.direct_children("aactivity") {
        let ea = parse_evaluation_activity(activity);
        match ea.level {
            ActivityLevel::Element => element_activity = Some(ea),
            ActivityLevel::Component => component_activity = Some(ea),
        }
    }

    debug!(
        "Parsed {}: {} selectables, {} groups, {} title segments",
        element_name,
        selectables.len(),
        selectable_groups.len(),
        title.len()
    );

    let model = ElementModel {
        uuid: Uuid::new_v4(),
        name: element_name,
        xml_id,
        title,
        selectables,
        selectable_groups,
        tabularize,
        is_management_function: management_functions.is_some(),
        management_functions,
        note,
        ext_comp_def_title,
        evaluation_activity: element_activity,
    };
    (model, component_activity)
}

#[derive(Debug, Default)]
struct Dependencies {
    selections: SelectionDependencies,
    use_cases: Vec<String>,
    reasons: Vec<Feature>,
    optional: bool,
}

/// Reads the component's `depends` tags. Selection-based components collect
/// selectable, component, and use-case targets; ids naming a `feature`
/// become reasons. Implementation-dependent components only collect reasons.
fn parse_depends(
    node: &XmlElement,
    selection_based: bool,
    implementation_dependent: bool,
    parse_ctx: &ParseContext,
) -> Dependencies {
    let mut deps = Dependencies::default();
    if !selection_based && !implementation_dependent {
        return deps;
    }

    for depend in node.direct_children("depends") {
        for &name in DEPENDS_ATTRIBUTES {
            let Some(value) = depend.attr(name) else {
                continue;
            };
            let reason = parse_ctx.feature(value);

            if !selection_based {
                if name != "on-fcomp"
                    && let Some(feature) = reason
                {
                    deps.reasons.push(feature.clone());
                }
                continue;
            }

            match name {
                "on-use" | "on-uc" => deps.use_cases.push(value.to_string()),
                "on-incl" | "on-fcomp" => deps.selections.components.push(value.to_string()),
                _ => match reason {
                    Some(feature) if name.contains("on") => deps.reasons.push(feature.clone()),
                    _ => {
                        deps.selections.selections.push(value.to_string());
                        match parse_ctx.selectable_owners.get(value) {
                            Some(owner) => deps.selections.elements.push(owner.clone()),
                            None => debug!("No element in this document holds selectable '{}'", value),
                        }
                    }
                },
            }
        }

        if selection_based && depend.has_direct_child("optional") {
            deps.optional = true;
        }
    }
    deps
}

/// Parses one `f-component`. `parent` and `grandparent` are its enclosing
/// elements, used for family and SFR-type lookups.
pub fn parse_component(
    node: &XmlElement,
    parent: Option<&XmlElement>,
    grandparent: Option<&XmlElement>,
    parse_ctx: &mut ParseContext,
) -> Component {
    let status = node.attr("status").unwrap_or_default();
    let sfr_type = grandparent.and_then(|g| SfrType::from_section_tag(g.local_name()));

    let (family_name, family_id) = match parent {
        Some(p) if p.name == "section" => (
            p.attr("title").unwrap_or_default().to_string(),
            p.attr("id").unwrap_or_default().to_uppercase(),
        ),
        Some(p) if p.name.contains("sec:") => (
            p.attr("title").unwrap_or_default().to_string(),
            p.local_name().to_string(),
        ),
        _ => (String::new(), String::new()),
    };

    let raw_cc_id = node.attr("cc-id").unwrap_or_default();
    let iteration = node.non_empty_attr("iteration").map(str::to_string);
    let suffix = iteration
        .as_ref()
        .map(|i| format!("_{}", i))
        .unwrap_or_default();

    let mut elements = Vec::new();
    let mut evaluation_activity = None;
    for (index, element) in node.find_all("f-element").into_iter().enumerate() {
        let name = format!("{}.{}{}", raw_cc_id, index + 1, suffix);
        let (model, component_activity) = parse_element(element, name, parse_ctx);
        if component_activity.is_some() {
            evaluation_activity = component_activity;
        }
        elements.push(model);
    }

    let selection_based = status == "sel-based" || sfr_type == Some(SfrType::SelectionBased);
    let implementation_dependent =
        status == "feat-based" || sfr_type == Some(SfrType::ImplementationDependent);
    let deps = parse_depends(node, selection_based, implementation_dependent, parse_ctx);
    if !deps.selections.is_empty() {
        debug!(
            "{} depends on selections {:?}",
            raw_cc_id, deps.selections.selections
        );
    }

    Component {
        uuid: Uuid::new_v4(),
        cc_id: raw_cc_id.to_uppercase(),
        name: node.attr("name").unwrap_or_default().to_string(),
        iteration,
        xml_id: node.attr("id").unwrap_or_default().to_string(),
        definition: node
            .find_first("description")
            .map(|d| d.text_content())
            .unwrap_or_default(),
        family_name,
        family_id,
        family_uuid: Uuid::nil(),
        sfr_type,
        optional: status == "optional" || sfr_type == Some(SfrType::Optional) || deps.optional,
        objective: status == "objective" || sfr_type == Some(SfrType::Objective),
        selection_based,
        implementation_dependent: implementation_dependent || !deps.reasons.is_empty(),
        invisible: status == "invisible",
        consistency_rationale: node
            .find_first("consistency-rationale")
            .map(parse_rich_text)
            .unwrap_or_default(),
        selections: deps.selections,
        use_case_based: !deps.use_cases.is_empty(),
        use_cases: deps.use_cases,
        reasons: deps.reasons,
        elements,
        evaluation_activity,
    }
}

/// Parses every `f-component` under `root` (or `root` itself).
pub fn get_sfrs(root: &XmlElement) -> SfrDocument {
    let mut parse_ctx = ParseContext::for_document(root);

    let located: Vec<(&XmlElement, Vec<&XmlElement>)> = if root.is("f-component") {
        vec![(root, Vec::new())]
    } else {
        root.find_all_with_ancestors("f-component")
    };

    let mut components = Vec::with_capacity(located.len());
    let mut prev_family_id: Option<String> = None;
    let mut family_uuid = Uuid::new_v4();

    for (node, ancestors) in located {
        let parent = ancestors.last().copied();
        let grandparent = ancestors.iter().rev().nth(1).copied();
        let mut component = parse_component(node, parent, grandparent, &mut parse_ctx);

        if prev_family_id.as_deref() != Some(component.family_id.as_str()) {
            family_uuid = Uuid::new_v4();
        }
        prev_family_id = Some(component.family_id.clone());
        component.family_uuid = family_uuid;

        components.push(component);
    }

    info!("Parsed {} SFR component(s)", components.len());
    SfrDocument { components }
}
