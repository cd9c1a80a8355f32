//! Data model for parsed Security Functional Requirements.
//!
//! The shapes mirror what the editor stores per SFR element: a flat map of
//! leaf selectables, a map of selectable groups (plain lists or complex
//! selectables made of text and nested references), and the ordered title
//! segments that stitch them into requirement text.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// A leaf choice, or a free-text assignment when `assignment` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Selectable {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub assignment: bool,
    #[serde(default)]
    pub exclusive: bool,
    #[serde(default)]
    pub not_selectable: bool,
}

impl Selectable {
    pub fn choice(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn assignment(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            assignment: true,
            ..Default::default()
        }
    }
}

/// A reference from a group to one of its members.
///
/// Selectables are keyed by UUID and groups by their `group-{n}` (or
/// selectable-derived) id, so the variant decides which map to look in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Ref {
    Selectable(Uuid),
    Group(String),
}

impl Ref {
    pub fn points_at_selectable(&self, uuid: &Uuid) -> bool {
        matches!(self, Ref::Selectable(u) if u == uuid)
    }

    pub fn points_at_group(&self, id: &str) -> bool {
        matches!(self, Ref::Group(g) if g == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PlainGroup {
    #[serde(default)]
    pub only_one: bool,
    #[serde(default)]
    pub linebreak: bool,
    pub groups: Vec<Ref>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ComplexSelectable {
    #[serde(default)]
    pub exclusive: bool,
    #[serde(default)]
    pub not_selectable: bool,
    pub description: Vec<ComplexSegment>,
}

/// One entry of a complex selectable's description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ComplexSegment {
    Text(String),
    Groups(Vec<Ref>),
}

/// Entry of the `selectableGroups` map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SelectableGroup {
    Plain(PlainGroup),
    Complex(ComplexSelectable),
}

impl SelectableGroup {
    pub fn plain(only_one: bool, groups: Vec<Ref>) -> Self {
        SelectableGroup::Plain(PlainGroup {
            only_one,
            linebreak: false,
            groups,
        })
    }

    /// Every reference held by this group, in order.
    pub fn refs(&self) -> Vec<&Ref> {
        match self {
            SelectableGroup::Plain(p) => p.groups.iter().collect(),
            SelectableGroup::Complex(c) => c
                .description
                .iter()
                .filter_map(|seg| match seg {
                    ComplexSegment::Groups(g) => Some(g.iter()),
                    ComplexSegment::Text(_) => None,
                })
                .flatten()
                .collect(),
        }
    }
}

/// A title (or text array) segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Segment {
    Text(String),
    Description(String),
    Assignment(Uuid),
    Selections(String),
    Tabularize(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Selectcol,
    Textcol,
    Reqtext,
}

impl ColumnKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "selectcol" => Some(ColumnKind::Selectcol),
            "textcol" => Some(ColumnKind::Textcol),
            "reqtext" => Some(ColumnKind::Reqtext),
            _ => None,
        }
    }

    /// Whether this entry contributes a grid column.
    pub fn is_column(&self) -> bool {
        !matches!(self, ColumnKind::Reqtext)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDefinition {
    pub value: String,
    #[serde(rename = "type")]
    pub kind: ColumnKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridColumn {
    pub header_name: String,
    pub field: String,
    #[serde(rename = "type")]
    pub kind: ColumnKind,
}

/// A table cell: plain text for text columns, segments for selection columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Text(String),
    Segments(Vec<Segment>),
}

pub type TabularizeRow = BTreeMap<String, CellValue>;

/// Crypto selection table attached to an FCS element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TabularizeTable {
    pub id: String,
    pub title: String,
    pub definition_string: String,
    pub definition: Vec<ColumnDefinition>,
    pub columns: Vec<GridColumn>,
    pub rows: Vec<TabularizeRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerColumn {
    pub header_name: String,
    pub field: String,
    pub default: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub note: String,
    pub ref_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ManagementFunctionRow {
    pub id: String,
    pub text_array: Vec<Segment>,
    pub notes: Vec<Note>,
    pub evaluation_activity: Option<EvaluationActivity>,
    /// Status marker per manager field, e.g. `{"ADMIN": "M"}`.
    pub markers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ManagementFunctionTable {
    pub table_name: String,
    pub status_markers: String,
    pub columns: Vec<ManagerColumn>,
    pub rows: Vec<ManagementFunctionRow>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ActivityLevel {
    Element,
    #[default]
    Component,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TestList {
    pub uuid: Uuid,
    pub parent_test: Option<Uuid>,
    pub description: String,
    pub conclusion: String,
    pub tests: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Test {
    pub uuid: Uuid,
    pub test_list: Uuid,
    pub id: String,
    pub objective: String,
    pub dependencies: Vec<String>,
    pub nested_test_lists: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationActivity {
    pub level: ActivityLevel,
    pub introduction: String,
    pub tss: String,
    pub guidance: String,
    pub test_introduction: String,
    pub test_closing: String,
    pub test_lists: Vec<TestList>,
    pub tests: Vec<Test>,
    pub is_no_test: bool,
    pub no_test: String,
    pub ref_ids: Vec<String>,
}

/// Everything parsed for one `f-element`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ElementModel {
    pub uuid: Uuid,
    /// Derived name such as `FCS_CKM.1.1` or `FCS_CKM.1.1_1` for iterations.
    pub name: String,
    pub xml_id: String,
    pub title: Vec<Segment>,
    pub selectables: BTreeMap<Uuid, Selectable>,
    pub selectable_groups: BTreeMap<String, SelectableGroup>,
    #[serde(default)]
    pub tabularize: BTreeMap<Uuid, TabularizeTable>,
    #[serde(default)]
    pub is_management_function: bool,
    #[serde(default)]
    pub management_functions: Option<ManagementFunctionTable>,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub ext_comp_def_title: Option<String>,
    #[serde(default)]
    pub evaluation_activity: Option<EvaluationActivity>,
}

impl ElementModel {
    /// Looks a selectable up by its user-visible id.
    pub fn selectable_by_id(&self, id: &str) -> Option<(Uuid, &Selectable)> {
        self.selectables
            .iter()
            .find(|(_, s)| s.id == id)
            .map(|(uuid, s)| (*uuid, s))
    }

    /// Whether `key` names this element by derived name, XML id, or UUID.
    pub fn matches_key(&self, key: &str) -> bool {
        self.name.eq_ignore_ascii_case(key) || self.xml_id == key || self.uuid.to_string() == key
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SfrType {
    Mandatory,
    Optional,
    SelectionBased,
    Objective,
    ImplementationDependent,
}

impl SfrType {
    /// Maps the enclosing section tag, e.g. `man-sfrs`.
    pub fn from_section_tag(tag: &str) -> Option<Self> {
        match tag {
            "man-sfrs" => Some(SfrType::Mandatory),
            "opt-sfrs" => Some(SfrType::Optional),
            "sel-sfrs" => Some(SfrType::SelectionBased),
            "obj-sfrs" => Some(SfrType::Objective),
            "impl-dep-sfrs" => Some(SfrType::ImplementationDependent),
            _ => None,
        }
    }
}

/// A `feature` a component can be implementation-dependent on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Feature {
    pub id: String,
    pub title: String,
    pub description: String,
}

/// What enables a selection-based component.
///
/// `selections` holds selectable ids, `elements` the XML ids of the
/// elements owning them, and `components` any whole components depended on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SelectionDependencies {
    pub selections: Vec<String>,
    pub elements: Vec<String>,
    pub components: Vec<String>,
}

impl SelectionDependencies {
    pub fn is_empty(&self) -> bool {
        self.selections.is_empty() && self.elements.is_empty() && self.components.is_empty()
    }
}

/// One `f-component` with its elements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Component {
    pub uuid: Uuid,
    pub cc_id: String,
    pub name: String,
    pub iteration: Option<String>,
    pub xml_id: String,
    pub definition: String,
    pub family_name: String,
    pub family_id: String,
    pub family_uuid: Uuid,
    pub sfr_type: Option<SfrType>,
    pub optional: bool,
    pub objective: bool,
    pub selection_based: bool,
    pub implementation_dependent: bool,
    pub invisible: bool,
    pub consistency_rationale: String,
    pub selections: SelectionDependencies,
    pub use_case_based: bool,
    pub use_cases: Vec<String>,
    /// Features that make an implementation-dependent component apply.
    pub reasons: Vec<Feature>,
    pub elements: Vec<ElementModel>,
    pub evaluation_activity: Option<EvaluationActivity>,
}

/// All SFR components found in a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SfrDocument {
    pub components: Vec<Component>,
}

impl SfrDocument {
    pub fn elements(&self) -> impl Iterator<Item = &ElementModel> {
        self.components.iter().flat_map(|c| c.elements.iter())
    }

    pub fn element(&self, key: &str) -> Option<&ElementModel> {
        self.elements().find(|e| e.matches_key(key))
    }

    pub fn element_mut(&mut self, key: &str) -> Option<&mut ElementModel> {
        self.components
            .iter_mut()
            .flat_map(|c| c.elements.iter_mut())
            .find(|e| e.matches_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_segment_serializes_as_single_key_object() {
        let seg = Segment::Selections("group-1".to_string());
        assert_eq!(serde_json::to_value(&seg).unwrap(), json!({"selections": "group-1"}));
        let seg = Segment::Text("The TSF shall".to_string());
        assert_eq!(serde_json::to_value(&seg).unwrap(), json!({"text": "The TSF shall"}));
    }

    #[test]
    fn test_group_variants_are_tagged() {
        let group = SelectableGroup::plain(true, vec![Ref::Group("group-2".to_string())]);
        assert_eq!(
            serde_json::to_value(&group).unwrap(),
            json!({"kind": "plain", "onlyOne": true, "linebreak": false, "groups": [{"group": "group-2"}]})
        );
        let back: SelectableGroup = serde_json::from_value(json!({
            "kind": "complex",
            "description": [{"text": "Use"}, {"groups": [{"group": "group-3"}]}]
        }))
        .unwrap();
        assert!(matches!(back, SelectableGroup::Complex(ref c) if c.description.len() == 2));
    }

    #[test]
    fn test_cell_value_is_untagged() {
        let text: CellValue = serde_json::from_value(json!("AES")).unwrap();
        assert_eq!(text, CellValue::Text("AES".to_string()));
        let segs: CellValue = serde_json::from_value(json!([{"text": "x"}])).unwrap();
        assert_eq!(segs, CellValue::Segments(vec![Segment::Text("x".to_string())]));
    }

    #[test]
    fn test_refs_of_complex_group() {
        let u = Uuid::new_v4();
        let group = SelectableGroup::Complex(ComplexSelectable {
            exclusive: false,
            not_selectable: false,
            description: vec![
                ComplexSegment::Text("a".to_string()),
                ComplexSegment::Groups(vec![Ref::Selectable(u), Ref::Group("g".to_string())]),
            ],
        });
        assert_eq!(group.refs(), vec![&Ref::Selectable(u), &Ref::Group("g".to_string())]);
    }

    #[test]
    fn test_element_lookup_by_key() {
        let mut doc = SfrDocument::default();
        doc.components.push(Component {
            elements: vec![ElementModel {
                name: "FCS_CKM.1.1".to_string(),
                xml_id: "fcs-ckm-1e1".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        });
        assert!(doc.element("fcs_ckm.1.1").is_some());
        assert!(doc.element("fcs-ckm-1e1").is_some());
        assert!(doc.element("FCS_CKM.2.1").is_none());
    }
}
