//! Referential-integrity lint for parsed or edited models.
//!
//! The preview engine silently skips references it cannot resolve. This
//! module reports them instead, together with selectables and groups that
//! nothing points at any more.

use crate::models_sfr::{
    CellValue, Component, ElementModel, Ref, Segment, SelectableGroup, SfrDocument,
};
use crate::tabularize::validate_definition;
use colored::*;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// A single finding, located by element and model path.
#[derive(Debug, Clone)]
pub struct IntegrityIssue {
    pub severity: Severity,
    pub message: String,
    pub location: Option<String>,
    pub suggestion: Option<String>,
}

impl IntegrityIssue {
    fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            location: None,
            suggestion: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Severity::Info, message)
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn format_colored(&self) -> String {
        let mut output = String::new();

        let (icon, color_fn): (&str, fn(&str) -> ColoredString) = match self.severity {
            Severity::Error => ("✗", |s: &str| s.red().bold()),
            Severity::Warning => ("⚠", |s: &str| s.yellow().bold()),
            Severity::Info => ("ℹ", |s: &str| s.cyan().bold()),
        };
        output.push_str(&format!("{} ", color_fn(icon)));

        if let Some(ref location) = self.location {
            output.push_str(&format!("[{}] ", location.bright_blue()));
        }
        output.push_str(&self.message);
        output.push('\n');

        if let Some(ref suggestion) = self.suggestion {
            output.push_str(&format!(
                "  {} {}\n",
                "→".bright_green(),
                suggestion.green()
            ));
        }
        output
    }

    pub fn format_plain(&self) -> String {
        let severity = match self.severity {
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Info => "INFO",
        };
        let mut output = format!("[{}] ", severity);
        if let Some(ref location) = self.location {
            output.push_str(&format!("[{}] ", location));
        }
        output.push_str(&self.message);
        output.push('\n');
        if let Some(ref suggestion) = self.suggestion {
            output.push_str(&format!("  Suggestion: {}\n", suggestion));
        }
        output
    }
}

#[derive(Debug, Clone, Default)]
pub struct IntegritySummary {
    pub errors: usize,
    pub warnings: usize,
    pub infos: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Default)]
pub struct IntegrityReport {
    pub issues: Vec<IntegrityIssue>,
    pub file_path: Option<String>,
    pub summary: IntegritySummary,
}

impl IntegrityReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.file_path = Some(path.as_ref().display().to_string());
        self
    }

    pub fn add_issue(&mut self, issue: IntegrityIssue) {
        self.issues.push(issue);
        self.summary = IntegritySummary {
            errors: self.count(Severity::Error),
            warnings: self.count(Severity::Warning),
            infos: self.count(Severity::Info),
            total: self.issues.len(),
        };
    }

    pub fn has_errors(&self) -> bool {
        self.count(Severity::Error) > 0
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }

    pub fn print_colored(&self) {
        if let Some(ref path) = self.file_path {
            println!("\n{} {}\n", "Checking:".bold(), path.bright_blue());
        }
        for issue in &self.issues {
            print!("{}", issue.format_colored());
        }

        if self.issues.is_empty() {
            println!("{}", "✓ No integrity issues found".green().bold());
            return;
        }

        println!();
        let mut summary = Vec::new();
        for (severity, singular, plural) in [
            (Severity::Error, "error", "errors"),
            (Severity::Warning, "warning", "warnings"),
            (Severity::Info, "info", "infos"),
        ] {
            let n = self.count(severity);
            if n == 0 {
                continue;
            }
            let text = format!("{} {}", n, if n == 1 { singular } else { plural });
            let painted = match severity {
                Severity::Error => text.red().bold(),
                Severity::Warning => text.yellow().bold(),
                Severity::Info => text.cyan().bold(),
            };
            summary.push(painted.to_string());
        }
        println!("{} {}", "Summary:".bold(), summary.join(", "));
    }

    pub fn print_plain(&self) {
        if let Some(ref path) = self.file_path {
            println!("\nChecking: {}\n", path);
        }
        for issue in &self.issues {
            print!("{}", issue.format_plain());
        }
        if self.issues.is_empty() {
            println!("No integrity issues found");
        } else {
            println!(
                "\nSummary: {} errors, {} warnings, {} infos",
                self.summary.errors, self.summary.warnings, self.summary.infos
            );
        }
    }
}

/// Checks every element of the document.
pub fn check_document(document: &SfrDocument) -> IntegrityReport {
    let mut report = IntegrityReport::new();
    for element in document.elements() {
        check_element(element, &mut report);
    }

    let known_selectables: BTreeSet<&str> = document
        .elements()
        .flat_map(|e| e.selectables.values().map(|s| s.id.as_str()))
        .collect();
    for component in &document.components {
        check_dependencies(component, &known_selectables, document, &mut report);
    }
    report
}

/// Reports selection dependencies that no selectable or element in the
/// document satisfies. They may live in a base document, so these are
/// warnings.
pub fn check_dependencies(
    component: &Component,
    known_selectables: &BTreeSet<&str>,
    document: &SfrDocument,
    report: &mut IntegrityReport,
) {
    let location = format!("{}/selections", component.cc_id);
    for id in &component.selections.selections {
        if !known_selectables.contains(id.as_str()) {
            report.add_issue(
                IntegrityIssue::warning(format!("Selection dependency '{}' does not exist", id))
                    .with_location(&location)
                    .with_suggestion("Restore the selectable or drop the dependency"),
            );
        }
    }
    for key in &component.selections.elements {
        if document.element(key).is_none() {
            report.add_issue(
                IntegrityIssue::warning(format!("Dependency element '{}' does not exist", key))
                    .with_location(&location),
            );
        }
    }
}

pub fn check_element(element: &ElementModel, report: &mut IntegrityReport) {
    let name = &element.name;
    let mut referenced_selectables: BTreeSet<Uuid> = BTreeSet::new();
    let mut referenced_groups: BTreeSet<&str> = BTreeSet::new();

    let mut check_segments = |segments: &[Segment], path: String, report: &mut IntegrityReport| {
        for (index, segment) in segments.iter().enumerate() {
            let location = format!("{}/{}[{}]", name, path, index);
            match segment {
                Segment::Assignment(uuid) => {
                    referenced_selectables.insert(*uuid);
                    if !element.selectables.contains_key(uuid) {
                        report.add_issue(
                            IntegrityIssue::error(format!("Assignment {} does not exist", uuid))
                                .with_location(location)
                                .with_suggestion("Remove the segment or restore the assignment"),
                        );
                    }
                }
                Segment::Selections(id) => {
                    if let Some((key, _)) = element.selectable_groups.get_key_value(id) {
                        referenced_groups.insert(key.as_str());
                    } else {
                        report.add_issue(
                            IntegrityIssue::error(format!("Selection group '{}' does not exist", id))
                                .with_location(location)
                                .with_suggestion("Remove the segment or restore the group"),
                        );
                    }
                }
                Segment::Tabularize(uuid) if !element.tabularize.contains_key(uuid) => {
                    report.add_issue(
                        IntegrityIssue::error(format!("Tabularize table {} does not exist", uuid))
                            .with_location(location),
                    );
                }
                _ => {}
            }
        }
    };

    check_segments(&element.title, "title".to_string(), report);
    if let Some(table) = &element.management_functions {
        for row in &table.rows {
            check_segments(
                &row.text_array,
                format!("managementFunctions/{}/textArray", row.id),
                report,
            );
        }
    }
    for table in element.tabularize.values() {
        for (row_index, row) in table.rows.iter().enumerate() {
            for (field, cell) in row {
                if let CellValue::Segments(segments) = cell {
                    check_segments(
                        segments,
                        format!("tabularize/{}/rows[{}]/{}", table.id, row_index, field),
                        report,
                    );
                }
            }
        }
        for problem in validate_definition(&table.definition) {
            report.add_issue(
                IntegrityIssue::error(problem.message).with_location(format!(
                    "{}/tabularize/{}/definition[{}]",
                    name, table.id, problem.index
                )),
            );
        }
    }

    for (id, group) in &element.selectable_groups {
        let location = format!("{}/selectableGroups/{}", name, id);
        let refs = group.refs();

        let empty = match group {
            SelectableGroup::Plain(plain) => plain.groups.is_empty(),
            SelectableGroup::Complex(complex) => complex.description.is_empty(),
        };
        if empty {
            report.add_issue(
                IntegrityIssue::warning("Group has no members")
                    .with_location(&location)
                    .with_suggestion("Delete the group or add selectables to it"),
            );
        }

        for reference in refs {
            match reference {
                Ref::Selectable(uuid) => {
                    referenced_selectables.insert(*uuid);
                    if !element.selectables.contains_key(uuid) {
                        report.add_issue(
                            IntegrityIssue::error(format!("Member selectable {} does not exist", uuid))
                                .with_location(&location),
                        );
                    }
                }
                Ref::Group(child) => {
                    referenced_groups.insert(child.as_str());
                    if !element.selectable_groups.contains_key(child) {
                        report.add_issue(
                            IntegrityIssue::error(format!("Member group '{}' does not exist", child))
                                .with_location(&location),
                        );
                    }
                }
            }
        }

        if reaches_itself(id, &element.selectable_groups) {
            report.add_issue(
                IntegrityIssue::error("Group contains itself")
                    .with_location(&location)
                    .with_suggestion("Break the cycle; the preview renders nothing for it"),
            );
        }
    }

    for (uuid, selectable) in &element.selectables {
        if !referenced_selectables.contains(uuid) {
            report.add_issue(
                IntegrityIssue::warning(format!("Selectable '{}' is not referenced", selectable.id))
                    .with_location(format!("{}/selectables/{}", name, uuid))
                    .with_suggestion("Delete it or add it to a group"),
            );
        }
    }

    for id in element.selectable_groups.keys() {
        if !referenced_groups.contains(id.as_str()) {
            report.add_issue(
                IntegrityIssue::info(format!("Group '{}' is not referenced", id))
                    .with_location(format!("{}/selectableGroups/{}", name, id)),
            );
        }
    }
}

fn reaches_itself(start: &str, groups: &BTreeMap<String, SelectableGroup>) -> bool {
    let mut stack: Vec<&str> = child_groups(start, groups);
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    while let Some(id) = stack.pop() {
        if id == start {
            return true;
        }
        if seen.insert(id) {
            stack.extend(child_groups(id, groups));
        }
    }
    false
}

fn child_groups<'a>(id: &str, groups: &'a BTreeMap<String, SelectableGroup>) -> Vec<&'a str> {
    groups
        .get(id)
        .map(|g| {
            g.refs()
                .into_iter()
                .filter_map(|r| match r {
                    Ref::Group(child) => Some(child.as_str()),
                    Ref::Selectable(_) => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models_sfr::{Selectable, SelectionDependencies};

    fn element() -> ElementModel {
        let mut element = ElementModel {
            name: "FDP_X.1.1".to_string(),
            ..Default::default()
        };
        let a = Uuid::new_v4();
        element.selectables.insert(a, Selectable::choice("a", "A"));
        element.selectable_groups.insert(
            "group-1".to_string(),
            SelectableGroup::plain(false, vec![Ref::Selectable(a)]),
        );
        element.title = vec![Segment::Selections("group-1".to_string())];
        element
    }

    #[test]
    fn test_issue_builder() {
        let issue = IntegrityIssue::error("Broken")
            .with_location("E/title[0]")
            .with_suggestion("Fix it");
        assert_eq!(issue.severity, Severity::Error);
        assert_eq!(issue.location.as_deref(), Some("E/title[0]"));
        assert!(issue.format_plain().starts_with("[ERROR] [E/title[0]] Broken"));
        assert!(issue.format_plain().contains("Suggestion: Fix it"));
    }

    #[test]
    fn test_clean_element_has_no_issues() {
        let mut report = IntegrityReport::new();
        check_element(&element(), &mut report);
        assert!(report.issues.is_empty(), "{:?}", report.issues);
    }

    #[test]
    fn test_dangling_references_are_errors() {
        let mut element = element();
        element.title.push(Segment::Assignment(Uuid::new_v4()));
        element.title.push(Segment::Selections("group-9".to_string()));
        let mut report = IntegrityReport::new();
        check_element(&element, &mut report);
        assert_eq!(report.summary.errors, 2);
        assert!(report.has_errors());
    }

    #[test]
    fn test_unreferenced_and_empty_are_reported() {
        let mut element = element();
        element
            .selectables
            .insert(Uuid::new_v4(), Selectable::choice("orphan", "O"));
        element
            .selectable_groups
            .insert("group-2".to_string(), SelectableGroup::plain(false, Vec::new()));
        let mut report = IntegrityReport::new();
        check_element(&element, &mut report);
        assert!(!report.has_errors());
        assert_eq!(report.count(Severity::Warning), 2);
        assert_eq!(report.count(Severity::Info), 1);
    }

    #[test]
    fn test_group_cycle_is_an_error() {
        let mut element = element();
        element.selectable_groups.insert(
            "group-1".to_string(),
            SelectableGroup::plain(false, vec![Ref::Group("group-2".to_string())]),
        );
        element.selectable_groups.insert(
            "group-2".to_string(),
            SelectableGroup::plain(false, vec![Ref::Group("group-1".to_string())]),
        );
        let mut report = IntegrityReport::new();
        check_element(&element, &mut report);
        let cycles = report
            .issues
            .iter()
            .filter(|i| i.message == "Group contains itself")
            .count();
        assert_eq!(cycles, 2);
    }

    #[test]
    fn test_check_document_records_file() {
        let doc = SfrDocument {
            components: vec![Component {
                elements: vec![element()],
                ..Default::default()
            }],
        };
        let report = check_document(&doc).with_file("model.json");
        assert_eq!(report.summary.total, 0);
        assert_eq!(report.file_path.as_deref(), Some("model.json"));
    }

    #[test]
    fn test_unresolved_selection_dependencies_are_warnings() {
        let mut element = element();
        element.xml_id = "fdp-x-1e1".to_string();
        let doc = SfrDocument {
            components: vec![
                Component {
                    cc_id: "FDP_X.1".to_string(),
                    elements: vec![element],
                    ..Default::default()
                },
                Component {
                    cc_id: "FDP_Y.1".to_string(),
                    selections: SelectionDependencies {
                        selections: vec!["a".to_string(), "gone".to_string()],
                        elements: vec!["fdp-x-1e1".to_string(), "fdp-z-1e1".to_string()],
                        components: Vec::new(),
                    },
                    ..Default::default()
                },
            ],
        };

        let report = check_document(&doc);
        assert!(!report.has_errors());
        let messages: Vec<&str> = report.issues.iter().map(|i| i.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "Selection dependency 'gone' does not exist",
                "Dependency element 'fdp-z-1e1' does not exist",
            ]
        );
        assert_eq!(report.issues[0].location.as_deref(), Some("FDP_Y.1/selections"));
    }
}
