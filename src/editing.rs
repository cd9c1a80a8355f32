//! User edits on an element's selectable graph.
//!
//! Every edit reads a copy through the repository, changes it, and commits
//! the touched fields in one patch. Deletes cascade: a removed selectable or
//! group disappears from plain groups, complex descriptions, the title,
//! management function text, and tabularize cells.

use crate::errors::ConverterError;
use crate::models_sfr::{
    CellValue, ComplexSegment, ComplexSelectable, ElementModel, PlainGroup, Ref, Segment,
    Selectable, SelectableGroup,
};
use crate::repository::{DocumentRepository, ElementPatch};
use log::info;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single edit, as read from an edits file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Edit {
    AddSelectable {
        group: String,
        description: String,
        #[serde(default)]
        id: Option<String>,
    },
    AddAssignment {
        description: String,
        #[serde(default)]
        index: Option<usize>,
        #[serde(default)]
        id: Option<String>,
    },
    AddSelectableGroup {
        #[serde(default)]
        parent: Option<String>,
        #[serde(default)]
        only_one: bool,
        #[serde(default)]
        index: Option<usize>,
    },
    AddComplexSelectable {
        parent: String,
        description: Vec<ComplexSegment>,
        #[serde(default)]
        exclusive: bool,
        #[serde(default)]
        id: Option<String>,
    },
    RemoveTitleSegment {
        index: usize,
    },
    MoveTitleSegment {
        from: usize,
        to: usize,
    },
    DeleteSelectable {
        selectable: String,
    },
    DeleteSelectableGroup {
        group: String,
    },
    RenameTabularizeColumn {
        table: String,
        field: String,
        header: String,
    },
}

impl Edit {
    pub fn name(&self) -> &'static str {
        match self {
            Edit::AddSelectable { .. } => "addSelectable",
            Edit::AddAssignment { .. } => "addAssignment",
            Edit::AddSelectableGroup { .. } => "addSelectableGroup",
            Edit::AddComplexSelectable { .. } => "addComplexSelectable",
            Edit::RemoveTitleSegment { .. } => "removeTitleSegment",
            Edit::MoveTitleSegment { .. } => "moveTitleSegment",
            Edit::DeleteSelectable { .. } => "deleteSelectable",
            Edit::DeleteSelectableGroup { .. } => "deleteSelectableGroup",
            Edit::RenameTabularizeColumn { .. } => "renameTabularizeColumn",
        }
    }

    pub fn apply<R: DocumentRepository>(&self, repo: &mut R, element: &str) -> Result<(), ConverterError> {
        info!("Applying {} to {}", self.name(), element);
        match self {
            Edit::AddSelectable { group, description, id } => {
                add_selectable(repo, element, group, description, id.as_deref()).map(drop)
            }
            Edit::AddAssignment { description, index, id } => {
                add_assignment(repo, element, description, *index, id.as_deref()).map(drop)
            }
            Edit::AddSelectableGroup { parent, only_one, index } => {
                add_selectable_group(repo, element, parent.as_deref(), *only_one, *index).map(drop)
            }
            Edit::AddComplexSelectable { parent, description, exclusive, id } => {
                let complex = ComplexSelectable {
                    exclusive: *exclusive,
                    not_selectable: false,
                    description: description.clone(),
                };
                add_complex_selectable(repo, element, parent, complex, id.as_deref()).map(drop)
            }
            Edit::RemoveTitleSegment { index } => remove_title_segment(repo, element, *index).map(drop),
            Edit::MoveTitleSegment { from, to } => move_title_segment(repo, element, *from, *to),
            Edit::DeleteSelectable { selectable } => {
                delete_selectable(repo, element, selectable).map(drop)
            }
            Edit::DeleteSelectableGroup { group } => {
                delete_selectable_group(repo, element, group).map(drop)
            }
            Edit::RenameTabularizeColumn { table, field, header } => {
                rename_tabularize_column(repo, element, table, field, header)
            }
        }
    }
}

/// An edit addressed to one element, as stored in an edits file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditRequest {
    pub element: String,
    #[serde(flatten)]
    pub edit: Edit,
}

/// Applies requests in order and stops at the first failure.
pub fn apply_all<R: DocumentRepository>(
    repo: &mut R,
    requests: &[EditRequest],
) -> Result<usize, ConverterError> {
    for (index, request) in requests.iter().enumerate() {
        request.edit.apply(repo, &request.element).map_err(|e| {
            ConverterError::InvalidInput(format!(
                "edit #{} ({}) on {} failed: {}",
                index + 1,
                request.edit.name(),
                request.element,
                e
            ))
        })?;
    }
    Ok(requests.len())
}

/// Adds a choice to a plain group, or as a new member segment of a complex selectable.
pub fn add_selectable<R: DocumentRepository>(
    repo: &mut R,
    element: &str,
    group_id: &str,
    description: &str,
    id: Option<&str>,
) -> Result<Uuid, ConverterError> {
    let mut model = repo.get(element)?;
    let uuid = Uuid::new_v4();
    let id = match id {
        Some(id) => id.to_string(),
        None => next_selectable_id(&model),
    };

    attach_member(&mut model, group_id, Ref::Selectable(uuid))?;
    model
        .selectables
        .insert(uuid, Selectable::choice(id, description));

    repo.commit(
        element,
        ElementPatch {
            selectables: Some(model.selectables),
            selectable_groups: Some(model.selectable_groups),
            ..Default::default()
        },
    )?;
    Ok(uuid)
}

/// Adds a title assignment at `index`, or at the end.
pub fn add_assignment<R: DocumentRepository>(
    repo: &mut R,
    element: &str,
    description: &str,
    index: Option<usize>,
    id: Option<&str>,
) -> Result<Uuid, ConverterError> {
    let mut model = repo.get(element)?;
    let uuid = Uuid::new_v4();
    let id = match id {
        Some(id) => id.to_string(),
        None => next_selectable_id(&model),
    };

    insert_title_segment(&mut model, index, Segment::Assignment(uuid))?;
    model
        .selectables
        .insert(uuid, Selectable::assignment(id, description));

    repo.commit(
        element,
        ElementPatch {
            selectables: Some(model.selectables),
            title: Some(model.title),
            ..Default::default()
        },
    )?;
    Ok(uuid)
}

/// Creates an empty plain group under `parent`, or as a title selection when
/// no parent is given. Returns the new group id.
pub fn add_selectable_group<R: DocumentRepository>(
    repo: &mut R,
    element: &str,
    parent: Option<&str>,
    only_one: bool,
    index: Option<usize>,
) -> Result<String, ConverterError> {
    let mut model = repo.get(element)?;
    let id = next_group_id(&model);

    match parent {
        Some(parent) => attach_member(&mut model, parent, Ref::Group(id.clone()))?,
        None => insert_title_segment(&mut model, index, Segment::Selections(id.clone()))?,
    }
    model.selectable_groups.insert(
        id.clone(),
        SelectableGroup::Plain(PlainGroup {
            only_one,
            linebreak: false,
            groups: Vec::new(),
        }),
    );

    repo.commit(
        element,
        ElementPatch {
            selectable_groups: Some(model.selectable_groups),
            title: Some(model.title),
            ..Default::default()
        },
    )?;
    Ok(id)
}

pub fn add_complex_selectable<R: DocumentRepository>(
    repo: &mut R,
    element: &str,
    parent: &str,
    complex: ComplexSelectable,
    id: Option<&str>,
) -> Result<String, ConverterError> {
    let mut model = repo.get(element)?;
    let id = match id {
        Some(id) if model.selectable_groups.contains_key(id) => {
            return Err(ConverterError::InvalidInput(format!(
                "group '{}' already exists",
                id
            )));
        }
        Some(id) => id.to_string(),
        None => (1..)
            .map(|n| format!("{}_{}", parent, n))
            .find(|candidate| !model.selectable_groups.contains_key(candidate))
            .unwrap_or_default(),
    };

    attach_member(&mut model, parent, Ref::Group(id.clone()))?;
    model
        .selectable_groups
        .insert(id.clone(), SelectableGroup::Complex(complex));

    repo.commit(
        element,
        ElementPatch {
            selectable_groups: Some(model.selectable_groups),
            ..Default::default()
        },
    )?;
    Ok(id)
}

/// Removes one title segment. Referenced selectables and groups stay in place.
pub fn remove_title_segment<R: DocumentRepository>(
    repo: &mut R,
    element: &str,
    index: usize,
) -> Result<Segment, ConverterError> {
    let mut model = repo.get(element)?;
    check_title_index(&model, index)?;
    let removed = model.title.remove(index);
    repo.commit(
        element,
        ElementPatch {
            title: Some(model.title),
            ..Default::default()
        },
    )?;
    Ok(removed)
}

pub fn move_title_segment<R: DocumentRepository>(
    repo: &mut R,
    element: &str,
    from: usize,
    to: usize,
) -> Result<(), ConverterError> {
    let mut model = repo.get(element)?;
    check_title_index(&model, from)?;
    check_title_index(&model, to)?;
    let segment = model.title.remove(from);
    model.title.insert(to, segment);
    repo.commit(
        element,
        ElementPatch {
            title: Some(model.title),
            ..Default::default()
        },
    )
}

/// Deletes a selectable (by UUID or user-visible id) and every reference to it.
pub fn delete_selectable<R: DocumentRepository>(
    repo: &mut R,
    element: &str,
    selectable: &str,
) -> Result<Selectable, ConverterError> {
    let mut model = repo.get(element)?;
    let uuid = resolve_selectable(&model, selectable)?;
    let removed = model
        .selectables
        .remove(&uuid)
        .ok_or_else(|| ConverterError::NotFound(format!("selectable '{}'", selectable)))?;

    cascade_remove(&mut model, &Ref::Selectable(uuid));
    repo.commit(element, ElementPatch::from_model(model))?;
    Ok(removed)
}

/// Deletes a group or complex selectable and every reference to it. Members
/// of the group are left in the selectable map.
pub fn delete_selectable_group<R: DocumentRepository>(
    repo: &mut R,
    element: &str,
    group: &str,
) -> Result<SelectableGroup, ConverterError> {
    let mut model = repo.get(element)?;
    let removed = model
        .selectable_groups
        .remove(group)
        .ok_or_else(|| ConverterError::NotFound(format!("selectable group '{}'", group)))?;

    cascade_remove(&mut model, &Ref::Group(group.to_string()));
    repo.commit(element, ElementPatch::from_model(model))?;
    Ok(removed)
}

/// Renames a column of the table with the given id or UUID.
pub fn rename_tabularize_column<R: DocumentRepository>(
    repo: &mut R,
    element: &str,
    table: &str,
    field: &str,
    header: &str,
) -> Result<(), ConverterError> {
    let mut model = repo.get(element)?;
    let target = model
        .tabularize
        .iter_mut()
        .find(|(uuid, t)| t.id == table || uuid.to_string() == table)
        .map(|(_, t)| t)
        .ok_or_else(|| ConverterError::NotFound(format!("tabularize table '{}'", table)))?;
    target.rename_column(field, header)?;

    repo.commit(
        element,
        ElementPatch {
            tabularize: Some(model.tabularize),
            ..Default::default()
        },
    )
}

/// Drops every reference to `target` from the element.
pub fn cascade_remove(model: &mut ElementModel, target: &Ref) {
    for group in model.selectable_groups.values_mut() {
        match group {
            SelectableGroup::Plain(plain) => plain.groups.retain(|r| r != target),
            SelectableGroup::Complex(complex) => {
                for segment in &mut complex.description {
                    if let ComplexSegment::Groups(refs) = segment {
                        refs.retain(|r| r != target);
                    }
                }
                complex
                    .description
                    .retain(|s| !matches!(s, ComplexSegment::Groups(refs) if refs.is_empty()));
                merge_adjacent_text(&mut complex.description);
            }
        }
    }

    model.title.retain(|s| !refers_to(s, target));

    if let Some(table) = model.management_functions.as_mut() {
        for row in &mut table.rows {
            row.text_array.retain(|s| !refers_to(s, target));
        }
    }

    for table in model.tabularize.values_mut() {
        for row in &mut table.rows {
            for cell in row.values_mut() {
                if let CellValue::Segments(segments) = cell {
                    segments.retain(|s| !refers_to(s, target));
                }
            }
        }
    }
}

fn refers_to(segment: &Segment, target: &Ref) -> bool {
    match segment {
        Segment::Assignment(uuid) => target.points_at_selectable(uuid),
        Segment::Selections(id) => target.points_at_group(id),
        _ => false,
    }
}

/// Joins text entries left next to each other once a reference between
/// them is gone, the way the parser joins them on import.
fn merge_adjacent_text(description: &mut Vec<ComplexSegment>) {
    let mut merged: Vec<ComplexSegment> = Vec::with_capacity(description.len());
    for segment in description.drain(..) {
        if let ComplexSegment::Text(text) = &segment
            && let Some(ComplexSegment::Text(prev)) = merged.last_mut()
        {
            prev.push(' ');
            prev.push_str(text);
            continue;
        }
        merged.push(segment);
    }
    *description = merged;
}

fn attach_member(model: &mut ElementModel, group_id: &str, member: Ref) -> Result<(), ConverterError> {
    match model.selectable_groups.get_mut(group_id) {
        Some(SelectableGroup::Plain(plain)) => plain.groups.push(member),
        Some(SelectableGroup::Complex(complex)) => {
            complex.description.push(ComplexSegment::Groups(vec![member]))
        }
        None => {
            return Err(ConverterError::NotFound(format!(
                "selectable group '{}'",
                group_id
            )));
        }
    }
    Ok(())
}

fn insert_title_segment(
    model: &mut ElementModel,
    index: Option<usize>,
    segment: Segment,
) -> Result<(), ConverterError> {
    let len = model.title.len();
    match index {
        Some(i) if i > len => Err(ConverterError::InvalidInput(format!(
            "title index {} out of range (length {})",
            i, len
        ))),
        Some(i) => {
            model.title.insert(i, segment);
            Ok(())
        }
        None => {
            model.title.push(segment);
            Ok(())
        }
    }
}

fn check_title_index(model: &ElementModel, index: usize) -> Result<(), ConverterError> {
    if index >= model.title.len() {
        return Err(ConverterError::InvalidInput(format!(
            "title index {} out of range (length {})",
            index,
            model.title.len()
        )));
    }
    Ok(())
}

fn resolve_selectable(model: &ElementModel, key: &str) -> Result<Uuid, ConverterError> {
    if let Ok(uuid) = Uuid::parse_str(key)
        && model.selectables.contains_key(&uuid)
    {
        return Ok(uuid);
    }
    model
        .selectable_by_id(key)
        .map(|(uuid, _)| uuid)
        .ok_or_else(|| ConverterError::NotFound(format!("selectable '{}'", key)))
}

/// Next free `{element}_{n}` id.
fn next_selectable_id(model: &ElementModel) -> String {
    let prefix = format!("{}_", model.name);
    let highest = model
        .selectables
        .values()
        .filter_map(|s| s.id.strip_prefix(&prefix))
        .filter_map(|n| n.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    format!("{}{}", prefix, highest + 1)
}

fn next_group_id(model: &ElementModel) -> String {
    let highest = model
        .selectable_groups
        .keys()
        .filter_map(|k| k.strip_prefix("group-"))
        .filter_map(|n| n.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    format!("group-{}", highest + 1)
}
