//! Tabularized selections.
//!
//! A `<selectables>` node holding a `<tabularize>` header describes a table:
//! the header lists columns (`textcol`, `selectcol`) interleaved with
//! requirement text (`reqtext`), and each following `<selectable>` is a row
//! whose `<col>` children fill the columns in order.

use crate::dom::{XmlElement, XmlNode};
use crate::errors::ConverterError;
use crate::models_sfr::{
    CellValue, ColumnDefinition, ColumnKind, GridColumn, Segment, Selectable, TabularizeRow,
    TabularizeTable,
};
use crate::rich_text::{escape_lt_sign, remove_whitespace, to_camel_case};
use crate::sfr_parser::{ElementContext, check_nested_groups, process_selectables};
use log::debug;
use uuid::Uuid;

pub const SELECTABLE_ID_HEADER: &str = "Selectable ID";
pub const SELECTABLE_ID_FIELD: &str = "selectableId";

/// Grid field name for a column header.
pub fn field_name(header: &str) -> String {
    match header {
        "" => String::new(),
        SELECTABLE_ID_HEADER => SELECTABLE_ID_FIELD.to_string(),
        other => to_camel_case(other),
    }
}

/// Requirement text rendered above the table: `reqtext` verbatim and each
/// column header in italics.
pub fn definition_string(definition: &[ColumnDefinition]) -> String {
    definition
        .iter()
        .filter(|d| d.value != SELECTABLE_ID_HEADER)
        .map(|d| match d.kind {
            ColumnKind::Reqtext => d.value.trim().to_string(),
            _ => format!("<i>{}</i>", d.value.trim()),
        })
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parses a tabularized `<selectables>` node.
pub fn parse_tabularize(node: &XmlElement, ctx: &mut ElementContext) -> (Uuid, TabularizeTable) {
    let uuid = Uuid::new_v4();
    let mut table = TabularizeTable::default();

    for child in node.child_elements() {
        if child.is("tabularize") {
            table = parse_header(child, ctx);
        } else if child.is("selectable") {
            let row = parse_row(child, &table.definition, ctx);
            table.rows.push(row);
        }
    }

    table.definition_string = definition_string(&table.definition);
    debug!(
        "Tabularize {} has {} columns and {} rows",
        table.id,
        table.columns.len(),
        table.rows.len()
    );
    (uuid, table)
}

fn parse_header(header: &XmlElement, ctx: &mut ElementContext) -> TabularizeTable {
    let id = match header.non_empty_attr("id") {
        Some(id) => id.to_string(),
        None => ctx.next_selectable_id(),
    };

    let mut definition = vec![ColumnDefinition {
        value: SELECTABLE_ID_HEADER.to_string(),
        kind: ColumnKind::Textcol,
    }];
    let mut columns = vec![GridColumn {
        header_name: SELECTABLE_ID_HEADER.to_string(),
        field: SELECTABLE_ID_FIELD.to_string(),
        kind: ColumnKind::Textcol,
    }];

    for entry in header.child_elements() {
        let Some(kind) = ColumnKind::from_tag(entry.local_name()) else {
            continue;
        };
        let value = entry.text_content();
        if kind.is_column() {
            columns.push(GridColumn {
                header_name: value.clone(),
                field: to_camel_case(&value),
                kind,
            });
        }
        definition.push(ColumnDefinition { value, kind });
    }

    TabularizeTable {
        id,
        title: header.attr("title").unwrap_or_default().to_string(),
        definition_string: String::new(),
        definition,
        columns,
        rows: Vec::new(),
    }
}

fn parse_row(
    selectable: &XmlElement,
    definition: &[ColumnDefinition],
    ctx: &mut ElementContext,
) -> TabularizeRow {
    let mut row = TabularizeRow::new();
    row.insert(
        SELECTABLE_ID_FIELD.to_string(),
        CellValue::Text(selectable.attr("id").unwrap_or_default().to_string()),
    );

    let data_columns: Vec<&ColumnDefinition> = definition
        .iter()
        .filter(|d| d.kind.is_column() && d.value != SELECTABLE_ID_HEADER)
        .collect();

    // Comments and stray elements do not advance the column index.
    let mut column = 0;
    for col in selectable.direct_children("col") {
        let Some(def) = data_columns.get(column) else {
            break;
        };
        let field = to_camel_case(&def.value);
        let cell = match def.kind {
            ColumnKind::Selectcol => CellValue::Segments(parse_select_cell(col, ctx)),
            _ => CellValue::Text(col.text_content()),
        };
        row.insert(field, cell);
        column += 1;
    }

    row
}

fn parse_select_cell(col: &XmlElement, ctx: &mut ElementContext) -> Vec<Segment> {
    let mut segments = Vec::new();
    for child in &col.children {
        match child {
            XmlNode::Text(t) => {
                let text = remove_whitespace(&escape_lt_sign(t));
                if !text.is_empty() {
                    segments.push(Segment::Text(text));
                }
            }
            XmlNode::Element(e) if e.is("selectables") => {
                let group = process_selectables(e, ctx);
                check_nested_groups(&group, &mut ctx.selectable_groups);
                segments.push(Segment::Selections(group.id));
            }
            XmlNode::Element(e) if e.is("assignable") => {
                let uuid = Uuid::new_v4();
                let id = match e.non_empty_attr("id") {
                    Some(id) => id.to_string(),
                    None => ctx.next_selectable_id(),
                };
                let description = remove_whitespace(&escape_lt_sign(&e.text_content()));
                ctx.selectables
                    .insert(uuid, Selectable::assignment(id, description));
                segments.push(Segment::Assignment(uuid));
            }
            _ => {}
        }
    }
    segments
}

/// A problem with one definition entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionError {
    pub index: usize,
    pub message: String,
}

/// Checks that every entry has a value and that column headers are unique
/// (case-insensitively). Requirement text may repeat.
pub fn validate_definition(definition: &[ColumnDefinition]) -> Vec<DefinitionError> {
    definition
        .iter()
        .enumerate()
        .filter_map(|(index, def)| {
            let message = if def.value.is_empty() {
                "Field required"
            } else if def.kind.is_column()
                && definition.iter().enumerate().any(|(other, d)| {
                    other != index && d.kind.is_column() && d.value.eq_ignore_ascii_case(&def.value)
                })
            {
                "Field already exists"
            } else {
                return None;
            };
            Some(DefinitionError {
                index,
                message: message.to_string(),
            })
        })
        .collect()
}

/// Column-major view of a table, one entry per definition item.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnView {
    pub value: String,
    pub kind: ColumnKind,
    pub field: Option<String>,
    pub cells: Vec<Option<CellValue>>,
    /// Kind changes are locked once rows exist.
    pub select_disabled: bool,
}

pub fn column_views(table: &TabularizeTable) -> Vec<ColumnView> {
    table
        .definition
        .iter()
        .map(|def| {
            if def.kind == ColumnKind::Reqtext {
                return ColumnView {
                    value: def.value.clone(),
                    kind: def.kind,
                    field: None,
                    cells: Vec::new(),
                    select_disabled: false,
                };
            }
            let field = field_name(&def.value);
            ColumnView {
                value: def.value.clone(),
                kind: def.kind,
                cells: table.rows.iter().map(|r| r.get(&field).cloned()).collect(),
                field: Some(field),
                select_disabled: !table.rows.is_empty(),
            }
        })
        .collect()
}

impl TabularizeTable {
    /// Renames a column header, re-keying its field in every row.
    pub fn rename_column(&mut self, field: &str, new_header: &str) -> Result<(), ConverterError> {
        if field == SELECTABLE_ID_FIELD {
            return Err(ConverterError::InvalidInput(
                "the Selectable ID column cannot be renamed".to_string(),
            ));
        }
        let new_header = new_header.trim();
        if new_header.is_empty() {
            return Err(ConverterError::InvalidInput("Field required".to_string()));
        }

        let position = self
            .columns
            .iter()
            .position(|c| c.field == field)
            .ok_or_else(|| ConverterError::NotFound(format!("column '{}' in {}", field, self.id)))?;

        let old_header = self.columns[position].header_name.clone();
        let duplicate = self.columns.iter().enumerate().any(|(i, c)| {
            i != position && c.header_name.eq_ignore_ascii_case(new_header)
        });
        if duplicate {
            return Err(ConverterError::InvalidInput(format!(
                "Field already exists: {}",
                new_header
            )));
        }

        let new_field = field_name(new_header);
        let field_taken = self
            .columns
            .iter()
            .enumerate()
            .any(|(i, c)| i != position && c.field == new_field);
        if field_taken {
            return Err(ConverterError::InvalidInput(format!(
                "Field already exists: {}",
                new_field
            )));
        }

        let column = &mut self.columns[position];
        column.header_name = new_header.to_string();
        column.field = new_field.clone();

        if let Some(def) = self
            .definition
            .iter_mut()
            .find(|d| d.kind.is_column() && d.value == old_header)
        {
            def.value = new_header.to_string();
        }

        for row in &mut self.rows {
            if let Some(cell) = row.remove(field) {
                row.insert(new_field.clone(), cell);
            }
        }

        self.definition_string = definition_string(&self.definition);
        Ok(())
    }
}
