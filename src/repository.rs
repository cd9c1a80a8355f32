//! Read/commit access to per-element models.
//!
//! Edits never touch a model in place: they `get` a copy, change it, and
//! `commit` whole replacement fields through an [`ElementPatch`], so a reader
//! never observes a half-applied edit.

use crate::errors::ConverterError;
use crate::models_sfr::{
    ElementModel, ManagementFunctionTable, Segment, SelectableGroup, Selectable, SfrDocument,
    TabularizeTable,
};
use log::debug;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Full-field replacements for one element. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementPatch {
    pub selectables: Option<BTreeMap<Uuid, Selectable>>,
    pub selectable_groups: Option<BTreeMap<String, SelectableGroup>>,
    pub title: Option<Vec<Segment>>,
    pub tabularize: Option<BTreeMap<Uuid, TabularizeTable>>,
    pub management_functions: Option<ManagementFunctionTable>,
}

impl ElementPatch {
    /// A patch replacing every editable field with the values from `model`.
    pub fn from_model(model: ElementModel) -> Self {
        Self {
            selectables: Some(model.selectables),
            selectable_groups: Some(model.selectable_groups),
            title: Some(model.title),
            tabularize: Some(model.tabularize),
            management_functions: model.management_functions,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.selectables.is_none()
            && self.selectable_groups.is_none()
            && self.title.is_none()
            && self.tabularize.is_none()
            && self.management_functions.is_none()
    }

    pub fn apply_to(self, model: &mut ElementModel) {
        if let Some(selectables) = self.selectables {
            model.selectables = selectables;
        }
        if let Some(groups) = self.selectable_groups {
            model.selectable_groups = groups;
        }
        if let Some(title) = self.title {
            model.title = title;
        }
        if let Some(tabularize) = self.tabularize {
            model.tabularize = tabularize;
        }
        if let Some(table) = self.management_functions {
            model.management_functions = Some(table);
        }
    }
}

pub trait DocumentRepository {
    /// A copy of the element named by derived name, XML id, or UUID.
    fn get(&self, element_key: &str) -> Result<ElementModel, ConverterError>;

    /// Applies `patch` to the element atomically.
    fn commit(&mut self, element_key: &str, patch: ElementPatch) -> Result<(), ConverterError>;
}

/// Repository over a parsed document held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository {
    document: SfrDocument,
    commits: usize,
}

impl InMemoryRepository {
    pub fn new(document: SfrDocument) -> Self {
        Self {
            document,
            commits: 0,
        }
    }

    pub fn into_document(self) -> SfrDocument {
        self.document
    }

    /// Number of non-empty commits applied so far.
    pub fn commits(&self) -> usize {
        self.commits
    }
}

impl DocumentRepository for InMemoryRepository {
    fn get(&self, element_key: &str) -> Result<ElementModel, ConverterError> {
        self.document
            .element(element_key)
            .cloned()
            .ok_or_else(|| ConverterError::NotFound(format!("element '{}'", element_key)))
    }

    fn commit(&mut self, element_key: &str, patch: ElementPatch) -> Result<(), ConverterError> {
        let element = self
            .document
            .element_mut(element_key)
            .ok_or_else(|| ConverterError::NotFound(format!("element '{}'", element_key)))?;
        if patch.is_empty() {
            return Ok(());
        }
        patch.apply_to(element);
        self.commits += 1;
        debug!("Committed patch #{} to {}", self.commits, element_key);
        Ok(())
    }
}
