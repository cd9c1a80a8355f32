//! Main library for the SFR converter.
//!
//! This crate parses the Security Functional Requirements of a Common
//! Criteria Protection Profile into the selectable/selection-group model an
//! editor works on, applies edits to that model, checks its referential
//! integrity, and renders the requirement previews.

pub mod dom;
pub mod editing;
pub mod errors;
pub mod evaluation_activity;
pub mod formats;
pub mod integrity;
pub mod management_function;
pub mod models_sfr;
pub mod preview;
pub mod repository;
pub mod rich_text;
pub mod schema;
pub mod sfr_parser;
pub mod tabularize;

use clap::ValueEnum;
use errors::ConverterError;
use log::{info, warn};
use models_sfr::{Component, SfrDocument};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// What the run writes out.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// The parsed (and edited) model as JSON
    #[default]
    Model,
    /// One rendered requirement line per element
    Preview,
}

/// Top-level configuration for a run.
#[derive(Debug, Default)]
pub struct Config {
    pub input_file: PathBuf,
    /// `None` writes to standard output.
    pub output_file: Option<PathBuf>,
    pub input_format: Option<formats::Format>,
    pub mode: OutputMode,
    /// Restricts output to the element with this name, XML id, or UUID.
    pub element: Option<String>,
    pub validate: bool,
    pub lint: bool,
    /// JSON array of edits applied before output.
    pub edits: Option<PathBuf>,
}

/// The main entry point.
///
/// Loads the document (parsing XML or reading a model), applies edits,
/// optionally validates and lints, then writes the model or previews.
pub fn run(config: Config) -> Result<(), ConverterError> {
    let start_time = Instant::now();
    info!("Starting run: {:?}", config.mode);
    info!("  Input: {}", config.input_file.display());

    let mut content = Vec::new();
    File::open(&config.input_file)
        .map_err(|e| ConverterError::Io(e, "Failed to open input file".to_string()))?
        .read_to_end(&mut content)
        .map_err(|e| ConverterError::Io(e, "Failed to read input file".to_string()))?;
    let input_format =
        formats::Format::resolve(config.input_format, &config.input_file, &content)?;
    info!("  Input format: {:?}", input_format);

    // --- 1. Load ---
    let parse_start = Instant::now();
    let mut document = match input_format {
        formats::Format::Xml => {
            let xml = formats::xml::parse(content.as_slice())?;
            sfr_parser::get_sfrs(&xml.root)
        }
        formats::Format::Json => {
            if config.validate {
                schema::validate_model_file(&config.input_file)?;
            }
            formats::json::read_model(content.as_slice())?
        }
    };
    info!("Loaded model. (Took {:.2?})", parse_start.elapsed());

    // --- 2. Edits (Optional) ---
    if let Some(path) = &config.edits {
        document = apply_edits_file(document, path)?;
    }

    // --- 3. Validation (Optional) ---
    if config.validate && input_format == formats::Format::Xml {
        let value = serde_json::to_value(formats::json::ModelEnvelope::new(document.clone()))?;
        schema::validate_value(schema::MODEL_SCHEMA, &value)?;
        info!("Parsed model conforms to the model schema.");
    }

    if let Some(key) = &config.element {
        document = select_element(document, key)?;
    }

    // --- 4. Lint (Optional) ---
    if config.lint {
        let report = integrity::check_document(&document).with_file(&config.input_file);
        if std::env::var_os("NO_COLOR").is_some() {
            report.print_plain();
        } else {
            report.print_colored();
        }
        if report.has_errors() {
            return Err(ConverterError::Validation(format!(
                "Integrity check found {} error(s)",
                report.summary.errors
            )));
        }
    }

    // --- 5. Output ---
    let writer: Box<dyn Write> = match &config.output_file {
        Some(path) => {
            info!("  Output: {}", path.display());
            let file = File::create(path)
                .map_err(|e| ConverterError::Io(e, "Failed to create output file".to_string()))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(BufWriter::new(io::stdout())),
    };

    match config.mode {
        OutputMode::Model => formats::json::write_model(writer, document)?,
        OutputMode::Preview => write_previews(writer, &document)?,
    }

    info!("Total execution time: {:.2?}", start_time.elapsed());
    Ok(())
}

fn apply_edits_file(document: SfrDocument, path: &Path) -> Result<SfrDocument, ConverterError> {
    let file = File::open(path)
        .map_err(|e| ConverterError::Io(e, "Failed to open edits file".to_string()))?;
    let requests: Vec<editing::EditRequest> = serde_json::from_reader(BufReader::new(file))?;

    let mut repo = repository::InMemoryRepository::new(document);
    let applied = editing::apply_all(&mut repo, &requests)?;
    info!("Applied {} edit(s) in {} commit(s)", applied, repo.commits());
    Ok(repo.into_document())
}

/// Keeps only the component holding `key`, reduced to that element.
fn select_element(document: SfrDocument, key: &str) -> Result<SfrDocument, ConverterError> {
    let component = document
        .components
        .into_iter()
        .find_map(|component| {
            let element = component.elements.iter().find(|e| e.matches_key(key))?.clone();
            Some(Component {
                elements: vec![element],
                ..component
            })
        })
        .ok_or_else(|| ConverterError::NotFound(format!("element '{}'", key)))?;
    Ok(SfrDocument {
        components: vec![component],
    })
}

/// Writes `<name>: <preview>` per element, then one indented line per
/// management function row.
pub fn write_previews<W: Write>(mut writer: W, document: &SfrDocument) -> Result<(), ConverterError> {
    let write_err = |e| ConverterError::Io(e, "Failed to write preview".to_string());

    for element in document.elements() {
        let preview = preview::Preview::for_element(element);
        let text = preview.get_text_string(&element.title);
        if text.is_empty() && !element.title.is_empty() {
            warn!("{} rendered an empty preview", element.name);
        }
        writeln!(writer, "{}: {}", element.name, text).map_err(write_err)?;

        if let Some(table) = &element.management_functions {
            for row in &table.rows {
                let text = preview.get_text_string(&row.text_array);
                writeln!(writer, "  {}: {}", row.id, text).map_err(write_err)?;
            }
        }
    }
    writer.flush().map_err(write_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models_sfr::{ElementModel, Segment};
    use pretty_assertions::assert_eq;

    fn document() -> SfrDocument {
        SfrDocument {
            components: vec![
                Component {
                    name: "FCS_CKM.1".to_string(),
                    elements: vec![
                        ElementModel {
                            name: "FCS_CKM.1.1".to_string(),
                            title: vec![Segment::Text("The TSF shall generate keys.".to_string())],
                            ..Default::default()
                        },
                        ElementModel {
                            name: "FCS_CKM.1.2".to_string(),
                            ..Default::default()
                        },
                    ],
                    ..Default::default()
                },
                Component {
                    name: "FCS_RBG.1".to_string(),
                    ..Default::default()
                },
            ],
        }
    }

    #[test]
    fn test_select_element_keeps_one() {
        let doc = select_element(document(), "fcs_ckm.1.2").unwrap();
        assert_eq!(doc.components.len(), 1);
        assert_eq!(doc.components[0].name, "FCS_CKM.1");
        assert_eq!(doc.components[0].elements.len(), 1);
        assert_eq!(doc.components[0].elements[0].name, "FCS_CKM.1.2");
        assert!(select_element(document(), "FOO.1.1").is_err());
    }

    #[test]
    fn test_write_previews() {
        let mut out = Vec::new();
        write_previews(&mut out, &document()).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "FCS_CKM.1.1: The TSF shall generate keys.\nFCS_CKM.1.2: \n"
        );
    }
}
