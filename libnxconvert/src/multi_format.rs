//! The multi-format reader: turns a set of input files into a filled template.
//!
//! Files are read in processing order (partner formats, then YAML, then
//! JSON). YAML files are ELN exports, JSON files are mapping configs, anything
//! else goes through the ingest registry. Sources whose keys are already
//! template paths are copied in directly; the mapping config then resolves
//! everything else through the [`Callbacks`] implemented here.
use std::path::{Path, PathBuf};

use super::concept_path;
use super::constants::DEFAULT_ENTRY_NAME;
use super::diagnostics::{Diagnostic, DiagnosticCode, Report};
use super::eln::ElnSource;
use super::error::ConvertError;
use super::mapping::MappingConfig;
use super::nested::KeyMap;
use super::resolver::{fill_from_config, Callbacks};
use super::source::{extension_of, order_input_files, DataSource, IngestRegistry};
use super::template::Template;
use super::value::Value;

#[derive(Default)]
pub struct MultiFormatReader {
    elns: Vec<ElnSource>,
    sources: Vec<Box<dyn DataSource>>,
    config: MappingConfig,
    entry_names: Vec<String>,
}

impl MultiFormatReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read every file in processing order
    pub fn read_files(
        files: &[PathBuf],
        registry: &IngestRegistry,
        key_map: &KeyMap,
    ) -> Result<Self, ConvertError> {
        let mut reader = Self::new();
        for path in order_input_files(files) {
            reader.add_file(&path, registry, key_map)?;
        }
        log::info!(
            "Read {} ELN files, {} data files and {} config entries",
            reader.elns.len(),
            reader.sources.len(),
            reader.config.len()
        );
        Ok(reader)
    }

    pub fn add_file(
        &mut self,
        path: &Path,
        registry: &IngestRegistry,
        key_map: &KeyMap,
    ) -> Result<(), ConvertError> {
        match extension_of(path).as_str() {
            "yaml" | "yml" => self.add_eln(ElnSource::read_eln_file(path, key_map)?),
            "json" => {
                let config = MappingConfig::read_config_file(path)?;
                for (key, expression) in config.iter() {
                    self.config.insert(key, expression.clone());
                }
            }
            _ => self.add_source(registry.ingest(path)?),
        }
        Ok(())
    }

    pub fn add_eln(&mut self, eln: ElnSource) {
        self.elns.push(eln);
    }

    pub fn add_source(&mut self, source: Box<dyn DataSource>) {
        self.sources.push(source);
    }

    pub fn set_config(&mut self, config: MappingConfig) {
        self.config = config;
    }

    /// Entry names given by the caller win over those named in ELN files
    pub fn set_entry_names(&mut self, entry_names: Vec<String>) {
        self.entry_names = entry_names;
    }

    /// Application definition named by the last ELN file that names one
    pub fn definition(&self) -> Option<&str> {
        self.elns.iter().rev().find_map(ElnSource::definition)
    }

    /// Copy canonical source keys into the template, then resolve the config
    pub fn fill(&self, template: &mut Template) -> Report {
        let mut report = self.direct_fill(template);
        report.merge(fill_from_config(template, &self.config, self));
        report
    }

    /// Keys of the default entry are copied once per requested entry
    fn direct_fill(&self, template: &mut Template) -> Report {
        let mut report = Report::new();
        let entries = self.get_entry_names();
        let canonical = self
            .sources
            .iter()
            .map(|s| (s.name(), s.canonical_entries()))
            .chain(self.elns.iter().map(|e| (e.name(), e.canonical_entries())));
        for (name, values) in canonical {
            log::debug!("Copying {} template paths from {name}", values.len());
            for (path, value) in values {
                let targets: Vec<String> = match concept_path::entry_of(&path) {
                    Some(DEFAULT_ENTRY_NAME) => entries
                        .iter()
                        .map(|entry| concept_path::with_entry(&path, entry))
                        .collect(),
                    _ => vec![path.clone()],
                };
                for target in targets {
                    if let Err(e) = template.set(&target, value.clone()) {
                        log::warn!("{e}");
                        report.push(Diagnostic::warning(
                            &target,
                            DiagnosticCode::ConflictOnWrite,
                            e.to_string(),
                        ));
                    }
                }
            }
        }
        report
    }
}

impl Callbacks for MultiFormatReader {
    fn get_data(&self, key: &str) -> Option<Value> {
        self.sources.iter().rev().find_map(|s| s.get(key))
    }

    fn get_attr(&self, key: &str) -> Option<Value> {
        self.sources.iter().rev().find_map(|s| s.get_attr(key))
    }

    fn get_eln_data(&self, key: &str) -> Option<Value> {
        self.elns.iter().rev().find_map(|e| e.get(key))
    }

    fn get_data_dims(&self, pattern: &str) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for source in &self.sources {
            for name in source.get_dims(pattern) {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }

    fn get_entry_names(&self) -> Vec<String> {
        if !self.entry_names.is_empty() {
            return self.entry_names.clone();
        }
        match self.elns.iter().rev().find(|e| !e.entry_names().is_empty()) {
            Some(eln) => eln.entry_names().to_vec(),
            None => vec![DEFAULT_ENTRY_NAME.to_string()],
        }
    }
}
