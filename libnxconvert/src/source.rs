//! Uniform access to ingested input files.
//!
//! Every input ends up behind a [`DataSource`]: flat maps for ELN files and
//! partner formats, a lazily read tree for HDF5 files. Partner formats plug in
//! through the [`FileIngest`] trait and are dispatched on the lowercased file
//! extension.
use indexmap::IndexMap;
use regex::Regex;
use std::path::{Path, PathBuf};

use super::concept_path;
use super::constants::ENTRY_PLACEHOLDER;
use super::error::SourceError;
use super::expression::WILDCARD;
use super::nested::{flatten, KeyMap, Nested};
use super::value::Value;

pub trait DataSource {
    /// Short name used in log messages
    fn name(&self) -> &str;

    /// Value stored at a flattened path
    fn get(&self, path: &str) -> Option<Value>;

    /// Attribute lookup; accepts `/obj/@attr` as well as `/obj/attr`
    fn get_attr(&self, path: &str) -> Option<Value> {
        if concept_path::is_attribute_path(path) {
            return self.get(path);
        }
        let parent = concept_path::parent(path)?;
        let attribute = concept_path::join(parent, &format!("@{}", concept_path::last_segment(path)));
        self.get(&attribute).or_else(|| self.get(path))
    }

    /// Names the `*` of a pattern such as `/axes/*` stands for
    fn get_dims(&self, pattern: &str) -> Vec<String>;

    /// Values whose keys are already template paths, written into the
    /// template before the mapping config is applied
    fn canonical_entries(&self) -> Vec<(String, Value)> {
        Vec::new()
    }
}

/// Normalize a lookup key to a rooted path
pub fn rooted(path: &str) -> String {
    if concept_path::is_absolute(path) {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// True for keys such as `/ENTRY[entry]/title`
pub fn is_canonical(path: &str) -> bool {
    path.starts_with(&format!("/{ENTRY_PLACEHOLDER}["))
}

/// Names matched by the `*` of a pattern among a set of keys, in key order
pub fn expand_pattern<'a>(pattern: &str, keys: impl Iterator<Item = &'a str>) -> Vec<String> {
    let pattern = rooted(pattern);
    let expression = format!(
        "^{}$",
        regex::escape(&pattern).replace(&regex::escape(&WILDCARD.to_string()), "([^/]+)")
    );
    let Ok(matcher) = Regex::new(&expression) else {
        return Vec::new();
    };
    let mut names: Vec<String> = Vec::new();
    for key in keys {
        if let Some(name) = matcher.captures(key).and_then(|c| c.get(1)) {
            if !names.iter().any(|n| n == name.as_str()) {
                names.push(name.as_str().to_string());
            }
        }
    }
    names
}

/// A source backed by a flattened map
#[derive(Debug, Clone, Default)]
pub struct FlatSource {
    name: String,
    entries: IndexMap<String, Value>,
}

impl FlatSource {
    pub fn new(name: &str, entries: IndexMap<String, Value>) -> Self {
        Self {
            name: name.to_string(),
            entries: entries
                .into_iter()
                .map(|(k, v)| (rooted(&k), v))
                .collect(),
        }
    }

    pub fn from_nested(name: &str, nested: &Nested, key_map: &KeyMap) -> Self {
        Self::new(name, flatten(nested, key_map))
    }

    pub fn insert(&mut self, path: &str, value: Value) {
        self.entries.insert(rooted(path), value);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl DataSource for FlatSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, path: &str) -> Option<Value> {
        self.entries.get(&rooted(path)).cloned()
    }

    fn get_dims(&self, pattern: &str) -> Vec<String> {
        expand_pattern(pattern, self.keys())
    }

    fn canonical_entries(&self) -> Vec<(String, Value)> {
        self.entries
            .iter()
            .filter(|(k, _)| is_canonical(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Parser for one partner file format
pub trait FileIngest {
    /// Name used in log messages and errors
    fn name(&self) -> &str;

    /// Lowercased extensions without the dot
    fn extensions(&self) -> &[&str];

    fn ingest(&self, path: &Path) -> Result<Box<dyn DataSource>, SourceError>;
}

/// Partner formats known to a conversion, looked up by extension
#[derive(Default)]
pub struct IngestRegistry {
    adapters: Vec<Box<dyn FileIngest>>,
}

impl IngestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Box<dyn FileIngest>) {
        self.adapters.push(adapter);
    }

    pub fn find(&self, extension: &str) -> Option<&dyn FileIngest> {
        let extension = extension.to_lowercase();
        self.adapters
            .iter()
            .find(|a| a.extensions().iter().any(|e| *e == extension))
            .map(|a| a.as_ref())
    }

    /// Ingest a file with the adapter registered for its extension
    pub fn ingest(&self, path: &Path) -> Result<Box<dyn DataSource>, SourceError> {
        if !path.exists() {
            return Err(SourceError::BadFilePath(path.to_path_buf()));
        }
        let extension = extension_of(path);
        let adapter = self
            .find(&extension)
            .ok_or_else(|| SourceError::UnsupportedExtension(extension.clone()))?;
        log::info!("Reading {} with {}", path.display(), adapter.name());
        adapter.ingest(path)
    }
}

/// Lowercased extension of a file, empty when there is none
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn processing_rank(path: &Path) -> u8 {
    match extension_of(path).as_str() {
        "yaml" | "yml" => 1,
        "json" => 2,
        _ => 0,
    }
}

/// Order input files for processing: partner files sorted by file name, then
/// YAML, then JSON
pub fn order_input_files(files: &[PathBuf]) -> Vec<PathBuf> {
    let mut ordered = files.to_vec();
    ordered.sort_by(|a, b| {
        let rank = processing_rank(a).cmp(&processing_rank(b));
        match processing_rank(a) {
            0 => rank.then_with(|| a.file_name().cmp(&b.file_name())),
            _ => rank,
        }
    });
    ordered
}
