//! Electronic lab notebook exports (YAML).
//!
//! An ELN file is flattened twice: once as written (raw keys such as
//! `/Sample/name`) and once through the key tables (canonical keys such as
//! `/SAMPLE[sample]/name`). Lookups try the canonical form first. The reserved
//! top level fields `definition` and `entry_names` select the application
//! definition and the entries to fill.
use indexmap::IndexMap;
use std::path::Path;

use super::error::SourceError;
use super::nested::{flatten, KeyMap, Nested};
use super::source::{expand_pattern, is_canonical, rooted, DataSource};
use super::value::{Array, Value};

const DEFINITION_FIELD: &str = "definition";
const ENTRY_NAMES_FIELD: &str = "entry_names";

#[derive(Debug, Clone, Default)]
pub struct ElnSource {
    name: String,
    raw: IndexMap<String, Value>,
    canonical: IndexMap<String, Value>,
    definition: Option<String>,
    entry_names: Vec<String>,
}

impl ElnSource {
    pub fn read_eln_file(path: &Path, key_map: &KeyMap) -> Result<Self, SourceError> {
        if !path.exists() {
            return Err(SourceError::BadFilePath(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        let eln = Self::from_yaml_str(&path.display().to_string(), &text, key_map)?;
        log::info!(
            "Read {} values from ELN file {}",
            eln.raw.len(),
            path.display()
        );
        Ok(eln)
    }

    pub fn from_yaml_str(name: &str, text: &str, key_map: &KeyMap) -> Result<Self, SourceError> {
        let yaml: serde_yaml::Value = serde_yaml::from_str(text)?;
        Ok(Self::from_nested(name, &Nested::from_yaml(&yaml), key_map))
    }

    pub fn from_nested(name: &str, nested: &Nested, key_map: &KeyMap) -> Self {
        let raw = flatten(nested, &KeyMap::new());
        let canonical = flatten(nested, key_map);
        let definition = match raw.get(&rooted(DEFINITION_FIELD)) {
            Some(Value::Str(definition)) => Some(definition.clone()),
            _ => None,
        };
        let entry_names = match raw.get(&rooted(ENTRY_NAMES_FIELD)) {
            Some(Value::Str(name)) => vec![name.clone()],
            Some(Value::Array(Array::Str(names))) => names.iter().cloned().collect(),
            _ => Vec::new(),
        };
        Self {
            name: name.to_string(),
            raw,
            canonical,
            definition,
            entry_names,
        }
    }

    /// Application definition named by the notebook, if any
    pub fn definition(&self) -> Option<&str> {
        self.definition.as_deref()
    }

    pub fn entry_names(&self) -> &[String] {
        &self.entry_names
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

impl DataSource for ElnSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, path: &str) -> Option<Value> {
        let key = rooted(path);
        self.canonical
            .get(&key)
            .or_else(|| self.raw.get(&key))
            .cloned()
    }

    fn get_dims(&self, pattern: &str) -> Vec<String> {
        let mut names = expand_pattern(pattern, self.canonical.keys().map(String::as_str));
        for name in expand_pattern(pattern, self.raw.keys().map(String::as_str)) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    fn canonical_entries(&self) -> Vec<(String, Value)> {
        self.canonical
            .iter()
            .filter(|(k, _)| is_canonical(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::write_file;

    const ELN: &str = "
definition: NXtest
entry_names: [scan_1, scan_2]
title: Run 42
Sample:
  name: quartz
  thickness:
    value: 0.5
    unit: mm
/ENTRY[entry]/mode: fast
";

    #[test]
    fn test_raw_and_canonical_lookups() {
        let key_map = KeyMap::new().translate("Sample", "SAMPLE[sample]");
        let eln = ElnSource::from_yaml_str("eln.yaml", ELN, &key_map).unwrap();
        assert_eq!(eln.definition(), Some("NXtest"));
        assert_eq!(eln.entry_names(), ["scan_1", "scan_2"]);
        assert_eq!(eln.get("title"), Some(Value::from("Run 42")));
        assert_eq!(eln.get("/SAMPLE[sample]/name"), Some(Value::from("quartz")));
        assert_eq!(eln.get("/Sample/name"), Some(Value::from("quartz")));
        assert_eq!(
            eln.get_attr("/SAMPLE[sample]/thickness/units"),
            Some(Value::from("mm"))
        );
        assert_eq!(
            eln.canonical_entries(),
            vec![(String::from("/ENTRY[entry]/mode"), Value::from("fast"))]
        );
    }

    #[test]
    fn test_read_eln_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "eln.yaml", ELN);
        let eln = ElnSource::read_eln_file(&path, &KeyMap::new()).unwrap();
        assert_eq!(eln.get("/Sample/thickness"), Some(Value::Float(0.5)));
        assert!(matches!(
            ElnSource::read_eln_file(&dir.path().join("missing.yaml"), &KeyMap::new()),
            Err(SourceError::BadFilePath(_))
        ));
    }
}
