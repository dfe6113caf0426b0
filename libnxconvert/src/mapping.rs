//! The mapping config: a JSON document whose keys are concept paths and whose
//! values are expressions telling the resolver where each value comes from.
//!
//! Nested objects are flattened by joining keys with `/`, so
//! `{"/ENTRY[entry]": {"title": "@eln"}}` and `{"/ENTRY[entry]/title": "@eln"}`
//! are the same config. Objects with a `link` or `compress` key are descriptors
//! and are not flattened further.
use indexmap::IndexMap;
use std::path::Path;

use super::concept_path;
use super::error::MappingError;
use super::expression::Expression;
use super::value::Value;

#[derive(Debug, Clone, Default)]
pub struct MappingConfig {
    entries: IndexMap<String, Expression>,
}

impl MappingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a mapping config file
    pub fn read_config_file(path: &Path) -> Result<Self, MappingError> {
        if !path.exists() {
            return Err(MappingError::BadFilePath(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&text)?;
        log::info!(
            "Loaded {} mapping config entries from {}",
            config.len(),
            path.display()
        );
        Ok(config)
    }

    pub fn from_json_str(text: &str) -> Result<Self, MappingError> {
        let json: serde_json::Value = serde_json::from_str(text)?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &serde_json::Value) -> Result<Self, MappingError> {
        let mut config = Self::new();
        match json {
            serde_json::Value::Object(object) => {
                for (key, value) in object {
                    config.flatten_entry(key, value)?;
                }
                Ok(config)
            }
            other => Err(MappingError::MalformedExpression {
                path: String::from("/"),
                reason: format!("config must be an object, found {other}"),
            }),
        }
    }

    fn flatten_entry(&mut self, path: &str, value: &serde_json::Value) -> Result<(), MappingError> {
        if !concept_path::is_absolute(path) {
            return Err(MappingError::RelativeKey(path.to_string()));
        }
        let expression = match value {
            serde_json::Value::Null => return Ok(()),
            serde_json::Value::String(text) => Expression::parse(path, text)?,
            serde_json::Value::Object(object) => match Expression::parse_descriptor(path, object)? {
                Some(expression) => expression,
                None => {
                    for (key, child) in object {
                        self.flatten_entry(&concept_path::join(path, key), child)?;
                    }
                    return Ok(());
                }
            },
            other => Expression::Literal(Value::from_json(other).ok_or_else(|| {
                MappingError::MalformedExpression {
                    path: path.to_string(),
                    reason: format!("{other} is not a rectangular array"),
                }
            })?),
        };
        self.insert(path, expression);
        Ok(())
    }

    pub fn insert(&mut self, path: &str, expression: Expression) {
        self.entries.insert(path.to_string(), expression);
    }

    pub fn get(&self, path: &str) -> Option<&Expression> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Expression)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
