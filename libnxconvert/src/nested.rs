//! Nested documents (ELN YAML, partner metadata, HDF5 attribute trees) and
//! their flattening into path keyed maps.
use fxhash::FxHashMap;
use indexmap::IndexMap;

use super::concept_path::{self, Segment};
use super::constants::UNITS_ATTR;
use super::value::Value;

const VALUE_KEY: &str = "value";
const UNIT_KEYS: [&str; 2] = ["unit", "units"];
const RECORD_NAME_KEY: &str = "name";

#[derive(Debug, Clone, PartialEq)]
pub enum Nested {
    Null,
    Leaf(Value),
    /// A value with a unit label
    Quantity { value: Value, unit: String },
    Map(IndexMap<String, Nested>),
    /// A list of mappings, each becoming its own instance when flattened
    Records(Vec<IndexMap<String, Nested>>),
}

impl Nested {
    pub fn from_yaml(yaml: &serde_yaml::Value) -> Self {
        match yaml {
            serde_yaml::Value::Null => Self::Null,
            serde_yaml::Value::Mapping(mapping) => {
                let map: IndexMap<String, Nested> = mapping
                    .iter()
                    .filter_map(|(k, v)| yaml_key(k).map(|k| (k, Self::from_yaml(v))))
                    .collect();
                Self::from_map(map)
            }
            serde_yaml::Value::Sequence(items)
                if !items.is_empty() && items.iter().all(serde_yaml::Value::is_mapping) =>
            {
                Self::Records(
                    items
                        .iter()
                        .filter_map(|item| match Self::from_yaml(item) {
                            Self::Map(map) => Some(map),
                            Self::Quantity { value, unit } => Some(quantity_map(value, unit)),
                            _ => None,
                        })
                        .collect(),
                )
            }
            serde_yaml::Value::Tagged(tagged) => Self::from_yaml(&tagged.value),
            other => match Value::from_yaml(other) {
                Some(value) => Self::Leaf(value),
                None => {
                    log::warn!("Skipping a value that is not rectangular: {other:?}");
                    Self::Null
                }
            },
        }
    }

    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Object(object) => {
                let map: IndexMap<String, Nested> = object
                    .iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect();
                Self::from_map(map)
            }
            serde_json::Value::Array(items)
                if !items.is_empty() && items.iter().all(serde_json::Value::is_object) =>
            {
                Self::Records(
                    items
                        .iter()
                        .filter_map(|item| match Self::from_json(item) {
                            Self::Map(map) => Some(map),
                            Self::Quantity { value, unit } => Some(quantity_map(value, unit)),
                            _ => None,
                        })
                        .collect(),
                )
            }
            other => match Value::from_json(other) {
                Some(value) => Self::Leaf(value),
                None => {
                    log::warn!("Skipping a value that is not rectangular: {other}");
                    Self::Null
                }
            },
        }
    }

    /// A map holding exactly a value and its unit is a quantity
    fn from_map(map: IndexMap<String, Nested>) -> Self {
        if map.len() == 2 {
            let value = match map.get(VALUE_KEY) {
                Some(Self::Leaf(value)) => Some(value),
                _ => None,
            };
            let unit = UNIT_KEYS.iter().find_map(|k| match map.get(*k) {
                Some(Self::Leaf(Value::Str(unit))) => Some(unit),
                _ => None,
            });
            if let (Some(value), Some(unit)) = (value, unit) {
                return Self::Quantity {
                    value: value.clone(),
                    unit: unit.clone(),
                };
            }
        }
        Self::Map(map)
    }
}

fn quantity_map(value: Value, unit: String) -> IndexMap<String, Nested> {
    IndexMap::from([
        (VALUE_KEY.to_string(), Nested::Leaf(value)),
        (UNIT_KEYS[0].to_string(), Nested::Leaf(Value::Str(unit))),
    ])
}

fn yaml_key(key: &serde_yaml::Value) -> Option<String> {
    match key {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Tables remapping keys of a nested document to canonical path segments
#[derive(Debug, Clone, Default)]
pub struct KeyMap {
    /// Whole keys replaced by canonical segments, e.g. `Sample` -> `SAMPLE[sample]`
    pub translations: FxHashMap<String, String>,
    /// Substrings replaced in every flattened path, applied in order
    pub replacements: Vec<(String, String)>,
}

impl KeyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn translate(mut self, key: &str, segment: &str) -> Self {
        self.translations.insert(key.to_string(), segment.to_string());
        self
    }

    pub fn replace(mut self, from: &str, to: &str) -> Self {
        self.replacements.push((from.to_string(), to.to_string()));
        self
    }

    /// Build from nested tables such as
    /// `{"Sample": "SAMPLE[sample]", "Instrument": {"Beam": "BEAM[beam]"}}`.
    ///
    /// Top level string entries are key translations; nested entries become
    /// substring replacements of the joined path.
    pub fn from_yaml(yaml: &serde_yaml::Value) -> Self {
        let mut key_map = Self::new();
        if let serde_yaml::Value::Mapping(mapping) = yaml {
            for (key, value) in mapping {
                let Some(key) = yaml_key(key) else { continue };
                match value {
                    serde_yaml::Value::String(segment) => {
                        key_map.translations.insert(key, segment.clone());
                    }
                    serde_yaml::Value::Mapping(_) => {
                        collect_replacements(&format!("/{key}"), value, &mut key_map.replacements)
                    }
                    _ => (),
                }
            }
        }
        key_map
    }

    fn segment<'a>(&'a self, key: &'a str) -> &'a str {
        self.translations.get(key).map(String::as_str).unwrap_or(key)
    }

    fn rewrite(&self, path: String) -> String {
        self.replacements
            .iter()
            .fold(path, |path, (from, to)| path.replace(from.as_str(), to))
    }
}

fn collect_replacements(prefix: &str, yaml: &serde_yaml::Value, out: &mut Vec<(String, String)>) {
    if let serde_yaml::Value::Mapping(mapping) = yaml {
        for (key, value) in mapping {
            let Some(key) = yaml_key(key) else { continue };
            let from = format!("{prefix}/{key}");
            match value {
                serde_yaml::Value::String(segment) => {
                    out.push((from, format!("{prefix}/{segment}")));
                }
                serde_yaml::Value::Mapping(_) => collect_replacements(&from, value, out),
                _ => (),
            }
        }
    }
}

/// Flatten a nested document into `/`-joined keys
pub fn flatten(nested: &Nested, key_map: &KeyMap) -> IndexMap<String, Value> {
    let mut out = IndexMap::new();
    walk("", nested, key_map, &mut out);
    if key_map.replacements.is_empty() {
        return out;
    }
    out.into_iter()
        .map(|(path, value)| (key_map.rewrite(path), value))
        .collect()
}

fn walk(prefix: &str, nested: &Nested, key_map: &KeyMap, out: &mut IndexMap<String, Value>) {
    match nested {
        Nested::Null => (),
        Nested::Leaf(value) => {
            out.insert(root_if_empty(prefix), value.clone());
        }
        Nested::Quantity { value, unit } => {
            out.insert(root_if_empty(prefix), value.clone());
            out.insert(
                concept_path::join(prefix, &format!("@{UNITS_ATTR}")),
                Value::Str(unit.clone()),
            );
        }
        Nested::Map(map) => {
            for (key, child) in map {
                match (key.as_str(), child) {
                    (VALUE_KEY, Nested::Leaf(value)) if !prefix.is_empty() => {
                        out.insert(prefix.to_string(), value.clone());
                    }
                    (k, Nested::Leaf(Value::Str(unit)))
                        if UNIT_KEYS.contains(&k) && !prefix.is_empty() =>
                    {
                        out.insert(
                            concept_path::join(prefix, &format!("@{UNITS_ATTR}")),
                            Value::Str(unit.clone()),
                        );
                    }
                    (_, Nested::Records(records)) => {
                        walk_records(prefix, key_map.segment(key), records, key_map, out)
                    }
                    _ => walk(
                        &child_path(prefix, key_map.segment(key)),
                        child,
                        key_map,
                        out,
                    ),
                }
            }
        }
        Nested::Records(records) => walk_records("", "record", records, key_map, out),
    }
}

/// Each record becomes an instance named after its `name` field, or after the
/// key with a running number
fn walk_records(
    prefix: &str,
    segment: &str,
    records: &[IndexMap<String, Nested>],
    key_map: &KeyMap,
    out: &mut IndexMap<String, Value>,
) {
    let parsed = Segment::parse(segment);
    let base = parsed.name;
    let mut used: Vec<String> = Vec::new();
    for (i, record) in records.iter().enumerate() {
        let mut name = match record.get(RECORD_NAME_KEY) {
            Some(Nested::Leaf(Value::Str(name))) => name.clone(),
            _ => format!("{base}{}", i + 1),
        };
        if used.contains(&name) {
            let mut n = 2;
            while used.contains(&format!("{name}_{n}")) {
                n += 1;
            }
            name = format!("{name}_{n}");
        }
        used.push(name.clone());
        let instance = match parsed.class {
            Some(class) => format!("{class}[{name}]"),
            None => name,
        };
        walk(
            &child_path(prefix, &instance),
            &Nested::Map(record.clone()),
            key_map,
            out,
        );
    }
}

/// Keys may already be rooted paths such as `/ENTRY[entry]/title`
fn child_path(prefix: &str, key: &str) -> String {
    let key = key.trim_start_matches('/');
    format!("{prefix}/{key}")
}

fn root_if_empty(prefix: &str) -> String {
    if prefix.is_empty() {
        String::from("/")
    } else {
        prefix.to_string()
    }
}
