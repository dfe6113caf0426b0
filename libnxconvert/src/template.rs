//! The template: every value the output file will hold, keyed by concept path.
//!
//! Paths live in exactly one of four buckets. Schema-known paths go to the
//! bucket of their optionality, everything else to `undocumented`. A path may be
//! present without a value, which is how the empty template marks concepts that
//! still need to be filled.
use indexmap::IndexMap;
use std::sync::Arc;

use super::concept_path;
use super::constants::ENTRY_PLACEHOLDER;
use super::error::TemplateError;
use super::schema::{Optionality, Schema};
use super::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Optional,
    Recommended,
    Required,
    Undocumented,
}

impl Bucket {
    /// Lookup and iteration order
    pub const ORDER: [Bucket; 4] = [
        Bucket::Optional,
        Bucket::Recommended,
        Bucket::Required,
        Bucket::Undocumented,
    ];

    fn index(self) -> usize {
        match self {
            Self::Optional => 0,
            Self::Recommended => 1,
            Self::Required => 2,
            Self::Undocumented => 3,
        }
    }
}

impl From<Optionality> for Bucket {
    fn from(optionality: Optionality) -> Self {
        match optionality {
            Optionality::Required => Self::Required,
            Optionality::Recommended => Self::Recommended,
            Optionality::Optional => Self::Optional,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Template {
    buckets: [IndexMap<String, Option<Value>>; 4],
    schema: Option<Arc<Schema>>,
    overwrite_keys: bool,
}

impl Template {
    /// An empty template. Without a schema every path is undocumented.
    pub fn new(schema: Option<Arc<Schema>>, overwrite_keys: bool) -> Self {
        Self {
            buckets: Default::default(),
            schema,
            overwrite_keys,
        }
    }

    /// The empty template of a schema: one valueless path per leaf, plus the
    /// groups that host required leaves
    pub fn generate(schema: Arc<Schema>, overwrite_keys: bool) -> Self {
        let seeds = schema.template_seeds();
        let mut template = Self::new(Some(schema), overwrite_keys);
        for seed in seeds {
            template.buckets[Bucket::from(seed.optionality).index()].insert(seed.path, None);
        }
        template
    }

    pub fn schema(&self) -> Option<&Arc<Schema>> {
        self.schema.as_ref()
    }

    pub fn overwrite_keys(&self) -> bool {
        self.overwrite_keys
    }

    /// Bucket a path would be routed to
    pub fn route(&self, path: &str) -> Bucket {
        self.schema
            .as_ref()
            .and_then(|s| s.optionality_of(path))
            .map(Bucket::from)
            .unwrap_or(Bucket::Undocumented)
    }

    /// Bucket a path currently lives in
    pub fn bucket_of(&self, path: &str) -> Option<Bucket> {
        Bucket::ORDER
            .into_iter()
            .find(|b| self.buckets[b.index()].contains_key(path))
    }

    /// Store a value.
    ///
    /// When the template does not overwrite keys, a different value already at
    /// the path is kept and `ConflictOnWrite` is returned.
    pub fn set(&mut self, path: &str, value: Value) -> Result<(), TemplateError> {
        if !concept_path::is_absolute(path) {
            return Err(TemplateError::NotAbsolute(path.to_string()));
        }
        let bucket = match self.bucket_of(path) {
            Some(bucket) => bucket,
            None => self.route(path),
        };
        let slot = self.buckets[bucket.index()]
            .entry(path.to_string())
            .or_insert(None);
        match slot {
            Some(existing) if !self.overwrite_keys && *existing != value => {
                Err(TemplateError::ConflictOnWrite(path.to_string()))
            }
            _ => {
                *slot = Some(value);
                Ok(())
            }
        }
    }

    /// Add a path without a value, keeping any value already there
    pub fn reserve(&mut self, path: &str) -> Result<(), TemplateError> {
        if !concept_path::is_absolute(path) {
            return Err(TemplateError::NotAbsolute(path.to_string()));
        }
        if self.bucket_of(path).is_none() {
            let bucket = self.route(path);
            self.buckets[bucket.index()].insert(path.to_string(), None);
        }
        Ok(())
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        Bucket::ORDER
            .into_iter()
            .find_map(|b| self.buckets[b.index()].get(path))
            .and_then(Option::as_ref)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.bucket_of(path).is_some()
    }

    /// Remove a path and return its value
    pub fn delete(&mut self, path: &str) -> Option<Value> {
        let bucket = self.bucket_of(path)?;
        self.buckets[bucket.index()].shift_remove(path).flatten()
    }

    /// Remove a group path and everything below it; returns how many paths went away
    pub fn delete_under(&mut self, prefix: &str) -> usize {
        let mut removed = 0;
        for bucket in self.buckets.iter_mut() {
            let before = bucket.len();
            bucket.retain(|path, _| !concept_path::is_under(path, prefix));
            removed += before - bucket.len();
        }
        removed
    }

    /// Rename the instance of a placeholder across all buckets
    pub fn rename_instance(&mut self, class: &str, old: &str, new: &str) {
        let marker = format!("{class}[{old}]");
        for bucket in self.buckets.iter_mut() {
            let mut renamed: IndexMap<String, Option<Value>> = IndexMap::with_capacity(bucket.len());
            for (path, value) in std::mem::take(bucket) {
                let path = if path.contains(&marker) {
                    concept_path::rename_instance(&path, class, old, new)
                } else {
                    path
                };
                // a value already stored under the new name wins over an empty slot
                match renamed.get_mut(&path) {
                    Some(existing) if value.is_none() || existing.is_some() => (),
                    Some(existing) => *existing = value,
                    None => {
                        renamed.insert(path, value);
                    }
                }
            }
            *bucket = renamed;
        }
    }

    pub fn rename_entry(&mut self, old: &str, new: &str) {
        self.rename_instance(ENTRY_PLACEHOLDER, old, new);
    }

    /// Add the valueless paths of another entry
    pub fn add_entry(&mut self, name: &str) -> Result<(), TemplateError> {
        let schema = self
            .schema
            .clone()
            .ok_or_else(|| TemplateError::NoSchema(name.to_string()))?;
        for seed in schema.template_seeds_for(ENTRY_PLACEHOLDER, name) {
            if !self.contains(&seed.path) {
                self.buckets[Bucket::from(seed.optionality).index()].insert(seed.path, None);
            }
        }
        Ok(())
    }

    /// Merge another template bucket by bucket. Returns the paths that kept
    /// their old value because of a conflict.
    pub fn update(&mut self, other: &Template) -> Vec<String> {
        let mut conflicts = Vec::new();
        for bucket in Bucket::ORDER {
            for (path, value) in &other.buckets[bucket.index()] {
                match value {
                    Some(value) => {
                        if let Err(TemplateError::ConflictOnWrite(path)) =
                            self.set(path, value.clone())
                        {
                            conflicts.push(path);
                        }
                    }
                    None => {
                        if !self.contains(path) {
                            self.buckets[bucket.index()].insert(path.clone(), None);
                        }
                    }
                }
            }
        }
        conflicts
    }

    /// Paths and values of one bucket
    pub fn bucket(&self, bucket: Bucket) -> impl Iterator<Item = (&str, Option<&Value>)> {
        self.buckets[bucket.index()]
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    /// All paths with their values, bucket by bucket
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&Value>)> {
        Bucket::ORDER.into_iter().flat_map(|b| self.bucket(b))
    }

    /// Paths that hold a value
    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.iter().filter_map(|(k, v)| v.map(|v| (k, v)))
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entry instance names in first-seen order
    pub fn entry_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for (path, _) in self.iter() {
            if let Some(name) = concept_path::entry_of(path) {
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
        }
        names
    }

    /// True when some path at or below `prefix` holds a value
    pub fn has_values_under(&self, prefix: &str) -> bool {
        self.values()
            .any(|(path, _)| concept_path::is_under(path, prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_schema;
    use std::collections::BTreeSet;

    #[test]
    fn test_generated_buckets_partition_schema_leaves() {
        let schema = test_schema();
        let template = Template::generate(schema.clone(), true);

        let mut seen = BTreeSet::new();
        for bucket in Bucket::ORDER {
            for (path, value) in template.bucket(bucket) {
                assert!(value.is_none());
                assert!(seen.insert(path.to_string()), "{path} in two buckets");
            }
        }
        let seeds: BTreeSet<String> = schema
            .template_seeds()
            .into_iter()
            .map(|s| s.path)
            .collect();
        assert_eq!(seen, seeds);
        for leaf in schema.leaf_paths() {
            assert!(seen.contains(&leaf));
        }
        assert_eq!(
            template.bucket_of("/ENTRY[entry]/title"),
            Some(Bucket::Required)
        );
        assert_eq!(
            template.bucket_of("/ENTRY[entry]/temperature/@units"),
            Some(Bucket::Recommended)
        );
        assert_eq!(
            template.bucket_of("/ENTRY[entry]/SAMPLE[sample]"),
            Some(Bucket::Optional)
        );
    }

    #[test]
    fn test_set_routes_and_rejects_relative_paths() {
        let mut template = Template::generate(test_schema(), true);
        template
            .set("/ENTRY[entry]/title", Value::from("Run 42"))
            .unwrap();
        template
            .set("/ENTRY[entry]/SAMPLE[quartz]/name", Value::from("quartz"))
            .unwrap();
        template
            .set("/ENTRY[entry]/notes", Value::from("free text"))
            .unwrap();
        assert_eq!(
            template.bucket_of("/ENTRY[entry]/SAMPLE[quartz]/name"),
            Some(Bucket::Required)
        );
        assert_eq!(
            template.bucket_of("/ENTRY[entry]/notes"),
            Some(Bucket::Undocumented)
        );
        assert_eq!(
            template.get("/ENTRY[entry]/title"),
            Some(&Value::from("Run 42"))
        );
        assert!(matches!(
            template.set("ENTRY[entry]/title", Value::from("x")),
            Err(TemplateError::NotAbsolute(_))
        ));
    }

    #[test]
    fn test_conflicts_keep_first_value() {
        let mut template = Template::generate(test_schema(), false);
        template
            .set("/ENTRY[entry]/title", Value::from("first"))
            .unwrap();
        template
            .set("/ENTRY[entry]/title", Value::from("first"))
            .unwrap();
        assert!(matches!(
            template.set("/ENTRY[entry]/title", Value::from("second")),
            Err(TemplateError::ConflictOnWrite(_))
        ));
        assert_eq!(
            template.get("/ENTRY[entry]/title"),
            Some(&Value::from("first"))
        );

        let mut other = Template::new(template.schema().cloned(), false);
        other
            .set("/ENTRY[entry]/title", Value::from("third"))
            .unwrap();
        other
            .set("/ENTRY[entry]/count", Value::Int(3))
            .unwrap();
        let conflicts = template.update(&other);
        assert_eq!(conflicts, vec![String::from("/ENTRY[entry]/title")]);
        assert_eq!(template.get("/ENTRY[entry]/count"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_rename_round_trip_is_identity() {
        let mut template = Template::generate(test_schema(), true);
        template
            .set("/ENTRY[entry]/title", Value::from("Run 42"))
            .unwrap();
        template
            .set("/ENTRY[entry]/extra", Value::Int(1))
            .unwrap();
        let before: Vec<(String, Option<Value>, Option<Bucket>)> = template
            .iter()
            .map(|(p, v)| (p.to_string(), v.cloned(), template.bucket_of(p)))
            .collect();

        template.rename_entry("entry", "scan");
        assert!(template.contains("/ENTRY[scan]/title"));
        assert!(!template.contains("/ENTRY[entry]/title"));
        assert_eq!(
            template.bucket_of("/ENTRY[scan]/extra"),
            Some(Bucket::Undocumented)
        );
        template.rename_entry("scan", "entry");

        let after: Vec<(String, Option<Value>, Option<Bucket>)> = template
            .iter()
            .map(|(p, v)| (p.to_string(), v.cloned(), template.bucket_of(p)))
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_add_entry_and_delete_under() {
        let mut template = Template::generate(test_schema(), true);
        template.add_entry("entry2").unwrap();
        assert!(template.contains("/ENTRY[entry2]/title"));
        assert_eq!(template.entry_names(), vec!["entry", "entry2"]);

        let removed = template.delete_under("/ENTRY[entry2]/SAMPLE[sample]");
        assert!(removed >= 2);
        assert!(!template.contains("/ENTRY[entry2]/SAMPLE[sample]/name"));
        assert!(template.contains("/ENTRY[entry]/SAMPLE[sample]/name"));
    }
}
