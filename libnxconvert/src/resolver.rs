//! Fills a template from a mapping config.
//!
//! Every config entry is resolved once per entry name. Entries marked with `!`
//! go first so that a group they remove is skipped by everything after them.
//! Values come from a [`Callbacks`] implementation, one method per prefix.
use super::concept_path::{self, Segment};
use super::constants::{DEFAULT_ENTRY_NAME, ENTRY_PLACEHOLDER};
use super::diagnostics::{Diagnostic, DiagnosticCode, Report};
use super::error::TemplateError;
use super::expression::{Expression, Prefix, Reference, Source, WILDCARD};
use super::mapping::MappingConfig;
use super::template::Template;
use super::value::{Descriptor, Value};

/// Where the resolver gets its values from. Each method answers one prefix of
/// the expression language; `None` lets the next alternative try.
pub trait Callbacks {
    /// `@data:` lookups into the measurement data
    fn get_data(&self, key: &str) -> Option<Value>;

    /// `@attrs:` lookups into measurement metadata
    fn get_attr(&self, key: &str) -> Option<Value>;

    /// `@eln:` lookups into the electronic lab notebook
    fn get_eln_data(&self, key: &str) -> Option<Value>;

    /// Names a wildcard pattern such as `/axes/*` expands to
    fn get_data_dims(&self, pattern: &str) -> Vec<String>;

    /// `@link:` lookups. The default turns the key into a link descriptor.
    fn link(&self, key: &str) -> Option<Value> {
        Some(Value::link(key))
    }

    /// Entry instances to fill
    fn get_entry_names(&self) -> Vec<String> {
        vec![DEFAULT_ENTRY_NAME.to_string()]
    }
}

enum Resolved {
    Value(Value),
    Unresolved,
    /// A required expression failed and its group went away
    Removed,
}

struct Resolver<'a> {
    callbacks: &'a dyn Callbacks,
    config: &'a MappingConfig,
    entry: &'a str,
    removed: Vec<String>,
    report: Report,
}

/// Resolve every config entry into the template and return the diagnostics
pub fn fill_from_config(
    template: &mut Template,
    config: &MappingConfig,
    callbacks: &dyn Callbacks,
) -> Report {
    let mut entries = callbacks.get_entry_names();
    if entries.is_empty() {
        entries.push(DEFAULT_ENTRY_NAME.to_string());
    }
    prepare_entries(template, &entries);

    let ordered: Vec<(&str, &Expression)> = config
        .iter()
        .filter(|(_, e)| e.is_required())
        .chain(config.iter().filter(|(_, e)| !e.is_required()))
        .collect();

    let mut report = Report::new();
    for entry in &entries {
        let mut resolver = Resolver {
            callbacks,
            config,
            entry,
            removed: Vec::new(),
            report: Report::new(),
        };
        for (key, expression) in &ordered {
            resolver.resolve_entry(template, key, expression);
        }
        log::info!(
            "Resolved {} config entries for entry {entry}",
            ordered.len()
        );
        report.merge(resolver.report);
    }
    report
}

/// Make the template hold empty slots for exactly the requested entries
fn prepare_entries(template: &mut Template, entries: &[String]) {
    let default_in_use = entries.iter().any(|e| e == DEFAULT_ENTRY_NAME);
    if !default_in_use && !template.has_values_under(&entry_path(DEFAULT_ENTRY_NAME)) {
        template.rename_entry(DEFAULT_ENTRY_NAME, &entries[0]);
    }
    let present = template.entry_names();
    for entry in entries.iter().filter(|e| !present.contains(e)) {
        match template.add_entry(entry) {
            Ok(()) => (),
            Err(TemplateError::NoSchema(_)) => break,
            Err(e) => log::warn!("Could not add entry {entry}: {e}"),
        }
    }
}

fn entry_path(name: &str) -> String {
    format!("/{ENTRY_PLACEHOLDER}[{name}]")
}

impl Resolver<'_> {
    fn resolve_entry(&mut self, template: &mut Template, key: &str, expression: &Expression) {
        let path = concept_path::with_entry(key, self.entry);
        if self.is_removed(&path) {
            log::debug!("Skipping {path}; its group was removed");
            return;
        }
        match expression {
            Expression::Wildcard { pattern, inner } => {
                self.expand_wildcard(template, key, &path, pattern, inner)
            }
            other => self.resolve_path(template, &path, other),
        }
    }

    fn expand_wildcard(
        &mut self,
        template: &mut Template,
        key: &str,
        path: &str,
        pattern: &str,
        inner: &Expression,
    ) {
        let names = self.callbacks.get_data_dims(pattern);
        if names.is_empty() {
            self.report.push(Diagnostic::warning(
                path,
                DiagnosticCode::WildcardWithoutDims,
                format!("{pattern} did not expand to any names"),
            ));
            if inner.is_required() {
                self.remove_group(template, path);
            }
            return;
        }
        for name in names {
            // explicit config keys take precedence over expansions
            if self.config.contains(&key.replace(WILDCARD, &name)) {
                continue;
            }
            let expanded = path.replace(WILDCARD, &name);
            if self.is_removed(&expanded) {
                continue;
            }
            let substituted = substitute_wildcard(inner, &name);
            self.resolve_path(template, &expanded, &substituted);
        }
    }

    fn resolve_path(&mut self, template: &mut Template, path: &str, expression: &Expression) {
        match self.evaluate(template, path, expression) {
            Resolved::Value(value) => {
                if let Err(e) = template.set(path, value) {
                    log::warn!("{e}");
                    self.report.push(Diagnostic::warning(
                        path,
                        DiagnosticCode::ConflictOnWrite,
                        e.to_string(),
                    ));
                }
            }
            Resolved::Unresolved => {
                log::warn!("No value for {path}; removing it from the template");
                self.report.push(Diagnostic::warning(
                    path,
                    DiagnosticCode::UnresolvedExpression,
                    String::from("no source returned a value"),
                ));
                template.delete(path);
            }
            Resolved::Removed => (),
        }
    }

    fn evaluate(&mut self, template: &mut Template, path: &str, expression: &Expression) -> Resolved {
        match expression {
            Expression::Literal(value) => Resolved::Value(self.with_entry(value.clone())),
            Expression::Reference(reference) => match self.lookup(path, reference) {
                Some(value) => Resolved::Value(value),
                None => Resolved::Unresolved,
            },
            Expression::Required(inner) => match self.evaluate(template, path, inner) {
                Resolved::Unresolved => {
                    self.report.push(Diagnostic::warning(
                        path,
                        DiagnosticCode::MissingRequired,
                        String::from("required expression did not resolve"),
                    ));
                    self.remove_group(template, path);
                    Resolved::Removed
                }
                other => other,
            },
            Expression::Wildcard { inner, .. } => self.evaluate(template, path, inner),
        }
    }

    fn lookup(&self, path: &str, reference: &Reference) -> Option<Value> {
        let found = reference
            .sources
            .iter()
            .find_map(|source| self.ask(path, source))
            .or_else(|| reference.fallback.clone())?;
        if reference.compress && !found.is_descriptor() {
            Some(Value::compress(found))
        } else {
            Some(found)
        }
    }

    fn ask(&self, path: &str, source: &Source) -> Option<Value> {
        let key = source.key(path);
        match source.prefix {
            Prefix::Data => self.callbacks.get_data(key),
            Prefix::Attrs => self.callbacks.get_attr(key),
            Prefix::Eln => self.callbacks.get_eln_data(key),
            Prefix::Link => self.callbacks.link(key).map(|v| self.with_entry(v)),
        }
    }

    /// Point internal link targets at the entry being resolved
    fn with_entry(&self, value: Value) -> Value {
        match value {
            Value::Descriptor(Descriptor::Link(target)) => {
                Value::Descriptor(Descriptor::Link(target.with_entry(self.entry)))
            }
            Value::Descriptor(Descriptor::Concat(targets)) => Value::Descriptor(Descriptor::Concat(
                targets.iter().map(|t| t.with_entry(self.entry)).collect(),
            )),
            Value::Descriptor(Descriptor::Slice { source, selection }) => {
                Value::Descriptor(Descriptor::Slice {
                    source: source.with_entry(self.entry),
                    selection,
                })
            }
            other => other,
        }
    }

    fn is_removed(&self, path: &str) -> bool {
        self.removed.iter().any(|group| concept_path::is_under(path, group))
    }

    fn remove_group(&mut self, template: &mut Template, path: &str) {
        let Some(group) = enclosing_group(template, path) else {
            template.delete(path);
            return;
        };
        let removed = template.delete_under(&group);
        log::warn!("Removed {group} and {removed} template paths below it");
        self.removed.push(group);
    }
}

/// The group a field or attribute lives in
fn enclosing_group(template: &Template, path: &str) -> Option<String> {
    let mut current = concept_path::parent(path)?;
    if concept_path::is_attribute_path(path) && !is_group(template, current) {
        current = concept_path::parent(current)?;
    }
    if current == "/" {
        return None;
    }
    Some(current.to_string())
}

fn is_group(template: &Template, path: &str) -> bool {
    match template.schema().and_then(|s| s.find(path)) {
        Some(concept) => concept.is_group(),
        None => Segment::parse(concept_path::last_segment(path)).class.is_some(),
    }
}

fn substitute_wildcard(expression: &Expression, name: &str) -> Expression {
    match expression {
        Expression::Reference(reference) => Expression::Reference(Reference {
            sources: reference
                .sources
                .iter()
                .map(|s| Source {
                    prefix: s.prefix,
                    payload: s.payload.as_ref().map(|p| p.replace(WILDCARD, name)),
                })
                .collect(),
            fallback: reference.fallback.clone(),
            compress: reference.compress,
        }),
        Expression::Required(inner) => {
            Expression::Required(Box::new(substitute_wildcard(inner, name)))
        }
        Expression::Wildcard { inner, .. } => substitute_wildcard(inner, name),
        Expression::Literal(value) => Expression::Literal(value.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_schema;
    use crate::value::LinkTarget;
    use fxhash::FxHashMap;

    #[derive(Default)]
    struct MockSource {
        data: FxHashMap<String, Value>,
        attrs: FxHashMap<String, Value>,
        eln: FxHashMap<String, Value>,
        dims: FxHashMap<String, Vec<String>>,
        entries: Vec<String>,
    }

    impl MockSource {
        fn data(mut self, key: &str, value: Value) -> Self {
            self.data.insert(key.to_string(), value);
            self
        }
        fn attr(mut self, key: &str, value: Value) -> Self {
            self.attrs.insert(key.to_string(), value);
            self
        }
        fn eln(mut self, key: &str, value: Value) -> Self {
            self.eln.insert(key.to_string(), value);
            self
        }
    }

    impl Callbacks for MockSource {
        fn get_data(&self, key: &str) -> Option<Value> {
            self.data.get(key).cloned()
        }
        fn get_attr(&self, key: &str) -> Option<Value> {
            self.attrs.get(key).cloned()
        }
        fn get_eln_data(&self, key: &str) -> Option<Value> {
            self.eln.get(key).cloned()
        }
        fn get_data_dims(&self, pattern: &str) -> Vec<String> {
            self.dims.get(pattern).cloned().unwrap_or_default()
        }
        fn get_entry_names(&self) -> Vec<String> {
            if self.entries.is_empty() {
                vec![DEFAULT_ENTRY_NAME.to_string()]
            } else {
                self.entries.clone()
            }
        }
    }

    fn config(json: &str) -> MappingConfig {
        MappingConfig::from_json_str(json).unwrap()
    }

    #[test]
    fn test_eln_wins_over_other_prefixes() {
        let source = MockSource::default()
            .eln("X", Value::from("from eln"))
            .attr("X", Value::from("from attrs"))
            .data("X", Value::from("from data"));
        let mut template = Template::generate(test_schema(), true);
        let report = fill_from_config(
            &mut template,
            &config(r#"{"/ENTRY[entry]/title": "@eln,@attrs,@data:X"}"#),
            &source,
        );
        assert!(report.is_empty());
        assert_eq!(
            template.get("/ENTRY[entry]/title"),
            Some(&Value::from("from eln"))
        );
    }

    #[test]
    fn test_falls_back_to_later_prefix() {
        let source = MockSource::default().attr("/meta/T", Value::Float(295.0));
        let mut template = Template::generate(test_schema(), true);
        fill_from_config(
            &mut template,
            &config(r#"{"/ENTRY[entry]/temperature": "@eln:temp,@attrs:/meta/T"}"#),
            &source,
        );
        assert_eq!(
            template.get("/ENTRY[entry]/temperature"),
            Some(&Value::Float(295.0))
        );
    }

    #[test]
    fn test_required_failure_removes_group() {
        let source = MockSource::default().eln("thickness", Value::Float(1.0));
        let mut template = Template::generate(test_schema(), true);
        let report = fill_from_config(
            &mut template,
            &config(
                r#"{
                    "/ENTRY[entry]/SAMPLE[sample]/thickness": "@eln:thickness",
                    "/ENTRY[entry]/SAMPLE[sample]/name": "!@eln:sample_name"
                }"#,
            ),
            &source,
        );
        assert!(report.has(
            "/ENTRY[entry]/SAMPLE[sample]/name",
            DiagnosticCode::MissingRequired
        ));
        assert!(template
            .iter()
            .all(|(path, _)| !concept_path::is_under(path, "/ENTRY[entry]/SAMPLE[sample]")));
        assert!(template.contains("/ENTRY[entry]/title"));
    }

    #[test]
    fn test_unresolved_paths_are_deleted() {
        let mut template = Template::generate(test_schema(), true);
        let report = fill_from_config(
            &mut template,
            &config(r#"{"/ENTRY[entry]/start_time": "@attrs:/meta/start"}"#),
            &MockSource::default(),
        );
        assert!(!template.contains("/ENTRY[entry]/start_time"));
        assert!(report.has(
            "/ENTRY[entry]/start_time",
            DiagnosticCode::UnresolvedExpression
        ));
    }

    #[test]
    fn test_wildcard_expansion_is_idempotent() {
        let mut source = MockSource::default()
            .data("/axes/x", Value::Int(1))
            .data("/axes/y", Value::Int(2))
            .data("/axes/z", Value::Int(3))
            .data("/special/y", Value::Int(20));
        source.dims.insert(
            String::from("/axes/*"),
            vec![String::from("x"), String::from("y"), String::from("z")],
        );
        let config = config(
            r#"{
                "/ENTRY[entry]/data/axis_*": "@data:/axes/*",
                "/ENTRY[entry]/data/axis_y": "@data:/special/y"
            }"#,
        );
        let mut template = Template::generate(test_schema(), true);
        fill_from_config(&mut template, &config, &source);
        let first: Vec<(String, Option<Value>)> = template
            .iter()
            .map(|(p, v)| (p.to_string(), v.cloned()))
            .collect();
        assert_eq!(
            template.get("/ENTRY[entry]/data/axis_x"),
            Some(&Value::Int(1))
        );
        assert_eq!(
            template.get("/ENTRY[entry]/data/axis_y"),
            Some(&Value::Int(20))
        );
        assert_eq!(
            template.get("/ENTRY[entry]/data/axis_z"),
            Some(&Value::Int(3))
        );

        fill_from_config(&mut template, &config, &source);
        let second: Vec<(String, Option<Value>)> = template
            .iter()
            .map(|(p, v)| (p.to_string(), v.cloned()))
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_wildcard_without_dims_is_reported() {
        let mut template = Template::generate(test_schema(), true);
        let report = fill_from_config(
            &mut template,
            &config(r#"{"/ENTRY[entry]/data/axis_*": "@data:/axes/*"}"#),
            &MockSource::default(),
        );
        assert!(report.has(
            "/ENTRY[entry]/data/axis_*",
            DiagnosticCode::WildcardWithoutDims
        ));
        assert!(report.success());
    }

    #[test]
    fn test_entries_do_not_share_values() {
        let mut source = MockSource::default()
            .eln("title", Value::from("shared title"))
            .data("/ENTRY[entry1]/count", Value::Int(1))
            .data("/ENTRY[entry2]/count", Value::Int(2));
        source.entries = vec![String::from("entry1"), String::from("entry2")];

        let mut template = Template::generate(test_schema(), true);
        fill_from_config(
            &mut template,
            &config(
                r#"{
                    "/ENTRY[entry]/title": "@eln:title",
                    "/ENTRY[entry]/count": "@data",
                    "/ENTRY[entry]/data/image": "@link:/entry/raw/image"
                }"#,
            ),
            &source,
        );
        assert!(!template.contains("/ENTRY[entry]/title"));
        assert_eq!(
            template.get("/ENTRY[entry1]/title"),
            Some(&Value::from("shared title"))
        );
        assert_eq!(
            template.get("/ENTRY[entry2]/title"),
            Some(&Value::from("shared title"))
        );
        assert_eq!(
            template.get("/ENTRY[entry2]/data/image"),
            Some(&Value::Descriptor(Descriptor::Link(LinkTarget::Internal(
                String::from("/entry2/raw/image")
            ))))
        );
        assert_eq!(template.get("/ENTRY[entry1]/count"), Some(&Value::Int(1)));
        assert_eq!(template.get("/ENTRY[entry2]/count"), Some(&Value::Int(2)));
        assert_eq!(template.entry_names(), vec!["entry1", "entry2"]);
    }
}
