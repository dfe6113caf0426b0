//! Checks a filled template against its application definition.
//!
//! Presence is checked by walking the schema alongside the groups that hold
//! values. Every path with a value is then checked on its own: type,
//! enumeration, shape and units. Nothing here stops at the first problem; all
//! findings end up in the returned [`Report`].
use fxhash::{FxHashMap, FxHashSet};
use std::collections::BTreeSet;
use time::format_description::well_known::{Iso8601, Rfc3339};
use time::OffsetDateTime;

use super::concept_path::{self, Segment};
use super::constants::DEFAULT_ATTR;
use super::diagnostics::{Diagnostic, DiagnosticCode, Report};
use super::schema::{Concept, ConceptKind, Dim, NxType, Optionality, Schema};
use super::template::Template;
use super::units::{UnitCheck, UnitTable};
use super::value::{Value, ValueKind};

#[derive(Debug, Clone, Default)]
pub struct ValidationOptions {
    /// Downgrade every error to a warning
    pub permissive: bool,
    /// Unit strings that count as no unit at all, e.g. `on/off`
    pub skip_units: FxHashSet<String>,
    pub units: UnitTable,
}

pub fn validate(template: &Template, schema: &Schema, options: &ValidationOptions) -> Report {
    let mut validator = Validator {
        template,
        schema,
        options,
        present: present_paths(template),
        symbols: FxHashMap::default(),
        report: Report::new(),
    };
    validator.check_presence(&schema.root, "");
    for (path, value) in template.values() {
        validator.check_value(path, value);
    }
    let mut report = validator.report;
    if options.permissive {
        report.make_permissive();
    }
    log::info!("Validation against {} finished: {}", schema.name, report.summary());
    report
}

/// Paths holding a value together with every group above them
fn present_paths(template: &Template) -> BTreeSet<String> {
    let mut present = BTreeSet::new();
    for (path, _) in template.values() {
        let mut current = Some(path);
        while let Some(p) = current {
            if p == "/" || !present.insert(p.to_string()) {
                break;
            }
            current = concept_path::parent(p);
        }
    }
    present
}

struct Validator<'a> {
    template: &'a Template,
    schema: &'a Schema,
    options: &'a ValidationOptions,
    present: BTreeSet<String>,
    /// Sizes bound to shape symbols, per entry
    symbols: FxHashMap<(String, String), usize>,
    report: Report,
}

impl Validator<'_> {
    /// Direct children of a present path
    fn children_of(&self, path: &str) -> Vec<String> {
        let prefix = format!("{path}/");
        self.present
            .range(prefix.clone()..)
            .take_while(|p| p.starts_with(&prefix))
            .filter(|p| !p[prefix.len()..].contains('/'))
            .cloned()
            .collect()
    }

    fn check_presence(&mut self, concept: &Concept, path: &str) {
        let children = self.children_of(path);
        for child in &concept.children {
            let instances: Vec<String> = children
                .iter()
                .filter(|p| {
                    concept
                        .match_segment(&Segment::parse(concept_path::last_segment(p)))
                        .is_some_and(|found| std::ptr::eq(found, child))
                })
                .cloned()
                .collect();
            if instances.is_empty() {
                if child.optionality == Optionality::Required && !child.implied {
                    let missing = concept_path::join(path, &child.template_segment(None));
                    self.report_missing(child, &missing);
                }
                continue;
            }
            for instance in instances {
                self.check_presence(child, &instance);
            }
        }
    }

    /// Report the required leaves below a missing concept, or the concept itself
    fn report_missing(&mut self, concept: &Concept, path: &str) {
        let required: Vec<&Concept> = concept
            .children
            .iter()
            .filter(|c| c.optionality == Optionality::Required && !c.implied)
            .collect();
        if concept.is_group() && !required.is_empty() {
            for child in required {
                let child_path = concept_path::join(path, &child.template_segment(None));
                self.report_missing(child, &child_path);
            }
            return;
        }
        self.report.push(Diagnostic::error(
            path,
            DiagnosticCode::MissingRequired,
            format!("required {} is missing", kind_name(concept.kind)),
        ));
    }

    fn check_value(&mut self, path: &str, value: &Value) {
        let Some(concept) = self.schema.find(path) else {
            if is_base_attribute(path) {
                return;
            }
            self.report.push(Diagnostic::info(
                path,
                DiagnosticCode::Undocumented,
                String::from("path is not part of the application definition"),
            ));
            return;
        };
        if let Some(reason) = &concept.deprecated {
            self.report.push(Diagnostic::warning(
                path,
                DiagnosticCode::Deprecated,
                format!("concept is deprecated: {reason}"),
            ));
        }
        if concept.is_group() {
            return;
        }
        if let Some(category) = concept.unit_category() {
            self.check_units(path, category);
        }
        if value.is_descriptor() {
            return;
        }
        if let (Some(dtype), Some(kind)) = (concept.dtype, value.kind()) {
            self.check_type(path, dtype, kind, value);
        }
        if !concept.enumeration.is_empty() {
            self.check_enumeration(path, concept, value);
        }
        if let (Some(dims), Some(shape)) = (&concept.dims, value.shape()) {
            self.check_shape(path, dims, &shape);
        }
    }

    fn check_type(&mut self, path: &str, dtype: NxType, kind: ValueKind, value: &Value) {
        let compatible = match dtype {
            NxType::Char => kind == ValueKind::String,
            NxType::Float => matches!(kind, ValueKind::Float | ValueKind::Integer),
            NxType::Int => kind == ValueKind::Integer,
            NxType::UInt => kind == ValueKind::Integer && all_ints(value, |v| v >= 0),
            NxType::PosInt => kind == ValueKind::Integer && all_ints(value, |v| v > 0),
            NxType::Number => matches!(kind, ValueKind::Float | ValueKind::Integer),
            NxType::Boolean => kind == ValueKind::Bool,
            NxType::DateTime => {
                kind == ValueKind::String && value.to_strings().iter().all(|s| is_datetime(s))
            }
            NxType::Binary => true,
            NxType::CharOrNumber => {
                matches!(kind, ValueKind::String | ValueKind::Float | ValueKind::Integer)
            }
        };
        if !compatible {
            self.report.push(Diagnostic::error(
                path,
                DiagnosticCode::TypeMismatch,
                format!("expected {}, found {kind:?} value {value}", dtype.name()),
            ));
        }
    }

    fn check_enumeration(&mut self, path: &str, concept: &Concept, value: &Value) {
        let outside: Vec<String> = value
            .to_strings()
            .into_iter()
            .filter(|v| !concept.enumeration.contains(v))
            .collect();
        if outside.is_empty() {
            return;
        }
        let message = format!(
            "{} not in [{}]",
            outside.join(", "),
            concept.enumeration.join(", ")
        );
        let diagnostic = if concept.open_enumeration {
            Diagnostic::warning(path, DiagnosticCode::EnumViolation, message)
        } else {
            Diagnostic::error(path, DiagnosticCode::EnumViolation, message)
        };
        self.report.push(diagnostic);
    }

    fn check_shape(&mut self, path: &str, dims: &[Dim], shape: &[usize]) {
        // a scalar fills a single dimension of length one
        let shape: Vec<usize> = if shape.is_empty() && dims.len() == 1 {
            vec![1]
        } else {
            shape.to_vec()
        };
        if shape.len() != dims.len() {
            self.report.push(Diagnostic::error(
                path,
                DiagnosticCode::ShapeMismatch,
                format!("expected rank {}, found shape {shape:?}", dims.len()),
            ));
            return;
        }
        let entry = concept_path::entry_of(path).unwrap_or_default().to_string();
        for (axis, (dim, size)) in dims.iter().zip(&shape).enumerate() {
            match dim {
                Dim::Fixed(expected) if expected != size => {
                    self.report.push(Diagnostic::error(
                        path,
                        DiagnosticCode::ShapeMismatch,
                        format!("axis {axis} has length {size}, expected {expected}"),
                    ));
                }
                Dim::Symbol(symbol) => {
                    let key = (entry.clone(), symbol.clone());
                    match self.symbols.get(&key) {
                        Some(bound) if bound != size => {
                            self.report.push(Diagnostic::error(
                                path,
                                DiagnosticCode::ShapeMismatch,
                                format!(
                                    "axis {axis} has length {size}, but {symbol} is already {bound}"
                                ),
                            ));
                        }
                        Some(_) => (),
                        None => {
                            self.symbols.insert(key, *size);
                        }
                    }
                }
                _ => (),
            }
        }
    }

    fn check_units(&mut self, path: &str, category: &str) {
        let units_path = concept_path::units_path(path);
        let unit = self
            .template
            .get(&units_path)
            .and_then(Value::as_str)
            .filter(|u| !self.options.skip_units.contains(*u));
        match unit {
            None => self.report.push(Diagnostic::error(
                path,
                DiagnosticCode::UnitCategoryMissing,
                format!("a unit of category {category} is required at {units_path}"),
            )),
            Some(unit) => {
                if self.options.units.check(category, unit) == UnitCheck::NotMember {
                    self.report.push(Diagnostic::warning(
                        path,
                        DiagnosticCode::UnitMismatch,
                        format!("unit {unit:?} is not a {category} unit"),
                    ));
                }
            }
        }
    }
}

/// `@default` anywhere and attributes of the file root belong to the base
/// classes rather than to an application definition
fn is_base_attribute(path: &str) -> bool {
    let segment = Segment::parse(concept_path::last_segment(path));
    segment.is_attribute
        && (segment.name == DEFAULT_ATTR || concept_path::parent(path) == Some("/"))
}

fn kind_name(kind: ConceptKind) -> &'static str {
    match kind {
        ConceptKind::Group => "group",
        ConceptKind::Field => "field",
        ConceptKind::Attribute => "attribute",
    }
}

fn all_ints(value: &Value, predicate: fn(i64) -> bool) -> bool {
    match value {
        Value::Int(v) => predicate(*v),
        Value::Array(super::value::Array::Int(a)) => a.iter().all(|v| predicate(*v)),
        _ => true,
    }
}

/// RFC 3339 or ISO 8601 with an offset
pub fn is_datetime(text: &str) -> bool {
    OffsetDateTime::parse(text, &Rfc3339).is_ok()
        || OffsetDateTime::parse(text, &Iso8601::DEFAULT).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{simple_schema, test_schema};
    use ndarray::{ArrayD, IxDyn};

    fn filled(values: &[(&str, Value)]) -> Template {
        let mut template = Template::generate(test_schema(), true);
        for (path, value) in values {
            template.set(path, value.clone()).unwrap();
        }
        template
    }

    fn base() -> Vec<(&'static str, Value)> {
        vec![
            ("/ENTRY[entry]/title", Value::from("Run 42")),
            ("/ENTRY[entry]/SAMPLE[sample]/name", Value::from("quartz")),
        ]
    }

    fn run(template: &Template) -> Report {
        validate(template, &test_schema(), &ValidationOptions::default())
    }

    #[test]
    fn test_complete_template_passes() {
        let report = run(&filled(&base()));
        assert!(report.success(), "{report}");
        assert!(report.is_empty(), "{report}");
    }

    #[test]
    fn test_missing_required_group_reports_leaves() {
        let report = run(&filled(&[("/ENTRY[entry]/title", Value::from("Run 42"))]));
        assert!(report.has(
            "/ENTRY[entry]/SAMPLE[sample]/name",
            DiagnosticCode::MissingRequired
        ));
        assert!(!report.success());

        let empty = Template::generate(simple_schema(), true);
        let report = validate(&empty, &simple_schema(), &ValidationOptions::default());
        assert!(report.has("/ENTRY[entry]/title", DiagnosticCode::MissingRequired));
    }

    #[test]
    fn test_types_enumerations_and_datetimes() {
        let mut values = base();
        values.push(("/ENTRY[entry]/count", Value::Float(1.5)));
        values.push(("/ENTRY[entry]/mode", Value::from("medium")));
        values.push(("/ENTRY[entry]/start_time", Value::from("2024-03-01T10:00:00+01:00")));
        values.push(("/ENTRY[entry]/SAMPLE[sample]/thickness", Value::Int(2)));
        values.push(("/ENTRY[entry]/SAMPLE[sample]/thickness/@units", Value::from("mm")));
        let report = run(&filled(&values));
        assert!(report.has("/ENTRY[entry]/count", DiagnosticCode::TypeMismatch));
        assert!(report.has("/ENTRY[entry]/mode", DiagnosticCode::EnumViolation));
        assert!(!report.has("/ENTRY[entry]/start_time", DiagnosticCode::TypeMismatch));
        // integers widen to floats
        assert!(!report.has(
            "/ENTRY[entry]/SAMPLE[sample]/thickness",
            DiagnosticCode::TypeMismatch
        ));

        let mut values = base();
        values.push(("/ENTRY[entry]/start_time", Value::from("yesterday")));
        values.push(("/ENTRY[entry]/title", Value::Int(42)));
        let report = run(&filled(&values));
        assert!(report.has("/ENTRY[entry]/start_time", DiagnosticCode::TypeMismatch));
        assert!(report.has("/ENTRY[entry]/title", DiagnosticCode::TypeMismatch));
    }

    #[test]
    fn test_every_unit_category_has_units_or_a_diagnostic() {
        let mut values = base();
        values.push(("/ENTRY[entry]/temperature", Value::Float(295.0)));
        values.push(("/ENTRY[entry]/SAMPLE[sample]/thickness", Value::Float(0.5)));
        values.push(("/ENTRY[entry]/SAMPLE[sample]/thickness/@units", Value::from("on/off")));
        let template = filled(&values);
        let options = ValidationOptions {
            skip_units: FxHashSet::from_iter([String::from("on/off")]),
            ..Default::default()
        };
        let schema = test_schema();
        let report = validate(&template, &schema, &options);
        for (path, _) in template.values() {
            let Some(concept) = schema.find(path) else { continue };
            if concept.unit_category().is_some() {
                let units = template
                    .get(&concept_path::units_path(path))
                    .and_then(Value::as_str)
                    .filter(|u| !options.skip_units.contains(*u));
                assert!(
                    units.is_some() || report.has(path, DiagnosticCode::UnitCategoryMissing),
                    "{path}"
                );
            }
        }
        assert!(report.has("/ENTRY[entry]/temperature", DiagnosticCode::UnitCategoryMissing));
        assert!(report.has(
            "/ENTRY[entry]/SAMPLE[sample]/thickness",
            DiagnosticCode::UnitCategoryMissing
        ));

        let mut values = base();
        values.push(("/ENTRY[entry]/temperature", Value::Float(295.0)));
        values.push(("/ENTRY[entry]/temperature/@units", Value::from("eV")));
        let report = run(&filled(&values));
        assert!(report.has("/ENTRY[entry]/temperature", DiagnosticCode::UnitMismatch));
        assert!(report.success());
    }

    #[test]
    fn test_shapes_and_symbols() {
        let mut values = base();
        values.push((
            "/ENTRY[entry]/data/image",
            Value::from(ArrayD::<f64>::zeros(IxDyn(&[2, 3]))),
        ));
        values.push((
            "/ENTRY[entry]/data/x",
            Value::from(ArrayD::<f64>::zeros(IxDyn(&[4]))),
        ));
        values.push(("/ENTRY[entry]/data/x/@units", Value::from("mm")));
        values.push((
            "/ENTRY[entry]/data/y",
            Value::from(ArrayD::<f64>::zeros(IxDyn(&[2, 1]))),
        ));
        let report = run(&filled(&values));
        assert!(report.has("/ENTRY[entry]/data/x", DiagnosticCode::ShapeMismatch));
        assert!(report.has("/ENTRY[entry]/data/y", DiagnosticCode::ShapeMismatch));
        assert!(!report.has("/ENTRY[entry]/data/image", DiagnosticCode::ShapeMismatch));
    }

    #[test]
    fn test_undocumented_deprecated_and_permissive() {
        let mut values = base();
        values.push(("/ENTRY[entry]/notes", Value::from("free text")));
        values.push(("/ENTRY[entry]/old_name", Value::from("legacy")));
        values.push(("/ENTRY[entry]/mode", Value::from("medium")));
        let template = filled(&values);
        let report = run(&template);
        let notes = report
            .find("/ENTRY[entry]/notes", DiagnosticCode::Undocumented)
            .unwrap();
        assert_eq!(notes.severity, crate::diagnostics::Severity::Info);
        assert!(report.has("/ENTRY[entry]/old_name", DiagnosticCode::Deprecated));
        assert!(!report.success());

        let options = ValidationOptions {
            permissive: true,
            ..Default::default()
        };
        let report = validate(&template, &test_schema(), &options);
        assert!(report.success());
        assert!(report.has("/ENTRY[entry]/mode", DiagnosticCode::EnumViolation));
    }
}
