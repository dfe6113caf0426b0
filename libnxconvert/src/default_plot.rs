//! Fills in the `@default` attributes that point viewers at something to plot.
//!
//! The file root points at the first entry, each entry at its first `NXdata`
//! group. Attributes already present are left alone.
use super::concept_path::{self, Segment};
use super::constants::{DEFAULT_ATTR, ENTRY_PLACEHOLDER};
use super::template::Template;
use super::value::Value;

const NXDATA_CLASS: &str = "NXdata";
const DATA_PLACEHOLDER: &str = "DATA";

fn is_data_group(template: &Template, path: &str) -> bool {
    let from_schema = template
        .schema()
        .and_then(|s| s.group_class_of(path))
        .map(|class| class == NXDATA_CLASS);
    match from_schema {
        Some(is_data) => is_data,
        None => {
            let segment = Segment::parse(concept_path::last_segment(path));
            segment.class == Some(DATA_PLACEHOLDER)
                || (segment.class.is_none() && segment.name == "data")
        }
    }
}

/// First group directly below the entry that is an `NXdata` group and holds a value
fn first_data_group(template: &Template, entry_path: &str) -> Option<String> {
    template
        .values()
        .filter_map(|(path, _)| {
            let rest = path.strip_prefix(entry_path)?.strip_prefix('/')?;
            let first = rest.split('/').next()?;
            if first.starts_with('@') || !rest.contains('/') {
                return None;
            }
            Some(concept_path::join(entry_path, first))
        })
        .find(|group| is_data_group(template, group))
}

fn set_if_missing(template: &mut Template, path: &str, target: &str) {
    if template.get(path).is_some() {
        return;
    }
    if let Err(e) = template.set(path, Value::from(target)) {
        log::warn!("Could not set {path}: {e}");
    }
}

fn entry_path(entry: &str) -> String {
    format!("/{ENTRY_PLACEHOLDER}[{entry}]")
}

/// Set missing `@default` attributes on the root and on every entry
pub fn set_default_plot(template: &mut Template) {
    let entries: Vec<String> = template
        .entry_names()
        .into_iter()
        .filter(|entry| template.has_values_under(&entry_path(entry)))
        .collect();
    let Some(first) = entries.first() else {
        return;
    };
    let root_default = format!("/@{DEFAULT_ATTR}");
    set_if_missing(template, &root_default, first);

    for entry in &entries {
        let entry_path = entry_path(entry);
        let Some(group) = first_data_group(template, &entry_path) else {
            continue;
        };
        let name = Segment::parse(concept_path::last_segment(&group)).name.to_string();
        let entry_default = concept_path::join(&entry_path, &format!("@{DEFAULT_ATTR}"));
        log::debug!("Default plot of {entry} is {name}");
        set_if_missing(template, &entry_default, &name);
    }
}
