//! Helpers for canonical concept paths such as `/ENTRY[entry]/INSTRUMENT[tem]/name/@units`.
use crate::constants::{DEFAULT_ENTRY_NAME, ENTRY_PLACEHOLDER};

/// One parsed component of a concept path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    /// Placeholder of `TYPE[instance]` segments
    pub class: Option<&'a str>,
    /// Instance name, literal name, or attribute name without the `@`
    pub name: &'a str,
    pub is_attribute: bool,
}

impl<'a> Segment<'a> {
    pub fn parse(segment: &'a str) -> Self {
        if let Some(name) = segment.strip_prefix('@') {
            return Self {
                class: None,
                name,
                is_attribute: true,
            };
        }
        if let (Some(open), true) = (segment.find('['), segment.ends_with(']')) {
            if open > 0 {
                return Self {
                    class: Some(&segment[..open]),
                    name: &segment[open + 1..segment.len() - 1],
                    is_attribute: false,
                };
            }
        }
        Self {
            class: None,
            name: segment,
            is_attribute: false,
        }
    }
}

pub fn is_absolute(path: &str) -> bool {
    path.starts_with('/')
}

/// Non-empty components of a path
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

pub fn join(parent: &str, segment: &str) -> String {
    if parent.ends_with('/') {
        format!("{parent}{segment}")
    } else {
        format!("{parent}/{segment}")
    }
}

/// The path without its last component; the root has no parent
pub fn parent(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) if trimmed.len() > 1 => Some("/"),
        Some(0) => None,
        Some(idx) => Some(&trimmed[..idx]),
        None => None,
    }
}

/// The last component of a path
pub fn last_segment(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
}

pub fn is_attribute_path(path: &str) -> bool {
    last_segment(path).starts_with('@')
}

/// True when `path` is `prefix` itself or lies below it
pub fn is_under(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    path == prefix
        || (path.starts_with(prefix) && path.as_bytes().get(prefix.len()) == Some(&b'/'))
}

pub fn units_path(path: &str) -> String {
    join(path, "@units")
}

/// Drop every `TYPE[...]` wrapper, giving the path of the object in the file
pub fn to_hdf_path(path: &str) -> String {
    let mut out = String::new();
    for segment in segments(path) {
        out.push('/');
        let parsed = Segment::parse(segment);
        if parsed.is_attribute {
            out.push('@');
        }
        out.push_str(parsed.name);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// Rewrite every `class[old]` segment to `class[new]`
pub fn rename_instance(path: &str, class: &str, old: &str, new: &str) -> String {
    let from = format!("{class}[{old}]");
    let to = format!("{class}[{new}]");
    let mut out = String::with_capacity(path.len());
    for segment in segments(path) {
        out.push('/');
        if segment == from {
            out.push_str(&to);
        } else {
            out.push_str(segment);
        }
    }
    out
}

/// Substitute the default entry instance with the given one
pub fn with_entry(path: &str, entry_name: &str) -> String {
    rename_instance(path, ENTRY_PLACEHOLDER, DEFAULT_ENTRY_NAME, entry_name)
}

/// Instance name of the entry a path lives in, if any
pub fn entry_of(path: &str) -> Option<&str> {
    segments(path).next().and_then(|first| {
        let segment = Segment::parse(first);
        match segment.class {
            Some(ENTRY_PLACEHOLDER) => Some(segment.name),
            _ => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_parsing() {
        let s = Segment::parse("INSTRUMENT[my_tem]");
        assert_eq!(s.class, Some("INSTRUMENT"));
        assert_eq!(s.name, "my_tem");
        let s = Segment::parse("@units");
        assert!(s.is_attribute);
        assert_eq!(s.name, "units");
        let s = Segment::parse("title");
        assert_eq!(s.class, None);
        assert_eq!(s.name, "title");
    }

    #[test]
    fn test_hdf_path_and_parents() {
        assert_eq!(to_hdf_path("/ENTRY[entry]/data/@signal"), "/entry/data/@signal");
        assert_eq!(parent("/ENTRY[entry]/data/@signal"), Some("/ENTRY[entry]/data"));
        assert_eq!(parent("/ENTRY[entry]"), Some("/"));
        assert_eq!(parent("/"), None);
        assert_eq!(last_segment("/ENTRY[entry]/title"), "title");
    }

    #[test]
    fn test_is_under_respects_segment_boundaries() {
        assert!(is_under("/ENTRY[entry]/SAMPLE[sample]/name", "/ENTRY[entry]/SAMPLE[sample]"));
        assert!(is_under("/ENTRY[entry]/SAMPLE[sample]", "/ENTRY[entry]/SAMPLE[sample]"));
        assert!(!is_under("/ENTRY[entry]/SAMPLE[sample2]/name", "/ENTRY[entry]/SAMPLE[sample]"));
    }

    #[test]
    fn test_entry_rewriting() {
        assert_eq!(
            with_entry("/ENTRY[entry]/INSTRUMENT[entry]/x", "scan_1"),
            "/ENTRY[scan_1]/INSTRUMENT[entry]/x"
        );
        assert_eq!(entry_of("/ENTRY[scan_1]/title"), Some("scan_1"));
        assert_eq!(entry_of("/@default"), None);
    }
}
