//! Expressions of the mapping config.
//!
//! ```text
//! expr      := [ '!' ] ( prefix ( ',' prefix )* [ ',' literal ] | literal )
//! prefix    := '@' ident [ ':' payload ]
//! ```
//!
//! `@eln,@attrs,@data:/x` asks each source in turn for `/x`; a prefix without a
//! payload borrows the payload of the next prefix that has one, or falls back
//! to the template path itself. A trailing literal is used when no source
//! answers. Expressions are parsed once when the config is loaded.
use std::fmt;

use super::error::MappingError;
use super::value::{Descriptor, LinkTarget, SliceSpec, Value};

pub const WILDCARD: char = '*';

/// Which callback answers a reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prefix {
    Attrs,
    Data,
    Eln,
    Link,
}

impl Prefix {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "attrs" => Some(Self::Attrs),
            "data" => Some(Self::Data),
            "eln" => Some(Self::Eln),
            "link" => Some(Self::Link),
            _ => None,
        }
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Attrs => "attrs",
            Self::Data => "data",
            Self::Eln => "eln",
            Self::Link => "link",
        };
        write!(f, "@{name}")
    }
}

/// One `@prefix:payload` alternative
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub prefix: Prefix,
    /// `None` means the template path is the payload
    pub payload: Option<String>,
}

impl Source {
    /// Payload handed to the callback
    pub fn key<'a>(&'a self, template_path: &'a str) -> &'a str {
        self.payload.as_deref().unwrap_or(template_path)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub sources: Vec<Source>,
    pub fallback: Option<Value>,
    /// Wrap whatever resolves in a compression request
    pub compress: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Value),
    Reference(Reference),
    /// Failure to resolve removes the enclosing group
    Required(Box<Expression>),
    /// Expanded once per name returned by the data source for the pattern
    Wildcard {
        pattern: String,
        inner: Box<Expression>,
    },
}

impl Expression {
    /// Parse the string value of a config entry
    pub fn parse(path: &str, text: &str) -> Result<Self, MappingError> {
        let malformed = |reason: &str| MappingError::MalformedExpression {
            path: path.to_string(),
            reason: reason.to_string(),
        };
        let trimmed = text.trim();
        if let Some(rest) = trimmed.strip_prefix('!') {
            if rest.trim().is_empty() {
                return Err(malformed("'!' must be followed by an expression"));
            }
            let inner = Self::parse(path, rest)?;
            return Ok(match inner {
                Self::Literal(_) => inner,
                Self::Wildcard { pattern, inner } => Self::Wildcard {
                    pattern,
                    inner: Box::new(Self::Required(inner)),
                },
                other => Self::Required(Box::new(other)),
            });
        }
        if !trimmed.starts_with('@') {
            return Ok(Self::Literal(Value::from_literal(text)));
        }

        let mut sources = Vec::new();
        let mut fallback = None;
        let parts = split_alternatives(trimmed);
        let last = parts.len() - 1;
        for (i, part) in parts.into_iter().enumerate() {
            let part = part.trim();
            match part.strip_prefix('@') {
                Some(body) => {
                    let (name, payload) = match body.split_once(':') {
                        Some((name, payload)) => (name, Some(payload)),
                        None => (body, None),
                    };
                    if name.is_empty() {
                        return Err(malformed("'@' must be followed by a prefix name"));
                    }
                    let prefix = Prefix::parse(name).ok_or_else(|| MappingError::UnknownPrefix {
                        path: path.to_string(),
                        prefix: name.to_string(),
                    })?;
                    let payload = match payload.map(str::trim) {
                        Some("") => return Err(malformed("':' must be followed by a payload")),
                        other => other.map(str::to_string),
                    };
                    sources.push(Source { prefix, payload });
                }
                None if i == last && !part.is_empty() => fallback = Some(Value::from_literal(part)),
                None => return Err(malformed("alternatives must start with '@'")),
            }
        }

        // bare prefixes borrow the payload of the next one that has it
        let mut next_payload: Option<String> = None;
        for source in sources.iter_mut().rev() {
            match &source.payload {
                Some(payload) => next_payload = Some(payload.clone()),
                None => source.payload = next_payload.clone(),
            }
        }

        let reference = Self::Reference(Reference {
            sources,
            fallback,
            compress: false,
        });
        Ok(wrap_wildcard(path, reference))
    }

    /// Parse a config object such as `{"link": "/entry/x", "shape": "[:,1]"}`
    /// or `{"compress": "@data:/x"}`. Returns `None` for objects that are not
    /// descriptors.
    pub fn parse_descriptor(
        path: &str,
        object: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Option<Self>, MappingError> {
        let malformed = |reason: String| MappingError::MalformedExpression {
            path: path.to_string(),
            reason,
        };
        if let Some(inner) = object.get("compress") {
            let inner = match inner {
                serde_json::Value::String(text) => Self::parse(path, text)?,
                other => Self::Literal(
                    Value::from_json(other)
                        .ok_or_else(|| malformed(String::from("compress needs a value")))?,
                ),
            };
            return Ok(Some(match inner {
                Self::Literal(value) => Self::Literal(Value::compress(value)),
                Self::Reference(mut reference) => {
                    reference.compress = true;
                    Self::Reference(reference)
                }
                other => {
                    return Err(malformed(format!(
                        "compress cannot wrap {other:?}; use a plain reference"
                    )))
                }
            }));
        }
        let Some(link) = object.get("link") else {
            return Ok(None);
        };
        let descriptor = match (link, object.get("shape")) {
            (serde_json::Value::String(target), None) => Descriptor::Link(LinkTarget::parse(target)),
            (serde_json::Value::String(target), Some(shape)) => {
                let text = match shape {
                    serde_json::Value::String(text) => text.clone(),
                    serde_json::Value::Array(items) => items
                        .iter()
                        .map(|i| match i {
                            serde_json::Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                        .collect::<Vec<_>>()
                        .join(","),
                    other => return Err(malformed(format!("shape {other} is not a selection"))),
                };
                Descriptor::Slice {
                    source: LinkTarget::parse(target),
                    selection: SliceSpec::parse_selection(&text).map_err(malformed)?,
                }
            }
            (serde_json::Value::Array(targets), None) => {
                let targets = targets
                    .iter()
                    .map(|t| {
                        t.as_str()
                            .map(LinkTarget::parse)
                            .ok_or_else(|| malformed(format!("link target {t} is not a string")))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                if targets.is_empty() {
                    return Err(malformed(String::from("link list is empty")));
                }
                Descriptor::Concat(targets)
            }
            (other, _) => return Err(malformed(format!("link {other} is not a target"))),
        };
        Ok(Some(Self::Literal(Value::Descriptor(descriptor))))
    }

    pub fn is_required(&self) -> bool {
        match self {
            Self::Required(_) => true,
            Self::Wildcard { inner, .. } => inner.is_required(),
            _ => false,
        }
    }
}

/// Split at commas that start a new `@` alternative; a last comma followed by
/// anything else separates the literal fallback
fn split_alternatives(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    for (i, _) in text.match_indices(',') {
        if text[i + 1..].trim_start().starts_with('@') {
            parts.push(&text[start..i]);
            start = i + 1;
        }
    }
    let last = &text[start..];
    match last.rfind(',') {
        Some(i) => {
            parts.push(&last[..i]);
            parts.push(&last[i + 1..]);
        }
        None => parts.push(last),
    }
    parts
}

fn wrap_wildcard(path: &str, expression: Expression) -> Expression {
    let pattern = match &expression {
        Expression::Reference(reference) => reference
            .sources
            .iter()
            .filter(|s| s.prefix != Prefix::Link)
            .find_map(|s| s.payload.as_ref().filter(|p| p.contains(WILDCARD)).cloned()),
        _ => None,
    };
    match pattern {
        Some(pattern) if path.contains(WILDCARD) => Expression::Wildcard {
            pattern,
            inner: Box::new(expression),
        },
        _ => expression,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(expression: Expression) -> Reference {
        match expression {
            Expression::Reference(r) => r,
            other => panic!("expected a reference, got {other:?}"),
        }
    }

    #[test]
    fn test_literals_and_prefixes() {
        assert_eq!(
            Expression::parse("/ENTRY[entry]/count", "42").unwrap(),
            Expression::Literal(Value::Int(42))
        );
        let r = reference(Expression::parse("/x", "@eln,@attrs,@data:/meta/T").unwrap());
        assert_eq!(r.sources.len(), 3);
        assert!(r.sources.iter().all(|s| s.payload.as_deref() == Some("/meta/T")));
        assert_eq!(r.sources[0].prefix, Prefix::Eln);

        let r = reference(Expression::parse("/x", "@eln:temp,@attrs:/meta/T").unwrap());
        assert_eq!(r.sources[0].key("/x"), "temp");
        assert_eq!(r.sources[1].key("/x"), "/meta/T");

        let r = reference(Expression::parse("/x", "@eln").unwrap());
        assert_eq!(r.sources[0].key("/x"), "/x");
    }

    #[test]
    fn test_trailing_literal_fallback() {
        let r = reference(Expression::parse("/x", "@eln:temp,295.5").unwrap());
        assert_eq!(r.fallback, Some(Value::Float(295.5)));
        let r = reference(Expression::parse("/x", "@attrs:/meta/mode, fast").unwrap());
        assert_eq!(r.fallback, Some(Value::from("fast")));
    }

    #[test]
    fn test_required_and_wildcard() {
        let e = Expression::parse("/ENTRY[entry]/SAMPLE[sample]/name", "!@eln:sample_name").unwrap();
        assert!(e.is_required());
        let e = Expression::parse("/ENTRY[entry]/data/axis_*", "@data:/axes/*").unwrap();
        match e {
            Expression::Wildcard { pattern, .. } => assert_eq!(pattern, "/axes/*"),
            other => panic!("expected a wildcard, got {other:?}"),
        }
        let e = Expression::parse("/ENTRY[entry]/data/axis_*", "!@data:/axes/*").unwrap();
        assert!(e.is_required());
    }

    #[test]
    fn test_bad_expressions() {
        assert!(matches!(
            Expression::parse("/x", "@bogus:/a"),
            Err(MappingError::UnknownPrefix { .. })
        ));
        assert!(matches!(
            Expression::parse("/x", "@data:"),
            Err(MappingError::MalformedExpression { .. })
        ));
        assert!(matches!(
            Expression::parse("/x", "!"),
            Err(MappingError::MalformedExpression { .. })
        ));
        assert!(matches!(
            Expression::parse("/x", "@:/a"),
            Err(MappingError::MalformedExpression { .. })
        ));
    }

    #[test]
    fn test_descriptor_objects() {
        let object: serde_json::Value =
            serde_json::from_str(r#"{"link": "/entry/cube", "shape": "[:,1,:,:]"}"#).unwrap();
        let e = Expression::parse_descriptor("/x", object.as_object().unwrap())
            .unwrap()
            .unwrap();
        match e {
            Expression::Literal(Value::Descriptor(Descriptor::Slice { selection, .. })) => {
                assert_eq!(selection.len(), 4)
            }
            other => panic!("expected a slice, got {other:?}"),
        }
        let object: serde_json::Value =
            serde_json::from_str(r#"{"compress": "@data:/detector/image"}"#).unwrap();
        let e = Expression::parse_descriptor("/x", object.as_object().unwrap())
            .unwrap()
            .unwrap();
        assert!(reference(e).compress);
        let object: serde_json::Value = serde_json::from_str(r#"{"title": "x"}"#).unwrap();
        assert!(Expression::parse_descriptor("/x", object.as_object().unwrap())
            .unwrap()
            .is_none());
    }
}
