//! Values held by a template.
//!
//! A value is either concrete data (a scalar or an n-dimensional array) or a
//! descriptor that the writer only resolves when the output file exists: a link,
//! a virtual dataset or a compression request.
use ndarray::{ArrayD, IxDyn};
use std::fmt;
use std::path::PathBuf;

/// Coarse type of a concrete value, compared against the declared NeXus type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Integer,
    Float,
    Bool,
    String,
}

/// N-dimensional homogeneous data
#[derive(Debug, Clone, PartialEq)]
pub enum Array {
    Int(ArrayD<i64>),
    Float(ArrayD<f64>),
    Bool(ArrayD<bool>),
    Str(ArrayD<String>),
}

impl Array {
    pub fn shape(&self) -> Vec<usize> {
        match self {
            Self::Int(a) => a.shape().to_vec(),
            Self::Float(a) => a.shape().to_vec(),
            Self::Bool(a) => a.shape().to_vec(),
            Self::Str(a) => a.shape().to_vec(),
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Int(_) => ValueKind::Integer,
            Self::Float(_) => ValueKind::Float,
            Self::Bool(_) => ValueKind::Bool,
            Self::Str(_) => ValueKind::String,
        }
    }

    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values as strings, used for enumeration checks on string arrays
    pub fn to_strings(&self) -> Vec<String> {
        match self {
            Self::Int(a) => a.iter().map(|v| v.to_string()).collect(),
            Self::Float(a) => a.iter().map(|v| v.to_string()).collect(),
            Self::Bool(a) => a.iter().map(|v| v.to_string()).collect(),
            Self::Str(a) => a.iter().cloned().collect(),
        }
    }
}

/// Location a link or a virtual dataset points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    /// Absolute path inside the file being written
    Internal(String),
    /// Dataset inside another file
    External { file: PathBuf, path: String },
}

impl LinkTarget {
    /// Parse `"/entry/data"` or `"/abs/file.h5:/entry/data"`.
    ///
    /// The split happens at the last `:/` so drive letters stay part of the file name.
    pub fn parse(spec: &str) -> Self {
        match spec.rfind(":/") {
            Some(idx) if idx > 0 && !is_drive_letter(&spec[..idx]) => {
                Self::External {
                    file: PathBuf::from(&spec[..idx]),
                    path: spec[idx + 1..].to_string(),
                }
            }
            _ => Self::Internal(spec.to_string()),
        }
    }

    /// The object path inside whichever file the target lives in
    pub fn object_path(&self) -> &str {
        match self {
            Self::Internal(path) => path,
            Self::External { path, .. } => path,
        }
    }

    /// Replace the leading `/entry/` of an internal target with the given entry name
    pub fn with_entry(&self, entry_name: &str) -> Self {
        match self {
            Self::Internal(path) => Self::Internal(rewrite_entry(path, entry_name)),
            Self::External { file, path } => Self::External {
                file: file.clone(),
                path: path.clone(),
            },
        }
    }
}

fn is_drive_letter(prefix: &str) -> bool {
    prefix.len() == 1 && prefix.chars().all(|c| c.is_ascii_alphabetic())
}

fn rewrite_entry(path: &str, entry_name: &str) -> String {
    match path.strip_prefix("/entry/") {
        Some(rest) => format!("/{entry_name}/{rest}"),
        None if path == "/entry" => format!("/{entry_name}"),
        None => path.to_string(),
    }
}

impl fmt::Display for LinkTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal(path) => write!(f, "{path}"),
            Self::External { file, path } => write!(f, "{}:{path}", file.display()),
        }
    }
}

/// One dimension of a slice descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceSpec {
    /// A single index; the dimension is dropped from the result
    Index(usize),
    /// A half open range; `None` bounds extend to the edge of the dimension
    Range {
        start: Option<usize>,
        stop: Option<usize>,
    },
}

impl SliceSpec {
    pub const FULL: Self = Self::Range {
        start: None,
        stop: None,
    };

    /// Parse a selection such as `[:,1,:,:]`, `(2:5, :)` or `:, 0`
    pub fn parse_selection(text: &str) -> Result<Vec<Self>, String> {
        let inner = text
            .trim()
            .trim_start_matches(['[', '('])
            .trim_end_matches([']', ')']);
        if inner.trim().is_empty() {
            return Err(String::from("selection is empty"));
        }
        inner.split(',').map(|part| Self::parse_one(part.trim())).collect()
    }

    fn parse_one(part: &str) -> Result<Self, String> {
        let parse_bound = |s: &str| -> Result<Option<usize>, String> {
            let s = s.trim();
            if s.is_empty() {
                Ok(None)
            } else {
                s.parse::<usize>()
                    .map(Some)
                    .map_err(|_| format!("invalid slice bound {s:?}"))
            }
        };
        match part.split_once(':') {
            Some((start, stop)) => Ok(Self::Range {
                start: parse_bound(start)?,
                stop: parse_bound(stop)?,
            }),
            None => part
                .parse::<usize>()
                .map(Self::Index)
                .map_err(|_| format!("invalid slice index {part:?}")),
        }
    }
}

/// Values the writer resolves against the output file
#[derive(Debug, Clone, PartialEq)]
pub enum Descriptor {
    Link(LinkTarget),
    Concat(Vec<LinkTarget>),
    Slice {
        source: LinkTarget,
        selection: Vec<SliceSpec>,
    },
    Compress(Box<Value>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Array),
    Descriptor(Descriptor),
}

impl Value {
    /// Convert a literal: integer first, then float, then boolean, else string
    pub fn from_literal(text: &str) -> Self {
        let trimmed = text.trim();
        if let Ok(v) = trimmed.parse::<i64>() {
            return Self::Int(v);
        }
        if let Ok(v) = trimmed.parse::<f64>() {
            return Self::Float(v);
        }
        match trimmed {
            "true" | "True" | "TRUE" => Self::Bool(true),
            "false" | "False" | "FALSE" => Self::Bool(false),
            _ => Self::Str(text.to_string()),
        }
    }

    pub fn link(spec: &str) -> Self {
        Self::Descriptor(Descriptor::Link(LinkTarget::parse(spec)))
    }

    pub fn compress(value: Value) -> Self {
        Self::Descriptor(Descriptor::Compress(Box::new(value)))
    }

    /// The kind of the concrete data, looking through compression. Links and
    /// virtual datasets have no kind until they are written.
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Self::Bool(_) => Some(ValueKind::Bool),
            Self::Int(_) => Some(ValueKind::Integer),
            Self::Float(_) => Some(ValueKind::Float),
            Self::Str(_) => Some(ValueKind::String),
            Self::Array(a) => Some(a.kind()),
            Self::Descriptor(Descriptor::Compress(inner)) => inner.kind(),
            Self::Descriptor(_) => None,
        }
    }

    /// Shape of the concrete data; scalars have rank zero
    pub fn shape(&self) -> Option<Vec<usize>> {
        match self {
            Self::Array(a) => Some(a.shape()),
            Self::Descriptor(Descriptor::Compress(inner)) => inner.shape(),
            Self::Descriptor(_) => None,
            _ => Some(Vec::new()),
        }
    }

    pub fn is_descriptor(&self) -> bool {
        matches!(self, Self::Descriptor(d) if !matches!(d, Descriptor::Compress(_)))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Values as strings, used for enumeration checks
    pub fn to_strings(&self) -> Vec<String> {
        match self {
            Self::Bool(v) => vec![v.to_string()],
            Self::Int(v) => vec![v.to_string()],
            Self::Float(v) => vec![v.to_string()],
            Self::Str(v) => vec![v.clone()],
            Self::Array(a) => a.to_strings(),
            Self::Descriptor(Descriptor::Compress(inner)) => inner.to_strings(),
            Self::Descriptor(_) => Vec::new(),
        }
    }

    /// Build a value from parsed JSON. `null` and objects have no value form.
    pub fn from_json(json: &serde_json::Value) -> Option<Self> {
        match json {
            serde_json::Value::Null | serde_json::Value::Object(_) => None,
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float)),
            serde_json::Value::String(s) => Some(Self::Str(s.clone())),
            serde_json::Value::Array(items) => {
                let mut builder = ArrayBuilder::default();
                builder.push_json(items, 0)?;
                builder.finish()
            }
        }
    }

    /// Build a value from parsed YAML. `null`, mappings and tagged values have no value form.
    pub fn from_yaml(yaml: &serde_yaml::Value) -> Option<Self> {
        match yaml {
            serde_yaml::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_yaml::Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float)),
            serde_yaml::Value::String(s) => Some(Self::Str(s.clone())),
            serde_yaml::Value::Sequence(items) => {
                let mut builder = ArrayBuilder::default();
                builder.push_yaml(items, 0)?;
                builder.finish()
            }
            _ => None,
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<ArrayD<f64>> for Value {
    fn from(value: ArrayD<f64>) -> Self {
        Self::Array(Array::Float(value))
    }
}

impl From<ArrayD<i64>> for Value {
    fn from(value: ArrayD<i64>) -> Self {
        Self::Array(Array::Int(value))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v:?}"),
            Self::Array(a) => write!(f, "array{:?}", a.shape()),
            Self::Descriptor(Descriptor::Link(t)) => write!(f, "link({t})"),
            Self::Descriptor(Descriptor::Concat(t)) => write!(f, "concat({} sources)", t.len()),
            Self::Descriptor(Descriptor::Slice { source, .. }) => write!(f, "slice({source})"),
            Self::Descriptor(Descriptor::Compress(inner)) => write!(f, "compress({inner})"),
        }
    }
}

#[derive(Debug, Clone)]
enum Element {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

/// Collects nested sequences into a rectangular array
#[derive(Debug, Default)]
struct ArrayBuilder {
    shape: Vec<usize>,
    elements: Vec<Element>,
}

impl ArrayBuilder {
    fn check_dim(&mut self, depth: usize, len: usize) -> Option<()> {
        if depth == self.shape.len() {
            self.shape.push(len);
            Some(())
        } else if self.shape.get(depth) == Some(&len) {
            Some(())
        } else {
            None
        }
    }

    fn push_json(&mut self, items: &[serde_json::Value], depth: usize) -> Option<()> {
        self.check_dim(depth, items.len())?;
        for item in items {
            match item {
                serde_json::Value::Array(inner) => self.push_json(inner, depth + 1)?,
                serde_json::Value::Bool(b) => self.push_leaf(Element::Bool(*b), depth)?,
                serde_json::Value::Number(n) => {
                    let element = match n.as_i64() {
                        Some(v) => Element::Int(v),
                        None => Element::Float(n.as_f64()?),
                    };
                    self.push_leaf(element, depth)?
                }
                serde_json::Value::String(s) => self.push_leaf(Element::Str(s.clone()), depth)?,
                _ => return None,
            }
        }
        Some(())
    }

    fn push_yaml(&mut self, items: &[serde_yaml::Value], depth: usize) -> Option<()> {
        self.check_dim(depth, items.len())?;
        for item in items {
            match item {
                serde_yaml::Value::Sequence(inner) => self.push_yaml(inner, depth + 1)?,
                serde_yaml::Value::Bool(b) => self.push_leaf(Element::Bool(*b), depth)?,
                serde_yaml::Value::Number(n) => {
                    let element = match n.as_i64() {
                        Some(v) => Element::Int(v),
                        None => Element::Float(n.as_f64()?),
                    };
                    self.push_leaf(element, depth)?
                }
                serde_yaml::Value::String(s) => self.push_leaf(Element::Str(s.clone()), depth)?,
                _ => return None,
            }
        }
        Some(())
    }

    fn push_leaf(&mut self, element: Element, depth: usize) -> Option<()> {
        // leaves must all sit at the innermost depth
        if depth + 1 != self.shape.len() {
            return None;
        }
        self.elements.push(element);
        Some(())
    }

    fn finish(self) -> Option<Value> {
        let shape = IxDyn(&self.shape);
        let all = |pred: fn(&Element) -> bool| self.elements.iter().all(pred);
        let array = if all(|e| matches!(e, Element::Int(_))) {
            let data = self
                .elements
                .iter()
                .filter_map(|e| match e {
                    Element::Int(v) => Some(*v),
                    _ => None,
                })
                .collect();
            Array::Int(ArrayD::from_shape_vec(shape, data).ok()?)
        } else if all(|e| matches!(e, Element::Int(_) | Element::Float(_))) {
            let data = self
                .elements
                .iter()
                .filter_map(|e| match e {
                    Element::Int(v) => Some(*v as f64),
                    Element::Float(v) => Some(*v),
                    _ => None,
                })
                .collect();
            Array::Float(ArrayD::from_shape_vec(shape, data).ok()?)
        } else if all(|e| matches!(e, Element::Bool(_))) {
            let data = self
                .elements
                .iter()
                .filter_map(|e| match e {
                    Element::Bool(v) => Some(*v),
                    _ => None,
                })
                .collect();
            Array::Bool(ArrayD::from_shape_vec(shape, data).ok()?)
        } else {
            let data = self
                .elements
                .into_iter()
                .map(|e| match e {
                    Element::Int(v) => v.to_string(),
                    Element::Float(v) => v.to_string(),
                    Element::Bool(v) => v.to_string(),
                    Element::Str(v) => v,
                })
                .collect();
            Array::Str(ArrayD::from_shape_vec(shape, data).ok()?)
        };
        Some(Value::Array(array))
    }
}
