//! In-memory form of an application definition.
//!
//! A [`Schema`] is an immutable tree of [`Concept`]s. Template paths are matched
//! against the tree segment by segment: `TYPE[instance]` segments match the
//! concept whose placeholder is `TYPE`, plain names match literal concept names
//! first and otherwise the best fitting variable name.
use regex::Regex;
use std::path::PathBuf;
use std::str::FromStr;

use super::concept_path::{self, Segment};
use super::constants::NX_UNITLESS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Optionality {
    Required,
    Recommended,
    Optional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConceptKind {
    Group,
    Field,
    Attribute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Application,
    Base,
}

impl FromStr for Category {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "application" => Ok(Self::Application),
            "base" => Ok(Self::Base),
            other => Err(format!("unknown category {other:?}")),
        }
    }
}

/// Declared NeXus type of a field or attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NxType {
    Char,
    Float,
    Int,
    UInt,
    PosInt,
    Number,
    Boolean,
    DateTime,
    Binary,
    CharOrNumber,
}

impl FromStr for NxType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NX_CHAR" => Ok(Self::Char),
            "NX_FLOAT" => Ok(Self::Float),
            "NX_INT" => Ok(Self::Int),
            "NX_UINT" => Ok(Self::UInt),
            "NX_POSINT" => Ok(Self::PosInt),
            "NX_NUMBER" => Ok(Self::Number),
            "NX_BOOLEAN" => Ok(Self::Boolean),
            "NX_DATE_TIME" | "ISO8601" => Ok(Self::DateTime),
            "NX_BINARY" => Ok(Self::Binary),
            "NX_CHAR_OR_NUMBER" => Ok(Self::CharOrNumber),
            other => Err(format!("unknown type {other:?}")),
        }
    }
}

impl NxType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Char => "NX_CHAR",
            Self::Float => "NX_FLOAT",
            Self::Int => "NX_INT",
            Self::UInt => "NX_UINT",
            Self::PosInt => "NX_POSINT",
            Self::Number => "NX_NUMBER",
            Self::Boolean => "NX_BOOLEAN",
            Self::DateTime => "NX_DATE_TIME",
            Self::Binary => "NX_BINARY",
            Self::CharOrNumber => "NX_CHAR_OR_NUMBER",
        }
    }
}

/// One dimension of a declared shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dim {
    Fixed(usize),
    Symbol(String),
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub doc: String,
}

/// How the name of a concept relates to the names of its instances
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameType {
    /// Instances carry exactly this name
    Specified,
    /// Uppercase parts of the name are placeholders
    Partial,
    /// The whole name is a placeholder
    Any,
}

impl NameType {
    /// Classify a name by its letter case
    pub fn infer(name: &str) -> Self {
        let has_upper = name.chars().any(|c| c.is_ascii_uppercase());
        let has_lower = name.chars().any(|c| c.is_ascii_lowercase());
        match (has_upper, has_lower) {
            (true, false) => Self::Any,
            (true, true) if has_placeholder_run(name) => Self::Partial,
            _ => Self::Specified,
        }
    }
}

fn has_placeholder_run(name: &str) -> bool {
    let mut run = 0;
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            run += 1;
            if run >= 2 {
                return true;
            }
        } else {
            run = 0;
        }
    }
    false
}

#[derive(Debug, Clone)]
pub struct Concept {
    pub name: String,
    pub name_type: NameType,
    pub kind: ConceptKind,
    /// NeXus class of groups, e.g. `NXentry`
    pub nx_class: Option<String>,
    pub optionality: Optionality,
    pub min_occurs: u32,
    /// `None` means unbounded
    pub max_occurs: Option<u32>,
    pub dtype: Option<NxType>,
    pub enumeration: Vec<String>,
    pub open_enumeration: bool,
    pub dims: Option<Vec<Dim>>,
    /// Unit category such as `NX_LENGTH`
    pub units: Option<String>,
    pub deprecated: Option<String>,
    /// Set on `@units` attributes added for fields that declare a unit category
    pub implied: bool,
    pub children: Vec<Concept>,
    pattern: Option<Regex>,
}

impl Concept {
    pub fn new(name: &str, kind: ConceptKind, name_type: NameType) -> Self {
        let pattern = match name_type {
            NameType::Specified => None,
            _ => build_name_pattern(name),
        };
        Self {
            name: name.to_string(),
            name_type,
            kind,
            nx_class: None,
            optionality: Optionality::Required,
            min_occurs: 1,
            max_occurs: Some(1),
            dtype: None,
            enumeration: Vec::new(),
            open_enumeration: false,
            dims: None,
            units: None,
            deprecated: None,
            implied: false,
            children: Vec::new(),
            pattern,
        }
    }

    pub fn is_group(&self) -> bool {
        self.kind == ConceptKind::Group
    }

    pub fn is_variable(&self) -> bool {
        self.name_type == NameType::Any
    }

    /// Unit category that requires a unit attribute
    pub fn unit_category(&self) -> Option<&str> {
        self.units.as_deref().filter(|u| *u != NX_UNITLESS)
    }

    /// Default instance name, the lowercased placeholder for variable names
    pub fn default_instance(&self) -> String {
        match self.name_type {
            NameType::Any => self.name.to_lowercase(),
            _ => self.name.clone(),
        }
    }

    /// Path component of an instance of this concept
    pub fn template_segment(&self, instance: Option<&str>) -> String {
        let instance = instance
            .map(str::to_string)
            .unwrap_or_else(|| self.default_instance());
        match (self.kind, self.name_type) {
            (ConceptKind::Attribute, _) => format!("@{instance}"),
            (_, NameType::Any) => format!("{}[{instance}]", self.name),
            _ => instance,
        }
    }

    /// Score how well a concrete name fits this concept; `None` when it does not fit.
    ///
    /// Exact names score highest, then case-insensitive matches of a placeholder,
    /// then pattern matches by the number of literal characters they pin down.
    pub fn name_fit(&self, name: &str) -> Option<usize> {
        if self.name == name {
            return Some(usize::MAX);
        }
        let pattern = self.pattern.as_ref()?;
        if self.name.eq_ignore_ascii_case(name) {
            return Some(usize::MAX / 2);
        }
        if pattern.is_match(name) {
            let literal = self
                .name
                .chars()
                .filter(|c| !c.is_ascii_uppercase())
                .count();
            Some(literal)
        } else {
            None
        }
    }

    fn attributes(&self) -> impl Iterator<Item = &Concept> {
        self.children
            .iter()
            .filter(|c| c.kind == ConceptKind::Attribute)
    }

    fn members(&self) -> impl Iterator<Item = &Concept> {
        self.children
            .iter()
            .filter(|c| c.kind != ConceptKind::Attribute)
    }

    pub fn child(&self, name: &str) -> Option<&Concept> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Find the child concept a template path segment refers to
    pub fn match_segment(&self, segment: &Segment) -> Option<&Concept> {
        if segment.is_attribute {
            return best_fit(self.attributes(), segment.name);
        }
        if let Some(class) = segment.class {
            if let Some(found) = self.members().find(|c| c.is_variable() && c.name == class) {
                return Some(found);
            }
            if let Some(found) = self
                .members()
                .find(|c| c.name_type == NameType::Specified && c.name == class)
            {
                return Some(found);
            }
            return best_fit(self.members(), segment.name);
        }
        if let Some(found) = self
            .members()
            .find(|c| c.name_type == NameType::Specified && c.name == segment.name)
        {
            return Some(found);
        }
        if let Some(found) = self
            .members()
            .find(|c| c.is_group() && c.is_variable() && c.name.eq_ignore_ascii_case(segment.name))
        {
            return Some(found);
        }
        best_fit(self.members().filter(|c| !c.is_group()), segment.name)
    }
}

fn best_fit<'a>(candidates: impl Iterator<Item = &'a Concept>, name: &str) -> Option<&'a Concept> {
    let mut best: Option<(usize, &Concept)> = None;
    for candidate in candidates {
        if let Some(score) = candidate.name_fit(name) {
            match best {
                Some((best_score, _)) if best_score >= score => (),
                _ => best = Some((score, candidate)),
            }
        }
    }
    best.map(|(_, concept)| concept)
}

/// Regex where every run of uppercase letters (with digits and inner
/// underscores) stands for an arbitrary name part
fn build_name_pattern(name: &str) -> Option<Regex> {
    let mut pattern = String::from("^");
    let mut literal = String::new();
    let mut chars = name.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_ascii_uppercase() {
            pattern.push_str(&regex::escape(&literal));
            literal.clear();
            while let Some(next) = chars.peek() {
                if next.is_ascii_uppercase() || next.is_ascii_digit() {
                    chars.next();
                } else {
                    break;
                }
            }
            pattern.push_str(".+");
        } else {
            literal.push(c);
        }
    }
    pattern.push_str(&regex::escape(&literal));
    pattern.push('$');
    Regex::new(&pattern).ok()
}

/// A template path of the empty template together with its bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSeed {
    pub path: String,
    pub optionality: Optionality,
    pub is_group: bool,
}

#[derive(Debug, Clone)]
pub struct Schema {
    /// Name of the definition, e.g. `NXmpes`
    pub name: String,
    pub category: Category,
    pub extends: Option<String>,
    pub symbols: Vec<Symbol>,
    /// Root concept; its children are the top level groups of the file
    pub root: Concept,
    pub source: PathBuf,
}

impl Schema {
    /// Find the concept a template path refers to
    pub fn find(&self, path: &str) -> Option<&Concept> {
        let mut current = &self.root;
        for segment in concept_path::segments(path) {
            current = current.match_segment(&Segment::parse(segment))?;
        }
        if std::ptr::eq(current, &self.root) {
            None
        } else {
            Some(current)
        }
    }

    /// The concepts along a template path, root excluded. Stops at the first
    /// segment that does not match.
    pub fn find_chain(&self, path: &str) -> Vec<&Concept> {
        let mut chain = Vec::new();
        let mut current = &self.root;
        for segment in concept_path::segments(path) {
            match current.match_segment(&Segment::parse(segment)) {
                Some(next) => {
                    chain.push(next);
                    current = next;
                }
                None => break,
            }
        }
        chain
    }

    pub fn optionality_of(&self, path: &str) -> Option<Optionality> {
        self.find(path).map(|c| c.optionality)
    }

    /// NeXus class of the group at a template path
    pub fn group_class_of(&self, path: &str) -> Option<&str> {
        self.find(path)
            .filter(|c| c.is_group())
            .and_then(|c| c.nx_class.as_deref())
    }

    pub fn is_symbol(&self, name: &str) -> bool {
        self.symbols.iter().any(|s| s.name == name)
    }

    /// Every path of the empty template, in schema order
    pub fn template_seeds(&self) -> Vec<TemplateSeed> {
        let mut seeds = Vec::new();
        for child in &self.root.children {
            collect_seeds(child, "", None, &mut seeds);
        }
        seeds
    }

    /// Empty template paths of one more instance of a top level group
    pub fn template_seeds_for(&self, placeholder: &str, instance: &str) -> Vec<TemplateSeed> {
        let mut seeds = Vec::new();
        if let Some(concept) = self
            .root
            .children
            .iter()
            .find(|c| c.name == placeholder)
        {
            collect_seeds(concept, "", Some(instance), &mut seeds);
        }
        seeds
    }

    /// Paths of schema leaves (fields and attributes) with default instance names
    pub fn leaf_paths(&self) -> Vec<String> {
        self.template_seeds()
            .into_iter()
            .filter(|s| !s.is_group)
            .map(|s| s.path)
            .collect()
    }
}

/// Returns true when the subtree holds a required leaf
fn collect_seeds(
    concept: &Concept,
    parent: &str,
    instance: Option<&str>,
    seeds: &mut Vec<TemplateSeed>,
) -> bool {
    let path = concept_path::join(parent, &concept.template_segment(instance));
    if !concept.is_group() {
        seeds.push(TemplateSeed {
            path: path.clone(),
            optionality: concept.optionality,
            is_group: false,
        });
        let mut required = concept.optionality == Optionality::Required;
        for attribute in &concept.children {
            required |= collect_seeds(attribute, &path, None, seeds);
        }
        return required;
    }
    let group_index = seeds.len();
    let mut hosts_required = false;
    for child in &concept.children {
        hosts_required |= collect_seeds(child, &path, None, seeds);
    }
    if hosts_required {
        seeds.insert(
            group_index,
            TemplateSeed {
                path,
                optionality: Optionality::Optional,
                is_group: true,
            },
        );
    }
    hosts_required
}
