//! Reads NXDL documents into [`Schema`]s.
//!
//! The XML is first collected into a small element tree with `quick-xml` and
//! then converted into concepts. Definitions are looked up by name in the
//! `applications`, `base_classes` and `contributed_definitions` directories of
//! a definitions root, in that order.
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::constants::{DEFINITION_DIRECTORIES, NXDL_SUFFIX, NX_OBJECT_CLASS, UNITS_ATTR};
use super::error::SchemaError;
use super::schema::{
    Category, Concept, ConceptKind, Dim, NameType, NxType, Optionality, Schema, Symbol,
};

/// Finds and loads definitions below a definitions root
#[derive(Debug, Clone)]
pub struct SchemaLocator {
    root: PathBuf,
}

impl SchemaLocator {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a definition name (`NXmpes`, `NXmpes.nxdl.xml`) or a path to a file
    pub fn locate(&self, name: &str) -> Result<PathBuf, SchemaError> {
        let as_path = PathBuf::from(name);
        if as_path.is_file() {
            return Ok(as_path);
        }
        let stem = name.trim_end_matches(NXDL_SUFFIX);
        for directory in DEFINITION_DIRECTORIES {
            let candidate = self.root.join(directory).join(format!("{stem}{NXDL_SUFFIX}"));
            if candidate.is_file() {
                log::debug!("Found definition {stem} at {}", candidate.display());
                return Ok(candidate);
            }
        }
        Err(SchemaError::SchemaNotFound(name.to_string()))
    }

    /// Load a definition and merge in the application definitions it extends
    pub fn load(&self, name: &str) -> Result<Schema, SchemaError> {
        let path = self.locate(name)?;
        let text = std::fs::read_to_string(&path)?;
        let mut schema = parse_nxdl(&text, &path)?;

        let mut seen = vec![schema.name.clone()];
        let mut next = schema.extends.clone();
        while let Some(parent_name) = next.take() {
            if parent_name == NX_OBJECT_CLASS || seen.contains(&parent_name) {
                break;
            }
            let parent = match self.locate(&parent_name) {
                Ok(parent_path) => parse_nxdl(&std::fs::read_to_string(&parent_path)?, &parent_path)?,
                Err(_) => {
                    log::warn!(
                        "{} extends {parent_name}, which could not be found; using it as is",
                        schema.name
                    );
                    break;
                }
            };
            if parent.category != Category::Application {
                break;
            }
            log::debug!("Merging {} into {}", parent.name, schema.name);
            seen.push(parent.name.clone());
            next = parent.extends.clone();
            merge_children(&mut schema.root, parent.root);
            for symbol in parent.symbols {
                if !schema.is_symbol(&symbol.name) {
                    schema.symbols.push(symbol);
                }
            }
        }
        log::info!(
            "Loaded definition {} from {}",
            schema.name,
            schema.source.display()
        );
        Ok(schema)
    }
}

/// Put the inherited concepts first; concepts of the child override by name
fn merge_children(child: &mut Concept, parent: Concept) {
    let mut merged = Vec::with_capacity(parent.children.len() + child.children.len());
    let mut own = std::mem::take(&mut child.children);
    for inherited in parent.children {
        match own.iter().position(|c| c.name == inherited.name && c.kind == inherited.kind) {
            Some(idx) => {
                let mut overriding = own.remove(idx);
                inherit_unset(&mut overriding, &inherited);
                merge_children(&mut overriding, inherited);
                let optionality = overriding.optionality;
                for units in overriding.children.iter_mut().filter(|c| c.implied) {
                    units.optionality = optionality;
                }
                merged.push(overriding);
            }
            None => merged.push(inherited),
        }
    }
    merged.extend(own);
    child.children = merged;
}

/// An override only replaces what it declares itself
fn inherit_unset(overriding: &mut Concept, inherited: &Concept) {
    if overriding.nx_class.is_none() {
        overriding.nx_class = inherited.nx_class.clone();
    }
    if overriding.dtype.is_none() {
        overriding.dtype = inherited.dtype;
    }
    if overriding.enumeration.is_empty() {
        overriding.enumeration = inherited.enumeration.clone();
        overriding.open_enumeration = inherited.open_enumeration;
    }
    if overriding.dims.is_none() {
        overriding.dims = inherited.dims.clone();
    }
    if overriding.units.is_none() {
        overriding.units = inherited.units.clone();
    }
    if overriding.deprecated.is_none() {
        overriding.deprecated = inherited.deprecated.clone();
    }
}

/// Minimal element tree of an XML document
#[derive(Debug, Default)]
struct XmlElement {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<XmlElement>,
    text: String,
}

impl XmlElement {
    fn from_start(start: &BytesStart) -> Result<Self, quick_xml::Error> {
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            attributes.push((key, value));
        }
        Ok(Self {
            name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
            attributes,
            children: Vec::new(),
            text: String::new(),
        })
    }

    fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn flag(&self, key: &str) -> bool {
        self.attr(key).is_some_and(|v| v == "true")
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |c| c.name == name)
    }
}

fn read_tree(text: &str, path: &Path) -> Result<XmlElement, SchemaError> {
    let parse_error = |message: String| SchemaError::SchemaParseError {
        path: path.to_path_buf(),
        message,
    };
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;
    loop {
        let event = reader.read_event().map_err(|e| {
            parse_error(format!("{e} at byte {}", reader.buffer_position()))
        })?;
        match event {
            Event::Start(start) => {
                stack.push(XmlElement::from_start(&start).map_err(|e| parse_error(e.to_string()))?)
            }
            Event::Empty(start) => {
                let element =
                    XmlElement::from_start(&start).map_err(|e| parse_error(e.to_string()))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| parse_error(String::from("unbalanced closing tag")))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            Event::Text(content) => {
                if let Some(current) = stack.last_mut() {
                    let text = content.unescape().map_err(|e| parse_error(e.to_string()))?;
                    current.text.push_str(&text);
                }
            }
            Event::Eof => break,
            _ => (),
        }
    }
    if !stack.is_empty() {
        return Err(parse_error(String::from("document ended inside an element")));
    }
    root.ok_or_else(|| parse_error(String::from("document has no root element")))
}

/// Parse the text of an NXDL document
pub fn parse_nxdl(text: &str, path: &Path) -> Result<Schema, SchemaError> {
    let invalid = |message: String| SchemaError::SchemaInvalid {
        path: path.to_path_buf(),
        message,
    };
    let root = read_tree(text, path)?;
    if root.name != "definition" {
        return Err(invalid(format!(
            "root element is <{}>, expected <definition>",
            root.name
        )));
    }
    let name = root
        .attr("name")
        .ok_or_else(|| invalid(String::from("definition has no name")))?
        .to_string();
    let category = Category::from_str(
        root.attr("category")
            .ok_or_else(|| invalid(String::from("definition has no category")))?,
    )
    .map_err(invalid)?;

    let symbols = root
        .children_named("symbols")
        .flat_map(|s| s.children_named("symbol"))
        .filter_map(|s| {
            s.attr("name").map(|n| Symbol {
                name: n.to_string(),
                doc: s
                    .children_named("doc")
                    .next()
                    .map(|d| d.text.trim().to_string())
                    .unwrap_or_default(),
            })
        })
        .collect::<Vec<_>>();

    let mut root_concept = Concept::new(&name, ConceptKind::Group, NameType::Specified);
    root_concept.nx_class = Some(name.clone());
    let builder = ConceptBuilder {
        category,
        symbols: &symbols,
        path,
    };
    root_concept.children = builder.children_of(&root)?;

    Ok(Schema {
        name,
        category,
        extends: root.attr("extends").map(str::to_string),
        symbols,
        root: root_concept,
        source: path.to_path_buf(),
    })
}

struct ConceptBuilder<'a> {
    category: Category,
    symbols: &'a [Symbol],
    path: &'a Path,
}

impl ConceptBuilder<'_> {
    fn invalid(&self, message: String) -> SchemaError {
        SchemaError::SchemaInvalid {
            path: self.path.to_path_buf(),
            message,
        }
    }

    fn children_of(&self, element: &XmlElement) -> Result<Vec<Concept>, SchemaError> {
        let mut concepts = Vec::new();
        for child in &element.children {
            let kind = match child.name.as_str() {
                "group" => ConceptKind::Group,
                "field" => ConceptKind::Field,
                "attribute" => ConceptKind::Attribute,
                "choice" | "link" | "doc" | "dimensions" | "enumeration" | "symbols" => continue,
                other => {
                    log::debug!("Ignoring <{other}> in {}", self.path.display());
                    continue;
                }
            };
            concepts.push(self.concept(child, kind)?);
        }
        Ok(concepts)
    }

    fn concept(&self, element: &XmlElement, kind: ConceptKind) -> Result<Concept, SchemaError> {
        let nx_class = match kind {
            ConceptKind::Group => Some(
                element
                    .attr("type")
                    .ok_or_else(|| self.invalid(String::from("group without a type")))?
                    .to_string(),
            ),
            _ => None,
        };
        let name = match (element.attr("name"), &nx_class) {
            (Some(name), _) => name.to_string(),
            (None, Some(class)) => class.trim_start_matches("NX").to_uppercase(),
            (None, None) => {
                return Err(self.invalid(format!("<{}> without a name", element.name)))
            }
        };
        let name_type = match element.attr("nameType") {
            Some("any") => NameType::Any,
            Some("partial") => NameType::Partial,
            Some("specified") => NameType::Specified,
            _ if element.attr("name").is_none() => NameType::Any,
            _ => NameType::infer(&name),
        };

        let mut concept = Concept::new(&name, kind, name_type);
        concept.nx_class = nx_class;
        concept.optionality = self.optionality(element);
        concept.min_occurs = match element.attr("minOccurs") {
            Some(v) => v
                .parse()
                .map_err(|_| self.invalid(format!("{name}: bad minOccurs {v:?}")))?,
            None if concept.optionality == Optionality::Required => 1,
            None => 0,
        };
        concept.max_occurs = match element.attr("maxOccurs") {
            Some("unbounded") => None,
            Some(v) => Some(
                v.parse()
                    .map_err(|_| self.invalid(format!("{name}: bad maxOccurs {v:?}")))?,
            ),
            None if concept.is_variable() => None,
            None => Some(1),
        };
        concept.dtype = match element.attr("type") {
            Some(t) if kind != ConceptKind::Group => match NxType::from_str(t) {
                Ok(dtype) => Some(dtype),
                Err(e) => {
                    log::warn!("{name}: {e}; leaving the type unchecked");
                    None
                }
            },
            _ => None,
        };
        concept.units = element.attr("units").map(str::to_string);
        concept.deprecated = element.attr("deprecated").map(str::to_string);

        if let Some(enumeration) = element.children_named("enumeration").next() {
            concept.open_enumeration = enumeration.flag("open");
            concept.enumeration = enumeration
                .children_named("item")
                .filter_map(|item| item.attr("value").map(str::to_string))
                .collect();
        }
        if let Some(dimensions) = element.children_named("dimensions").next() {
            concept.dims = Some(self.dims(dimensions, &name)?);
        }

        concept.children = self.children_of(element)?;
        if kind == ConceptKind::Field
            && concept.unit_category().is_some()
            && concept.child(UNITS_ATTR).is_none()
        {
            let mut units = Concept::new(UNITS_ATTR, ConceptKind::Attribute, NameType::Specified);
            units.optionality = concept.optionality;
            units.dtype = Some(NxType::Char);
            units.implied = true;
            concept.children.push(units);
        }
        Ok(concept)
    }

    fn optionality(&self, element: &XmlElement) -> Optionality {
        if self.category == Category::Base {
            return Optionality::Optional;
        }
        if element.flag("recommended") {
            Optionality::Recommended
        } else if element.flag("optional")
            || element.attr("minOccurs") == Some("0")
            || element.attr("required") == Some("false")
        {
            Optionality::Optional
        } else {
            Optionality::Required
        }
    }

    fn dims(&self, dimensions: &XmlElement, name: &str) -> Result<Vec<Dim>, SchemaError> {
        let mut indexed: Vec<(usize, Dim)> = Vec::new();
        for (position, dim) in dimensions.children_named("dim").enumerate() {
            let index = match dim.attr("index") {
                Some(i) => i
                    .parse::<usize>()
                    .map_err(|_| self.invalid(format!("{name}: bad dim index {i:?}")))?,
                None => position + 1,
            };
            let value = match dim.attr("value") {
                Some(v) => match v.parse::<usize>() {
                    Ok(size) => Dim::Fixed(size),
                    Err(_) => {
                        if !self.symbols.iter().any(|s| s.name == v) {
                            log::debug!("{name}: dimension {v} is not a declared symbol");
                        }
                        Dim::Symbol(v.to_string())
                    }
                },
                None => Dim::Any,
            };
            indexed.push((index, value));
        }
        indexed.sort_by_key(|(index, _)| *index);
        let mut dims: Vec<Dim> = indexed.into_iter().map(|(_, d)| d).collect();
        if let Some(rank) = dimensions.attr("rank").and_then(|r| r.parse::<usize>().ok()) {
            dims.resize(rank.max(dims.len()), Dim::Any);
        }
        Ok(dims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{write_definitions, MINIMAL_NXDL};

    #[test]
    fn test_parse_minimal_definition() {
        let schema = parse_nxdl(MINIMAL_NXDL, Path::new("NXtest.nxdl.xml")).unwrap();
        assert_eq!(schema.name, "NXtest");
        assert_eq!(schema.category, Category::Application);
        assert_eq!(schema.symbols.len(), 2);

        let title = schema.find("/ENTRY[entry]/title").unwrap();
        assert_eq!(title.optionality, Optionality::Required);
        assert_eq!(title.dtype, Some(NxType::Char));

        let temperature = schema.find("/ENTRY[entry]/temperature").unwrap();
        assert_eq!(temperature.optionality, Optionality::Recommended);
        assert_eq!(temperature.units.as_deref(), Some("NX_TEMPERATURE"));
        let units = schema.find("/ENTRY[entry]/temperature/@units").unwrap();
        assert!(units.implied);

        let mode = schema.find("/ENTRY[entry]/mode").unwrap();
        assert_eq!(mode.enumeration, vec!["fast", "slow"]);

        let image = schema.find("/ENTRY[entry]/data/image").unwrap();
        assert_eq!(
            image.dims,
            Some(vec![Dim::Symbol(String::from("n_y")), Dim::Symbol(String::from("n_x"))])
        );
        assert_eq!(
            schema.group_class_of("/ENTRY[entry]/SAMPLE[sample]"),
            Some("NXsample")
        );
    }

    #[test]
    fn test_malformed_and_invalid_documents() {
        let broken = "<definition name=\"NXbad\" category=\"application\"><group type=\"NXentry\">";
        assert!(matches!(
            parse_nxdl(broken, Path::new("bad.xml")),
            Err(SchemaError::SchemaParseError { .. })
        ));
        let unknown = "<definition name=\"NXbad\" category=\"weird\"/>";
        assert!(matches!(
            parse_nxdl(unknown, Path::new("bad.xml")),
            Err(SchemaError::SchemaInvalid { .. })
        ));
    }

    #[test]
    fn test_locator_search_order_and_extends() {
        let root = write_definitions();
        let locator = SchemaLocator::new(root.path());
        assert!(matches!(
            locator.locate("NXmissing"),
            Err(SchemaError::SchemaNotFound(_))
        ));
        let schema = locator.load("NXchild").unwrap();
        // inherited from NXtest
        assert!(schema.find("/ENTRY[entry]/title").is_some());
        // added by the child
        assert!(schema.find("/ENTRY[entry]/operator").is_some());
        // overridden by the child
        let mode = schema.find("/ENTRY[entry]/mode").unwrap();
        assert_eq!(mode.optionality, Optionality::Recommended);
        // an override keeps what it does not redeclare
        assert_eq!(mode.enumeration, vec!["fast", "slow"]);
        let temperature = schema.find("/ENTRY[entry]/temperature").unwrap();
        assert_eq!(temperature.optionality, Optionality::Optional);
        assert_eq!(temperature.dtype, Some(NxType::Float));
        assert_eq!(temperature.units.as_deref(), Some("NX_TEMPERATURE"));
        assert_eq!(
            schema.find("/ENTRY[entry]/temperature/@units").unwrap().optionality,
            Optionality::Optional
        );
    }
}
