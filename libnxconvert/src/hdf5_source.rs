//! HDF5 input files.
//!
//! Opening a file only indexes its tree and closes it again. Dataset contents
//! are read when the resolver asks for them, reopening the file for each read,
//! so neither large arrays nor file handles are held by the source.
use hdf5::types::{TypeDescriptor, VarLenAscii, VarLenUnicode};
use hdf5::{Container, File, LinkType};
use indexmap::IndexMap;
use ndarray::ArrayD;
use std::path::{Path, PathBuf};

use super::error::SourceError;
use super::source::{expand_pattern, rooted, DataSource, FileIngest};
use super::value::{Array, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Group,
    Dataset,
    Attribute,
}

#[derive(Debug)]
pub struct Hdf5Source {
    name: String,
    path: PathBuf,
    index: IndexMap<String, NodeKind>,
}

impl Hdf5Source {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        if !path.exists() {
            return Err(SourceError::BadFilePath(path.to_path_buf()));
        }
        let file = File::open(path)?;
        let mut index = IndexMap::new();
        index_attributes(&file, "", &mut index)?;
        index_group(&file, "", &mut index)?;
        log::info!(
            "Indexed {} objects in {}",
            index.len(),
            path.display()
        );
        Ok(Self {
            name: path.display().to_string(),
            path: path.to_path_buf(),
            index,
        })
    }

    pub fn kind_of(&self, path: &str) -> Option<NodeKind> {
        self.index.get(&rooted(path)).copied()
    }

    pub fn paths(&self) -> impl Iterator<Item = (&str, NodeKind)> {
        self.index.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Every dataset and attribute, read eagerly
    pub fn read_all(&self) -> IndexMap<String, Value> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) => {
                log::warn!("Could not reopen {}: {e}", self.name);
                return IndexMap::new();
            }
        };
        self.index
            .iter()
            .filter(|(_, kind)| **kind != NodeKind::Group)
            .filter_map(|(path, _)| self.read_logged(&file, path).map(|v| (path.clone(), v)))
            .collect()
    }

    fn read_logged(&self, file: &File, path: &str) -> Option<Value> {
        match self.read(file, path) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("Could not read {path} from {}: {e}", self.name);
                None
            }
        }
    }

    fn read(&self, file: &File, path: &str) -> Result<Option<Value>, hdf5::Error> {
        match self.kind_of(path) {
            Some(NodeKind::Dataset) => read_container(&file.dataset(path)?),
            Some(NodeKind::Attribute) => {
                let (object, name) = split_attribute(path);
                let attribute = match object {
                    "" | "/" => file.attr(name)?,
                    _ => match file.group(object) {
                        Ok(group) => group.attr(name)?,
                        Err(_) => file.dataset(object)?.attr(name)?,
                    },
                };
                read_container(&attribute)
            }
            _ => Ok(None),
        }
    }
}

/// Flatten a whole HDF5 file into path keyed values
pub fn read_flat(path: &Path) -> Result<IndexMap<String, Value>, SourceError> {
    Ok(Hdf5Source::open(path)?.read_all())
}

fn split_attribute(path: &str) -> (&str, &str) {
    match path.rfind("/@") {
        Some(idx) => (&path[..idx], &path[idx + 2..]),
        None => (path, ""),
    }
}

fn index_attributes(
    location: &hdf5::Location,
    path: &str,
    index: &mut IndexMap<String, NodeKind>,
) -> Result<(), hdf5::Error> {
    for name in location.attr_names()? {
        index.insert(format!("{path}/@{name}"), NodeKind::Attribute);
    }
    Ok(())
}

fn index_group(
    group: &hdf5::Group,
    path: &str,
    index: &mut IndexMap<String, NodeKind>,
) -> Result<(), hdf5::Error> {
    let members = group.iter_visit_default(Vec::new(), |_, name, info, members| {
        members.push((name.to_string(), info.link_type));
        true
    })?;
    for (member, link_type) in members {
        let member_path = format!("{path}/{member}");
        if let Ok(child) = group.group(&member) {
            index.insert(member_path.clone(), NodeKind::Group);
            index_attributes(&child, &member_path, index)?;
            // links may point back up the tree
            if matches!(link_type, LinkType::Hard) {
                index_group(&child, &member_path, index)?;
            } else {
                log::debug!("Not descending into linked group {member_path}");
            }
        } else if let Ok(dataset) = group.dataset(&member) {
            index.insert(member_path.clone(), NodeKind::Dataset);
            index_attributes(&dataset, &member_path, index)?;
        } else {
            log::debug!("Skipping {member_path}; it is neither a group nor a dataset");
        }
    }
    Ok(())
}

fn collapse<T: Clone>(
    array: ArrayD<T>,
    scalar: fn(T) -> Value,
    wrap: fn(ArrayD<T>) -> Array,
) -> Value {
    if array.ndim() == 0 {
        if let Some(v) = array.iter().next() {
            return scalar(v.clone());
        }
    }
    Value::Array(wrap(array))
}

/// Read a dataset or attribute into a value, widening to 64 bit types
pub fn read_container(container: &Container) -> Result<Option<Value>, hdf5::Error> {
    let value = match container.dtype()?.to_descriptor()? {
        TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_) => {
            collapse(container.read_dyn::<i64>()?, Value::Int, Array::Int)
        }
        TypeDescriptor::Float(_) => collapse(container.read_dyn::<f64>()?, Value::Float, Array::Float),
        TypeDescriptor::Boolean => collapse(container.read_dyn::<bool>()?, Value::Bool, Array::Bool),
        TypeDescriptor::VarLenAscii | TypeDescriptor::FixedAscii(_) => {
            let strings = container
                .read_dyn::<VarLenAscii>()?
                .mapv(|s| s.as_str().to_string());
            collapse(strings, Value::Str, Array::Str)
        }
        TypeDescriptor::VarLenUnicode | TypeDescriptor::FixedUnicode(_) => {
            let strings = container
                .read_dyn::<VarLenUnicode>()?
                .mapv(|s| s.as_str().to_string());
            collapse(strings, Value::Str, Array::Str)
        }
        other => {
            log::debug!("Skipping unsupported HDF5 type {other:?}");
            return Ok(None);
        }
    };
    Ok(Some(value))
}

impl DataSource for Hdf5Source {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, path: &str) -> Option<Value> {
        let path = rooted(path);
        self.kind_of(&path)?;
        match File::open(&self.path) {
            Ok(file) => self.read_logged(&file, &path),
            Err(e) => {
                log::warn!("Could not reopen {}: {e}", self.name);
                None
            }
        }
    }

    fn get_dims(&self, pattern: &str) -> Vec<String> {
        expand_pattern(pattern, self.index.keys().map(String::as_str))
    }
}

/// Built in adapter for `.h5`, `.hdf5` and `.nxs` files
pub struct Hdf5Ingest;

impl FileIngest for Hdf5Ingest {
    fn name(&self) -> &str {
        "hdf5"
    }

    fn extensions(&self) -> &[&str] {
        &["h5", "hdf5", "nxs"]
    }

    fn ingest(&self, path: &Path) -> Result<Box<dyn DataSource>, SourceError> {
        Ok(Box::new(Hdf5Source::open(path)?))
    }
}
