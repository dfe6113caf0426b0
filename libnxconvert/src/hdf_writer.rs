use fxhash::FxHashMap;
use hdf5::types::{TypeDescriptor, VarLenUnicode};
use hdf5::{Extents, File, Group, H5Type, Hyperslab, Location, Selection, SliceOrIndex};
use ndarray::ArrayD;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use super::concept_path::{self, Segment};
use super::constants::{
    DEFAULT_COMPRESSION_LEVEL, FORMAT_VERSION, NX_CLASS_ATTR, NX_ROOT_CLASS,
};
use super::diagnostics::{Diagnostic, DiagnosticCode, Report};
use super::error::WriterError;
use super::schema::Schema;
use super::template::Template;
use super::value::{Array, Descriptor, LinkTarget, Value};
use super::virtual_layout::{chunk_shape, plan_concat, plan_slice, AxisSelection, VirtualPlan};

const CREATOR_ATTR: &str = "creator";
const DEFINITION_ATTR: &str = "definition";
const FILE_NAME_ATTR: &str = "file_name";
const FILE_TIME_ATTR: &str = "file_time";
/// HDF5 name for "the file holding the virtual dataset"
const SAME_FILE: &str = ".";

#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// Deflate level of datasets marked for compression
    pub compression_level: u8,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

/// Serializes a template into a NeXus HDF5 file.
///
/// Writing happens in passes: plain datasets first, then links, then virtual
/// datasets (whose internal sources must already exist), then attributes.
/// Failures of a single path become diagnostics; only failing to create or
/// close the file is fatal.
#[derive(Debug)]
pub struct NexusWriter {
    file: File,
    path: PathBuf,
    schema: Option<Arc<Schema>>,
    options: WriterOptions,
    /// NX_class values given explicitly in the template, by concept path of the group
    classes: FxHashMap<String, String>,
    report: Report,
}
// Layout
// / - NX_class, creator, definition, file_name, file_time, default
// |---- entry (NXentry) - default
// |    |---- instrument (NXinstrument)
// |    |    |---- name(dset)
// |    |---- data (NXdata) - signal, axes
// |    |    |---- image(dset, maybe compressed or virtual)
// |    |    |---- x(dset or link)

impl NexusWriter {
    /// Create the output file, truncating anything already at `path`
    pub fn new(
        path: &Path,
        schema: Option<Arc<Schema>>,
        options: WriterOptions,
    ) -> Result<Self, WriterError> {
        let file = File::create(path)?;
        log::info!("Created output file {}", path.display());
        Ok(Self {
            file,
            path: path.to_path_buf(),
            schema,
            options,
            classes: FxHashMap::default(),
            report: Report::new(),
        })
    }

    /// Write every path of the template that holds a value, then close the file
    pub fn write(mut self, template: &Template) -> Result<Report, WriterError> {
        let mut datasets = Vec::new();
        let mut links = Vec::new();
        let mut virtuals = Vec::new();
        let mut attributes = Vec::new();
        for (path, value) in template.values() {
            if concept_path::is_attribute_path(path) {
                if Segment::parse(concept_path::last_segment(path)).name == NX_CLASS_ATTR {
                    if let (Some(group), Some(class)) = (concept_path::parent(path), value.as_str()) {
                        self.classes.insert(group.to_string(), class.to_string());
                    }
                }
                attributes.push((path, value));
                continue;
            }
            match value {
                Value::Descriptor(Descriptor::Link(target)) => links.push((path, target)),
                Value::Descriptor(descriptor @ (Descriptor::Concat(_) | Descriptor::Slice { .. })) => {
                    virtuals.push((path, descriptor))
                }
                _ => datasets.push((path, value)),
            }
        }

        for (path, value) in &datasets {
            let result = self.write_dataset(path, value);
            self.record(path, result);
        }
        for (path, target) in &links {
            let result = self.write_link(path, target);
            self.record(path, result);
        }
        for (path, descriptor) in &virtuals {
            let result = self.write_virtual(path, descriptor);
            self.record(path, result);
        }
        for (path, value) in &attributes {
            let object = concept_path::parent(path).unwrap_or("/");
            if self.is_orphan(template, object) {
                log::warn!("Skipping {path}; {object} is not in the template");
                self.report.push(Diagnostic::warning(
                    path,
                    DiagnosticCode::WriteError,
                    format!("{object} holds no value, so its attribute was not written"),
                ));
                continue;
            }
            let result = self.write_attribute(path, value);
            self.record(path, result);
        }
        self.write_root_attributes()?;
        self.check_links(&links);

        let Self {
            file, path, report, ..
        } = self;
        file.close()?;
        let size = std::fs::metadata(&path)?.len();
        log::info!(
            "Wrote {} ({}) with {} datasets, {} links and {} virtual datasets",
            path.display(),
            human_bytes::human_bytes(size as f64),
            datasets.len(),
            links.len(),
            virtuals.len()
        );
        Ok(report)
    }

    fn record(&mut self, path: &str, result: Result<(), WriterError>) {
        let Err(e) = result else {
            return;
        };
        let code = match &e {
            WriterError::VirtualShapeMismatch { .. } => DiagnosticCode::VirtualShapeMismatch,
            WriterError::LinkTargetMissing { .. } => DiagnosticCode::LinkTargetMissing,
            _ => DiagnosticCode::WriteError,
        };
        log::warn!("Could not write {path}: {e}");
        self.report
            .push(Diagnostic::error(path, code, e.to_string()));
    }

    fn group_class(&self, concept_prefix: &str, segment: &Segment) -> Option<String> {
        if let Some(class) = self.classes.get(concept_prefix) {
            return Some(class.clone());
        }
        if let Some(class) = self
            .schema
            .as_ref()
            .and_then(|s| s.group_class_of(concept_prefix))
        {
            return Some(class.to_string());
        }
        segment
            .class
            .map(|placeholder| format!("NX{}", placeholder.to_lowercase()))
    }

    /// Open the group at a concept path, creating missing groups along the way
    fn ensure_group(&self, path: &str) -> Result<Group, WriterError> {
        let mut group = self.file.group("/")?;
        let mut concept_prefix = String::new();
        for segment in concept_path::segments(path) {
            concept_prefix = concept_path::join(&concept_prefix, segment);
            let parsed = Segment::parse(segment);
            group = match group.group(parsed.name) {
                Ok(existing) => existing,
                Err(_) => {
                    let created = group.create_group(parsed.name)?;
                    if let Some(class) = self.group_class(&concept_prefix, &parsed) {
                        scalar_attr(&created, NX_CLASS_ATTR, &unicode(path, &class)?)?;
                    }
                    created
                }
            };
        }
        Ok(group)
    }

    /// Parent group and object name of a concept path
    fn locate<'p>(&self, path: &'p str) -> Result<(Group, &'p str), WriterError> {
        let parent = concept_path::parent(path).unwrap_or("/");
        let name = Segment::parse(concept_path::last_segment(path)).name;
        Ok((self.ensure_group(parent)?, name))
    }

    fn write_dataset(&self, path: &str, value: &Value) -> Result<(), WriterError> {
        let (group, name) = self.locate(path)?;
        match value {
            Value::Descriptor(Descriptor::Compress(inner)) => {
                write_data(&group, name, path, inner, Some(self.options.compression_level))
            }
            other => write_data(&group, name, path, other, None),
        }
    }

    fn write_link(&self, path: &str, target: &LinkTarget) -> Result<(), WriterError> {
        let (group, name) = self.locate(path)?;
        match target {
            LinkTarget::Internal(target) => {
                group.link_soft(&concept_path::to_hdf_path(target), name)?
            }
            LinkTarget::External { file, path: target } => {
                group.link_external(&file.to_string_lossy(), target, name)?
            }
        }
        Ok(())
    }

    fn external_file(&self, file: &Path) -> PathBuf {
        if file.is_relative() && !file.exists() {
            if let Some(dir) = self.path.parent() {
                return dir.join(file);
            }
        }
        file.to_path_buf()
    }

    /// Shape and element type of a link target
    fn inspect(
        &self,
        path: &str,
        target: &LinkTarget,
    ) -> Result<(Vec<usize>, TypeDescriptor), WriterError> {
        let dataset = match target {
            LinkTarget::Internal(target) => self.file.dataset(&concept_path::to_hdf_path(target)),
            LinkTarget::External { file, path } => {
                File::open(self.external_file(file)).and_then(|f| f.dataset(path))
            }
        }
        .map_err(|_| WriterError::LinkTargetMissing {
            path: path.to_string(),
            target: target.to_string(),
        })?;
        Ok((dataset.shape(), dataset.dtype()?.to_descriptor()?))
    }

    fn write_virtual(&self, path: &str, descriptor: &Descriptor) -> Result<(), WriterError> {
        let (plan, dtype) = match descriptor {
            Descriptor::Concat(targets) => {
                let mut sources = Vec::with_capacity(targets.len());
                let mut dtype: Option<TypeDescriptor> = None;
                for target in targets {
                    let (shape, source_type) = self.inspect(path, target)?;
                    match &dtype {
                        Some(first) if *first != source_type => {
                            return Err(WriterError::VirtualShapeMismatch {
                                path: path.to_string(),
                                message: format!("{target} holds {source_type:?}, expected {first:?}"),
                            })
                        }
                        Some(_) => (),
                        None => dtype = Some(source_type),
                    }
                    sources.push((target.clone(), shape));
                }
                (plan_concat(path, &sources)?, dtype)
            }
            Descriptor::Slice { source, selection } => {
                let (shape, source_type) = self.inspect(path, source)?;
                (plan_slice(path, source, &shape, selection)?, Some(source_type))
            }
            _ => {
                return Err(WriterError::WriteError {
                    path: path.to_string(),
                    message: String::from("not a virtual dataset descriptor"),
                })
            }
        };
        let dtype = dtype.ok_or_else(|| WriterError::VirtualShapeMismatch {
            path: path.to_string(),
            message: String::from("no sources"),
        })?;
        let (group, name) = self.locate(path)?;
        group
            .new_dataset_builder()
            .empty_as(&dtype)
            .shape(plan.shape.clone())
            .with_dcpl(|dcpl| map_sources(dcpl, &plan))
            .create(name)?;
        log::debug!("Created virtual dataset {path} of shape {:?}", plan.shape);
        Ok(())
    }

    /// A field attribute whose field was never filled has nothing to attach to
    fn is_orphan(&self, template: &Template, object: &str) -> bool {
        if object == "/"
            || template.get(object).is_some()
            || template.values().any(|(path, _)| {
                !concept_path::is_attribute_path(path) && concept_path::is_under(path, object)
            })
        {
            return false;
        }
        let is_group = match self.schema.as_ref().and_then(|s| s.find(object)) {
            Some(concept) => concept.is_group(),
            None => Segment::parse(concept_path::last_segment(object)).class.is_some(),
        };
        !is_group
    }

    fn write_attribute(&self, path: &str, value: &Value) -> Result<(), WriterError> {
        let object = concept_path::parent(path).unwrap_or("/");
        let name = Segment::parse(concept_path::last_segment(path)).name;
        if let Ok(dataset) = self.file.dataset(&concept_path::to_hdf_path(object)) {
            return write_attr(&dataset, name, path, value);
        }
        let group = self.ensure_group(object)?;
        write_attr(&group, name, path, value)
    }

    fn write_root_attributes(&self) -> Result<(), WriterError> {
        let root = self.file.group("/")?;
        let file_time = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(|e| WriterError::WriteError {
                path: String::from("/"),
                message: e.to_string(),
            })?;
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let mut attributes = vec![
            (NX_CLASS_ATTR, NX_ROOT_CLASS.to_string()),
            (
                CREATOR_ATTR,
                format!("{}:{}", env!("CARGO_PKG_NAME"), FORMAT_VERSION),
            ),
            (FILE_NAME_ATTR, file_name),
            (FILE_TIME_ATTR, file_time),
        ];
        if let Some(schema) = &self.schema {
            attributes.push((DEFINITION_ATTR, schema.name.clone()));
        }
        for (name, value) in attributes {
            if root.attr(name).is_err() {
                scalar_attr(&root, name, &unicode(name, &value)?)?;
            }
        }
        Ok(())
    }

    fn target_exists(&self, target: &LinkTarget) -> bool {
        match target {
            LinkTarget::Internal(target) => {
                let target = concept_path::to_hdf_path(target);
                self.file.dataset(&target).is_ok() || self.file.group(&target).is_ok()
            }
            LinkTarget::External { file, path } => File::open(self.external_file(file))
                .map(|f| f.dataset(path).is_ok() || f.group(path).is_ok())
                .unwrap_or(false),
        }
    }

    /// Dangling links stay in the file but are reported
    fn check_links(&mut self, links: &[(&str, &LinkTarget)]) {
        for (path, target) in links {
            if self.report.has(path, DiagnosticCode::WriteError) || self.target_exists(target) {
                continue;
            }
            let e = WriterError::LinkTargetMissing {
                path: path.to_string(),
                target: target.to_string(),
            };
            log::warn!("{e}");
            self.report.push(Diagnostic::warning(
                path,
                DiagnosticCode::LinkTargetMissing,
                e.to_string(),
            ));
        }
    }
}

/// Write a template into a new file at `path`
pub fn write_nexus(
    path: &Path,
    template: &Template,
    options: WriterOptions,
) -> Result<Report, WriterError> {
    NexusWriter::new(path, template.schema().cloned(), options)?.write(template)
}

fn map_sources<'a>(
    dcpl: &'a mut hdf5::plist::DatasetCreateBuilder,
    plan: &VirtualPlan,
) -> &'a mut hdf5::plist::DatasetCreateBuilder {
    for placement in &plan.placements {
        let (file, dataset) = match &placement.target {
            LinkTarget::Internal(path) => (SAME_FILE.to_string(), concept_path::to_hdf_path(path)),
            LinkTarget::External { file, path } => (file.to_string_lossy().to_string(), path.clone()),
        };
        dcpl.virtual_map(
            file,
            dataset,
            Extents::from(placement.source_shape.clone()),
            selection(&placement.source),
            Extents::from(plan.shape.clone()),
            selection(&placement.destination),
        );
    }
    dcpl
}

fn selection(axes: &[AxisSelection]) -> Selection {
    let slices: Vec<SliceOrIndex> = axes
        .iter()
        .map(|axis| SliceOrIndex::SliceCount {
            start: axis.start,
            step: 1,
            count: axis.count,
            block: 1,
        })
        .collect();
    Selection::from(Hyperslab::from(slices))
}

fn unicode(path: &str, text: &str) -> Result<VarLenUnicode, WriterError> {
    VarLenUnicode::from_str(text).map_err(|e| WriterError::WriteError {
        path: path.to_string(),
        message: e.to_string(),
    })
}

fn unicode_array(path: &str, strings: &ArrayD<String>) -> Result<ArrayD<VarLenUnicode>, WriterError> {
    let converted = strings
        .iter()
        .map(|s| unicode(path, s))
        .collect::<Result<Vec<_>, _>>()?;
    ArrayD::from_shape_vec(strings.raw_dim(), converted).map_err(|e| WriterError::WriteError {
        path: path.to_string(),
        message: e.to_string(),
    })
}

fn scalar_dataset<T: H5Type>(group: &Group, name: &str, value: &T) -> Result<(), hdf5::Error> {
    group
        .new_dataset::<T>()
        .shape(Extents::Scalar)
        .create(name)?
        .write_scalar(value)
}

fn array_dataset<T: H5Type>(
    group: &Group,
    name: &str,
    array: &ArrayD<T>,
    compression: Option<u8>,
) -> Result<(), hdf5::Error> {
    let builder = group.new_dataset_builder().with_data(array);
    match compression {
        Some(level) if array.ndim() > 0 && !array.is_empty() => {
            let chunk = chunk_shape(array.shape(), std::mem::size_of::<T>());
            builder.chunk(chunk).deflate(level).shuffle().create(name)?
        }
        _ => builder.create(name)?,
    };
    Ok(())
}

fn write_data(
    group: &Group,
    name: &str,
    path: &str,
    value: &Value,
    compression: Option<u8>,
) -> Result<(), WriterError> {
    match value {
        Value::Bool(v) => scalar_dataset(group, name, v)?,
        Value::Int(v) => scalar_dataset(group, name, v)?,
        Value::Float(v) => scalar_dataset(group, name, v)?,
        Value::Str(v) => scalar_dataset(group, name, &unicode(path, v)?)?,
        Value::Array(Array::Int(a)) => array_dataset(group, name, a, compression)?,
        Value::Array(Array::Float(a)) => array_dataset(group, name, a, compression)?,
        Value::Array(Array::Bool(a)) => array_dataset(group, name, a, compression)?,
        // strings are stored as given
        Value::Array(Array::Str(a)) => array_dataset(group, name, &unicode_array(path, a)?, None)?,
        Value::Descriptor(Descriptor::Compress(inner)) => {
            write_data(group, name, path, inner, compression)?
        }
        Value::Descriptor(_) => {
            return Err(WriterError::WriteError {
                path: path.to_string(),
                message: String::from("link descriptors cannot be stored as data"),
            })
        }
    }
    Ok(())
}

fn scalar_attr<T: H5Type>(location: &Location, name: &str, value: &T) -> Result<(), hdf5::Error> {
    location.new_attr::<T>().create(name)?.write_scalar(value)
}

fn array_attr<T: H5Type>(location: &Location, name: &str, array: &ArrayD<T>) -> Result<(), hdf5::Error> {
    location
        .new_attr::<T>()
        .shape(array.shape().to_vec())
        .create(name)?
        .write(array)
}

fn write_attr(location: &Location, name: &str, path: &str, value: &Value) -> Result<(), WriterError> {
    if location.attr(name).is_ok() {
        log::debug!("Attribute {path} is already set");
        return Ok(());
    }
    match value {
        Value::Bool(v) => scalar_attr(location, name, v)?,
        Value::Int(v) => scalar_attr(location, name, v)?,
        Value::Float(v) => scalar_attr(location, name, v)?,
        Value::Str(v) => scalar_attr(location, name, &unicode(path, v)?)?,
        Value::Array(Array::Int(a)) => array_attr(location, name, a)?,
        Value::Array(Array::Float(a)) => array_attr(location, name, a)?,
        Value::Array(Array::Bool(a)) => array_attr(location, name, a)?,
        Value::Array(Array::Str(a)) => array_attr(location, name, &unicode_array(path, a)?)?,
        Value::Descriptor(Descriptor::Compress(inner)) => write_attr(location, name, path, inner)?,
        Value::Descriptor(_) => {
            return Err(WriterError::WriteError {
                path: path.to_string(),
                message: String::from("attributes cannot hold links"),
            })
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hdf5_source::{read_flat, Hdf5Source};
    use crate::source::DataSource;
    use crate::test_support::test_schema;
    use crate::value::SliceSpec;
    use ndarray::{Array1, IxDyn};

    fn template(values: Vec<(&str, Value)>) -> Template {
        let mut template = Template::new(None, true);
        for (path, value) in values {
            template.set(path, value).unwrap();
        }
        template
    }

    #[test]
    fn test_round_trip_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.nxs");
        let image = ArrayD::from_shape_fn(IxDyn(&[20, 30]), |d| (d[0] * 30 + d[1]) as f64);
        let mut filled = Template::generate(test_schema(), true);
        let values = vec![
            ("/ENTRY[entry]/title", Value::from("Run 42")),
            ("/ENTRY[entry]/count", Value::Int(7)),
            ("/ENTRY[entry]/SAMPLE[sample]/name", Value::from("quartz")),
            ("/ENTRY[entry]/SAMPLE[sample]/thickness", Value::Float(0.5)),
            ("/ENTRY[entry]/SAMPLE[sample]/thickness/@units", Value::from("mm")),
            ("/ENTRY[entry]/data/image", Value::compress(Value::from(image.clone()))),
            ("/ENTRY[entry]/data/@signal", Value::from("image")),
            ("/@default", Value::from("entry")),
        ];
        for (path, value) in values {
            filled.set(path, value).unwrap();
        }
        let report = write_nexus(&output, &filled, WriterOptions::default()).unwrap();
        assert!(report.is_empty(), "{report}");

        let flat = read_flat(&output).unwrap();
        for (path, value) in filled.values() {
            let expected = match value {
                Value::Descriptor(Descriptor::Compress(inner)) => inner.as_ref(),
                other => other,
            };
            assert_eq!(
                flat.get(&concept_path::to_hdf_path(path)),
                Some(expected),
                "{path}"
            );
        }
        assert_eq!(flat.get("/@NX_class"), Some(&Value::from("NXroot")));
        assert_eq!(flat.get("/@definition"), Some(&Value::from("NXtest")));
        assert_eq!(flat.get("/entry/@NX_class"), Some(&Value::from("NXentry")));
        assert_eq!(flat.get("/entry/sample/@NX_class"), Some(&Value::from("NXsample")));
        assert_eq!(flat.get("/entry/data/@NX_class"), Some(&Value::from("NXdata")));
        assert!(flat.contains_key("/@file_time"));

        let file = File::open(&output).unwrap();
        let dataset = file.dataset("/entry/data/image").unwrap();
        assert!(dataset.is_chunked());
    }

    #[test]
    fn test_attributes_of_unwritten_fields_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.nxs");
        let filled = template(vec![
            ("/ENTRY[entry]/title", Value::from("Run 42")),
            ("/ENTRY[entry]/temperature/@units", Value::from("K")),
            ("/ENTRY[entry]/INSTRUMENT[instrument]/@note", Value::from("empty")),
        ]);
        let report = write_nexus(&output, &filled, WriterOptions::default()).unwrap();
        assert!(report.success(), "{report}");
        assert!(report.has(
            "/ENTRY[entry]/temperature/@units",
            DiagnosticCode::WriteError
        ));

        let flat = read_flat(&output).unwrap();
        assert!(!flat.keys().any(|k| k.starts_with("/entry/temperature")));
        assert_eq!(flat.get("/entry/instrument/@note"), Some(&Value::from("empty")));
        let file = File::open(&output).unwrap();
        assert!(file.group("/entry/temperature").is_err());
    }

    #[test]
    fn test_links_resolve_to_their_targets() {
        let dir = tempfile::tempdir().unwrap();
        let external = dir.path().join("detector.h5");
        {
            let file = File::create(&external).unwrap();
            file.new_dataset_builder()
                .with_data(&Array1::from_vec(vec![1.0_f64, 2.0, 3.0]))
                .create("counts")
                .unwrap();
        }
        let output = dir.path().join("out.nxs");
        let filled = template(vec![
            ("/ENTRY[entry]/DATA[data]/x", Value::from(ArrayD::from_elem(IxDyn(&[3]), 0.5))),
            ("/ENTRY[entry]/INSTRUMENT[instrument]/x", Value::link("/entry/data/x")),
            (
                "/ENTRY[entry]/DATA[data]/counts",
                Value::link(&format!("{}:/counts", external.display())),
            ),
            ("/ENTRY[entry]/DATA[data]/missing", Value::link("/entry/nowhere")),
        ]);
        let report = write_nexus(&output, &filled, WriterOptions::default()).unwrap();
        assert!(report.has(
            "/ENTRY[entry]/DATA[data]/missing",
            DiagnosticCode::LinkTargetMissing
        ));
        assert!(report.success());

        let source = Hdf5Source::open(&output).unwrap();
        assert_eq!(
            source.get("/entry/instrument/x"),
            source.get("/entry/data/x")
        );
        assert_eq!(
            source.get("/entry/data/counts"),
            Some(Value::from(ArrayD::from_shape_vec(IxDyn(&[3]), vec![1.0, 2.0, 3.0]).unwrap()))
        );
        assert_eq!(
            source.get("/entry/instrument/@NX_class"),
            Some(Value::from("NXinstrument"))
        );
    }

    #[test]
    fn test_virtual_concatenation_of_external_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut targets = Vec::new();
        for part in 0..3 {
            let path = dir.path().join(format!("part{part}.h5"));
            let file = File::create(&path).unwrap();
            let data: Vec<f64> = (0..10).map(|i| (part * 10 + i) as f64).collect();
            file.new_dataset_builder()
                .with_data(&Array1::from_vec(data))
                .create("data")
                .unwrap();
            targets.push(LinkTarget::External {
                file: path,
                path: String::from("/data"),
            });
        }
        let output = dir.path().join("out.nxs");
        let filled = template(vec![(
            "/ENTRY[entry]/DATA[data]/stack",
            Value::Descriptor(Descriptor::Concat(targets)),
        )]);
        let report = write_nexus(&output, &filled, WriterOptions::default()).unwrap();
        assert!(report.is_empty(), "{report}");

        let stack = Hdf5Source::open(&output)
            .unwrap()
            .get("/entry/data/stack")
            .unwrap();
        assert_eq!(stack.shape(), Some(vec![30]));
        let expected: Vec<f64> = (0..30).map(f64::from).collect();
        assert_eq!(
            stack,
            Value::from(ArrayD::from_shape_vec(IxDyn(&[30]), expected).unwrap())
        );
    }

    #[test]
    fn test_virtual_slice_of_internal_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.nxs");
        let raw = ArrayD::from_shape_fn(IxDyn(&[2, 3, 4, 5]), |d| {
            (d[0] * 1000 + d[1] * 100 + d[2] * 10 + d[3]) as i64
        });
        let filled = template(vec![
            ("/ENTRY[entry]/raw", Value::from(raw.clone())),
            (
                "/ENTRY[entry]/DATA[data]/view",
                Value::Descriptor(Descriptor::Slice {
                    source: LinkTarget::Internal(String::from("/entry/raw")),
                    selection: SliceSpec::parse_selection("[:,1,:,:]").unwrap(),
                }),
            ),
            (
                "/ENTRY[entry]/DATA[data]/broken",
                Value::Descriptor(Descriptor::Slice {
                    source: LinkTarget::Internal(String::from("/entry/raw")),
                    selection: SliceSpec::parse_selection("[:,9]").unwrap(),
                }),
            ),
        ]);
        let report = write_nexus(&output, &filled, WriterOptions::default()).unwrap();
        assert!(report.has(
            "/ENTRY[entry]/DATA[data]/broken",
            DiagnosticCode::VirtualShapeMismatch
        ));

        let view = Hdf5Source::open(&output)
            .unwrap()
            .get("/entry/data/view")
            .unwrap();
        assert_eq!(view.shape(), Some(vec![2, 4, 5]));
        let expected = raw.index_axis(ndarray::Axis(1), 1).to_owned();
        assert_eq!(view, Value::from(expected));
    }
}
