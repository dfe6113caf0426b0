use fxhash::{FxHashMap, FxHashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::default_plot::set_default_plot;
use super::diagnostics::Report;
use super::error::ConvertError;
use super::hdf5_source::Hdf5Ingest;
use super::hdf_writer::{write_nexus, WriterOptions};
use super::multi_format::MultiFormatReader;
use super::nested::KeyMap;
use super::nxdl_loader::SchemaLocator;
use super::params::{ConversionParams, DEFAULT_READER};
use super::source::{FileIngest, IngestRegistry};
use super::template::Template;
use super::units::UnitTable;
use super::validator::{validate, ValidationOptions};

/// Exit status of a successful conversion
pub const EXIT_SUCCESS: i32 = 0;
/// Exit status when validation fails in strict mode
pub const EXIT_VALIDATION_FAILED: i32 = 1;
/// Exit status for bad invocations
pub const EXIT_USAGE: i32 = 2;

/// What a named reader understands: its partner formats and key tables
pub struct ReaderSpec {
    pub registry: IngestRegistry,
    pub key_map: KeyMap,
}

impl Default for ReaderSpec {
    /// HDF5 input plus ELN and config files, no key translation
    fn default() -> Self {
        let mut registry = IngestRegistry::new();
        registry.register(Box::new(Hdf5Ingest));
        Self {
            registry,
            key_map: KeyMap::new(),
        }
    }
}

impl ReaderSpec {
    pub fn with_ingest(mut self, adapter: Box<dyn FileIngest>) -> Self {
        self.registry.register(adapter);
        self
    }

    pub fn with_key_map(mut self, key_map: KeyMap) -> Self {
        self.key_map = key_map;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub entry_names: Vec<String>,
    pub overwrite_keys: bool,
    pub permissive: bool,
    pub skip_units: Vec<String>,
    pub compression_level: u8,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self::from(&ConversionParams::default())
    }
}

impl From<&ConversionParams> for ConvertOptions {
    fn from(params: &ConversionParams) -> Self {
        Self {
            entry_names: params.entry_names.clone(),
            overwrite_keys: params.overwrite_keys,
            permissive: params.permissive,
            skip_units: params.skip_units.clone(),
            compression_level: params.compression_level,
        }
    }
}

/// Result of a conversion that ran to the end
#[derive(Debug)]
pub struct Outcome {
    pub report: Report,
    pub output: PathBuf,
    /// False when strict validation failed and nothing was written
    pub written: bool,
    pub template: Template,
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        if self.report.success() {
            EXIT_SUCCESS
        } else {
            EXIT_VALIDATION_FAILED
        }
    }
}

/// Exit status for a conversion that stopped with an error
pub fn exit_code_for_error(error: &ConvertError) -> i32 {
    if error.is_usage_error() {
        EXIT_USAGE
    } else {
        EXIT_VALIDATION_FAILED
    }
}

/// Runs conversions: read inputs, resolve, validate, write.
///
/// The definitions root and the readers are fixed at construction. Every
/// converter knows the reader named [`DEFAULT_READER`].
pub struct Converter {
    locator: SchemaLocator,
    readers: FxHashMap<String, ReaderSpec>,
    options: ConvertOptions,
}

impl Converter {
    pub fn new(definitions_root: &Path, options: ConvertOptions) -> Self {
        let mut readers = FxHashMap::default();
        readers.insert(DEFAULT_READER.to_string(), ReaderSpec::default());
        Self {
            locator: SchemaLocator::new(definitions_root),
            readers,
            options,
        }
    }

    pub fn from_params(params: &ConversionParams) -> Self {
        Self::new(&params.definitions_path, ConvertOptions::from(params))
    }

    pub fn register_reader(&mut self, name: &str, spec: ReaderSpec) {
        self.readers.insert(name.to_string(), spec);
    }

    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    /// Convert `files` into a NeXus file at `output`.
    ///
    /// Without `schema_name` the definition named by an ELN file is used. In
    /// strict mode a failed validation leaves the output unwritten.
    pub fn convert(
        &self,
        files: &[PathBuf],
        reader_name: &str,
        schema_name: Option<&str>,
        output: &Path,
    ) -> Result<Outcome, ConvertError> {
        if files.is_empty() {
            return Err(ConvertError::NoInputFiles);
        }
        let spec = self
            .readers
            .get(reader_name)
            .ok_or_else(|| ConvertError::UnknownReader(reader_name.to_string()))?;

        let mut reader = MultiFormatReader::read_files(files, &spec.registry, &spec.key_map)?;
        if !self.options.entry_names.is_empty() {
            reader.set_entry_names(self.options.entry_names.clone());
        }
        let schema_name = schema_name
            .or_else(|| reader.definition())
            .ok_or(ConvertError::NoDefinition)?;
        let schema = Arc::new(self.locator.load(schema_name)?);
        log::info!("Loaded definition {} from {}", schema.name, schema.source.display());

        let mut template = Template::generate(schema.clone(), self.options.overwrite_keys);
        let mut report = reader.fill(&mut template);
        set_default_plot(&mut template);
        log::info!("Resolved entries {:?}", template.entry_names());

        let validation_options = ValidationOptions {
            permissive: self.options.permissive,
            skip_units: self.options.skip_units.iter().cloned().collect::<FxHashSet<_>>(),
            units: UnitTable::default(),
        };
        report.merge(validate(&template, &schema, &validation_options));

        let written = report.success();
        if written {
            let writer_options = WriterOptions {
                compression_level: self.options.compression_level,
            };
            let mut writer_report = write_nexus(output, &template, writer_options)?;
            if self.options.permissive {
                writer_report.make_permissive();
            }
            report.merge(writer_report);
        } else {
            log::error!(
                "Validation against {} failed; {} was not written",
                schema.name,
                output.display()
            );
        }
        report.log();

        Ok(Outcome {
            report,
            output: output.to_path_buf(),
            written,
            template,
        })
    }
}

/// Run the conversion described by a params file
pub fn convert_with_params(params: &ConversionParams) -> Result<Outcome, ConvertError> {
    params.validate()?;
    if !params.is_compression_level_valid() {
        log::warn!(
            "Compression level {} is out of range; HDF5 will clamp it",
            params.compression_level
        );
    }
    Converter::from_params(params).convert(
        &params.all_input_files(),
        &params.reader,
        params.nxdl.as_deref(),
        &params.output,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticCode;
    use crate::hdf5_source::read_flat;
    use crate::test_support::{write_definitions, write_file};
    use crate::value::Value;

    #[test]
    fn test_minimal_single_entry() {
        let definitions = write_definitions();
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            write_file(&dir, "eln.yaml", "title: Run 42\n"),
            write_file(&dir, "config.json", r#"{"/ENTRY[entry]/title": "@eln:title"}"#),
        ];
        let output = dir.path().join("out.nxs");
        let converter = Converter::new(definitions.path(), ConvertOptions::default());
        let outcome = converter
            .convert(&files, DEFAULT_READER, Some("NXsimple"), &output)
            .unwrap();
        assert!(outcome.report.is_empty(), "{}", outcome.report);
        assert_eq!(outcome.exit_code(), EXIT_SUCCESS);

        let flat = read_flat(&output).unwrap();
        assert_eq!(flat.get("/entry/title"), Some(&Value::from("Run 42")));
        assert_eq!(flat.get("/entry/@NX_class"), Some(&Value::from("NXentry")));
        assert_eq!(flat.get("/@default"), Some(&Value::from("entry")));
    }

    #[test]
    fn test_required_or_remove() {
        let definitions = write_definitions();
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            write_file(&dir, "eln.yaml", "definition: NXtest\ntitle: Run 42\n"),
            write_file(
                &dir,
                "config.json",
                r#"{
                    "/ENTRY[entry]/title": "@eln:title",
                    "/ENTRY[entry]/SAMPLE[sample]/name": "!@eln:sample_name"
                }"#,
            ),
        ];
        let output = dir.path().join("out.nxs");
        let strict = Converter::new(definitions.path(), ConvertOptions::default());
        let outcome = strict.convert(&files, DEFAULT_READER, None, &output).unwrap();
        assert!(!outcome
            .template
            .iter()
            .any(|(path, _)| path.starts_with("/ENTRY[entry]/SAMPLE[sample]/")));
        assert!(outcome.report.has(
            "/ENTRY[entry]/SAMPLE[sample]/name",
            DiagnosticCode::MissingRequired
        ));
        assert_eq!(outcome.exit_code(), EXIT_VALIDATION_FAILED);
        assert!(!outcome.written);
        assert!(!output.exists());

        let options = ConvertOptions {
            permissive: true,
            ..Default::default()
        };
        let permissive = Converter::new(definitions.path(), options);
        let outcome = permissive.convert(&files, DEFAULT_READER, None, &output).unwrap();
        assert_eq!(outcome.exit_code(), EXIT_SUCCESS);
        let flat = read_flat(&output).unwrap();
        assert!(flat.contains_key("/entry/title"));
        assert!(!flat.keys().any(|k| k.starts_with("/entry/sample")));
    }

    #[test]
    fn test_multi_entry_keeps_entries_apart() {
        let definitions = write_definitions();
        let dir = tempfile::tempdir().unwrap();
        let files = vec![write_file(
            &dir,
            "eln.yaml",
            "/ENTRY[entry1]/title: first\n/ENTRY[entry2]/title: second\n",
        )];
        let output = dir.path().join("out.nxs");
        let options = ConvertOptions {
            entry_names: vec![String::from("entry1"), String::from("entry2")],
            ..Default::default()
        };
        let converter = Converter::new(definitions.path(), options);
        let outcome = converter
            .convert(&files, DEFAULT_READER, Some("NXsimple"), &output)
            .unwrap();
        assert_eq!(outcome.exit_code(), EXIT_SUCCESS, "{}", outcome.report);

        let flat = read_flat(&output).unwrap();
        assert_eq!(flat.get("/entry1/title"), Some(&Value::from("first")));
        assert_eq!(flat.get("/entry2/title"), Some(&Value::from("second")));
        assert!(!flat.contains_key("/entry"));
        assert_eq!(flat.get("/@default"), Some(&Value::from("entry1")));
    }

    #[test]
    fn test_usage_errors() {
        let definitions = write_definitions();
        let dir = tempfile::tempdir().unwrap();
        let files = vec![write_file(&dir, "eln.yaml", "title: Run 42\n")];
        let output = dir.path().join("out.nxs");
        let converter = Converter::new(definitions.path(), ConvertOptions::default());

        let unknown = converter
            .convert(&files, "nope", Some("NXsimple"), &output)
            .unwrap_err();
        assert!(matches!(unknown, ConvertError::UnknownReader(_)));
        assert_eq!(exit_code_for_error(&unknown), EXIT_USAGE);

        let no_definition = converter
            .convert(&files, DEFAULT_READER, None, &output)
            .unwrap_err();
        assert!(matches!(no_definition, ConvertError::NoDefinition));

        let not_found = converter
            .convert(&files, DEFAULT_READER, Some("NXmissing"), &output)
            .unwrap_err();
        assert_eq!(exit_code_for_error(&not_found), EXIT_USAGE);

        let params = ConversionParams::default();
        let missing = convert_with_params(&params).unwrap_err();
        assert_eq!(exit_code_for_error(&missing), EXIT_USAGE);
    }
}
