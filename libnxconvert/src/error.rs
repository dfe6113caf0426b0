use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Could not find a definition named {0} in any of the searched locations")]
    SchemaNotFound(String),
    #[error("Failed to parse definition {path:?}: {message}")]
    SchemaParseError { path: PathBuf, message: String },
    #[error("Definition {path:?} is invalid: {message}")]
    SchemaInvalid { path: PathBuf, message: String },
    #[error("Schema loader failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("Mapping config uses unknown prefix @{prefix} in the expression for {path}")]
    UnknownPrefix { path: String, prefix: String },
    #[error("Mapping config has a malformed expression for {path}: {reason}")]
    MalformedExpression { path: String, reason: String },
    #[error("Mapping config key {0} is not an absolute concept path")]
    RelativeKey(String),
    #[error("Failed to load mapping config as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Mapping config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Mapping config failed to parse JSON: {0}")]
    ParsingError(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template rejected path {0}; paths must start with '/'")]
    NotAbsolute(String),
    #[error("Template already holds a different value at {0}")]
    ConflictOnWrite(String),
    #[error("Template has no schema attached and cannot add entry {0}")]
    NoSchema(String),
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Could not open source because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("No source adapter handles files with extension .{0}")]
    UnsupportedExtension(String),
    #[error("Source failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Source failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),
    #[error("Source failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Source failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
    #[error("Source adapter {adapter} could not parse {path:?}: {message}")]
    Ingest {
        adapter: String,
        path: PathBuf,
        message: String,
    },
}

#[derive(Debug, Error)]
pub enum WriterError {
    #[error("Writer failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
    #[error("Writer failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Writer failed at {path}: {message}")]
    WriteError { path: String, message: String },
    #[error("Virtual dataset at {path} has mismatched source shapes: {message}")]
    VirtualShapeMismatch { path: String, message: String },
    #[error("Link at {path} points to missing target {target}")]
    LinkTargetMissing { path: String, target: String },
}

#[derive(Debug, Error)]
pub enum ParamsError {
    #[error("Failed to load params as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Params failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Params failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Params are missing the required field {0}")]
    MissingField(&'static str),
}

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Conversion failed due to schema error: {0}")]
    SchemaError(#[from] SchemaError),
    #[error("Conversion failed due to mapping config error: {0}")]
    MappingError(#[from] MappingError),
    #[error("Conversion failed due to template error: {0}")]
    TemplateError(#[from] TemplateError),
    #[error("Conversion failed due to source error: {0}")]
    SourceError(#[from] SourceError),
    #[error("Conversion failed due to writer error: {0}")]
    WriterError(#[from] WriterError),
    #[error("Conversion failed due to params error: {0}")]
    ParamsError(#[from] ParamsError),
    #[error("No reader named {0} is registered")]
    UnknownReader(String),
    #[error("No input files were given")]
    NoInputFiles,
    #[error("No definition was given and none of the inputs names one")]
    NoDefinition,
}

impl ConvertError {
    /// Errors caused by how the conversion was invoked rather than by the data
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownReader(_)
                | Self::NoInputFiles
                | Self::NoDefinition
                | Self::ParamsError(_)
                | Self::SchemaError(SchemaError::SchemaNotFound(_))
                | Self::SourceError(SourceError::BadFilePath(_))
                | Self::SourceError(SourceError::UnsupportedExtension(_))
        )
    }
}
