use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::constants::DEFAULT_COMPRESSION_LEVEL;
use super::error::ParamsError;

/// Name of the reader every converter knows
pub const DEFAULT_READER: &str = "multi";

/// Structure representing the parameters of one conversion. Contains pathing and
/// validation settings. Params are serializable and deserializable to YAML
/// using serde and serde_yaml; missing fields take their default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionParams {
    pub input_files: Vec<PathBuf>,
    pub reader: String,
    /// Application definition; when unset, an ELN file has to name one
    pub nxdl: Option<String>,
    pub output: PathBuf,
    pub definitions_path: PathBuf,
    /// Mapping config, read after every other input
    pub config_file: Option<PathBuf>,
    pub entry_names: Vec<String>,
    pub overwrite_keys: bool,
    pub permissive: bool,
    /// Unit strings treated as no unit at all
    pub skip_units: Vec<String>,
    pub compression_level: u8,
}

impl Default for ConversionParams {
    /// Generate params for a template file. Paths are placeholders.
    fn default() -> Self {
        Self {
            input_files: Vec::new(),
            reader: String::from(DEFAULT_READER),
            nxdl: None,
            output: PathBuf::from("output.nxs"),
            definitions_path: PathBuf::from("definitions"),
            config_file: None,
            entry_names: Vec::new(),
            overwrite_keys: true,
            permissive: false,
            skip_units: vec![String::from("on/off")],
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl ConversionParams {
    /// Read the params in a YAML file
    /// Returns ConversionParams if successful
    pub fn read_params_file(params_path: &Path) -> Result<Self, ParamsError> {
        if !params_path.exists() {
            return Err(ParamsError::BadFilePath(params_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(params_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Write the params as YAML, e.g. to make a template params file
    pub fn write_params_file(&self, params_path: &Path) -> Result<(), ParamsError> {
        let yaml_str = serde_yaml::to_string(self)?;
        std::fs::write(params_path, yaml_str)?;
        Ok(())
    }

    /// Every input, with the config file last
    pub fn all_input_files(&self) -> Vec<PathBuf> {
        let mut files = self.input_files.clone();
        if let Some(config) = &self.config_file {
            if !files.contains(config) {
                files.push(config.clone());
            }
        }
        files
    }

    pub fn is_compression_level_valid(&self) -> bool {
        self.compression_level <= 9
    }

    /// Check the fields a conversion cannot do without
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.all_input_files().is_empty() {
            return Err(ParamsError::MissingField("input_files"));
        }
        if self.reader.is_empty() {
            return Err(ParamsError::MissingField("reader"));
        }
        if self.output.as_os_str().is_empty() {
            return Err(ParamsError::MissingField("output"));
        }
        Ok(())
    }
}
