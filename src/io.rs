use std::path::PathBuf;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use crate::{
    config::KetchupOptions, data::Dataset, mechanism::record::MechanismRecord,
    network::MetabolicNetwork,
};

/// Everything needed to compose a model, as stored in a single project file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub network: MetabolicNetwork,
    pub mechanisms: Vec<MechanismRecord>,
    pub datasets: Vec<Dataset>,
    #[serde(default)]
    pub options: KetchupOptions,
}

/// Loads and parses a JSON file.
///
/// # Arguments
///
/// * `path` - Path of the JSON file
///
/// # Errors
///
/// * `IOError::FileNotFound` if the file cannot be opened
/// * `IOError::JsonParseError` if the contents do not match the expected structure
pub fn load_json<T: DeserializeOwned>(path: impl Into<PathBuf>) -> Result<T, IOError> {
    let path = path.into();
    let file = std::fs::File::open(path).map_err(IOError::FileNotFound)?;
    serde_json::from_reader(file).map_err(IOError::JsonParseError)
}

/// Serializes `value` as pretty-printed JSON to `path`.
pub fn save_json<T: Serialize>(path: impl Into<PathBuf>, value: &T) -> Result<(), IOError> {
    let path = path.into();
    let file = std::fs::File::create(path).map_err(IOError::FileNotFound)?;
    serde_json::to_writer_pretty(file, value).map_err(IOError::JsonParseError)
}

/// Loads a project file.
pub fn load_project(path: impl Into<PathBuf>) -> Result<Project, IOError> {
    load_json(path)
}

pub fn save_project(path: impl Into<PathBuf>, project: &Project) -> Result<(), IOError> {
    save_json(path, project)
}

/// Represents errors that can occur while reading or writing JSON files.
#[derive(Error, Debug)]
pub enum IOError {
    /// The file could not be found, opened or created.
    #[error("File not found: {0}")]
    FileNotFound(#[from] std::io::Error),

    /// The contents could not be parsed or serialized.
    #[error("Failed to parse JSON: {0}")]
    JsonParseError(#[from] serde_json::Error),
}
