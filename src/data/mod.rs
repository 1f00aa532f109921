//! Race input loading
//!
//! Inputs arrive either as JSON (a single race or an array of races) or as
//! CSV with one row per entrant.

pub mod csv_loader;

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::RaceInput;

pub use csv_loader::{dataframe_to_races, load_races as load_races_csv, CsvLoadError};

#[derive(Debug, Error)]
pub enum InputError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid race JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Csv(#[from] CsvLoadError),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RaceFile {
    Many(Vec<RaceInput>),
    One(RaceInput),
}

/// Load races from a JSON file
pub fn load_races_json<P: AsRef<Path>>(path: P) -> Result<Vec<RaceInput>, InputError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| InputError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let file: RaceFile = serde_json::from_str(&text).map_err(|source| InputError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(match file {
        RaceFile::Many(races) => races,
        RaceFile::One(race) => vec![race],
    })
}

/// Load races from `.csv` or JSON, chosen by file extension
pub fn load_races<P: AsRef<Path>>(path: P) -> Result<Vec<RaceInput>, InputError> {
    let path = path.as_ref();
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));

    if is_csv {
        Ok(load_races_csv(path)?)
    } else {
        load_races_json(path)
    }
}
