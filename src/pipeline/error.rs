//! Pipeline error types
//!
//! `ArtifactError` is fatal and surfaces from `Pipeline::load`.
//! `ValidationError` is reported per request and carries every field issue found.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Failure to load a pipeline artifact
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read artifact {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed artifact {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported artifact format version {found} (supported: {supported})")]
    UnsupportedFormat { found: u32, supported: u32 },

    #[error("feature schema version {found} is incompatible with this build (supports {supported})")]
    IncompatibleSchema { found: String, supported: String },

    #[error("artifact version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: String, found: String },

    #[error("inconsistent artifact: {0}")]
    Inconsistent(String),

    #[error("failed to initialize model: {0}")]
    Model(String),
}

/// What is wrong with a field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Problem {
    Missing,
    WrongType { expected: String, found: String },
    NotFinite,
    OutOfRange {
        value: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
    UnknownCategory { value: String },
    Duplicate { value: String },
    Empty,
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Problem::Missing => write!(f, "is missing"),
            Problem::WrongType { expected, found } => {
                write!(f, "expected {}, got {}", expected, found)
            }
            Problem::NotFinite => write!(f, "is not a finite number"),
            Problem::OutOfRange { value, min, max } => {
                write!(f, "value {} is outside [", value)?;
                match min {
                    Some(min) => write!(f, "{}", min)?,
                    None => write!(f, "-inf")?,
                }
                write!(f, ", ")?;
                match max {
                    Some(max) => write!(f, "{}", max)?,
                    None => write!(f, "inf")?,
                }
                write!(f, "]")
            }
            Problem::UnknownCategory { value } => write!(f, "has unknown category `{}`", value),
            Problem::Duplicate { value } => write!(f, "has duplicate value `{}`", value),
            Problem::Empty => write!(f, "is empty"),
        }
    }
}

/// A single invalid or missing input field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldIssue {
    pub field: String,
    /// Entrant index within the race; `None` for race-level fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrant: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<String>,
    pub problem: Problem,
}

impl FieldIssue {
    pub fn race(field: impl Into<String>, problem: Problem) -> Self {
        Self {
            field: field.into(),
            entrant: None,
            driver_id: None,
            problem,
        }
    }

    pub fn entrant(
        field: impl Into<String>,
        index: usize,
        driver_id: impl Into<String>,
        problem: Problem,
    ) -> Self {
        Self {
            field: field.into(),
            entrant: Some(index),
            driver_id: Some(driver_id.into()),
            problem,
        }
    }
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}` {}", self.field, self.problem)?;
        match (self.entrant, &self.driver_id) {
            (Some(index), Some(driver)) => write!(f, " (entrant {}, driver `{}`)", index, driver),
            (Some(index), None) => write!(f, " (entrant {})", index),
            _ => Ok(()),
        }
    }
}

/// Race input rejected before inference
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub issues: Vec<FieldIssue>,
}

impl ValidationError {
    pub fn new(issues: Vec<FieldIssue>) -> Self {
        Self { issues }
    }

    /// Names of the offending fields, deduplicated, in first-seen order
    pub fn fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = Vec::new();
        for issue in &self.issues {
            if !fields.contains(&issue.field.as_str()) {
                fields.push(&issue.field);
            }
        }
        fields
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid race input: ")?;
        for (i, issue) in self.issues.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", issue)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Failure to produce a prediction
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("race {index}: {source}")]
    Batch {
        index: usize,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Validation error, looking through batch wrapping
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            PipelineError::Validation(err) => Some(err),
            PipelineError::Batch { source, .. } => source.as_validation(),
            PipelineError::Inference(_) => None,
        }
    }
}
