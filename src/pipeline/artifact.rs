//! Pipeline artifact bundle
//!
//! A single JSON file holding the feature schema, fitted transform and fitted model.
//! Written by the offline training process, read-only here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use super::error::ArtifactError;
use super::model::ModelSection;
use super::schema::FeatureSchema;
use super::transform::FeatureTransform;

/// Bundle layout version this build reads
pub const SUPPORTED_FORMAT_VERSION: u32 = 1;

/// Feature schema version implemented by this build's field resolution and transform ops
pub const FEATURE_SCHEMA_VERSION: SchemaVersion = SchemaVersion { major: 1, minor: 1 };

/// `MAJOR.MINOR` feature schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
}

impl SchemaVersion {
    /// An artifact can be served when it needs nothing newer than this build provides
    pub fn is_supported_by(&self, build: &SchemaVersion) -> bool {
        self.major == build.major && self.minor <= build.minor
    }
}

impl FromStr for SchemaVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (major, minor) = s
            .trim()
            .split_once('.')
            .ok_or_else(|| format!("schema version `{}` is not MAJOR.MINOR", s))?;
        let parse = |part: &str| {
            part.parse::<u32>()
                .map_err(|_| format!("schema version `{}` is not MAJOR.MINOR", s))
        };
        Ok(Self {
            major: parse(major)?,
            minor: parse(minor)?,
        })
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// On-disk artifact bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactBundle {
    pub format_version: u32,
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub schema: FeatureSchema,
    pub transform: FeatureTransform,
    pub model: ModelSection,
}

impl ArtifactBundle {
    /// Read and parse an artifact file
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, ArtifactError> {
        let path = path.as_ref();

        let text = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ArtifactError::NotFound {
                    path: path.to_path_buf(),
                }
            } else {
                ArtifactError::Unreadable {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        serde_json::from_str(&text).map_err(|source| ArtifactError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check format and schema versions against this build
    pub fn check_compatibility(&self) -> Result<SchemaVersion, ArtifactError> {
        if self.format_version != SUPPORTED_FORMAT_VERSION {
            return Err(ArtifactError::UnsupportedFormat {
                found: self.format_version,
                supported: SUPPORTED_FORMAT_VERSION,
            });
        }

        let incompatible = || ArtifactError::IncompatibleSchema {
            found: self.schema.version.clone(),
            supported: FEATURE_SCHEMA_VERSION.to_string(),
        };
        let version: SchemaVersion = self.schema.version.parse().map_err(|_| incompatible())?;
        if !version.is_supported_by(&FEATURE_SCHEMA_VERSION) {
            return Err(incompatible());
        }
        Ok(version)
    }
}
