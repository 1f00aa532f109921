//! Prediction pipeline
//!
//! Loads a versioned artifact and runs validation, the fitted feature transform
//! and the fitted model over race inputs. Nothing is refit or mutated after load,
//! so one `Pipeline` can be shared across threads behind an `Arc`.

pub mod artifact;
pub mod error;
pub mod model;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod schema;
pub mod transform;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::models::{EntrantPrediction, Prediction, RaceInput};

pub use artifact::{ArtifactBundle, SchemaVersion, FEATURE_SCHEMA_VERSION, SUPPORTED_FORMAT_VERSION};
pub use error::{ArtifactError, FieldIssue, PipelineError, Problem, ValidationError};
pub use model::{Objective, Outcome};
pub use schema::{FeatureKind, FeatureSchema, FeatureScope, FeatureSpec};
pub use transform::{BoundTransform, FeatureTransform, HandleUnknown, TransformStep};

use model::{rank_scores, FittedModel};

/// Descriptive information about a loaded artifact
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactMetadata {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    pub schema_version: String,
    pub model_kind: String,
    pub objective: Objective,
    pub source: PathBuf,
    pub loaded_at: DateTime<Utc>,
}

/// Loaded prediction pipeline
pub struct Pipeline {
    metadata: ArtifactMetadata,
    schema: FeatureSchema,
    transform: BoundTransform,
    model: FittedModel,
}

impl Pipeline {
    /// Load an artifact, failing fast on any version or consistency problem
    pub fn load<P: AsRef<Path>>(artifact_path: P) -> Result<Self, ArtifactError> {
        let path = artifact_path.as_ref();
        info!("Loading pipeline artifact: {:?}", path);

        let bundle = ArtifactBundle::read(path)?;
        let pipeline = Self::from_bundle(bundle, path)?;

        info!(
            name = %pipeline.metadata.name,
            version = %pipeline.metadata.version,
            schema_version = %pipeline.metadata.schema_version,
            model = %pipeline.metadata.model_kind,
            features = pipeline.transform.width(),
            "Pipeline loaded"
        );
        Ok(pipeline)
    }

    /// Load an artifact and require a specific version
    pub fn load_version<P: AsRef<Path>>(artifact_path: P, version: &str) -> Result<Self, ArtifactError> {
        let path = artifact_path.as_ref();
        let bundle = ArtifactBundle::read(path)?;
        if bundle.version != version {
            return Err(ArtifactError::VersionMismatch {
                expected: version.to_string(),
                found: bundle.version,
            });
        }
        let pipeline = Self::from_bundle(bundle, path)?;
        info!(version = %version, "Pipeline loaded at pinned version");
        Ok(pipeline)
    }

    /// Build from an already parsed bundle; `source` resolves sidecar model files
    pub fn from_bundle(bundle: ArtifactBundle, source: &Path) -> Result<Self, ArtifactError> {
        let schema_version = bundle.check_compatibility()?;

        bundle.schema.check().map_err(ArtifactError::Inconsistent)?;
        let transform = bundle
            .transform
            .bind(&bundle.schema)
            .map_err(ArtifactError::Inconsistent)?;

        let artifact_dir = source.parent().unwrap_or_else(|| Path::new("."));
        let model = bundle.model.build(transform.output_names(), artifact_dir)?;

        let metadata = ArtifactMetadata {
            name: bundle.name,
            version: bundle.version,
            description: bundle.description,
            created_at: bundle.created_at,
            schema_version: schema_version.to_string(),
            model_kind: model.kind().to_string(),
            objective: model.objective(),
            source: source.to_path_buf(),
            loaded_at: Utc::now(),
        };

        Ok(Self {
            metadata,
            schema: bundle.schema,
            transform,
            model,
        })
    }

    pub fn metadata(&self) -> &ArtifactMetadata {
        &self.metadata
    }

    pub fn version(&self) -> &str {
        &self.metadata.version
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn transform(&self) -> &BoundTransform {
        &self.transform
    }

    /// Model input column names, in order
    pub fn feature_names(&self) -> &[String] {
        self.transform.output_names()
    }

    /// Check a race against the schema and transform without running the model
    pub fn validate(&self, race: &RaceInput) -> Result<(), ValidationError> {
        let rows = self.schema.resolve(race)?;
        self.transform.apply(race, &rows)?;
        Ok(())
    }

    /// Predict finishing order for one race; entrants come back in input order
    pub fn predict(&self, race: &RaceInput) -> Result<Prediction, PipelineError> {
        let rows = self.schema.resolve(race)?;
        let matrix = self.transform.apply(race, &rows)?;
        let scores = self.model.score(&matrix).map_err(PipelineError::Inference)?;
        let Outcome {
            ranks,
            probabilities,
        } = rank_scores(&scores, self.model.objective());

        let entrants = race
            .entrants
            .iter()
            .enumerate()
            .map(|(i, entrant)| EntrantPrediction {
                driver_id: entrant.driver_id.clone(),
                constructor_id: entrant.constructor_id.clone(),
                score: scores[i],
                predicted_rank: ranks[i],
                probability: probabilities.as_ref().map(|p| p[i]),
            })
            .collect();

        debug!(race = %race.label(), entrants = race.entrants.len(), "Prediction complete");

        Ok(Prediction {
            season: race.season,
            round: race.round,
            circuit_id: race.circuit_id.clone(),
            artifact_version: self.metadata.version.clone(),
            entrants,
        })
    }

    /// Predict several races in order, stopping at the first failure
    pub fn predict_batch(&self, races: &[RaceInput]) -> Result<Vec<Prediction>, PipelineError> {
        races
            .iter()
            .enumerate()
            .map(|(index, race)| {
                self.predict(race).map_err(|source| PipelineError::Batch {
                    index,
                    source: Box::new(source),
                })
            })
            .collect()
    }
}
