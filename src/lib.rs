//! F1 Predictor - Formula 1 race result prediction
//!
//! This library provides:
//! - A versioned pipeline artifact (feature schema, fitted transform, fitted model)
//! - Input validation that reports every missing or invalid field
//! - Deterministic per-entrant scores and finishing-order ranks
//! - Race input loading from JSON and CSV
//!
//! # Example
//!
//! ```no_run
//! use f1_predictor::data::load_races;
//! use f1_predictor::pipeline::Pipeline;
//!
//! let pipeline = Pipeline::load("models/sample_pipeline.json")?;
//! for race in load_races("data/sample_race.json")? {
//!     let prediction = pipeline.predict(&race)?;
//!     for entrant in prediction.ranking() {
//!         println!("P{} {}", entrant.predicted_rank, entrant.driver_id);
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod data;
pub mod models;
pub mod pipeline;

// API-specific modules (only available with api feature)
#[cfg(feature = "api")]
pub mod error;
#[cfg(feature = "api")]
pub mod handlers;

// Re-export commonly used types
pub use models::{Entrant, EntrantPrediction, FeatureValue, Prediction, RaceInput};
pub use pipeline::{ArtifactError, Pipeline, PipelineError, ValidationError};
