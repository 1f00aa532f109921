use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::pipeline::FieldIssue;

/// Scalar feature value as it arrives from upstream feature builders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Number(f64),
    Bool(bool),
    Text(String),
    Null,
}

impl FeatureValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FeatureValue::Null)
    }

    /// Short type name used in validation messages
    pub fn type_name(&self) -> &'static str {
        match self {
            FeatureValue::Number(_) => "number",
            FeatureValue::Bool(_) => "boolean",
            FeatureValue::Text(_) => "text",
            FeatureValue::Null => "null",
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(value: f64) -> Self {
        FeatureValue::Number(value)
    }
}

impl From<&str> for FeatureValue {
    fn from(value: &str) -> Self {
        FeatureValue::Text(value.to_string())
    }
}

/// Driver/constructor pairing entered in a race
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entrant {
    pub driver_id: String,
    pub constructor_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid: Option<u32>,
    /// Recent-form statistics keyed by feature name
    #[serde(default)]
    pub features: BTreeMap<String, FeatureValue>,
}

impl Entrant {
    pub fn new(driver_id: impl Into<String>, constructor_id: impl Into<String>) -> Self {
        Self {
            driver_id: driver_id.into(),
            constructor_id: constructor_id.into(),
            grid: None,
            features: BTreeMap::new(),
        }
    }

    pub fn with_grid(mut self, grid: u32) -> Self {
        self.grid = Some(grid);
        self
    }

    pub fn with_feature(mut self, name: impl Into<String>, value: impl Into<FeatureValue>) -> Self {
        self.features.insert(name.into(), value.into());
        self
    }
}

/// Upcoming race session and its entrants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceInput {
    pub season: u16,
    pub round: u8,
    pub circuit_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub race_name: Option<String>,
    /// Race-level features (weather, track temperature, ...)
    #[serde(default)]
    pub context: BTreeMap<String, FeatureValue>,
    pub entrants: Vec<Entrant>,
}

impl RaceInput {
    pub fn new(season: u16, round: u8, circuit_id: impl Into<String>) -> Self {
        Self {
            season,
            round,
            circuit_id: circuit_id.into(),
            race_name: None,
            context: BTreeMap::new(),
            entrants: Vec::new(),
        }
    }

    /// Human-readable race label, e.g. `2024 R03 (albert_park)`
    pub fn label(&self) -> String {
        match &self.race_name {
            Some(name) => format!("{} R{:02} {} ({})", self.season, self.round, name, self.circuit_id),
            None => format!("{} R{:02} ({})", self.season, self.round, self.circuit_id),
        }
    }
}

/// Prediction for a single entrant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrantPrediction {
    pub driver_id: String,
    pub constructor_id: String,
    /// Raw model output
    pub score: f64,
    /// 1 = predicted winner
    pub predicted_rank: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,
}

/// Race prediction, entrants in input order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub season: u16,
    pub round: u8,
    pub circuit_id: String,
    pub artifact_version: String,
    pub entrants: Vec<EntrantPrediction>,
}

impl Prediction {
    /// Entrants sorted by predicted rank
    pub fn ranking(&self) -> Vec<&EntrantPrediction> {
        let mut ranked: Vec<&EntrantPrediction> = self.entrants.iter().collect();
        ranked.sort_by_key(|p| p.predicted_rank);
        ranked
    }

    pub fn winner(&self) -> Option<&EntrantPrediction> {
        self.entrants.iter().find(|p| p.predicted_rank == 1)
    }
}

/// Race prediction response
#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub prediction: Prediction,
    /// Driver ids ordered by predicted finishing position
    pub ranking: Vec<String>,
}

impl From<Prediction> for PredictResponse {
    fn from(prediction: Prediction) -> Self {
        let ranking = prediction
            .ranking()
            .into_iter()
            .map(|p| p.driver_id.clone())
            .collect();
        Self {
            prediction,
            ranking,
        }
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub model_loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loaded_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Root endpoint banner
#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub message: String,
    pub version: String,
    pub status: String,
    pub health: String,
    pub predict: String,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<FieldIssue>,
}
