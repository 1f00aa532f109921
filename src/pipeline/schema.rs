//! Feature Schema
//!
//! Named input fields an artifact expects, and their resolution from a race input.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::error::{FieldIssue, Problem, ValidationError};
use crate::models::{Entrant, FeatureValue, RaceInput};

/// Entrant-level fields read from `Entrant` itself rather than its feature map
const ENTRANT_BUILTINS: [(&str, FeatureKind); 3] = [
    ("driver_id", FeatureKind::Categorical),
    ("constructor_id", FeatureKind::Categorical),
    ("grid", FeatureKind::Numeric),
];

/// Race-level fields read from `RaceInput` itself rather than its context map
const RACE_BUILTINS: [(&str, FeatureKind); 3] = [
    ("season", FeatureKind::Numeric),
    ("round", FeatureKind::Numeric),
    ("circuit_id", FeatureKind::Categorical),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    #[default]
    Numeric,
    Categorical,
}

impl FeatureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureKind::Numeric => "numeric",
            FeatureKind::Categorical => "categorical",
        }
    }

    fn expected(&self) -> &'static str {
        match self {
            FeatureKind::Numeric => "number",
            FeatureKind::Categorical => "text",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureScope {
    #[default]
    Entrant,
    Race,
}

impl FeatureScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureScope::Entrant => "entrant",
            FeatureScope::Race => "race",
        }
    }
}

/// A single schema field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    #[serde(default)]
    pub kind: FeatureKind,
    #[serde(default)]
    pub scope: FeatureScope,
    /// Inclusive lower bound for numeric fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Inclusive upper bound for numeric fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

/// Resolved and type-checked field value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Number(f64),
    Category(String),
}

impl FieldValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(x) => Some(*x),
            FieldValue::Category(_) => None,
        }
    }

    pub fn as_category(&self) -> Option<&str> {
        match self {
            FieldValue::Category(s) => Some(s),
            FieldValue::Number(_) => None,
        }
    }
}

/// Feature schema bundled with an artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    /// `MAJOR.MINOR`, checked against the running build at load
    pub version: String,
    pub fields: Vec<FeatureSpec>,
}

impl FeatureSchema {
    pub fn field(&self, name: &str) -> Option<&FeatureSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Check the schema is self-consistent
    pub(crate) fn check(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        for spec in &self.fields {
            if spec.name.trim().is_empty() {
                return Err("schema field with empty name".to_string());
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(format!("schema field `{}` declared twice", spec.name));
            }

            let builtins: &[(&str, FeatureKind)] = match spec.scope {
                FeatureScope::Entrant => &ENTRANT_BUILTINS,
                FeatureScope::Race => &RACE_BUILTINS,
            };
            if let Some((_, kind)) = builtins.iter().find(|(name, _)| *name == spec.name) {
                if *kind != spec.kind {
                    return Err(format!(
                        "built-in field `{}` must be {}, schema declares {}",
                        spec.name,
                        kind.as_str(),
                        spec.kind.as_str()
                    ));
                }
            }

            if spec.kind == FeatureKind::Categorical && (spec.min.is_some() || spec.max.is_some()) {
                return Err(format!("categorical field `{}` cannot have bounds", spec.name));
            }
            if let (Some(min), Some(max)) = (spec.min, spec.max) {
                if min > max {
                    return Err(format!(
                        "field `{}` has min {} greater than max {}",
                        spec.name, min, max
                    ));
                }
            }
        }
        Ok(())
    }

    /// Resolve every schema field for every entrant
    ///
    /// Returns one row per entrant (input order), one column per schema field.
    /// All problems are collected before failing; nothing is imputed.
    pub fn resolve(&self, race: &RaceInput) -> Result<Vec<Vec<FieldValue>>, ValidationError> {
        let mut issues = Vec::new();

        if race.entrants.is_empty() {
            issues.push(FieldIssue::race("entrants", Problem::Empty));
            return Err(ValidationError::new(issues));
        }

        let mut drivers = HashSet::new();
        for (i, entrant) in race.entrants.iter().enumerate() {
            if entrant.driver_id.trim().is_empty() {
                issues.push(FieldIssue::entrant("driver_id", i, "", Problem::Empty));
            } else if !drivers.insert(entrant.driver_id.as_str()) {
                issues.push(FieldIssue::entrant(
                    "driver_id",
                    i,
                    entrant.driver_id.as_str(),
                    Problem::Duplicate {
                        value: entrant.driver_id.clone(),
                    },
                ));
            }
        }

        // Race-scope fields are shared by every entrant; report them once
        let race_values: Vec<Option<FieldValue>> = self
            .fields
            .iter()
            .map(|spec| match spec.scope {
                FeatureScope::Race => match Self::check_value(spec, race_value(race, &spec.name)) {
                    Ok(value) => Some(value),
                    Err(problem) => {
                        issues.push(FieldIssue::race(spec.name.as_str(), problem));
                        None
                    }
                },
                FeatureScope::Entrant => None,
            })
            .collect();

        let mut rows = Vec::with_capacity(race.entrants.len());
        for (i, entrant) in race.entrants.iter().enumerate() {
            let mut row = Vec::with_capacity(self.fields.len());
            for (spec, shared) in self.fields.iter().zip(&race_values) {
                match spec.scope {
                    FeatureScope::Race => {
                        if let Some(value) = shared {
                            row.push(value.clone());
                        }
                    }
                    FeatureScope::Entrant => {
                        match Self::check_value(spec, entrant_value(entrant, &spec.name)) {
                            Ok(value) => row.push(value),
                            Err(problem) => issues.push(FieldIssue::entrant(
                                spec.name.as_str(),
                                i,
                                entrant.driver_id.as_str(),
                                problem,
                            )),
                        }
                    }
                }
            }
            rows.push(row);
        }

        if issues.is_empty() {
            Ok(rows)
        } else {
            Err(ValidationError::new(issues))
        }
    }

    fn check_value(spec: &FeatureSpec, raw: Option<FeatureValue>) -> Result<FieldValue, Problem> {
        let raw = match raw {
            None | Some(FeatureValue::Null) => return Err(Problem::Missing),
            Some(raw) => raw,
        };

        match spec.kind {
            FeatureKind::Numeric => {
                let value = match raw {
                    FeatureValue::Number(x) => x,
                    FeatureValue::Bool(b) => {
                        if b {
                            1.0
                        } else {
                            0.0
                        }
                    }
                    other => {
                        return Err(Problem::WrongType {
                            expected: spec.kind.expected().to_string(),
                            found: other.type_name().to_string(),
                        })
                    }
                };
                if !value.is_finite() {
                    return Err(Problem::NotFinite);
                }
                let below = spec.min.is_some_and(|min| value < min);
                let above = spec.max.is_some_and(|max| value > max);
                if below || above {
                    return Err(Problem::OutOfRange {
                        value,
                        min: spec.min,
                        max: spec.max,
                    });
                }
                Ok(FieldValue::Number(value))
            }
            FeatureKind::Categorical => match raw {
                FeatureValue::Text(s) if s.trim().is_empty() => Err(Problem::Empty),
                FeatureValue::Text(s) => Ok(FieldValue::Category(s)),
                other => Err(Problem::WrongType {
                    expected: spec.kind.expected().to_string(),
                    found: other.type_name().to_string(),
                }),
            },
        }
    }
}

fn entrant_value(entrant: &Entrant, name: &str) -> Option<FeatureValue> {
    match name {
        "driver_id" => Some(FeatureValue::Text(entrant.driver_id.clone())),
        "constructor_id" => Some(FeatureValue::Text(entrant.constructor_id.clone())),
        "grid" => entrant.grid.map(|g| FeatureValue::Number(g as f64)),
        _ => entrant.features.get(name).cloned(),
    }
}

fn race_value(race: &RaceInput, name: &str) -> Option<FeatureValue> {
    match name {
        "season" => Some(FeatureValue::Number(race.season as f64)),
        "round" => Some(FeatureValue::Number(race.round as f64)),
        "circuit_id" => Some(FeatureValue::Text(race.circuit_id.clone())),
        _ => race.context.get(name).cloned(),
    }
}
