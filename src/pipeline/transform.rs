//! Fitted Feature Transform
//!
//! Ordered list of steps, each reading one schema field and producing one or more
//! model input columns. All fitted parameters come from the artifact.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::error::{FieldIssue, Problem, ValidationError};
use super::schema::{FeatureKind, FeatureSchema, FeatureScope, FieldValue};
use crate::models::RaceInput;

/// What to do with a category not seen during fitting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleUnknown {
    #[default]
    Error,
    Ignore,
}

fn default_unknown_value() -> f64 {
    -1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TransformStep {
    Passthrough {
        field: String,
    },
    Standardize {
        field: String,
        mean: f64,
        std: f64,
    },
    MinMax {
        field: String,
        min: f64,
        max: f64,
    },
    OneHot {
        field: String,
        categories: Vec<String>,
        #[serde(default)]
        handle_unknown: HandleUnknown,
    },
    Ordinal {
        field: String,
        categories: Vec<String>,
        #[serde(default)]
        handle_unknown: HandleUnknown,
        #[serde(default = "default_unknown_value")]
        unknown_value: f64,
    },
    /// 1 + number of entrants in the same race with a strictly better value
    FieldRank {
        field: String,
        /// Higher values rank better when set
        #[serde(default)]
        descending: bool,
    },
    /// Value minus the race-field mean
    FieldDelta {
        field: String,
    },
}

impl TransformStep {
    pub fn field(&self) -> &str {
        match self {
            TransformStep::Passthrough { field }
            | TransformStep::Standardize { field, .. }
            | TransformStep::MinMax { field, .. }
            | TransformStep::OneHot { field, .. }
            | TransformStep::Ordinal { field, .. }
            | TransformStep::FieldRank { field, .. }
            | TransformStep::FieldDelta { field } => field,
        }
    }

    fn input_kind(&self) -> FeatureKind {
        match self {
            TransformStep::OneHot { .. } | TransformStep::Ordinal { .. } => FeatureKind::Categorical,
            _ => FeatureKind::Numeric,
        }
    }

    /// Output column names, in emission order
    pub fn output_names(&self) -> Vec<String> {
        match self {
            TransformStep::OneHot {
                field, categories, ..
            } => categories
                .iter()
                .map(|c| format!("{}={}", field, c))
                .collect(),
            TransformStep::FieldRank { field, .. } => vec![format!("{}:field_rank", field)],
            TransformStep::FieldDelta { field } => vec![format!("{}:field_delta", field)],
            other => vec![other.field().to_string()],
        }
    }

    fn check_params(&self) -> Result<(), String> {
        match self {
            TransformStep::Standardize { field, mean, std } => {
                if !mean.is_finite() || !std.is_finite() || *std <= 0.0 {
                    return Err(format!(
                        "standardize `{}` needs finite mean and positive std, got mean={} std={}",
                        field, mean, std
                    ));
                }
            }
            TransformStep::MinMax { field, min, max } => {
                if !min.is_finite() || !max.is_finite() || min >= max {
                    return Err(format!(
                        "min_max `{}` needs finite min < max, got [{}, {}]",
                        field, min, max
                    ));
                }
            }
            TransformStep::OneHot {
                field, categories, ..
            }
            | TransformStep::Ordinal {
                field, categories, ..
            } => {
                if categories.is_empty() {
                    return Err(format!("`{}` has no fitted categories", field));
                }
                let unique: HashSet<&String> = categories.iter().collect();
                if unique.len() != categories.len() {
                    return Err(format!("`{}` has duplicate categories", field));
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Feature transform as stored in the artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTransform {
    pub steps: Vec<TransformStep>,
}

impl FeatureTransform {
    /// Bind each step to its schema column, rejecting steps the schema can't feed
    pub fn bind(self, schema: &FeatureSchema) -> Result<BoundTransform, String> {
        if self.steps.is_empty() {
            return Err("transform has no steps".to_string());
        }

        let mut steps = Vec::with_capacity(self.steps.len());
        let mut names: Vec<String> = Vec::new();

        for step in self.steps {
            step.check_params()?;

            let column = schema.index_of(step.field()).ok_or_else(|| {
                format!("transform reads `{}` which is not in the schema", step.field())
            })?;
            let declared = schema.fields[column].kind;
            if declared != step.input_kind() {
                return Err(format!(
                    "transform step on `{}` needs a {} field, schema declares {}",
                    step.field(),
                    step.input_kind().as_str(),
                    declared.as_str()
                ));
            }

            for name in step.output_names() {
                if names.contains(&name) {
                    return Err(format!("transform emits column `{}` twice", name));
                }
                names.push(name);
            }
            steps.push(BoundStep {
                column,
                scope: schema.fields[column].scope,
                step,
            });
        }

        Ok(BoundTransform { steps, names })
    }
}

#[derive(Debug, Clone)]
struct BoundStep {
    column: usize,
    scope: FeatureScope,
    step: TransformStep,
}

/// Transform bound to a schema, ready to apply
#[derive(Debug, Clone)]
pub struct BoundTransform {
    steps: Vec<BoundStep>,
    names: Vec<String>,
}

impl BoundTransform {
    /// Number of model input columns produced
    pub fn width(&self) -> usize {
        self.names.len()
    }

    pub fn output_names(&self) -> &[String] {
        &self.names
    }

    pub fn steps(&self) -> impl Iterator<Item = &TransformStep> {
        self.steps.iter().map(|b| &b.step)
    }

    /// Apply to resolved schema rows, producing one model input row per entrant
    ///
    /// Every row must hold one value per schema field, as `FeatureSchema::resolve` returns.
    pub(crate) fn apply(
        &self,
        race: &RaceInput,
        rows: &[Vec<FieldValue>],
    ) -> Result<Vec<Vec<f64>>, ValidationError> {
        let mut matrix: Vec<Vec<f64>> = rows.iter().map(|_| Vec::with_capacity(self.width())).collect();
        let mut issues = Vec::new();

        for bound in &self.steps {
            match &bound.step {
                TransformStep::Passthrough { .. } => {
                    for (out, row) in matrix.iter_mut().zip(rows) {
                        out.push(number(row, bound.column));
                    }
                }
                TransformStep::Standardize { mean, std, .. } => {
                    for (out, row) in matrix.iter_mut().zip(rows) {
                        out.push((number(row, bound.column) - mean) / std);
                    }
                }
                TransformStep::MinMax { min, max, .. } => {
                    for (out, row) in matrix.iter_mut().zip(rows) {
                        out.push((number(row, bound.column) - min) / (max - min));
                    }
                }
                TransformStep::OneHot {
                    field,
                    categories,
                    handle_unknown,
                } => {
                    for (i, (out, row)) in matrix.iter_mut().zip(rows).enumerate() {
                        let value = category(row, bound.column);
                        let hit = categories.iter().position(|c| c == value);
                        if hit.is_none() && *handle_unknown == HandleUnknown::Error {
                            issues.extend(unknown_category(race, bound.scope, field, i, value));
                        }
                        out.extend((0..categories.len()).map(|k| if Some(k) == hit { 1.0 } else { 0.0 }));
                    }
                }
                TransformStep::Ordinal {
                    field,
                    categories,
                    handle_unknown,
                    unknown_value,
                } => {
                    for (i, (out, row)) in matrix.iter_mut().zip(rows).enumerate() {
                        let value = category(row, bound.column);
                        match categories.iter().position(|c| c == value) {
                            Some(k) => out.push(k as f64),
                            None => {
                                if *handle_unknown == HandleUnknown::Error {
                                    issues.extend(unknown_category(race, bound.scope, field, i, value));
                                }
                                out.push(*unknown_value);
                            }
                        }
                    }
                }
                TransformStep::FieldRank { descending, .. } => {
                    let values: Vec<f64> = rows.iter().map(|r| number(r, bound.column)).collect();
                    for (out, &value) in matrix.iter_mut().zip(&values) {
                        let better = values
                            .iter()
                            .filter(|&&other| if *descending { other > value } else { other < value })
                            .count();
                        out.push((better + 1) as f64);
                    }
                }
                TransformStep::FieldDelta { .. } => {
                    let values: Vec<f64> = rows.iter().map(|r| number(r, bound.column)).collect();
                    let mean = values.iter().sum::<f64>() / values.len() as f64;
                    for (out, value) in matrix.iter_mut().zip(&values) {
                        out.push(value - mean);
                    }
                }
            }
        }

        if issues.is_empty() {
            Ok(matrix)
        } else {
            Err(ValidationError::new(issues))
        }
    }
}

// Column kinds are checked in `bind` and values in `FeatureSchema::resolve`,
// so a mismatch here cannot come from a validated race.
fn number(row: &[FieldValue], column: usize) -> f64 {
    row[column].as_number().unwrap_or(f64::NAN)
}

fn category(row: &[FieldValue], column: usize) -> &str {
    row[column].as_category().unwrap_or_default()
}

/// Issue for an unknown category in row `index`; race-scope fields only report row 0
fn unknown_category(
    race: &RaceInput,
    scope: FeatureScope,
    field: &str,
    index: usize,
    value: &str,
) -> Option<FieldIssue> {
    let problem = Problem::UnknownCategory {
        value: value.to_string(),
    };
    match scope {
        FeatureScope::Race if index == 0 => Some(FieldIssue::race(field, problem)),
        FeatureScope::Race => None,
        FeatureScope::Entrant => {
            let driver = race
                .entrants
                .get(index)
                .map(|e| e.driver_id.as_str())
                .unwrap_or_default();
            Some(FieldIssue::entrant(field, index, driver, problem))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Entrant;
    use crate::pipeline::schema::{FeatureScope, FeatureSpec};

    fn schema() -> FeatureSchema {
        let spec = |name: &str, kind| FeatureSpec {
            name: name.to_string(),
            kind,
            scope: FeatureScope::Entrant,
            min: None,
            max: None,
        };
        FeatureSchema {
            version: "1.0".to_string(),
            fields: vec![
                spec("grid", FeatureKind::Numeric),
                spec("constructor_id", FeatureKind::Categorical),
                spec("points_last3", FeatureKind::Numeric),
            ],
        }
    }

    fn race() -> RaceInput {
        let mut race = RaceInput::new(2024, 8, "monaco");
        race.entrants = vec![
            Entrant::new("leclerc", "ferrari").with_grid(1).with_feature("points_last3", 40.0),
            Entrant::new("piastri", "mclaren").with_grid(2).with_feature("points_last3", 30.0),
            Entrant::new("sainz", "ferrari").with_grid(3).with_feature("points_last3", 50.0),
        ];
        race
    }

    fn parse(json: &str) -> FeatureTransform {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_step_parsing_and_output_names() {
        let transform = parse(
            r#"{"steps": [
                {"op": "standardize", "field": "grid", "mean": 2.0, "std": 1.0},
                {"op": "one_hot", "field": "constructor_id", "categories": ["ferrari", "mclaren"]},
                {"op": "field_rank", "field": "points_last3", "descending": true},
                {"op": "field_delta", "field": "points_last3"}
            ]}"#,
        );
        let bound = transform.bind(&schema()).unwrap();

        assert_eq!(
            bound.output_names(),
            &[
                "grid",
                "constructor_id=ferrari",
                "constructor_id=mclaren",
                "points_last3:field_rank",
                "points_last3:field_delta"
            ]
        );
        assert_eq!(bound.width(), 5);
    }

    #[test]
    fn test_apply_values() {
        let bound = parse(
            r#"{"steps": [
                {"op": "standardize", "field": "grid", "mean": 2.0, "std": 0.5},
                {"op": "min_max", "field": "points_last3", "min": 0.0, "max": 100.0},
                {"op": "one_hot", "field": "constructor_id", "categories": ["ferrari", "mclaren"]},
                {"op": "field_rank", "field": "points_last3", "descending": true},
                {"op": "field_rank", "field": "grid"},
                {"op": "field_delta", "field": "points_last3"}
            ]}"#,
        )
        .bind(&schema())
        .unwrap();

        let race = race();
        let rows = schema().resolve(&race).unwrap();
        let matrix = bound.apply(&race, &rows).unwrap();

        assert_eq!(matrix.len(), 3);
        assert!(matrix.iter().all(|r| r.len() == bound.width()));

        // leclerc: grid 1, 40 points, ferrari
        assert!((matrix[0][0] - (-2.0)).abs() < 1e-12);
        assert!((matrix[0][1] - 0.4).abs() < 1e-12);
        assert_eq!(&matrix[0][2..4], &[1.0, 0.0]);
        assert_eq!(matrix[0][4], 2.0); // second most points
        assert_eq!(matrix[0][5], 1.0); // pole
        assert!((matrix[0][6] - 0.0).abs() < 1e-12); // mean points = 40

        // sainz has the most points
        assert_eq!(matrix[2][4], 1.0);
        assert!((matrix[2][6] - 10.0).abs() < 1e-12);
        // piastri is mclaren
        assert_eq!(&matrix[1][2..4], &[0.0, 1.0]);
    }

    #[test]
    fn test_field_rank_ties_share_rank() {
        let bound = parse(r#"{"steps": [{"op": "field_rank", "field": "points_last3"}]}"#)
            .bind(&schema())
            .unwrap();
        let mut race = race();
        race.entrants[2]
            .features
            .insert("points_last3".to_string(), 30.0.into());
        let rows = schema().resolve(&race).unwrap();
        let matrix = bound.apply(&race, &rows).unwrap();

        // ascending: lower is better, 30/30 tie at rank 1, 40 ranks 3
        assert_eq!(matrix[1][0], 1.0);
        assert_eq!(matrix[2][0], 1.0);
        assert_eq!(matrix[0][0], 3.0);
    }

    #[test]
    fn test_unknown_category_errors_by_default() {
        let bound = parse(
            r#"{"steps": [{"op": "one_hot", "field": "constructor_id", "categories": ["ferrari"]}]}"#,
        )
        .bind(&schema())
        .unwrap();
        let race = race();
        let rows = schema().resolve(&race).unwrap();

        let err = bound.apply(&race, &rows).unwrap_err();
        assert_eq!(err.issues.len(), 1);
        assert_eq!(err.issues[0].field, "constructor_id");
        assert_eq!(err.issues[0].driver_id.as_deref(), Some("piastri"));
        assert_eq!(
            err.issues[0].problem,
            Problem::UnknownCategory {
                value: "mclaren".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_race_category_reported_once() {
        let mut schema = schema();
        schema.fields.push(FeatureSpec {
            name: "circuit_id".to_string(),
            kind: FeatureKind::Categorical,
            scope: FeatureScope::Race,
            min: None,
            max: None,
        });
        let mut race = race();
        race.circuit_id = "bahrain".to_string();
        let rows = schema.resolve(&race).unwrap();

        for steps in [
            r#"{"steps": [{"op": "one_hot", "field": "circuit_id", "categories": ["monaco"]}]}"#,
            r#"{"steps": [{"op": "ordinal", "field": "circuit_id", "categories": ["monaco"]}]}"#,
        ] {
            let bound = parse(steps).bind(&schema).unwrap();
            let err = bound.apply(&race, &rows).unwrap_err();

            assert_eq!(err.issues.len(), 1);
            assert_eq!(err.issues[0].field, "circuit_id");
            assert_eq!(err.issues[0].entrant, None);
            assert_eq!(err.issues[0].driver_id, None);
            assert_eq!(
                err.issues[0].problem,
                Problem::UnknownCategory {
                    value: "bahrain".to_string()
                }
            );
        }
    }

    #[test]
    fn test_unknown_category_ignored() {
        let bound = parse(
            r#"{"steps": [
                {"op": "one_hot", "field": "constructor_id", "categories": ["ferrari"], "handle_unknown": "ignore"}
            ]}"#,
        )
        .bind(&schema())
        .unwrap();
        let race = race();
        let rows = schema().resolve(&race).unwrap();
        let matrix = bound.apply(&race, &rows).unwrap();
        assert_eq!(matrix[1], vec![0.0]);

        let ordinal = parse(
            r#"{"steps": [
                {"op": "ordinal", "field": "constructor_id", "categories": ["ferrari"], "handle_unknown": "ignore"}
            ]}"#,
        )
        .bind(&schema())
        .unwrap();
        let matrix = ordinal.apply(&race, &rows).unwrap();
        assert_eq!(matrix[0], vec![0.0]);
        assert_eq!(matrix[1], vec![-1.0]);
    }

    #[test]
    fn test_bind_rejects_inconsistent_steps() {
        let missing = parse(r#"{"steps": [{"op": "passthrough", "field": "quali_gap"}]}"#);
        assert!(missing.bind(&schema()).unwrap_err().contains("not in the schema"));

        let wrong_kind = parse(r#"{"steps": [{"op": "standardize", "field": "constructor_id", "mean": 0, "std": 1}]}"#);
        assert!(wrong_kind.bind(&schema()).is_err());

        let zero_std = parse(r#"{"steps": [{"op": "standardize", "field": "grid", "mean": 0, "std": 0}]}"#);
        assert!(zero_std.bind(&schema()).unwrap_err().contains("positive std"));

        let empty = FeatureTransform { steps: vec![] };
        assert!(empty.bind(&schema()).is_err());

        let duplicate = parse(
            r#"{"steps": [
                {"op": "passthrough", "field": "grid"},
                {"op": "min_max", "field": "grid", "min": 1, "max": 20}
            ]}"#,
        );
        assert!(duplicate.bind(&schema()).unwrap_err().contains("twice"));
    }
}
