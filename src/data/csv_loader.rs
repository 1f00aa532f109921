//! CSV loading for race inputs
//!
//! One row per entrant, as written by the upstream feature builders:
//! `season,round,circuit_id,driver_id,constructor_id[,grid][,race_name][,race.<ctx>...][,<feature>...]`

use polars::prelude::*;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use crate::models::{Entrant, FeatureValue, RaceInput};

/// Errors raised while turning entrant rows into races
#[derive(Debug, Error)]
pub enum CsvLoadError {
    #[error("failed to read CSV: {0}")]
    Polars(#[from] PolarsError),

    #[error("missing required column `{0}`")]
    MissingColumn(String),

    #[error("row {row}: invalid `{column}`: {message}")]
    InvalidValue {
        row: usize,
        column: String,
        message: String,
    },
}

const REQUIRED_COLUMNS: [&str; 5] = ["season", "round", "circuit_id", "driver_id", "constructor_id"];

/// Prefix marking race-level context columns
const RACE_PREFIX: &str = "race.";

/// Load race inputs from CSV, grouped by (season, round, circuit_id)
///
/// Races appear in first-seen order; entrants keep row order.
pub fn load_races<P: AsRef<Path>>(csv_path: P) -> Result<Vec<RaceInput>, CsvLoadError> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(csv_path.as_ref().to_path_buf()))?
        .finish()?;

    dataframe_to_races(&df)
}

/// Convert a DataFrame of entrant rows into race inputs
pub fn dataframe_to_races(df: &DataFrame) -> Result<Vec<RaceInput>, CsvLoadError> {
    let names: Vec<String> = df
        .get_columns()
        .iter()
        .map(|c| c.name().as_str().to_string())
        .collect();
    for required in REQUIRED_COLUMNS {
        if !names.iter().any(|n| n == required) {
            return Err(CsvLoadError::MissingColumn(required.to_string()));
        }
    }

    let columns: Vec<(String, Vec<FeatureValue>)> = df
        .get_columns()
        .iter()
        .map(|c| Ok((c.name().as_str().to_string(), column_values(c)?)))
        .collect::<Result<_, PolarsError>>()?;
    let lookup: HashMap<&str, &Vec<FeatureValue>> =
        columns.iter().map(|(n, v)| (n.as_str(), v)).collect();

    let mut races: Vec<RaceInput> = Vec::new();
    let mut index: HashMap<(u16, u8, String), usize> = HashMap::new();

    for row in 0..df.height() {
        let season = integer(&lookup, "season", row)?;
        let round = integer(&lookup, "round", row)?;
        let circuit_id = text(&lookup, "circuit_id", row)?;

        let season = u16::try_from(season).map_err(|_| invalid(row, "season", "out of range"))?;
        let round = u8::try_from(round).map_err(|_| invalid(row, "round", "out of range"))?;

        let key = (season, round, circuit_id.clone());
        let race_idx = match index.get(&key) {
            Some(&i) => i,
            None => {
                let mut race = RaceInput::new(season, round, circuit_id);
                if let Some(FeatureValue::Text(name)) = lookup.get("race_name").map(|v| &v[row]) {
                    race.race_name = Some(name.clone());
                }
                for (name, values) in &columns {
                    if let Some(ctx) = name.strip_prefix(RACE_PREFIX) {
                        race.context.insert(ctx.to_string(), values[row].clone());
                    }
                }
                races.push(race);
                index.insert(key, races.len() - 1);
                races.len() - 1
            }
        };

        let mut entrant = Entrant::new(
            text(&lookup, "driver_id", row)?,
            text(&lookup, "constructor_id", row)?,
        );
        entrant.grid = match lookup.get("grid").map(|v| &v[row]) {
            None | Some(FeatureValue::Null) => None,
            Some(_) => {
                let grid = integer(&lookup, "grid", row)?;
                Some(u32::try_from(grid).map_err(|_| invalid(row, "grid", "must be non-negative"))?)
            }
        };

        for (name, values) in &columns {
            if is_reserved(name) {
                continue;
            }
            entrant.features.insert(name.clone(), values[row].clone());
        }

        races[race_idx].entrants.push(entrant);
    }

    Ok(races)
}

fn is_reserved(name: &str) -> bool {
    REQUIRED_COLUMNS.contains(&name)
        || name == "grid"
        || name == "race_name"
        || name.starts_with(RACE_PREFIX)
}

/// Materialize a column as feature values; empty cells become `Null`
fn column_values(column: &Column) -> Result<Vec<FeatureValue>, PolarsError> {
    let values = match column.dtype() {
        DataType::String => column
            .str()?
            .into_iter()
            .map(|v| match v {
                Some(s) if !s.trim().is_empty() => FeatureValue::Text(s.to_string()),
                _ => FeatureValue::Null,
            })
            .collect(),
        DataType::Boolean => column
            .bool()?
            .into_iter()
            .map(|v| v.map(FeatureValue::Bool).unwrap_or(FeatureValue::Null))
            .collect(),
        _ => column
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .map(|v| v.map(FeatureValue::Number).unwrap_or(FeatureValue::Null))
            .collect(),
    };
    Ok(values)
}

fn integer(lookup: &HashMap<&str, &Vec<FeatureValue>>, column: &str, row: usize) -> Result<i64, CsvLoadError> {
    match lookup.get(column).map(|v| &v[row]) {
        Some(FeatureValue::Number(x)) if x.fract() == 0.0 => Ok(*x as i64),
        Some(FeatureValue::Number(_)) => Err(invalid(row, column, "expected an integer")),
        Some(FeatureValue::Null) | None => Err(invalid(row, column, "missing value")),
        Some(other) => Err(invalid(row, column, &format!("expected an integer, got {}", other.type_name()))),
    }
}

fn text(lookup: &HashMap<&str, &Vec<FeatureValue>>, column: &str, row: usize) -> Result<String, CsvLoadError> {
    match lookup.get(column).map(|v| &v[row]) {
        Some(FeatureValue::Text(s)) => Ok(s.clone()),
        // numeric ids such as driver numbers are read as text
        Some(FeatureValue::Number(x)) if x.fract() == 0.0 => Ok(format!("{}", *x as i64)),
        Some(FeatureValue::Null) | None => Err(invalid(row, column, "missing value")),
        Some(other) => Err(invalid(row, column, &format!("expected text, got {}", other.type_name()))),
    }
}

fn invalid(row: usize, column: &str, message: &str) -> CsvLoadError {
    CsvLoadError::InvalidValue {
        row,
        column: column.to_string(),
        message: message.to_string(),
    }
}
