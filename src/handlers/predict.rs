use actix_web::{web, HttpResponse};
use std::sync::Arc;
use tracing::{debug, warn};

use super::AppState;
use crate::error::{validate_batch_size, AppError};
use crate::models::{PredictResponse, RaceInput};

/// Predict finishing order for one race
pub async fn predict_race(
    state: web::Data<Arc<AppState>>,
    req: web::Json<RaceInput>,
) -> Result<HttpResponse, AppError> {
    let pipeline = state.pipeline()?;
    let race = req.into_inner();

    let prediction = pipeline.predict(&race).map_err(|e| {
        warn!(race = %race.label(), "Prediction rejected: {}", e);
        AppError::from(e)
    })?;

    Ok(HttpResponse::Ok().json(PredictResponse::from(prediction)))
}

/// Predict several races; fails as a whole on the first invalid race
pub async fn predict_batch(
    state: web::Data<Arc<AppState>>,
    req: web::Json<Vec<RaceInput>>,
) -> Result<HttpResponse, AppError> {
    let pipeline = state.pipeline()?;
    validate_batch_size(req.len(), state.max_batch_size)?;

    let predictions = pipeline.predict_batch(&req).map_err(|e| {
        warn!("Batch prediction rejected: {}", e);
        AppError::from(e)
    })?;
    debug!(races = predictions.len(), "Batch prediction complete");

    let response: Vec<PredictResponse> = predictions.into_iter().map(PredictResponse::from).collect();
    Ok(HttpResponse::Ok().json(response))
}
