//! HTTP request handlers (feature `api`)

pub mod health;
pub mod predict;

use actix_cors::Cors;
use actix_web::web;

use crate::error::AppError;
use crate::pipeline::Pipeline;

/// Application state shared across handlers
pub struct AppState {
    /// `None` when the artifact failed to load (degraded mode)
    pub pipeline: Option<Pipeline>,
    pub max_batch_size: usize,
}

impl AppState {
    pub fn pipeline(&self) -> Result<&Pipeline, AppError> {
        self.pipeline.as_ref().ok_or(AppError::ModelUnavailable)
    }
}

/// CORS policy for browser clients; `*` in `origins` allows any origin
pub fn cors(origins: &[String]) -> Cors {
    if origins.iter().any(|o| o == "*") {
        return Cors::permissive();
    }
    origins
        .iter()
        .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
        .allowed_methods(vec!["GET", "POST"])
        .allow_any_header()
        .max_age(3600)
}

/// Register all routes and the JSON body error mapping
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| AppError::BadRequest(err.to_string()).into()),
    )
    .route("/", web::get().to(health::service_info))
    .route("/health", web::get().to(health::health_check))
    .route("/predict", web::post().to(predict::predict_race))
    .route("/predict/batch", web::post().to(predict::predict_batch));
}
