use actix_web::{web, HttpResponse, Responder};
use std::sync::Arc;

use super::AppState;
use crate::models::{HealthResponse, ServiceInfo};

/// Health check endpoint
pub async fn health_check(state: web::Data<Arc<AppState>>) -> impl Responder {
    let metadata = state.pipeline.as_ref().map(|p| p.metadata());

    let response = HealthResponse {
        status: if metadata.is_some() { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model_loaded: metadata.is_some(),
        artifact_version: metadata.map(|m| m.version.clone()),
        schema_version: metadata.map(|m| m.schema_version.clone()),
        loaded_at: metadata.map(|m| m.loaded_at),
    };

    HttpResponse::Ok().json(response)
}

/// Service banner
pub async fn service_info(state: web::Data<Arc<AppState>>) -> impl Responder {
    HttpResponse::Ok().json(ServiceInfo {
        message: "F1 Race Predictor API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: if state.pipeline.is_some() { "ok" } else { "degraded" }.to_string(),
        health: "/health".to_string(),
        predict: "/predict".to_string(),
    })
}
