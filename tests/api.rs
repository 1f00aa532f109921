#![cfg(feature = "api")]

use actix_web::{
    http::{header, Method, StatusCode},
    test, web, App,
};
use f1_predictor::handlers::{self, AppState};
use f1_predictor::models::{ErrorResponse, HealthResponse, PredictResponse, ServiceInfo};
use f1_predictor::pipeline::Pipeline;
use pretty_assertions::assert_eq;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

fn state(loaded: bool, max_batch_size: usize) -> Arc<AppState> {
    let pipeline = loaded.then(|| {
        Pipeline::load(Path::new(env!("CARGO_MANIFEST_DIR")).join("models/sample_pipeline.json"))
            .unwrap()
    });
    Arc::new(AppState {
        pipeline,
        max_batch_size,
    })
}

fn sample_race() -> Value {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("data/sample_race.json");
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state))
                .configure(handlers::configure),
        )
        .await
    };
}

#[actix_web::test]
async fn test_health_reports_loaded_artifact() {
    let app = app!(state(true, 8));

    let req = test::TestRequest::get().uri("/health").to_request();
    let health: HealthResponse = test::call_and_read_body_json(&app, req).await;

    assert_eq!(health.status, "ok");
    assert!(health.model_loaded);
    assert_eq!(health.artifact_version.as_deref(), Some("2024.05"));
    assert_eq!(health.schema_version.as_deref(), Some("1.1"));
    assert!(health.loaded_at.is_some());
}

#[actix_web::test]
async fn test_degraded_mode() {
    let app = app!(state(false, 8));

    let req = test::TestRequest::get().uri("/health").to_request();
    let health: HealthResponse = test::call_and_read_body_json(&app, req).await;
    assert_eq!(health.status, "degraded");
    assert!(!health.model_loaded);
    assert_eq!(health.artifact_version, None);

    let req = test::TestRequest::get().uri("/").to_request();
    let info: ServiceInfo = test::call_and_read_body_json(&app, req).await;
    assert_eq!(info.status, "degraded");

    let req = test::TestRequest::post()
        .uri("/predict")
        .set_json(sample_race())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: ErrorResponse = test::read_body_json(resp).await;
    assert_eq!(body.error, "model_unavailable");
}

#[actix_web::test]
async fn test_predict_race() {
    let app = app!(state(true, 8));

    let req = test::TestRequest::post()
        .uri("/predict")
        .set_json(sample_race())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: PredictResponse = test::read_body_json(resp).await;
    assert_eq!(body.prediction.circuit_id, "miami");
    assert_eq!(body.prediction.entrants.len(), 10);
    assert_eq!(body.prediction.entrants[0].driver_id, "max_verstappen");
    assert_eq!(body.ranking.first().map(String::as_str), Some("max_verstappen"));
    assert_eq!(body.ranking.len(), 10);
}

#[actix_web::test]
async fn test_predict_validation_error_is_400_with_details() {
    let app = app!(state(true, 8));

    let mut race = sample_race();
    race["entrants"][1]["features"]
        .as_object_mut()
        .unwrap()
        .remove("driver_avg_finish_last5");

    let req = test::TestRequest::post()
        .uri("/predict")
        .set_json(race)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: ErrorResponse = test::read_body_json(resp).await;
    assert_eq!(body.error, "validation_error");
    assert_eq!(body.details.len(), 1);
    assert_eq!(body.details[0].field, "driver_avg_finish_last5");
    assert_eq!(body.details[0].entrant, Some(1));
    assert_eq!(body.details[0].driver_id.as_deref(), Some("leclerc"));
}

#[actix_web::test]
async fn test_malformed_body_is_400() {
    let app = app!(state(true, 8));

    let req = test::TestRequest::post()
        .uri("/predict")
        .insert_header(("content-type", "application/json"))
        .set_payload(r#"{"season": 2024, "round": "six"}"#)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: ErrorResponse = test::read_body_json(resp).await;
    assert_eq!(body.error, "bad_request");
}

#[actix_web::test]
async fn test_predict_batch() {
    let app = app!(state(true, 2));

    let req = test::TestRequest::post()
        .uri("/predict/batch")
        .set_json(vec![sample_race(), sample_race()])
        .to_request();
    let body: Vec<PredictResponse> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body.len(), 2);
    assert_eq!(body[0].ranking, body[1].ranking);

    let req = test::TestRequest::post()
        .uri("/predict/batch")
        .set_json(vec![sample_race(), sample_race(), sample_race()])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_predict_batch_reports_race_index() {
    let app = app!(state(true, 4));

    let mut bad = sample_race();
    bad["context"] = serde_json::json!({});

    let req = test::TestRequest::post()
        .uri("/predict/batch")
        .set_json(vec![sample_race(), bad])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: ErrorResponse = test::read_body_json(resp).await;
    assert!(body.message.starts_with("race 1: "));
    assert_eq!(body.details[0].field, "rain_probability");
}

fn preflight(origin: &str) -> test::TestRequest {
    test::TestRequest::default()
        .method(Method::OPTIONS)
        .uri("/predict")
        .insert_header((header::ORIGIN, origin))
        .insert_header((header::ACCESS_CONTROL_REQUEST_METHOD, "POST"))
        .insert_header((header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type"))
}

#[actix_web::test]
async fn test_cors_preflight_for_listed_origin() {
    let origins = vec!["https://dash.example.com".to_string()];
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state(true, 8)))
            .wrap(handlers::cors(&origins))
            .configure(handlers::configure),
    )
    .await;

    let resp = test::call_service(&app, preflight("https://dash.example.com").to_request()).await;
    assert!(resp.status().is_success());
    assert_eq!(
        resp.headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|v| v.to_str().ok()),
        Some("https://dash.example.com")
    );

    let resp = test::call_service(&app, preflight("https://elsewhere.example.org").to_request()).await;
    assert!(resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
}

#[actix_web::test]
async fn test_cors_wildcard_allows_any_origin() {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state(true, 8)))
            .wrap(handlers::cors(&["*".to_string()]))
            .configure(handlers::configure),
    )
    .await;

    let resp = test::call_service(&app, preflight("http://localhost:3000").to_request()).await;
    assert!(resp.status().is_success());
    assert!(resp.headers().contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
}
