use actix_web::{middleware, web, App, HttpServer};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use f1_predictor::config::{LogFormat, ServerConfig};
use f1_predictor::handlers::{self, AppState};
use f1_predictor::pipeline::Pipeline;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();

    let config = ServerConfig::load()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    // Initialize logging
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    info!("Loading pipeline artifact from {:?}", config.model_path);

    let loaded = match &config.model_version {
        Some(version) => Pipeline::load_version(&config.model_path, version),
        None => Pipeline::load(&config.model_path),
    };
    let pipeline = match loaded {
        Ok(p) => Some(p),
        Err(e) => {
            error!("Failed to load pipeline artifact: {}", e);
            warn!("Starting in degraded mode; prediction endpoints will return 503");
            None
        }
    };

    let app_state = Arc::new(AppState {
        pipeline,
        max_batch_size: config.max_batch_size,
    });

    let origins = config.allowed_origins();
    info!("CORS allowed origins: {}", origins.join(", "));

    let addr = config.bind_address();
    info!("Starting F1 Predictor API server at http://{}", addr);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(handlers::cors(&origins))
            .wrap(middleware::Logger::default())
            .configure(handlers::configure)
    })
    .bind(&addr)?
    .run()
    .await
}
