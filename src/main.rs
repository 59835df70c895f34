// src/main.rs
mod config;
mod error;
mod face;
mod geo;
mod location;
mod registry;
mod routes;
mod types;
mod verifier;

use config::Config;
use face::FaceService;
use registry::LocationRegistry;
use routes::AppState;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use verifier::{DeepFaceClient, FaceVerifier};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;

    let registry = match &config.class_locations_path {
        Some(path) => LocationRegistry::load(path)?,
        None => LocationRegistry::builtin(),
    };
    if registry.is_empty() {
        warn!("class table is empty; every location check will be rejected");
    }
    info!(
        classes = registry.len(),
        radius_m = config.radius_meters,
        "location registry loaded"
    );

    if !config.reference_image.exists() {
        warn!("reference image not found at '{}'", config.reference_image.display());
    }
    tokio::fs::create_dir_all(&config.scratch_dir).await?;

    let face = FaceService::new(
        DeepFaceClient::new(&config.face_verifier_url, &config.face_model),
        config.reference_image.clone(),
        config.scratch_dir.clone(),
        config.face_concurrency,
    );
    // the server still comes up without it; the first face check is just slow
    if let Err(e) = face.verifier().warm_up(face.reference()).await {
        error!("error pre-loading face model: {e}");
    }

    let state = AppState::new(registry, config.radius_meters, face);
    let app = routes::router(state, config.max_body_bytes, config.request_timeout)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    info!("attendance verifier listening on {}", config.bind_addr);
    let listener = TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
