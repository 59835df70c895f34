// src/routes.rs
use crate::{
    error::{handle_middleware_error, ApiError},
    face::FaceService,
    location,
    registry::LocationRegistry,
    types::{Envelope, VerifyFaceReq, VerifyLocationReq},
    verifier::FaceVerifier,
};
use axum::{
    error_handling::HandleErrorLayer,
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    response::Html,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::{fmt::Write, sync::Arc, time::Duration};
use tower::ServiceBuilder;

const INDEX_TEMPLATE: &str = include_str!("../templates/index.html");

pub struct AppState<V> {
    pub registry: Arc<LocationRegistry>,
    pub radius_meters: f64,
    pub face: Arc<FaceService<V>>,
    index_html: Arc<str>,
}

// manual impl: derive would demand V: Clone
impl<V> Clone for AppState<V> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            radius_meters: self.radius_meters,
            face: self.face.clone(),
            index_html: self.index_html.clone(),
        }
    }
}

impl<V: FaceVerifier> AppState<V> {
    pub fn new(registry: LocationRegistry, radius_meters: f64, face: FaceService<V>) -> Self {
        let index_html = render_index(&registry).into();
        Self {
            registry: Arc::new(registry),
            radius_meters,
            face: Arc::new(face),
            index_html,
        }
    }
}

/// A request still running after `timeout` is dropped (scratch files go with it)
/// and answered with the 504 error envelope.
pub fn router<V: FaceVerifier>(state: AppState<V>, max_body_bytes: usize, timeout: Duration) -> Router {
    Router::new()
        .route("/", get(index::<V>))
        .route("/health", get(health))
        .route("/verify-location", post(verify_location::<V>))
        .route("/verify-face", post(verify_face::<V>))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_middleware_error))
                .timeout(timeout),
        )
        .with_state(state)
}

// ---------- HANDLERS ---------- //

async fn index<V: FaceVerifier>(State(state): State<AppState<V>>) -> Html<String> {
    Html(state.index_html.to_string())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"ok": true}))
}

async fn verify_location<V: FaceVerifier>(
    State(state): State<AppState<V>>,
    body: Result<Json<VerifyLocationReq>, JsonRejection>,
) -> Result<Json<Envelope>, ApiError> {
    let Json(req) = body?;
    let verdict = location::verify_location(&state.registry, state.radius_meters, &req)?;
    Ok(Json(verdict.into_envelope()))
}

async fn verify_face<V: FaceVerifier>(
    State(state): State<AppState<V>>,
    body: Result<Json<VerifyFaceReq>, JsonRejection>,
) -> Result<Json<Envelope>, ApiError> {
    let Json(req) = body?;
    let env = state.face.verify(req.image.as_deref()).await?;
    Ok(Json(env))
}

// ---------- INDEX PAGE ---------- //

fn render_index(registry: &LocationRegistry) -> String {
    let mut options = String::new();
    for class in registry.iter() {
        let _ = writeln!(
            options,
            r#"<option value="{}">{} ({})</option>"#,
            escape_html(&class.id),
            escape_html(&class.name),
            escape_html(&class.id),
        );
    }
    INDEX_TEMPLATE.replace("{{class_options}}", &options)
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
