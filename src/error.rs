// src/error.rs
use crate::types::Envelope;
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    BoxError, Json,
};
use thiserror::Error;
use tracing::{error, warn};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("Class ID '{0}' not found.")]
    NotFound(String),
    #[error("Server error: Reference image is missing.")]
    Configuration,
    #[error("Could not process the image.")]
    Processing(#[source] anyhow::Error),
    #[error("The request timed out. Please try again.")]
    Timeout,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Configuration | ApiError::Processing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        warn!("rejected request body: {e}");
        ApiError::Validation("Malformed request body.".into())
    }
}

/// Error handler for the middleware stack; anything but a timeout is an internal fault.
pub async fn handle_middleware_error(err: BoxError) -> ApiError {
    if err.is::<tower::timeout::error::Elapsed>() {
        ApiError::Timeout
    } else {
        ApiError::Processing(anyhow::anyhow!(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::Processing(cause) => error!("processing failed: {cause:#}"),
            ApiError::Configuration => error!("reference image missing on server"),
            ApiError::Timeout => warn!("request timed out"),
            _ => {}
        }
        (self.status_code(), Json(Envelope::error(self.to_string()))).into_response()
    }
}

pub fn processing<E>(e: E) -> ApiError
where
    E: Into<anyhow::Error>,
{
    ApiError::Processing(e.into())
}
