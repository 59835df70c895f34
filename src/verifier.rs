// src/verifier.rs
//! Face verification capability.
//!
//! The model itself lives in a separate face-recognition service (a DeepFace
//! API server); this side only hands it two image paths and reads back a
//! boolean. Both processes must see the same filesystem.

use serde::{Deserialize, Serialize};
use std::{future::Future, path::Path};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceMatch {
    pub matched: bool,
}

#[derive(Error, Debug)]
pub enum VerifierError {
    #[error("face service unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("face service answered {status}: {body}")]
    Rejected { status: u16, body: String },
}

pub trait FaceVerifier: Send + Sync + 'static {
    /// Compare `candidate` against `reference`. May take seconds.
    fn verify(
        &self,
        reference: &Path,
        candidate: &Path,
    ) -> impl Future<Output = Result<FaceMatch, VerifierError>> + Send;

    /// Force the model to load so the first real request doesn't pay for it.
    fn warm_up(&self, reference: &Path) -> impl Future<Output = Result<(), VerifierError>> + Send;
}

#[derive(Serialize)]
struct VerifyBody<'a> {
    img1_path: &'a str,
    img2_path: &'a str,
    model_name: &'a str,
    enforce_detection: bool,
}

#[derive(Serialize)]
struct RepresentBody<'a> {
    img_path: &'a str,
    model_name: &'a str,
    enforce_detection: bool,
}

#[derive(Deserialize)]
struct VerifyRes {
    verified: bool,
}

/// Client for a DeepFace-compatible HTTP API (`POST /verify`, `POST /represent`).
#[derive(Clone)]
pub struct DeepFaceClient {
    client: reqwest::Client,
    base_url: String,
    model_name: String,
}

impl DeepFaceClient {
    pub fn new(base_url: &str, model_name: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model_name: model_name.to_string(),
        }
    }

    async fn post<B: Serialize>(&self, route: &str, body: &B) -> Result<reqwest::Response, VerifierError> {
        let res = self
            .client
            .post(format!("{}/{route}", self.base_url))
            .json(body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(VerifierError::Rejected { status, body });
        }
        Ok(res)
    }
}

impl FaceVerifier for DeepFaceClient {
    async fn verify(&self, reference: &Path, candidate: &Path) -> Result<FaceMatch, VerifierError> {
        let reference = reference.to_string_lossy();
        let candidate = candidate.to_string_lossy();
        let body = VerifyBody {
            img1_path: &reference,
            img2_path: &candidate,
            model_name: &self.model_name,
            // lenient: don't fail when the face isn't perfectly framed
            enforce_detection: false,
        };
        let res: VerifyRes = self.post("verify", &body).await?.json().await?;
        Ok(FaceMatch { matched: res.verified })
    }

    async fn warm_up(&self, reference: &Path) -> Result<(), VerifierError> {
        let reference = reference.to_string_lossy();
        info!("pre-loading {} model", self.model_name);
        let body = RepresentBody {
            img_path: &reference,
            model_name: &self.model_name,
            enforce_detection: false,
        };
        self.post("represent", &body).await?;
        info!("{} model pre-loaded", self.model_name);
        Ok(())
    }
}
