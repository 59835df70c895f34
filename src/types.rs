// src/types.rs
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Latitude/longitude arrive as numbers or numeric strings depending on the client.
#[derive(Deserialize, Default)]
pub struct VerifyLocationReq {
    pub class_id: Option<String>,
    pub latitude: Option<Value>,
    pub longitude: Option<Value>,
}

#[derive(Deserialize, Default)]
pub struct VerifyFaceReq {
    pub image: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Failure,
    Error,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Envelope {
    pub status: Status,
    pub message: String,
}

impl Envelope {
    pub fn success(message: impl Into<String>) -> Self {
        Self { status: Status::Success, message: message.into() }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self { status: Status::Failure, message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { status: Status::Error, message: message.into() }
    }
}
