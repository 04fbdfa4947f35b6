//! Request and response bodies for the API.

use serde::{Deserialize, Serialize};

use crate::extractor::{MediaInfo, OutputKind, PreviewFormat};

/// Body of `POST /api/preview`.
#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    pub url: String,
}

/// Response of `POST /api/preview`.
#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    pub duration: Option<f64>,
    pub views: u64,
    pub formats: Vec<PreviewFormat>,
    /// Direct playback URL for an inline preview player, when one exists.
    pub preview_url: Option<String>,
}

/// Body of `POST /api/start-download`.
#[derive(Debug, Deserialize)]
pub struct StartDownloadRequest {
    pub url: String,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: OutputKind,
    /// Metadata from an earlier preview; saves a second extractor call.
    #[serde(default)]
    pub info: Option<MediaInfo>,
}

/// Response of `POST /api/start-download`.
#[derive(Debug, Serialize)]
pub struct StartDownloadResponse {
    pub id: String,
    pub filename: String,
    pub title: String,
}

/// Response of `GET /api/stream/{id}`.
#[derive(Debug, Serialize)]
pub struct StartStreamResponse {
    pub ok: bool,
    pub message: String,
}

/// Body of `POST /api/control/{id}`.
///
/// The action is kept as a plain string so an unknown verb maps to a 400
/// instead of a deserialization failure.
#[derive(Debug, Deserialize)]
pub struct ControlRequest {
    pub action: String,
}

/// Response of `POST /api/control/{id}`.
#[derive(Debug, Serialize)]
pub struct ControlResponse {
    pub ok: bool,
}

/// Query of the legacy `GET /api/download` passthrough.
#[derive(Debug, Deserialize)]
pub struct LegacyDownloadQuery {
    pub url: String,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: OutputKind,
}

/// Response of `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub active_jobs: usize,
}
