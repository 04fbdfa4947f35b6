//! Legacy direct-download route.
//!
//! Pipes yt-dlp's stdout straight into the response body with no job record,
//! no progress events and no pause support. Kept for clients that predate
//! the job lifecycle endpoints.

use std::process::Stdio;

use axum::{
    Router,
    body::Body,
    extract::{Query, State},
    http::{HeaderValue, header},
    response::Response,
    routing::get,
};
use futures::StreamExt;
use tokio_util::io::ReaderStream;

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::LegacyDownloadQuery;
use crate::api::server::AppState;
use crate::error::Error;
use crate::extractor;
use crate::utils::{filename::sanitize_title, process};

/// Create the legacy download router.
pub fn router() -> Router<AppState> {
    Router::new().route("/download", get(direct_download))
}

/// Resolve the format and stream the transfer inline.
async fn direct_download(
    State(state): State<AppState>,
    Query(query): Query<LegacyDownloadQuery>,
) -> ApiResult<Response> {
    if query.url.trim().is_empty() {
        return Err(Error::validation("Missing url").into());
    }

    let info = state.metadata.fetch(&query.url).await?;
    let selector = extractor::select_format(&info, query.kind, query.format.as_deref());
    let title = sanitize_title(info.title.as_deref().unwrap_or("video"));
    let filename = format!("{}.{}", title, query.kind.extension());

    let mut child = process::command(&state.config.ytdlp_path)
        .arg("-f")
        .arg(&selector)
        .arg("-o")
        .arg("-")
        .arg("--no-playlist")
        .arg(&query.url)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        // Dropping the response body must take the worker down with it.
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::Spawn(format!("failed to spawn {}: {e}", state.config.ytdlp_path)))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| ApiError::internal("Worker stdout was not captured"))?;

    tracing::info!(url = %query.url, format = %selector, "direct download started");

    // The child rides along in the stream state so a client disconnect drops
    // and thereby kills it.
    let reader = ReaderStream::new(stdout);
    let body = Body::from_stream(futures::stream::unfold(
        (reader, child),
        |(mut reader, child)| async move {
            reader.next().await.map(|chunk| (chunk, (reader, child)))
        },
    ));

    let mut response = Response::new(body);
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(query.kind.mime_type()),
    );
    if let Ok(value) = HeaderValue::from_str(&super::jobs::content_disposition(&filename)) {
        response
            .headers_mut()
            .insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}
