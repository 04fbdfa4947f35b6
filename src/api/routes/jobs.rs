//! Job lifecycle routes.
//!
//! A download is a two-step affair: `POST /start-download` registers the job
//! and returns its id without spawning anything, then `GET /stream/{id}`
//! launches the worker. Progress flows over the `GET /events/{id}` SSE
//! channel and the finished artifact is fetched from `GET /file/{id}`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderValue, header},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use futures::{Stream, StreamExt};
use tokio::sync::broadcast;
use tower_http::services::ServeFile;

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{
    ControlRequest, ControlResponse, StartDownloadRequest, StartDownloadResponse,
    StartStreamResponse,
};
use crate::api::server::AppState;
use crate::error::Error;
use crate::jobs::{Job, JobEvent, JobParams};

/// Create the jobs router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/start-download", post(start_download))
        .route("/stream/{id}", get(start_stream))
        .route("/events/{id}", get(job_events))
        .route("/file/{id}", get(serve_artifact))
        .route("/control/{id}", post(control))
}

fn lookup(state: &AppState, id: &str) -> Result<Arc<Job>, ApiError> {
    state
        .registry
        .get(id)
        .ok_or_else(|| Error::not_found("Job", id).into())
}

/// Register a download job. No subprocess is spawned yet; the caller is
/// expected to subscribe to events and then hit the stream endpoint.
async fn start_download(
    State(state): State<AppState>,
    Json(request): Json<StartDownloadRequest>,
) -> ApiResult<Json<StartDownloadResponse>> {
    if request.url.trim().is_empty() {
        return Err(Error::validation("Missing url").into());
    }

    // Metadata supplied from an earlier preview is trusted as-is.
    let info = match request.info {
        Some(info) => info,
        None => state.metadata.fetch(&request.url).await?,
    };
    let title = info.title.clone().unwrap_or_else(|| "video".to_string());

    let job = Arc::new(Job::for_download(
        JobParams {
            url: request.url,
            format: request.format,
            kind: request.kind,
        },
        info,
        &state.config,
    ));
    tracing::info!(job_id = %job.id, filename = %job.final_name, "download job registered");

    let response = StartDownloadResponse {
        id: job.id.clone(),
        filename: job.final_name.clone(),
        title,
    };
    state.registry.insert(job);
    Ok(Json(response))
}

/// Launch the worker for a registered job.
async fn start_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<StartStreamResponse>> {
    let job = lookup(&state, &id)?;
    state.supervisor.start(&job).await?;
    Ok(Json(StartStreamResponse {
        ok: true,
        message: "Download started on server".to_string(),
    }))
}

/// SSE stream of job events.
///
/// The current state is sent immediately so late subscribers are not left
/// waiting, then live events follow. The stream ends after a terminal event.
async fn job_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let job = lookup(&state, &id)?;

    // Subscribe before snapshotting so no event slips between the two.
    let rx = job.subscribe();
    let snapshot = job.snapshot();
    let live = (!snapshot.is_terminal()).then_some(rx);

    let initial = futures::stream::once(async move { Ok(sse_event(&snapshot)) });
    let follow = futures::stream::unfold(live, |rx| async move {
        let mut rx = rx?;
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let next = (!event.is_terminal()).then_some(rx);
                    return Some((Ok(sse_event(&event)), next));
                }
                // Slow consumers skip over missed progress updates.
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });

    Ok(Sse::new(initial.chain(follow)).keep_alive(KeepAlive::default()))
}

fn sse_event(event: &JobEvent) -> Event {
    Event::default().json_data(event).unwrap_or_default()
}

/// Serve a finished artifact as an attachment under its user-facing name.
async fn serve_artifact(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let job = lookup(&state, &id)?;

    if !job.output_path.exists() {
        return Err(ApiError::not_found("File not found or expired"));
    }

    let req = axum::http::Request::builder()
        .body(axum::body::Body::empty())
        .map_err(|e| ApiError::internal(e.to_string()))?;

    let mut response = match ServeFile::new(&job.output_path).try_call(req).await {
        Ok(response) => response.into_response(),
        Err(e) => return Err(ApiError::internal(format!("Failed to serve file: {}", e))),
    };

    if let Ok(value) = HeaderValue::from_str(&content_disposition(&job.final_name)) {
        response
            .headers_mut()
            .insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

/// Attachment header value with an ASCII fallback name and an RFC 5987
/// encoded full name for non-ASCII titles.
pub(super) fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| if c.is_ascii() && c != '"' { c } else { '_' })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(filename)
    )
}

/// Pause, resume or stop a job.
async fn control(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ControlRequest>,
) -> ApiResult<Json<ControlResponse>> {
    let job = lookup(&state, &id)?;

    match request.action.as_str() {
        "pause" => state.supervisor.pause(&job).await?,
        "resume" => state.supervisor.resume(&job).await?,
        "stop" => state.supervisor.stop(&job).await?,
        other => {
            return Err(ApiError::bad_request(format!("Unknown action '{}'", other)));
        }
    }
    Ok(Json(ControlResponse { ok: true }))
}
