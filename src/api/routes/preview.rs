//! Media preview route.

use axum::{Json, Router, extract::State, routing::post};

use crate::api::error::ApiResult;
use crate::api::models::{PreviewRequest, PreviewResponse};
use crate::api::server::AppState;
use crate::error::Error;
use crate::extractor;

/// Create the preview router.
pub fn router() -> Router<AppState> {
    Router::new().route("/preview", post(preview))
}

/// Fetch metadata for a URL and return the deduplicated encoding list.
async fn preview(
    State(state): State<AppState>,
    Json(request): Json<PreviewRequest>,
) -> ApiResult<Json<PreviewResponse>> {
    if request.url.trim().is_empty() {
        return Err(Error::validation("Missing url").into());
    }

    let info = state.metadata.fetch(&request.url).await?;
    let formats = extractor::build_preview_formats(&info);
    let preview_url = extractor::pick_preview_url(&formats);

    Ok(Json(PreviewResponse {
        title: info.title,
        thumbnail: info.thumbnail,
        duration: info.duration,
        views: info.view_count.unwrap_or(0),
        formats,
        preview_url,
    }))
}
