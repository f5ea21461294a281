use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::TimeDelta;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, warn};

use super::AppState;
use crate::engine::{parse_target_time, HarvestRequest};
use crate::error::HarvestError;
use crate::listing::parse_list_page;

/// Create the router with all routes.
///
/// `upload_limit` caps the body of `/api/posts`, which carries whole saved listing pages.
pub fn router(upload_limit: usize) -> Router<AppState> {
    Router::new()
        .route("/api/scrape", get(scrape))
        .route(
            "/api/posts",
            post(parse_posts).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/healthz", get(health))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeParams {
    url: Option<String>,
    target_time: Option<String>,
    target_end: Option<String>,
    /// Minutes.
    duration: Option<i64>,
    target_post_id: Option<String>,
    start_page: Option<u64>,
}

async fn scrape(State(state): State<AppState>, Query(params): Query<ScrapeParams>) -> Response {
    let request = match build_request(&state, params) {
        Ok(request) => request,
        Err(e) => return error_response(&e),
    };

    let outcome = tokio::time::timeout(
        state.config.scrape_timeout,
        state.engine.locate_and_harvest(&request),
    )
    .await;

    match outcome {
        Ok(Ok(response)) => Json(response).into_response(),
        Ok(Err(e)) => error_response(&e),
        Err(_) => {
            error!(url = %request.listing_url, "Scrape timed out");
            (
                StatusCode::GATEWAY_TIMEOUT,
                Json(json!({ "error": "Timed out while scraping the gallery." })),
            )
                .into_response()
        }
    }
}

fn build_request(state: &AppState, params: ScrapeParams) -> Result<HarvestRequest, HarvestError> {
    let offset = state.engine.source_offset();

    let listing_url = params
        .url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| HarvestError::InvalidUrl("missing url parameter".to_string()))?;

    let target_start = params
        .target_time
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .map(|t| parse_target_time(t, offset))
        .transpose()?;
    let target_end = params
        .target_end
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .map(|t| parse_target_time(t, offset))
        .transpose()?;

    let target_post_id = params
        .target_post_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| {
            id.parse::<u64>()
                .map_err(|_| HarvestError::InvalidParameter(format!("invalid targetPostId: {id}")))
        })
        .transpose()?;

    let duration = params
        .duration
        .map(|minutes| {
            TimeDelta::try_minutes(minutes)
                .ok_or_else(|| HarvestError::InvalidTime(format!("duration out of range: {minutes}")))
        })
        .transpose()?;

    Ok(HarvestRequest {
        listing_url,
        target_start,
        target_end,
        duration,
        target_post_id,
        start_page: params.start_page,
    })
}

fn error_response(err: &HarvestError) -> Response {
    let status = if err.is_validation() {
        warn!("Rejected scrape request: {err}");
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::NOT_FOUND
    };
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

#[derive(Debug, Deserialize)]
pub struct ParseBody {
    html: Option<String>,
}

/// Parse an uploaded listing page without touching the network.
async fn parse_posts(Json(body): Json<ParseBody>) -> Response {
    let Some(html) = body.html.filter(|h| !h.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "No HTML content provided" })),
        )
            .into_response();
    };

    let posts = parse_list_page(&html);
    Json(json!({ "posts": posts })).into_response()
}

async fn health() -> &'static str {
    "OK"
}
