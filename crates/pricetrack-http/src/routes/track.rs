//! Price tracking endpoint: rate-limited writes, Basic-Auth reads.
//!
//! Admission, validation and persistence are delegated to
//! `pricetrack_service::track::TrackingService`.

use axum::body::Bytes;
use axum::extract::{Json, State};
use axum::http::header::CACHE_CONTROL;
use axum::response::{IntoResponse, Response};

use pricetrack_service::stats::FormattedStat;
use pricetrack_service::track::TrackingService;

use crate::error::{ApiError, ErrorBody};
use crate::extract::{BasicAuth, ClientKey};
use crate::state::AppState;
use crate::types::{TrackRequest, TrackResponse};

/// Stats tolerate slight staleness; let shared caches serve them briefly.
pub const STATS_CACHE_CONTROL: &str = "public, s-maxage=60, stale-while-revalidate=30";

/// Record a click or conversion for a price variant.
///
/// Rate limited per client address (fixed window). A limited request is
/// rejected before the body is validated and does not modify any counter.
#[utoipa::path(
    post,
    path = "/api/track-price",
    request_body = TrackRequest,
    responses(
        (status = 200, description = "Event recorded", body = TrackResponse),
        (status = 400, description = "Invalid price value or conversion flag", body = ErrorBody),
        (status = 429, description = "Rate limited; see Retry-After", body = ErrorBody),
        (status = 500, description = "Event could not be stored", body = ErrorBody),
    ),
    tag = "Tracking"
)]
pub async fn track_event(
    State(state): State<AppState>,
    client: ClientKey,
    body: Bytes,
) -> Result<Json<TrackResponse>, ApiError> {
    TrackingService::record(state.service(), client.as_deref(), &body).await?;
    Ok(Json(TrackResponse { success: true }))
}

/// Get aggregated stats per price, ascending by price.
#[utoipa::path(
    get,
    path = "/api/track-price",
    responses(
        (status = 200, description = "Stats per price variant", body = [FormattedStat]),
        (status = 401, description = "Missing or invalid Basic credentials", body = ErrorBody),
        (status = 500, description = "Stats could not be read", body = ErrorBody),
    ),
    security(("basic_auth" = [])),
    tag = "Tracking"
)]
pub async fn read_stats(
    State(state): State<AppState>,
    BasicAuth(credentials): BasicAuth,
) -> Result<Response, ApiError> {
    let rows = TrackingService::stats(state.service(), &credentials).await?;
    Ok(([(CACHE_CONTROL, STATS_CACHE_CONTROL)], Json(rows)).into_response())
}

/// Any other method on the tracking resource.
pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}
