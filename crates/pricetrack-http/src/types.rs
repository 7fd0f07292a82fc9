//! HTTP request/response types for the tracking API.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Tracking event body.
///
/// Documentation only: the handler validates the raw JSON itself so that a
/// wrong field type yields a specific 400 message.
#[derive(Deserialize, Serialize, ToSchema)]
pub struct TrackRequest {
    /// Price shown to the visitor. Stored under its two-decimal key.
    #[schema(example = 2.99)]
    pub price: f64,
    /// `true` records a conversion, otherwise a click.
    #[serde(rename = "isConversion", default)]
    pub is_conversion: Option<bool>,
}

/// Successful write.
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TrackResponse {
    pub success: bool,
}

/// Server health.
#[derive(Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    /// Blob store backend in use ("memory", "fs", "http").
    pub store: String,
    /// Whether the stats read path has credentials configured.
    pub stats_read_enabled: bool,
}
