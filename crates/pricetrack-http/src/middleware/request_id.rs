//! Request ID middleware: propagates or generates a unique ID per request.

use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use tracing::Instrument;
use uuid::Uuid;

pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Longest caller-supplied ID that is echoed back; longer ones are replaced.
const MAX_REQUEST_ID_LEN: usize = 128;

fn incoming_id(req: &Request) -> Option<String> {
    req.headers()
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty() && id.len() <= MAX_REQUEST_ID_LEN)
        .map(String::from)
}

/// Ensures every request carries an `X-Request-Id` header.
///
/// A well-formed incoming ID is kept, anything else is replaced with a
/// UUID v4. The ID is written back to the request (for downstream
/// extractors) and to the response, and every log line emitted while
/// handling the request is wrapped in a span carrying it. The span records
/// method and path only; client addresses are never logged.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let request_id = incoming_id(&req).unwrap_or_else(|| Uuid::new_v4().to_string());
    let header = HeaderValue::from_str(&request_id).ok();

    if let Some(val) = &header {
        req.headers_mut().insert(X_REQUEST_ID.clone(), val.clone());
    }

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %req.method(),
        path = %req.uri().path(),
    );
    let mut response = next.run(req).instrument(span).await;

    if let Some(val) = header {
        response.headers_mut().insert(X_REQUEST_ID.clone(), val);
    }

    response
}
