//! Pricetrack HTTP: REST transport adapter for the price tracking service.
//!
//! Provides:
//! - `POST /api/track-price`: rate-limited click/conversion recording
//! - `GET /api/track-price`: Basic-Auth stats report
//! - `/health`, `/metrics`, `/api/openapi.json`
//! - Request-ID, tracing and CORS layers

pub mod error;
pub mod extract;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod types;

use axum::Router;
use axum::http::{HeaderValue, Method};
use axum::response::IntoResponse;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

use error::ErrorBody;

pub use state::AppState;

/// Path the tracking endpoint is mounted at.
pub const TRACK_PATH: &str = "/api/track-price";

// ---------------------------------------------------------------------------
// OpenAPI
// ---------------------------------------------------------------------------

struct BasicAuthScheme;

impl Modify for BasicAuthScheme {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "basic_auth",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Basic)),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Price Tracking API",
        description = "Click and conversion counters per price variant.\n\nWrites are rate limited per client address. Reads require HTTP Basic credentials.",
        license(name = "Apache-2.0"),
    ),
    paths(
        routes::track::track_event,
        routes::track::read_stats,
        routes::system::health,
    ),
    components(
        schemas(
            types::TrackRequest, types::TrackResponse, types::HealthResponse, ErrorBody,
            pricetrack_service::stats::FormattedStat,
        )
    ),
    modifiers(&BasicAuthScheme),
    tags(
        (name = "Tracking", description = "Price experiment tracking"),
        (name = "System", description = "System and health endpoints"),
    )
)]
struct ApiDoc;

async fn openapi_json() -> impl IntoResponse {
    axum::Json(ApiDoc::openapi())
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Builds the HTTP API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            TRACK_PATH,
            get(routes::track::read_stats)
                .post(routes::track::track_event)
                // `get` would otherwise answer HEAD too
                .head(routes::track::method_not_allowed)
                .fallback(routes::track::method_not_allowed),
        )
        .route("/health", get(routes::system::health))
        .route("/metrics", get(routes::system::metrics_endpoint))
        .route("/api/openapi.json", get(openapi_json))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(
            middleware::request_id::request_id_middleware,
        ))
        .layer(cors_layer(&state))
        .with_state(state)
}

/// Serve the HTTP router on the given listener with graceful shutdown.
///
/// Wraps `axum::serve` with `ConnectInfo<SocketAddr>` so the rate limiter
/// can fall back to the socket address of the client.
pub async fn serve(
    listener: tokio::net::TcpListener,
    app: Router,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}

fn cors_layer(state: &AppState) -> CorsLayer {
    let origins = state.cors_origins();

    // No origins configured → no CORS headers (deny cross-origin by default).
    if origins.is_empty() {
        return CorsLayer::new();
    }

    let x_request_id = middleware::request_id::X_REQUEST_ID.clone();
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
            x_request_id.clone(),
        ])
        .expose_headers([x_request_id, axum::http::header::RETRY_AFTER]);

    if origins.len() == 1 && origins[0] == "*" {
        tracing::warn!("CORS configured with wildcard origin; all cross-origin requests allowed");
        return base.allow_origin(tower_http::cors::Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    base.allow_origin(parsed)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;

    const ADMIN_BASIC: &str = "Basic YWRtaW46czNjcmV0"; // admin:s3cret

    fn app() -> Router {
        router(AppState::new_in_memory_with_basic_auth(
            "admin".into(),
            "s3cret".into(),
        ))
    }

    fn post(body: &str, ip: Option<&str>) -> Request<Body> {
        let mut builder = Request::post(TRACK_PATH).header(header::CONTENT_TYPE, "application/json");
        if let Some(ip) = ip {
            builder = builder.header("x-forwarded-for", ip);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn post_records_event() {
        let resp = app()
            .oneshot(post(r#"{"price": 2.99}"#, Some("203.0.113.9")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json(resp).await, serde_json::json!({"success": true}));
    }

    #[tokio::test]
    async fn post_without_client_address_is_limited() {
        // oneshot carries no ConnectInfo, so only headers could identify the client
        let resp = app().oneshot(post(r#"{"price": 1}"#, None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers()[header::RETRY_AFTER], "60");
    }

    #[tokio::test]
    async fn invalid_price_message() {
        let resp = app()
            .oneshot(post(r#"{"price": "abc"}"#, Some("203.0.113.9")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = json(resp).await;
        assert_eq!(body["error"], "bad_request");
        assert_eq!(body["detail"], "Invalid price value");
    }

    #[tokio::test]
    async fn get_sets_cache_headers() {
        let req = Request::get(TRACK_PATH)
            .header(header::AUTHORIZATION, ADMIN_BASIC)
            .body(Body::empty())
            .unwrap();
        let resp = app().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[header::CACHE_CONTROL],
            routes::track::STATS_CACHE_CONTROL
        );
        assert_eq!(json(resp).await, serde_json::json!([]));
    }

    #[tokio::test]
    async fn other_methods_are_rejected() {
        for method in [Method::PUT, Method::DELETE, Method::PATCH] {
            let req = Request::builder()
                .method(method.clone())
                .uri(TRACK_PATH)
                .body(Body::empty())
                .unwrap();
            let resp = app().oneshot(req).await.unwrap();
            assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED, "{method}");
            assert_eq!(json(resp).await["detail"], "Method not allowed");
        }
    }

    #[tokio::test]
    async fn head_is_rejected_even_with_credentials() {
        let req = Request::head(TRACK_PATH)
            .header(header::AUTHORIZATION, ADMIN_BASIC)
            .body(Body::empty())
            .unwrap();
        let resp = app().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert!(resp.headers().get(header::CACHE_CONTROL).is_none());
    }

    #[tokio::test]
    async fn request_id_is_echoed() {
        let req = Request::get("/health")
            .header("x-request-id", "abc-123")
            .body(Body::empty())
            .unwrap();
        let resp = app().oneshot(req).await.unwrap();
        assert_eq!(resp.headers()["x-request-id"], "abc-123");
    }

    #[tokio::test]
    async fn openapi_documents_tracking_path() {
        let req = Request::get("/api/openapi.json").body(Body::empty()).unwrap();
        let resp = app().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let doc = json(resp).await;
        assert!(doc["paths"][TRACK_PATH]["post"].is_object());
        assert!(doc["paths"][TRACK_PATH]["get"].is_object());
        assert!(doc["components"]["securitySchemes"]["basic_auth"].is_object());
    }
}
