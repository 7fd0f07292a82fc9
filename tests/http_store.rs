//! Tests for the HTTP blob store against an in-process object server.
//!
//! The mock speaks the subset the store relies on: ETag on reads,
//! `If-Match` / `If-None-Match: *` on writes, 404 for absent objects.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use parking_lot::Mutex;
use pricetrack_server::{ServiceConfig, ServiceState};
use pricetrack_service::stats::{EventKind, WriteMode};
use pricetrack_service::store::{BlobStore, HttpStore, PutOutcome, StoreConfig};
use tokio::net::TcpListener;

#[derive(Default)]
struct Objects {
    entries: HashMap<String, (Vec<u8>, u64)>,
    generation: u64,
    seen_tokens: Vec<Option<String>>,
}

type Shared = Arc<Mutex<Objects>>;

fn etag(generation: u64) -> String {
    format!("\"{generation}\"")
}

async fn object(
    State(objects): State<Shared>,
    method: Method,
    Path(key): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut objects = objects.lock();
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    objects.seen_tokens.push(token);

    match method {
        Method::GET | Method::HEAD => match objects.entries.get(&key) {
            Some((bytes, generation)) => {
                ([(header::ETAG, etag(*generation))], bytes.clone()).into_response()
            }
            None => StatusCode::NOT_FOUND.into_response(),
        },
        Method::PUT => {
            let current = objects.entries.get(&key).map(|(_, g)| etag(*g));
            let if_match = headers.get(header::IF_MATCH).and_then(|v| v.to_str().ok());
            let create_only = headers.contains_key(header::IF_NONE_MATCH);

            let precondition_ok = match (if_match, create_only) {
                (Some(expected), _) => current.as_deref() == Some(expected),
                (None, true) => current.is_none(),
                (None, false) => true,
            };
            if !precondition_ok {
                return StatusCode::PRECONDITION_FAILED.into_response();
            }

            objects.generation += 1;
            let generation = objects.generation;
            objects.entries.insert(key, (body.to_vec(), generation));
            (StatusCode::OK, [(header::ETAG, etag(generation))]).into_response()
        }
        Method::DELETE => match objects.entries.remove(&key) {
            Some(_) => StatusCode::NO_CONTENT.into_response(),
            None => StatusCode::NOT_FOUND.into_response(),
        },
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

/// Starts the mock object server. Returns its bucket URL and shared state.
async fn spawn_object_server() -> (String, Shared) {
    let objects = Shared::default();
    let app = Router::new()
        .route("/bucket/{*key}", any(object))
        .with_state(objects.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}/bucket"), objects)
}

const KEY: &str = "price-tracking/stats";

#[tokio::test]
async fn get_put_delete_roundtrip() {
    let (url, objects) = spawn_object_server().await;
    let store = HttpStore::new(&url, Some("t0ken".into())).unwrap();

    assert!(store.get(KEY).await.unwrap().is_none());
    assert!(!store.exists(KEY).await.unwrap());

    store.put(KEY, b"{}".to_vec()).await.unwrap();
    let blob = store.get(KEY).await.unwrap().unwrap();
    assert_eq!(blob.bytes, b"{}");
    assert_eq!(blob.version.as_deref(), Some("\"1\""));
    assert!(store.exists(KEY).await.unwrap());

    store.delete(KEY).await.unwrap();
    assert!(!store.exists(KEY).await.unwrap());
    // Deleting an absent object is not an error.
    store.delete(KEY).await.unwrap();

    let objects = objects.lock();
    assert!(
        objects
            .seen_tokens
            .iter()
            .all(|t| t.as_deref() == Some("Bearer t0ken"))
    );
}

#[tokio::test]
async fn conditional_writes_detect_conflicts() {
    let (url, _objects) = spawn_object_server().await;
    let store = HttpStore::new(&url, None).unwrap();

    assert_eq!(
        store.put_if(KEY, b"a".to_vec(), None).await.unwrap(),
        PutOutcome::Written
    );
    // Create-only write against an existing object.
    assert_eq!(
        store.put_if(KEY, b"b".to_vec(), None).await.unwrap(),
        PutOutcome::Conflict
    );

    let version = store.get(KEY).await.unwrap().unwrap().version.unwrap();
    assert_eq!(
        store
            .put_if(KEY, b"c".to_vec(), Some(&version))
            .await
            .unwrap(),
        PutOutcome::Written
    );
    // The version is now stale.
    assert_eq!(
        store
            .put_if(KEY, b"d".to_vec(), Some(&version))
            .await
            .unwrap(),
        PutOutcome::Conflict
    );
    assert_eq!(store.get(KEY).await.unwrap().unwrap().bytes, b"c");
}

#[tokio::test]
async fn unexpected_status_is_an_error() {
    let (url, _objects) = spawn_object_server().await;
    // Nothing is routed outside /bucket, so the PUT gets a 404.
    let store = HttpStore::new(&url.replace("/bucket", "/other"), None).unwrap();
    assert!(store.put(KEY, b"x".to_vec()).await.is_err());
}

#[tokio::test]
async fn optimistic_service_counts_every_concurrent_event() {
    let (url, _objects) = spawn_object_server().await;
    let config = ServiceConfig {
        store: StoreConfig::Http {
            base_url: url,
            token: None,
        },
        write_mode: WriteMode::Optimistic { max_retries: 50 },
        ..ServiceConfig::default()
    };
    let service = ServiceState::new(&config).unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service
                .stats()
                .record_event(4.99, EventKind::Click)
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let rows = service.stats().formatted_stats().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].clicks, 8);
}
