//! Tracking operations: admission, validation, recording and the
//! authenticated stats read.
//!
//! Transport-agnostic. The HTTP routes extract the client key, raw body and
//! credentials and delegate here.

use std::collections::BTreeMap;

use serde_json::value::RawValue;

use crate::ServiceState;
use crate::error::ServiceError;
use crate::rate_limit::RateDecision;
use crate::stats::{EventKind, FormattedStat};

/// A validated tracking event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackEvent {
    pub price: f64,
    pub kind: EventKind,
}

impl TrackEvent {
    /// Parses `{ "price": number, "isConversion"?: boolean }`.
    pub fn from_json(body: &[u8]) -> Result<Self, ServiceError> {
        let bad = |msg: &str| ServiceError::BadRequest(msg.to_string());

        // Fields stay raw so an out-of-range number fails as a bad price,
        // not as a bad body.
        let fields: BTreeMap<String, Box<RawValue>> =
            serde_json::from_slice(body).map_err(|_| bad("Invalid request body"))?;

        let price = fields
            .get("price")
            .and_then(|raw| serde_json::from_str::<f64>(raw.get()).ok())
            .filter(|p| p.is_finite())
            .ok_or_else(|| bad("Invalid price value"))?;

        let is_conversion = match fields.get("isConversion") {
            None => false,
            Some(raw) => serde_json::from_str::<bool>(raw.get())
                .map_err(|_| bad("Invalid conversion flag"))?,
        };

        Ok(Self {
            price,
            kind: EventKind::from_conversion_flag(is_conversion),
        })
    }
}

/// Credentials presented on the read path, as parsed by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// No `Basic` credentials were sent.
    Missing,
    /// Something was sent but could not be decoded.
    Malformed,
    Basic { user: String, password: String },
}

/// Stateless tracking operations.
pub struct TrackingService;

impl TrackingService {
    /// Counts a write attempt against the client's window.
    pub fn admit(state: &ServiceState, client: Option<&str>) -> Result<(), ServiceError> {
        let decision = state.rate_limiter().check(client);
        match decision.retry_after_secs() {
            None => Ok(()),
            Some(retry_after_secs) => {
                state.metrics().record_rate_limited();
                tracing::debug!(retry_after_secs, "write rejected by rate limiter");
                Err(ServiceError::TooManyRequests { retry_after_secs })
            }
        }
    }

    /// Admits, validates and records one event.
    ///
    /// A rate-limited request is rejected before the body is looked at and
    /// never touches the store. Once dispatched, the store write completes
    /// even if the returned future is dropped.
    pub async fn record(
        state: &ServiceState,
        client: Option<&str>,
        body: &[u8],
    ) -> Result<TrackEvent, ServiceError> {
        Self::admit(state, client)?;
        let event = TrackEvent::from_json(body)?;

        // Runs on its own task so a dropped caller cannot cut the
        // read-modify-write short.
        let stats = state.stats().clone();
        let write = tokio::spawn(async move { stats.record_event(event.price, event.kind).await });
        let outcome = match write.await {
            Ok(outcome) => outcome,
            Err(e) => Err(ServiceError::Internal(format!("stats write task failed: {e}"))),
        };

        match outcome {
            Ok(()) => {
                state.metrics().record_event(event.kind);
                tracing::debug!(kind = event.kind.as_str(), "tracking event recorded");
                Ok(event)
            }
            Err(e) => {
                state.metrics().record_event_failure();
                Err(e)
            }
        }
    }

    /// Verifies read-path credentials.
    pub fn authorize(state: &ServiceState, credentials: &Credentials) -> Result<(), ServiceError> {
        let granted = match (credentials, state.auth()) {
            (Credentials::Missing, _) => {
                state.metrics().record_auth_failure();
                return Err(ServiceError::Unauthorized { challenge: true });
            }
            (Credentials::Basic { user, password }, Some(auth)) => auth.check_basic(user, password),
            _ => false,
        };

        if granted {
            Ok(())
        } else {
            state.metrics().record_auth_failure();
            tracing::warn!("stats read rejected: invalid credentials");
            Err(ServiceError::Unauthorized { challenge: false })
        }
    }

    /// Returns the stats report after checking credentials.
    pub async fn stats(
        state: &ServiceState,
        credentials: &Credentials,
    ) -> Result<Vec<FormattedStat>, ServiceError> {
        Self::authorize(state, credentials)?;
        let rows = state.stats().formatted_stats().await?;
        state.metrics().record_stats_read();
        Ok(rows)
    }
}
