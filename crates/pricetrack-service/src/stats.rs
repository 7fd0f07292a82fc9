//! Price experiment counters persisted as one JSON document.
//!
//! Every write re-reads the whole document, mutates it and writes it back.
//! Nothing is cached between calls. In the default `LastWriterWins` mode
//! two interleaved writers can lose an increment; `Optimistic` mode uses
//! versioned conditional writes and retries instead.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::store::{BlobStore, PutOutcome, StoreError};

/// Default object key of the stats document.
pub const DEFAULT_STATS_KEY: &str = "price-tracking/stats";

/// Envelope version written by this crate.
const DOCUMENT_VERSION: u32 = 1;

/// Which counter an event increments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Click,
    Conversion,
}

impl EventKind {
    pub fn from_conversion_flag(is_conversion: bool) -> Self {
        if is_conversion {
            Self::Conversion
        } else {
            Self::Click
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::Conversion => "conversion",
        }
    }
}

/// Counters for one price variant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Counter {
    pub clicks: u64,
    pub conversions: u64,
    pub last_updated: DateTime<Utc>,
}

/// Formats a price as its two-decimal document key.
///
/// Prices that round to the same key share one counter (`1.994` and
/// `1.991` both map to `"1.99"`). Rounding works on the exact binary value
/// and breaks exact ties to even: `1.125` maps to `"1.12"`. Negative
/// prices that round to zero share the `"0.00"` key with zero.
pub fn price_key(price: f64) -> String {
    let key = format!("{price:.2}");
    if key == "-0.00" {
        "0.00".to_string()
    } else {
        key
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// The persisted document: price key to counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceStats {
    prices: BTreeMap<String, Counter>,
}

#[derive(Serialize)]
struct StoredDocumentRef<'a> {
    version: u32,
    prices: &'a BTreeMap<String, Counter>,
}

/// Accepts the versioned envelope and the legacy bare mapping.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredDocument {
    Versioned {
        version: u32,
        prices: BTreeMap<String, Counter>,
    },
    Legacy(BTreeMap<String, Counter>),
}

impl PriceStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let prices = match serde_json::from_slice::<StoredDocument>(bytes)? {
            StoredDocument::Versioned { version, prices } => {
                if version > DOCUMENT_VERSION {
                    return Err(serde::de::Error::custom(format!(
                        "unsupported stats document version {version}"
                    )));
                }
                prices
            }
            StoredDocument::Legacy(prices) => prices,
        };
        Ok(Self { prices })
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&StoredDocumentRef {
            version: DOCUMENT_VERSION,
            prices: &self.prices,
        })
    }

    pub fn get(&self, key: &str) -> Option<&Counter> {
        self.prices.get(key)
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Counter)> {
        self.prices.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Applies one event, creating a zeroed counter for a new price.
    pub fn record(&mut self, key: &str, kind: EventKind, now: DateTime<Utc>) {
        let counter = self.prices.entry(key.to_string()).or_default();
        match kind {
            EventKind::Click => counter.clicks = counter.clicks.saturating_add(1),
            EventKind::Conversion => {
                counter.conversions = counter.conversions.saturating_add(1);
            }
        }
        counter.last_updated = now;
    }

    /// Report rows sorted ascending by numeric price.
    pub fn formatted(&self) -> Vec<FormattedStat> {
        let mut rows: Vec<FormattedStat> = self
            .prices
            .iter()
            .filter_map(|(key, counter)| match key.parse::<f64>() {
                Ok(price) if price.is_finite() => Some(FormattedStat::new(price, counter)),
                _ => {
                    tracing::warn!(key = %key, "skipping stats entry with non-numeric price key");
                    None
                }
            })
            .collect();
        rows.sort_by(|a, b| a.price.total_cmp(&b.price));
        rows
    }
}

/// One row of the stats report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct FormattedStat {
    pub price: f64,
    pub clicks: u64,
    pub conversions: u64,
    /// Conversions per click in percent, two decimals. `0` without clicks.
    pub conversion_rate: f64,
    pub last_updated: DateTime<Utc>,
}

impl FormattedStat {
    fn new(price: f64, counter: &Counter) -> Self {
        let conversion_rate = if counter.clicks == 0 {
            0.0
        } else {
            round2(counter.conversions as f64 / counter.clicks as f64 * 100.0)
        };
        Self {
            price,
            clicks: counter.clicks,
            conversions: counter.conversions,
            conversion_rate,
            last_updated: counter.last_updated,
        }
    }
}

/// A document as read from the store.
struct Snapshot {
    stats: PriceStats,
    /// Whether the object exists, even if it holds no prices.
    present: bool,
    version: Option<String>,
}

/// How `record_event` writes the document back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Plain read-modify-write. Interleaved writers can lose increments.
    LastWriterWins,
    /// Conditional write against the version that was read; on conflict the
    /// whole read-modify-write is retried up to `max_retries` more times.
    Optimistic { max_retries: u32 },
}

/// Read-modify-write access to the stats document.
#[derive(Debug, Clone)]
pub struct StatsRepository {
    store: Arc<dyn BlobStore>,
    key: String,
    timeout: Duration,
    mode: WriteMode,
}

impl StatsRepository {
    pub fn new(
        store: Arc<dyn BlobStore>,
        key: impl Into<String>,
        timeout: Duration,
        mode: WriteMode,
    ) -> Self {
        Self {
            store,
            key: key.into(),
            timeout,
            mode,
        }
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    /// Bounds a store call by the configured timeout.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))?
    }

    async fn load(&self) -> Result<Snapshot, ServiceError> {
        match self.bounded(self.store.get(&self.key)).await? {
            None => Ok(Snapshot {
                stats: PriceStats::new(),
                present: false,
                version: None,
            }),
            Some(blob) => {
                let stats = PriceStats::from_json(&blob.bytes).map_err(|e| {
                    ServiceError::StoreUnavailable(format!("corrupt stats document: {e}"))
                })?;
                Ok(Snapshot {
                    stats,
                    present: true,
                    version: blob.version,
                })
            }
        }
    }

    fn encode(stats: &PriceStats) -> Result<Vec<u8>, ServiceError> {
        stats
            .to_json()
            .map_err(|e| ServiceError::Internal(format!("failed to encode stats: {e}")))
    }

    /// Reads the document, treating a missing object as empty.
    pub async fn get_or_init(&self) -> Result<PriceStats, ServiceError> {
        Ok(self.load().await?.stats)
    }

    /// Records one click or conversion for `price`.
    ///
    /// `Ok` means the updated document was written. On error nothing can be
    /// assumed about the event.
    pub async fn record_event(&self, price: f64, kind: EventKind) -> Result<(), ServiceError> {
        if !price.is_finite() {
            return Err(ServiceError::BadRequest("Invalid price value".to_string()));
        }
        let key = price_key(price);

        match self.mode {
            WriteMode::LastWriterWins => {
                let mut stats = self.load().await?.stats;
                stats.record(&key, kind, Utc::now());
                let bytes = Self::encode(&stats)?;
                self.bounded(self.store.put(&self.key, bytes)).await?;
                Ok(())
            }
            WriteMode::Optimistic { max_retries } => {
                for attempt in 0..=max_retries {
                    let Snapshot {
                        mut stats,
                        present,
                        version,
                    } = self.load().await?;
                    // Without a version the write would be create-only and
                    // conflict with the existing object forever.
                    if present && version.is_none() {
                        return Err(ServiceError::StoreUnavailable(format!(
                            "{} store did not report an object version",
                            self.store.kind()
                        )));
                    }
                    stats.record(&key, kind, Utc::now());
                    let bytes = Self::encode(&stats)?;

                    let outcome = self
                        .bounded(self.store.put_if(&self.key, bytes, version.as_deref()))
                        .await?;
                    match outcome {
                        PutOutcome::Written => return Ok(()),
                        PutOutcome::Conflict => {
                            tracing::debug!(attempt, "stats document changed concurrently, retrying");
                        }
                    }
                }
                Err(ServiceError::StoreUnavailable(format!(
                    "write conflict persisted after {} attempts",
                    max_retries + 1
                )))
            }
        }
    }

    /// Report rows sorted ascending by price.
    pub async fn formatted_stats(&self) -> Result<Vec<FormattedStat>, ServiceError> {
        Ok(self.get_or_init().await?.formatted())
    }

    /// Whether the document currently exists.
    pub async fn exists(&self) -> Result<bool, ServiceError> {
        Ok(self.bounded(self.store.exists(&self.key)).await?)
    }

    /// Deletes the whole document.
    pub async fn reset(&self) -> Result<(), ServiceError> {
        self.bounded(self.store.delete(&self.key)).await?;
        Ok(())
    }
}
