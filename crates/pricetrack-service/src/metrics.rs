//! Lightweight Prometheus-compatible metrics using atomic counters.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::stats::EventKind;

/// Application-wide metrics collected via atomic counters.
pub struct Metrics {
    clicks_total: AtomicU64,
    conversions_total: AtomicU64,
    event_failures_total: AtomicU64,
    rate_limited_total: AtomicU64,
    auth_failures_total: AtomicU64,
    stats_reads_total: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            clicks_total: AtomicU64::new(0),
            conversions_total: AtomicU64::new(0),
            event_failures_total: AtomicU64::new(0),
            rate_limited_total: AtomicU64::new(0),
            auth_failures_total: AtomicU64::new(0),
            stats_reads_total: AtomicU64::new(0),
        }
    }

    /// Record an event that was written to the store.
    pub fn record_event(&self, kind: EventKind) {
        let counter = match kind {
            EventKind::Click => &self.clicks_total,
            EventKind::Conversion => &self.conversions_total,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an event that could not be written.
    pub fn record_event_failure(&self) {
        self.event_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_auth_failure(&self) {
        self.auth_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stats_read(&self) {
        self.stats_reads_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn render(&self, rate_limit_clients: usize, uptime_seconds: u64) -> String {
        let mut out = String::with_capacity(1024);

        gauge(
            &mut out,
            "pricetrack_rate_limit_clients",
            "Clients currently tracked by the rate limiter",
            rate_limit_clients,
        );
        gauge(
            &mut out,
            "pricetrack_uptime_seconds",
            "Server uptime in seconds",
            uptime_seconds,
        );

        writeln!(out, "# HELP pricetrack_events_total Tracking events recorded.").unwrap();
        writeln!(out, "# TYPE pricetrack_events_total counter").unwrap();
        for (label, counter) in [
            ("click", &self.clicks_total),
            ("conversion", &self.conversions_total),
        ] {
            let total = counter.load(Ordering::Relaxed);
            writeln!(out, "pricetrack_events_total{{kind=\"{label}\"}} {total}").unwrap();
        }

        counter(
            &mut out,
            "pricetrack_event_failures_total",
            "Tracking events that failed to persist",
            &self.event_failures_total,
        );
        counter(
            &mut out,
            "pricetrack_rate_limited_total",
            "Write requests rejected by the rate limiter",
            &self.rate_limited_total,
        );
        counter(
            &mut out,
            "pricetrack_auth_failures_total",
            "Stats reads rejected for missing or invalid credentials",
            &self.auth_failures_total,
        );
        counter(
            &mut out,
            "pricetrack_stats_reads_total",
            "Successful stats reads",
            &self.stats_reads_total,
        );

        out
    }
}

fn gauge(out: &mut String, name: &str, help: &str, value: impl std::fmt::Display) {
    writeln!(out, "# HELP {name} {help}").unwrap();
    writeln!(out, "# TYPE {name} gauge").unwrap();
    writeln!(out, "{name} {value}").unwrap();
}

fn counter(out: &mut String, name: &str, help: &str, value: &AtomicU64) {
    writeln!(out, "# HELP {name} {help}").unwrap();
    writeln!(out, "# TYPE {name} counter").unwrap();
    writeln!(out, "{name} {}", value.load(Ordering::Relaxed)).unwrap();
}
