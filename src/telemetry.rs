use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Pipeline-wide counters. Atomics throughout: `resolve` is called
/// concurrently by scoring workers while the ingest loop counts on the
/// write side, so nothing here takes `&mut`.
#[derive(Debug, Default)]
pub struct PipelineTelemetry {
    pub events_total: AtomicU64,
    pub validation_failures_total: AtomicU64,
    pub dedup_skipped_total: AtomicU64,
    pub applies_total: AtomicU64,
    pub replays_total: AtomicU64,
    pub cas_conflicts_total: AtomicU64,
    pub cas_exhausted_total: AtomicU64,
    pub resolve_live_total: AtomicU64,
    pub resolve_fallback_total: AtomicU64,
    pub resolve_cold_total: AtomicU64,
    pub store_unavailable_total: AtomicU64,
    pub checkpoints_committed_total: AtomicU64,
}

impl PipelineTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exports a point-in-time snapshot suitable for a metrics endpoint.
    pub fn snapshot(&self, timestamp_ms: u64) -> MetricsSnapshot {
        let mut snapshot = MetricsSnapshot::new(timestamp_ms);
        snapshot.record("coheron_events_total", load(&self.events_total));
        snapshot.record(
            "coheron_validation_failures_total",
            load(&self.validation_failures_total),
        );
        snapshot.record(
            "coheron_dedup_skipped_total",
            load(&self.dedup_skipped_total),
        );
        snapshot.record("coheron_applies_total", load(&self.applies_total));
        snapshot.record("coheron_replays_total", load(&self.replays_total));
        snapshot.record(
            "coheron_cas_conflicts_total",
            load(&self.cas_conflicts_total),
        );
        snapshot.record(
            "coheron_cas_exhausted_total",
            load(&self.cas_exhausted_total),
        );
        snapshot.record("coheron_resolve_live_total", load(&self.resolve_live_total));
        snapshot.record(
            "coheron_resolve_fallback_total",
            load(&self.resolve_fallback_total),
        );
        snapshot.record("coheron_resolve_cold_total", load(&self.resolve_cold_total));
        snapshot.record(
            "coheron_store_unavailable_total",
            load(&self.store_unavailable_total),
        );
        snapshot.record(
            "coheron_checkpoints_committed_total",
            load(&self.checkpoints_committed_total),
        );
        snapshot
    }
}

/// Increment helper shared by the engine and ingestor.
pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

fn load(counter: &AtomicU64) -> u64 {
    counter.load(Ordering::Relaxed)
}

/// Serializable snapshot of all counters at one instant.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub timestamp_ms: u64,
    pub metrics: Vec<MetricSample>,
}

impl MetricsSnapshot {
    pub fn new(timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms,
            metrics: Vec::new(),
        }
    }

    pub fn record(&mut self, name: impl Into<String>, value: u64) {
        self.metrics.push(MetricSample {
            name: name.into(),
            value,
        });
    }

    /// Looks up a sample by name; test convenience.
    pub fn value(&self, name: &str) -> Option<u64> {
        self.metrics
            .iter()
            .find(|sample| sample.name == name)
            .map(|sample| sample.value)
    }
}

/// Single metric entry within a snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct MetricSample {
    pub name: String,
    pub value: u64,
}
