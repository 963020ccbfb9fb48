use crate::features::schema::FeatureFields;
use serde::{Deserialize, Serialize};

/// Per-entity aggregate state. Owned by the consistency engine; the online
/// store holds it as a durable cache, never as an independent source of
/// truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureState {
    pub entity_id: String,
    /// Strictly increases on every accepted write; never decreases.
    pub version: u64,
    /// Id of the last event folded into this state; the idempotent-replay
    /// check compares against it before mutating anything.
    pub last_event_id: String,
    pub last_updated_ms: u64,
    /// Event time of the last folded event, used for decay and velocity.
    pub last_event_ts_ms: u64,
    pub schema_version: u32,
    pub fields: FeatureFields,
    /// Always `last_updated_ms + ttl`; past this instant the record is
    /// logically absent even while physically present (lazy expiry).
    pub expires_at_ms: u64,
}

impl FeatureState {
    /// Whether the state is logically expired at `now_ms`. The boundary is
    /// exclusive of LIVE: a state written at T with TTL S is live while
    /// `now < T+S` and expired at `now >= T+S`.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at_ms
    }

    /// Reads a field, defaulting absent entries to zero.
    pub fn field(&self, name: &str) -> f64 {
        self.fields.get(name).copied().unwrap_or(0.0)
    }
}
