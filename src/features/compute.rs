use crate::event_model::TransactionEvent;
use crate::features::schema::{
    FeatureFields, FeatureSchema, FIELD_AMOUNT_LAST, FIELD_AMOUNT_MEAN, FIELD_AMOUNT_SUM,
    FIELD_NIGHT_TXN_COUNT, FIELD_RATE_1H, FIELD_RATE_24H, FIELD_TXN_COUNT, FIELD_VELOCITY,
    FIELD_WEEKEND_TXN_COUNT,
};
use crate::features::state::FeatureState;

const HOUR_MS: f64 = 3_600_000.0;
const DAY_MS: f64 = 86_400_000.0;

/// Candidate feature values produced by folding one event into a prior
/// state. Pure data; the engine turns it into a `FeatureState` once the
/// target version is known.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureDelta {
    pub schema_version: u32,
    pub fields: FeatureFields,
    pub event_ts_ms: u64,
}

impl FeatureDelta {
    /// Materializes the delta into a full state at the given version.
    pub fn into_state(
        self,
        entity_id: impl Into<String>,
        version: u64,
        event_id: impl Into<String>,
        now_ms: u64,
        ttl_ms: u64,
    ) -> FeatureState {
        FeatureState {
            entity_id: entity_id.into(),
            version,
            last_event_id: event_id.into(),
            last_updated_ms: now_ms,
            last_event_ts_ms: self.event_ts_ms,
            schema_version: self.schema_version,
            fields: self.fields,
            expires_at_ms: now_ms.saturating_add(ttl_ms),
        }
    }
}

/// Pure mapping from (prior state, event) to incremental feature values.
///
/// No I/O and no shared mutable state: given the same inputs the output is
/// identical, which is what lets the engine recompute the delta freely
/// inside its CAS retry loop and what lets tests run without stores.
pub fn compute_delta(
    schema: &FeatureSchema,
    prior: Option<&FeatureState>,
    event: &TransactionEvent,
) -> FeatureDelta {
    match prior {
        // First-ever event for the entity: delta from an implicit zero
        // state. Kept as its own path so cold start is never conflated
        // with "existing but stale" state.
        None => initial_delta(schema, event),
        Some(prior) => incremental_delta(schema, prior, event),
    }
}

fn initial_delta(schema: &FeatureSchema, event: &TransactionEvent) -> FeatureDelta {
    let mut fields = schema.zero_fields();
    set(&mut fields, FIELD_TXN_COUNT, 1.0);
    set(&mut fields, FIELD_AMOUNT_SUM, event.amount);
    set(&mut fields, FIELD_AMOUNT_LAST, event.amount);
    set(&mut fields, FIELD_AMOUNT_MEAN, event.amount);
    set(&mut fields, FIELD_RATE_1H, 1.0);
    set(&mut fields, FIELD_RATE_24H, 1.0);
    // No prior event to measure against, so velocity starts at zero.
    set(&mut fields, FIELD_VELOCITY, 0.0);
    set(&mut fields, FIELD_NIGHT_TXN_COUNT, night_flag(event.timestamp_ms));
    set(
        &mut fields,
        FIELD_WEEKEND_TXN_COUNT,
        weekend_flag(event.timestamp_ms),
    );
    FeatureDelta {
        schema_version: schema.version(),
        fields,
        event_ts_ms: event.timestamp_ms,
    }
}

fn incremental_delta(
    schema: &FeatureSchema,
    prior: &FeatureState,
    event: &TransactionEvent,
) -> FeatureDelta {
    // A replayed or cross-partition-late event may carry a timestamp at or
    // before the prior one; elapsed time clamps to zero so decay never
    // inflates the counters.
    let elapsed_ms = event.timestamp_ms.saturating_sub(prior.last_event_ts_ms);

    let count = prior.field(FIELD_TXN_COUNT) + 1.0;
    let sum = prior.field(FIELD_AMOUNT_SUM) + event.amount;
    let rate_1h = decay(prior.field(FIELD_RATE_1H), elapsed_ms as f64, HOUR_MS) + 1.0;
    let rate_24h = decay(prior.field(FIELD_RATE_24H), elapsed_ms as f64, DAY_MS) + 1.0;
    let velocity = if elapsed_ms == 0 {
        event.amount
    } else {
        event.amount / (elapsed_ms as f64 / 1_000.0)
    };

    let mut fields = prior.fields.clone();
    set(&mut fields, FIELD_TXN_COUNT, count);
    set(&mut fields, FIELD_AMOUNT_SUM, sum);
    set(&mut fields, FIELD_AMOUNT_LAST, event.amount);
    set(&mut fields, FIELD_AMOUNT_MEAN, sum / count);
    set(&mut fields, FIELD_RATE_1H, rate_1h);
    set(&mut fields, FIELD_RATE_24H, rate_24h);
    set(&mut fields, FIELD_VELOCITY, velocity);
    set(
        &mut fields,
        FIELD_NIGHT_TXN_COUNT,
        prior.field(FIELD_NIGHT_TXN_COUNT) + night_flag(event.timestamp_ms),
    );
    set(
        &mut fields,
        FIELD_WEEKEND_TXN_COUNT,
        prior.field(FIELD_WEEKEND_TXN_COUNT) + weekend_flag(event.timestamp_ms),
    );
    FeatureDelta {
        schema_version: schema.version(),
        fields,
        event_ts_ms: event.timestamp_ms.max(prior.last_event_ts_ms),
    }
}

/// Exponential decay approximating a sliding window: a counter with
/// half-window `window_ms` retains `1/e` of its mass after one window.
fn decay(value: f64, elapsed_ms: f64, window_ms: f64) -> f64 {
    value * (-elapsed_ms / window_ms).exp()
}

fn night_flag(timestamp_ms: u64) -> f64 {
    let hour = (timestamp_ms / 3_600_000) % 24;
    if hour >= 22 || hour <= 5 {
        1.0
    } else {
        0.0
    }
}

fn weekend_flag(timestamp_ms: u64) -> f64 {
    // Epoch day zero (1970-01-01) was a Thursday; 0 = Sunday here.
    let day_of_week = ((timestamp_ms / 86_400_000) + 4) % 7;
    if day_of_week == 0 || day_of_week == 6 {
        1.0
    } else {
        0.0
    }
}

fn set(fields: &mut FeatureFields, name: &str, value: f64) {
    fields.insert(name.to_string(), value);
}
