//! Pure feature computation over per-entity aggregate state, plus the
//! registered schema that keeps feature maps statically checkable.

pub mod compute;
pub mod schema;
pub mod state;

pub use compute::{compute_delta, FeatureDelta};
pub use schema::{
    FeatureFields, FeatureSchema, SchemaError, FIELD_AMOUNT_LAST, FIELD_AMOUNT_MEAN,
    FIELD_AMOUNT_SUM, FIELD_NIGHT_TXN_COUNT, FIELD_RATE_1H, FIELD_RATE_24H, FIELD_TXN_COUNT,
    FIELD_VELOCITY, FIELD_WEEKEND_TXN_COUNT,
};
pub use state::FeatureState;
