use std::collections::BTreeMap;
use thiserror::Error;

/// Feature values keyed by registered field name.
pub type FeatureFields = BTreeMap<String, f64>;

/// Running transaction count for the entity.
pub const FIELD_TXN_COUNT: &str = "txn_count";
/// Running amount sum for the entity.
pub const FIELD_AMOUNT_SUM: &str = "amount_sum";
/// Amount of the most recent transaction.
pub const FIELD_AMOUNT_LAST: &str = "amount_last";
/// Running mean transaction amount.
pub const FIELD_AMOUNT_MEAN: &str = "amount_mean";
/// Exponentially decayed transactions-per-hour counter (1h half-window).
pub const FIELD_RATE_1H: &str = "rate_1h";
/// Exponentially decayed transactions-per-day counter (24h half-window).
pub const FIELD_RATE_24H: &str = "rate_24h";
/// Amount divided by seconds since the entity's previous transaction.
pub const FIELD_VELOCITY: &str = "velocity";
/// Count of transactions landing in the 22:00-05:59 UTC window.
pub const FIELD_NIGHT_TXN_COUNT: &str = "night_txn_count";
/// Count of transactions landing on Saturday/Sunday (UTC).
pub const FIELD_WEEKEND_TXN_COUNT: &str = "weekend_txn_count";

const SCHEMA_V1_FIELDS: &[&str] = &[
    FIELD_TXN_COUNT,
    FIELD_AMOUNT_SUM,
    FIELD_AMOUNT_LAST,
    FIELD_AMOUNT_MEAN,
    FIELD_RATE_1H,
    FIELD_RATE_24H,
    FIELD_VELOCITY,
    FIELD_NIGHT_TXN_COUNT,
    FIELD_WEEKEND_TXN_COUNT,
];

/// Registered feature schema: a fixed field list stamped with a version
/// tag. Feature maps are always checked against a schema rather than
/// treated as free-form attributes, which keeps the computation and the
/// scoring boundary statically checkable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureSchema {
    version: u32,
    fields: &'static [&'static str],
}

impl FeatureSchema {
    /// Current production schema.
    pub const fn v1() -> Self {
        Self {
            version: 1,
            fields: SCHEMA_V1_FIELDS,
        }
    }

    /// Schema version tag stamped onto states and vectors.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Registered field names in canonical order.
    pub fn field_names(&self) -> &'static [&'static str] {
        self.fields
    }

    /// Whether `name` is registered in this schema.
    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|field| *field == name)
    }

    /// The documented zero-vector handed out for COLD reads.
    pub fn zero_fields(&self) -> FeatureFields {
        self.fields
            .iter()
            .map(|field| (field.to_string(), 0.0))
            .collect()
    }

    /// Rejects feature maps carrying unregistered or missing fields.
    pub fn check_fields(&self, fields: &FeatureFields) -> Result<(), SchemaError> {
        for name in fields.keys() {
            if !self.contains(name) {
                return Err(SchemaError::UnregisteredField {
                    field: name.clone(),
                    schema_version: self.version,
                });
            }
        }
        for field in self.fields {
            if !fields.contains_key(*field) {
                return Err(SchemaError::MissingField {
                    field,
                    schema_version: self.version,
                });
            }
        }
        Ok(())
    }
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self::v1()
    }
}

/// Raised when a feature map does not line up with its declared schema.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("field '{field}' is not registered in schema v{schema_version}")]
    UnregisteredField { field: String, schema_version: u32 },
    #[error("schema v{schema_version} field '{field}' is absent from the feature map")]
    MissingField {
        field: &'static str,
        schema_version: u32,
    },
}
