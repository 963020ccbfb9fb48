use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Immutable transaction event consumed from the stream.
///
/// `event_id` is globally unique per logical transaction and stable across
/// redelivery; replayed records carry the same id, which is what makes the
/// engine's idempotent write safe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionEvent {
    pub event_id: String,
    pub entity_id: String,
    /// Event time in milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    pub amount: f64,
    #[serde(default)]
    pub merchant_id: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub transaction_type: TransactionType,
    #[serde(default)]
    pub card_present: bool,
    /// Open attributes carried through for downstream enrichment; the
    /// feature computer only reads the typed fields above.
    #[serde(default)]
    pub raw_attributes: Map<String, Value>,
}

impl TransactionEvent {
    /// Builds an event with the identity fields set and the remaining
    /// attributes defaulted.
    pub fn new(
        event_id: impl Into<String>,
        entity_id: impl Into<String>,
        timestamp_ms: u64,
        amount: f64,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            entity_id: entity_id.into(),
            timestamp_ms,
            amount,
            merchant_id: String::new(),
            location: String::new(),
            device_id: String::new(),
            transaction_type: TransactionType::default(),
            card_present: false,
            raw_attributes: Map::new(),
        }
    }

    /// Decodes a serialized stream payload and validates it.
    pub fn decode(payload: &[u8]) -> Result<Self, ValidationError> {
        let event: TransactionEvent =
            serde_json::from_slice(payload).map_err(|source| ValidationError::Malformed {
                detail: source.to_string(),
            })?;
        event.validate()?;
        Ok(event)
    }

    /// Validates the record's identity and amount invariants.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.event_id.trim().is_empty() {
            return Err(ValidationError::missing("event_id"));
        }
        if self.entity_id.trim().is_empty() {
            return Err(ValidationError::missing("entity_id"));
        }
        if self.timestamp_ms == 0 {
            return Err(ValidationError::missing("timestamp_ms"));
        }
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(ValidationError::InvalidField {
                field: "amount",
                detail: format!("amount must be positive, got {}", self.amount),
            });
        }
        Ok(())
    }
}

/// Transaction channel, mirrored from the upstream payment switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    #[default]
    Unknown,
    Online,
    Atm,
    Pos,
    Transfer,
}

impl TransactionType {
    /// Stable numeric encoding consumed by scoring artifacts.
    pub fn encoded(self) -> u8 {
        match self {
            TransactionType::Unknown => 0,
            TransactionType::Online => 1,
            TransactionType::Atm => 2,
            TransactionType::Pos => 3,
            TransactionType::Transfer => 4,
        }
    }
}

/// Recoverable validation failure; the ingestor logs and skips the record
/// without blocking the stream.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("payload is not a valid transaction event: {detail}")]
    Malformed { detail: String },
    #[error("required field '{field}' is missing or empty")]
    MissingField { field: &'static str },
    #[error("field '{field}' is invalid: {detail}")]
    InvalidField { field: &'static str, detail: String },
}

impl ValidationError {
    fn missing(field: &'static str) -> Self {
        ValidationError::MissingField { field }
    }
}
