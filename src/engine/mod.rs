//! The consistency engine: merge-and-fallback reads and idempotent
//! CAS-backed writes over the online/offline store pair.

pub mod consistency;

pub use consistency::{ApplyOutcome, ConsistencyEngine, EngineError, FeatureVector, Freshness};
