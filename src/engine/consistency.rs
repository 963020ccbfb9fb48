use crate::config::{ColdStartPolicy, Settings};
use crate::event_model::{Clock, TransactionEvent};
use crate::features::{compute_delta, FeatureFields, FeatureSchema, FeatureState, SchemaError};
use crate::store::{CasOutcome, OfflineStore, OnlineStore, StoreError};
use crate::telemetry::{bump, PipelineTelemetry};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Immediate retries attempted against a store before its unavailability
/// is surfaced to the caller. The engine never sleeps; sustained outages
/// are the ingest loop's backoff problem.
const STORE_RETRY_ATTEMPTS: u32 = 3;

/// How a resolved vector was sourced. Decided per whole vector, never per
/// field, so a read can never mix online and offline values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Freshness {
    Live,
    StaleFallback,
    Cold,
}

/// Read-side result: ephemeral, constructed per call, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureVector {
    pub entity_id: String,
    pub schema_version: u32,
    pub fields: FeatureFields,
    pub freshness: Freshness,
    /// Instant the fields reflect: last online update for LIVE, the batch
    /// watermark for STALE_FALLBACK, the query instant for COLD.
    pub as_of_ms: u64,
}

/// Result of a durably confirmed write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The event was folded into state at this (new) version.
    Applied { version: u64 },
    /// The event id was already reflected in state; nothing was mutated.
    Replayed { version: u64 },
}

impl ApplyOutcome {
    /// Version of the state after the call, applied or not.
    pub fn version(&self) -> u64 {
        match self {
            ApplyOutcome::Applied { version } | ApplyOutcome::Replayed { version } => *version,
        }
    }
}

/// The orchestrator guaranteeing point-in-time-consistent feature reads
/// and exactly-once-into-the-store writes.
///
/// All mutable state is entity-scoped and lives behind the online store's
/// CAS, so the engine itself is freely shareable: `apply` is driven by
/// partition-bound ingest workers and `resolve` by any number of scoring
/// callers concurrently.
pub struct ConsistencyEngine {
    online: Arc<dyn OnlineStore>,
    offline: Arc<dyn OfflineStore>,
    clock: Arc<dyn Clock>,
    schema: FeatureSchema,
    ttl_ms: u64,
    cas_max_retries: u32,
    cold_start_policy: ColdStartPolicy,
    telemetry: Arc<PipelineTelemetry>,
}

impl ConsistencyEngine {
    pub fn new(
        online: Arc<dyn OnlineStore>,
        offline: Arc<dyn OfflineStore>,
        clock: Arc<dyn Clock>,
        settings: &Settings,
        telemetry: Arc<PipelineTelemetry>,
    ) -> Self {
        Self {
            online,
            offline,
            clock,
            schema: FeatureSchema::v1(),
            ttl_ms: settings.ttl_ms(),
            cas_max_retries: settings.cas_max_retries,
            cold_start_policy: settings.cold_start_policy,
            telemetry,
        }
    }

    /// Active feature schema.
    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Telemetry counters shared with the ingest loop.
    pub fn telemetry(&self) -> &PipelineTelemetry {
        &self.telemetry
    }

    /// Write path: folds one event into the entity's online state.
    ///
    /// Replaying an event already reflected in `last_event_id` returns
    /// success without mutation. Conflicting concurrent writers are
    /// resolved by reloading and recomputing the delta on top of the
    /// winner's state, bounded by `cas_max_retries`. The offline store is
    /// never touched.
    pub fn apply(&self, event: &TransactionEvent) -> Result<ApplyOutcome, EngineError> {
        let now_ms = self.clock.now_ms();
        let mut conflicts = 0u32;
        loop {
            let prior = self.read_online(&event.entity_id)?;
            if let Some(state) = &prior {
                if state.last_event_id == event.event_id {
                    bump(&self.telemetry.replays_total);
                    return Ok(ApplyOutcome::Replayed {
                        version: state.version,
                    });
                }
            }

            // Lazy expiry: an expired-but-present record contributes no
            // field values, but its physical version is still CAS'd
            // against so versions stay monotonic without a delete race.
            let expected_version = prior.as_ref().map(|state| state.version);
            let logical_prior = prior.as_ref().filter(|state| !state.is_expired(now_ms));
            let delta = compute_delta(&self.schema, logical_prior, event);
            let next_version = expected_version.map_or(1, |version| version + 1);
            let candidate = delta.into_state(
                event.entity_id.clone(),
                next_version,
                event.event_id.clone(),
                now_ms,
                self.ttl_ms,
            );
            self.schema.check_fields(&candidate.fields)?;

            match self.write_online(&event.entity_id, expected_version, candidate)? {
                CasOutcome::Applied => {
                    bump(&self.telemetry.applies_total);
                    return Ok(ApplyOutcome::Applied {
                        version: next_version,
                    });
                }
                CasOutcome::Conflict { .. } => {
                    bump(&self.telemetry.cas_conflicts_total);
                    conflicts += 1;
                    if conflicts >= self.cas_max_retries {
                        bump(&self.telemetry.cas_exhausted_total);
                        return Err(EngineError::WriteConflictExhausted {
                            entity_id: event.entity_id.clone(),
                            attempted_version: next_version,
                            retries: conflicts,
                        });
                    }
                }
            }
        }
    }

    /// Read path: assembles the entity's feature vector.
    ///
    /// Online-and-unexpired wins outright; otherwise the offline store is
    /// consulted as a whole-vector fallback; otherwise the read is COLD.
    /// Missing data is never an error under the zero-vector policy — only
    /// infrastructure failure is. A pure query: repeated calls with no
    /// intervening writes return identical fields and freshness.
    pub fn resolve(&self, entity_id: &str) -> Result<FeatureVector, EngineError> {
        let now_ms = self.clock.now_ms();
        if let Some(state) = self.read_online(entity_id)? {
            if !state.is_expired(now_ms) {
                bump(&self.telemetry.resolve_live_total);
                return Ok(FeatureVector {
                    entity_id: entity_id.to_string(),
                    schema_version: state.schema_version,
                    fields: state.fields,
                    freshness: Freshness::Live,
                    as_of_ms: state.last_updated_ms,
                });
            }
        }

        if let Some(aggregate) = self.read_offline(entity_id, now_ms)? {
            bump(&self.telemetry.resolve_fallback_total);
            return Ok(FeatureVector {
                entity_id: entity_id.to_string(),
                schema_version: aggregate.schema_version,
                fields: aggregate.fields,
                freshness: Freshness::StaleFallback,
                as_of_ms: aggregate.computed_as_of_ms,
            });
        }

        match self.cold_start_policy {
            ColdStartPolicy::ZeroVector => {
                bump(&self.telemetry.resolve_cold_total);
                Ok(FeatureVector {
                    entity_id: entity_id.to_string(),
                    schema_version: self.schema.version(),
                    fields: self.schema.zero_fields(),
                    freshness: Freshness::Cold,
                    as_of_ms: now_ms,
                })
            }
            ColdStartPolicy::Reject => {
                bump(&self.telemetry.resolve_cold_total);
                Err(EngineError::ColdStartRejected {
                    entity_id: entity_id.to_string(),
                })
            }
        }
    }

    fn read_online(&self, entity_id: &str) -> Result<Option<FeatureState>, EngineError> {
        self.with_store_retry(entity_id, || self.online.get(entity_id))
    }

    fn read_offline(
        &self,
        entity_id: &str,
        as_of_ms: u64,
    ) -> Result<Option<crate::store::OfflineAggregate>, EngineError> {
        self.with_store_retry(entity_id, || self.offline.get(entity_id, as_of_ms))
    }

    fn write_online(
        &self,
        entity_id: &str,
        expected_version: Option<u64>,
        candidate: FeatureState,
    ) -> Result<CasOutcome, EngineError> {
        // CAS is not idempotent across repeats, so unavailability here is
        // retried with a fresh candidate each loop iteration rather than
        // inside the retry helper.
        self.online
            .compare_and_swap(entity_id, expected_version, candidate)
            .map_err(|source| self.classify(entity_id, source))
    }

    fn with_store_retry<T>(
        &self,
        entity_id: &str,
        mut call: impl FnMut() -> Result<T, StoreError>,
    ) -> Result<T, EngineError> {
        let mut last = None;
        for _ in 0..STORE_RETRY_ATTEMPTS {
            match call() {
                Ok(value) => return Ok(value),
                Err(source) => last = Some(source),
            }
        }
        let source = last.unwrap_or_else(|| StoreError::unavailable("store call never ran"));
        Err(self.classify(entity_id, source))
    }

    fn classify(&self, entity_id: &str, source: StoreError) -> EngineError {
        bump(&self.telemetry.store_unavailable_total);
        let StoreError::Unavailable { detail } = source;
        EngineError::StoreUnavailable {
            entity_id: entity_id.to_string(),
            detail,
        }
    }
}

/// Failures surfaced by the consistency engine, always carrying entity
/// context so the orchestration layer can decide retry versus halt.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("CAS retries exhausted for entity {entity_id} at version {attempted_version} after {retries} attempts")]
    WriteConflictExhausted {
        entity_id: String,
        attempted_version: u64,
        retries: u32,
    },
    #[error("store unavailable for entity {entity_id}: {detail}")]
    StoreUnavailable { entity_id: String, detail: String },
    #[error("cold start rejected for entity {entity_id} by policy")]
    ColdStartRejected { entity_id: String },
    #[error(transparent)]
    Schema(#[from] SchemaError),
}
