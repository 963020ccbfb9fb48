//! Coheron: the feature consistency engine of a real-time fraud-scoring
//! pipeline. Stream events update per-entity online feature state through
//! an idempotent CAS write path; reads merge the online store with batch
//! offline aggregates under an explicit freshness/fallback policy.

pub mod app;
pub mod config;
pub mod engine;
pub mod event_model;
pub mod features;
pub mod ingest;
pub mod logging;
pub mod partition;
pub mod scoring;
pub mod store;
pub mod telemetry;

pub use config::{
    config_path_from_env, load_settings, ColdStartPolicy, ConfigError, Settings, CONFIG_PATH_ENV,
    DEFAULT_CONFIG_PATH,
};
pub use engine::{ApplyOutcome, ConsistencyEngine, EngineError, FeatureVector, Freshness};
pub use event_model::{
    Clock, DedupDecision, DedupWindow, ManualClock, SystemClock, TransactionEvent, TransactionType,
    ValidationError, DEFAULT_DEDUP_WINDOW_SIZE,
};
pub use features::{
    compute_delta, FeatureDelta, FeatureFields, FeatureSchema, FeatureState, SchemaError,
    FIELD_AMOUNT_LAST, FIELD_AMOUNT_MEAN, FIELD_AMOUNT_SUM, FIELD_NIGHT_TXN_COUNT, FIELD_RATE_1H,
    FIELD_RATE_24H, FIELD_TXN_COUNT, FIELD_VELOCITY, FIELD_WEEKEND_TXN_COUNT,
};
pub use ingest::{
    Backoff, CheckpointError, CheckpointStore, FatalIngestError, IngestBatchReport, Ingestor,
    MemoryCheckpointStore, StreamRecord, StreamSource, StreamSourceError,
};
pub use logging::{
    JsonLineLogger, LogLevel, LogRotationPolicy, LogSegment, LoggingError, PipelineLogEvent,
};
pub use partition::{hash_partition_key, partition_for, PartitionAssignment, PartitionError};
pub use scoring::{Decision, Scorer, ScoringError, ScoringPolicy, WeightedScorer};
pub use store::{
    load_snapshot_file, CasOutcome, MemoryOnlineStore, OfflineAggregate, OfflineStore, OnlineStore,
    SnapshotError, SnapshotFile, SnapshotOfflineStore, StoreError,
};
pub use telemetry::{MetricSample, MetricsSnapshot, PipelineTelemetry};
