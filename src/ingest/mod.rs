//! Stream ingestion: the per-partition consumption loop, durable offset
//! checkpointing ordered after engine confirmation, and fetch backoff.

pub mod backoff;
pub mod checkpoint;
pub mod consumer;

pub use backoff::Backoff;
pub use checkpoint::{CheckpointError, CheckpointStore, MemoryCheckpointStore};
pub use consumer::{
    FatalIngestError, IngestBatchReport, Ingestor, StreamRecord, StreamSource, StreamSourceError,
};
