use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

/// Durable per-partition stream offsets.
///
/// The ingest loop commits an offset only after the engine has durably
/// confirmed the corresponding write — an explicit confirm-then-checkpoint
/// handoff, never an implicit side effect of consumption. That ordering is
/// what turns at-least-once delivery into exactly-once-into-the-store.
pub trait CheckpointStore: Send + Sync {
    /// Last committed offset for a partition, if any.
    fn load(&self, partition_id: &str) -> Result<Option<u64>, CheckpointError>;

    /// Durably records `offset` as processed for the partition.
    fn commit(&self, partition_id: &str, offset: u64) -> Result<(), CheckpointError>;
}

/// In-memory checkpoint store used by tests and single-process runs.
pub struct MemoryCheckpointStore {
    offsets: RwLock<HashMap<String, u64>>,
}

impl Default for MemoryCheckpointStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self {
            offsets: RwLock::new(HashMap::new()),
        }
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self, partition_id: &str) -> Result<Option<u64>, CheckpointError> {
        let guard = match self.offsets.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(guard.get(partition_id).copied())
    }

    fn commit(&self, partition_id: &str, offset: u64) -> Result<(), CheckpointError> {
        let mut guard = match self.offsets.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(committed) = guard.get(partition_id) {
            // Offsets only move forward; a regression means two workers
            // believe they own the same partition.
            if offset <= *committed {
                return Err(CheckpointError::Regressed {
                    partition_id: partition_id.to_string(),
                    committed: *committed,
                    attempted: offset,
                });
            }
        }
        guard.insert(partition_id.to_string(), offset);
        Ok(())
    }
}

/// Checkpoint persistence failures. Fatal to the ingest loop: advancing
/// without a durable offset would reprocess silently after restart, and
/// not advancing at all would stall the partition.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CheckpointError {
    #[error("checkpoint persistence failed for partition {partition_id}: {detail}")]
    Persist {
        partition_id: String,
        detail: String,
    },
    #[error(
        "checkpoint regression on partition {partition_id}: committed {committed}, attempted {attempted}"
    )]
    Regressed {
        partition_id: String,
        committed: u64,
        attempted: u64,
    },
}
