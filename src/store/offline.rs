use crate::features::FeatureFields;
use crate::store::StoreError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::RwLock;
use thiserror::Error;

/// Historical aggregate materialized by the external batch job. The core
/// only consumes these; there is no write contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineAggregate {
    pub entity_id: String,
    pub schema_version: u32,
    pub fields: FeatureFields,
    /// Batch-job watermark; lookups never return aggregates computed after
    /// the requested `as_of_ms`.
    pub computed_as_of_ms: u64,
}

/// Read-only adapter over the offline (batch) store, queried on cold start
/// or online-store miss.
pub trait OfflineStore: Send + Sync {
    /// Returns the newest aggregate with `computed_as_of_ms <= as_of_ms`.
    fn get(&self, entity_id: &str, as_of_ms: u64) -> Result<Option<OfflineAggregate>, StoreError>;
}

/// In-memory snapshot store holding the latest materialization per entity.
pub struct SnapshotOfflineStore {
    aggregates: RwLock<HashMap<String, Vec<OfflineAggregate>>>,
}

impl Default for SnapshotOfflineStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotOfflineStore {
    pub fn new() -> Self {
        Self {
            aggregates: RwLock::new(HashMap::new()),
        }
    }

    /// Ingests a batch snapshot, keeping per-entity aggregates ordered by
    /// watermark so a lookup takes the newest qualifying entry directly.
    pub fn install(&self, snapshot: Vec<OfflineAggregate>) {
        let mut guard = match self.aggregates.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for aggregate in snapshot {
            let entries = guard.entry(aggregate.entity_id.clone()).or_default();
            entries.push(aggregate);
            entries.sort_by_key(|entry| entry.computed_as_of_ms);
        }
    }

    /// Number of entities with at least one materialized aggregate.
    pub fn len(&self) -> usize {
        match self.aggregates.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl OfflineStore for SnapshotOfflineStore {
    fn get(&self, entity_id: &str, as_of_ms: u64) -> Result<Option<OfflineAggregate>, StoreError> {
        let guard = match self.aggregates.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(guard.get(entity_id).and_then(|entries| {
            entries
                .iter()
                .rev()
                .find(|entry| entry.computed_as_of_ms <= as_of_ms)
                .cloned()
        }))
    }
}

/// On-disk snapshot format: aggregates plus an integrity checksum over the
/// serialized aggregate list.
#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotFile {
    pub checksum: String,
    pub aggregates: Vec<OfflineAggregate>,
}

impl SnapshotFile {
    /// Wraps aggregates with their computed checksum for writing.
    pub fn seal(aggregates: Vec<OfflineAggregate>) -> Result<Self, SnapshotError> {
        let checksum = checksum_of(&aggregates)?;
        Ok(Self {
            checksum,
            aggregates,
        })
    }
}

/// Loads and verifies a materialized snapshot file produced by the batch
/// job, surfacing corruption before any aggregate becomes visible.
pub fn load_snapshot_file(path: &Path) -> Result<Vec<OfflineAggregate>, SnapshotError> {
    let raw = fs::read(path).map_err(|source| SnapshotError::Read {
        path: path.display().to_string(),
        detail: source.to_string(),
    })?;
    let file: SnapshotFile = serde_json::from_slice(&raw).map_err(|source| SnapshotError::Decode {
        path: path.display().to_string(),
        detail: source.to_string(),
    })?;
    let expected = checksum_of(&file.aggregates)?;
    if expected != file.checksum {
        return Err(SnapshotError::ChecksumMismatch {
            path: path.display().to_string(),
            expected,
            found: file.checksum,
        });
    }
    Ok(file.aggregates)
}

fn checksum_of(aggregates: &[OfflineAggregate]) -> Result<String, SnapshotError> {
    let payload = serde_json::to_vec(aggregates).map_err(|source| SnapshotError::Encode {
        detail: source.to_string(),
    })?;
    let digest = Sha256::digest(&payload);
    let mut encoded = String::with_capacity(digest.len() * 2);
    for byte in digest {
        encoded.push_str(&format!("{byte:02x}"));
    }
    Ok(encoded)
}

/// Failures while loading a materialized snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to read snapshot {path}: {detail}")]
    Read { path: String, detail: String },
    #[error("failed to decode snapshot {path}: {detail}")]
    Decode { path: String, detail: String },
    #[error("failed to encode snapshot aggregates: {detail}")]
    Encode { detail: String },
    #[error("snapshot {path} checksum mismatch (expected {expected}, found {found})")]
    ChecksumMismatch {
        path: String,
        expected: String,
        found: String,
    },
}
