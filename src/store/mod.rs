//! Store adapters: the CAS-only online cache of engine state and the
//! read-only offline aggregate store.

pub mod offline;
pub mod online;

use thiserror::Error;

pub use offline::{
    load_snapshot_file, OfflineAggregate, OfflineStore, SnapshotError, SnapshotFile,
    SnapshotOfflineStore,
};
pub use online::{CasOutcome, MemoryOnlineStore, OnlineStore};

/// Transient infrastructure failure raised by a store adapter. Adapters
/// never swallow these; the engine classifies and re-raises them with
/// entity context.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {detail}")]
    Unavailable { detail: String },
}

impl StoreError {
    pub fn unavailable(detail: impl Into<String>) -> Self {
        StoreError::Unavailable {
            detail: detail.into(),
        }
    }
}
