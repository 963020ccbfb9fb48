use crate::features::FeatureState;
use crate::store::StoreError;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::RwLock;

const ONLINE_SHARDS: usize = 64;

/// Outcome of a compare-and-swap write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome {
    /// The stored version matched the expectation and the state was swapped.
    Applied,
    /// Another writer got there first; `actual_version` is what the store
    /// holds now (`None` when the entry is absent).
    Conflict { actual_version: Option<u64> },
}

/// Key-value adapter holding per-entity current feature state.
///
/// All writes go through `compare_and_swap` keyed on `version`; there is no
/// raw put. That is what upholds the monotonic-version and idempotency
/// invariants when two ingest workers collide on the same entity during a
/// rebalance window. Expiry is the engine's read-time concern: the store
/// never interprets `expires_at_ms`.
pub trait OnlineStore: Send + Sync {
    /// Fetches the current state for an entity, expired or not.
    fn get(&self, entity_id: &str) -> Result<Option<FeatureState>, StoreError>;

    /// Swaps in `new_state` iff the stored version equals `expected_version`
    /// (`None` = the entry must be absent, i.e. create).
    fn compare_and_swap(
        &self,
        entity_id: &str,
        expected_version: Option<u64>,
        new_state: FeatureState,
    ) -> Result<CasOutcome, StoreError>;
}

/// Sharded in-memory reference implementation.
pub struct MemoryOnlineStore {
    shards: Vec<RwLock<HashMap<String, FeatureState>>>,
}

impl Default for MemoryOnlineStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryOnlineStore {
    pub fn new() -> Self {
        Self {
            shards: (0..ONLINE_SHARDS)
                .map(|_| RwLock::new(HashMap::new()))
                .collect(),
        }
    }

    /// Physically deletes records whose `expires_at_ms` has passed.
    /// Intended for a background sweep; correctness never depends on it
    /// because the engine re-checks expiry on every read.
    pub fn sweep_expired(&self, now_ms: u64) -> usize {
        let mut removed = 0;
        for shard in &self.shards {
            let mut guard = match shard.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let before = guard.len();
            guard.retain(|_, state| !state.is_expired(now_ms));
            removed += before - guard.len();
        }
        removed
    }

    /// Number of physically stored entities, expired records included.
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| match shard.read() {
                Ok(guard) => guard.len(),
                Err(poisoned) => poisoned.into_inner().len(),
            })
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn shard_for(&self, entity_id: &str) -> &RwLock<HashMap<String, FeatureState>> {
        let mut hasher = DefaultHasher::new();
        entity_id.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) & (ONLINE_SHARDS - 1)]
    }
}

impl OnlineStore for MemoryOnlineStore {
    fn get(&self, entity_id: &str) -> Result<Option<FeatureState>, StoreError> {
        let guard = match self.shard_for(entity_id).read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(guard.get(entity_id).cloned())
    }

    fn compare_and_swap(
        &self,
        entity_id: &str,
        expected_version: Option<u64>,
        new_state: FeatureState,
    ) -> Result<CasOutcome, StoreError> {
        let mut guard = match self.shard_for(entity_id).write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let actual_version = guard.get(entity_id).map(|state| state.version);
        if actual_version != expected_version {
            return Ok(CasOutcome::Conflict { actual_version });
        }
        guard.insert(entity_id.to_string(), new_state);
        Ok(CasOutcome::Applied)
    }
}
