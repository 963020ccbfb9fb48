use thiserror::Error;

/// Deterministic hash used to route an entity key to a partition.
pub fn hash_partition_key(key: impl AsRef<[u8]>) -> u64 {
    // 64-bit FNV-1a keeps the hash stable across toolchains without extra
    // dependencies.
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    key.as_ref().iter().fold(OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(PRIME)
    })
}

/// Partition an entity's events must land on. Consistent co-partitioning
/// of entity keys is the operational precondition that keeps each entity
/// single-writer; the engine's CAS covers violations.
pub fn partition_for(entity_id: &str, partition_count: u32) -> u32 {
    (hash_partition_key(entity_id) % u64::from(partition_count.max(1))) as u32
}

/// Static assignment of partitions to ingest workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionAssignment {
    partition_count: u32,
    workers: Vec<Vec<u32>>,
}

impl PartitionAssignment {
    /// Validates that `workers` covers every partition exactly once, so no
    /// two ingest loops can legitimately own the same entity key space.
    pub fn new(partition_count: u32, workers: Vec<Vec<u32>>) -> Result<Self, PartitionError> {
        let mut owners = vec![None::<usize>; partition_count as usize];
        for (worker, partitions) in workers.iter().enumerate() {
            for partition in partitions {
                let slot = owners
                    .get_mut(*partition as usize)
                    .ok_or(PartitionError::UnknownPartition {
                        partition: *partition,
                        partition_count,
                    })?;
                if let Some(existing) = slot {
                    return Err(PartitionError::OverlappingAssignment {
                        partition: *partition,
                        first_worker: *existing,
                        second_worker: worker,
                    });
                }
                *slot = Some(worker);
            }
        }
        if let Some(partition) = owners.iter().position(Option::is_none) {
            return Err(PartitionError::UnassignedPartition {
                partition: partition as u32,
            });
        }
        Ok(Self {
            partition_count,
            workers,
        })
    }

    pub fn partition_count(&self) -> u32 {
        self.partition_count
    }

    /// Worker index that owns the given entity's partition.
    pub fn worker_for(&self, entity_id: &str) -> usize {
        let partition = partition_for(entity_id, self.partition_count);
        self.workers
            .iter()
            .position(|partitions| partitions.contains(&partition))
            .unwrap_or(0)
    }
}

/// Errors raised while validating a partition assignment.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PartitionError {
    #[error("partition {partition} is out of range for a {partition_count}-partition topology")]
    UnknownPartition {
        partition: u32,
        partition_count: u32,
    },
    #[error("partition {partition} assigned to both worker {first_worker} and worker {second_worker}")]
    OverlappingAssignment {
        partition: u32,
        first_worker: usize,
        second_worker: usize,
    },
    #[error("partition {partition} is not assigned to any worker")]
    UnassignedPartition { partition: u32 },
}
