use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use errors::*;

/// The `Partition` trait defines a pure function mapping an intermediate key to one of
/// the job's reduce shards.
///
/// Implementations must be deterministic: the same key and the same shard count always
/// give the same shard, across repeated calls and across retried map attempts. Keys
/// that compare equal under the key's `Ord` must partition identically; the shuffle
/// engine and the partitioner share that notion of equality.
pub trait Partition<K> {
    /// The number of reduce shards this partitioner distributes keys over.
    fn partition_count(&self) -> u64;

    /// Returns the shard index for `key`, in `[0, partition_count)`.
    fn partition(&self, key: &K) -> Result<u64>;
}

/// `HashPartitioner` implements `Partition` for any key that can be hashed.
pub struct HashPartitioner {
    partition_count: u64,
}

impl HashPartitioner {
    pub fn new(partition_count: u64) -> Self {
        HashPartitioner { partition_count }
    }

    fn calculate_hash<T: Hash>(&self, t: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        t.hash(&mut hasher);
        hasher.finish()
    }
}

impl<K: Hash> Partition<K> for HashPartitioner {
    fn partition_count(&self) -> u64 {
        self.partition_count
    }

    fn partition(&self, key: &K) -> Result<u64> {
        let hash: u64 = self.calculate_hash(key);
        Ok(hash % self.partition_count)
    }
}
