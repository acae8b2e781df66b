use std::hash::Hash;

use serde::Serialize;
use serde::de::DeserializeOwned;

use emitter::EmitIntermediate;
use errors::*;
use reader::Record;

/// The `Map` trait defines a function for performing a map operation.
///
/// The output types are decided by the implementation of this trait. Keys must carry a
/// total order, which the shuffle engine relies on, and must hash consistently with
/// that order so the partitioner sends equal keys to the same shard.
///
/// # Arguments
///
/// * `record` - One input `Record` from the task's split.
/// * `emitter` - A struct implementing the `EmitIntermediate` trait, provided by the map
///   runtime.
///
/// # Outputs
///
/// An empty result used for returning an error. Outputs of the map operation are sent
/// out through the `emitter`; zero, one or many pairs per record are all valid.
pub trait Map {
    type Key: Serialize + DeserializeOwned + Ord + Hash;
    type Value: Serialize + DeserializeOwned;

    fn map<E>(&self, record: Record, emitter: E) -> Result<()>
    where
        E: EmitIntermediate<Self::Key, Self::Value>;
}
