use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::path::Path;
use std::sync::Arc;
use std::vec;

use data_layer::DataLayer;
use errors::*;
use reducer::ReduceInputKV;
use serialise::{decode_run, IntermediatePair, SpillRun};

use serde::de::DeserializeOwned;

// One heap entry per run. Reversed ordering turns std's max-heap into a min-heap;
// ties on the key break on run index, which keeps the merge deterministic for a
// fixed set of runs.
struct HeapEntry<K, V> {
    key: K,
    value: V,
    run_index: usize,
}

impl<K: Ord, V> PartialEq for HeapEntry<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.run_index == other.run_index
    }
}

impl<K: Ord, V> Eq for HeapEntry<K, V> {}

impl<K: Ord, V> PartialOrd for HeapEntry<K, V> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: Ord, V> Ord for HeapEntry<K, V> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then(self.run_index.cmp(&other.run_index))
            .reverse()
    }
}

/// `ShuffleStream` merges the sorted spill runs of one shard into a lazy sequence of
/// `ReduceInputKV` groups, all values for a key contiguous, keys ascending.
///
/// Only the runs of currently valid map attempts may be fed in; the coordinator
/// enforces that by handing the reduce task the output locations of each map task's
/// succeeding attempt and nothing else. The stream is consumed once, by exactly one
/// reduce task.
pub struct ShuffleStream<K, V> {
    heap: BinaryHeap<HeapEntry<K, V>>,
    runs: Vec<vec::IntoIter<IntermediatePair<K, V>>>,
}

impl<K, V> ShuffleStream<K, V>
where
    K: Ord,
{
    pub fn from_runs(runs: Vec<SpillRun<K, V>>) -> Self {
        let mut iterators: Vec<vec::IntoIter<IntermediatePair<K, V>>> = runs.into_iter()
            .map(|run| run.pairs.into_iter())
            .collect();

        let mut heap = BinaryHeap::new();
        for (run_index, run) in iterators.iter_mut().enumerate() {
            if let Some(pair) = run.next() {
                heap.push(HeapEntry {
                    key: pair.key,
                    value: pair.value,
                    run_index,
                });
            }
        }

        ShuffleStream { heap, runs: iterators }
    }

    fn refill_from_run(&mut self, run_index: usize) {
        if let Some(pair) = self.runs[run_index].next() {
            self.heap.push(HeapEntry {
                key: pair.key,
                value: pair.value,
                run_index,
            });
        }
    }
}

impl<K, V> Iterator for ShuffleStream<K, V>
where
    K: Ord,
{
    type Item = ReduceInputKV<K, V>;

    fn next(&mut self) -> Option<ReduceInputKV<K, V>> {
        let first = self.heap.pop()?;
        let run_index = first.run_index;
        let mut group = ReduceInputKV::new(first.key, vec![first.value]);
        self.refill_from_run(run_index);

        loop {
            let key_matches = match self.heap.peek() {
                Some(top) => top.key == group.key,
                None => false,
            };
            if !key_matches {
                break;
            }
            if let Some(entry) = self.heap.pop() {
                group.values.push(entry.value);
                self.refill_from_run(entry.run_index);
            }
        }

        Some(group)
    }
}

/// Reads and decodes every spill run of a shard through the data layer.
pub fn read_shard_runs<K, V>(
    data_layer: &Arc<DataLayer + Send + Sync>,
    run_paths: &[String],
) -> Result<Vec<SpillRun<K, V>>>
where
    K: DeserializeOwned,
    V: DeserializeOwned,
{
    let mut runs = Vec::with_capacity(run_paths.len());
    for run_path in run_paths {
        let data = data_layer.read_file(Path::new(run_path)).chain_err(|| {
            format!("Unable to read spill run {}", run_path)
        })?;
        let run = decode_run(&data).chain_err(|| {
            format!("Unable to decode spill run {}", run_path)
        })?;
        runs.push(run);
    }
    Ok(runs)
}
