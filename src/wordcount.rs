use emitter::{EmitFinal, EmitIntermediate};
use errors::*;
use mapper::Map;
use reader::Record;
use reducer::{Reduce, ReduceInputKV};

/// The built-in word-count map function: lowercases each record and emits `(token, 1)`
/// for every maximal alphanumeric token.
pub struct WordCountMap;

impl Map for WordCountMap {
    type Key = String;
    type Value = u64;

    fn map<E>(&self, record: Record, mut emitter: E) -> Result<()>
    where
        E: EmitIntermediate<String, u64>,
    {
        for token in record.value.split(|c: char| !c.is_alphanumeric()) {
            if token.is_empty() {
                continue;
            }
            emitter.emit(token.to_lowercase(), 1).chain_err(
                || "Error emitting map key-value pair.",
            )?;
        }
        Ok(())
    }
}

/// The matching reduce function: sums the counts of one token.
pub struct WordCountReduce;

impl Reduce for WordCountReduce {
    type Key = String;
    type Value = u64;

    fn reduce<E>(&self, input: ReduceInputKV<String, u64>, mut emitter: E) -> Result<()>
    where
        E: EmitFinal<String, u64>,
    {
        let total = input.values.iter().sum();
        emitter.emit(input.key, total).chain_err(
            || "Error emitting reduced value.",
        )?;
        Ok(())
    }
}
