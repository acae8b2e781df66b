use std::hash::Hash;

use serde::Serialize;
use serde::de::DeserializeOwned;

use emitter::EmitFinal;
use errors::*;

/// The `ReduceInputKV` is a struct for passing one grouped key to a `Reduce` operation.
///
/// `ReduceInputKV` is a thin wrapper around a `(Key, Vec<Value>)`, used for creating a
/// clearer API. The values are every value emitted for the key by the valid map
/// attempts, in the order the shuffle engine merged them.
#[derive(Debug, Eq, PartialEq)]
pub struct ReduceInputKV<K, V> {
    pub key: K,
    pub values: Vec<V>,
}

impl<K, V> ReduceInputKV<K, V> {
    pub fn new(key: K, values: Vec<V>) -> Self {
        ReduceInputKV { key, values }
    }
}

/// The `Reduce` trait defines a function for performing a reduce operation.
///
/// # Arguments
///
/// * `input` - A `ReduceInputKV` containing the input data for the reduce operation.
/// * `emitter` - A struct implementing the `EmitFinal` trait, provided by the reduce
///   runner.
///
/// # Outputs
///
/// An empty result used for returning an error. Outputs of the reduce operation are
/// sent out through the `emitter`.
pub trait Reduce {
    type Key: Serialize + DeserializeOwned + Ord + Hash;
    type Value: Serialize + DeserializeOwned;

    fn reduce<E>(&self, input: ReduceInputKV<Self::Key, Self::Value>, emitter: E) -> Result<()>
    where
        E: EmitFinal<Self::Key, Self::Value>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use emitter::FinalVecEmitter;

    struct ConcatReducer;
    impl Reduce for ConcatReducer {
        type Key = String;
        type Value = String;
        fn reduce<E>(
            &self,
            input: ReduceInputKV<Self::Key, Self::Value>,
            mut emitter: E,
        ) -> Result<()>
        where
            E: EmitFinal<Self::Key, Self::Value>,
        {
            let concatenated = input.values.iter().fold(String::new(), |acc, x| acc + x);
            emitter.emit(input.key, concatenated)?;
            Ok(())
        }
    }

    #[test]
    fn test_reducer_concatenates_strings() {
        let input = ReduceInputKV::new(
            "test_key".to_owned(),
            vec!["foo".to_owned(), "bar".to_owned()],
        );
        let mut sink: Vec<(String, String)> = Vec::new();

        ConcatReducer.reduce(input, FinalVecEmitter::new(&mut sink)).unwrap();

        assert_eq!(("test_key".to_owned(), "foobar".to_owned()), sink[0]);
    }

    #[test]
    fn reduce_input_kv_construction() {
        let input = ReduceInputKV::new("k".to_owned(), vec![1, 2, 3]);

        assert_eq!("k", input.key);
        assert_eq!(vec![1, 2, 3], input.values);
    }
}
