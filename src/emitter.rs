use errors::*;

/// The `EmitIntermediate` trait specifies structs which can send key-value pairs emitted
/// by a map operation somewhere else, usually an in-memory buffer owned by the map
/// runtime.
pub trait EmitIntermediate<K, V> {
    /// Takes ownership of a key-value pair and moves it somewhere else.
    ///
    /// Returns an empty `Result` used for error handling.
    fn emit(&mut self, key: K, value: V) -> Result<()>;
}

/// The `EmitFinal` trait is the reduce-side equivalent of `EmitIntermediate`: it receives
/// the output pairs of a reduce operation.
pub trait EmitFinal<K, V> {
    fn emit(&mut self, key: K, value: V) -> Result<()>;
}

/// A struct implementing `EmitIntermediate` which emits to a `Vec` of pairs.
pub struct IntermediateVecEmitter<'a, K: 'a, V: 'a> {
    sink: &'a mut Vec<(K, V)>,
}

impl<'a, K, V> IntermediateVecEmitter<'a, K, V> {
    pub fn new(sink: &'a mut Vec<(K, V)>) -> Self {
        IntermediateVecEmitter { sink }
    }
}

impl<'a, K, V> EmitIntermediate<K, V> for IntermediateVecEmitter<'a, K, V> {
    fn emit(&mut self, key: K, value: V) -> Result<()> {
        self.sink.push((key, value));
        Ok(())
    }
}

/// A struct implementing `EmitFinal` which emits to a `Vec` of pairs.
pub struct FinalVecEmitter<'a, K: 'a, V: 'a> {
    sink: &'a mut Vec<(K, V)>,
}

impl<'a, K, V> FinalVecEmitter<'a, K, V> {
    pub fn new(sink: &'a mut Vec<(K, V)>) -> Self {
        FinalVecEmitter { sink }
    }
}

impl<'a, K, V> EmitFinal<K, V> for FinalVecEmitter<'a, K, V> {
    fn emit(&mut self, key: K, value: V) -> Result<()> {
        self.sink.push((key, value));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intermediate_vec_emitter_preserves_emission_order() {
        let mut sink: Vec<(String, u64)> = Vec::new();

        {
            let mut emitter = IntermediateVecEmitter::new(&mut sink);
            emitter.emit("foo".to_owned(), 1).unwrap();
            emitter.emit("bar".to_owned(), 2).unwrap();
            emitter.emit("foo".to_owned(), 3).unwrap();
        }

        assert_eq!(
            vec![
                ("foo".to_owned(), 1),
                ("bar".to_owned(), 2),
                ("foo".to_owned(), 3),
            ],
            sink
        );
    }

    #[test]
    fn final_vec_emitter_with_string_u64() {
        let mut sink: Vec<(String, u64)> = Vec::new();

        {
            let mut emitter = FinalVecEmitter::new(&mut sink);
            emitter.emit("word".to_owned(), 42).unwrap();
        }

        assert_eq!("word", sink[0].0);
        assert_eq!(42, sink[0].1);
    }
}
