use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json;

use errors::*;

/// `IntermediatePair` is one intermediate key-value pair as emitted from a map
/// operation.
#[derive(Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct IntermediatePair<K, V> {
    pub key: K,
    pub value: V,
}

/// `SpillRun` is one sorted run of intermediate pairs for a single shard, the unit a
/// map task spills to scratch storage and the shuffle engine merges. Pairs are sorted
/// by key (stable, so emission order survives within a key) before the run is encoded.
#[derive(Debug, Serialize, Deserialize)]
pub struct SpillRun<K, V> {
    pub pairs: Vec<IntermediatePair<K, V>>,
}

impl<K: Ord, V> SpillRun<K, V> {
    pub fn from_pairs(mut pairs: Vec<IntermediatePair<K, V>>) -> Self {
        pairs.sort_by(|a, b| a.key.cmp(&b.key));
        SpillRun { pairs }
    }
}

pub fn encode_run<K, V>(run: &SpillRun<K, V>) -> Result<Vec<u8>>
where
    K: Serialize,
    V: Serialize,
{
    serde_json::to_vec(run).chain_err(|| {
        ErrorKind::Serialisation("unable to encode spill run".to_owned())
    })
}

pub fn decode_run<K, V>(data: &[u8]) -> Result<SpillRun<K, V>>
where
    K: DeserializeOwned,
    V: DeserializeOwned,
{
    serde_json::from_slice(data).chain_err(|| {
        ErrorKind::Serialisation("unable to decode spill run".to_owned())
    })
}

/// Formats one final output line as `key<delimiter>value`.
///
/// String keys and values are written bare rather than as JSON strings, so the default
/// word-count output reads `word\t3` and not `"word"\t3`.
pub fn format_output_line<K, V>(key: &K, value: &V, delimiter: char) -> Result<String>
where
    K: Serialize,
    V: Serialize,
{
    let key_json = serde_json::to_value(key).chain_err(|| {
        ErrorKind::Serialisation("unable to encode output key".to_owned())
    })?;
    let value_json = serde_json::to_value(value).chain_err(|| {
        ErrorKind::Serialisation("unable to encode output value".to_owned())
    })?;

    let key_str = match key_json.as_str() {
        Some(s) => s.to_owned(),
        None => key_json.to_string(),
    };
    let value_str = match value_json.as_str() {
        Some(s) => s.to_owned(),
        None => value_json.to_string(),
    };

    Ok(format!("{}{}{}\n", key_str, delimiter, value_str))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spill_run_sorts_stably() {
        let run = SpillRun::from_pairs(vec![
            IntermediatePair { key: "b".to_owned(), value: 1u64 },
            IntermediatePair { key: "a".to_owned(), value: 2 },
            IntermediatePair { key: "b".to_owned(), value: 3 },
        ]);

        assert_eq!(
            vec![("a", 2), ("b", 1), ("b", 3)],
            run.pairs
                .iter()
                .map(|p| (p.key.as_str(), p.value))
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn run_encoding_round_trips() {
        let run: SpillRun<String, u64> = SpillRun::from_pairs(vec![
            IntermediatePair { key: "foo".to_owned(), value: 2 },
            IntermediatePair { key: "bar".to_owned(), value: 7 },
        ]);

        let encoded = encode_run(&run).unwrap();
        let decoded: SpillRun<String, u64> = decode_run(&encoded).unwrap();

        assert_eq!(run.pairs, decoded.pairs);
    }

    #[test]
    fn decode_rejects_garbage() {
        let result: Result<SpillRun<String, u64>> = decode_run(b"not json");
        assert!(result.is_err());
    }

    #[test]
    fn output_line_strips_string_quoting() {
        let line = format_output_line(&"word".to_owned(), &3u64, '\t').unwrap();
        assert_eq!("word\t3\n", line);
    }

    #[test]
    fn output_line_keeps_structured_values_as_json() {
        let line = format_output_line(&42u64, &vec![1, 2], '\t').unwrap();
        assert_eq!("42\t[1,2]\n", line);
    }
}
