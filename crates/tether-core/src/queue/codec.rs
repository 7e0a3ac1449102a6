//! Batch codec: a batch travels as one JSON array.

use serde::Serialize;
use serde::de::DeserializeOwned;

pub fn encode_batch<T: Serialize>(items: &[T]) -> Result<String, serde_json::Error> {
    serde_json::to_string(items)
}

pub fn decode_batch<T: DeserializeOwned>(raw: &str) -> Result<Vec<T>, serde_json::Error> {
    serde_json::from_str(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Mail {
        to: String,
        attempt: u32,
        tags: Vec<String>,
    }

    #[test]
    fn batch_is_a_json_array() {
        let raw = encode_batch(&["hello", "world"]).unwrap();
        assert_eq!(raw, r#"["hello","world"]"#);
    }

    #[test]
    fn non_array_payload_fails_to_decode() {
        assert!(decode_batch::<String>(r#"{"not":"an array"}"#).is_err());
        assert!(decode_batch::<u32>(r#"["x"]"#).is_err());
    }

    proptest! {
        #[test]
        fn strings_survive_the_roundtrip(items in proptest::collection::vec(".*", 0..16)) {
            let raw = encode_batch(&items).unwrap();
            prop_assert_eq!(decode_batch::<String>(&raw).unwrap(), items);
        }

        #[test]
        fn structs_survive_the_roundtrip(
            items in proptest::collection::vec(
                (".{0,12}", any::<u32>(), proptest::collection::vec("[a-z]{1,6}", 0..4)),
                0..8,
            )
        ) {
            let mails: Vec<Mail> = items
                .into_iter()
                .map(|(to, attempt, tags)| Mail { to, attempt, tags })
                .collect();
            let raw = encode_batch(&mails).unwrap();
            prop_assert_eq!(decode_batch::<Mail>(&raw).unwrap(), mails);
        }
    }
}
