//! Conversion between a session data map and the bytes handed to a storage handler.
//!
//! Every literal backslash inside a string value is replaced by [`BACKSLASH_SENTINEL`]
//! before serialization, and restored after deserialization.
//! Stored payloads thereby survive transports that strip or double backslashes.
//! Strings that already contain the sentinel literally are not preserved.

use crate::Result;
use log::warn;
use serde_json::{Map, Value};

/// The sequence that stands in for a backslash in stored payloads.
pub const BACKSLASH_SENTINEL: &str = "{{slash}}";

/// Serialize `map` into a storable byte string, escaping backslashes in all string values.
pub fn encode(map: &Map<String, Value>) -> Result<Vec<u8>> {
    let escaped: Map<String, Value> = map
        .iter()
        .map(|(key, value)| (key.clone(), rewrite_strings(value.clone(), "\\", BACKSLASH_SENTINEL)))
        .collect();
    Ok(serde_json::to_vec(&escaped)?)
}

/// Deserialize a byte string produced by [`encode`].
///
/// Empty input yields an empty map.
/// So does malformed input: a corrupted payload degrades to an empty session.
pub fn decode(bytes: &[u8]) -> Map<String, Value> {
    if bytes.is_empty() {
        return Map::new();
    }

    match serde_json::from_slice::<Map<String, Value>>(bytes) {
        Ok(map) => map
            .into_iter()
            .map(|(key, value)| (key, rewrite_strings(value, BACKSLASH_SENTINEL, "\\")))
            .collect(),
        Err(error) => {
            warn!("Discarding malformed session payload of {} bytes: {error}", bytes.len());
            Map::new()
        }
    }
}

fn rewrite_strings(value: Value, from: &str, to: &str) -> Value {
    match value {
        Value::String(string) => Value::String(string.replace(from, to)),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| rewrite_strings(item, from, to))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, item)| (key, rewrite_strings(item, from, to)))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn backslashes_survive_a_round_trip() {
        let original = map(json!({
            "path": "C:\\Users\\session",
            "double": "\\\\",
            "trailing": "end\\",
            "nested": { "inner": "a\\b", "list": ["\\x", 1, null] },
            "number": 5,
        }));

        assert_eq!(decode(&encode(&original).unwrap()), original);
    }

    #[test]
    fn encoded_strings_carry_no_backslashes() {
        let original = map(json!({ "path": "a\\b\\c" }));
        let encoded = String::from_utf8(encode(&original).unwrap()).unwrap();

        assert!(!encoded.contains('\\'));
        assert!(encoded.contains("a{{slash}}b{{slash}}c"));
    }

    #[test]
    fn stored_payloads_with_stripped_backslashes_still_decode() {
        let decoded = decode(br#"{"path":"a{{slash}}b"}"#);
        assert_eq!(decoded.get("path"), Some(&json!("a\\b")));
    }

    #[test]
    fn empty_input_decodes_to_empty_map() {
        assert!(decode(b"").is_empty());
    }

    #[test]
    fn malformed_input_decodes_to_empty_map() {
        assert!(decode(b"a:1:{s:3:\"key\";").is_empty());
        assert!(decode(b"[1, 2, 3]").is_empty());
    }
}
