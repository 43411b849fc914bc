//! Deterministic JSON encoding used for all signing inputs.
//!
//! Rules (JCS-compatible for the value space this protocol uses):
//! - Object keys sorted bytewise by UTF-8 code point
//! - Strings escaped minimally: `\"`, `\\`, `\b`, `\t`, `\n`, `\f`, `\r`,
//!   and `\u00XX` (lowercase hex) for remaining control characters
//! - Integers emitted as plain digits; non-integer numbers are rejected
//! - No insignificant whitespace
//!
//! Notes carry only strings and arrays of strings, receipts add only u64
//! integers, so decode -> canonicalize is byte-stable.
//!
//! This encoding is FROZEN. Changes break all existing signatures.

use serde_json::Value;

use crate::error::CoreError;

/// Encode a JSON value to canonical bytes.
pub fn canonical_json(value: &Value) -> Result<Vec<u8>, CoreError> {
    let mut buf = Vec::new();
    write_value(&mut buf, value)?;
    Ok(buf)
}

/// Canonical bytes of `value` with `signature.proof` removed.
///
/// This is the message a declaration signature covers: the whole note,
/// including the signature record itself, minus the proof field.
pub fn signing_input(value: &Value) -> Result<Vec<u8>, CoreError> {
    let mut stripped = value.clone();
    if let Some(signature) = stripped.get_mut("signature").and_then(Value::as_object_mut) {
        signature.remove("proof");
    }
    canonical_json(&stripped)
}

fn write_value(buf: &mut Vec<u8>, value: &Value) -> Result<(), CoreError> {
    match value {
        Value::Null => buf.extend_from_slice(b"null"),
        Value::Bool(true) => buf.extend_from_slice(b"true"),
        Value::Bool(false) => buf.extend_from_slice(b"false"),
        Value::Number(n) => {
            if n.is_f64() {
                return Err(CoreError::Canonical(format!(
                    "non-integer number {n} not allowed in canonical form"
                )));
            }
            buf.extend_from_slice(n.to_string().as_bytes());
        }
        Value::String(s) => write_string(buf, s),
        Value::Array(items) => {
            buf.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    buf.push(b',');
                }
                write_value(buf, item)?;
            }
            buf.push(b']');
        }
        Value::Object(map) => {
            // Sort explicitly; do not rely on the map's iteration order.
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            buf.push(b'{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    buf.push(b',');
                }
                write_string(buf, key);
                buf.push(b':');
                write_value(buf, &map[key.as_str()])?;
            }
            buf.push(b'}');
        }
    }
    Ok(())
}

fn write_string(buf: &mut Vec<u8>, s: &str) {
    buf.push(b'"');
    for c in s.chars() {
        match c {
            '"' => buf.extend_from_slice(b"\\\""),
            '\\' => buf.extend_from_slice(b"\\\\"),
            '\u{0008}' => buf.extend_from_slice(b"\\b"),
            '\t' => buf.extend_from_slice(b"\\t"),
            '\n' => buf.extend_from_slice(b"\\n"),
            '\u{000C}' => buf.extend_from_slice(b"\\f"),
            '\r' => buf.extend_from_slice(b"\\r"),
            c if (c as u32) < 0x20 => {
                buf.extend_from_slice(format!("\\u{:04x}", c as u32).as_bytes());
            }
            c => {
                let mut utf8 = [0u8; 4];
                buf.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
            }
        }
    }
    buf.push(b'"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn keys_are_sorted() {
        let value = json!({"zeta": "1", "alpha": "2", "mid": {"b": "x", "a": "y"}});
        let bytes = canonical_json(&value).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"alpha":"2","mid":{"a":"y","b":"x"},"zeta":"1"}"#
        );
    }

    #[test]
    fn minimal_escapes() {
        let value = json!({"s": "a\"b\\c\nd\te\u{0001}"});
        let bytes = canonical_json(&value).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"s":"a\"b\\c\nd\te\u0001"}"#
        );
    }

    #[test]
    fn utf8_passes_through_unescaped() {
        let value = json!({"name": "über∅"});
        let bytes = canonical_json(&value).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), r#"{"name":"über∅"}"#);
    }

    #[test]
    fn integers_plain_floats_rejected() {
        let value = json!({"seq": 42u64, "big": 4503599627370495u64});
        let bytes = canonical_json(&value).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"big":4503599627370495,"seq":42}"#
        );

        assert!(canonical_json(&json!({"x": 1.5})).is_err());
    }

    #[test]
    fn signing_input_strips_only_proof() {
        let value = json!({
            "iscc_code": "ISCC:AAA",
            "signature": {"version": "v", "pubkey": "pk", "proof": "sig"}
        });
        let bytes = signing_input(&value).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"iscc_code":"ISCC:AAA","signature":{"pubkey":"pk","version":"v"}}"#
        );
        // Original untouched.
        assert!(value["signature"].get("proof").is_some());
    }

    #[test]
    fn decode_reencode_is_stable() {
        let raw = br#"{"b":"2","a":"1","nested":{"y":["s1","s2"],"x":"v"}}"#;
        let value: Value = serde_json::from_slice(raw).unwrap();
        let c1 = canonical_json(&value).unwrap();
        let value2: Value = serde_json::from_slice(&c1).unwrap();
        let c2 = canonical_json(&value2).unwrap();
        assert_eq!(c1, c2);
    }

    proptest! {
        #[test]
        fn canonical_is_deterministic_and_stable(
            entries in proptest::collection::btree_map("[a-z]{1,8}", "\\PC{0,16}", 0..8)
        ) {
            let map: serde_json::Map<String, Value> = entries
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect();
            let value = Value::Object(map);

            let c1 = canonical_json(&value).unwrap();
            let reparsed: Value = serde_json::from_slice(&c1).unwrap();
            let c2 = canonical_json(&reparsed).unwrap();
            prop_assert_eq!(c1, c2);
        }
    }
}
