//! # Canonical Forms
//!
//! One unique representation per semantic value:
//! - frames: `encode(decode(raw))` (headers sorted, escapes normalized)
//! - JSON payloads: object keys sorted, no whitespace, fixed string escaping
//!
//! Both are idempotent: canonicalizing a canonical form returns it unchanged.

use super::frame::{decode, encode};
use crate::TesseraError;
use serde_json::Value;
use std::fmt;

/// A canonical byte string, ready to hash or store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CanonicalForm(String);

impl CanonicalForm {
    /// The canonical text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The canonical bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Take ownership of the canonical text.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CanonicalForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonicalize raw frame text.
///
/// # Errors
///
/// Propagates `Parse` and `Schema` errors from `decode`.
pub fn canonicalize(raw: &str) -> Result<CanonicalForm, TesseraError> {
    let frame = decode(raw)?;
    Ok(CanonicalForm(encode(&frame)))
}

/// Canonical JSON serialization of a structured payload.
#[must_use]
pub fn canonical_json(value: &Value) -> CanonicalForm {
    let mut out = String::new();
    write_value(value, &mut out);
    CanonicalForm(out)
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            // The map keeps insertion order; the canonical form does not.
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_value(item, out);
            }
            out.push('}');
        }
    }
}

fn write_string(s: &str, out: &mut String) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_json_sorts_keys_recursively() {
        let a = json!({"b": 1, "a": {"z": [3, {"y": true, "x": null}], "c": "s"}});
        assert_eq!(
            canonical_json(&a).as_str(),
            r#"{"a":{"c":"s","z":[3,{"x":null,"y":true}]},"b":1}"#
        );
    }

    #[test]
    fn canonical_json_ignores_insertion_order() {
        let a = json!({"tool": "grep", "args": {"pattern": "x", "path": "/"}});
        let b = json!({"args": {"path": "/", "pattern": "x"}, "tool": "grep"});
        assert_eq!(canonical_json(&a), canonical_json(&b));
    }

    #[test]
    fn canonical_json_matches_serde_string_escaping() {
        let value = json!("quote\" slash\\ nl\n tab\t bell\u{07} é");
        let expected = serde_json::to_string(&value).expect("serialize");
        assert_eq!(canonical_json(&value).as_str(), expected);
    }

    #[test]
    fn canonical_json_is_idempotent() {
        let value = json!({"n": 1.5, "list": ["b", "a"], "nested": {"k": -3}});
        let once = canonical_json(&value);
        let reparsed: Value = serde_json::from_str(once.as_str()).expect("parse");
        assert_eq!(canonical_json(&reparsed), once);
    }

    #[test]
    fn canonicalize_sorts_and_is_idempotent() {
        let raw = "{TYPE TRAIN_PAIR;SOURCE s;CREATED_AT t|*aGk}";
        let once = canonicalize(raw).expect("canonicalize");
        assert_eq!(once.as_str(), "{CREATED_AT t;SOURCE s;TYPE TRAIN_PAIR|*aGk}");
        let twice = canonicalize(once.as_str()).expect("canonicalize");
        assert_eq!(once, twice);
    }

    #[test]
    fn canonicalize_rejects_garbage() {
        assert!(canonicalize("not a frame").is_err());
    }
}
