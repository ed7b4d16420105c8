//! Record key canonicalization
//!
//! Keys on the default schemas topic are compacted by Kafka based on their
//! byte representation, so field order matters. Restored keys are
//! re-serialized with the canonical field order when targeting the default
//! topic, or when `force_key_correction` is configured.

use serde_json::Value;

const CANONICAL_ORDER: [&str; 4] = ["keytype", "subject", "version", "magic"];

/// How restored record keys should be treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFormat {
    /// Keys pass through byte-for-byte
    Preserve,
    /// Keys are re-serialized with canonical field order
    Canonical,
}

impl KeyFormat {
    pub fn apply(&self, raw: &[u8]) -> Vec<u8> {
        match self {
            KeyFormat::Preserve => raw.to_vec(),
            KeyFormat::Canonical => canonicalize_key(raw),
        }
    }
}

/// Re-serialize a JSON object key with canonical field order
///
/// Keys that are not JSON objects pass through unchanged; a restore must not
/// fail on foreign records in the log.
pub fn canonicalize_key(raw: &[u8]) -> Vec<u8> {
    let Ok(Value::Object(fields)) = serde_json::from_slice::<Value>(raw) else {
        return raw.to_vec();
    };
    let mut ordered = serde_json::Map::new();
    for name in CANONICAL_ORDER {
        if let Some(value) = fields.get(name) {
            ordered.insert(name.to_string(), value.clone());
        }
    }
    for (name, value) in fields {
        if !ordered.contains_key(&name) {
            ordered.insert(name, value);
        }
    }
    serde_json::to_vec(&Value::Object(ordered)).unwrap_or_else(|_| raw.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_field_order() {
        let raw = br#"{"version":1,"subject":"s","magic":1,"keytype":"SCHEMA"}"#;
        let canonical = canonicalize_key(raw);
        assert_eq!(
            String::from_utf8(canonical).unwrap(),
            r#"{"keytype":"SCHEMA","subject":"s","version":1,"magic":1}"#
        );
    }

    #[test]
    fn test_unknown_fields_are_kept_after_canonical_ones() {
        let raw = br#"{"extra":true,"keytype":"NOOP"}"#;
        let canonical = canonicalize_key(raw);
        assert_eq!(
            String::from_utf8(canonical).unwrap(),
            r#"{"keytype":"NOOP","extra":true}"#
        );
    }

    #[test]
    fn test_non_object_keys_pass_through() {
        assert_eq!(canonicalize_key(b"17"), b"17".to_vec());
        assert_eq!(canonicalize_key(b"not json"), b"not json".to_vec());
    }

    #[test]
    fn test_preserve_mode_keeps_bytes() {
        let raw = br#"{"version":1,"keytype":"SCHEMA"}"#;
        assert_eq!(KeyFormat::Preserve.apply(raw), raw.to_vec());
    }
}
