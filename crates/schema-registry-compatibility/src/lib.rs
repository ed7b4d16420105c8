//! # Schema Registry Compatibility
//!
//! The compatibility engine: maps a policy mode and a pair of schemas onto
//! directional reader/writer checks.
//!
//! - `BACKWARD`: the new schema must read data produced by the old one.
//! - `FORWARD`: the old schema must read data produced by the new one.
//! - `FULL`: both directions, merged.
//! - `NONE`: always compatible.
//!
//! The `_TRANSITIVE` variants are identical at the pairwise level; callers
//! iterate over all prior versions when [`CompatibilityMode::is_transitive`]
//! is true.

pub mod avro;
pub mod json_schema;
pub mod result;

use schema_registry_core::{CompatibilityMode, SchemaKind, TypedSchema};
use tracing::info;

pub use crate::avro::check_avro_compatibility;
pub use crate::json_schema::check_json_compatibility;
pub use crate::result::{CompatibilityResult, Incompatibility, IncompatibilityKind};

/// Check that `old_schema` and `new_schema` are compatible under `mode`
pub fn check_compatibility(
    old_schema: &TypedSchema,
    new_schema: &TypedSchema,
    mode: CompatibilityMode,
) -> CompatibilityResult {
    if old_schema.kind() != new_schema.kind() {
        return CompatibilityResult::incompatible(
            IncompatibilityKind::TypeMismatch,
            "/",
            format!(
                "comparing different schema types: {} with {}",
                old_schema.kind(),
                new_schema.kind()
            ),
        );
    }

    if mode == CompatibilityMode::None {
        info!("compatibility level set to NONE, no schema compatibility checks performed");
        return CompatibilityResult::compatible();
    }

    match old_schema.kind() {
        SchemaKind::Avro => {
            let (Some(old), Some(new)) =
                (old_schema.parsed().as_avro(), new_schema.parsed().as_avro())
            else {
                return parsed_form_mismatch();
            };
            check_directional(mode, |reader_is_new| {
                if reader_is_new {
                    check_avro_compatibility(new, old)
                } else {
                    check_avro_compatibility(old, new)
                }
            })
        }
        SchemaKind::JsonSchema => {
            let (Some(old), Some(new)) =
                (old_schema.parsed().as_json(), new_schema.parsed().as_json())
            else {
                return parsed_form_mismatch();
            };
            check_directional(mode, |reader_is_new| {
                if reader_is_new {
                    check_json_compatibility(new, old)
                } else {
                    check_json_compatibility(old, new)
                }
            })
        }
        SchemaKind::Protobuf => CompatibilityResult::incompatible(
            IncompatibilityKind::ComparatorUnavailable,
            "/",
            "no Protobuf comparator is available",
        ),
    }
}

/// Run `check(reader_is_new)` in the direction(s) selected by `mode`
fn check_directional(
    mode: CompatibilityMode,
    check: impl Fn(bool) -> CompatibilityResult,
) -> CompatibilityResult {
    match mode {
        CompatibilityMode::Backward | CompatibilityMode::BackwardTransitive => check(true),
        CompatibilityMode::Forward | CompatibilityMode::ForwardTransitive => check(false),
        CompatibilityMode::Full | CompatibilityMode::FullTransitive => {
            check(true).merge(check(false))
        }
        CompatibilityMode::None => CompatibilityResult::compatible(),
    }
}

fn parsed_form_mismatch() -> CompatibilityResult {
    CompatibilityResult::incompatible(
        IncompatibilityKind::TypeMismatch,
        "/",
        "schema kind does not match its parsed representation",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn avro(text: &str) -> TypedSchema {
        TypedSchema::parse(SchemaKind::Avro, text).unwrap()
    }

    #[test]
    fn test_none_mode_is_always_compatible() {
        let a = avro("\"int\"");
        let b = avro("\"string\"");
        assert!(check_compatibility(&a, &b, CompatibilityMode::None).is_compatible());
        assert!(check_compatibility(&a, &a, CompatibilityMode::None).is_compatible());
    }

    #[test]
    fn test_kind_mismatch_is_incompatible_in_every_mode() {
        let old = avro("\"int\"");
        let new = TypedSchema::parse(SchemaKind::JsonSchema, r#"{"type": "integer"}"#).unwrap();
        for mode in [
            CompatibilityMode::None,
            CompatibilityMode::Backward,
            CompatibilityMode::Forward,
            CompatibilityMode::Full,
        ] {
            let result = check_compatibility(&old, &new, mode);
            assert!(!result.is_compatible());
            assert_eq!(
                result.incompatibilities[0].kind,
                IncompatibilityKind::TypeMismatch
            );
        }
    }

    #[test]
    fn test_backward_reads_old_data_with_new_schema() {
        // Widening int -> long: the new schema can read old data, but not the
        // other way around.
        let old = avro("\"int\"");
        let new = avro("\"long\"");
        assert!(check_compatibility(&old, &new, CompatibilityMode::Backward).is_compatible());
        assert!(!check_compatibility(&old, &new, CompatibilityMode::Forward).is_compatible());
    }

    #[test]
    fn test_forward_reads_new_data_with_old_schema() {
        let old = avro("\"long\"");
        let new = avro("\"int\"");
        assert!(check_compatibility(&old, &new, CompatibilityMode::Forward).is_compatible());
        assert!(!check_compatibility(&old, &new, CompatibilityMode::Backward).is_compatible());
    }

    #[test]
    fn test_full_equals_merge_of_backward_and_forward() {
        let old = avro(
            r#"{"type": "record", "name": "R", "fields": [{"name": "a", "type": "int"}]}"#,
        );
        let new = avro(
            r#"{"type": "record", "name": "R", "fields": [
                {"name": "a", "type": "int"},
                {"name": "b", "type": "string"}
            ]}"#,
        );
        let full = check_compatibility(&old, &new, CompatibilityMode::Full);
        let merged = check_compatibility(&old, &new, CompatibilityMode::Backward)
            .merge(check_compatibility(&old, &new, CompatibilityMode::Forward));
        assert_eq!(full, merged);
    }

    #[test]
    fn test_transitive_modes_match_their_pairwise_base() {
        let old = avro("\"int\"");
        let new = avro("\"long\"");
        assert_eq!(
            check_compatibility(&old, &new, CompatibilityMode::Backward),
            check_compatibility(&old, &new, CompatibilityMode::BackwardTransitive),
        );
        assert_eq!(
            check_compatibility(&old, &new, CompatibilityMode::Forward),
            check_compatibility(&old, &new, CompatibilityMode::ForwardTransitive),
        );
        assert_eq!(
            check_compatibility(&old, &new, CompatibilityMode::Full),
            check_compatibility(&old, &new, CompatibilityMode::FullTransitive),
        );
    }

    #[test]
    fn test_protobuf_without_comparator() {
        let a = TypedSchema::parse(SchemaKind::Protobuf, "message A {}").unwrap();
        assert!(check_compatibility(&a, &a, CompatibilityMode::None).is_compatible());
        let result = check_compatibility(&a, &a, CompatibilityMode::Backward);
        assert_eq!(
            result.incompatibilities[0].kind,
            IncompatibilityKind::ComparatorUnavailable
        );
    }

    #[test]
    fn test_json_schema_modes() {
        let old = TypedSchema::parse(
            SchemaKind::JsonSchema,
            r#"{"type": "object", "properties": {"a": {"type": ["string", "null"]}}}"#,
        )
        .unwrap();
        let new = TypedSchema::parse(
            SchemaKind::JsonSchema,
            r#"{"type": "object", "properties": {"a": {"type": "string"}}}"#,
        )
        .unwrap();
        // The new schema narrows `a`, so it cannot read everything old
        // writers produced.
        assert!(!check_compatibility(&old, &new, CompatibilityMode::Backward).is_compatible());
        // Old readers accept everything new writers produce.
        assert!(check_compatibility(&old, &new, CompatibilityMode::Forward).is_compatible());
    }
}
