//! Avro reader/writer compatibility
//!
//! Walks a pair of parsed Avro schemas and decides whether data written with
//! the writer schema can be decoded by the reader schema, following the Avro
//! schema-resolution rules: matching shapes, numeric and string/bytes
//! promotions, union branch resolution, and record field defaults.

use apache_avro::schema::Name;
use apache_avro::Schema as AvroSchema;

use crate::result::{CompatibilityResult, IncompatibilityKind};

/// Check that `reader` can read data produced with `writer`
///
/// A verdict consisting of exactly one missing-enum-symbols incompatibility
/// is downgraded to compatible: clients of the original registry depend on a
/// single narrowed enum being accepted.
pub fn check_avro_compatibility(
    reader: &AvroSchema,
    writer: &AvroSchema,
) -> CompatibilityResult {
    let mut result = CompatibilityResult::compatible();
    check(&mut result, reader, writer, "/");
    if result.incompatibilities.len() == 1
        && result.incompatibilities[0].kind == IncompatibilityKind::MissingEnumSymbols
    {
        return CompatibilityResult::compatible();
    }
    result
}

fn named(schema: &AvroSchema) -> Option<&Name> {
    match schema {
        AvroSchema::Record(record) => Some(&record.name),
        AvroSchema::Enum(inner) => Some(&inner.name),
        AvroSchema::Fixed(fixed) => Some(&fixed.name),
        _ => None,
    }
}

fn type_name(schema: &AvroSchema) -> String {
    match named(schema) {
        Some(name) => name.fullname(None),
        None => format!("{schema:?}"),
    }
}

fn check(result: &mut CompatibilityResult, reader: &AvroSchema, writer: &AvroSchema, at: &str) {
    match (writer, reader) {
        // A writer union is readable when every branch is
        (AvroSchema::Union(w), _) => {
            for branch in w.variants() {
                check(result, reader, branch, at);
            }
        }

        // A non-union writer against a reader union resolves to the first
        // branch that can read it
        (_, AvroSchema::Union(r)) => {
            let readable = r.variants().iter().any(|branch| {
                let mut probe = CompatibilityResult::compatible();
                check(&mut probe, branch, writer, at);
                probe.is_compatible()
            });
            if !readable {
                result.push(
                    IncompatibilityKind::MissingUnionBranch,
                    at,
                    format!("reader union has no branch for writer type {}", type_name(writer)),
                );
            }
        }

        // Identical primitives
        (AvroSchema::Null, AvroSchema::Null)
        | (AvroSchema::Boolean, AvroSchema::Boolean)
        | (AvroSchema::Int, AvroSchema::Int)
        | (AvroSchema::Long, AvroSchema::Long)
        | (AvroSchema::Float, AvroSchema::Float)
        | (AvroSchema::Double, AvroSchema::Double)
        | (AvroSchema::Bytes, AvroSchema::Bytes)
        | (AvroSchema::String, AvroSchema::String) => {}

        // Promotions allowed by the Avro specification
        (AvroSchema::Int, AvroSchema::Long)
        | (AvroSchema::Int, AvroSchema::Float)
        | (AvroSchema::Int, AvroSchema::Double)
        | (AvroSchema::Long, AvroSchema::Float)
        | (AvroSchema::Long, AvroSchema::Double)
        | (AvroSchema::Float, AvroSchema::Double)
        | (AvroSchema::String, AvroSchema::Bytes)
        | (AvroSchema::Bytes, AvroSchema::String) => {}

        (AvroSchema::Array(w), AvroSchema::Array(r)) => {
            check(result, r, w, &format!("{at}items/"));
        }

        (AvroSchema::Map(w), AvroSchema::Map(r)) => {
            check(result, r, w, &format!("{at}values/"));
        }

        (AvroSchema::Enum(w), AvroSchema::Enum(r)) => {
            if w.name.fullname(None) != r.name.fullname(None) {
                result.push(
                    IncompatibilityKind::NameMismatch,
                    at,
                    format!(
                        "enum name {} does not match {}",
                        r.name.fullname(None),
                        w.name.fullname(None)
                    ),
                );
                return;
            }
            let missing: Vec<&String> = w
                .symbols
                .iter()
                .filter(|symbol| !r.symbols.contains(symbol))
                .collect();
            if !missing.is_empty() {
                result.push(
                    IncompatibilityKind::MissingEnumSymbols,
                    format!("{at}symbols/"),
                    format!(
                        "reader enum is missing symbols {:?} of writer enum {}",
                        missing,
                        w.name.fullname(None)
                    ),
                );
            }
        }

        (AvroSchema::Fixed(w), AvroSchema::Fixed(r)) => {
            if w.name.fullname(None) != r.name.fullname(None) {
                result.push(
                    IncompatibilityKind::NameMismatch,
                    at,
                    format!(
                        "fixed name {} does not match {}",
                        r.name.fullname(None),
                        w.name.fullname(None)
                    ),
                );
            } else if w.size != r.size {
                result.push(
                    IncompatibilityKind::FixedSizeMismatch,
                    format!("{at}size/"),
                    format!("fixed size changed from {} to {}", w.size, r.size),
                );
            }
        }

        (AvroSchema::Record(w), AvroSchema::Record(r)) => {
            if w.name.fullname(None) != r.name.fullname(None) {
                result.push(
                    IncompatibilityKind::NameMismatch,
                    at,
                    format!(
                        "record name {} does not match {}",
                        r.name.fullname(None),
                        w.name.fullname(None)
                    ),
                );
                return;
            }
            for reader_field in &r.fields {
                match w.fields.iter().find(|f| f.name == reader_field.name) {
                    Some(writer_field) => {
                        check(
                            result,
                            &reader_field.schema,
                            &writer_field.schema,
                            &format!("{at}fields/{}/", reader_field.name),
                        );
                    }
                    None if reader_field.default.is_some() => {}
                    None => {
                        result.push(
                            IncompatibilityKind::ReaderFieldMissingDefaultValue,
                            format!("{at}fields/{}/", reader_field.name),
                            format!(
                                "reader field {} is absent from the writer and has no default",
                                reader_field.name
                            ),
                        );
                    }
                }
            }
            // Writer fields unknown to the reader are skipped during decoding
        }

        // Recursion points surface as references to a named schema already
        // checked at its definition site
        (AvroSchema::Ref { name: w }, AvroSchema::Ref { name: r }) => {
            if w.fullname(None) != r.fullname(None) {
                result.push(
                    IncompatibilityKind::TypeMismatch,
                    at,
                    format!(
                        "schema reference {} does not match {}",
                        r.fullname(None),
                        w.fullname(None)
                    ),
                );
            }
        }
        (AvroSchema::Ref { name: w }, r) if named(r).is_some_and(|n| n.fullname(None) == w.fullname(None)) => {}
        (w, AvroSchema::Ref { name: r }) if named(w).is_some_and(|n| n.fullname(None) == r.fullname(None)) => {}

        // Logical types and other matching shapes
        (w, r) if std::mem::discriminant(w) == std::mem::discriminant(r) => {}

        (w, r) => {
            result.push(
                IncompatibilityKind::TypeMismatch,
                at,
                format!(
                    "reader type {} is not compatible with writer type {}",
                    type_name(r),
                    type_name(w)
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> AvroSchema {
        AvroSchema::parse_str(text).unwrap()
    }

    #[test]
    fn test_identical_schemas_are_compatible() {
        let schema = parse(
            r#"{"type": "record", "name": "R", "fields": [{"name": "f", "type": "string"}]}"#,
        );
        assert!(check_avro_compatibility(&schema, &schema).is_compatible());
    }

    #[test]
    fn test_int_promotes_to_long() {
        let writer = parse("\"int\"");
        let reader = parse("\"long\"");
        assert!(check_avro_compatibility(&reader, &writer).is_compatible());
        assert!(!check_avro_compatibility(&writer, &reader).is_compatible());
    }

    #[test]
    fn test_string_and_bytes_are_interchangeable() {
        let string = parse("\"string\"");
        let bytes = parse("\"bytes\"");
        assert!(check_avro_compatibility(&string, &bytes).is_compatible());
        assert!(check_avro_compatibility(&bytes, &string).is_compatible());
    }

    #[test]
    fn test_reader_field_without_default_is_incompatible() {
        let writer = parse(
            r#"{"type": "record", "name": "R", "fields": [{"name": "a", "type": "int"}]}"#,
        );
        let reader = parse(
            r#"{"type": "record", "name": "R", "fields": [
                {"name": "a", "type": "int"},
                {"name": "b", "type": "string"}
            ]}"#,
        );
        let result = check_avro_compatibility(&reader, &writer);
        assert!(!result.is_compatible());
        assert_eq!(
            result.incompatibilities[0].kind,
            IncompatibilityKind::ReaderFieldMissingDefaultValue
        );
        assert_eq!(result.incompatibilities[0].location, "/fields/b/");
    }

    #[test]
    fn test_reader_field_with_default_is_compatible() {
        let writer = parse(
            r#"{"type": "record", "name": "R", "fields": [{"name": "a", "type": "int"}]}"#,
        );
        let reader = parse(
            r#"{"type": "record", "name": "R", "fields": [
                {"name": "a", "type": "int"},
                {"name": "b", "type": "string", "default": ""}
            ]}"#,
        );
        assert!(check_avro_compatibility(&reader, &writer).is_compatible());
    }

    #[test]
    fn test_removed_writer_field_is_compatible() {
        let writer = parse(
            r#"{"type": "record", "name": "R", "fields": [
                {"name": "a", "type": "int"},
                {"name": "b", "type": "string"}
            ]}"#,
        );
        let reader = parse(
            r#"{"type": "record", "name": "R", "fields": [{"name": "a", "type": "int"}]}"#,
        );
        assert!(check_avro_compatibility(&reader, &writer).is_compatible());
    }

    #[test]
    fn test_missing_enum_symbols_is_downgraded_to_compatible() {
        let writer = parse(r#"{"type": "enum", "name": "E", "symbols": ["A", "B", "C"]}"#);
        let reader = parse(r#"{"type": "enum", "name": "E", "symbols": ["A", "B"]}"#);
        // The raw walk records the incompatibility...
        let mut raw = CompatibilityResult::compatible();
        check(&mut raw, &reader, &writer, "/");
        assert_eq!(
            raw.incompatibilities[0].kind,
            IncompatibilityKind::MissingEnumSymbols
        );
        // ...but the public verdict downgrades it.
        assert!(check_avro_compatibility(&reader, &writer).is_compatible());
    }

    #[test]
    fn test_two_narrowed_enums_stay_incompatible() {
        let writer = parse(
            r#"{"type": "record", "name": "R", "fields": [
                {"name": "a", "type": {"type": "enum", "name": "A", "symbols": ["X", "Y"]}},
                {"name": "b", "type": {"type": "enum", "name": "B", "symbols": ["P", "Q"]}}
            ]}"#,
        );
        let reader = parse(
            r#"{"type": "record", "name": "R", "fields": [
                {"name": "a", "type": {"type": "enum", "name": "A", "symbols": ["X"]}},
                {"name": "b", "type": {"type": "enum", "name": "B", "symbols": ["P"]}}
            ]}"#,
        );
        // The downgrade applies to a single narrowed enum only.
        let result = check_avro_compatibility(&reader, &writer);
        assert!(!result.is_compatible());
        assert_eq!(result.incompatibilities.len(), 2);
        assert!(result
            .incompatibilities
            .iter()
            .all(|i| i.kind == IncompatibilityKind::MissingEnumSymbols));
    }

    #[test]
    fn test_missing_enum_symbols_mixed_with_other_faults_stays_incompatible() {
        let writer = parse(
            r#"{"type": "record", "name": "R", "fields": [
                {"name": "e", "type": {"type": "enum", "name": "E", "symbols": ["A", "B"]}},
                {"name": "f", "type": "string"}
            ]}"#,
        );
        let reader = parse(
            r#"{"type": "record", "name": "R", "fields": [
                {"name": "e", "type": {"type": "enum", "name": "E", "symbols": ["A"]}},
                {"name": "f", "type": "int"}
            ]}"#,
        );
        let result = check_avro_compatibility(&reader, &writer);
        assert!(!result.is_compatible());
        assert!(result
            .incompatibilities
            .iter()
            .any(|i| i.kind == IncompatibilityKind::TypeMismatch));
    }

    #[test]
    fn test_reader_union_must_cover_writer_type() {
        let writer = parse("\"string\"");
        let reader = parse(r#"["null", "string"]"#);
        assert!(check_avro_compatibility(&reader, &writer).is_compatible());

        let narrow_reader = parse(r#"["null", "int"]"#);
        let result = check_avro_compatibility(&narrow_reader, &writer);
        assert!(!result.is_compatible());
        assert_eq!(
            result.incompatibilities[0].kind,
            IncompatibilityKind::MissingUnionBranch
        );
    }

    #[test]
    fn test_writer_union_requires_all_branches_readable() {
        let writer = parse(r#"["int", "string"]"#);
        let reader = parse("\"long\"");
        // The string branch cannot be read as long.
        assert!(!check_avro_compatibility(&reader, &writer).is_compatible());

        let wide_reader = parse(r#"["long", "string"]"#);
        assert!(check_avro_compatibility(&wide_reader, &writer).is_compatible());
    }

    #[test]
    fn test_fixed_size_mismatch() {
        let writer = parse(r#"{"type": "fixed", "name": "F", "size": 16}"#);
        let reader = parse(r#"{"type": "fixed", "name": "F", "size": 8}"#);
        let result = check_avro_compatibility(&reader, &writer);
        assert_eq!(
            result.incompatibilities[0].kind,
            IncompatibilityKind::FixedSizeMismatch
        );
    }

    #[test]
    fn test_nested_record_field_type_change_is_located() {
        let writer = parse(
            r#"{"type": "record", "name": "Outer", "fields": [
                {"name": "inner", "type": {"type": "record", "name": "Inner", "fields": [
                    {"name": "x", "type": "int"}
                ]}}
            ]}"#,
        );
        let reader = parse(
            r#"{"type": "record", "name": "Outer", "fields": [
                {"name": "inner", "type": {"type": "record", "name": "Inner", "fields": [
                    {"name": "x", "type": "boolean"}
                ]}}
            ]}"#,
        );
        let result = check_avro_compatibility(&reader, &writer);
        assert!(!result.is_compatible());
        assert_eq!(result.incompatibilities[0].location, "/fields/inner/fields/x/");
    }

    #[test]
    fn test_array_item_promotion() {
        let writer = parse(r#"{"type": "array", "items": "int"}"#);
        let reader = parse(r#"{"type": "array", "items": "double"}"#);
        assert!(check_avro_compatibility(&reader, &writer).is_compatible());
    }
}
