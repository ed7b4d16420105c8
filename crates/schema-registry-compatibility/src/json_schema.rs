//! JSON Schema reader/writer compatibility
//!
//! Structural comparison of two draft-7 documents: a reader schema is
//! compatible with a writer schema when every instance accepted by the writer
//! is also accepted by the reader. The check covers the constructs the
//! registry's clients rely on: `type`, `properties`, `required`,
//! `additionalProperties`, `items`, and `enum`.

use serde_json::Value;

use crate::result::{CompatibilityResult, IncompatibilityKind};

/// Check that `reader` accepts every instance the `writer` schema accepts
pub fn check_json_compatibility(reader: &Value, writer: &Value) -> CompatibilityResult {
    let mut result = CompatibilityResult::compatible();
    check(&mut result, reader, writer, "/");
    result
}

/// `type` may be a single string or an array of strings
fn type_set(schema: &Value) -> Option<Vec<&str>> {
    match schema.get("type") {
        Some(Value::String(s)) => Some(vec![s.as_str()]),
        Some(Value::Array(items)) => Some(items.iter().filter_map(Value::as_str).collect()),
        _ => None,
    }
}

fn accepts_type(reader_types: &[&str], written: &str) -> bool {
    reader_types.contains(&written)
        // every integer is a number
        || (written == "integer" && reader_types.contains(&"number"))
}

fn check(result: &mut CompatibilityResult, reader: &Value, writer: &Value, at: &str) {
    if reader == &Value::Bool(false) {
        result.push(
            IncompatibilityKind::TypeNarrowed,
            at,
            "reader schema accepts nothing",
        );
        return;
    }
    // A boolean `true` schema or one without constraints accepts everything.
    if reader.as_object().is_none() {
        return;
    }

    if let (Some(reader_types), Some(writer_types)) = (type_set(reader), type_set(writer)) {
        let narrowed: Vec<&&str> = writer_types
            .iter()
            .filter(|written| !accepts_type(&reader_types, written))
            .collect();
        if !narrowed.is_empty() {
            result.push(
                IncompatibilityKind::TypeNarrowed,
                format!("{at}type/"),
                format!("reader no longer accepts type(s) {narrowed:?}"),
            );
            return;
        }
    }

    check_enum(result, reader, writer, at);
    check_object(result, reader, writer, at);
    check_array(result, reader, writer, at);
}

fn check_enum(result: &mut CompatibilityResult, reader: &Value, writer: &Value, at: &str) {
    let Some(reader_enum) = reader.get("enum").and_then(Value::as_array) else {
        return;
    };
    match writer.get("enum").and_then(Value::as_array) {
        Some(writer_enum) => {
            let missing: Vec<&Value> = writer_enum
                .iter()
                .filter(|value| !reader_enum.contains(value))
                .collect();
            if !missing.is_empty() {
                result.push(
                    IncompatibilityKind::EnumNarrowed,
                    format!("{at}enum/"),
                    format!("reader enum no longer accepts {missing:?}"),
                );
            }
        }
        // The writer was unconstrained, the reader now enumerates values.
        None => {
            result.push(
                IncompatibilityKind::EnumNarrowed,
                format!("{at}enum/"),
                "reader restricts previously unconstrained values to an enum",
            );
        }
    }
}

fn check_object(result: &mut CompatibilityResult, reader: &Value, writer: &Value, at: &str) {
    let reader_props = reader.get("properties").and_then(Value::as_object);
    let writer_props = writer.get("properties").and_then(Value::as_object);

    // Newly required properties the writer was not obliged to produce.
    let writer_required: Vec<&str> = writer
        .get("required")
        .and_then(Value::as_array)
        .map(|required| required.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    if let Some(reader_required) = reader.get("required").and_then(Value::as_array) {
        for name in reader_required.iter().filter_map(Value::as_str) {
            if writer_required.contains(&name) {
                continue;
            }
            let has_default = reader_props
                .and_then(|props| props.get(name))
                .and_then(|prop| prop.get("default"))
                .is_some();
            if !has_default {
                result.push(
                    IncompatibilityKind::RequiredPropertyAdded,
                    format!("{at}required/{name}/"),
                    format!("property {name} became required without a default"),
                );
            }
        }
    }

    let (Some(reader_props), Some(writer_props)) = (reader_props, writer_props) else {
        return;
    };

    let closed_reader = reader.get("additionalProperties") == Some(&Value::Bool(false));
    for (name, writer_prop) in writer_props {
        match reader_props.get(name) {
            Some(reader_prop) => {
                check(
                    result,
                    reader_prop,
                    writer_prop,
                    &format!("{at}properties/{name}/"),
                );
            }
            None if closed_reader => {
                result.push(
                    IncompatibilityKind::PropertyRemoved,
                    format!("{at}properties/{name}/"),
                    format!("property {name} was removed and additional properties are forbidden"),
                );
            }
            None => {}
        }
    }
}

fn check_array(result: &mut CompatibilityResult, reader: &Value, writer: &Value, at: &str) {
    if let (Some(reader_items), Some(writer_items)) = (reader.get("items"), writer.get("items")) {
        check(result, reader_items, writer_items, &format!("{at}items/"));
    }
}
