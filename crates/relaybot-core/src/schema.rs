//! JSON-Schema sanitizer for tool parameter schemas.
//!
//! Completion providers reject several JSON-Schema keywords that remote
//! tool-servers happily emit. [`sanitize_schema`] returns a cleaned deep copy.

use serde_json::{Map, Value};

/// Keywords removed at every reachable nesting level.
pub const UNSUPPORTED_KEYWORDS: &[&str] = &[
    "$schema",
    "$id",
    "$ref",
    "$comment",
    "$defs",
    "definitions",
    "examples",
    "default",
];

/// Keywords whose value is a list of sub-schemas.
const COMBINATORS: &[&str] = &["allOf", "anyOf", "oneOf"];

/// Return a copy of `schema` with unsupported keywords stripped.
///
/// Recurses through `properties`, `items` (object or tuple form),
/// `allOf`/`anyOf`/`oneOf`, `patternProperties` and object-valued
/// `additionalProperties`. Anything else, including malformed input,
/// passes through untouched.
pub fn sanitize_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => Value::Object(sanitize_object(map)),
        other => other.clone(),
    }
}

fn sanitize_object(map: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::with_capacity(map.len());

    for (key, value) in map {
        if UNSUPPORTED_KEYWORDS.contains(&key.as_str()) {
            continue;
        }

        let cleaned = match key.as_str() {
            "properties" | "patternProperties" => sanitize_schema_map(value),
            "items" => match value {
                Value::Array(items) => Value::Array(items.iter().map(sanitize_schema).collect()),
                other => sanitize_schema(other),
            },
            "additionalProperties" => sanitize_schema(value),
            k if COMBINATORS.contains(&k) => match value {
                Value::Array(items) => Value::Array(items.iter().map(sanitize_schema).collect()),
                other => other.clone(),
            },
            _ => value.clone(),
        };

        out.insert(key.clone(), cleaned);
    }

    out
}

/// `properties`-style maps: keys are property names, never keywords.
fn sanitize_schema_map(value: &Value) -> Value {
    match value {
        Value::Object(props) => Value::Object(
            props
                .iter()
                .map(|(name, schema)| (name.clone(), sanitize_schema(schema)))
                .collect(),
        ),
        other => other.clone(),
    }
}
