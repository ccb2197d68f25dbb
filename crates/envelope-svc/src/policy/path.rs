//! Dotted field paths and the walker that reads and writes them.
//!
//! A path such as `"driver.ssn"` addresses a value through nested JSON
//! objects. Arrays are not addressable. Segments that name prototype-like
//! keys are rejected at parse time so that records shared with JavaScript
//! consumers can never be steered into them.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Keys a path segment may never name.
const RESERVED_SEGMENTS: &[&str] = &["__proto__", "constructor", "prototype"];

/// Errors from parsing or writing a [`FieldPath`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// Empty path or a path with an empty segment (`"a..b"`, `".a"`).
    #[error("field path {0:?} has an empty segment")]
    EmptySegment(String),

    /// Segment names a reserved key.
    #[error("field path {path:?} uses reserved key {segment:?}")]
    ReservedSegment { path: String, segment: String },

    /// Array indexing syntax is not supported.
    #[error("field path {0:?} uses array syntax, which is not supported")]
    ArraySyntax(String),

    /// A value on the way to the target is not an object.
    #[error("cannot write {path:?}: {at:?} is not an object")]
    NotAnObject { path: String, at: String },
}

/// A validated dotted path to a field inside a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldPath {
    raw: String,
    segments: Vec<String>,
}

impl FieldPath {
    /// Parse and validate a dotted path.
    ///
    /// # Errors
    ///
    /// See [`PathError`].
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        if raw.contains('[') || raw.contains(']') {
            return Err(PathError::ArraySyntax(raw.to_owned()));
        }
        let segments: Vec<String> = raw.split('.').map(str::to_owned).collect();
        if segments.iter().any(String::is_empty) {
            return Err(PathError::EmptySegment(raw.to_owned()));
        }
        if let Some(reserved) = segments
            .iter()
            .find(|s| RESERVED_SEGMENTS.contains(&s.as_str()))
        {
            return Err(PathError::ReservedSegment {
                path: raw.to_owned(),
                segment: reserved.clone(),
            });
        }
        Ok(Self {
            raw: raw.to_owned(),
            segments,
        })
    }

    /// The path as configured.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The individual keys, outermost first. Never empty.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    fn prefix(&self, depth: usize) -> String {
        self.segments[..=depth].join(".")
    }
}

impl FromStr for FieldPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for FieldPath {
    type Error = PathError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<FieldPath> for String {
    fn from(p: FieldPath) -> Self {
        p.raw
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Read the value at `path`.
///
/// Returns `None` if any segment is missing, passes through a non-object, or
/// if the value found is `null`: absent data is skipped, not an error.
pub fn get_nested_value<'a>(record: &'a Value, path: &FieldPath) -> Option<&'a Value> {
    let mut node = record;
    for segment in path.segments() {
        node = node.as_object()?.get(segment)?;
    }
    (!node.is_null()).then_some(node)
}

/// Write `value` at `path`, creating missing or `null` intermediate objects.
///
/// # Errors
///
/// Returns [`PathError::NotAnObject`] if the record, or a value on the way
/// to the target, is a non-null non-object.
pub fn set_nested_value(record: &mut Value, path: &FieldPath, value: Value) -> Result<(), PathError> {
    let not_an_object = |at: String| PathError::NotAnObject {
        path: path.as_str().to_owned(),
        at,
    };

    let Some((last, parents)) = path.segments().split_last() else {
        return Err(PathError::EmptySegment(path.as_str().to_owned()));
    };

    let mut node = record;
    for (depth, segment) in parents.iter().enumerate() {
        let map = match node {
            Value::Object(map) => map,
            _ if depth == 0 => return Err(not_an_object("<root>".into())),
            _ => return Err(not_an_object(path.prefix(depth - 1))),
        };
        let child = map
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if child.is_null() {
            *child = Value::Object(Map::new());
        }
        node = child;
    }

    match node {
        Value::Object(map) => {
            map.insert(last.clone(), value);
            Ok(())
        }
        _ if parents.is_empty() => Err(not_an_object("<root>".into())),
        _ => Err(not_an_object(path.prefix(parents.len() - 1))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn p(s: &str) -> FieldPath {
        FieldPath::parse(s).unwrap()
    }

    #[test]
    fn parse_flat_and_nested() {
        assert_eq!(p("ssn").segments(), ["ssn"]);
        assert_eq!(p("driver.address.zip").segments(), ["driver", "address", "zip"]);
    }

    #[test]
    fn parse_rejects_empty_segments() {
        for bad in ["", ".a", "a.", "a..b"] {
            assert!(matches!(FieldPath::parse(bad), Err(PathError::EmptySegment(_))), "{bad}");
        }
    }

    #[test]
    fn parse_rejects_reserved_keys() {
        for bad in ["__proto__", "a.constructor", "a.prototype.b"] {
            assert!(matches!(FieldPath::parse(bad), Err(PathError::ReservedSegment { .. })), "{bad}");
        }
    }

    #[test]
    fn parse_rejects_array_syntax() {
        assert!(matches!(FieldPath::parse("orders[].card"), Err(PathError::ArraySyntax(_))));
        assert!(matches!(FieldPath::parse("orders[0]"), Err(PathError::ArraySyntax(_))));
    }

    #[test]
    fn serde_round_trips_as_string() {
        let path: FieldPath = serde_json::from_str("\"a.b\"").unwrap();
        assert_eq!(path, p("a.b"));
        assert_eq!(serde_json::to_string(&path).unwrap(), "\"a.b\"");
        assert!(serde_json::from_str::<FieldPath>("\"a..b\"").is_err());
    }

    #[test]
    fn get_reads_nested_values() {
        let rec = json!({"driver": {"ssn": "123", "age": 40}, "id": 1});
        assert_eq!(get_nested_value(&rec, &p("driver.ssn")), Some(&json!("123")));
        assert_eq!(get_nested_value(&rec, &p("id")), Some(&json!(1)));
        assert_eq!(get_nested_value(&rec, &p("driver")), Some(&rec["driver"]));
    }

    #[test]
    fn get_skips_absent_null_and_non_objects() {
        let rec = json!({"a": null, "b": "scalar", "c": [{"d": 1}]});
        assert_eq!(get_nested_value(&rec, &p("a")), None);
        assert_eq!(get_nested_value(&rec, &p("a.x")), None);
        assert_eq!(get_nested_value(&rec, &p("b.x")), None);
        assert_eq!(get_nested_value(&rec, &p("c.d")), None);
        assert_eq!(get_nested_value(&rec, &p("missing")), None);
    }

    #[test]
    fn set_overwrites_existing_value() {
        let mut rec = json!({"a": {"b": 1, "d": 2}});
        set_nested_value(&mut rec, &p("a.b"), json!("x")).unwrap();
        assert_eq!(rec, json!({"a": {"b": "x", "d": 2}}));
    }

    #[test]
    fn set_creates_missing_and_null_intermediates() {
        let mut rec = json!({"n": null});
        set_nested_value(&mut rec, &p("x.y.z"), json!(1)).unwrap();
        set_nested_value(&mut rec, &p("n.m"), json!(2)).unwrap();
        assert_eq!(rec, json!({"x": {"y": {"z": 1}}, "n": {"m": 2}}));
    }

    #[test]
    fn set_refuses_to_descend_through_scalars() {
        let mut rec = json!({"a": {"b": "scalar"}});
        let err = set_nested_value(&mut rec, &p("a.b.c"), json!(1)).unwrap_err();
        assert_eq!(
            err,
            PathError::NotAnObject {
                path: "a.b.c".into(),
                at: "a.b".into()
            }
        );
        assert_eq!(rec, json!({"a": {"b": "scalar"}}));
    }

    #[test]
    fn set_on_non_object_root_fails() {
        let mut rec = json!([1, 2]);
        assert!(set_nested_value(&mut rec, &p("a"), json!(1)).is_err());
        assert!(set_nested_value(&mut rec, &p("a.b"), json!(1)).is_err());
    }
}
