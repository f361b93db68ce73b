// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Measurement record model.
//!
//! A raw measurement is a tree: every node is either a scalar leaf or a
//! named mapping of child nodes. Lists are not expected in the speedtest
//! schema and are carried as opaque scalars, never recursed into.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// A leaf value of a measurement record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    /// JSON `null`.
    Null,
    /// Boolean value.
    Boolean(bool),
    /// Number that fits a signed 64-bit integer.
    Integer(i64),
    /// Any other number.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// List value, kept verbatim.
    Opaque(serde_json::Value),
}

impl Scalar {
    /// Numeric view of this scalar, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Integer(v) => Some(*v as f64),
            Scalar::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// True for `null` and the empty string.
    pub fn is_blank(&self) -> bool {
        match self {
            Scalar::Null => true,
            Scalar::String(s) => s.is_empty(),
            _ => false,
        }
    }

    /// String view of a scalar, as used for InfluxDB tag values.
    ///
    /// Returns `None` for `null`.
    pub fn to_tag_string(&self) -> Option<String> {
        match self {
            Scalar::Null => None,
            Scalar::Boolean(b) => Some(b.to_string()),
            Scalar::Integer(i) => Some(i.to_string()),
            Scalar::Float(f) => Some(f.to_string()),
            Scalar::String(s) => Some(s.clone()),
            Scalar::Opaque(v) => Some(v.to_string()),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_tag_string() {
            Some(s) => f.write_str(&s),
            None => f.write_str("null"),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::String(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::String(s)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Integer(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Boolean(v)
    }
}

/// A node of a raw measurement record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Node {
    /// Leaf value.
    Scalar(Scalar),
    /// Named children.
    Mapping(BTreeMap<String, Node>),
}

impl Node {
    /// Build a record tree from parsed JSON.
    ///
    /// Objects become mappings, arrays become [`Scalar::Opaque`], and numbers
    /// that do not fit an `i64` become floats.
    pub fn from_json(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Object(map) => Node::Mapping(
                map.into_iter()
                    .map(|(k, v)| (k, Node::from_json(v)))
                    .collect(),
            ),
            Value::Array(_) => Node::Scalar(Scalar::Opaque(value)),
            Value::Null => Node::Scalar(Scalar::Null),
            Value::Bool(b) => Node::Scalar(Scalar::Boolean(b)),
            Value::String(s) => Node::Scalar(Scalar::String(s)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Node::Scalar(Scalar::Integer(i)),
                None => Node::Scalar(Scalar::Float(n.as_f64().unwrap_or(f64::NAN))),
            },
        }
    }

    /// True for a mapping with no children.
    pub fn is_empty(&self) -> bool {
        matches!(self, Node::Mapping(children) if children.is_empty())
    }
}

/// Parse a record from JSON text.
///
/// A top-level `null` is an absent record. Any other top-level value must be
/// an object.
pub fn parse_record(text: &str) -> Result<Option<Node>, serde_json::Error> {
    use serde::de::Error as _;

    let value: serde_json::Value = serde_json::from_str(text)?;
    if value.is_null() {
        return Ok(None);
    }
    if !value.is_object() {
        return Err(serde_json::Error::custom(format!(
            "expected a JSON object, got {}",
            json_kind(&value)
        )));
    }
    Ok(Some(Node::from_json(value)))
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_numbers() {
        let node = Node::from_json(json!({"loss": 0, "jitter": 0.709, "big": 18446744073709551615u64}));
        let Node::Mapping(children) = node else {
            panic!("expected mapping");
        };
        assert_eq!(children["loss"], Node::Scalar(Scalar::Integer(0)));
        assert_eq!(children["jitter"], Node::Scalar(Scalar::Float(0.709)));
        assert!(matches!(children["big"], Node::Scalar(Scalar::Float(_))));
    }

    #[test]
    fn test_from_json_list_is_opaque() {
        let node = Node::from_json(json!({"hops": [1, 2, 3]}));
        let Node::Mapping(children) = node else {
            panic!("expected mapping");
        };
        assert_eq!(
            children["hops"],
            Node::Scalar(Scalar::Opaque(json!([1, 2, 3])))
        );
    }

    #[test]
    fn test_parse_record_null_is_absent() {
        assert_eq!(parse_record("null").expect("valid json"), None);
        assert!(parse_record("{}").expect("valid json").expect("present").is_empty());
        assert!(parse_record("{not json").is_err());
    }

    #[test]
    fn test_parse_record_requires_object_at_top_level() {
        for text in ["42", "\"x\"", "true", "[1, 2]"] {
            let err = parse_record(text).expect_err("not an object");
            assert!(err.to_string().contains("expected a JSON object"), "{text}: {err}");
        }
    }

    #[test]
    fn test_node_serializes_back_to_json() {
        let value = json!({
            "isp": "ExampleNet",
            "packetLoss": 0,
            "ping": {"jitter": 0.7},
            "hops": [1, 2],
            "result": null
        });
        let encoded = serde_json::to_value(Node::from_json(value.clone())).expect("serialize");
        assert_eq!(encoded, value);
    }

    #[test]
    fn test_scalar_helpers() {
        assert!(Scalar::Null.is_blank());
        assert!(Scalar::from("").is_blank());
        assert!(!Scalar::Integer(0).is_blank());
        assert_eq!(Scalar::Integer(3).as_f64(), Some(3.0));
        assert_eq!(Scalar::from("x").as_f64(), None);
        assert_eq!(Scalar::Integer(48322).to_tag_string().as_deref(), Some("48322"));
        assert_eq!(Scalar::Null.to_tag_string(), None);
    }
}
