// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! InfluxDB Line Protocol writer.
//!
//! Line Protocol format:
//! ```text
//! measurement,tag1=val1,tag2=val2 field1=val1,field2=val2 timestamp_s
//! ```
//!
//! Points are written with second precision; a point without timestamp
//! gets the server's ingestion time.
//!
//! See: <https://docs.influxdata.com/influxdb/v1/write_protocols/line_protocol_reference/>

use crate::point::MetricPoint;
use crate::record::Scalar;
use std::fmt;
use thiserror::Error;

/// Encoding errors.
#[derive(Debug, Error)]
pub enum LineProtocolError {
    /// InfluxDB requires at least one field per point.
    #[error("point '{0}' has no writable fields")]
    NoFields(String),
}

/// A value that can be stored in an InfluxDB field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// 64-bit floating point.
    Float(f64),
    /// 64-bit signed integer.
    Integer(i64),
    /// UTF-8 string.
    String(String),
    /// Boolean value.
    Boolean(bool),
}

impl FieldValue {
    /// Field representation of a record scalar.
    ///
    /// `null` and non-finite floats have no representation. Lists are
    /// stored as their JSON text.
    pub fn from_scalar(value: &Scalar) -> Option<Self> {
        match value {
            Scalar::Null => None,
            Scalar::Float(v) if !v.is_finite() => None,
            Scalar::Float(v) => Some(FieldValue::Float(*v)),
            Scalar::Integer(v) => Some(FieldValue::Integer(*v)),
            Scalar::String(s) => Some(FieldValue::String(s.clone())),
            Scalar::Boolean(b) => Some(FieldValue::Boolean(*b)),
            Scalar::Opaque(v) => Some(FieldValue::String(v.to_string())),
        }
    }

    /// Format this value for InfluxDB Line Protocol.
    ///
    /// - Float: written as-is (e.g., `3.14`)
    /// - Integer: suffixed with `i` (e.g., `42i`)
    /// - String: quoted with double quotes, inner quotes escaped (e.g., `"hello"`)
    /// - Boolean: `true` or `false`
    pub fn to_line_protocol(&self) -> String {
        match self {
            FieldValue::Float(v) => format!("{}", v),
            FieldValue::Integer(v) => format!("{}i", v),
            FieldValue::String(v) => {
                let escaped = v.replace('\\', "\\\\").replace('"', "\\\"");
                format!("\"{}\"", escaped)
            }
            FieldValue::Boolean(v) => v.to_string(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_line_protocol())
    }
}

/// Encode one point as a Line Protocol line.
///
/// Tags are emitted sorted by key, null tags and null fields are dropped.
pub fn encode_point(point: &MetricPoint) -> Result<String, LineProtocolError> {
    let fields: Vec<(&str, FieldValue)> = point
        .fields
        .iter()
        .filter_map(|(k, v)| FieldValue::from_scalar(v).map(|fv| (k.as_str(), fv)))
        .collect();

    if fields.is_empty() {
        return Err(LineProtocolError::NoFields(point.measurement.clone()));
    }

    let mut line = escape_measurement(&point.measurement);

    // BTreeMap iteration is already key-ordered
    for (key, value) in &point.tags {
        let Some(value) = value.to_tag_string() else {
            continue;
        };
        if value.is_empty() {
            continue;
        }
        line.push(',');
        line.push_str(&escape_tag(key));
        line.push('=');
        line.push_str(&escape_tag(&value));
    }

    line.push(' ');

    for (i, (key, value)) in fields.iter().enumerate() {
        if i > 0 {
            line.push(',');
        }
        line.push_str(&escape_tag(key));
        line.push('=');
        line.push_str(&value.to_line_protocol());
    }

    if let Some(ts) = point.timestamp {
        line.push(' ');
        line.push_str(&ts.timestamp().to_string());
    }

    Ok(line)
}

/// Builds a Line Protocol request body, one point per line.
#[derive(Debug, Default)]
pub struct LineProtocolWriter {
    body: String,
}

impl LineProtocolWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode a point and append it to the body.
    pub fn write_point(&mut self, point: &MetricPoint) -> Result<(), LineProtocolError> {
        let line = encode_point(point)?;
        if !self.body.is_empty() {
            self.body.push('\n');
        }
        self.body.push_str(&line);
        Ok(())
    }

    /// The newline-separated body, without a trailing newline.
    pub fn into_body(self) -> String {
        self.body
    }
}

/// Escape a measurement name: spaces and commas get a backslash.
fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

/// Escape tag keys, tag values and field keys.
/// Commas, equals signs, and spaces must be escaped.
fn escape_tag(s: &str) -> String {
    s.replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}
