// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Metric point construction.
//!
//! Turns a flat speedtest record into an InfluxDB point:
//!
//! - a fixed measurement name,
//! - a small allowlist of identifying keys copied into tags,
//! - the whole flat record as fields, with float-typed fields coerced.
//!
//! Derived points (one value per point, with an explicit source timestamp)
//! are built by [`derived_point`].

use crate::flatten::FlatRecord;
use crate::record::Scalar;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Canonical wire format for explicit timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Point construction errors.
#[derive(Debug, Error)]
pub enum PointError {
    #[error("invalid ISO-8601 timestamp: {0:?}")]
    Timestamp(String),
}

/// Tag set of a point.
pub type Tags = BTreeMap<String, Scalar>;

/// A time-series point ready for the sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricPoint {
    /// Series name.
    pub measurement: String,
    /// Indexed, low-cardinality dimensions.
    pub tags: Tags,
    /// Measured values.
    pub fields: FlatRecord,
    /// Explicit time, whole seconds. `None` lets the sink assign ingestion time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl MetricPoint {
    /// Timestamp in the canonical `YYYY-MM-DDTHH:MM:SSZ` form.
    pub fn time_string(&self) -> Option<String> {
        self.timestamp.map(|t| t.format(TIMESTAMP_FORMAT).to_string())
    }
}

/// A point derived from a single numeric field of the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetric {
    /// Measurement name of the derived point.
    pub measurement: String,
    /// Flat key of the source value.
    pub source: String,
    /// Multiplier applied to the source value.
    #[serde(default = "default_scale")]
    pub scale: f64,
}

fn default_scale() -> f64 {
    1.0
}

impl DerivedMetric {
    pub fn new(measurement: impl Into<String>, source: impl Into<String>, scale: f64) -> Self {
        Self {
            measurement: measurement.into(),
            source: source.into(),
            scale,
        }
    }

    /// Throughput in Mbit/s and ping figures in milliseconds.
    ///
    /// The speedtest CLI reports bandwidth in bytes per second.
    pub fn builtin() -> Vec<Self> {
        vec![
            Self::new("download_mbps", "download.bandwidth", 8.0 / 1_000_000.0),
            Self::new("upload_mbps", "upload.bandwidth", 8.0 / 1_000_000.0),
            Self::new("ping_latency_ms", "ping.latency", 1.0),
            Self::new("ping_jitter_ms", "ping.jitter", 1.0),
        ]
    }
}

/// Shape of the points produced for one record type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PointSchema {
    /// Measurement name of the primary point.
    pub measurement: String,
    /// Flat keys copied into tags when present and non-blank.
    pub tag_keys: Vec<String>,
    /// Flat keys stored as floats even when the value is integral.
    pub float_fields: Vec<String>,
    /// Flat key holding the record's own timestamp (used by derived points).
    pub timestamp_key: String,
    /// Extra single-value points built from the record.
    pub derived: Vec<DerivedMetric>,
}

impl Default for PointSchema {
    fn default() -> Self {
        Self {
            measurement: "speedtest".to_string(),
            tag_keys: ["isp", "server.ip", "server.name", "server.id"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            float_fields: vec!["packetLoss".to_string()],
            timestamp_key: "timestamp".to_string(),
            derived: Vec::new(),
        }
    }
}

/// Builds metric points from flat records according to a [`PointSchema`].
#[derive(Debug, Clone, Default)]
pub struct PointBuilder {
    schema: PointSchema,
}

impl PointBuilder {
    pub fn new(schema: PointSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &PointSchema {
        &self.schema
    }

    /// Build the primary point for a flat record.
    ///
    /// Tags are copied, not moved: every tag value is also present in the
    /// fields. No timestamp is set.
    pub fn build_point(&self, flat: &FlatRecord) -> MetricPoint {
        let mut fields = flat.clone();
        for key in &self.schema.float_fields {
            if let Some(value) = fields.get_mut(key) {
                if let Scalar::Integer(i) = *value {
                    *value = Scalar::Float(i as f64);
                }
            }
        }

        let tags = self
            .schema
            .tag_keys
            .iter()
            .filter_map(|key| match fields.get(key) {
                Some(value) if !value.is_blank() => Some((key.clone(), value.clone())),
                _ => None,
            })
            .collect();

        MetricPoint {
            measurement: self.schema.measurement.clone(),
            tags,
            fields,
            timestamp: None,
        }
    }

    /// Build the configured derived points for a flat record.
    ///
    /// Each point carries `tags` and, when the record has a string
    /// timestamp, that time. Sources that are missing or not numeric are
    /// skipped.
    pub fn build_derived(&self, flat: &FlatRecord, tags: &Tags) -> Result<Vec<MetricPoint>, PointError> {
        if self.schema.derived.is_empty() {
            return Ok(Vec::new());
        }

        let time = match flat.get(&self.schema.timestamp_key) {
            Some(Scalar::String(s)) => Some(s.as_str()),
            _ => None,
        };

        let mut points = Vec::with_capacity(self.schema.derived.len());
        for metric in &self.schema.derived {
            let Some(source) = flat.get(&metric.source).and_then(Scalar::as_f64) else {
                tracing::debug!(
                    measurement = %metric.measurement,
                    source = %metric.source,
                    "Derived metric source missing or not numeric"
                );
                continue;
            };
            points.push(derived_point(
                &metric.measurement,
                tags.clone(),
                Scalar::Float(source * metric.scale),
                time,
            )?);
        }
        Ok(points)
    }
}

/// Build a single-value point with an optional explicit timestamp.
///
/// `time` must be ISO-8601; it is converted to UTC and truncated to whole
/// seconds.
pub fn derived_point(
    measurement: &str,
    tags: Tags,
    value: Scalar,
    time: Option<&str>,
) -> Result<MetricPoint, PointError> {
    let timestamp = time.map(parse_iso8601).transpose()?;

    let mut fields = FlatRecord::new();
    fields.insert("value".to_string(), value);

    Ok(MetricPoint {
        measurement: measurement.to_string(),
        tags,
        fields,
        timestamp,
    })
}

/// Parse an ISO-8601 timestamp to UTC at second precision.
///
/// Accepts RFC 3339 (`2023-05-28T15:47:52Z`, `...+02:00`, fractional
/// seconds), numeric offsets without a colon, date-times without an offset
/// (taken as UTC) and bare dates (midnight UTC).
pub fn parse_iso8601(s: &str) -> Result<DateTime<Utc>, PointError> {
    let s = s.trim();

    let parsed = DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|naive| naive.and_utc())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        })
        .ok_or_else(|| PointError::Timestamp(s.to_string()))?;

    Ok(parsed.with_nanosecond(0).unwrap_or(parsed))
}
