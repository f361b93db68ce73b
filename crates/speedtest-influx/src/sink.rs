// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Metric point sinks.
//!
//! [`InfluxSink`] writes to the InfluxDB 1.x HTTP API
//! (`POST /write?db=<database>&precision=s`). A new HTTP client is created
//! for every write; writes happen at most once per measurement interval.

use crate::config::InfluxConfig;
use crate::line_protocol::{LineProtocolError, LineProtocolWriter};
use crate::point::MetricPoint;
use std::io::{self, Write};
use thiserror::Error;

/// Sink errors.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("encoding error: {0}")]
    Encode(#[from] LineProtocolError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("InfluxDB rejected write with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Destination for metric points.
pub trait PointSink {
    /// Write a batch of points. Either the whole batch is accepted or an
    /// error is returned; there is no retry.
    fn write_points(&self, points: &[MetricPoint]) -> Result<(), SinkError>;
}

/// Encode a batch into a Line Protocol request body.
pub fn encode_batch(points: &[MetricPoint]) -> Result<String, LineProtocolError> {
    let mut writer = LineProtocolWriter::new();
    for point in points {
        writer.write_point(point)?;
    }
    Ok(writer.into_body())
}

/// InfluxDB HTTP sink.
#[derive(Debug, Clone)]
pub struct InfluxSink {
    config: InfluxConfig,
}

impl InfluxSink {
    pub fn new(config: InfluxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &InfluxConfig {
        &self.config
    }

    /// Write endpoint, without query string.
    ///
    /// A host given with a scheme is used as the base URL.
    pub fn write_url(&self) -> String {
        let host = self.config.host.trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            format!("{}:{}/write", host, self.config.port)
        } else {
            format!("http://{}:{}/write", host, self.config.port)
        }
    }
}

impl PointSink for InfluxSink {
    fn write_points(&self, points: &[MetricPoint]) -> Result<(), SinkError> {
        let body = encode_batch(points)?;

        tracing::debug!(
            points = points.len(),
            host = %self.config.host,
            database = %self.config.database,
            "Posting data points"
        );

        let client = reqwest::blocking::Client::new();
        let response = client
            .post(self.write_url())
            .query(&[
                ("db", self.config.database.as_str()),
                ("precision", "s"),
            ])
            .body(body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(SinkError::Status {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        tracing::debug!("Post complete");
        Ok(())
    }
}

/// Prints Line Protocol to stdout instead of writing to a database.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl PointSink for StdoutSink {
    fn write_points(&self, points: &[MetricPoint]) -> Result<(), SinkError> {
        let body = encode_batch(points)?;
        let mut out = io::stdout().lock();
        writeln!(out, "{}", body)?;
        out.flush()?;
        Ok(())
    }
}
