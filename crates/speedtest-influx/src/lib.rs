// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Speedtest to InfluxDB
//!
//! Runs the Ookla speedtest CLI, flattens its JSON report into a single
//! level record and stores it in an InfluxDB 1.x database as one point,
//! either once or on a fixed interval.
//!
//! This crate provides:
//! - Subprocess invocation of the measurement command with JSON output
//! - Dot-separated flattening of nested records
//! - Point construction with a tag allowlist and float coercion
//! - Optional single-value derived points with UTC timestamps
//! - Line Protocol encoding and an HTTP writer for `/write`
//! - A runner for one-shot or recurring measurements
//!
//! # Overview
//!
//! ```text
//! speedtest -f json --> Node --> flatten --> PointBuilder --> PointSink --> InfluxDB
//!                                                    |
//!                                                    +--> derived points
//! ```

pub mod config;
pub mod flatten;
pub mod invoker;
pub mod line_protocol;
pub mod point;
pub mod record;
pub mod runner;
pub mod scheduler;
pub mod sink;

pub use config::{InfluxConfig, Settings};
pub use flatten::{flatten, FlatRecord};
pub use invoker::{InvocationError, Measure, SpeedtestCommand};
pub use point::{MetricPoint, PointBuilder, PointSchema};
pub use record::{Node, Scalar};
pub use runner::{CycleError, EmptyRecordPolicy, RunMode, RunStats, Runner, StopHandle};
pub use sink::{InfluxSink, PointSink, SinkError, StdoutSink};
