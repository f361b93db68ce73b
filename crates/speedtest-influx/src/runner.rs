// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Measurement runner.
//!
//! One cycle is: invoke the measurement command, flatten its record, build
//! the points, and hand them to the sink. Cycles never overlap.
//!
//! - [`RunMode::Once`] runs one cycle and returns its error, if any.
//! - [`RunMode::Recurring`] runs one cycle immediately and then one per
//!   interval until stopped. A failed cycle is logged and counted; it does
//!   not stop the loop or move the schedule.

use crate::flatten::flatten;
use crate::invoker::{InvocationError, Measure};
use crate::point::{PointBuilder, PointError};
use crate::scheduler::Schedule;
use crate::sink::{PointSink, SinkError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Longest uninterrupted sleep while waiting for the next poll.
const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(200);

/// What to do when a measurement yields an empty record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyRecordPolicy {
    /// Fail the cycle without writing.
    #[default]
    Skip,
    /// Hand the field-less point to the sink anyway.
    Write,
}

/// Execution mode, fixed for the lifetime of a runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Single cycle.
    Once,
    /// A cycle every `interval`, checked every `poll`.
    Recurring { interval: Duration, poll: Duration },
}

/// Reasons a cycle failed.
///
/// Only [`CycleError::Timestamp`] can follow a successful write: the primary
/// point is stored and the derived points are dropped.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("measurement failed: {0}")]
    Invocation(#[from] InvocationError),

    #[error("measurement returned no data")]
    EmptyRecord,

    #[error("derived point: {0}")]
    Timestamp(#[from] PointError),

    #[error("write to InfluxDB failed: {0}")]
    Sink(#[from] SinkError),
}

/// Outcome of a successful cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Points handed to the sink.
    pub points: usize,
    /// Fields of the primary point.
    pub fields: usize,
}

/// Runner statistics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStats {
    /// Cycles started.
    pub cycles: u64,
    /// Cycles whose points were written.
    pub cycles_ok: u64,
    /// Points written, including those of cycles that failed afterwards.
    pub points_written: u64,
    /// Command failed to start, exited non-zero, or printed bad JSON.
    pub invocation_failures: u64,
    /// Measurement returned nothing usable.
    pub empty_records: u64,
    /// Derived point timestamp could not be parsed.
    pub timestamp_failures: u64,
    /// Sink rejected or could not receive the batch.
    pub sink_failures: u64,
}

/// Handle to stop a running loop from another thread.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. The current cycle, if any, runs to completion.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Drives measurement cycles.
pub struct Runner<M, S> {
    mode: RunMode,
    invoker: M,
    sink: S,
    builder: PointBuilder,
    empty_policy: EmptyRecordPolicy,
    stop: StopHandle,
    stats: RunStats,
}

impl<M: Measure, S: PointSink> Runner<M, S> {
    /// Create a runner.
    ///
    /// # Panics
    /// Panics if a recurring mode has a zero interval or poll period.
    pub fn new(mode: RunMode, invoker: M, sink: S, builder: PointBuilder) -> Self {
        if let RunMode::Recurring { interval, poll } = mode {
            assert!(!interval.is_zero(), "interval must be non-zero");
            assert!(!poll.is_zero(), "poll period must be non-zero");
        }
        Self {
            mode,
            invoker,
            sink,
            builder,
            empty_policy: EmptyRecordPolicy::default(),
            stop: StopHandle::new(),
            stats: RunStats::default(),
        }
    }

    /// Set the empty record policy.
    pub fn empty_record_policy(mut self, policy: EmptyRecordPolicy) -> Self {
        self.empty_policy = policy;
        self
    }

    /// Use an existing stop handle.
    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    /// Get a handle to stop the runner from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Run according to the mode (blocking).
    ///
    /// Only [`RunMode::Once`] can return an error; the recurring loop
    /// returns `Ok` once stopped.
    pub fn run(&mut self) -> Result<(), CycleError> {
        match self.mode {
            RunMode::Once => self.run_cycle().map(|_| ()),
            RunMode::Recurring { interval, poll } => {
                self.run_recurring(interval, poll);
                Ok(())
            }
        }
    }

    fn run_recurring(&mut self, interval: Duration, poll: Duration) {
        tracing::info!(
            interval_secs = interval.as_secs(),
            poll_secs = poll.as_secs(),
            "Starting recurring measurements"
        );

        let mut schedule = Schedule::new(interval, Instant::now());
        self.run_isolated();

        while !self.stop.is_stopped() {
            if schedule.is_due(Instant::now()) {
                self.run_isolated();
                let missed = schedule.advance(Instant::now());
                if missed > 0 {
                    tracing::warn!(missed, "Measurement overran its interval, skipping ticks");
                }
                continue;
            }
            self.sleep(poll);
        }

        tracing::info!(
            cycles = self.stats.cycles,
            cycles_ok = self.stats.cycles_ok,
            points_written = self.stats.points_written,
            "Recurring measurements stopped"
        );
    }

    /// Run one cycle and log its failure instead of returning it.
    fn run_isolated(&mut self) {
        match self.run_cycle() {
            Ok(report) => tracing::info!(
                points = report.points,
                fields = report.fields,
                "Measurement recorded"
            ),
            Err(CycleError::EmptyRecord) => {
                tracing::warn!("Measurement returned no data, nothing written")
            }
            Err(err) => tracing::error!("{}", err),
        }
    }

    /// Run a single cycle: invoke, flatten, build, write.
    pub fn run_cycle(&mut self) -> Result<CycleReport, CycleError> {
        self.stats.cycles += 1;
        let result = self.cycle();

        match &result {
            Ok(_) => self.stats.cycles_ok += 1,
            Err(CycleError::Invocation(_)) => self.stats.invocation_failures += 1,
            Err(CycleError::EmptyRecord) => self.stats.empty_records += 1,
            Err(CycleError::Timestamp(_)) => self.stats.timestamp_failures += 1,
            Err(CycleError::Sink(_)) => self.stats.sink_failures += 1,
        }
        result
    }

    fn cycle(&mut self) -> Result<CycleReport, CycleError> {
        let record = self.invoker.measure()?;
        tracing::debug!(record = %to_json(&record), "Measurement results");

        let flat = flatten(record.as_ref());
        if flat.is_empty() && self.empty_policy == EmptyRecordPolicy::Skip {
            return Err(CycleError::EmptyRecord);
        }

        let point = self.builder.build_point(&flat);
        let fields = point.fields.len();

        // The primary point does not depend on the timestamp; a bad one only
        // costs the derived points.
        let (derived, timestamp_err) = match self.builder.build_derived(&flat, &point.tags) {
            Ok(derived) => (derived, None),
            Err(err) => (Vec::new(), Some(err)),
        };

        let mut points = Vec::with_capacity(1 + derived.len());
        points.push(point);
        points.extend(derived);
        tracing::debug!(points = %to_json(&points), "Data points");

        if let Err(err) = self.sink.write_points(&points) {
            tracing::debug!(points = %to_json(&points), "Write failed for points");
            return Err(err.into());
        }
        self.stats.points_written += points.len() as u64;

        if let Some(err) = timestamp_err {
            return Err(err.into());
        }

        Ok(CycleReport {
            points: points.len(),
            fields,
        })
    }

    fn sleep(&self, total: Duration) {
        let deadline = Instant::now() + total;
        while !self.stop.is_stopped() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep((deadline - now).min(STOP_CHECK_INTERVAL));
        }
    }
}

/// JSON text of a record or points for debug logs.
fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|err| format!("<not serializable: {err}>"))
}
