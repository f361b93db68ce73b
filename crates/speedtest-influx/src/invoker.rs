// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Speedtest CLI invocation.
//!
//! Runs the external measurement command with JSON output requested and
//! turns its stdout into a raw record. The call blocks until the command
//! exits; there is no timeout.

use crate::record::{parse_record, Node};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use thiserror::Error;

/// Default location of the Ookla speedtest CLI.
pub const DEFAULT_PROGRAM: &str = "/usr/bin/speedtest";

/// Invocation errors.
#[derive(Debug, Error)]
pub enum InvocationError {
    /// The command could not be started at all.
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The command exited with a non-zero status (or was killed).
    #[error("command failed with exit code {}{}", fmt_code(.code), fmt_stderr(.stderr))]
    Execution { code: Option<i32>, stderr: String },

    /// The command succeeded but its output is not a JSON object.
    #[error("error parsing JSON output: {0}")]
    Parse(#[from] serde_json::Error),
}

fn fmt_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "none (terminated by signal)".to_string(), |c| c.to_string())
}

fn fmt_stderr(stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

/// Source of raw measurement records.
pub trait Measure {
    /// Take one measurement.
    ///
    /// `Ok(None)` means the tool succeeded but reported nothing.
    fn measure(&mut self) -> Result<Option<Node>, InvocationError>;
}

impl<F> Measure for F
where
    F: FnMut() -> Result<Option<Node>, InvocationError>,
{
    fn measure(&mut self) -> Result<Option<Node>, InvocationError> {
        self()
    }
}

/// External speedtest command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SpeedtestCommand {
    /// Executable path.
    pub program: PathBuf,
    /// Arguments; must select machine-readable JSON output.
    pub args: Vec<String>,
}

impl Default for SpeedtestCommand {
    fn default() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_PROGRAM),
            args: vec!["-f".to_string(), "json".to_string()],
        }
    }
}

impl SpeedtestCommand {
    /// Command with the default JSON output arguments.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// Append extra arguments (e.g. `--accept-license`).
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run the command once and parse its output.
    pub fn run(&self) -> Result<Option<Node>, InvocationError> {
        tracing::debug!(
            program = %self.program.display(),
            args = ?self.args,
            "Running speed test"
        );

        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| InvocationError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(InvocationError::Execution {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let record = parse_record(&stdout)?;
        Ok(record)
    }
}

impl Measure for SpeedtestCommand {
    fn measure(&mut self) -> Result<Option<Node>, InvocationError> {
        self.run()
    }
}
