// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Speedtest to InfluxDB CLI
//!
//! # Usage
//!
//! ```bash
//! # Single measurement, written to localhost:8086/speedtest
//! speedtest-influx
//!
//! # Every 30 minutes against another server
//! INFLUX_HOSTNAME=influx.lan speedtest-influx --daemon --interval-mins 30
//!
//! # Print Line Protocol instead of writing it
//! speedtest-influx --dry-run --derived
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use speedtest_influx::point::DerivedMetric;
use speedtest_influx::{
    EmptyRecordPolicy, InfluxSink, PointBuilder, PointSink, RunMode, Runner, Settings,
    StdoutSink, StopHandle,
};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "speedtest-influx")]
#[command(author = "naskel.com")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run speedtest and store the results in InfluxDB")]
#[command(long_about = None)]
struct Cli {
    /// Run continuously, one measurement per interval
    #[arg(long)]
    daemon: bool,

    /// Minutes between measurements in daemon mode [default: 60]
    #[arg(long)]
    interval_mins: Option<u64>,

    /// Seconds between schedule checks in daemon mode [default: 60]
    #[arg(long)]
    poll_secs: Option<u64>,

    /// Debug logging
    #[arg(long)]
    debug: bool,

    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write a point even when the measurement returned no data
    #[arg(long)]
    write_empty: bool,

    /// Also write download/upload/ping as single-value points
    #[arg(long)]
    derived: bool,

    /// Print Line Protocol to stdout instead of writing to InfluxDB
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("speedtest_influx=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("speedtest_influx=info"))
    };

    fmt().with_env_filter(filter).with_target(false).init();

    let mut settings = Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;
    apply_cli(&cli, &mut settings);
    settings.validate().context("Invalid configuration")?;

    let mode = run_mode(&cli, &settings);

    tracing::info!(
        host = %settings.influxdb.host,
        port = settings.influxdb.port,
        database = %settings.influxdb.database,
        mode = ?mode,
        "Starting speedtest-influx"
    );

    if cli.dry_run {
        run(mode, &settings, StdoutSink)
    } else {
        run(mode, &settings, InfluxSink::new(settings.influxdb.clone()))
    }
}

/// Command line flags override file and environment settings.
fn apply_cli(cli: &Cli, settings: &mut Settings) {
    if let Some(mins) = cli.interval_mins {
        settings.schedule.interval_mins = mins;
    }
    if let Some(secs) = cli.poll_secs {
        settings.schedule.poll_secs = secs;
    }
    if cli.write_empty {
        settings.empty_record = EmptyRecordPolicy::Write;
    }
    if cli.derived && settings.point.derived.is_empty() {
        settings.point.derived = DerivedMetric::builtin();
    }
}

fn run_mode(cli: &Cli, settings: &Settings) -> RunMode {
    if cli.daemon {
        RunMode::Recurring {
            interval: settings.schedule.interval(),
            poll: settings.schedule.poll(),
        }
    } else {
        RunMode::Once
    }
}

fn run<S: PointSink>(mode: RunMode, settings: &Settings, sink: S) -> Result<()> {
    let builder = PointBuilder::new(settings.point.clone());
    let mut runner = Runner::new(mode, settings.command.clone(), sink, builder)
        .empty_record_policy(settings.empty_record);

    ctrlc_handler(runner.stop_handle());

    runner.run().context("Measurement failed")?;

    let stats = runner.stats();
    tracing::info!(
        cycles = stats.cycles,
        points_written = stats.points_written,
        invocation_failures = stats.invocation_failures,
        sink_failures = stats.sink_failures,
        "Shutdown complete"
    );

    Ok(())
}

/// Setup Ctrl+C handler.
fn ctrlc_handler(stop_handle: StopHandle) {
    let _ = ctrlc::set_handler(move || {
        tracing::info!("Received Ctrl+C, stopping after the current measurement...");
        stop_handle.stop();
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("speedtest-influx").chain(args.iter().copied()))
            .expect("valid arguments")
    }

    #[test]
    fn test_default_is_one_shot() {
        let cli = parse(&[]);
        let mut settings = Settings::default();
        apply_cli(&cli, &mut settings);

        assert_eq!(run_mode(&cli, &settings), RunMode::Once);
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_daemon_flags_override_settings() {
        let cli = parse(&["--daemon", "--interval-mins", "15", "--poll-secs", "5"]);
        let mut settings = Settings::default();
        apply_cli(&cli, &mut settings);

        assert_eq!(
            run_mode(&cli, &settings),
            RunMode::Recurring {
                interval: Duration::from_secs(15 * 60),
                poll: Duration::from_secs(5),
            }
        );
    }

    #[test]
    fn test_write_empty_and_derived() {
        let cli = parse(&["--write-empty", "--derived"]);
        let mut settings = Settings::default();
        apply_cli(&cli, &mut settings);

        assert_eq!(settings.empty_record, EmptyRecordPolicy::Write);
        assert_eq!(settings.point.derived, DerivedMetric::builtin());
    }

    #[test]
    fn test_zero_interval_fails_validation() {
        let cli = parse(&["--daemon", "--interval-mins", "0"]);
        let mut settings = Settings::default();
        apply_cli(&cli, &mut settings);

        assert!(settings.validate().is_err());
    }
}
