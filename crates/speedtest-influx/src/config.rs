// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Configuration.
//!
//! Settings come from built-in defaults, an optional YAML file, and then
//! environment variables, each layer overriding the previous one:
//!
//! | Variable          | Setting             | Default             |
//! |-------------------|---------------------|---------------------|
//! | `INFLUX_HOSTNAME` | `influxdb.host`     | `localhost`         |
//! | `INFLUX_PORT`     | `influxdb.port`     | `8086`              |
//! | `INFLUX_DATABASE` | `influxdb.database` | `speedtest`         |
//! | `SPEEDTEST_BIN`   | `command.program`   | `/usr/bin/speedtest`|

use crate::invoker::SpeedtestCommand;
use crate::point::PointSchema;
use crate::runner::EmptyRecordPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const ENV_HOST: &str = "INFLUX_HOSTNAME";
pub const ENV_PORT: &str = "INFLUX_PORT";
pub const ENV_DATABASE: &str = "INFLUX_DATABASE";
pub const ENV_PROGRAM: &str = "SPEEDTEST_BIN";

/// Longest accepted measurement interval: one year.
pub const MAX_INTERVAL_MINS: u64 = 365 * 24 * 60;

/// Longest accepted schedule check period: one day.
pub const MAX_POLL_SECS: u64 = 24 * 3600;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// InfluxDB connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct InfluxConfig {
    /// Server host name or address.
    pub host: String,
    /// HTTP API port.
    pub port: u16,
    /// Target database.
    pub database: String,
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8086,
            database: "speedtest".to_string(),
        }
    }
}

/// Recurring-mode timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ScheduleConfig {
    /// Minutes between measurements.
    pub interval_mins: u64,
    /// Seconds between checks for a due measurement.
    pub poll_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_mins: 60,
            poll_secs: 60,
        }
    }
}

impl ScheduleConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_mins.saturating_mul(60))
    }

    pub fn poll(&self) -> Duration {
        Duration::from_secs(self.poll_secs)
    }
}

/// Top-level settings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Settings {
    /// InfluxDB connection.
    pub influxdb: InfluxConfig,
    /// Measurement command.
    pub command: SpeedtestCommand,
    /// Recurring-mode timing.
    pub schedule: ScheduleConfig,
    /// What to do with a measurement that produced no data.
    pub empty_record: EmptyRecordPolicy,
    /// Point layout.
    pub point: PointSchema,
}

impl Settings {
    /// Parse settings from a YAML string. Missing keys keep their defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: Settings = serde_yaml::from_str(yaml)?;
        Ok(settings)
    }

    /// Parse settings from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load defaults, the optional file, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Override settings from environment-style variables.
    ///
    /// Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(host) = get(ENV_HOST) {
            self.influxdb.host = host;
        }
        if let Some(port) = get(ENV_PORT) {
            self.influxdb.port = port.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("{} is not a valid port: {:?}", ENV_PORT, port))
            })?;
        }
        if let Some(database) = get(ENV_DATABASE) {
            self.influxdb.database = database;
        }
        if let Some(program) = get(ENV_PROGRAM) {
            self.command.program = PathBuf::from(program);
        }
        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.influxdb.host.trim().is_empty() {
            return Err(ConfigError::Invalid("influxdb.host cannot be empty".into()));
        }
        if self.influxdb.database.trim().is_empty() {
            return Err(ConfigError::Invalid("influxdb.database cannot be empty".into()));
        }
        if self.schedule.interval_mins == 0 {
            return Err(ConfigError::Invalid(
                "schedule.interval_mins must be at least 1".into(),
            ));
        }
        if self.schedule.interval_mins > MAX_INTERVAL_MINS {
            return Err(ConfigError::Invalid(format!(
                "schedule.interval_mins must be at most {} (one year)",
                MAX_INTERVAL_MINS
            )));
        }
        if self.schedule.poll_secs == 0 || self.schedule.poll_secs > MAX_POLL_SECS {
            return Err(ConfigError::Invalid(format!(
                "schedule.poll_secs must be between 1 and {}",
                MAX_POLL_SECS
            )));
        }
        if self.point.measurement.trim().is_empty() {
            return Err(ConfigError::Invalid("point.measurement cannot be empty".into()));
        }
        for (i, metric) in self.point.derived.iter().enumerate() {
            if metric.measurement.trim().is_empty() || metric.source.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "point.derived[{}] needs a measurement and a source",
                    i
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const FULL_YAML: &str = r#"
influxdb:
  host: "influx.example.com"
  port: 8087
  database: "links"
command:
  program: "/opt/ookla/speedtest"
  args: ["-f", "json", "--accept-license", "--accept-gdpr"]
schedule:
  interval_mins: 15
  poll_secs: 30
empty_record: write
point:
  measurement: "wan"
  tag_keys: ["isp", "server.id"]
  float_fields: ["packetLoss"]
  derived:
    - measurement: "download_mbps"
      source: "download.bandwidth"
      scale: 0.000008
"#;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.influxdb.host, "localhost");
        assert_eq!(settings.influxdb.port, 8086);
        assert_eq!(settings.influxdb.database, "speedtest");
        assert_eq!(settings.schedule.interval(), Duration::from_secs(3600));
        assert_eq!(settings.schedule.poll(), Duration::from_secs(60));
        assert_eq!(settings.empty_record, EmptyRecordPolicy::Skip);
        assert_eq!(settings.point.measurement, "speedtest");
        settings.validate().expect("defaults are valid");
    }

    #[test]
    fn test_parse_full_yaml() {
        let settings = Settings::from_yaml(FULL_YAML).expect("parse full yaml");

        assert_eq!(settings.influxdb.host, "influx.example.com");
        assert_eq!(settings.influxdb.port, 8087);
        assert_eq!(settings.influxdb.database, "links");
        assert_eq!(settings.command.program, PathBuf::from("/opt/ookla/speedtest"));
        assert_eq!(settings.command.args.len(), 4);
        assert_eq!(settings.schedule.interval_mins, 15);
        assert_eq!(settings.schedule.poll_secs, 30);
        assert_eq!(settings.empty_record, EmptyRecordPolicy::Write);
        assert_eq!(settings.point.measurement, "wan");
        assert_eq!(settings.point.tag_keys, vec!["isp", "server.id"]);
        assert_eq!(settings.point.timestamp_key, "timestamp");
        assert_eq!(settings.point.derived.len(), 1);
        assert_eq!(settings.point.derived[0].source, "download.bandwidth");
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let settings = Settings::from_yaml("influxdb:\n  database: other\n").expect("parse");
        assert_eq!(settings.influxdb.host, "localhost");
        assert_eq!(settings.influxdb.database, "other");
        assert_eq!(settings.command, SpeedtestCommand::default());
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(matches!(
            Settings::from_yaml("influxdb:\n  hostname: x\n"),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut settings = Settings::from_yaml(FULL_YAML).expect("parse");
        settings
            .apply_env(env(&[
                ("INFLUX_HOSTNAME", "10.0.0.5"),
                ("INFLUX_DATABASE", "speed"),
                ("INFLUX_PORT", " 9999 "),
                ("SPEEDTEST_BIN", "/usr/local/bin/speedtest"),
            ]))
            .expect("valid env");

        assert_eq!(settings.influxdb.host, "10.0.0.5");
        assert_eq!(settings.influxdb.database, "speed");
        assert_eq!(settings.influxdb.port, 9999);
        assert_eq!(
            settings.command.program,
            PathBuf::from("/usr/local/bin/speedtest")
        );
    }

    #[test]
    fn test_empty_env_value_ignored() {
        let mut settings = Settings::default();
        settings
            .apply_env(env(&[("INFLUX_HOSTNAME", "")]))
            .expect("valid env");
        assert_eq!(settings.influxdb.host, "localhost");
    }

    #[test]
    fn test_invalid_port_rejected() {
        let mut settings = Settings::default();
        let err = settings
            .apply_env(env(&[("INFLUX_PORT", "eighty")]))
            .expect_err("bad port");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut settings = Settings::default();
        settings.schedule.interval_mins = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_oversized_interval() {
        let mut settings = Settings::default();
        settings.schedule.interval_mins = u64::MAX / 30;
        assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));
        assert_eq!(settings.schedule.interval(), Duration::from_secs(u64::MAX));

        settings.schedule.interval_mins = MAX_INTERVAL_MINS;
        settings.validate().expect("one year is accepted");
        assert_eq!(
            settings.schedule.interval(),
            Duration::from_secs(365 * 24 * 3600)
        );
    }

    #[test]
    fn test_validate_rejects_oversized_poll() {
        let mut settings = Settings::default();
        settings.schedule.poll_secs = u64::MAX;
        assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));

        settings.schedule.poll_secs = MAX_POLL_SECS;
        settings.validate().expect("one day is accepted");
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().expect("failed to create temp dir for test");
        let path = dir.path().join("speedtest-influx.yaml");
        std::fs::write(&path, FULL_YAML).expect("write config");

        let settings = Settings::from_file(&path).expect("load file");
        assert_eq!(settings.influxdb.database, "links");

        assert!(matches!(
            Settings::from_file(&dir.path().join("missing.yaml")),
            Err(ConfigError::Io(_))
        ));
    }
}
