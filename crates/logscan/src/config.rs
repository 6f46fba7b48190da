//! Scanner configuration.
//!
//! Defaults are suitable for most workloads. Values can be read from a JSON
//! or YAML file and selectively overridden through environment variables:
//!
//! - `LOGSCAN_AGGREGATION`: `per-pattern` or `per-category`
//! - `LOGSCAN_CONTEXT_LINES`: lines of context captured before a stack trace
//! - `LOGSCAN_STRIP_TIMESTAMPS`: `true` to drop RFC 3339 prefixes before anomaly grouping

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::warn;

use crate::error::ConfigError;
use crate::types::Severity;

const ENV_AGGREGATION: &str = "LOGSCAN_AGGREGATION";
const ENV_CONTEXT_LINES: &str = "LOGSCAN_CONTEXT_LINES";
const ENV_STRIP_TIMESTAMPS: &str = "LOGSCAN_STRIP_TIMESTAMPS";

/// Categories scanned when the caller does not pick any.
pub const DEFAULT_CATEGORIES: &[&str] = &[
    "Connection",
    "Timeout",
    "Auth",
    "Exceptions",
    "Resource",
    "AppFailure",
    "Anomaly",
];

/// How category scan matches are turned into issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AggregationMode {
    /// One issue per matched pattern
    #[default]
    PerPattern,
    /// One issue per category, merging every matched pattern
    PerCategory,
}

impl FromStr for AggregationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "per-pattern" | "pattern" => Ok(Self::PerPattern),
            "per-category" | "category" => Ok(Self::PerCategory),
            other => Err(format!(
                "unknown aggregation mode '{other}' (expected per-pattern or per-category)"
            )),
        }
    }
}

impl fmt::Display for AggregationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PerPattern => "per-pattern",
            Self::PerCategory => "per-category",
        })
    }
}

/// Configuration shared by all scan tasks of one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Issue granularity for category scans
    pub aggregation: AggregationMode,
    /// Ring buffer size for lines preceding a stack trace
    pub context_lines: usize,
    /// Sample lines kept per source in issue details
    pub max_sample_lines: usize,
    /// Sample lines longer than this are truncated
    pub max_line_length: usize,
    /// Severity of repeated lines below the escalation thresholds
    pub anomaly_base_severity: Severity,
    /// Drop leading RFC 3339 timestamps before grouping repeated lines
    pub strip_timestamps: bool,
    /// Category routed to the stack trace extractor
    pub trace_category: String,
    /// Category routed to the anomaly detector
    pub anomaly_category: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            aggregation: AggregationMode::PerPattern,
            context_lines: 25,
            max_sample_lines: 5,
            max_line_length: 200,
            anomaly_base_severity: Severity::Low,
            strip_timestamps: false,
            trace_category: "Exceptions".to_string(),
            anomaly_category: "Anomaly".to_string(),
        }
    }
}

impl ScanConfig {
    /// Defaults with environment overrides applied.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Read a JSON or YAML config file; missing keys keep their defaults.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
        if is_yaml {
            Ok(serde_yaml::from_str(&source)?)
        } else {
            Ok(serde_json::from_str(&source)?)
        }
    }

    /// Apply `LOGSCAN_*` environment variables. Unparsable values are ignored with a warning.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(value) = lookup(ENV_AGGREGATION) {
            match value.parse() {
                Ok(mode) => self.aggregation = mode,
                Err(e) => warn!(variable = ENV_AGGREGATION, error = %e, "Ignoring override"),
            }
        }
        if let Some(value) = lookup(ENV_CONTEXT_LINES) {
            match value.trim().parse() {
                Ok(lines) => self.context_lines = lines,
                Err(e) => warn!(variable = ENV_CONTEXT_LINES, error = %e, "Ignoring override"),
            }
        }
        if let Some(value) = lookup(ENV_STRIP_TIMESTAMPS) {
            self.strip_timestamps = value.eq_ignore_ascii_case("true") || value == "1";
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_scan_config_default() {
        let config = ScanConfig::default();
        assert_eq!(config.context_lines, 25);
        assert_eq!(config.aggregation, AggregationMode::PerPattern);
        assert_eq!(config.trace_category, "Exceptions");
        assert!(!config.strip_timestamps);
    }

    #[test]
    fn test_aggregation_mode_parse() {
        assert_eq!(
            "per-category".parse::<AggregationMode>().unwrap(),
            AggregationMode::PerCategory
        );
        assert_eq!(
            "PER_PATTERN".parse::<AggregationMode>().unwrap(),
            AggregationMode::PerPattern
        );
        assert!("sometimes".parse::<AggregationMode>().is_err());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_AGGREGATION, "per-category"),
            (ENV_CONTEXT_LINES, "not-a-number"),
            (ENV_STRIP_TIMESTAMPS, "1"),
        ]);
        let config =
            ScanConfig::default().with_overrides(|key| env.get(key).map(|v| (*v).to_string()));
        assert_eq!(config.aggregation, AggregationMode::PerCategory);
        assert_eq!(config.context_lines, 25);
        assert!(config.strip_timestamps);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: ScanConfig =
            serde_json::from_str(r#"{"aggregation": "per-category", "context_lines": 10}"#)
                .unwrap();
        assert_eq!(config.aggregation, AggregationMode::PerCategory);
        assert_eq!(config.context_lines, 10);
        assert_eq!(config.max_sample_lines, 5);
    }
}
