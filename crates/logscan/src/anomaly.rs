//! Log repetition anomaly detector.
//!
//! Counts identical lines per pod/container (current and previous log
//! together). Any line seen more than once becomes an [`AnomalyRecord`] whose
//! severity depends only on the repetition count. The pattern catalog is not
//! involved.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::config::ScanConfig;
use crate::error::Result;
use crate::escalate::escalate;
use crate::issues::IssueBuilder;
use crate::timestamp::strip_timestamp;
use crate::types::{LogRecord, ScanResult, Severity, WorkloadRef};

/// A line repeated within one container log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub pod: String,
    pub container: String,
    pub message: String,
    pub count: usize,
    pub severity: Severity,
}

impl AnomalyRecord {
    /// `pod/container` label.
    #[must_use]
    pub fn source(&self) -> String {
        format!("{}/{}", self.pod, self.container)
    }
}

/// Frequency-based scanner.
#[derive(Debug, Clone, Copy)]
pub struct AnomalyDetector<'a> {
    config: &'a ScanConfig,
}

impl<'a> AnomalyDetector<'a> {
    pub fn new(config: &'a ScanConfig) -> Self {
        Self { config }
    }

    /// Repeated lines of one record, most frequent first (ties by message).
    pub fn detect_record(&self, record: &LogRecord) -> Result<Vec<AnomalyRecord>> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for line in record.lines()? {
            let line = if self.config.strip_timestamps {
                strip_timestamp(line)
            } else {
                line
            };
            if line.trim().is_empty() {
                continue;
            }
            *counts.entry(line).or_default() += 1;
        }

        let mut anomalies: Vec<AnomalyRecord> = counts
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(message, count)| AnomalyRecord {
                pod: record.pod.clone(),
                container: record.container.clone(),
                message: message.to_string(),
                count,
                severity: escalate(self.config.anomaly_base_severity, count),
            })
            .collect();
        // BTreeMap iteration already orders by message; the stable sort keeps that for ties.
        anomalies.sort_by(|a, b| b.count.cmp(&a.count));

        debug!(
            pod = %record.pod,
            container = %record.container,
            anomalies = anomalies.len(),
            "Counted repeated lines"
        );
        Ok(anomalies)
    }

    /// Repeated lines of every record, in record order. Records without logs are skipped.
    #[must_use]
    pub fn detect(&self, records: &[LogRecord]) -> Vec<AnomalyRecord> {
        let mut anomalies = Vec::new();
        for record in records {
            match self.detect_record(record) {
                Ok(found) => anomalies.extend(found),
                Err(e) => {
                    warn!(pod = %record.pod, container = %record.container, error = %e, "Skipping container");
                }
            }
        }
        anomalies
    }

    /// Detect repeated lines and build one issue per anomaly.
    #[must_use]
    pub fn scan(&self, workload: &WorkloadRef, records: &[LogRecord]) -> ScanResult {
        info!(containers = records.len(), "Detecting repeated log lines");
        let builder = IssueBuilder::new(workload, self.config);
        let issues = self
            .detect(records)
            .iter()
            .map(|anomaly| builder.anomaly_issue(anomaly))
            .collect::<Vec<_>>();
        ScanResult::from_issues(self.config.anomaly_category.as_str(), workload, issues)
    }
}
