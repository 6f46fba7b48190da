//! Scan task routing.
//!
//! A requested category name becomes a [`ScanTask`]: the configured trace
//! category goes to the stack trace extractor, the configured anomaly
//! category to the anomaly detector, everything else to the category scanner.

use tracing::{info, warn};

use crate::anomaly::AnomalyDetector;
use crate::catalog::PatternCatalog;
use crate::config::{ScanConfig, DEFAULT_CATEGORIES};
use crate::error::{ConfigError, ScanError};
use crate::scanner::CategoryScanner;
use crate::trace::StackTraceExtractor;
use crate::types::{LogRecord, ScanResult, WorkloadRef};

/// One unit of scanning work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanTask {
    /// Pattern scan of one catalog category
    Category(String),
    /// Stack trace extraction, classified against the trace category
    StackTraces,
    /// Repeated line detection
    Anomalies,
}

impl ScanTask {
    /// Route a category name to its task.
    #[must_use]
    pub fn for_category(name: &str, config: &ScanConfig) -> Self {
        if name.eq_ignore_ascii_case(&config.trace_category) {
            Self::StackTraces
        } else if name.eq_ignore_ascii_case(&config.anomaly_category) {
            Self::Anomalies
        } else {
            Self::Category(name.to_string())
        }
    }

    /// Task label used in results and artifact names.
    #[must_use]
    pub fn label(&self, config: &ScanConfig) -> String {
        match self {
            Self::Category(name) => name.clone(),
            Self::StackTraces => config.trace_category.clone(),
            Self::Anomalies => config.anomaly_category.clone(),
        }
    }

    /// Whether the task needs the pattern catalog.
    #[must_use]
    pub fn needs_catalog(&self) -> bool {
        !matches!(self, Self::Anomalies)
    }
}

/// Runs scan tasks for one workload.
#[derive(Debug)]
pub struct ScanRunner {
    catalog: Result<PatternCatalog, ConfigError>,
    config: ScanConfig,
    workload: WorkloadRef,
}

impl ScanRunner {
    /// Create a runner. A failed catalog load is kept and reported per task.
    pub fn new(
        catalog: Result<PatternCatalog, ConfigError>,
        config: ScanConfig,
        workload: WorkloadRef,
    ) -> Self {
        if let Err(e) = &catalog {
            warn!(error = %e, "Pattern catalog unavailable; only anomaly detection will run");
        }
        Self {
            catalog,
            config,
            workload,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// The catalog load failure, if any.
    #[must_use]
    pub fn catalog_error(&self) -> Option<&ConfigError> {
        self.catalog.as_ref().err()
    }

    /// Categories scanned when none are requested: every catalog category in
    /// catalog order, then the anomaly category. Without a catalog this falls
    /// back to [`DEFAULT_CATEGORIES`].
    #[must_use]
    pub fn default_categories(&self) -> Vec<String> {
        let Ok(catalog) = &self.catalog else {
            return DEFAULT_CATEGORIES.iter().map(|c| (*c).to_string()).collect();
        };
        let mut categories: Vec<String> = catalog
            .categories()
            .iter()
            .map(|c| c.as_str().to_string())
            .collect();
        let anomaly = &self.config.anomaly_category;
        if !categories.iter().any(|c| c.eq_ignore_ascii_case(anomaly)) {
            categories.push(anomaly.clone());
        }
        categories
    }

    /// Run one task over `records`.
    #[must_use]
    pub fn run(&self, task: &ScanTask, records: &[LogRecord]) -> ScanResult {
        let label = task.label(&self.config);

        if records.is_empty() {
            let e = ScanError::EmptyInput {
                workload: self.workload.to_string(),
            };
            warn!(task = %label, error = %e, "Nothing to scan");
            let summary = format!("No {label} issues found: {e}.");
            return ScanResult::empty(label, summary);
        }

        let result = match task {
            ScanTask::Anomalies => {
                info!(task = %label, workload = %self.workload, "Running scan task");
                AnomalyDetector::new(&self.config).scan(&self.workload, records)
            }
            ScanTask::Category(_) | ScanTask::StackTraces => {
                let catalog = match &self.catalog {
                    Ok(catalog) => catalog,
                    Err(e) => {
                        warn!(task = %label, error = %e, "Skipping task");
                        return ScanResult::empty(label, format!("Pattern catalog unavailable: {e}"));
                    }
                };
                info!(task = %label, workload = %self.workload, "Running scan task");
                match task {
                    ScanTask::Category(name) => {
                        CategoryScanner::new(catalog, &self.config).scan(name, &self.workload, records)
                    }
                    _ => StackTraceExtractor::new(catalog, &self.config).scan(&self.workload, records),
                }
            }
        };
        info!(task = %label, issues = result.issues.len(), "Scan task complete");
        result
    }

    /// Run every named category, routed through [`ScanTask::for_category`], in order.
    #[must_use]
    pub fn run_all<S: AsRef<str>>(&self, categories: &[S], records: &[LogRecord]) -> Vec<ScanResult> {
        categories
            .iter()
            .map(|name| ScanTask::for_category(name.as_ref(), &self.config))
            .map(|task| self.run(&task, records))
            .collect()
    }
}
