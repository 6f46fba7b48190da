//! Workload log scanner.
//!
//! Classifies the container logs of one workload into severity-ranked
//! [`Issue`]s and reduces the per-task results to a health score.
//!
//! # Usage
//!
//! ```no_run
//! use logscan::{health, LogRecord, PatternCatalog, ScanConfig, ScanRunner, WorkloadRef};
//!
//! let runner = ScanRunner::new(
//!     PatternCatalog::builtin(),
//!     ScanConfig::from_env(),
//!     WorkloadRef::new("Deployment", "api", "prod"),
//! );
//! let records = vec![LogRecord::new("api-7d9f-abcde", "app", "dial tcp: connection refused")];
//! let results = runner.run_all(&["Connection", "Exceptions", "Anomaly"], &records);
//! println!("health: {}", health::score_all(&results));
//! ```
//!
//! # Tasks
//!
//! - [`CategoryScanner`] matches lines against the catalog patterns of one category
//! - [`StackTraceExtractor`] captures multi-line stack traces and classifies them
//! - [`AnomalyDetector`] reports lines repeated within one container log
//!
//! Severity escalation by occurrence count lives in [`escalate`]; issue
//! assembly and next-step deduplication in [`issues`].

pub mod anomaly;
pub mod artifacts;
pub mod catalog;
pub mod config;
pub mod error;
pub mod escalate;
pub mod health;
pub mod issues;
pub mod report;
pub mod runner;
pub mod scanner;
pub mod snapshot;
pub mod timestamp;
pub mod trace;
pub mod types;

pub use anomaly::{AnomalyDetector, AnomalyRecord};
pub use artifacts::RunArtifacts;
pub use catalog::{CatalogFormat, LogPattern, PatternCatalog, PatternId};
pub use config::{AggregationMode, ScanConfig, DEFAULT_CATEGORIES};
pub use error::{ConfigError, Result, ScanError};
pub use issues::{Issue, IssueBuilder};
pub use report::format_report_text;
pub use runner::{ScanRunner, ScanTask};
pub use scanner::{CategoryScanner, Match, PatternHits};
pub use snapshot::LogSnapshot;
pub use trace::{ClosedTrace, SignatureSet, StackTraceExtractor};
pub use types::{Category, LogRecord, ScanResult, Severity, WorkloadRef};
