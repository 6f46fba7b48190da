//! Category scanner.
//!
//! Matches every line of every container log against the patterns of one
//! category and aggregates the hits per pattern. Occurrences are counted in
//! distinct pod/container sources, not in raw lines.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use crate::catalog::{LogPattern, PatternCatalog, PatternId};
use crate::config::{AggregationMode, ScanConfig};
use crate::issues::{Issue, IssueBuilder};
use crate::types::{LogRecord, ScanResult, WorkloadRef};

/// Lines of one container log that matched one pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Match {
    pub pattern: PatternId,
    pub pod: String,
    pub container: String,
    pub matched_lines: Vec<String>,
}

impl Match {
    /// `pod/container` label.
    #[must_use]
    pub fn source(&self) -> String {
        format!("{}/{}", self.pod, self.container)
    }
}

/// Aggregated matches of one pattern across all containers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternHits {
    pub matches: Vec<Match>,
}

impl PatternHits {
    /// Distinct pod/container pairs with at least one matching line.
    #[must_use]
    pub fn occurrences(&self) -> usize {
        self.matches
            .iter()
            .map(|m| (m.pod.as_str(), m.container.as_str()))
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Total matched lines.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.matches.iter().map(|m| m.matched_lines.len()).sum()
    }

    /// Distinct `pod/container` labels, in first-seen order.
    #[must_use]
    pub fn sources(&self) -> Vec<String> {
        let mut sources: Vec<String> = Vec::new();
        for source in self.matches.iter().map(Match::source) {
            if !sources.contains(&source) {
                sources.push(source);
            }
        }
        sources
    }
}

/// Match one pattern against one record's lines.
///
/// Returns `None` when no line matches.
#[must_use]
pub fn match_lines<'l>(
    pattern: &LogPattern,
    record: &LogRecord,
    lines: impl IntoIterator<Item = &'l str>,
) -> Option<Match> {
    let matched_lines: Vec<String> = lines
        .into_iter()
        .filter(|line| pattern.is_match(line))
        .map(str::to_string)
        .collect();
    (!matched_lines.is_empty()).then(|| Match {
        pattern: pattern.id,
        pod: record.pod.clone(),
        container: record.container.clone(),
        matched_lines,
    })
}

/// Scanner for one category of the catalog.
#[derive(Debug, Clone, Copy)]
pub struct CategoryScanner<'a> {
    catalog: &'a PatternCatalog,
    config: &'a ScanConfig,
}

impl<'a> CategoryScanner<'a> {
    pub fn new(catalog: &'a PatternCatalog, config: &'a ScanConfig) -> Self {
        Self { catalog, config }
    }

    /// Collect matches for every pattern of `category`, keyed by pattern id.
    ///
    /// Records without any log text are skipped with a warning.
    #[must_use]
    pub fn collect(&self, category: &str, records: &[LogRecord]) -> BTreeMap<PatternId, PatternHits> {
        let patterns = self.catalog.lookup_by_category(category);
        let mut hits: BTreeMap<PatternId, PatternHits> = BTreeMap::new();

        for record in records {
            debug!(
                pod = %record.pod,
                container = %record.container,
                previous = record.has_previous_text(),
                "Scanning container"
            );
            let lines: Vec<&str> = match record.lines() {
                Ok(lines) => lines.collect(),
                Err(e) => {
                    warn!(pod = %record.pod, container = %record.container, error = %e, "Skipping container");
                    continue;
                }
            };

            for pattern in &patterns {
                if let Some(m) = match_lines(pattern, record, lines.iter().copied()) {
                    debug!(
                        pattern = %pattern.id,
                        pod = %m.pod,
                        container = %m.container,
                        lines = m.matched_lines.len(),
                        "Pattern matched"
                    );
                    hits.entry(pattern.id).or_default().matches.push(m);
                }
            }
        }

        hits
    }

    /// Scan all records for `category` and build the result.
    #[must_use]
    pub fn scan(&self, category: &str, workload: &WorkloadRef, records: &[LogRecord]) -> ScanResult {
        if self.catalog.lookup_by_category(category).is_empty() {
            warn!(category, "No patterns configured for category");
            return ScanResult::empty(
                category,
                format!("No patterns configured for category {category}; nothing scanned for {workload}."),
            );
        }

        info!(category, containers = records.len(), "Scanning category");
        let hits = self.collect(category, records);
        let issues = self.build_issues(category, workload, &hits);
        info!(category, issues = issues.len(), "Category scan complete");
        ScanResult::from_issues(category, workload, issues)
    }

    /// Turn collected hits into issues according to the aggregation mode.
    #[must_use]
    pub fn build_issues(
        &self,
        category: &str,
        workload: &WorkloadRef,
        hits: &BTreeMap<PatternId, PatternHits>,
    ) -> Vec<Issue> {
        let builder = IssueBuilder::new(workload, self.config);
        let contributors: Vec<(&LogPattern, &PatternHits)> = hits
            .iter()
            .filter(|(_, h)| !h.matches.is_empty())
            .filter_map(|(id, h)| self.catalog.get(*id).map(|p| (p, h)))
            .collect();

        match self.config.aggregation {
            AggregationMode::PerPattern => contributors
                .iter()
                .map(|(pattern, h)| builder.pattern_issue(pattern, h))
                .collect(),
            AggregationMode::PerCategory => builder
                .category_issue(category, &contributors)
                .into_iter()
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogFormat;
    use crate::types::Severity;

    const CATALOG: &str = r#"[
        {"match": "connection refused", "category": "Connection", "severity": 3,
         "next_step": "Check upstream of {WORKLOAD_TYPE} {WORKLOAD_NAME} in {NAMESPACE}"},
        {"match": "ECONNRESET", "category": "Connection", "severity": 4,
         "next_step": "Check upstream of {WORKLOAD_TYPE} {WORKLOAD_NAME} in {NAMESPACE}"},
        {"match": "timed out", "category": "Timeout", "severity": 3, "next_step": "Raise timeouts"}
    ]"#;

    fn catalog() -> PatternCatalog {
        PatternCatalog::load(CATALOG, CatalogFormat::Json).unwrap()
    }

    fn workload() -> WorkloadRef {
        WorkloadRef::new("Deployment", "api", "prod")
    }

    #[test]
    fn test_no_match_no_issue() {
        let catalog = catalog();
        let config = ScanConfig::default();
        let scanner = CategoryScanner::new(&catalog, &config);
        let records = vec![LogRecord::new("pod-a", "app", "all good\nstill good")];
        assert!(scanner.collect("Connection", &records).is_empty());
        let result = scanner.scan("Connection", &workload(), &records);
        assert!(result.issues.is_empty());
        assert!(result.summary.contains("No Connection issues found"));
    }

    #[test]
    fn test_occurrences_count_distinct_containers_not_lines() {
        let catalog = catalog();
        let config = ScanConfig::default();
        let scanner = CategoryScanner::new(&catalog, &config);
        let noisy = "Connection refused\n".repeat(40);
        let records = vec![
            LogRecord::new("pod-a", "app", noisy.clone()),
            LogRecord::new("pod-b", "app", "connection REFUSED once"),
        ];
        let result = scanner.scan("Connection", &workload(), &records);
        assert_eq!(result.issues.len(), 1);
        let issue = &result.issues[0];
        assert_eq!(issue.occurrences, 2);
        assert_eq!(issue.severity, Severity::Medium);
        assert_eq!(issue.affected, vec!["pod-a/app", "pod-b/app"]);
        assert!(issue.details.contains("... 35 more"));
    }

    #[test]
    fn test_escalation_by_container_count() {
        let catalog = catalog();
        let config = ScanConfig::default();
        let scanner = CategoryScanner::new(&catalog, &config);
        let records: Vec<LogRecord> = (0..6)
            .map(|i| LogRecord::new(format!("pod-{i}"), "app", "dial tcp: connection refused"))
            .collect();
        let result = scanner.scan("Connection", &workload(), &records);
        let issue = &result.issues[0];
        assert_eq!(issue.occurrences, 6);
        assert_eq!(issue.severity, Severity::High);
        assert_eq!(issue.next_steps.len(), 2);
        assert_eq!(issue.next_steps[0], "Check upstream of Deployment api in prod");
        assert!(issue.next_steps[1].contains("Seen in 6 containers"));
    }

    #[test]
    fn test_per_category_merges_and_dedups_steps() {
        let catalog = catalog();
        let config = ScanConfig {
            aggregation: AggregationMode::PerCategory,
            ..ScanConfig::default()
        };
        let scanner = CategoryScanner::new(&catalog, &config);
        let records = vec![
            LogRecord::new("pod-a", "app", "connection refused"),
            LogRecord::new("pod-b", "app", "read ECONNRESET"),
        ];
        let result = scanner.scan("Connection", &workload(), &records);
        assert_eq!(result.issues.len(), 1);
        let issue = &result.issues[0];
        assert_eq!(issue.occurrences, 2);
        assert_eq!(issue.severity, Severity::Medium);
        assert_eq!(issue.next_steps, vec!["Check upstream of Deployment api in prod"]);
    }

    #[test]
    fn test_per_category_escalates_on_merged_sources() {
        let catalog = PatternCatalog::load(
            r#"[
                {"match": "timed out", "category": "Timeout", "severity": 3, "next_step": "Raise timeouts"},
                {"match": "deadline exceeded", "category": "Timeout", "severity": 3, "next_step": "Raise timeouts"}
            ]"#,
            CatalogFormat::Json,
        )
        .unwrap();
        let config = ScanConfig {
            aggregation: AggregationMode::PerCategory,
            ..ScanConfig::default()
        };
        let scanner = CategoryScanner::new(&catalog, &config);
        let mut records: Vec<LogRecord> = (0..3)
            .map(|i| LogRecord::new(format!("pod-{i}"), "app", "request timed out"))
            .collect();
        records.extend((3..6).map(|i| LogRecord::new(format!("pod-{i}"), "app", "context deadline exceeded")));

        let result = scanner.scan("Timeout", &workload(), &records);
        assert_eq!(result.issues.len(), 1);
        let issue = &result.issues[0];
        assert_eq!(issue.occurrences, 6);
        assert_eq!(issue.severity, Severity::High);
        assert_eq!(issue.next_steps.len(), 2);
        assert!(issue.next_steps[1].contains("Seen in 6 containers"));
    }

    #[test]
    fn test_per_pattern_steps_are_unique() {
        let catalog = catalog();
        let config = ScanConfig::default();
        let scanner = CategoryScanner::new(&catalog, &config);
        let records = vec![LogRecord::new(
            "pod-a",
            "app",
            "connection refused\nconnection refused again",
        )];
        let result = scanner.scan("Connection", &workload(), &records);
        for issue in &result.issues {
            let unique: BTreeSet<&String> = issue.next_steps.iter().collect();
            assert_eq!(unique.len(), issue.next_steps.len());
        }
    }

    #[test]
    fn test_missing_log_is_skipped() {
        let catalog = catalog();
        let config = ScanConfig::default();
        let scanner = CategoryScanner::new(&catalog, &config);
        let records = vec![
            LogRecord::missing("pod-a", "app"),
            LogRecord::new("pod-b", "app", "request timed out"),
        ];
        let result = scanner.scan("Timeout", &workload(), &records);
        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.issues[0].affected, vec!["pod-b/app"]);
    }

    #[test]
    fn test_previous_log_is_scanned() {
        let catalog = catalog();
        let config = ScanConfig::default();
        let scanner = CategoryScanner::new(&catalog, &config);
        let records = vec![LogRecord::new("pod-a", "app", "starting").with_previous("request timed out")];
        let result = scanner.scan("Timeout", &workload(), &records);
        assert_eq!(result.issues.len(), 1);
    }

    #[test]
    fn test_unknown_category() {
        let catalog = catalog();
        let config = ScanConfig::default();
        let scanner = CategoryScanner::new(&catalog, &config);
        let records = vec![LogRecord::new("pod-a", "app", "connection refused")];
        let result = scanner.scan("Quota", &workload(), &records);
        assert!(result.issues.is_empty());
        assert!(result.summary.contains("No patterns configured"));
    }

    #[test]
    fn test_sources_are_distinct() {
        let catalog = catalog();
        let config = ScanConfig::default();
        let scanner = CategoryScanner::new(&catalog, &config);
        let records = vec![
            LogRecord::new("pod-a", "app", "connection refused"),
            LogRecord::new("pod-a", "app", "connection refused again"),
            LogRecord::new("pod-b", "app", "connection refused"),
        ];
        let hits = scanner.collect("Connection", &records);
        let refused = &hits[&PatternId(0)];
        assert_eq!(refused.matches.len(), 3);
        assert_eq!(refused.sources(), vec!["pod-a/app", "pod-b/app"]);
        assert_eq!(refused.occurrences(), 2);
    }

    #[test]
    fn test_match_serializes_pattern_id_as_index() {
        let catalog = catalog();
        let config = ScanConfig::default();
        let scanner = CategoryScanner::new(&catalog, &config);
        let records = vec![LogRecord::new("pod-a", "app", "read ECONNRESET")];
        let hits = scanner.collect("Connection", &records);
        let json = serde_json::to_value(&hits[&PatternId(1)].matches[0]).unwrap();
        assert_eq!(json["pattern"], 1);
        assert_eq!(json["pod"], "pod-a");
        assert_eq!(json["matched_lines"][0], "read ECONNRESET");
    }

    #[test]
    fn test_scan_is_idempotent() {
        let catalog = catalog();
        let config = ScanConfig::default();
        let scanner = CategoryScanner::new(&catalog, &config);
        let records = vec![
            LogRecord::new("pod-a", "app", "connection refused\nECONNRESET"),
            LogRecord::new("pod-b", "sidecar", "ECONNRESET"),
        ];
        let first = scanner.scan("Connection", &workload(), &records);
        let second = scanner.scan("Connection", &workload(), &records);
        assert_eq!(first, second);
    }
}
