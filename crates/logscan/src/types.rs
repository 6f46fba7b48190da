//! Core types shared by every scanner.
//!
//! - [`Severity`] is the 1-4 ranking used on patterns and issues (1 is most critical)
//! - [`LogRecord`] is the read-only log snapshot for one pod/container
//! - [`WorkloadRef`] names the workload whose logs are scanned
//! - [`ScanResult`] is the per-task output consumed by the health scorer

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, ScanError};
use crate::escalate::most_severe;
use crate::issues::Issue;

/// Issue severity. Lower numbers are more critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Severity {
    /// Immediate action required
    Critical = 1,
    /// Needs attention soon
    High = 2,
    /// Worth investigating
    Medium = 3,
    /// Informational
    Low = 4,
}

impl Severity {
    /// Numeric level (1-4).
    #[must_use]
    pub const fn level(self) -> u8 {
        self as u8
    }

    /// Get display name for this severity.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "Critical",
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }

    /// Whether this severity fails the health gate.
    #[must_use]
    pub const fn is_critical_or_high(self) -> bool {
        matches!(self, Self::Critical | Self::High)
    }
}

impl TryFrom<u8> for Severity {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Critical),
            2 => Ok(Self::High),
            3 => Ok(Self::Medium),
            4 => Ok(Self::Low),
            other => Err(format!("severity must be between 1 and 4, got {other}")),
        }
    }
}

impl From<Severity> for u8 {
    fn from(severity: Severity) -> Self {
        severity.level()
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.level())
    }
}

/// Classification bucket for patterns and issues (e.g. `Connection`, `Exceptions`).
///
/// Category names compare case-insensitively via [`Category::is`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Category(String);

impl Category {
    /// Category assigned to stack traces that no pattern classifies.
    pub const UNKNOWN: &'static str = "Unknown";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn unknown() -> Self {
        Self::new(Self::UNKNOWN)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison against a category name.
    #[must_use]
    pub fn is(&self, name: &str) -> bool {
        self.0.eq_ignore_ascii_case(name)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Category {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// The workload whose containers are scanned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadRef {
    /// Workload kind, e.g. `Deployment` or `StatefulSet`
    pub kind: String,
    /// Workload name
    pub name: String,
    /// Namespace the workload lives in
    pub namespace: String,
}

impl WorkloadRef {
    pub fn new(
        kind: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// Substitute `{WORKLOAD_TYPE}`, `{WORKLOAD_NAME}` and `{NAMESPACE}` in a template.
    #[must_use]
    pub fn render(&self, template: &str) -> String {
        template
            .replace("{WORKLOAD_TYPE}", &self.kind)
            .replace("{WORKLOAD_NAME}", &self.name)
            .replace("{NAMESPACE}", &self.namespace)
    }
}

impl fmt::Display for WorkloadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} `{}` in namespace `{}`", self.kind, self.name, self.namespace)
    }
}

/// Log snapshot for one pod/container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub pod: String,
    pub container: String,
    /// Current log text; `None` when the log could not be retrieved
    pub current: Option<String>,
    /// Log text of the previous (crashed) container instance
    pub previous: Option<String>,
}

impl LogRecord {
    pub fn new(
        pod: impl Into<String>,
        container: impl Into<String>,
        current: impl Into<String>,
    ) -> Self {
        Self {
            pod: pod.into(),
            container: container.into(),
            current: Some(current.into()),
            previous: None,
        }
    }

    /// A record whose log could not be retrieved.
    pub fn missing(pod: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            pod: pod.into(),
            container: container.into(),
            current: None,
            previous: None,
        }
    }

    #[must_use]
    pub fn with_previous(mut self, previous: impl Into<String>) -> Self {
        self.previous = Some(previous.into());
        self
    }

    /// Whether a previous container instance left any log text.
    #[must_use]
    pub fn has_previous_text(&self) -> bool {
        self.previous.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Current text followed by previous text.
    #[must_use]
    pub fn raw_text(&self) -> String {
        let mut text = self.current.clone().unwrap_or_default();
        if let Some(previous) = self.previous.as_deref().filter(|t| !t.is_empty()) {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(previous);
        }
        text
    }

    /// `pod/container` label used in issue details.
    #[must_use]
    pub fn source(&self) -> String {
        format!("{}/{}", self.pod, self.container)
    }

    /// Lines of the current log followed by lines of the previous log.
    ///
    /// Fails with [`ScanError::MissingLog`] when neither text exists.
    pub fn lines(&self) -> Result<impl Iterator<Item = &str> + '_> {
        if self.current.is_none() && self.previous.is_none() {
            return Err(ScanError::MissingLog {
                pod: self.pod.clone(),
                container: self.container.clone(),
            });
        }
        Ok(self
            .current
            .iter()
            .chain(self.previous.iter())
            .flat_map(|text| text.lines()))
    }
}

/// Output of one scan task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    /// Task label (category name)
    pub task: String,
    /// One-line human readable summary
    pub summary: String,
    /// Issues found, most severe first
    pub issues: Vec<Issue>,
}

impl ScanResult {
    /// A result with no issues.
    pub fn empty(task: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            summary: summary.into(),
            issues: Vec::new(),
        }
    }

    /// Build a result, ordering issues by severity (stable) and writing the summary.
    pub fn from_issues(task: impl Into<String>, workload: &WorkloadRef, mut issues: Vec<Issue>) -> Self {
        let task = task.into();
        issues.sort_by_key(|issue| issue.severity);
        let summary = match issues.first() {
            None => format!("No {task} issues found for {workload}."),
            Some(worst) => format!(
                "Found {} {task} issue(s) for {workload}; most severe: {}.",
                issues.len(),
                worst.severity
            ),
        };
        Self {
            task,
            summary,
            issues,
        }
    }

    #[must_use]
    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }

    /// Most critical severity among the issues.
    #[must_use]
    pub fn worst_severity(&self) -> Option<Severity> {
        most_severe(self.issues.iter().map(|issue| issue.severity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical < Severity::High);
        assert!(Severity::Medium < Severity::Low);
        assert_eq!(
            [Severity::Low, Severity::High, Severity::Medium].iter().min(),
            Some(&Severity::High)
        );
    }

    #[test]
    fn test_severity_serde_as_integer() {
        let json = serde_json::to_string(&Severity::High).unwrap();
        assert_eq!(json, "2");
        let parsed: Severity = serde_json::from_str("4").unwrap();
        assert_eq!(parsed, Severity::Low);
        assert!(serde_json::from_str::<Severity>("5").is_err());
        assert!(serde_json::from_str::<Severity>("0").is_err());
    }

    #[test]
    fn test_workload_render_placeholders() {
        let workload = WorkloadRef::new("Deployment", "checkout", "shop");
        assert_eq!(
            workload.render("kubectl rollout restart {WORKLOAD_TYPE}/{WORKLOAD_NAME} -n {NAMESPACE}"),
            "kubectl rollout restart Deployment/checkout -n shop"
        );
    }

    #[test]
    fn test_log_record_lines_chain_previous() {
        let record = LogRecord::new("pod-a", "app", "one\ntwo").with_previous("three");
        let lines: Vec<&str> = record.lines().unwrap().collect();
        assert_eq!(lines, vec!["one", "two", "three"]);
        assert!(record.has_previous_text());
        assert_eq!(record.raw_text(), "one\ntwo\nthree");
    }

    #[test]
    fn test_missing_log_record() {
        let record = LogRecord::missing("pod-a", "app");
        assert!(matches!(
            record.lines().err(),
            Some(ScanError::MissingLog { .. })
        ));
        assert!(!record.has_previous_text());
    }

    #[test]
    fn test_category_case_insensitive() {
        let category = Category::new("Connection");
        assert!(category.is("connection"));
        assert!(!category.is("Timeout"));
    }
}
