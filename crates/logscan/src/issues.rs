//! Issue records and the builder that assembles them.
//!
//! [`IssueDraft`] accumulates contributions (severities, details, next steps)
//! and enforces the issue invariants: severity only moves toward Critical and
//! next steps stay unique in insertion order. [`IssueBuilder`] turns pattern
//! matches, closed stack traces and anomaly records into drafts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Write as _;

use crate::anomaly::AnomalyRecord;
use crate::catalog::LogPattern;
use crate::config::ScanConfig;
use crate::escalate::{escalate, escalation_note, most_severe};
use crate::scanner::PatternHits;
use crate::trace::ClosedTrace;
use crate::types::{Category, Severity, WorkloadRef};

/// A structured finding surfaced to an operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub title: String,
    pub details: String,
    pub severity: Severity,
    /// Remediation steps, unique and in insertion order
    pub next_steps: Vec<String>,
    /// Distinct sources (or repetitions, for anomalies) behind this issue
    pub occurrences: usize,
    pub category: Category,
    /// `pod/container` sources, in first-seen order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affected: Vec<String>,
    /// First `file:line` reference of a stack trace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
}

impl Issue {
    /// Raise severity to `severity` if it is more critical. Never relaxes.
    pub fn escalate_to(&mut self, severity: Severity) {
        self.severity = self.severity.min(severity);
    }

    /// Append a next step unless an identical one exists. Returns whether it was added.
    pub fn add_next_step(&mut self, step: impl Into<String>) -> bool {
        push_unique(&mut self.next_steps, step.into())
    }

    /// Whether any affected source belongs to `pod`.
    #[must_use]
    pub fn references_pod(&self, pod: &str) -> bool {
        self.affected
            .iter()
            .any(|source| source.split_once('/').is_some_and(|(p, _)| p == pod))
    }
}

fn push_unique(steps: &mut Vec<String>, step: String) -> bool {
    let step = step.trim().to_string();
    if step.is_empty() || steps.contains(&step) {
        return false;
    }
    steps.push(step);
    true
}

/// Accumulator for one issue.
#[derive(Debug, Clone)]
pub struct IssueDraft {
    title: String,
    category: Category,
    severity: Option<Severity>,
    details: Vec<String>,
    next_steps: Vec<String>,
    affected: Vec<String>,
    occurrences: Option<usize>,
    source_file: Option<String>,
}

impl IssueDraft {
    pub fn new(title: impl Into<String>, category: Category) -> Self {
        Self {
            title: title.into(),
            category,
            severity: None,
            details: Vec::new(),
            next_steps: Vec::new(),
            affected: Vec::new(),
            occurrences: None,
            source_file: None,
        }
    }

    /// Add a contributing severity; the draft keeps the most critical one.
    pub fn contribute(&mut self, severity: Severity) -> &mut Self {
        self.severity = Some(self.severity.map_or(severity, |s| s.min(severity)));
        self
    }

    pub fn detail(&mut self, line: impl Into<String>) -> &mut Self {
        self.details.push(line.into());
        self
    }

    pub fn next_step(&mut self, step: impl Into<String>) -> &mut Self {
        push_unique(&mut self.next_steps, step.into());
        self
    }

    pub fn affected(&mut self, source: impl Into<String>) -> &mut Self {
        let source = source.into();
        if !self.affected.contains(&source) {
            self.affected.push(source);
        }
        self
    }

    /// Fix the occurrence count; defaults to the number of affected sources.
    pub fn occurrences(&mut self, occurrences: usize) -> &mut Self {
        self.occurrences = Some(occurrences);
        self
    }

    pub fn source_file(&mut self, source_file: Option<String>) -> &mut Self {
        self.source_file = source_file;
        self
    }

    /// Finish the issue. A draft without contributions is Medium.
    #[must_use]
    pub fn build(self) -> Issue {
        Issue {
            title: self.title,
            details: self.details.join("\n"),
            severity: self.severity.unwrap_or(Severity::Medium),
            next_steps: self.next_steps,
            occurrences: self.occurrences.unwrap_or(self.affected.len()),
            category: self.category,
            affected: self.affected,
            source_file: self.source_file,
        }
    }
}

/// Truncate a sample line to `max` characters, marking the cut with `...`.
#[must_use]
pub fn truncate_line(line: &str, max: usize) -> String {
    if line.chars().count() <= max {
        return line.to_string();
    }
    let mut truncated: String = line.chars().take(max).collect();
    truncated.push_str("...");
    truncated
}

/// Turns scanner output into issues for one workload.
#[derive(Debug, Clone, Copy)]
pub struct IssueBuilder<'a> {
    workload: &'a WorkloadRef,
    config: &'a ScanConfig,
}

impl<'a> IssueBuilder<'a> {
    pub fn new(workload: &'a WorkloadRef, config: &'a ScanConfig) -> Self {
        Self { workload, config }
    }

    /// One issue for a single matched pattern.
    #[must_use]
    pub fn pattern_issue(&self, pattern: &LogPattern, hits: &PatternHits) -> Issue {
        let mut draft = IssueDraft::new(
            format!(
                "{} detected in {} `{}`",
                pattern.label(),
                self.workload.kind,
                self.workload.name
            ),
            pattern.category.clone(),
        );
        self.contribute_pattern(&mut draft, pattern, hits, true);
        draft.occurrences(hits.occurrences());
        draft.build()
    }

    /// One issue merging every matched pattern of a category.
    ///
    /// Returns `None` when nothing matched.
    #[must_use]
    pub fn category_issue(
        &self,
        category: &str,
        contributors: &[(&LogPattern, &PatternHits)],
    ) -> Option<Issue> {
        let (first, _) = contributors.first()?;
        let mut draft = IssueDraft::new(
            format!(
                "{} issues detected in {} `{}`",
                first.category, self.workload.kind, self.workload.name
            ),
            first.category.clone(),
        );
        let mut sources: BTreeSet<String> = BTreeSet::new();
        for (pattern, hits) in contributors {
            debug_assert!(pattern.category.is(category));
            draft.detail(format!("[{}]", pattern.label()));
            self.contribute_pattern(&mut draft, pattern, hits, false);
            sources.extend(hits.sources());
        }

        // Escalate on the merged source count, not per pattern.
        let base = most_severe(contributors.iter().map(|(p, _)| p.base_severity))?;
        draft
            .contribute(escalate(base, sources.len()))
            .occurrences(sources.len());
        if let Some(note) = escalation_note(base, sources.len(), "containers") {
            draft.next_step(note);
        }
        Some(draft.build())
    }

    fn contribute_pattern(
        &self,
        draft: &mut IssueDraft,
        pattern: &LogPattern,
        hits: &PatternHits,
        with_note: bool,
    ) {
        let occurrences = hits.occurrences();
        draft
            .contribute(escalate(pattern.base_severity, occurrences))
            .detail(format!(
                "Pattern `{}` matched {} line(s) in {} container(s):",
                pattern.regex.as_str(),
                hits.line_count(),
                occurrences
            ));

        for m in &hits.matches {
            draft.affected(m.source());
            draft.detail(format!("  {}:", m.source()));
            for line in m.matched_lines.iter().take(self.config.max_sample_lines) {
                draft.detail(format!(
                    "    {}",
                    truncate_line(line, self.config.max_line_length)
                ));
            }
            let hidden = m.matched_lines.len().saturating_sub(self.config.max_sample_lines);
            if hidden > 0 {
                draft.detail(format!("    ... {hidden} more"));
            }
        }

        if let Some(step) = pattern.render_next_step(self.workload) {
            draft.next_step(step);
        }
        if !with_note {
            return;
        }
        if let Some(note) = escalation_note(pattern.base_severity, occurrences, "containers") {
            draft.next_step(note);
        }
    }

    /// One issue for a closed stack trace, classified by `pattern` when one matched.
    ///
    /// `occurrences` is the number of distinct pod/container pairs in which a
    /// trace with the same classification was closed; severity escalates on it.
    #[must_use]
    pub fn trace_issue(
        &self,
        trace: &ClosedTrace,
        pattern: Option<&LogPattern>,
        occurrences: usize,
    ) -> Issue {
        let source = trace.source();
        let headline = truncate_line(trace.headline().trim(), self.config.max_line_length);
        let category = pattern.map_or_else(Category::unknown, |p| p.category.clone());

        let mut draft = IssueDraft::new(format!("Stack trace in {source}: {headline}"), category);
        let occurrences = occurrences.max(1);
        draft.affected(source.clone()).occurrences(occurrences);
        draft.source_file(trace.source_file.clone());

        let base = match pattern {
            Some(pattern) => {
                draft.detail(format!("Classified as `{}`", pattern.label()));
                if let Some(step) = pattern.render_next_step(self.workload) {
                    draft.next_step(step);
                }
                pattern.base_severity
            }
            None => {
                draft.detail("No catalog pattern classified this trace");
                Severity::Medium
            }
        };
        draft.contribute(escalate(base, occurrences));
        if occurrences > 1 {
            draft.detail(format!(
                "The same trace was closed in {occurrences} container(s)"
            ));
        }

        let mut location = String::new();
        if let Some(file) = &trace.source_file {
            write!(location, " starting at `{file}`").unwrap();
        }
        draft.next_step(format!(
            "Review the stack trace from `{source}`{location} and fix the failing code path in {}",
            self.workload
        ));
        if let Some(note) = escalation_note(base, occurrences, "containers") {
            draft.next_step(note);
        }

        if trace.context_len > 0 {
            draft.detail(format!("Context ({} line(s) before the trace):", trace.context_len));
        }
        for (i, line) in trace.lines.iter().enumerate() {
            if i == trace.context_len {
                draft.detail("Trace:");
            }
            draft.detail(format!(
                "  {}",
                truncate_line(line, self.config.max_line_length)
            ));
        }
        draft.build()
    }

    /// One issue for a repeated log line.
    #[must_use]
    pub fn anomaly_issue(&self, record: &AnomalyRecord) -> Issue {
        let source = record.source();
        let message = truncate_line(&record.message, self.config.max_line_length);
        let mut draft = IssueDraft::new(
            format!("Repeated log line in {source} ({}x)", record.count),
            Category::new(self.config.anomaly_category.as_str()),
        );
        draft
            .contribute(record.severity)
            .affected(source.clone())
            .occurrences(record.count)
            .detail(format!("`{message}` appeared {} times in {source}", record.count))
            .next_step(format!(
                "Investigate why this line repeats in {}; repeated lines usually point to retry or crash loops",
                self.workload
            ));
        if let Some(note) = escalation_note(self.config.anomaly_base_severity, record.count, "repetitions") {
            draft.next_step(note);
        }
        draft.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draft_keeps_most_severe() {
        let mut draft = IssueDraft::new("t", Category::new("X"));
        draft
            .contribute(Severity::Low)
            .contribute(Severity::High)
            .contribute(Severity::Medium);
        assert_eq!(draft.build().severity, Severity::High);
    }

    #[test]
    fn test_draft_dedups_next_steps_in_order() {
        let mut draft = IssueDraft::new("t", Category::new("X"));
        draft
            .next_step("restart")
            .next_step("check dns")
            .next_step("restart")
            .next_step("  check dns  ")
            .next_step("");
        let issue = draft.build();
        assert_eq!(issue.next_steps, vec!["restart", "check dns"]);
    }

    #[test]
    fn test_occurrences_default_to_affected() {
        let mut draft = IssueDraft::new("t", Category::new("X"));
        draft.affected("a/app").affected("b/app").affected("a/app");
        let issue = draft.build();
        assert_eq!(issue.occurrences, 2);
        assert!(issue.references_pod("a"));
        assert!(!issue.references_pod("c"));
    }

    #[test]
    fn test_issue_escalate_never_relaxes() {
        let mut draft = IssueDraft::new("t", Category::new("X"));
        draft.contribute(Severity::High);
        let mut issue = draft.build();
        issue.escalate_to(Severity::Low);
        assert_eq!(issue.severity, Severity::High);
        issue.escalate_to(Severity::Critical);
        assert_eq!(issue.severity, Severity::Critical);
    }

    #[test]
    fn test_add_next_step_dedup() {
        let mut issue = IssueDraft::new("t", Category::new("X")).build();
        assert!(issue.add_next_step("a"));
        assert!(!issue.add_next_step("a"));
        assert_eq!(issue.next_steps.len(), 1);
    }

    #[test]
    fn test_truncate_line() {
        assert_eq!(truncate_line("short", 10), "short");
        assert_eq!(truncate_line("abcdefghij", 4), "abcd...");
        assert_eq!(truncate_line("ééééé", 2), "éé...");
    }
}
