//! Plain-text rendering of a scan run.

use crate::types::{ScanResult, WorkloadRef};

/// Format scan results as a human-readable report.
pub fn format_report_text(workload: &WorkloadRef, results: &[ScanResult], health: f64) -> String {
    use std::fmt::Write;

    let mut output = String::new();

    writeln!(output, "=== Log Scan Report ===").unwrap();
    writeln!(output, "Workload: {workload}").unwrap();
    writeln!(
        output,
        "Tasks: {}",
        results
            .iter()
            .map(|r| r.task.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    )
    .unwrap();
    writeln!(output).unwrap();

    for result in results {
        writeln!(output, "[{}] {}", result.task, result.summary).unwrap();
        for issue in &result.issues {
            writeln!(
                output,
                "  - {} | {} | {} occurrence(s)",
                issue.severity, issue.title, issue.occurrences
            )
            .unwrap();
            if let Some(file) = &issue.source_file {
                writeln!(output, "      Source: {file}").unwrap();
            }
            for (i, step) in issue.next_steps.iter().enumerate() {
                writeln!(output, "      [{}] {}", i + 1, step).unwrap();
            }
        }
        writeln!(output).unwrap();
    }

    if health < 1.0 {
        writeln!(output, "⚠️  Health score: {health:.2}").unwrap();
    } else {
        writeln!(output, "✓ Health score: {health:.2}").unwrap();
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issues::IssueDraft;
    use crate::types::{Category, Severity};

    #[test]
    fn test_report_lists_issues_and_health() {
        let workload = WorkloadRef::new("Deployment", "api", "prod");
        let mut draft = IssueDraft::new("Connection refused detected", Category::new("Connection"));
        draft
            .contribute(Severity::High)
            .affected("pod-a/app")
            .next_step("Check the database service");
        let results = vec![
            ScanResult::from_issues("Connection", &workload, vec![draft.build()]),
            ScanResult::from_issues("Timeout", &workload, Vec::new()),
        ];

        let text = format_report_text(&workload, &results, 0.5);
        assert!(text.contains("Workload: Deployment `api` in namespace `prod`"));
        assert!(text.contains("Tasks: Connection, Timeout"));
        assert!(text.contains("High (2) | Connection refused detected | 1 occurrence(s)"));
        assert!(text.contains("[1] Check the database service"));
        assert!(text.contains("[Timeout] No Timeout issues found"));
        assert!(text.contains("Health score: 0.50"));
    }
}
