//! Occurrence-based severity escalation.

use crate::types::Severity;

/// Occurrences at which an issue becomes at least [`Severity::High`].
pub const HIGH_OCCURRENCES: usize = 5;

/// Occurrences at which an issue becomes [`Severity::Critical`].
pub const CRITICAL_OCCURRENCES: usize = 10;

/// Escalate `base` according to how often it occurred.
///
/// - `occurrences >= 10` -> Critical
/// - `5 <= occurrences < 10` -> High (or `base` if already Critical)
/// - otherwise `base`
///
/// The result is never less critical than `base`.
#[must_use]
pub fn escalate(base: Severity, occurrences: usize) -> Severity {
    let threshold = if occurrences >= CRITICAL_OCCURRENCES {
        Severity::Critical
    } else if occurrences >= HIGH_OCCURRENCES {
        Severity::High
    } else {
        return base;
    };
    base.min(threshold)
}

/// Remediation sentence appended to next steps when escalation raised the severity.
#[must_use]
pub fn escalation_note(base: Severity, occurrences: usize, source_noun: &str) -> Option<String> {
    let escalated = escalate(base, occurrences);
    (escalated < base).then(|| {
        format!(
            "Seen in {occurrences} {source_noun}; severity raised from {} to {}. \
             Treat this as a systemic problem rather than a single-instance fault.",
            base.as_str(),
            escalated.as_str()
        )
    })
}

/// Most critical severity of a set of contributors.
pub fn most_severe<I>(severities: I) -> Option<Severity>
where
    I: IntoIterator<Item = Severity>,
{
    severities.into_iter().min()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Severity; 4] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
    ];

    #[test]
    fn test_escalate_thresholds() {
        for base in ALL {
            for n in 0..5 {
                assert_eq!(escalate(base, n), base, "n={n}");
            }
            for n in 5..10 {
                assert_eq!(escalate(base, n), base.min(Severity::High), "n={n}");
            }
            for n in [10, 11, 50, 10_000] {
                assert_eq!(escalate(base, n), Severity::Critical, "n={n}");
            }
        }
    }

    #[test]
    fn test_escalate_never_relaxes() {
        for base in ALL {
            for n in 0..30 {
                assert!(escalate(base, n) <= base);
            }
        }
    }

    #[test]
    fn test_escalate_monotonic_in_count() {
        for base in ALL {
            let mut previous = escalate(base, 0);
            for n in 1..30 {
                let current = escalate(base, n);
                assert!(current <= previous);
                previous = current;
            }
        }
    }

    #[test]
    fn test_escalation_note() {
        assert!(escalation_note(Severity::Medium, 2, "containers").is_none());
        assert!(escalation_note(Severity::Critical, 12, "containers").is_none());
        let note = escalation_note(Severity::Low, 6, "containers").unwrap();
        assert!(note.contains("Seen in 6 containers"));
        assert!(note.contains("from Low to High"));
    }

    #[test]
    fn test_most_severe() {
        assert_eq!(
            most_severe([Severity::Low, Severity::Critical, Severity::Medium]),
            Some(Severity::Critical)
        );
        assert_eq!(most_severe(Vec::new()), None);
    }
}
