//! Output comparison.
//!
//! Judges compare program output loosely: line-ending style, trailing
//! whitespace on a line, and (by default) blank lines are not significant.

use serde::{Deserialize, Serialize};

use crate::domain::Verdict;
use crate::sandbox::Execution;

/// Which differences normalization erases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationPolicy {
    /// Drop lines that are empty after trailing-whitespace removal
    pub drop_blank_lines: bool,
}

impl Default for NormalizationPolicy {
    fn default() -> Self {
        Self {
            drop_blank_lines: true,
        }
    }
}

impl NormalizationPolicy {
    /// Keep interior blank lines significant
    pub fn strict_lines() -> Self {
        Self {
            drop_blank_lines: false,
        }
    }

    /// Canonical form of `text` under this policy
    pub fn normalize(&self, text: &str) -> String {
        let unified = text.trim().replace("\r\n", "\n").replace('\r', "\n");
        unified
            .split('\n')
            .map(str::trim_end)
            .filter(|line| !self.drop_blank_lines || !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Whether two outputs are equal after normalization
    pub fn matches(&self, actual: &str, expected: &str) -> bool {
        self.normalize(actual) == self.normalize(expected)
    }
}

/// Classifies a clean execution as accepted or wrong
#[derive(Debug, Clone, Default)]
pub struct Verifier {
    policy: NormalizationPolicy,
}

impl Verifier {
    pub fn new(policy: NormalizationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> NormalizationPolicy {
        self.policy
    }

    /// Compare the execution's stdout against `expected`.
    ///
    /// A mismatch carries both strings as they were before normalization.
    pub fn verify(&self, execution: &Execution, expected: &str) -> Verdict {
        if self.policy.matches(&execution.stdout, expected) {
            Verdict::Accepted {
                time: execution.elapsed,
                peak_memory: execution.peak_memory,
            }
        } else {
            Verdict::WrongAnswer {
                expected: expected.to_string(),
                actual: execution.stdout.clone(),
                time: execution.elapsed,
                peak_memory: execution.peak_memory,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn execution(stdout: &str) -> Execution {
        Execution {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code: Some(0),
            signal: None,
            elapsed: Duration::from_millis(12),
            peak_memory: 4096,
        }
    }

    #[test]
    fn test_normalize_line_endings() {
        let policy = NormalizationPolicy::default();
        assert_eq!(policy.normalize("1\r\n2\r3\n"), "1\n2\n3");
    }

    #[test]
    fn test_normalize_trailing_whitespace() {
        let policy = NormalizationPolicy::default();
        assert_eq!(policy.normalize("  a b  \t\nc   \n\n"), "a b\nc");
    }

    #[test]
    fn test_blank_lines_dropped_by_default() {
        let policy = NormalizationPolicy::default();
        assert!(policy.matches("1\n\n\n2\n", "1\n2"));
    }

    #[test]
    fn test_strict_lines_keeps_blank_lines() {
        let policy = NormalizationPolicy::strict_lines();
        assert!(!policy.matches("1\n\n2", "1\n2"));
        assert!(policy.matches("1\n \n2\n\n", "1\n\n2"));
    }

    #[test]
    fn test_leading_indentation_is_significant() {
        let policy = NormalizationPolicy::default();
        assert!(!policy.matches("1\n  2", "1\n2"));
    }

    #[test]
    fn test_verify_accepts_crlf_output() {
        let verifier = Verifier::default();
        let verdict = verifier.verify(&execution("1 2 3  \r\n"), "1 2 3");
        assert_eq!(
            verdict,
            Verdict::Accepted {
                time: Duration::from_millis(12),
                peak_memory: 4096
            }
        );
    }

    #[test]
    fn test_verify_wrong_answer_keeps_raw_strings() {
        let verifier = Verifier::default();
        let verdict = verifier.verify(&execution("1 2 4\r\n"), "1 2 3\n");
        assert_eq!(
            verdict,
            Verdict::WrongAnswer {
                expected: "1 2 3\n".to_string(),
                actual: "1 2 4\r\n".to_string(),
                time: Duration::from_millis(12),
                peak_memory: 4096,
            }
        );
    }

    #[test]
    fn test_empty_outputs_match() {
        let verifier = Verifier::default();
        assert!(verifier.verify(&execution("\n\n"), "").is_accepted());
    }

    #[test]
    fn test_policy_deserializes_with_default() {
        let policy: NormalizationPolicy = serde_yaml::from_str("{}").unwrap();
        assert!(policy.drop_blank_lines);
    }
}
