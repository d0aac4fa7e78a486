//! Structured failure reports handed to the repair oracle.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{IterationRecord, Sample, Verdict, VerdictTag, bytes_to_mb};

/// Lines kept from any single block of program or compiler text
const MAX_BLOCK_LINES: usize = 50;

/// One failing sample, flattened for presentation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleFailure {
    /// 0-based sample index
    pub sample_index: usize,
    pub tag: VerdictTag,
    pub input: String,
    pub expected: String,
    /// What the program printed, for wrong answers
    pub actual: Option<String>,
    /// Diagnostic for everything that is not a wrong answer
    pub message: Option<String>,
    pub elapsed: Option<Duration>,
    /// Peak resident memory in bytes
    pub peak_memory: Option<u64>,
}

impl SampleFailure {
    fn from_verdict(sample_index: usize, sample: Option<&Sample>, verdict: &Verdict) -> Self {
        let (actual, message) = match verdict {
            Verdict::WrongAnswer { actual, .. } => (Some(actual.clone()), None),
            Verdict::RuntimeError { stderr, .. } if !stderr.trim().is_empty() => {
                (None, Some(format!("{}\n{}", verdict.message(), stderr.trim_end())))
            }
            other => (None, Some(other.message())),
        };

        Self {
            sample_index,
            tag: verdict.tag(),
            input: sample.map(|s| s.input.clone()).unwrap_or_default(),
            expected: sample.map(|s| s.expected_output.clone()).unwrap_or_default(),
            actual,
            message,
            elapsed: verdict.elapsed(),
            peak_memory: verdict.peak_memory(),
        }
    }
}

/// Every failure of one iteration plus remediation hints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    /// 0-based iteration the report describes
    pub iteration: u32,
    pub total_samples: usize,
    pub failures: Vec<SampleFailure>,
}

impl FailureReport {
    /// Build a report from an evaluated iteration and the samples it ran against
    pub fn from_record(record: &IterationRecord, samples: &[Sample]) -> Self {
        let failures = record
            .failures()
            .map(|(index, verdict)| SampleFailure::from_verdict(*index, samples.get(*index), verdict))
            .collect();

        Self {
            iteration: record.iteration_index,
            total_samples: record.per_sample_verdicts.len(),
            failures,
        }
    }

    pub fn is_passing(&self) -> bool {
        self.failures.is_empty()
    }

    /// Distinct tags among the failures, in a stable order
    pub fn tags(&self) -> BTreeSet<VerdictTag> {
        self.failures.iter().map(|f| f.tag).collect()
    }

    /// One remediation hint per distinct failing tag
    pub fn hints(&self) -> Vec<(VerdictTag, &'static str)> {
        self.tags()
            .into_iter()
            .filter_map(|tag| tag.hint().map(|hint| (tag, hint)))
            .collect()
    }

    /// Render as markdown
    pub fn render(&self) -> String {
        if self.is_passing() {
            return "All samples passed.".to_string();
        }

        let mut out = String::from("## Verification report\n\n");
        out.push_str(&format!(
            "{} of {} sample(s) failed:\n\n",
            self.failures.len(),
            self.total_samples
        ));

        for failure in &self.failures {
            out.push_str(&format!(
                "### Sample {} - {} ({})\n",
                failure.sample_index + 1,
                failure.tag,
                failure.tag.name()
            ));
            out.push_str(&format!("**Input:**\n```\n{}\n```\n", truncate_lines(&failure.input)));
            out.push_str(&format!(
                "**Expected output:**\n```\n{}\n```\n",
                truncate_lines(&failure.expected)
            ));

            if let Some(actual) = &failure.actual {
                out.push_str(&format!("**Actual output:**\n```\n{}\n```\n", truncate_lines(actual)));
            }
            if let Some(message) = &failure.message {
                out.push_str(&format!("**Error:**\n```\n{}\n```\n", truncate_lines(message)));
            }
            if let Some(elapsed) = failure.elapsed {
                out.push_str(&format!("**Time:** {:.3}s\n", elapsed.as_secs_f64()));
            }
            if let Some(peak) = failure.peak_memory {
                out.push_str(&format!("**Memory:** {:.2}MB\n", bytes_to_mb(peak)));
            }
            out.push('\n');
        }

        out.push_str("## Hints\n");
        for (tag, hint) in self.hints() {
            out.push_str(&format!("- **{}** ({}): {}\n", tag, tag.name(), hint));
        }

        out
    }
}

fn truncate_lines(text: &str) -> String {
    let text = text.trim_end();
    let total = text.lines().count();
    if total <= MAX_BLOCK_LINES {
        return text.to_string();
    }
    let mut kept = text.lines().take(MAX_BLOCK_LINES).collect::<Vec<_>>().join("\n");
    kept.push_str(&format!("\n... ({} more lines)", total - MAX_BLOCK_LINES));
    kept
}
