//! Iteration history and the terminal run result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::verdict::Verdict;

/// What the repair step produced at the end of an iteration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RepairOutcome {
    /// Every sample passed; no repair was needed
    NotNeeded,
    /// Budget exhausted; the oracle was not consulted
    NotRequested,
    /// Oracle supplied a different candidate
    Revised,
    /// Oracle failed or returned an empty/unchanged candidate
    NoProgress { reason: String },
}

impl RepairOutcome {
    pub fn is_no_progress(&self) -> bool {
        matches!(self, RepairOutcome::NoProgress { .. })
    }
}

/// One evaluation of a candidate against every sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    /// 0-based iteration number
    pub iteration_index: u32,

    /// Verdicts keyed by 0-based sample index, in sample order
    pub per_sample_verdicts: Vec<(usize, Verdict)>,

    /// The candidate that was judged
    pub candidate_snapshot: String,

    /// Result of the repair step that followed
    pub repair: RepairOutcome,

    /// When evaluation started
    pub started_at: DateTime<Utc>,

    /// How long evaluation plus repair took
    pub duration: Duration,
}

impl IterationRecord {
    /// True iff every sample was accepted
    pub fn all_accepted(&self) -> bool {
        !self.per_sample_verdicts.is_empty()
            && self.per_sample_verdicts.iter().all(|(_, v)| v.is_accepted())
    }

    /// Verdicts that were not accepted
    pub fn failures(&self) -> impl Iterator<Item = &(usize, Verdict)> {
        self.per_sample_verdicts.iter().filter(|(_, v)| !v.is_accepted())
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }
}

/// Terminal value of a judging run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// Whether the final candidate passed every sample
    pub success: bool,

    /// Candidate judged in the last iteration
    pub final_candidate: String,

    /// Number of evaluations performed
    pub iterations_used: u32,

    /// Every iteration, oldest first
    pub history: Vec<IterationRecord>,
}

impl RunResult {
    /// The last evaluated iteration
    pub fn last_iteration(&self) -> Option<&IterationRecord> {
        self.history.last()
    }

    /// Number of iterations whose repair step made no progress
    pub fn no_progress_count(&self) -> usize {
        self.history
            .iter()
            .filter(|r| r.repair.is_no_progress())
            .count()
    }

    /// `sample N: TAG - message` for every failing sample of the last iteration
    pub fn failure_summary(&self) -> Vec<String> {
        self.last_iteration()
            .map(|record| {
                record
                    .failures()
                    .map(|(index, verdict)| {
                        format!("sample {}: {} - {}", index + 1, verdict.tag(), verdict.message())
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}
