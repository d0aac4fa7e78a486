//! IterationController drives judge → report → oracle rounds.
//!
//! Each round judges the current candidate against every sample. If anything
//! fails and budget remains, the failures are rendered into a report and the
//! oracle is asked for a revised candidate. The loop ends when all samples
//! pass or `max_iterations` evaluations have been spent.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::domain::{IterationRecord, ProblemContext, RepairOutcome, RunResult, Sample, Verdict};
use crate::error::{JudgeError, Result};
use crate::judge::SampleJudge;
use crate::repair::{FailureReport, RepairOracle, RepairRequest};

/// Configuration for the IterationController.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Upper bound on evaluations, including the first
    pub max_iterations: u32,
    /// Pause before each oracle call
    pub repair_delay: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 8,
            repair_delay: Duration::from_secs(2),
        }
    }
}

impl ControllerConfig {
    pub fn new(max_iterations: u32) -> Self {
        Self {
            max_iterations,
            ..Default::default()
        }
    }

    pub fn with_repair_delay(mut self, delay: Duration) -> Self {
        self.repair_delay = delay;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(JudgeError::Config("max_iterations must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Runs the evaluate/repair loop for one candidate.
pub struct IterationController<J, O>
where
    J: SampleJudge,
    O: RepairOracle,
{
    judge: Arc<J>,
    oracle: Arc<O>,
    config: ControllerConfig,
    context: Option<ProblemContext>,
}

impl<J, O> IterationController<J, O>
where
    J: SampleJudge,
    O: RepairOracle,
{
    /// Create a controller; rejects an unusable configuration.
    pub fn new(judge: Arc<J>, oracle: Arc<O>, config: ControllerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            judge,
            oracle,
            config,
            context: None,
        })
    }

    /// Attach problem information that is passed through to the oracle
    pub fn with_context(mut self, context: ProblemContext) -> Self {
        self.context = (!context.is_empty()).then_some(context);
        self
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Judge `candidate` against `samples`, repairing until it passes or the
    /// budget runs out.
    ///
    /// Sample failures and oracle failures end up in the returned history;
    /// only judge faults are returned as errors.
    pub async fn run(&self, candidate: impl Into<String>, samples: &[Sample]) -> Result<RunResult> {
        if samples.is_empty() {
            return Err(JudgeError::Config("at least one sample is required".to_string()));
        }

        let max = self.config.max_iterations;
        let mut candidate = candidate.into();
        let mut history: Vec<IterationRecord> = Vec::new();

        for index in 0..max {
            let started_at = Utc::now();
            let clock = Instant::now();

            let verdicts = self.evaluate(index, &candidate, samples).await?;
            let mut record = IterationRecord {
                iteration_index: index,
                per_sample_verdicts: verdicts,
                candidate_snapshot: candidate.clone(),
                repair: RepairOutcome::NotNeeded,
                started_at,
                duration: Duration::ZERO,
            };

            if record.all_accepted() {
                record.duration = clock.elapsed();
                history.push(record);
                tracing::info!(iteration = index, "All samples passed");
                return Ok(RunResult {
                    success: true,
                    final_candidate: candidate,
                    iterations_used: index + 1,
                    history,
                });
            }

            tracing::info!(
                iteration = index,
                failures = record.failure_count(),
                samples = samples.len(),
                "Iteration failed"
            );

            if index + 1 == max {
                record.repair = RepairOutcome::NotRequested;
                record.duration = clock.elapsed();
                history.push(record);
                break;
            }

            let report = FailureReport::from_record(&record, samples);
            let (next, outcome) = self.request_repair(&candidate, report, index + 1).await;
            record.repair = outcome;
            record.duration = clock.elapsed();
            history.push(record);

            if let Some(next) = next {
                candidate = next;
            }
        }

        log::warn!("Repair budget of {} iteration(s) exhausted", max);
        Ok(RunResult {
            success: false,
            final_candidate: candidate,
            iterations_used: history.len() as u32,
            history,
        })
    }

    /// Judge every sample in order; no short-circuit
    async fn evaluate(&self, iteration: u32, candidate: &str, samples: &[Sample]) -> Result<Vec<(usize, Verdict)>> {
        let verdicts = self.judge.judge_all(candidate, samples).await?;
        if verdicts.len() != samples.len() {
            return Err(JudgeError::Internal(format!(
                "judge returned {} verdict(s) for {} sample(s)",
                verdicts.len(),
                samples.len()
            )));
        }
        for (index, verdict) in verdicts.iter().enumerate() {
            tracing::debug!(iteration, sample = index, verdict = %verdict.tag(), "Sample judged");
        }
        Ok(verdicts.into_iter().enumerate().collect())
    }

    /// Ask the oracle for a revision; failures become no-progress
    async fn request_repair(&self, candidate: &str, report: FailureReport, attempt: u32) -> (Option<String>, RepairOutcome) {
        if !self.config.repair_delay.is_zero() {
            tokio::time::sleep(self.config.repair_delay).await;
        }

        let request = RepairRequest {
            candidate: candidate.to_string(),
            report,
            attempt,
            context: self.context.clone(),
        };

        let reason = match self.oracle.repair(&request).await {
            Ok(next) if next.trim().is_empty() => "oracle returned an empty candidate".to_string(),
            Ok(next) if next == candidate => "oracle returned the candidate unchanged".to_string(),
            Ok(next) => {
                tracing::info!(attempt, bytes = next.len(), "Oracle revised candidate");
                return (Some(next), RepairOutcome::Revised);
            }
            Err(e) => format!("oracle failed: {}", e),
        };

        log::warn!("Repair attempt {} made no progress: {}", attempt, reason);
        (None, RepairOutcome::NoProgress { reason })
    }
}
