//! judgeloop - a sandboxed sample judge with an iterative repair loop
//!
//! A candidate program is compiled, run against input/output samples under
//! time and memory limits, and classified per sample. When samples fail, a
//! structured report goes to a repair oracle and the revised candidate is
//! judged again, until everything passes or the iteration budget runs out.

pub mod builder;
pub mod config;
pub mod controller;
pub mod domain;
pub mod error;
pub mod id;
pub mod judge;
pub mod repair;
pub mod sandbox;
pub mod verify;
pub mod workspace;

pub use controller::{ControllerConfig, IterationController};
pub use domain::{IterationRecord, ProblemContext, RepairOutcome, RunResult, Sample, Verdict, VerdictTag};
pub use error::{JudgeError, Result};
pub use judge::{Judge, SampleJudge};
