//! Domain types for judgeloop
//!
//! - Sample / ProblemContext: what the caller supplies
//! - Verdict: classified outcome of one judged sample
//! - IterationRecord / RunResult: history of a repair run

pub mod record;
pub mod sample;
pub mod verdict;

pub use record::{IterationRecord, RepairOutcome, RunResult};
pub use sample::{ProblemContext, Sample};
pub use verdict::{Verdict, VerdictTag, bytes_to_mb};
