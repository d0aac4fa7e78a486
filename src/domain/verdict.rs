//! Verdict classification for a single judged sample.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Classified outcome of judging one candidate against one sample
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verdict {
    /// Output matched after normalization
    Accepted { time: Duration, peak_memory: u64 },

    /// Candidate did not build
    CompileError { message: String },

    /// Non-zero exit or death by signal, no limit breached
    RuntimeError {
        exit_code: Option<i32>,
        signal: Option<i32>,
        stderr: String,
        time: Duration,
        peak_memory: u64,
    },

    /// Killed after exceeding the wall-clock limit
    TimeLimitExceeded { elapsed: Duration },

    /// Killed by the memory monitor
    MemoryLimitExceeded { peak: u64 },

    /// Ran cleanly but printed the wrong thing
    WrongAnswer {
        expected: String,
        actual: String,
        time: Duration,
        peak_memory: u64,
    },
}

/// Short classification tag of a verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VerdictTag {
    #[serde(rename = "AC")]
    Accepted,
    #[serde(rename = "CE")]
    CompileError,
    #[serde(rename = "RE")]
    RuntimeError,
    #[serde(rename = "TLE")]
    TimeLimitExceeded,
    #[serde(rename = "MLE")]
    MemoryLimitExceeded,
    #[serde(rename = "WA")]
    WrongAnswer,
}

impl VerdictTag {
    /// Get the conventional judge abbreviation
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictTag::Accepted => "AC",
            VerdictTag::CompileError => "CE",
            VerdictTag::RuntimeError => "RE",
            VerdictTag::TimeLimitExceeded => "TLE",
            VerdictTag::MemoryLimitExceeded => "MLE",
            VerdictTag::WrongAnswer => "WA",
        }
    }

    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            VerdictTag::Accepted => "Accepted",
            VerdictTag::CompileError => "Compile Error",
            VerdictTag::RuntimeError => "Runtime Error",
            VerdictTag::TimeLimitExceeded => "Time Limit Exceeded",
            VerdictTag::MemoryLimitExceeded => "Memory Limit Exceeded",
            VerdictTag::WrongAnswer => "Wrong Answer",
        }
    }

    /// Remediation hint handed to the repair oracle
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            VerdictTag::Accepted => None,
            VerdictTag::WrongAnswer => {
                Some("check the algorithm logic, edge cases and the exact output format")
            }
            VerdictTag::TimeLimitExceeded => {
                Some("reduce the asymptotic complexity and avoid redundant computation")
            }
            VerdictTag::MemoryLimitExceeded => {
                Some("reduce auxiliary storage and choose leaner data structures")
            }
            VerdictTag::RuntimeError => {
                Some("check array bounds, null dereferences and division by zero")
            }
            VerdictTag::CompileError => {
                Some("check syntax, missing includes and variable declarations")
            }
        }
    }
}

impl std::fmt::Display for VerdictTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Verdict {
    /// Classification tag
    pub fn tag(&self) -> VerdictTag {
        match self {
            Verdict::Accepted { .. } => VerdictTag::Accepted,
            Verdict::CompileError { .. } => VerdictTag::CompileError,
            Verdict::RuntimeError { .. } => VerdictTag::RuntimeError,
            Verdict::TimeLimitExceeded { .. } => VerdictTag::TimeLimitExceeded,
            Verdict::MemoryLimitExceeded { .. } => VerdictTag::MemoryLimitExceeded,
            Verdict::WrongAnswer { .. } => VerdictTag::WrongAnswer,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted { .. })
    }

    /// Wall time, when the verdict carries one
    pub fn elapsed(&self) -> Option<Duration> {
        match self {
            Verdict::Accepted { time, .. }
            | Verdict::RuntimeError { time, .. }
            | Verdict::WrongAnswer { time, .. } => Some(*time),
            Verdict::TimeLimitExceeded { elapsed } => Some(*elapsed),
            Verdict::CompileError { .. } | Verdict::MemoryLimitExceeded { .. } => None,
        }
    }

    /// Peak resident memory in bytes, when the verdict carries one
    pub fn peak_memory(&self) -> Option<u64> {
        match self {
            Verdict::Accepted { peak_memory, .. }
            | Verdict::RuntimeError { peak_memory, .. }
            | Verdict::WrongAnswer { peak_memory, .. } => Some(*peak_memory),
            Verdict::MemoryLimitExceeded { peak } => Some(*peak),
            Verdict::CompileError { .. } | Verdict::TimeLimitExceeded { .. } => None,
        }
    }

    /// One-line diagnostic message
    pub fn message(&self) -> String {
        match self {
            Verdict::Accepted { .. } => "accepted".to_string(),
            Verdict::CompileError { message } => message.trim().to_string(),
            Verdict::RuntimeError {
                exit_code, signal, ..
            } => match (exit_code, signal) {
                (Some(code), _) => format!("runtime error (exit code {})", code),
                (None, Some(sig)) => format!("runtime error (killed by signal {})", sig),
                (None, None) => "runtime error".to_string(),
            },
            Verdict::TimeLimitExceeded { elapsed } => {
                format!("time limit exceeded after {:.2}s", elapsed.as_secs_f64())
            }
            Verdict::MemoryLimitExceeded { peak } => {
                format!("memory limit exceeded (peak {:.2}MB)", bytes_to_mb(*peak))
            }
            Verdict::WrongAnswer { .. } => "wrong answer".to_string(),
        }
    }
}

/// Convert a byte count to mebibytes
pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}
