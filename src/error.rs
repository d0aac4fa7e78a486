//! Error types for judgeloop
//!
//! Sample-level outcomes (compile errors, wrong answers, limit breaches) are
//! carried as [`Verdict`](crate::domain::Verdict) values. The types here are
//! the fatal channel: faults that abort a judging run.

use thiserror::Error;

/// Faults that abort a judging call
#[derive(Debug, Error)]
pub enum JudgeError {
    /// Workspace could not be allocated on disk
    #[error("Workspace error: {0}")]
    Workspace(String),

    /// Artifact could not be launched or waited on
    #[error("Sandbox error: {0}")]
    Sandbox(String),

    /// A supervising task failed; the run's classification cannot be trusted
    #[error("Internal error: {0}")]
    Internal(String),

    /// Invalid configuration
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type alias for judgeloop operations
pub type Result<T> = std::result::Result<T, JudgeError>;
