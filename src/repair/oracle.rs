//! The repair oracle seam.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::report::FailureReport;
use crate::domain::ProblemContext;

/// Everything the oracle gets to produce a revised candidate
#[derive(Debug, Clone)]
pub struct RepairRequest {
    pub candidate: String,
    pub report: FailureReport,
    /// 1-based repair attempt number
    pub attempt: u32,
    pub context: Option<ProblemContext>,
}

/// Why the oracle produced no candidate
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Missing API key: environment variable {env_var} not set")]
    MissingApiKey { env_var: String },

    #[error("No code found in oracle response")]
    NoCode,
}

impl OracleError {
    /// Whether another attempt could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            OracleError::RateLimited { .. } | OracleError::Network(_) => true,
            OracleError::Api { status, .. } => *status >= 500 || *status == 408,
            OracleError::InvalidResponse(_) | OracleError::MissingApiKey { .. } | OracleError::NoCode => false,
        }
    }
}

/// External service that turns a failing candidate into a revised one
#[async_trait]
pub trait RepairOracle: Send + Sync {
    /// Produce a revised candidate. An empty string means "no idea".
    async fn repair(&self, request: &RepairRequest) -> Result<String, OracleError>;
}

/// Oracle that replays canned responses, then echoes the candidate unchanged
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    responses: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<RepairRequest>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a revised candidate
    pub fn then_return(self, candidate: impl Into<String>) -> Self {
        self.push(Ok(candidate.into()));
        self
    }

    /// Queue a failure
    pub fn then_fail(self, message: impl Into<String>) -> Self {
        self.push(Err(message.into()));
        self
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<RepairRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    fn push(&self, response: Result<String, String>) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(response);
        }
    }
}

#[async_trait]
impl RepairOracle for ScriptedOracle {
    async fn repair(&self, request: &RepairRequest) -> Result<String, OracleError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let next = self.responses.lock().ok().and_then(|mut q| q.pop_front());
        match next {
            Some(Ok(candidate)) => Ok(candidate),
            Some(Err(message)) => Err(OracleError::InvalidResponse(message)),
            None => Ok(request.candidate.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(candidate: &str) -> RepairRequest {
        RepairRequest {
            candidate: candidate.to_string(),
            report: FailureReport {
                iteration: 0,
                total_samples: 1,
                failures: vec![],
            },
            attempt: 1,
            context: None,
        }
    }

    #[test]
    fn test_retryable_errors() {
        assert!(
            OracleError::RateLimited {
                retry_after: Duration::from_secs(1)
            }
            .is_retryable()
        );
        assert!(
            OracleError::Api {
                status: 503,
                message: "overloaded".into()
            }
            .is_retryable()
        );
        assert!(
            !OracleError::Api {
                status: 400,
                message: "bad request".into()
            }
            .is_retryable()
        );
        assert!(!OracleError::NoCode.is_retryable());
        assert!(
            !OracleError::MissingApiKey {
                env_var: "KEY".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_error_display() {
        let err = OracleError::Api {
            status: 500,
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "API error 500: boom");
    }

    #[tokio::test]
    async fn test_scripted_oracle_replays_then_echoes() {
        let oracle = ScriptedOracle::new().then_return("v2").then_fail("down");

        assert_eq!(oracle.repair(&request("v1")).await.unwrap(), "v2");
        assert!(oracle.repair(&request("v2")).await.is_err());
        assert_eq!(oracle.repair(&request("v2")).await.unwrap(), "v2");
        assert_eq!(oracle.call_count(), 3);
        assert_eq!(oracle.requests()[0].candidate, "v1");
    }
}
