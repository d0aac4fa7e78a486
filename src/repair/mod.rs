//! Repair layer: failure reports, the oracle seam, and code extraction
//!
//! - `report`: per-iteration failure reports with remediation hints
//! - `oracle`: the `RepairOracle` trait and a scripted implementation
//! - `extract`: fence matchers and a plausibility check for oracle output
//! - `http`: an oracle backed by a hosted chat model

pub mod extract;
pub mod http;
pub mod oracle;
pub mod report;

pub use extract::{CodeExtractor, CodeMatcher, FencePattern, Plausibility};
pub use http::{HttpRepairOracle, OracleConfig};
pub use oracle::{OracleError, RepairOracle, RepairRequest, ScriptedOracle};
pub use report::{FailureReport, SampleFailure};
