//! Sandbox runner: executes an artifact against one input under time and
//! memory ceilings.
//!
//! The child process and a memory monitor run concurrently. The monitor
//! samples resident memory at a fixed interval and reports a breach over a
//! channel; the runner then kills the child. Memory enforcement is by
//! sampling, so overshoot within one interval is possible.

mod monitor;
mod runner;

pub use monitor::{FixedProbe, MemoryProbe, NullProbe, ProcfsProbe, default_probe};
pub use runner::{Execution, RunOutcome, SandboxLimits, SandboxRunner};
