//! Iteration controller - the evaluate/repair loop.

pub mod iteration;

pub use iteration::{ControllerConfig, IterationController};
