//! Builder: turns candidate source into an executable artifact.
//!
//! The external compiler is reached through the [`Toolchain`] trait so tests
//! (and other languages) can substitute their own translation step.

mod compile;
mod toolchain;

pub use compile::{ArtifactRef, Builder, CompileFailure, CompileFailureKind};
pub use toolchain::{CommandToolchain, Toolchain, ToolchainOutput, presets};
