//! Builder: bounded toolchain invocation with artifact confirmation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::toolchain::Toolchain;
use crate::workspace::WorkspaceHandle;

/// Default compile timeout
pub const DEFAULT_COMPILE_TIMEOUT: Duration = Duration::from_secs(30);

/// Reference to a successfully built executable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    path: PathBuf,
}

impl ArtifactRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Why a build failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileFailureKind {
    /// Toolchain exited non-zero with diagnostics
    Diagnostics,
    /// Toolchain exceeded the compile timeout
    Timeout,
    /// Toolchain reported success but produced nothing
    MissingArtifact,
    /// Toolchain could not be started or failed internally
    Toolchain,
}

/// A structured compile failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileFailure {
    pub kind: CompileFailureKind,
    pub message: String,
}

impl CompileFailure {
    pub fn new(kind: CompileFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Builds workspaces into executables through an injected toolchain
#[derive(Clone)]
pub struct Builder {
    toolchain: Arc<dyn Toolchain>,
    timeout: Duration,
}

impl Builder {
    /// Create a builder with the default compile timeout
    pub fn new(toolchain: Arc<dyn Toolchain>) -> Self {
        Self {
            toolchain,
            timeout: DEFAULT_COMPILE_TIMEOUT,
        }
    }

    /// Set the compile timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Compile the workspace's source into its artifact path.
    ///
    /// Success requires both a zero exit status and an artifact on disk.
    pub async fn build(&self, handle: &WorkspaceHandle) -> Result<ArtifactRef, CompileFailure> {
        let source = handle.source_path();
        let artifact = handle.artifact_path();
        log::debug!("Compiling {} with {}", handle.id(), self.toolchain.name());

        let output = match tokio::time::timeout(self.timeout, self.toolchain.compile(source, artifact)).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(CompileFailure::new(
                    CompileFailureKind::Toolchain,
                    format!("toolchain '{}' failed to run: {}", self.toolchain.name(), e),
                ));
            }
            Err(_) => {
                return Err(CompileFailure::new(
                    CompileFailureKind::Timeout,
                    format!("compilation timed out after {}s", self.timeout.as_secs_f64()),
                ));
            }
        };

        if !output.success {
            let message = if !output.stderr.trim().is_empty() {
                output.stderr
            } else if !output.stdout.trim().is_empty() {
                output.stdout
            } else {
                format!("toolchain exited with status {:?}", output.exit_code)
            };
            log::debug!("Compile failed for {}", handle.id());
            return Err(CompileFailure::new(CompileFailureKind::Diagnostics, message));
        }

        if !tokio::fs::try_exists(artifact).await.unwrap_or(false) {
            return Err(CompileFailure::new(
                CompileFailureKind::MissingArtifact,
                format!(
                    "toolchain reported success but no executable exists at {}",
                    artifact.display()
                ),
            ));
        }

        Ok(ArtifactRef::new(artifact))
    }
}

impl std::fmt::Debug for Builder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field("toolchain", &self.toolchain.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}
