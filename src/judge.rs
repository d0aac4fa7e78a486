//! Single-sample judging: acquire, build, run, release, classify.

use std::sync::Arc;

use async_trait::async_trait;

use crate::builder::{ArtifactRef, Builder, CompileFailureKind, Toolchain};
use crate::domain::{Sample, Verdict};
use crate::error::{JudgeError, Result};
use crate::sandbox::{MemoryProbe, RunOutcome, SandboxLimits, SandboxRunner};
use crate::verify::{NormalizationPolicy, Verifier};
use crate::workspace::{WorkspaceConfig, WorkspaceError, WorkspaceHandle, WorkspaceManager};

/// Produces one verdict for one candidate against one sample
#[async_trait]
pub trait SampleJudge: Send + Sync {
    /// Judge `candidate` against `sample`.
    ///
    /// Sample-level failures are verdicts; only faults are errors.
    async fn judge(&self, candidate: &str, sample: &Sample) -> Result<Verdict>;

    /// Judge `candidate` against every sample, in order.
    ///
    /// Implementations may share one build across samples; the verdicts must
    /// match what per-sample calls would produce.
    async fn judge_all(&self, candidate: &str, samples: &[Sample]) -> Result<Vec<Verdict>> {
        let mut verdicts = Vec::with_capacity(samples.len());
        for sample in samples {
            verdicts.push(self.judge(candidate, sample).await?);
        }
        Ok(verdicts)
    }
}

/// The real judge: workspace, toolchain, sandbox and verifier composed
#[derive(Debug, Clone)]
pub struct Judge {
    workspace: WorkspaceManager,
    builder: Builder,
    runner: SandboxRunner,
    verifier: Verifier,
    limits: SandboxLimits,
}

impl Judge {
    /// Create a judge from its parts
    pub fn new(
        workspace: WorkspaceManager,
        builder: Builder,
        runner: SandboxRunner,
        verifier: Verifier,
        limits: SandboxLimits,
    ) -> Self {
        Self {
            workspace,
            builder,
            runner,
            verifier,
            limits,
        }
    }

    /// Judge with default limits, normalization, and the platform memory probe
    pub fn with_toolchain(workspace: WorkspaceConfig, toolchain: Arc<dyn Toolchain>) -> Self {
        Self::new(
            WorkspaceManager::new(workspace),
            Builder::new(toolchain),
            SandboxRunner::default(),
            Verifier::new(NormalizationPolicy::default()),
            SandboxLimits::default(),
        )
    }

    /// Replace the resource limits
    pub fn with_limits(mut self, limits: SandboxLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Replace the memory probe
    pub fn with_probe(mut self, probe: Arc<dyn MemoryProbe>) -> Self {
        self.runner = SandboxRunner::new(probe);
        self
    }

    pub fn limits(&self) -> &SandboxLimits {
        &self.limits
    }
}

/// A workspace holding a built artifact, or the verdict that stopped the build
enum Prepared {
    Built(WorkspaceHandle, ArtifactRef),
    Rejected(Verdict),
}

impl Judge {
    async fn prepare(&self, candidate: &str) -> Result<Prepared> {
        let handle = match self.workspace.acquire(candidate).await {
            Ok(handle) => handle,
            Err(e @ WorkspaceError::VerificationFailed { .. }) => {
                log::warn!("{}", e);
                return Ok(Prepared::Rejected(Verdict::CompileError {
                    message: format!("source could not be persisted intact: {}", e),
                }));
            }
            Err(e @ WorkspaceError::Io { .. }) => return Err(JudgeError::Workspace(e.to_string())),
        };

        match self.builder.build(&handle).await {
            Ok(artifact) => Ok(Prepared::Built(handle, artifact)),
            Err(failure) => {
                self.workspace.release(handle).await;
                if failure.kind != CompileFailureKind::Diagnostics {
                    log::info!("Build failed ({:?}): {}", failure.kind, failure.message);
                }
                Ok(Prepared::Rejected(Verdict::CompileError {
                    message: failure.message,
                }))
            }
        }
    }

    async fn run_sample(&self, artifact: &ArtifactRef, sample: &Sample) -> Result<Verdict> {
        let verdict = match self.runner.run(artifact.path(), &sample.input, &self.limits).await? {
            RunOutcome::MemoryLimitExceeded { peak, .. } => Verdict::MemoryLimitExceeded { peak },
            RunOutcome::TimeLimitExceeded { elapsed, .. } => Verdict::TimeLimitExceeded { elapsed },
            RunOutcome::Completed(execution) if !execution.success() => Verdict::RuntimeError {
                exit_code: execution.exit_code,
                signal: execution.signal,
                stderr: execution.stderr,
                time: execution.elapsed,
                peak_memory: execution.peak_memory,
            },
            RunOutcome::Completed(execution) => self.verifier.verify(&execution, &sample.expected_output),
        };
        log::debug!("Sample verdict: {}", verdict.tag());
        Ok(verdict)
    }
}

#[async_trait]
impl SampleJudge for Judge {
    async fn judge(&self, candidate: &str, sample: &Sample) -> Result<Verdict> {
        let (handle, artifact) = match self.prepare(candidate).await? {
            Prepared::Built(handle, artifact) => (handle, artifact),
            Prepared::Rejected(verdict) => return Ok(verdict),
        };

        let verdict = self.run_sample(&artifact, sample).await;
        self.workspace.release(handle).await;
        verdict
    }

    /// Build once and run every sample against the same artifact
    async fn judge_all(&self, candidate: &str, samples: &[Sample]) -> Result<Vec<Verdict>> {
        let (handle, artifact) = match self.prepare(candidate).await? {
            Prepared::Built(handle, artifact) => (handle, artifact),
            Prepared::Rejected(verdict) => return Ok(vec![verdict; samples.len()]),
        };

        let mut verdicts = Vec::with_capacity(samples.len());
        for sample in samples {
            match self.run_sample(&artifact, sample).await {
                Ok(verdict) => verdicts.push(verdict),
                Err(e) => {
                    self.workspace.release(handle).await;
                    return Err(e);
                }
            }
        }
        self.workspace.release(handle).await;
        Ok(verdicts)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::builder::presets;
    use crate::sandbox::{FixedProbe, NullProbe};
    use crate::builder::{CommandToolchain, ToolchainOutput};
    use crate::workspace::{SourceStore, SyncedFileStore};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    fn judge(dir: &TempDir) -> Judge {
        Judge::with_toolchain(
            WorkspaceConfig::new(dir.path()).with_extension("sh"),
            Arc::new(presets::shell_script()),
        )
        .with_probe(Arc::new(NullProbe))
    }

    fn leftover_files(dir: &TempDir) -> usize {
        std::fs::read_dir(dir.path()).unwrap().count()
    }

    #[tokio::test]
    async fn test_echo_is_accepted() {
        let dir = TempDir::new().unwrap();
        let judge = judge(&dir);
        let sample = Sample::new("3\n1 2 3", "1 2 3");

        let verdict = judge
            .judge("#!/bin/sh\nread n\nread line\necho \"$line\"\n", &sample)
            .await
            .unwrap();
        assert!(verdict.is_accepted(), "got {:?}", verdict);
        assert_eq!(leftover_files(&dir), 0);
    }

    #[tokio::test]
    async fn test_wrong_answer() {
        let dir = TempDir::new().unwrap();
        let verdict = judge(&dir)
            .judge("#!/bin/sh\necho 42\n", &Sample::new("", "41"))
            .await
            .unwrap();
        match verdict {
            Verdict::WrongAnswer {
                expected, actual, time, ..
            } => {
                assert_eq!(expected, "41");
                assert_eq!(actual, "42\n");
                assert!(time > Duration::ZERO);
            }
            other => panic!("expected WA, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_compile_error_is_not_run() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("ran");
        let source = format!("#!/bin/sh\ntouch {}\nif then fi (\n", marker.display());

        let verdict = judge(&dir).judge(&source, &Sample::new("", "")).await.unwrap();
        match verdict {
            Verdict::CompileError { message } => assert!(!message.trim().is_empty()),
            other => panic!("expected CE, got {:?}", other),
        }
        assert!(!marker.exists());
        assert_eq!(leftover_files(&dir), 0);
    }

    #[tokio::test]
    async fn test_runtime_error() {
        let dir = TempDir::new().unwrap();
        let verdict = judge(&dir)
            .judge("#!/bin/sh\necho oops >&2\nexit 2\n", &Sample::new("", ""))
            .await
            .unwrap();
        match verdict {
            Verdict::RuntimeError {
                exit_code,
                signal,
                stderr,
                time,
                ..
            } => {
                assert_eq!(exit_code, Some(2));
                assert_eq!(signal, None);
                assert_eq!(stderr, "oops\n");
                assert!(time > Duration::ZERO);
            }
            other => panic!("expected RE, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_time_limit() {
        let dir = TempDir::new().unwrap();
        let judge = judge(&dir).with_limits(SandboxLimits::default().with_time_limit(Duration::from_millis(200)));
        let verdict = judge
            .judge("#!/bin/sh\nwhile :; do :; done\n", &Sample::new("", ""))
            .await
            .unwrap();
        assert!(matches!(verdict, Verdict::TimeLimitExceeded { .. }));
        assert_eq!(leftover_files(&dir), 0);
    }

    #[tokio::test]
    async fn test_memory_limit_beats_time_limit() {
        let dir = TempDir::new().unwrap();
        let judge = judge(&dir)
            .with_probe(Arc::new(FixedProbe(1 << 30)))
            .with_limits(SandboxLimits::default().with_time_limit(Duration::from_millis(500)));
        let verdict = judge
            .judge("#!/bin/sh\nwhile :; do :; done\n", &Sample::new("", ""))
            .await
            .unwrap();
        assert_eq!(verdict, Verdict::MemoryLimitExceeded { peak: 1 << 30 });
    }

    #[tokio::test]
    async fn test_unusable_workspace_is_fatal() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();

        let judge = Judge::with_toolchain(WorkspaceConfig::new(blocker.join("sub")), Arc::new(presets::shell_script()));
        let err = judge.judge("echo", &Sample::new("", "")).await.unwrap_err();
        assert!(matches!(err, JudgeError::Workspace(_)));
    }

    /// Persists only the first half of every source
    struct TruncatingStore;

    #[async_trait]
    impl SourceStore for TruncatingStore {
        async fn write(&self, path: &std::path::Path, bytes: &[u8]) -> std::io::Result<()> {
            SyncedFileStore.write(path, &bytes[..bytes.len() / 2]).await
        }

        async fn read_back(&self, path: &std::path::Path) -> std::io::Result<Vec<u8>> {
            SyncedFileStore.read_back(path).await
        }
    }

    #[tokio::test]
    async fn test_unverifiable_source_is_compile_error() {
        let dir = TempDir::new().unwrap();
        let judge = Judge::new(
            WorkspaceManager::new(WorkspaceConfig::new(dir.path()).with_extension("sh"))
                .with_store(Arc::new(TruncatingStore)),
            Builder::new(Arc::new(presets::shell_script())),
            SandboxRunner::new(Arc::new(NullProbe)),
            Verifier::default(),
            SandboxLimits::default(),
        );

        let verdict = judge
            .judge("#!/bin/sh\necho 1\n", &Sample::new("", "1"))
            .await
            .unwrap();
        match verdict {
            Verdict::CompileError { message } => {
                assert!(message.starts_with("source could not be persisted intact"), "got {}", message);
            }
            other => panic!("expected CE, got {:?}", other),
        }
        assert_eq!(leftover_files(&dir), 0);
    }

    /// Shell toolchain that counts its invocations
    struct CountingToolchain {
        inner: CommandToolchain,
        compiles: AtomicUsize,
    }

    #[async_trait]
    impl Toolchain for CountingToolchain {
        fn name(&self) -> &str {
            "counting-sh"
        }

        async fn compile(&self, source: &std::path::Path, artifact: &std::path::Path) -> std::io::Result<ToolchainOutput> {
            self.compiles.fetch_add(1, Ordering::SeqCst);
            self.inner.compile(source, artifact).await
        }
    }

    fn counting_judge(dir: &TempDir) -> (Judge, Arc<CountingToolchain>) {
        let toolchain = Arc::new(CountingToolchain {
            inner: presets::shell_script(),
            compiles: AtomicUsize::new(0),
        });
        let judge = Judge::with_toolchain(WorkspaceConfig::new(dir.path()).with_extension("sh"), toolchain.clone())
            .with_probe(Arc::new(NullProbe));
        (judge, toolchain)
    }

    #[tokio::test]
    async fn test_judge_all_builds_once() {
        let dir = TempDir::new().unwrap();
        let (judge, toolchain) = counting_judge(&dir);
        let samples = vec![Sample::new("1", "1"), Sample::new("2", "3"), Sample::new("3", "3")];

        let verdicts = judge
            .judge_all("#!/bin/sh\nread n\necho \"$n\"\n", &samples)
            .await
            .unwrap();

        assert_eq!(toolchain.compiles.load(Ordering::SeqCst), 1);
        let tags: Vec<_> = verdicts.iter().map(|v| v.tag().as_str()).collect();
        assert_eq!(tags, vec!["AC", "WA", "AC"]);
        assert_eq!(leftover_files(&dir), 0);
    }

    #[tokio::test]
    async fn test_judge_all_compile_error_covers_every_sample() {
        let dir = TempDir::new().unwrap();
        let (judge, toolchain) = counting_judge(&dir);
        let samples = vec![Sample::new("", ""), Sample::new("", "")];

        let verdicts = judge.judge_all("#!/bin/sh\nif then fi (\n", &samples).await.unwrap();

        assert_eq!(toolchain.compiles.load(Ordering::SeqCst), 1);
        assert_eq!(verdicts.len(), 2);
        assert!(verdicts.iter().all(|v| matches!(v, Verdict::CompileError { .. })));
        assert_eq!(verdicts[0], verdicts[1]);
        assert_eq!(leftover_files(&dir), 0);
    }
}
