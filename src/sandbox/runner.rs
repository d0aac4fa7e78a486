//! SandboxRunner: one bounded execution of a built artifact.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::monitor::{MemoryProbe, default_probe, spawn_monitor};
use crate::error::{JudgeError, Result};

/// How long to wait for output pipes to drain after the child is gone
const PIPE_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Extra spawn attempts on ETXTBSY
const SPAWN_ATTEMPTS: u32 = 5;

/// Resource limits applied to one execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxLimits {
    /// Wall-clock limit
    pub time_limit: Duration,
    /// Resident memory limit in bytes
    pub memory_limit: u64,
    /// Interval between memory samples
    pub sample_interval: Duration,
    /// Per-stream cap on captured output
    pub max_output_bytes: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            time_limit: Duration::from_secs(5),
            memory_limit: 256 * 1024 * 1024,
            sample_interval: Duration::from_millis(10),
            max_output_bytes: 1024 * 1024,
        }
    }
}

impl SandboxLimits {
    pub fn with_time_limit(mut self, time_limit: Duration) -> Self {
        self.time_limit = time_limit;
        self
    }

    /// Set the memory limit in megabytes
    pub fn with_memory_limit_mb(mut self, mb: u64) -> Self {
        self.memory_limit = mb.saturating_mul(1024 * 1024);
        self
    }

    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }
}

/// A run that finished within its limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub stdout: String,
    pub stderr: String,
    /// Exit code, if the process exited normally
    pub exit_code: Option<i32>,
    /// Terminating signal, if the process was killed by one
    pub signal: Option<i32>,
    pub elapsed: Duration,
    /// Highest sampled resident memory in bytes
    pub peak_memory: u64,
}

impl Execution {
    /// Whether the process exited with status zero
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Result of a bounded run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(Execution),
    TimeLimitExceeded { elapsed: Duration, peak_memory: u64 },
    MemoryLimitExceeded { peak: u64, elapsed: Duration },
}

enum Termination {
    Exited(std::io::Result<ExitStatus>),
    MemoryBreach(u64),
    TimedOut,
}

/// Executes artifacts under time and memory limits
#[derive(Clone)]
pub struct SandboxRunner {
    probe: Arc<dyn MemoryProbe>,
}

impl Default for SandboxRunner {
    fn default() -> Self {
        Self::new(default_probe())
    }
}

impl SandboxRunner {
    /// Create a runner that samples memory with `probe`
    pub fn new(probe: Arc<dyn MemoryProbe>) -> Self {
        Self { probe }
    }

    /// Run `artifact` with `input` on stdin.
    ///
    /// The child is always terminated and reaped before this returns. When
    /// both limits trip, memory wins.
    pub async fn run(&self, artifact: &Path, input: &str, limits: &SandboxLimits) -> Result<RunOutcome> {
        ensure_executable(artifact);

        let mut cmd = Command::new(artifact);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = artifact.parent() {
            cmd.current_dir(dir);
        }

        let start = Instant::now();
        let mut child = spawn_with_retry(&mut cmd)
            .await
            .map_err(|e| JudgeError::Sandbox(format!("failed to launch {}: {}", artifact.display(), e)))?;
        let pid = child
            .id()
            .ok_or_else(|| JudgeError::Sandbox(format!("no pid for {}", artifact.display())))?;
        log::debug!("Launched {} as pid {}", artifact.display(), pid);

        let stdin_task = feed_stdin(&mut child, input);
        let stdout_task = spawn_reader(child.stdout.take(), limits.max_output_bytes);
        let stderr_task = spawn_reader(child.stderr.take(), limits.max_output_bytes);

        let (breach_tx, mut breach_rx) = oneshot::channel();
        let monitor = spawn_monitor(
            self.probe.clone(),
            pid,
            limits.memory_limit,
            limits.sample_interval,
            breach_tx,
        );

        let termination = tokio::select! {
            biased;
            Ok(peak) = &mut breach_rx => Termination::MemoryBreach(peak),
            status = child.wait() => Termination::Exited(status),
            _ = tokio::time::sleep(limits.time_limit) => Termination::TimedOut,
        };
        let elapsed = start.elapsed();

        if !matches!(termination, Termination::Exited(_)) {
            kill_and_reap(&mut child, pid).await;
        }

        stdin_task.abort();
        let mut peak = monitor.finish().await?;
        if let Ok(late) = breach_rx.try_recv() {
            peak = peak.max(late);
        }

        if let Termination::MemoryBreach(breach) = termination {
            peak = peak.max(breach);
        }
        if peak > limits.memory_limit {
            tracing::info!(pid, peak, limit = limits.memory_limit, "Memory limit exceeded");
            tokio::join!(drain(stdout_task), drain(stderr_task));
            return Ok(RunOutcome::MemoryLimitExceeded { peak, elapsed });
        }

        let status = match termination {
            Termination::Exited(status) => {
                status.map_err(|e| JudgeError::Sandbox(format!("failed to wait for pid {}: {}", pid, e)))?
            }
            _ => {
                tracing::info!(pid, elapsed_ms = elapsed.as_millis() as u64, "Time limit exceeded");
                tokio::join!(drain(stdout_task), drain(stderr_task));
                return Ok(RunOutcome::TimeLimitExceeded {
                    elapsed,
                    peak_memory: peak,
                });
            }
        };

        let (stdout, stderr) = tokio::join!(drain(stdout_task), drain(stderr_task));

        Ok(RunOutcome::Completed(Execution {
            stdout: String::from_utf8_lossy(&stdout).to_string(),
            stderr: String::from_utf8_lossy(&stderr).to_string(),
            exit_code: status.code(),
            signal: exit_signal(&status),
            elapsed,
            peak_memory: peak,
        }))
    }
}

impl std::fmt::Debug for SandboxRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxRunner")
            .field("probe", &self.probe.name())
            .finish()
    }
}

/// Spawn, retrying briefly while a freshly written executable is still held open
async fn spawn_with_retry(cmd: &mut Command) -> std::io::Result<Child> {
    let mut attempt = 0;
    loop {
        match cmd.spawn() {
            Err(e) if e.kind() == std::io::ErrorKind::ExecutableFileBusy && attempt < SPAWN_ATTEMPTS => {
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            result => return result,
        }
    }
}

/// Write the input and close stdin; a child that never reads is not an error
fn feed_stdin(child: &mut Child, input: &str) -> JoinHandle<()> {
    let stdin = child.stdin.take();
    let bytes = input.as_bytes().to_vec();
    tokio::spawn(async move {
        if let Some(mut stdin) = stdin {
            if let Err(e) = stdin.write_all(&bytes).await {
                log::trace!("stdin write ended early: {}", e);
            }
            let _ = stdin.shutdown().await;
        }
    })
}

/// Read a pipe to EOF, keeping at most `cap` bytes
fn spawn_reader<R>(pipe: Option<R>, cap: usize) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut kept = Vec::new();
        let Some(mut pipe) = pipe else {
            return kept;
        };
        let mut chunk = [0u8; 8192];
        loop {
            match pipe.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let room = cap.saturating_sub(kept.len());
                    kept.extend_from_slice(&chunk[..n.min(room)]);
                }
            }
        }
        kept
    })
}

/// Collect a reader's bytes; descendants holding the pipe open are cut off
async fn drain(mut task: JoinHandle<Vec<u8>>) -> Vec<u8> {
    match tokio::time::timeout(PIPE_DRAIN_TIMEOUT, &mut task).await {
        Ok(Ok(bytes)) => bytes,
        _ => {
            task.abort();
            Vec::new()
        }
    }
}

async fn kill_and_reap(child: &mut Child, pid: u32) {
    if let Err(e) = child.kill().await {
        log::debug!("kill of pid {} failed ({}); waiting instead", pid, e);
        let _ = child.wait().await;
    }
    log::debug!("Terminated pid {}", pid);
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

#[cfg(unix)]
fn ensure_executable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = std::fs::metadata(path) {
        let mut perms = meta.permissions();
        if perms.mode() & 0o111 == 0 {
            perms.set_mode(0o755);
            if let Err(e) = std::fs::set_permissions(path, perms) {
                log::warn!("Could not mark {} executable: {}", path.display(), e);
            }
        }
    }
}

#[cfg(not(unix))]
fn ensure_executable(_path: &Path) {}
