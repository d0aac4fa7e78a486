//! WorkspaceManager allocates and releases per-attempt source/artifact files.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::id::generate_workspace_id;

/// Errors from workspace allocation.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// The workspace could not be created at all
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The persisted source never matched what was written
    #[error("source write verification failed for {path} after {attempts} attempts")]
    VerificationFailed { path: PathBuf, attempts: u32 },
}

/// Configuration for the workspace manager.
#[derive(Debug, Clone)]
pub struct WorkspaceConfig {
    /// Directory holding all workspaces
    pub base_dir: PathBuf,
    /// Extension of the written source file (without the dot)
    pub source_extension: String,
    /// Write-then-verify attempts before giving up
    pub write_attempts: u32,
    /// Deletion attempts per file on release
    pub cleanup_attempts: u32,
    /// Pause between deletion attempts
    pub cleanup_backoff: Duration,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            base_dir: std::env::temp_dir().join("judgeloop"),
            source_extension: "cpp".to_string(),
            write_attempts: 3,
            cleanup_attempts: 3,
            cleanup_backoff: Duration::from_millis(100),
        }
    }
}

impl WorkspaceConfig {
    /// Create a config rooted at the given directory
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Default::default()
        }
    }

    /// Set the source file extension
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.source_extension = extension.into();
        self
    }

    /// Set the cleanup retry policy
    pub fn with_cleanup(mut self, attempts: u32, backoff: Duration) -> Self {
        self.cleanup_attempts = attempts.max(1);
        self.cleanup_backoff = backoff;
        self
    }
}

/// Identity and paths of one build/run attempt.
///
/// Dropping a handle that was never passed to [`WorkspaceManager::release`]
/// removes its files best-effort, so a cancelled judge call does not leak.
#[derive(Debug)]
pub struct WorkspaceHandle {
    id: String,
    source_path: PathBuf,
    artifact_path: PathBuf,
    released: bool,
}

impl WorkspaceHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn artifact_path(&self) -> &Path {
        &self.artifact_path
    }
}

impl Drop for WorkspaceHandle {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        for path in [&self.source_path, &self.artifact_path] {
            if let Err(e) = std::fs::remove_file(path)
                && e.kind() != std::io::ErrorKind::NotFound
            {
                log::warn!("Failed to remove unreleased workspace file {}: {}", path.display(), e);
            }
        }
    }
}

/// How source bytes reach disk and are read back for verification
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Write `bytes` to `path` and make them durable
    async fn write(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()>;

    /// Read back what is on disk at `path`
    async fn read_back(&self, path: &Path) -> std::io::Result<Vec<u8>>;
}

/// Plain files, fsynced before they are read back
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncedFileStore;

#[async_trait]
impl SourceStore for SyncedFileStore {
    async fn write(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let mut file = fs::File::create(path).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await
    }

    async fn read_back(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        fs::read(path).await
    }
}

/// Allocates collision-free workspaces and guarantees their removal.
#[derive(Clone)]
pub struct WorkspaceManager {
    config: WorkspaceConfig,
    store: Arc<dyn SourceStore>,
}

impl std::fmt::Debug for WorkspaceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl WorkspaceManager {
    /// Create a new WorkspaceManager.
    pub fn new(config: WorkspaceConfig) -> Self {
        Self {
            config,
            store: Arc::new(SyncedFileStore),
        }
    }

    /// Replace how sources are persisted and verified
    pub fn with_store(mut self, store: Arc<dyn SourceStore>) -> Self {
        self.store = store;
        self
    }

    /// Directory holding all workspaces
    pub fn base_dir(&self) -> &Path {
        &self.config.base_dir
    }

    /// Allocate a workspace and persist `source` into it.
    ///
    /// The source is flushed to disk and read back; the handle is only
    /// returned once the persisted bytes match what was written.
    pub async fn acquire(&self, source: &str) -> Result<WorkspaceHandle, WorkspaceError> {
        fs::create_dir_all(&self.config.base_dir)
            .await
            .map_err(|e| WorkspaceError::Io {
                path: self.config.base_dir.clone(),
                source: e,
            })?;

        let id = generate_workspace_id(source);
        let handle = WorkspaceHandle {
            source_path: self
                .config
                .base_dir
                .join(format!("{}.{}", id, self.config.source_extension)),
            artifact_path: self
                .config
                .base_dir
                .join(format!("{}{}", id, std::env::consts::EXE_SUFFIX)),
            id,
            released: false,
        };

        let attempts = self.config.write_attempts.max(1);
        for attempt in 1..=attempts {
            self.store
                .write(&handle.source_path, source.as_bytes())
                .await
                .map_err(|e| WorkspaceError::Io {
                    path: handle.source_path.clone(),
                    source: e,
                })?;

            let persisted = self
                .store
                .read_back(&handle.source_path)
                .await
                .map_err(|e| WorkspaceError::Io {
                    path: handle.source_path.clone(),
                    source: e,
                })?;

            if persisted == source.as_bytes() {
                log::debug!("Acquired workspace {}", handle.id);
                return Ok(handle);
            }

            log::warn!(
                "Workspace {} write verification mismatch (attempt {}/{})",
                handle.id,
                attempt,
                attempts
            );
        }

        Err(WorkspaceError::VerificationFailed {
            path: handle.source_path.clone(),
            attempts,
        })
    }

    /// Remove the workspace's files.
    ///
    /// Returns false if a file could not be removed after all attempts. A
    /// leaked file is logged and never fails the run.
    pub async fn release(&self, mut handle: WorkspaceHandle) -> bool {
        let mut clean = true;
        for path in [&handle.source_path, &handle.artifact_path] {
            if !self.remove_with_retry(path).await {
                clean = false;
            }
        }
        handle.released = true;
        log::debug!("Released workspace {} (clean: {})", handle.id, clean);
        clean
    }

    async fn remove_with_retry(&self, path: &Path) -> bool {
        let attempts = self.config.cleanup_attempts.max(1);
        for attempt in 1..=attempts {
            match fs::remove_file(path).await {
                Ok(()) => return true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return true,
                Err(e) => {
                    if attempt < attempts {
                        tokio::time::sleep(self.config.cleanup_backoff).await;
                    } else {
                        log::warn!(
                            "Leaking workspace file {} after {} attempts: {}",
                            path.display(),
                            attempts,
                            e
                        );
                    }
                }
            }
        }
        false
    }
}
