//! Ephemeral on-disk workspaces for build/run attempts.
//!
//! Every compile attempt gets its own source and artifact path under a
//! shared base directory. Identities are collision-free across concurrent
//! sessions and the files are removed before the judge returns.

mod manager;

pub use manager::{
    SourceStore, SyncedFileStore, WorkspaceConfig, WorkspaceError, WorkspaceHandle, WorkspaceManager,
};
