//! Identity generation for judgeloop
//!
//! Workspace identities must never collide, even for two byte-identical
//! sources submitted back-to-back or from concurrent sessions. Each id
//! combines a content fingerprint with the process id, a nanosecond
//! timestamp and a process-wide sequence number.

use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};

static WORKSPACE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Get current timestamp in nanoseconds since Unix epoch
pub fn now_nanos() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}

/// Short hex fingerprint of a source text (first 8 hex chars of SHA-256)
pub fn fingerprint(source: &str) -> String {
    let digest = Sha256::digest(source.as_bytes());
    hex::encode(&digest[..4])
}

/// Generate a unique workspace id for a source text
///
/// Format: `{fingerprint}-{pid}-{timestamp_ns}-{seq}`
/// Example: `9f86d081-4121-1738300800123456789-17`
pub fn generate_workspace_id(source: &str) -> String {
    let seq = WORKSPACE_SEQ.fetch_add(1, Ordering::Relaxed);
    format!(
        "{}-{}-{}-{}",
        fingerprint(source),
        std::process::id(),
        now_nanos(),
        seq
    )
}
