//! Resident-memory sampling for a running child process.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::{JudgeError, Result};

/// Point-in-time resident memory sampler
pub trait MemoryProbe: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Resident memory of `pid` in bytes.
    ///
    /// Returns None when the process is gone or the probe cannot observe it;
    /// the monitor stops sampling at that point.
    fn resident_bytes(&self, pid: u32) -> Option<u64>;
}

/// Reads `VmRSS` from `/proc/<pid>/status`
#[derive(Debug, Clone)]
pub struct ProcfsProbe {
    root: PathBuf,
}

impl Default for ProcfsProbe {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/proc"),
        }
    }
}

impl ProcfsProbe {
    /// Probe a procfs mounted somewhere other than `/proc`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl MemoryProbe for ProcfsProbe {
    fn name(&self) -> &str {
        "procfs"
    }

    fn resident_bytes(&self, pid: u32) -> Option<u64> {
        let status = std::fs::read_to_string(self.root.join(pid.to_string()).join("status")).ok()?;
        parse_vm_rss(&status)
    }
}

/// Extract `VmRSS` (reported in kB) from a procfs status file, in bytes.
///
/// Zombies have no `VmRSS` line, which reads as "gone".
fn parse_vm_rss(status: &str) -> Option<u64> {
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kb: u64 = line
        .trim_start_matches("VmRSS:")
        .split_whitespace()
        .next()?
        .parse()
        .ok()?;
    Some(kb * 1024)
}

/// Probe that never observes anything; disables memory enforcement
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProbe;

impl MemoryProbe for NullProbe {
    fn name(&self) -> &str {
        "null"
    }

    fn resident_bytes(&self, _pid: u32) -> Option<u64> {
        None
    }
}

/// Probe that reports a constant reading for every live sample
#[derive(Debug, Clone, Copy)]
pub struct FixedProbe(pub u64);

impl MemoryProbe for FixedProbe {
    fn name(&self) -> &str {
        "fixed"
    }

    fn resident_bytes(&self, _pid: u32) -> Option<u64> {
        Some(self.0)
    }
}

/// The probe for the current platform
pub fn default_probe() -> Arc<dyn MemoryProbe> {
    if cfg!(target_os = "linux") {
        Arc::new(ProcfsProbe::default())
    } else {
        log::warn!("No memory probe for this platform; memory limits are not enforced");
        Arc::new(NullProbe)
    }
}

/// Running monitor task; yields the peak it observed
pub(crate) struct MonitorHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<u64>,
}

impl MonitorHandle {
    /// Stop sampling and return the observed peak in bytes.
    ///
    /// A monitor that died (a panicking probe, say) may have missed a breach,
    /// so its failure is a fault rather than a zero reading.
    pub(crate) async fn finish(self) -> Result<u64> {
        let _ = self.stop_tx.send(true);
        self.task
            .await
            .map_err(|e| JudgeError::Internal(format!("memory monitor failed: {}", e)))
    }
}

/// Sample `pid` every `interval` until stopped, the process disappears, or
/// the peak exceeds `limit`. A breach is reported once over `breach_tx`.
pub(crate) fn spawn_monitor(
    probe: Arc<dyn MemoryProbe>,
    pid: u32,
    limit: u64,
    interval: Duration,
    breach_tx: oneshot::Sender<u64>,
) -> MonitorHandle {
    let (stop_tx, mut stop_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut peak = 0u64;
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = stop_rx.changed() => break,
                _ = ticker.tick() => {}
            }

            let Some(rss) = probe.resident_bytes(pid) else {
                break;
            };
            peak = peak.max(rss);

            if peak > limit {
                tracing::debug!(pid, peak, limit, probe = probe.name(), "Memory limit breached");
                let _ = breach_tx.send(peak);
                break;
            }
        }

        peak
    });

    MonitorHandle { stop_tx, task }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATUS: &str = "Name:\tsolution\nState:\tR (running)\nVmPeak:\t   10240 kB\nVmRSS:\t    2048 kB\nThreads:\t1\n";

    #[test]
    fn test_parse_vm_rss() {
        assert_eq!(parse_vm_rss(STATUS), Some(2048 * 1024));
    }

    #[test]
    fn test_parse_vm_rss_missing_for_zombie() {
        let zombie = "Name:\tsolution\nState:\tZ (zombie)\nThreads:\t1\n";
        assert_eq!(parse_vm_rss(zombie), None);
    }

    #[test]
    fn test_procfs_probe_custom_root() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("42")).unwrap();
        std::fs::write(dir.path().join("42").join("status"), STATUS).unwrap();

        let probe = ProcfsProbe::with_root(dir.path());
        assert_eq!(probe.resident_bytes(42), Some(2048 * 1024));
        assert_eq!(probe.resident_bytes(43), None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_procfs_probe_sees_current_process() {
        let probe = ProcfsProbe::default();
        let rss = probe.resident_bytes(std::process::id()).unwrap();
        assert!(rss > 0);
    }

    #[test]
    fn test_null_and_fixed_probes() {
        assert_eq!(NullProbe.resident_bytes(1), None);
        assert_eq!(FixedProbe(7).resident_bytes(1), Some(7));
    }

    #[tokio::test]
    async fn test_monitor_reports_breach() {
        let (tx, rx) = oneshot::channel();
        let monitor = spawn_monitor(Arc::new(FixedProbe(500)), 1, 100, Duration::from_millis(1), tx);

        let reported = rx.await.unwrap();
        assert_eq!(reported, 500);
        assert_eq!(monitor.finish().await.unwrap(), 500);
    }

    #[tokio::test]
    async fn test_monitor_stops_without_breach() {
        let (tx, mut rx) = oneshot::channel();
        let monitor = spawn_monitor(Arc::new(FixedProbe(50)), 1, 100, Duration::from_millis(1), tx);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(monitor.finish().await.unwrap(), 50);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_monitor_ends_when_process_unobservable() {
        let (tx, rx) = oneshot::channel();
        let monitor = spawn_monitor(Arc::new(NullProbe), 1, 100, Duration::from_millis(1), tx);

        // Sender is dropped once the monitor gives up
        assert!(rx.await.is_err());
        assert_eq!(monitor.finish().await.unwrap(), 0);
    }

    struct PanickingProbe;

    impl MemoryProbe for PanickingProbe {
        fn name(&self) -> &str {
            "panicking"
        }

        fn resident_bytes(&self, _pid: u32) -> Option<u64> {
            panic!("probe exploded");
        }
    }

    #[tokio::test]
    async fn test_monitor_failure_is_internal_error() {
        let (tx, rx) = oneshot::channel();
        let monitor = spawn_monitor(Arc::new(PanickingProbe), 1, 100, Duration::from_millis(1), tx);

        assert!(rx.await.is_err());
        let err = monitor.finish().await.unwrap_err();
        assert!(matches!(err, JudgeError::Internal(_)));
        assert!(err.to_string().contains("memory monitor failed"));
    }
}
