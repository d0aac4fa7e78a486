//! End-to-end judging tests
//!
//! Drives the full stack (workspace, toolchain, sandbox, verifier, controller)
//! with POSIX shell "programs" so no C++ compiler is needed.
#![cfg(unix)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use judgeloop::builder::{Builder, presets};
use judgeloop::repair::ScriptedOracle;
use judgeloop::sandbox::{NullProbe, ProcfsProbe, SandboxLimits, SandboxRunner};
use judgeloop::verify::Verifier;
use judgeloop::workspace::{WorkspaceConfig, WorkspaceManager};
use judgeloop::{ControllerConfig, IterationController, Judge, RepairOutcome, Sample, SampleJudge, Verdict};
use tempfile::TempDir;

const ECHO_SECOND_LINE: &str = "#!/bin/sh\nread n\nread line\necho \"$line\"\n";
const PRINT_ZERO: &str = "#!/bin/sh\necho 0\n";
const SYNTAX_ERROR: &str = "#!/bin/sh\nif then fi (\n";
const SPIN: &str = "#!/bin/sh\nwhile :; do :; done\n";
const GROW_THEN_SPIN: &str =
    "#!/bin/sh\nx=0123456789abcdef; i=0\nwhile [ $i -lt 22 ]; do x=\"$x$x\"; i=$((i+1)); done\nwhile :; do :; done\n";

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn judge(dir: &TempDir, time_limit: Duration) -> Judge {
    Judge::new(
        WorkspaceManager::new(WorkspaceConfig::new(dir.path()).with_extension("sh")),
        Builder::new(Arc::new(presets::shell_script())),
        SandboxRunner::new(Arc::new(NullProbe)),
        Verifier::default(),
        SandboxLimits::default().with_time_limit(time_limit),
    )
}

fn controller(judge: Judge, oracle: Arc<ScriptedOracle>, max_iterations: u32) -> IterationController<Judge, ScriptedOracle> {
    IterationController::new(
        Arc::new(judge),
        oracle,
        ControllerConfig::new(max_iterations).with_repair_delay(Duration::ZERO),
    )
    .unwrap()
}

fn workspace_is_empty(dir: &TempDir) -> bool {
    std::fs::read_dir(dir.path()).unwrap().next().is_none()
}

#[tokio::test]
async fn test_echo_program_is_accepted() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let judge = judge(&dir, Duration::from_secs(5));

    let verdict = judge
        .judge(ECHO_SECOND_LINE, &Sample::new("3\n1 2 3", "1 2 3"))
        .await
        .unwrap();
    assert!(verdict.is_accepted(), "got {:?}", verdict);
    assert!(workspace_is_empty(&dir));
}

#[tokio::test]
async fn test_syntax_error_requests_repair_without_running() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let oracle = Arc::new(ScriptedOracle::new().then_return(ECHO_SECOND_LINE));
    let controller = controller(judge(&dir, Duration::from_secs(5)), oracle.clone(), 3);

    let samples = vec![Sample::new("3\n1 2 3", "1 2 3"), Sample::new("1\n7", "7")];
    let result = controller.run(SYNTAX_ERROR, &samples).await.unwrap();

    assert!(result.success);
    assert_eq!(result.iterations_used, 2);
    let first = &result.history[0];
    for (_, verdict) in &first.per_sample_verdicts {
        match verdict {
            Verdict::CompileError { message } => assert!(!message.trim().is_empty()),
            other => panic!("expected CE, got {:?}", other),
        }
    }
    assert_eq!(oracle.call_count(), 1);
    assert_eq!(result.final_candidate, ECHO_SECOND_LINE);
    assert!(workspace_is_empty(&dir));
}

#[tokio::test]
async fn test_infinite_loop_times_out() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let judge = judge(&dir, Duration::from_secs(2));

    let start = Instant::now();
    let verdict = judge.judge(SPIN, &Sample::new("", "")).await.unwrap();
    match verdict {
        Verdict::TimeLimitExceeded { elapsed } => {
            assert!(elapsed >= Duration::from_secs(2));
            assert!(elapsed < Duration::from_secs(4));
        }
        other => panic!("expected TLE, got {:?}", other),
    }
    assert!(start.elapsed() < Duration::from_secs(6));
    assert!(workspace_is_empty(&dir));
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_real_allocation_is_memory_limit_not_time_limit() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let judge = judge(&dir, Duration::from_secs(10))
        .with_probe(Arc::new(ProcfsProbe::default()))
        .with_limits(
            SandboxLimits::default()
                .with_time_limit(Duration::from_secs(10))
                .with_memory_limit_mb(16),
        );

    let verdict = judge.judge(GROW_THEN_SPIN, &Sample::new("", "")).await.unwrap();
    match verdict {
        Verdict::MemoryLimitExceeded { peak } => assert!(peak > 16 * 1024 * 1024),
        other => panic!("expected MLE, got {:?}", other),
    }
    assert!(workspace_is_empty(&dir));
}

#[tokio::test]
async fn test_unchanged_oracle_ends_at_budget() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let oracle = Arc::new(ScriptedOracle::new());
    let controller = controller(judge(&dir, Duration::from_secs(5)), oracle.clone(), 3);

    let result = controller.run(PRINT_ZERO, &[Sample::new("", "1")]).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.iterations_used, 3);
    assert_eq!(oracle.call_count(), 2);
    assert_eq!(result.no_progress_count(), 2);
    assert_eq!(result.history[2].repair, RepairOutcome::NotRequested);
    assert_eq!(
        result.failure_summary(),
        vec!["sample 1: WA - wrong answer".to_string()]
    );
}

#[tokio::test]
async fn test_repair_report_reaches_oracle() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let oracle = Arc::new(ScriptedOracle::new().then_return("#!/bin/sh\necho 1\n"));
    let controller = controller(judge(&dir, Duration::from_secs(5)), oracle.clone(), 4);

    let result = controller.run(PRINT_ZERO, &[Sample::new("", "1")]).await.unwrap();
    assert!(result.success);

    let request = &oracle.requests()[0];
    assert_eq!(request.attempt, 1);
    assert_eq!(request.candidate, PRINT_ZERO);
    let rendered = request.report.render();
    assert!(rendered.contains("WA"));
    assert!(rendered.contains("**Actual output:**\n```\n0\n```"));
}

#[tokio::test]
async fn test_identical_concurrent_sessions_do_not_collide() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let judge = Arc::new(judge(&dir, Duration::from_secs(5)));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let judge = judge.clone();
            tokio::spawn(async move {
                let sample = Sample::new(format!("1\n{}", i), i.to_string());
                judge.judge(ECHO_SECOND_LINE, &sample).await
            })
        })
        .collect();

    for handle in handles {
        let verdict = handle.await.unwrap().unwrap();
        assert!(verdict.is_accepted(), "got {:?}", verdict);
    }
    assert!(workspace_is_empty(&dir));
}

#[tokio::test]
async fn test_run_result_serializes() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let controller = controller(judge(&dir, Duration::from_secs(5)), Arc::new(ScriptedOracle::new()), 1);

    let result = controller.run(PRINT_ZERO, &[Sample::new("", "0")]).await.unwrap();
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["history"][0]["per_sample_verdicts"][0][1]["status"], "accepted");
}
