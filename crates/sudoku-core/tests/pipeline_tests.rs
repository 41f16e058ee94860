//! Integration tests for the pipeline with real child processes.
//!
//! Stub stages are small `sh` scripts so the spawn / pipe / reap path is the
//! one production uses.

use std::sync::Arc;
use std::time::{Duration, Instant};
use sudoku_core::{
    decode_transport, AdmissionLimits, ErrorKind, ExecutionContext, PipelineRunner, ProcessStage, StageKind,
    UploadPayload,
};

const GRID: &str = "530070000600195000098000060800060003400803001700020006060000280000419005000080079";

fn sh(kind: StageKind, script: &str) -> ProcessStage {
    ProcessStage::new(kind, "sh", ".")
        .with_args(["-c", script])
        .with_timeout(Duration::from_secs(5))
}

/// Reads one line and prints it reversed.
fn reversing_solver() -> ProcessStage {
    sh(
        StageKind::Solver,
        r#"awk 'NR==1 { for (i = length($0); i > 0; i--) printf "%s", substr($0, i, 1); print "" }'"#,
    )
}

fn fixed_grid_extractor() -> ProcessStage {
    sh(StageKind::Extractor, &format!("cat >/dev/null; echo {GRID}"))
}

fn pipeline(extractor: ProcessStage, solver: ProcessStage) -> PipelineRunner {
    PipelineRunner::new(Arc::new(extractor), Arc::new(solver), AdmissionLimits::default())
}

// =============================================================================
// End to end
// =============================================================================

#[tokio::test]
async fn test_fixed_grid_is_reversed_by_solver() {
    let runner = pipeline(fixed_grid_extractor(), reversing_solver());
    let upload = UploadPayload::new(vec![0x89, b'P', b'N', b'G', 0x00, 0xff, 0x10]);

    let out = runner.execute(&upload, &ExecutionContext::new()).await.unwrap();

    let expected: String = GRID.chars().rev().collect();
    let body = String::from_utf8(out.solved.into_bytes()).unwrap();
    assert_eq!(body.trim_end(), expected);
}

#[tokio::test]
async fn test_extractor_receives_base64_line() {
    // The extractor echoes what it read, so the solver (cat) returns it.
    let extractor = sh(StageKind::Extractor, "cat");
    let solver = sh(StageKind::Solver, "cat");
    let runner = pipeline(extractor, solver);
    let bytes: Vec<u8> = (0..=255u8).collect();

    let out = runner.execute(&UploadPayload::new(bytes.clone()), &ExecutionContext::new()).await.unwrap();

    let line = String::from_utf8(out.solved.into_bytes()).unwrap();
    assert!(line.ends_with('\n'));
    assert_eq!(line.matches('\n').count(), 1);
    assert_eq!(decode_transport(&line).unwrap(), bytes);
}

// =============================================================================
// Failure handling
// =============================================================================

#[tokio::test]
async fn test_failing_extractor_never_runs_solver() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("solver-ran");
    let extractor = sh(StageKind::Extractor, "cat >/dev/null; echo 'no contour' >&2; exit 1");
    let solver = sh(StageKind::Solver, &format!("cat >/dev/null; touch {}; echo solved", marker.display()));
    let runner = pipeline(extractor, solver);

    let err = runner
        .execute(&UploadPayload::new(b"img".to_vec()), &ExecutionContext::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NonZeroExit);
    assert_eq!(err.stage(), Some(StageKind::Extractor));
    assert!(!marker.exists(), "solver must not be spawned");
}

#[tokio::test]
async fn test_silent_extractor_is_empty_output() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("solver-ran");
    let extractor = sh(StageKind::Extractor, "cat >/dev/null");
    let solver = sh(StageKind::Solver, &format!("cat >/dev/null; touch {}; echo solved", marker.display()));
    let runner = pipeline(extractor, solver);

    let err = runner
        .execute(&UploadPayload::new(b"img".to_vec()), &ExecutionContext::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::EmptyStageOutput);
    assert!(!marker.exists());
}

#[tokio::test]
async fn test_missing_solver_binary_is_per_request_error() {
    let dir = tempfile::tempdir().unwrap();
    let solver = ProcessStage::new(StageKind::Solver, "./main", dir.path());
    let runner = pipeline(fixed_grid_extractor(), solver);

    let err = runner
        .execute(&UploadPayload::new(b"img".to_vec()), &ExecutionContext::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SpawnFailed);

    // Same runner keeps serving.
    let runner = pipeline(fixed_grid_extractor(), reversing_solver());
    assert!(runner.execute(&UploadPayload::new(b"img".to_vec()), &ExecutionContext::new()).await.is_ok());
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_timeout_leaves_no_process_behind() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("pid");
    let solver = sh(StageKind::Solver, &format!("echo $$ > {}; exec sleep 30", pid_file.display()))
        .with_timeout(Duration::from_millis(500));
    let runner = pipeline(fixed_grid_extractor(), solver);

    let started = Instant::now();
    let err = runner
        .execute(&UploadPayload::new(b"img".to_vec()), &ExecutionContext::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(started.elapsed() < Duration::from_secs(10));

    let pid = std::fs::read_to_string(&pid_file).unwrap();
    let proc_entry = std::path::Path::new("/proc").join(pid.trim());
    assert!(!proc_entry.exists(), "stage process {} still in the process table", pid.trim());
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test]
async fn test_concurrent_requests_keep_their_own_output() {
    const N: usize = 8;
    let runners: Vec<PipelineRunner> = (0..N)
        .map(|i| {
            let extractor = sh(StageKind::Extractor, &format!("cat >/dev/null; sleep 0.3; echo grid-{i}"));
            pipeline(extractor, sh(StageKind::Solver, "cat"))
        })
        .collect();

    let started = Instant::now();
    let results = futures::future::join_all(runners.iter().map(|runner| async move {
        runner
            .execute(&UploadPayload::new(b"img".to_vec()), &ExecutionContext::new())
            .await
    }))
    .await;

    // Sequential would be N * 300ms.
    assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
    for (i, result) in results.into_iter().enumerate() {
        let body = String::from_utf8(result.unwrap().solved.into_bytes()).unwrap();
        assert_eq!(body, format!("grid-{i}\n"));
    }
}
