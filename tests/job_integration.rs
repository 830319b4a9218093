//! Integration tests for fetching job artifacts.

mod support;

use std::sync::Arc;
use std::time::Duration;

use asset_fetch::download::{DownloadEngine, RetryPolicy};
use asset_fetch::{ArtifactFetcher, JobError, JobRecord, JobStatus, ResultFile};
use support::payload;
use support::scripted_transport::{ProbeMode, ScriptedTransport};
use tempfile::TempDir;

fn job_with(files: Vec<ResultFile>) -> JobRecord {
    JobRecord {
        job_id: "a1b2-c3".to_string(),
        status: JobStatus::Done,
        files,
        error: String::new(),
    }
}

fn file(file_type: &str) -> ResultFile {
    ResultFile {
        file_type: file_type.to_string(),
        url: "https://cdn.example.com/result".to_string(),
        preview_image_url: None,
    }
}

fn fetcher(transport: &Arc<ScriptedTransport>, dir: &TempDir) -> ArtifactFetcher {
    let engine = DownloadEngine::new(Arc::clone(transport) as Arc<dyn asset_fetch::Transport>)
        .with_policy(RetryPolicy::default().with_backoff_floor(Duration::from_millis(1)));
    ArtifactFetcher::new(engine, dir.path())
}

#[tokio::test]
async fn test_fetch_names_artifact_after_job_and_index() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let content = payload(9000);
    let transport = Arc::new(ScriptedTransport::new(content.clone(), ProbeMode::Head));

    let job = job_with(vec![file("GLB"), file("")]);
    let fetcher = fetcher(&transport, &temp_dir);

    let first = fetcher.fetch(&job, 0).await.expect("first artifact");
    assert_eq!(first.path, temp_dir.path().join("a1b2-c3_0.glb"));
    assert_eq!(std::fs::read(&first.path).expect("read artifact"), content);

    let second = fetcher.fetch(&job, 1).await.expect("second artifact");
    assert_eq!(second.path, temp_dir.path().join("a1b2-c3_1.bin"));
}

#[tokio::test]
async fn test_concurrent_fetches_of_same_artifact_download_once() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let content = payload(200_000);
    let transport = Arc::new(ScriptedTransport::new(content.clone(), ProbeMode::Head));

    let job = job_with(vec![file("OBJ")]);
    let fetcher = fetcher(&transport, &temp_dir);

    let (a, b) = tokio::join!(fetcher.fetch(&job, 0), fetcher.fetch(&job, 0));
    let (a, b) = (a.expect("first fetch"), b.expect("second fetch"));

    assert_eq!(
        u8::from(a.already_complete) + u8::from(b.already_complete),
        1,
        "exactly one call should short-circuit"
    );
    assert_eq!(transport.transfers().len(), 1);
    assert_eq!(std::fs::read(&a.path).expect("read artifact"), content);
}

#[tokio::test]
async fn test_fetch_unfinished_job_makes_no_requests() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let transport = Arc::new(ScriptedTransport::new(payload(10), ProbeMode::Head));

    let mut job = job_with(vec![file("GLB")]);
    job.status = JobStatus::Fail;
    job.error = "generation failed".to_string();

    let err = fetcher(&transport, &temp_dir)
        .fetch(&job, 0)
        .await
        .expect_err("failed job cannot be fetched");
    assert!(matches!(err, JobError::NotDone { .. }));
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_fetch_rejects_unsafe_job_id() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let transport = Arc::new(ScriptedTransport::new(payload(10), ProbeMode::Head));

    let mut job = job_with(vec![file("GLB")]);
    job.job_id = "../../escape".to_string();

    let err = fetcher(&transport, &temp_dir)
        .fetch(&job, 0)
        .await
        .expect_err("traversal id must be rejected");
    assert!(matches!(err, JobError::InvalidJobId { .. }));
    assert!(transport.requests().is_empty());
}
