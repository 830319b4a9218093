use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use asset_fetch::{
    ArtifactFetcher, DownloadEngine, FetchReport, HttpClient, JobRecord, ProgressSink,
};
use tracing::{debug, info};

use crate::ProcessExit;
use crate::app::{config_runtime, progress_manager::BarProgress, terminal};
use crate::app_config::{self, FileConfig, VerbositySetting};
use crate::cli::{Args, Command};

pub(crate) async fn run(args: Args) -> Result<ProcessExit> {
    let loaded = app_config::load_config(args.config.as_deref())?;
    let file_config = loaded.file_config();

    let default_level =
        config_runtime::resolve_default_log_level(args.quiet, args.verbose, file_config.verbosity);
    terminal::init_tracing(default_level);

    debug!(
        ?args,
        config_path = ?loaded.path,
        verbosity = file_config.verbosity.map(VerbositySetting::as_str),
        "CLI arguments parsed"
    );

    let use_progress = terminal::progress_bar_requested(args.quiet, args.no_progress);
    match args.command {
        Command::Fetch { url, dest } => {
            let progress = use_progress.then(|| Arc::new(BarProgress::new(&display_name(&dest))));
            let engine = build_engine(&args.retry, &file_config, progress.clone());
            let result = engine.fetch(&url, &dest).await;
            if let Some(progress) = &progress {
                progress.finish();
            }
            let report = result.with_context(|| format!("Failed to download {url}"))?;
            log_report(&report);
        }
        Command::Job {
            job_file,
            index,
            output_dir,
        } => {
            let job = read_job_record(&job_file)?;
            let output_dir = output_dir
                .or_else(|| file_config.download_dir.clone())
                .unwrap_or_else(|| PathBuf::from("."));
            let progress = use_progress
                .then(|| Arc::new(BarProgress::new(&format!("{}[{index}]", job.job_id))));
            let engine = build_engine(&args.retry, &file_config, progress.clone());
            let fetcher = ArtifactFetcher::new(engine, output_dir);
            let result = fetcher.fetch(&job, index).await;
            if let Some(progress) = &progress {
                progress.finish();
            }
            let report = result
                .with_context(|| format!("Failed to fetch file {index} of job {}", job.job_id))?;
            log_report(&report);
        }
    }

    Ok(ProcessExit::Success)
}

fn build_engine(
    retry: &crate::cli::RetryArgs,
    file_config: &FileConfig,
    progress: Option<Arc<BarProgress>>,
) -> DownloadEngine {
    let client = HttpClient::with_connect_timeout(config_runtime::resolve_connect_timeout_secs(
        file_config,
    ));
    let engine = DownloadEngine::new(Arc::new(client))
        .with_policy(config_runtime::resolve_retry_policy(retry, file_config))
        .with_settings(config_runtime::resolve_engine_settings(file_config));
    match progress {
        Some(progress) => engine.with_progress(progress as Arc<dyn ProgressSink>),
        None => engine,
    }
}

fn read_job_record(path: &Path) -> Result<JobRecord> {
    let raw = if path.as_os_str() == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read job record from stdin")?;
        buffer
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read job record '{}'", path.display()))?
    };
    serde_json::from_str(&raw)
        .with_context(|| format!("Invalid job record JSON in '{}'", path.display()))
}

fn display_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |name| name.to_string_lossy().into_owned(),
    )
}

fn log_report(report: &FetchReport) {
    if report.already_complete {
        info!(path = %report.path.display(), bytes = report.bytes, "Already downloaded");
    } else {
        info!(
            path = %report.path.display(),
            bytes = report.bytes,
            resumed_from = report.resumed_from,
            attempts = report.attempts,
            "Download complete"
        );
    }
}
