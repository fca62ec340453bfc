use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;

use narrate_rs::config::PipelineConfig;
use narrate_rs::dispatch::{CancelPolicy, ProgressEvent};
use narrate_rs::pipeline::{Pipeline, RunReport};
use narrate_rs::synthesis::ProcessWorker;

#[derive(Debug, Parser)]
#[command(name = "narrate")]
#[command(about = "Narrate an EPUB or text file into a single WAV audiobook")]
struct Cli {
    /// Document to narrate (.epub or UTF-8 text).
    input: PathBuf,
    /// TOML config file; missing files fall back to defaults.
    #[arg(long, default_value = "narrate.toml")]
    config: PathBuf,
    /// Final audiobook path.
    #[arg(long)]
    output: Option<PathBuf>,
    /// Directory for per-chunk audio.
    #[arg(long)]
    output_dir: Option<PathBuf>,
    #[arg(long)]
    chunk_size: Option<usize>,
    #[arg(long)]
    concurrency: Option<usize>,
    #[arg(long)]
    max_attempts: Option<u32>,
    #[arg(long)]
    pause_ms: Option<u64>,
    /// Skip this percentage of the text before narrating.
    #[arg(long)]
    start_percent: Option<f64>,
    /// Also write the run report as JSON.
    #[arg(long)]
    report_json: Option<PathBuf>,
    /// On Ctrl-C, kill running synthesis after this many seconds instead of
    /// waiting for it.
    #[arg(long)]
    abort_grace_secs: Option<u64>,
}

impl Cli {
    fn apply_to(&self, config: &mut PipelineConfig) {
        if let Some(path) = &self.output {
            config.final_output_path = path.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output_directory = dir.clone();
        }
        if let Some(size) = self.chunk_size {
            config.max_chunk_size = size;
        }
        if let Some(n) = self.concurrency {
            config.concurrency = n;
        }
        if let Some(n) = self.max_attempts {
            config.retry.max_attempts = n;
        }
        if let Some(ms) = self.pause_ms {
            config.pause_duration_ms = ms;
        }
        if let Some(pct) = self.start_percent {
            config.start_offset_percent = pct;
        }
        if let Some(secs) = self.abort_grace_secs {
            config.cancel_policy = CancelPolicy::Abort {
                grace_ms: secs.saturating_mul(1000),
            };
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Cli::parse()).await {
        Ok(report) => ExitCode::from(report.exit_code()),
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> Result<RunReport> {
    let mut config = PipelineConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    cli.apply_to(&mut config);
    config.validate()?;

    let worker = ProcessWorker::new(config.worker.clone(), &config.output_directory);
    let (progress_tx, progress_rx) = mpsc::unbounded_channel();
    let pipeline = Pipeline::new(config, Arc::new(worker)).with_progress(progress_tx);

    let cancel = pipeline.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted; finishing up with the chunks done so far");
            cancel.cancel();
        }
    });
    let progress = tokio::spawn(log_progress(progress_rx));

    let result = pipeline.run_document(&cli.input).await;
    drop(pipeline);
    let _ = progress.await;
    let report = result?;

    print_summary(&report);
    if let Some(path) = &cli.report_json {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(report)
}

async fn log_progress(mut rx: mpsc::UnboundedReceiver<ProgressEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            ProgressEvent::Queued { total } => log::info!("Queued {total} chunks"),
            ProgressEvent::Dispatched {
                chunk_index,
                attempt,
            } if attempt > 1 => log::info!("Chunk {chunk_index}: attempt {attempt}"),
            ProgressEvent::Finished {
                completed, total, ..
            } if completed % 10 == 0 || completed == total => {
                log::info!("Progress: {completed}/{total}")
            }
            _ => {}
        }
    }
}

fn print_summary(report: &RunReport) {
    println!(
        "Narrated {}/{} chunks into {} ({:.1}s of audio in {:.1}s)",
        report.succeeded,
        report.total_chunks,
        report.output_path.display(),
        report.audio_duration_secs,
        report.elapsed_secs
    );
    for skipped in &report.skipped {
        let file = skipped
            .artifact
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        println!(
            "  skipped chunk {} ({file}) after {} attempt(s): {}",
            skipped.index, skipped.attempts, skipped.reason
        );
    }
    for anomaly in &report.oversized {
        println!(
            "  chunk {} is {} chars (limit {})",
            anomaly.chunk_index, anomaly.length, anomaly.max_size
        );
    }
    if report.cancelled {
        println!("  run was cancelled before every chunk finished");
    }
}
