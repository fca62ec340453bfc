//! End-to-end narration: text in, one WAV file and a [`RunReport`] out.

use std::io;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::audio::{merge_to_file, MergeError};
use crate::config::{ConfigError, PipelineConfig};
use crate::dispatch::{Dispatcher, JobOutcome, ProgressEvent};
use crate::synthesis::{artifact_path, SynthesisWorker};
use crate::text::{chunk_text, extract_text, ChunkingAnomaly, ExtractionError};

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error("input contains no text to narrate")]
    NoText,
    #[error("cannot prepare output directory {}: {source}", .path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Merge(#[from] MergeError),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A chunk that is missing from the final audio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedChunk {
    pub index: usize,
    /// Where the chunk's audio would have been written.
    pub artifact: PathBuf,
    pub attempts: u32,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Complete,
    /// The final file exists but some chunks are missing from it.
    Partial,
}

/// Summary of one narration run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub total_chunks: usize,
    pub succeeded: usize,
    pub skipped: Vec<SkippedChunk>,
    pub oversized: Vec<ChunkingAnomaly>,
    pub audio_duration_secs: f64,
    pub elapsed_secs: f64,
    pub output_path: PathBuf,
    pub cancelled: bool,
}

impl RunReport {
    pub fn status(&self) -> RunStatus {
        if self.skipped.is_empty() {
            RunStatus::Complete
        } else {
            RunStatus::Partial
        }
    }

    /// Process exit status for this report: `0` complete, `2` partial.
    pub fn exit_code(&self) -> u8 {
        match self.status() {
            RunStatus::Complete => 0,
            RunStatus::Partial => 2,
        }
    }
}

/// Chunk, synthesize and merge with one [`PipelineConfig`].
pub struct Pipeline {
    config: PipelineConfig,
    worker: Arc<dyn SynthesisWorker>,
    cancel: CancellationToken,
    progress: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, worker: Arc<dyn SynthesisWorker>) -> Self {
        Self {
            config,
            worker,
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    pub fn with_progress(mut self, tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Token that stops dispatching when cancelled. Chunks finished so far are
    /// still merged.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Extract the text of `path` (EPUB or plain text), then narrate it.
    pub async fn run_document(&self, path: &Path) -> Result<RunReport, PipelineError> {
        self.config.validate()?;
        let owned = path.to_path_buf();
        let offset = self.config.start_offset_percent;
        let text = tokio::task::spawn_blocking(move || extract_text(&owned, offset)).await??;
        self.run_text(&text).await
    }

    pub async fn run_text(&self, text: &str) -> Result<RunReport, PipelineError> {
        self.config.validate()?;
        let started = Instant::now();
        let config = &self.config;

        let plan = chunk_text(text, non_zero(config.max_chunk_size, "max_chunk_size")?);
        if plan.chunks.is_empty() {
            return Err(PipelineError::NoText);
        }
        log::info!(
            "Split text into {} chunks ({} oversized)",
            plan.chunks.len(),
            plan.anomalies.len()
        );

        let out_dir = &config.output_directory;
        tokio::fs::create_dir_all(out_dir)
            .await
            .map_err(|source| PipelineError::OutputDir {
                path: out_dir.clone(),
                source,
            })?;

        let mut dispatcher = Dispatcher::new(
            Arc::clone(&self.worker),
            config.voice.clone(),
            non_zero(config.concurrency, "concurrency")?,
            config.retry,
        )
        .with_cancellation(self.cancel.clone(), config.cancel_policy);
        if let Some(tx) = &self.progress {
            dispatcher = dispatcher.with_progress(tx.clone());
        }
        let collected = dispatcher.run(&plan.chunks).await;

        let outcomes = collected.outcomes;
        let pause_ms = config.pause_duration_ms;
        let final_path = config.final_output_path.clone();
        let (outcomes, summary) = tokio::task::spawn_blocking(move || {
            let summary = merge_to_file(&outcomes, pause_ms, &final_path)?;
            Ok::<_, MergeError>((outcomes, summary))
        })
        .await??;

        if !config.keep_chunk_artifacts {
            remove_artifacts(&outcomes).await;
        }

        let skipped: Vec<SkippedChunk> = outcomes
            .iter()
            .filter_map(|o| {
                o.failure().map(|reason| SkippedChunk {
                    index: o.chunk_index,
                    artifact: artifact_path(out_dir, &plan.chunks[o.chunk_index]),
                    attempts: o.attempt_count,
                    reason: reason.to_string(),
                })
            })
            .collect();

        Ok(RunReport {
            total_chunks: plan.chunks.len(),
            succeeded: outcomes.len() - skipped.len(),
            skipped,
            oversized: plan.anomalies,
            audio_duration_secs: summary.duration_secs(),
            elapsed_secs: started.elapsed().as_secs_f64(),
            output_path: config.final_output_path.clone(),
            cancelled: self.cancel.is_cancelled(),
        })
    }
}

fn non_zero(value: usize, name: &str) -> Result<NonZeroUsize, ConfigError> {
    NonZeroUsize::new(value).ok_or_else(|| ConfigError::Invalid(format!("{name} must be at least 1")))
}

async fn remove_artifacts(outcomes: &[JobOutcome]) {
    for artifact in outcomes.iter().filter_map(JobOutcome::artifact) {
        if let Err(e) = tokio::fs::remove_file(&artifact.path).await {
            log::warn!("Could not remove {}: {e}", artifact.path.display());
        }
    }
}
