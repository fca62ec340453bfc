//! # narrate-rs
//!
//! Turn long-form text into one narrated WAV file.
//!
//! The text is split into sentence-aligned chunks, every chunk is synthesized
//! by an external speech engine with bounded concurrency and retries, and the
//! resulting segments are stitched back together in chunk order with a
//! configurable pause between them.
//!
//! ## Features
//!
//! - **Sentence-aware chunking**: chunks never split a sentence
//! - **Bounded, retrying dispatch**: a fixed pool of executors with per-chunk
//!   exponential backoff; one failing chunk never stops the others
//! - **Order-preserving merge**: format-checked concatenation with silence gaps
//! - **EPUB input** (default `epub` feature)
//!
//! ## Pipeline
//!
//! ```text
//! text ─▶ chunk_text ─▶ Dispatcher ──(SynthesisWorker × N)──▶ ResultCollector ─▶ merge ─▶ WAV
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use narrate_rs::config::PipelineConfig;
//! use narrate_rs::pipeline::Pipeline;
//! use narrate_rs::synthesis::ProcessWorker;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::default();
//! let worker = ProcessWorker::new(config.worker.clone(), &config.output_directory);
//! let pipeline = Pipeline::new(config, Arc::new(worker));
//!
//! let report = pipeline.run_text("Hello there. This is a test.").await?;
//! println!("{} of {} chunks narrated", report.succeeded, report.total_chunks);
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod config;
pub mod dispatch;
pub mod pipeline;
pub mod synthesis;
pub mod text;

use std::path::Path;

use synthesis::VoiceConfig;

/// The result of an in-process synthesis operation.
///
/// Contains raw f32 audio samples and the sample rate of the output audio.
#[derive(Debug)]
pub struct SynthesisResult {
    /// Raw mono audio samples as f32 values
    pub samples: Vec<f32>,
    /// Sample rate of the audio
    pub sample_rate: u32,
}

impl SynthesisResult {
    /// Write the audio to a 32-bit float WAV file.
    pub fn write_wav(&self, path: &Path) -> Result<(), hound::Error> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(path, spec)?;
        for &sample in &self.samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
        Ok(())
    }

    /// Duration of the audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Common interface for blocking, in-process text-to-speech engines.
///
/// Wrap an implementation in [`synthesis::EngineWorker`] to drive it from the
/// dispatcher.
pub trait SynthesisEngine: Send {
    /// Synthesize speech from the given text.
    fn synthesize(
        &mut self,
        text: &str,
        voice: &VoiceConfig,
    ) -> Result<SynthesisResult, Box<dyn std::error::Error + Send + Sync>>;

    /// Synthesize speech from the given text and write to a WAV file.
    ///
    /// Default implementation calls `synthesize()` then `SynthesisResult::write_wav()`.
    fn synthesize_to_file(
        &mut self,
        text: &str,
        voice: &VoiceConfig,
        wav_path: &Path,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.synthesize(text, voice)?.write_wav(wav_path)?;
        Ok(())
    }
}
