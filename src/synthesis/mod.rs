//! The boundary to the external speech-synthesis engine.
//!
//! A [`SynthesisWorker`] turns one [`Chunk`] plus a [`VoiceConfig`] into an
//! audio artifact on disk, or a classified [`SynthesisError`]. The
//! classification decides whether the dispatcher retries the chunk.
//!
//! # Available Workers
//!
//! - [`ProcessWorker`] - one external process per chunk (ZipVoice CLI by default)
//! - [`EngineWorker`] - any in-process [`SynthesisEngine`](crate::SynthesisEngine)

pub mod engine;
pub mod process;

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::text::Chunk;

pub use engine::EngineWorker;
pub use process::{ProcessWorker, ProcessWorkerConfig};

/// Voice and engine parameters sent along with every chunk.
///
/// ```rust
/// use narrate_rs::synthesis::VoiceConfigBuilder;
///
/// let voice = VoiceConfigBuilder::default()
///     .language("en-us")
///     .speed(1.1f32)
///     .build()?;
/// assert_eq!(voice.tokenizer, "espeak");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[builder(default, setter(into))]
#[serde(default)]
pub struct VoiceConfig {
    /// Reference recording of the target voice.
    pub prompt_wav: PathBuf,
    /// Transcript of `prompt_wav`.
    pub prompt_text: String,
    /// Language code understood by the engine (e.g. `"vi"`, `"en-us"`).
    pub language: String,
    /// Tokenizer selector (e.g. `"espeak"`).
    pub tokenizer: String,
    /// Thread hint passed to the engine.
    pub num_threads: usize,
    /// Speech speed multiplier.
    pub speed: f32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            prompt_wav: PathBuf::from("prompt_short.wav"),
            prompt_text: "ước gì bố tớ cũng được như".to_string(),
            language: "vi".to_string(),
            tokenizer: "espeak".to_string(),
            num_threads: 5,
            speed: 1.3,
        }
    }
}

/// A synthesized audio file owned by the pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioArtifact {
    pub path: PathBuf,
}

impl AudioArtifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Whether retrying the same chunk may succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SynthesisErrorKind {
    /// Timeout, resource contention, crash: a retry may succeed.
    Transient,
    /// Invalid input or unrecoverable engine error: a retry will not help.
    Permanent,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} synthesis failure: {detail}")]
pub struct SynthesisError {
    pub kind: SynthesisErrorKind,
    pub detail: String,
}

impl SynthesisError {
    pub fn transient(detail: impl Into<String>) -> Self {
        Self {
            kind: SynthesisErrorKind::Transient,
            detail: detail.into(),
        }
    }

    pub fn permanent(detail: impl Into<String>) -> Self {
        Self {
            kind: SynthesisErrorKind::Permanent,
            detail: detail.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == SynthesisErrorKind::Transient
    }
}

impl fmt::Display for SynthesisErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SynthesisErrorKind::Transient => f.write_str("transient"),
            SynthesisErrorKind::Permanent => f.write_str("permanent"),
        }
    }
}

/// Converts one chunk into one decodable audio artifact.
///
/// Implementations must be safe to call concurrently for different chunks
/// and must write each chunk to its own path.
#[async_trait]
pub trait SynthesisWorker: Send + Sync {
    async fn synthesize(
        &self,
        chunk: &Chunk,
        voice: &VoiceConfig,
    ) -> Result<AudioArtifact, SynthesisError>;
}

/// Chunk-indexed artifact path inside `output_dir` (1-based, zero-padded).
pub fn artifact_path(output_dir: &Path, chunk: &Chunk) -> PathBuf {
    output_dir.join(format!("chunk_{:04}.wav", chunk.index() + 1))
}
