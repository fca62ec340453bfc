//! Run configuration and its TOML persistence.
//!
//! Every field has a default, so a config file only needs the values that
//! differ:
//!
//! ```toml
//! concurrency = 4
//! pause_duration_ms = 750
//!
//! [voice]
//! language = "en-us"
//! prompt_wav = "voices/narrator.wav"
//! prompt_text = "the quick brown fox"
//!
//! [cancel_policy]
//! mode = "abort"
//! grace_ms = 5000
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dispatch::{CancelPolicy, RetryPolicy};
use crate::synthesis::{ProcessWorkerConfig, VoiceConfig};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("cannot serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Everything one narration run needs, built once and passed down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Upper bound on chunk length, in characters.
    pub max_chunk_size: usize,
    /// Chunks synthesized at the same time.
    pub concurrency: usize,
    /// Silence inserted between consecutive chunks.
    pub pause_duration_ms: u64,
    /// Where per-chunk audio files are written.
    pub output_directory: PathBuf,
    /// Percentage of the source text to skip before narrating (0 - 100).
    pub start_offset_percent: f64,
    pub final_output_path: PathBuf,
    /// Keep per-chunk files after a successful merge.
    pub keep_chunk_artifacts: bool,
    pub retry: RetryPolicy,
    pub cancel_policy: CancelPolicy,
    pub voice: VoiceConfig,
    pub worker: ProcessWorkerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 2500,
            concurrency: 1,
            pause_duration_ms: 1000,
            output_directory: PathBuf::from("audio_chunks"),
            start_offset_percent: 0.0,
            final_output_path: PathBuf::from("final_audiobook.wav"),
            keep_chunk_artifacts: true,
            retry: RetryPolicy::default(),
            cancel_policy: CancelPolicy::default(),
            voice: VoiceConfig::default(),
            worker: ProcessWorkerConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from `path`, or return the defaults when the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::debug!("No config at {}; using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save to `path`, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_chunk_size == 0 {
            return Err(ConfigError::Invalid("max_chunk_size must be at least 1".into()));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if !(0.0..=100.0).contains(&self.start_offset_percent) {
            return Err(ConfigError::Invalid(format!(
                "start_offset_percent must be within 0-100, got {}",
                self.start_offset_percent
            )));
        }
        if !self.retry.backoff.multiplier.is_finite() {
            return Err(ConfigError::Invalid(
                "retry.backoff.multiplier must be a finite number".into(),
            ));
        }
        if self.worker.program.trim().is_empty() {
            return Err(ConfigError::Invalid("worker.program is empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, PipelineConfig};
    use crate::dispatch::CancelPolicy;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.max_chunk_size, 2500);
        assert_eq!(cfg.concurrency, 1);
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.retry.backoff.initial_ms, 500);
        assert_eq!(cfg.retry.backoff.max_ms, 30_000);
        assert_eq!(cfg.pause_duration_ms, 1000);
        assert_eq!(cfg.output_directory, PathBuf::from("audio_chunks"));
        assert_eq!(cfg.final_output_path, PathBuf::from("final_audiobook.wav"));
        assert_eq!(cfg.start_offset_percent, 0.0);
        assert!(cfg.keep_chunk_artifacts);
        assert_eq!(cfg.cancel_policy, CancelPolicy::Drain);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let cfg = PipelineConfig::load_from(&dir.path().join("none.toml")).expect("load");
        assert_eq!(cfg, PipelineConfig::default());
    }

    #[test]
    fn round_trip_modified_values() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("narrate.toml");

        let mut cfg = PipelineConfig::default();
        cfg.concurrency = 4;
        cfg.start_offset_percent = 24.0;
        cfg.keep_chunk_artifacts = false;
        cfg.retry.max_attempts = 5;
        cfg.cancel_policy = CancelPolicy::Abort { grace_ms: 2500 };
        cfg.voice.language = "en-us".into();
        cfg.worker.permanent_exit_codes = vec![2, 64];

        cfg.save_to(&path).expect("save");
        let loaded = PipelineConfig::load_from(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("narrate.toml");
        std::fs::write(
            &path,
            "concurrency = 3\n\n[voice]\nspeed = 1.0\n\n[cancel_policy]\nmode = \"abort\"\ngrace_ms = 10\n",
        )
        .unwrap();

        let cfg = PipelineConfig::load_from(&path).expect("load");
        assert_eq!(cfg.concurrency, 3);
        assert_eq!(cfg.voice.speed, 1.0);
        assert_eq!(cfg.voice.language, "vi");
        assert_eq!(cfg.cancel_policy, CancelPolicy::Abort { grace_ms: 10 });
        assert_eq!(cfg.max_chunk_size, 2500);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("narrate.toml");
        std::fs::write(&path, "concurrency = \"many\"").unwrap();
        assert!(matches!(
            PipelineConfig::load_from(&path),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn validate_rejects_unusable_values() {
        let invalid = [
            PipelineConfig {
                max_chunk_size: 0,
                ..Default::default()
            },
            PipelineConfig {
                concurrency: 0,
                ..Default::default()
            },
            PipelineConfig {
                start_offset_percent: 100.5,
                ..Default::default()
            },
            PipelineConfig {
                start_offset_percent: -1.0,
                ..Default::default()
            },
        ];
        for cfg in invalid {
            assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))), "{cfg:?}");
        }

        let mut no_attempts = PipelineConfig::default();
        no_attempts.retry.max_attempts = 0;
        assert!(no_attempts.validate().is_err());

        let edge = PipelineConfig {
            start_offset_percent: 100.0,
            ..Default::default()
        };
        assert!(edge.validate().is_ok());
    }
}
