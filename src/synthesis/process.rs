use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use super::{artifact_path, AudioArtifact, SynthesisError, SynthesisErrorKind, SynthesisWorker, VoiceConfig};
use crate::audio::verify_wav;
use crate::text::Chunk;

/// How many trailing characters of stderr are kept in an error.
const STDERR_TAIL_CHARS: usize = 800;

/// Settings for the external synthesis command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessWorkerConfig {
    /// Executable to run.
    pub program: String,
    /// Arguments placed before the per-chunk flags (module, model, checkpoint).
    pub args: Vec<String>,
    /// Wall-clock limit for one invocation. Exceeding it kills the process.
    pub timeout_ms: u64,
    /// Exit codes meaning "retrying will not help" (e.g. argument errors).
    pub permanent_exit_codes: Vec<i32>,
}

impl Default for ProcessWorkerConfig {
    fn default() -> Self {
        Self {
            program: "python".to_string(),
            args: [
                "-m",
                "zipvoice.bin.infer_zipvoice",
                "--model-name",
                "zipvoice",
                "--checkpoint-name",
                "iter-525000-avg-2.pt",
            ]
            .map(String::from)
            .to_vec(),
            timeout_ms: 10 * 60 * 1000,
            permanent_exit_codes: vec![2],
        }
    }
}

/// Runs one external synthesis process per chunk.
///
/// The command line is `program args... --prompt-wav P --prompt-text T --text
/// CHUNK --res-wav-path OUT --lang L --tokenizer K --num-thread N --speed S`,
/// and the process must leave a WAV file at `OUT`.
pub struct ProcessWorker {
    config: ProcessWorkerConfig,
    output_dir: PathBuf,
}

impl ProcessWorker {
    pub fn new(config: ProcessWorkerConfig, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            output_dir: output_dir.into(),
        }
    }

    fn command(&self, chunk: &Chunk, voice: &VoiceConfig, out: &Path) -> Command {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args)
            .arg("--prompt-wav")
            .arg(&voice.prompt_wav)
            .arg("--prompt-text")
            .arg(&voice.prompt_text)
            .arg("--text")
            .arg(chunk.text())
            .arg("--res-wav-path")
            .arg(out)
            .arg("--lang")
            .arg(&voice.language)
            .arg("--tokenizer")
            .arg(&voice.tokenizer)
            .arg("--num-thread")
            .arg(voice.num_threads.to_string())
            .arg("--speed")
            .arg(voice.speed.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl SynthesisWorker for ProcessWorker {
    async fn synthesize(
        &self,
        chunk: &Chunk,
        voice: &VoiceConfig,
    ) -> Result<AudioArtifact, SynthesisError> {
        if chunk.text().trim().is_empty() {
            return Err(SynthesisError::permanent(format!(
                "chunk {} has no text",
                chunk.index()
            )));
        }

        let out = artifact_path(&self.output_dir, chunk);
        match tokio::fs::remove_file(&out).await {
            Ok(()) => log::debug!("Removed stale artifact {}", out.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(SynthesisError::transient(format!(
                    "cannot clear {}: {e}",
                    out.display()
                )))
            }
        }

        let program = &self.config.program;
        let child = self
            .command(chunk, voice, &out)
            .spawn()
            .map_err(|e| spawn_error(program, e))?;

        let limit = Duration::from_millis(self.config.timeout_ms);
        // On timeout the child is dropped, and kill_on_drop terminates it.
        let output = match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(result) => result
                .map_err(|e| SynthesisError::transient(format!("waiting for {program}: {e}")))?,
            Err(_) => {
                return Err(SynthesisError::transient(format!(
                    "{program} timed out after {:.1?}",
                    limit
                )))
            }
        };

        if !output.status.success() {
            let code = output.status.code();
            return Err(SynthesisError {
                kind: classify_exit(code, &self.config.permanent_exit_codes),
                detail: format!(
                    "{program} exited with code {code:?}: {}",
                    stderr_tail(&output.stderr)
                ),
            });
        }

        let path = out.clone();
        let verified = tokio::task::spawn_blocking(move || verify_wav(&path))
            .await
            .map_err(|e| SynthesisError::transient(format!("verifying {}: {e}", out.display())))?;
        match verified {
            Ok((format, frames)) if frames > 0 => {
                log::debug!(
                    "Chunk {} -> {} ({format}, {frames} frames)",
                    chunk.index(),
                    out.display()
                );
                Ok(AudioArtifact::new(out))
            }
            Ok(_) => Err(SynthesisError::transient(format!(
                "{program} succeeded but wrote no audio frames to {}",
                out.display()
            ))),
            Err(e) => Err(SynthesisError::transient(format!(
                "{program} succeeded but left no decodable audio at {}: {e}",
                out.display()
            ))),
        }
    }
}

/// Classify a failed exit. `None` means the process was killed by a signal.
pub fn classify_exit(code: Option<i32>, permanent_codes: &[i32]) -> SynthesisErrorKind {
    match code {
        Some(code) if permanent_codes.contains(&code) => SynthesisErrorKind::Permanent,
        _ => SynthesisErrorKind::Transient,
    }
}

fn spawn_error(program: &str, e: std::io::Error) -> SynthesisError {
    match e.kind() {
        std::io::ErrorKind::NotFound => {
            SynthesisError::permanent(format!("synthesis program '{program}' not found"))
        }
        std::io::ErrorKind::PermissionDenied => {
            SynthesisError::permanent(format!("synthesis program '{program}' is not executable"))
        }
        _ => SynthesisError::transient(format!("failed to start '{program}': {e}")),
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    let count = text.chars().count();
    if count <= STDERR_TAIL_CHARS {
        return text.to_string();
    }
    let tail: String = text.chars().skip(count - STDERR_TAIL_CHARS).collect();
    format!("...{tail}")
}
