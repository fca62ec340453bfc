use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{artifact_path, AudioArtifact, SynthesisError, SynthesisWorker, VoiceConfig};
use crate::text::Chunk;
use crate::SynthesisEngine;

/// Adapts a blocking, in-process [`SynthesisEngine`] to the worker interface.
///
/// Calls run on tokio's blocking pool. The engine sits behind a mutex, so
/// synthesis through one `EngineWorker` is serialized even when the
/// dispatcher runs several executors.
pub struct EngineWorker<E> {
    engine: Arc<Mutex<E>>,
    output_dir: PathBuf,
}

impl<E: SynthesisEngine + 'static> EngineWorker<E> {
    pub fn new(engine: E, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
            output_dir: output_dir.into(),
        }
    }
}

#[async_trait]
impl<E: SynthesisEngine + 'static> SynthesisWorker for EngineWorker<E> {
    async fn synthesize(
        &self,
        chunk: &Chunk,
        voice: &VoiceConfig,
    ) -> Result<AudioArtifact, SynthesisError> {
        let engine = Arc::clone(&self.engine);
        let text = chunk.text().to_string();
        let voice = voice.clone();
        let out = artifact_path(&self.output_dir, chunk);

        tokio::task::spawn_blocking(move || {
            let result = {
                let mut engine = engine
                    .lock()
                    .map_err(|_| SynthesisError::permanent("engine poisoned by an earlier panic"))?;
                engine
                    .synthesize(&text, &voice)
                    .map_err(|e| SynthesisError::permanent(e.to_string()))?
            };

            if result.samples.is_empty() {
                return Err(SynthesisError::permanent("engine produced no audio"));
            }

            result.write_wav(&out).map_err(|e| {
                SynthesisError::transient(format!("writing {}: {e}", out.display()))
            })?;
            Ok(AudioArtifact::new(out))
        })
        .await
        .map_err(|e| SynthesisError::permanent(format!("engine task failed: {e}")))?
    }
}
