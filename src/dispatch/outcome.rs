use std::fmt;

use crate::synthesis::{AudioArtifact, SynthesisError};

/// Why a chunk ended without audio.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    /// The worker reported a permanent failure.
    Rejected(SynthesisError),
    /// Every allowed attempt failed transiently; holds the last error.
    RetriesExhausted(SynthesisError),
    /// The run was cancelled before the chunk could finish.
    Cancelled,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Rejected(err) => write!(f, "rejected: {}", err.detail),
            FailureReason::RetriesExhausted(err) => {
                write!(f, "retries exhausted: {}", err.detail)
            }
            FailureReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Per-chunk job status. `Succeeded` and `FailedPermanent` are terminal.
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    Succeeded(AudioArtifact),
    /// Last attempt failed but a retry is still allowed.
    FailedTransient(SynthesisError),
    FailedPermanent(FailureReason),
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub chunk_index: usize,
    pub status: JobStatus,
    pub attempt_count: u32,
}

impl JobOutcome {
    pub fn succeeded(chunk_index: usize, artifact: AudioArtifact, attempt_count: u32) -> Self {
        Self {
            chunk_index,
            status: JobStatus::Succeeded(artifact),
            attempt_count,
        }
    }

    pub fn failed(chunk_index: usize, reason: FailureReason, attempt_count: u32) -> Self {
        Self {
            chunk_index,
            status: JobStatus::FailedPermanent(reason),
            attempt_count,
        }
    }

    pub fn cancelled(chunk_index: usize, attempt_count: u32) -> Self {
        Self::failed(chunk_index, FailureReason::Cancelled, attempt_count)
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self.status, JobStatus::FailedTransient(_))
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, JobStatus::Succeeded(_))
    }

    pub fn artifact(&self) -> Option<&AudioArtifact> {
        match &self.status {
            JobStatus::Succeeded(artifact) => Some(artifact),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match &self.status {
            JobStatus::FailedPermanent(reason) => Some(reason),
            _ => None,
        }
    }
}
