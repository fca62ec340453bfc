use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use super::segment::{AudioFormat, AudioSegment, Samples};
use crate::dispatch::{JobOutcome, JobStatus};
use crate::synthesis::AudioArtifact;

#[derive(thiserror::Error, Debug)]
pub enum MergeError {
    #[error("chunk {chunk_index} is {found}, expected {expected}")]
    FormatMismatch {
        chunk_index: usize,
        expected: AudioFormat,
        found: AudioFormat,
    },
    #[error("no chunk produced audio; nothing to merge")]
    Empty,
    #[error("cannot decode audio of chunk {chunk_index} ({}): {source}", .path.display())]
    Decode {
        chunk_index: usize,
        path: PathBuf,
        #[source]
        source: hound::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("WAV encoding error: {0}")]
    Encode(#[from] hound::Error),
}

/// The concatenated narration, held in memory until written.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalTrack {
    pub format: AudioFormat,
    pub total_frame_count: usize,
    pub samples: Samples,
}

impl FinalTrack {
    pub fn duration_secs(&self) -> f64 {
        self.total_frame_count as f64 / self.format.sample_rate as f64
    }

    /// Write the track as a WAV file.
    ///
    /// The data goes to a temporary file next to `path` which is renamed into
    /// place only after the WAV header is finalized, so `path` either keeps its
    /// previous contents or holds the complete track.
    pub fn write_wav(&self, path: &Path) -> Result<(), MergeError> {
        let tmp = temp_beside(path)?;
        {
            let mut writer = hound::WavWriter::new(BufWriter::new(tmp.as_file()), self.format.to_spec())?;
            self.samples.write_to(&mut writer)?;
            writer.finalize()?;
        }

        tmp.persist(path).map_err(|e| MergeError::Io(e.error))?;
        log::info!(
            "Wrote {:.1}s of audio to {}",
            self.duration_secs(),
            path.display()
        );
        Ok(())
    }
}

/// Accumulates segments in order, checking every format against the first.
struct TrackBuilder {
    pause_ms: u64,
    track: Option<FinalTrack>,
}

impl TrackBuilder {
    fn new(pause_ms: u64) -> Self {
        Self {
            pause_ms,
            track: None,
        }
    }

    fn push(&mut self, chunk_index: usize, segment: AudioSegment) -> Result<(), MergeError> {
        let Some(track) = self.track.as_mut() else {
            self.track = Some(FinalTrack {
                format: segment.format,
                total_frame_count: segment.frame_count,
                samples: segment.samples,
            });
            return Ok(());
        };

        check_format(chunk_index, track.format, segment.format)?;

        let gap = track.format.silence_frames(self.pause_ms);
        let channels = usize::from(track.format.channel_count);
        track.samples.push_silence(gap * channels);
        if !track.samples.append(segment.samples) {
            // Equal formats always share a storage variant; a segment built
            // by hand with a mismatched buffer lands here.
            return Err(MergeError::FormatMismatch {
                chunk_index,
                expected: track.format,
                found: segment.format,
            });
        }
        track.total_frame_count += gap + segment.frame_count;
        Ok(())
    }

    fn finish(self) -> Result<FinalTrack, MergeError> {
        self.track.ok_or(MergeError::Empty)
    }
}

/// What [`merge_to_file`] wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeSummary {
    pub format: AudioFormat,
    pub total_frame_count: usize,
    pub segment_count: usize,
}

impl MergeSummary {
    pub fn duration_secs(&self) -> f64 {
        self.total_frame_count as f64 / self.format.sample_rate as f64
    }
}

fn check_format(
    chunk_index: usize,
    expected: AudioFormat,
    found: AudioFormat,
) -> Result<(), MergeError> {
    if found != expected {
        return Err(MergeError::FormatMismatch {
            chunk_index,
            expected,
            found,
        });
    }
    Ok(())
}

fn temp_beside(path: &Path) -> io::Result<tempfile::NamedTempFile> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    tempfile::Builder::new()
        .prefix(".narrate-")
        .suffix(".wav.part")
        .tempfile_in(dir)
}

/// `(chunk_index, artifact)` of every successful outcome, in order.
fn succeeded(outcomes: &[JobOutcome]) -> impl Iterator<Item = (usize, &AudioArtifact)> {
    outcomes.iter().filter_map(|o| match &o.status {
        JobStatus::Succeeded(artifact) => Some((o.chunk_index, artifact)),
        _ => None,
    })
}

fn decode_artifact(chunk_index: usize, artifact: &AudioArtifact) -> Result<AudioSegment, MergeError> {
    let segment = AudioSegment::decode(&artifact.path).map_err(|source| MergeError::Decode {
        chunk_index,
        path: artifact.path.clone(),
        source,
    })?;
    log::debug!("Merging chunk {chunk_index} ({} frames)", segment.frame_count);
    Ok(segment)
}

/// Decode and concatenate the audio of every successful outcome in memory.
///
/// Outcomes must be in chunk order; failed ones contribute nothing, so a
/// skipped chunk leaves exactly one pause between its neighbours. Any format
/// disagreement aborts the merge.
///
/// The whole track is held in memory, about
/// `sample_rate * channels * 4` bytes per second of audio for 24-bit and
/// float input (half that for 16-bit). Use [`merge_to_file`] for long books.
pub fn merge(outcomes: &[JobOutcome], pause_ms: u64) -> Result<FinalTrack, MergeError> {
    let mut builder = TrackBuilder::new(pause_ms);
    for (chunk_index, artifact) in succeeded(outcomes) {
        builder.push(chunk_index, decode_artifact(chunk_index, artifact)?)?;
    }
    builder.finish()
}

/// Stream the audio of every successful outcome into a WAV file at `path`.
///
/// Same ordering, pause and format rules as [`merge`], but only one segment
/// is in memory at a time. Samples go to a temporary file beside `path`
/// that replaces it only once the whole track is written; on any error
/// `path` is left untouched.
pub fn merge_to_file(
    outcomes: &[JobOutcome],
    pause_ms: u64,
    path: &Path,
) -> Result<MergeSummary, MergeError> {
    let mut segments = succeeded(outcomes);
    let Some((first_index, first)) = segments.next() else {
        return Err(MergeError::Empty);
    };
    let first = decode_artifact(first_index, first)?;
    let format = first.format;

    let mut silence = Samples::empty_for(&format);
    let gap = format.silence_frames(pause_ms);
    silence.push_silence(gap * usize::from(format.channel_count));

    let tmp = temp_beside(path)?;
    let mut summary = MergeSummary {
        format,
        total_frame_count: first.frame_count,
        segment_count: 1,
    };
    {
        let mut writer = hound::WavWriter::new(BufWriter::new(tmp.as_file()), format.to_spec())?;
        first.samples.write_to(&mut writer)?;
        drop(first);

        for (chunk_index, artifact) in segments {
            let segment = decode_artifact(chunk_index, artifact)?;
            check_format(chunk_index, format, segment.format)?;
            silence.write_to(&mut writer)?;
            segment.samples.write_to(&mut writer)?;
            summary.total_frame_count += gap + segment.frame_count;
            summary.segment_count += 1;
        }
        writer.finalize()?;
    }

    tmp.persist(path).map_err(|e| MergeError::Io(e.error))?;
    log::info!(
        "Wrote {} segments ({:.1}s of audio) to {}",
        summary.segment_count,
        summary.duration_secs(),
        path.display()
    );
    Ok(summary)
}

/// Concatenate already-decoded segments, given as `(chunk_index, segment)` in order.
pub fn merge_segments(
    segments: impl IntoIterator<Item = (usize, AudioSegment)>,
    pause_ms: u64,
) -> Result<FinalTrack, MergeError> {
    let mut builder = TrackBuilder::new(pause_ms);
    for (chunk_index, segment) in segments {
        builder.push(chunk_index, segment)?;
    }
    builder.finish()
}
