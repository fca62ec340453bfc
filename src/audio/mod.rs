//! WAV segments and the order-preserving merge into one final track.

pub mod merger;
pub mod segment;

pub use merger::{merge, merge_segments, merge_to_file, FinalTrack, MergeError, MergeSummary};
pub use segment::{verify_wav, AudioFormat, AudioSegment, SampleFormat, Samples};
