use std::fmt;
use std::io::{Seek, Write};
use std::path::Path;

use serde::Serialize;

/// Integer or IEEE float PCM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SampleFormat {
    Int,
    Float,
}

/// The parameters every merged segment must agree on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channel_count: u16,
    pub bit_depth: u16,
    pub sample_format: SampleFormat,
}

impl AudioFormat {
    /// Number of zero frames that make up a pause of `pause_ms` milliseconds,
    /// rounded to the nearest frame.
    pub fn silence_frames(&self, pause_ms: u64) -> usize {
        ((u64::from(self.sample_rate) * pause_ms + 500) / 1000) as usize
    }

    pub fn to_spec(self) -> hound::WavSpec {
        hound::WavSpec {
            channels: self.channel_count,
            sample_rate: self.sample_rate,
            bits_per_sample: self.bit_depth,
            sample_format: match self.sample_format {
                SampleFormat::Int => hound::SampleFormat::Int,
                SampleFormat::Float => hound::SampleFormat::Float,
            },
        }
    }
}

impl From<hound::WavSpec> for AudioFormat {
    fn from(spec: hound::WavSpec) -> Self {
        Self {
            sample_rate: spec.sample_rate,
            channel_count: spec.channels,
            bit_depth: spec.bits_per_sample,
            sample_format: match spec.sample_format {
                hound::SampleFormat::Int => SampleFormat::Int,
                hound::SampleFormat::Float => SampleFormat::Float,
            },
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.sample_format {
            SampleFormat::Int => "int",
            SampleFormat::Float => "float",
        };
        write!(
            f,
            "{} Hz, {} ch, {}-bit {kind}",
            self.sample_rate, self.channel_count, self.bit_depth
        )
    }
}

/// Interleaved PCM samples, stored at the narrowest type that holds the bit depth.
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    I16(Vec<i16>),
    I32(Vec<i32>),
    F32(Vec<f32>),
}

impl Samples {
    /// An empty buffer of the variant matching `format`.
    pub fn empty_for(format: &AudioFormat) -> Self {
        match (format.sample_format, format.bit_depth) {
            (SampleFormat::Float, _) => Samples::F32(Vec::new()),
            (SampleFormat::Int, bits) if bits <= 16 => Samples::I16(Vec::new()),
            (SampleFormat::Int, _) => Samples::I32(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Samples::I16(s) => s.len(),
            Samples::I32(s) => s.len(),
            Samples::F32(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append `count` zero-amplitude samples.
    pub fn push_silence(&mut self, count: usize) {
        match self {
            Samples::I16(s) => s.resize(s.len() + count, 0),
            Samples::I32(s) => s.resize(s.len() + count, 0),
            Samples::F32(s) => s.resize(s.len() + count, 0.0),
        }
    }

    /// Move all samples of `other` onto the end of `self`.
    ///
    /// Returns `false` and leaves `self` untouched when the variants differ.
    pub fn append(&mut self, other: Samples) -> bool {
        match (self, other) {
            (Samples::I16(dst), Samples::I16(mut src)) => dst.append(&mut src),
            (Samples::I32(dst), Samples::I32(mut src)) => dst.append(&mut src),
            (Samples::F32(dst), Samples::F32(mut src)) => dst.append(&mut src),
            _ => return false,
        }
        true
    }

    pub fn write_to<W: Write + Seek>(&self, writer: &mut hound::WavWriter<W>) -> hound::Result<()> {
        match self {
            Samples::I16(s) => s.iter().try_for_each(|&v| writer.write_sample(v)),
            Samples::I32(s) => s.iter().try_for_each(|&v| writer.write_sample(v)),
            Samples::F32(s) => s.iter().try_for_each(|&v| writer.write_sample(v)),
        }
    }
}

/// The decoded contents of one synthesized chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSegment {
    pub format: AudioFormat,
    pub frame_count: usize,
    pub samples: Samples,
}

impl AudioSegment {
    pub fn new(format: AudioFormat, samples: Samples) -> Self {
        let frame_count = samples.len() / usize::from(format.channel_count.max(1));
        Self {
            format,
            frame_count,
            samples,
        }
    }

    /// Decode a WAV file into memory.
    pub fn decode(path: &Path) -> Result<Self, hound::Error> {
        let reader = hound::WavReader::open(path)?;
        let format = AudioFormat::from(reader.spec());

        let samples = match Samples::empty_for(&format) {
            Samples::I16(_) => Samples::I16(reader.into_samples().collect::<Result<_, _>>()?),
            Samples::I32(_) => Samples::I32(reader.into_samples().collect::<Result<_, _>>()?),
            Samples::F32(_) => Samples::F32(reader.into_samples().collect::<Result<_, _>>()?),
        };

        Ok(Self::new(format, samples))
    }

    pub fn duration_secs(&self) -> f64 {
        self.frame_count as f64 / self.format.sample_rate as f64
    }
}

/// Read every sample of a WAV file without keeping them, returning its
/// format and frame count. Fails on a data section shorter than its header
/// claims.
pub fn verify_wav(path: &Path) -> Result<(AudioFormat, usize), hound::Error> {
    let mut reader = hound::WavReader::open(path)?;
    let format = AudioFormat::from(reader.spec());

    let samples = match Samples::empty_for(&format) {
        Samples::I16(_) => reader.samples::<i16>().try_fold(0usize, |n, s| s.map(|_| n + 1))?,
        Samples::I32(_) => reader.samples::<i32>().try_fold(0usize, |n, s| s.map(|_| n + 1))?,
        Samples::F32(_) => reader.samples::<f32>().try_fold(0usize, |n, s| s.map(|_| n + 1))?,
    };

    Ok((format, samples / usize::from(format.channel_count.max(1))))
}

#[cfg(test)]
mod tests {
    use super::{verify_wav, AudioFormat, AudioSegment, SampleFormat, Samples};
    use tempfile::tempdir;

    fn mono16(rate: u32) -> AudioFormat {
        AudioFormat {
            sample_rate: rate,
            channel_count: 1,
            bit_depth: 16,
            sample_format: SampleFormat::Int,
        }
    }

    #[test]
    fn silence_frames_round_to_nearest() {
        assert_eq!(mono16(24_000).silence_frames(1000), 24_000);
        assert_eq!(mono16(22_050).silence_frames(1), 22);
        assert_eq!(mono16(22_050).silence_frames(3), 66);
        assert_eq!(mono16(44_100).silence_frames(0), 0);
    }

    #[test]
    fn picks_storage_from_bit_depth() {
        let mut f = mono16(8000);
        assert!(matches!(Samples::empty_for(&f), Samples::I16(_)));
        f.bit_depth = 24;
        assert!(matches!(Samples::empty_for(&f), Samples::I32(_)));
        f.bit_depth = 32;
        f.sample_format = SampleFormat::Float;
        assert!(matches!(Samples::empty_for(&f), Samples::F32(_)));
    }

    #[test]
    fn append_refuses_mismatched_storage() {
        let mut a = Samples::I16(vec![1, 2]);
        assert!(!a.append(Samples::F32(vec![0.5])));
        assert_eq!(a.len(), 2);
        assert!(a.append(Samples::I16(vec![3])));
        assert_eq!(a, Samples::I16(vec![1, 2, 3]));
    }

    #[test]
    fn frame_count_accounts_for_channels() {
        let mut format = mono16(8000);
        format.channel_count = 2;
        let seg = AudioSegment::new(format, Samples::I16(vec![0; 10]));
        assert_eq!(seg.frame_count, 5);
    }

    #[test]
    fn decodes_what_hound_wrote() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("seg.wav");
        let format = AudioFormat {
            sample_rate: 16_000,
            channel_count: 2,
            bit_depth: 24,
            sample_format: SampleFormat::Int,
        };

        let mut writer = hound::WavWriter::create(&path, format.to_spec()).unwrap();
        for v in [-8_000_000i32, 0, 42, 8_000_000] {
            writer.write_sample(v).unwrap();
        }
        writer.finalize().unwrap();

        let seg = AudioSegment::decode(&path).unwrap();
        assert_eq!(seg.format, format);
        assert_eq!(seg.frame_count, 2);
        assert_eq!(seg.samples, Samples::I32(vec![-8_000_000, 0, 42, 8_000_000]));
        assert_eq!(verify_wav(&path).unwrap(), (format, 2));
    }

    #[test]
    fn verify_rejects_truncated_data() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("cut.wav");
        let format = mono16(8000);

        let mut writer = hound::WavWriter::create(&path, format.to_spec()).unwrap();
        for v in 0..1000i16 {
            writer.write_sample(v).unwrap();
        }
        writer.finalize().unwrap();
        assert_eq!(verify_wav(&path).unwrap(), (format, 1000));

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 1500]).unwrap();
        assert!(hound::WavReader::open(&path).is_ok());
        assert!(verify_wav(&path).is_err());
    }

    #[test]
    fn decode_rejects_non_wav() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("junk.wav");
        std::fs::write(&path, b"definitely not riff").unwrap();
        assert!(AudioSegment::decode(&path).is_err());
    }
}
