//! Audio payloads and decoding
//!
//! Providers hand back a [`RawAudioPayload`] tagged with its encoding. The
//! decoders in this module turn it into a [`SampleBuffer`] of interleaved,
//! normalized `f32` samples ready for a playback sink.

pub mod archive;
pub mod compressed;
pub mod wav;

use std::fmt;
use std::time::Duration;

use crate::{Error, Result};

pub use archive::RecordingArchive;
pub use compressed::{ScratchDecoder, decode_compressed};
pub use wav::{WAV_HEADER_LEN, decode_pcm16_wav, encode_pcm16_wav};

/// Encoding of a synthesized audio payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioEncoding {
    /// Canonical RIFF/WAVE container holding 16-bit little-endian PCM
    Pcm16Wav,
    /// Compressed stream (MP3)
    Compressed,
}

impl AudioEncoding {
    /// File extension used when archiving a payload
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Pcm16Wav => "wav",
            Self::Compressed => "mp3",
        }
    }
}

impl fmt::Display for AudioEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pcm16Wav => f.write_str("pcm16-wav"),
            Self::Compressed => f.write_str("compressed"),
        }
    }
}

/// Audio bytes as returned by a TTS provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAudioPayload {
    pub bytes: Vec<u8>,
    pub encoding: AudioEncoding,
}

impl RawAudioPayload {
    #[must_use]
    pub const fn new(bytes: Vec<u8>, encoding: AudioEncoding) -> Self {
        Self { bytes, encoding }
    }
}

/// Decoded audio: interleaved samples in `[-1.0, 1.0]`
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    channels: u16,
    sample_rate: u32,
    samples: Vec<f32>,
}

impl SampleBuffer {
    /// Create a sample buffer
    ///
    /// # Errors
    ///
    /// Returns `MalformedAudio` if the channel count is not 1 or 2, the sample
    /// rate is zero, or the sample count is not a whole number of frames
    pub fn new(channels: u16, sample_rate: u32, samples: Vec<f32>) -> Result<Self> {
        if !(1..=2).contains(&channels) {
            return Err(Error::MalformedAudio(format!(
                "unsupported channel count {channels}"
            )));
        }
        if sample_rate == 0 {
            return Err(Error::MalformedAudio("sample rate is zero".to_string()));
        }
        if samples.len() % usize::from(channels) != 0 {
            return Err(Error::MalformedAudio(format!(
                "{} samples do not divide into {channels} channels",
                samples.len()
            )));
        }

        Ok(Self {
            channels,
            sample_rate,
            samples,
        })
    }

    #[must_use]
    pub const fn channels(&self) -> u16 {
        self.channels
    }

    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    #[must_use]
    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    /// Number of frames (samples per channel)
    #[must_use]
    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channels)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback duration at the native sample rate
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / f64::from(self.sample_rate))
    }
}

/// Decode a payload with the decoder matching its encoding
///
/// # Errors
///
/// Returns the decoder's error: `MalformedAudio`, `TruncatedAudio` or `Io`
pub async fn decode(payload: RawAudioPayload, scratch: &ScratchDecoder) -> Result<SampleBuffer> {
    match payload.encoding {
        AudioEncoding::Pcm16Wav => decode_pcm16_wav(&payload.bytes),
        AudioEncoding::Compressed => scratch.decode(payload.bytes).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_buffer_validation() {
        assert!(SampleBuffer::new(0, 22050, vec![]).is_err());
        assert!(SampleBuffer::new(3, 22050, vec![0.0; 3]).is_err());
        assert!(SampleBuffer::new(1, 0, vec![0.0]).is_err());
        assert!(SampleBuffer::new(2, 22050, vec![0.0; 3]).is_err());

        let buffer = SampleBuffer::new(2, 22050, vec![0.0; 4]).unwrap();
        assert_eq!(buffer.frames(), 2);
        assert!(!buffer.is_empty());
    }

    #[test]
    fn test_duration() {
        let buffer = SampleBuffer::new(2, 1000, vec![0.0; 1000]).unwrap();
        assert_eq!(buffer.duration(), Duration::from_millis(500));
    }

    #[test]
    fn test_extension() {
        assert_eq!(AudioEncoding::Pcm16Wav.extension(), "wav");
        assert_eq!(AudioEncoding::Compressed.extension(), "mp3");
    }
}
