//! Compressed (MP3) audio decoding
//!
//! Decoding goes through the bundled `minimp3` decoder. [`ScratchDecoder`]
//! additionally stages the payload in a private scratch file first, so the
//! decode reads from disk exactly like a platform decoder would.

use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

use crate::{Error, Result};

use super::SampleBuffer;

/// Decode an MP3 payload held in memory
///
/// # Errors
///
/// Returns `MalformedAudio` if no frame can be decoded or the stream changes
/// shape mid-way
pub fn decode_compressed(bytes: &[u8]) -> Result<SampleBuffer> {
    decode_mp3(bytes)
}

/// Decode MP3 frames from any reader into interleaved samples
fn decode_mp3<R: Read>(reader: R) -> Result<SampleBuffer> {
    let mut decoder = minimp3::Decoder::new(reader);
    let mut samples = Vec::new();
    let mut shape: Option<(usize, i32)> = None;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                match shape {
                    None => shape = Some((frame.channels, frame.sample_rate)),
                    Some((channels, rate))
                        if channels != frame.channels || rate != frame.sample_rate =>
                    {
                        return Err(Error::MalformedAudio(format!(
                            "stream changed from {channels}ch/{rate}Hz to {}ch/{}Hz",
                            frame.channels, frame.sample_rate
                        )));
                    }
                    Some(_) => {}
                }
                samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
            }
            // ID3 tags and junk between frames
            Err(minimp3::Error::SkippedData) => {}
            Err(minimp3::Error::Eof | minimp3::Error::InsufficientData) => break,
            Err(minimp3::Error::Io(e)) => return Err(Error::Io(e)),
        }
    }

    let Some((channels, rate)) = shape else {
        return Err(Error::MalformedAudio("no decodable MP3 frames".to_string()));
    };

    let channels = u16::try_from(channels)
        .map_err(|_| Error::MalformedAudio(format!("unsupported channel count {channels}")))?;
    let rate = u32::try_from(rate)
        .map_err(|_| Error::MalformedAudio(format!("invalid sample rate {rate}")))?;

    tracing::trace!(channels, rate, samples = samples.len(), "decoded mp3");

    SampleBuffer::new(channels, rate, samples)
}

/// Decodes compressed audio through a scratch file
///
/// Every call gets its own uniquely named file which is removed when the
/// decode finishes, whether it succeeded or not.
#[derive(Debug, Clone, Default)]
pub struct ScratchDecoder {
    dir: Option<PathBuf>,
}

impl ScratchDecoder {
    /// Use the system temporary directory
    #[must_use]
    pub const fn new() -> Self {
        Self { dir: None }
    }

    /// Use a specific scratch directory
    #[must_use]
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    /// Scratch directory, if one was configured
    #[must_use]
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Decode a compressed payload
    ///
    /// # Errors
    ///
    /// Returns `Io` if the scratch file cannot be written or read back, and
    /// `MalformedAudio` if the payload does not decode
    pub async fn decode(&self, bytes: Vec<u8>) -> Result<SampleBuffer> {
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || decode_via_file(dir.as_deref(), &bytes))
            .await
            .map_err(|e| Error::Audio(format!("decode task failed: {e}")))?
    }
}

fn decode_via_file(dir: Option<&Path>, bytes: &[u8]) -> Result<SampleBuffer> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("npc-voice-").suffix(".mp3");

    let mut file = match dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };

    file.write_all(bytes)?;
    file.flush()?;

    tracing::trace!(path = %file.path().display(), bytes = bytes.len(), "staged scratch file");

    let reader = BufReader::new(file.reopen()?);
    decode_mp3(reader)
}
