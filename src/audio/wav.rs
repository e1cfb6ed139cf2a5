//! 16-bit PCM WAV decoding
//!
//! Reads the canonical 44-byte RIFF header at fixed offsets. The declared data
//! size is never trusted beyond the bytes actually present.

use crate::{Error, Result};

use super::SampleBuffer;

/// Size of the canonical RIFF/WAVE header
pub const WAV_HEADER_LEN: usize = 44;

const OFFSET_FORMAT: usize = 20;
const OFFSET_CHANNELS: usize = 22;
const OFFSET_SAMPLE_RATE: usize = 24;
const OFFSET_BYTE_RATE: usize = 28;
const OFFSET_BLOCK_ALIGN: usize = 32;
const OFFSET_BITS: usize = 34;
const OFFSET_DATA_SIZE: usize = 40;

const PCM_FORMAT: u16 = 1;

fn u16_at(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn u32_at(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

/// Decode a 16-bit PCM WAV payload
///
/// Each little-endian `i16` sample maps to `value / 32768.0`.
///
/// # Errors
///
/// Returns `MalformedAudio` if the payload is shorter than the header or the
/// header fields are not consistent 16-bit PCM, and `TruncatedAudio` if the
/// header declares more data than is present
pub fn decode_pcm16_wav(bytes: &[u8]) -> Result<SampleBuffer> {
    if bytes.len() < WAV_HEADER_LEN {
        return Err(Error::MalformedAudio(format!(
            "{} bytes is shorter than the {WAV_HEADER_LEN}-byte header",
            bytes.len()
        )));
    }

    if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(Error::MalformedAudio("missing RIFF/WAVE magic".to_string()));
    }

    let format = u16_at(bytes, OFFSET_FORMAT);
    if format != PCM_FORMAT {
        return Err(Error::MalformedAudio(format!(
            "audio format {format} is not PCM"
        )));
    }

    let channels = u16_at(bytes, OFFSET_CHANNELS);
    let sample_rate = u32_at(bytes, OFFSET_SAMPLE_RATE);
    let byte_rate = u32_at(bytes, OFFSET_BYTE_RATE);
    let block_align = u16_at(bytes, OFFSET_BLOCK_ALIGN);
    let bits = u16_at(bytes, OFFSET_BITS);

    if bits != 16 {
        return Err(Error::MalformedAudio(format!(
            "{bits} bits per sample, expected 16"
        )));
    }
    if u32::from(block_align) != u32::from(channels) * 2 {
        return Err(Error::MalformedAudio(format!(
            "block align {block_align} inconsistent with {channels} channels"
        )));
    }
    if u64::from(byte_rate) != u64::from(sample_rate) * u64::from(block_align) {
        return Err(Error::MalformedAudio(format!(
            "byte rate {byte_rate} inconsistent with {sample_rate} Hz x {block_align}"
        )));
    }

    let declared = u32_at(bytes, OFFSET_DATA_SIZE) as usize;
    if block_align == 0 || declared % usize::from(block_align) != 0 {
        return Err(Error::MalformedAudio(format!(
            "data size {declared} is not a whole number of frames"
        )));
    }

    let available = bytes.len() - WAV_HEADER_LEN;
    if declared > available {
        return Err(Error::TruncatedAudio {
            declared,
            available,
        });
    }

    let data = &bytes[WAV_HEADER_LEN..WAV_HEADER_LEN + declared];
    let samples: Vec<f32> = data
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
        .collect();

    tracing::trace!(
        channels,
        sample_rate,
        samples = samples.len(),
        trailing = available - declared,
        "decoded pcm16 wav"
    );

    SampleBuffer::new(channels, sample_rate, samples)
}

/// Encode a sample buffer as a 16-bit PCM WAV file
///
/// # Errors
///
/// Returns error if the WAV writer fails
pub fn encode_pcm16_wav(buffer: &SampleBuffer) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: buffer.channels(),
        sample_rate: buffer.sample_rate(),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in buffer.samples() {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32768.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
