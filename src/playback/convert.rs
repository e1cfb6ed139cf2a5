//! Channel mapping and resampling for the output device

use crate::audio::SampleBuffer;
use crate::{Error, Result};

const RESAMPLE_CHUNK: usize = 1024;

/// Convert a buffer to interleaved samples at the device rate and channel count
///
/// # Errors
///
/// Returns `Audio` if the resampler cannot be built or fails
pub fn to_device_format(buffer: &SampleBuffer, rate: u32, channels: u16) -> Result<Vec<f32>> {
    let mut planes = deinterleave(buffer);

    if buffer.sample_rate() != rate {
        planes = resample(&planes, buffer.sample_rate(), rate)?;
    }

    Ok(interleave(&planes, usize::from(channels)))
}

fn deinterleave(buffer: &SampleBuffer) -> Vec<Vec<f32>> {
    let channels = usize::from(buffer.channels());
    let mut planes = vec![Vec::with_capacity(buffer.frames()); channels];
    for frame in buffer.samples().chunks_exact(channels) {
        for (plane, &sample) in planes.iter_mut().zip(frame) {
            plane.push(sample);
        }
    }
    planes
}

/// Map source planes onto `channels` outputs
///
/// Mono fans out to every output; stereo folds down to mono by averaging and
/// leaves extra outputs silent.
fn interleave(planes: &[Vec<f32>], channels: usize) -> Vec<f32> {
    let frames = planes.first().map_or(0, Vec::len);
    let mut out = Vec::with_capacity(frames * channels);

    for i in 0..frames {
        for c in 0..channels {
            let sample = match planes.len() {
                1 => planes[0][i],
                _ if channels == 1 => f32::midpoint(planes[0][i], planes[1][i]),
                n if c < n => planes[c][i],
                _ => 0.0,
            };
            out.push(sample);
        }
    }

    out
}

/// Resample using rubato
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss, clippy::cast_sign_loss)]
fn resample(planes: &[Vec<f32>], from_rate: u32, to_rate: u32) -> Result<Vec<Vec<f32>>> {
    use rubato::{FftFixedIn, Resampler};

    let frames = planes.first().map_or(0, Vec::len);
    if frames == 0 {
        return Ok(planes.to_vec());
    }

    let mut resampler = FftFixedIn::<f32>::new(
        from_rate as usize,
        to_rate as usize,
        RESAMPLE_CHUNK,
        2,
        planes.len(),
    )
    .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))?;

    let expected = (frames as f64 * f64::from(to_rate) / f64::from(from_rate)).round() as usize;
    let delay = resampler.output_delay();
    let mut output = vec![Vec::with_capacity(expected + delay); planes.len()];

    // Keep feeding (zero padded past the end) until the delayed tail is flushed
    let mut start = 0;
    while start < frames || output[0].len() < expected + delay {
        let needed = resampler.input_frames_next();
        let lo = start.min(frames);
        let end = (start + needed).min(frames);
        let chunk: Vec<Vec<f32>> = planes
            .iter()
            .map(|plane| {
                let mut c = plane[lo..end].to_vec();
                c.resize(needed, 0.0);
                c
            })
            .collect();

        let result = resampler
            .process(&chunk, None)
            .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
        for (out, plane) in output.iter_mut().zip(result) {
            out.extend_from_slice(&plane);
        }

        start += needed;
    }

    for plane in &mut output {
        plane.drain(..delay.min(plane.len()));
        plane.truncate(expected);
    }

    Ok(output)
}
