//! Audio playback to speakers

use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use crate::audio::SampleBuffer;
use crate::{Error, Result};

use super::{PlaybackHandle, PlaybackSink, to_device_format};

/// Preferred output rate (matches common TTS output)
const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Buffer shared with the output callback
#[derive(Default)]
struct Track {
    handle: Option<PlaybackHandle>,
    samples: Vec<f32>,
    position: usize,
    playing: bool,
}

fn lock(track: &Mutex<Track>) -> MutexGuard<'_, Track> {
    track.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Plays audio to the default output device
///
/// The cpal stream is not `Send`, so it lives on a dedicated thread for the
/// lifetime of the sink; the output callback pulls from the current track.
pub struct SpeakerSink {
    track: Arc<Mutex<Track>>,
    config: StreamConfig,
    next_id: u64,
    _shutdown: mpsc::Sender<()>,
}

impl SpeakerSink {
    /// Open the default output device
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn new() -> Result<Self> {
        let track = Arc::new(Mutex::new(Track::default()));
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<StreamConfig>>();

        let callback_track = Arc::clone(&track);
        std::thread::Builder::new()
            .name("npc-voice-output".to_string())
            .spawn(move || {
                let stream = match open_stream(callback_track) {
                    Ok((stream, config)) => {
                        let _ = ready_tx.send(Ok(config));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Blocks until the sink (and its sender) is dropped
                let _ = shutdown_rx.recv();
                drop(stream);
                tracing::debug!("audio output closed");
            })?;

        let config = ready_rx
            .recv()
            .map_err(|_| Error::Audio("audio output thread exited".to_string()))??;

        Ok(Self {
            track,
            config,
            next_id: 0,
            _shutdown: shutdown_tx,
        })
    }

    /// Device sample rate
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    /// Device channel count
    #[must_use]
    pub const fn channels(&self) -> u16 {
        self.config.channels
    }
}

fn open_stream(track: Arc<Mutex<Track>>) -> Result<(cpal::Stream, StreamConfig)> {
    let host = cpal::default_host();

    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

    let supports = |c: &cpal::SupportedStreamConfigRange, channels: u16| {
        c.channels() == channels
            && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
            && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
    };

    let config = match device
        .supported_output_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|c| supports(c, 1))
        .or_else(|| {
            // Fallback: try stereo
            device.supported_output_configs().ok()?.find(|c| supports(c, 2))
        }) {
        Some(supported) => supported
            .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
            .config(),
        None => device
            .default_output_config()
            .map_err(|e| Error::Audio(e.to_string()))?
            .config(),
    };

    let channels = usize::from(config.channels);

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut track = lock(&track);

                if !track.playing {
                    data.fill(0.0);
                    return;
                }

                let start = track.position;
                let end = (start + data.len()).min(track.samples.len());
                let n = end - start;
                data[..n].copy_from_slice(&track.samples[start..end]);
                data[n..].fill(0.0);
                track.position = end;

                if track.position >= track.samples.len() {
                    track.playing = false;
                }
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate = config.sample_rate.0,
        channels,
        "audio playback initialized"
    );

    Ok((stream, config))
}

impl PlaybackSink for SpeakerSink {
    fn load(&mut self, buffer: SampleBuffer) -> Result<PlaybackHandle> {
        let samples = to_device_format(&buffer, self.sample_rate(), self.channels())?;

        self.next_id += 1;
        let handle = PlaybackHandle::new(self.next_id);

        let mut track = lock(&self.track);
        *track = Track {
            handle: Some(handle),
            samples,
            position: 0,
            playing: false,
        };

        tracing::debug!(handle = handle.id(), samples = track.samples.len(), "buffer loaded");
        Ok(handle)
    }

    fn play(&mut self, handle: PlaybackHandle) -> Result<()> {
        let mut track = lock(&self.track);
        if track.handle != Some(handle) {
            return Err(Error::Audio(format!("stale playback handle {}", handle.id())));
        }

        track.position = 0;
        track.playing = !track.samples.is_empty();
        Ok(())
    }

    fn is_playing(&self, handle: PlaybackHandle) -> bool {
        let track = lock(&self.track);
        track.handle == Some(handle) && track.playing
    }
}
