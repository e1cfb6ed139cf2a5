//! Audio output
//!
//! A [`PlaybackSink`] holds at most one loaded buffer. Loading a new buffer
//! replaces the previous one and invalidates its handle.

mod convert;
mod speaker;

use std::time::Duration;

use tokio::time::Instant;

use crate::audio::SampleBuffer;
use crate::{Error, Result};

pub use convert::to_device_format;
pub use speaker::SpeakerSink;

/// Opaque reference to a buffer loaded into a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaybackHandle(u64);

impl PlaybackHandle {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }
}

/// Audio output device abstraction
pub trait PlaybackSink: Send {
    /// Load a buffer, replacing whatever was loaded before
    ///
    /// # Errors
    ///
    /// Returns `Audio` if the buffer cannot be prepared for the device
    fn load(&mut self, buffer: SampleBuffer) -> Result<PlaybackHandle>;

    /// Start playing a loaded buffer
    ///
    /// # Errors
    ///
    /// Returns `Audio` if the handle is no longer current
    fn play(&mut self, handle: PlaybackHandle) -> Result<()>;

    /// Whether the buffer behind `handle` is still playing
    fn is_playing(&self, handle: PlaybackHandle) -> bool;
}

/// Sink for headless runs
///
/// Nothing is output, but a buffer reports playing for its natural duration
/// so completion-driven settling behaves as it would on a device.
#[derive(Debug, Default)]
pub struct NullSink {
    next_id: u64,
    current: Option<(PlaybackHandle, Duration)>,
    started: Option<Instant>,
}

impl NullSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl PlaybackSink for NullSink {
    fn load(&mut self, buffer: SampleBuffer) -> Result<PlaybackHandle> {
        self.next_id += 1;
        let handle = PlaybackHandle::new(self.next_id);
        self.current = Some((handle, buffer.duration()));
        self.started = None;
        Ok(handle)
    }

    fn play(&mut self, handle: PlaybackHandle) -> Result<()> {
        match self.current {
            Some((current, duration)) if current == handle => {
                tracing::debug!(handle = handle.id(), ?duration, "null sink playing");
                self.started = Some(Instant::now());
                Ok(())
            }
            _ => Err(Error::Audio(format!("stale playback handle {}", handle.id()))),
        }
    }

    fn is_playing(&self, handle: PlaybackHandle) -> bool {
        match (self.current, self.started) {
            (Some((current, duration)), Some(started)) if current == handle => {
                started.elapsed() < duration
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_null_sink_plays_for_buffer_duration() {
        let mut sink = NullSink::new();
        let buffer = SampleBuffer::new(1, 1000, vec![0.0; 500]).unwrap();

        let handle = sink.load(buffer).unwrap();
        assert!(!sink.is_playing(handle));

        sink.play(handle).unwrap();
        assert!(sink.is_playing(handle));

        tokio::time::advance(Duration::from_millis(600)).await;
        assert!(!sink.is_playing(handle));
    }

    #[test]
    fn test_load_invalidates_previous_handle() {
        let mut sink = NullSink::new();
        let first = sink
            .load(SampleBuffer::new(1, 1000, vec![0.0; 10]).unwrap())
            .unwrap();
        let second = sink
            .load(SampleBuffer::new(1, 1000, vec![0.0; 10]).unwrap())
            .unwrap();

        assert_ne!(first, second);
        assert!(sink.play(first).is_err());
        assert!(sink.play(second).is_ok());
    }
}
