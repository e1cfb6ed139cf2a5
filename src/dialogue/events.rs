//! Signals emitted by the orchestrator

use std::fmt;

use crate::error::ErrorKind;

/// Orchestrator progress for the live turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DialoguePhase {
    #[default]
    Idle,
    AwaitingCompletion,
    AwaitingSynthesis,
    Decoding,
    Playing,
}

impl fmt::Display for DialoguePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::AwaitingCompletion => "awaiting_completion",
            Self::AwaitingSynthesis => "awaiting_synthesis",
            Self::Decoding => "decoding",
            Self::Playing => "playing",
        };
        f.write_str(name)
    }
}

/// Lifecycle signal for collaborators
///
/// Only the live turn emits; results of superseded turns are dropped silently.
/// The one exception is [`DialogueEvent::PlaybackSettled`], which a turn that
/// already started playback always sends once it stops waiting on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogueEvent {
    /// Assistant text for the turn
    Reply { turn: u64, text: String },
    /// Audio handed to the sink and started
    PlaybackStarted { turn: u64 },
    /// Playback finished (or the settle timer ran out)
    PlaybackSettled { turn: u64 },
    /// The turn was aborted
    Error {
        turn: u64,
        kind: ErrorKind,
        detail: String,
    },
}

impl DialogueEvent {
    /// Turn the event belongs to
    #[must_use]
    pub const fn turn(&self) -> u64 {
        match self {
            Self::Reply { turn, .. }
            | Self::PlaybackStarted { turn }
            | Self::PlaybackSettled { turn }
            | Self::Error { turn, .. } => *turn,
        }
    }
}

/// How a call to `handle_user_input` ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Input was blank
    Ignored,
    /// A newer turn took over before this one finished
    Superseded { turn: u64 },
    /// Audio played and settled
    Settled { turn: u64 },
}
