//! NPC Voice - spoken replies for a conversational NPC
//!
//! This library turns free-text input into speech:
//! - Chat completion against an `OpenAI`-compatible endpoint
//! - Speech synthesis via Google Cloud TTS or `OpenAI` TTS
//! - WAV / MP3 decoding into sample buffers
//! - Playback through the default output device
//! - An Idle / Listening / Talking presentation state kept in sync with playback
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Input / Presenter                    │
//! │        stdin lines  │  Idle / Listening / Talking    │
//! └────────────────────┬────────────────────────────────┘
//!                      │ text          ▲ DialogueEvent
//! ┌────────────────────▼───────────────┴────────────────┐
//! │               DialogueOrchestrator                   │
//! │   ChatCompletion → SpeechSynthesizer → decode → Sink │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                    Providers                         │
//! │   OpenAI chat  │  Google TTS  │  OpenAI TTS  │ cpal  │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod dialogue;
pub mod error;
mod http;
pub mod llm;
pub mod playback;
pub mod presentation;
pub mod tts;

pub use audio::{AudioEncoding, RawAudioPayload, SampleBuffer};
pub use config::{Config, SettlePolicy};
pub use dialogue::{DialogueEvent, DialogueMode, DialogueOrchestrator, DialoguePhase, TurnOutcome};
pub use error::{Error, ErrorKind, ProviderStatus, Result};
pub use llm::ChatCompletion;
pub use playback::{NullSink, PlaybackHandle, PlaybackSink, SpeakerSink};
pub use presentation::{PresentationState, PresentationStateMachine};
pub use tts::{SpeechSynthesizer, SynthesisRequest, TtsProviderKind, VoiceConfig};
