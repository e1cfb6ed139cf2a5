//! Text-to-speech providers
//!
//! Each provider implements [`SpeechSynthesizer`] and hands back raw audio
//! tagged with its encoding. Decoding is left to [`crate::audio`].

mod google;
mod openai;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::audio::{AudioEncoding, RawAudioPayload};
use crate::config::TtsConfig;
use crate::{Error, Result};

pub use google::GoogleTts;
pub use openai::OpenAiTts;

/// Voice selection, owned by configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceConfig {
    /// BCP-47 language code (Google only)
    pub language_code: Option<String>,

    /// Provider voice identifier (e.g. "en-US-Wavenet-D", "alloy")
    pub voice_id: String,

    /// Requested audio encoding (Google only; `OpenAI` always returns MP3)
    pub audio_encoding: AudioEncoding,

    /// Synthesis model (`OpenAI` only, e.g. "tts-1")
    pub model: String,
}

/// One synthesis call
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    text: String,
    voice: VoiceConfig,
}

impl SynthesisRequest {
    /// Create a request
    ///
    /// # Errors
    ///
    /// Returns `Config` if the text is empty
    pub fn new(text: impl Into<String>, voice: VoiceConfig) -> Result<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(Error::Config("synthesis text is empty".to_string()));
        }
        Ok(Self { text, voice })
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub const fn voice(&self) -> &VoiceConfig {
        &self.voice
    }
}

/// Converts text into an audio payload
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &'static str;

    /// Synthesize one request
    ///
    /// # Errors
    ///
    /// Returns `Provider` on transport failure or a non-2xx response
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<RawAudioPayload>;
}

/// TTS backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TtsProviderKind {
    /// Google Cloud Text-to-Speech (structured voice, base64 WAV)
    #[default]
    Google,
    /// `OpenAI` speech endpoint (flat voice, raw MP3)
    OpenAi,
}

impl TtsProviderKind {
    /// Default voice for this backend
    #[must_use]
    pub const fn default_voice(self) -> &'static str {
        match self {
            Self::Google => "en-US-Wavenet-D",
            Self::OpenAi => "alloy",
        }
    }
}

impl FromStr for TtsProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "google" | "google tts" => Ok(Self::Google),
            "openai" | "openai tts" => Ok(Self::OpenAi),
            other => Err(Error::Config(format!("unknown TTS provider: {other}"))),
        }
    }
}

impl fmt::Display for TtsProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Google => f.write_str("google"),
            Self::OpenAi => f.write_str("openai"),
        }
    }
}

/// Build the configured synthesizer
///
/// # Errors
///
/// Returns `Config` if the selected provider's API key is missing
pub fn from_config(config: &TtsConfig, timeout: Duration) -> Result<Arc<dyn SpeechSynthesizer>> {
    let client = crate::http::client(timeout)?;

    let synth: Arc<dyn SpeechSynthesizer> = match config.provider {
        TtsProviderKind::Google => {
            let key = config
                .google_api_key
                .clone()
                .ok_or_else(|| Error::Config("Google API key required for TTS".to_string()))?;
            Arc::new(GoogleTts::new(client, key, config.google_url.clone())?)
        }
        TtsProviderKind::OpenAi => {
            let key = config
                .openai_api_key
                .clone()
                .ok_or_else(|| Error::Config("OpenAI API key required for TTS".to_string()))?;
            Arc::new(OpenAiTts::new(client, key, config.openai_url.clone())?)
        }
    };

    tracing::debug!(provider = synth.name(), "tts provider ready");
    Ok(synth)
}
