//! Configuration management for the NPC voice pipeline
//!
//! Values resolve with priority env > TOML file > default.

pub mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::audio::AudioEncoding;
use crate::dialogue::DialogueMode;
use crate::tts::{TtsProviderKind, VoiceConfig};
use crate::{Error, Result};

use file::NpcConfigFile;

/// Default system prompt
pub const DEFAULT_SYSTEM_PROMPT: &str = "answer any question";

/// Default settle timer when playback completion is unavailable
pub const DEFAULT_SETTLE_SECS: u64 = 5;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Chat completion settings
    pub llm: LlmConfig,

    /// Speech synthesis settings
    pub tts: TtsConfig,

    /// Playback settings
    pub playback: PlaybackConfig,

    /// Upper bound for each network call
    pub request_timeout: Duration,

    /// Archive synthesized clips here, if set
    pub recordings_dir: Option<PathBuf>,

    /// Scratch directory for compressed decode (system temp if unset)
    pub scratch_dir: Option<PathBuf>,

    /// Converse with the LLM or recite input directly
    pub mode: DialogueMode,
}

/// Chat completion configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// `OpenAI` API key
    pub api_key: Option<SecretString>,

    /// Model identifier
    pub model: String,

    /// System prompt sent with every turn
    pub system_prompt: String,

    /// Endpoint override
    pub url: Option<String>,
}

/// Speech synthesis configuration
#[derive(Debug, Clone)]
pub struct TtsConfig {
    /// Selected backend
    pub provider: TtsProviderKind,

    /// Google Cloud API key
    pub google_api_key: Option<SecretString>,

    /// `OpenAI` API key
    pub openai_api_key: Option<SecretString>,

    /// Voice selection
    pub voice: VoiceConfig,

    /// Google endpoint override
    pub google_url: Option<String>,

    /// `OpenAI` endpoint override
    pub openai_url: Option<String>,
}

/// Playback configuration
#[derive(Debug, Clone, Copy)]
pub struct PlaybackConfig {
    /// How long the NPC stays in the talking state
    pub settle: SettlePolicy,
}

/// How a playing turn returns to idle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlePolicy {
    /// Follow the sink's playback completion
    PlaybackCompletion {
        /// Interval between `is_playing` checks
        poll: Duration,
        /// Grace period past the clip's length before giving up
        fallback: Duration,
    },
    /// Fixed timer independent of clip length
    FixedTimer(Duration),
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self::PlaybackCompletion {
            poll: Duration::from_millis(50),
            fallback: Duration::from_secs(DEFAULT_SETTLE_SECS),
        }
    }
}

impl SettlePolicy {
    /// Parse "playback", "timer" or a number of seconds
    ///
    /// # Errors
    ///
    /// Returns `Config` for any other value
    pub fn parse(value: &str, fallback: Duration) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "playback" | "completion" => Ok(Self::PlaybackCompletion {
                poll: Duration::from_millis(50),
                fallback,
            }),
            "timer" => Ok(Self::FixedTimer(Duration::from_secs(DEFAULT_SETTLE_SECS))),
            other => other
                .parse::<f64>()
                .ok()
                .filter(|secs| secs.is_finite() && *secs > 0.0)
                .map(|secs| Self::FixedTimer(Duration::from_secs_f64(secs)))
                .ok_or_else(|| Error::Config(format!("invalid settle policy: {value}"))),
        }
    }
}

fn parse_encoding(value: &str) -> Result<AudioEncoding> {
    match value.trim().to_lowercase().as_str() {
        "linear16" | "wav" | "pcm16" => Ok(AudioEncoding::Pcm16Wav),
        "mp3" | "compressed" => Ok(AudioEncoding::Compressed),
        other => Err(Error::Config(format!("unknown audio encoding: {other}"))),
    }
}

fn parse_mode(value: &str) -> Result<DialogueMode> {
    match value.trim().to_lowercase().as_str() {
        "converse" | "chat" => Ok(DialogueMode::Converse),
        "recite" | "tts" => Ok(DialogueMode::Recite),
        other => Err(Error::Config(format!("unknown dialogue mode: {other}"))),
    }
}

impl Config {
    /// Load configuration from the environment and the TOML file
    ///
    /// # Errors
    ///
    /// Returns error if a value cannot be parsed, or if an explicitly given
    /// config file cannot be read or parsed
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let fc = file::load_config_file(config_path)?;
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Resolve configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if a value cannot be parsed
    pub fn from_sources(fc: NpcConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        // API keys (env > toml > None)
        let openai_key = env("OPENAI_API_KEY")
            .or(fc.api_keys.openai)
            .map(SecretString::from);
        let google_key = env("GOOGLE_TTS_API_KEY")
            .or(fc.api_keys.google)
            .map(SecretString::from);

        let llm = LlmConfig {
            api_key: openai_key.clone(),
            model: env("NPC_LLM_MODEL")
                .or(fc.llm.model)
                .unwrap_or_else(|| "gpt-4o".to_string()),
            system_prompt: env("NPC_SYSTEM_PROMPT")
                .or(fc.llm.system_prompt)
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            url: env("NPC_LLM_URL").or(fc.llm.url),
        };

        // TTS config (env > toml > provider default)
        let provider = env("NPC_TTS_PROVIDER")
            .or(fc.tts.provider)
            .map(|p| p.parse::<TtsProviderKind>())
            .transpose()?
            .unwrap_or_default();

        let audio_encoding = match provider {
            TtsProviderKind::OpenAi => AudioEncoding::Compressed,
            TtsProviderKind::Google => env("NPC_TTS_ENCODING")
                .or(fc.tts.encoding)
                .map(|e| parse_encoding(&e))
                .transpose()?
                .unwrap_or(AudioEncoding::Pcm16Wav),
        };

        let voice = VoiceConfig {
            language_code: Some(
                env("NPC_TTS_LANGUAGE")
                    .or(fc.tts.language)
                    .unwrap_or_else(|| "en-US".to_string()),
            ),
            voice_id: env("NPC_TTS_VOICE")
                .or(fc.tts.voice)
                .unwrap_or_else(|| provider.default_voice().to_string()),
            audio_encoding,
            model: env("NPC_TTS_MODEL")
                .or(fc.tts.model)
                .unwrap_or_else(|| "tts-1".to_string()),
        };

        let tts = TtsConfig {
            provider,
            google_api_key: google_key,
            openai_api_key: openai_key,
            voice,
            google_url: env("NPC_GOOGLE_TTS_URL").or(fc.tts.google_url),
            openai_url: env("NPC_OPENAI_TTS_URL").or(fc.tts.openai_url),
        };

        // Playback (env > toml > completion-driven default)
        let fallback = Duration::from_secs(
            env("NPC_SETTLE_FALLBACK_SECS")
                .and_then(|s| s.parse().ok())
                .or(fc.playback.settle_fallback_secs)
                .unwrap_or(DEFAULT_SETTLE_SECS),
        );
        let settle = env("NPC_SETTLE")
            .or(fc.playback.settle)
            .map(|s| SettlePolicy::parse(&s, fallback))
            .transpose()?
            .unwrap_or(SettlePolicy::PlaybackCompletion {
                poll: Duration::from_millis(50),
                fallback,
            });

        let request_timeout = Duration::from_secs(
            env("NPC_REQUEST_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .or(fc.pipeline.request_timeout_secs)
                .unwrap_or(30),
        );

        let mode = env("NPC_MODE")
            .or(fc.pipeline.mode)
            .map(|m| parse_mode(&m))
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            llm,
            tts,
            playback: PlaybackConfig { settle },
            request_timeout,
            recordings_dir: env("NPC_RECORDINGS_DIR")
                .or(fc.pipeline.recordings_dir)
                .map(PathBuf::from),
            scratch_dir: env("NPC_SCRATCH_DIR")
                .or(fc.pipeline.scratch_dir)
                .map(PathBuf::from),
            mode,
        })
    }

    /// Switch TTS backend, resetting the voice to that backend's default
    pub fn set_provider(&mut self, provider: TtsProviderKind) {
        if self.tts.provider == provider {
            return;
        }
        self.tts.provider = provider;
        self.tts.voice.voice_id = provider.default_voice().to_string();
        if provider == TtsProviderKind::OpenAi {
            self.tts.voice.audio_encoding = AudioEncoding::Compressed;
        }
    }

    /// Check that the configuration can drive a turn
    ///
    /// # Errors
    ///
    /// Returns `Config` describing the first problem found
    pub fn validate(&self) -> Result<()> {
        let has_key = |key: &Option<SecretString>| {
            key.as_ref().is_some_and(|k| !k.expose_secret().is_empty())
        };

        if self.mode == DialogueMode::Converse && !has_key(&self.llm.api_key) {
            return Err(Error::Config("OPENAI_API_KEY required for chat".to_string()));
        }

        match self.tts.provider {
            TtsProviderKind::Google if !has_key(&self.tts.google_api_key) => {
                return Err(Error::Config(
                    "GOOGLE_TTS_API_KEY required for Google TTS".to_string(),
                ));
            }
            TtsProviderKind::OpenAi if !has_key(&self.tts.openai_api_key) => {
                return Err(Error::Config(
                    "OPENAI_API_KEY required for OpenAI TTS".to_string(),
                ));
            }
            _ => {}
        }

        if self.tts.voice.voice_id.trim().is_empty() {
            return Err(Error::Config("TTS voice must not be empty".to_string()));
        }

        if self.request_timeout.is_zero() {
            return Err(Error::Config("request timeout must be positive".to_string()));
        }

        Ok(())
    }
}
