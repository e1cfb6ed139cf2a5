//! TOML configuration file loading
//!
//! Supports `~/.config/npc-voice/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Error, Result};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct NpcConfigFile {
    /// LLM configuration
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// TTS configuration
    #[serde(default)]
    pub tts: TtsFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,

    /// Playback and settle behaviour
    #[serde(default)]
    pub playback: PlaybackFileConfig,

    /// Pipeline runtime settings
    #[serde(default)]
    pub pipeline: PipelineFileConfig,
}

/// LLM-related configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// Model identifier (e.g. "gpt-4o")
    pub model: Option<String>,

    /// System prompt sent with every turn
    pub system_prompt: Option<String>,

    /// Chat completions endpoint override
    pub url: Option<String>,
}

/// TTS configuration
#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    /// Provider name ("google" or "openai")
    pub provider: Option<String>,

    /// Voice identifier (e.g. "en-US-Wavenet-D", "alloy")
    pub voice: Option<String>,

    /// Language code (Google only)
    pub language: Option<String>,

    /// Model (`OpenAI` only, e.g. "tts-1")
    pub model: Option<String>,

    /// Requested encoding for Google ("linear16" or "mp3")
    pub encoding: Option<String>,

    /// Google endpoint override
    pub google_url: Option<String>,

    /// `OpenAI` endpoint override
    pub openai_url: Option<String>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub google: Option<String>,
}

/// Playback configuration
#[derive(Debug, Default, Deserialize)]
pub struct PlaybackFileConfig {
    /// Settle policy: "playback" or a number of seconds
    pub settle: Option<String>,

    /// Extra seconds allowed past a clip's length before giving up on it
    pub settle_fallback_secs: Option<u64>,
}

/// Pipeline runtime configuration
#[derive(Debug, Default, Deserialize)]
pub struct PipelineFileConfig {
    /// Per network call timeout
    pub request_timeout_secs: Option<u64>,

    /// Directory to archive synthesized clips into
    pub recordings_dir: Option<String>,

    /// Directory for compressed-audio scratch files
    pub scratch_dir: Option<String>,

    /// "converse" or "recite"
    pub mode: Option<String>,
}

/// Load the TOML config file from `path` or the standard location
///
/// A missing file yields `NpcConfigFile::default()`. A broken file at the
/// standard location is logged and skipped; one named explicitly is an error.
///
/// # Errors
///
/// Returns error if an explicit `path` cannot be read or parsed
pub fn load_config_file(path: Option<&Path>) -> Result<NpcConfigFile> {
    let explicit = path.is_some();
    let Some(path) = path.map(Path::to_path_buf).or_else(config_file_path) else {
        return Ok(NpcConfigFile::default());
    };

    if !path.exists() {
        if explicit {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
        }
        return Ok(NpcConfigFile::default());
    }

    let parsed = std::fs::read_to_string(&path)
        .map_err(Error::from)
        .and_then(|content| toml::from_str::<NpcConfigFile>(&content).map_err(Error::from));

    match parsed {
        Ok(config) => {
            tracing::info!(path = %path.display(), "loaded config file");
            Ok(config)
        }
        Err(e) if explicit => Err(e),
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            Ok(NpcConfigFile::default())
        }
    }
}

/// Return the config file path: `~/.config/npc-voice/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("npc-voice").join("config.toml"))
}
