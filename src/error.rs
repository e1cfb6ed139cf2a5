//! Error types for the NPC voice pipeline

use std::fmt;

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Upstream status attached to a provider failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderStatus {
    /// Non-2xx HTTP response
    Http(u16),
    /// Request exceeded the configured timeout
    Timeout,
    /// Connection, TLS or body transfer failure
    Transport,
}

impl ProviderStatus {
    /// HTTP status code, if the provider answered at all
    #[must_use]
    pub const fn code(self) -> Option<u16> {
        match self {
            Self::Http(code) => Some(code),
            Self::Timeout | Self::Transport => None,
        }
    }
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(code) => write!(f, "{code}"),
            Self::Timeout => f.write_str("timeout"),
            Self::Transport => f.write_str("transport"),
        }
    }
}

/// Errors that can occur in the voice pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// LLM or TTS provider failure
    #[error("provider error {status}: {message}")]
    Provider {
        status: ProviderStatus,
        message: String,
    },

    /// The LLM answered without a usable completion
    #[error("provider returned no completion")]
    EmptyCompletion,

    /// Structurally invalid audio payload
    #[error("malformed audio: {0}")]
    MalformedAudio(String),

    /// Header declares more audio than the payload carries
    #[error("truncated audio: header declares {declared} data bytes, {available} present")]
    TruncatedAudio { declared: usize, available: usize },

    /// Output device error
    #[error("audio error: {0}")]
    Audio(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Build a provider error from a status and message
    pub fn provider(status: ProviderStatus, message: impl Into<String>) -> Self {
        Self::Provider {
            status,
            message: message.into(),
        }
    }

    /// Classification reported to collaborators
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) | Self::Toml(_) => ErrorKind::Config,
            Self::Provider { .. } | Self::Serialization(_) => ErrorKind::Provider,
            Self::EmptyCompletion => ErrorKind::EmptyCompletion,
            Self::MalformedAudio(_) => ErrorKind::MalformedAudio,
            Self::TruncatedAudio { .. } => ErrorKind::TruncatedAudio,
            Self::Audio(_) => ErrorKind::Audio,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Provider status, if this is a provider failure
    #[must_use]
    pub const fn provider_status(&self) -> Option<ProviderStatus> {
        match self {
            Self::Provider { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        let status = if e.is_timeout() {
            ProviderStatus::Timeout
        } else if let Some(code) = e.status() {
            ProviderStatus::Http(code.as_u16())
        } else {
            ProviderStatus::Transport
        };
        Self::provider(status, e.to_string())
    }
}

/// Collaborator-facing error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Provider,
    EmptyCompletion,
    MalformedAudio,
    TruncatedAudio,
    Io,
    Audio,
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Provider => "provider",
            Self::EmptyCompletion => "empty_completion",
            Self::MalformedAudio => "malformed_audio",
            Self::TruncatedAudio => "truncated_audio",
            Self::Io => "io",
            Self::Audio => "audio",
            Self::Config => "config",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_status_display() {
        assert_eq!(ProviderStatus::Http(401).to_string(), "401");
        assert_eq!(ProviderStatus::Timeout.to_string(), "timeout");
        assert_eq!(ProviderStatus::Http(503).code(), Some(503));
        assert_eq!(ProviderStatus::Transport.code(), None);
    }

    #[test]
    fn test_error_kind_mapping() {
        let err = Error::provider(ProviderStatus::Http(401), "unauthorized");
        assert_eq!(err.kind(), ErrorKind::Provider);
        assert_eq!(err.provider_status(), Some(ProviderStatus::Http(401)));

        let err = Error::TruncatedAudio {
            declared: 100,
            available: 10,
        };
        assert_eq!(err.kind(), ErrorKind::TruncatedAudio);
        assert_eq!(err.provider_status(), None);

        let err = Error::from(std::io::Error::other("disk full"));
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
