//! `OpenAI` speech endpoint

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::audio::{AudioEncoding, RawAudioPayload};
use crate::{Error, Result};

use super::{SpeechSynthesizer, SynthesisRequest};

/// Default synthesis endpoint
pub const OPENAI_TTS_URL: &str = "https://api.openai.com/v1/audio/speech";

#[derive(serde::Serialize)]
struct TtsRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
}

/// Flat-voice provider returning raw MP3 bytes
pub struct OpenAiTts {
    client: reqwest::Client,
    api_key: SecretString,
    url: String,
}

impl OpenAiTts {
    /// Create a new `OpenAI` TTS client
    ///
    /// # Errors
    ///
    /// Returns error if API key is empty
    pub fn new(
        client: reqwest::Client,
        api_key: SecretString,
        url: Option<String>,
    ) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config("OpenAI API key required for TTS".to_string()));
        }

        Ok(Self {
            client,
            api_key,
            url: url.unwrap_or_else(|| OPENAI_TTS_URL.to_string()),
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiTts {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<RawAudioPayload> {
        let voice = request.voice();
        let body = TtsRequest {
            model: &voice.model,
            input: request.text(),
            voice: &voice.voice_id,
        };

        tracing::debug!(
            voice = %voice.voice_id,
            model = %voice.model,
            chars = request.text().len(),
            "requesting openai synthesis"
        );

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;

        let response = crate::http::ensure_success(response, "OpenAI TTS").await?;
        let audio = response.bytes().await?;

        Ok(RawAudioPayload::new(audio.to_vec(), AudioEncoding::Compressed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let body = serde_json::to_value(TtsRequest {
            model: "tts-1-hd",
            input: "it's \"quoted\"",
            voice: "ash",
        })
        .unwrap();

        assert_eq!(
            body,
            serde_json::json!({ "model": "tts-1-hd", "input": "it's \"quoted\"", "voice": "ash" })
        );
    }
}
