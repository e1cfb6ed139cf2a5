//! Google Cloud Text-to-Speech
//!
//! Nested request body, API key in the query string, audio returned as a
//! base64 string inside a JSON envelope.

use async_trait::async_trait;
use base64::Engine as _;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::audio::{AudioEncoding, RawAudioPayload};
use crate::{Error, Result};

use super::{SpeechSynthesizer, SynthesisRequest, VoiceConfig};

/// Default synthesis endpoint
pub const GOOGLE_TTS_URL: &str = "https://texttospeech.googleapis.com/v1/text:synthesize";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleRequest<'a> {
    input: GoogleInput<'a>,
    voice: GoogleVoice<'a>,
    audio_config: GoogleAudioConfig,
}

#[derive(Serialize)]
struct GoogleInput<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleVoice<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    language_code: Option<&'a str>,
    name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleAudioConfig {
    audio_encoding: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleResponse {
    audio_content: String,
}

impl<'a> GoogleRequest<'a> {
    fn new(text: &'a str, voice: &'a VoiceConfig) -> Self {
        let audio_encoding = match voice.audio_encoding {
            AudioEncoding::Pcm16Wav => "LINEAR16",
            AudioEncoding::Compressed => "MP3",
        };

        Self {
            input: GoogleInput { text },
            voice: GoogleVoice {
                language_code: voice.language_code.as_deref(),
                name: &voice.voice_id,
            },
            audio_config: GoogleAudioConfig { audio_encoding },
        }
    }
}

/// Structured-voice provider returning base64 audio
pub struct GoogleTts {
    client: reqwest::Client,
    api_key: SecretString,
    url: String,
}

impl GoogleTts {
    /// Create a new Google TTS client
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
            return Err(Error::Config("Google API key required for TTS".to_string()));
        }

        Ok(Self {
            client,
            api_key,
            url: url.unwrap_or_else(|| GOOGLE_TTS_URL.to_string()),
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for GoogleTts {
    fn name(&self) -> &'static str {
        "google"
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<RawAudioPayload> {
        let voice = request.voice();
        let body = GoogleRequest::new(request.text(), voice);

        tracing::debug!(
            voice = %voice.voice_id,
            encoding = %voice.audio_encoding,
            chars = request.text().len(),
            "requesting google synthesis"
        );

        let response = self
            .client
            .post(&self.url)
            .query(&[("key", self.api_key.expose_secret())])
            .json(&body)
            .send()
            .await?;

        let response = crate::http::ensure_success(response, "Google TTS").await?;
        let text = response.text().await?;
        let parsed: GoogleResponse = serde_json::from_str(&text)?;

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(parsed.audio_content.trim())
            .map_err(|e| Error::MalformedAudio(format!("invalid base64 audioContent: {e}")))?;

        Ok(RawAudioPayload::new(bytes, voice.audio_encoding))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let voice = VoiceConfig {
            language_code: Some("ko-KR".to_string()),
            voice_id: "ko-KR-Wavenet-A".to_string(),
            audio_encoding: AudioEncoding::Pcm16Wav,
            model: String::new(),
        };
        let body = serde_json::to_value(GoogleRequest::new("say \"hi\"", &voice)).unwrap();

        assert_eq!(
            body,
            serde_json::json!({
                "input": { "text": "say \"hi\"" },
                "voice": { "languageCode": "ko-KR", "name": "ko-KR-Wavenet-A" },
                "audioConfig": { "audioEncoding": "LINEAR16" }
            })
        );
    }

    #[test]
    fn test_compressed_request_omits_missing_language() {
        let voice = VoiceConfig {
            language_code: None,
            voice_id: "en-US-Wavenet-D".to_string(),
            audio_encoding: AudioEncoding::Compressed,
            model: String::new(),
        };
        let body = serde_json::to_value(GoogleRequest::new("hello", &voice)).unwrap();

        assert_eq!(body["audioConfig"]["audioEncoding"], "MP3");
        assert!(body["voice"].get("languageCode").is_none());
    }

    #[test]
    fn test_empty_key_rejected() {
        let result = GoogleTts::new(reqwest::Client::new(), SecretString::from(""), None);
        assert!(result.is_err());
    }
}
