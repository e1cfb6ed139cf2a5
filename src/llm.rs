//! Chat completion client

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::{Error, Result};

/// Default chat completions endpoint
pub const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Produces an assistant reply for a system prompt and user message
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    /// Return the first completion's message content
    ///
    /// # Errors
    ///
    /// Returns `Provider` on transport failure or a non-2xx response, and
    /// `EmptyCompletion` if the provider returned no usable completion
    async fn complete(&self, system_prompt: &str, user_message: &str) -> Result<String>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Pick the first completion's content out of a response body
fn first_completion(body: &str) -> Result<String> {
    let response: ChatResponse = serde_json::from_str(body)?;

    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or(Error::EmptyCompletion)
}

/// `OpenAI`-compatible chat completions client
pub struct OpenAiChat {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    url: String,
}

impl OpenAiChat {
    /// Create a new chat client
    ///
    /// # Errors
    ///
    /// Returns error if API key is empty
    pub fn new(
        client: reqwest::Client,
        api_key: SecretString,
        model: String,
        url: Option<String>,
    ) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config("OpenAI API key required for chat".to_string()));
        }

        Ok(Self {
            client,
            api_key,
            model,
            url: url.unwrap_or_else(|| OPENAI_CHAT_URL.to_string()),
        })
    }

    /// Build a client from configuration
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn from_config(config: &LlmConfig, timeout: Duration) -> Result<Self> {
        let key = config
            .api_key
            .clone()
            .ok_or_else(|| Error::Config("OpenAI API key required for chat".to_string()))?;
        Self::new(
            crate::http::client(timeout)?,
            key,
            config.model.clone(),
            config.url.clone(),
        )
    }
}

#[async_trait]
impl ChatCompletion for OpenAiChat {
    async fn complete(&self, system_prompt: &str, user_message: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_message,
                },
            ],
        };

        tracing::debug!(model = %self.model, chars = user_message.len(), "requesting completion");

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        let response = crate::http::ensure_success(response, "OpenAI chat").await?;
        let body = response.text().await?;
        let content = first_completion(&body)?;

        tracing::debug!(response_len = content.len(), "completion received");
        Ok(content)
    }
}
