//! Minimal OpenAI client: speech synthesis and chat completions.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};

/// Longest input the speech endpoint accepts.
pub const SPEECH_INPUT_LIMIT: usize = 4096;
pub const CHAT_RETRIES: usize = 5;
const CHAT_RETRY_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    speech_model: String,
    voice: String,
    chat_model: String,
    retry_delay: Duration,
}

impl OpenAiClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            api_key: config.openai_api_key.clone(),
            speech_model: config.audio_model.clone(),
            voice: config.audio_voice.clone(),
            chat_model: config.chat_model.clone(),
            retry_delay: CHAT_RETRY_DELAY,
        }
    }

    #[cfg(test)]
    fn without_retry_delay(mut self) -> Self {
        self.retry_delay = Duration::ZERO;
        self
    }

    /// WAV audio for `input`, which must fit [`SPEECH_INPUT_LIMIT`].
    pub async fn speech(&self, input: &str) -> Result<Vec<u8>> {
        if input.len() > SPEECH_INPUT_LIMIT {
            return Err(Error::service(
                "openai speech",
                format!("input of {} chars exceeds {}", input.len(), SPEECH_INPUT_LIMIT),
            ));
        }
        debug!("Requesting speech for {} chars", input.len());
        let bytes = self
            .http
            .post(format!("{}/v1/audio/speech", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&SpeechRequest {
                model: &self.speech_model,
                input,
                voice: &self.voice,
                response_format: "wav",
            })
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }

    /// One completion for a system prompt and user content. Responses without
    /// text content are retried up to [`CHAT_RETRIES`] times.
    pub async fn chat(&self, system_prompt: &str, content: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.chat_model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content,
                },
            ],
        };
        for attempt in 0..=CHAT_RETRIES {
            let response: ChatResponse = self
                .http
                .post(format!("{}/v1/chat/completions", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            let text = response
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .filter(|t| !t.trim().is_empty());
            if let Some(text) = text {
                return Ok(text.trim().to_string());
            }
            warn!(
                "openai text generation error. retries left: {}",
                CHAT_RETRIES - attempt
            );
            if attempt < CHAT_RETRIES {
                sleep(self.retry_delay).await;
            }
        }
        info!("Giving up on text generation");
        Err(Error::service("openai chat", "no text content in any response"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> OpenAiClient {
        let config = Config {
            openai_base_url: server.uri(),
            openai_api_key: "sk-test".to_string(),
            ..Config::default()
        };
        OpenAiClient::new(&config).without_retry_delay()
    }

    #[tokio::test]
    async fn speech_posts_wav_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/speech"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({"input": "hello", "response_format": "wav", "voice": "onyx"})))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"RIFF....".to_vec()))
            .expect(1)
            .mount(&server)
            .await;
        let audio = client_for(&server).speech("hello").await.unwrap();
        assert_eq!(audio, b"RIFF....");
    }

    #[tokio::test]
    async fn overlong_speech_input_is_rejected_locally() {
        let server = MockServer::start().await;
        let err = client_for(&server)
            .speech(&"x".repeat(SPEECH_INPUT_LIMIT + 1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ExternalServiceFailure);
    }

    #[tokio::test]
    async fn chat_returns_trimmed_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "  A title | hook \n"}}]
            })))
            .mount(&server)
            .await;
        let text = client_for(&server).chat("system", "user").await.unwrap();
        assert_eq!(text, "A title | hook");
    }

    #[tokio::test]
    async fn chat_gives_up_after_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": null}}]
            })))
            .expect(CHAT_RETRIES as u64 + 1)
            .mount(&server)
            .await;
        assert!(client_for(&server).chat("system", "user").await.is_err());
    }
}
