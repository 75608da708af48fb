//! Recognition: send one page image to a vision model, get its text back.
//!
//! The orchestrator only sees the [`Recognizer`] trait. Two implementations
//! ship with the crate:
//!
//! * [`ChatCompletionsRecognizer`]: talks to any OpenAI-compatible
//!   `/chat/completions` endpoint (SiliconFlow's DeepSeek-OCR by default)
//!   with a single user message holding the prompt and the page as a base64
//!   `data:` URL.
//! * [`ProviderRecognizer`]: wraps an edgequake-llm [`LLMProvider`], which
//!   opens up OpenAI, Anthropic, Gemini, Ollama and friends.
//!
//! Each call is bounded by a timeout owned by the recognizer. Nothing here
//! retries; a failed call fails the page.

use super::encode::data_url;
use crate::config::OcrConfig;
use crate::error::{OcrTaskError, RecognitionError};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Longest slice of a response body quoted in an error message.
const MAX_BODY_IN_ERROR: usize = 500;

/// Turns one page image into text.
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Model identifier, recorded in `metadata.json`.
    fn model(&self) -> &str;

    /// Recognise `image` (encoded as `mime_type`) following `prompt`.
    async fn recognize(
        &self,
        image: &[u8],
        mime_type: &str,
        prompt: &str,
    ) -> Result<String, RecognitionError>;
}

/// Pick a recognizer for `config`, from most to least specific:
///
/// 1. a pre-built `provider`;
/// 2. a named edgequake-llm `provider_name`, using `model`;
/// 3. the raw chat-completions client against `base_url` (needs `api_key`).
pub fn resolve_recognizer(config: &OcrConfig) -> Result<Arc<dyn Recognizer>, OcrTaskError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::new(ProviderRecognizer::new(Arc::clone(provider), config)));
    }

    if let Some(ref name) = config.provider_name {
        let provider = ProviderFactory::create_llm_provider(name, &config.model).map_err(|e| {
            OcrTaskError::RecognizerNotConfigured {
                backend: name.clone(),
                hint: format!("{e}"),
            }
        })?;
        return Ok(Arc::new(ProviderRecognizer::new(provider, config)));
    }

    Ok(Arc::new(ChatCompletionsRecognizer::new(config)?))
}

// ── OpenAI-compatible HTTP client ────────────────────────────────────────

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [RequestMessage<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct RequestMessage<'a> {
    role: &'static str,
    content: [ContentPart<'a>; 2],
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<serde_json::Value>,
}

/// [`Recognizer`] for OpenAI-compatible `/chat/completions` endpoints.
#[derive(Clone)]
pub struct ChatCompletionsRecognizer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    timeout_secs: u64,
    max_tokens: Option<usize>,
    temperature: Option<f32>,
}

impl ChatCompletionsRecognizer {
    pub fn new(config: &OcrConfig) -> Result<Self, OcrTaskError> {
        let api_key = config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| OcrTaskError::RecognizerNotConfigured {
                backend: "chat-completions".into(),
                hint: "no API key set (CLI: --api-key / DEEPSEEK_API_KEY)".into(),
            })?
            .to_string();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .build()
            .map_err(|e| OcrTaskError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            timeout_secs: config.api_timeout_secs,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl std::fmt::Debug for ChatCompletionsRecognizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsRecognizer")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Recognizer for ChatCompletionsRecognizer {
    fn model(&self) -> &str {
        &self.model
    }

    async fn recognize(
        &self,
        image: &[u8],
        mime_type: &str,
        prompt: &str,
    ) -> Result<String, RecognitionError> {
        let request = ChatRequest {
            model: &self.model,
            messages: [RequestMessage {
                role: "user",
                content: [
                    ContentPart::Text { text: prompt },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: data_url(mime_type, image),
                        },
                    },
                ],
            }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };
        debug!(
            "POST {} ({} bytes {})",
            self.endpoint,
            image.len(),
            mime_type
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RecognitionError::Timeout {
                        secs: self.timeout_secs,
                    }
                } else {
                    RecognitionError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                RecognitionError::Timeout {
                    secs: self.timeout_secs,
                }
            } else {
                RecognitionError::Transport(e.to_string())
            }
        })?;

        if !status.is_success() {
            return Err(RecognitionError::Status {
                status: status.as_u16(),
                body: truncate(&body),
            });
        }

        parse_content(&body)
    }
}

/// Extract `choices[0].message.content` from a chat-completion body.
fn parse_content(body: &str) -> Result<String, RecognitionError> {
    let malformed = |detail: &str| RecognitionError::MalformedResponse {
        detail: format!("{detail} -> {}", truncate(body)),
    };

    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| malformed(&e.to_string()))?;
    let first = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| malformed("response has no choices"))?;
    match first.message.and_then(|m| m.content) {
        Some(serde_json::Value::String(text)) => Ok(text),
        _ => Err(malformed("message content missing or not a string")),
    }
}

fn truncate(body: &str) -> String {
    if body.chars().count() <= MAX_BODY_IN_ERROR {
        body.to_string()
    } else {
        let mut s: String = body.chars().take(MAX_BODY_IN_ERROR).collect();
        s.push('…');
        s
    }
}

// ── edgequake-llm provider adapter ───────────────────────────────────────

/// [`Recognizer`] backed by an edgequake-llm [`LLMProvider`].
pub struct ProviderRecognizer {
    provider: Arc<dyn LLMProvider>,
    model: String,
    timeout: Duration,
    max_tokens: Option<usize>,
    temperature: Option<f32>,
}

impl ProviderRecognizer {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &OcrConfig) -> Self {
        Self {
            provider,
            model: config.model.clone(),
            timeout: Duration::from_secs(config.api_timeout_secs),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

#[async_trait]
impl Recognizer for ProviderRecognizer {
    fn model(&self) -> &str {
        &self.model
    }

    async fn recognize(
        &self,
        image: &[u8],
        mime_type: &str,
        prompt: &str,
    ) -> Result<String, RecognitionError> {
        let image = ImageData::new(STANDARD.encode(image), mime_type).with_detail("high");
        let messages = vec![ChatMessage::user_with_images(prompt, vec![image])];
        let options = CompletionOptions {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            ..Default::default()
        };

        match tokio::time::timeout(self.timeout, self.provider.chat(&messages, Some(&options))).await
        {
            Err(_) => Err(RecognitionError::Timeout {
                secs: self.timeout.as_secs(),
            }),
            Ok(Err(e)) => Err(RecognitionError::Provider(e.to_string())),
            Ok(Ok(response)) => {
                debug!(
                    "{}: {} input tokens, {} output tokens",
                    self.model, response.prompt_tokens, response.completion_tokens
                );
                Ok(response.content)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::DEFAULT_PROMPT;
    use mockito::Matcher;
    use serde_json::json;
    use std::io::Write;

    fn config_for(server: &mockito::ServerGuard) -> OcrConfig {
        OcrConfig::builder()
            .api_key("sk-test")
            .base_url(format!("{}/v1/", server.url()))
            .model("deepseek-ai/DeepSeek-OCR")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn sends_prompt_and_data_url_and_returns_content() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(Matcher::Json(json!({
                "model": "deepseek-ai/DeepSeek-OCR",
                "messages": [{
                    "role": "user",
                    "content": [
                        {"type": "text", "text": "<image>\nFree OCR."},
                        {"type": "image_url", "image_url": {"url": "data:image/png;base64,YWJj"}}
                    ]
                }]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"  Hello  "}}]}"#)
            .create_async()
            .await;

        let r = ChatCompletionsRecognizer::new(&config_for(&server)).unwrap();
        assert!(r.endpoint().ends_with("/v1/chat/completions"));
        let text = r.recognize(b"abc", "image/png", DEFAULT_PROMPT).await.unwrap();

        assert_eq!(text, "  Hello  ");
        assert_eq!(r.model(), "deepseek-ai/DeepSeek-OCR");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_status_is_distinguishable() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(429)
            .with_body("slow down")
            .create_async()
            .await;

        let r = ChatCompletionsRecognizer::new(&config_for(&server)).unwrap();
        let err = r.recognize(b"abc", "image/png", "p").await.unwrap_err();
        match err {
            RecognitionError::Status { status, body } => {
                assert_eq!(status, 429);
                assert_eq!(body, "slow down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_choices_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[]}"#)
            .create_async()
            .await;

        let r = ChatCompletionsRecognizer::new(&config_for(&server)).unwrap();
        let err = r.recognize(b"abc", "image/png", "p").await.unwrap_err();
        assert!(matches!(err, RecognitionError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        let config = OcrConfig::builder()
            .api_key("sk-test")
            .base_url("http://127.0.0.1:1/v1")
            .api_timeout_secs(5)
            .build()
            .unwrap();
        let r = ChatCompletionsRecognizer::new(&config).unwrap();
        let err = r.recognize(b"abc", "image/png", "p").await.unwrap_err();
        assert!(
            matches!(err, RecognitionError::Transport(_) | RecognitionError::Timeout { .. }),
            "got {err:?}"
        );
    }

    #[tokio::test]
    async fn slow_response_is_a_timeout_with_configured_secs() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_chunked_body(|w| {
                std::thread::sleep(Duration::from_secs(3));
                w.write_all(br#"{"choices":[{"message":{"content":"late"}}]}"#)
            })
            .create_async()
            .await;

        let config = OcrConfig::builder()
            .api_key("sk-test")
            .base_url(format!("{}/v1/", server.url()))
            .api_timeout_secs(1)
            .build()
            .unwrap();
        let r = ChatCompletionsRecognizer::new(&config).unwrap();
        let err = r.recognize(b"abc", "image/png", "p").await.unwrap_err();
        assert!(
            matches!(err, RecognitionError::Timeout { secs: 1 }),
            "got {err:?}"
        );
    }

    #[test]
    fn parse_content_rejects_non_string_content() {
        assert!(parse_content("not json").is_err());
        assert!(parse_content(r#"{"choices":[{"message":{"content":null}}]}"#).is_err());
        assert!(parse_content(r#"{"choices":[{"message":{"content":[1,2]}}]}"#).is_err());
        assert_eq!(
            parse_content(r#"{"choices":[{"message":{"content":"ok"}}]}"#).unwrap(),
            "ok"
        );
    }

    #[test]
    fn missing_api_key_is_a_config_error() {
        let config = OcrConfig::default();
        let err = ChatCompletionsRecognizer::new(&config).unwrap_err();
        assert!(matches!(err, OcrTaskError::RecognizerNotConfigured { .. }));
        assert!(resolve_recognizer(&config).is_err());
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(MAX_BODY_IN_ERROR + 10);
        let t = truncate(&body);
        assert_eq!(t.chars().count(), MAX_BODY_IN_ERROR + 1);
        assert!(t.ends_with('…'));
    }
}
