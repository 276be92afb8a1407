//! OpenAI-compatible chat-completions backend over `reqwest`.
//!
//! Each page becomes one request with a single user message carrying the
//! prompt text and the page as a `data:` image URL:
//!
//! ```json
//! {
//!   "model": "PaddlePaddle/PaddleOCR-VL-1.5",
//!   "messages": [{
//!     "role": "user",
//!     "content": [
//!       {"type": "text", "text": "<prompt>"},
//!       {"type": "image_url", "image_url": {"url": "data:image/png;base64,..."}}
//!     ]
//!   }],
//!   "temperature": 0.1,
//!   "max_tokens": 4000
//! }
//! ```
//!
//! The text is read from `choices[0].message.content`; a response without
//! choices yields empty text rather than an error.

use super::{RecognitionBackend, RecognitionError};
use crate::config::ProcessingConfig;
use crate::error::DocParseError;
use crate::output::PageImage;
use crate::pipeline::encode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;

/// Bound on TCP/TLS connection setup; the overall call is bounded by the
/// page worker's request timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Backend for any `/chat/completions` endpoint that accepts image URLs.
pub struct ChatCompletionsBackend {
    client: reqwest::Client,
    provider: String,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
    closed: AtomicBool,
}

impl ChatCompletionsBackend {
    /// Create a backend for an explicit endpoint.
    pub fn new(
        provider: impl Into<String>,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, DocParseError> {
        let provider = provider.into();
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| DocParseError::ProviderNotConfigured {
                provider: provider.clone(),
                hint: format!("HTTP client could not be created: {e}"),
            })?;

        Ok(Self {
            client,
            provider,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.1,
            max_tokens: 4000,
            closed: AtomicBool::new(false),
        })
    }

    /// Create a backend from the session configuration.
    ///
    /// `base_url` overrides the provider's default endpoint.
    pub fn from_config(config: &ProcessingConfig) -> Result<Self, DocParseError> {
        let provider = config.provider.name().to_string();
        if config.api_key.trim().is_empty() {
            return Err(DocParseError::ProviderNotConfigured {
                hint: format!(
                    "No API key set. Pass --api-key or set {}_API_KEY.",
                    config.provider.env_prefix()
                ),
                provider,
            });
        }

        let endpoint = match (&config.base_url, config.provider.default_endpoint()) {
            (Some(url), _) => url.clone(),
            (None, Some(url)) => url.to_string(),
            (None, None) => {
                return Err(DocParseError::ProviderNotConfigured {
                    provider,
                    hint: "No endpoint known for this provider; set --base-url.".into(),
                })
            }
        };

        let mut backend = Self::new(
            provider,
            endpoint,
            config.api_key.clone(),
            config.effective_model(),
        )?;
        backend.temperature = config.temperature;
        backend.max_tokens = config.max_tokens;
        Ok(backend)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request<'a>(&'a self, data_url: &'a str, prompt: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text { text: prompt },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: data_url },
                    },
                ],
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

#[async_trait]
impl RecognitionBackend for ChatCompletionsBackend {
    fn name(&self) -> &str {
        &self.provider
    }

    async fn recognize(&self, image: &PageImage, prompt: &str) -> Result<String, RecognitionError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RecognitionError::Closed(self.provider.clone()));
        }

        let data_url = encode::to_data_url(image);
        let request = self.build_request(&data_url, prompt);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(map_transport_error)?;
        debug!("{} responded {} ({} bytes)", self.provider, status, body.len());

        if !status.is_success() {
            return Err(RecognitionError::Http {
                status: status.as_u16(),
                body,
            });
        }

        parse_content(&body)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

fn map_transport_error(e: reqwest::Error) -> RecognitionError {
    if e.is_timeout() {
        RecognitionError::Timeout
    } else {
        RecognitionError::Network(e.to_string())
    }
}

/// Extract `choices[0].message.content` from a chat-completions body.
fn parse_content(body: &str) -> Result<String, RecognitionError> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| RecognitionError::Decode(e.to_string()))?;
    Ok(parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default())
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl<'a> },
}

#[derive(Debug, Serialize)]
struct ImageUrl<'a> {
    url: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: ResponseMessage,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderKind;

    fn backend() -> ChatCompletionsBackend {
        ChatCompletionsBackend::new(
            "siliconflow",
            "https://api.siliconflow.cn/v1/chat/completions",
            "sk-test",
            "PaddlePaddle/PaddleOCR-VL-1.5",
        )
        .unwrap()
    }

    #[test]
    fn request_has_text_then_image() {
        let b = backend();
        let req = b.build_request("data:image/png;base64,AAAA", "read this");
        let json = serde_json::to_value(&req).unwrap();

        assert_eq!(json["model"], "PaddlePaddle/PaddleOCR-VL-1.5");
        assert_eq!(json["max_tokens"], 4000);
        let content = &json["messages"][0]["content"];
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[0]["text"], "read this");
        assert_eq!(content[1]["type"], "image_url");
        assert_eq!(content[1]["image_url"]["url"], "data:image/png;base64,AAAA");
    }

    #[test]
    fn parses_first_choice() {
        let body = r##"{"choices":[{"message":{"role":"assistant","content":"# Title"}}]}"##;
        assert_eq!(parse_content(body).unwrap(), "# Title");
    }

    #[test]
    fn missing_choices_yield_empty_text() {
        assert_eq!(parse_content("{}").unwrap(), "");
        assert_eq!(parse_content(r#"{"choices":[{}]}"#).unwrap(), "");
    }

    #[test]
    fn malformed_body_is_decode_error() {
        let err = parse_content("<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, RecognitionError::Decode(_)), "got {err:?}");
    }

    #[test]
    fn from_config_requires_api_key() {
        let config = ProcessingConfig::default();
        let err = ChatCompletionsBackend::from_config(&config).err().unwrap();
        assert!(err.to_string().contains("SILICONFLOW_API_KEY"), "got {err}");
    }

    #[test]
    fn base_url_overrides_default_endpoint() {
        let config = ProcessingConfig::builder()
            .provider(ProviderKind::OpenAi)
            .api_key("sk-test")
            .base_url("http://localhost:8000/v1/chat/completions")
            .build()
            .unwrap();
        let b = ChatCompletionsBackend::from_config(&config).unwrap();
        assert_eq!(b.endpoint(), "http://localhost:8000/v1/chat/completions");
        assert_eq!(b.model(), "gpt-4o");
    }

    #[tokio::test]
    async fn closed_backend_refuses_calls() {
        let b = backend();
        b.close();
        let err = b
            .recognize(&PageImage::png(vec![1, 2, 3]), "prompt")
            .await
            .unwrap_err();
        assert!(matches!(err, RecognitionError::Closed(_)));
    }
}
