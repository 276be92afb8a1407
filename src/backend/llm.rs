//! Adapter from an edgequake-llm [`LLMProvider`] to [`RecognitionBackend`].
//!
//! Lets a session use any vision-capable provider edgequake-llm supports
//! (Anthropic, Gemini, Ollama, Azure OpenAI, LM Studio, ...) while the
//! limiter and orchestrator keep seeing one interface.

use super::{RecognitionBackend, RecognitionError};
use crate::config::ProcessingConfig;
use crate::error::DocParseError;
use crate::output::PageImage;
use crate::pipeline::encode;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Recognition through an edgequake-llm provider.
pub struct LlmProviderBackend {
    provider: Arc<dyn LLMProvider>,
    name: String,
    temperature: f32,
    max_tokens: usize,
    closed: AtomicBool,
}

impl LlmProviderBackend {
    /// Wrap a pre-built provider. Useful when the caller needs custom
    /// middleware around the provider.
    pub fn new(provider: Arc<dyn LLMProvider>, name: impl Into<String>) -> Self {
        Self {
            provider,
            name: name.into(),
            temperature: 0.1,
            max_tokens: 4000,
            closed: AtomicBool::new(false),
        }
    }

    /// Instantiate the named provider through [`ProviderFactory`], which
    /// reads the provider's API key from its usual environment variable.
    pub fn from_config(config: &ProcessingConfig) -> Result<Self, DocParseError> {
        let name = config.provider.name();
        let provider = ProviderFactory::create_llm_provider(name, config.effective_model())
            .map_err(|e| DocParseError::ProviderNotConfigured {
                provider: name.to_string(),
                hint: format!("{e}"),
            })?;

        let mut backend = Self::new(provider, name);
        backend.temperature = config.temperature;
        backend.max_tokens = config.max_tokens;
        Ok(backend)
    }

    fn build_options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

#[async_trait]
impl RecognitionBackend for LlmProviderBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn recognize(&self, image: &PageImage, prompt: &str) -> Result<String, RecognitionError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RecognitionError::Closed(self.name.clone()));
        }

        let messages = vec![ChatMessage::user_with_images(
            prompt,
            vec![encode::to_image_data(image)],
        )];
        let options = self.build_options();

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| RecognitionError::Provider(e.to_string()))?;

        debug!(
            "{}: {} input tokens, {} output tokens",
            self.name, response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
