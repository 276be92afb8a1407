//! Recognition backends: the services that turn one page image into text.
//!
//! Everything above this module (page worker, orchestrator, service) talks
//! to a backend only through [`RecognitionBackend`], so providers can be
//! swapped, stubbed in tests, or wrapped with caching without touching the
//! concurrency code.
//!
//! Two implementations ship with the crate:
//!
//! * [`chat::ChatCompletionsBackend`]: direct HTTP against an
//!   OpenAI-compatible `/chat/completions` endpoint (SiliconFlow, OpenAI,
//!   vLLM, LiteLLM, ...).
//! * [`llm::LlmProviderBackend`]: any provider edgequake-llm knows
//!   (Anthropic, Gemini, Ollama, Azure, ...).

pub mod chat;
pub mod llm;

use crate::config::{ProcessingConfig, ProviderKind};
use crate::error::DocParseError;
use crate::output::PageImage;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub use chat::ChatCompletionsBackend;
pub use llm::LlmProviderBackend;

/// Why a single recognition call failed.
///
/// Backends must report every failure through this type; a backend that
/// panics is caught by the orchestrator and recorded as a failed page.
#[derive(Debug, Error)]
pub enum RecognitionError {
    /// The service answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The call did not finish in time.
    #[error("request timed out")]
    Timeout,

    /// Connection, TLS or other transport failure.
    #[error("request failed: {0}")]
    Network(String),

    /// The response body could not be understood.
    #[error("malformed response: {0}")]
    Decode(String),

    /// Error reported by a provider SDK.
    #[error("{0}")]
    Provider(String),

    /// The backend was closed before the call.
    #[error("backend '{0}' is closed")]
    Closed(String),
}

/// A recognition service: one page image plus a prompt in, text out.
#[async_trait]
pub trait RecognitionBackend: Send + Sync {
    /// Provider name used in logs.
    fn name(&self) -> &str;

    /// Recognise the text on one page.
    async fn recognize(&self, image: &PageImage, prompt: &str) -> Result<String, RecognitionError>;

    /// Release the session. Calls made afterwards may fail with
    /// [`RecognitionError::Closed`].
    fn close(&self) {}
}

/// Build the backend for the configured provider.
pub fn from_config(config: &ProcessingConfig) -> Result<Arc<dyn RecognitionBackend>, DocParseError> {
    match config.provider {
        ProviderKind::SiliconFlow | ProviderKind::OpenAi => {
            Ok(Arc::new(ChatCompletionsBackend::from_config(config)?))
        }
        ProviderKind::Llm(_) => Ok(Arc::new(LlmProviderBackend::from_config(config)?)),
    }
}
