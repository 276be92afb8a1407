//! Configuration types for document recognition.
//!
//! All processing behaviour is controlled through [`ProcessingConfig`], built
//! via its [`ProcessingConfigBuilder`]. The value is handed explicitly to
//! [`crate::service::DocumentService`] and from there to the orchestrator and
//! each page worker; nothing reads process-wide settings behind the caller's
//! back, so two services with different prompts or quotas can coexist.

use crate::error::DocParseError;
use crate::prompts::DEFAULT_PROMPT;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default requests-per-minute cap.
pub const DEFAULT_RPM: u64 = 1000;
/// Default tokens-per-minute cap.
pub const DEFAULT_TPM: u64 = 80_000;
/// Fixed per-page cost estimate charged against the token window.
pub const DEFAULT_ESTIMATED_TOKENS_PER_PAGE: u64 = 2000;
/// Upper bound for the derived worker count.
pub const MAX_AUTO_CONCURRENCY: usize = 10;
/// Default per-call recognition timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// File extensions accepted by default (lower-case, with leading dot).
pub const DEFAULT_SUPPORTED_EXTENSIONS: &[&str] =
    &[".pdf", ".png", ".jpg", ".jpeg", ".bmp", ".tif", ".tiff"];

/// Configuration for one document-processing session.
///
/// # Example
/// ```rust
/// use docparse::{ProcessingConfig, ProviderKind, QuotaConfig};
/// use std::time::Duration;
///
/// let config = ProcessingConfig::builder()
///     .provider(ProviderKind::OpenAi)
///     .api_key("sk-test")
///     .quota(QuotaConfig { rpm: 300, tpm: 60_000, max_concurrent: None })
///     .request_timeout(Some(Duration::from_secs(90)))
///     .build()
///     .unwrap();
/// assert_eq!(config.quota.concurrency(), 10);
/// ```
#[derive(Clone)]
pub struct ProcessingConfig {
    /// Which recognition service to talk to. Default: SiliconFlow.
    pub provider: ProviderKind,

    /// API key for the provider. Empty means "not configured".
    pub api_key: String,

    /// Model identifier. If None, uses the provider's default model.
    pub model: Option<String>,

    /// Full chat-completions URL overriding the provider default
    /// (OpenAI-compatible gateways, local vLLM, ...).
    pub base_url: Option<String>,

    /// Sampling temperature. Default: 0.1.
    ///
    /// Transcription wants the model to be faithful to the pixels, not
    /// creative; values near 0 keep the output deterministic.
    pub temperature: f32,

    /// Maximum tokens the model may generate per page. Default: 4000.
    pub max_tokens: usize,

    /// Per-call recognition timeout. Default: 30 s. `None` disables it.
    pub request_timeout: Option<Duration>,

    /// Request and token quota shared by all workers of this session.
    pub quota: QuotaConfig,

    /// Cost charged against the token window for each page. Default: 2000.
    ///
    /// A fixed estimate: the image size is not inspected, so dense pages are
    /// under-charged and blank pages over-charged.
    pub estimated_tokens_per_page: u64,

    /// Prompt sent with every page unless the caller passes its own.
    pub default_prompt: String,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 2000.
    ///
    /// Caps rasterised PDF pages independently of their physical size so a
    /// poster-sized page cannot blow past upload limits or memory.
    pub max_rendered_pixels: u32,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Accepted file extensions, lower-case with leading dot.
    pub supported_extensions: Vec<String>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            api_key: String::new(),
            model: None,
            base_url: None,
            temperature: 0.1,
            max_tokens: 4000,
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
            quota: QuotaConfig::default(),
            estimated_tokens_per_page: DEFAULT_ESTIMATED_TOKENS_PER_PAGE,
            default_prompt: DEFAULT_PROMPT.to_string(),
            max_rendered_pixels: 2000,
            password: None,
            supported_extensions: DEFAULT_SUPPORTED_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
        }
    }
}

impl fmt::Debug for ProcessingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingConfig")
            .field("provider", &self.provider)
            .field("api_key", &if self.api_key.is_empty() { "<unset>" } else { "<set>" })
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout", &self.request_timeout)
            .field("quota", &self.quota)
            .field("estimated_tokens_per_page", &self.estimated_tokens_per_page)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("supported_extensions", &self.supported_extensions)
            .finish()
    }
}

impl ProcessingConfig {
    /// Create a new builder for `ProcessingConfig`.
    pub fn builder() -> ProcessingConfigBuilder {
        ProcessingConfigBuilder {
            config: Self::default(),
        }
    }

    /// The model to request: the configured one or the provider default.
    pub fn effective_model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    /// Whether `ext` (with leading dot, any case) is accepted.
    pub fn is_supported_extension(&self, ext: &str) -> bool {
        let ext = ext.to_lowercase();
        self.supported_extensions.iter().any(|e| *e == ext)
    }
}

/// Builder for [`ProcessingConfig`].
#[derive(Debug)]
pub struct ProcessingConfigBuilder {
    config: ProcessingConfig,
}

impl ProcessingConfigBuilder {
    pub fn provider(mut self, provider: ProviderKind) -> Self {
        self.config.provider = provider;
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = key.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t;
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    /// `None` disables the per-call timeout.
    pub fn request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn quota(mut self, quota: QuotaConfig) -> Self {
        self.config.quota = quota;
        self
    }

    pub fn rpm(mut self, rpm: u64) -> Self {
        self.config.quota.rpm = rpm;
        self
    }

    pub fn tpm(mut self, tpm: u64) -> Self {
        self.config.quota.tpm = tpm;
        self
    }

    pub fn max_concurrent(mut self, n: usize) -> Self {
        self.config.quota.max_concurrent = Some(n);
        self
    }

    pub fn estimated_tokens_per_page(mut self, n: u64) -> Self {
        self.config.estimated_tokens_per_page = n;
        self
    }

    pub fn default_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.default_prompt = prompt.into();
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn supported_extensions<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.supported_extensions = exts
            .into_iter()
            .map(|e| e.into().to_lowercase())
            .collect();
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ProcessingConfig, DocParseError> {
        let c = &self.config;
        c.quota.validate()?;
        if c.estimated_tokens_per_page == 0 {
            return Err(DocParseError::InvalidConfig(
                "Estimated tokens per page must be ≥ 1".into(),
            ));
        }
        // A cost above the cap can never be admitted; the worker would wait forever.
        if c.estimated_tokens_per_page > c.quota.tpm {
            return Err(DocParseError::InvalidConfig(format!(
                "Estimated tokens per page ({}) exceeds the TPM cap ({})",
                c.estimated_tokens_per_page, c.quota.tpm
            )));
        }
        if !(0.0..=2.0).contains(&c.temperature) {
            return Err(DocParseError::InvalidConfig(format!(
                "Temperature must be 0.0–2.0, got {}",
                c.temperature
            )));
        }
        if c.max_tokens == 0 {
            return Err(DocParseError::InvalidConfig("Max tokens must be ≥ 1".into()));
        }
        if c.request_timeout == Some(Duration::ZERO) {
            return Err(DocParseError::InvalidConfig(
                "Request timeout must be positive; use None for no timeout".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Quota ────────────────────────────────────────────────────────────────

/// Per-minute caps enforced by the session's [`crate::limiter::RateLimiter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Max requests per rolling minute.
    pub rpm: u64,
    /// Max estimated tokens per rolling minute.
    pub tpm: u64,
    /// Explicit worker count. `None` derives it from `rpm`.
    pub max_concurrent: Option<usize>,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            rpm: DEFAULT_RPM,
            tpm: DEFAULT_TPM,
            max_concurrent: None,
        }
    }
}

impl QuotaConfig {
    /// Number of page workers allowed to run at once.
    ///
    /// When not set explicitly: `max(1, min(10, rpm / 10))`, leaving 90 % of
    /// the request quota as headroom and never exceeding 10 workers.
    pub fn concurrency(&self) -> usize {
        match self.max_concurrent {
            Some(n) => n,
            None => derive_concurrency(self.rpm),
        }
    }

    fn validate(&self) -> Result<(), DocParseError> {
        if self.rpm == 0 {
            return Err(DocParseError::InvalidConfig("RPM must be ≥ 1".into()));
        }
        if self.tpm == 0 {
            return Err(DocParseError::InvalidConfig("TPM must be ≥ 1".into()));
        }
        if self.max_concurrent == Some(0) {
            return Err(DocParseError::InvalidConfig(
                "Max concurrent must be ≥ 1".into(),
            ));
        }
        Ok(())
    }
}

/// `max(1, min(10, rpm / 10))`.
pub fn derive_concurrency(rpm: u64) -> usize {
    let tenth = usize::try_from(rpm / 10).unwrap_or(usize::MAX);
    tenth.clamp(1, MAX_AUTO_CONCURRENCY)
}

// ── Providers ────────────────────────────────────────────────────────────

/// The recognition service a session talks to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProviderKind {
    /// SiliconFlow's OpenAI-compatible endpoint (default).
    #[default]
    SiliconFlow,
    /// OpenAI, or any OpenAI-compatible endpoint given via `base_url`.
    OpenAi,
    /// Any provider known to edgequake-llm (`anthropic`, `gemini`, `ollama`, ...).
    Llm(String),
}

impl ProviderKind {
    /// Parse a provider name as given on the command line.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "siliconflow" => ProviderKind::SiliconFlow,
            "openai" => ProviderKind::OpenAi,
            other => ProviderKind::Llm(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ProviderKind::SiliconFlow => "siliconflow",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Llm(name) => name,
        }
    }

    /// Prefix of the provider's environment variables, e.g. `SILICONFLOW`.
    pub fn env_prefix(&self) -> String {
        self.name().to_uppercase().replace('-', "_")
    }

    pub fn default_model(&self) -> &str {
        match self {
            ProviderKind::SiliconFlow => "PaddlePaddle/PaddleOCR-VL-1.5",
            ProviderKind::OpenAi => "gpt-4o",
            ProviderKind::Llm(_) => "gpt-4.1-nano",
        }
    }

    /// Chat-completions URL for the HTTP providers.
    pub fn default_endpoint(&self) -> Option<&'static str> {
        match self {
            ProviderKind::SiliconFlow => Some("https://api.siliconflow.cn/v1/chat/completions"),
            ProviderKind::OpenAi => Some("https://api.openai.com/v1/chat/completions"),
            ProviderKind::Llm(_) => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
