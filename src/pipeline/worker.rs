//! Page worker: one page in, one [`PageResult`] out.
//!
//! The worker waits for quota, calls the recognition backend (bounded by the
//! configured timeout) and folds every failure into the returned
//! `PageResult`. It never returns an error, so one bad page cannot abort the
//! rest of the document; the orchestrator decides what a failed page means.

use crate::backend::{RecognitionBackend, RecognitionError};
use crate::config::ProcessingConfig;
use crate::error::PageError;
use crate::limiter::RateLimiter;
use crate::output::{PageResult, PageUnit};
use crate::prompts::resolve_prompt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Processes single pages against a shared backend and limiter.
///
/// Cheap to clone: every field is shared, so the orchestrator hands one
/// clone to each spawned task.
#[derive(Clone)]
pub struct PageWorker {
    backend: Arc<dyn RecognitionBackend>,
    limiter: Arc<RateLimiter>,
    prompt: Arc<str>,
    estimated_cost: u64,
    timeout: Option<Duration>,
}

impl PageWorker {
    pub fn new(
        backend: Arc<dyn RecognitionBackend>,
        limiter: Arc<RateLimiter>,
        prompt: impl Into<Arc<str>>,
        estimated_cost: u64,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            backend,
            limiter,
            prompt: prompt.into(),
            estimated_cost,
            timeout,
        }
    }

    /// Worker for one session. A blank or missing `prompt` falls back to the
    /// configured default prompt.
    pub fn from_config(
        config: &ProcessingConfig,
        backend: Arc<dyn RecognitionBackend>,
        limiter: Arc<RateLimiter>,
        prompt: Option<&str>,
    ) -> Self {
        Self::new(
            backend,
            limiter,
            resolve_prompt(prompt, &config.default_prompt),
            config.estimated_tokens_per_page,
            config.request_timeout,
        )
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Recognise one page.
    ///
    /// `duration_ms` covers the whole call, including the wait for quota.
    pub async fn process(&self, unit: PageUnit) -> PageResult {
        let start = Instant::now();
        let page_num = unit.index + 1;

        self.limiter.acquire(self.estimated_cost).await;

        let call = self.backend.recognize(&unit.image, &self.prompt);
        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result.map_err(page_error),
                Err(_) => Err(PageError::Timeout {
                    after: limit,
                }),
            },
            None => call.await.map_err(page_error),
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        match outcome {
            Ok(content) => {
                debug!(
                    "Page {}: {} chars from {} in {}ms",
                    page_num,
                    content.len(),
                    self.backend.name(),
                    duration_ms
                );
                PageResult::success(unit.index, content, duration_ms)
            }
            Err(error) => {
                warn!("Page {}: {}", page_num, error);
                PageResult::failure(unit.index, error, duration_ms)
            }
        }
    }
}

fn page_error(e: RecognitionError) -> PageError {
    PageError::Recognition {
        detail: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::PageImage;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Echo {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RecognitionBackend for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn recognize(
            &self,
            image: &PageImage,
            prompt: &str,
        ) -> Result<String, RecognitionError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if image.data.is_empty() {
                return Err(RecognitionError::Http {
                    status: 500,
                    body: "empty image".into(),
                });
            }
            Ok(format!("{} bytes", image.data.len()))
        }
    }

    struct Stuck;

    #[async_trait]
    impl RecognitionBackend for Stuck {
        fn name(&self) -> &str {
            "stuck"
        }

        async fn recognize(&self, _: &PageImage, _: &str) -> Result<String, RecognitionError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(String::new())
        }
    }

    fn limiter() -> Arc<RateLimiter> {
        Arc::new(RateLimiter::new(60_000, 60_000_000))
    }

    fn unit(index: usize, data: Vec<u8>) -> PageUnit {
        PageUnit {
            index,
            image: PageImage::png(data),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn success_carries_index_and_text() {
        let backend = Arc::new(Echo {
            prompts: Mutex::new(Vec::new()),
        });
        let worker = PageWorker::new(backend.clone(), limiter(), "read", 10, None);

        let result = worker.process(unit(3, vec![1, 2, 3])).await;
        assert_eq!(result.index, 3);
        assert_eq!(result.content, "3 bytes");
        assert!(result.is_success());
        assert_eq!(backend.prompts.lock().unwrap().as_slice(), ["read"]);
    }

    #[tokio::test(start_paused = true)]
    async fn backend_error_becomes_page_failure() {
        let backend = Arc::new(Echo {
            prompts: Mutex::new(Vec::new()),
        });
        let worker = PageWorker::new(backend, limiter(), "read", 10, None);

        let result = worker.process(unit(0, Vec::new())).await;
        assert!(result.content.is_empty());
        assert_eq!(
            result.error,
            Some(PageError::Recognition {
                detail: "HTTP 500: empty image".into()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_call_times_out() {
        let worker = PageWorker::new(
            Arc::new(Stuck),
            limiter(),
            "read",
            10,
            Some(Duration::from_secs(30)),
        );
        let result = worker.process(unit(1, vec![1])).await;
        assert_eq!(
            result.error,
            Some(PageError::Timeout {
                after: Duration::from_secs(30)
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn sub_second_timeout_keeps_its_unit() {
        let worker = PageWorker::new(
            Arc::new(Stuck),
            limiter(),
            "read",
            10,
            Some(Duration::from_millis(250)),
        );
        let result = worker.process(unit(1, vec![1])).await;
        let error = result.error.expect("page must time out");
        assert_eq!(error.to_string(), "request timed out after 250ms");
    }

    #[tokio::test(start_paused = true)]
    async fn blank_prompt_uses_configured_default() {
        let config = ProcessingConfig::builder()
            .default_prompt("default prompt")
            .build()
            .unwrap();
        let backend = Arc::new(Echo {
            prompts: Mutex::new(Vec::new()),
        });
        let worker = PageWorker::from_config(&config, backend, limiter(), Some("   "));
        assert_eq!(worker.prompt(), "default prompt");
    }
}
