//! # docparse
//!
//! Recognise the text of scanned documents and images with vision-language
//! recognition services, page by page, under a shared request and token
//! quota.
//!
//! ## Pipeline Overview
//!
//! ```text
//! file
//!  │
//!  ├─ 1. Input        validate path, extension and PDF magic
//!  ├─ 2. Render       rasterise every PDF page via pdfium (spawn_blocking)
//!  ├─ 3. Encode       PNG bytes → data URL / provider image payload
//!  ├─ 4. Orchestrate  one task per page, at most N in flight
//!  ├─ 5. Recognise    wait for quota, call the backend, bounded by a timeout
//!  └─ 6. Output       pages joined in order under `## Page n`, saved as .md
//! ```
//!
//! Every page of a session draws from one [`RateLimiter`], so the requests
//! per minute and tokens per minute of the whole session stay under the
//! configured caps however many workers run.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docparse::{DocumentService, ProcessingConfig};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ProcessingConfig::builder()
//!         .api_key(std::env::var("SILICONFLOW_API_KEY")?)
//!         .build()?;
//!     let service = DocumentService::from_config(config)?;
//!     let result = service
//!         .process_file(Path::new("scan.pdf"), Some(Path::new("out")), None)
//!         .await;
//!     println!("{:?}: {}", result.status, result.content);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docparse` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! docparse = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod config;
pub mod error;
pub mod limiter;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod service;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::{RecognitionBackend, RecognitionError};
pub use config::{ProcessingConfig, ProcessingConfigBuilder, ProviderKind, QuotaConfig};
pub use error::{DocParseError, PageError};
pub use limiter::RateLimiter;
pub use output::{
    BatchFailure, BatchOutcome, BatchReport, BatchStats, DocumentResult, PageImage, PageResult,
    PageUnit, ProcessStatus,
};
pub use pipeline::{Orchestrator, PageRasterizer, PageWorker, PdfiumRasterizer};
pub use progress::{NoopProgress, ProgressSink, SharedProgress};
pub use service::DocumentService;
