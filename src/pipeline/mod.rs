//! Pipeline stages for document recognition.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ orchestrator ──▶ worker ──▶ backend
//! (check)   (pdfium)   (PNG)      (fan-out/in)    (quota)    (HTTP / SDK)
//! ```
//!
//! 1. [`input`]: classify and validate the file; list directory matches
//! 2. [`render`]: rasterise every PDF page; runs in `spawn_blocking`
//!    because pdfium is not async-safe
//! 3. [`encode`]: PNG-encode pages and wrap them for provider payloads
//! 4. [`orchestrator`]: run one worker per page under a concurrency bound
//!    and reassemble the results in page order
//! 5. [`worker`]: wait for quota, call the backend, fold failures into data

pub mod encode;
pub mod input;
pub mod orchestrator;
pub mod render;
pub mod worker;

pub use orchestrator::{page_heading, Orchestrator};
pub use render::{PageRasterizer, PdfiumRasterizer};
pub use worker::PageWorker;
