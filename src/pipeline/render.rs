//! PDF rasterisation: every page of a document to a PNG [`PageImage`].
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a C++ library with thread-local state and CPU-heavy rendering.
//! `tokio::task::spawn_blocking` keeps it off the async worker threads.
//!
//! ## Why cap pixels, not DPI?
//!
//! Page sizes vary wildly: an A0 poster at 150 DPI would produce a
//! 12,000 × 17,000 px image. `max_rendered_pixels` caps the longest edge
//! regardless of physical size, keeping uploads and memory bounded.

use super::encode;
use crate::config::ProcessingConfig;
use crate::error::DocParseError;
use crate::output::PageImage;
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Turns a paginated document into one image per page, in page order.
#[async_trait]
pub trait PageRasterizer: Send + Sync {
    async fn rasterize(&self, path: &Path) -> Result<Vec<PageImage>, DocParseError>;
}

/// Rasteriser backed by the system pdfium library.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    max_pixels: u32,
    password: Option<String>,
}

impl PdfiumRasterizer {
    pub fn new(max_pixels: u32, password: Option<String>) -> Self {
        Self {
            max_pixels,
            password,
        }
    }

    pub fn from_config(config: &ProcessingConfig) -> Self {
        Self::new(config.max_rendered_pixels, config.password.clone())
    }
}

#[async_trait]
impl PageRasterizer for PdfiumRasterizer {
    async fn rasterize(&self, path: &Path) -> Result<Vec<PageImage>, DocParseError> {
        let path = path.to_path_buf();
        let max_pixels = self.max_pixels;
        let password = self.password.clone();

        tokio::task::spawn_blocking(move || render_all_blocking(&path, max_pixels, password.as_deref()))
            .await
            .map_err(|e| DocParseError::Internal(format!("Render task panicked: {}", e)))?
    }
}

fn open_error(path: &Path, password: Option<&str>, e: PdfiumError) -> DocParseError {
    let err_str = format!("{:?}", e);
    if err_str.contains("Password") || err_str.contains("password") {
        if password.is_some() {
            DocParseError::WrongPassword {
                path: path.to_path_buf(),
            }
        } else {
            DocParseError::PasswordRequired {
                path: path.to_path_buf(),
            }
        }
    } else {
        DocParseError::CorruptPdf {
            path: path.to_path_buf(),
            detail: err_str,
        }
    }
}

fn render_all_blocking(
    pdf_path: &Path,
    max_pixels: u32,
    password: Option<&str>,
) -> Result<Vec<PageImage>, DocParseError> {
    let pdfium = Pdfium::default();
    let document = pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(|e| open_error(pdf_path, password, e))?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut images = Vec::with_capacity(total_pages);
    for (idx, page) in pages.iter().enumerate() {
        let failed = |detail: String| DocParseError::RasterisationFailed {
            page: idx + 1,
            detail,
        };
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| failed(format!("{:?}", e)))?;
        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );
        images.push(encode::encode_png(&image).map_err(|e| failed(e.to_string()))?);
    }

    Ok(images)
}
