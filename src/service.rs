//! Document service: the entry point for single files, file lists and
//! directories.
//!
//! A [`DocumentService`] owns one recognition session: one backend, one
//! [`RateLimiter`] shared by every page of every document it processes, and
//! the progress sink. Image files are sent to a single page worker; PDFs are
//! rasterised and handed to the [`Orchestrator`].
//!
//! The `process_*` methods never return `Err`. Every failure is recorded in
//! the [`DocumentResult`] for the file it belongs to, so a batch keeps going
//! past a bad input.

use crate::backend::{self, RecognitionBackend};
use crate::config::ProcessingConfig;
use crate::error::DocParseError;
use crate::limiter::RateLimiter;
use crate::output::{BatchReport, DocumentResult, PageImage, PageUnit, ProcessStatus};
use crate::pipeline::input::{self, FileInfo};
use crate::pipeline::{Orchestrator, PageRasterizer, PageWorker, PdfiumRasterizer};
use crate::progress::{NoopProgress, SharedProgress};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Output directory used when the caller does not name one.
pub const DEFAULT_OUTPUT_DIR: &str = "output";

/// Recognised text for one document plus the page count.
struct Recognised {
    content: String,
    page_count: usize,
}

/// One recognition session over any number of documents.
pub struct DocumentService {
    config: ProcessingConfig,
    backend: Arc<dyn RecognitionBackend>,
    rasterizer: Arc<dyn PageRasterizer>,
    limiter: Arc<RateLimiter>,
    progress: SharedProgress,
}

impl DocumentService {
    pub fn new(
        config: ProcessingConfig,
        backend: Arc<dyn RecognitionBackend>,
        rasterizer: Arc<dyn PageRasterizer>,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::from_quota(&config.quota));
        Self {
            config,
            backend,
            rasterizer,
            limiter,
            progress: Arc::new(NoopProgress),
        }
    }

    /// Service with the configured provider and the pdfium rasteriser.
    pub fn from_config(config: ProcessingConfig) -> Result<Self, DocParseError> {
        let backend = backend::from_config(&config)?;
        let rasterizer = Arc::new(PdfiumRasterizer::from_config(&config));
        Ok(Self::new(config, backend, rasterizer))
    }

    /// Replace the progress sink.
    pub fn with_progress(mut self, progress: SharedProgress) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    /// The limiter shared by every page of this session.
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Recognise one file and save the text to `<output_dir>/<stem>.md`.
    pub async fn process_file(
        &self,
        path: &Path,
        output_dir: Option<&Path>,
        prompt: Option<&str>,
    ) -> DocumentResult {
        let start = Instant::now();
        info!("Processing {}", path.display());

        match self.recognise_and_save(path, output_dir, prompt).await {
            Ok((recognised, output_path)) => {
                let elapsed = start.elapsed().as_millis() as u64;
                info!(
                    "{} → {} ({} pages, {}ms)",
                    path.display(),
                    output_path.display(),
                    recognised.page_count,
                    elapsed
                );
                DocumentResult {
                    file_path: path.to_path_buf(),
                    output_path: Some(output_path),
                    content: recognised.content,
                    status: ProcessStatus::Success,
                    error_message: None,
                    page_count: recognised.page_count,
                    processing_time_ms: elapsed,
                }
            }
            Err(e) => {
                warn!("{} failed: {}", path.display(), e);
                DocumentResult::failed(path.to_path_buf(), e, start.elapsed().as_millis() as u64)
            }
        }
    }

    /// Process `paths` one after the other.
    pub async fn process_files(
        &self,
        paths: &[PathBuf],
        output_dir: Option<&Path>,
        prompt: Option<&str>,
    ) -> BatchReport {
        let start = Instant::now();
        let mut results = Vec::with_capacity(paths.len());
        for path in paths {
            results.push(self.process_file(path, output_dir, prompt).await);
        }

        let report = BatchReport::from_results(results, start.elapsed().as_millis() as u64);
        info!(
            "Batch finished: {}/{} succeeded in {}ms",
            report.success_count, report.total_files, report.total_processing_time_ms
        );
        report
    }

    /// Process every supported file directly inside `dir` whose name matches
    /// `{pattern}{ext}`. A missing directory or no match gives an empty report.
    pub async fn process_directory(
        &self,
        dir: &Path,
        output_dir: Option<&Path>,
        pattern: &str,
        prompt: Option<&str>,
    ) -> BatchReport {
        if !dir.is_dir() {
            warn!("Directory {} does not exist", dir.display());
            return BatchReport::default();
        }

        let files = match input::list_matching_files(dir, pattern, &self.config) {
            Ok(files) => files,
            Err(e) => {
                warn!("Cannot list {}: {}", dir.display(), e);
                return BatchReport::default();
            }
        };
        if files.is_empty() {
            info!("No files in {} match '{}'", dir.display(), pattern);
            return BatchReport::default();
        }

        info!("Found {} files in {}", files.len(), dir.display());
        self.process_files(&files, output_dir, prompt).await
    }

    /// End the session; later backend calls may fail.
    pub fn close(&self) {
        self.backend.close();
    }

    async fn recognise_and_save(
        &self,
        path: &Path,
        output_dir: Option<&Path>,
        prompt: Option<&str>,
    ) -> Result<(Recognised, PathBuf), DocParseError> {
        let info = input::inspect_file(path, &self.config)?;
        let worker = PageWorker::from_config(
            &self.config,
            Arc::clone(&self.backend),
            Arc::clone(&self.limiter),
            prompt,
        );

        let recognised = if info.kind.is_paginated() {
            self.recognise_document(&info, worker).await?
        } else {
            self.recognise_image(&info, worker).await?
        };

        let dir = output_dir.unwrap_or_else(|| Path::new(DEFAULT_OUTPUT_DIR));
        let output_path = save_markdown(path, &recognised.content, dir).await?;
        Ok((recognised, output_path))
    }

    /// Single image: one worker call, no fan-out.
    async fn recognise_image(
        &self,
        info: &FileInfo,
        worker: PageWorker,
    ) -> Result<Recognised, DocParseError> {
        let data = tokio::fs::read(&info.path)
            .await
            .map_err(|_| DocParseError::FileNotFound {
                path: info.path.clone(),
            })?;
        let unit = PageUnit {
            index: 0,
            image: PageImage::new(data, info.kind.mime_type()),
        };

        let result = worker.process(unit).await;
        match result.error {
            None => Ok(Recognised {
                content: result.content,
                page_count: 1,
            }),
            Some(error) => Err(DocParseError::BatchFailed {
                page: 1,
                detail: error.to_string(),
            }),
        }
    }

    async fn recognise_document(
        &self,
        info: &FileInfo,
        worker: PageWorker,
    ) -> Result<Recognised, DocParseError> {
        self.progress.on_progress(0, 1, "converting PDF to images");
        let images = self.rasterizer.rasterize(&info.path).await?;
        let page_count = images.len();
        self.progress
            .on_progress(1, 1, &format!("converted {} pages", page_count));

        let orchestrator = Orchestrator::new(worker, self.config.quota.concurrency());
        let outcome = orchestrator
            .run(PageUnit::from_images(images), self.progress.as_ref())
            .await;
        Ok(Recognised {
            content: outcome.into_result()?,
            page_count,
        })
    }
}

/// Write `content` to `<dir>/<stem>.md` via a temp file in the same
/// directory, so readers never see a half-written file.
pub async fn save_markdown(source: &Path, content: &str, dir: &Path) -> Result<PathBuf, DocParseError> {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    let target = dir.join(format!("{stem}.md"));

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| DocParseError::OutputWriteFailed {
            path: target.clone(),
            source: e,
        })?;

    let dir = dir.to_path_buf();
    let content = content.to_owned();
    let path = target.clone();
    tokio::task::spawn_blocking(move || -> Result<(), std::io::Error> {
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.persist(&path).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| DocParseError::Internal(format!("Write task panicked: {}", e)))?
    .map_err(|e| DocParseError::OutputWriteFailed {
        path: target.clone(),
        source: e,
    })?;

    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_uses_source_stem() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested/out");
        let path = save_markdown(Path::new("/scans/report.v2.pdf"), "# hi", &out)
            .await
            .unwrap();
        assert_eq!(path, out.join("report.v2.md"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# hi");
    }

    #[tokio::test]
    async fn save_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "old").unwrap();
        save_markdown(Path::new("a.png"), "new", dir.path()).await.unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("a.md")).unwrap(), "new");
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
