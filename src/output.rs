//! Data carried through and out of the recognition pipeline.
//!
//! * [`PageImage`] / [`PageUnit`]: one page handed to a worker.
//! * [`PageResult`]: what the worker produced for that page.
//! * [`BatchOutcome`]: the orchestrator's verdict for a whole document.
//! * [`DocumentResult`] / [`BatchReport`]: the service-level records for
//!   one input file and for a set of files.

use crate::error::{DocParseError, PageError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// An encoded page image ready to send to a recognition backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    /// Encoded image bytes (PNG for rasterised PDF pages).
    pub data: Vec<u8>,
    /// MIME type of `data`, e.g. `image/png`.
    pub mime_type: String,
}

impl PageImage {
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
        }
    }

    pub fn png(data: Vec<u8>) -> Self {
        Self::new(data, "image/png")
    }
}

/// One page of a document: the unit of work for a page worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageUnit {
    /// 0-based position in the document; the only ordering key.
    pub index: usize,
    pub image: PageImage,
}

impl PageUnit {
    /// Number pages `0..n` in the order given.
    pub fn from_images(images: impl IntoIterator<Item = PageImage>) -> Vec<PageUnit> {
        images
            .into_iter()
            .enumerate()
            .map(|(index, image)| PageUnit { index, image })
            .collect()
    }
}

/// Result for one page.
///
/// Produced exactly once per submitted [`PageUnit`]. `content` is empty
/// whenever `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
    /// 0-based page index.
    pub index: usize,
    /// Recognised text.
    pub content: String,
    /// Wall-clock time spent on this page, including the wait for quota.
    pub duration_ms: u64,
    /// Set if the page failed.
    pub error: Option<PageError>,
}

impl PageResult {
    pub fn success(index: usize, content: String, duration_ms: u64) -> Self {
        Self {
            index,
            content,
            duration_ms,
            error: None,
        }
    }

    pub fn failure(index: usize, error: PageError, duration_ms: u64) -> Self {
        Self {
            index,
            content: String::new(),
            duration_ms,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// The first page (by index) that failed in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFailure {
    /// 0-based index of the lowest failing page.
    pub index: usize,
    pub error: PageError,
}

impl BatchFailure {
    /// `"page {index+1} failed: {error}"`.
    pub fn message(&self) -> String {
        format!("page {} failed: {}", self.index + 1, self.error)
    }
}

/// Counters for one orchestrated run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub total_pages: usize,
    pub succeeded_pages: usize,
    pub failed_pages: usize,
    pub duration_ms: u64,
}

/// Terminal artifact of one orchestrated document.
///
/// All-or-nothing: when any page failed, `content` is empty and
/// `first_error` names the lowest failing index, even if later pages
/// succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Pages in index order, each prefixed with its page heading.
    pub content: String,
    pub first_error: Option<BatchFailure>,
    pub stats: BatchStats,
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        self.first_error.is_none()
    }

    /// Convert into `Ok(content)` or [`DocParseError::BatchFailed`].
    pub fn into_result(self) -> Result<String, DocParseError> {
        match self.first_error {
            None => Ok(self.content),
            Some(failure) => Err(DocParseError::BatchFailed {
                page: failure.index + 1,
                detail: failure.error.to_string(),
            }),
        }
    }
}

/// Final state of one input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Success,
    Failed,
}

/// Outcome for one input file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentResult {
    pub file_path: PathBuf,
    /// Where the Markdown was written; `None` on failure.
    pub output_path: Option<PathBuf>,
    pub content: String,
    pub status: ProcessStatus,
    pub error_message: Option<String>,
    /// Pages recognised (1 for image inputs).
    pub page_count: usize,
    pub processing_time_ms: u64,
}

impl DocumentResult {
    pub fn failed(file_path: PathBuf, error: impl ToString, processing_time_ms: u64) -> Self {
        Self {
            file_path,
            output_path: None,
            content: String::new(),
            status: ProcessStatus::Failed,
            error_message: Some(error.to_string()),
            page_count: 0,
            processing_time_ms,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ProcessStatus::Success
    }
}

/// Summary for a set of input files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub total_files: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub results: Vec<DocumentResult>,
    pub total_processing_time_ms: u64,
}

impl BatchReport {
    /// Build a report from per-file results.
    pub fn from_results(results: Vec<DocumentResult>, total_processing_time_ms: u64) -> Self {
        let success_count = results.iter().filter(|r| r.is_success()).count();
        Self {
            total_files: results.len(),
            success_count,
            failed_count: results.len() - success_count,
            results,
            total_processing_time_ms,
        }
    }

    /// Success rate in percent; 0 for an empty report.
    pub fn success_rate(&self) -> f64 {
        if self.total_files == 0 {
            return 0.0;
        }
        self.success_count as f64 / self.total_files as f64 * 100.0
    }

    pub fn failures(&self) -> impl Iterator<Item = &DocumentResult> {
        self.results.iter().filter(|r| !r.is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn ok_doc(name: &str) -> DocumentResult {
        DocumentResult {
            file_path: PathBuf::from(name),
            output_path: Some(PathBuf::from(format!("out/{name}.md"))),
            content: "text".into(),
            status: ProcessStatus::Success,
            error_message: None,
            page_count: 1,
            processing_time_ms: 10,
        }
    }

    #[test]
    fn batch_failure_message_is_one_indexed() {
        let f = BatchFailure {
            index: 0,
            error: PageError::Recognition {
                detail: "HTTP 500".into(),
            },
        };
        assert_eq!(f.message(), "page 1 failed: HTTP 500");
    }

    #[test]
    fn into_result_maps_failure() {
        let outcome = BatchOutcome {
            content: String::new(),
            first_error: Some(BatchFailure {
                index: 4,
                error: PageError::Timeout {
                    after: Duration::from_secs(30),
                },
            }),
            stats: BatchStats::default(),
        };
        let err = outcome.into_result().unwrap_err();
        assert_eq!(err.to_string(), "page 5 failed: request timed out after 30s");
    }

    #[test]
    fn report_counts_and_rate() {
        let report = BatchReport::from_results(
            vec![
                ok_doc("a"),
                ok_doc("b"),
                DocumentResult::failed(PathBuf::from("c"), "boom", 3),
            ],
            42,
        );
        assert_eq!(report.total_files, 3);
        assert_eq!(report.success_count, 2);
        assert_eq!(report.failed_count, 1);
        assert!((report.success_rate() - 66.666).abs() < 0.01);
        assert_eq!(report.failures().count(), 1);
    }

    #[test]
    fn empty_report_has_zero_rate() {
        assert_eq!(BatchReport::default().success_rate(), 0.0);
    }

    #[test]
    fn units_are_numbered_in_order() {
        let units = PageUnit::from_images(vec![
            PageImage::png(vec![1]),
            PageImage::png(vec![2]),
            PageImage::png(vec![3]),
        ]);
        let indices: Vec<_> = units.iter().map(|u| u.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(units[2].image.data, vec![3]);
    }

    #[test]
    fn status_serialises_lowercase() {
        assert_eq!(
            serde_json::to_string(&ProcessStatus::Success).unwrap(),
            "\"success\""
        );
        let back: ProcessStatus = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(back, ProcessStatus::Failed);
        assert!(serde_json::from_str::<ProcessStatus>("\"pending\"").is_err());
    }
}
