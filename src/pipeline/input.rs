//! Input classification: decide what a path is before any work is done.
//!
//! Files are accepted by extension (configurable, see
//! [`crate::config::ProcessingConfig::supported_extensions`]). PDFs are
//! additionally checked for the `%PDF` magic bytes so callers get a clear
//! error instead of a rasteriser failure deep inside pdfium.

use crate::config::ProcessingConfig;
use crate::error::DocParseError;
use regex::Regex;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Kind of document, derived from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    Png,
    Jpeg,
    Bmp,
    Tiff,
}

impl FileKind {
    /// Map an extension (with or without leading dot, any case).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_lowercase().as_str() {
            "pdf" => Some(FileKind::Pdf),
            "png" => Some(FileKind::Png),
            "jpg" | "jpeg" => Some(FileKind::Jpeg),
            "bmp" => Some(FileKind::Bmp),
            "tif" | "tiff" => Some(FileKind::Tiff),
            _ => None,
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            FileKind::Pdf => "application/pdf",
            FileKind::Png => "image/png",
            FileKind::Jpeg => "image/jpeg",
            FileKind::Bmp => "image/bmp",
            FileKind::Tiff => "image/tiff",
        }
    }

    /// Multi-page documents go through the orchestrator; images do not.
    pub fn is_paginated(self) -> bool {
        self == FileKind::Pdf
    }
}

/// A validated input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub path: PathBuf,
    pub size: u64,
    pub kind: FileKind,
}

/// Lower-cased extension with leading dot, or an empty string.
fn dotted_extension(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// Validate `path` against the configured extensions and classify it.
pub fn inspect_file(path: &Path, config: &ProcessingConfig) -> Result<FileInfo, DocParseError> {
    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(_) => {
            return Err(DocParseError::FileNotFound {
                path: path.to_path_buf(),
            })
        }
    };
    if !metadata.is_file() {
        return Err(DocParseError::NotAFile {
            path: path.to_path_buf(),
        });
    }

    let extension = dotted_extension(path);
    let kind = match FileKind::from_extension(&extension) {
        Some(kind) if config.is_supported_extension(&extension) => kind,
        _ => {
            return Err(DocParseError::UnsupportedFileType {
                path: path.to_path_buf(),
                extension,
            })
        }
    };

    if kind == FileKind::Pdf {
        check_pdf_magic(path)?;
    }

    debug!("Accepted {} ({:?}, {} bytes)", path.display(), kind, metadata.len());
    Ok(FileInfo {
        path: path.to_path_buf(),
        size: metadata.len(),
        kind,
    })
}

fn check_pdf_magic(path: &Path) -> Result<(), DocParseError> {
    let mut file = std::fs::File::open(path).map_err(|_| DocParseError::FileNotFound {
        path: path.to_path_buf(),
    })?;
    let mut magic = [0u8; 4];
    if file.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
        return Err(DocParseError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }
    Ok(())
}

/// Translate a file-name wildcard (`*`, `?`) into an anchored regex.
pub fn wildcard_regex(pattern: &str) -> Result<Regex, DocParseError> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re)
        .map_err(|e| DocParseError::InvalidConfig(format!("Invalid pattern '{pattern}': {e}")))
}

/// Files directly inside `dir` whose name matches `{pattern}{ext}` for one
/// of the supported extensions. Not recursive. Sorted by path.
pub fn list_matching_files(
    dir: &Path,
    pattern: &str,
    config: &ProcessingConfig,
) -> Result<Vec<PathBuf>, DocParseError> {
    let patterns = config
        .supported_extensions
        .iter()
        .map(|ext| wildcard_regex(&format!("{pattern}{ext}")))
        .collect::<Result<Vec<_>, _>>()?;

    let entries = std::fs::read_dir(dir).map_err(|_| DocParseError::FileNotFound {
        path: dir.to_path_buf(),
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .map(|n| n.to_string_lossy().to_lowercase())
                .is_some_and(|name| patterns.iter().any(|re| re.is_match(&name)))
        })
        .collect();
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn classifies_extensions() {
        assert_eq!(FileKind::from_extension(".PDF"), Some(FileKind::Pdf));
        assert_eq!(FileKind::from_extension("jpeg"), Some(FileKind::Jpeg));
        assert_eq!(FileKind::from_extension(".tif"), Some(FileKind::Tiff));
        assert_eq!(FileKind::from_extension(".docx"), None);
        assert_eq!(FileKind::Jpeg.mime_type(), "image/jpeg");
        assert!(FileKind::Pdf.is_paginated());
        assert!(!FileKind::Png.is_paginated());
    }

    #[test]
    fn rejects_missing_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        let config = ProcessingConfig::default();

        let missing = inspect_file(&dir.path().join("nope.png"), &config).unwrap_err();
        assert!(matches!(missing, DocParseError::FileNotFound { .. }));

        let not_file = inspect_file(dir.path(), &config).unwrap_err();
        assert!(matches!(not_file, DocParseError::NotAFile { .. }));
    }

    #[test]
    fn rejects_unsupported_and_fake_pdfs() {
        let dir = tempfile::tempdir().unwrap();
        let config = ProcessingConfig::default();

        let docx = dir.path().join("notes.docx");
        fs::write(&docx, b"PK..").unwrap();
        assert!(matches!(
            inspect_file(&docx, &config).unwrap_err(),
            DocParseError::UnsupportedFileType { .. }
        ));

        let fake = dir.path().join("fake.pdf");
        fs::write(&fake, b"GIF89a").unwrap();
        assert!(matches!(
            inspect_file(&fake, &config).unwrap_err(),
            DocParseError::NotAPdf { .. }
        ));
    }

    #[test]
    fn respects_configured_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("scan.png");
        fs::write(&png, b"\x89PNG").unwrap();

        let config = ProcessingConfig::builder()
            .supported_extensions([".pdf"])
            .build()
            .unwrap();
        assert!(inspect_file(&png, &config).is_err());

        let info = inspect_file(&png, &ProcessingConfig::default()).unwrap();
        assert_eq!(info.kind, FileKind::Png);
        assert_eq!(info.size, 4);
    }

    #[test]
    fn wildcard_translation() {
        let re = wildcard_regex("scan_??.png").unwrap();
        assert!(re.is_match("scan_01.png"));
        assert!(!re.is_match("scan_001.png"));
        assert!(!re.is_match("scan_01xpng"));
        assert!(wildcard_regex("*.pdf").unwrap().is_match("a.b.pdf"));
    }

    #[test]
    fn lists_only_matching_supported_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.PDF", "c.txt", "report_1.jpg"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::create_dir(dir.path().join("sub.png")).unwrap();

        let config = ProcessingConfig::default();
        let all = list_matching_files(dir.path(), "*", &config).unwrap();
        let names: Vec<_> = all
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.PDF", "b.png", "report_1.jpg"]);

        let reports = list_matching_files(dir.path(), "report_*", &config).unwrap();
        assert_eq!(reports.len(), 1);
    }
}
