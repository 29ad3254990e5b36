//! Output types returned by the extraction entry points.

use crate::error::PageError;
use crate::format::DocumentFormat;
use serde::{Deserialize, Serialize};

/// Where a page's final text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionSource {
    /// Reconstructed from the PDF's text primitives.
    Structural,
    /// Transcribed by a vision provider.
    Ocr,
    /// Nothing recovered; the text is the failure placeholder.
    Failed,
}

/// The single result a page (or plain file) resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub text: String,
    pub source: ExtractionSource,
    /// Length of `text` in characters.
    pub length: usize,
}

impl ExtractionResult {
    pub fn new(text: impl Into<String>, source: ExtractionSource) -> Self {
        let text = text.into();
        let length = text.chars().count();
        Self {
            text,
            source,
            length,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.source == ExtractionSource::Failed
    }
}

/// Per-page outcome of a PDF extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    /// 1-indexed page number.
    pub page_num: usize,
    pub result: ExtractionResult,
    /// Number of positioned text fragments the page carried.
    pub fragment_count: usize,
    /// OCR calls issued for this page (0 when OCR did not run).
    pub ocr_attempts: usize,
    /// Informational and degraded-path notes.
    pub warnings: Vec<PageError>,
    pub duration_ms: u64,
}

/// Per-member outcome of a ZIP extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReport {
    /// Member name inside the archive.
    pub name: String,
    pub format: Option<DocumentFormat>,
    /// Characters of text recovered (0 on failure).
    pub length: usize,
    /// Why the member yielded nothing, if it did.
    pub error: Option<String>,
}

/// Aggregate statistics for one extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub total_pages: usize,
    pub structural_pages: usize,
    pub ocr_pages: usize,
    pub failed_pages: usize,
    pub ocr_attempts: usize,
    pub total_duration_ms: u64,
}

impl ExtractionStats {
    /// Tally page results into stats (durations are set by the caller).
    pub fn from_pages(pages: &[PageResult]) -> Self {
        let mut stats = Self {
            total_pages: pages.len(),
            ..Self::default()
        };
        for p in pages {
            match p.result.source {
                ExtractionSource::Structural => stats.structural_pages += 1,
                ExtractionSource::Ocr => stats.ocr_pages += 1,
                ExtractionSource::Failed => stats.failed_pages += 1,
            }
            stats.ocr_attempts += p.ocr_attempts;
        }
        stats
    }

    /// Fold a nested document's stats into this one.
    pub fn absorb(&mut self, other: &ExtractionStats) {
        self.total_pages += other.total_pages;
        self.structural_pages += other.structural_pages;
        self.ocr_pages += other.ocr_pages;
        self.failed_pages += other.failed_pages;
        self.ocr_attempts += other.ocr_attempts;
    }
}

/// Complete output of one document extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutput {
    /// The assembled best-effort text.
    pub text: String,
    pub format: DocumentFormat,
    /// PDF pages (including pages of PDFs nested in a ZIP, in order).
    pub pages: Vec<PageResult>,
    /// ZIP members, in archive order. Empty for non-ZIP inputs.
    pub files: Vec<FileReport>,
    pub stats: ExtractionStats,
}
