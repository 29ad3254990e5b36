//! Error types for the bidtext library.
//!
//! Three layers of failure, matching the three places things go wrong:
//!
//! * [`ExtractError`] — **Fatal**: the container itself cannot be opened or
//!   nothing at all could be recovered from it. Returned as `Err` from the
//!   top-level `extract*` functions.
//!
//! * [`PageError`] — **Non-fatal**: one page (or one archive member) degraded
//!   to a placeholder. Stored on [`crate::output::PageResult::warnings`] so a
//!   document with 2 bad pages out of 10 still returns the other 8.
//!
//! * [`ProviderError`] / [`ErrorKind`] — a single OCR call failed. Provider
//!   specific shapes (HTTP status, JSON error body, transport error) are
//!   normalised into the closed [`ErrorKind`] set at the adapter boundary;
//!   the cascade never looks at anything else.

use crate::format::DocumentFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the bidtext library.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Container errors ──────────────────────────────────────────────────
    /// Neither the content nor the filename identify a supported format.
    #[error("Could not detect document format{}: first bytes {magic:02X?}{}",
        .name.as_ref().map(|n| format!(" of '{n}'")).unwrap_or_default(),
        .hint.as_ref().map(|h| format!(" ({h})")).unwrap_or_default())]
    FormatUndetected {
        name: Option<String>,
        magic: Vec<u8>,
        hint: Option<String>,
    },

    /// The container (PDF xref, ZIP central directory, DOCX part) is corrupt.
    #[error("{format} container is corrupt: {detail}")]
    ContainerCorrupt {
        format: DocumentFormat,
        detail: String,
    },

    /// The container is encrypted and no (or a wrong) password was given.
    #[error("{format} document is encrypted and requires a password")]
    PasswordRequired { format: DocumentFormat },

    /// The container opened, but no page or member yielded any text.
    #[error("No text could be recovered from {format} document: {reason}")]
    DocumentExtractionFailed {
        format: DocumentFormat,
        reason: String,
    },

    /// Archives nested deeper than the configured limit.
    #[error("Archive nesting exceeds {max} levels")]
    NestingTooDeep { max: usize },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A tier configuration file could not be read or parsed.
    #[error("Failed to load provider tiers from '{path}': {detail}")]
    ConfigLoad { path: PathBuf, detail: String },

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal, page-scoped condition.
///
/// Stored on [`crate::output::PageResult::warnings`]. The page itself always
/// resolves to some [`crate::output::ExtractionResult`].
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
pub enum PageError {
    /// The page carries no text primitives at all (scanned or image-only).
    /// Informational: it is the trigger for OCR, not a failure.
    #[error("Page {page}: no text fragments in content stream")]
    StructuralExtractionEmpty { page: usize },

    /// Page rasterisation failed, so OCR could not run.
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// Every tier, model and credential failed.
    #[error("Page {page}: OCR cascade exhausted after {attempts} attempts")]
    CascadeExhausted { page: usize, attempts: usize },

    /// A blocking task panicked or was cancelled.
    #[error("Page {page}: internal error: {detail}")]
    Internal { page: usize, detail: String },
}

/// The closed set of provider failure kinds the cascade reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Credential rejected (401/403-class). Burns the credential.
    AuthInvalid,
    /// Payment or quota exhausted (402, quota-flavoured 429/400).
    QuotaExceeded,
    /// Model not found or request rejected as malformed (400/404-class).
    UnsupportedModel,
    /// Server-side error, rate limit, timeout or transport failure.
    Transient,
    /// 200 OK but nothing usable: empty, filtered or a refusal.
    EmptyOrRefusal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::AuthInvalid => "auth-invalid",
            ErrorKind::QuotaExceeded => "quota-exceeded",
            ErrorKind::UnsupportedModel => "unsupported-model",
            ErrorKind::Transient => "transient",
            ErrorKind::EmptyOrRefusal => "empty-or-refusal",
        };
        f.write_str(s)
    }
}

/// One failed OCR call, already classified.
#[derive(Debug, Clone, Error)]
#[error("{provider}/{model}: {kind}{}: {detail}",
    .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
pub struct ProviderError {
    pub kind: ErrorKind,
    pub provider: String,
    pub model: String,
    pub status: Option<u16>,
    pub detail: String,
}

impl ProviderError {
    pub fn new(
        kind: ErrorKind,
        provider: impl Into<String>,
        model: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            provider: provider.into(),
            model: model.into(),
            status: None,
            detail: detail.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}
