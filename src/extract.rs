//! Extraction entry points.
//!
//! [`Extractor`] owns everything a document needs (configuration, PDF
//! backend, OCR cascade) behind `Arc`, so one instance can serve many
//! documents concurrently. Formats are dispatched here; ZIP members are fed
//! back through the same dispatch, one nesting level deeper.

use crate::config::{ExtractionConfig, PageSelection};
use crate::error::ExtractError;
use crate::format::{sniff_format, DocumentFormat};
use crate::output::{ExtractionOutput, ExtractionStats, FileReport};
use crate::pipeline::archive::{file_placeholder, read_members, section};
use crate::pipeline::assemble::{assemble_pages, assemble_sections};
use crate::pipeline::cascade::CascadeEngine;
use crate::pipeline::page::{process_page, PageContext};
use crate::pipeline::pdf::{PdfBackend, PdfiumBackend};
use crate::pipeline::{docx, input, text};
use futures::future::{BoxFuture, FutureExt};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// A configured extraction engine.
///
/// # Example
/// ```rust,no_run
/// use bidtext::{CascadeConfig, ExtractionConfig, Extractor};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ExtractionConfig::builder()
///     .cascade(CascadeConfig::from_env())
///     .build()?;
/// let extractor = Extractor::new(config)?;
/// let output = extractor.extract_input("招标文件.zip").await?;
/// println!("{}", output.text);
/// eprintln!("{} pages via OCR", output.stats.ocr_pages);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Extractor {
    config: Arc<ExtractionConfig>,
    backend: Arc<dyn PdfBackend>,
    cascade: Option<Arc<CascadeEngine>>,
}

impl fmt::Debug for Extractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extractor")
            .field("config", &self.config)
            .field("ocr", &self.cascade.is_some())
            .finish()
    }
}

impl Extractor {
    /// Build an extractor with the pdfium backend and HTTP vision providers.
    ///
    /// pdfium is bound lazily, on the first PDF, so DOCX and text extraction
    /// work on hosts without the library.
    pub fn new(config: ExtractionConfig) -> Result<Self, ExtractError> {
        let cascade = if config.ocr_available() {
            Some(Arc::new(CascadeEngine::new(
                config.cascade.clone(),
                config.api_timeout_secs,
            )?))
        } else {
            None
        };
        Ok(Self {
            config: Arc::new(config),
            backend: Arc::new(PdfiumBackend),
            cascade,
        })
    }

    /// Build an extractor from caller-supplied parts.
    ///
    /// The cascade is ignored when `config.ocr_enabled` is off or it has no
    /// tiers.
    pub fn with_parts(
        config: ExtractionConfig,
        backend: Arc<dyn PdfBackend>,
        cascade: Option<CascadeEngine>,
    ) -> Self {
        let cascade = cascade
            .filter(|c| config.ocr_enabled && !c.is_empty())
            .map(Arc::new);
        Self {
            config: Arc::new(config),
            backend,
            cascade,
        }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Extract a document held in memory; `name` helps format sniffing.
    pub async fn extract(
        &self,
        bytes: &[u8],
        name: Option<&str>,
    ) -> Result<ExtractionOutput, ExtractError> {
        let format = sniff_format(bytes, name)?;
        self.extract_as(bytes, format).await
    }

    /// Extract a document whose format is already known.
    pub async fn extract_as(
        &self,
        bytes: &[u8],
        format: DocumentFormat,
    ) -> Result<ExtractionOutput, ExtractError> {
        self.extract_at_depth(Arc::from(bytes), format, 0).await
    }

    /// Extract a local file or HTTP(S) URL.
    pub async fn extract_input(&self, input: &str) -> Result<ExtractionOutput, ExtractError> {
        let resolved = input::resolve_input(input, self.config.download_timeout_secs).await?;
        info!("Extracting '{}' ({} bytes)", resolved.name, resolved.bytes.len());
        self.extract(&resolved.bytes, Some(&resolved.name)).await
    }

    /// `depth` counts enclosing archives; archive members recurse through
    /// here, hence the boxed future.
    fn extract_at_depth(
        &self,
        bytes: Arc<[u8]>,
        format: DocumentFormat,
        depth: usize,
    ) -> BoxFuture<'_, Result<ExtractionOutput, ExtractError>> {
        async move {
            let start = Instant::now();
            debug!(%format, depth, bytes = bytes.len(), "Extracting document");
            let mut output = match format {
                DocumentFormat::Pdf => self.extract_pdf(bytes, depth).await?,
                DocumentFormat::Docx => self.extract_docx(&bytes)?,
                DocumentFormat::Zip => self.extract_zip(&bytes, depth).await?,
                DocumentFormat::PlainText => self.extract_plain(&bytes)?,
            };
            output.stats.total_duration_ms = start.elapsed().as_millis() as u64;
            Ok(output)
        }
        .boxed()
    }

    async fn extract_pdf(
        &self,
        bytes: Arc<[u8]>,
        depth: usize,
    ) -> Result<ExtractionOutput, ExtractError> {
        let cfg = &self.config;
        // Page selection addresses the top-level document only.
        let selection = if depth == 0 {
            cfg.pages.clone()
        } else {
            PageSelection::All
        };

        let backend = self.backend.clone();
        let password = cfg.password.clone();
        let pdf_bytes = bytes.clone();
        let pdf = tokio::task::spawn_blocking(move || {
            backend.extract_text(&pdf_bytes, password.as_deref(), &|n| {
                selection.to_indices(n)
            })
        })
        .await
        .map_err(|e| ExtractError::Internal(format!("PDF text task failed: {e}")))??;

        let total = pdf.pages.len();
        info!("PDF has {} pages, {} selected", pdf.page_count, total);
        if total == 0 {
            return Err(ExtractError::DocumentExtractionFailed {
                format: DocumentFormat::Pdf,
                reason: format!("no pages selected out of {}", pdf.page_count),
            });
        }

        let cb = cfg.progress_callback.as_ref();
        if let Some(cb) = cb {
            cb.on_document_start(total);
        }

        let ctx = PageContext {
            config: cfg.clone(),
            backend: self.backend.clone(),
            cascade: self.cascade.clone(),
            bytes,
            total_pages: total,
        };
        let mut pages = Vec::with_capacity(total);
        for page in pdf.pages {
            pages.push(process_page(&ctx, page).await);
        }

        let stats = ExtractionStats::from_pages(&pages);
        if let Some(cb) = cb {
            cb.on_document_complete(total, total - stats.failed_pages);
        }
        info!(
            "PDF resolved: {} structural, {} OCR, {} failed ({} OCR calls)",
            stats.structural_pages, stats.ocr_pages, stats.failed_pages, stats.ocr_attempts
        );

        let text = assemble_pages(&pages, cfg)?;
        Ok(ExtractionOutput {
            text,
            format: DocumentFormat::Pdf,
            pages,
            files: Vec::new(),
            stats,
        })
    }

    fn extract_docx(&self, bytes: &[u8]) -> Result<ExtractionOutput, ExtractError> {
        let text = docx::extract_docx(bytes)?;
        if text.trim().is_empty() {
            return Err(ExtractError::DocumentExtractionFailed {
                format: DocumentFormat::Docx,
                reason: "document body has no text".into(),
            });
        }
        Ok(single_text_output(text, DocumentFormat::Docx))
    }

    fn extract_plain(&self, bytes: &[u8]) -> Result<ExtractionOutput, ExtractError> {
        let decoded = text::decode_text(bytes);
        debug!(encoding = decoded.encoding, "Decoded plain text");
        if decoded.text.trim().is_empty() {
            return Err(ExtractError::DocumentExtractionFailed {
                format: DocumentFormat::PlainText,
                reason: "file is empty".into(),
            });
        }
        Ok(single_text_output(decoded.text, DocumentFormat::PlainText))
    }

    async fn extract_zip(
        &self,
        bytes: &[u8],
        depth: usize,
    ) -> Result<ExtractionOutput, ExtractError> {
        let max = self.config.max_archive_depth;
        if depth >= max {
            return Err(ExtractError::NestingTooDeep { max });
        }

        let members = read_members(bytes, self.config.max_entry_bytes)?;
        if members.is_empty() {
            return Err(ExtractError::DocumentExtractionFailed {
                format: DocumentFormat::Zip,
                reason: "archive holds no extractable entries".into(),
            });
        }
        info!("Archive has {} entries (depth {})", members.len(), depth);

        let mut sections = Vec::with_capacity(members.len());
        let mut files = Vec::with_capacity(members.len());
        let mut pages = Vec::new();
        let mut stats = ExtractionStats::default();
        let mut recovered = 0usize;

        for member in members {
            let name = member.name;
            let data = match member.content {
                Ok(data) => data,
                Err(reason) => {
                    warn!(entry = %name, "Skipping archive entry: {reason}");
                    sections.push(section(&name, &file_placeholder(&reason)));
                    files.push(FileReport {
                        name,
                        format: None,
                        length: 0,
                        error: Some(reason),
                    });
                    continue;
                }
            };

            let format = match sniff_format(&data, Some(&name)) {
                Ok(f) => f,
                Err(e) => {
                    warn!(entry = %name, "{e}");
                    let reason = e.to_string();
                    sections.push(section(&name, &file_placeholder(&reason)));
                    files.push(FileReport {
                        name,
                        format: None,
                        length: 0,
                        error: Some(reason),
                    });
                    continue;
                }
            };

            match self.extract_at_depth(Arc::from(data), format, depth + 1).await {
                Ok(out) => {
                    recovered += 1;
                    sections.push(section(&name, &out.text));
                    files.push(FileReport {
                        name: name.clone(),
                        format: Some(format),
                        length: out.text.chars().count(),
                        error: None,
                    });
                    files.extend(out.files.into_iter().map(|f| FileReport {
                        name: format!("{name}/{}", f.name),
                        ..f
                    }));
                    pages.extend(out.pages);
                    stats.absorb(&out.stats);
                }
                Err(e) => {
                    warn!(entry = %name, "Archive entry failed: {e}");
                    let reason = e.to_string();
                    sections.push(section(&name, &file_placeholder(&reason)));
                    files.push(FileReport {
                        name,
                        format: Some(format),
                        length: 0,
                        error: Some(reason),
                    });
                }
            }
        }

        if recovered == 0 {
            return Err(ExtractError::DocumentExtractionFailed {
                format: DocumentFormat::Zip,
                reason: format!("all {} entries unrecoverable", sections.len()),
            });
        }

        Ok(ExtractionOutput {
            text: assemble_sections(&sections),
            format: DocumentFormat::Zip,
            pages,
            files,
            stats,
        })
    }
}

fn single_text_output(text: String, format: DocumentFormat) -> ExtractionOutput {
    ExtractionOutput {
        text,
        format,
        pages: Vec::new(),
        files: Vec::new(),
        stats: ExtractionStats::default(),
    }
}

/// Extract an in-memory document with a one-off [`Extractor`].
pub async fn extract_bytes(
    bytes: &[u8],
    name: Option<&str>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    Extractor::new(config.clone())?.extract(bytes, name).await
}

/// Extract a local file or HTTP(S) URL with a one-off [`Extractor`].
///
/// Returns `Ok` even when some pages or archive entries failed; check
/// `output.stats.failed_pages` and `output.files`.
pub async fn extract_file(
    input: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    Extractor::new(config.clone())?
        .extract_input(input.as_ref())
        .await
}

/// Synchronous wrapper around [`extract_file`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(
    input: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ExtractError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract_file(input, config))
}
