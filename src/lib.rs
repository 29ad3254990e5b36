//! # bidtext
//!
//! Best-effort text acquisition for bid and tender documents.
//!
//! ## Why this crate?
//!
//! Tender bundles are a mix of born-digital PDFs with multi-column price
//! tables, scanned annexes with no text layer at all, Word files, and ZIP
//! archives of all of the above, often with GBK file names. Downstream
//! parsers need *some* text for every page, in reading order, and they need
//! to know where it came from. This crate:
//!
//! * reconstructs rows and columns from PDF text positions, so a table row
//!   stays one line with tab-separated cells;
//! * renders pages whose text layer is missing or too thin and sends them
//!   through an ordered cascade of vision providers, models and API keys,
//!   classifying every failure to decide whether to try the next key, the
//!   next model, or the next provider;
//! * opens DOCX, plain text in any common Chinese or Western encoding, and
//!   ZIP archives recursively;
//! * never fails a whole document because one page or one archive member
//!   could not be read: those become `[[unrecoverable ...]]` placeholders.
//!
//! ## Pipeline Overview
//!
//! ```text
//! path / URL / bytes
//!  │
//!  ├─ 1. Input     read local file or download
//!  ├─ 2. Sniff     PDF / DOCX / ZIP / text from magic bytes (name breaks ties)
//!  ├─ 3. Extract
//!  │     PDF   text fragments → row/column layout → per-page OCR decision
//!  │     DOCX  word/document.xml paragraphs and tables
//!  │     text  BOM / UTF-8 / statistical charset detection
//!  │     ZIP   every member back through step 2, wrapped in file sections
//!  └─ 4. Assemble  pages or sections + per-page sources and stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bidtext::{extract_file, CascadeConfig, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // OCR tiers from OPENAI_API_KEY(S) / ANTHROPIC_API_KEY(S) / GEMINI_API_KEY(S)
//!     let config = ExtractionConfig::builder()
//!         .cascade(CascadeConfig::from_env())
//!         .build()?;
//!     let output = extract_file("tender.pdf", &config).await?;
//!     println!("{}", output.text);
//!     eprintln!(
//!         "{} structural / {} OCR / {} failed pages",
//!         output.stats.structural_pages, output.stats.ocr_pages, output.stats.failed_pages
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `bidtext` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! bidtext = { version = "0.3", default-features = false }
//! ```
//!
//! ## pdfium
//!
//! PDF support binds to a pdfium shared library at runtime, looked up in
//! `PDFIUM_LIB_PATH`, next to the executable, then on the system library
//! path. DOCX, text and ZIP archives without PDFs work without it.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod format;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    CascadeConfig, Credential, ExtractionConfig, ExtractionConfigBuilder, FailureBudget,
    LayoutConfig, ModelSpec, PageSelection, PageSeparator, ProviderEndpoint, ProviderKind,
    ProviderTier,
};
pub use error::{ErrorKind, ExtractError, PageError, ProviderError};
pub use extract::{extract_bytes, extract_file, extract_sync, Extractor};
pub use format::{sniff_format, DocumentFormat};
pub use output::{
    ExtractionOutput, ExtractionResult, ExtractionSource, ExtractionStats, FileReport, PageResult,
};
pub use pipeline::cascade::{CascadeAttempt, CascadeEngine, CascadeOutcome};
pub use pipeline::pdf::{PdfBackend, PdfText, PdfiumBackend};
pub use pipeline::provider::{OcrRequest, VisionProvider};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
