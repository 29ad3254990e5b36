//! Per-page orchestration.
//!
//! Every selected PDF page walks the same state machine:
//!
//! ```text
//! Unprocessed ──▶ StructuralExtracted ──▶ (OcrAttempted) ──▶ Final
//!      │                                        ▲
//!      └──────── zero fragments ────────────────┘
//! ```
//!
//! This is the single place where page-scoped failures (render errors,
//! cascade exhaustion, blocking-task panics) are caught and turned into
//! warnings. [`process_page`] returns a [`PageResult`], never an error.

use crate::config::ExtractionConfig;
use crate::error::PageError;
use crate::output::{ExtractionResult, ExtractionSource, PageResult};
use crate::pipeline::cascade::CascadeEngine;
use crate::pipeline::layout::{reconstruct, PageFragments};
use crate::pipeline::pdf::PdfBackend;
use crate::pipeline::postprocess::clean_ocr_text;
use crate::pipeline::provider::OcrRequest;
use crate::pipeline::render::{rasterize_page, RenderSpec};
use crate::prompts::{OCR_SYSTEM_PROMPT, OCR_USER_PROMPT};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace, warn};

/// Stages of a page's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStage {
    Unprocessed,
    StructuralExtracted,
    OcrAttempted,
    Final,
}

/// The bounded text a page resolves to when nothing could be recovered.
pub fn page_placeholder(page_num: usize) -> String {
    format!("[[unrecoverable page {page_num}]]")
}

/// Shared inputs for resolving the pages of one PDF.
#[derive(Clone)]
pub struct PageContext {
    pub config: Arc<ExtractionConfig>,
    pub backend: Arc<dyn PdfBackend>,
    /// `None` when OCR is disabled or no tiers are configured.
    pub cascade: Option<Arc<CascadeEngine>>,
    pub bytes: Arc<[u8]>,
    /// Number of selected pages, for progress reporting.
    pub total_pages: usize,
}

impl PageContext {
    fn ocr_request(&self, image: crate::pipeline::encode::PageImage) -> OcrRequest {
        let cfg = &self.config;
        OcrRequest {
            system: cfg
                .system_prompt
                .clone()
                .unwrap_or_else(|| OCR_SYSTEM_PROMPT.to_string()),
            user: cfg
                .user_prompt
                .clone()
                .unwrap_or_else(|| OCR_USER_PROMPT.to_string()),
            image,
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
        }
    }
}

/// Resolve one page to its final text.
pub async fn process_page(ctx: &PageContext, page: PageFragments) -> PageResult {
    let start = Instant::now();
    let page_num = page.index + 1;
    let cfg = &ctx.config;
    let cb = cfg.progress_callback.as_ref();
    let mut warnings = Vec::new();
    let mut stage = PageStage::Unprocessed;

    if let Some(cb) = cb {
        cb.on_page_start(page_num, ctx.total_pages);
    }

    // ── Unprocessed → StructuralExtracted ────────────────────────────────
    let fragment_count = page.fragments.len();
    let structural = if fragment_count == 0 {
        warnings.push(PageError::StructuralExtractionEmpty { page: page_num });
        String::new()
    } else {
        stage = PageStage::StructuralExtracted;
        reconstruct(&page.fragments, &cfg.layout).text().to_string()
    };
    let structural_len = structural.chars().count();
    trace!(page = page_num, ?stage, structural_len, fragment_count);

    // ── StructuralExtracted → OcrAttempted ───────────────────────────────
    let wants_ocr = fragment_count == 0
        || (structural_len < cfg.min_useful_chars && fragment_count >= cfg.min_fragments_for_ocr);

    let mut ocr_text = String::new();
    let mut ocr_attempts = 0;
    if wants_ocr {
        if let Some(cascade) = ctx.cascade.as_ref() {
            stage = PageStage::OcrAttempted;
            if let Some(cb) = cb {
                cb.on_page_ocr(page_num, ctx.total_pages);
            }
            debug!(page = page_num, ?stage, fragment_count, structural_len, "Running OCR");
            match run_ocr(ctx, cascade, page.index).await {
                Ok((text, attempts)) => {
                    ocr_text = text;
                    ocr_attempts = attempts;
                }
                Err((e, attempts)) => {
                    warn!("{e}");
                    ocr_attempts = attempts;
                    warnings.push(e);
                }
            }
        } else {
            debug!(page = page_num, "OCR wanted but unavailable");
        }
    }

    // ── → Final ──────────────────────────────────────────────────────────
    stage = PageStage::Final;
    let result = if ocr_text.chars().count() > structural_len {
        ExtractionResult::new(ocr_text, ExtractionSource::Ocr)
    } else if !structural.trim().is_empty() {
        ExtractionResult::new(structural, ExtractionSource::Structural)
    } else {
        ExtractionResult::new(page_placeholder(page_num), ExtractionSource::Failed)
    };
    trace!(page = page_num, ?stage, source = ?result.source);

    if let Some(cb) = cb {
        if result.is_failed() {
            let reason = warnings
                .last()
                .map(|w| w.to_string())
                .unwrap_or_else(|| "no text recovered".to_string());
            cb.on_page_error(page_num, ctx.total_pages, reason);
        } else {
            cb.on_page_complete(page_num, ctx.total_pages, result.source, result.length);
        }
    }

    PageResult {
        page_num,
        result,
        fragment_count,
        ocr_attempts,
        warnings,
        duration_ms: start.elapsed().as_millis() as u64,
    }
}

/// Rasterise and run the cascade; `Err` carries the page warning and the
/// number of provider calls made.
async fn run_ocr(
    ctx: &PageContext,
    cascade: &CascadeEngine,
    index: usize,
) -> Result<(String, usize), (PageError, usize)> {
    let page = index + 1;
    let spec = RenderSpec {
        scale: ctx.config.render_scale,
        max_pixels: ctx.config.max_rendered_pixels,
    };
    let image = rasterize_page(
        Arc::clone(&ctx.backend),
        Arc::clone(&ctx.bytes),
        ctx.config.password.clone(),
        index,
        spec,
    )
    .await
    .map_err(|e| (e, 0))?;

    let outcome = cascade.run(&ctx.ocr_request(image)).await;
    let attempts = outcome.attempt_count();
    match outcome.text {
        Some(raw) => Ok((clean_ocr_text(&raw), attempts)),
        None => Err((PageError::CascadeExhausted { page, attempts }, attempts)),
    }
}
