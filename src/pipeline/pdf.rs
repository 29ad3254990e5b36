//! PDF access via Google PDFium: positioned text fragments and page rendering.
//!
//! Everything the pipeline needs from a PDF goes through [`PdfBackend`], so
//! the orchestrator can be driven by an in-memory fake in tests. The shipped
//! [`PdfiumBackend`] is stateless (`Send + Sync`) and creates a fresh `Pdfium`
//! handle per operation because the upstream type is `!Send`; the OS caches
//! the `dlopen`, so repeated binds are cheap.
//!
//! All methods are blocking. Call them from `spawn_blocking`.

use crate::error::ExtractError;
use crate::format::DocumentFormat;
use crate::pipeline::layout::{PageFragments, TextFragment};
use crate::pipeline::render::{target_dimensions, RenderSpec};
use pdfium_render::prelude::*;
use std::io::Cursor;
use tracing::{debug, warn};

/// Text primitives of the selected pages of one PDF.
#[derive(Debug, Clone, Default)]
pub struct PdfText {
    /// Pages in the whole document, selected or not.
    pub page_count: usize,
    /// Selected pages, in page order.
    pub pages: Vec<PageFragments>,
}

/// Blocking access to PDF text and rasterisation.
pub trait PdfBackend: Send + Sync {
    /// Open the document and collect fragments for the pages in `indices`
    /// (0-indexed, computed against the real page count by `select`).
    ///
    /// Fails only when the container itself cannot be opened.
    fn extract_text(
        &self,
        bytes: &[u8],
        password: Option<&str>,
        select: &dyn Fn(usize) -> Vec<usize>,
    ) -> Result<PdfText, ExtractError>;

    /// Render one page (0-indexed) to PNG bytes.
    fn render_png(
        &self,
        bytes: &[u8],
        password: Option<&str>,
        index: usize,
        spec: RenderSpec,
    ) -> Result<Vec<u8>, String>;
}

/// [`PdfBackend`] backed by the pdfium shared library.
///
/// The library is bound on every call, so constructing one never fails;
/// a missing pdfium only surfaces when a PDF is actually opened.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfiumBackend;

/// Bind the pdfium dynamic library.
///
/// Discovery order:
/// 1. `PDFIUM_LIB_PATH` (explicit path to the library file)
/// 2. alongside the running executable
/// 3. system library search paths
pub fn bind_pdfium() -> Result<Pdfium, ExtractError> {
    if let Ok(path) = std::env::var("PDFIUM_LIB_PATH") {
        debug!(path = %path, "Loading pdfium from PDFIUM_LIB_PATH");
        let bindings = Pdfium::bind_to_library(&path)
            .map_err(|e| ExtractError::PdfiumBindingFailed(format!("{path}: {e}")))?;
        return Ok(Pdfium::new(bindings));
    }

    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
    {
        let lib_path =
            Pdfium::pdfium_platform_library_name_at_path(exe_dir.to_string_lossy().as_ref());
        if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
            debug!(dir = %exe_dir.display(), "Loaded pdfium next to executable");
            return Ok(Pdfium::new(bindings));
        }
    }

    let bindings = Pdfium::bind_to_system_library()
        .map_err(|e| ExtractError::PdfiumBindingFailed(e.to_string()))?;
    Ok(Pdfium::new(bindings))
}

fn map_load_error(e: PdfiumError, password: Option<&str>) -> ExtractError {
    let msg = format!("{e:?}");
    let lower = msg.to_lowercase();
    if lower.contains("password") || lower.contains("encrypt") || lower.contains("security") {
        if password.is_some() {
            warn!("PDF password was rejected");
        }
        ExtractError::PasswordRequired {
            format: DocumentFormat::Pdf,
        }
    } else {
        ExtractError::ContainerCorrupt {
            format: DocumentFormat::Pdf,
            detail: msg,
        }
    }
}

impl PdfBackend for PdfiumBackend {
    fn extract_text(
        &self,
        bytes: &[u8],
        password: Option<&str>,
        select: &dyn Fn(usize) -> Vec<usize>,
    ) -> Result<PdfText, ExtractError> {
        let pdfium = bind_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(bytes, password)
            .map_err(|e| map_load_error(e, password))?;

        let pages = document.pages();
        let page_count = pages.len() as usize;
        let indices = select(page_count);
        debug!(page_count, selected = indices.len(), "PDF opened");

        let mut out = Vec::with_capacity(indices.len());
        for idx in indices {
            // A page that fails to load or has an unreadable text layer is
            // treated as having no fragments; the orchestrator will OCR it.
            let fragments = match u16::try_from(idx).ok().map(|i| pages.get(i)) {
                Some(Ok(page)) => page_fragments(&page).unwrap_or_else(|e| {
                    warn!(page = idx + 1, error = %e, "Text layer unreadable");
                    Vec::new()
                }),
                Some(Err(e)) => {
                    warn!(page = idx + 1, error = ?e, "Page failed to load");
                    Vec::new()
                }
                None => Vec::new(),
            };
            out.push(PageFragments {
                index: idx,
                fragments,
            });
        }

        Ok(PdfText {
            page_count,
            pages: out,
        })
    }

    fn render_png(
        &self,
        bytes: &[u8],
        password: Option<&str>,
        index: usize,
        spec: RenderSpec,
    ) -> Result<Vec<u8>, String> {
        let pdfium = bind_pdfium().map_err(|e| e.to_string())?;
        let document = pdfium
            .load_pdf_from_byte_slice(bytes, password)
            .map_err(|e| format!("load failed: {e:?}"))?;
        let pages = document.pages();
        let page_index =
            u16::try_from(index).map_err(|_| format!("page index {index} out of range"))?;
        let page = pages
            .get(page_index)
            .map_err(|e| format!("page {} unavailable: {e:?}", index + 1))?;

        let (w, h) = target_dimensions(page.width().value, page.height().value, spec);
        let config = PdfRenderConfig::new()
            .set_target_width(w as i32)
            .set_maximum_height(h as i32);

        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| format!("render failed: {e:?}"))?;
        let image = bitmap.as_image();

        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .map_err(|e| format!("PNG encoding failed: {e}"))?;

        debug!(
            page = index + 1,
            width = image.width(),
            height = image.height(),
            png_bytes = png.len(),
            "Rendered page"
        );
        Ok(png)
    }
}

/// Collect a page's text segments with a top-left origin.
fn page_fragments(page: &PdfPage) -> Result<Vec<TextFragment>, PdfiumError> {
    let page_height = page.height().value;
    let text = page.text()?;

    let mut out = Vec::new();
    for segment in text.segments().iter() {
        let content = segment.text();
        if content.trim().is_empty() {
            continue;
        }
        let bounds = segment.bounds();
        out.push(TextFragment {
            text: content.trim().to_string(),
            x: bounds.left().value,
            y: page_height - bounds.top().value,
            width: bounds.right().value - bounds.left().value,
        });
    }
    Ok(out)
}
