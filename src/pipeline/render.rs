//! Page rasterisation for OCR.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a C++ library with thread-local state and is not safe to call
//! from async contexts. `tokio::task::spawn_blocking` moves the work onto the
//! blocking pool so Tokio worker threads never stall on CPU-heavy rendering.
//!
//! ## Why cap pixels as well as scale?
//!
//! Page sizes vary wildly: an A0 drawing sheet at 2× would be a
//! 4,700 × 6,700 px image. `max_rendered_pixels` caps the longest edge
//! regardless of physical size, keeping memory and request sizes bounded.

use crate::error::PageError;
use crate::pipeline::encode::{encode_png, PageImage};
use crate::pipeline::pdf::PdfBackend;
use std::sync::Arc;
use tracing::debug;

/// How large to render a page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderSpec {
    /// Multiplier on the page's size in points.
    pub scale: f32,
    /// Longest-edge cap in pixels.
    pub max_pixels: u32,
}

/// Pixel dimensions for a page, preserving aspect ratio under the cap.
///
/// Both edges are at least 1 px.
pub fn target_dimensions(width_pt: f32, height_pt: f32, spec: RenderSpec) -> (u32, u32) {
    let raw_w = (width_pt * spec.scale).max(1.0);
    let raw_h = (height_pt * spec.scale).max(1.0);
    let longest = raw_w.max(raw_h);
    let cap = spec.max_pixels.max(1) as f32;

    let ratio = if longest > cap { cap / longest } else { 1.0 };
    (
        ((raw_w * ratio).round() as u32).max(1),
        ((raw_h * ratio).round() as u32).max(1),
    )
}

/// Render one page (0-indexed) on the blocking pool and encode it for OCR.
///
/// Errors are page-scoped: the caller records them and keeps whatever
/// structural text the page had.
pub async fn rasterize_page(
    backend: Arc<dyn PdfBackend>,
    bytes: Arc<[u8]>,
    password: Option<String>,
    index: usize,
    spec: RenderSpec,
) -> Result<PageImage, PageError> {
    let page = index + 1;
    let png = tokio::task::spawn_blocking(move || {
        backend.render_png(&bytes, password.as_deref(), index, spec)
    })
    .await
    .map_err(|e| PageError::Internal {
        page,
        detail: format!("render task panicked: {e}"),
    })?
    .map_err(|detail| PageError::RenderFailed { page, detail })?;

    if png.is_empty() {
        return Err(PageError::RenderFailed {
            page,
            detail: "renderer returned no image data".into(),
        });
    }

    debug!(page, png_bytes = png.len(), "Page rasterised");
    Ok(encode_png(&png))
}

#[cfg(test)]
mod tests {
    use super::*;

    const A4: (f32, f32) = (595.0, 842.0);

    #[test]
    fn scale_applies_below_cap() {
        let spec = RenderSpec {
            scale: 2.0,
            max_pixels: 2400,
        };
        assert_eq!(target_dimensions(A4.0, A4.1, spec), (1190, 1684));
    }

    #[test]
    fn longest_edge_is_capped() {
        let spec = RenderSpec {
            scale: 4.0,
            max_pixels: 2000,
        };
        let (w, h) = target_dimensions(A4.0, A4.1, spec);
        assert_eq!(h, 2000);
        assert!(w < h);
        assert!((w as f32 / h as f32 - A4.0 / A4.1).abs() < 0.01);
    }

    #[test]
    fn degenerate_page_is_at_least_one_pixel() {
        let spec = RenderSpec {
            scale: 2.0,
            max_pixels: 2400,
        };
        assert_eq!(target_dimensions(0.0, 0.0, spec), (1, 1));
    }
}
