//! Image encoding: rendered PNG bytes → base64 `PageImage`.
//!
//! Vision APIs (OpenAI, Anthropic, Gemini) accept images as base64 embedded
//! in the JSON request body. PNG is used over JPEG because it is lossless:
//! text crispness matters far more than payload size for OCR accuracy, and
//! JPEG ringing around small digits is a common source of misread amounts.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

/// A page image ready to embed in a provider request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    pub mime_type: String,
    /// Standard base64 without line breaks.
    pub base64: String,
}

impl PageImage {
    /// `data:` URI form used by OpenAI-compatible APIs.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64)
    }
}

/// Wrap PNG bytes as a [`PageImage`].
pub fn encode_png(png: &[u8]) -> PageImage {
    let b64 = STANDARD.encode(png);
    debug!("Encoded image → {} bytes base64", b64.len());
    PageImage {
        mime_type: "image/png".to_string(),
        base64: b64,
    }
}
