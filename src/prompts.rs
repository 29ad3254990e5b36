//! OCR instructions and refusal detection.
//!
//! The instruction pair is deliberately plain: the downstream consumer wants
//! raw text with tables kept as aligned rows, not Markdown. Callers can
//! override both via [`crate::config::ExtractionConfig`].

use once_cell::sync::Lazy;
use regex::Regex;

/// Default system instruction for page transcription.
pub const OCR_SYSTEM_PROMPT: &str = "You are a precise document transcription engine. \
Extract ALL visible text from the page image faithfully, in natural reading order. \
Preserve the layout of tables: one table row per line, cells separated by a tab character. \
Do not summarise, translate, correct, or explain anything. \
Return the raw text only, with no commentary and no Markdown fences.";

/// Default user instruction accompanying the page image.
pub const OCR_USER_PROMPT: &str = "Transcribe every piece of text on this page with full \
fidelity, including all numbers, amounts, currency symbols, dates, reference codes, stamps, \
headers, footers, and every cell of every table. Output only the transcribed text.";

/// Replies longer than this are never treated as refusals: a real page that
/// happens to contain "unable to" is still a real page.
const REFUSAL_MAX_CHARS: usize = 400;

static RE_REFUSAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\W*(i'?m sorry|i am sorry|sorry,|i apologi[sz]e|i cannot|i can'?t|i am unable|i'?m unable|unable to (read|extract|process|transcribe)|as an ai|there is no (visible )?text|the image (is|appears) (blank|empty)|抱歉|对不起|无法识别|无法提取|我无法|图片中没有)",
    )
    .unwrap()
});

/// True when a provider reply is an apology or refusal rather than content.
pub fn is_refusal(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.chars().count() < REFUSAL_MAX_CHARS && RE_REFUSAL.is_match(trimmed)
}
