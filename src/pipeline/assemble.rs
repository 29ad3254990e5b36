//! Document assembly: join resolved pages (or archive sections) into the
//! final text.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::format::DocumentFormat;
use crate::output::PageResult;

/// Join page texts in page order.
///
/// Failed pages contribute their placeholder unless `keep_placeholders` is
/// off, in which case they are dropped. Fails when no page recovered text.
pub fn assemble_pages(pages: &[PageResult], config: &ExtractionConfig) -> Result<String, ExtractError> {
    if pages.is_empty() {
        return Err(ExtractError::DocumentExtractionFailed {
            format: DocumentFormat::Pdf,
            reason: "no pages selected".into(),
        });
    }
    if pages.iter().all(|p| p.result.is_failed()) {
        return Err(ExtractError::DocumentExtractionFailed {
            format: DocumentFormat::Pdf,
            reason: format!("all {} pages unrecoverable", pages.len()),
        });
    }

    let mut out = String::new();
    let kept = pages
        .iter()
        .filter(|p| config.keep_placeholders || !p.result.is_failed())
        .filter(|p| !p.result.text.is_empty());
    for (i, page) in kept.enumerate() {
        if i > 0 {
            out.push_str(&config.page_separator.render(page.page_num));
        }
        out.push_str(&page.result.text);
    }
    Ok(out)
}

/// Join archive sections with a blank line.
pub fn assemble_sections(sections: &[String]) -> String {
    sections.join("\n\n")
}
