//! Post-processing: deterministic cleanup of OCR completions.
//!
//! Even well-prompted vision models add artefacts around the transcription:
//!
//! - wrapping the output in ```` ```text ... ``` ```` fences despite the
//!   instruction not to
//! - a chatty lead-in line ("Here is the extracted text:")
//! - Markdown pipe tables instead of tab-separated rows
//! - `\r\n` line endings, zero-width spaces and soft hyphens
//!
//! The rules below fix these without touching content. They run before the
//! OCR text is compared with the structural text, so length comparisons are
//! made on clean text.
//!
//! ## Rule Order
//!
//! Fences go first so the lead-in check sees the real first line; line
//! endings are normalised before any line-based rule; tables are converted
//! before blank lines are collapsed because separator rows disappear.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to a raw OCR completion.
///
/// Rules (applied in order):
/// 1. Strip outer code fences
/// 2. Normalise line endings (CRLF / CR → LF)
/// 3. Drop a conversational lead-in line
/// 4. Convert Markdown pipe tables to tab-separated rows
/// 5. Trim trailing whitespace per line
/// 6. Collapse runs of blank lines to one
/// 7. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 8. Trim leading/trailing blank space
pub fn clean_ocr_text(input: &str) -> String {
    let s = strip_code_fences(input);
    let s = normalise_line_endings(&s);
    let s = drop_lead_in(&s);
    let s = pipe_tables_to_tabs(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = remove_invisible_chars(&s);
    s.trim_matches(|c: char| c == '\n' || c == ' ').to_string()
}

// ── Rule 1: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\r?\n(.*?)\r?\n?```\s*$").unwrap());

fn strip_code_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Drop conversational lead-in ──────────────────────────────────────

static RE_LEAD_IN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(here is|here's|below is|sure[,!]|以下是|下面是).{0,80}[:：]\s*$").unwrap()
});

fn drop_lead_in(input: &str) -> String {
    match input.split_once('\n') {
        Some((first, rest)) if RE_LEAD_IN.is_match(first) => rest.to_string(),
        _ => input.to_string(),
    }
}

// ── Rule 4: Pipe tables → tab-separated rows ─────────────────────────────────

fn is_separator_row(line: &str) -> bool {
    let t = line.trim();
    t.starts_with('|')
        && t.contains('-')
        && t.chars().all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

fn is_pipe_row(line: &str) -> bool {
    let t = line.trim();
    t.len() >= 2 && t.starts_with('|') && t.ends_with('|')
}

fn pipe_tables_to_tabs(input: &str) -> String {
    input
        .lines()
        .filter(|line| !is_separator_row(line))
        .map(|line| {
            if is_pipe_row(line) {
                let inner = &line.trim()[1..line.trim().len() - 1];
                inner
                    .split('|')
                    .map(str::trim)
                    .collect::<Vec<_>>()
                    .join("\t")
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end_matches([' ', '\u{3000}']))
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 6: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

// ── Rule 7: Remove invisible characters ──────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}
