//! DOCX text extraction.
//!
//! Reads `word/document.xml` and walks it with `quick-xml`:
//!
//! * paragraphs (`w:p`): text runs (`w:t`) joined with single spaces, no
//!   space where a boundary already has whitespace;
//! * tables (`w:tbl`): paragraphs in a cell joined with ` / `, cells with a
//!   tab, rows with a newline. A table nested in a cell is flattened into
//!   that cell;
//! * blocks (paragraphs and tables) separated by newlines.
//!
//! `mc:Fallback` subtrees are skipped since they repeat the `mc:Choice`
//! content. When the structured walk yields nothing or the XML is malformed,
//! a flat scan collects every `w:t` in document order instead.

use crate::error::ExtractError;
use crate::format::DocumentFormat;
use once_cell::sync::Lazy;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use std::io::{Cursor, Read};
use tracing::{debug, warn};

const DOCUMENT_PART: &str = "word/document.xml";

/// Delimiter between paragraphs of one table cell.
pub const CELL_PARAGRAPH_DELIMITER: &str = " / ";

/// Extract the text of a DOCX container.
pub fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let corrupt = |detail: String| ExtractError::ContainerCorrupt {
        format: DocumentFormat::Docx,
        detail,
    };

    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| corrupt(e.to_string()))?;
    let mut part = archive
        .by_name(DOCUMENT_PART)
        .map_err(|e| corrupt(format!("{DOCUMENT_PART}: {e}")))?;
    let mut raw = Vec::with_capacity(part.size() as usize);
    part.read_to_end(&mut raw)
        .map_err(|e| corrupt(format!("{DOCUMENT_PART}: {e}")))?;
    let xml = String::from_utf8_lossy(&raw);

    Ok(document_text(&xml))
}

/// Text of a `word/document.xml` body, structured walk first.
pub fn document_text(xml: &str) -> String {
    match walk(xml) {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) => {
            debug!("Structured DOCX walk found no text; using flat scan");
            flat_scan(xml)
        }
        Err(e) => {
            warn!(error = %e, "Malformed DOCX XML; using flat scan");
            flat_scan(xml)
        }
    }
}

/// One open table: finished rows, the row being built, and the
/// paragraphs of the cell being built.
#[derive(Default)]
struct TableCtx {
    rows: Vec<Vec<String>>,
    row: Vec<String>,
    cell: Vec<String>,
}

impl TableCtx {
    fn render(&self) -> String {
        self.rows
            .iter()
            .map(|cells| cells.join("\t"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn flatten(&self) -> String {
        self.rows
            .iter()
            .flatten()
            .filter(|c| !c.is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(CELL_PARAGRAPH_DELIMITER)
    }
}

fn join_runs(runs: &[String]) -> String {
    let mut out = String::new();
    for run in runs.iter().filter(|r| !r.is_empty()) {
        let needs_space = !out.is_empty()
            && !out.ends_with(char::is_whitespace)
            && !run.starts_with(char::is_whitespace);
        if needs_space {
            out.push(' ');
        }
        out.push_str(run);
    }
    out.trim().to_string()
}

fn walk(xml: &str) -> Result<String, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(false);

    let mut blocks: Vec<String> = Vec::new();
    let mut tables: Vec<TableCtx> = Vec::new();
    // Paragraph stack: text boxes nest paragraphs inside runs.
    let mut paras: Vec<Vec<String>> = Vec::new();
    let mut in_t = false;
    let mut run_text = String::new();
    let mut skip_depth = 0usize;
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let event = reader.read_event_into(&mut buf)?;
        if skip_depth > 0 {
            match event {
                Event::Start(_) => skip_depth += 1,
                Event::End(_) => skip_depth -= 1,
                Event::Eof => break,
                _ => {}
            }
            continue;
        }

        match event {
            Event::Start(e) => match e.local_name().as_ref() {
                b"Fallback" => skip_depth = 1,
                b"tbl" => tables.push(TableCtx::default()),
                b"p" => paras.push(Vec::new()),
                b"t" => {
                    in_t = true;
                    run_text.clear();
                }
                _ => {}
            },
            Event::Empty(e) => {
                if let Some(runs) = paras.last_mut() {
                    match e.local_name().as_ref() {
                        b"tab" => runs.push("\t".into()),
                        b"br" | b"cr" => runs.push("\n".into()),
                        _ => {}
                    }
                }
            }
            Event::Text(t) if in_t => run_text.push_str(&t.unescape()?),
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => {
                    in_t = false;
                    if let Some(runs) = paras.last_mut() {
                        runs.push(std::mem::take(&mut run_text));
                    }
                }
                b"p" => {
                    let text = paras.pop().map(|r| join_runs(&r)).unwrap_or_default();
                    if !text.is_empty() {
                        if let Some(outer) = paras.last_mut() {
                            outer.push(text);
                        } else if let Some(table) = tables.last_mut() {
                            table.cell.push(text);
                        } else {
                            blocks.push(text);
                        }
                    }
                }
                b"tc" => {
                    if let Some(table) = tables.last_mut() {
                        let cell = std::mem::take(&mut table.cell);
                        table.row.push(cell.join(CELL_PARAGRAPH_DELIMITER));
                    }
                }
                b"tr" => {
                    if let Some(table) = tables.last_mut() {
                        let row = std::mem::take(&mut table.row);
                        table.rows.push(row);
                    }
                }
                b"tbl" => {
                    if let Some(done) = tables.pop() {
                        match tables.last_mut() {
                            Some(outer) => {
                                let flat = done.flatten();
                                if !flat.is_empty() {
                                    outer.cell.push(flat);
                                }
                            }
                            None => {
                                let rendered = done.render();
                                if !rendered.trim().is_empty() {
                                    blocks.push(rendered);
                                }
                            }
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(blocks.join("\n"))
}

static RE_TEXT_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<w:t(?:\s[^>]*)?>([^<]*)</w:t>").unwrap());

/// Every `w:t` in document order, space-joined.
pub fn flat_scan(xml: &str) -> String {
    let runs: Vec<String> = RE_TEXT_RUN
        .captures_iter(xml)
        .map(|c| {
            let raw = &c[1];
            quick_xml::escape::unescape(raw)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| raw.to_string())
        })
        .collect();
    join_runs(&runs)
}
