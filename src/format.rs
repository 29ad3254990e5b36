//! Format sniffing: decide how a byte buffer should be opened.
//!
//! Content wins over names. Tender bundles routinely contain files with
//! wrong or missing extensions (`scan.pdf` that is really a JPEG-in-ZIP,
//! `说明` with no extension at all), so magic bytes are checked first and
//! the filename extension only breaks ties when the content is ambiguous.

use crate::error::ExtractError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;
use std::path::Path;

/// The container formats the pipeline can open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Zip,
    PlainText,
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DocumentFormat::Pdf => "PDF",
            DocumentFormat::Docx => "DOCX",
            DocumentFormat::Zip => "ZIP",
            DocumentFormat::PlainText => "text",
        };
        f.write_str(s)
    }
}

impl DocumentFormat {
    /// Map a filename extension (case-insensitive) to a format.
    pub fn from_extension(name: &str) -> Option<Self> {
        let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(DocumentFormat::Pdf),
            "docx" => Some(DocumentFormat::Docx),
            "zip" => Some(DocumentFormat::Zip),
            "txt" | "text" | "csv" | "tsv" | "md" | "log" | "json" | "xml" | "html" | "htm" => {
                Some(DocumentFormat::PlainText)
            }
            _ => None,
        }
    }
}

/// How far into the buffer `%PDF` may appear. Some generators prepend junk.
const PDF_HEADER_WINDOW: usize = 1024;

/// Window used to decide whether unknown bytes look like text.
const TEXT_SNIFF_WINDOW: usize = 8192;

const ZIP_LOCAL_HEADER: &[u8] = b"PK\x03\x04";
const ZIP_EMPTY_ARCHIVE: &[u8] = b"PK\x05\x06";
const OLE_COMPOUND_FILE: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Identify the format of `bytes`, optionally helped by a filename.
pub fn sniff_format(bytes: &[u8], name: Option<&str>) -> Result<DocumentFormat, ExtractError> {
    let window = &bytes[..bytes.len().min(PDF_HEADER_WINDOW)];
    if window.windows(4).any(|w| w == b"%PDF") {
        return Ok(DocumentFormat::Pdf);
    }

    if bytes.starts_with(ZIP_LOCAL_HEADER) || bytes.starts_with(ZIP_EMPTY_ARCHIVE) {
        return Ok(if is_docx_package(bytes) {
            DocumentFormat::Docx
        } else {
            DocumentFormat::Zip
        });
    }

    if bytes.starts_with(OLE_COMPOUND_FILE) {
        return Err(undetected(
            bytes,
            name,
            Some("legacy OLE documents (.doc/.xls) are not supported; save as DOCX or PDF"),
        ));
    }

    match name.and_then(DocumentFormat::from_extension) {
        // An extension claiming a binary container the magic bytes disagree
        // with is not trusted; fall through to the text check.
        Some(DocumentFormat::PlainText) => return Ok(DocumentFormat::PlainText),
        Some(_) | None => {}
    }

    if looks_like_text(bytes) {
        return Ok(DocumentFormat::PlainText);
    }

    Err(undetected(bytes, name, None))
}

/// A ZIP is a DOCX when it carries the WordprocessingML main part.
fn is_docx_package(bytes: &[u8]) -> bool {
    match zip::ZipArchive::new(Cursor::new(bytes)) {
        Ok(archive) => archive.file_names().any(|n| n == "word/document.xml"),
        Err(_) => false,
    }
}

fn looks_like_text(bytes: &[u8]) -> bool {
    if bytes.is_empty() {
        return false;
    }
    // UTF-16 legitimately contains NUL bytes.
    if bytes.starts_with(&[0xFF, 0xFE]) || bytes.starts_with(&[0xFE, 0xFF]) {
        return true;
    }
    let head = &bytes[..bytes.len().min(TEXT_SNIFF_WINDOW)];
    !head.contains(&0)
}

fn undetected(bytes: &[u8], name: Option<&str>, hint: Option<&str>) -> ExtractError {
    ExtractError::FormatUndetected {
        name: name.map(str::to_string),
        magic: bytes.iter().take(8).copied().collect(),
        hint: hint.map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn zip_with(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut w = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in entries {
            w.start_file(*name, SimpleFileOptions::default()).unwrap();
            w.write_all(body).unwrap();
        }
        w.finish().unwrap().into_inner()
    }

    #[test]
    fn pdf_magic_at_start() {
        assert_eq!(
            sniff_format(b"%PDF-1.7\n...", None).unwrap(),
            DocumentFormat::Pdf
        );
    }

    #[test]
    fn pdf_magic_after_junk_prefix() {
        let mut bytes = vec![b' '; 100];
        bytes.extend_from_slice(b"%PDF-1.4");
        assert_eq!(sniff_format(&bytes, None).unwrap(), DocumentFormat::Pdf);
    }

    #[test]
    fn zip_without_word_part_is_zip() {
        let bytes = zip_with(&[("a.txt", b"hello")]);
        assert_eq!(sniff_format(&bytes, None).unwrap(), DocumentFormat::Zip);
    }

    #[test]
    fn zip_with_word_part_is_docx() {
        let bytes = zip_with(&[("word/document.xml", b"<w:document/>")]);
        assert_eq!(sniff_format(&bytes, None).unwrap(), DocumentFormat::Docx);
    }

    #[test]
    fn docx_extension_does_not_override_content() {
        let bytes = zip_with(&[("a.txt", b"hello")]);
        assert_eq!(
            sniff_format(&bytes, Some("bid.docx")).unwrap(),
            DocumentFormat::Zip
        );
    }

    #[test]
    fn ole_is_rejected_with_hint() {
        let mut bytes = OLE_COMPOUND_FILE.to_vec();
        bytes.extend_from_slice(&[0; 32]);
        let err = sniff_format(&bytes, Some("old.doc")).unwrap_err();
        match err {
            ExtractError::FormatUndetected { hint, .. } => assert!(hint.is_some()),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn utf8_text_is_plain_text() {
        let text = "投标报价：¥1,200,000\n工期：90天".as_bytes();
        assert_eq!(sniff_format(text, None).unwrap(), DocumentFormat::PlainText);
    }

    #[test]
    fn binary_without_hint_is_undetected() {
        let bytes = [0x89, b'P', b'N', b'G', 0, 0, 0, 0x0D];
        assert!(matches!(
            sniff_format(&bytes, Some("scan.png")),
            Err(ExtractError::FormatUndetected { .. })
        ));
    }

    #[test]
    fn txt_extension_accepts_binary_looking_text() {
        let bytes = [b'a', 0, b'b'];
        assert_eq!(
            sniff_format(&bytes, Some("notes.TXT")).unwrap(),
            DocumentFormat::PlainText
        );
    }

    #[test]
    fn empty_input_is_undetected() {
        assert!(sniff_format(&[], None).is_err());
    }

    #[test]
    fn extension_mapping() {
        assert_eq!(DocumentFormat::from_extension("A.PDF"), Some(DocumentFormat::Pdf));
        assert_eq!(DocumentFormat::from_extension("x.csv"), Some(DocumentFormat::PlainText));
        assert_eq!(DocumentFormat::from_extension("noext"), None);
        assert_eq!(DocumentFormat::from_extension("x.jpg"), None);
    }
}
