//! Plain-text decoding.
//!
//! Tender bundles mix UTF-8 exports with GBK/GB18030 files from older
//! Windows tools and the odd Big5 or UTF-16 notice. Detection priority:
//!
//! 1. BOM (UTF-8, UTF-16 LE/BE)
//! 2. UTF-16 without BOM, from NUL-byte patterns
//! 3. strict UTF-8 validation
//! 4. `chardetng` statistical detection, decoded with `encoding_rs`

use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8};
use tracing::debug;

/// Decoded text and the encoding it was read as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedText {
    /// LF-normalised text without BOM.
    pub text: String,
    pub encoding: &'static str,
}

/// Decode a plain-text file to UTF-8.
///
/// Never fails: undecodable sequences become U+FFFD.
pub fn decode_text(bytes: &[u8]) -> DecodedText {
    let (encoding, body) = detect(bytes);
    let (text, had_errors) = encoding.decode_without_bom_handling(body);
    if had_errors {
        debug!(encoding = encoding.name(), "Replacement characters inserted while decoding");
    }
    DecodedText {
        text: normalise_newlines(&text),
        encoding: encoding.name(),
    }
}

/// Pick an encoding and strip any BOM.
fn detect(bytes: &[u8]) -> (&'static Encoding, &[u8]) {
    if let Some((enc, bom_len)) = Encoding::for_bom(bytes) {
        return (enc, &bytes[bom_len..]);
    }
    // NUL bytes are valid UTF-8, so this must run first.
    if let Some(enc) = utf16_without_bom(bytes) {
        return (enc, bytes);
    }
    if std::str::from_utf8(bytes).is_ok() {
        return (UTF_8, bytes);
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let enc = detector.guess(None, false);
    debug!(encoding = enc.name(), "Statistical charset detection");
    (enc, bytes)
}

/// ASCII-heavy UTF-16 without BOM shows up as alternating NUL bytes.
fn utf16_without_bom(bytes: &[u8]) -> Option<&'static Encoding> {
    let pairs = bytes.len() / 2;
    if pairs < 4 {
        return None;
    }
    let odd_nuls = bytes.iter().skip(1).step_by(2).filter(|&&b| b == 0).count();
    let even_nuls = bytes.iter().step_by(2).filter(|&&b| b == 0).count();
    if odd_nuls > pairs * 3 / 4 && even_nuls < pairs / 4 {
        Some(UTF_16LE)
    } else if even_nuls > pairs * 3 / 4 && odd_nuls < pairs / 4 {
        Some(UTF_16BE)
    } else {
        None
    }
}

fn normalise_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}
