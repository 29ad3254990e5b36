//! ZIP archive members.
//!
//! Reads every file entry of an archive into memory, in archive order, and
//! leaves the decision of how to open each one to the extractor. Entries that
//! cannot be read (encrypted, oversize, corrupt) still produce a member with
//! an `Err` reason so the caller can emit a placeholder section for them.

use crate::error::ExtractError;
use crate::format::DocumentFormat;
use std::io::{Cursor, Read};
use tracing::{debug, warn};

/// One file entry of an archive.
#[derive(Debug, Clone)]
pub struct ArchiveMember {
    /// Full path inside the archive.
    pub name: String,
    /// Uncompressed bytes, or why they could not be read.
    pub content: Result<Vec<u8>, String>,
}

/// Platform clutter that never holds document content: anything under a
/// hidden or `__MACOSX` directory, hidden files, and Windows shell files.
pub fn is_metadata_entry(name: &str) -> bool {
    let components = name
        .split(['/', '\\'])
        .filter(|c| !c.is_empty() && *c != "." && *c != "..");
    let hidden = components
        .clone()
        .any(|c| c.starts_with('.') || c == "__MACOSX");
    let base = components.last().unwrap_or(name);
    hidden
        || base.eq_ignore_ascii_case("Thumbs.db")
        || base.eq_ignore_ascii_case("desktop.ini")
}

/// Entry names without the UTF-8 flag are usually GBK from Windows zippers.
fn decode_entry_name(raw: &[u8]) -> String {
    match std::str::from_utf8(raw) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (name, _, _) = encoding_rs::GB18030.decode(raw);
            name.into_owned()
        }
    }
}

/// Read the file entries of a ZIP archive.
///
/// Directories and metadata entries are skipped. Only a corrupt central
/// directory fails the whole call.
pub fn read_members(bytes: &[u8], max_entry_bytes: u64) -> Result<Vec<ArchiveMember>, ExtractError> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| ExtractError::ContainerCorrupt {
            format: DocumentFormat::Zip,
            detail: e.to_string(),
        })?;

    let mut members = Vec::new();
    for i in 0..archive.len() {
        let (name, is_dir, encrypted, size) = match archive.by_index_raw(i) {
            Ok(entry) => (
                decode_entry_name(entry.name_raw()),
                entry.is_dir(),
                entry.encrypted(),
                entry.size(),
            ),
            Err(e) => {
                warn!(index = i, error = %e, "Unreadable archive entry header");
                members.push(ArchiveMember {
                    name: format!("entry #{}", i + 1),
                    content: Err(format!("corrupt entry: {e}")),
                });
                continue;
            }
        };

        if is_dir || is_metadata_entry(&name) {
            debug!(entry = %name, "Skipping archive entry");
            continue;
        }
        if encrypted {
            members.push(ArchiveMember {
                name,
                content: Err("encrypted entry".into()),
            });
            continue;
        }
        if size > max_entry_bytes {
            members.push(ArchiveMember {
                content: Err(format!(
                    "entry is {size} bytes, limit is {max_entry_bytes}"
                )),
                name,
            });
            continue;
        }

        let content = read_entry(&mut archive, i, max_entry_bytes);
        members.push(ArchiveMember { name, content });
    }
    Ok(members)
}

fn read_entry(
    archive: &mut zip::ZipArchive<Cursor<&[u8]>>,
    index: usize,
    max_entry_bytes: u64,
) -> Result<Vec<u8>, String> {
    let entry = archive.by_index(index).map_err(|e| e.to_string())?;
    let mut buf = Vec::with_capacity(entry.size().min(max_entry_bytes) as usize);
    // The declared size can lie; cap what is actually inflated.
    entry
        .take(max_entry_bytes + 1)
        .read_to_end(&mut buf)
        .map_err(|e| format!("corrupt entry: {e}"))?;
    if buf.len() as u64 > max_entry_bytes {
        return Err(format!("entry exceeds {max_entry_bytes} bytes"));
    }
    Ok(buf)
}

/// Wrap a member's text in file delimiters.
pub fn section(name: &str, text: &str) -> String {
    format!("===== BEGIN FILE: {name} =====\n{text}\n===== END FILE: {name} =====")
}

/// Text of a member that yielded nothing; the reason is kept on one line.
pub fn file_placeholder(reason: &str) -> String {
    let reason = reason.split_whitespace().collect::<Vec<_>>().join(" ");
    format!("[[unrecoverable file: {reason}]]")
}
