//! Input resolution: read a user-supplied path or URL into memory.
//!
//! Every extractor works on byte buffers (pdfium opens PDFs from a slice, ZIP
//! and DOCX go through `Cursor`), so both paths end as a `Vec<u8>` plus a
//! display name. The name matters: it is the format hint for sniffing, so a
//! download keeps the filename from the URL or `Content-Disposition`.

use crate::error::ExtractError;
use std::path::Path;
use tracing::{debug, info};

/// A document read into memory.
#[derive(Debug, Clone)]
pub struct ResolvedInput {
    pub bytes: Vec<u8>,
    /// File name used as the format hint.
    pub name: String,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a path or URL to bytes.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, ExtractError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(Path::new(input)).await
    }
}

/// Read a local file, mapping I/O failures to the input error variants.
pub async fn read_local(path: &Path) -> Result<ResolvedInput, ExtractError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => ExtractError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => ExtractError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    debug!("Read local file: {} ({} bytes)", path.display(), bytes.len());
    Ok(ResolvedInput { bytes, name })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, ExtractError> {
    info!("Downloading document from: {}", url);
    let failed = |reason: String| ExtractError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            ExtractError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let name = response
        .headers()
        .get(reqwest::header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(filename_from_disposition)
        .or_else(|| filename_from_url(url))
        .unwrap_or_else(|| "download".to_string());

    let bytes = response.bytes().await.map_err(|e| {
        if e.is_timeout() {
            ExtractError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    info!("Downloaded '{}' ({} bytes)", name, bytes.len());
    Ok(ResolvedInput {
        bytes: bytes.to_vec(),
        name,
    })
}

/// Last path segment of a URL, when it looks like a file name.
pub fn filename_from_url(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.last()?;
    if last.is_empty() || !last.contains('.') {
        return None;
    }
    Some(last.to_string())
}

/// `filename="..."` from a `Content-Disposition` header value.
pub fn filename_from_disposition(header: &str) -> Option<String> {
    header
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))
        .map(|v| v.trim_matches('"').to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn test_filename_from_url() {
        assert_eq!(
            filename_from_url("https://ggzy.example.cn/files/招标文件.zip?x=1").as_deref(),
            Some("%E6%8B%9B%E6%A0%87%E6%96%87%E4%BB%B6.zip")
        );
        assert_eq!(
            filename_from_url("https://example.com/doc.pdf").as_deref(),
            Some("doc.pdf")
        );
        assert_eq!(filename_from_url("https://example.com/download"), None);
    }

    #[test]
    fn test_filename_from_disposition() {
        assert_eq!(
            filename_from_disposition(r#"attachment; filename="bid.docx""#).as_deref(),
            Some("bid.docx")
        );
        assert_eq!(filename_from_disposition("inline"), None);
    }

    #[tokio::test]
    async fn reads_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notice.txt");
        std::fs::write(&path, "招标公告").unwrap();

        let input = resolve_input(path.to_str().unwrap(), 5).await.unwrap();
        assert_eq!(input.name, "notice.txt");
        assert_eq!(input.bytes, "招标公告".as_bytes());
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let err = resolve_input("/definitely/not/here.pdf", 5).await.unwrap_err();
        assert!(matches!(err, ExtractError::FileNotFound { .. }));
    }
}
