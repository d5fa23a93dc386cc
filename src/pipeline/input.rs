//! Input resolution: turn a document URI into bytes.
//!
//! Three shapes are accepted: `http(s)://` URLs (downloaded with reqwest),
//! `file://` URIs (as handed out by the filesystem blob store) and bare
//! filesystem paths. Document bytes are held in memory because every
//! downstream stage (pdfium, the image decoder, base64 upload) works on a
//! byte slice.

use crate::error::PipelineError;
use std::path::PathBuf;
use tracing::{debug, info};

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Map a `file://` URI to a local path. Returns `None` for any other scheme.
pub fn file_uri_to_path(uri: &str) -> Option<PathBuf> {
    let rest = uri.strip_prefix("file://")?;
    // Drop a query string such as the `?se=...` expiry added to read URIs,
    // and any fragment. Literal `?` and `#` in the path arrive escaped.
    let rest = rest.split(['?', '#']).next().unwrap_or(rest);
    // `file://localhost/tmp/x` and `file:///tmp/x` both name `/tmp/x`.
    let rest = rest.strip_prefix("localhost").unwrap_or(rest);
    if rest.is_empty() {
        return None;
    }
    Some(PathBuf::from(percent_decode(rest)))
}

/// Build a `file://` URI for an absolute path.
pub fn path_to_file_uri(path: &std::path::Path) -> String {
    let s = path
        .to_string_lossy()
        .replace('\\', "/")
        .replace('%', "%25")
        .replace(' ', "%20")
        .replace('?', "%3F")
        .replace('#', "%23");
    if s.starts_with('/') {
        format!("file://{s}")
    } else {
        format!("file:///{s}")
    }
}

/// Minimal `%XX` decoding for paths embedded in `file://` URIs.
fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let decoded = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(b) = decoded {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Fetch the bytes behind a document URI.
pub async fn fetch_bytes(uri: &str, timeout_secs: u64) -> Result<Vec<u8>, PipelineError> {
    if is_url(uri) {
        return download_url(uri, timeout_secs).await;
    }
    let path = match file_uri_to_path(uri) {
        Some(p) => p,
        None if uri.contains("://") => {
            return Err(PipelineError::InvalidInput {
                input: uri.to_string(),
            })
        }
        None => PathBuf::from(uri),
    };
    read_local(path).await
}

async fn read_local(path: PathBuf) -> Result<Vec<u8>, PipelineError> {
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            debug!("Read {} bytes from {}", bytes.len(), path.display());
            Ok(bytes)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(PipelineError::FileNotFound { path })
        }
        Err(e) => Err(PipelineError::Storage { path, source: e }),
    }
}

/// Download a URL into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<Vec<u8>, PipelineError> {
    info!("Downloading document from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| PipelineError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        let reason = if e.is_timeout() {
            format!("timed out after {timeout_secs}s")
        } else {
            e.to_string()
        };
        PipelineError::DownloadFailed {
            url: url.to_string(),
            reason,
        }
    })?;

    if !response.status().is_success() {
        return Err(PipelineError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| PipelineError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    info!("Downloaded {} bytes", bytes.len());
    Ok(bytes.to_vec())
}
