//! Stage 6 — photo upload (conditional).
//!
//! Embedded data-URI payloads are decoded to named temp files, handed to the
//! first file input via CDP `DOM.setFileInputFiles`, and deleted afterwards.
//! Cleanup is tied to [`PhotoTempFiles`] drop, so the files are removed even
//! when the upload step itself errors.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::Page;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::stages::{find_first, selectors};
use super::AutomationError;
use crate::core::types::PhotoAttachments;

/// Parse a `data:image/<subtype>;base64,<payload>` URI into a file extension
/// and the decoded bytes.
pub fn parse_data_uri(uri: &str) -> Result<(String, Vec<u8>), AutomationError> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| AutomationError::Photo("not a data URI".into()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| AutomationError::Photo("data URI has no payload separator".into()))?;
    let meta = meta
        .strip_suffix(";base64")
        .ok_or_else(|| AutomationError::Photo("only base64 data URIs are supported".into()))?;

    let ext = match meta {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        other => {
            return Err(AutomationError::Photo(format!(
                "unsupported media type: {}",
                other
            )))
        }
    };

    let bytes = BASE64
        .decode(payload.trim())
        .map_err(|e| AutomationError::Photo(format!("base64 decode failed: {}", e)))?;
    if bytes.is_empty() {
        return Err(AutomationError::Photo("empty image payload".into()));
    }
    Ok((ext.to_string(), bytes))
}

/// Decoded photo payloads as named temp files. Files are deleted on drop —
/// the upload stage cannot leak them on any path.
pub struct PhotoTempFiles {
    files: Vec<NamedTempFile>,
}

impl PhotoTempFiles {
    /// Decode every payload present. A malformed payload is skipped with a
    /// warning rather than failing the job (same policy as a missing form
    /// element).
    pub fn from_attachments(photos: &PhotoAttachments) -> Self {
        let mut files = Vec::new();
        for payload in photos.payloads() {
            match decode_to_temp_file(payload) {
                Ok(file) => files.push(file),
                Err(e) => warn!("photos: skipping undecodable payload: {}", e),
            }
        }
        Self { files }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn paths(&self) -> Vec<String> {
        self.files
            .iter()
            .map(|f| f.path().to_string_lossy().to_string())
            .collect()
    }
}

fn decode_to_temp_file(payload: &str) -> Result<NamedTempFile, AutomationError> {
    let (ext, bytes) = parse_data_uri(payload)?;
    let file = tempfile::Builder::new()
        .prefix("quotebot-photo-")
        .suffix(&format!(".{}", ext))
        .tempfile()
        .map_err(|e| AutomationError::Photo(format!("temp file create failed: {}", e)))?;
    std::fs::write(file.path(), &bytes)
        .map_err(|e| AutomationError::Photo(format!("temp file write failed: {}", e)))?;
    Ok(file)
}

/// Run the photo-upload stage. Skips quietly when no payload decodes or the
/// page has no file input; propagates browser errors. Temp files are removed
/// on every path.
pub async fn upload_photos(
    page: &Page,
    photos: &PhotoAttachments,
    settle_ms: u64,
) -> Result<(), AutomationError> {
    let temp = PhotoTempFiles::from_attachments(photos);
    if temp.is_empty() {
        warn!("photos: no decodable payloads — skipping upload");
        return Ok(());
    }

    let Some(input) = find_first(page, selectors::FILE_INPUTS).await else {
        debug!("photos: no file input on page — skipping");
        return Ok(());
    };

    let params = SetFileInputFilesParams::builder()
        .files(temp.paths())
        .backend_node_id(input.backend_node_id)
        .build()
        .map_err(AutomationError::Photo)?;
    page.execute(params).await?;

    debug!("photos: submitted {} file(s)", temp.paths().len());
    // Let the site ingest the files before the next stage touches the page.
    tokio::time::sleep(Duration::from_millis(settle_ms)).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // 1×1 transparent PNG.
    const TINY_PNG: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

    #[test]
    fn parses_png_data_uri() {
        let (ext, bytes) = parse_data_uri(TINY_PNG).unwrap();
        assert_eq!(ext, "png");
        assert_eq!(&bytes[1..4], b"PNG");
    }

    #[test]
    fn rejects_non_data_uris_and_unknown_types() {
        assert!(parse_data_uri("https://example.com/a.png").is_err());
        assert!(parse_data_uri("data:text/plain;base64,aGk=").is_err());
        assert!(parse_data_uri("data:image/png;base64,!!!").is_err());
        assert!(parse_data_uri("data:image/png,rawpayload").is_err());
    }

    #[test]
    fn temp_files_exist_while_held_and_vanish_on_drop() {
        let photos = PhotoAttachments {
            original: Some(TINY_PNG.to_string()),
            visualization: Some(TINY_PNG.to_string()),
        };
        let paths;
        {
            let temp = PhotoTempFiles::from_attachments(&photos);
            paths = temp.paths();
            assert_eq!(paths.len(), 2);
            for p in &paths {
                assert!(std::path::Path::new(p).exists(), "{p} should exist");
                assert!(p.ends_with(".png"));
            }
        }
        for p in &paths {
            assert!(!std::path::Path::new(p).exists(), "{p} should be cleaned up");
        }
    }

    #[test]
    fn temp_files_are_cleaned_up_when_the_upload_step_errors() {
        let photos = PhotoAttachments {
            original: Some(TINY_PNG.to_string()),
            visualization: None,
        };
        let paths;
        {
            let temp = PhotoTempFiles::from_attachments(&photos);
            paths = temp.paths();
            // Simulate the upload failing mid-stage; the guard must still
            // clean up when it unwinds out of scope.
            let upload_result: Result<(), AutomationError> =
                Err(AutomationError::Photo("simulated upload failure".into()));
            assert!(upload_result.is_err());
        }
        assert!(!std::path::Path::new(&paths[0]).exists());
    }

    #[test]
    fn malformed_payloads_are_skipped_not_fatal() {
        let photos = PhotoAttachments {
            original: Some("data:image/png;base64,???notbase64???".to_string()),
            visualization: Some(TINY_PNG.to_string()),
        };
        let temp = PhotoTempFiles::from_attachments(&photos);
        assert_eq!(temp.paths().len(), 1);
    }
}
