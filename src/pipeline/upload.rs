//! Upload stage: stage the document with the provider.
//!
//! Sends the file as a multipart `POST /files` tagged `purpose=ocr` and
//! returns the provider's file id. One attempt only; any failure ends the
//! conversion.

use crate::error::{http_detail, snippet, StageError};
use crate::pipeline::transport::{object_str_field, OcrTransport};
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

/// Opaque provider-side identifier of an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFileHandle(String);

impl RemoteFileHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteFileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Upload the file at `path` under `filename`.
pub async fn upload_document(
    transport: &dyn OcrTransport,
    path: &Path,
    filename: &str,
    snippet_len: usize,
) -> Result<RemoteFileHandle, StageError> {
    let response = transport
        .upload_file(path, filename)
        .await
        .map_err(|e| StageError::UploadFailed {
            detail: e.to_string(),
        })?;

    if !response.is_success() {
        let detail = http_detail(response.status, &response.body, snippet_len);
        warn!("Upload of '{}' rejected: {}", filename, detail);
        return Err(StageError::UploadFailed { detail });
    }

    let handle = parse_upload_response(&response.body, snippet_len)?;
    debug!("Uploaded '{}' as file {}", filename, handle);
    Ok(handle)
}

/// Extract a non-empty `id` from the upload response, which must be an object.
fn parse_upload_response(body: &str, snippet_len: usize) -> Result<RemoteFileHandle, StageError> {
    object_str_field(body, "id")
        .map(RemoteFileHandle)
        .ok_or_else(|| StageError::UploadFailed {
            detail: format!("invalid response: {}", snippet(body, snippet_len)),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_id() {
        let h = parse_upload_response(r#"{"id":"f-1","object":"file"}"#, 500).unwrap();
        assert_eq!(h.as_str(), "f-1");
    }

    #[test]
    fn rejects_missing_or_empty_id() {
        for body in [
            r#"{"object":"file"}"#,
            r#"{"id":""}"#,
            r#"{"id":42}"#,
            r#"["f-1"]"#,
            r#"[{"id":"f-1"}]"#,
            r#""f-1""#,
            "not json",
            "",
        ] {
            match parse_upload_response(body, 500) {
                Err(StageError::UploadFailed { detail }) => {
                    assert!(detail.starts_with("invalid response"), "{body}: {detail}")
                }
                other => panic!("{body}: expected UploadFailed, got {other:?}"),
            }
        }
    }
}
