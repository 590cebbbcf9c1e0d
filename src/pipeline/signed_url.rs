//! Retrieval-URL stage: exchange a file id for a short-lived signed URL.
//!
//! The OCR job cannot read an uploaded file by id; it needs a URL it can
//! fetch. The provider signs one on request with the validity window we ask
//! for. A URL is never reused across conversions.

use crate::error::{http_detail, snippet, StageError};
use crate::pipeline::transport::{object_str_field, OcrTransport};
use crate::pipeline::upload::RemoteFileHandle;
use std::fmt;
use tracing::{debug, warn};

/// Provider-issued URL granting temporary read access to an uploaded file.
#[derive(Clone, PartialEq, Eq)]
pub struct RetrievalUrl(String);

impl RetrievalUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Signed URLs are bearer credentials; keep the query string out of logs.
impl fmt::Debug for RetrievalUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let visible = self.0.split('?').next().unwrap_or_default();
        write!(f, "RetrievalUrl({visible}?…)")
    }
}

/// Request a retrieval URL for `file`, valid for `expiry_secs`.
pub async fn request_retrieval_url(
    transport: &dyn OcrTransport,
    file: &RemoteFileHandle,
    expiry_secs: u64,
    snippet_len: usize,
) -> Result<RetrievalUrl, StageError> {
    let response = transport
        .request_signed_url(file.as_str(), expiry_secs)
        .await
        .map_err(|e| StageError::RetrievalUrlFailed {
            detail: e.to_string(),
        })?;

    if !response.is_success() {
        let detail = http_detail(response.status, &response.body, snippet_len);
        warn!("Retrieval URL for file {} refused: {}", file, detail);
        return Err(StageError::RetrievalUrlFailed { detail });
    }

    let url = parse_signed_url_response(&response.body, snippet_len)?;
    debug!("Obtained retrieval URL for file {} ({}s)", file, expiry_secs);
    Ok(url)
}

fn parse_signed_url_response(body: &str, snippet_len: usize) -> Result<RetrievalUrl, StageError> {
    let invalid = || StageError::RetrievalUrlFailed {
        detail: format!("invalid response: {}", snippet(body, snippet_len)),
    };

    object_str_field(body, "url")
        .map(RetrievalUrl)
        .ok_or_else(invalid)
}

#[cfg(test)]
pub(crate) fn retrieval_url(url: &str) -> RetrievalUrl {
    RetrievalUrl(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_url() {
        let u = parse_signed_url_response(r#"{"url":"https://files.example/abc?sig=1"}"#, 500)
            .unwrap();
        assert_eq!(u.as_str(), "https://files.example/abc?sig=1");
    }

    #[test]
    fn rejects_missing_url() {
        for body in [
            r#"{}"#,
            r#"{"url":null}"#,
            r#"{"url":"  "}"#,
            r#"["https://evil.example/x"]"#,
            r#"[{"url":"https://evil.example/x"}]"#,
            "<html>",
        ] {
            assert!(
                matches!(
                    parse_signed_url_response(body, 500),
                    Err(StageError::RetrievalUrlFailed { .. })
                ),
                "{body}"
            );
        }
    }

    #[test]
    fn debug_hides_signature() {
        let u = retrieval_url("https://files.example/abc?sig=secret");
        let dbg = format!("{u:?}");
        assert!(dbg.contains("https://files.example/abc"));
        assert!(!dbg.contains("secret"));
    }
}
