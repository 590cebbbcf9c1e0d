//! Error types for the edgequake-ocr2md library.
//!
//! Three layers reflect three audiences:
//!
//! * [`TransportError`]: a raw HTTP failure (timeout, connection reset,
//!   unreadable file). Only the transport produces it and no stage lets it
//!   escape: each stage translates it into its own [`StageError`] variant.
//!
//! * [`StageError`]: the failure of one pipeline step. Every variant carries
//!   a short summary (its `Display`) and, where the provider was involved, a
//!   diagnostic `detail` with the HTTP status and a bounded body snippet.
//!
//! * [`ProcessingFailure`]: the single error surfaced by the `convert*`
//!   entry points. It names the document and keeps the originating
//!   [`StageError`] so callers can read [`ProcessingFailure::kind`],
//!   [`ProcessingFailure::status_code`] and [`ProcessingFailure::detail`].
//!
//! The detail is deliberately absent from every `Display` impl: end users see
//! "Upload to the OCR provider failed", operators read the detail from logs.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Low-level failure of an outbound request.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request did not complete within the configured timeout.
    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Connection, TLS or protocol error reported by the HTTP client.
    #[error("request failed: {0}")]
    Request(String),

    /// The local file to upload could not be opened.
    #[error("could not read upload source: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a single pipeline stage.
#[derive(Debug, Error)]
pub enum StageError {
    // ── Input ─────────────────────────────────────────────────────────────
    /// Empty body, missing file, or unreadable input. No network call is made.
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    /// No API key was configured and none was found in the environment.
    #[error("OCR provider is not configured")]
    NotConfigured { detail: String },

    /// The in-memory document could not be written to a temporary file.
    #[error("Failed to stage the document locally")]
    Staging {
        #[source]
        source: std::io::Error,
    },

    // ── Provider stages ───────────────────────────────────────────────────
    /// `POST /files` failed or answered without a usable `id`.
    #[error("Upload to the OCR provider failed")]
    UploadFailed { detail: String },

    /// `GET /files/{id}/url` failed or answered without a usable `url`.
    #[error("Could not obtain a retrieval URL from the OCR provider")]
    RetrievalUrlFailed { detail: String },

    /// `POST /ocr` failed or answered with an unusable body.
    #[error("OCR request failed")]
    OcrFailed { detail: String },

    // ── Assembly ──────────────────────────────────────────────────────────
    /// Unrecoverable assembly error. Placeholder substitution problems are
    /// tolerated per page and never end up here.
    #[error("Failed to assemble Markdown")]
    FormatFailed { detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (e.g. the blocking wrapper's runtime).
    #[error("Internal error")]
    Internal { detail: String },
}

impl StageError {
    /// The discriminant of this error, suitable for serialisation.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StageError::InvalidInput { .. } => ErrorKind::InvalidInput,
            StageError::NotConfigured { .. } => ErrorKind::NotConfigured,
            StageError::Staging { .. } => ErrorKind::Staging,
            StageError::UploadFailed { .. } => ErrorKind::UploadFailure,
            StageError::RetrievalUrlFailed { .. } => ErrorKind::RetrievalUrlFailure,
            StageError::OcrFailed { .. } => ErrorKind::OcrFailure,
            StageError::FormatFailed { .. } => ErrorKind::FormatFailure,
            StageError::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Operator-facing diagnostic detail, if any.
    pub fn detail(&self) -> Option<String> {
        match self {
            StageError::InvalidInput { .. } => None,
            StageError::Staging { source } => Some(source.to_string()),
            StageError::NotConfigured { detail }
            | StageError::UploadFailed { detail }
            | StageError::RetrievalUrlFailed { detail }
            | StageError::OcrFailed { detail }
            | StageError::FormatFailed { detail }
            | StageError::Internal { detail } => Some(detail.clone()),
        }
    }
}

/// Classification of a [`ProcessingFailure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    NotConfigured,
    Staging,
    UploadFailure,
    RetrievalUrlFailure,
    OcrFailure,
    FormatFailure,
    Internal,
}

impl ErrorKind {
    /// HTTP status appropriate for this kind: 400 for bad input, 500 otherwise.
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::InvalidInput => 400,
            _ => 500,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::NotConfigured => "not_configured",
            ErrorKind::Staging => "staging",
            ErrorKind::UploadFailure => "upload_failure",
            ErrorKind::RetrievalUrlFailure => "retrieval_url_failure",
            ErrorKind::OcrFailure => "ocr_failure",
            ErrorKind::FormatFailure => "format_failure",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outward-facing error of a conversion.
#[derive(Debug, Error)]
#[error("Failed to convert '{filename}': {cause}")]
pub struct ProcessingFailure {
    /// Sanitised display filename of the document.
    pub filename: String,
    #[source]
    pub cause: StageError,
}

impl ProcessingFailure {
    pub fn new(filename: impl Into<String>, cause: StageError) -> Self {
        Self {
            filename: filename.into(),
            cause,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.cause.kind()
    }

    pub fn status_code(&self) -> u16 {
        self.kind().status_code()
    }

    /// Status code, response snippet or transport error of the failing stage.
    pub fn detail(&self) -> Option<String> {
        self.cause.detail()
    }

    /// Structured error object for API responses and `--json` output.
    ///
    /// `detail` is only filled in when `include_detail` is set.
    pub fn to_body(&self, include_detail: bool) -> ErrorBody {
        ErrorBody {
            error: ErrorObject {
                code: self.status_code(),
                kind: self.kind(),
                message: self.to_string(),
                detail: if include_detail { self.detail() } else { None },
            },
        }
    }
}

/// `{"error": {...}}` wrapper returned to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorObject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: u16,
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Cut a response body down to at most `max_chars` characters.
pub(crate) fn snippet(body: &str, max_chars: usize) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

/// `HTTP <status>: <snippet>`, the shape of every provider-side detail.
pub(crate) fn http_detail(status: u16, body: &str, max_chars: usize) -> String {
    let body = snippet(body, max_chars);
    if body.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {body}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_omits_detail() {
        let e = ProcessingFailure::new(
            "report.pdf",
            StageError::UploadFailed {
                detail: "HTTP 401: {\"message\":\"Unauthorized\"}".into(),
            },
        );
        let msg = e.to_string();
        assert!(msg.contains("report.pdf"), "got: {msg}");
        assert!(!msg.contains("401"), "detail leaked into message: {msg}");
        assert_eq!(e.detail().as_deref(), Some("HTTP 401: {\"message\":\"Unauthorized\"}"));
    }

    #[test]
    fn status_codes() {
        let bad = ProcessingFailure::new(
            "a.pdf",
            StageError::InvalidInput {
                reason: "empty document".into(),
            },
        );
        assert_eq!(bad.status_code(), 400);
        assert_eq!(bad.kind(), ErrorKind::InvalidInput);

        let ocr = ProcessingFailure::new("a.pdf", StageError::OcrFailed { detail: "x".into() });
        assert_eq!(ocr.status_code(), 500);
        assert_eq!(ocr.kind(), ErrorKind::OcrFailure);
    }

    #[test]
    fn body_detail_is_opt_in() {
        let e = ProcessingFailure::new(
            "a.pdf",
            StageError::RetrievalUrlFailed {
                detail: "HTTP 404".into(),
            },
        );
        let hidden = serde_json::to_value(e.to_body(false)).unwrap();
        assert_eq!(hidden["error"]["code"], 500);
        assert_eq!(hidden["error"]["kind"], "retrieval_url_failure");
        assert!(hidden["error"].get("detail").is_none());

        let shown = serde_json::to_value(e.to_body(true)).unwrap();
        assert_eq!(shown["error"]["detail"], "HTTP 404");
    }

    #[test]
    fn snippet_is_bounded_on_char_boundary() {
        let body = "é".repeat(600);
        let s = snippet(&body, 500);
        assert_eq!(s.chars().count(), 501); // 500 + ellipsis
        assert!(s.ends_with('…'));
        assert_eq!(snippet("  short  ", 500), "short");
    }

    #[test]
    fn http_detail_without_body() {
        assert_eq!(http_detail(502, "   ", 500), "HTTP 502");
        assert_eq!(http_detail(400, "bad", 500), "HTTP 400: bad");
    }
}
