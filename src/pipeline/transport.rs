//! Outbound HTTP calls to the OCR provider.
//!
//! The [`OcrTransport`] trait is the only place the pipeline touches the
//! network. It reports the raw status and body of each call and leaves every
//! interpretation (success criteria, JSON shape, error classification) to the
//! stage modules. That split keeps the stages testable with an in-memory
//! transport and keeps `reqwest` types out of the rest of the crate.
//!
//! [`MistralClient`] is the production implementation against the Mistral
//! REST API.

use crate::config::OcrConfig;
use crate::error::{StageError, TransportError};
use crate::pipeline::ocr::OcrRequest;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Url};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Trimmed, non-empty string member `key` of a JSON object body.
///
/// `None` for malformed JSON, a non-object top level (arrays included), a
/// missing or non-string member, or a blank value.
pub(crate) fn object_str_field(body: &str, key: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let field = value.as_object()?.get(key)?.as_str()?.trim();
    (!field.is_empty()).then(|| field.to_string())
}

/// The three provider calls the pipeline makes, in the order it makes them.
#[async_trait]
pub trait OcrTransport: Send + Sync {
    /// Multipart upload of the file at `path` with `purpose=ocr`.
    async fn upload_file(&self, path: &Path, filename: &str) -> Result<RawResponse, TransportError>;

    /// Ask for a retrieval URL for an uploaded file, valid for `expiry_secs`.
    async fn request_signed_url(
        &self,
        file_id: &str,
        expiry_secs: u64,
    ) -> Result<RawResponse, TransportError>;

    /// Submit an OCR job.
    async fn submit_ocr(&self, request: &OcrRequest) -> Result<RawResponse, TransportError>;
}

/// `reqwest`-backed client for the Mistral files and OCR endpoints.
pub struct MistralClient {
    http: Client,
    base_url: Url,
    api_key: String,
    timeout_secs: u64,
}

impl fmt::Debug for MistralClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MistralClient")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl MistralClient {
    /// Build a client; every request it sends times out after `timeout_secs`.
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, TransportError> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| TransportError::Request(format!("invalid base URL '{base_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(TransportError::Request(format!(
                "invalid base URL '{base_url}'"
            )));
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("edgequake-ocr2md/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            api_key: api_key.into(),
            timeout_secs,
        })
    }

    /// Build a client from the config's resolved key, base URL and timeout.
    pub fn from_config(config: &OcrConfig) -> Result<Self, StageError> {
        let api_key = config
            .resolved_api_key()
            .ok_or_else(|| StageError::NotConfigured {
                detail: format!(
                    "No API key configured. Set {} or pass --api-key.",
                    crate::config::API_KEY_ENV
                ),
            })?;

        Self::new(&config.base_url, api_key, config.request_timeout_secs).map_err(|e| {
            StageError::NotConfigured {
                detail: e.to_string(),
            }
        })
    }

    /// `base_url` + path segments, each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn classify(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout {
                secs: self.timeout_secs,
            }
        } else {
            TransportError::Request(e.to_string())
        }
    }

    async fn read(&self, response: reqwest::Response) -> Result<RawResponse, TransportError> {
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| self.classify(e))?;
        debug!("Provider answered HTTP {} ({} bytes)", status, body.len());
        Ok(RawResponse { status, body })
    }
}

#[async_trait]
impl OcrTransport for MistralClient {
    async fn upload_file(&self, path: &Path, filename: &str) -> Result<RawResponse, TransportError> {
        let file = tokio::fs::File::open(path).await?;
        let len = file.metadata().await?.len();

        let part = Part::stream_with_length(Body::from(file), len).file_name(filename.to_string());
        let form = Form::new().part("file", part).text("purpose", "ocr");

        let url = self.endpoint(&["files"]);
        debug!("POST {} ({} bytes)", url, len);
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.classify(e))?;
        self.read(response).await
    }

    async fn request_signed_url(
        &self,
        file_id: &str,
        expiry_secs: u64,
    ) -> Result<RawResponse, TransportError> {
        let url = self.endpoint(&["files", file_id, "url"]);
        debug!("GET {} (expiry={}s)", url, expiry_secs);
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.api_key)
            .query(&[("expiry", expiry_secs)])
            .send()
            .await
            .map_err(|e| self.classify(e))?;
        self.read(response).await
    }

    async fn submit_ocr(&self, request: &OcrRequest) -> Result<RawResponse, TransportError> {
        let url = self.endpoint(&["ocr"]);
        debug!("POST {} (model={})", url, request.model);
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;
        self.read(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_response_success_range() {
        assert!(RawResponse::new(200, "").is_success());
        assert!(RawResponse::new(201, "").is_success());
        assert!(!RawResponse::new(199, "").is_success());
        assert!(!RawResponse::new(401, "").is_success());
        assert!(!RawResponse::new(500, "").is_success());
    }

    #[test]
    fn object_str_field_requires_object_member() {
        assert_eq!(object_str_field(r#"{"id":" f-1 "}"#, "id").as_deref(), Some("f-1"));
        for body in [r#"["f-1"]"#, r#"{"id":["f-1"]}"#, r#"{"id":null}"#, r#""f-1""#, "{", ""] {
            assert_eq!(object_str_field(body, "id"), None, "{body}");
        }
    }

    #[test]
    fn endpoint_appends_encoded_segments() {
        let client = MistralClient::new("https://api.mistral.ai/v1/", "k", 60).unwrap();
        assert_eq!(
            client.endpoint(&["files"]).as_str(),
            "https://api.mistral.ai/v1/files"
        );
        assert_eq!(
            client.endpoint(&["files", "abc-123", "url"]).as_str(),
            "https://api.mistral.ai/v1/files/abc-123/url"
        );
        assert_eq!(
            client.endpoint(&["files", "a/b", "url"]).as_str(),
            "https://api.mistral.ai/v1/files/a%2Fb/url"
        );
    }

    #[test]
    fn rejects_unusable_base_url() {
        assert!(MistralClient::new("not a url", "k", 60).is_err());
        assert!(MistralClient::new("mailto:ocr@example.com", "k", 60).is_err());
    }

    #[test]
    fn debug_redacts_key() {
        let client = MistralClient::new("https://api.mistral.ai/v1", "sk-secret", 60).unwrap();
        assert!(!format!("{client:?}").contains("sk-secret"));
    }

    #[test]
    fn from_config_without_key_is_not_configured() {
        let err = MistralClient::from_config(&OcrConfig::default()).unwrap_err();
        assert!(matches!(err, StageError::NotConfigured { .. }));
    }

    #[test]
    fn from_config_uses_explicit_key() {
        let config = OcrConfig::builder().api_key("sk-explicit").build().unwrap();
        assert!(MistralClient::from_config(&config).is_ok());
    }
}
