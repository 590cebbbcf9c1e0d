//! HTTP endpoint exposing the conversion pipeline.
//!
//! | Method | Path          | Body                          | Response |
//! |--------|---------------|-------------------------------|----------|
//! | POST   | `/v1/convert` | multipart, PDF in field `file` | `{markdown, pages, filename}` |
//! | GET    | `/health`     | (none)                        | `{status, version}` |
//!
//! Failures answer with [`ErrorBody`]: status 400 for invalid input and 500
//! for everything else. The provider's status and response snippet are logged
//! for every failure but only sent to the client when
//! [`ServerState::expose_error_detail`] is set.

use crate::config::OcrConfig;
use crate::convert::convert_bytes;
use crate::error::{ErrorBody, ProcessingFailure, StageError};
use crate::pipeline::input::sanitize_filename;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

/// Default cap on the request body: 50 MB of PDF plus multipart overhead.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 55 * 1024 * 1024;

/// Shared, read-only state of the endpoint.
#[derive(Debug, Clone)]
pub struct ServerState {
    pub config: OcrConfig,
    /// Include `detail` in error bodies. Off by default: details may carry
    /// provider response text.
    pub expose_error_detail: bool,
    pub max_upload_bytes: usize,
}

impl ServerState {
    pub fn new(config: OcrConfig) -> Self {
        Self {
            config,
            expose_error_detail: false,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn expose_error_detail(mut self, expose: bool) -> Self {
        self.expose_error_detail = expose;
        self
    }

    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.max_upload_bytes = bytes;
        self
    }
}

/// `200` body of `POST /v1/convert`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertResponse {
    pub markdown: String,
    pub pages: usize,
    pub filename: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Build the router. Mount it under any prefix, or hand it to [`serve`].
pub fn router(state: ServerState) -> Router {
    let limit = state.max_upload_bytes;
    Router::new()
        .route("/v1/convert", post(convert_upload))
        .route("/health", get(health_check))
        .layer(DefaultBodyLimit::max(limit))
        .with_state(Arc::new(state))
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(addr: SocketAddr, state: ServerState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "OCR endpoint listening");
    axum::serve(listener, router(state)).await
}

// ── Handlers ─────────────────────────────────────────────────────────────

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn convert_upload(State(state): State<Arc<ServerState>>, multipart: Multipart) -> Response {
    let (filename, bytes) = match read_file_field(multipart).await {
        Ok(upload) => upload,
        Err(failure) => return failure_response(&state, failure),
    };

    match convert_bytes(&bytes, Some(&filename), &state.config).await {
        Ok(output) => Json(ConvertResponse {
            markdown: output.markdown,
            pages: output.page_count,
            filename: output.filename,
        })
        .into_response(),
        Err(failure) => failure_response(&state, failure),
    }
}

/// Pull the `file` part out of the form; other fields are ignored.
async fn read_file_field(mut multipart: Multipart) -> Result<(String, Vec<u8>), ProcessingFailure> {
    let invalid = |filename: &str, reason: String| {
        ProcessingFailure::new(sanitize_filename(filename), StageError::InvalidInput { reason })
    };

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Err(invalid("", "no 'file' field in the form".into())),
            Err(e) => return Err(invalid("", format!("malformed multipart body: {e}"))),
        };
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| invalid(&filename, format!("failed to read file data: {e}")))?;
        return Ok((sanitize_filename(&filename), bytes.to_vec()));
    }
}

fn failure_response(state: &ServerState, failure: ProcessingFailure) -> Response {
    warn!(
        kind = %failure.kind(),
        detail = failure.detail().as_deref().unwrap_or("-"),
        "Request failed: {}",
        failure
    );
    let status =
        StatusCode::from_u16(failure.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body: ErrorBody = failure.to_body(state.expose_error_detail);
    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::pipeline::ocr::OcrRequest;
    use crate::pipeline::transport::{OcrTransport, RawResponse};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::path::Path;
    use tower::ServiceExt;

    const BOUNDARY: &str = "ocr2md-test-boundary";

    struct StubTransport {
        upload_status: u16,
    }

    #[async_trait]
    impl OcrTransport for StubTransport {
        async fn upload_file(&self, _path: &Path, _filename: &str) -> Result<RawResponse, TransportError> {
            if self.upload_status == 200 {
                Ok(RawResponse::new(200, r#"{"id":"file-1"}"#))
            } else {
                Ok(RawResponse::new(self.upload_status, r#"{"message":"Unauthorized"}"#))
            }
        }

        async fn request_signed_url(&self, _id: &str, _expiry: u64) -> Result<RawResponse, TransportError> {
            Ok(RawResponse::new(200, r#"{"url":"https://signed.example/f"}"#))
        }

        async fn submit_ocr(&self, _request: &OcrRequest) -> Result<RawResponse, TransportError> {
            Ok(RawResponse::new(
                200,
                r#"{"pages":[{"markdown":"one","images":[]},{"markdown":"two","images":[]}]}"#,
            ))
        }
    }

    fn app(upload_status: u16, expose: bool) -> Router {
        let config = OcrConfig::builder()
            .transport(Arc::new(StubTransport { upload_status }))
            .build()
            .unwrap();
        router(ServerState::new(config).expose_error_detail(expose))
    }

    fn multipart_request(field: &str, filename: &str, content: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/pdf\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/v1/convert")
            .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_version() {
        let response = app(200, false)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn convert_returns_markdown() {
        let response = app(200, false)
            .oneshot(multipart_request("file", "../scan.pdf", b"%PDF-1.7"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["markdown"], "one\n\n---\n\ntwo");
        assert_eq!(body["pages"], 2);
        assert_eq!(body["filename"], "scan.pdf");
    }

    #[tokio::test]
    async fn empty_file_is_bad_request() {
        let response = app(200, false)
            .oneshot(multipart_request("file", "empty.pdf", b""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], 400);
        assert_eq!(body["error"]["kind"], "invalid_input");
    }

    #[tokio::test]
    async fn missing_file_field_is_bad_request() {
        let response = app(200, false)
            .oneshot(multipart_request("attachment", "a.pdf", b"%PDF-1.7"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn provider_failure_hides_detail_by_default() {
        let response = app(401, false)
            .oneshot(multipart_request("file", "a.pdf", b"%PDF-1.7"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["error"]["kind"], "upload_failure");
        assert!(body["error"].get("detail").is_none());
        assert!(!body["error"]["message"].as_str().unwrap().contains("Unauthorized"));
    }

    #[tokio::test]
    async fn provider_failure_detail_when_exposed() {
        let response = app(401, true)
            .oneshot(multipart_request("file", "a.pdf", b"%PDF-1.7"))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(
            body["error"]["detail"],
            "HTTP 401: {\"message\":\"Unauthorized\"}"
        );
    }
}
