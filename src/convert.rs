//! Conversion entry points: the pipeline orchestrator.
//!
//! Every entry point runs the same four stages strictly in sequence:
//!
//! ```text
//! upload ──▶ retrieval URL ──▶ OCR ──▶ assemble
//! ```
//!
//! The first failing stage ends the run; its [`StageError`] is wrapped in a
//! [`ProcessingFailure`] naming the document. Nothing here is shared between
//! calls except the read-only [`OcrConfig`], so concurrent conversions are
//! independent.

use crate::config::OcrConfig;
use crate::error::{ProcessingFailure, StageError};
use crate::output::{ConversionOutput, ConversionStats};
use crate::pipeline::input::{resolve_local, sanitize_filename, Document};
use crate::pipeline::transport::{MistralClient, OcrTransport};
use crate::pipeline::{assemble, ocr, signed_url, upload};
use crate::progress::Stage;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Convert in-memory PDF bytes to Markdown.
///
/// The bytes are staged to a temporary file for the upload; that file is
/// removed before this function returns, whatever the outcome. `filename` is
/// sanitised; `None` or an unusable name becomes `document.pdf`.
///
/// # Errors
/// - `InvalidInput` (400) for empty bytes, before any network call.
/// - `UploadFailure`, `RetrievalUrlFailure`, `OcrFailure` (500) for the
///   first provider stage that fails. No later stage is attempted.
///
/// # Example
/// ```rust,no_run
/// use edgequake_ocr2md::{convert_bytes, OcrConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes = std::fs::read("invoice.pdf")?;
/// let config = OcrConfig::from_env();
/// let output = convert_bytes(&bytes, Some("invoice.pdf"), &config).await?;
/// println!("{}", output.markdown);
/// # Ok(())
/// # }
/// ```
pub async fn convert_bytes(
    bytes: &[u8],
    filename: Option<&str>,
    config: &OcrConfig,
) -> Result<ConversionOutput, ProcessingFailure> {
    let started = Instant::now();
    let document = Document::new(bytes, filename);
    let name = document.filename().to_string();
    info!("Starting conversion: {} ({} bytes)", name, bytes.len());

    let outcome = async {
        document.validate()?;
        let transport = resolve_transport(config)?;
        let staged = document.stage()?;
        run_pipeline(transport.as_ref(), staged.path(), &name, config, started).await
        // `staged` drops here, deleting the temporary copy.
    }
    .await;

    finish(outcome, name)
}

/// Convert a PDF file on disk. The file is uploaded in place, not copied.
///
/// # Errors
/// `InvalidInput` when the path is missing, unreadable, not a file, or empty;
/// otherwise as [`convert_bytes`].
pub async fn convert_file(
    path: impl AsRef<Path>,
    config: &OcrConfig,
) -> Result<ConversionOutput, ProcessingFailure> {
    let started = Instant::now();
    let path = path.as_ref();
    let name = sanitize_filename(
        &path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    );
    info!("Starting conversion: {}", path.display());

    let outcome = async {
        let (path, _) = resolve_local(path)?;
        let transport = resolve_transport(config)?;
        run_pipeline(transport.as_ref(), &path, &name, config, started).await
    }
    .await;

    finish(outcome, name)
}

/// Synchronous wrapper around [`convert_bytes`].
///
/// Creates a temporary tokio runtime internally; do not call it from inside
/// an async context.
pub fn convert_sync(
    bytes: &[u8],
    filename: Option<&str>,
    config: &OcrConfig,
) -> Result<ConversionOutput, ProcessingFailure> {
    tokio::runtime::Runtime::new()
        .map_err(|e| {
            ProcessingFailure::new(
                sanitize_filename(filename.unwrap_or_default()),
                StageError::Internal {
                    detail: format!("Failed to create tokio runtime: {e}"),
                },
            )
        })?
        .block_on(convert_bytes(bytes, filename, config))
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Pre-built transport if the caller supplied one, else a Mistral client.
fn resolve_transport(config: &OcrConfig) -> Result<Arc<dyn OcrTransport>, StageError> {
    if let Some(ref transport) = config.transport {
        return Ok(Arc::clone(transport));
    }
    Ok(Arc::new(MistralClient::from_config(config)?))
}

/// Upload → retrieval URL → OCR → assemble, stopping at the first failure.
async fn run_pipeline(
    transport: &dyn OcrTransport,
    path: &Path,
    filename: &str,
    config: &OcrConfig,
    started: Instant,
) -> Result<ConversionOutput, StageError> {
    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_start(filename);
    }

    let (file, upload_ms) = run_stage(
        config,
        Stage::Upload,
        upload::upload_document(transport, path, filename, config.snippet_len),
    )
    .await?;

    let (url, retrieval_url_ms) = run_stage(
        config,
        Stage::RetrievalUrl,
        signed_url::request_retrieval_url(
            transport,
            &file,
            config.url_expiry_secs,
            config.snippet_len,
        ),
    )
    .await?;

    let (result, ocr_ms) = run_stage(
        config,
        Stage::Ocr,
        ocr::submit_ocr(transport, &url, &config.model, config.snippet_len),
    )
    .await?;

    let (assembled, assemble_ms) = run_stage(config, Stage::Assemble, async {
        Ok(assemble::assemble(&result, &config.page_separator))
    })
    .await?;

    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_complete(assembled.page_count);
    }

    let stats = ConversionStats {
        upload_ms,
        retrieval_url_ms,
        ocr_ms,
        assemble_ms,
        total_ms: started.elapsed().as_millis() as u64,
        images_reported: result.image_count(),
        images_inlined: assembled.images_inlined,
    };

    info!(
        "Conversion complete: {} → {} pages, {} bytes, {}ms total",
        filename,
        assembled.page_count,
        assembled.markdown.len(),
        stats.total_ms
    );

    Ok(ConversionOutput {
        markdown: assembled.markdown,
        filename: filename.to_string(),
        page_count: assembled.page_count,
        file_id: file.as_str().to_string(),
        model: config.model.clone(),
        stats,
    })
}

/// Await one stage, reporting it to the progress callback and timing it.
async fn run_stage<T>(
    config: &OcrConfig,
    stage: Stage,
    fut: impl Future<Output = Result<T, StageError>>,
) -> Result<(T, u64), StageError> {
    let cb = config.progress_callback.as_ref();
    if let Some(cb) = cb {
        cb.on_stage_start(stage);
    }
    debug!("{}…", stage);

    let start = Instant::now();
    match fut.await {
        Ok(value) => {
            let elapsed_ms = start.elapsed().as_millis() as u64;
            if let Some(cb) = cb {
                cb.on_stage_complete(stage, elapsed_ms);
            }
            Ok((value, elapsed_ms))
        }
        Err(e) => {
            if let Some(cb) = cb {
                cb.on_stage_error(stage, &e.to_string());
            }
            Err(e)
        }
    }
}

/// Wrap a stage error for the caller, logging the detail for operators.
fn finish(
    outcome: Result<ConversionOutput, StageError>,
    filename: String,
) -> Result<ConversionOutput, ProcessingFailure> {
    outcome.map_err(|cause| {
        let failure = ProcessingFailure::new(filename, cause);
        warn!(
            kind = %failure.kind(),
            detail = failure.detail().as_deref().unwrap_or("-"),
            "{}",
            failure
        );
        failure
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, TransportError};
    use crate::pipeline::ocr::OcrRequest;
    use crate::pipeline::transport::RawResponse;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Answers every call with a canned response and records what it saw.
    struct CannedTransport {
        upload: RawResponse,
        signed_url: RawResponse,
        ocr: RawResponse,
        upload_paths: Mutex<Vec<PathBuf>>,
        calls: Mutex<Vec<&'static str>>,
    }

    impl CannedTransport {
        fn ok() -> Self {
            Self {
                upload: RawResponse::new(200, r#"{"id":"file-1"}"#),
                signed_url: RawResponse::new(200, r#"{"url":"https://signed.example/file-1"}"#),
                ocr: RawResponse::new(
                    200,
                    r#"{"pages":[{"markdown":"A ![x](x) B","images":[{"id":"x","image_base64":"base64data"}]},{"markdown":"C","images":[]}]}"#,
                ),
                upload_paths: Mutex::new(Vec::new()),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl OcrTransport for CannedTransport {
        async fn upload_file(&self, path: &Path, _filename: &str) -> Result<RawResponse, TransportError> {
            self.calls.lock().unwrap().push("upload");
            assert!(path.exists(), "staged file must exist during upload");
            self.upload_paths.lock().unwrap().push(path.to_path_buf());
            Ok(self.upload.clone())
        }

        async fn request_signed_url(&self, _id: &str, _expiry: u64) -> Result<RawResponse, TransportError> {
            self.calls.lock().unwrap().push("signed_url");
            Ok(self.signed_url.clone())
        }

        async fn submit_ocr(&self, _request: &OcrRequest) -> Result<RawResponse, TransportError> {
            self.calls.lock().unwrap().push("ocr");
            Ok(self.ocr.clone())
        }
    }

    fn config_with(transport: Arc<CannedTransport>) -> OcrConfig {
        OcrConfig::builder().transport(transport).build().unwrap()
    }

    #[tokio::test]
    async fn happy_path_assembles_and_cleans_up() {
        let transport = Arc::new(CannedTransport::ok());
        let config = config_with(transport.clone());

        let out = convert_bytes(b"%PDF-1.7", Some("scan.pdf"), &config).await.unwrap();

        assert_eq!(out.markdown, "A ![x](data:image/jpeg;base64,base64data) B\n\n---\n\nC");
        assert_eq!(out.page_count, 2);
        assert_eq!(out.file_id, "file-1");
        assert_eq!(out.filename, "scan.pdf");
        assert_eq!(out.stats.images_reported, 1);
        assert_eq!(out.stats.images_inlined, 1);
        assert_eq!(*transport.calls.lock().unwrap(), vec!["upload", "signed_url", "ocr"]);

        let staged = transport.upload_paths.lock().unwrap()[0].clone();
        assert!(!staged.exists(), "staged copy must be deleted after success");
    }

    #[tokio::test]
    async fn failure_still_removes_staged_copy() {
        let mut canned = CannedTransport::ok();
        canned.ocr = RawResponse::new(503, "overloaded");
        let transport = Arc::new(canned);
        let config = config_with(transport.clone());

        let err = convert_bytes(b"%PDF-1.7", Some("scan.pdf"), &config).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OcrFailure);
        assert_eq!(err.detail().as_deref(), Some("HTTP 503: overloaded"));

        let staged = transport.upload_paths.lock().unwrap()[0].clone();
        assert!(!staged.exists(), "staged copy must be deleted after failure");
    }

    #[tokio::test]
    async fn empty_bytes_rejected_without_transport() {
        // No transport and no API key: validation must fail first.
        let config = OcrConfig::default();
        let err = convert_bytes(b"", Some("empty.pdf"), &config).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.filename, "empty.pdf");
    }

    #[tokio::test]
    async fn convert_file_uploads_in_place() {
        let transport = Arc::new(CannedTransport::ok());
        let config = config_with(transport.clone());

        let mut f = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        std::io::Write::write_all(&mut f, b"%PDF-1.4").unwrap();

        let out = convert_file(f.path(), &config).await.unwrap();
        assert_eq!(out.page_count, 2);
        assert_eq!(transport.upload_paths.lock().unwrap()[0], f.path());
        assert!(f.path().exists(), "caller's file must not be deleted");
    }

    #[tokio::test]
    async fn convert_file_missing_is_invalid_input() {
        let transport = Arc::new(CannedTransport::ok());
        let config = config_with(transport.clone());

        let err = convert_file("/no/such/dir/report.pdf", &config).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(err.filename, "report.pdf");
        assert!(transport.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn convert_sync_runs_pipeline() {
        let transport = Arc::new(CannedTransport::ok());
        let config = config_with(transport);
        let out = convert_sync(b"%PDF-1.7", None, &config).unwrap();
        assert_eq!(out.filename, "document.pdf");
        assert_eq!(out.page_count, 2);
    }
}
