//! # edgequake-ocr2md
//!
//! Convert PDF documents to Markdown with the Mistral OCR API.
//!
//! ## Why this crate?
//!
//! Mistral OCR reads scanned and born-digital PDFs alike and returns one
//! Markdown string per page, with figures referenced by placeholder and
//! shipped separately as base64. Getting from a PDF to a single,
//! self-contained Markdown document takes three provider round-trips and a
//! substitution pass; this crate wraps them in one call.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input     validate, sanitise filename, stage bytes to a temp file
//!  ├─ 2. Upload    POST /files (multipart, purpose=ocr) → file id
//!  ├─ 3. URL       GET /files/{id}/url?expiry=N → short-lived retrieval URL
//!  ├─ 4. OCR       POST /ocr (document_url, include_image_base64) → pages
//!  └─ 5. Assemble  inline images as data URIs, join pages
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_ocr2md::{convert_file, OcrConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // API key read from MISTRAL_API_KEY
//!     let config = OcrConfig::from_env();
//!     let output = convert_file("document.pdf", &config).await?;
//!     println!("{}", output.markdown);
//!     eprintln!("{} pages in {}ms", output.page_count, output.stats.total_ms);
//!     Ok(())
//! }
//! ```
//!
//! ## Errors
//!
//! Every entry point returns [`ProcessingFailure`]. Its message names the
//! document and the failed stage only; the provider's status and response
//! snippet are available through [`ProcessingFailure::detail`] and are
//! logged at `warn`.
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | Enables the `ocr2md` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `server` | off     | Adds [`server`]: `POST /v1/convert` on axum, and `ocr2md --serve` |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-ocr2md = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
#[cfg(feature = "server")]
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConfigError, OcrConfig, OcrConfigBuilder, PageSeparator};
pub use convert::{convert_bytes, convert_file, convert_sync};
pub use error::{ErrorBody, ErrorKind, ErrorObject, ProcessingFailure, StageError, TransportError};
pub use output::{ConversionOutput, ConversionStats};
pub use pipeline::assemble::{assemble, assemble_markdown, AssembledMarkdown};
pub use pipeline::ocr::{parse_ocr_response, OcrImage, OcrPage, OcrRequest, OcrResult};
pub use pipeline::transport::{MistralClient, OcrTransport, RawResponse};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback, Stage};
