//! Pipeline stages for PDF-to-Markdown conversion via an OCR provider.
//!
//! Each submodule implements exactly one step. The three provider stages
//! share one seam, [`transport::OcrTransport`], so every stage can be tested
//! with canned responses and no network.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ upload ──▶ signed_url ──▶ ocr ──▶ assemble
//! (stage)   (POST      (GET files/    (POST    (inline images,
//!            files)     {id}/url)      ocr)     join pages)
//! ```
//!
//! 1. [`input`]      : sanitise the filename, reject empty input, stage
//!    in-memory bytes to a temporary file
//! 2. [`upload`]     : multipart upload, yields a [`upload::RemoteFileHandle`]
//! 3. [`signed_url`] : short-lived [`signed_url::RetrievalUrl`] for the file
//! 4. [`ocr`]        : submit the OCR job, parse pages and images
//! 5. [`assemble`]   : pure: placeholders become data URIs, pages are joined
//!
//! Stages 2–4 make exactly one request each and never retry.

pub mod assemble;
pub mod input;
pub mod ocr;
pub mod signed_url;
pub mod transport;
pub mod upload;
