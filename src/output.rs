//! Result types returned by the `convert*` entry points.

use serde::{Deserialize, Serialize};

/// A completed conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// Assembled Markdown with images inlined as data URIs.
    pub markdown: String,
    /// Sanitised display filename of the source document.
    pub filename: String,
    /// Number of pages reported by the provider.
    pub page_count: usize,
    /// Provider file id of the upload. Valid only briefly on the provider side.
    pub file_id: String,
    /// OCR model the job was submitted with.
    pub model: String,
    pub stats: ConversionStats,
}

/// Wall-clock timings and image counts for one conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStats {
    pub upload_ms: u64,
    pub retrieval_url_ms: u64,
    pub ocr_ms: u64,
    pub assemble_ms: u64,
    pub total_ms: u64,
    /// Image entries the provider returned, usable or not.
    pub images_reported: usize,
    /// Placeholders replaced by a data URI.
    pub images_inlined: usize,
}
