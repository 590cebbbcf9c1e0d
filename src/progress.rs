//! Progress-callback trait for per-stage conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::OcrConfigBuilder::progress_callback`] to be told when each
//! pipeline stage starts, finishes or fails. The CLI drives its spinner from
//! these events; a server can forward them to its logs.
//!
//! # Example
//!
//! ```rust
//! use edgequake_ocr2md::{ConversionProgressCallback, OcrConfig, Stage};
//! use std::sync::{Arc, Mutex};
//!
//! #[derive(Default)]
//! struct StageLog(Mutex<Vec<Stage>>);
//!
//! impl ConversionProgressCallback for StageLog {
//!     fn on_stage_complete(&self, stage: Stage, _elapsed_ms: u64) {
//!         self.0.lock().unwrap().push(stage);
//!     }
//! }
//!
//! let config = OcrConfig::builder()
//!     .progress_callback(Arc::new(StageLog::default()))
//!     .build()
//!     .unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// One step of the conversion pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Upload,
    RetrievalUrl,
    Ocr,
    Assemble,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Stage::Upload => "Uploading document",
            Stage::RetrievalUrl => "Requesting retrieval URL",
            Stage::Ocr => "Running OCR",
            Stage::Assemble => "Assembling Markdown",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Called by the conversion pipeline as it moves through its stages.
///
/// Stages run strictly one after another, but several conversions may share
/// one callback (e.g. a server config), so implementations must be
/// `Send + Sync`. All methods default to no-ops.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once, after input validation, before the first stage.
    fn on_conversion_start(&self, filename: &str) {
        let _ = filename;
    }

    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        let _ = (stage, elapsed_ms);
    }

    /// Called when a stage fails. No further stage is started afterwards.
    ///
    /// `error` is the user-facing summary, never the diagnostic detail.
    fn on_stage_error(&self, stage: Stage, error: &str) {
        let _ = (stage, error);
    }

    /// Called once after the Markdown has been assembled.
    fn on_conversion_complete(&self, page_count: usize) {
        let _ = page_count;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::OcrConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
