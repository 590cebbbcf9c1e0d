//! Configuration types for PDF-to-Markdown conversion.
//!
//! All conversion behaviour is controlled through [`OcrConfig`], built via its
//! [`OcrConfigBuilder`]. The config is read-only once built: every
//! conversion borrows it, so one instance can be shared by any number of
//! concurrent conversions (the HTTP endpoint does exactly that).
//!
//! # Design choice: builder over constructor
//! Most callers only set an API key. The builder lets them do that and rely on
//! documented defaults for the rest.

use crate::pipeline::transport::OcrTransport;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Default Mistral API root.
pub const DEFAULT_BASE_URL: &str = "https://api.mistral.ai/v1";

/// Default OCR model.
pub const DEFAULT_MODEL: &str = "mistral-ocr-latest";

/// Environment variable holding the provider API key.
pub const API_KEY_ENV: &str = "MISTRAL_API_KEY";

/// Environment variable overriding [`DEFAULT_BASE_URL`].
pub const BASE_URL_ENV: &str = "MISTRAL_BASE_URL";

/// Environment variable overriding [`DEFAULT_MODEL`].
pub const MODEL_ENV: &str = "MISTRAL_OCR_MODEL";

/// Longest accepted retrieval-URL validity window (one day).
const MAX_URL_EXPIRY_SECS: u64 = 86_400;

/// Builder validation error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for a PDF-to-Markdown conversion.
///
/// # Example
/// ```rust
/// use edgequake_ocr2md::OcrConfig;
///
/// let config = OcrConfig::builder()
///     .api_key("sk-test")
///     .url_expiry_secs(300)
///     .build()
///     .unwrap();
/// assert_eq!(config.model, "mistral-ocr-latest");
/// ```
#[derive(Clone)]
pub struct OcrConfig {
    /// Provider API key. [`OcrConfig::from_env`] and [`OcrConfigBuilder::build`]
    /// fill it from `MISTRAL_API_KEY` when no key was given; conversions never
    /// read the environment themselves.
    pub api_key: Option<String>,

    /// API root, without trailing slash. Default: [`DEFAULT_BASE_URL`].
    pub base_url: String,

    /// OCR model identifier. Default: [`DEFAULT_MODEL`].
    pub model: String,

    /// Validity window requested for the retrieval URL, in seconds. Default: 120.
    ///
    /// The OCR job fetches the document right after submission, so a short
    /// window is enough and limits exposure of the signed URL.
    pub url_expiry_secs: u64,

    /// Timeout applied to every outbound request, in seconds. Default: 60.
    pub request_timeout_secs: u64,

    /// Maximum number of response-body characters kept in diagnostic
    /// details. Default: 500.
    pub snippet_len: usize,

    /// Separator between pages in the assembled Markdown.
    /// Default: [`PageSeparator::HorizontalRule`].
    pub page_separator: PageSeparator,

    /// Pre-constructed transport. Takes precedence over `api_key`/`base_url`.
    pub transport: Option<Arc<dyn OcrTransport>>,

    /// Optional per-stage progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            url_expiry_secs: 120,
            request_timeout_secs: 60,
            snippet_len: 500,
            page_separator: PageSeparator::default(),
            transport: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for OcrConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OcrConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("url_expiry_secs", &self.url_expiry_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("snippet_len", &self.snippet_len)
            .field("page_separator", &self.page_separator)
            .field("transport", &self.transport.as_ref().map(|_| "<dyn OcrTransport>"))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl OcrConfig {
    /// Create a new builder for `OcrConfig`.
    pub fn builder() -> OcrConfigBuilder {
        OcrConfigBuilder {
            config: Self::default(),
        }
    }

    /// Defaults overlaid with `MISTRAL_API_KEY`, `MISTRAL_BASE_URL` and
    /// `MISTRAL_OCR_MODEL` when they are set and non-empty.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(key) = non_empty_env(API_KEY_ENV) {
            config.api_key = Some(key);
        }
        if let Some(url) = non_empty_env(BASE_URL_ENV) {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = non_empty_env(MODEL_ENV) {
            config.model = model;
        }
        config
    }

    /// The configured key, if it is non-blank.
    pub(crate) fn resolved_api_key(&self) -> Option<String> {
        self.api_key.clone().filter(|k| !k.trim().is_empty())
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Builder for [`OcrConfig`].
#[derive(Debug)]
pub struct OcrConfigBuilder {
    config: OcrConfig,
}

impl OcrConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn url_expiry_secs(mut self, secs: u64) -> Self {
        self.config.url_expiry_secs = secs.clamp(1, MAX_URL_EXPIRY_SECS);
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs.max(1);
        self
    }

    pub fn snippet_len(mut self, chars: usize) -> Self {
        self.config.snippet_len = chars;
        self
    }

    pub fn page_separator(mut self, sep: PageSeparator) -> Self {
        self.config.page_separator = sep;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn OcrTransport>) -> Self {
        self.config.transport = Some(transport);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    ///
    /// Without an explicit key, `MISTRAL_API_KEY` is read here, once.
    pub fn build(mut self) -> Result<OcrConfig, ConfigError> {
        if self.config.resolved_api_key().is_none() {
            self.config.api_key = non_empty_env(API_KEY_ENV);
        }
        let c = &self.config;
        if !(c.base_url.starts_with("http://") || c.base_url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "base URL must start with http:// or https://, got '{}'",
                c.base_url
            )));
        }
        if c.model.trim().is_empty() {
            return Err(ConfigError::Invalid("model must not be empty".into()));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How to separate pages in the assembled Markdown output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSeparator {
    /// Horizontal rule: "\n\n---\n\n". (default)
    #[default]
    HorizontalRule,
    /// HTML comment with the number of the page that follows: "<!-- page N -->"
    Comment,
    /// Custom string inserted between pages.
    Custom(String),
}

impl PageSeparator {
    /// Render the separator placed before the given page (1-indexed).
    pub fn render(&self, page_num: usize) -> String {
        match self {
            PageSeparator::HorizontalRule => "\n\n---\n\n".to_string(),
            PageSeparator::Comment => format!("\n\n<!-- page {} -->\n\n", page_num),
            PageSeparator::Custom(s) => format!("\n\n{}\n\n", s),
        }
    }
}
