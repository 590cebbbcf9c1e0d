//! Input handling: documents, filenames, and the local staging copy.
//!
//! ## Why stage in-memory bytes to a temp file?
//!
//! The upload stage streams a file from disk, so a document that arrives as a
//! byte buffer (HTTP body, database blob) is written to a [`NamedTempFile`]
//! first. The file lives inside a [`StagedDocument`] and is deleted when that
//! guard is dropped: on success, on any stage failure, and on panic. Inputs
//! that already are files are uploaded in place and never copied.
//!
//! Display filenames come from callers and end up in multipart headers and
//! log lines, so they are reduced to a plain basename first.

use crate::error::StageError;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Name used when the caller's filename is missing or sanitises to nothing.
pub const DEFAULT_FILENAME: &str = "document.pdf";

/// Longest display filename kept, in characters.
pub const MAX_FILENAME_LEN: usize = 255;

/// Extensions longer than this are not treated as extensions when truncating.
const MAX_EXTENSION_LEN: usize = 16;

/// A document to convert: borrowed bytes plus a sanitised display name.
#[derive(Debug, Clone)]
pub struct Document<'a> {
    bytes: &'a [u8],
    filename: String,
}

impl<'a> Document<'a> {
    pub fn new(bytes: &'a [u8], filename: Option<&str>) -> Self {
        Self {
            bytes,
            filename: sanitize_filename(filename.unwrap_or_default()),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        self.bytes
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Reject empty content before anything touches the network.
    pub fn validate(&self) -> Result<(), StageError> {
        if self.bytes.is_empty() {
            return Err(StageError::InvalidInput {
                reason: "document is empty".into(),
            });
        }
        if !self.bytes.starts_with(b"%PDF") {
            warn!(
                "'{}' does not start with %PDF; the provider may reject it",
                self.filename
            );
        }
        Ok(())
    }

    /// Write the bytes to a temporary file that is removed on drop.
    pub fn stage(&self) -> Result<StagedDocument, StageError> {
        let mut file = tempfile::Builder::new()
            .prefix("ocr2md-")
            .suffix(".pdf")
            .tempfile()
            .map_err(|source| StageError::Staging { source })?;
        file.write_all(self.bytes)
            .and_then(|_| file.flush())
            .map_err(|source| StageError::Staging { source })?;

        debug!(
            "Staged '{}' ({} bytes) at {}",
            self.filename,
            self.bytes.len(),
            file.path().display()
        );
        Ok(StagedDocument { file })
    }
}

/// Scope guard owning the temporary copy of an in-memory document.
#[derive(Debug)]
pub struct StagedDocument {
    file: NamedTempFile,
}

impl StagedDocument {
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

impl Drop for StagedDocument {
    fn drop(&mut self) {
        debug!("Releasing staged copy {}", self.file.path().display());
    }
}

/// Reduce a caller-supplied filename to a safe basename.
///
/// Drops any directory part (`/` or `\`), control characters and surrounding
/// whitespace, caps the length at [`MAX_FILENAME_LEN`] characters while
/// keeping a short extension, and falls back to [`DEFAULT_FILENAME`] when
/// nothing usable is left.
///
/// ```rust
/// use edgequake_ocr2md::pipeline::input::sanitize_filename;
///
/// assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
/// assert_eq!(sanitize_filename(".."), "document.pdf");
/// ```
pub fn sanitize_filename(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter(|&c| !c.is_control() && !is_bidi_control(c))
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        return DEFAULT_FILENAME.to_string();
    }

    if cleaned.chars().count() <= MAX_FILENAME_LEN {
        return cleaned.to_string();
    }

    match cleaned.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty() && !ext.is_empty() && ext.chars().count() <= MAX_EXTENSION_LEN =>
        {
            let keep = MAX_FILENAME_LEN - ext.chars().count() - 1;
            let stem: String = stem.chars().take(keep).collect();
            format!("{stem}.{ext}")
        }
        _ => cleaned.chars().take(MAX_FILENAME_LEN).collect(),
    }
}

/// U+202A..=U+202E and U+2066..=U+2069: they reorder how the name displays.
fn is_bidi_control(c: char) -> bool {
    matches!(c, '\u{202A}'..='\u{202E}' | '\u{2066}'..='\u{2069}')
}

/// Check that a local file exists, is readable and non-empty.
///
/// Returns the path and its sanitised display filename.
pub fn resolve_local(path: &Path) -> Result<(PathBuf, String), StageError> {
    let invalid = |reason: String| StageError::InvalidInput { reason };

    let meta = std::fs::metadata(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => {
            invalid(format!("permission denied reading '{}'", path.display()))
        }
        _ => invalid(format!("file not found: '{}'", path.display())),
    })?;
    if !meta.is_file() {
        return Err(invalid(format!("'{}' is not a file", path.display())));
    }
    if meta.len() == 0 {
        return Err(invalid(format!("'{}' is empty", path.display())));
    }
    std::fs::File::open(path)
        .map_err(|e| invalid(format!("cannot open '{}': {e}", path.display())))?;

    let filename = sanitize_filename(
        &path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    );
    debug!("Resolved local document: {}", path.display());
    Ok((path.to_path_buf(), filename))
}

/// Where the CLI reads its document from.
#[derive(Debug)]
pub enum InputSource {
    /// A local file, uploaded in place.
    Local(PathBuf),
    /// A URL, downloaded into memory.
    Downloaded { bytes: Vec<u8>, filename: String },
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a path or HTTP(S) URL given on the command line.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<InputSource, StageError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        let (path, _) = resolve_local(Path::new(input))?;
        Ok(InputSource::Local(path))
    }
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<InputSource, StageError> {
    info!("Downloading document from: {}", url);
    let failed = |reason: String| StageError::InvalidInput {
        reason: format!("failed to download '{url}': {reason}"),
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            failed(format!("timed out after {timeout_secs}s"))
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let filename = filename_from_url(url);
    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
    info!("Downloaded {} bytes as '{}'", bytes.len(), filename);

    Ok(InputSource::Downloaded {
        bytes: bytes.to_vec(),
        filename,
    })
}

/// Last non-empty path segment of the URL, sanitised.
fn filename_from_url(url: &str) -> String {
    let last = reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .unwrap_or_default();
    sanitize_filename(&last)
}
