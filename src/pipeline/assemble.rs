//! Markdown assembly: inline OCR images and join pages.
//!
//! Mistral OCR references each extracted figure with a placeholder whose alt
//! text and target are both the image id, e.g. `![img-0.jpeg](img-0.jpeg)`,
//! and returns the pixels separately as base64. This stage swaps the first
//! occurrence of each placeholder for a `data:` URI so the Markdown is
//! self-contained, then joins the pages in provider order.
//!
//! The stage is pure and lenient. A page whose substitution fails keeps its
//! original text (all-or-nothing per page) and the failure is logged, never
//! returned.

use crate::config::PageSeparator;
use crate::pipeline::ocr::{OcrPage, OcrResult};
use regex::{NoExpand, Regex};
use std::borrow::Cow;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Prefix applied to payloads that are not already a data URI.
pub const JPEG_DATA_URI_PREFIX: &str = "data:image/jpeg;base64,";

/// Result of [`assemble`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssembledMarkdown {
    pub markdown: String,
    pub page_count: usize,
    /// Placeholders actually replaced by a data URI.
    pub images_inlined: usize,
}

/// Assemble with the default horizontal-rule separator.
///
/// ```rust
/// use edgequake_ocr2md::{assemble_markdown, OcrResult};
///
/// assert_eq!(assemble_markdown(&OcrResult::default()), "");
/// ```
pub fn assemble_markdown(result: &OcrResult) -> String {
    assemble(result, &PageSeparator::default()).markdown
}

/// Inline images page by page and join pages with `separator`.
///
/// Emits exactly `pages - 1` separators; zero pages yield an empty string.
pub fn assemble(result: &OcrResult, separator: &PageSeparator) -> AssembledMarkdown {
    let mut markdown = String::new();
    let mut images_inlined = 0;

    for (idx, page) in result.pages.iter().enumerate() {
        let page_num = idx + 1;
        if idx > 0 {
            markdown.push_str(&separator.render(page_num));
        }
        let (text, inlined) = render_page(page, page_num);
        images_inlined += inlined;
        markdown.push_str(&text);
    }

    debug!(
        "Assembled {} pages, {} images inlined, {} bytes",
        result.pages.len(),
        images_inlined,
        markdown.len()
    );

    AssembledMarkdown {
        markdown,
        page_count: result.pages.len(),
        images_inlined,
    }
}

/// Page text with its images inlined, plus the number of substitutions made.
fn render_page(page: &OcrPage, page_num: usize) -> (Cow<'_, str>, usize) {
    let images = usable_images(page);
    if page.markdown.is_empty() || images.is_empty() {
        return (Cow::Borrowed(page.markdown.as_str()), 0);
    }

    match inline_images(&page.markdown, &images) {
        Ok((text, inlined)) => (Cow::Owned(text), inlined),
        Err(e) => {
            warn!(
                "Page {}: image substitution failed, keeping original text: {}",
                page_num, e
            );
            (Cow::Borrowed(page.markdown.as_str()), 0)
        }
    }
}

/// `(id, payload)` pairs worth substituting: both present and non-blank.
/// The first entry of a duplicated id wins.
fn usable_images(page: &OcrPage) -> Vec<(&str, &str)> {
    let mut seen = HashSet::new();
    page.images
        .iter()
        .filter_map(|img| {
            let id = img.id.as_deref().filter(|s| !s.trim().is_empty())?;
            let payload = img.image_base64.as_deref().filter(|s| !s.trim().is_empty())?;
            Some((id, payload))
        })
        .filter(|(id, _)| seen.insert(*id))
        .collect()
}

/// Replace the first `![id](id)` of each image on a working copy.
fn inline_images(markdown: &str, images: &[(&str, &str)]) -> Result<(String, usize), regex::Error> {
    let mut text = markdown.to_string();
    let mut inlined = 0;

    for (id, payload) in images {
        let placeholder = Regex::new(&regex::escape(&format!("![{id}]({id})")))?;
        if !placeholder.is_match(&text) {
            continue;
        }
        let replacement = format!("![{}]({})", escape_html(id), data_uri(payload));
        text = placeholder
            .replacen(&text, 1, NoExpand(&replacement))
            .into_owned();
        inlined += 1;
    }

    Ok((text, inlined))
}

fn data_uri(payload: &str) -> Cow<'_, str> {
    if payload.starts_with("data:image/") {
        Cow::Borrowed(payload)
    } else {
        Cow::Owned(format!("{JPEG_DATA_URI_PREFIX}{payload}"))
    }
}

fn escape_html(s: &str) -> Cow<'_, str> {
    if !s.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}
