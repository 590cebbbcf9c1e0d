//! OCR submission stage: run the provider's OCR model on a retrieval URL.
//!
//! The request always asks for `include_image_base64: true` so figures come
//! back inline and can be embedded in the Markdown as data URIs.
//!
//! ## Response leniency
//!
//! The outer shape is strict: the body must be a JSON object and `pages`, when
//! present, must be an array of objects. Inside a page everything is lenient.
//! A missing, `null` or non-string `markdown` is an empty page, and an image
//! entry with a missing or non-string `id`/`image_base64` is kept as `None`
//! and later skipped by the assembler. One odd figure should not cost the
//! caller the whole document.

use crate::error::{http_detail, snippet, StageError};
use crate::pipeline::signed_url::RetrievalUrl;
use crate::pipeline::transport::OcrTransport;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// JSON body of `POST /ocr`.
#[derive(Debug, Clone, Serialize)]
pub struct OcrRequest {
    pub model: String,
    pub document: DocumentRef,
    pub include_image_base64: bool,
}

/// The `document` member of an [`OcrRequest`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DocumentRef {
    DocumentUrl { document_url: String },
}

impl OcrRequest {
    pub fn new(url: &RetrievalUrl, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            document: DocumentRef::DocumentUrl {
                document_url: url.as_str().to_string(),
            },
            include_image_base64: true,
        }
    }
}

/// One image reference extracted from a page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct OcrImage {
    #[serde(default, deserialize_with = "string_or_none")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "string_or_none")]
    pub image_base64: Option<String>,
}

/// One page of OCR output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct OcrPage {
    #[serde(default, deserialize_with = "string_or_empty")]
    pub markdown: String,
    #[serde(default, deserialize_with = "lenient_images")]
    pub images: Vec<OcrImage>,
}

/// Ordered OCR output, in provider page order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct OcrResult {
    #[serde(default)]
    pub pages: Vec<OcrPage>,
}

impl OcrResult {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Total image entries reported, usable or not.
    pub fn image_count(&self) -> usize {
        self.pages.iter().map(|p| p.images.len()).sum()
    }
}

/// Submit the OCR job for `url` and parse the per-page result.
pub async fn submit_ocr(
    transport: &dyn OcrTransport,
    url: &RetrievalUrl,
    model: &str,
    snippet_len: usize,
) -> Result<OcrResult, StageError> {
    let request = OcrRequest::new(url, model);
    let response = transport
        .submit_ocr(&request)
        .await
        .map_err(|e| StageError::OcrFailed {
            detail: e.to_string(),
        })?;

    if !response.is_success() {
        let detail = http_detail(response.status, &response.body, snippet_len);
        warn!("OCR job rejected: {}", detail);
        return Err(StageError::OcrFailed { detail });
    }

    let result = parse_ocr_response(&response.body, snippet_len)?;
    debug!(
        "OCR returned {} pages, {} images",
        result.page_count(),
        result.image_count()
    );
    Ok(result)
}

/// Parse the `POST /ocr` body. The top level must be a JSON object.
pub fn parse_ocr_response(body: &str, snippet_len: usize) -> Result<OcrResult, StageError> {
    let value: Value = serde_json::from_str(body).map_err(|e| StageError::OcrFailed {
        detail: format!("malformed JSON ({e}): {}", snippet(body, snippet_len)),
    })?;

    if !value.is_object() {
        return Err(StageError::OcrFailed {
            detail: format!("expected a JSON object: {}", snippet(body, snippet_len)),
        });
    }

    serde_json::from_value(value).map_err(|e| StageError::OcrFailed {
        detail: format!("unexpected response shape: {e}"),
    })
}

// ── Lenient field decoders ───────────────────────────────────────────────

fn string_or_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        _ => None,
    })
}

fn string_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(string_or_none(deserializer)?.unwrap_or_default())
}

/// Anything but an array becomes "no images"; non-object entries become
/// empty images, which the assembler skips.
fn lenient_images<'de, D>(deserializer: D) -> Result<Vec<OcrImage>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| serde_json::from_value(item).unwrap_or_default())
            .collect(),
        _ => Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::signed_url::retrieval_url;

    #[test]
    fn request_body_shape() {
        let req = OcrRequest::new(&retrieval_url("https://f.example/x?sig=1"), "mistral-ocr-latest");
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "model": "mistral-ocr-latest",
                "document": {
                    "type": "document_url",
                    "document_url": "https://f.example/x?sig=1"
                },
                "include_image_base64": true
            })
        );
    }

    #[test]
    fn parses_pages_in_order() {
        let body = r#"{
            "pages": [
                {"index": 0, "markdown": "one ![img-0.jpeg](img-0.jpeg)",
                 "images": [{"id": "img-0.jpeg", "image_base64": "AAAA", "top_left_x": 1}]},
                {"index": 1, "markdown": "two", "images": []}
            ],
            "model": "mistral-ocr-2505",
            "usage_info": {"pages_processed": 2}
        }"#;
        let result = parse_ocr_response(body, 500).unwrap();
        assert_eq!(result.page_count(), 2);
        assert_eq!(result.pages[0].markdown, "one ![img-0.jpeg](img-0.jpeg)");
        assert_eq!(result.pages[0].images[0].id.as_deref(), Some("img-0.jpeg"));
        assert_eq!(result.pages[0].images[0].image_base64.as_deref(), Some("AAAA"));
        assert_eq!(result.pages[1].markdown, "two");
    }

    #[test]
    fn missing_fields_are_empty() {
        let body = r#"{"pages": [
            {},
            {"markdown": null, "images": null},
            {"markdown": 7, "images": [{"id": 3, "image_base64": null}, "junk"]}
        ]}"#;
        let result = parse_ocr_response(body, 500).unwrap();
        assert_eq!(result.page_count(), 3);
        assert!(result.pages.iter().all(|p| p.markdown.is_empty()));
        assert_eq!(result.pages[2].images, vec![OcrImage::default(), OcrImage::default()]);
    }

    #[test]
    fn missing_pages_is_zero_pages() {
        let result = parse_ocr_response(r#"{"model": "m"}"#, 500).unwrap();
        assert_eq!(result.page_count(), 0);
    }

    #[test]
    fn rejects_non_object_and_malformed() {
        for body in ["[]", "\"text\"", "42", "{not json", "", r#"{"pages": "nope"}"#, r#"{"pages": [1, 2]}"#] {
            assert!(
                matches!(parse_ocr_response(body, 500), Err(StageError::OcrFailed { .. })),
                "{body}"
            );
        }
    }
}
