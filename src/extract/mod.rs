//! Turns a document reference into plain text.
//!
//! Every call re-runs the full extraction. Callers that extract
//! several documents at once should use `extract_all` so that each
//! one resolves or fails on its own.

pub mod pdf;

use std::path::Path;

use futures::future::join_all;
use http::header::CONTENT_TYPE;
use thiserror::Error;

pub use pdf::{MAX_PAGES, TRUNCATION_NOTICE};

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },
    #[error("Failed to read {path}: {reason}")]
    Read { path: String, reason: String },
    #[error("Failed to decode PDF {name}: {reason}")]
    Pdf { name: String, reason: String },
    #[error("{name} is an HTML page, not a document")]
    UnexpectedHtml { name: String },
    #[error("{name} is not a text document")]
    NotText { name: String },
}

/// A document that can be turned into text, either remote or
/// supplied locally.
#[derive(Clone, Debug)]
pub enum DocumentSource {
    Url(String),
    File { name: String, bytes: Vec<u8> },
}

impl DocumentSource {
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ExtractionError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ExtractionError::Read {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::File { name, bytes })
    }

    /// Treats anything that looks like an http(s) URL as remote and
    /// everything else as a local path.
    pub async fn parse(reference: &str) -> Result<Self, ExtractionError> {
        if reference.starts_with("http://") || reference.starts_with("https://") {
            Ok(Self::Url(reference.to_string()))
        } else {
            Self::from_path(reference).await
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Url(url) => url
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .filter(|s| !s.is_empty())
                .unwrap_or(url.as_str()),
            Self::File { name, .. } => name,
        }
    }
}

pub async fn extract(source: &DocumentSource) -> Result<String, ExtractionError> {
    let name = source.name().to_string();
    let (bytes, content_type) = match source {
        DocumentSource::Url(url) => fetch(url).await?,
        DocumentSource::File { bytes, .. } => (bytes.clone(), None),
    };

    let declared_pdf = name.to_lowercase().ends_with(".pdf")
        || content_type
            .as_deref()
            .is_some_and(|t| t.starts_with("application/pdf"));

    if is_pdf(&bytes) {
        let text = pdf::extract_pdf_text(name.clone(), bytes).await?;
        tracing::debug!("Extracted {} chars from PDF {}", text.len(), name);
        return Ok(text);
    }

    if declared_pdf {
        // A document store that lost the session tends to answer with
        // a login page instead of the file
        if looks_like_html(&bytes) {
            return Err(ExtractionError::UnexpectedHtml { name });
        }
        return Err(ExtractionError::Pdf {
            name,
            reason: String::from("missing %PDF header"),
        });
    }

    String::from_utf8(bytes).map_err(|_| ExtractionError::NotText { name })
}

/// Extracts every source concurrently. Results are returned in the
/// same order as `sources` and a failure never affects its siblings.
pub async fn extract_all(sources: &[DocumentSource]) -> Vec<Result<String, ExtractionError>> {
    join_all(sources.iter().map(extract)).await
}

async fn fetch(url: &str) -> Result<(Vec<u8>, Option<String>), ExtractionError> {
    let fetch_err = |reason: String| ExtractionError::Fetch {
        url: url.to_string(),
        reason,
    };

    let response = reqwest::get(url)
        .await
        .map_err(|e| fetch_err(e.to_string()))?
        .error_for_status()
        .map_err(|e| fetch_err(e.to_string()))?;
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_lowercase());
    let bytes = response
        .bytes()
        .await
        .map_err(|e| fetch_err(e.to_string()))?;

    Ok((bytes.to_vec(), content_type))
}

fn is_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF")
}

fn looks_like_html(bytes: &[u8]) -> bool {
    let prefix = &bytes[..bytes.len().min(512)];
    let start = prefix
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(prefix.len());
    let lower = prefix[start..].to_ascii_lowercase();
    lower.starts_with(b"<!doctype html") || lower.starts_with(b"<html")
}
