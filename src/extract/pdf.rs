use lopdf::Document;

use super::ExtractionError;

/// Pages past this limit are not read.
pub const MAX_PAGES: usize = 50;

pub const TRUNCATION_NOTICE: &str = "[Content truncated: only the first 50 pages were extracted]";

/// Decodes a PDF and returns the text of its first `MAX_PAGES` pages
/// in page order, separated by blank lines. Decoding is CPU bound so
/// it runs on the blocking pool.
pub async fn extract_pdf_text(name: String, bytes: Vec<u8>) -> Result<String, ExtractionError> {
    let task_name = name.clone();
    tokio::task::spawn_blocking(move || pdf_text(&task_name, &bytes))
        .await
        .map_err(|e| ExtractionError::Pdf {
            name,
            reason: e.to_string(),
        })?
}

fn pdf_text(name: &str, bytes: &[u8]) -> Result<String, ExtractionError> {
    let pdf_err = |reason: String| ExtractionError::Pdf {
        name: name.to_string(),
        reason,
    };

    let doc = Document::load_mem(bytes).map_err(|e| pdf_err(e.to_string()))?;

    // `get_pages` is keyed by 1-based page number in a BTreeMap so
    // iteration is already in page order
    let pages = doc.get_pages();
    let page_count = pages.len();

    let mut sections = Vec::with_capacity(page_count.min(MAX_PAGES));
    for page_number in pages.keys().take(MAX_PAGES) {
        let text = doc
            .extract_text(&[*page_number])
            .map_err(|e| pdf_err(format!("page {}: {}", page_number, e)))?;
        sections.push(text.trim().to_string());
    }

    let mut out = sections.join("\n\n");
    if page_count > MAX_PAGES {
        tracing::debug!(
            "{} has {} pages, truncating to {}",
            name,
            page_count,
            MAX_PAGES
        );
        out.push_str("\n\n");
        out.push_str(TRUNCATION_NOTICE);
    }

    Ok(out)
}
