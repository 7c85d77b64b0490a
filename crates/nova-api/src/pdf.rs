//! PDF text extraction for uploaded documents.

use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum PdfError {
    #[error("could not parse PDF: {0}")]
    Parse(#[from] lopdf::Error),

    #[error("no text content found in PDF")]
    Empty,
}

/// Extracts the text of every page. Lines are trimmed and blank lines
/// dropped; nothing else is normalised.
pub fn extract_text(bytes: &[u8]) -> Result<String, PdfError> {
    let doc = lopdf::Document::load_mem(bytes)?;
    let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
    debug!(page_count = pages.len(), "Extracting text from PDF");

    let raw = doc.extract_text(&pages)?;
    let text = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    if text.is_empty() {
        return Err(PdfError::Empty);
    }
    Ok(text)
}

pub fn has_pdf_extension(filename: &str) -> bool {
    std::path::Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}
