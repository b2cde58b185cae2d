//! Plain-text extraction

use serde::Serialize;
use tracing::debug;

use crate::document::PdfDocument;
use crate::error::PdfQaError;

/// Text of every page in document order
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ExtractedText {
    pub pages: Vec<String>,
    /// Page texts joined with `\n`
    pub full_text: String,
}

impl ExtractedText {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn is_blank(&self) -> bool {
        self.pages.iter().all(|p| p.trim().is_empty())
    }
}

/// Extract the rendered text of every page
///
/// Pages without text yield an empty string. The document is not modified.
pub fn extract_text(doc: &PdfDocument) -> Result<ExtractedText, PdfQaError> {
    let pages = (0..doc.page_count())
        .map(|index| doc.page_layout(index).map(|layout| layout.text().to_string()))
        .collect::<Result<Vec<_>, _>>()?;
    let full_text = pages.join("\n");

    debug!(
        pages = pages.len(),
        chars = full_text.chars().count(),
        "extracted text"
    );
    Ok(ExtractedText { pages, full_text })
}
