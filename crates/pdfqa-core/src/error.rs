use thiserror::Error;

#[derive(Error, Debug)]
pub enum PdfQaError {
    #[error("Failed to parse PDF: {0}")]
    ParseError(String),

    #[error("Page {index} out of range (document has {count} pages)")]
    PageOutOfRange { index: usize, count: usize },

    #[error("Content stream error: {0}")]
    ContentError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}
