//! PDF question-answering core
//!
//! Text extraction, literal span search and annotation for PDF documents,
//! plus parsers for the two model responses the service consumes.
//!
//! Everything here is synchronous and CPU-bound; callers on an async
//! runtime are expected to run it on a blocking thread.

pub mod annotate;
pub mod answer;
pub mod document;
pub mod error;
pub mod extract;
pub mod fonts;
pub mod geometry;
pub mod layout;
pub mod locate;
pub mod sensitive;
pub mod workflow;

#[cfg(test)]
mod testutil;

pub use annotate::{highlight, Color, PageRedactions, RedactionSummary};
pub use answer::{parse_answer, split_sentences, ParsedAnswer, RELEVANT_TEXT_MARKER};
pub use document::PdfDocument;
pub use error::PdfQaError;
pub use extract::{extract_text, ExtractedText};
pub use geometry::{Rect, Region};
pub use layout::{Glyph, PageLayout};
pub use locate::locate;
pub use sensitive::parse_sensitive_data;
pub use workflow::{highlight_sentences, redact_entries, HighlightReport, RedactionReport};
