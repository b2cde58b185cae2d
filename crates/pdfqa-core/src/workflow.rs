//! Document-wide highlight and redaction passes
//!
//! Each needle is searched on every page and every occurrence is marked.
//! Needles that do not occur are skipped silently.

use serde::Serialize;
use tracing::{debug, info};

use crate::annotate::{highlight, Color, RedactionSummary};
use crate::document::PdfDocument;
use crate::error::PdfQaError;
use crate::locate::locate;

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct HighlightReport {
    /// Highlight annotations added
    pub highlights: usize,
    /// Needles found on at least one page
    pub matched: usize,
    pub unmatched: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct RedactionReport {
    pub regions: usize,
    pub glyphs_removed: usize,
    /// Pages whose content was rewritten
    pub pages: Vec<usize>,
    pub unmatched: Vec<String>,
}

/// Highlight every occurrence of each sentence on every page
pub fn highlight_sentences(
    doc: &mut PdfDocument,
    sentences: &[String],
    color: Color,
) -> Result<HighlightReport, PdfQaError> {
    let mut report = HighlightReport::default();
    let mut found = vec![false; sentences.len()];

    for page in 0..doc.page_count() {
        let layout = doc.page_layout(page)?;
        let regions: Vec<(usize, _)> = sentences
            .iter()
            .enumerate()
            .flat_map(|(i, sentence)| {
                locate(&layout, sentence)
                    .into_iter()
                    .map(move |region| (i, region))
            })
            .collect();

        for (i, region) in regions {
            found[i] = true;
            if highlight(doc, page, &region, color)? {
                report.highlights += 1;
            }
        }
    }

    collect_unmatched(sentences, &found, &mut report.matched, &mut report.unmatched);
    info!(
        sentences = sentences.len(),
        matched = report.matched,
        highlights = report.highlights,
        "highlighted excerpt"
    );
    Ok(report)
}

/// Redact every occurrence of each entry on every page
///
/// All marks for a page are registered before that page is committed, so
/// overlapping entries are removed once.
pub fn redact_entries(
    doc: &mut PdfDocument,
    entries: &[String],
    fill: Color,
) -> Result<RedactionReport, PdfQaError> {
    let mut report = RedactionReport::default();
    let mut found = vec![false; entries.len()];

    for page in 0..doc.page_count() {
        let layout = doc.page_layout(page)?;
        let mut redactions = doc.begin_redactions(page)?;

        for (i, entry) in entries.iter().enumerate() {
            for region in locate(&layout, entry) {
                found[i] = true;
                if redactions.register(&region, fill) > 0 {
                    report.regions += 1;
                }
            }
        }

        if redactions.is_empty() {
            continue;
        }
        let RedactionSummary { glyphs_removed, .. } = redactions.commit()?;
        report.glyphs_removed += glyphs_removed;
        report.pages.push(page);
    }

    let mut matched = 0;
    collect_unmatched(entries, &found, &mut matched, &mut report.unmatched);
    info!(
        entries = entries.len(),
        matched,
        regions = report.regions,
        glyphs_removed = report.glyphs_removed,
        "redacted sensitive data"
    );
    Ok(report)
}

fn collect_unmatched(
    needles: &[String],
    found: &[bool],
    matched: &mut usize,
    unmatched: &mut Vec<String>,
) {
    for (needle, hit) in needles.iter().zip(found) {
        if *hit {
            *matched += 1;
        } else {
            debug!(needle = %needle, "no occurrence on any page");
            unmatched.push(needle.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract_text;
    use crate::locate::locate;
    use crate::testutil::{build_pdf, build_type0_pdf, TestPage, LEFT_MARGIN};
    use pretty_assertions::assert_eq;

    fn sample() -> PdfDocument {
        let pdf = build_pdf(&[
            TestPage::lines(&["Revenue was $42M in 2023.", "Contact: a@b.com"]),
            TestPage::lines(&["Again: Revenue was $42M in 2023.", "Phone 555-1234"]),
        ]);
        PdfDocument::load_mem(&pdf).unwrap()
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_highlight_every_page_and_occurrence() {
        let mut doc = sample();
        let report =
            highlight_sentences(&mut doc, &strings(&["Revenue was $42M in 2023."]), Color::YELLOW)
                .unwrap();
        assert_eq!(report.highlights, 2);
        assert_eq!(report.matched, 1);
        assert!(report.unmatched.is_empty());
    }

    #[test]
    fn test_absent_sentence_leaves_document_unchanged() {
        let mut doc = sample();
        let before = doc.inner().objects.len();
        let report =
            highlight_sentences(&mut doc, &strings(&["Profit fell sharply."]), Color::YELLOW)
                .unwrap();
        assert_eq!(report.highlights, 0);
        assert_eq!(report.unmatched, strings(&["Profit fell sharply."]));
        assert_eq!(doc.inner().objects.len(), before);
    }

    #[test]
    fn test_redaction_removes_entries_from_extraction() {
        let mut doc = sample();
        let entries = strings(&["a@b.com", "555-1234", "not-present"]);
        let report = redact_entries(&mut doc, &entries, Color::BLACK).unwrap();
        assert_eq!(report.regions, 2);
        assert_eq!(report.pages, vec![0, 1]);
        assert_eq!(report.unmatched, strings(&["not-present"]));

        let reopened = PdfDocument::load_mem(&doc.finalize().unwrap()).unwrap();
        let text = extract_text(&reopened).unwrap().full_text;
        assert!(!text.contains("a@b.com"));
        assert!(!text.contains("555-1234"));
        assert!(text.contains("Revenue was $42M in 2023."));
    }

    #[test]
    fn test_type0_page_locates_and_redacts() {
        let mut doc = PdfDocument::load_mem(&build_type0_pdf(&["Call 555-1234 now"])).unwrap();

        let regions = locate(&doc.page_layout(0).unwrap(), "555-1234");
        assert_eq!(regions.len(), 1);
        // "Call " is five 600-unit glyphs at 12pt
        assert!((regions[0].rects[0].x - (LEFT_MARGIN as f64 + 36.0)).abs() < 1e-6);

        let report = redact_entries(&mut doc, &strings(&["555-1234"]), Color::BLACK).unwrap();
        assert_eq!(report.glyphs_removed, 8);

        let reopened = PdfDocument::load_mem(&doc.finalize().unwrap()).unwrap();
        let text = extract_text(&reopened).unwrap().full_text;
        assert!(!text.contains("555"));
        assert!(text.starts_with("Call"));
        assert!(text.ends_with("now"));
    }

    #[test]
    fn test_overlapping_entries_redact_once() {
        let mut doc = sample();
        let entries = strings(&["555-1234", "555", "1234"]);
        let report = redact_entries(&mut doc, &entries, Color::BLACK).unwrap();
        assert_eq!(report.regions, 3);
        assert_eq!(report.glyphs_removed, "555-1234".len());
    }

    #[test]
    fn test_highlight_then_redact_keeps_highlight() {
        let mut doc = sample();
        highlight_sentences(&mut doc, &strings(&["Revenue was $42M in 2023."]), Color::YELLOW)
            .unwrap();
        redact_entries(&mut doc, &strings(&["a@b.com"]), Color::BLACK).unwrap();

        let reopened = PdfDocument::load_mem(&doc.finalize().unwrap()).unwrap();
        let page_id = reopened.page_id(0).unwrap();
        let page = reopened.inner().get_object(page_id).unwrap().as_dict().unwrap();
        assert!(page.get(b"Annots").is_ok());
    }
}
