//! Span locator: literal substring search over a page layout

use tracing::trace;

use crate::geometry::{Rect, Region};
use crate::layout::PageLayout;

/// Baseline shift (in font sizes) that starts a new rect within a region
const SAME_LINE_FACTOR: f64 = 0.5;

/// Find every occurrence of `needle` on the page
///
/// Matching is literal and case-sensitive. Line breaks on the page match a
/// single space in the needle; nothing else is normalized. Occurrences do
/// not overlap. No match is an empty result, never an error.
pub fn locate(layout: &PageLayout, needle: &str) -> Vec<Region> {
    if needle.is_empty() {
        return Vec::new();
    }

    let regions: Vec<Region> = layout
        .search_text()
        .match_indices(needle)
        .map(|(start, matched)| region_for(layout, start, start + matched.len()))
        .filter(|region| !region.is_empty())
        .collect();

    trace!(
        page = layout.index,
        needle_len = needle.len(),
        hits = regions.len(),
        "located"
    );
    regions
}

/// Union the matched glyph boxes into one rect per text line
fn region_for(layout: &PageLayout, start: usize, end: usize) -> Region {
    let glyphs = layout.glyphs();
    let mut rects: Vec<Rect> = Vec::new();
    let mut line: Option<(Rect, f64, f64)> = None;

    for index in layout.glyphs_in_range(start, end) {
        let glyph = &glyphs[index];
        if glyph.bbox.is_empty() {
            continue;
        }
        line = match line {
            Some((rect, baseline, size))
                if (glyph.origin.1 - baseline).abs() <= SAME_LINE_FACTOR * size.max(1.0) =>
            {
                Some((rect.union(&glyph.bbox), baseline, size.max(glyph.size)))
            }
            Some((rect, _, _)) => {
                rects.push(rect);
                Some((glyph.bbox, glyph.origin.1, glyph.size))
            }
            None => Some((glyph.bbox, glyph.origin.1, glyph.size)),
        };
    }
    if let Some((rect, _, _)) = line {
        rects.push(rect);
    }

    Region::new(rects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::PdfDocument;
    use crate::testutil::{build_pdf, TestPage, LEFT_MARGIN, TOP_LINE};

    fn layout_of(lines: &[&str]) -> PageLayout {
        let pdf = build_pdf(&[TestPage::lines(lines)]);
        PdfDocument::load_mem(&pdf).unwrap().page_layout(0).unwrap()
    }

    #[test]
    fn test_verbatim_phrase_yields_one_region() {
        let layout = layout_of(&["Revenue was $42M in 2023.", "Costs were flat."]);
        let regions = locate(&layout, "Revenue was $42M in 2023.");
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].rects.len(), 1);

        let rect = regions[0].rects[0];
        assert!((rect.x - LEFT_MARGIN as f64).abs() < 1e-6);
        assert!(rect.y < TOP_LINE as f64 && rect.top() > TOP_LINE as f64);
    }

    #[test]
    fn test_repeated_phrase_yields_every_occurrence() {
        let layout = layout_of(&["net income", "gross income and net income"]);
        let regions = locate(&layout, "net income");
        assert_eq!(regions.len(), 2);
        assert!(regions[0].rects[0].y > regions[1].rects[0].y);
    }

    #[test]
    fn test_search_is_case_sensitive() {
        let layout = layout_of(&["Revenue grew"]);
        assert!(locate(&layout, "revenue grew").is_empty());
        assert_eq!(locate(&layout, "Revenue").len(), 1);
    }

    #[test]
    fn test_paraphrase_is_a_silent_miss() {
        let layout = layout_of(&["Revenue was $42M in 2023."]);
        assert!(locate(&layout, "Revenue reached 42 million").is_empty());
    }

    #[test]
    fn test_empty_needle_matches_nothing() {
        let layout = layout_of(&["anything"]);
        assert!(locate(&layout, "").is_empty());
    }

    #[test]
    fn test_phrase_wrapped_across_lines_gets_rect_per_line() {
        let layout = layout_of(&["The contract renews", "every twelve months."]);
        let regions = locate(&layout, "renews every twelve");
        assert_eq!(regions.len(), 1);
        let rects = &regions[0].rects;
        assert_eq!(rects.len(), 2);
        assert!(rects[0].y > rects[1].y);
        assert!((rects[1].x - LEFT_MARGIN as f64).abs() < 1e-6);
    }

    #[test]
    fn test_match_excludes_neighbouring_text() {
        let layout = layout_of(&["alpha beta gamma"]);
        let full = locate(&layout, "alpha beta gamma")[0].rects[0];
        let middle = locate(&layout, "beta")[0].rects[0];
        assert!(middle.x > full.x);
        assert!(middle.right() < full.right());
    }
}
