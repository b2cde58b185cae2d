//! Page layout: positioned glyphs from a page content stream
//!
//! Interprets the text and graphics-state operators of a page and records
//! every shown glyph with its bounding box in default user space. The
//! resulting [`PageLayout`] is both the page's rendered text (for
//! extraction and search) and the map from text back to content-stream
//! operations (for redaction).
//!
//! Form XObjects and inline images are not descended into.

use std::collections::HashMap;

use lopdf::content::{Content, Operation};
use lopdf::Object;
use tracing::{trace, warn};

use crate::document::PdfDocument;
use crate::error::PdfQaError;
use crate::fonts::{number, FontInfo, FALLBACK_FONT};
use crate::geometry::{Matrix, Rect};

/// Baseline shift (in font sizes) that starts a new line
const LINE_BREAK_FACTOR: f64 = 0.5;
/// Horizontal gap (in font sizes) that reads as a word break
const SPACE_GAP_FACTOR: f64 = 0.15;
/// Backwards jump (in font sizes) on the same baseline that reads as a new line
const BACKTRACK_FACTOR: f64 = 2.0;

/// One shown glyph
#[derive(Debug, Clone)]
pub struct Glyph {
    /// Unicode text of the glyph (ligatures may map to several chars)
    pub text: String,
    pub bbox: Rect,
    /// Effective font size in user space
    pub size: f64,
    /// Baseline origin in user space
    pub origin: (f64, f64),
    pub(crate) code: Vec<u8>,
    /// Advance expressed in `TJ` units, used to keep positions when removed
    pub(crate) advance_units: f64,
}

#[derive(Debug, Clone)]
pub(crate) enum ShowItem {
    Glyph(usize),
    Adjust(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ShowKind {
    /// `Tj` and `TJ`
    Show,
    /// `'`
    NextLineShow,
    /// `"`
    SpacedNextLineShow,
}

/// A text-showing operation and the glyphs it produced
#[derive(Debug, Clone)]
pub(crate) struct TextShow {
    pub op_index: usize,
    pub kind: ShowKind,
    pub items: Vec<ShowItem>,
}

/// Byte range of the page text and the glyph it came from
#[derive(Debug, Clone, Copy)]
struct CharSpan {
    start: usize,
    end: usize,
    glyph: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct PageLayout {
    pub index: usize,
    pub media_box: Rect,
    glyphs: Vec<Glyph>,
    pub(crate) shows: Vec<TextShow>,
    pub(crate) operations: Vec<Operation>,
    text: String,
    search_text: String,
    spans: Vec<CharSpan>,
}

#[derive(Debug, Clone)]
struct TextState {
    char_spacing: f64,
    word_spacing: f64,
    horizontal_scale: f64,
    leading: f64,
    rise: f64,
    font: Option<Vec<u8>>,
    font_size: f64,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
            font: None,
            font_size: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct GraphicsState {
    ctm: Matrix,
    text: TextState,
}

struct Interpreter<'a> {
    fonts: &'a HashMap<Vec<u8>, FontInfo>,
    state: GraphicsState,
    stack: Vec<GraphicsState>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    glyphs: Vec<Glyph>,
    shows: Vec<TextShow>,
}

impl PageLayout {
    pub(crate) fn build(doc: &PdfDocument, index: usize) -> Result<Self, PdfQaError> {
        let media_box = doc.media_box(index)?;
        let fonts = doc.page_fonts(index)?;

        let operations = match doc
            .page_content(index)
            .and_then(|bytes| {
                Content::decode(&bytes).map_err(|e| PdfQaError::ContentError(e.to_string()))
            }) {
            Ok(content) => content.operations,
            Err(e) => {
                // Unreadable content is treated as a page without text
                warn!(page = index, error = %e, "could not decode page content");
                Vec::new()
            }
        };

        let mut interpreter = Interpreter::new(&fonts);
        for (op_index, op) in operations.iter().enumerate() {
            interpreter.execute(op_index, op);
        }

        let Interpreter { glyphs, shows, .. } = interpreter;
        let (text, spans) = assemble_text(&glyphs);
        let search_text = text.replace('\n', " ");

        trace!(page = index, glyphs = glyphs.len(), "built page layout");

        Ok(Self {
            index,
            media_box,
            glyphs,
            shows,
            operations,
            text,
            search_text,
            spans,
        })
    }

    /// Page text with line breaks as `\n`
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Page text with line breaks presented as single spaces
    pub(crate) fn search_text(&self) -> &str {
        &self.search_text
    }

    pub fn glyphs(&self) -> &[Glyph] {
        &self.glyphs
    }

    /// Glyph indices behind the byte range `[start, end)` of the page text
    pub(crate) fn glyphs_in_range(&self, start: usize, end: usize) -> Vec<usize> {
        let first = self.spans.partition_point(|s| s.end <= start);
        self.spans[first..]
            .iter()
            .take_while(|s| s.start < end)
            .filter_map(|s| s.glyph)
            .collect()
    }
}

impl<'a> Interpreter<'a> {
    fn new(fonts: &'a HashMap<Vec<u8>, FontInfo>) -> Self {
        Self {
            fonts,
            state: GraphicsState::default(),
            stack: Vec::new(),
            text_matrix: Matrix::IDENTITY,
            line_matrix: Matrix::IDENTITY,
            glyphs: Vec::new(),
            shows: Vec::new(),
        }
    }

    fn execute(&mut self, op_index: usize, op: &Operation) {
        let nums: Vec<f64> = op.operands.iter().filter_map(number).collect();
        match op.operator.as_str() {
            "q" => self.stack.push(self.state.clone()),
            "Q" => {
                if let Some(state) = self.stack.pop() {
                    self.state = state;
                }
            }
            "cm" => {
                if let [a, b, c, d, e, f] = nums[..] {
                    self.state.ctm = Matrix::new(a, b, c, d, e, f).then(&self.state.ctm);
                }
            }
            "BT" => {
                self.text_matrix = Matrix::IDENTITY;
                self.line_matrix = Matrix::IDENTITY;
            }
            "Tf" => {
                if let Some(Object::Name(name)) = op.operands.first() {
                    self.state.text.font = Some(name.clone());
                }
                if let Some(size) = op.operands.get(1).and_then(number) {
                    self.state.text.font_size = size;
                }
            }
            "Tc" => {
                if let Some(v) = nums.first() {
                    self.state.text.char_spacing = *v;
                }
            }
            "Tw" => {
                if let Some(v) = nums.first() {
                    self.state.text.word_spacing = *v;
                }
            }
            "Tz" => {
                if let Some(v) = nums.first() {
                    self.state.text.horizontal_scale = *v / 100.0;
                }
            }
            "TL" => {
                if let Some(v) = nums.first() {
                    self.state.text.leading = *v;
                }
            }
            "Ts" => {
                if let Some(v) = nums.first() {
                    self.state.text.rise = *v;
                }
            }
            "Td" => {
                if let [tx, ty] = nums[..] {
                    self.move_line(tx, ty);
                }
            }
            "TD" => {
                if let [tx, ty] = nums[..] {
                    self.state.text.leading = -ty;
                    self.move_line(tx, ty);
                }
            }
            "Tm" => {
                if let [a, b, c, d, e, f] = nums[..] {
                    self.line_matrix = Matrix::new(a, b, c, d, e, f);
                    self.text_matrix = self.line_matrix;
                }
            }
            "T*" => self.next_line(),
            "Tj" => {
                if let Some(Object::String(bytes, _)) = op.operands.first() {
                    let items = self.show_string(bytes);
                    self.push_show(op_index, ShowKind::Show, items);
                }
            }
            "'" => {
                self.next_line();
                if let Some(Object::String(bytes, _)) = op.operands.first() {
                    let items = self.show_string(bytes);
                    self.push_show(op_index, ShowKind::NextLineShow, items);
                }
            }
            "\"" => {
                if let (Some(aw), Some(ac)) = (
                    op.operands.first().and_then(number),
                    op.operands.get(1).and_then(number),
                ) {
                    self.state.text.word_spacing = aw;
                    self.state.text.char_spacing = ac;
                }
                self.next_line();
                if let Some(Object::String(bytes, _)) = op.operands.get(2) {
                    let items = self.show_string(bytes);
                    self.push_show(op_index, ShowKind::SpacedNextLineShow, items);
                }
            }
            "TJ" => {
                if let Some(Object::Array(parts)) = op.operands.first() {
                    let mut items = Vec::new();
                    for part in parts {
                        match part {
                            Object::String(bytes, _) => items.extend(self.show_string(bytes)),
                            other => {
                                if let Some(adjust) = number(other) {
                                    self.apply_adjust(adjust);
                                    items.push(ShowItem::Adjust(adjust));
                                }
                            }
                        }
                    }
                    self.push_show(op_index, ShowKind::Show, items);
                }
            }
            _ => {}
        }
    }

    fn move_line(&mut self, tx: f64, ty: f64) {
        self.line_matrix = Matrix::translate(tx, ty).then(&self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        let leading = self.state.text.leading;
        self.move_line(0.0, -leading);
    }

    fn push_show(&mut self, op_index: usize, kind: ShowKind, items: Vec<ShowItem>) {
        self.shows.push(TextShow {
            op_index,
            kind,
            items,
        });
    }

    fn current_font(&self) -> &'a FontInfo {
        let fonts = self.fonts;
        self.state
            .text
            .font
            .as_ref()
            .and_then(|name| fonts.get(name))
            .unwrap_or(&FALLBACK_FONT)
    }

    fn apply_adjust(&mut self, adjust: f64) {
        let ts = &self.state.text;
        let tx = -adjust / 1000.0 * ts.font_size * ts.horizontal_scale;
        self.text_matrix = Matrix::translate(tx, 0.0).then(&self.text_matrix);
    }

    fn show_string(&mut self, bytes: &[u8]) -> Vec<ShowItem> {
        let font = self.current_font();
        let ts = self.state.text.clone();
        let mut items = Vec::new();

        for code in font.codes(bytes) {
            let width = font.width(code);
            let word_spacing = if font.is_word_space(code) {
                ts.word_spacing
            } else {
                0.0
            };

            let params = Matrix::new(
                ts.font_size * ts.horizontal_scale,
                0.0,
                0.0,
                ts.font_size,
                0.0,
                ts.rise,
            );
            let render = params.then(&self.text_matrix).then(&self.state.ctm);
            let glyph_box = Rect::from_corners(0.0, font.descent, width / 1000.0, font.ascent);
            let bbox = render.transform_rect(&glyph_box);
            let size = (render.c * render.c + render.d * render.d).sqrt();

            let extra = ts.char_spacing + word_spacing;
            let advance_units = if ts.font_size.abs() > f64::EPSILON {
                width + extra * 1000.0 / ts.font_size
            } else {
                width
            };

            items.push(ShowItem::Glyph(self.glyphs.len()));
            self.glyphs.push(Glyph {
                text: font.decode(code),
                bbox,
                size,
                origin: render.apply(0.0, 0.0),
                code: code.to_vec(),
                advance_units,
            });

            let tx = (width / 1000.0 * ts.font_size + extra) * ts.horizontal_scale;
            self.text_matrix = Matrix::translate(tx, 0.0).then(&self.text_matrix);
        }

        items
    }
}

/// Lay glyphs out as text, inserting `\n` at line changes and spaces at gaps
fn assemble_text(glyphs: &[Glyph]) -> (String, Vec<CharSpan>) {
    let mut text = String::new();
    let mut spans = Vec::new();
    let mut previous: Option<&Glyph> = None;

    let mut push = |text: &mut String, s: &str, glyph: Option<usize>| {
        let start = text.len();
        text.push_str(s);
        spans.push(CharSpan {
            start,
            end: text.len(),
            glyph,
        });
    };

    for (index, glyph) in glyphs.iter().enumerate() {
        if glyph.text.is_empty() {
            continue;
        }
        if let Some(prev) = previous {
            match separator(prev, glyph) {
                Some('\n') if !text.ends_with('\n') => push(&mut text, "\n", None),
                Some(' ') if !text.ends_with(char::is_whitespace)
                    && !glyph.text.starts_with(char::is_whitespace) =>
                {
                    push(&mut text, " ", None)
                }
                _ => {}
            }
        }
        push(&mut text, &glyph.text, Some(index));
        previous = Some(glyph);
    }

    (text, spans)
}

fn separator(prev: &Glyph, next: &Glyph) -> Option<char> {
    let size = prev.size.max(next.size).max(1.0);
    let baseline_shift = (next.origin.1 - prev.origin.1).abs();
    if baseline_shift > LINE_BREAK_FACTOR * size {
        return Some('\n');
    }
    let gap = next.bbox.x - prev.bbox.right();
    if gap < -BACKTRACK_FACTOR * size {
        Some('\n')
    } else if gap > SPACE_GAP_FACTOR * size {
        Some(' ')
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{
        build_pdf, build_type0_pdf, literal, type0_gid, TestPage, FONT_SIZE, LEFT_MARGIN,
        TOP_LINE, TYPE0_WIDTH,
    };
    use lopdf::content::Operation;

    fn layout_of(page: TestPage) -> PageLayout {
        let pdf = build_pdf(&[page]);
        let doc = PdfDocument::load_mem(&pdf).unwrap();
        doc.page_layout(0).unwrap()
    }

    #[test]
    fn test_lines_become_newline_separated_text() {
        let layout = layout_of(TestPage::lines(&["Hello world", "Second line"]));
        assert_eq!(layout.text(), "Hello world\nSecond line");
        assert_eq!(layout.search_text(), "Hello world Second line");
    }

    #[test]
    fn test_type0_page_decodes_through_to_unicode() {
        let pdf = build_type0_pdf(&["Call 555-1234 now", "Thanks"]);
        let layout = PdfDocument::load_mem(&pdf).unwrap().page_layout(0).unwrap();
        assert_eq!(layout.text(), "Call 555-1234 now\nThanks");

        let glyphs = layout.glyphs();
        assert_eq!(glyphs[0].code, type0_gid('C').to_be_bytes().to_vec());
        // Two-byte codes advance by the CID font's default width
        let advance = TYPE0_WIDTH as f64 / 1000.0 * FONT_SIZE as f64;
        assert!((glyphs[0].bbox.width - advance).abs() < 1e-6);
        assert!((glyphs[1].origin.0 - (LEFT_MARGIN as f64 + advance)).abs() < 1e-6);
    }

    #[test]
    fn test_glyph_positions_follow_text_matrix() {
        let layout = layout_of(TestPage::lines(&["Hi"]));
        let glyphs = layout.glyphs();
        assert_eq!(glyphs.len(), 2);

        let h = &glyphs[0];
        assert!((h.origin.0 - LEFT_MARGIN as f64).abs() < 1e-6);
        assert!((h.origin.1 - TOP_LINE as f64).abs() < 1e-6);
        // Helvetica 'H' is 722/1000 em
        let expected = 0.722 * FONT_SIZE as f64;
        assert!((h.bbox.width - expected).abs() < 1e-3);
        assert!((glyphs[1].origin.0 - (LEFT_MARGIN as f64 + expected)).abs() < 1e-3);
        assert!(h.bbox.y < TOP_LINE as f64 && h.bbox.top() > TOP_LINE as f64);
    }

    #[test]
    fn test_tj_kerning_gap_reads_as_space() {
        let page = TestPage::raw(vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), 12.into()]),
            Operation::new("Td", vec![72.into(), 700.into()]),
            Operation::new(
                "TJ",
                vec![Object::Array(vec![
                    literal("Quarterly"),
                    Object::Integer(-300),
                    literal("report"),
                    Object::Integer(-20),
                    literal("s"),
                ])],
            ),
            Operation::new("ET", vec![]),
        ]);
        let layout = layout_of(page);
        assert_eq!(layout.text(), "Quarterly reports");
        assert_eq!(layout.shows.len(), 1);
        assert_eq!(layout.shows[0].items.len(), 9 + 1 + 6 + 1 + 1);
    }

    #[test]
    fn test_separate_text_objects_on_same_line_join() {
        let page = TestPage::raw(vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), 12.into()]),
            Operation::new("Td", vec![72.into(), 700.into()]),
            Operation::new("Tj", vec![literal("Rev")]),
            Operation::new("ET", vec![]),
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), 12.into()]),
            // "Rev" is (722 + 556 + 500) / 1000 * 12 = 21.336pt wide
            Operation::new("Td", vec![Object::Real(93.336), 700.into()]),
            Operation::new("Tj", vec![literal("enue")]),
            Operation::new("ET", vec![]),
        ]);
        let layout = layout_of(page);
        assert_eq!(layout.text(), "Revenue");
    }

    #[test]
    fn test_cm_scales_glyph_boxes() {
        let page = TestPage::raw(vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![2.into(), 0.into(), 0.into(), 2.into(), 0.into(), 0.into()],
            ),
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), 10.into()]),
            Operation::new("Td", vec![10.into(), 100.into()]),
            Operation::new("Tj", vec![literal("M")]),
            Operation::new("ET", vec![]),
            Operation::new("Q", vec![]),
        ]);
        let layout = layout_of(page);
        let m = &layout.glyphs()[0];
        assert!((m.origin.0 - 20.0).abs() < 1e-6);
        assert!((m.origin.1 - 200.0).abs() < 1e-6);
        assert!((m.size - 20.0).abs() < 1e-6);
        // 'M' is 833/1000 em at an effective 20pt
        assert!((m.bbox.width - 16.66).abs() < 1e-3);
    }

    #[test]
    fn test_quote_operator_moves_to_next_line() {
        let page = TestPage::raw(vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), 12.into()]),
            Operation::new("TL", vec![14.into()]),
            Operation::new("Td", vec![72.into(), 700.into()]),
            Operation::new("Tj", vec![literal("first")]),
            Operation::new("'", vec![literal("second")]),
            Operation::new("ET", vec![]),
        ]);
        let layout = layout_of(page);
        assert_eq!(layout.text(), "first\nsecond");
        let second = layout.glyphs().last().unwrap();
        assert!((second.origin.1 - 686.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_page_has_no_text() {
        let layout = layout_of(TestPage::empty());
        assert_eq!(layout.text(), "");
        assert!(layout.glyphs().is_empty());
    }

    #[test]
    fn test_glyphs_in_range_skips_synthetic_chars() {
        let layout = layout_of(TestPage::lines(&["ab", "cd"]));
        assert_eq!(layout.text(), "ab\ncd");
        // "b\nc" covers glyphs 1 and 2 but not the synthetic newline
        assert_eq!(layout.glyphs_in_range(1, 4), vec![1, 2]);
        assert_eq!(layout.glyphs_in_range(2, 3), Vec::<usize>::new());
    }
}
