//! Highlight annotations and two-phase redaction
//!
//! Highlights are `/Highlight` annotations and never touch page content.
//! Redactions are queued on a [`PageRedactions`] and applied in a single
//! pass by [`PageRedactions::commit`], which rewrites the page content
//! stream without the covered glyphs and paints a fill over each mark.

use std::collections::HashMap;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Object, ObjectId, Stream, StringFormat};
use tracing::{debug, trace};

use crate::document::{resolve, PdfDocument};
use crate::error::PdfQaError;
use crate::geometry::{Rect, Region};
use crate::layout::{PageLayout, ShowItem, ShowKind, TextShow};

/// Share of a glyph's box that must be covered for the glyph to be removed
const REMOVAL_COVERAGE: f64 = 0.5;

/// RGB fill or stroke colour, components in `0.0..=1.0`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const YELLOW: Color = Color {
        r: 1.0,
        g: 1.0,
        b: 0.0,
    };
    pub const BLACK: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };

    /// Parse `#RRGGBB` or `RRGGBB`; anything else is black
    pub fn from_hex(color: &str) -> Self {
        let hex = color.trim_start_matches('#');
        let channel = |range: std::ops::Range<usize>| {
            hex.get(range)
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .map(|v| v as f32 / 255.0)
        };
        match (channel(0..2), channel(2..4), channel(4..6)) {
            (Some(r), Some(g), Some(b)) if hex.len() == 6 => Color { r, g, b },
            _ => Color::BLACK,
        }
    }

    fn to_array(self) -> Object {
        Object::Array(vec![
            Object::Real(self.r),
            Object::Real(self.g),
            Object::Real(self.b),
        ])
    }

    fn fill_operation(self) -> Operation {
        Operation::new(
            "rg",
            vec![
                Object::Real(self.r),
                Object::Real(self.g),
                Object::Real(self.b),
            ],
        )
    }
}

/// Add one highlight annotation covering every rect of `region`
///
/// The region is clipped to the page's MediaBox first. Returns `false` when
/// nothing is left to highlight; the document is then unchanged.
pub fn highlight(
    doc: &mut PdfDocument,
    page: usize,
    region: &Region,
    color: Color,
) -> Result<bool, PdfQaError> {
    let page_id = doc.page_id(page)?;
    let region = region.clamped_to(&doc.media_box(page)?);
    let Some(bounds) = region.bounds() else {
        debug!(page, "highlight region empty after clamping, skipped");
        return Ok(false);
    };

    let quad_points: Vec<Object> = region
        .rects
        .iter()
        .flat_map(|r| r.to_quad_points())
        .map(Object::Real)
        .collect();

    let appearance_id = doc
        .inner_mut()
        .add_object(highlight_appearance(&region, &bounds, color)?);

    let annot = dictionary! {
        "Type" => "Annot",
        "Subtype" => "Highlight",
        "Rect" => pdf_rect(&bounds),
        "QuadPoints" => quad_points,
        "C" => color.to_array(),
        "F" => 4,
        "P" => Object::Reference(page_id),
        "AP" => dictionary! { "N" => Object::Reference(appearance_id) },
    };

    let annot_id = doc.inner_mut().add_object(Object::Dictionary(annot));
    add_annotation_to_page(doc, page_id, annot_id)?;
    trace!(page, rects = region.rects.len(), "added highlight");
    Ok(true)
}

/// Normal appearance: the quads filled with a multiply blend
fn highlight_appearance(region: &Region, bounds: &Rect, color: Color) -> Result<Stream, PdfQaError> {
    let mut operations = vec![
        Operation::new("q", vec![]),
        Operation::new("gs", vec![Object::Name(b"GS0".to_vec())]),
        color.fill_operation(),
    ];
    for rect in &region.rects {
        operations.push(re_operation(rect));
    }
    operations.push(Operation::new("f", vec![]));
    operations.push(Operation::new("Q", vec![]));

    let content = Content { operations }
        .encode()
        .map_err(|e| PdfQaError::ContentError(e.to_string()))?;

    let form = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Form",
        "BBox" => pdf_rect(bounds),
        "Resources" => dictionary! {
            "ExtGState" => dictionary! {
                "GS0" => dictionary! {
                    "Type" => "ExtGState",
                    "BM" => "Multiply",
                },
            },
        },
    };
    Ok(Stream::new(form, content))
}

fn add_annotation_to_page(
    doc: &mut PdfDocument,
    page_id: ObjectId,
    annot_id: ObjectId,
) -> Result<(), PdfQaError> {
    // An indirect Annots array is copied onto the page so it can be extended
    let existing: Option<Vec<Object>> = {
        let inner = doc.inner();
        inner
            .get_object(page_id)
            .and_then(Object::as_dict)
            .ok()
            .and_then(|page| page.get(b"Annots").ok())
            .map(|annots| resolve(inner, annots))
            .and_then(|annots| annots.as_array().ok())
            .cloned()
    };

    let page = doc
        .inner_mut()
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| PdfQaError::ContentError(e.to_string()))?;

    let mut annots = existing.unwrap_or_default();
    annots.push(Object::Reference(annot_id));
    page.set("Annots", Object::Array(annots));
    Ok(())
}

/// Outcome of one page's redaction commit
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RedactionSummary {
    pub page: usize,
    /// Rects painted over
    pub rects: usize,
    /// Glyphs removed from the content stream
    pub glyphs_removed: usize,
    /// Text-showing operations that were rewritten
    pub shows_rewritten: usize,
}

/// Redaction marks queued for one page
///
/// Holds the document mutably so nothing else can change it between the
/// first registration and the commit.
pub struct PageRedactions<'d> {
    doc: &'d mut PdfDocument,
    page: usize,
    media_box: Rect,
    marks: Vec<(Rect, Color)>,
}

impl PdfDocument {
    /// Start queueing redactions for `page`
    pub fn begin_redactions(&mut self, page: usize) -> Result<PageRedactions<'_>, PdfQaError> {
        let media_box = self.media_box(page)?;
        Ok(PageRedactions {
            doc: self,
            page,
            media_box,
            marks: Vec::new(),
        })
    }
}

impl<'d> PageRedactions<'d> {
    /// Queue every rect of `region`; returns how many survived clamping
    pub fn register(&mut self, region: &Region, fill: Color) -> usize {
        let clamped = region.clamped_to(&self.media_box);
        if clamped.rects.len() < region.rects.len() {
            debug!(
                page = self.page,
                dropped = region.rects.len() - clamped.rects.len(),
                "redaction rects empty after clamping, skipped"
            );
        }
        let added = clamped.rects.len();
        self.marks
            .extend(clamped.rects.into_iter().map(|rect| (rect, fill)));
        added
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    /// Apply every queued mark in one content rewrite
    ///
    /// A page with no marks is left untouched.
    pub fn commit(self) -> Result<RedactionSummary, PdfQaError> {
        let PageRedactions {
            doc,
            page,
            marks,
            ..
        } = self;

        let mut summary = RedactionSummary {
            page,
            ..Default::default()
        };
        if marks.is_empty() {
            return Ok(summary);
        }

        let layout = doc.page_layout(page)?;
        let removed: Vec<bool> = layout
            .glyphs()
            .iter()
            .map(|glyph| marks.iter().any(|(rect, _)| covers(rect, &glyph.bbox)))
            .collect();

        let mut replacements: HashMap<usize, Vec<Operation>> = HashMap::new();
        for show in &layout.shows {
            let touched = show.items.iter().any(|item| match item {
                ShowItem::Glyph(i) => removed[*i],
                ShowItem::Adjust(_) => false,
            });
            if touched {
                replacements.insert(show.op_index, rewrite_show(&layout, show, &removed));
            }
        }

        summary.glyphs_removed = removed.iter().filter(|r| **r).count();
        summary.shows_rewritten = replacements.len();
        summary.rects = marks.len();

        let mut operations = Vec::with_capacity(layout.operations.len() + marks.len() * 5 + 2);
        operations.push(Operation::new("q", vec![]));
        for (op_index, op) in layout.operations.iter().enumerate() {
            match replacements.remove(&op_index) {
                Some(rewritten) => operations.extend(rewritten),
                None => operations.push(op.clone()),
            }
        }
        operations.push(Operation::new("Q", vec![]));

        for (rect, fill) in &marks {
            operations.push(Operation::new("q", vec![]));
            operations.push(fill.fill_operation());
            operations.push(re_operation(rect));
            operations.push(Operation::new("f", vec![]));
            operations.push(Operation::new("Q", vec![]));
        }

        let content = Content { operations }
            .encode()
            .map_err(|e| PdfQaError::ContentError(e.to_string()))?;
        doc.replace_page_content(page, content)?;

        debug!(
            page,
            rects = summary.rects,
            glyphs_removed = summary.glyphs_removed,
            shows_rewritten = summary.shows_rewritten,
            "committed redactions"
        );
        Ok(summary)
    }
}

/// Whether a mark takes a glyph out of the page
fn covers(mark: &Rect, glyph: &Rect) -> bool {
    let area = glyph.area();
    if area <= 0.0 {
        let (x, y) = glyph.center();
        return mark.contains_point(x, y);
    }
    mark.intersection(glyph)
        .map(|overlap| overlap.area() / area >= REMOVAL_COVERAGE)
        .unwrap_or(false)
}

/// Re-emit a text show as `TJ`, replacing removed glyphs by their advance
fn rewrite_show(layout: &PageLayout, show: &TextShow, removed: &[bool]) -> Vec<Operation> {
    let glyphs = layout.glyphs();
    let mut parts: Vec<Object> = Vec::new();
    let mut run: Vec<u8> = Vec::new();

    let flush = |run: &mut Vec<u8>, parts: &mut Vec<Object>| {
        if !run.is_empty() {
            parts.push(Object::String(
                std::mem::take(run),
                StringFormat::Hexadecimal,
            ));
        }
    };

    for item in &show.items {
        match item {
            ShowItem::Glyph(i) if !removed[*i] => run.extend_from_slice(&glyphs[*i].code),
            ShowItem::Glyph(i) => {
                flush(&mut run, &mut parts);
                parts.push(Object::Real(-glyphs[*i].advance_units as f32));
            }
            ShowItem::Adjust(adjust) => {
                flush(&mut run, &mut parts);
                parts.push(Object::Real(*adjust as f32));
            }
        }
    }
    flush(&mut run, &mut parts);

    let show_op = Operation::new("TJ", vec![Object::Array(parts)]);
    match show.kind {
        ShowKind::Show => vec![show_op],
        ShowKind::NextLineShow => vec![Operation::new("T*", vec![]), show_op],
        ShowKind::SpacedNextLineShow => {
            let operands = &layout.operations[show.op_index].operands;
            let mut ops = Vec::with_capacity(4);
            if let (Some(aw), Some(ac)) = (operands.first(), operands.get(1)) {
                ops.push(Operation::new("Tw", vec![aw.clone()]));
                ops.push(Operation::new("Tc", vec![ac.clone()]));
            }
            ops.push(Operation::new("T*", vec![]));
            ops.push(show_op);
            ops
        }
    }
}

fn re_operation(rect: &Rect) -> Operation {
    Operation::new(
        "re",
        vec![
            Object::Real(rect.x as f32),
            Object::Real(rect.y as f32),
            Object::Real(rect.width as f32),
            Object::Real(rect.height as f32),
        ],
    )
}

fn pdf_rect(rect: &Rect) -> Object {
    Object::Array(rect.to_pdf_rect().into_iter().map(Object::Real).collect())
}
