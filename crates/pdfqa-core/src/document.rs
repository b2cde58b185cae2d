//! Owned PDF document handle
//!
//! A `PdfDocument` is created from uploaded bytes, mutated in place by the
//! annotation steps and consumed by [`PdfDocument::finalize`], which is the
//! only way to get bytes back out.

use std::collections::HashMap;
use std::path::Path;

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;

use crate::error::PdfQaError;
use crate::fonts::{number, FontInfo};
use crate::geometry::Rect;
use crate::layout::PageLayout;

/// US Letter, used when a page has no usable MediaBox
const DEFAULT_MEDIA_BOX: Rect = Rect {
    x: 0.0,
    y: 0.0,
    width: 612.0,
    height: 792.0,
};

/// Guard against reference cycles in malformed files
const MAX_DEPTH: usize = 32;

pub struct PdfDocument {
    inner: Document,
    pages: Vec<ObjectId>,
}

impl PdfDocument {
    /// Parse PDF bytes
    pub fn load_mem(bytes: &[u8]) -> Result<Self, PdfQaError> {
        if bytes.len() < 5 || !bytes.starts_with(b"%PDF") {
            return Err(PdfQaError::ParseError("missing %PDF header".into()));
        }
        let doc = Document::load_mem(bytes).map_err(|e| PdfQaError::ParseError(e.to_string()))?;
        Ok(Self::from_lopdf(doc))
    }

    /// Parse a PDF staged on disk
    pub fn load(path: &Path) -> Result<Self, PdfQaError> {
        let bytes = std::fs::read(path)
            .map_err(|e| PdfQaError::ParseError(format!("{}: {}", path.display(), e)))?;
        Self::load_mem(&bytes)
    }

    pub fn from_lopdf(doc: Document) -> Self {
        let pages = doc.get_pages().into_values().collect();
        Self { inner: doc, pages }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub(crate) fn page_id(&self, index: usize) -> Result<ObjectId, PdfQaError> {
        self.pages
            .get(index)
            .copied()
            .ok_or(PdfQaError::PageOutOfRange {
                index,
                count: self.pages.len(),
            })
    }

    pub(crate) fn inner(&self) -> &Document {
        &self.inner
    }

    pub(crate) fn inner_mut(&mut self) -> &mut Document {
        &mut self.inner
    }

    /// Page bounds in default user space, inherited through the page tree
    pub fn media_box(&self, index: usize) -> Result<Rect, PdfQaError> {
        let page_id = self.page_id(index)?;
        let rect = inherited(&self.inner, page_id, b"MediaBox")
            .and_then(|o| resolve(&self.inner, o).as_array().ok())
            .filter(|arr| arr.len() == 4)
            .and_then(|arr| {
                let values: Vec<f64> = arr
                    .iter()
                    .filter_map(|o| number(resolve(&self.inner, o)))
                    .collect();
                match values.as_slice() {
                    [x0, y0, x1, y1] => Some(Rect::from_corners(*x0, *y0, *x1, *y1)),
                    _ => None,
                }
            })
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_MEDIA_BOX);
        Ok(rect)
    }

    /// Font resources visible to a page, keyed by resource name
    ///
    /// `Resources` is looked up through the page tree, whether it is stored
    /// inline or by reference at each level.
    pub(crate) fn page_fonts(&self, index: usize) -> Result<HashMap<Vec<u8>, FontInfo>, PdfQaError> {
        let page_id = self.page_id(index)?;
        let mut fonts = HashMap::new();

        let font_dict = inherited(&self.inner, page_id, b"Resources")
            .and_then(|o| resolve(&self.inner, o).as_dict().ok())
            .and_then(|res| res.get(b"Font").ok())
            .and_then(|o| resolve(&self.inner, o).as_dict().ok());

        if let Some(font_dict) = font_dict {
            for (name, obj) in font_dict.iter() {
                if let Ok(dict) = resolve(&self.inner, obj).as_dict() {
                    fonts.insert(name.clone(), FontInfo::from_dict(&self.inner, dict));
                }
            }
        }

        Ok(fonts)
    }

    /// Decoded content of every stream in the page's `Contents`
    pub(crate) fn page_content(&self, index: usize) -> Result<Vec<u8>, PdfQaError> {
        let page_id = self.page_id(index)?;
        self.inner
            .get_page_content(page_id)
            .map_err(|e| PdfQaError::ContentError(e.to_string()))
    }

    /// Replace the page's content with a single new stream
    ///
    /// The old streams become unreferenced and are dropped by `finalize`.
    pub(crate) fn replace_page_content(
        &mut self,
        index: usize,
        content: Vec<u8>,
    ) -> Result<(), PdfQaError> {
        let page_id = self.page_id(index)?;
        let stream_id = self
            .inner
            .add_object(Stream::new(Dictionary::new(), content));
        let page = self
            .inner
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(|e| PdfQaError::ContentError(e.to_string()))?;
        page.set("Contents", Object::Reference(stream_id));
        debug!(page = index, ?stream_id, "replaced page content");
        Ok(())
    }

    /// Interpret the page's content stream into positioned glyphs
    pub fn page_layout(&self, index: usize) -> Result<PageLayout, PdfQaError> {
        PageLayout::build(self, index)
    }

    /// Serialize the document and close it
    ///
    /// Unreferenced objects are pruned first so content removed by a
    /// redaction commit does not survive in orphaned streams.
    pub fn finalize(mut self) -> Result<Vec<u8>, PdfQaError> {
        self.inner.prune_objects();
        self.inner.compress();

        let mut output = Vec::new();
        self.inner
            .save_to(&mut output)
            .map_err(|e| PdfQaError::SerializationError(e.to_string()))?;
        Ok(output)
    }
}

/// Follow indirect references to the underlying object
pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    let mut current = obj;
    for _ in 0..MAX_DEPTH {
        match current {
            Object::Reference(id) => match doc.get_object(*id) {
                Ok(next) => current = next,
                Err(_) => return current,
            },
            _ => return current,
        }
    }
    current
}

/// Look up a page attribute, walking `Parent` links for inherited values
pub(crate) fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut dict = doc.get_object(page_id).ok()?.as_dict().ok()?;
    for _ in 0..MAX_DEPTH {
        if let Ok(value) = dict.get(key) {
            return Some(value);
        }
        dict = match dict.get(b"Parent") {
            Ok(parent) => resolve(doc, parent).as_dict().ok()?,
            Err(_) => return None,
        };
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{build_pdf, TestPage};

    #[test]
    fn test_rejects_non_pdf_bytes() {
        let result = PdfDocument::load_mem(b"hello world");
        assert!(matches!(result, Err(PdfQaError::ParseError(_))));
    }

    #[test]
    fn test_load_from_staged_file() {
        use std::io::Write;

        let mut staged = tempfile::NamedTempFile::new().unwrap();
        staged
            .write_all(&build_pdf(&[TestPage::lines(&["staged"])]))
            .unwrap();
        let doc = PdfDocument::load(staged.path()).unwrap();
        assert_eq!(doc.page_count(), 1);
    }

    #[test]
    fn test_page_count_and_media_box() {
        let pdf = build_pdf(&[TestPage::lines(&["one"]), TestPage::lines(&["two"])]);
        let doc = PdfDocument::load_mem(&pdf).unwrap();
        assert_eq!(doc.page_count(), 2);
        assert_eq!(
            doc.media_box(0).unwrap(),
            Rect::new(0.0, 0.0, 612.0, 792.0)
        );
    }

    #[test]
    fn test_page_out_of_range() {
        let pdf = build_pdf(&[TestPage::lines(&["only"])]);
        let doc = PdfDocument::load_mem(&pdf).unwrap();
        assert!(matches!(
            doc.media_box(3),
            Err(PdfQaError::PageOutOfRange { index: 3, count: 1 })
        ));
    }

    #[test]
    fn test_finalize_round_trips() {
        let pdf = build_pdf(&[TestPage::lines(&["hello"])]);
        let doc = PdfDocument::load_mem(&pdf).unwrap();
        let out = doc.finalize().unwrap();
        assert!(out.starts_with(b"%PDF-"));
        let reopened = PdfDocument::load_mem(&out).unwrap();
        assert_eq!(reopened.page_count(), 1);
    }

    #[test]
    fn test_fonts_inherited_from_page_tree() {
        let pdf = build_pdf(&[TestPage::lines(&["hello"])]);
        let doc = PdfDocument::load_mem(&pdf).unwrap();
        let fonts = doc.page_fonts(0).unwrap();
        assert!(fonts.contains_key(b"F1".as_slice()));
    }

    #[test]
    fn test_inline_parent_resources_are_found() {
        // The fixture stores Resources as a direct dictionary on the Pages node
        let pdf = build_pdf(&[TestPage::lines(&["hello"])]);
        let doc = PdfDocument::load_mem(&pdf).unwrap();
        let page_id = doc.page_id(0).unwrap();
        let page = doc.inner().get_dictionary(page_id).unwrap();
        assert!(page.get(b"Resources").is_err());
        assert_eq!(doc.page_fonts(0).unwrap().len(), 1);
    }
}
