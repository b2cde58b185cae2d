//! PDF fixtures for unit tests

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};

pub const LEFT_MARGIN: i64 = 72;
pub const TOP_LINE: i64 = 720;
pub const LINE_HEIGHT: i64 = 20;
pub const FONT_SIZE: i64 = 12;

pub struct TestPage {
    operations: Vec<Operation>,
}

impl TestPage {
    /// One `Tj` per line, Helvetica 12pt, 20pt leading
    pub fn lines(lines: &[&str]) -> Self {
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![Object::Name(b"F1".to_vec()), Object::Integer(FONT_SIZE)],
            ),
            Operation::new("TL", vec![Object::Integer(LINE_HEIGHT)]),
            Operation::new(
                "Td",
                vec![Object::Integer(LEFT_MARGIN), Object::Integer(TOP_LINE)],
            ),
        ];
        for (i, line) in lines.iter().enumerate() {
            if i > 0 {
                operations.push(Operation::new("T*", vec![]));
            }
            operations.push(Operation::new("Tj", vec![literal(line)]));
        }
        operations.push(Operation::new("ET", vec![]));
        Self { operations }
    }

    pub fn raw(operations: Vec<Operation>) -> Self {
        Self { operations }
    }

    pub fn empty() -> Self {
        Self { operations: vec![] }
    }
}

pub fn literal(text: &str) -> Object {
    Object::String(text.as_bytes().to_vec(), StringFormat::Literal)
}

/// Advance of every glyph in the Type0 fixture font, in 1/1000 em
pub const TYPE0_WIDTH: i64 = 600;

const TYPE0_TO_UNICODE: &[u8] = b"/CIDInit /ProcSet findresource begin
12 dict begin
begincmap
1 begincodespacerange
<0000> <FFFF>
endcodespacerange
1 beginbfrange
<0003> <0061> <0020>
endbfrange
endcmap
";

/// Build a document with a shared Helvetica resource on the page tree root
pub fn build_pdf(pages: &[TestPage]) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    assemble(doc, pages, font_id)
}

/// Glyph id of a printable ASCII char in the Type0 fixture font
pub fn type0_gid(c: char) -> u16 {
    c as u16 - 29
}

/// One page of `Tj` lines set in an Identity-H Type0 font
///
/// Strings hold two-byte glyph ids (`type0_gid`), which only the font's
/// `ToUnicode` CMap maps back to text.
pub fn build_type0_pdf(lines: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let to_unicode = doc.add_object(Stream::new(Dictionary::new(), TYPE0_TO_UNICODE.to_vec()));
    let descendant = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "CIDFontType2",
        "BaseFont" => "ABCDEF+FixtureMono",
        "DW" => TYPE0_WIDTH,
    });
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type0",
        "BaseFont" => "ABCDEF+FixtureMono",
        "Encoding" => "Identity-H",
        "DescendantFonts" => vec![Object::Reference(descendant)],
        "ToUnicode" => Object::Reference(to_unicode),
    });

    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new(
            "Tf",
            vec![Object::Name(b"F1".to_vec()), Object::Integer(FONT_SIZE)],
        ),
        Operation::new("TL", vec![Object::Integer(LINE_HEIGHT)]),
        Operation::new(
            "Td",
            vec![Object::Integer(LEFT_MARGIN), Object::Integer(TOP_LINE)],
        ),
    ];
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            operations.push(Operation::new("T*", vec![]));
        }
        let codes: Vec<u8> = line
            .chars()
            .flat_map(|c| type0_gid(c).to_be_bytes())
            .collect();
        operations.push(Operation::new(
            "Tj",
            vec![Object::String(codes, StringFormat::Hexadecimal)],
        ));
    }
    operations.push(Operation::new("ET", vec![]));

    assemble(doc, &[TestPage::raw(operations)], font_id)
}

fn assemble(mut doc: Document, pages: &[TestPage], font_id: ObjectId) -> Vec<u8> {
    let pages_id = doc.new_object_id();

    let mut page_ids = Vec::new();
    for page in pages {
        let content = Content {
            operations: page.operations.clone(),
        };
        let content_id = doc.add_object(Stream::new(
            Dictionary::new(),
            content.encode().unwrap(),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "Contents" => Object::Reference(content_id),
        });
        page_ids.push(page_id);
    }

    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Count" => page_ids.len() as i64,
        "Kids" => page_ids.iter().map(|id| Object::Reference(*id)).collect::<Vec<_>>(),
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        "Resources" => dictionary! {
            "Font" => dictionary! { "F1" => Object::Reference(font_id) },
        },
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}
