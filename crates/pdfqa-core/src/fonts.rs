//! Font decoding for text layout
//!
//! Maps content-stream string bytes to glyph codes, glyph codes to Unicode,
//! and glyph codes to advance widths (in 1/1000 em).

use std::collections::HashMap;

use lopdf::{Dictionary, Document, Object};

use crate::document::resolve;

/// Default ascent/descent in em units when the font descriptor has none
const DEFAULT_ASCENT: f64 = 0.8;
const DEFAULT_DESCENT: f64 = -0.2;

/// Helvetica advance widths for codes 32..=126
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // 32-47
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // 48-63
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // 64-79
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // 80-95
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // 96-111
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // 112-126
];

/// Base encoding for simple fonts that name none (or an unknown one)
const DEFAULT_ENCODING: &str = "WinAnsiEncoding";

/// Single-byte base encodings lopdf can decode
const BASE_ENCODINGS: [&str; 4] = [
    "WinAnsiEncoding",
    "MacRomanEncoding",
    "StandardEncoding",
    "MacExpertEncoding",
];

/// Glyph names used in `/Differences` arrays that are not single letters
const GLYPH_NAMES: &[(&str, &str)] = &[
    ("space", " "), ("exclam", "!"), ("quotedbl", "\""), ("numbersign", "#"),
    ("dollar", "$"), ("percent", "%"), ("ampersand", "&"), ("quotesingle", "'"),
    ("parenleft", "("), ("parenright", ")"), ("asterisk", "*"), ("plus", "+"),
    ("comma", ","), ("hyphen", "-"), ("period", "."), ("slash", "/"),
    ("zero", "0"), ("one", "1"), ("two", "2"), ("three", "3"), ("four", "4"),
    ("five", "5"), ("six", "6"), ("seven", "7"), ("eight", "8"), ("nine", "9"),
    ("colon", ":"), ("semicolon", ";"), ("less", "<"), ("equal", "="),
    ("greater", ">"), ("question", "?"), ("at", "@"), ("bracketleft", "["),
    ("backslash", "\\"), ("bracketright", "]"), ("asciicircum", "^"),
    ("underscore", "_"), ("grave", "`"), ("braceleft", "{"), ("bar", "|"),
    ("braceright", "}"), ("asciitilde", "~"), ("nbspace", "\u{a0}"),
    ("quoteleft", "‘"), ("quoteright", "’"), ("quotedblleft", "“"),
    ("quotedblright", "”"), ("quotesinglbase", "‚"), ("quotedblbase", "„"),
    ("guilsinglleft", "‹"), ("guilsinglright", "›"), ("guillemotleft", "«"),
    ("guillemotright", "»"), ("endash", "–"), ("emdash", "—"), ("minus", "−"),
    ("bullet", "•"), ("ellipsis", "…"), ("dagger", "†"), ("daggerdbl", "‡"),
    ("periodcentered", "·"), ("section", "§"), ("paragraph", "¶"),
    ("degree", "°"), ("copyright", "©"), ("registered", "®"), ("trademark", "™"),
    ("Euro", "€"), ("sterling", "£"), ("yen", "¥"), ("cent", "¢"),
    ("multiply", "×"), ("divide", "÷"), ("plusminus", "±"), ("mu", "µ"),
    ("fi", "fi"), ("fl", "fl"), ("ff", "ff"), ("ffi", "ffi"), ("ffl", "ffl"),
    ("germandbls", "ß"), ("ae", "æ"), ("AE", "Æ"), ("oe", "œ"), ("OE", "Œ"),
    ("oslash", "ø"), ("Oslash", "Ø"), ("dotlessi", "ı"),
];

/// Accent suffixes of Latin letter glyph names, as combining marks
const ACCENTS: &[(&str, char)] = &[
    ("acute", '\u{301}'),
    ("grave", '\u{300}'),
    ("circumflex", '\u{302}'),
    ("dieresis", '\u{308}'),
    ("tilde", '\u{303}'),
    ("ring", '\u{30A}'),
    ("cedilla", '\u{327}'),
    ("caron", '\u{30C}'),
];

/// Precomposed Latin-1 and Latin Extended-A letters, searched by decomposition
const PRECOMPOSED: &[(char, char, char)] = &[
    ('À', 'A', '\u{300}'), ('Á', 'A', '\u{301}'), ('Â', 'A', '\u{302}'), ('Ã', 'A', '\u{303}'),
    ('Ä', 'A', '\u{308}'), ('Å', 'A', '\u{30A}'), ('Ç', 'C', '\u{327}'), ('È', 'E', '\u{300}'),
    ('É', 'E', '\u{301}'), ('Ê', 'E', '\u{302}'), ('Ë', 'E', '\u{308}'), ('Ì', 'I', '\u{300}'),
    ('Í', 'I', '\u{301}'), ('Î', 'I', '\u{302}'), ('Ï', 'I', '\u{308}'), ('Ñ', 'N', '\u{303}'),
    ('Ò', 'O', '\u{300}'), ('Ó', 'O', '\u{301}'), ('Ô', 'O', '\u{302}'), ('Õ', 'O', '\u{303}'),
    ('Ö', 'O', '\u{308}'), ('Ù', 'U', '\u{300}'), ('Ú', 'U', '\u{301}'), ('Û', 'U', '\u{302}'),
    ('Ü', 'U', '\u{308}'), ('Ý', 'Y', '\u{301}'), ('Ÿ', 'Y', '\u{308}'), ('Š', 'S', '\u{30C}'),
    ('Ž', 'Z', '\u{30C}'), ('Č', 'C', '\u{30C}'),
    ('à', 'a', '\u{300}'), ('á', 'a', '\u{301}'), ('â', 'a', '\u{302}'), ('ã', 'a', '\u{303}'),
    ('ä', 'a', '\u{308}'), ('å', 'a', '\u{30A}'), ('ç', 'c', '\u{327}'), ('è', 'e', '\u{300}'),
    ('é', 'e', '\u{301}'), ('ê', 'e', '\u{302}'), ('ë', 'e', '\u{308}'), ('ì', 'i', '\u{300}'),
    ('í', 'i', '\u{301}'), ('î', 'i', '\u{302}'), ('ï', 'i', '\u{308}'), ('ñ', 'n', '\u{303}'),
    ('ò', 'o', '\u{300}'), ('ó', 'o', '\u{301}'), ('ô', 'o', '\u{302}'), ('õ', 'o', '\u{303}'),
    ('ö', 'o', '\u{308}'), ('ù', 'u', '\u{300}'), ('ú', 'u', '\u{301}'), ('û', 'u', '\u{302}'),
    ('ü', 'u', '\u{308}'), ('ý', 'y', '\u{301}'), ('ÿ', 'y', '\u{308}'), ('š', 's', '\u{30C}'),
    ('ž', 'z', '\u{30C}'), ('č', 'c', '\u{30C}'),
];

#[derive(Debug, Clone, Copy, PartialEq)]
enum FallbackMetrics {
    Proportional,
    Monospace,
}

#[derive(Debug, Clone, Default)]
enum Widths {
    #[default]
    None,
    Simple {
        first_char: u32,
        widths: Vec<f64>,
        missing: Option<f64>,
    },
    Cid {
        ranges: Vec<(u32, u32, f64)>,
        default: f64,
    },
}

/// Decoded view of one font resource
#[derive(Debug, Clone)]
pub struct FontInfo {
    two_byte: bool,
    to_unicode: Option<CMap>,
    /// Code to text for simple fonts, 256 entries; empty for composite fonts
    encoding: Vec<String>,
    widths: Widths,
    fallback: FallbackMetrics,
    pub ascent: f64,
    pub descent: f64,
}

/// Used when a `Tf` names a font the page does not define
pub(crate) static FALLBACK_FONT: FontInfo = FontInfo {
    two_byte: false,
    to_unicode: None,
    encoding: Vec::new(),
    widths: Widths::None,
    fallback: FallbackMetrics::Proportional,
    ascent: DEFAULT_ASCENT,
    descent: DEFAULT_DESCENT,
};

impl Default for FontInfo {
    fn default() -> Self {
        FALLBACK_FONT.clone()
    }
}

impl FontInfo {
    pub fn from_dict(doc: &Document, font: &Dictionary) -> Self {
        let subtype = name_of(font.get(b"Subtype").ok());
        let base_font = name_of(font.get(b"BaseFont").ok()).unwrap_or_default();
        let two_byte = subtype.as_deref() == Some("Type0");

        let fallback = if base_font.contains("Courier") || base_font.contains("Mono") {
            FallbackMetrics::Monospace
        } else {
            FallbackMetrics::Proportional
        };

        let to_unicode = font
            .get(b"ToUnicode")
            .ok()
            .map(|o| resolve(doc, o))
            .and_then(|o| match o {
                Object::Stream(stream) => {
                    let data = stream
                        .decompressed_content()
                        .unwrap_or_else(|_| stream.content.clone());
                    Some(CMap::parse(&data))
                }
                _ => None,
            })
            .filter(|cmap| !cmap.is_empty());

        // Metrics live on the descendant for composite fonts
        let descendant = if two_byte {
            font.get(b"DescendantFonts")
                .ok()
                .map(|o| resolve(doc, o))
                .and_then(|o| o.as_array().ok())
                .and_then(|arr| arr.first())
                .map(|o| resolve(doc, o))
                .and_then(|o| o.as_dict().ok())
        } else {
            None
        };

        let metrics_dict = descendant.unwrap_or(font);
        let descriptor = metrics_dict
            .get(b"FontDescriptor")
            .ok()
            .map(|o| resolve(doc, o))
            .and_then(|o| o.as_dict().ok());

        let (ascent, descent) = descriptor
            .map(|d| {
                let ascent = d
                    .get(b"Ascent")
                    .ok()
                    .and_then(number)
                    .filter(|v| *v > 0.0)
                    .map(|v| v / 1000.0)
                    .unwrap_or(DEFAULT_ASCENT);
                let descent = d
                    .get(b"Descent")
                    .ok()
                    .and_then(number)
                    .filter(|v| *v < 0.0)
                    .map(|v| v / 1000.0)
                    .unwrap_or(DEFAULT_DESCENT);
                (ascent, descent)
            })
            .unwrap_or((DEFAULT_ASCENT, DEFAULT_DESCENT));

        let widths = if let Some(cid) = descendant {
            cid_widths(doc, cid)
        } else {
            simple_widths(doc, font, descriptor)
        };

        let encoding = if two_byte {
            Vec::new()
        } else {
            simple_encoding(doc, font)
        };

        Self {
            two_byte,
            to_unicode,
            encoding,
            widths,
            fallback,
            ascent,
            descent,
        }
    }

    /// Split string bytes into glyph codes
    pub fn codes<'a>(&self, bytes: &'a [u8]) -> Vec<&'a [u8]> {
        if self.two_byte {
            bytes.chunks(2).collect()
        } else {
            bytes.chunks(1).collect()
        }
    }

    pub fn decode(&self, code: &[u8]) -> String {
        let value = code_value(code);
        if let Some(mapped) = self.to_unicode.as_ref().and_then(|c| c.lookup(value)) {
            return mapped;
        }
        if self.two_byte {
            return char::from_u32(value)
                .map(String::from)
                .unwrap_or_else(|| '\u{FFFD}'.to_string());
        }
        match self.encoding.get(value as usize) {
            Some(text) => text.clone(),
            None => Document::decode_text(Some(DEFAULT_ENCODING), code),
        }
    }

    /// Advance width in glyph units (1/1000 em)
    pub fn width(&self, code: &[u8]) -> f64 {
        let value = code_value(code);
        match &self.widths {
            Widths::Simple {
                first_char,
                widths,
                missing,
            } => {
                if value >= *first_char {
                    if let Some(w) = widths.get((value - first_char) as usize) {
                        return *w;
                    }
                }
                missing.unwrap_or_else(|| self.fallback_width(value))
            }
            Widths::Cid { ranges, default } => ranges
                .iter()
                .find(|(lo, hi, _)| value >= *lo && value <= *hi)
                .map(|(_, _, w)| *w)
                .unwrap_or(*default),
            Widths::None => self.fallback_width(value),
        }
    }

    /// Word spacing (`Tw`) only applies to the single-byte code 32
    pub fn is_word_space(&self, code: &[u8]) -> bool {
        code == b" "
    }

    fn fallback_width(&self, value: u32) -> f64 {
        match self.fallback {
            FallbackMetrics::Monospace => 600.0,
            FallbackMetrics::Proportional => {
                if (32..=126).contains(&value) {
                    HELVETICA_WIDTHS[(value - 32) as usize] as f64
                } else {
                    500.0
                }
            }
        }
    }
}

fn simple_widths(doc: &Document, font: &Dictionary, descriptor: Option<&Dictionary>) -> Widths {
    let first_char = font.get(b"FirstChar").ok().and_then(number);
    let widths = font
        .get(b"Widths")
        .ok()
        .map(|o| resolve(doc, o))
        .and_then(|o| o.as_array().ok());
    let missing = descriptor
        .and_then(|d| d.get(b"MissingWidth").ok())
        .and_then(number)
        .filter(|w| *w > 0.0);

    match (first_char, widths) {
        (Some(first), Some(arr)) if first >= 0.0 => Widths::Simple {
            first_char: first as u32,
            widths: arr
                .iter()
                .map(|o| number(resolve(doc, o)).unwrap_or(0.0))
                .collect(),
            missing,
        },
        _ => Widths::None,
    }
}

/// Resolve `/Encoding` (a base encoding name, or a dictionary with
/// `BaseEncoding` and `Differences`) into a table indexed by code
fn simple_encoding(doc: &Document, font: &Dictionary) -> Vec<String> {
    let (base, differences) = match font.get(b"Encoding").ok().map(|o| resolve(doc, o)) {
        Some(Object::Name(name)) => (String::from_utf8_lossy(name).into_owned(), None),
        Some(Object::Dictionary(dict)) => (
            name_of(dict.get(b"BaseEncoding").ok().map(|o| resolve(doc, o)))
                .unwrap_or_else(|| DEFAULT_ENCODING.to_string()),
            dict.get(b"Differences")
                .ok()
                .map(|o| resolve(doc, o))
                .and_then(|o| o.as_array().ok()),
        ),
        _ => (DEFAULT_ENCODING.to_string(), None),
    };
    let base_encoding = if BASE_ENCODINGS.contains(&base.as_str()) {
        base.as_str()
    } else {
        DEFAULT_ENCODING
    };

    let mut table: Vec<String> = (0..=255u8)
        .map(|code| Document::decode_text(Some(base_encoding), &[code]))
        .collect();

    if let Some(items) = differences {
        // `code name name ... code name ...`: each name takes the next code
        let mut next: Option<usize> = None;
        for item in items {
            match resolve(doc, item) {
                Object::Integer(code) => next = usize::try_from(*code).ok(),
                Object::Name(name) => {
                    let Some(code) = next.filter(|c| *c < table.len()) else {
                        continue;
                    };
                    if let Some(text) = glyph_text(&String::from_utf8_lossy(name)) {
                        table[code] = text;
                    }
                    next = Some(code + 1);
                }
                _ => {}
            }
        }
    }

    table
}

/// Unicode text for a glyph name: `uniXXXX`, `uXXXX`, ligatures joined
/// with `_`, single letters, accented Latin letters and common symbols
fn glyph_text(name: &str) -> Option<String> {
    let name = name.split('.').next().unwrap_or(name);
    if name.contains('_') {
        return name
            .split('_')
            .map(glyph_text)
            .collect::<Option<Vec<_>>>()
            .map(|parts| parts.concat());
    }

    if let Some(hex) = name.strip_prefix("uni") {
        if !hex.is_empty() && hex.len() % 4 == 0 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
            let units: Vec<u16> = hex
                .as_bytes()
                .chunks(4)
                .filter_map(|chunk| u16::from_str_radix(std::str::from_utf8(chunk).ok()?, 16).ok())
                .collect();
            return Some(String::from_utf16_lossy(&units));
        }
    }
    if let Some(hex) = name.strip_prefix('u') {
        if (4..=6).contains(&hex.len()) && hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return u32::from_str_radix(hex, 16)
                .ok()
                .and_then(char::from_u32)
                .map(String::from);
        }
    }

    let mut chars = name.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if c.is_ascii_alphabetic() {
            return Some(c.to_string());
        }
    }

    if let Some((_, text)) = GLYPH_NAMES.iter().find(|(n, _)| *n == name) {
        return Some(text.to_string());
    }

    ACCENTS.iter().find_map(|(suffix, mark)| {
        let base = name.strip_suffix(suffix)?;
        let mut letters = base.chars();
        let (Some(letter), None) = (letters.next(), letters.next()) else {
            return None;
        };
        PRECOMPOSED
            .iter()
            .find(|(_, b, m)| *b == letter && m == mark)
            .map(|(composed, _, _)| composed.to_string())
    })
}

fn cid_widths(doc: &Document, cid_font: &Dictionary) -> Widths {
    let default = cid_font
        .get(b"DW")
        .ok()
        .and_then(number)
        .unwrap_or(1000.0);
    let mut ranges = Vec::new();

    let w = cid_font
        .get(b"W")
        .ok()
        .map(|o| resolve(doc, o))
        .and_then(|o| o.as_array().ok());

    if let Some(items) = w {
        // Entries are either `c [w1 w2 ...]` or `c_first c_last w`
        let mut i = 0;
        while i < items.len() {
            let Some(start) = number(resolve(doc, &items[i])) else {
                break;
            };
            let start = start as u32;
            match items.get(i + 1).map(|o| resolve(doc, o)) {
                Some(Object::Array(list)) => {
                    for (offset, width) in list.iter().enumerate() {
                        if let Some(width) = number(resolve(doc, width)) {
                            let cid = start + offset as u32;
                            ranges.push((cid, cid, width));
                        }
                    }
                    i += 2;
                }
                Some(end) => {
                    let end = number(end).unwrap_or(start as f64) as u32;
                    let width = items
                        .get(i + 2)
                        .map(|o| resolve(doc, o))
                        .and_then(number)
                        .unwrap_or(default);
                    ranges.push((start, end, width));
                    i += 3;
                }
                None => break,
            }
        }
    }

    Widths::Cid { ranges, default }
}

fn code_value(code: &[u8]) -> u32 {
    code.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32)
}

pub(crate) fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

fn name_of(obj: Option<&Object>) -> Option<String> {
    match obj {
        Some(Object::Name(name)) => Some(String::from_utf8_lossy(name).into_owned()),
        _ => None,
    }
}

/// A `ToUnicode` CMap reduced to its `bfchar` and `bfrange` mappings
#[derive(Debug, Clone, Default)]
pub struct CMap {
    chars: HashMap<u32, String>,
    ranges: Vec<BfRange>,
}

#[derive(Debug, Clone)]
enum BfRange {
    Offset { lo: u32, hi: u32, base: Vec<u16> },
    List { lo: u32, hi: u32, targets: Vec<String> },
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Hex(Vec<u8>),
    Word(String),
    ArrayStart,
    ArrayEnd,
}

impl CMap {
    pub fn parse(data: &[u8]) -> Self {
        let tokens = tokenize(data);
        let mut cmap = CMap::default();
        let mut i = 0;

        while i < tokens.len() {
            match &tokens[i] {
                Token::Word(w) if w == "beginbfchar" => {
                    i += 1;
                    while i + 1 < tokens.len() {
                        match (&tokens[i], &tokens[i + 1]) {
                            (Token::Hex(src), Token::Hex(dst)) => {
                                cmap.chars.insert(code_value(src), utf16_be(dst));
                                i += 2;
                            }
                            _ => break,
                        }
                    }
                }
                Token::Word(w) if w == "beginbfrange" => {
                    i += 1;
                    while i + 2 < tokens.len() {
                        let (Token::Hex(lo), Token::Hex(hi)) = (&tokens[i], &tokens[i + 1]) else {
                            break;
                        };
                        let (lo, hi) = (code_value(lo), code_value(hi));
                        match &tokens[i + 2] {
                            Token::Hex(dst) => {
                                cmap.ranges.push(BfRange::Offset {
                                    lo,
                                    hi,
                                    base: utf16_units(dst),
                                });
                                i += 3;
                            }
                            Token::ArrayStart => {
                                let mut targets = Vec::new();
                                i += 3;
                                while let Some(Token::Hex(dst)) = tokens.get(i) {
                                    targets.push(utf16_be(dst));
                                    i += 1;
                                }
                                if tokens.get(i) == Some(&Token::ArrayEnd) {
                                    i += 1;
                                }
                                cmap.ranges.push(BfRange::List { lo, hi, targets });
                            }
                            _ => break,
                        }
                    }
                }
                _ => i += 1,
            }
        }

        cmap
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty() && self.ranges.is_empty()
    }

    pub fn lookup(&self, code: u32) -> Option<String> {
        if let Some(s) = self.chars.get(&code) {
            return Some(s.clone());
        }
        self.ranges.iter().find_map(|range| match range {
            BfRange::Offset { lo, hi, base } if code >= *lo && code <= *hi => {
                let mut units = base.clone();
                if let Some(last) = units.last_mut() {
                    *last = last.wrapping_add((code - lo) as u16);
                }
                Some(String::from_utf16_lossy(&units))
            }
            BfRange::List { lo, hi, targets } if code >= *lo && code <= *hi => {
                targets.get((code - lo) as usize).cloned()
            }
            _ => None,
        })
    }
}

fn utf16_units(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]),
            [single] => *single as u16,
            _ => 0,
        })
        .collect()
}

fn utf16_be(bytes: &[u8]) -> String {
    String::from_utf16_lossy(&utf16_units(bytes))
}

fn tokenize(data: &[u8]) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < data.len() {
        let b = data[i];
        match b {
            b'%' => {
                while i < data.len() && data[i] != b'\n' && data[i] != b'\r' {
                    i += 1;
                }
            }
            b'<' if data.get(i + 1) == Some(&b'<') => i += 2,
            b'>' if data.get(i + 1) == Some(&b'>') => i += 2,
            b'<' => {
                let start = i + 1;
                let end = data[start..]
                    .iter()
                    .position(|c| *c == b'>')
                    .map(|p| start + p)
                    .unwrap_or(data.len());
                let digits: Vec<u8> = data[start..end]
                    .iter()
                    .copied()
                    .filter(|c| c.is_ascii_hexdigit())
                    .collect();
                tokens.push(Token::Hex(hex_bytes(&digits)));
                i = end + 1;
            }
            b'[' => {
                tokens.push(Token::ArrayStart);
                i += 1;
            }
            b']' => {
                tokens.push(Token::ArrayEnd);
                i += 1;
            }
            b'(' => {
                // Literal strings only appear in CMap metadata
                let mut depth = 0;
                while i < data.len() {
                    match data[i] {
                        b'\\' => i += 1,
                        b'(' => depth += 1,
                        b')' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    i += 1;
                }
                i += 1;
            }
            c if c.is_ascii_whitespace() => i += 1,
            _ => {
                let start = i;
                while i < data.len()
                    && !data[i].is_ascii_whitespace()
                    && !matches!(data[i], b'<' | b'>' | b'[' | b']' | b'(' | b'%')
                {
                    i += 1;
                }
                if i == start {
                    i += 1;
                    continue;
                }
                tokens.push(Token::Word(
                    String::from_utf8_lossy(&data[start..i]).into_owned(),
                ));
            }
        }
    }

    tokens
}

fn hex_bytes(digits: &[u8]) -> Vec<u8> {
    let nibble = |c: u8| (c as char).to_digit(16).unwrap_or(0) as u8;
    digits
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => (nibble(*hi) << 4) | nibble(*lo),
            [hi] => nibble(*hi) << 4,
            _ => 0,
        })
        .collect()
}
