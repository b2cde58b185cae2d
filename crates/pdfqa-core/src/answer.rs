//! Question-answer response parsing
//!
//! The model is asked for a short answer followed by a line starting with
//! [`RELEVANT_TEXT_MARKER`] and a verbatim quote from the document. The
//! first occurrence of the marker splits the response once; the answer and
//! the excerpt are both derived from that split.

use serde::Serialize;

pub const RELEVANT_TEXT_MARKER: &str = "Relevant text:";

const QUOTE_PAIRS: [(char, char); 4] = [('"', '"'), ('\'', '\''), ('“', '”'), ('‘', '’')];

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ParsedAnswer {
    /// Response text before the marker, trimmed of whitespace and emphasis
    pub answer: String,
    /// Cleaned quote after the marker, if any
    pub excerpt: Option<String>,
    /// Excerpt split into sentences, each searched for separately
    pub sentences: Vec<String>,
}

/// Split a raw model response into answer and excerpt
///
/// A response without the marker is all answer. Never fails.
pub fn parse_answer(raw: &str) -> ParsedAnswer {
    let Some((before, after)) = raw.split_once(RELEVANT_TEXT_MARKER) else {
        return ParsedAnswer {
            answer: raw.trim().to_string(),
            ..Default::default()
        };
    };

    let excerpt = clean_excerpt(excerpt_source(after));
    let sentences = excerpt.as_deref().map(split_sentences).unwrap_or_default();

    ParsedAnswer {
        answer: strip_emphasis(before.trim()).to_string(),
        excerpt,
        sentences,
    }
}

/// The rest of the marker's line, or the paragraph below it when that is empty
fn excerpt_source(after: &str) -> &str {
    let (line, rest) = after.split_once('\n').unwrap_or((after, ""));
    if strip_emphasis(line.trim()).is_empty() {
        first_paragraph(rest)
    } else {
        line
    }
}

/// Text up to the first blank line
fn first_paragraph(text: &str) -> &str {
    let text = text.trim_start();
    let mut end = text.len();
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if offset > 0 && line.trim().is_empty() {
            end = offset;
            break;
        }
        offset += line.len();
    }
    &text[..end]
}

fn clean_excerpt(text: &str) -> Option<String> {
    let text = strip_emphasis(text.trim());
    let text = strip_quotes(text);
    let text = strip_emphasis(text);
    let collapsed = collapse_line_breaks(text);
    let cleaned = collapsed.trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

fn strip_emphasis(text: &str) -> &str {
    text.trim_matches('*').trim()
}

/// Remove one layer of surrounding quotes
///
/// Straight double and curly quotes are also removed when only one side is
/// present, which happens when the model truncates its quote.
fn strip_quotes(text: &str) -> &str {
    for (open, close) in QUOTE_PAIRS {
        if text.chars().count() >= 2 {
            if let Some(inner) = text.strip_prefix(open).and_then(|t| t.strip_suffix(close)) {
                return inner.trim();
            }
        }
    }
    let text = text.strip_prefix(&['"', '“'][..]).unwrap_or(text);
    text.strip_suffix(&['"', '”'][..]).unwrap_or(text).trim()
}

/// Replace every whitespace run containing a line break with one space
fn collapse_line_breaks(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut run = String::new();
    for c in text.chars() {
        if c.is_whitespace() {
            run.push(c);
            continue;
        }
        flush_run(&mut out, &mut run);
        out.push(c);
    }
    flush_run(&mut out, &mut run);
    out
}

fn flush_run(out: &mut String, run: &mut String) {
    if run.contains(&['\n', '\r'][..]) {
        out.push(' ');
    } else {
        out.push_str(run);
    }
    run.clear();
}

/// Split after `.`, `!` or `?` when followed by whitespace
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let ends_sentence = matches!(c, '.' | '!' | '?')
            && chars.peek().is_some_and(|(_, next)| next.is_whitespace());
        if ends_sentence {
            let end = i + c.len_utf8();
            push_trimmed(&mut sentences, &text[start..end]);
            start = end;
        }
    }
    push_trimmed(&mut sentences, &text[start..]);
    sentences
}

fn push_trimmed(sentences: &mut Vec<String>, segment: &str) {
    let segment = segment.trim();
    if !segment.is_empty() {
        sentences.push(segment.to_string());
    }
}
