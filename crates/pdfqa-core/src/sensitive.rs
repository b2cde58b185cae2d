//! Sensitive-data list parsing
//!
//! The model is asked for a `Sensitive Data:` header followed by one `- item`
//! bullet per finding. Responses vary: numbered lists, other bullet glyphs,
//! chatter around the list, or bare lines without bullets.

/// Responses meaning "nothing to redact"
const NOTHING_FOUND: [&str; 6] = [
    "none",
    "n/a",
    "none found",
    "no sensitive data",
    "no sensitive data found",
    "no sensitive data was found",
];

/// Parse a model response into literal strings to redact
///
/// Bullet lines win when present; otherwise every non-header line is an
/// entry. Order is kept and duplicates are not removed.
pub fn parse_sensitive_data(raw: &str) -> Vec<String> {
    let lines: Vec<&str> = raw.lines().map(str::trim).collect();
    let bullets: Vec<&str> = lines.iter().copied().filter_map(strip_bullet).collect();

    let candidates = if bullets.is_empty() {
        lines
            .into_iter()
            .filter(|line| !line.ends_with(':'))
            .collect()
    } else {
        bullets
    };

    candidates
        .into_iter()
        .map(clean_entry)
        .filter(|entry| !entry.is_empty() && !is_nothing_found(entry))
        .map(str::to_string)
        .collect()
}

/// Entry text of a bullet or enumerated line
fn strip_bullet(line: &str) -> Option<&str> {
    for marker in ["- ", "* ", "• ", "-\t", "*\t", "•\t"] {
        if let Some(rest) = line.strip_prefix(marker) {
            return Some(rest.trim());
        }
    }
    // A lone bullet glyph followed directly by text, e.g. "•a@b.com"
    if let Some(rest) = line.strip_prefix('•') {
        return Some(rest.trim());
    }
    // "-a@b.com" too, but not rules ("---"), negative numbers, emphasis
    // ("*Note*") or headers
    for marker in ['-', '*'] {
        if let Some(rest) = line.strip_prefix(marker) {
            let glued = rest
                .chars()
                .next()
                .is_some_and(|c| !c.is_whitespace() && !c.is_ascii_digit() && c != '-' && c != '*');
            if glued && !rest.ends_with(marker) && !rest.ends_with(':') {
                return Some(rest);
            }
        }
    }

    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            if rest.starts_with(char::is_whitespace) {
                return Some(rest.trim());
            }
        }
    }
    None
}

fn clean_entry(entry: &str) -> &str {
    let entry = entry.trim();
    for quote in ['"', '\'', '`'] {
        if entry.len() >= 2 {
            if let Some(inner) = entry.strip_prefix(quote).and_then(|e| e.strip_suffix(quote)) {
                return inner.trim();
            }
        }
    }
    for (open, close) in [('“', '”'), ('‘', '’')] {
        if let Some(inner) = entry.strip_prefix(open).and_then(|e| e.strip_suffix(close)) {
            return inner.trim();
        }
    }
    entry
}

fn is_nothing_found(entry: &str) -> bool {
    let normalized = entry.trim_end_matches('.').trim().to_ascii_lowercase();
    NOTHING_FOUND.contains(&normalized.as_str())
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property: every bulleted item comes back verbatim and in order
        #[test]
        fn bulleted_items_round_trip(
            items in prop::collection::vec("[A-Za-z0-9@.+()]{1,20}", 1..8)
        ) {
            let body: Vec<String> = items.iter().map(|i| format!("- {}", i)).collect();
            let raw = format!("Sensitive Data:\n{}", body.join("\n"));
            let parsed = parse_sensitive_data(&raw);
            let expected: Vec<String> = items
                .iter()
                .filter(|i| !is_nothing_found(i))
                .cloned()
                .collect();
            prop_assert_eq!(parsed, expected);
        }

        /// Property: no entry is ever empty or padded
        #[test]
        fn entries_are_trimmed_and_non_empty(raw in "\\PC{0,200}") {
            for entry in parse_sensitive_data(&raw) {
                prop_assert!(!entry.is_empty());
                prop_assert_eq!(entry.trim(), entry.as_str());
            }
        }
    }
}
