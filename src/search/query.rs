//! Parser for the search grammar.
//!
//! Tokens are `artist:<value>`, `album:<value>`, `song:<value>` /
//! `track:<value>`, or free text. Values may be single- or double-quoted
//! (with backslash escaping inside the quotes) to carry embedded spaces;
//! unquoted values are single words. Malformed fragments degrade to free
//! text instead of failing the whole query.

use serde::Serialize;

/// Result of parsing a raw search string. The term lists keep their input
/// order; presentation code uses them for match highlighting.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct ParsedTerms {
    pub artists: Vec<String>,
    pub albums: Vec<String>,
    pub tracks: Vec<String>,
    pub general: Vec<String>,
}

impl ParsedTerms {
    pub fn has_tags(&self) -> bool {
        !self.artists.is_empty() || !self.albums.is_empty() || !self.tracks.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_tags() && self.general.is_empty()
    }
}

#[derive(Clone, Copy)]
enum TagKind {
    Artist,
    Album,
    Track,
}

const TAG_NAMES: &[(&str, TagKind)] = &[
    ("artist:", TagKind::Artist),
    ("album:", TagKind::Album),
    ("song:", TagKind::Track),
    ("track:", TagKind::Track),
];

pub fn parse(input: &str) -> ParsedTerms {
    let mut terms = ParsedTerms::default();
    let mut rest = input.trim_start();

    while !rest.is_empty() {
        if let Some((kind, skip)) = tag_prefix(rest) {
            let (value, remainder, terminated) = scan_value(&rest[skip..]);
            if terminated && !value.is_empty() {
                match kind {
                    TagKind::Artist => terms.artists.push(value),
                    TagKind::Album => terms.albums.push(value),
                    TagKind::Track => terms.tracks.push(value),
                }
                rest = remainder.trim_start();
                continue;
            }
            if !terminated {
                // unterminated quote swallows the rest; degrade to free text
                if !value.is_empty() {
                    terms.general.push(value);
                }
                break;
            }
            // tag with an empty value: treat the raw word as free text
            let (word, remainder, _) = scan_word(rest);
            if !word.is_empty() {
                terms.general.push(word);
            }
            rest = remainder.trim_start();
            continue;
        }

        let (value, remainder, terminated) = scan_value(rest);
        if !value.is_empty() {
            terms.general.push(value);
        }
        rest = remainder.trim_start();
        if !terminated {
            break;
        }
    }

    terms
}

fn tag_prefix(rest: &str) -> Option<(TagKind, usize)> {
    for (name, kind) in TAG_NAMES {
        if rest.len() >= name.len() && rest[..name.len()].eq_ignore_ascii_case(name) {
            return Some((*kind, name.len()));
        }
    }
    None
}

/// Returns (value, remainder, terminated). `terminated` is false when a
/// quoted value ran off the end of the input.
fn scan_value(rest: &str) -> (String, &str, bool) {
    match rest.chars().next() {
        Some(quote @ ('"' | '\'')) => scan_quoted(rest, quote),
        _ => scan_word(rest),
    }
}

fn scan_quoted(rest: &str, quote: char) -> (String, &str, bool) {
    let body = &rest[quote.len_utf8()..];
    let mut value = String::new();
    let mut escaped = false;

    for (idx, ch) in body.char_indices() {
        if escaped {
            value.push(ch);
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == quote {
            return (value, &body[idx + ch.len_utf8()..], true);
        } else {
            value.push(ch);
        }
    }

    (value, "", false)
}

fn scan_word(rest: &str) -> (String, &str, bool) {
    match rest.find(char::is_whitespace) {
        Some(idx) => (rest[..idx].to_string(), &rest[idx..], true),
        None => (rest.to_string(), "", true),
    }
}
