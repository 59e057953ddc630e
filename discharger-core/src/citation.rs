//! Locating a cited excerpt inside its source text.
//!
//! Exact substring match first; otherwise the longest run of consecutive
//! words shared by the source and the excerpt, if it is at least
//! [`MIN_FUZZY_WORDS`] long. Best effort: when neither applies the source is
//! shown without highlight.

use serde::Serialize;

/// Shortest word run accepted by the fuzzy matcher
pub const MIN_FUZZY_WORDS: usize = 3;

pub const MARK_OPEN: &str = "<mark>";
pub const MARK_CLOSE: &str = "</mark>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum MatchKind {
    Exact,
    Fuzzy { words: usize },
}

/// Byte range of the highlighted text within the source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Highlight {
    pub start: usize,
    pub end: usize,
    #[serde(rename = "match")]
    pub kind: MatchKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub text: String,
    pub highlighted: bool,
}

struct Word {
    start: usize,
    end: usize,
    key: String,
}

/// Find where `excerpt` appears in `source`.
pub fn find_highlight(source: &str, excerpt: &str) -> Option<Highlight> {
    let excerpt = excerpt.trim();
    if excerpt.is_empty() || source.is_empty() {
        return None;
    }

    if let Some(start) = source.find(excerpt) {
        return Some(Highlight {
            start,
            end: start + excerpt.len(),
            kind: MatchKind::Exact,
        });
    }

    fuzzy_match(source, excerpt)
}

/// Longest common run of normalized words
fn fuzzy_match(source: &str, excerpt: &str) -> Option<Highlight> {
    let source_words = words(source);
    let excerpt_words = words(excerpt);
    if source_words.is_empty() || excerpt_words.is_empty() {
        return None;
    }

    // Rolling row of the longest-common-suffix table
    let mut prev = vec![0usize; excerpt_words.len() + 1];
    let mut best_len = 0;
    let mut best_end = 0; // index one past the last matched source word

    for (i, sw) in source_words.iter().enumerate() {
        let mut row = vec![0usize; excerpt_words.len() + 1];
        for (j, ew) in excerpt_words.iter().enumerate() {
            if sw.key == ew.key {
                row[j + 1] = prev[j] + 1;
                if row[j + 1] > best_len {
                    best_len = row[j + 1];
                    best_end = i + 1;
                }
            }
        }
        prev = row;
    }

    if best_len < MIN_FUZZY_WORDS {
        return None;
    }

    let first = &source_words[best_end - best_len];
    let last = &source_words[best_end - 1];
    Some(Highlight {
        start: first.start,
        end: last.end,
        kind: MatchKind::Fuzzy { words: best_len },
    })
}

/// Whitespace-separated words, compared case-insensitively without
/// surrounding punctuation. Pure punctuation tokens are skipped.
fn words(text: &str) -> Vec<Word> {
    let mut out = Vec::new();
    let mut start: Option<usize> = None;

    let mut push = |s: usize, e: usize| {
        let key = text[s..e]
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        if !key.is_empty() {
            out.push(Word { start: s, end: e, key });
        }
    };

    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if let Some(s) = start.take() {
                push(s, i);
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        push(s, text.len());
    }

    out
}

/// Split the source into plain and highlighted segments.
pub fn segments(source: &str, highlight: Option<&Highlight>) -> Vec<Segment> {
    let Some(h) = highlight else {
        return vec![Segment {
            text: source.to_string(),
            highlighted: false,
        }];
    };

    [
        (&source[..h.start], false),
        (&source[h.start..h.end], true),
        (&source[h.end..], false),
    ]
    .into_iter()
    .filter(|(text, _)| !text.is_empty())
    .map(|(text, highlighted)| Segment {
        text: text.to_string(),
        highlighted,
    })
    .collect()
}

/// Source text with the highlight wrapped in `<mark>` markers.
pub fn render_marked(source: &str, highlight: Option<&Highlight>) -> String {
    match highlight {
        Some(h) => format!(
            "{}{}{}{}{}",
            &source[..h.start],
            MARK_OPEN,
            &source[h.start..h.end],
            MARK_CLOSE,
            &source[h.end..]
        ),
        None => source.to_string(),
    }
}
