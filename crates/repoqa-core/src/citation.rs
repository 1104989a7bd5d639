//! Parsing and validation of `[path:start-end]` citations.
//!
//! Validation is a pure function of the generated text and the headers of
//! the chunks that were placed in the prompt, so it can be tested without a
//! model.

use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use repoqa_index::metadata::IndexedDocument;
use serde::Serialize;

/// Reply the model is told to give when the context does not answer the question.
pub const REFUSAL: &str = "I don't know based on the indexed code.";

static CITATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([^\[\]:\n]+):(\d+)\s*-\s*(\d+)\]").expect("citation regex is valid")
});

/// A reference from an answer to a line span of an indexed file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Citation {
    /// Repo-relative path of the cited file.
    pub filename: String,
    pub line_start: u32,
    pub line_end: u32,
}

impl fmt::Display for Citation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{}-{}]", self.filename, self.line_start, self.line_end)
    }
}

/// Identity of one chunk supplied to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextHeader {
    pub path: String,
    pub filename: String,
    pub line_start: u32,
    pub line_end: u32,
}

impl ContextHeader {
    #[must_use]
    pub fn from_document(doc: &IndexedDocument) -> Self {
        Self {
            path: doc.chunk.path.clone(),
            filename: doc.filename.clone(),
            line_start: doc.chunk.line_start,
            line_end: doc.chunk.line_end,
        }
    }

    /// The only citation that refers to this chunk, in canonical form.
    #[must_use]
    pub fn citation(&self) -> Citation {
        Citation {
            filename: self.path.clone(),
            line_start: self.line_start,
            line_end: self.line_end,
        }
    }
}

/// A citation-shaped marker found in text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCitation {
    /// The marker exactly as written, brackets included.
    pub marker: String,
    pub label: String,
    pub line_start: u32,
    pub line_end: u32,
}

/// Every citation-shaped marker in `text`, in order of appearance.
///
/// Markers whose line numbers do not fit in `u32` are still returned, with
/// `u32::MAX` in place of the number, so they are reported as invalid
/// rather than silently ignored.
#[must_use]
pub fn parse_citations(text: &str) -> Vec<RawCitation> {
    CITATION_RE
        .captures_iter(text)
        .map(|caps| {
            let number = |i: usize| caps[i].parse::<u32>().unwrap_or(u32::MAX);
            RawCitation {
                marker: caps[0].to_owned(),
                label: caps[1].trim().to_owned(),
                line_start: number(2),
                line_end: number(3),
            }
        })
        .collect()
}

/// Outcome of checking an answer against the chunks it was given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CitationCheck {
    /// Valid citations, canonicalised, deduplicated, in order of first appearance.
    pub valid: Vec<Citation>,
    /// Markers that match no supplied chunk, deduplicated.
    pub rejected: Vec<String>,
    /// The answer is not a refusal yet cites nothing.
    pub missing_citations: bool,
}

impl CitationCheck {
    #[must_use]
    pub fn is_verified(&self) -> bool {
        self.rejected.is_empty() && !self.missing_citations
    }
}

#[must_use]
pub fn is_refusal(text: &str) -> bool {
    text.trim_start()
        .to_lowercase()
        .replace('\u{2019}', "'")
        .starts_with("i don't know")
}

fn resolve(raw: &RawCitation, headers: &[ContextHeader]) -> Option<Citation> {
    let label = raw.label.trim_start_matches("./");
    let same_span = |h: &&ContextHeader| h.line_start == raw.line_start && h.line_end == raw.line_end;

    if let Some(h) = headers.iter().filter(same_span).find(|h| h.path == label) {
        return Some(h.citation());
    }
    let mut by_name = headers.iter().filter(same_span).filter(|h| h.filename == label);
    match (by_name.next(), by_name.next()) {
        (Some(h), None) => Some(h.citation()),
        _ => None,
    }
}

/// Check every citation in `text` against `headers`.
#[must_use]
pub fn validate_citations(text: &str, headers: &[ContextHeader]) -> CitationCheck {
    let mut check = CitationCheck::default();
    let mut seen_valid = HashSet::new();
    let mut seen_rejected = HashSet::new();

    for raw in parse_citations(text) {
        match resolve(&raw, headers) {
            Some(citation) => {
                if seen_valid.insert(citation.clone()) {
                    check.valid.push(citation);
                }
            }
            None => {
                if seen_rejected.insert(raw.marker.clone()) {
                    check.rejected.push(raw.marker);
                }
            }
        }
    }
    check.missing_citations = check.valid.is_empty() && !is_refusal(text);
    check
}

/// Remove the given markers from `text`.
#[must_use]
pub fn strip_citations(text: &str, markers: &[String]) -> String {
    if markers.is_empty() {
        return text.to_owned();
    }
    let markers: HashSet<&str> = markers.iter().map(String::as_str).collect();
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for m in CITATION_RE.find_iter(text) {
        if !markers.contains(m.as_str()) {
            continue;
        }
        // Take one separating space with the marker: the one before it if
        // there is one, otherwise the one after.
        let (mut start, mut end) = (m.start(), m.end());
        if text[last..start].ends_with(' ') {
            start -= 1;
        } else if text[end..].starts_with(' ') {
            end += 1;
        }
        out.push_str(&text[last..start]);
        last = end;
    }
    out.push_str(&text[last..]);
    out
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn header(path: &str, start: u32, end: u32) -> ContextHeader {
        ContextHeader {
            path: path.into(),
            filename: path.rsplit('/').next().unwrap().into(),
            line_start: start,
            line_end: end,
        }
    }

    fn headers() -> Vec<ContextHeader> {
        vec![
            header("backend/code_ingest_utils.py", 42, 58),
            header("backend/app.py", 1, 30),
            header("frontend/app.py", 1, 30),
        ]
    }

    #[test]
    fn parses_markers_in_order() {
        let found = parse_citations("See [a/b.py:1-5] and [c.rs:10 - 12]. Not [x] or [y:3].");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].label, "a/b.py");
        assert_eq!((found[0].line_start, found[0].line_end), (1, 5));
        assert_eq!(found[1].marker, "[c.rs:10 - 12]");
    }

    #[test]
    fn exact_path_and_span_is_valid() {
        let check = validate_citations(
            "Chunks are split here [backend/code_ingest_utils.py:42-58].",
            &headers(),
        );
        assert!(check.is_verified());
        assert_eq!(check.valid[0].to_string(), "[backend/code_ingest_utils.py:42-58]");
    }

    #[test]
    fn wrong_span_is_rejected() {
        let check = validate_citations("See [backend/code_ingest_utils.py:40-58].", &headers());
        assert_eq!(check.rejected, ["[backend/code_ingest_utils.py:40-58]"]);
        assert!(check.valid.is_empty());
        assert!(!check.is_verified());
    }

    #[test]
    fn unknown_file_is_rejected() {
        let check = validate_citations(
            "Valid [backend/app.py:1-30], invented [backend/secret.py:1-30].",
            &headers(),
        );
        assert_eq!(check.valid.len(), 1);
        assert_eq!(check.rejected, ["[backend/secret.py:1-30]"]);
        assert!(!check.missing_citations);
    }

    #[test]
    fn unique_bare_filename_is_accepted() {
        let check = validate_citations("See [code_ingest_utils.py:42-58].", &headers());
        assert!(check.is_verified());
        assert_eq!(check.valid[0].filename, "backend/code_ingest_utils.py");
    }

    #[test]
    fn ambiguous_bare_filename_is_rejected() {
        let check = validate_citations("See [app.py:1-30].", &headers());
        assert_eq!(check.rejected, ["[app.py:1-30]"]);
    }

    #[test]
    fn duplicates_are_collapsed() {
        let check = validate_citations(
            "[backend/app.py:1-30] twice [./backend/app.py:1-30] [app.txt:1-2] [app.txt:1-2]",
            &headers(),
        );
        assert_eq!(check.valid.len(), 1);
        assert_eq!(check.rejected.len(), 1);
    }

    #[test]
    fn answer_without_citations_is_flagged() {
        let check = validate_citations("It reads a config file.", &headers());
        assert!(check.missing_citations);
        assert!(!check.is_verified());
    }

    #[test]
    fn refusal_needs_no_citations() {
        let check = validate_citations(REFUSAL, &headers());
        assert!(check.is_verified());
        assert!(is_refusal("  I don\u{2019}t know based on the indexed code."));
        assert!(!is_refusal("Indeed, I don't know why"));
    }

    #[test]
    fn overflowing_line_numbers_are_rejected() {
        let check = validate_citations("[backend/app.py:1-99999999999]", &headers());
        assert_eq!(check.rejected.len(), 1);
    }

    #[test]
    fn strip_removes_only_listed_markers() {
        let text = "Uses retries [backend/app.py:1-30] and magic [x.py:1-2].";
        let stripped = strip_citations(text, &["[x.py:1-2]".to_owned()]);
        assert_eq!(stripped, "Uses retries [backend/app.py:1-30] and magic.");
        assert_eq!(strip_citations(text, &[]), text);
    }

    #[test]
    fn strip_leaves_surrounding_text_alone() {
        let text = "[fake.py:1-2] See  below .\n```python\ndef f():\n    return 1 .real\n```\nDone [fake.py:1-2].";
        let stripped = strip_citations(text, &["[fake.py:1-2]".to_owned()]);
        assert_eq!(
            stripped,
            "See  below .\n```python\ndef f():\n    return 1 .real\n```\nDone."
        );
    }

    #[test]
    fn strip_handles_adjacent_markers() {
        let text = "a [x.py:1-2] [y.py:3-4] b";
        let markers = ["[x.py:1-2]".to_owned(), "[y.py:3-4]".to_owned()];
        assert_eq!(strip_citations(text, &markers), "a b");
        assert_eq!(strip_citations("[x.py:1-2]", &markers), "");
    }

    proptest! {
        #[test]
        fn valid_citations_always_name_a_supplied_chunk(
            path in "[a-z]{1,4}/[a-z]{1,4}\\.py",
            start in 1u32..100,
            len in 0u32..50,
            noise in "[a-z \\[\\]:0-9.-]{0,60}",
        ) {
            let supplied = vec![header(&path, start, start + len)];
            let text = format!("{noise} [{path}:{start}-{}] {noise}", start + len);
            let check = validate_citations(&text, &supplied);
            prop_assert!(!check.valid.is_empty());
            for citation in &check.valid {
                prop_assert!(supplied.iter().any(|h| h.citation() == *citation));
            }
        }
    }
}
