//! Heuristic detection of top-level definitions.
//!
//! This is deliberately not a parser. Each detector looks at structural cues
//! (indentation for Python, brace depth for C-family languages) and reports
//! where top-level functions and classes begin and end. Inputs that confuse
//! a detector produce a [`SplitError`] and the caller falls back to plain
//! line windows.

mod brace;
mod indentation;

use crate::error::SplitError;
use crate::metadata::ChunkKind;

/// A detected definition. Line indexes are 0-based and inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub kind: ChunkKind,
    pub start: usize,
    pub end: usize,
}

/// Brace-delimited language families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BraceSyntax {
    /// JavaScript and TypeScript.
    JavaScript,
    Rust,
    Go,
    Java,
    /// C and C++.
    C,
    CSharp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryDetector {
    /// Python: column-0 `def` / `class` statements.
    Indentation,
    Brace(BraceSyntax),
    /// No definitions; the whole file is top-level code.
    Fallback,
}

impl BoundaryDetector {
    /// Find top-level definitions in `lines` (without line terminators).
    ///
    /// Returned spans are sorted and disjoint. Lines not covered by any span
    /// are top-level code.
    ///
    /// # Errors
    ///
    /// Returns [`SplitError`] when the input is too malformed for the heuristic.
    pub fn detect_boundaries(self, lines: &[&str]) -> Result<Vec<Span>, SplitError> {
        match self {
            Self::Indentation => indentation::detect(lines),
            Self::Brace(syntax) => brace::detect(syntax, lines),
            Self::Fallback => Ok(Vec::new()),
        }
    }
}

/// Last line of a definition that ends before `boundary`, skipping trailing blanks.
fn end_before(lines: &[&str], start: usize, boundary: usize) -> usize {
    let mut end = boundary.saturating_sub(1).max(start);
    while end > start && lines[end].trim().is_empty() {
        end -= 1;
    }
    end
}

/// Index just past the closing `quote` of a string opened at `open`, or the line length.
fn skip_quoted(chars: &[char], open: usize, quote: char) -> usize {
    let mut i = open + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            c if c == quote => return i + 1,
            _ => i += 1,
        }
    }
    chars.len()
}
