use std::sync::LazyLock;

use regex::Regex;

use super::{Span, end_before, skip_quoted};
use crate::error::SplitError;
use crate::metadata::ChunkKind;

static FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(async\s+)?def\s+\w+").expect("python function regex is valid")
});

static CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^class\s+\w+").expect("python class regex is valid"));

enum TopLine {
    Definition(ChunkKind),
    /// Decorator or comment; attaches to a definition directly below.
    Prefix,
    Statement,
}

fn classify(line: &str) -> TopLine {
    if line.starts_with('@') || line.starts_with('#') {
        TopLine::Prefix
    } else if FUNCTION_RE.is_match(line) {
        TopLine::Definition(ChunkKind::Function)
    } else if CLASS_RE.is_match(line) {
        TopLine::Definition(ChunkKind::Class)
    } else {
        TopLine::Statement
    }
}

/// Tracks triple-quoted strings and open brackets across lines.
#[derive(Default)]
struct Scanner {
    /// Quote character and 0-based start line of an open triple-quoted string.
    triple: Option<(char, usize)>,
    depth: usize,
}

impl Scanner {
    /// Whether the next line continues a previous logical line.
    fn continues(&self) -> bool {
        self.triple.is_some() || self.depth > 0
    }

    fn feed(&mut self, line: &str, line_no: usize) {
        let chars: Vec<char> = line.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            if let Some((quote, _)) = self.triple {
                if c == '\\' {
                    i += 2;
                } else if is_triple(&chars, i, quote) {
                    self.triple = None;
                    i += 3;
                } else {
                    i += 1;
                }
                continue;
            }
            match c {
                '#' => break,
                '"' | '\'' if is_triple(&chars, i, c) => {
                    self.triple = Some((c, line_no));
                    i += 3;
                }
                '"' | '\'' => i = skip_quoted(&chars, i, c),
                '(' | '[' | '{' => {
                    self.depth += 1;
                    i += 1;
                }
                ')' | ']' | '}' => {
                    self.depth = self.depth.saturating_sub(1);
                    i += 1;
                }
                _ => i += 1,
            }
        }
    }
}

fn is_triple(chars: &[char], i: usize, quote: char) -> bool {
    chars
        .get(i..i + 3)
        .is_some_and(|w| w.iter().all(|&c| c == quote))
}

pub(super) fn detect(lines: &[&str]) -> Result<Vec<Span>, SplitError> {
    let mut spans = Vec::new();
    let mut scanner = Scanner::default();
    let mut open: Option<(ChunkKind, usize)> = None;
    // First column-0 prefix line since the last indented line.
    let mut close_at: Option<usize> = None;
    // Start of the contiguous prefix run directly above the current line.
    let mut attach_from: Option<usize> = None;
    let mut seen_code = false;

    for (i, line) in lines.iter().enumerate() {
        let continuation = scanner.continues();
        scanner.feed(line, i);
        if continuation {
            continue;
        }
        if line.trim().is_empty() {
            attach_from = None;
            continue;
        }
        if line.starts_with([' ', '\t']) {
            if !seen_code {
                return Err(SplitError::UnexpectedIndent { line: i + 1 });
            }
            close_at = None;
            attach_from = None;
            continue;
        }
        seen_code = true;

        match classify(line) {
            TopLine::Prefix => {
                close_at.get_or_insert(i);
                attach_from.get_or_insert(i);
            }
            TopLine::Definition(kind) => {
                if let Some((prev, start)) = open.take() {
                    let end = end_before(lines, start, close_at.unwrap_or(i));
                    spans.push(Span { kind: prev, start, end });
                }
                open = Some((kind, attach_from.unwrap_or(i)));
                close_at = None;
                attach_from = None;
            }
            TopLine::Statement => {
                if let Some((prev, start)) = open.take() {
                    let end = end_before(lines, start, close_at.unwrap_or(i));
                    spans.push(Span { kind: prev, start, end });
                }
                close_at = None;
                attach_from = None;
            }
        }
    }

    if let Some((_, line)) = scanner.triple {
        return Err(SplitError::UnterminatedString { line: line + 1 });
    }
    if let Some((kind, start)) = open {
        let end = end_before(lines, start, close_at.unwrap_or(lines.len()));
        spans.push(Span { kind, start, end });
    }
    Ok(spans)
}
