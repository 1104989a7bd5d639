//! Line-addressed chunking along definition boundaries.

use crate::boundary::Span;
use crate::error::SplitError;
use crate::metadata::{Chunk, ChunkKind, SourceFile};

/// Chunk size limits, in lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerConfig {
    /// Chunks longer than this are split into windows (default: 200).
    pub max_lines: usize,
    /// Lines repeated at the start of each window after the first (default: 20).
    pub overlap_lines: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_lines: 200,
            overlap_lines: 20,
        }
    }
}

impl ChunkerConfig {
    fn window_len(&self) -> usize {
        self.max_lines.max(1)
    }

    fn step(&self) -> usize {
        self.window_len().saturating_sub(self.overlap_lines).max(1)
    }
}

/// 0-based inclusive line range of one logical unit before window splitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Segment {
    kind: ChunkKind,
    start: usize,
    end: usize,
}

/// Split `file` into chunks ordered by line.
///
/// Outside of windows cut from one oversized unit, chunk spans partition the
/// file: every line belongs to exactly one chunk. Consecutive windows of the
/// same unit share exactly `overlap_lines` lines. A file without any
/// non-whitespace content yields no chunks.
///
/// Never fails: if boundary detection rejects the file, the whole file is cut
/// into `window` chunks.
#[must_use]
pub fn chunk_file(file: &SourceFile, config: &ChunkerConfig) -> Vec<Chunk> {
    let lines: Vec<&str> = file.text.split_inclusive('\n').collect();
    if lines.iter().all(|l| l.trim().is_empty()) {
        return Vec::new();
    }
    let bare: Vec<&str> = lines
        .iter()
        .map(|l| l.trim_end_matches(['\n', '\r']))
        .collect();

    let segments = file
        .language
        .detector()
        .detect_boundaries(&bare)
        .and_then(|spans| segments_from_spans(&spans, &bare))
        .unwrap_or_else(|e| {
            tracing::warn!(file = %file.path, "boundary detection failed, falling back to windows: {e}");
            vec![Segment {
                kind: ChunkKind::Window,
                start: 0,
                end: lines.len() - 1,
            }]
        });

    let mut chunks = Vec::new();
    let mut emit = |kind: ChunkKind, start: usize, end: usize| {
        chunks.push(Chunk {
            path: file.path.clone(),
            kind,
            seq: chunks.len(),
            line_start: line_number(start),
            line_end: line_number(end),
            text: lines[start..=end].concat(),
        });
    };

    for seg in segments {
        let len = seg.end - seg.start + 1;
        if seg.kind == ChunkKind::Window || len > config.window_len() {
            for (start, end) in windows(seg.start, seg.end, config) {
                emit(ChunkKind::Window, start, end);
            }
        } else {
            emit(seg.kind, seg.start, seg.end);
        }
    }
    chunks
}

fn line_number(index: usize) -> u32 {
    u32::try_from(index + 1).unwrap_or(u32::MAX)
}

/// Window bounds covering `start..=end`, 0-based inclusive.
fn windows(start: usize, end: usize, config: &ChunkerConfig) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut from = start;
    loop {
        let to = (from + config.window_len() - 1).min(end);
        out.push((from, to));
        if to == end {
            return out;
        }
        from += config.step();
    }
}

/// Fill the gaps between definitions with `top_level` segments.
///
/// Whitespace-only gaps are absorbed into the preceding segment, or into the
/// following one at the start of the file.
fn segments_from_spans(spans: &[Span], lines: &[&str]) -> Result<Vec<Segment>, SplitError> {
    let mut raw = Vec::with_capacity(spans.len() * 2 + 1);
    let mut cursor = 0usize;
    for span in spans {
        if span.start < cursor || span.end < span.start || span.end >= lines.len() {
            return Err(SplitError::InconsistentSpans(format!(
                "span {}..={} after line {cursor} in a {}-line file",
                span.start,
                span.end,
                lines.len()
            )));
        }
        if span.start > cursor {
            raw.push(Segment {
                kind: ChunkKind::TopLevel,
                start: cursor,
                end: span.start - 1,
            });
        }
        raw.push(Segment {
            kind: span.kind,
            start: span.start,
            end: span.end,
        });
        cursor = span.end + 1;
    }
    if cursor < lines.len() {
        raw.push(Segment {
            kind: ChunkKind::TopLevel,
            start: cursor,
            end: lines.len() - 1,
        });
    }

    let mut out: Vec<Segment> = Vec::with_capacity(raw.len());
    let mut leading_blank: Option<usize> = None;
    for mut seg in raw {
        let blank = seg.kind == ChunkKind::TopLevel
            && lines[seg.start..=seg.end].iter().all(|l| l.trim().is_empty());
        if blank {
            match out.last_mut() {
                Some(prev) => prev.end = seg.end,
                None => leading_blank = Some(seg.start),
            }
            continue;
        }
        if let Some(start) = leading_blank.take() {
            seg.start = start;
        }
        out.push(seg);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_lines: usize, overlap_lines: usize) -> ChunkerConfig {
        ChunkerConfig {
            max_lines,
            overlap_lines,
        }
    }

    fn spans_of(chunks: &[Chunk]) -> Vec<(ChunkKind, u32, u32)> {
        chunks
            .iter()
            .map(|c| (c.kind, c.line_start, c.line_end))
            .collect()
    }

    fn python_function(name: &str, body_lines: usize) -> String {
        let mut s = format!("def {name}():\n");
        for i in 0..body_lines {
            s.push_str(&format!("    x{i} = {i}\n"));
        }
        s
    }

    #[test]
    fn two_python_functions() {
        let mut src = python_function("a", 8);
        src.push('\n');
        src.push_str(&python_function("b", 9));
        let file = SourceFile::new("a.py", src);
        let chunks = chunk_file(&file, &ChunkerConfig::default());
        assert_eq!(
            spans_of(&chunks),
            [(ChunkKind::Function, 1, 10), (ChunkKind::Function, 11, 20)]
        );
        assert_eq!(chunks[0].seq, 0);
        assert_eq!(chunks[1].seq, 1);
        assert!(chunks[1].text.starts_with("def b():"));
    }

    #[test]
    fn oversized_function_becomes_overlapping_windows() {
        let file = SourceFile::new("big.py", python_function("big", 499));
        let chunks = chunk_file(&file, &config(200, 20));
        assert_eq!(
            spans_of(&chunks),
            [
                (ChunkKind::Window, 1, 200),
                (ChunkKind::Window, 181, 380),
                (ChunkKind::Window, 361, 500)
            ]
        );
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].line_end - pair[1].line_start + 1, 20);
        }
    }

    #[test]
    fn window_ending_exactly_at_limit() {
        assert_eq!(windows(0, 199, &config(200, 20)), [(0, 199)]);
        assert_eq!(windows(0, 200, &config(200, 20)), [(0, 199), (180, 200)]);
    }

    #[test]
    fn empty_and_blank_files_yield_nothing() {
        assert!(chunk_file(&SourceFile::new("e.py", ""), &ChunkerConfig::default()).is_empty());
        assert!(
            chunk_file(&SourceFile::new("w.rs", "\n  \n\t\n"), &ChunkerConfig::default())
                .is_empty()
        );
    }

    #[test]
    fn file_without_definitions_is_top_level() {
        let file = SourceFile::new("settings.py", "import os\n\nDEBUG = True\nPORT = 80\n");
        let chunks = chunk_file(&file, &ChunkerConfig::default());
        assert_eq!(spans_of(&chunks), [(ChunkKind::TopLevel, 1, 4)]);
        assert_eq!(chunks[0].text, file.text);
    }

    #[test]
    fn gaps_become_top_level_and_blank_lines_are_absorbed() {
        let src = "\n\nimport os\n\ndef f():\n    pass\n\n\nX = 1\n";
        let file = SourceFile::new("m.py", src);
        let chunks = chunk_file(&file, &ChunkerConfig::default());
        assert_eq!(
            spans_of(&chunks),
            [
                (ChunkKind::TopLevel, 1, 4),
                (ChunkKind::Function, 5, 8),
                (ChunkKind::TopLevel, 9, 9)
            ]
        );
        let rebuilt: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(rebuilt, src);
    }

    #[test]
    fn malformed_input_falls_back_to_windows() {
        let file = SourceFile::new("bad.py", "    indented = 1\ndef f():\n    pass\n");
        let chunks = chunk_file(&file, &ChunkerConfig::default());
        assert_eq!(spans_of(&chunks), [(ChunkKind::Window, 1, 3)]);
    }

    #[test]
    fn unbalanced_braces_fall_back_to_windows() {
        let src: String = (0..30).map(|i| format!("}} line {i}\n")).collect();
        let file = SourceFile::new("broken.js", src);
        let chunks = chunk_file(&file, &config(10, 2));
        assert!(chunks.iter().all(|c| c.kind == ChunkKind::Window));
        assert_eq!(chunks.first().map(|c| c.line_start), Some(1));
        assert_eq!(chunks.last().map(|c| c.line_end), Some(30));
    }

    #[test]
    fn unknown_language_is_one_chunk_when_small() {
        let file = SourceFile::new("Makefile", "all:\n\tcc main.c\n");
        let chunks = chunk_file(&file, &ChunkerConfig::default());
        assert_eq!(spans_of(&chunks), [(ChunkKind::TopLevel, 1, 2)]);
    }

    #[test]
    fn crlf_line_endings() {
        let file = SourceFile::new("a.py", "def a():\r\n    pass\r\nX = 1\r\n");
        let chunks = chunk_file(&file, &ChunkerConfig::default());
        assert_eq!(
            spans_of(&chunks),
            [(ChunkKind::Function, 1, 2), (ChunkKind::TopLevel, 3, 3)]
        );
    }

    #[test]
    fn inconsistent_spans_are_rejected() {
        let lines = ["a", "b", "c"];
        let overlapping = [
            Span {
                kind: ChunkKind::Function,
                start: 0,
                end: 1,
            },
            Span {
                kind: ChunkKind::Function,
                start: 1,
                end: 2,
            },
        ];
        assert!(segments_from_spans(&overlapping, &lines).is_err());
        let out_of_range = [Span {
            kind: ChunkKind::Class,
            start: 2,
            end: 5,
        }];
        assert!(segments_from_spans(&out_of_range, &lines).is_err());
    }

    #[test]
    fn degenerate_overlap_still_advances() {
        let w = windows(0, 9, &config(3, 5));
        assert_eq!(w.first(), Some(&(0, 2)));
        assert_eq!(w.last().map(|x| x.1), Some(9));
    }
}
