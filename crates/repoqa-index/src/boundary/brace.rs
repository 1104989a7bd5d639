use std::sync::LazyLock;

use regex::Regex;

use super::{BraceSyntax, Span, end_before, skip_quoted};
use crate::error::SplitError;
use crate::metadata::ChunkKind;

struct Patterns {
    function: Regex,
    class: Regex,
}

impl Patterns {
    fn new(function: &str, class: &str) -> Self {
        Self {
            function: Regex::new(function).expect("function boundary regex is valid"),
            class: Regex::new(class).expect("class boundary regex is valid"),
        }
    }
}

static JAVASCRIPT: LazyLock<Patterns> = LazyLock::new(|| {
    Patterns::new(
        r"^(export\s+)?(default\s+)?(declare\s+)?(async\s+)?function\b|^(export\s+)?(const|let|var)\s+[\w$]+\s*(:[^=]+)?=\s*(async\s+)?(function\b|(\([^)]*\)|[\w$]+)\s*(:\s*[^=]+)?=>)",
        r"^(export\s+)?(default\s+)?(declare\s+)?(abstract\s+)?(class|interface|enum|namespace)\b",
    )
});

static RUST: LazyLock<Patterns> = LazyLock::new(|| {
    Patterns::new(
        r#"^(pub(\([^)]*\))?\s+)?(default\s+)?((const|async|unsafe)\s+)*(extern\s+("[^"]*"\s+)?)?fn\s+\w+|^macro_rules!"#,
        r"^(pub(\([^)]*\))?\s+)?(unsafe\s+)?(struct|enum|union|trait|impl|mod)\b",
    )
});

static GO: LazyLock<Patterns> =
    LazyLock::new(|| Patterns::new(r"^func\b", r"^type\s+[A-Za-z_]\w*"));

static JAVA: LazyLock<Patterns> = LazyLock::new(|| {
    Patterns::new(
        r"^((public|protected|private|static|final|abstract|synchronized|native)\s+)*[\w<>\[\]?,.]+\s+\w+\s*\(",
        r"^((public|protected|private|static|final|abstract|sealed|non-sealed|strictfp)\s+)*(class|interface|enum|record|@interface)\b",
    )
});

static C: LazyLock<Patterns> = LazyLock::new(|| {
    Patterns::new(
        r"^([A-Za-z_][\w:<>,~]*[\s*&]+)+~?[A-Za-z_][\w:~]*\s*\(",
        r"^(template\s*<[^>]*>\s*)?(typedef\s+)?(class|struct|union|enum|namespace)\b[^(;]*$",
    )
});

static CSHARP: LazyLock<Patterns> = LazyLock::new(|| {
    Patterns::new(
        r"^((public|private|protected|internal|static|async|override|virtual|abstract|sealed|unsafe|extern)\s+)*[\w<>\[\]?,.]+\s+\w+\s*\(",
        r"^((public|private|protected|internal|static|sealed|abstract|partial|readonly|unsafe|file)\s+)*(class|interface|enum|record|struct|namespace)\b",
    )
});

impl BraceSyntax {
    fn patterns(self) -> &'static Patterns {
        match self {
            Self::JavaScript => &JAVASCRIPT,
            Self::Rust => &RUST,
            Self::Go => &GO,
            Self::Java => &JAVA,
            Self::C => &C,
            Self::CSharp => &CSHARP,
        }
    }

    fn classify(self, trimmed: &str) -> Option<ChunkKind> {
        let patterns = self.patterns();
        if patterns.class.is_match(trimmed) {
            Some(ChunkKind::Class)
        } else if patterns.function.is_match(trimmed) {
            Some(ChunkKind::Function)
        } else {
            None
        }
    }

    /// Comments, attributes and decorators that belong to the definition below.
    fn is_prefix_line(self, trimmed: &str) -> bool {
        if trimmed.starts_with("//") || trimmed.starts_with("/*") {
            return true;
        }
        match self {
            Self::Rust => trimmed.starts_with("#["),
            Self::JavaScript | Self::Java => trimmed.starts_with('@'),
            Self::CSharp => trimmed.starts_with('['),
            Self::Go | Self::C => false,
        }
    }

    fn backtick_strings(self) -> bool {
        matches!(self, Self::JavaScript | Self::Go)
    }
}

#[derive(Default)]
struct LineInfo {
    opened: bool,
    ends_with_semicolon: bool,
}

struct Scanner {
    syntax: BraceSyntax,
    depth: usize,
    /// 0-based line where the outermost open block began.
    block_start: usize,
    block_comment: Option<usize>,
    backtick: Option<usize>,
}

impl Scanner {
    fn new(syntax: BraceSyntax) -> Self {
        Self {
            syntax,
            depth: 0,
            block_start: 0,
            block_comment: None,
            backtick: None,
        }
    }

    fn at_top(&self) -> bool {
        self.depth == 0 && self.block_comment.is_none() && self.backtick.is_none()
    }

    fn feed(&mut self, line: &str, line_no: usize) -> Result<LineInfo, SplitError> {
        let chars: Vec<char> = line.chars().collect();
        let mut info = LineInfo::default();
        let mut last_code = None;
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            if self.block_comment.is_some() {
                if c == '*' && chars.get(i + 1) == Some(&'/') {
                    self.block_comment = None;
                    i += 2;
                } else {
                    i += 1;
                }
                continue;
            }
            if self.backtick.is_some() {
                match c {
                    '\\' if self.syntax == BraceSyntax::JavaScript => i += 2,
                    '`' => {
                        self.backtick = None;
                        last_code = Some(c);
                        i += 1;
                    }
                    _ => i += 1,
                }
                continue;
            }
            match c {
                '/' if chars.get(i + 1) == Some(&'/') => break,
                '/' if chars.get(i + 1) == Some(&'*') => {
                    self.block_comment = Some(line_no);
                    i += 2;
                }
                '"' => {
                    i = skip_quoted(&chars, i, '"');
                    last_code = Some(c);
                }
                '\'' => {
                    i = self.skip_single_quote(&chars, i);
                    last_code = Some(c);
                }
                '`' if self.syntax.backtick_strings() => {
                    self.backtick = Some(line_no);
                    i += 1;
                }
                '{' => {
                    if self.depth == 0 {
                        self.block_start = line_no;
                    }
                    self.depth += 1;
                    info.opened = true;
                    last_code = Some(c);
                    i += 1;
                }
                '}' => {
                    if self.depth == 0 {
                        return Err(SplitError::UnbalancedBraces { line: line_no + 1 });
                    }
                    self.depth -= 1;
                    last_code = Some(c);
                    i += 1;
                }
                c if c.is_whitespace() => i += 1,
                c => {
                    last_code = Some(c);
                    i += 1;
                }
            }
        }
        info.ends_with_semicolon = last_code == Some(';');
        Ok(info)
    }

    /// Rust uses `'` for lifetimes and labels as well as char literals.
    fn skip_single_quote(&self, chars: &[char], i: usize) -> usize {
        if self.syntax != BraceSyntax::Rust {
            return skip_quoted(chars, i, '\'');
        }
        match (chars.get(i + 1), chars.get(i + 2)) {
            (Some('\\'), _) => skip_quoted(chars, i, '\''),
            (Some(_), Some('\'')) => i + 3,
            _ => i + 1,
        }
    }
}

struct Open {
    kind: ChunkKind,
    start: usize,
    body_opened: bool,
}

pub(super) fn detect(syntax: BraceSyntax, lines: &[&str]) -> Result<Vec<Span>, SplitError> {
    let mut scanner = Scanner::new(syntax);
    let mut spans = Vec::new();
    let mut open: Option<Open> = None;
    let mut attach_from: Option<usize> = None;
    // A prefix line (e.g. a decorator with an object argument) opened a block.
    let mut prefix_block = false;

    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim();

        if let Some(cur) = open.as_mut() {
            if !cur.body_opened && scanner.at_top() && trimmed.is_empty() {
                // Signature without body or terminator.
                spans.push(Span {
                    kind: cur.kind,
                    start: cur.start,
                    end: end_before(lines, cur.start, i),
                });
                open = None;
                continue;
            }
            let info = scanner.feed(line, i)?;
            cur.body_opened |= info.opened;
            if scanner.at_top() && (cur.body_opened || info.ends_with_semicolon) {
                spans.push(Span {
                    kind: cur.kind,
                    start: cur.start,
                    end: i,
                });
                open = None;
            }
            continue;
        }

        if !scanner.at_top() {
            let comment_above = scanner.block_comment.is_some() && scanner.depth == 0;
            if !comment_above && !prefix_block {
                attach_from = None;
            }
            scanner.feed(line, i)?;
            continue;
        }
        prefix_block = false;

        if trimmed.is_empty() {
            attach_from = None;
            continue;
        }
        if syntax.is_prefix_line(trimmed) {
            attach_from.get_or_insert(i);
            scanner.feed(line, i)?;
            prefix_block = scanner.depth > 0;
            continue;
        }
        if let Some(kind) = syntax.classify(trimmed) {
            let start = attach_from.take().unwrap_or(i);
            let info = scanner.feed(line, i)?;
            if scanner.at_top() && (info.opened || info.ends_with_semicolon) {
                spans.push(Span { kind, start, end: i });
            } else {
                open = Some(Open {
                    kind,
                    start,
                    body_opened: info.opened,
                });
            }
            continue;
        }
        attach_from = None;
        scanner.feed(line, i)?;
    }

    if let Some(line) = scanner.block_comment {
        return Err(SplitError::UnterminatedComment { line: line + 1 });
    }
    if let Some(line) = scanner.backtick {
        return Err(SplitError::UnterminatedString { line: line + 1 });
    }
    if scanner.depth > 0 {
        return Err(SplitError::UnclosedBlock {
            line: scanner.block_start + 1,
        });
    }
    if let Some(cur) = open {
        spans.push(Span {
            kind: cur.kind,
            start: cur.start,
            end: end_before(lines, cur.start, lines.len()),
        });
    }
    Ok(spans)
}
