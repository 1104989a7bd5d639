//! Provenance records and content fingerprints for chunks.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::languages::{Lang, detect_language};

pub const FIELD_PATH: &str = "path";
pub const FIELD_FILENAME: &str = "filename";
pub const FIELD_LANGUAGE: &str = "language";
pub const FIELD_CHUNK_TYPE: &str = "chunk_type";
pub const FIELD_LINE_START: &str = "line_start";
pub const FIELD_LINE_END: &str = "line_end";
pub const FIELD_TEXT: &str = "text";
pub const FIELD_FINGERPRINT: &str = "fingerprint";
pub const FIELD_SEQ: &str = "seq";
pub const FIELD_INGEST_RUN: &str = "ingest_run";

/// Attribute names other tools rely on being present on every stored chunk.
pub const SCHEMA_FIELDS: [&str; 6] = [
    FIELD_PATH,
    FIELD_FILENAME,
    FIELD_LANGUAGE,
    FIELD_CHUNK_TYPE,
    FIELD_LINE_START,
    FIELD_LINE_END,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Function,
    Class,
    TopLevel,
    Window,
}

impl ChunkKind {
    pub const ALL: [Self; 4] = [Self::Function, Self::Class, Self::TopLevel, Self::Window];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Class => "class",
            Self::TopLevel => "top_level",
            Self::Window => "window",
        }
    }
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown chunk type `{s}`"))
    }
}

/// One file as read during an ingestion run.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Repo-relative, `/`-separated.
    pub path: String,
    pub text: String,
    pub language: Lang,
}

impl SourceFile {
    #[must_use]
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        let path = path.into();
        let language = detect_language(std::path::Path::new(&path));
        Self {
            path,
            text: text.into(),
            language,
        }
    }

    #[must_use]
    pub fn filename(&self) -> &str {
        filename_of(&self.path)
    }
}

fn filename_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// A contiguous line range of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub path: String,
    pub kind: ChunkKind,
    /// 0-based position among the chunks of the same file.
    pub seq: usize,
    /// 1-based, inclusive.
    pub line_start: u32,
    /// 1-based, inclusive.
    pub line_end: u32,
    pub text: String,
}

/// A chunk with its metadata, ready to embed and store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedDocument {
    pub chunk: Chunk,
    pub filename: String,
    pub language: String,
    pub fingerprint: String,
}

/// BLAKE3 over length-prefixed path and text plus the line span, as 64 hex chars.
#[must_use]
pub fn fingerprint(path: &str, text: &str, line_start: u32, line_end: u32) -> String {
    let mut hasher = blake3::Hasher::new();
    for part in [path.as_bytes(), text.as_bytes()] {
        hasher.update(&(part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    hasher.update(&line_start.to_le_bytes());
    hasher.update(&line_end.to_le_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Attach provenance from `file` to `chunk`.
#[must_use]
pub fn assemble(chunk: Chunk, file: &SourceFile) -> IndexedDocument {
    let fingerprint = fingerprint(&chunk.path, &chunk.text, chunk.line_start, chunk.line_end);
    IndexedDocument {
        filename: file.filename().to_owned(),
        language: file.language.id().to_owned(),
        fingerprint,
        chunk,
    }
}

impl IndexedDocument {
    /// Vector point id derived from the fingerprint.
    #[must_use]
    pub fn point_id(&self) -> String {
        point_id_for(&self.fingerprint)
    }

    #[must_use]
    pub fn to_payload(&self, ingest_run: i64) -> HashMap<String, Value> {
        HashMap::from([
            (FIELD_PATH.to_owned(), json!(self.chunk.path)),
            (FIELD_FILENAME.to_owned(), json!(self.filename)),
            (FIELD_LANGUAGE.to_owned(), json!(self.language)),
            (FIELD_CHUNK_TYPE.to_owned(), json!(self.chunk.kind.as_str())),
            (FIELD_LINE_START.to_owned(), json!(self.chunk.line_start)),
            (FIELD_LINE_END.to_owned(), json!(self.chunk.line_end)),
            (FIELD_TEXT.to_owned(), json!(self.chunk.text)),
            (FIELD_FINGERPRINT.to_owned(), json!(self.fingerprint)),
            (FIELD_SEQ.to_owned(), json!(self.chunk.seq)),
            (FIELD_INGEST_RUN.to_owned(), json!(ingest_run)),
        ])
    }

    /// Rebuild a document from a stored payload, returning it with its ingest run.
    ///
    /// # Errors
    ///
    /// Returns a description of the first missing or mistyped field.
    pub fn from_payload(payload: &HashMap<String, Value>) -> Result<(Self, i64), String> {
        let text_field = |name: &str| {
            payload
                .get(name)
                .and_then(Value::as_str)
                .map(str::to_owned)
                .ok_or_else(|| format!("missing string field `{name}`"))
        };
        let int_field = |name: &str| {
            payload
                .get(name)
                .and_then(Value::as_i64)
                .ok_or_else(|| format!("missing integer field `{name}`"))
        };
        let line_field = |name: &str| {
            int_field(name).and_then(|v| {
                u32::try_from(v)
                    .ok()
                    .filter(|&n| n >= 1)
                    .ok_or_else(|| format!("field `{name}` out of range: {v}"))
            })
        };

        let line_start = line_field(FIELD_LINE_START)?;
        let line_end = line_field(FIELD_LINE_END)?;
        if line_end < line_start {
            return Err(format!("line_end {line_end} precedes line_start {line_start}"));
        }
        let seq = usize::try_from(int_field(FIELD_SEQ).unwrap_or(0)).unwrap_or(0);
        let doc = Self {
            chunk: Chunk {
                path: text_field(FIELD_PATH)?,
                kind: text_field(FIELD_CHUNK_TYPE)?.parse()?,
                seq,
                line_start,
                line_end,
                text: text_field(FIELD_TEXT)?,
            },
            filename: text_field(FIELD_FILENAME)?,
            language: text_field(FIELD_LANGUAGE)?,
            fingerprint: text_field(FIELD_FINGERPRINT).unwrap_or_default(),
        };
        Ok((doc, int_field(FIELD_INGEST_RUN).unwrap_or(0)))
    }
}

#[must_use]
pub fn point_id_for(fingerprint: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, fingerprint.as_bytes()).to_string()
}
