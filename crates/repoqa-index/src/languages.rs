//! Language detection from file extensions.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::boundary::{BoundaryDetector, BraceSyntax};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    Python,
    JavaScript,
    TypeScript,
    Rust,
    Go,
    Java,
    C,
    Cpp,
    CSharp,
    Json,
    Markdown,
    Toml,
    Yaml,
    Ini,
    Text,
    Unknown,
}

impl Lang {
    /// Identifier stored in the `language` payload field.
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Rust => "rust",
            Self::Go => "go",
            Self::Java => "java",
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::CSharp => "csharp",
            Self::Json => "json",
            Self::Markdown => "markdown",
            Self::Toml => "toml",
            Self::Yaml => "yaml",
            Self::Ini => "ini",
            Self::Text => "text",
            Self::Unknown => "unknown",
        }
    }

    #[must_use]
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "py" | "pyi" => Self::Python,
            "js" | "jsx" | "mjs" | "cjs" => Self::JavaScript,
            "ts" | "tsx" | "mts" | "cts" => Self::TypeScript,
            "rs" => Self::Rust,
            "go" => Self::Go,
            "java" => Self::Java,
            "c" | "h" => Self::C,
            "cc" | "cpp" | "cxx" | "hpp" | "hh" => Self::Cpp,
            "cs" => Self::CSharp,
            "json" => Self::Json,
            "md" | "markdown" => Self::Markdown,
            "toml" => Self::Toml,
            "yml" | "yaml" => Self::Yaml,
            "cfg" | "ini" => Self::Ini,
            "txt" => Self::Text,
            _ => Self::Unknown,
        }
    }

    /// Boundary detection strategy for this language.
    #[must_use]
    pub fn detector(self) -> BoundaryDetector {
        match self {
            Self::Python => BoundaryDetector::Indentation,
            Self::JavaScript | Self::TypeScript => BoundaryDetector::Brace(BraceSyntax::JavaScript),
            Self::Rust => BoundaryDetector::Brace(BraceSyntax::Rust),
            Self::Go => BoundaryDetector::Brace(BraceSyntax::Go),
            Self::Java => BoundaryDetector::Brace(BraceSyntax::Java),
            Self::C | Self::Cpp => BoundaryDetector::Brace(BraceSyntax::C),
            Self::CSharp => BoundaryDetector::Brace(BraceSyntax::CSharp),
            Self::Json
            | Self::Markdown
            | Self::Toml
            | Self::Yaml
            | Self::Ini
            | Self::Text
            | Self::Unknown => BoundaryDetector::Fallback,
        }
    }
}

/// Detect language from a path's extension, `Unknown` when there is none.
#[must_use]
pub fn detect_language(path: &Path) -> Lang {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(Lang::Unknown, Lang::from_extension)
}
