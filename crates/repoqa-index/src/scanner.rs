//! Repository walk and source file loading.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use crate::error::{IndexError, ScanError};
use crate::metadata::SourceFile;

pub const DEFAULT_EXTENSIONS: &[&str] = &[
    "py", "pyi", "js", "jsx", "ts", "tsx", "json", "md", "toml", "yaml", "yml", "cfg", "ini", "txt",
    "rs", "go", "java", "c", "h", "cpp", "hpp", "cs",
];

pub const DEFAULT_EXCLUDE_DIRS: &[&str] = &[
    "node_modules",
    "venv",
    ".venv",
    "dist",
    "build",
    "__pycache__",
    ".git",
    "target",
];

/// Bytes inspected for a NUL when deciding whether a file is binary.
const BINARY_SNIFF_LEN: usize = 8 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// Allowed extensions, with or without the leading dot. Case-insensitive.
    pub extensions: Vec<String>,
    /// Directory names never descended into, at any depth.
    pub exclude_dirs: Vec<String>,
    pub max_file_bytes: u64,
    pub respect_gitignore: bool,
    pub include_hidden: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|&e| e.to_owned()).collect(),
            exclude_dirs: DEFAULT_EXCLUDE_DIRS.iter().map(|&d| d.to_owned()).collect(),
            max_file_bytes: 1024 * 1024,
            respect_gitignore: true,
            include_hidden: false,
        }
    }
}

/// Result of walking a repository.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Repo-relative, `/`-separated, sorted.
    pub files: Vec<String>,
    /// Entries the walker could not visit.
    pub skipped: Vec<ScanError>,
}

/// Walk `root` and collect candidate files.
///
/// # Errors
///
/// Returns [`IndexError::NotADirectory`] if `root` is not a directory.
/// Problems with individual entries are collected in [`ScanOutcome::skipped`].
pub fn scan(root: &Path, config: &ScanConfig) -> Result<ScanOutcome, IndexError> {
    if !root.is_dir() {
        return Err(IndexError::NotADirectory(root.to_path_buf()));
    }

    let allowed: HashSet<String> = config
        .extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
        .collect();
    let excluded: Arc<HashSet<String>> = Arc::new(config.exclude_dirs.iter().cloned().collect());

    let walker = ignore::WalkBuilder::new(root)
        .hidden(!config.include_hidden)
        .git_ignore(config.respect_gitignore)
        .git_global(config.respect_gitignore)
        .git_exclude(config.respect_gitignore)
        .ignore(config.respect_gitignore)
        .require_git(false)
        .filter_entry(move |entry| {
            let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
            !(is_dir
                && entry.depth() > 0
                && excluded.contains(entry.file_name().to_string_lossy().as_ref()))
        })
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    let mut outcome = ScanOutcome::default();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("skipping unreadable entry: {e}");
                outcome.skipped.push(ScanError::Walk(e.to_string()));
                continue;
            }
        };
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        let allowed_ext = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| allowed.contains(&e.to_ascii_lowercase()));
        if !allowed_ext {
            continue;
        }
        if let Ok(rel) = entry.path().strip_prefix(root) {
            outcome.files.push(to_repo_path(rel));
        }
    }
    outcome.files.sort();
    Ok(outcome)
}

fn to_repo_path(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Read one scanned file as text.
///
/// # Errors
///
/// Returns a [`ScanError`] when the file cannot be read, exceeds
/// `max_file_bytes`, looks binary or is not UTF-8.
pub async fn read_source(root: &Path, rel: &str, max_file_bytes: u64) -> Result<SourceFile, ScanError> {
    let abs = root.join(rel);
    let io_err = |source| ScanError::Io {
        path: rel.to_owned(),
        source,
    };

    let size = tokio::fs::metadata(&abs).await.map_err(io_err)?.len();
    if size > max_file_bytes {
        return Err(ScanError::TooLarge {
            path: rel.to_owned(),
            size,
            limit: max_file_bytes,
        });
    }

    let bytes = tokio::fs::read(&abs).await.map_err(io_err)?;
    if bytes.iter().take(BINARY_SNIFF_LEN).any(|&b| b == 0) {
        return Err(ScanError::Binary {
            path: rel.to_owned(),
        });
    }
    let text = String::from_utf8(bytes).map_err(|_| ScanError::NotUtf8 {
        path: rel.to_owned(),
    })?;
    Ok(SourceFile::new(rel, text))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::languages::Lang;

    fn write(root: &Path, rel: &str, content: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "backend/app.py", b"def main():\n    pass\n");
        write(root, "backend/util.PY", b"X = 1\n");
        write(root, "frontend/index.ts", b"export const a = 1;\n");
        write(root, "README.md", b"# hi\n");
        write(root, "logo.png", b"\x89PNG");
        write(root, "node_modules/lib/index.js", b"module.exports = 1;\n");
        write(root, "backend/__pycache__/app.py", b"cached\n");
        write(root, "src/build/gen.rs", b"fn gen() {}\n");
        write(root, ".hidden/secret.py", b"KEY = 1\n");
        dir
    }

    #[test]
    fn applies_extensions_and_exclusions() {
        let dir = repo();
        let outcome = scan(dir.path(), &ScanConfig::default()).unwrap();
        assert_eq!(
            outcome.files,
            ["README.md", "backend/app.py", "backend/util.PY", "frontend/index.ts"]
        );
        assert!(outcome.skipped.is_empty());
    }

    #[test]
    fn hidden_files_opt_in() {
        let dir = repo();
        let config = ScanConfig {
            include_hidden: true,
            ..ScanConfig::default()
        };
        let outcome = scan(dir.path(), &config).unwrap();
        assert!(outcome.files.contains(&".hidden/secret.py".to_owned()));
    }

    #[test]
    fn extensions_accept_leading_dot() {
        let dir = repo();
        let config = ScanConfig {
            extensions: vec![".ts".into()],
            ..ScanConfig::default()
        };
        let outcome = scan(dir.path(), &config).unwrap();
        assert_eq!(outcome.files, ["frontend/index.ts"]);
    }

    #[test]
    fn gitignore_is_respected_without_git_dir() {
        let dir = repo();
        write(dir.path(), ".gitignore", b"frontend/\n");
        let outcome = scan(dir.path(), &ScanConfig::default()).unwrap();
        assert!(!outcome.files.iter().any(|f| f.starts_with("frontend/")));

        let config = ScanConfig {
            respect_gitignore: false,
            ..ScanConfig::default()
        };
        let outcome = scan(dir.path(), &config).unwrap();
        assert!(outcome.files.contains(&"frontend/index.ts".to_owned()));
    }

    #[test]
    fn root_must_be_a_directory() {
        let dir = repo();
        let err = scan(&dir.path().join("README.md"), &ScanConfig::default()).unwrap_err();
        assert!(matches!(err, IndexError::NotADirectory(_)));
    }

    #[tokio::test]
    async fn read_source_detects_language() {
        let dir = repo();
        let file = read_source(dir.path(), "backend/app.py", 1024).await.unwrap();
        assert_eq!(file.language, Lang::Python);
        assert_eq!(file.filename(), "app.py");
        assert!(file.text.starts_with("def main"));
    }

    #[tokio::test]
    async fn read_source_rejects_unusable_files() {
        let dir = repo();
        write(dir.path(), "bin.txt", b"abc\0def");
        write(dir.path(), "latin1.txt", b"caf\xe9\n");
        write(dir.path(), "big.txt", &[b'a'; 64]);

        assert!(matches!(
            read_source(dir.path(), "bin.txt", 1024).await,
            Err(ScanError::Binary { .. })
        ));
        assert!(matches!(
            read_source(dir.path(), "latin1.txt", 1024).await,
            Err(ScanError::NotUtf8 { .. })
        ));
        assert!(matches!(
            read_source(dir.path(), "big.txt", 16).await,
            Err(ScanError::TooLarge { size: 64, limit: 16, .. })
        ));
        assert!(matches!(
            read_source(dir.path(), "missing.py", 1024).await,
            Err(ScanError::Io { .. })
        ));
    }
}
