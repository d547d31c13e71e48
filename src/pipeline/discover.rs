//! Directory validation and artifact discovery.
//!
//! Stages address their input by convention rather than by manifest: "the
//! `*.<ext>` file in the target directory". Filesystem enumeration order is
//! not stable across platforms, so candidates are sorted by file name and
//! the lexicographically first one wins. Hidden files (including docpipe's
//! own `.docpipe-*` temp files) never take part.

use crate::error::PipelineError;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Prefix of every temp file docpipe creates inside a target directory.
pub const TEMP_PREFIX: &str = ".docpipe-";

/// The file types stages produce and consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Markdown,
    Html,
    Pdf,
    Zip,
}

impl ArtifactKind {
    /// Extension without the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            ArtifactKind::Markdown => "md",
            ArtifactKind::Html => "html",
            ArtifactKind::Pdf => "pdf",
            ArtifactKind::Zip => "zip",
        }
    }

    /// Whether `path` carries this kind's extension (case-insensitive).
    pub fn matches(self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(self.extension()))
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ".{}", self.extension())
    }
}

/// Check that `dir` exists, is a directory and has at least one entry.
///
/// `expected` only feeds the error message so an empty directory reports
/// which input was missing.
pub fn validate_directory(dir: &Path, expected: ArtifactKind) -> Result<(), PipelineError> {
    let meta = match std::fs::metadata(dir) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(PipelineError::DirectoryNotFound {
                path: dir.to_path_buf(),
            });
        }
        Err(e) => return Err(PipelineError::io(dir, e)),
    };
    if !meta.is_dir() {
        return Err(PipelineError::NotADirectory {
            path: dir.to_path_buf(),
        });
    }

    let mut entries = std::fs::read_dir(dir).map_err(|e| PipelineError::io(dir, e))?;
    if entries.next().is_none() {
        return Err(PipelineError::EmptyDirectory {
            path: dir.to_path_buf(),
            expected,
        });
    }
    Ok(())
}

/// All non-hidden regular files of `kind` directly inside `dir`, sorted by
/// file name.
pub fn find_candidates(dir: &Path, kind: ArtifactKind) -> Result<Vec<PathBuf>, PipelineError> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| PipelineError::io(dir, e))? {
        let entry = entry.map_err(|e| PipelineError::io(dir, e))?;
        let path = entry.path();
        if is_hidden(&path) || !kind.matches(&path) {
            continue;
        }
        let file_type = entry.file_type().map_err(|e| PipelineError::io(&path, e))?;
        if file_type.is_file() || (file_type.is_symlink() && path.is_file()) {
            found.push(path);
        }
    }
    found.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(found)
}

/// Locate the stage input of `kind` in `dir`.
///
/// With `explicit` set, that file name (relative to `dir`) is used instead
/// of discovery and must exist with the right extension.
pub fn discover_artifact(
    dir: &Path,
    kind: ArtifactKind,
    explicit: Option<&str>,
) -> Result<PathBuf, PipelineError> {
    validate_directory(dir, kind)?;

    if let Some(name) = explicit {
        let path = dir.join(name);
        if path.is_file() && kind.matches(&path) {
            debug!("Using explicit {} input: {}", kind, path.display());
            return Ok(path);
        }
        return Err(PipelineError::ArtifactNotFound {
            dir: dir.to_path_buf(),
            kind,
        });
    }

    let candidates = find_candidates(dir, kind)?;
    let Some(first) = candidates.first() else {
        return Err(PipelineError::ArtifactNotFound {
            dir: dir.to_path_buf(),
            kind,
        });
    };

    if candidates.len() > 1 {
        warn!(
            "{} {} files in {}; using '{}' (first by name)",
            candidates.len(),
            kind,
            dir.display(),
            first.file_name().unwrap_or_default().to_string_lossy()
        );
    }
    debug!("Discovered {} input: {}", kind, first.display());
    Ok(first.clone())
}

/// `path` with its extension replaced by `kind`'s.
pub fn sibling_with_kind(path: &Path, kind: ArtifactKind) -> PathBuf {
    path.with_extension(kind.extension())
}

pub(crate) fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn missing_directory_is_precondition_error() {
        let err = discover_artifact(Path::new("/no/such/dir"), ArtifactKind::Html, None)
            .unwrap_err();
        assert!(matches!(err, PipelineError::DirectoryNotFound { .. }));
    }

    #[test]
    fn empty_directory_names_the_missing_type() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover_artifact(dir.path(), ArtifactKind::Markdown, None).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyDirectory { .. }));
        assert!(err.to_string().contains(".md"));
    }

    #[test]
    fn file_instead_of_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("spec.md");
        fs::write(&file, "# x").unwrap();
        let err = discover_artifact(&file, ArtifactKind::Markdown, None).unwrap_err();
        assert!(matches!(err, PipelineError::NotADirectory { .. }));
    }

    #[test]
    fn no_matching_extension() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();
        let err = discover_artifact(dir.path(), ArtifactKind::Html, None).unwrap_err();
        assert!(matches!(err, PipelineError::ArtifactNotFound { .. }));
        assert!(err.to_string().contains(".html"));
    }

    #[test]
    fn first_match_is_lexicographic() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("zeta.html"), "").unwrap();
        fs::write(dir.path().join("alpha.html"), "").unwrap();
        fs::write(dir.path().join("mid.HTML"), "").unwrap();
        let found = discover_artifact(dir.path(), ArtifactKind::Html, None).unwrap();
        assert_eq!(found.file_name().unwrap(), "alpha.html");

        let all = find_candidates(dir.path(), ArtifactKind::Html).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn hidden_and_nested_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".docpipe-tmp.html"), "").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/inner.html"), "").unwrap();
        let err = discover_artifact(dir.path(), ArtifactKind::Html, None).unwrap_err();
        assert!(matches!(err, PipelineError::ArtifactNotFound { .. }));
    }

    #[test]
    fn explicit_name_overrides_discovery() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.md"), "").unwrap();
        fs::write(dir.path().join("b.md"), "").unwrap();
        let found = discover_artifact(dir.path(), ArtifactKind::Markdown, Some("b.md")).unwrap();
        assert_eq!(found.file_name().unwrap(), "b.md");

        let err =
            discover_artifact(dir.path(), ArtifactKind::Markdown, Some("c.md")).unwrap_err();
        assert!(matches!(err, PipelineError::ArtifactNotFound { .. }));
    }

    #[test]
    fn sibling_swaps_extension() {
        assert_eq!(
            sibling_with_kind(Path::new("docs/spec/spec.html"), ArtifactKind::Pdf),
            PathBuf::from("docs/spec/spec.pdf")
        );
    }
}
