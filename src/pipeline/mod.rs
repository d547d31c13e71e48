//! Pipeline stages for Markdown-to-PDF publishing.
//!
//! Each stage module implements exactly one transformation step and keeps
//! to the same contract: take a directory, discover its input by
//! extension, produce one artifact next to it, or fail without leaving a
//! partial file behind.
//!
//! ## Data Flow
//!
//! ```text
//! spec.md ──▶ markdown ──▶ html ──────────▶ render ──▶ spec.pdf
//!            (formatter)  (converter +      (printfix +
//!                          postprocess)      renderer)
//!
//! <dir>/** ──▶ package ──▶ <project>-<version>-<stage>.zip
//! ```
//!
//! 1. [`discover`] — directory validation and deterministic artifact lookup
//! 2. [`exec`] — external tool invocation with captured diagnostics
//! 3. [`markdown`] — in-place formatting plus title/description helpers
//! 4. [`html`] — converter call, [`postprocess`] rules, asset localisation
//! 5. [`printfix`] / [`render`] — print CSS and the PDF renderer
//! 6. [`package`] — zip archive with normalised metadata

pub mod discover;
pub mod exec;
pub mod html;
pub mod markdown;
pub mod package;
pub mod postprocess;
pub mod printfix;
pub mod render;

use crate::cleanup::{self, TempGuard};
use crate::error::PipelineError;
use discover::TEMP_PREFIX;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Directory containing `path`; `.` for bare file names.
pub(crate) fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

/// A hidden temp file in `dir`, registered for interrupt cleanup.
///
/// Created next to the final artifact so the closing rename never crosses
/// a file system.
pub(crate) fn temp_file_in(
    dir: &Path,
    suffix: &str,
) -> Result<(NamedTempFile, TempGuard), PipelineError> {
    let tmp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(suffix)
        .tempfile_in(dir)
        .map_err(|e| PipelineError::io(dir, e))?;
    let guard = cleanup::track(tmp.path());
    Ok((tmp, guard))
}

/// Move a finished temp file onto `target`, replacing it.
pub(crate) fn persist(tmp: NamedTempFile, target: &Path) -> Result<(), PipelineError> {
    // Temp files start out owner-only; published artifacts should not.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(0o644))
            .map_err(|e| PipelineError::io(tmp.path(), e))?;
    }
    tmp.persist(target)
        .map_err(|e| PipelineError::io(target, e.error))?;
    Ok(())
}

/// Atomically replace `target` with `bytes`.
pub(crate) fn write_atomic(target: &Path, bytes: &[u8]) -> Result<u64, PipelineError> {
    let dir = parent_dir(target);
    let suffix = target
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let (mut tmp, _guard) = temp_file_in(dir, &suffix)?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.flush())
        .map_err(|e| PipelineError::io(tmp.path(), e))?;
    persist(tmp, target)?;
    Ok(bytes.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_atomic_replaces_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("spec.html");
        std::fs::write(&target, "old").unwrap();

        assert_eq!(write_atomic(&target, b"new content").unwrap(), 11);
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "new content");

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(TEMP_PREFIX))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn persisted_files_are_world_readable() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a.pdf");
        write_atomic(&target, b"%PDF").unwrap();
        let mode = std::fs::metadata(&target).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }
}
