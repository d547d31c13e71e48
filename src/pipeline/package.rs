//! Packager stage: directory → `<project>-<version>-<stage>.zip`.
//!
//! Files are enumerated recursively and sorted by their `/`-separated
//! relative path, so two runs over the same tree produce entries in the
//! same order. Hidden entries (including `.git`), docpipe temp files and
//! the archive itself are never packaged.

use crate::error::PipelineError;
use crate::output::StageArtifact;
use crate::pipeline::discover::{is_hidden, validate_directory, ArtifactKind};
use crate::pipeline::{persist, temp_file_in};
use crate::request::{stamp_mtime, ModificationDate};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Permission bits every archive entry carries.
pub const ENTRY_MODE: u32 = 0o644;

/// Earliest year a zip timestamp can express.
pub const ZIP_MIN_YEAR: i32 = 1980;

/// The three parts of an archive file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveName {
    pub project: String,
    pub version: String,
    pub stage: String,
}

impl ArchiveName {
    pub fn new(
        project: impl Into<String>,
        version: impl Into<String>,
        stage: impl Into<String>,
    ) -> Result<Self, PipelineError> {
        let name = Self {
            project: project.into(),
            version: version.into(),
            stage: stage.into(),
        };
        for (label, part) in [
            ("project", &name.project),
            ("version", &name.version),
            ("stage", &name.stage),
        ] {
            if part.trim().is_empty() {
                return Err(PipelineError::InvalidConfig(format!(
                    "archive {label} must not be empty"
                )));
            }
            if part.contains(['/', '\\']) || part.starts_with('.') {
                return Err(PipelineError::InvalidConfig(format!(
                    "archive {label} '{part}' is not a plain name"
                )));
            }
        }
        Ok(name)
    }

    /// `<project>-<version>-<stage>.zip`
    pub fn file_name(&self) -> String {
        format!("{}-{}-{}.zip", self.project, self.version, self.stage)
    }
}

impl fmt::Display for ArchiveName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}

/// One file to be archived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageEntry {
    /// Absolute (or caller-relative) path on disk.
    pub path: PathBuf,
    /// `/`-separated path inside the archive.
    pub name: String,
}

/// Every packageable file below `dir`, sorted by entry name.
///
/// Symlinks to files are archived with the target's content; symlinks to
/// directories are skipped.
///
/// `exclude` is a file name at the top level of `dir` to leave out (the
/// archive being written).
pub fn collect_entries(dir: &Path, exclude: &str) -> Result<Vec<PackageEntry>, PipelineError> {
    let mut entries = Vec::new();
    walk(dir, "", &mut entries)?;
    entries.retain(|e| e.name != exclude);
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

fn walk(dir: &Path, prefix: &str, out: &mut Vec<PackageEntry>) -> Result<(), PipelineError> {
    for entry in std::fs::read_dir(dir).map_err(|e| PipelineError::io(dir, e))? {
        let entry = entry.map_err(|e| PipelineError::io(dir, e))?;
        let path = entry.path();
        if is_hidden(&path) {
            continue;
        }
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            debug!("Skipping non-UTF-8 name {}", path.display());
            continue;
        };
        let name = format!("{prefix}{file_name}");
        let file_type = entry.file_type().map_err(|e| PipelineError::io(&path, e))?;
        if file_type.is_dir() {
            walk(&path, &format!("{name}/"), out)?;
        } else if file_type.is_symlink() && path.is_dir() {
            // Never descend through links; `loop -> .` would recurse until ELOOP.
            warn!("Skipping symlinked directory {}", path.display());
        } else if path.is_file() {
            out.push(PackageEntry { path, name });
        }
    }
    Ok(())
}

fn zip_time(date: ModificationDate) -> Result<zip::DateTime, PipelineError> {
    let (y, m, d) = date.ymd();
    let invalid = |reason: String| PipelineError::InvalidDate {
        input: date.to_string(),
        reason,
    };
    if y < ZIP_MIN_YEAR {
        return Err(invalid(format!("archives cannot hold dates before {ZIP_MIN_YEAR}")));
    }
    let year = u16::try_from(y).map_err(|_| invalid("year out of range".into()))?;
    zip::DateTime::from_date_and_time(year, m as u8, d as u8, 0, 0, 0)
        .map_err(|_| invalid("date out of zip range".into()))
}

/// Archive every file in `dir` into `dir/<name>`.
///
/// Each packaged file (and the archive) has its mtime set to `date`; each
/// entry carries `date` as its timestamp and mode 0644.
pub fn package_directory(
    dir: &Path,
    name: &ArchiveName,
    date: ModificationDate,
) -> Result<StageArtifact, PipelineError> {
    match validate_directory(dir, ArtifactKind::Zip) {
        Err(PipelineError::EmptyDirectory { path, .. }) => {
            return Err(PipelineError::NothingToPackage { path })
        }
        other => other?,
    }
    let archive_name = name.file_name();
    let output = dir.join(&archive_name);
    let timestamp = zip_time(date)?;

    // ── Step 1: Enumerate ────────────────────────────────────────────────
    let entries = collect_entries(dir, &archive_name)?;
    if entries.is_empty() {
        return Err(PipelineError::NothingToPackage {
            path: dir.to_path_buf(),
        });
    }
    debug!("Packaging {} file(s) from {}", entries.len(), dir.display());

    // ── Step 2: Normalise on-disk timestamps ─────────────────────────────
    for entry in &entries {
        stamp_mtime(&entry.path, date)?;
    }

    // ── Step 3: Write the archive ────────────────────────────────────────
    let (tmp, _guard) = temp_file_in(dir, ".zip")?;
    let archive_err = |detail: String| PipelineError::Archive {
        path: output.clone(),
        detail,
    };
    let file = tmp.reopen().map_err(|e| PipelineError::io(tmp.path(), e))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(ENTRY_MODE)
        .last_modified_time(timestamp);
    for entry in &entries {
        let bytes = std::fs::read(&entry.path).map_err(|e| PipelineError::io(&entry.path, e))?;
        zip.start_file(entry.name.as_str(), options)
            .map_err(|e| archive_err(format!("{}: {e}", entry.name)))?;
        zip.write_all(&bytes)
            .map_err(|e| archive_err(format!("{}: {e}", entry.name)))?;
    }
    zip.finish().map_err(|e| archive_err(e.to_string()))?;

    persist(tmp, &output)?;
    stamp_mtime(&output, date)?;
    let bytes = std::fs::metadata(&output)
        .map_err(|e| PipelineError::io(&output, e))?
        .len();

    info!(
        "Packaged {} file(s) into {} ({} bytes)",
        entries.len(),
        output.display(),
        bytes
    );
    Ok(StageArtifact::new(output, bytes))
}
