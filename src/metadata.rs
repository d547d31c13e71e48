//! Modification-time preservation across git checkouts.
//!
//! Git does not store file mtimes, so a checkout stamps every touched file
//! with "now". [`save_record`] runs before such an operation and writes one
//! `"<epoch> <relative-path>"` line per tracked file to the record file;
//! [`restore_record`] runs afterwards, puts the recorded times back and
//! rewrites the record with only the entries that still apply.
//!
//! Both directions replace the record through a hidden temp file that is
//! registered with [`crate::cleanup`], so neither a failure nor an
//! interrupt leaves a half-written record or a stray temp file.
//!
//! The repository is reached through the [`GitIndex`] trait; [`GitCli`] is
//! the production implementation.

use crate::config::{PipelineConfig, ToolSpec};
use crate::error::PipelineError;
use crate::pipeline::{exec, write_atomic};
use crate::request::set_mtime;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// One line of the record file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadataRecord {
    /// Seconds since the Unix epoch.
    pub epoch: i64,
    /// Path relative to the repository root, `/`-separated.
    pub path: String,
}

impl FileMetadataRecord {
    /// Parse `"<epoch> <path>"`. The path is everything after the first
    /// space, so paths containing spaces survive.
    pub fn parse(line: &str) -> Option<Self> {
        let (epoch, path) = line.split_once(' ')?;
        let epoch = epoch.parse().ok()?;
        if path.is_empty() {
            return None;
        }
        Some(Self {
            epoch,
            path: path.to_string(),
        })
    }

    pub fn system_time(&self) -> SystemTime {
        if self.epoch >= 0 {
            UNIX_EPOCH + Duration::from_secs(self.epoch as u64)
        } else {
            UNIX_EPOCH - Duration::from_secs(self.epoch.unsigned_abs())
        }
    }
}

impl fmt::Display for FileMetadataRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.epoch, self.path)
    }
}

/// What the restorer needs to know about the repository.
pub trait GitIndex {
    /// Every tracked path, relative to the repository root.
    fn tracked_files(&self) -> Result<Vec<String>, PipelineError>;

    /// Whether `path` matches an ignore rule.
    fn is_ignored(&self, path: &str) -> Result<bool, PipelineError>;
}

/// [`GitIndex`] backed by the `git` command line.
#[derive(Debug, Clone)]
pub struct GitCli {
    tool: ToolSpec,
    program: PathBuf,
    root: PathBuf,
}

impl GitCli {
    /// Resolve `tool` and bind it to the repository at `root`.
    pub fn new(tool: &ToolSpec, root: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        Ok(Self {
            program: exec::resolve(tool)?,
            tool: tool.clone(),
            root: root.into(),
        })
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.tool.args)
            .args(args)
            .current_dir(&self.root)
            .stdin(Stdio::null());
        cmd
    }

    fn failure(&self, args: &[&str], status: String, stderr: &[u8]) -> PipelineError {
        let args: Vec<_> = args.iter().map(std::ffi::OsString::from).collect();
        PipelineError::ToolFailed {
            tool: self.tool.display_name(),
            command: exec::render_command(&self.tool, &args),
            status,
            stderr: String::from_utf8_lossy(stderr).trim().to_string(),
        }
    }
}

impl GitIndex for GitCli {
    fn tracked_files(&self) -> Result<Vec<String>, PipelineError> {
        let args = ["ls-files", "-z"];
        let output = self
            .command(&args)
            .output()
            .map_err(|source| PipelineError::ToolSpawnFailed {
                tool: self.tool.display_name(),
                source,
            })?;
        if !output.status.success() {
            return Err(self.failure(&args, output.status.to_string(), &output.stderr));
        }
        Ok(output
            .stdout
            .split(|b| *b == 0)
            .filter(|s| !s.is_empty())
            .map(|s| String::from_utf8_lossy(s).into_owned())
            .collect())
    }

    fn is_ignored(&self, path: &str) -> Result<bool, PipelineError> {
        let args = ["check-ignore", "-q", "--", path];
        let output = self
            .command(&args)
            .stdout(Stdio::null())
            .output()
            .map_err(|source| PipelineError::ToolSpawnFailed {
                tool: self.tool.display_name(),
                source,
            })?;
        // 0: ignored, 1: not ignored, anything else: error.
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(self.failure(&args, output.status.to_string(), &output.stderr)),
        }
    }
}

/// Summary of a save or restore run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetadataReport {
    /// Location of the record file.
    pub record: PathBuf,
    /// Entries written to the (new) record.
    pub entries: usize,
    /// Entries left out or not applied, one human-readable reason each.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
    /// Restore only: there was no record file, nothing was done.
    pub no_record: bool,
}

fn modified_epoch(path: &Path) -> Result<i64, PipelineError> {
    let modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| PipelineError::io(path, e))?;
    Ok(epoch_seconds(modified))
}

/// Whole seconds since the epoch, rounded toward negative infinity (as
/// `stat -c %Y` prints them).
fn epoch_seconds(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => {
            let before = e.duration();
            let secs = before.as_secs() as i64;
            if before.subsec_nanos() > 0 {
                -secs - 1
            } else {
                -secs
            }
        }
    }
}

fn render_record(records: &[FileMetadataRecord]) -> String {
    let mut out = String::new();
    for r in records {
        out.push_str(&r.to_string());
        out.push('\n');
    }
    out
}

/// Record the current mtime of every tracked file under `root`.
pub fn save_record(
    root: &Path,
    record_file: &Path,
    index: &dyn GitIndex,
) -> Result<MetadataReport, PipelineError> {
    let record_path = root.join(record_file);
    let mut report = MetadataReport {
        record: record_path.clone(),
        ..Default::default()
    };

    let mut records = Vec::new();
    for path in index.tracked_files()? {
        // The record format is line-based and cannot hold these.
        if path.contains('\n') {
            warn!("Not recording path with a newline: {:?}", path);
            report.skipped.push(format!("{path:?}: contains a newline"));
            continue;
        }
        let on_disk = root.join(&path);
        if !on_disk.is_file() {
            debug!("Tracked but absent: {}", path);
            continue;
        }
        records.push(FileMetadataRecord {
            epoch: modified_epoch(&on_disk)?,
            path,
        });
    }

    write_atomic(&record_path, render_record(&records).as_bytes())?;
    report.entries = records.len();
    info!(
        "Saved modification times of {} file(s) to {}",
        report.entries,
        record_path.display()
    );
    Ok(report)
}

/// Re-apply the recorded mtimes and rewrite the record.
///
/// Entries whose path is no longer tracked, is ignored, no longer exists
/// or cannot be parsed are skipped with a warning and dropped from the
/// record. Git is consulted for every entry before any file is touched, so
/// a git failure leaves both the files and the record unchanged. A file
/// whose time cannot be set is reported but keeps its entry. A missing
/// record file is a successful no-op.
pub fn restore_record(
    root: &Path,
    record_file: &Path,
    index: &dyn GitIndex,
) -> Result<MetadataReport, PipelineError> {
    let record_path = root.join(record_file);
    let mut report = MetadataReport {
        record: record_path.clone(),
        ..Default::default()
    };

    let text = match std::fs::read_to_string(&record_path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("No record file at {}; nothing to restore", record_path.display());
            report.no_record = true;
            return Ok(report);
        }
        Err(e) => return Err(PipelineError::io(&record_path, e)),
    };

    // ── Step 1: Decide every entry before touching any file ──────────────
    let tracked: HashSet<String> = index.tracked_files()?.into_iter().collect();
    let mut kept = Vec::new();
    for (n, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let Some(record) = FileMetadataRecord::parse(line) else {
            warn!("Malformed record line {}: {:?}", n + 1, line);
            report.skipped.push(format!("line {}: malformed", n + 1));
            continue;
        };
        let reason = if !tracked.contains(&record.path) {
            Some("untracked")
        } else if index.is_ignored(&record.path)? {
            Some("ignored")
        } else if !root.join(&record.path).is_file() {
            Some("missing")
        } else {
            None
        };
        match reason {
            Some(reason) => {
                debug!("Skipping {} ({})", record.path, reason);
                report.skipped.push(format!("{}: {reason}", record.path));
            }
            None => kept.push(record),
        }
    }

    // ── Step 2: Apply ────────────────────────────────────────────────────
    let mut restored = 0;
    for record in &kept {
        match set_mtime(&root.join(&record.path), record.system_time()) {
            Ok(()) => restored += 1,
            Err(e) => {
                warn!("Cannot restore modification time: {}", e);
                report.skipped.push(format!("{}: {e}", record.path));
            }
        }
    }

    write_atomic(&record_path, render_record(&kept).as_bytes())?;
    report.entries = kept.len();
    info!(
        "Restored modification times of {} file(s), skipped {}",
        restored,
        report.skipped.len()
    );
    Ok(report)
}

/// [`save_record`] against the real repository at `root`.
pub fn save(root: &Path, config: &PipelineConfig) -> Result<MetadataReport, PipelineError> {
    let git = GitCli::new(&config.git, root)?;
    save_record(root, &config.record_file, &git)
}

/// [`restore_record`] against the real repository at `root`.
pub fn restore(root: &Path, config: &PipelineConfig) -> Result<MetadataReport, PipelineError> {
    let record_path = root.join(&config.record_file);
    if !record_path.exists() {
        // Skip resolving git at all.
        info!("No record file at {}; nothing to restore", record_path.display());
        return Ok(MetadataReport {
            record: record_path,
            no_record: true,
            ..Default::default()
        });
    }
    let git = GitCli::new(&config.git, root)?;
    restore_record(root, &config.record_file, &git)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    struct FakeIndex {
        tracked: Vec<&'static str>,
        ignored: Vec<&'static str>,
    }

    impl GitIndex for FakeIndex {
        fn tracked_files(&self) -> Result<Vec<String>, PipelineError> {
            Ok(self.tracked.iter().map(|s| s.to_string()).collect())
        }

        fn is_ignored(&self, path: &str) -> Result<bool, PipelineError> {
            Ok(self.ignored.iter().any(|p| *p == path))
        }
    }

    /// Tracks everything, but `check-ignore` fails.
    struct BrokenIgnoreIndex;

    impl GitIndex for BrokenIgnoreIndex {
        fn tracked_files(&self) -> Result<Vec<String>, PipelineError> {
            Ok(vec!["a.md".into(), "b.md".into()])
        }

        fn is_ignored(&self, path: &str) -> Result<bool, PipelineError> {
            if path == "b.md" {
                return Err(PipelineError::ToolFailed {
                    tool: "git".into(),
                    command: format!("git check-ignore -q -- {path}"),
                    status: "exit status: 128".into(),
                    stderr: "fatal: not a git repository".into(),
                });
            }
            Ok(false)
        }
    }

    fn mtime(path: &Path) -> SystemTime {
        fs::metadata(path).unwrap().modified().unwrap()
    }

    #[test]
    fn parses_and_prints_lines() {
        let r = FileMetadataRecord::parse("1700000000 docs/my spec.md").unwrap();
        assert_eq!(r.epoch, 1_700_000_000);
        assert_eq!(r.path, "docs/my spec.md");
        assert_eq!(r.to_string(), "1700000000 docs/my spec.md");

        assert!(FileMetadataRecord::parse("notanumber a.md").is_none());
        assert!(FileMetadataRecord::parse("1700000000").is_none());
        assert!(FileMetadataRecord::parse("1700000000 ").is_none());
    }

    #[test]
    fn negative_epochs_map_before_1970() {
        let r = FileMetadataRecord {
            epoch: -86_400,
            path: "a".into(),
        };
        assert_eq!(r.system_time(), UNIX_EPOCH - Duration::from_secs(86_400));
    }

    #[test]
    fn save_then_restore_round_trips_mtimes() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("docs")).unwrap();
        let a = root.path().join("docs/a.md");
        fs::write(&a, "a").unwrap();
        let original = UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        fs::File::options()
            .write(true)
            .open(&a)
            .unwrap()
            .set_modified(original)
            .unwrap();

        let index = FakeIndex {
            tracked: vec!["docs/a.md", "gone.md"],
            ignored: vec![],
        };
        let saved = save_record(root.path(), Path::new(".git-mtimes"), &index).unwrap();
        assert_eq!(saved.entries, 1);
        let text = fs::read_to_string(root.path().join(".git-mtimes")).unwrap();
        assert_eq!(text, "1600000000 docs/a.md\n");

        // A checkout touches the file.
        fs::write(&a, "a2").unwrap();
        assert_ne!(mtime(&a), original);

        let restored = restore_record(root.path(), Path::new(".git-mtimes"), &index).unwrap();
        assert_eq!(restored.entries, 1);
        assert_eq!(mtime(&a), original);
    }

    #[test]
    fn restore_skips_untracked_ignored_missing_and_malformed() {
        let root = tempfile::tempdir().unwrap();
        for name in ["kept.md", "untracked.md", "ignored.md"] {
            fs::write(root.path().join(name), name).unwrap();
        }
        fs::write(
            root.path().join(".git-mtimes"),
            "1500000000 kept.md\n\
             1500000000 untracked.md\n\
             1500000000 ignored.md\n\
             1500000000 deleted.md\n\
             garbage\n",
        )
        .unwrap();
        let index = FakeIndex {
            tracked: vec!["kept.md", "ignored.md", "deleted.md"],
            ignored: vec!["ignored.md"],
        };

        let report = restore_record(root.path(), Path::new(".git-mtimes"), &index).unwrap();
        assert_eq!(report.entries, 1);
        assert_eq!(report.skipped.len(), 4);
        assert_eq!(
            mtime(&root.path().join("kept.md")),
            UNIX_EPOCH + Duration::from_secs(1_500_000_000)
        );
        assert_ne!(
            mtime(&root.path().join("untracked.md")),
            UNIX_EPOCH + Duration::from_secs(1_500_000_000)
        );

        let rewritten = fs::read_to_string(root.path().join(".git-mtimes")).unwrap();
        assert_eq!(rewritten, "1500000000 kept.md\n");
        let leftovers = fs::read_dir(root.path())
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .starts_with(".docpipe-")
            })
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn epoch_seconds_floor_before_1970() {
        assert_eq!(epoch_seconds(UNIX_EPOCH + Duration::from_millis(1_500)), 1);
        assert_eq!(epoch_seconds(UNIX_EPOCH - Duration::from_secs(2)), -2);
        assert_eq!(epoch_seconds(UNIX_EPOCH - Duration::from_millis(1_500)), -2);

        let r = FileMetadataRecord {
            epoch: epoch_seconds(UNIX_EPOCH - Duration::from_millis(1_500)),
            path: "a".into(),
        };
        assert!(r.system_time() <= UNIX_EPOCH - Duration::from_millis(1_500));
    }

    #[cfg(unix)]
    #[test]
    fn restore_applies_to_read_only_files() {
        use std::os::unix::fs::PermissionsExt;

        let root = tempfile::tempdir().unwrap();
        let ro = root.path().join("ro.md");
        let rw = root.path().join("rw.md");
        fs::write(&ro, "ro").unwrap();
        fs::write(&rw, "rw").unwrap();
        fs::set_permissions(&ro, fs::Permissions::from_mode(0o444)).unwrap();
        fs::write(
            root.path().join(".git-mtimes"),
            "1400000000 ro.md\n1400000001 rw.md\n",
        )
        .unwrap();
        let index = FakeIndex {
            tracked: vec!["ro.md", "rw.md"],
            ignored: vec![],
        };

        let report = restore_record(root.path(), Path::new(".git-mtimes"), &index).unwrap();
        assert_eq!(report.entries, 2);
        assert!(report.skipped.is_empty(), "{:?}", report.skipped);
        assert_eq!(mtime(&ro), UNIX_EPOCH + Duration::from_secs(1_400_000_000));
        assert_eq!(mtime(&rw), UNIX_EPOCH + Duration::from_secs(1_400_000_001));
        assert_eq!(fs::metadata(&ro).unwrap().permissions().mode() & 0o777, 0o444);
    }

    #[test]
    fn git_failure_leaves_files_and_record_untouched() {
        let root = tempfile::tempdir().unwrap();
        let a = root.path().join("a.md");
        fs::write(&a, "a").unwrap();
        fs::write(root.path().join("b.md"), "b").unwrap();
        let record = "1300000000 a.md\n1300000000 b.md\n";
        fs::write(root.path().join(".git-mtimes"), record).unwrap();
        let before = mtime(&a);

        let err = restore_record(root.path(), Path::new(".git-mtimes"), &BrokenIgnoreIndex)
            .unwrap_err();
        assert!(matches!(err, PipelineError::ToolFailed { .. }), "{err}");
        assert!(err.to_string().contains("check-ignore"), "{err}");
        assert_eq!(mtime(&a), before);
        assert_eq!(
            fs::read_to_string(root.path().join(".git-mtimes")).unwrap(),
            record
        );
    }

    #[test]
    fn missing_record_is_a_no_op() {
        let root = tempfile::tempdir().unwrap();
        let index = FakeIndex {
            tracked: vec![],
            ignored: vec![],
        };
        let report = restore_record(root.path(), Path::new(".git-mtimes"), &index).unwrap();
        assert!(report.no_record);
        assert!(!root.path().join(".git-mtimes").exists());

        let config = PipelineConfig::builder()
            .git(ToolSpec::new("docpipe-git-never-called"))
            .build()
            .unwrap();
        assert!(restore(root.path(), &config).unwrap().no_record);
    }
}
