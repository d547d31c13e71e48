//! Error types for the docpipe library.
//!
//! Every stage failure is fatal for that stage: there are no retries and no
//! partial artifacts. [`PipelineError`] carries enough context (path,
//! artifact type, command line, captured stderr) for a CI log to name the
//! exact cause, and [`PipelineError::kind`] classifies it into the four
//! families the CLI reports on.

use crate::pipeline::discover::ArtifactKind;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Broad failure families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing directory, missing input artifact, missing tool.
    Precondition,
    /// A wrapped external tool could not start or exited non-zero.
    ToolInvocation,
    /// Malformed argument, config, or a failed output check.
    Validation,
    /// Reading or writing the file system failed.
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Precondition => "precondition",
            ErrorKind::ToolInvocation => "tool invocation",
            ErrorKind::Validation => "validation",
            ErrorKind::Io => "i/o",
        };
        f.write_str(s)
    }
}

/// All errors returned by the docpipe library.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Precondition errors ───────────────────────────────────────────────
    /// Target directory does not exist.
    #[error("Directory not found: '{path}'")]
    DirectoryNotFound { path: PathBuf },

    /// Target path exists but is not a directory.
    #[error("'{path}' is not a directory")]
    NotADirectory { path: PathBuf },

    /// Target directory has no entries at all.
    #[error("Directory '{path}' is empty: expected a {expected} file")]
    EmptyDirectory {
        path: PathBuf,
        expected: ArtifactKind,
    },

    /// No file of the expected extension in the target directory.
    #[error("No {kind} file found in '{dir}'")]
    ArtifactNotFound { dir: PathBuf, kind: ArtifactKind },

    /// The Packager found no files to archive.
    #[error("Nothing to package in '{path}': no regular files found")]
    NothingToPackage { path: PathBuf },

    /// A required executable could not be resolved.
    #[error("Required tool '{tool}' is not available: {reason}")]
    ToolNotFound { tool: String, reason: String },

    // ── Tool invocation errors ────────────────────────────────────────────
    /// The process could not be started at all.
    #[error("Failed to start '{tool}': {source}")]
    ToolSpawnFailed {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// The tool ran and exited non-zero (or was killed by a signal).
    #[error("'{tool}' failed ({status})\n  command: {command}\n{stderr}")]
    ToolFailed {
        tool: String,
        command: String,
        status: String,
        stderr: String,
    },

    /// The tool reported success but did not produce its output.
    #[error("'{tool}' exited successfully but produced no usable output at '{path}'")]
    MissingOutput { tool: String, path: PathBuf },

    // ── Validation errors ─────────────────────────────────────────────────
    /// `--date` is not a valid `yyyy-mm-dd` date.
    #[error("Invalid modification date '{input}': {reason} (expected yyyy-mm-dd)")]
    InvalidDate { input: String, reason: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The print pre-processing altered something it must preserve.
    #[error("Print pre-processing changed document structure: {0}")]
    PrintFixViolation(String),

    /// Internal links without a matching target (strict mode only).
    #[error("{} broken internal anchor(s) in '{path}': {}", anchors.len(), anchors.join(", "))]
    BrokenAnchors { path: PathBuf, anchors: Vec<String> },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Reading or writing a file failed.
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing the zip archive failed.
    #[error("Failed to write archive '{path}': {detail}")]
    Archive { path: PathBuf, detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Shorthand for [`PipelineError::Io`].
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::DirectoryNotFound { .. }
            | PipelineError::NotADirectory { .. }
            | PipelineError::EmptyDirectory { .. }
            | PipelineError::ArtifactNotFound { .. }
            | PipelineError::NothingToPackage { .. }
            | PipelineError::ToolNotFound { .. } => ErrorKind::Precondition,

            PipelineError::ToolSpawnFailed { .. }
            | PipelineError::ToolFailed { .. }
            | PipelineError::MissingOutput { .. } => ErrorKind::ToolInvocation,

            PipelineError::InvalidDate { .. }
            | PipelineError::InvalidConfig(_)
            | PipelineError::PrintFixViolation(_)
            | PipelineError::BrokenAnchors { .. } => ErrorKind::Validation,

            PipelineError::Io { .. }
            | PipelineError::Archive { .. }
            | PipelineError::Internal(_) => ErrorKind::Io,
        }
    }

    /// Process exit status for this failure. Always 1.
    pub fn exit_code(&self) -> i32 {
        1
    }
}

impl From<tool_locate::ToolLocateError> for PipelineError {
    fn from(e: tool_locate::ToolLocateError) -> Self {
        let tool = match &e {
            tool_locate::ToolLocateError::OverrideMissing { path, .. }
            | tool_locate::ToolLocateError::PathMissing { path } => path.display().to_string(),
            tool_locate::ToolLocateError::NotOnPath { tool, .. } => tool.clone(),
        };
        PipelineError::ToolNotFound {
            tool,
            reason: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_directory_names_expected_type() {
        let e = PipelineError::EmptyDirectory {
            path: "docs/spec".into(),
            expected: ArtifactKind::Html,
        };
        let msg = e.to_string();
        assert!(msg.contains("docs/spec"), "got: {msg}");
        assert!(msg.contains(".html"), "got: {msg}");
        assert_eq!(e.kind(), ErrorKind::Precondition);
    }

    #[test]
    fn tool_failed_display_includes_command_and_stderr() {
        let e = PipelineError::ToolFailed {
            tool: "wkhtmltopdf".into(),
            command: "wkhtmltopdf a.html a.pdf".into(),
            status: "exit status: 1".into(),
            stderr: "Exit with code 1 due to network error".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("wkhtmltopdf a.html a.pdf"));
        assert!(msg.contains("network error"));
        assert_eq!(e.kind(), ErrorKind::ToolInvocation);
    }

    #[test]
    fn broken_anchors_lists_targets() {
        let e = PipelineError::BrokenAnchors {
            path: "spec.html".into(),
            anchors: vec!["intro".into(), "scope".into()],
        };
        let msg = e.to_string();
        assert!(msg.starts_with("2 broken"), "got: {msg}");
        assert!(msg.contains("intro, scope"));
        assert_eq!(e.kind(), ErrorKind::Validation);
    }

    #[test]
    fn locate_error_maps_to_precondition() {
        let e: PipelineError = tool_locate::ToolLocateError::NotOnPath {
            tool: "pandoc".into(),
            var: "DOCPIPE_PANDOC_PATH".into(),
            reason: "cannot find binary path".into(),
        }
        .into();
        assert_eq!(e.kind(), ErrorKind::Precondition);
        assert!(e.to_string().contains("pandoc"));
        assert_eq!(e.exit_code(), 1);
    }
}
