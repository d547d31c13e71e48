//! Stage reports.
//!
//! Every stage returns a [`StageOutput`]; [`crate::run_pipeline`] collects
//! them into a [`PipelineOutput`]. Both serialise to JSON for `--json`.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// The four pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Format,
    Html,
    Pdf,
    Package,
}

impl StageKind {
    pub fn name(self) -> &'static str {
        match self {
            StageKind::Format => "format",
            StageKind::Html => "html",
            StageKind::Pdf => "pdf",
            StageKind::Package => "package",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The file a stage produced, as reported by the stage module itself.
#[derive(Debug, Clone, Serialize)]
pub struct StageArtifact {
    pub path: PathBuf,
    pub bytes: u64,
    pub warnings: Vec<String>,
}

impl StageArtifact {
    pub fn new(path: impl Into<PathBuf>, bytes: u64) -> Self {
        Self {
            path: path.into(),
            bytes,
            warnings: Vec::new(),
        }
    }
}

/// Result of one successful stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageOutput {
    pub stage: StageKind,
    /// The discovered (or explicitly named) input file.
    pub input: PathBuf,
    /// The file the stage produced. Equal to `input` for in-place formatting.
    pub artifact: PathBuf,
    /// Size of `artifact` in bytes.
    pub bytes: u64,
    /// Wall-clock time of the stage.
    pub duration_ms: u64,
    /// Non-fatal findings: broken anchors, failed downloads, skipped files.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Result of [`crate::run_pipeline`].
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    pub stages: Vec<StageOutput>,
    pub total_duration_ms: u64,
}

impl PipelineOutput {
    /// The last artifact produced (the PDF for a full run).
    pub fn final_artifact(&self) -> Option<&PathBuf> {
        self.stages.last().map(|s| &s.artifact)
    }

    pub fn warning_count(&self) -> usize {
        self.stages.iter().map(|s| s.warnings.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialises_stage_names_lowercase() {
        let out = StageOutput {
            stage: StageKind::Pdf,
            input: "d/spec.html".into(),
            artifact: "d/spec.pdf".into(),
            bytes: 10,
            duration_ms: 3,
            warnings: vec![],
        };
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["stage"], "pdf");
        assert!(json.get("warnings").is_none());
    }

    #[test]
    fn final_artifact_is_last_stage() {
        let mk = |stage, artifact: &str| StageOutput {
            stage,
            input: "x".into(),
            artifact: artifact.into(),
            bytes: 0,
            duration_ms: 0,
            warnings: vec!["w".into()],
        };
        let out = PipelineOutput {
            stages: vec![mk(StageKind::Html, "a.html"), mk(StageKind::Pdf, "a.pdf")],
            total_duration_ms: 0,
        };
        assert_eq!(out.final_artifact().unwrap(), &PathBuf::from("a.pdf"));
        assert_eq!(out.warning_count(), 2);
    }
}
