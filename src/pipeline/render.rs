//! PdfRenderer stage: HTML → PDF via an external renderer.
//!
//! The stage walks a fixed sequence of phases:
//!
//! ```text
//! Idle → Discovering → [Preprocessing] → Rendering → Success
//!            │               │               │
//!            └── fail ───────┴──── fail ─────┘
//! ```
//!
//! There is no recovery transition: a renderer failure is surfaced, never
//! retried. The renderer writes into a hidden temp file in the target
//! directory which is only renamed onto `<stem>.pdf` after the output has
//! been checked, so a failed run never leaves a truncated PDF behind.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::output::{StageArtifact, StageKind};
use crate::pipeline::discover::{sibling_with_kind, ArtifactKind};
use crate::pipeline::printfix;
use crate::pipeline::{exec, parent_dir, persist, temp_file_in};
use std::ffi::OsString;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// First bytes of every PDF file.
pub const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// Where a render run currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPhase {
    Idle,
    Discovering,
    Preprocessing,
    Rendering,
    Success,
    Failed,
}

impl RenderPhase {
    pub fn name(self) -> &'static str {
        match self {
            RenderPhase::Idle => "idle",
            RenderPhase::Discovering => "discovering",
            RenderPhase::Preprocessing => "preprocessing",
            RenderPhase::Rendering => "rendering",
            RenderPhase::Success => "success",
            RenderPhase::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RenderPhase::Success | RenderPhase::Failed)
    }

    /// Whether `self → next` is a legal step.
    pub fn can_advance_to(self, next: RenderPhase) -> bool {
        use RenderPhase::*;
        matches!(
            (self, next),
            (Idle, Discovering)
                | (Discovering, Preprocessing)
                | (Discovering, Rendering)
                | (Preprocessing, Rendering)
                | (Rendering, Success)
                | (Discovering | Preprocessing | Rendering, Failed)
        )
    }
}

impl fmt::Display for RenderPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Tracks the phase of one render run and reports each step.
struct RenderRun<'a> {
    phase: RenderPhase,
    config: &'a PipelineConfig,
}

impl<'a> RenderRun<'a> {
    fn new(config: &'a PipelineConfig) -> Self {
        Self {
            phase: RenderPhase::Idle,
            config,
        }
    }

    fn advance(&mut self, next: RenderPhase) -> Result<(), PipelineError> {
        if !self.phase.can_advance_to(next) {
            return Err(PipelineError::Internal(format!(
                "illegal render transition {} → {}",
                self.phase, next
            )));
        }
        debug!("Render phase: {} → {}", self.phase, next);
        self.phase = next;
        self.config.report_phase(StageKind::Pdf, next.name());
        Ok(())
    }

    fn fail(&mut self, err: PipelineError) -> PipelineError {
        error!("PDF rendering failed while {}: {}", self.phase, err);
        self.phase = RenderPhase::Failed;
        err
    }
}

/// Render `html_path` to its sibling `.pdf`.
pub async fn render_pdf(
    html_path: &Path,
    config: &PipelineConfig,
) -> Result<StageArtifact, PipelineError> {
    let mut run = RenderRun::new(config);
    match render_inner(&mut run, html_path).await {
        Ok(artifact) => Ok(artifact),
        Err(e) => Err(run.fail(e)),
    }
}

async fn render_inner(
    run: &mut RenderRun<'_>,
    html_path: &Path,
) -> Result<StageArtifact, PipelineError> {
    let config = run.config;

    // ── Step 1: Check the input ──────────────────────────────────────────
    run.advance(RenderPhase::Discovering)?;
    if !html_path.is_file() {
        return Err(PipelineError::ArtifactNotFound {
            kind: ArtifactKind::Html,
            dir: parent_dir(html_path).to_path_buf(),
        });
    }
    let output = sibling_with_kind(html_path, ArtifactKind::Pdf);
    let work_dir = parent_dir(html_path);

    // ── Step 2: Pre-process (optional) ───────────────────────────────────
    // The fixed copy lives next to the original so relative assets resolve.
    let mut fixed_copy = None;
    if config.print_fixes {
        run.advance(RenderPhase::Preprocessing)?;
        let original = std::fs::read_to_string(html_path)
            .map_err(|e| PipelineError::io(html_path, e))?;
        let fixed = printfix::apply_print_fixes(&original, &config.page_layout);
        printfix::verify_print_fixes(&original, &fixed)?;

        let (tmp, guard) = temp_file_in(work_dir, ".html")?;
        std::fs::write(tmp.path(), fixed.as_bytes())
            .map_err(|e| PipelineError::io(tmp.path(), e))?;
        debug!("Print-fixed HTML at {}", tmp.path().display());
        fixed_copy = Some((tmp, guard));
    }
    let render_input: PathBuf = match fixed_copy {
        Some((ref tmp, _)) => tmp.path().to_path_buf(),
        None => html_path.to_path_buf(),
    };

    // ── Step 3: Render ───────────────────────────────────────────────────
    run.advance(RenderPhase::Rendering)?;
    let (pdf_tmp, _pdf_guard) = temp_file_in(work_dir, ".pdf")?;
    let footer_name = file_name(html_path);
    let args = renderer_args(
        config,
        &footer_name,
        &file_name(&render_input),
        &file_name(pdf_tmp.path()),
    );
    exec::run_tool(&config.renderer, &args, Some(work_dir)).await?;
    let bytes = check_pdf(&config.renderer, pdf_tmp.path())?;
    persist(pdf_tmp, &output)?;
    drop(fixed_copy);

    run.advance(RenderPhase::Success)?;
    info!("Rendered {} ({} bytes)", output.display(), bytes);
    Ok(StageArtifact::new(output, bytes))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Full renderer argument list (after the tool's own prefix arguments).
///
/// `footer_name` is the published HTML name shown bottom-left; `input` and
/// `output` are paths relative to the working directory.
pub fn renderer_args(
    config: &PipelineConfig,
    footer_name: &str,
    input: &str,
    output: &str,
) -> Vec<OsString> {
    let layout = &config.page_layout;
    let m = layout.margins;
    let mut args: Vec<String> = vec![
        "--page-size".into(),
        layout.page_size.clone(),
        "--orientation".into(),
        layout.orientation.as_arg().into(),
        "--margin-top".into(),
        format!("{}mm", m.top_mm),
        "--margin-right".into(),
        format!("{}mm", m.right_mm),
        "--margin-bottom".into(),
        format!("{}mm", m.bottom_mm),
        "--margin-left".into(),
        format!("{}mm", m.left_mm),
    ];
    if let Some(ref header) = config.header_text {
        args.extend([
            "--header-spacing".into(),
            "6".into(),
            "--header-font-size".into(),
            "10".into(),
            "--header-center".into(),
            header.clone(),
        ]);
    }
    args.extend([
        "--footer-line".into(),
        "--footer-spacing".into(),
        "4".into(),
        "--footer-left".into(),
        footer_name.to_string(),
    ]);
    if let Some(ref footer) = config.footer_text {
        args.extend(["--footer-center".into(), footer.clone()]);
    }
    args.extend([
        "--footer-right".into(),
        "[date] - Page [page] of [topage]".into(),
        "--footer-font-size".into(),
        "8".into(),
        "--footer-font-name".into(),
        "Times".into(),
        "--no-outline".into(),
        "--print-media-type".into(),
        "--enable-local-file-access".into(),
        "--load-error-handling".into(),
        "ignore".into(),
        "--load-media-error-handling".into(),
        "ignore".into(),
        input.to_string(),
        output.to_string(),
    ]);
    args.into_iter().map(OsString::from).collect()
}

/// Size of the rendered file, after checking it is non-empty and a PDF.
fn check_pdf(tool: &crate::config::ToolSpec, path: &Path) -> Result<u64, PipelineError> {
    let bytes = exec::expect_output(tool, path)?;
    let mut magic = [0u8; 4];
    std::fs::File::open(path)
        .and_then(|mut f| f.read_exact(&mut magic))
        .map_err(|e| PipelineError::io(path, e))?;
    if &magic != PDF_MAGIC {
        return Err(PipelineError::MissingOutput {
            tool: tool.display_name(),
            path: path.to_path_buf(),
        });
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolSpec;

    #[test]
    fn legal_transitions() {
        use RenderPhase::*;
        assert!(Idle.can_advance_to(Discovering));
        assert!(Discovering.can_advance_to(Rendering));
        assert!(Discovering.can_advance_to(Preprocessing));
        assert!(Rendering.can_advance_to(Success));
        assert!(Rendering.can_advance_to(Failed));
        assert!(!Idle.can_advance_to(Rendering));
        assert!(!Success.can_advance_to(Rendering));
        assert!(!Failed.can_advance_to(Discovering));
        assert!(Success.is_terminal() && Failed.is_terminal());
    }

    #[test]
    fn renderer_args_match_layout() {
        let config = PipelineConfig::builder()
            .header_text("Common Security Advisory Framework Version 2.1")
            .build()
            .unwrap();
        let args: Vec<String> = renderer_args(&config, "csaf.html", ".in.html", ".out.pdf")
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        let pos = |flag: &str| args.iter().position(|a| a == flag).unwrap();
        assert_eq!(args[pos("--page-size") + 1], "A4");
        assert_eq!(args[pos("--orientation") + 1], "Portrait");
        assert_eq!(args[pos("--margin-top") + 1], "25mm");
        assert_eq!(args[pos("--margin-left") + 1], "20mm");
        assert_eq!(args[pos("--footer-left") + 1], "csaf.html");
        assert!(args.contains(&"--enable-local-file-access".to_string()));
        assert!(!args.contains(&"--footer-center".to_string()));
        assert_eq!(&args[args.len() - 2..], [".in.html", ".out.pdf"]);
    }

    #[tokio::test]
    async fn missing_input_fails_before_rendering() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::builder()
            .renderer(ToolSpec::new("docpipe-renderer-never-called"))
            .build()
            .unwrap();
        let err = render_pdf(&dir.path().join("a.html"), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ArtifactNotFound { .. }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn non_pdf_output_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.html"), "<html><body></body></html>").unwrap();
        // Writes plain text to the last argument.
        let renderer = ToolSpec::new("/bin/sh")
            .arg("-c")
            .arg(r#"for last; do :; done; echo 'not a pdf' > "$last""#)
            .arg("fake-renderer");
        let config = PipelineConfig::builder().renderer(renderer).build().unwrap();

        let err = render_pdf(&dir.path().join("a.html"), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::MissingOutput { .. }), "{err}");
        assert!(!dir.path().join("a.pdf").exists());
        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.html".to_string()]);
    }
}
