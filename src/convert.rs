//! Stage entry points and sequential orchestration.
//!
//! Every public function here is one stage as the CLI exposes it: take a
//! [`PipelineRequest`], discover the input in its directory, run the stage
//! module, stamp the output with the requested date and report a
//! [`StageOutput`]. [`run_pipeline`] chains format → html → pdf and stops at
//! the first failure; the ordering contract between stages is the only
//! coordination there is.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::metadata::{self, MetadataReport};
use crate::output::{PipelineOutput, StageArtifact, StageKind, StageOutput};
use crate::pipeline::discover::{discover_artifact, ArtifactKind};
use crate::pipeline::package::{self, ArchiveName};
use crate::pipeline::{html, markdown, render};
use crate::request::{stamp_mtime, ModificationDate, PipelineRequest};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

/// Shared stage wrapper: discovery, callbacks, timing, date stamping.
///
/// `input_kind` is the artifact discovered in the target directory; `None`
/// hands the directory itself to `body`.
async fn run_stage<F, Fut>(
    stage: StageKind,
    request: &PipelineRequest,
    config: &PipelineConfig,
    input_kind: Option<ArtifactKind>,
    body: F,
) -> Result<StageOutput, PipelineError>
where
    F: FnOnce(PathBuf) -> Fut,
    Fut: Future<Output = Result<StageArtifact, PipelineError>>,
{
    let start = Instant::now();
    let dir = request.dir();
    info!("Stage {}: {}", stage, dir.display());
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage_start(stage, dir);
    }

    let result = async {
        let input = match input_kind {
            Some(kind) => discover_artifact(dir, kind, request.input_file.as_deref())?,
            None => dir.to_path_buf(),
        };
        let artifact = body(input.clone()).await?;
        // The packager stamps its own output together with the entries.
        if stage != StageKind::Package {
            if let Some(date) = request.modification_date {
                stamp_mtime(&artifact.path, date)?;
            }
        }
        Ok::<_, PipelineError>((input, artifact))
    }
    .await;

    match result {
        Ok((input, artifact)) => {
            if let Some(ref cb) = config.progress_callback {
                cb.on_stage_complete(stage, &artifact.path);
            }
            let duration_ms = start.elapsed().as_millis() as u64;
            info!(
                "Stage {} complete in {}ms: {}",
                stage,
                duration_ms,
                artifact.path.display()
            );
            Ok(StageOutput {
                stage,
                input,
                artifact: artifact.path,
                bytes: artifact.bytes,
                duration_ms,
                warnings: artifact.warnings,
            })
        }
        Err(e) => {
            if let Some(ref cb) = config.progress_callback {
                cb.on_stage_error(stage, &e.to_string());
            }
            Err(e)
        }
    }
}

async fn blocking<T, F>(what: &str, f: F) -> Result<T, PipelineError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, PipelineError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PipelineError::Internal(format!("{what} task panicked: {e}")))?
}

/// Format the Markdown source in place.
pub async fn format_markdown(
    request: &PipelineRequest,
    config: &PipelineConfig,
) -> Result<StageOutput, PipelineError> {
    run_stage(
        StageKind::Format,
        request,
        config,
        Some(ArtifactKind::Markdown),
        |md| async move {
            let bytes = markdown::format_in_place(&md, config).await?;
            Ok(StageArtifact::new(md, bytes))
        },
    )
    .await
}

/// Convert the Markdown source into `<stem>.html`.
pub async fn generate_html(
    request: &PipelineRequest,
    config: &PipelineConfig,
) -> Result<StageOutput, PipelineError> {
    run_stage(
        StageKind::Html,
        request,
        config,
        Some(ArtifactKind::Markdown),
        |md| async move { html::generate_html(&md, config).await },
    )
    .await
}

/// Render the HTML document into `<stem>.pdf`.
pub async fn render_pdf(
    request: &PipelineRequest,
    config: &PipelineConfig,
) -> Result<StageOutput, PipelineError> {
    run_stage(
        StageKind::Pdf,
        request,
        config,
        Some(ArtifactKind::Html),
        |html| async move { render::render_pdf(&html, config).await },
    )
    .await
}

/// Archive the target directory as `name`.
///
/// Without a modification date in the request, today's date is used.
pub async fn package_directory(
    request: &PipelineRequest,
    name: &ArchiveName,
    config: &PipelineConfig,
) -> Result<StageOutput, PipelineError> {
    let date = request
        .modification_date
        .unwrap_or_else(ModificationDate::today);
    let name = name.clone();
    run_stage(
        StageKind::Package,
        request,
        config,
        None,
        |dir| async move {
            blocking("packaging", move || {
                package::package_directory(&dir, &name, date)
            })
            .await
        },
    )
    .await
}

/// Write the metadata record for the repository at `root`.
pub async fn save_metadata(
    root: &Path,
    config: &PipelineConfig,
) -> Result<MetadataReport, PipelineError> {
    let root = root.to_path_buf();
    let config = config.clone();
    blocking("metadata save", move || metadata::save(&root, &config)).await
}

/// Re-apply the metadata record for the repository at `root`.
pub async fn restore_metadata(
    root: &Path,
    config: &PipelineConfig,
) -> Result<MetadataReport, PipelineError> {
    let root = root.to_path_buf();
    let config = config.clone();
    blocking("metadata restore", move || metadata::restore(&root, &config)).await
}

/// Run format → html → pdf on one directory.
///
/// Each stage consumes exactly the artifact the previous one produced, so
/// a second `.html` in the directory cannot be picked up by mistake.
pub async fn run_pipeline(
    request: &PipelineRequest,
    config: &PipelineConfig,
) -> Result<PipelineOutput, PipelineError> {
    let start = Instant::now();
    let mut stages = Vec::with_capacity(3);

    let formatted = format_markdown(request, config).await?;
    let html_request = chained(request, &formatted.artifact);
    stages.push(formatted);

    let html = generate_html(&html_request, config).await?;
    let pdf_request = chained(request, &html.artifact);
    stages.push(html);

    stages.push(render_pdf(&pdf_request, config).await?);

    let output = PipelineOutput {
        stages,
        total_duration_ms: start.elapsed().as_millis() as u64,
    };
    if output.warning_count() > 0 {
        warn!("Pipeline finished with {} warning(s)", output.warning_count());
    }
    info!(
        "Pipeline complete in {}ms: {}",
        output.total_duration_ms,
        output
            .final_artifact()
            .map(|p| p.display().to_string())
            .unwrap_or_default()
    );
    Ok(output)
}

/// The request for the next stage: same directory and date, with the
/// previous artifact as explicit input.
fn chained(request: &PipelineRequest, artifact: &Path) -> PipelineRequest {
    let mut next = request.clone();
    next.input_file = artifact
        .file_name()
        .map(|n| n.to_string_lossy().into_owned());
    next
}

/// Blocking wrapper around [`run_pipeline`].
pub fn run_pipeline_sync(
    request: &PipelineRequest,
    config: &PipelineConfig,
) -> Result<PipelineOutput, PipelineError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| PipelineError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(run_pipeline(request, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::StageProgressCallback;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl StageProgressCallback for Recorder {
        fn on_stage_start(&self, stage: StageKind, _dir: &Path) {
            self.0.lock().unwrap().push(format!("start {stage}"));
        }
        fn on_stage_error(&self, stage: StageKind, _error: &str) {
            self.0.lock().unwrap().push(format!("error {stage}"));
        }
    }

    #[test]
    fn chained_request_names_previous_artifact() {
        let req = PipelineRequest::new("docs/spec").with_input_file("spec.md");
        let next = chained(&req, Path::new("docs/spec/spec.html"));
        assert_eq!(next.input_file.as_deref(), Some("spec.html"));
        assert_eq!(next.target_directory, PathBuf::from("docs/spec"));
    }

    #[tokio::test]
    async fn empty_directory_reports_error_to_callback() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Arc::new(Recorder::default());
        let config = PipelineConfig::builder()
            .progress_callback(recorder.clone())
            .build()
            .unwrap();
        let request = PipelineRequest::new(dir.path());

        let err = render_pdf(&request, &config).await.unwrap_err();
        assert!(matches!(err, PipelineError::EmptyDirectory { .. }));
        assert_eq!(*recorder.0.lock().unwrap(), ["start pdf", "error pdf"]);
    }

    #[tokio::test]
    async fn package_stage_reports_archive() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        let request = PipelineRequest::new(dir.path())
            .with_date(ModificationDate::parse("2024-05-01").unwrap());
        let name = ArchiveName::new("csaf", "v2.1", "os").unwrap();
        let config = PipelineConfig::default();

        let out = package_directory(&request, &name, &config).await.unwrap();
        assert_eq!(out.stage, StageKind::Package);
        assert_eq!(out.input, dir.path());
        assert_eq!(out.artifact, dir.path().join("csaf-v2.1-os.zip"));
    }
}
