//! CLI binary for docpipe.
//!
//! A thin shim over the library crate: one subcommand per stage, flags
//! mapped onto `PipelineConfig`, results printed as a summary line or as
//! JSON.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use docpipe::{
    cleanup, ArchiveName, ModificationDate, Orientation, PageLayout, PipelineConfig, PipelineRequest,
    ProgressCallback, StageKind, StageOutput, StageProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// A spinner showing the running stage and its current phase; one log line
/// per finished stage.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        Arc::new(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl StageProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: StageKind, dir: &Path) {
        self.bar.set_prefix(stage.to_string());
        self.bar.set_message(dir.display().to_string());
        self.bar.enable_steady_tick(Duration::from_millis(80));
    }

    fn on_phase(&self, _stage: StageKind, phase: &str) {
        self.bar.set_message(phase.to_string());
    }

    fn on_stage_complete(&self, stage: StageKind, artifact: &Path) {
        self.bar.println(format!(
            "  {} {:<8} {}",
            green("✓"),
            stage.to_string(),
            artifact.display()
        ));
    }

    fn on_stage_error(&self, stage: StageKind, error: &str) {
        let first_line = error.lines().next().unwrap_or_default();
        self.bar.println(format!("  {} {:<8} {}", red("✗"), stage.to_string(), red(first_line)));
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Full pipeline: format, HTML, PDF
  docpipe run csaf_2.1/prose/edit --date 2024-11-01

  # Single stages
  docpipe format csaf_2.1/prose/edit
  docpipe html csaf_2.1/prose/edit --repo-root .
  docpipe pdf csaf_2.1/prose/edit --header "Common Security Advisory Framework Version 2.1"

  # Archive a directory as csaf-v2.1-csd01.zip
  docpipe package csaf_2.1/prose/share --project csaf --doc-version v2.1 --stage csd01

  # Git hooks: keep modification times across checkouts
  docpipe metadata save .
  docpipe metadata restore .

ENVIRONMENT VARIABLES:
  DOCPIPE_PANDOC_PATH       Path to pandoc (skips PATH lookup)
  DOCPIPE_WKHTMLTOPDF_PATH  Path to wkhtmltopdf
  DOCPIPE_PRETTIER_PATH     Path to prettier
  DOCPIPE_GIT_PATH          Path to git
  HTML_LOCALIZE_CSS         1/true/yes: copy the remote stylesheet next to the HTML
  RUST_LOG                  Log filter (overrides -v / -q)

EXIT STATUS:
  0 on success, 1 on any failure, 130 when interrupted.
"#;

/// Publish Markdown specifications as HTML, PDF and zip archives.
#[derive(Parser, Debug)]
#[command(
    name = "docpipe",
    version,
    about = "Publish Markdown specifications as HTML, PDF and zip archives",
    long_about = "Each stage takes a directory, finds its input there by extension, and writes \
one artifact next to it. Stages fail with status 1 and a message naming the missing file or \
the failing command; no partial artifacts are left behind.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Print the stage report as JSON on stdout.
    #[arg(long, global = true, env = "DOCPIPE_JSON")]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, global = true, env = "DOCPIPE_NO_PROGRESS")]
    no_progress: bool,

    /// Debug logging.
    #[arg(short, long, global = true, env = "DOCPIPE_VERBOSE")]
    verbose: bool,

    /// Errors only.
    #[arg(short, long, global = true, env = "DOCPIPE_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Format the Markdown source in place.
    Format {
        #[command(flatten)]
        target: TargetArgs,
        /// Extra arguments for the formatter (replaces the defaults).
        #[arg(long = "formatter-arg", allow_hyphen_values = true)]
        formatter_args: Vec<String>,
    },
    /// Convert the Markdown source to HTML.
    Html {
        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        html: HtmlArgs,
    },
    /// Render the HTML document to PDF.
    Pdf {
        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        pdf: PdfArgs,
    },
    /// Format, convert and render in one go.
    Run {
        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        html: HtmlArgs,
        #[command(flatten)]
        pdf: PdfArgs,
    },
    /// Archive a directory as <project>-<version>-<stage>.zip.
    Package {
        #[command(flatten)]
        target: TargetArgs,
        /// Project part of the archive name.
        #[arg(long, env = "DOCPIPE_PROJECT")]
        project: String,
        /// Version part of the archive name.
        #[arg(long = "doc-version", env = "DOCPIPE_DOC_VERSION")]
        doc_version: String,
        /// Stage part of the archive name (e.g. csd01, os).
        #[arg(long, env = "DOCPIPE_STAGE")]
        stage: String,
    },
    /// Save or restore file modification times around git checkouts.
    Metadata {
        #[command(subcommand)]
        action: MetadataAction,
    },
}

#[derive(Subcommand, Debug)]
enum MetadataAction {
    /// Record the mtime of every tracked file.
    Save(MetadataArgs),
    /// Re-apply recorded mtimes and rewrite the record.
    Restore(MetadataArgs),
}

#[derive(Args, Debug)]
struct MetadataArgs {
    /// Repository root.
    #[arg(default_value = ".")]
    root: PathBuf,
    /// Record file, relative to the root.
    #[arg(long, env = "DOCPIPE_RECORD_FILE", default_value = ".git-mtimes")]
    record_file: PathBuf,
}

#[derive(Args, Debug)]
struct TargetArgs {
    /// Directory holding the stage input.
    dir: PathBuf,
    /// Stamp produced artifacts with this date (yyyy-mm-dd).
    #[arg(long, env = "DOCPIPE_DATE")]
    date: Option<String>,
    /// Use this file in DIR instead of discovering one by extension.
    #[arg(long)]
    file: Option<String>,
}

#[derive(Args, Debug)]
struct HtmlArgs {
    /// Repository root, used to compute the document's published URL.
    #[arg(long, env = "DOCPIPE_REPO_ROOT")]
    repo_root: Option<PathBuf>,
    /// Base URL the repository is published under.
    #[arg(long, env = "DOCPIPE_PUBLISH_BASE_URL")]
    publish_base_url: Option<String>,
    /// Stylesheet used when no local one exists.
    #[arg(long, env = "DOCPIPE_STYLESHEET")]
    stylesheet: Option<String>,
    /// Do not insert the canonical logo.
    #[arg(long)]
    no_logo: bool,
    /// Keep remote images as remote references.
    #[arg(long)]
    no_localize_images: bool,
    /// Copy remote stylesheets next to the HTML.
    #[arg(long)]
    localize_css: bool,
    /// Fail on internal links without a matching id.
    #[arg(long, env = "DOCPIPE_STRICT_ANCHORS")]
    strict_anchors: bool,
    /// Download timeout for images and stylesheets.
    #[arg(long, env = "DOCPIPE_DOWNLOAD_TIMEOUT", default_value_t = 10)]
    download_timeout: u64,
}

#[derive(Args, Debug)]
struct PdfArgs {
    /// Text centred in the page header.
    #[arg(long, env = "DOCPIPE_HEADER")]
    header: Option<String>,
    /// Text centred in the page footer.
    #[arg(long, env = "DOCPIPE_FOOTER")]
    footer: Option<String>,
    /// Page size name understood by the renderer.
    #[arg(long, env = "DOCPIPE_PAGE_SIZE", default_value = "A4")]
    page_size: String,
    /// Landscape instead of portrait.
    #[arg(long)]
    landscape: bool,
    /// Render the HTML as is, without print CSS fixes.
    #[arg(long)]
    no_print_fixes: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    cleanup::install_signal_handler().context("Failed to install interrupt handler")?;

    let progress = if show_progress {
        Some(CliProgressCallback::new())
    } else {
        None
    };
    let callback = progress
        .clone()
        .map(|cb| cb as Arc<dyn StageProgressCallback>);

    let result = dispatch(&cli, callback).await;
    if let Some(ref cb) = progress {
        cb.finish();
    }
    result
}

async fn dispatch(cli: &Cli, progress: Option<ProgressCallback>) -> Result<()> {
    match &cli.command {
        Command::Format {
            target,
            formatter_args,
        } => {
            let mut builder = base_builder(progress);
            if !formatter_args.is_empty() {
                builder = builder.formatter_args(formatter_args.clone());
            }
            let config = builder.build().context("Invalid configuration")?;
            let out = docpipe::format_markdown(&request(target)?, &config)
                .await
                .context("Formatting failed")?;
            report_stage(cli, &out)
        }
        Command::Html { target, html } => {
            let config = apply_html(base_builder(progress), html)
                .build()
                .context("Invalid configuration")?;
            let out = docpipe::generate_html(&request(target)?, &config)
                .await
                .context("HTML generation failed")?;
            report_stage(cli, &out)
        }
        Command::Pdf { target, pdf } => {
            let config = apply_pdf(base_builder(progress), pdf)
                .build()
                .context("Invalid configuration")?;
            let out = docpipe::render_pdf(&request(target)?, &config)
                .await
                .context("PDF rendering failed")?;
            report_stage(cli, &out)
        }
        Command::Run { target, html, pdf } => {
            let config = apply_pdf(apply_html(base_builder(progress), html), pdf)
                .build()
                .context("Invalid configuration")?;
            let out = docpipe::run_pipeline(&request(target)?, &config)
                .await
                .context("Pipeline failed")?;
            if cli.json {
                print_json(&out)?;
            } else if !cli.quiet {
                eprintln!(
                    "{}  {} stage(s)  {}ms  →  {}",
                    green("✔"),
                    out.stages.len(),
                    out.total_duration_ms,
                    bold(
                        &out.final_artifact()
                            .map(|p| p.display().to_string())
                            .unwrap_or_default()
                    ),
                );
                print_warnings(out.stages.iter().flat_map(|s| s.warnings.iter()));
            }
            Ok(())
        }
        Command::Package {
            target,
            project,
            doc_version,
            stage,
        } => {
            let name = ArchiveName::new(project, doc_version, stage)
                .context("Invalid archive name")?;
            let config = base_builder(progress)
                .build()
                .context("Invalid configuration")?;
            let out = docpipe::package_directory(&request(target)?, &name, &config)
                .await
                .context("Packaging failed")?;
            report_stage(cli, &out)
        }
        Command::Metadata { action } => {
            let (args, restore) = match action {
                MetadataAction::Save(args) => (args, false),
                MetadataAction::Restore(args) => (args, true),
            };
            let config = PipelineConfig::builder()
                .record_file(args.record_file.clone())
                .build()
                .context("Invalid configuration")?;
            let report = if restore {
                docpipe::restore_metadata(&args.root, &config)
                    .await
                    .context("Restoring modification times failed")?
            } else {
                docpipe::save_metadata(&args.root, &config)
                    .await
                    .context("Saving modification times failed")?
            };
            if cli.json {
                print_json(&report)?;
            } else if !cli.quiet {
                if report.no_record {
                    eprintln!("{}", dim("no record file; nothing to restore"));
                } else {
                    eprintln!(
                        "{}  {} entr{}  →  {}",
                        green("✔"),
                        report.entries,
                        if report.entries == 1 { "y" } else { "ies" },
                        report.record.display()
                    );
                    print_warnings(report.skipped.iter());
                }
            }
            Ok(())
        }
    }
}

fn base_builder(progress: Option<ProgressCallback>) -> docpipe::PipelineConfigBuilder {
    let builder = PipelineConfig::builder();
    match progress {
        Some(cb) => builder.progress_callback(cb),
        None => builder,
    }
}

fn apply_html(
    mut builder: docpipe::PipelineConfigBuilder,
    args: &HtmlArgs,
) -> docpipe::PipelineConfigBuilder {
    if let Some(ref root) = args.repo_root {
        builder = builder.repo_root(root);
    }
    if let Some(ref url) = args.publish_base_url {
        builder = builder.publish_base_url(url);
    }
    if let Some(ref css) = args.stylesheet {
        builder = builder.remote_stylesheet(css);
    }
    if args.no_logo {
        builder = builder.logo(None);
    }
    if args.localize_css {
        builder = builder.localize_stylesheets(true);
    }
    builder
        .localize_images(!args.no_localize_images)
        .strict_anchors(args.strict_anchors)
        .download_timeout_secs(args.download_timeout)
}

fn apply_pdf(
    mut builder: docpipe::PipelineConfigBuilder,
    args: &PdfArgs,
) -> docpipe::PipelineConfigBuilder {
    if let Some(ref header) = args.header {
        builder = builder.header_text(header);
    }
    if let Some(ref footer) = args.footer {
        builder = builder.footer_text(footer);
    }
    let orientation = if args.landscape {
        Orientation::Landscape
    } else {
        Orientation::Portrait
    };
    builder
        .page_layout(PageLayout {
            page_size: args.page_size.clone(),
            orientation,
            ..PageLayout::default()
        })
        .print_fixes(!args.no_print_fixes)
}

fn request(target: &TargetArgs) -> Result<PipelineRequest> {
    let mut request = PipelineRequest::new(&target.dir);
    if let Some(ref date) = target.date {
        request = request.with_date(ModificationDate::parse(date)?);
    }
    if let Some(ref file) = target.file {
        request = request.with_input_file(file);
    }
    Ok(request)
}

fn report_stage(cli: &Cli, out: &StageOutput) -> Result<()> {
    if cli.json {
        return print_json(out);
    }
    if !cli.quiet {
        eprintln!(
            "{}  {}  {}ms  →  {}",
            green("✔"),
            out.stage,
            out.duration_ms,
            bold(&out.artifact.display().to_string()),
        );
        print_warnings(out.warnings.iter());
    }
    Ok(())
}

fn print_warnings<'a>(warnings: impl Iterator<Item = &'a String>) {
    for w in warnings {
        eprintln!("   {} {}", dim("warning:"), w);
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialise report")?;
    println!("{json}");
    Ok(())
}
