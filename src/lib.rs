//! # docpipe
//!
//! Publish Markdown specification documents as styled HTML, print-ready PDF
//! and distributable zip archives.
//!
//! Every stage is a thin wrapper around an external tool (prettier, pandoc,
//! wkhtmltopdf) plus the text rewriting around it. What this crate adds is
//! the stage contract: a stage takes a directory, finds its input there by
//! extension, writes exactly one artifact next to it, and either succeeds
//! completely or fails with an error naming the missing file or the failing
//! command. No partial artifacts are ever left behind.
//!
//! ## Pipeline Overview
//!
//! ```text
//! <dir>/spec.md
//!  │
//!  ├─ 1. Format   prettier --write, in place
//!  ├─ 2. HTML     pandoc + post-processing rules → spec.html
//!  ├─ 3. PDF      print CSS + wkhtmltopdf        → spec.pdf
//!  └─ 4. Package  <dir>/** → <project>-<version>-<stage>.zip
//! ```
//!
//! Alongside the pipeline, [`metadata`] saves and restores file
//! modification times around git checkouts.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docpipe::{run_pipeline, ModificationDate, PipelineConfig, PipelineRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder()
//!         .header_text("Common Security Advisory Framework Version 2.1")
//!         .build()?;
//!     let request = PipelineRequest::new("csaf_2.1/prose/edit")
//!         .with_date(ModificationDate::parse("2024-11-01")?);
//!     let output = run_pipeline(&request, &config).await?;
//!     println!("{}", output.final_artifact().unwrap().display());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docpipe` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! docpipe = { version = "0.1", default-features = false }
//! ```
//!
//! ## External Tools
//!
//! | Stage | Tool | Override |
//! |-------|------|----------|
//! | Format | `prettier` | `DOCPIPE_PRETTIER_PATH` |
//! | HTML | `pandoc` | `DOCPIPE_PANDOC_PATH` |
//! | PDF | `wkhtmltopdf` | `DOCPIPE_WKHTMLTOPDF_PATH` |
//! | Metadata | `git` | `DOCPIPE_GIT_PATH` |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cleanup;
pub mod config;
pub mod convert;
pub mod error;
pub mod metadata;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod request;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    Logo, Margins, Orientation, PageLayout, PipelineConfig, PipelineConfigBuilder, ToolSpec,
};
pub use convert::{
    format_markdown, generate_html, package_directory, render_pdf, restore_metadata,
    run_pipeline, run_pipeline_sync, save_metadata,
};
pub use error::{ErrorKind, PipelineError};
pub use metadata::{FileMetadataRecord, GitIndex, MetadataReport};
pub use output::{PipelineOutput, StageArtifact, StageKind, StageOutput};
pub use pipeline::discover::ArtifactKind;
pub use pipeline::package::ArchiveName;
pub use progress::{NoopProgressCallback, ProgressCallback, StageProgressCallback};
pub use request::{ModificationDate, PipelineRequest};
