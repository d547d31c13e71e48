//! Configuration types for the publishing pipeline.
//!
//! All stage behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. One struct for every knob keeps the CLI
//! mapping mechanical and lets library callers share a config across stages.

use crate::error::PipelineError;
use crate::output::StageKind;
use crate::progress::ProgressCallback;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Default remote stylesheet used when no local one sits beside the Markdown.
pub const DEFAULT_REMOTE_STYLESHEET: &str =
    "https://docs.oasis-open.org/styles/markdown-styles-v1.7.3.css";

/// Canonical host the HTML is published under.
pub const DEFAULT_PUBLISH_BASE_URL: &str = "https://docs.oasis-open.org";

/// Canonical logo placed at the top of every generated document.
pub const DEFAULT_LOGO_URL: &str = "https://docs.oasis-open.org/templates/OASISLogo-v3.0.png";

/// An external command: program plus leading arguments.
///
/// The prefix lets `npx prettier` or `sh ./fake-pandoc.sh` stand in for a
/// single executable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Short name used in log lines and errors (`pandoc`, not `/usr/bin/pandoc`).
    pub fn display_name(&self) -> String {
        std::path::Path::new(&self.program)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.clone())
    }
}

impl fmt::Display for ToolSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for a in &self.args {
            write!(f, " {a}")?;
        }
        Ok(())
    }
}

/// Page orientation passed to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

impl Orientation {
    pub fn as_arg(self) -> &'static str {
        match self {
            Orientation::Portrait => "Portrait",
            Orientation::Landscape => "Landscape",
        }
    }
}

/// Page margins in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Margins {
    pub top_mm: u32,
    pub right_mm: u32,
    pub bottom_mm: u32,
    pub left_mm: u32,
}

impl Default for Margins {
    fn default() -> Self {
        Self {
            top_mm: 25,
            right_mm: 20,
            bottom_mm: 25,
            left_mm: 20,
        }
    }
}

/// Physical page setup for the PDF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageLayout {
    /// Renderer page-size name. Default: `A4`.
    pub page_size: String,
    pub orientation: Orientation,
    pub margins: Margins,
}

impl Default for PageLayout {
    fn default() -> Self {
        Self {
            page_size: "A4".into(),
            orientation: Orientation::Portrait,
            margins: Margins::default(),
        }
    }
}

/// The branding image kept as the first element of `<body>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Logo {
    pub url: String,
    pub alt: String,
}

impl Default for Logo {
    fn default() -> Self {
        Self {
            url: DEFAULT_LOGO_URL.into(),
            alt: "OASIS Logo".into(),
        }
    }
}

/// Configuration for every pipeline stage.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use docpipe::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .print_fixes(true)
///     .header_text("Common Security Advisory Framework Version 2.1")
///     .localize_images(false)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Markdown formatter, run in place. Default: `prettier --write`.
    pub formatter: ToolSpec,

    /// Extra formatter arguments placed before the file name.
    /// Default: `--print-width 80 --prose-wrap preserve`.
    pub formatter_args: Vec<String>,

    /// Markdown → HTML converter. Default: `pandoc`.
    pub converter: ToolSpec,

    /// HTML → PDF renderer. Default: `wkhtmltopdf`.
    pub renderer: ToolSpec,

    /// Version control CLI used by the metadata restorer. Default: `git`.
    pub git: ToolSpec,

    /// Stylesheet path relative to the Markdown directory; linked when it
    /// exists. Default: `styles/styles.css`.
    pub local_stylesheet: PathBuf,

    /// Stylesheet URL linked when no local stylesheet exists.
    pub remote_stylesheet: String,

    /// Host the HTML is published under; links back into the document's own
    /// published directory are made relative.
    pub publish_base_url: String,

    /// Repository root. With it, the document's published URL is
    /// `<publish_base_url>/<dir relative to root>/<name>.html`.
    pub repo_root: Option<PathBuf>,

    /// Logo enforced at the top of the body. `None` disables the rule.
    pub logo: Option<Logo>,

    /// Rename the first `<h1>` to `<h1big>` (styled by the publishing CSS).
    pub promote_title: bool,

    /// Download remote `<img>` sources into `images/`. Default: true.
    pub localize_images: bool,

    /// Download remote stylesheets into `styles/`. Default: from
    /// `HTML_LOCALIZE_CSS`, otherwise false.
    pub localize_stylesheets: bool,

    /// Per-download timeout in seconds. Default: 10.
    pub download_timeout_secs: u64,

    /// Inject code-scoped print CSS before rendering. Default: true.
    pub print_fixes: bool,

    /// Page setup for the PDF.
    pub page_layout: PageLayout,

    /// Centered page header text.
    pub header_text: Option<String>,

    /// Centered page footer text.
    pub footer_text: Option<String>,

    /// Fail the HTML stage when an internal link has no target. Default: false.
    pub strict_anchors: bool,

    /// Metadata record file, relative to the repository root.
    /// Default: `.git-mtimes`.
    pub record_file: PathBuf,

    /// Optional stage event sink.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            formatter: ToolSpec::new("prettier").arg("--write"),
            formatter_args: vec![
                "--print-width".into(),
                "80".into(),
                "--prose-wrap".into(),
                "preserve".into(),
            ],
            converter: ToolSpec::new("pandoc"),
            renderer: ToolSpec::new("wkhtmltopdf"),
            git: ToolSpec::new("git"),
            local_stylesheet: PathBuf::from("styles").join("styles.css"),
            remote_stylesheet: DEFAULT_REMOTE_STYLESHEET.into(),
            publish_base_url: DEFAULT_PUBLISH_BASE_URL.into(),
            repo_root: None,
            logo: Some(Logo::default()),
            promote_title: true,
            localize_images: true,
            localize_stylesheets: env_flag("HTML_LOCALIZE_CSS"),
            download_timeout_secs: 10,
            print_fixes: true,
            page_layout: PageLayout::default(),
            header_text: None,
            footer_text: None,
            strict_anchors: false,
            record_file: PathBuf::from(".git-mtimes"),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("formatter", &self.formatter)
            .field("converter", &self.converter)
            .field("renderer", &self.renderer)
            .field("git", &self.git)
            .field("remote_stylesheet", &self.remote_stylesheet)
            .field("publish_base_url", &self.publish_base_url)
            .field("logo", &self.logo)
            .field("localize_images", &self.localize_images)
            .field("localize_stylesheets", &self.localize_stylesheets)
            .field("print_fixes", &self.print_fixes)
            .field("page_layout", &self.page_layout)
            .field("strict_anchors", &self.strict_anchors)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn StageProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Forward a phase change to the progress callback, if any.
    pub(crate) fn report_phase(&self, stage: StageKind, phase: &str) {
        if let Some(ref cb) = self.progress_callback {
            cb.on_phase(stage, phase);
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn formatter(mut self, tool: ToolSpec) -> Self {
        self.config.formatter = tool;
        self
    }

    pub fn formatter_args(mut self, args: Vec<String>) -> Self {
        self.config.formatter_args = args;
        self
    }

    pub fn converter(mut self, tool: ToolSpec) -> Self {
        self.config.converter = tool;
        self
    }

    pub fn renderer(mut self, tool: ToolSpec) -> Self {
        self.config.renderer = tool;
        self
    }

    pub fn git(mut self, tool: ToolSpec) -> Self {
        self.config.git = tool;
        self
    }

    pub fn local_stylesheet(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.local_stylesheet = path.into();
        self
    }

    pub fn remote_stylesheet(mut self, url: impl Into<String>) -> Self {
        self.config.remote_stylesheet = url.into();
        self
    }

    pub fn publish_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.publish_base_url = url.into();
        self
    }

    pub fn repo_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.repo_root = Some(root.into());
        self
    }

    pub fn logo(mut self, logo: Option<Logo>) -> Self {
        self.config.logo = logo;
        self
    }

    pub fn promote_title(mut self, v: bool) -> Self {
        self.config.promote_title = v;
        self
    }

    pub fn localize_images(mut self, v: bool) -> Self {
        self.config.localize_images = v;
        self
    }

    pub fn localize_stylesheets(mut self, v: bool) -> Self {
        self.config.localize_stylesheets = v;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn print_fixes(mut self, v: bool) -> Self {
        self.config.print_fixes = v;
        self
    }

    pub fn page_layout(mut self, layout: PageLayout) -> Self {
        self.config.page_layout = layout;
        self
    }

    pub fn header_text(mut self, text: impl Into<String>) -> Self {
        self.config.header_text = Some(text.into());
        self
    }

    pub fn footer_text(mut self, text: impl Into<String>) -> Self {
        self.config.footer_text = Some(text.into());
        self
    }

    pub fn strict_anchors(mut self, v: bool) -> Self {
        self.config.strict_anchors = v;
        self
    }

    pub fn record_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.record_file = path.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        for (role, tool) in [
            ("formatter", &c.formatter),
            ("converter", &c.converter),
            ("renderer", &c.renderer),
            ("git", &c.git),
        ] {
            if tool.program.trim().is_empty() {
                return Err(PipelineError::InvalidConfig(format!(
                    "{role} program must not be empty"
                )));
            }
        }
        if c.remote_stylesheet.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "remote stylesheet URL must not be empty".into(),
            ));
        }
        if url::Url::parse(&c.publish_base_url).is_err() {
            return Err(PipelineError::InvalidConfig(format!(
                "publish base URL '{}' is not an absolute URL",
                c.publish_base_url
            )));
        }
        if c.download_timeout_secs == 0 {
            return Err(PipelineError::InvalidConfig(
                "download timeout must be ≥ 1 second".into(),
            ));
        }
        if c.page_layout.page_size.trim().is_empty() {
            return Err(PipelineError::InvalidConfig("page size must not be empty".into()));
        }
        let m = c.page_layout.margins;
        if [m.top_mm, m.right_mm, m.bottom_mm, m.left_mm]
            .iter()
            .any(|&v| v > 100)
        {
            return Err(PipelineError::InvalidConfig(
                "page margins must be 0–100 mm".into(),
            ));
        }
        if c.record_file.is_absolute() || c.record_file.as_os_str().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "record file must be a path relative to the repository root".into(),
            ));
        }
        Ok(self.config)
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}
