//! MarkdownFormatter stage and Markdown source helpers.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::pipeline::{exec, parent_dir};
use once_cell::sync::Lazy;
use regex::Regex;
use std::ffi::OsString;
use std::path::Path;
use tracing::{debug, info, warn};

/// Placeholder the converter receives when no title or description exists.
pub const MISSING: &str = "-";

static TOC_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^- \[.*\]\(.*\)").unwrap());

static TOC_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?mi)^\s*#+\s*Table of Contents\s*$").unwrap());

/// Format `file` in place with the configured formatter.
///
/// Returns the formatted file size. A formatter that exits zero but leaves
/// the file missing or empty is treated as a failure.
pub async fn format_in_place(file: &Path, config: &PipelineConfig) -> Result<u64, PipelineError> {
    let mut args: Vec<OsString> = config.formatter_args.iter().map(OsString::from).collect();
    // Relative to the working directory below.
    args.push(file.file_name().unwrap_or(file.as_os_str()).to_owned());

    exec::run_tool(&config.formatter, &args, Some(parent_dir(file))).await?;
    let bytes = exec::expect_output(&config.formatter, file)?;
    info!("Formatted {} ({} bytes)", file.display(), bytes);
    Ok(bytes)
}

/// Text of the first `# ` heading, or [`MISSING`].
pub fn extract_title(markdown: &str) -> String {
    for line in markdown.lines() {
        if let Some(rest) = line.strip_prefix("# ") {
            let title = rest.trim().trim_matches('#').trim();
            if !title.is_empty() {
                return title.to_string();
            }
        }
    }
    warn!("No level-1 heading found; using '{MISSING}' as title");
    MISSING.to_string()
}

/// Meta description from a `<!-- description: … -->` comment or a
/// `description:` front-matter line, or [`MISSING`].
pub fn extract_description(markdown: &str) -> String {
    for line in markdown.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("<!--") {
            let lower = trimmed.to_ascii_lowercase();
            if let (Some(start), Some(end)) = (lower.find("description:"), trimmed.find("-->")) {
                let start = start + "description:".len();
                if end > start {
                    return trimmed[start..end].trim().to_string();
                }
            }
        } else if let Some(rest) = trimmed.strip_prefix("description:") {
            return rest.trim().trim_matches(|c| c == '"' || c == '\'').to_string();
        }
    }
    debug!("No meta description found");
    MISSING.to_string()
}

/// Insert a `# Table of Contents` heading before the first TOC list item
/// when the document has a TOC but no such heading.
///
/// Returns `None` when nothing needs to change.
pub fn ensure_toc_title(markdown: &str) -> Option<String> {
    if TOC_TITLE.is_match(markdown) {
        return None;
    }
    let lines: Vec<&str> = markdown.split('\n').collect();
    let first = lines.iter().position(|l| TOC_ITEM.is_match(l))?;

    let mut out: Vec<&str> = Vec::with_capacity(lines.len() + 2);
    out.extend_from_slice(&lines[..first]);
    out.push("");
    out.push("# Table of Contents");
    out.extend_from_slice(&lines[first..]);
    Some(out.join("\n"))
}
