//! HtmlGenerator stage: Markdown → styled, link-checked HTML.
//!
//! The converter does the heavy lifting; this module prepares its input,
//! runs it into a hidden temp file, then applies the [`postprocess`] rules,
//! pulls remote assets next to the document and checks internal anchors
//! before atomically publishing `<stem>.html`.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::output::{StageArtifact, StageKind};
use crate::pipeline::discover::{sibling_with_kind, ArtifactKind};
use crate::pipeline::postprocess::{self, attr, remove_attr, set_attr, HtmlContext};
use crate::pipeline::{exec, markdown, parent_dir, temp_file_in, write_atomic};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Component, Path};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Pandoc input format: bare URLs become links, newlines are kept.
pub const MARKDOWN_FORMAT: &str = "markdown+autolink_bare_uris+hard_line_breaks";

/// Directory (next to the HTML) localised images are stored in.
pub const IMAGES_DIR: &str = "images";
/// Directory (next to the HTML) localised stylesheets are stored in.
pub const STYLES_DIR: &str = "styles";

static RE_IMG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<img\b[^>]*>").unwrap());
static RE_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<link\b[^>]*>").unwrap());

/// Convert the Markdown file `md` into its sibling `.html`.
pub async fn generate_html(
    md: &Path,
    config: &PipelineConfig,
) -> Result<StageArtifact, PipelineError> {
    let dir = parent_dir(md);
    let md_name = file_name(md)?;
    let output = sibling_with_kind(md, ArtifactKind::Html);
    let output_name = file_name(&output)?;

    // ── Step 1: Prepare the Markdown ─────────────────────────────────────
    config.report_phase(StageKind::Html, "preparing");
    let mut source = std::fs::read_to_string(md).map_err(|e| PipelineError::io(md, e))?;
    if let Some(fixed) = markdown::ensure_toc_title(&source) {
        info!("Inserted 'Table of Contents' heading into {}", md.display());
        write_atomic(md, fixed.as_bytes())?;
        source = fixed;
    }
    let title = markdown::extract_title(&source);
    let description = markdown::extract_description(&source);
    let stylesheet = stylesheet_ref(dir, config);
    debug!("Title '{}', stylesheet '{}'", title, stylesheet);

    // ── Step 2: Convert ──────────────────────────────────────────────────
    config.report_phase(StageKind::Html, "converting");
    let (tmp, _guard) = temp_file_in(dir, ".html")?;
    let tmp_name = file_name(tmp.path())?;
    let args: Vec<OsString> = vec![
        md_name.into(),
        "-f".into(),
        MARKDOWN_FORMAT.into(),
        "-c".into(),
        stylesheet.into(),
        "-s".into(),
        "-o".into(),
        tmp_name.into(),
        "--metadata".into(),
        format!("title={title}").into(),
        "--toc".into(),
    ];
    exec::run_tool(&config.converter, &args, Some(dir)).await?;
    exec::expect_output(&config.converter, tmp.path())?;
    let converted =
        std::fs::read_to_string(tmp.path()).map_err(|e| PipelineError::io(tmp.path(), e))?;

    // ── Step 3: Post-process ─────────────────────────────────────────────
    config.report_phase(StageKind::Html, "post-processing");
    let ctx = HtmlContext {
        description: &description,
        output_name: &output_name,
        logo: config.logo.as_ref(),
        promote_title: config.promote_title,
    };
    let mut html = postprocess::postprocess_html(&converted, &ctx);
    let mut warnings = Vec::new();

    if config.localize_stylesheets || config.localize_images {
        config.report_phase(StageKind::Html, "localising assets");
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.download_timeout_secs))
            .build()
            .map_err(|e| PipelineError::Internal(format!("HTTP client: {e}")))?;
        if config.localize_stylesheets {
            html = localize_stylesheets(&html, dir, &client, &mut warnings).await;
        }
        if config.localize_images {
            html = localize_images(&html, dir, &client, &mut warnings).await;
        }
    }

    if let Some(doc_url) = document_url(config, dir, &output_name)? {
        debug!("Published URL: {}", doc_url);
        html = postprocess::relativize_same_scope(&html, &doc_url);
    }

    // ── Step 4: Check anchors and publish ────────────────────────────────
    let broken = postprocess::broken_anchors(&html);
    if !broken.is_empty() {
        if config.strict_anchors {
            return Err(PipelineError::BrokenAnchors {
                path: output,
                anchors: broken,
            });
        }
        for anchor in &broken {
            warn!("Broken internal anchor '#{}' in {}", anchor, output_name);
            warnings.push(format!("broken anchor #{anchor}"));
        }
    }

    let bytes = write_atomic(&output, html.as_bytes())?;
    info!("Generated {} ({} bytes)", output.display(), bytes);
    Ok(StageArtifact {
        path: output,
        bytes,
        warnings,
    })
}

fn file_name(path: &Path) -> Result<String, PipelineError> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| PipelineError::Internal(format!("'{}' has no file name", path.display())))
}

/// The stylesheet reference handed to the converter.
pub fn stylesheet_ref(dir: &Path, config: &PipelineConfig) -> String {
    if dir.join(&config.local_stylesheet).is_file() {
        to_url_path(&config.local_stylesheet)
    } else {
        config.remote_stylesheet.clone()
    }
}

fn to_url_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Where the document will be published, when the repository root is known.
///
/// `<publish_base_url>/<dir relative to repo root>/<output_name>`.
pub fn document_url(
    config: &PipelineConfig,
    dir: &Path,
    output_name: &str,
) -> Result<Option<Url>, PipelineError> {
    let Some(ref root) = config.repo_root else {
        return Ok(None);
    };
    let base = config.publish_base_url.trim_end_matches('/');

    let canonical = |p: &Path| p.canonicalize().map_err(|e| PipelineError::io(p, e));
    let (dir_abs, root_abs) = (canonical(dir)?, canonical(root.as_path())?);
    let Ok(relative) = dir_abs.strip_prefix(&root_abs) else {
        warn!(
            "{} is outside the repository root {}; links stay absolute",
            dir.display(),
            root.display()
        );
        return Ok(None);
    };

    let relative = to_url_path(relative);
    let raw = if relative.is_empty() {
        format!("{base}/{output_name}")
    } else {
        format!("{base}/{relative}/{output_name}")
    };
    Url::parse(&raw)
        .map(Some)
        .map_err(|e| PipelineError::InvalidConfig(format!("publish URL '{raw}': {e}")))
}

// ── Asset localisation ───────────────────────────────────────────────────────

fn is_remote(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Last path segment of `url`, or `fallback`.
fn remote_file_name(url: &str, fallback: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut s| s.next_back().map(str::to_string))
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

async fn download(client: &reqwest::Client, url: &str, dest: &Path) -> Result<(), String> {
    let response = client.get(url).send().await.map_err(|e| e.to_string())?;
    if !response.status().is_success() {
        return Err(format!("HTTP {}", response.status()));
    }
    let bytes = response.bytes().await.map_err(|e| e.to_string())?;
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }
    write_atomic(dest, &bytes).map_err(|e| e.to_string())?;
    Ok(())
}

/// Fetch `url` into `<dir>/<subdir>/<name>` unless already present.
///
/// Returns the relative reference to use, or `None` when the download failed.
async fn localize(
    client: &reqwest::Client,
    url: &str,
    dir: &Path,
    subdir: &str,
    fallback_name: &str,
    warnings: &mut Vec<String>,
) -> Option<String> {
    let name = remote_file_name(url, fallback_name);
    let local = dir.join(subdir).join(&name);
    if !local.exists() {
        info!("Downloading {} → {}", url, local.display());
        if let Err(e) = download(client, url, &local).await {
            warn!("Failed to download {}: {}", url, e);
            warnings.push(format!("download failed: {url}: {e}"));
            return None;
        }
    }
    Some(format!("{subdir}/{name}"))
}

fn is_stylesheet(link: &str) -> bool {
    attr(link, "rel")
        .and_then(|r| r.split_whitespace().next().map(str::to_ascii_lowercase))
        .is_some_and(|r| r == "stylesheet")
}

/// Download remote stylesheets into `styles/`; failed ones stay remote.
async fn localize_stylesheets(
    html: &str,
    dir: &Path,
    client: &reqwest::Client,
    warnings: &mut Vec<String>,
) -> String {
    let remote: Vec<String> = RE_LINK
        .find_iter(html)
        .filter(|m| is_stylesheet(m.as_str()))
        .filter_map(|m| attr(m.as_str(), "href"))
        .map(|h| h.trim().to_string())
        .filter(|h| is_remote(h))
        .collect();

    let mut local: HashMap<String, String> = HashMap::new();
    for href in remote {
        if local.contains_key(&href) {
            continue;
        }
        if let Some(rel) = localize(client, &href, dir, STYLES_DIR, "style.css", warnings).await {
            local.insert(href, rel);
        }
    }

    RE_LINK
        .replace_all(html, |caps: &Captures| {
            let tag = &caps[0];
            match attr(tag, "href").and_then(|h| local.get(h.trim())) {
                Some(rel) if is_stylesheet(tag) => set_attr(tag, "href", rel),
                _ => tag.to_string(),
            }
        })
        .into_owned()
}

/// Download remote images into `images/`; images that cannot be fetched are
/// removed from the document.
async fn localize_images(
    html: &str,
    dir: &Path,
    client: &reqwest::Client,
    warnings: &mut Vec<String>,
) -> String {
    let remote: Vec<String> = RE_IMG
        .find_iter(html)
        .filter_map(|m| attr(m.as_str(), "src"))
        .map(|s| s.trim().to_string())
        .filter(|s| is_remote(s))
        .collect();

    let mut resolved: HashMap<String, Option<String>> = HashMap::new();
    for src in remote {
        if resolved.contains_key(&src) {
            continue;
        }
        let rel = localize(client, &src, dir, IMAGES_DIR, "image", warnings).await;
        resolved.insert(src, rel);
    }

    RE_IMG
        .replace_all(html, |caps: &Captures| {
            let tag = &caps[0];
            let Some(src) = attr(tag, "src") else {
                return tag.to_string();
            };
            match resolved.get(src.trim()) {
                Some(Some(rel)) => remove_attr(&set_attr(tag, "src", rel), "srcset"),
                Some(None) => String::new(),
                None => tag.to_string(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_stylesheet_preferred_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::default();
        assert_eq!(
            stylesheet_ref(dir.path(), &config),
            crate::config::DEFAULT_REMOTE_STYLESHEET
        );

        std::fs::create_dir(dir.path().join("styles")).unwrap();
        std::fs::write(dir.path().join("styles/styles.css"), "body{}").unwrap();
        assert_eq!(stylesheet_ref(dir.path(), &config), "styles/styles.css");
    }

    #[test]
    fn document_url_follows_repo_layout() {
        let root = tempfile::tempdir().unwrap();
        let doc_dir = root.path().join("csaf_2.1").join("prose");
        std::fs::create_dir_all(&doc_dir).unwrap();
        let config = PipelineConfig::builder()
            .repo_root(root.path())
            .build()
            .unwrap();

        let url = document_url(&config, &doc_dir, "csaf.html").unwrap().unwrap();
        assert_eq!(
            url.as_str(),
            "https://docs.oasis-open.org/csaf_2.1/prose/csaf.html"
        );

        let at_root = document_url(&config, root.path(), "x.html").unwrap().unwrap();
        assert_eq!(at_root.as_str(), "https://docs.oasis-open.org/x.html");
    }

    #[test]
    fn document_url_needs_repo_root() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::default();
        assert!(document_url(&config, dir.path(), "x.html").unwrap().is_none());
    }

    #[test]
    fn remote_names() {
        assert_eq!(
            remote_file_name("https://x.org/img/logo.png?v=2", "image"),
            "logo.png"
        );
        assert_eq!(remote_file_name("https://x.org/", "image"), "image");
    }

    #[tokio::test]
    async fn unreachable_image_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap();
        let html = r#"<p><img src="http://127.0.0.1:9/missing.png" alt="x" /> <img src="local.png" /></p>"#;
        let mut warnings = Vec::new();
        let out = localize_images(html, dir.path(), &client, &mut warnings).await;
        assert_eq!(out, r#"<p> <img src="local.png" /></p>"#);
        assert_eq!(warnings.len(), 1);
    }

    #[tokio::test]
    async fn already_local_copy_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("images")).unwrap();
        std::fs::write(dir.path().join("images/fig.png"), "png").unwrap();
        let client = reqwest::Client::new();
        let html = r#"<img src="https://example.invalid/a/fig.png" srcset="fig@2x.png 2x" />"#;
        let mut warnings = Vec::new();
        let out = localize_images(html, dir.path(), &client, &mut warnings).await;
        assert_eq!(out, r#"<img src="images/fig.png" />"#);
        assert!(warnings.is_empty());
    }
}
