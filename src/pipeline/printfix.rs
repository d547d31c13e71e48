//! Print pre-processing for the PDF renderer.
//!
//! The published stylesheet is written for screens; printed through the
//! renderer, code blocks lose their monospace font and overflow the page.
//! [`apply_print_fixes`] appends a stylesheet that touches code elements
//! only, plus an `@page` rule matching the configured layout, and tags
//! class-less `<pre>`/`<code>` so the rules have something to bind to.
//!
//! [`verify_print_fixes`] is the regression check for that promise. It
//! compares the document before and after and rejects any pass that
//! dropped or reordered a stylesheet link, changed an `id` or a fragment
//! link, or injected a rule whose subject is not a code element.

use crate::config::PageLayout;
use crate::error::PipelineError;
use crate::pipeline::postprocess::{attr, set_attr};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::debug;

/// Code-scoped rules appended to `<head>`.
pub const CODE_PRINT_CSS: &str = r#"
/* docpipe print fixes: code elements only */
code, pre, tt, kbd, samp, .sourceCode, .highlight {
  font-family: "Courier New", "Liberation Mono", "DejaVu Sans Mono", monospace !important;
  font-weight: normal !important;
  font-style: normal !important;
  letter-spacing: 0 !important;
  word-spacing: 0 !important;
  font-feature-settings: normal !important;
}
code {
  font-size: 0.9em !important;
  background-color: #f5f5f5 !important;
  border: 1px solid #ddd !important;
  border-radius: 2px !important;
  padding: 1px 4px !important;
}
pre {
  font-size: 0.85em !important;
  line-height: 1.2 !important;
  background-color: #f8f8f8 !important;
  border: 1px solid #ccc !important;
  border-radius: 4px !important;
  padding: 10px !important;
  white-space: pre-wrap !important;
  overflow-wrap: break-word !important;
  page-break-inside: auto !important;
}
pre code {
  background: none !important;
  border: none !important;
  padding: 0 !important;
  font-size: inherit !important;
  white-space: pre-wrap !important;
}
.sourceCode, .highlight, .json, .xml, .yaml, .bash, .shell, .python, .javascript, .http {
  font-size: 0.85em !important;
  line-height: 1.2 !important;
  background-color: #f8f8f8 !important;
}
table code, td code, th code {
  font-size: 0.8em !important;
}
@media print {
  code, pre, .sourceCode, .highlight {
    -webkit-print-color-adjust: exact !important;
  }
  pre {
    orphans: 2 !important;
    widows: 2 !important;
  }
}
"#;

/// Class given to `<pre>` elements that have none.
pub const PRE_CLASS: &str = "code-block";
/// Class given to inline `<code>` elements that have none.
pub const INLINE_CODE_CLASS: &str = "inline-code";

const CODE_ELEMENTS: &[&str] = &["code", "pre", "tt", "kbd", "samp"];
const CODE_CLASSES: &[&str] = &[
    "sourceCode",
    "highlight",
    PRE_CLASS,
    INLINE_CODE_CLASS,
    "json",
    "xml",
    "yaml",
    "bash",
    "shell",
    "python",
    "javascript",
    "http",
];

static RE_HEAD_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</head\s*>").unwrap());
static RE_HTML_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<html\b[^>]*>").unwrap());
static RE_PRE_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<pre\b[^>]*>").unwrap());
static RE_CODE_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<code\b[^>]*>").unwrap());
static RE_STYLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<style\b[^>]*>(.*?)</style\s*>").unwrap());
static RE_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<link\b[^>]*>").unwrap());
static RE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\sid\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap());
static RE_FRAGMENT_HREF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\shref\s*=\s*(?:"(#[^"]*)"|'(#[^']*)')"#).unwrap());
static RE_CSS_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());

/// The `@page` rule for `layout`.
pub fn page_rule(layout: &PageLayout) -> String {
    let m = layout.margins;
    format!(
        "@page {{\n  size: {} {};\n  margin: {}mm {}mm {}mm {}mm;\n}}\n",
        layout.page_size,
        layout.orientation.as_arg().to_lowercase(),
        m.top_mm,
        m.right_mm,
        m.bottom_mm,
        m.left_mm
    )
}

/// Add the print stylesheet and code classes to `html`.
pub fn apply_print_fixes(html: &str, layout: &PageLayout) -> String {
    let style = format!("<style>{}{}</style>\n", CODE_PRINT_CSS, page_rule(layout));

    // Appended last in <head> so the document's own stylesheets load first.
    let with_style = if let Some(close) = RE_HEAD_CLOSE.find(html) {
        format!("{}{}{}", &html[..close.start()], style, &html[close.start()..])
    } else if let Some(open) = RE_HTML_OPEN.find(html) {
        debug!("No <head>; creating one");
        format!(
            "{}\n<head>\n{}</head>{}",
            &html[..open.end()],
            style,
            &html[open.end()..]
        )
    } else {
        debug!("No <html> or <head>; prepending head");
        format!("<head>\n{}</head>\n{}", style, html)
    };

    let with_pre = RE_PRE_OPEN
        .replace_all(&with_style, |caps: &Captures| tag_without_class(&caps[0], PRE_CLASS))
        .into_owned();

    RE_CODE_OPEN
        .replace_all(&with_pre, |caps: &Captures| {
            let Some(m) = caps.get(0) else {
                return String::new();
            };
            if parent_is_pre(&with_pre[..m.start()]) {
                m.as_str().to_string()
            } else {
                tag_without_class(m.as_str(), INLINE_CODE_CLASS)
            }
        })
        .into_owned()
}

fn tag_without_class(tag: &str, class: &str) -> String {
    match attr(tag, "class") {
        Some(existing) if !existing.trim().is_empty() => tag.to_string(),
        _ => set_attr(tag, "class", class),
    }
}

/// Whether the innermost open tag preceding a position is `<pre>`.
fn parent_is_pre(before: &str) -> bool {
    let Some(lt) = before.rfind('<') else {
        return false;
    };
    let tag = &before[lt..];
    tag.get(..4).is_some_and(|p| p.eq_ignore_ascii_case("<pre"))
        && tag[4..]
            .chars()
            .next()
            .is_some_and(|c| c == '>' || c.is_whitespace())
}

// ── Regression check ─────────────────────────────────────────────────────────

/// Fail unless `fixed` preserves everything of `original` that the print
/// pass must not touch.
pub fn verify_print_fixes(original: &str, fixed: &str) -> Result<(), PipelineError> {
    let before = stylesheet_links(original);
    let after = stylesheet_links(fixed);
    if before != after {
        return Err(PipelineError::PrintFixViolation(format!(
            "stylesheet links changed: {:?} → {:?}",
            before, after
        )));
    }

    if captured(&RE_ID, original) != captured(&RE_ID, fixed) {
        return Err(PipelineError::PrintFixViolation(
            "element ids changed".into(),
        ));
    }
    if captured(&RE_FRAGMENT_HREF, original) != captured(&RE_FRAGMENT_HREF, fixed) {
        return Err(PipelineError::PrintFixViolation(
            "internal fragment links changed".into(),
        ));
    }

    let mut existing = style_blocks(original);
    for block in style_blocks(fixed) {
        if let Some(i) = existing.iter().position(|b| *b == block) {
            existing.remove(i);
            continue;
        }
        check_code_only(&block)?;
    }
    Ok(())
}

fn stylesheet_links(html: &str) -> Vec<String> {
    RE_LINK
        .find_iter(html)
        .filter(|m| {
            attr(m.as_str(), "rel").is_some_and(|rel| {
                rel.split_whitespace()
                    .any(|r| r.eq_ignore_ascii_case("stylesheet"))
            })
        })
        .filter_map(|m| attr(m.as_str(), "href"))
        .collect()
}

fn captured<'h>(re: &Regex, html: &'h str) -> Vec<&'h str> {
    re.captures_iter(html)
        .filter_map(|c| c.get(1).or_else(|| c.get(2)).map(|m| m.as_str()))
        .collect()
}

fn style_blocks(html: &str) -> Vec<String> {
    RE_STYLE
        .captures_iter(html)
        .map(|c| c[1].to_string())
        .collect()
}

/// Top-level `prelude { body }` pairs of a stylesheet.
fn css_rules(css: &str) -> Result<Vec<(String, String)>, PipelineError> {
    let css = RE_CSS_COMMENT.replace_all(css, "").into_owned();
    let mut rules = Vec::new();
    let mut depth = 0usize;
    let mut prelude_start = 0usize;
    let mut body_start = 0usize;
    for (i, c) in css.char_indices() {
        match c {
            '{' => {
                if depth == 0 {
                    body_start = i + 1;
                }
                depth += 1;
            }
            '}' => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    PipelineError::PrintFixViolation("unbalanced '}' in injected CSS".into())
                })?;
                if depth == 0 {
                    let prelude = css[prelude_start..body_start - 1].trim().to_string();
                    rules.push((prelude, css[body_start..i].to_string()));
                    prelude_start = i + 1;
                }
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(PipelineError::PrintFixViolation(
            "unbalanced '{' in injected CSS".into(),
        ));
    }
    Ok(rules)
}

fn check_code_only(css: &str) -> Result<(), PipelineError> {
    for (prelude, body) in css_rules(css)? {
        let lower = prelude.to_ascii_lowercase();
        if lower.starts_with("@page") {
            continue;
        }
        if lower.starts_with("@media") {
            check_code_only(&body)?;
            continue;
        }
        if lower.starts_with('@') {
            return Err(PipelineError::PrintFixViolation(format!(
                "injected at-rule '{prelude}' is not allowed"
            )));
        }
        for selector in prelude.split(',') {
            if !targets_code(selector) {
                return Err(PipelineError::PrintFixViolation(format!(
                    "injected rule targets non-code selector '{}'",
                    selector.trim()
                )));
            }
        }
    }
    Ok(())
}

/// Whether the subject (rightmost compound) of `selector` is a code element.
fn targets_code(selector: &str) -> bool {
    let Some(subject) = selector
        .split(|c: char| c.is_whitespace() || c == '>' || c == '+' || c == '~')
        .filter(|s| !s.is_empty())
        .last()
    else {
        return false;
    };
    // Pseudo-classes and pseudo-elements do not change the subject.
    let compound = subject.split(':').next().unwrap_or_default();
    let mut parts = compound.split('.');
    let element = parts.next().unwrap_or_default();
    let classes: Vec<&str> = parts.filter(|c| !c.is_empty()).collect();

    CODE_ELEMENTS.iter().any(|e| e.eq_ignore_ascii_case(element))
        || classes.iter().any(|c| CODE_CLASSES.contains(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r##"<html>
<head>
<link rel="stylesheet" href="styles/styles.css" />
<style>body { font-family: serif; }</style>
</head>
<body>
<h2 id="example">Example</h2>
<p>Use <code>csaf_version</code>, see <a href="#example">above</a>.</p>
<pre><code>{"a": 1}</code></pre>
<pre class="sourceCode json"><code class="sourceCode json">{}</code></pre>
</body>
</html>"##;

    #[test]
    fn style_appended_at_end_of_head() {
        let fixed = apply_print_fixes(DOC, &PageLayout::default());
        let head_end = fixed.find("</head>").unwrap();
        let style_at = fixed.find("docpipe print fixes").unwrap();
        let link_at = fixed.find("styles/styles.css").unwrap();
        assert!(link_at < style_at && style_at < head_end);
        assert!(fixed.contains("size: A4 portrait;"));
        assert!(fixed.contains("margin: 25mm 20mm 25mm 20mm;"));
    }

    #[test]
    fn classes_added_only_where_missing() {
        let fixed = apply_print_fixes(DOC, &PageLayout::default());
        assert!(fixed.contains(r#"<code class="inline-code">csaf_version</code>"#));
        assert!(fixed.contains(r#"<pre class="code-block"><code>{"a": 1}</code></pre>"#));
        assert!(fixed.contains(r#"<pre class="sourceCode json"><code class="sourceCode json">"#));
    }

    #[test]
    fn head_created_when_missing() {
        let fixed = apply_print_fixes("<html><body><p>x</p></body></html>", &PageLayout::default());
        assert!(fixed.starts_with("<html>\n<head>\n<style>"));

        let bare = apply_print_fixes("<p>x</p>", &PageLayout::default());
        assert!(bare.starts_with("<head>\n<style>"));
    }

    #[test]
    fn own_output_passes_regression_check() {
        let fixed = apply_print_fixes(DOC, &PageLayout::default());
        verify_print_fixes(DOC, &fixed).unwrap();
    }

    #[test]
    fn dropped_stylesheet_is_rejected() {
        let fixed = apply_print_fixes(DOC, &PageLayout::default())
            .replace(r#"<link rel="stylesheet" href="styles/styles.css" />"#, "");
        let err = verify_print_fixes(DOC, &fixed).unwrap_err();
        assert!(err.to_string().contains("stylesheet"));
    }

    #[test]
    fn changed_id_is_rejected() {
        let fixed = apply_print_fixes(DOC, &PageLayout::default())
            .replace(r#"id="example""#, r#"id="example-1""#);
        assert!(verify_print_fixes(DOC, &fixed).is_err());
    }

    #[test]
    fn body_typography_rule_is_rejected() {
        let fixed = DOC.replace(
            "</head>",
            "<style>pre { color: red; } p, body { font-size: 9pt; }</style></head>",
        );
        let err = verify_print_fixes(DOC, &fixed).unwrap_err();
        assert!(err.to_string().contains("non-code selector"), "{err}");
    }

    #[test]
    fn selector_subjects() {
        assert!(targets_code("table code"));
        assert!(targets_code("pre > code:first-child"));
        assert!(targets_code(".sourceCode"));
        assert!(targets_code("div.highlight"));
        assert!(!targets_code("code p"));
        assert!(!targets_code("h1"));
        assert!(!targets_code("*"));
        assert!(!targets_code(".title"));
    }
}
