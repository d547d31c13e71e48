//! Post-processing: deterministic rewrites of converter-generated HTML.
//!
//! The converter emits a standalone document that is almost, but not quite,
//! what gets published: it carries its own title block and TOC `<nav>`,
//! headings contain anchors that repeat the heading id, cross references
//! point at `spec.html#x` instead of `#x`, and the branding logo may appear
//! zero or several times.
//!
//! Each rule below is a pure `&str → String` pass working on tag-level
//! regexes. None of them needs a full DOM: the converter's output is regular
//! enough that every construct touched here is either a single tag or a
//! non-nesting element (`header`, `nav`, `figure`, `p`, headings).
//!
//! ## Rule Order
//!
//! The logo must be enforced before the banner fix (which anchors on it),
//! and duplicate heading anchors must be gone before the anchor check runs.

use crate::config::Logo;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::{debug, warn};
use url::Url;

/// Document facts the rules need.
#[derive(Debug, Clone, Copy)]
pub struct HtmlContext<'a> {
    /// Meta description (already extracted from the Markdown).
    pub description: &'a str,
    /// File name of the HTML being produced (`spec.html`).
    pub output_name: &'a str,
    /// Canonical logo, or `None` to leave logos alone.
    pub logo: Option<&'a Logo>,
    /// Rename the first `<h1>` to `<h1big>`.
    pub promote_title: bool,
}

/// Apply the structural rules to freshly converted HTML.
///
/// Rules (applied in order):
/// 1. Drop the converter's title `<header>`
/// 2. Insert `<meta name="description">` at the top of `<head>`
/// 3. Drop `<base>` (it breaks fragment-only links)
/// 4. Drop `<figure>`s wrapping the logo
/// 5. Drop the first `<nav>` (converter TOC)
/// 6. Enforce a single canonical logo paragraph at the top of `<body>`
/// 7. Fix the top banner (stray `<hr>` removed, styled `<hr>` after logo)
/// 8. Promote the first heading `<h1>` to `<h1big>`
/// 9. Remove anchors inside headings that repeat the heading id
/// 10. Rewrite same-document links to fragment-only links
/// 11. Linkify bare URLs in tag-free paragraphs
pub fn postprocess_html(input: &str, ctx: &HtmlContext<'_>) -> String {
    let s = drop_title_header(input);
    let s = insert_meta_description(&s, ctx.description);
    let s = drop_base(&s);
    let s = match ctx.logo {
        Some(logo) => {
            let s = drop_logo_figures(&s, logo);
            let s = drop_first_nav(&s);
            let (s, logo_p) = enforce_single_logo(&s, logo);
            fix_top_banner(&s, &logo_p)
        }
        None => drop_first_nav(&s),
    };
    let s = if ctx.promote_title {
        promote_first_heading(&s)
    } else {
        s
    };
    let s = remove_duplicate_heading_anchors(&s);
    let s = normalize_same_doc_anchors(&s, ctx.output_name);
    linkify_bare_urls(&s)
}

// ── Attribute helpers ────────────────────────────────────────────────────────

static RE_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\s+([^\s"'<>/=]+)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+))"#).unwrap()
});

/// Value of attribute `name` in the opening tag `tag`.
pub fn attr(tag: &str, name: &str) -> Option<String> {
    RE_ATTR.captures_iter(tag).find_map(|c| {
        if c[1].eq_ignore_ascii_case(name) {
            c.get(2)
                .or_else(|| c.get(3))
                .or_else(|| c.get(4))
                .map(|m| m.as_str().to_string())
        } else {
            None
        }
    })
}

/// `tag` with attribute `name` set to `value` (replaced or appended).
pub fn set_attr(tag: &str, name: &str, value: &str) -> String {
    let rendered = format!(" {}=\"{}\"", name, escape_attr(value));
    if let Some(m) = RE_ATTR
        .captures_iter(tag)
        .find(|c| c[1].eq_ignore_ascii_case(name))
        .and_then(|c| c.get(0))
    {
        return format!("{}{}{}", &tag[..m.start()], rendered, &tag[m.end()..]);
    }
    let end = if tag.ends_with("/>") {
        tag.len() - 2
    } else {
        tag.len().saturating_sub(1)
    };
    let head = tag[..end].trim_end();
    format!("{}{}{}", head, rendered, &tag[end..])
}

/// `tag` without attribute `name`.
pub fn remove_attr(tag: &str, name: &str) -> String {
    match RE_ATTR
        .captures_iter(tag)
        .find(|c| c[1].eq_ignore_ascii_case(name))
        .and_then(|c| c.get(0))
    {
        Some(m) => format!("{}{}", &tag[..m.start()], &tag[m.end()..]),
        None => tag.to_string(),
    }
}

/// Escape `&`, `"`, `<` and `>` for use inside a double-quoted attribute.
pub fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

static RE_BODY_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<body\b[^>]*>").unwrap());
static RE_HEAD_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<head\b[^>]*>").unwrap());
static RE_IMG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<img\b[^>]*>").unwrap());
static RE_A_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<a\b[^>]*>").unwrap());

/// Byte offset right after `<body …>`, or 0 for fragments.
fn body_start(html: &str) -> usize {
    RE_BODY_OPEN.find(html).map(|m| m.end()).unwrap_or(0)
}

// ── Rule 1: Drop title header ────────────────────────────────────────────────

static RE_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<header\b[^>]*>.*?</header>\s*").unwrap());

fn drop_title_header(input: &str) -> String {
    RE_HEADER.replace(input, "").into_owned()
}

// ── Rule 2: Meta description ─────────────────────────────────────────────────

fn insert_meta_description(input: &str, description: &str) -> String {
    let Some(m) = RE_HEAD_OPEN.find(input) else {
        return input.to_string();
    };
    format!(
        "{}\n<meta name=\"description\" content=\"{}\" />{}",
        &input[..m.end()],
        escape_attr(description),
        &input[m.end()..]
    )
}

// ── Rule 3: Drop <base> ──────────────────────────────────────────────────────

static RE_BASE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<base\b[^>]*>\s*").unwrap());

fn drop_base(input: &str) -> String {
    RE_BASE.replace_all(input, "").into_owned()
}

// ── Rule 4: Drop logo figures ────────────────────────────────────────────────

static RE_FIGURE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<figure\b[^>]*>.*?</figure>\s*").unwrap());

/// Whether `src` points at the logo image (any copy of it, local or remote).
fn looks_like_logo(src: &str, logo: &Logo) -> bool {
    if src.is_empty() {
        return false;
    }
    let name = basename(&logo.url);
    src == logo.url || (!name.is_empty() && basename(src) == name)
}

fn is_logo_img(img_tag: &str, logo: &Logo) -> bool {
    let src = attr(img_tag, "src").unwrap_or_default();
    let alt = attr(img_tag, "alt").unwrap_or_default();
    looks_like_logo(src.trim(), logo) || alt.trim() == logo.alt
}

fn drop_logo_figures(input: &str, logo: &Logo) -> String {
    RE_FIGURE
        .replace_all(input, |caps: &Captures| {
            let fig = &caps[0];
            let has_logo = RE_IMG.find_iter(fig).any(|img| {
                looks_like_logo(attr(img.as_str(), "src").unwrap_or_default().trim(), logo)
            });
            if has_logo {
                String::new()
            } else {
                fig.to_string()
            }
        })
        .into_owned()
}

// ── Rule 5: Drop the first <nav> ─────────────────────────────────────────────

static RE_NAV: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<nav\b[^>]*>.*?</nav>\s*").unwrap());

fn drop_first_nav(input: &str) -> String {
    RE_NAV.replace(input, "").into_owned()
}

// ── Rule 6: Enforce a single canonical logo ──────────────────────────────────

static RE_IMG_PARAGRAPH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<p\b[^>]*>\s*((?:<img\b[^>]*>\s*)+)</p>\s*").unwrap());

/// Remove every logo image (and paragraphs holding only logo images), then
/// put one canonical logo paragraph first in `<body>`.
///
/// Returns the rewritten document and the exact paragraph inserted.
fn enforce_single_logo(input: &str, logo: &Logo) -> (String, String) {
    // An existing image with the right alt text keeps its (possibly local) src.
    let mut kept_src: Option<String> = None;
    let mut note = |img: &str| {
        let src = attr(img, "src").unwrap_or_default();
        let alt = attr(img, "alt").unwrap_or_default();
        if kept_src.is_none() && looks_like_logo(src.trim(), logo) && alt.trim() == logo.alt {
            kept_src = Some(src.trim().to_string());
        }
    };

    let without_paragraphs = RE_IMG_PARAGRAPH.replace_all(input, |caps: &Captures| {
        let imgs: Vec<&str> = RE_IMG.find_iter(&caps[1]).map(|m| m.as_str()).collect();
        if imgs.iter().all(|img| is_logo_img(img, logo)) {
            imgs.iter().for_each(|img| note(img));
            String::new()
        } else {
            caps[0].to_string()
        }
    });
    let without_logos = RE_IMG.replace_all(&without_paragraphs, |caps: &Captures| {
        let img = &caps[0];
        if is_logo_img(img, logo) {
            note(img);
            String::new()
        } else {
            img.to_string()
        }
    });

    let src = kept_src.unwrap_or_else(|| logo.url.clone());
    let logo_p = format!(
        "<p><img src=\"{}\" alt=\"{}\" /></p>",
        escape_attr(&src),
        escape_attr(&logo.alt)
    );
    let at = body_start(&without_logos);
    let out = format!(
        "{}\n{}\n{}",
        &without_logos[..at],
        logo_p,
        without_logos[at..].trim_start_matches(['\n', '\r'])
    );
    (out, logo_p)
}

// ── Rule 7: Fix the top banner ───────────────────────────────────────────────

static RE_HEADING_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<(h1big|h[1-6])\b[^>]*>").unwrap());
static RE_HR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<hr\b[^>]*>\s*").unwrap());
static RE_ANY_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[a-zA-Z]").unwrap());

/// The styled rule separating the logo from the content.
pub const BANNER_HR: &str = "<hr style=\"page-break-before: avoid\" />";

fn fix_top_banner(input: &str, logo_p: &str) -> String {
    let Some(logo_at) = input.find(logo_p) else {
        warn!("Canonical logo paragraph not found; skipping banner fix");
        return input.to_string();
    };
    let after_logo = logo_at + logo_p.len();
    let Some(heading) = RE_HEADING_OPEN.find_at(input, after_logo) else {
        warn!("No heading after the logo; skipping banner fix");
        return input.to_string();
    };

    let between = &input[after_logo..heading.start()];
    let cleaned = RE_HR.replace_all(between, "");
    if cleaned.len() != between.len() {
        debug!("Removed stray <hr> between logo and title");
    }
    // Only separate the logo from intervening content, never from the title.
    let separator = if RE_ANY_TAG.is_match(&cleaned) {
        format!("\n{BANNER_HR}")
    } else {
        String::new()
    };

    format!(
        "{}{}{}{}",
        &input[..after_logo],
        separator,
        cleaned,
        &input[heading.start()..]
    )
}

// ── Rule 8: Promote the first heading ────────────────────────────────────────

static RE_H1_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</h1\s*>").unwrap());

fn promote_first_heading(input: &str) -> String {
    let Some(caps) = RE_HEADING_OPEN.captures_at(input, body_start(input)) else {
        return input.to_string();
    };
    let (Some(open), Some(name)) = (caps.get(0), caps.get(1)) else {
        return input.to_string();
    };
    if !name.as_str().eq_ignore_ascii_case("h1") {
        return input.to_string();
    }
    let Some(close) = RE_H1_CLOSE.find_at(input, open.end()) else {
        return input.to_string();
    };
    debug!("Promoting first <h1> to <h1big>");
    format!(
        "{}h1big{}</h1big>{}",
        &input[..name.start()],
        &input[name.end()..close.start()],
        &input[close.end()..]
    )
}

// ── Rule 9: Duplicate heading anchors ────────────────────────────────────────

static RE_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)(<(?:h1big|h[1-6])\b[^>]*>)(.*?)(</(?:h1big|h[1-6])\s*>)").unwrap()
});
static RE_ANCHOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)(<a\b[^>]*>)(.*?)</a\s*>").unwrap());

fn remove_duplicate_heading_anchors(input: &str) -> String {
    RE_HEADING
        .replace_all(input, |caps: &Captures| {
            let open = &caps[1];
            let Some(id) = attr(open, "id") else {
                return caps[0].to_string();
            };
            let inner = RE_ANCHOR.replace_all(&caps[2], |a: &Captures| {
                if attr(&a[1], "id").as_deref() != Some(id.as_str()) {
                    return a[0].to_string();
                }
                debug!("Removing duplicate anchor id='{}' inside heading", id);
                if a[2].contains('<') {
                    String::new()
                } else {
                    a[2].to_string()
                }
            });
            format!("{}{}{}", open, inner, &caps[3])
        })
        .into_owned()
}

// ── Rule 10: Same-document anchors ───────────────────────────────────────────

/// Fragment of a relative `href` that points back into the document named
/// `output_name` (`spec.html#x`, `./spec.html#x`).
///
/// Absolute URLs are left to [`relativize_same_scope`], which knows where
/// the document is published.
fn same_document_fragment(href: &str, output_name: &str) -> Option<String> {
    if Url::parse(href).is_ok() || href.starts_with('/') {
        return None;
    }
    let (before, fragment) = href.split_once('#')?;
    if fragment.is_empty() {
        return None;
    }
    let path = before.split('?').next().unwrap_or_default();
    let path = path.strip_prefix("./").unwrap_or(path);
    (path.is_empty() || path == output_name).then(|| fragment.to_string())
}

fn normalize_same_doc_anchors(input: &str, output_name: &str) -> String {
    RE_A_OPEN
        .replace_all(input, |caps: &Captures| {
            let tag = &caps[0];
            let Some(href) = attr(tag, "href") else {
                return tag.to_string();
            };
            let href = href.trim();
            if href.starts_with('#') {
                return remove_attr(tag, "target");
            }
            match same_document_fragment(href, output_name) {
                Some(fragment) => {
                    debug!("Normalising same-document anchor '{}' → '#{}'", href, fragment);
                    remove_attr(&set_attr(tag, "href", &format!("#{fragment}")), "target")
                }
                None => tag.to_string(),
            }
        })
        .into_owned()
}

// ── Rule 11: Linkify bare URLs ───────────────────────────────────────────────

static RE_PARAGRAPH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)(<p\b[^>]*>)(.*?)(</p\s*>)").unwrap());
static RE_BARE_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://[^\s<]+").unwrap());

fn linkify_bare_urls(input: &str) -> String {
    RE_PARAGRAPH
        .replace_all(input, |caps: &Captures| {
            let text = &caps[2];
            if text.contains('<') || !text.contains("http") {
                return caps[0].to_string();
            }
            let linked = RE_BARE_URL.replace_all(text, |u: &Captures| {
                format!("<a href=\"{0}\">{0}</a>", &u[0])
            });
            format!("{}{}{}", &caps[1], linked, &caps[3])
        })
        .into_owned()
}

// ── Relativise same-scope links ──────────────────────────────────────────────

static RE_LINK_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<link\b[^>]*>").unwrap());
static RE_SCRIPT_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<script\b[^>]*>").unwrap());

/// Directory part of the document's published URL (`/a/b/` for `/a/b/x.html`).
fn scope_dir(doc_url: &Url) -> String {
    let path = doc_url.path();
    match path.rfind('/') {
        Some(i) => path[..=i].to_string(),
        None => "/".to_string(),
    }
}

/// Path of `target` relative to the document's directory, when `target`
/// lives on the same site below that directory.
fn scope_tail(target: &str, doc_url: &Url) -> Option<(String, Url)> {
    let url = Url::parse(target).ok()?;
    if url.scheme() != doc_url.scheme()
        || url.host_str() != doc_url.host_str()
        || url.port_or_known_default() != doc_url.port_or_known_default()
    {
        return None;
    }
    let dir = scope_dir(doc_url);
    let tail = url
        .path()
        .strip_prefix(dir.as_str())?
        .trim_start_matches('/')
        .to_string();
    if tail.is_empty() {
        return None;
    }
    Some((tail, url))
}

fn with_suffix(mut path: String, url: &Url) -> String {
    if let Some(q) = url.query() {
        path.push('?');
        path.push_str(q);
    }
    if let Some(f) = url.fragment() {
        path.push('#');
        path.push_str(f);
    }
    path
}

/// Rewrite absolute links into the document's own published directory as
/// relative ones, so the HTML works from a local checkout.
///
/// `doc_url` is where the document itself is published.
pub fn relativize_same_scope(input: &str, doc_url: &Url) -> String {
    let output_name = basename(doc_url.path()).to_string();

    let s = RE_A_OPEN.replace_all(input, |caps: &Captures| {
        let tag = &caps[0];
        let Some(href) = attr(tag, "href") else {
            return tag.to_string();
        };
        let href = href.trim();
        if href.starts_with('#') {
            return tag.to_string();
        }
        let Some((tail, url)) = scope_tail(href, doc_url) else {
            return tag.to_string();
        };
        let rewritten = if url.path() == doc_url.path() {
            match url.fragment().filter(|f| !f.is_empty()) {
                Some(f) => format!("#{f}"),
                None => output_name.clone(),
            }
        } else {
            with_suffix(tail, &url)
        };
        remove_attr(&set_attr(tag, "href", &rewritten), "target")
    });

    let s = relativize_attr(&RE_LINK_OPEN, "href", &s, doc_url);
    let s = relativize_attr(&RE_SCRIPT_OPEN, "src", &s, doc_url);
    relativize_attr(&RE_IMG, "src", &s, doc_url)
}

fn relativize_attr(re: &Regex, name: &str, html: &str, doc_url: &Url) -> String {
    re.replace_all(html, |caps: &Captures| {
        let tag = &caps[0];
        match attr(tag, name).and_then(|v| scope_tail(v.trim(), doc_url)) {
            Some((tail, url)) => set_attr(tag, name, &with_suffix(tail, &url)),
            None => tag.to_string(),
        }
    })
    .into_owned()
}

// ── Anchor check ─────────────────────────────────────────────────────────────

static RE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\sid\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap());
static RE_FRAGMENT_HREF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r##"(?i)\shref\s*=\s*(?:"#([^"]*)"|'#([^']*)')"##).unwrap());

/// Every `href="#x"` without a matching `id="x"` (or `<a name="x">`), in
/// order of first appearance.
pub fn broken_anchors(html: &str) -> Vec<String> {
    let mut ids: std::collections::HashSet<String> = RE_ID
        .captures_iter(html)
        .filter_map(|c| c.get(1).or_else(|| c.get(2)).map(|m| m.as_str().to_string()))
        .collect();
    ids.extend(
        RE_A_OPEN
            .find_iter(html)
            .filter_map(|m| attr(m.as_str(), "name")),
    );

    let mut broken: Vec<String> = Vec::new();
    for caps in RE_FRAGMENT_HREF.captures_iter(html) {
        let Some(target) = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str()) else {
            continue;
        };
        if target.is_empty() || ids.contains(target) {
            continue;
        }
        if !broken.iter().any(|b| b == target) {
            broken.push(target.to_string());
        }
    }
    broken
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logo() -> Logo {
        Logo::default()
    }

    const PANDOC_OUT: &str = r##"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8" />
<base href="https://example.org/" />
<title>Spec</title>
<link rel="stylesheet" href="styles/styles.css" />
</head>
<body>
<header id="title-block-header">
<h1 class="title">Spec</h1>
</header>
<nav id="TOC" role="doc-toc">
<ul><li><a href="#intro">Intro</a></li></ul>
</nav>
<p><img src="https://docs.oasis-open.org/templates/OASISLogo-v3.0.png" alt="OASIS Logo" /></p>
<hr />
<h1 id="intro"><a id="intro"></a>Intro</h1>
<p>See <a href="spec.html#intro" target="_blank">intro</a>.</p>
<p>https://example.org/page</p>
</body>
</html>
"##;

    fn ctx<'a>(logo: Option<&'a Logo>) -> HtmlContext<'a> {
        HtmlContext {
            description: "CSAF \"2.1\"",
            output_name: "spec.html",
            logo,
            promote_title: true,
        }
    }

    #[test]
    fn attr_helpers() {
        let tag = r#"<a href="x.html#y" target='_blank' class=toc>"#;
        assert_eq!(attr(tag, "HREF").as_deref(), Some("x.html#y"));
        assert_eq!(attr(tag, "class").as_deref(), Some("toc"));
        assert_eq!(remove_attr(tag, "target"), r#"<a href="x.html#y" class=toc>"#);
        assert_eq!(set_attr("<img />", "alt", "a&b"), r#"<img alt="a&amp;b"/>"#);
        assert_eq!(set_attr(r#"<a href="x">"#, "href", "#y"), r##"<a href="#y">"##);
    }

    #[test]
    fn full_rule_chain() {
        let l = logo();
        let out = postprocess_html(PANDOC_OUT, &ctx(Some(&l)));

        assert!(!out.contains("<header"));
        assert!(!out.contains("<nav"));
        assert!(!out.contains("<base"));
        assert!(out.contains(r#"<meta name="description" content="CSAF &quot;2.1&quot;" />"#));
        assert_eq!(out.matches("OASISLogo-v3.0.png").count(), 1);
        assert!(out.contains("<h1big id=\"intro\">Intro</h1big>"), "{out}");
        assert!(!out.contains("<hr />"));
        assert!(out.contains(r##"<a href="#intro">intro</a>"##));
        assert!(out.contains(
            r#"<p><a href="https://example.org/page">https://example.org/page</a></p>"#
        ));
        assert!(broken_anchors(&out).is_empty());
    }

    #[test]
    fn logo_is_first_in_body() {
        let l = logo();
        let html = "<html><body>\n<p>text</p>\n<h1 id=\"t\">T</h1>\n</body></html>";
        let (out, logo_p) = enforce_single_logo(html, &l);
        let body = &out[body_start(&out)..];
        assert!(body.trim_start().starts_with(&logo_p));

        // Content between logo and title gets the styled separator.
        let fixed = fix_top_banner(&out, &logo_p);
        assert!(fixed.contains(&format!("{logo_p}\n{BANNER_HR}")));
    }

    #[test]
    fn duplicate_logos_collapse_to_one() {
        let l = logo();
        let html = r#"<body><p>intro</p><p><img src="images/OASISLogo-v3.0.png" alt="OASIS Logo" /></p>
<p>x <img src="https://docs.oasis-open.org/templates/OASISLogo-v3.0.png" alt="logo" /> y</p></body>"#;
        let (out, logo_p) = enforce_single_logo(html, &l);
        assert_eq!(out.matches("<img").count(), 1);
        assert!(logo_p.contains("images/OASISLogo-v3.0.png"));
        assert!(out.contains("<p>x  y</p>"));
    }

    #[test]
    fn logo_figure_is_dropped() {
        let l = logo();
        let html = r#"<figure><img src="OASISLogo-v3.0.png" /><figcaption>x</figcaption></figure><figure><img src="diagram.png" /></figure>"#;
        let out = drop_logo_figures(html, &l);
        assert!(!out.contains("OASISLogo"));
        assert!(out.contains("diagram.png"));
    }

    #[test]
    fn without_logo_rules_leave_images() {
        let out = postprocess_html(PANDOC_OUT, &ctx(None));
        assert!(out.contains("OASISLogo-v3.0.png"));
        assert!(!out.contains("<nav"));
    }

    #[test]
    fn heading_anchor_with_other_id_kept() {
        let html = r#"<h2 id="scope"><a id="other"></a>Scope <a id="scope">here</a></h2>"#;
        let out = remove_duplicate_heading_anchors(html);
        assert_eq!(out, r#"<h2 id="scope"><a id="other"></a>Scope here</h2>"#);
    }

    #[test]
    fn same_doc_detection() {
        assert_eq!(same_document_fragment("spec.html#a", "spec.html").as_deref(), Some("a"));
        assert_eq!(same_document_fragment("./spec.html#a", "spec.html").as_deref(), Some("a"));
        assert_eq!(same_document_fragment("?v=1#a", "spec.html").as_deref(), Some("a"));
        assert_eq!(same_document_fragment("https://x.org/d/spec.html#b", "spec.html"), None);
        assert_eq!(same_document_fragment("../other/spec.html#x", "spec.html"), None);
        assert_eq!(same_document_fragment("sub/spec.html#x", "spec.html"), None);
        assert_eq!(same_document_fragment("/scope/sub/spec.html#x", "spec.html"), None);
        assert_eq!(same_document_fragment("other.html#a", "spec.html"), None);
        assert_eq!(same_document_fragment("spec.html", "spec.html"), None);
        assert_eq!(same_document_fragment("spec.html#", "spec.html"), None);
    }

    #[test]
    fn paragraphs_with_tags_are_not_linkified() {
        let html = "<p>see <em>https://a.org</em></p>";
        assert_eq!(linkify_bare_urls(html), html);
    }

    #[test]
    fn relativizes_links_into_own_directory() {
        let doc = Url::parse("https://docs.oasis-open.org/csaf/csaf/v2.1/csaf-v2.1.html").unwrap();
        let html = concat!(
            r#"<a href="https://docs.oasis-open.org/csaf/csaf/v2.1/schemas/a.json" target="_blank">s</a>"#,
            r#"<a href="https://docs.oasis-open.org/csaf/csaf/v2.1/csaf-v2.1.html#sec">t</a>"#,
            r#"<a href="https://docs.oasis-open.org/other/x.html">o</a>"#,
            r#"<img src="https://docs.oasis-open.org/csaf/csaf/v2.1/images/f.png" />"#,
        );
        let out = relativize_same_scope(html, &doc);
        assert!(out.contains(r#"<a href="schemas/a.json">s</a>"#), "{out}");
        assert!(out.contains(r##"<a href="#sec">t</a>"##));
        assert!(out.contains("https://docs.oasis-open.org/other/x.html"));
        assert!(out.contains(r#"<img src="images/f.png" />"#));
    }

    #[test]
    fn same_named_document_in_subdirectory_is_not_collapsed() {
        let doc = Url::parse("https://docs.oasis-open.org/csaf/csaf/v2.1/csaf-v2.1.html").unwrap();
        let html = concat!(
            r#"<a href="https://docs.oasis-open.org/csaf/csaf/v2.1/sub/csaf-v2.1.html#x">a</a>"#,
            r#"<a href="https://docs.oasis-open.org/csaf/csaf/v2.0/csaf-v2.1.html#x">b</a>"#,
        );
        let out = relativize_same_scope(html, &doc);
        assert!(out.contains(r##"<a href="sub/csaf-v2.1.html#x">a</a>"##), "{out}");
        assert!(out.contains("https://docs.oasis-open.org/csaf/csaf/v2.0/csaf-v2.1.html#x"));
        assert!(!out.contains(r##"href="#x""##), "{out}");
    }

    #[test]
    fn relative_link_to_other_directory_keeps_its_path() {
        let html = r#"<p><a href="../other/spec.html#x">other</a></p>"#;
        let out = normalize_same_doc_anchors(html, "spec.html");
        assert_eq!(out, html);
    }

    #[test]
    fn broken_anchor_detection() {
        let html = r##"<h2 id="a">A</h2><a href="#a">ok</a><a href="#b">bad</a><a href="#b">bad</a><a name="c"></a><a href="#c">ok</a>"##;
        assert_eq!(broken_anchors(html), vec!["b".to_string()]);
    }

    #[test]
    fn meta_name_is_not_an_anchor_target() {
        let html = r##"<head><meta name="description" content="d" /></head><a href="#description">d</a>"##;
        assert_eq!(broken_anchors(html), vec!["description".to_string()]);
    }
}
