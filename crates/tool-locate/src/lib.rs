//! # tool-locate
//!
//! Resolve the external executables a publishing pipeline shells out to
//! (`pandoc`, `wkhtmltopdf`, `prettier`, `git`, …) before any work starts,
//! so that a missing tool surfaces as one clear precondition error instead
//! of an obscure spawn failure halfway through a stage.
//!
//! ## How it works
//!
//! On each call to [`locate`]:
//!
//! 1. Checks the per-tool override variable `DOCPIPE_<TOOL>_PATH`
//!    (e.g. `DOCPIPE_WKHTMLTOPDF_PATH`).
//! 2. If the requested name already contains a path separator, it is taken
//!    as a path and must exist.
//! 3. Otherwise the name is searched on `PATH` via [`which`].
//!
//! Successful lookups are cached for the lifetime of the process.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tool_locate::{locate, ensure_tools};
//!
//! let pandoc = locate("pandoc").expect("pandoc missing");
//! ensure_tools(&["pandoc", "wkhtmltopdf"]).expect("toolchain incomplete");
//! ```
//!
//! ## Environment variable overrides
//!
//! | Tool          | Variable                    |
//! |---------------|-----------------------------|
//! | `pandoc`      | `DOCPIPE_PANDOC_PATH`       |
//! | `wkhtmltopdf` | `DOCPIPE_WKHTMLTOPDF_PATH`  |
//! | `prettier`    | `DOCPIPE_PRETTIER_PATH`     |
//! | `git`         | `DOCPIPE_GIT_PATH`          |

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use thiserror::Error;

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by tool lookups.
#[derive(Error, Debug)]
pub enum ToolLocateError {
    /// The override variable points at a file that does not exist.
    #[error("{var} is set to '{path}', but no such file exists")]
    OverrideMissing { var: String, path: PathBuf },

    /// An explicit path was given and it does not exist.
    #[error("'{path}' does not exist")]
    PathMissing { path: PathBuf },

    /// The tool is not on `PATH`.
    #[error("'{tool}' was not found on PATH ({reason}); install it or set {var}")]
    NotOnPath {
        tool: String,
        var: String,
        reason: String,
    },
}

// ── Process-wide cache ───────────────────────────────────────────────────────

static RESOLVED: OnceLock<Mutex<HashMap<String, PathBuf>>> = OnceLock::new();

fn cache() -> &'static Mutex<HashMap<String, PathBuf>> {
    RESOLVED.get_or_init(|| Mutex::new(HashMap::new()))
}

// ── Public API ───────────────────────────────────────────────────────────────

/// Name of the override variable consulted for `tool`.
///
/// The file stem is upper-cased and every non-alphanumeric character becomes
/// `_`: `wkhtmltopdf` → `DOCPIPE_WKHTMLTOPDF_PATH`.
pub fn override_var(tool: &str) -> String {
    let stem = Path::new(tool)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| tool.to_string());
    let normalised: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("DOCPIPE_{normalised}_PATH")
}

/// Resolve `tool` to an executable path.
///
/// Results are cached per tool name; the override variable is consulted on
/// the first lookup only.
pub fn locate(tool: &str) -> Result<PathBuf, ToolLocateError> {
    if let Ok(guard) = cache().lock() {
        if let Some(path) = guard.get(tool) {
            return Ok(path.clone());
        }
    }

    let path = resolve(tool)?;

    if let Ok(mut guard) = cache().lock() {
        guard.insert(tool.to_string(), path.clone());
    }

    Ok(path)
}

/// Returns `true` when [`locate`] would succeed for `tool`.
pub fn is_available(tool: &str) -> bool {
    locate(tool).is_ok()
}

/// Resolve every tool in `tools`, failing on the first one that is missing.
pub fn ensure_tools(tools: &[&str]) -> Result<Vec<PathBuf>, ToolLocateError> {
    tools.iter().map(|t| locate(t)).collect()
}

// ── Internal helpers ─────────────────────────────────────────────────────────

fn resolve(tool: &str) -> Result<PathBuf, ToolLocateError> {
    // 1. Environment variable override.
    let var = override_var(tool);
    if let Ok(value) = std::env::var(&var) {
        if !value.is_empty() {
            let p = PathBuf::from(value);
            return if p.is_file() {
                Ok(p)
            } else {
                Err(ToolLocateError::OverrideMissing { var, path: p })
            };
        }
    }

    // 2. Explicit path.
    if has_separator(tool) {
        let p = PathBuf::from(tool);
        return if p.is_file() {
            Ok(p)
        } else {
            Err(ToolLocateError::PathMissing { path: p })
        };
    }

    // 3. PATH lookup.
    which::which(tool).map_err(|e| ToolLocateError::NotOnPath {
        tool: tool.to_string(),
        var,
        reason: e.to_string(),
    })
}

fn has_separator(tool: &str) -> bool {
    tool.contains('/') || tool.contains(std::path::MAIN_SEPARATOR)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
