//! Signal-safe temp-file bookkeeping.
//!
//! Temp files are owned by `tempfile::NamedTempFile` and vanish on drop, but
//! destructors do not run when the process is interrupted. Every temp path
//! docpipe creates is therefore also [`track`]ed here; the handler installed
//! by [`install_signal_handler`] deletes whatever is still registered and
//! exits with status 130.

use crate::error::PipelineError;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};
use tracing::debug;

/// Exit status after an interrupt (128 + SIGINT).
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

static REGISTRY: OnceLock<Mutex<Vec<PathBuf>>> = OnceLock::new();
static HANDLER_INSTALLED: AtomicBool = AtomicBool::new(false);

fn registry() -> &'static Mutex<Vec<PathBuf>> {
    REGISTRY.get_or_init(|| Mutex::new(Vec::new()))
}

/// Keeps a path registered for interrupt cleanup until dropped.
///
/// Dropping the guard only unregisters the path; deleting the file stays
/// the job of its owner.
#[derive(Debug)]
pub struct TempGuard {
    path: PathBuf,
}

impl TempGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempGuard {
    fn drop(&mut self) {
        if let Ok(mut paths) = registry().lock() {
            if let Some(i) = paths.iter().position(|p| *p == self.path) {
                paths.swap_remove(i);
            }
        }
    }
}

/// Register `path` for removal on interrupt.
pub fn track(path: impl Into<PathBuf>) -> TempGuard {
    let path = path.into();
    if let Ok(mut paths) = registry().lock() {
        paths.push(path.clone());
    }
    TempGuard { path }
}

/// Paths currently registered.
pub fn tracked() -> Vec<PathBuf> {
    registry().lock().map(|p| p.clone()).unwrap_or_default()
}

/// Delete every registered file. Returns how many were removed.
pub fn remove_tracked() -> usize {
    let paths = match registry().lock() {
        Ok(mut paths) => std::mem::take(&mut *paths),
        Err(_) => return 0,
    };
    remove_paths(&paths)
}

fn remove_paths(paths: &[PathBuf]) -> usize {
    paths
        .iter()
        .filter(|p| std::fs::remove_file(p).is_ok())
        .count()
}

/// Install the SIGINT/SIGTERM handler. Safe to call more than once.
pub fn install_signal_handler() -> Result<(), PipelineError> {
    if HANDLER_INSTALLED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }
    ctrlc::set_handler(|| {
        let removed = remove_tracked();
        debug!("Interrupted; removed {} temp file(s)", removed);
        std::process::exit(INTERRUPTED_EXIT_CODE);
    })
    .map_err(|e| PipelineError::Internal(format!("failed to set signal handler: {e}")))
}
