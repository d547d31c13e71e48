//! Progress-callback trait for stage events.
//!
//! Inject an [`Arc<dyn StageProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to observe
//! each stage as it starts, moves through its phases and finishes.
//!
//! # Example
//!
//! ```rust
//! use docpipe::{PipelineConfig, StageKind, StageProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Counter(AtomicUsize);
//!
//! impl StageProgressCallback for Counter {
//!     fn on_stage_complete(&self, stage: StageKind, _artifact: &std::path::Path) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{stage} done");
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(Arc::new(Counter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use crate::output::StageKind;
use std::path::Path;
use std::sync::Arc;

/// Called by the stages as they run.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Stages run sequentially; the `Send + Sync` bound
/// lets a config move onto the blocking threads the metadata stages use.
pub trait StageProgressCallback: Send + Sync {
    /// Called once when a stage begins.
    fn on_stage_start(&self, stage: StageKind, dir: &Path) {
        let _ = (stage, dir);
    }

    /// Called when a stage enters a named phase
    /// (`discovering`, `preprocessing`, `rendering`, …).
    fn on_phase(&self, stage: StageKind, phase: &str) {
        let _ = (stage, phase);
    }

    /// Called when a stage has produced its artifact.
    fn on_stage_complete(&self, stage: StageKind, artifact: &Path) {
        let _ = (stage, artifact);
    }

    /// Called when a stage fails, before the error is returned.
    fn on_stage_error(&self, stage: StageKind, error: &str) {
        let _ = (stage, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl StageProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn StageProgressCallback>;
