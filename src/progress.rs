//! Observer trait for per-run and per-slot pipeline events.
//!
//! Inject an [`Arc<dyn PipelineObserver>`] via
//! [`crate::config::PipelineConfigBuilder::observer`] to receive events as a
//! run moves through OCR, parsing, and image synthesis. This is how a
//! presentation layer reveals dishes slot by slot instead of waiting for the
//! whole batch.
//!
//! Events are emitted only for the active run: once a new image supersedes a
//! run, its late results are dropped silently.
//!
//! Callbacks run while the pipeline's state lock is held, so every event of
//! a superseded run arrives before the next run's `on_run_start`. Keep them
//! short and never call back into [`crate::MenuPipeline`] from one.
//!
//! # Example
//!
//! ```rust
//! use menu2dish::{PipelineObserver, PipelineConfig, RunId};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingObserver {
//!     ready: AtomicUsize,
//! }
//!
//! impl PipelineObserver for CountingObserver {
//!     fn on_slot_complete(&self, _run: RunId, index: usize, url: String) {
//!         self.ready.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("slot {index} ready: {url}");
//!     }
//! }
//!
//! let observer = Arc::new(CountingObserver { ready: AtomicUsize::new(0) });
//!
//! let config = PipelineConfig::builder()
//!     .observer(observer as Arc<dyn PipelineObserver>)
//!     .build()
//!     .unwrap();
//! ```

use crate::state::{RunId, Stage};
use std::sync::Arc;

/// Called by the orchestrator as a run advances.
///
/// Implementations must be `Send + Sync`: slot events arrive from concurrent
/// image requests. All methods have default no-op implementations so callers
/// only override what they care about.
pub trait PipelineObserver: Send + Sync {
    /// A new image was accepted and the run reset the state.
    fn on_run_start(&self, run: RunId) {
        let _ = run;
    }

    /// OCR finished.
    ///
    /// # Arguments
    /// * `chars` — character count of the extracted text (0 is valid)
    fn on_text_extracted(&self, run: RunId, chars: usize) {
        let _ = (run, chars);
    }

    /// The parser returned dishes, already truncated to the slot count.
    fn on_dishes_parsed(&self, run: RunId, names: Vec<String>) {
        let _ = (run, names);
    }

    /// The image request for `index` was sent.
    fn on_slot_start(&self, run: RunId, index: usize) {
        let _ = (run, index);
    }

    /// Slot `index` received its image.
    fn on_slot_complete(&self, run: RunId, index: usize, url: String) {
        let _ = (run, index, url);
    }

    /// Slot `index` failed; it shows a failure indicator instead of an image.
    fn on_slot_error(&self, run: RunId, index: usize, error: String) {
        let _ = (run, index, error);
    }

    /// The run stopped in a terminal failure stage.
    ///
    /// # Arguments
    /// * `stage`   — `ExtractionFailed`, `NotAMenu`, or `ParseFailed`
    /// * `message` — the internal error description (not the user message)
    fn on_stage_failed(&self, run: RunId, stage: Stage, message: String) {
        let _ = (run, stage, message);
    }

    /// The run reached `Complete`.
    ///
    /// # Arguments
    /// * `images`  — slots that received an image
    /// * `dishes`  — slots that hold a dish
    fn on_run_complete(&self, run: RunId, images: usize, dishes: usize) {
        let _ = (run, images, dishes);
    }
}

/// A no-op observer for callers that don't need events.
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressObserver = Arc<dyn PipelineObserver>;
