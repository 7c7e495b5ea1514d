//! # menu2dish
//!
//! Turn a photo of a restaurant menu into five recommended dishes, each with
//! a short description and a generated image.
//!
//! ## Pipeline Overview
//!
//! ```text
//! menu photo
//!  │
//!  ├─ 1. Input       local file or URL download → MenuImage
//!  ├─ 2. OCR         tesseract ("eng") or a vision model → text
//!  ├─ 3. Parse       one chat request → up to 5 {name, description}
//!  ├─ 4. Synthesize  uniform (n = 5) or staggered (n = 1 every 500 ms)
//!  └─ 5. Slots       each image lands in its own slot as it arrives
//! ```
//!
//! Stage failures (not an image, OCR error, not a menu, unparseable reply)
//! stop the run in a terminal stage. Image failures are scoped to their slot
//! and the run still completes.
//!
//! Submitting a new image supersedes the running one. Its in-flight requests
//! are not cancelled, but nothing they return is written to the new run's
//! state.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use menu2dish::{MenuImage, MenuPipeline, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Chat provider and image key come from OPENAI_API_KEY by default
//!     let pipeline = MenuPipeline::from_config(&PipelineConfig::default())?;
//!     let state = pipeline.run(MenuImage::from_path("menu.jpg").await?).await;
//!     for (dish, image) in state.dishes().iter().zip(state.images()) {
//!         println!("{} — {}", dish.name, image.unwrap_or("(no image)"));
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `menu2dish` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! menu2dish = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod menu;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod showcase;
pub mod state;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{OcrBackend, PipelineConfig, PipelineConfigBuilder};
pub use error::{MenuError, SynthesisError, PROCESSING_ERROR_MESSAGE};
pub use menu::{DishRecord, ExtractedText, MenuImage};
pub use orchestrator::{MenuPipeline, RunHandle};
pub use pipeline::images::ImageGenerator;
pub use pipeline::input::resolve_image;
pub use pipeline::llm::ChatCompletion;
pub use pipeline::ocr::TextRecognizer;
pub use pipeline::synthesize::SynthesisStrategy;
pub use progress::{NoopObserver, PipelineObserver, ProgressObserver};
pub use state::{DishSlot, PipelineState, RunId, Stage, SLOT_COUNT};
