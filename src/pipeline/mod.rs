//! Pipeline stages for menu-to-dish recommendation.
//!
//! Each submodule implements exactly one transformation step; the
//! orchestrator wires them together and owns all shared state.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ ocr ──▶ parse ──▶ synthesize
//! (path/URL) (text)  (dishes)  (image URL per slot)
//!            │        │          │
//!            encode   llm        images
//! ```
//!
//! 1. [`input`]      — load a file or download a URL into a `MenuImage`
//! 2. [`ocr`]        — recognize text; Tesseract on the blocking pool, or a
//!    vision model fed by [`encode`]
//! 3. [`parse`]      — one chat request via [`llm`], decoded into dish records
//! 4. [`synthesize`] — uniform or staggered requests against the [`images`]
//!    endpoint, one slot at a time

pub mod encode;
pub mod images;
pub mod input;
pub mod llm;
pub mod ocr;
pub mod parse;
pub mod synthesize;
