//! Error types for the menu2dish library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`MenuError`] — **Fatal to a stage**: the run cannot advance past OCR or
//!   parsing (not an image, recognition failed, not a menu, garbled model
//!   output). The run stops in a terminal error stage and the user has to
//!   supply a new image.
//!
//! * [`SynthesisError`] — **Scoped to one slot** (or, for the uniform
//!   strategy, to the whole batch of slots): an image request failed but the
//!   run still reaches `Complete`. Stored as a flag on the affected
//!   [`crate::state::DishSlot`] and reported through the observer.

use std::path::PathBuf;
use thiserror::Error;

/// The single user-facing message for parse-stage failures.
///
/// `NotAMenu` and `MalformedResponse` are distinguished internally (see
/// [`crate::state::Stage`]) but surfaced to the user identically.
pub const PROCESSING_ERROR_MESSAGE: &str = "processing error, try again";

/// All stage-fatal errors returned by the menu2dish library.
#[derive(Debug, Error)]
pub enum MenuError {
    // ── Capture / OCR errors ──────────────────────────────────────────────
    /// The input does not declare an image media type.
    #[error("Invalid input: expected an image, got media type '{media_type}'")]
    InvalidInput { media_type: String },

    /// The recognition engine failed or the file could not be read.
    #[error("Text extraction failed: {detail}")]
    Extraction { detail: String },

    /// Input file was not found at the given path.
    #[error("Image file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Parse errors ──────────────────────────────────────────────────────
    /// The language model judged the text not to be a food menu.
    #[error("The uploaded image does not appear to be a food menu")]
    NotAMenu,

    /// The language model reply did not decode to a non-empty dish array.
    #[error("Malformed model response: {detail}")]
    MalformedResponse { detail: String },

    /// The chat completion call itself failed (network, auth, provider).
    #[error("LLM API error: {message}")]
    LlmApiError { message: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MenuError {
    /// True for errors raised before or during text extraction.
    pub fn is_ocr_stage(&self) -> bool {
        matches!(
            self,
            MenuError::InvalidInput { .. }
                | MenuError::Extraction { .. }
                | MenuError::FileNotFound { .. }
                | MenuError::DownloadFailed { .. }
                | MenuError::DownloadTimeout { .. }
        )
    }

    /// Message shown to the user for this error.
    ///
    /// OCR-stage errors are shown verbatim; everything past OCR collapses to
    /// [`PROCESSING_ERROR_MESSAGE`].
    pub fn user_message(&self) -> String {
        if self.is_ocr_stage() {
            self.to_string()
        } else {
            PROCESSING_ERROR_MESSAGE.to_string()
        }
    }
}

/// A non-fatal image-generation error for one slot.
#[derive(Debug, Clone, Error, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SynthesisError {
    /// The image endpoint rejected the request or the transport failed.
    #[error("image request failed: {detail}")]
    RequestFailed { detail: String },

    /// The request exceeded the configured timeout.
    #[error("image request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The endpoint answered but returned no URL for this slot.
    #[error("no image returned for slot {slot}")]
    MissingImage { slot: usize },

    /// The endpoint answered with a body that could not be decoded.
    #[error("invalid image response: {detail}")]
    InvalidResponse { detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ocr_errors_are_shown_verbatim() {
        let e = MenuError::InvalidInput {
            media_type: "application/pdf".into(),
        };
        assert!(e.is_ocr_stage());
        assert!(e.user_message().contains("application/pdf"));
    }

    #[test]
    fn parse_errors_share_one_message() {
        let not_menu = MenuError::NotAMenu;
        let malformed = MenuError::MalformedResponse {
            detail: "expected array".into(),
        };
        assert_eq!(not_menu.user_message(), PROCESSING_ERROR_MESSAGE);
        assert_eq!(malformed.user_message(), PROCESSING_ERROR_MESSAGE);
        assert_ne!(not_menu.to_string(), malformed.to_string());
    }

    #[test]
    fn timeout_display() {
        let e = SynthesisError::Timeout { secs: 60 };
        assert!(e.to_string().contains("60s"));
    }

    #[test]
    fn missing_image_display() {
        let e = SynthesisError::MissingImage { slot: 3 };
        assert!(e.to_string().contains("slot 3"));
    }
}
