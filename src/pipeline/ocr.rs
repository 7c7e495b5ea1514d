//! Text extraction: menu photo → [`ExtractedText`].
//!
//! [`TextExtractor::extract`] validates the media type first, so a non-image
//! never reaches the recognizer, then makes exactly one recognition attempt.
//! Two recognizers ship with the crate:
//!
//! - [`TesseractRecognizer`] — runs the local `tesseract` binary with a
//!   language hint (`"eng"` by default). Blocking, so it runs on tokio's
//!   blocking pool under the request timeout.
//! - [`VisionRecognizer`] — sends the photo to a vision-capable chat model and
//!   asks for a plain transcription.

use crate::config::{OcrBackend, PipelineConfig};
use crate::error::MenuError;
use crate::menu::{ExtractedText, MenuImage};
use crate::pipeline::{encode, llm};
use crate::prompts::VISION_OCR_PROMPT;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use rusty_tesseract::{Args, Image};
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{timeout, Duration};
use tracing::{debug, info};

/// Turns image bytes into raw text.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn recognize(&self, image: &MenuImage) -> Result<String, MenuError>;
}

/// Validating front end over a [`TextRecognizer`].
#[derive(Clone)]
pub struct TextExtractor {
    recognizer: Arc<dyn TextRecognizer>,
}

impl TextExtractor {
    pub fn new(recognizer: Arc<dyn TextRecognizer>) -> Self {
        Self { recognizer }
    }

    /// Build the recognizer selected by `config.ocr_backend`.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, MenuError> {
        let recognizer: Arc<dyn TextRecognizer> = match config.ocr_backend {
            OcrBackend::Tesseract => Arc::new(TesseractRecognizer::new(
                &config.ocr_language,
                config.request_timeout_secs,
            )),
            OcrBackend::Vision => Arc::new(VisionRecognizer::new(
                llm::resolve_provider(config)?,
                config.request_timeout_secs,
            )),
        };
        Ok(Self::new(recognizer))
    }

    /// Extract text from `image`. Single attempt, no retry.
    pub async fn extract(&self, image: &MenuImage) -> Result<ExtractedText, MenuError> {
        image.validate()?;
        let start = Instant::now();
        let text = self.recognizer.recognize(image).await?;
        info!(
            "Extracted {} chars from {} in {:?}",
            text.chars().count(),
            image.media_type(),
            start.elapsed()
        );
        Ok(ExtractedText::new(text))
    }
}

// ── Tesseract ────────────────────────────────────────────────────────────────

/// Local `tesseract` recognizer.
pub struct TesseractRecognizer {
    language: String,
    timeout: Duration,
}

impl TesseractRecognizer {
    pub fn new(language: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            language: language.into(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

#[async_trait]
impl TextRecognizer for TesseractRecognizer {
    async fn recognize(&self, image: &MenuImage) -> Result<String, MenuError> {
        let image = image.clone();
        let language = self.language.clone();

        run_blocking(self.timeout, move || recognize_blocking(&image, &language)).await
    }
}

/// Run `job` on the blocking pool, giving up after `limit`.
///
/// The blocking thread cannot be cancelled; on timeout it finishes in the
/// background and its result is discarded.
async fn run_blocking<F>(limit: Duration, job: F) -> Result<String, MenuError>
where
    F: FnOnce() -> Result<String, MenuError> + Send + 'static,
{
    timeout(limit, tokio::task::spawn_blocking(job))
        .await
        .map_err(|_| MenuError::Extraction {
            detail: format!("tesseract timed out after {:?}", limit),
        })?
        .map_err(|e| MenuError::Internal(format!("OCR task panicked: {}", e)))?
}

/// tesseract reads from a path, so the bytes go through a temp file whose
/// suffix matches the media type.
fn recognize_blocking(image: &MenuImage, language: &str) -> Result<String, MenuError> {
    let extraction = |detail: String| MenuError::Extraction { detail };

    let mut tmp = tempfile::Builder::new()
        .prefix("menu-")
        .suffix(&format!(".{}", image.extension()))
        .tempfile()
        .map_err(|e| extraction(format!("tempfile: {e}")))?;
    tmp.write_all(image.bytes())
        .and_then(|_| tmp.flush())
        .map_err(|e| extraction(format!("tempfile write: {e}")))?;

    let ocr_image = Image::from_path(tmp.path()).map_err(|e| extraction(e.to_string()))?;
    let args = Args {
        lang: language.to_string(),
        ..Args::default()
    };

    let text = rusty_tesseract::image_to_string(&ocr_image, &args)
        .map_err(|e| extraction(e.to_string()))?;
    debug!("tesseract ({}) returned {} bytes", language, text.len());
    Ok(text)
}

// ── Vision model ─────────────────────────────────────────────────────────────

/// Recognizer that asks a vision chat model for a transcription.
pub struct VisionRecognizer {
    provider: Arc<dyn LLMProvider>,
    timeout_secs: u64,
}

impl VisionRecognizer {
    pub fn new(provider: Arc<dyn LLMProvider>, timeout_secs: u64) -> Self {
        Self {
            provider,
            timeout_secs,
        }
    }
}

#[async_trait]
impl TextRecognizer for VisionRecognizer {
    async fn recognize(&self, image: &MenuImage) -> Result<String, MenuError> {
        // The image carries all the content; the user text stays empty.
        let messages = vec![
            ChatMessage::system(VISION_OCR_PROMPT),
            ChatMessage::user_with_images("", vec![encode::encode_image(image)]),
        ];
        let options = CompletionOptions {
            temperature: Some(0.0),
            ..Default::default()
        };

        let call = self.provider.chat(&messages, Some(&options));
        let response = timeout(Duration::from_secs(self.timeout_secs), call)
            .await
            .map_err(|_| MenuError::Extraction {
                detail: format!("vision OCR timed out after {}s", self.timeout_secs),
            })?
            .map_err(|e| MenuError::Extraction {
                detail: e.to_string(),
            })?;

        Ok(response.content)
    }
}
