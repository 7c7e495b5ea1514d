//! Configuration types for the menu-to-dish pipeline.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. One struct holds every knob so a config can be
//! shared with spawned runs and logged as a whole.

use crate::error::MenuError;
use crate::progress::ProgressObserver;
use crate::state::SLOT_COUNT;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Model used by the dish parser when none is configured.
pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";

/// Default OpenAI-compatible base URL for image generation.
pub const DEFAULT_IMAGE_API_BASE: &str = "https://api.openai.com/v1";

/// Configuration for a menu pipeline.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use menu2dish::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .chat_model("gpt-4.1-mini")
///     .stagger_ms(250)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Chat model for dish parsing. If None, uses [`DEFAULT_CHAT_MODEL`].
    pub chat_model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, the provider is auto-detected.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for the dish parser. Default: 0.2.
    pub temperature: f32,

    /// Custom system instruction for the parser. If None, uses the built-in one.
    pub system_prompt: Option<String>,

    /// Which recognition engine turns the photo into text. Default: Tesseract.
    pub ocr_backend: OcrBackend,

    /// Recognition language hint. Default: "eng".
    pub ocr_language: String,

    /// Base URL of the image-generation endpoint.
    pub image_api_base: String,

    /// Bearer token for the image endpoint. If None, read from `OPENAI_API_KEY`.
    pub image_api_key: Option<String>,

    /// Optional `model` field sent with image requests.
    pub image_model: Option<String>,

    /// Requested image size. Default: "512x512".
    pub image_size: String,

    /// Spacing between staggered image requests, in milliseconds. Default: 500.
    ///
    /// Request `i` starts `i × stagger_ms` after the first one.
    pub stagger_ms: u64,

    /// Maximum dishes kept from the parser (and slots used). Range 1–5. Default: 5.
    pub max_dishes: usize,

    /// Per-request timeout for chat and image calls, in seconds. Default: 60.
    pub request_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Observer notified as the run advances.
    pub observer: Option<ProgressObserver>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chat_model: None,
            provider_name: None,
            provider: None,
            temperature: 0.2,
            system_prompt: None,
            ocr_backend: OcrBackend::default(),
            ocr_language: "eng".to_string(),
            image_api_base: DEFAULT_IMAGE_API_BASE.to_string(),
            image_api_key: None,
            image_model: None,
            image_size: "512x512".to_string(),
            stagger_ms: 500,
            max_dishes: SLOT_COUNT,
            request_timeout_secs: 60,
            download_timeout_secs: 120,
            observer: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("chat_model", &self.chat_model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("ocr_backend", &self.ocr_backend)
            .field("ocr_language", &self.ocr_language)
            .field("image_api_base", &self.image_api_base)
            .field("image_api_key", &self.image_api_key.as_ref().map(|_| "<redacted>"))
            .field("image_model", &self.image_model)
            .field("image_size", &self.image_size)
            .field("stagger_ms", &self.stagger_ms)
            .field("max_dishes", &self.max_dishes)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Chat model to use, falling back to [`DEFAULT_CHAT_MODEL`].
    pub fn chat_model_or_default(&self) -> &str {
        self.chat_model.as_deref().unwrap_or(DEFAULT_CHAT_MODEL)
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn chat_model(mut self, model: impl Into<String>) -> Self {
        self.config.chat_model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn ocr_backend(mut self, backend: OcrBackend) -> Self {
        self.config.ocr_backend = backend;
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn image_api_base(mut self, base: impl Into<String>) -> Self {
        self.config.image_api_base = base.into();
        self
    }

    pub fn image_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.image_api_key = Some(key.into());
        self
    }

    pub fn image_model(mut self, model: impl Into<String>) -> Self {
        self.config.image_model = Some(model.into());
        self
    }

    pub fn image_size(mut self, size: impl Into<String>) -> Self {
        self.config.image_size = size.into();
        self
    }

    pub fn stagger_ms(mut self, ms: u64) -> Self {
        self.config.stagger_ms = ms;
        self
    }

    pub fn max_dishes(mut self, n: usize) -> Self {
        self.config.max_dishes = n;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn observer(mut self, observer: ProgressObserver) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, MenuError> {
        let c = &self.config;
        if c.max_dishes == 0 || c.max_dishes > SLOT_COUNT {
            return Err(MenuError::InvalidConfig(format!(
                "max_dishes must be 1–{}, got {}",
                SLOT_COUNT, c.max_dishes
            )));
        }
        if c.request_timeout_secs == 0 {
            return Err(MenuError::InvalidConfig(
                "request timeout must be ≥ 1s".into(),
            ));
        }
        if !is_valid_size(&c.image_size) {
            return Err(MenuError::InvalidConfig(format!(
                "image size must look like WIDTHxHEIGHT, got '{}'",
                c.image_size
            )));
        }
        if c.ocr_language.trim().is_empty() {
            return Err(MenuError::InvalidConfig(
                "OCR language must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

fn is_valid_size(size: &str) -> bool {
    match size.split_once('x') {
        Some((w, h)) => w.parse::<u32>().is_ok_and(|w| w > 0) && h.parse::<u32>().is_ok_and(|h| h > 0),
        None => false,
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Recognition engine used by the text extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrBackend {
    /// Local `tesseract` binary. (default)
    #[default]
    Tesseract,
    /// Vision-capable chat model reads the photo and transcribes it.
    Vision,
}
