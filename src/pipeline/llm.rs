//! Chat-completion seam: the parser talks to a [`ChatCompletion`], production
//! code plugs in an `edgequake-llm` provider.
//!
//! The trait keeps the dish parser testable with scripted replies while the
//! real backend gets provider selection, auth, and wire format from
//! `edgequake-llm`. The module is intentionally thin; the instruction text
//! lives in [`crate::prompts`].

use crate::config::PipelineConfig;
use crate::error::MenuError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{timeout, Duration};
use tracing::debug;

/// One system + user exchange returning the assistant's text.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String, MenuError>;
}

/// [`ChatCompletion`] backed by an `edgequake-llm` provider.
pub struct LlmChat {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    timeout_secs: u64,
}

impl LlmChat {
    pub fn new(provider: Arc<dyn LLMProvider>, temperature: f32, timeout_secs: u64) -> Self {
        Self {
            provider,
            temperature,
            timeout_secs,
        }
    }

    /// Build from config, resolving the provider the same way the pipeline does.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, MenuError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(
            provider,
            config.temperature,
            config.request_timeout_secs,
        ))
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ChatCompletion for LlmChat {
    async fn complete(&self, system: &str, user: &str) -> Result<String, MenuError> {
        let start = Instant::now();
        let messages = vec![ChatMessage::system(system), ChatMessage::user(user)];
        let options = self.options();

        let call = self.provider.chat(&messages, Some(&options));
        let response = timeout(Duration::from_secs(self.timeout_secs), call)
            .await
            .map_err(|_| MenuError::LlmApiError {
                message: format!("chat completion timed out after {}s", self.timeout_secs),
            })?
            .map_err(|e| MenuError::LlmApiError {
                message: e.to_string(),
            })?;

        debug!(
            "Chat completion: {} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );
        Ok(response.content)
    }
}

/// Instantiate a named provider with the given model.
pub(crate) fn create_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, MenuError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        MenuError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`) — used as-is.
/// 2. **Named provider** (`config.provider_name`) with `config.chat_model`.
/// 3. **Environment pair** (`MENU2DISH_LLM_PROVIDER` + `MENU2DISH_MODEL`).
/// 4. **OpenAI** when `OPENAI_API_KEY` is set, since the image endpoint
///    shares that token.
/// 5. **Full auto-detection** via [`ProviderFactory::from_env`].
pub fn resolve_provider(config: &PipelineConfig) -> Result<Arc<dyn LLMProvider>, MenuError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        return create_provider(name, config.chat_model_or_default());
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("MENU2DISH_LLM_PROVIDER"),
        std::env::var("MENU2DISH_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_provider("openai", config.chat_model_or_default());
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| MenuError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY or MENU2DISH_LLM_PROVIDER + MENU2DISH_MODEL.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
