//! Image-generation endpoint client.
//!
//! [`ImageGenerator`] is the seam the synthesizer calls; [`OpenAiImageClient`]
//! speaks the OpenAI-compatible `POST /images/generations` protocol:
//!
//! ```text
//! → { "prompt": "...", "n": 1, "size": "512x512" }
//! ← { "data": [ { "url": "https://..." }, ... ] }
//! ```
//!
//! Auth is a bearer token, the same one the chat provider uses.

use crate::config::PipelineConfig;
use crate::error::{MenuError, SynthesisError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Produces `n` image URLs for one prompt.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, n: usize) -> Result<Vec<String>, SynthesisError>;
}

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    prompt: &'a str,
    n: usize,
    size: &'a str,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    url: Option<String>,
}

/// OpenAI-compatible image-generation client.
pub struct OpenAiImageClient {
    client: Client,
    api_base: String,
    api_key: String,
    model: Option<String>,
    size: String,
    timeout_secs: u64,
}

impl OpenAiImageClient {
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        size: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, MenuError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| MenuError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_base: api_base.into(),
            api_key: api_key.into(),
            model: None,
            size: size.into(),
            timeout_secs,
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Build from config; the key falls back to `OPENAI_API_KEY`.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, MenuError> {
        let api_key = match config.image_api_key.clone() {
            Some(key) => key,
            None => std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|k| !k.is_empty())
                .ok_or_else(|| MenuError::ProviderNotConfigured {
                    provider: "images".to_string(),
                    hint: "Set OPENAI_API_KEY or configure image_api_key.".to_string(),
                })?,
        };
        let client = Self::new(
            config.image_api_base.clone(),
            api_key,
            config.image_size.clone(),
            config.request_timeout_secs,
        )?;
        Ok(match config.image_model {
            Some(ref model) => client.with_model(model.clone()),
            None => client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/images/generations", self.api_base.trim_end_matches('/'))
    }
}

#[async_trait]
impl ImageGenerator for OpenAiImageClient {
    async fn generate(&self, prompt: &str, n: usize) -> Result<Vec<String>, SynthesisError> {
        let body = ImageRequest {
            model: self.model.as_deref(),
            prompt,
            n,
            size: &self.size,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SynthesisError::Timeout {
                        secs: self.timeout_secs,
                    }
                } else {
                    SynthesisError::RequestFailed {
                        detail: e.to_string(),
                    }
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(SynthesisError::RequestFailed {
                detail: format!("HTTP {}: {}", status, text),
            });
        }

        let parsed: ImageResponse =
            response
                .json()
                .await
                .map_err(|e| SynthesisError::InvalidResponse {
                    detail: e.to_string(),
                })?;

        let urls = collect_urls(parsed)?;
        debug!("Image endpoint returned {} of {} urls", urls.len(), n);
        Ok(urls)
    }
}

fn collect_urls(response: ImageResponse) -> Result<Vec<String>, SynthesisError> {
    let urls: Vec<String> = response.data.into_iter().filter_map(|d| d.url).collect();
    if urls.is_empty() {
        return Err(SynthesisError::InvalidResponse {
            detail: "response contained no image urls".into(),
        });
    }
    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_shape() {
        let body = ImageRequest {
            model: None,
            prompt: "A bowl of pho",
            n: 5,
            size: "512x512",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"prompt": "A bowl of pho", "n": 5, "size": "512x512"})
        );
    }

    #[test]
    fn request_body_includes_model_when_set() {
        let body = ImageRequest {
            model: Some("dall-e-2"),
            prompt: "p",
            n: 1,
            size: "512x512",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "dall-e-2");
    }

    #[test]
    fn urls_are_collected_in_order() {
        let resp: ImageResponse = serde_json::from_str(
            r#"{"created":1,"data":[{"url":"https://a"},{"b64_json":"x"},{"url":"https://b"}]}"#,
        )
        .unwrap();
        assert_eq!(collect_urls(resp).unwrap(), vec!["https://a", "https://b"]);
    }

    #[test]
    fn empty_data_is_invalid() {
        let resp: ImageResponse = serde_json::from_str(r#"{"data":[]}"#).unwrap();
        assert!(matches!(
            collect_urls(resp),
            Err(SynthesisError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let c = OpenAiImageClient::new("https://api.example.com/v1/", "k", "512x512", 5).unwrap();
        assert_eq!(c.endpoint(), "https://api.example.com/v1/images/generations");
    }
}
