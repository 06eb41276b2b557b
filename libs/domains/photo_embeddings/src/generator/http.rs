use async_trait::async_trait;
use core_config::{ConfigError, env_optional, env_or_default};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::EmbeddingGenerator;
use crate::error::{EmbeddingError, EmbeddingResult};

pub const DEFAULT_MODEL: &str = "clip-vit-b-32";

/// Settings for an OpenAI-compatible image embedding endpoint
#[derive(Debug, Clone)]
pub struct HttpEmbedderConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
}

impl HttpEmbedderConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// `None` when `EMBEDDING_API_URL` is unset, which leaves the generator
    /// unconfigured.
    ///
    /// - EMBEDDING_API_URL: base URL, `/embeddings` is appended
    /// - EMBEDDING_API_KEY: optional bearer token
    /// - EMBEDDING_MODEL: defaults to `clip-vit-b-32`
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(base_url) = env_optional("EMBEDDING_API_URL") else {
            return Ok(None);
        };

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                key: "EMBEDDING_API_URL".to_string(),
                details: format!("expected an http(s) URL, got {}", base_url),
            });
        }

        Ok(Some(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: env_optional("EMBEDDING_API_KEY"),
            model: env_or_default("EMBEDDING_MODEL", DEFAULT_MODEL),
        }))
    }
}

/// Image embedder speaking the OpenAI embeddings wire format.
pub struct HttpImageEmbedder {
    client: Client,
    config: HttpEmbedderConfig,
}

impl HttpImageEmbedder {
    pub fn new(config: HttpEmbedderConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    dimensions: u32,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingGenerator for HttpImageEmbedder {
    async fn generate(&self, image_ref: &str, dimension: u32) -> EmbeddingResult<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.config.model,
            input: image_ref,
            dimensions: dimension,
        };

        let mut builder = self
            .client
            .post(format!("{}/embeddings", self.config.base_url))
            .json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Generation(format!(
                "embedding API error ({}): {}",
                status, error_text
            )));
        }

        let body: EmbeddingResponse = response.json().await?;
        let vector = body
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| EmbeddingError::Generation("No embedding returned".to_string()))?;

        debug!(image_ref, dimension, "Generated embedding");
        Ok(vector)
    }
}
