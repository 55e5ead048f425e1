//! Embedding service boundary.
//!
//! [`Embedder`] maps a signature text to a fixed-length vector. The pipeline
//! never retries: a failed call surfaces as [`EmbedError`] and the caller
//! decides what to do with the batch.
//!
//! [`HttpEmbedder`] talks to an OpenAI-compatible `POST {endpoint}/embeddings`
//! API (OpenAI, Azure OpenAI / AI inference, most self-hosted gateways).

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::config::{AuthScheme, EmbeddingConfig};

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("embedding service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),
    #[error("embedding service misconfigured: {0}")]
    Config(String),
}

pub trait Embedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    /// Dimensionality the store index was provisioned with.
    fn dims(&self) -> usize;

    fn model_name(&self) -> &str;
}

impl<E: Embedder + ?Sized> Embedder for &E {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        (**self).embed(text)
    }
    fn dims(&self) -> usize {
        (**self).dims()
    }
    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}

impl<E: Embedder + ?Sized> Embedder for Box<E> {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        (**self).embed(text)
    }
    fn dims(&self) -> usize {
        (**self).dims()
    }
    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}

pub struct HttpEmbedder {
    client: reqwest::blocking::Client,
    url: String,
    api_key: Option<String>,
    auth: AuthScheme,
    model: String,
    dims: usize,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbedError> {
        let endpoint = config
            .endpoint
            .as_deref()
            .ok_or_else(|| EmbedError::Config("embedding.endpoint is not set".into()))?;
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: embeddings_url(endpoint),
            api_key: config.api_key.clone(),
            auth: config.auth,
            model: config.model.clone(),
            dims: config.dims,
        })
    }
}

fn embeddings_url(endpoint: &str) -> String {
    let base = endpoint.trim_end_matches('/');
    if base.ends_with("/embeddings") {
        base.to_string()
    } else {
        format!("{base}/embeddings")
    }
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

impl Embedder for HttpEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });
        let mut req = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            req = match self.auth {
                AuthScheme::Bearer => req.bearer_auth(key),
                AuthScheme::ApiKey => req.header("api-key", key),
            };
        }

        let resp = req.send()?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(EmbedError::Status { status: status.as_u16(), body });
        }
        let parsed: EmbeddingResponse = resp.json()?;
        tracing::debug!(model = %self.model, chars = text.len(), "embedded signature");
        parse_first_embedding(parsed)
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn parse_first_embedding(resp: EmbeddingResponse) -> Result<Vec<f32>, EmbedError> {
    resp.data
        .into_iter()
        .next()
        .map(|item| item.embedding)
        .ok_or_else(|| EmbedError::InvalidResponse("missing data[0].embedding".into()))
}
