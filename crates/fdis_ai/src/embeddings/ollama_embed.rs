use std::time::Duration;

use fdis_core::error::AppError;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Embedder;
use crate::index::similarity;
use crate::ollama::{service_error, OllamaClient};

const MAX_INPUT_CHARS: usize = 12_000;

#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: OllamaClient,
    timeout: Duration,
}

impl OllamaEmbedder {
    pub fn new(client: OllamaClient) -> Self {
        Self {
            client,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f32>,
}

impl Embedder for OllamaEmbedder {
    /// Returns an L2-normalized vector.
    fn embed(&self, model: &str, input: &str) -> Result<Vec<f32>, AppError> {
        let prompt = match input.char_indices().nth(MAX_INPUT_CHARS) {
            Some((i, _)) => &input[..i],
            None => input,
        };

        let url = format!("{}/api/embeddings", self.client.base_url());
        let req = EmbeddingsRequest { model, prompt };
        let body = serde_json::to_value(req).map_err(|e| {
            AppError::new("EMBEDDING_FAILED", "Failed to encode embeddings request")
                .with_details(e.to_string())
        })?;
        let resp = ureq::post(&url)
            .timeout(self.timeout)
            .send_json(body)
            .map_err(|e| service_error("EMBEDDING_FAILED", "embeddings", e))?;

        let v: EmbeddingsResponse = resp.into_json().map_err(|e| {
            AppError::new("EMBEDDING_FAILED", "Failed to decode embeddings response")
                .with_details(e.to_string())
        })?;
        if v.embedding.is_empty() {
            return Err(AppError::new(
                "EMBEDDING_FAILED",
                "Embeddings response was empty",
            ));
        }
        debug!(model, dims = v.embedding.len(), "query embedded");

        similarity::normalized(v.embedding).ok_or_else(|| {
            AppError::new("EMBEDDING_FAILED", "Query embedding norm is zero")
        })
    }
}
