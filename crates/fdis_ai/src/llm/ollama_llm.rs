use std::time::Duration;

use fdis_core::error::AppError;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{CompletionRequest, Llm};
use crate::ollama::{service_error, OllamaClient};

#[derive(Debug, Clone)]
pub struct OllamaLlm {
    client: OllamaClient,
    timeout: Duration,
}

impl OllamaLlm {
    pub fn new(client: OllamaClient) -> Self {
        Self {
            client,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
struct GenerateOptions {
    temperature: f32,
    top_p: f32,
    repeat_penalty: f32,
    num_predict: u32,
}

#[derive(Debug, Clone, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    system: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

impl Llm for OllamaLlm {
    fn complete(&self, req: &CompletionRequest<'_>) -> Result<String, AppError> {
        let url = format!("{}/api/generate", self.client.base_url());
        let body = GenerateRequest {
            model: req.model,
            system: req.system,
            prompt: req.prompt,
            stream: false,
            options: GenerateOptions {
                temperature: req.params.temperature,
                top_p: req.params.top_p,
                repeat_penalty: req.params.repeat_penalty,
                num_predict: req.params.max_output_tokens,
            },
        };
        let body = serde_json::to_value(body).map_err(|e| {
            AppError::new("GENERATION_FAILED", "Failed to encode generation request")
                .with_details(e.to_string())
        })?;

        let resp = ureq::post(&url)
            .timeout(self.timeout)
            .send_json(body)
            .map_err(|e| service_error("GENERATION_FAILED", "generation", e))?;

        let v: GenerateResponse = resp.into_json().map_err(|e| {
            AppError::new("GENERATION_FAILED", "Failed to decode generation response")
                .with_details(e.to_string())
        })?;
        debug!(model = req.model, chars = v.response.len(), "generation returned");
        Ok(v.response)
    }
}
