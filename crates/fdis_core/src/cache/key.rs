use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Frozen sampling parameters. Part of every cache key.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_p: f32,
    pub repeat_penalty: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            top_p: 1.0,
            repeat_penalty: 1.0,
            max_output_tokens: 1024,
        }
    }
}

impl GenerationParams {
    fn canonical(&self) -> String {
        // Fixed precision; -0.0 folds into 0.0.
        format!(
            "temperature={:.4};top_p={:.4};repeat_penalty={:.4};max_output_tokens={}",
            self.temperature.abs(),
            self.top_p,
            self.repeat_penalty,
            self.max_output_tokens
        )
    }
}

/// Hex SHA-256 over (rendered prompt, model, parameters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PromptCacheKey(String);

impl PromptCacheKey {
    pub fn compute(rendered_prompt: &str, model: &str, params: &GenerationParams) -> Self {
        let mut hasher = Sha256::new();
        // Length-prefixed fields.
        for part in [rendered_prompt, model, params.canonical().as_str()] {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Accepts only well-formed digests, so keys are safe to use as file names.
    pub fn parse(raw: &str) -> Option<Self> {
        let ok = raw.len() == 64 && raw.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        ok.then(|| Self(raw.to_string()))
    }
}

impl std::fmt::Display for PromptCacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
