use fdis_core::cache::GenerationParams;
use fdis_core::error::AppError;

/// One synchronous text-completion call.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub model: &'a str,
    pub system: &'a str,
    pub prompt: &'a str,
    pub params: &'a GenerationParams,
}

pub trait Llm: Send + Sync {
    /// Failures are fatal for the request; implementations must not map them to text.
    fn complete(&self, req: &CompletionRequest<'_>) -> Result<String, AppError>;
}

pub mod ollama_llm;

pub use ollama_llm::OllamaLlm;
