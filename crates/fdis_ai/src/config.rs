// Engine configuration, read from a TOML file.
//
// Every field has a default, so an empty file (or no file) is a valid
// configuration pointing at a local Ollama and `data/` under the working
// directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fdis_core::cache::GenerationParams;
use fdis_core::confidence::{ConfidenceGate, DEFAULT_MIN_MAX_SCORE, DEFAULT_MIN_SPREAD};
use fdis_core::error::AppError;
use fdis_core::evidence::DEFAULT_MAX_CONTEXT_CHARS;
use serde::{Deserialize, Serialize};

use crate::ollama::DEFAULT_BASE_URL;

pub const DEFAULT_MIN_EVIDENCE_CHARS: usize = 400;
pub const DEFAULT_MIN_ANSWER_CHARS: usize = 20;
pub const MAX_OVERFETCH_FACTOR: usize = 10;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OllamaConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_embed_model")]
    pub embed_model: String,
    #[serde(default = "default_generate_model")]
    pub generate_model: String,
    #[serde(default = "default_embed_timeout_ms")]
    pub embed_timeout_ms: u64,
    #[serde(default = "default_generate_timeout_ms")]
    pub generate_timeout_ms: u64,
    #[serde(default = "default_health_timeout_ms")]
    pub health_timeout_ms: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            embed_model: default_embed_model(),
            generate_model: default_generate_model(),
            embed_timeout_ms: default_embed_timeout_ms(),
            generate_timeout_ms: default_generate_timeout_ms(),
            health_timeout_ms: default_health_timeout_ms(),
        }
    }
}

impl OllamaConfig {
    pub fn embed_timeout(&self) -> Duration {
        Duration::from_millis(self.embed_timeout_ms)
    }

    pub fn generate_timeout(&self) -> Duration {
        Duration::from_millis(self.generate_timeout_ms)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalConfig {
    #[serde(default = "default_index_dir")]
    pub index_dir: PathBuf,
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    /// Candidates fetched per requested result, to leave room for filtering.
    #[serde(default = "default_overfetch_factor")]
    pub overfetch_factor: usize,
    /// Report type every query is restricted to; empty disables the constraint.
    #[serde(default = "default_report_type")]
    pub default_report_type: String,
    #[serde(default = "default_min_max_score")]
    pub min_max_score: f32,
    #[serde(default = "default_min_spread")]
    pub min_spread: f32,
    /// When false the score gate is evaluated and logged only.
    #[serde(default)]
    pub enforce_confidence_gate: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            index_dir: default_index_dir(),
            max_context_chars: default_max_context_chars(),
            overfetch_factor: default_overfetch_factor(),
            default_report_type: default_report_type(),
            min_max_score: default_min_max_score(),
            min_spread: default_min_spread(),
            enforce_confidence_gate: false,
        }
    }
}

impl RetrievalConfig {
    pub fn confidence_gate(&self) -> ConfidenceGate {
        ConfidenceGate::new(self.min_max_score, self.min_spread)
    }

    pub fn report_type_filter(&self) -> Option<&str> {
        let t = self.default_report_type.trim();
        (!t.is_empty()).then_some(t)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationConfig {
    #[serde(default = "default_min_evidence_chars")]
    pub min_evidence_chars: usize,
    #[serde(default = "default_min_answer_chars")]
    pub min_answer_chars: usize,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            min_evidence_chars: default_min_evidence_chars(),
            min_answer_chars: default_min_answer_chars(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

impl GenerationConfig {
    /// Sampling is pinned; only the output ceiling is configurable.
    pub fn params(&self) -> GenerationParams {
        GenerationParams {
            max_output_tokens: self.max_output_tokens,
            ..GenerationParams::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    None,
    Memory,
    File,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    #[serde(default = "default_cache_backend")]
    pub backend: CacheBackend,
    /// Directory for `file`, database path for `sqlite`.
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: default_cache_backend(),
            path: default_cache_path(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}
fn default_embed_model() -> String {
    "all-minilm".to_string()
}
fn default_generate_model() -> String {
    "gpt-oss:20b".to_string()
}
fn default_embed_timeout_ms() -> u64 {
    10_000
}
fn default_generate_timeout_ms() -> u64 {
    120_000
}
fn default_health_timeout_ms() -> u64 {
    800
}
fn default_index_dir() -> PathBuf {
    PathBuf::from("data/index")
}
fn default_max_context_chars() -> usize {
    DEFAULT_MAX_CONTEXT_CHARS
}
fn default_overfetch_factor() -> usize {
    2
}
fn default_report_type() -> String {
    "annual_report".to_string()
}
fn default_min_max_score() -> f32 {
    DEFAULT_MIN_MAX_SCORE
}
fn default_min_spread() -> f32 {
    DEFAULT_MIN_SPREAD
}
fn default_min_evidence_chars() -> usize {
    DEFAULT_MIN_EVIDENCE_CHARS
}
fn default_min_answer_chars() -> usize {
    DEFAULT_MIN_ANSWER_CHARS
}
fn default_max_output_tokens() -> u32 {
    GenerationParams::default().max_output_tokens
}
fn default_cache_backend() -> CacheBackend {
    CacheBackend::Sqlite
}
fn default_cache_path() -> PathBuf {
    PathBuf::from("data/answer_cache.db")
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, AppError> {
        let config: EngineConfig = toml::from_str(raw).map_err(|e| {
            AppError::new("CONFIG_INVALID", "Failed to parse engine configuration")
                .with_details(e.to_string())
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            AppError::new("CONFIG_INVALID", "Failed to read engine configuration")
                .with_details(format!("path={}; err={}", path.display(), e))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let invalid = |msg: &str, details: String| {
            Err(AppError::new("CONFIG_INVALID", msg.to_string()).with_details(details))
        };
        if !(1..=MAX_OVERFETCH_FACTOR).contains(&self.retrieval.overfetch_factor) {
            return invalid(
                "overfetch_factor is out of range",
                format!(
                    "overfetch_factor={}; allowed=1..={MAX_OVERFETCH_FACTOR}",
                    self.retrieval.overfetch_factor
                ),
            );
        }
        if self.retrieval.max_context_chars == 0 {
            return invalid("max_context_chars must be positive", "max_context_chars=0".into());
        }
        if !(0.0..=1.0).contains(&self.retrieval.min_spread) {
            return invalid(
                "min_spread must be within 0..=1",
                format!("min_spread={}", self.retrieval.min_spread),
            );
        }
        if self.ollama.embed_model.trim().is_empty() || self.ollama.generate_model.trim().is_empty() {
            return invalid(
                "model names must not be empty",
                format!(
                    "embed_model={:?}; generate_model={:?}",
                    self.ollama.embed_model, self.ollama.generate_model
                ),
            );
        }
        if self.ollama.embed_timeout_ms == 0 || self.ollama.generate_timeout_ms == 0 {
            return invalid(
                "service timeouts must be positive",
                format!(
                    "embed_timeout_ms={}; generate_timeout_ms={}",
                    self.ollama.embed_timeout_ms, self.ollama.generate_timeout_ms
                ),
            );
        }
        if self.generation.max_output_tokens == 0 {
            return invalid("max_output_tokens must be positive", "max_output_tokens=0".into());
        }
        Ok(())
    }
}
