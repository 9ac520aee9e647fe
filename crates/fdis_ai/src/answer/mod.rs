use std::sync::Arc;

use fdis_core::cache::{AnswerCache, CachedAnswer, GenerationParams, PromptCacheKey};
use fdis_core::domain::{AnswerOutcome, GeneratedAnswer, REFUSAL_TEXT};
use fdis_core::error::AppError;
use fdis_core::evidence::citations::reconstruct_citations;
use fdis_core::evidence::evidence_char_len;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{DEFAULT_MIN_ANSWER_CHARS, DEFAULT_MIN_EVIDENCE_CHARS};
use crate::llm::{CompletionRequest, Llm};

pub mod guardrails;
pub mod prompts;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorSettings {
    pub model: String,
    pub params: GenerationParams,
    pub min_evidence_chars: usize,
    pub min_answer_chars: usize,
}

impl GeneratorSettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            params: GenerationParams::default(),
            min_evidence_chars: DEFAULT_MIN_EVIDENCE_CHARS,
            min_answer_chars: DEFAULT_MIN_ANSWER_CHARS,
        }
    }
}

/// How a generation request was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationSource {
    /// Refused by an evidence gate before any service call.
    Gated,
    CacheHit,
    Generated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub answer: GeneratedAnswer,
    pub source: GenerationSource,
}

/// Grounded answering over a pre-built evidence context.
pub struct AnswerGenerator {
    llm: Arc<dyn Llm>,
    cache: Option<Arc<dyn AnswerCache>>,
    settings: GeneratorSettings,
}

impl AnswerGenerator {
    pub fn new(llm: Arc<dyn Llm>, settings: GeneratorSettings) -> Self {
        Self {
            llm,
            cache: None,
            settings,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn AnswerCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    pub fn cache_key(&self, question: &str, evidence_context: &str) -> PromptCacheKey {
        self.render(question, evidence_context).2
    }

    fn render(&self, question: &str, evidence_context: &str) -> (String, String, PromptCacheKey) {
        let system = prompts::system_prompt();
        let user = prompts::user_prompt(question, evidence_context);
        let key = PromptCacheKey::compute(
            &prompts::rendered_prompt(&system, &user),
            &self.settings.model,
            &self.settings.params,
        );
        (system, user, key)
    }

    pub fn generate(&self, question: &str, evidence_context: &str) -> Result<Generation, AppError> {
        if evidence_context.trim().is_empty() {
            debug!("evidence context empty; refusing without generation");
            return Ok(gated());
        }
        let evidence_chars = evidence_char_len(evidence_context);
        if evidence_chars < self.settings.min_evidence_chars {
            debug!(
                evidence_chars,
                min = self.settings.min_evidence_chars,
                "evidence below minimum; refusing without generation"
            );
            return Ok(gated());
        }

        let (system, user, key) = self.render(question, evidence_context);

        if let Some(hit) = self.cache_get(&key) {
            if hit.result.is_refusal() && evidence_chars >= self.settings.min_evidence_chars {
                info!(key = %key, evidence_chars, "cached refusal bypassed; regenerating");
            } else {
                debug!(key = %key, "answer cache hit");
                return Ok(Generation {
                    answer: hit.result,
                    source: GenerationSource::CacheHit,
                });
            }
        }

        let raw = self.llm.complete(&CompletionRequest {
            model: &self.settings.model,
            system: &system,
            prompt: &user,
            params: &self.settings.params,
        })?;

        let answer = self.interpret(&raw, evidence_context);
        debug!(key = %key, outcome = ?answer.outcome, "generation interpreted");
        self.cache_put(&CachedAnswer::new(key, &self.settings.model, answer.clone()));

        Ok(Generation {
            answer,
            source: GenerationSource::Generated,
        })
    }

    fn interpret(&self, raw: &str, evidence_context: &str) -> GeneratedAnswer {
        let Some(text) = guardrails::clean_answer(raw, self.settings.min_answer_chars) else {
            return GeneratedAnswer::refusal(AnswerOutcome::ExtractionFailed);
        };
        if text == REFUSAL_TEXT || text.trim_matches('"') == REFUSAL_TEXT {
            return GeneratedAnswer::refusal(AnswerOutcome::Refused);
        }
        GeneratedAnswer {
            answer: text,
            sources: Some(reconstruct_citations(evidence_context)),
            outcome: AnswerOutcome::Answered,
        }
    }

    // Cache faults never fail the request.
    fn cache_get(&self, key: &PromptCacheKey) -> Option<CachedAnswer> {
        let cache = self.cache.as_ref()?;
        match cache.get(key) {
            Ok(hit) => hit,
            Err(e) => {
                warn!(key = %key, error = %e, "answer cache read failed; treating as miss");
                None
            }
        }
    }

    fn cache_put(&self, entry: &CachedAnswer) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };
        if let Err(e) = cache.put(entry) {
            warn!(key = %entry.key, error = %e, "answer cache write failed; not persisted");
        }
    }
}

fn gated() -> Generation {
    Generation {
        answer: GeneratedAnswer::refusal(AnswerOutcome::Refused),
        source: GenerationSource::Gated,
    }
}
