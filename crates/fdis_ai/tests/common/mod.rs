#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use fdis_ai::answer::{AnswerGenerator, GeneratorSettings};
use fdis_ai::embeddings::Embedder;
use fdis_ai::engine::{QueryEngine, RetrievalSettings};
use fdis_ai::index::VectorIndex;
use fdis_ai::llm::{CompletionRequest, Llm};
use fdis_core::cache::{AnswerCache, CachedAnswer, PromptCacheKey};
use fdis_core::domain::ChunkRecord;
use fdis_core::error::AppError;

pub const DIMS: usize = 4;

/// Same unit vector for every input; ranking comes from the index fixture.
pub struct FixedEmbedder {
    pub calls: AtomicUsize,
}

impl FixedEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

impl Embedder for FixedEmbedder {
    fn embed(&self, _model: &str, _input: &str) -> Result<Vec<f32>, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![0.5; DIMS])
    }
}

pub struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn embed(&self, _model: &str, _input: &str) -> Result<Vec<f32>, AppError> {
        Err(AppError::new("EMBEDDING_FAILED", "Failed to call embeddings endpoint").with_retryable(true))
    }
}

/// Returns the first `k` fixture records, already in descending-score order.
pub struct StaticIndex {
    pub results: Vec<ChunkRecord>,
    pub requested_k: Mutex<Vec<usize>>,
}

impl StaticIndex {
    pub fn new(results: Vec<ChunkRecord>) -> Self {
        Self {
            results,
            requested_k: Mutex::new(Vec::new()),
        }
    }
}

impl VectorIndex for StaticIndex {
    fn dims(&self) -> Option<usize> {
        Some(DIMS)
    }

    fn search(&self, _query: &[f32], k: usize) -> Result<Vec<ChunkRecord>, AppError> {
        self.requested_k.lock().unwrap().push(k);
        Ok(self.results.iter().take(k).cloned().collect())
    }
}

pub struct ScriptedLlm {
    pub output: String,
    pub calls: AtomicUsize,
    pub last_prompt: Mutex<Option<String>>,
}

impl ScriptedLlm {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    pub fn answering(answer: &str) -> Self {
        Self::new(format!(
            "<ANSWER>\n{answer}\n</ANSWER>\n---\n<SOURCES>\nSOURCE [3] — Someone Else, Annual Report 2019, Pages 1–2"
        ))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Llm for ScriptedLlm {
    fn complete(&self, req: &CompletionRequest<'_>) -> Result<String, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap() = Some(req.prompt.to_string());
        Ok(self.output.clone())
    }
}

pub struct FailingLlm {
    pub calls: AtomicUsize,
}

impl Llm for FailingLlm {
    fn complete(&self, _req: &CompletionRequest<'_>) -> Result<String, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AppError::new("GENERATION_FAILED", "generation request failed").with_details("status=500"))
    }
}

pub struct BrokenCache;

impl AnswerCache for BrokenCache {
    fn get(&self, _key: &PromptCacheKey) -> Result<Option<CachedAnswer>, AppError> {
        Err(AppError::new("CACHE_IO_FAILED", "Failed to read answer cache entry"))
    }

    fn put(&self, _entry: &CachedAnswer) -> Result<(), AppError> {
        Err(AppError::new("CACHE_IO_FAILED", "Failed to write answer cache entry"))
    }
}

/// About 300 characters of report-like prose.
pub fn prose(topic: &str) -> String {
    format!(
        "{topic}: The Group may face heightened credit losses if macroeconomic conditions deteriorate. \
         Management monitors liquidity coverage, funding concentration and refinancing needs closely, \
         and stress testing indicates capital could remain above regulatory minimums under adverse scenarios."
    )
}

pub fn chunk(id: &str, company: &str, year: i64, score: f32, text: &str) -> ChunkRecord {
    ChunkRecord::new(id, company, year, "annual_report", text)
        .with_pages(10, 11)
        .with_score(score)
}

pub fn settings() -> RetrievalSettings {
    RetrievalSettings::new("mock-embed")
}

pub fn generator(llm: Arc<dyn Llm>) -> AnswerGenerator {
    AnswerGenerator::new(llm, GeneratorSettings::new("mock-llm"))
}

pub fn engine(index: Vec<ChunkRecord>, llm: Arc<dyn Llm>) -> QueryEngine {
    QueryEngine::new(
        Arc::new(FixedEmbedder::new()),
        Arc::new(StaticIndex::new(index)),
        generator(llm),
        settings(),
    )
}
