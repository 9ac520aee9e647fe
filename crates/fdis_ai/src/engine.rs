// End-to-end question answering:
// embed, search, filter, assemble, gate, then refuse or generate.

use std::sync::Arc;

use fdis_core::cache::{AnswerCache, FileAnswerCache, MemoryAnswerCache, SqliteAnswerCache};
use fdis_core::confidence::{ConfidenceGate, ConfidenceVerdict};
use fdis_core::domain::{evidence_blocks, ChunkRecord, QueryRequest, QueryResponse};
use fdis_core::error::AppError;
use fdis_core::evidence::{assemble_context, AssembledContext, DEFAULT_MAX_CONTEXT_CHARS};
use fdis_core::filter::MetadataFilter;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::answer::{AnswerGenerator, GenerationSource, GeneratorSettings};
use crate::config::{CacheBackend, EngineConfig};
use crate::embeddings::{Embedder, OllamaEmbedder};
use crate::index::{FlatIndex, VectorIndex};
use crate::llm::OllamaLlm;
use crate::ollama::OllamaClient;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalSettings {
    pub embed_model: String,
    pub max_context_chars: usize,
    pub overfetch_factor: usize,
    pub report_type: Option<String>,
    pub gate: ConfidenceGate,
    pub enforce_confidence_gate: bool,
}

impl RetrievalSettings {
    pub fn new(embed_model: impl Into<String>) -> Self {
        Self {
            embed_model: embed_model.into(),
            max_context_chars: DEFAULT_MAX_CONTEXT_CHARS,
            overfetch_factor: 2,
            report_type: Some("annual_report".to_string()),
            gate: ConfidenceGate::default(),
            enforce_confidence_gate: false,
        }
    }
}

/// Ranked, filtered, truncated evidence for one request.
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub chunks: Vec<ChunkRecord>,
    pub context: AssembledContext,
    pub verdict: ConfidenceVerdict,
    pub candidates: usize,
}

/// Where a request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    NoEvidence,
    LowConfidence,
    Generator(GenerationSource),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryTrace {
    pub candidates: usize,
    pub retrieved: usize,
    pub context_chars: usize,
    pub verdict: ConfidenceVerdict,
    pub disposition: Disposition,
}

impl QueryTrace {
    pub fn generation_called(&self) -> bool {
        self.disposition == Disposition::Generator(GenerationSource::Generated)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryRun {
    pub response: QueryResponse,
    pub trace: QueryTrace,
}

/// Request pipeline over shared, read-only services.
pub struct QueryEngine {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    generator: AnswerGenerator,
    settings: RetrievalSettings,
    ollama: Option<OllamaClient>,
}

impl QueryEngine {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        generator: AnswerGenerator,
        settings: RetrievalSettings,
    ) -> Self {
        Self {
            embedder,
            index,
            generator,
            settings,
            ollama: None,
        }
    }

    /// Attach the Ollama server behind the injected services, for `health_check`.
    pub fn with_ollama(mut self, client: OllamaClient) -> Self {
        self.ollama = Some(client);
        self
    }

    /// Probe the Ollama server, when one is attached. Engines built from
    /// injected services alone have nothing to probe.
    pub fn health_check(&self) -> Result<(), AppError> {
        match &self.ollama {
            Some(client) => client.health_check(),
            None => Ok(()),
        }
    }

    /// Wire Ollama clients, load the index and open the configured cache.
    pub fn from_config(config: &EngineConfig) -> Result<Self, AppError> {
        config.validate()?;
        let client = OllamaClient::new(&config.ollama.base_url)?
            .with_health_timeout(config.ollama.health_timeout());
        let embedder = OllamaEmbedder::new(client.clone()).with_timeout(config.ollama.embed_timeout());
        let llm = OllamaLlm::new(client.clone()).with_timeout(config.ollama.generate_timeout());
        let index = FlatIndex::open(&config.retrieval.index_dir)?;

        let mut generator = AnswerGenerator::new(
            Arc::new(llm),
            GeneratorSettings {
                model: config.ollama.generate_model.clone(),
                params: config.generation.params(),
                min_evidence_chars: config.generation.min_evidence_chars,
                min_answer_chars: config.generation.min_answer_chars,
            },
        );
        if let Some(cache) = open_cache(config)? {
            generator = generator.with_cache(cache);
        }

        let settings = RetrievalSettings {
            embed_model: config.ollama.embed_model.clone(),
            max_context_chars: config.retrieval.max_context_chars,
            overfetch_factor: config.retrieval.overfetch_factor,
            report_type: config.retrieval.report_type_filter().map(str::to_string),
            gate: config.retrieval.confidence_gate(),
            enforce_confidence_gate: config.retrieval.enforce_confidence_gate,
        };
        Ok(Self::new(Arc::new(embedder), Arc::new(index), generator, settings).with_ollama(client))
    }

    pub fn settings(&self) -> &RetrievalSettings {
        &self.settings
    }

    pub fn filter_for(&self, request: &QueryRequest) -> MetadataFilter {
        let mut filter = MetadataFilter::new();
        if let Some(company) = &request.company {
            filter.insert("company", company.as_str());
        }
        if let Some(year) = request.fiscal_year {
            filter.insert("fiscal_year", year);
        }
        if let Some(report_type) = &self.settings.report_type {
            filter.insert("report_type", report_type.as_str());
        }
        filter
    }

    /// EMBED, SEARCH, FILTER and ASSEMBLE for a validated request.
    pub fn retrieve(&self, request: &QueryRequest) -> Result<Retrieval, AppError> {
        request.validate()?;
        let top_k = request.top_k as usize;

        let query_vec = self.embedder.embed(&self.settings.embed_model, request.query.trim())?;
        if let Some(dims) = self.index.dims() {
            if query_vec.len() != dims {
                return Err(AppError::new(
                    "EMBEDDING_FAILED",
                    "Query embedding dims do not match index dims",
                )
                .with_details(format!("index_dims={dims}; query_dims={}", query_vec.len())));
            }
        }

        let candidates = self
            .index
            .search(&query_vec, top_k.saturating_mul(self.settings.overfetch_factor))?;
        let candidate_count = candidates.len();

        let mut chunks = self.filter_for(request).apply(candidates);
        chunks.truncate(top_k);

        let context = assemble_context(&chunks, self.settings.max_context_chars);
        let verdict = self.settings.gate.evaluate_records(&chunks);
        debug!(
            candidates = candidate_count,
            kept = chunks.len(),
            context_blocks = context.included,
            context_chars = context.char_len(),
            confident = verdict.confident,
            gate_reason = ?verdict.reason,
            "evidence retrieved"
        );

        Ok(Retrieval {
            chunks,
            context,
            verdict,
            candidates: candidate_count,
        })
    }

    pub fn answer_question(&self, request: &QueryRequest) -> Result<QueryResponse, AppError> {
        self.run(request).map(|r| r.response)
    }

    /// Full pipeline, with a trace of how the request was decided.
    pub fn run(&self, request: &QueryRequest) -> Result<QueryRun, AppError> {
        let retrieval = self.retrieve(request)?;
        let mut trace = QueryTrace {
            candidates: retrieval.candidates,
            retrieved: retrieval.chunks.len(),
            context_chars: retrieval.context.char_len(),
            verdict: retrieval.verdict,
            disposition: Disposition::NoEvidence,
        };

        if retrieval.chunks.is_empty() || retrieval.context.is_empty() {
            info!(candidates = trace.candidates, "no evidence after filtering; refusing");
            return Ok(QueryRun {
                response: QueryResponse::refusal(),
                trace,
            });
        }
        if self.settings.enforce_confidence_gate && !retrieval.verdict.confident {
            info!(reason = ?retrieval.verdict.reason, "retrieval not confident; refusing");
            trace.disposition = Disposition::LowConfidence;
            return Ok(QueryRun {
                response: QueryResponse::refusal(),
                trace,
            });
        }

        let generation = self
            .generator
            .generate(request.query.trim(), &retrieval.context.text)?;
        trace.disposition = Disposition::Generator(generation.source);

        let answer = generation.answer;
        let response = if answer.is_refusal() {
            QueryResponse::refusal()
        } else {
            QueryResponse {
                answer: answer.answer,
                evidence: evidence_blocks(&retrieval.chunks),
                sources: answer.sources,
            }
        };
        info!(
            retrieved = trace.retrieved,
            refused = response.is_refusal(),
            disposition = ?trace.disposition,
            "query answered"
        );
        Ok(QueryRun { response, trace })
    }
}

fn open_cache(config: &EngineConfig) -> Result<Option<Arc<dyn AnswerCache>>, AppError> {
    let cache: Arc<dyn AnswerCache> = match config.cache.backend {
        CacheBackend::None => return Ok(None),
        CacheBackend::Memory => Arc::new(MemoryAnswerCache::new()),
        CacheBackend::File => Arc::new(FileAnswerCache::open(config.cache.path.clone())),
        CacheBackend::Sqlite => {
            if let Some(parent) = config.cache.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AppError::new("CACHE_IO_FAILED", "Failed to create answer cache directory")
                        .with_details(format!("path={}; err={}", parent.display(), e))
                })?;
            }
            Arc::new(SqliteAnswerCache::open(&config.cache.path)?)
        }
    };
    Ok(Some(cache))
}
