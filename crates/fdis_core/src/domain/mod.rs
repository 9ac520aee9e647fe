use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// The only value signalling "insufficient evidence". Compare by exact equality.
pub const REFUSAL_TEXT: &str = "I do not have enough information in the provided documents.";

pub const TOP_K_MIN: u32 = 1;
pub const TOP_K_MAX: u32 = 20;
pub const TOP_K_DEFAULT: u32 = 5;

pub fn is_refusal(answer: &str) -> bool {
    answer == REFUSAL_TEXT
}

/// A retrieval unit produced by offline indexing. Read-only to the query path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkRecord {
    #[serde(rename = "chunk_id")]
    pub id: String,
    pub company: String,
    pub fiscal_year: i64,
    pub report_type: String,
    #[serde(default)]
    pub page_start: Option<u32>,
    #[serde(default)]
    pub page_end: Option<u32>,
    pub text: String,
    // Only populated by a search call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    // Inherited document metadata (ticker, sector, country, document_id, ...).
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ChunkRecord {
    pub fn new(
        id: impl Into<String>,
        company: impl Into<String>,
        fiscal_year: i64,
        report_type: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            company: company.into(),
            fiscal_year,
            report_type: report_type.into(),
            page_start: None,
            page_end: None,
            text: text.into(),
            score: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_pages(mut self, start: u32, end: u32) -> Self {
        self.page_start = Some(start.min(end));
        self.page_end = Some(start.max(end));
        self
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Human-readable document label, e.g. `Annual Report 2024`.
    pub fn document_label(&self) -> String {
        format!("{} {}", humanize_report_type(&self.report_type), self.fiscal_year)
    }

    /// Page range as rendered in evidence and citations; unknown ends render as `?`.
    pub fn page_range(&self) -> String {
        let fmt = |p: Option<u32>| p.map(|n| n.to_string()).unwrap_or_else(|| "?".to_string());
        format!("{}\u{2013}{}", fmt(self.page_start), fmt(self.page_end))
    }
}

fn humanize_report_type(report_type: &str) -> String {
    report_type
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Caller-facing request. Filters are exact-match and optional.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub fiscal_year: Option<i64>,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
}

fn default_top_k() -> u32 {
    TOP_K_DEFAULT
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            company: None,
            fiscal_year: None,
            top_k: TOP_K_DEFAULT,
        }
    }

    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    pub fn with_fiscal_year(mut self, fiscal_year: i64) -> Self {
        self.fiscal_year = Some(fiscal_year);
        self
    }

    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.query.trim().is_empty() {
            return Err(AppError::invalid_query("Question must not be empty"));
        }
        if !(TOP_K_MIN..=TOP_K_MAX).contains(&self.top_k) {
            return Err(AppError::invalid_query("top_k is out of range")
                .with_details(format!("top_k={}; allowed={TOP_K_MIN}..={TOP_K_MAX}", self.top_k)));
        }
        if let Some(company) = &self.company {
            if company.trim().is_empty() {
                return Err(AppError::invalid_query("Company filter must not be blank"));
            }
        }
        Ok(())
    }
}

/// A 1-based citation unit derived from a ranked chunk at assembly time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EvidenceBlock {
    pub source_id: u32,
    pub company: String,
    pub document: String,
    pub pages: String,
    pub text: String,
}

impl EvidenceBlock {
    pub fn from_chunk(source_id: u32, chunk: &ChunkRecord) -> Self {
        Self {
            source_id,
            company: chunk.company.clone(),
            document: chunk.document_label(),
            pages: chunk.page_range(),
            text: chunk.text.clone(),
        }
    }
}

/// Number chunks 1..=n in the order given.
pub fn evidence_blocks(chunks: &[ChunkRecord]) -> Vec<EvidenceBlock> {
    chunks
        .iter()
        .enumerate()
        .map(|(i, c)| EvidenceBlock::from_chunk(i as u32 + 1, c))
        .collect()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnswerOutcome {
    Answered,
    Refused,
    ExtractionFailed,
}

/// Output of one generation attempt; this is what the answer cache stores.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeneratedAnswer {
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
    pub outcome: AnswerOutcome,
}

impl GeneratedAnswer {
    pub fn refusal(outcome: AnswerOutcome) -> Self {
        Self {
            answer: REFUSAL_TEXT.to_string(),
            sources: None,
            outcome,
        }
    }

    pub fn is_refusal(&self) -> bool {
        is_refusal(&self.answer)
    }
}

/// Final payload returned to the request-handling layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryResponse {
    pub answer: String,
    pub evidence: Vec<EvidenceBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
}

impl QueryResponse {
    pub fn refusal() -> Self {
        Self {
            answer: REFUSAL_TEXT.to_string(),
            evidence: Vec::new(),
            sources: None,
        }
    }

    pub fn is_refusal(&self) -> bool {
        is_refusal(&self.answer)
    }
}
