// Offline evaluation: run labelled questions through the engine and
// classify each response against the expected behaviour.

use std::fs;
use std::path::Path;

use fdis_core::domain::{QueryRequest, QueryResponse};
use fdis_core::error::AppError;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::engine::QueryEngine;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedBehavior {
    Answer,
    Refuse,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvalOutcome {
    Pass,
    RefuseOk,
    Fail,
}

impl EvalOutcome {
    pub fn passed(self) -> bool {
        matches!(self, EvalOutcome::Pass | EvalOutcome::RefuseOk)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvalCase {
    pub id: String,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub category: String,
    pub expected_behavior: ExpectedBehavior,
    #[serde(rename = "llm_request")]
    pub request: QueryRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvalResult {
    pub id: String,
    pub difficulty: String,
    pub category: String,
    pub expected_behavior: ExpectedBehavior,
    pub refused: bool,
    pub evidence_count: usize,
    pub retrieved: usize,
    pub outcome: EvalOutcome,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct EvalSummary {
    pub total: usize,
    pub pass: usize,
    pub refuse_ok: usize,
    pub fail: usize,
}

impl EvalSummary {
    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.pass + self.refuse_ok) as f64 / self.total as f64
    }
}

/// Refusing an answerable question is tolerated only when retrieval found
/// something: the engine declined to answer, rather than missing the data.
pub fn classify_outcome(refused: bool, had_evidence: bool, expected: ExpectedBehavior) -> EvalOutcome {
    match (expected, refused) {
        (ExpectedBehavior::Refuse, true) => EvalOutcome::RefuseOk,
        (ExpectedBehavior::Refuse, false) => EvalOutcome::Fail,
        (ExpectedBehavior::Answer, false) => EvalOutcome::Pass,
        (ExpectedBehavior::Answer, true) if had_evidence => EvalOutcome::RefuseOk,
        (ExpectedBehavior::Answer, true) => EvalOutcome::Fail,
    }
}

pub fn load_cases(path: &Path) -> Result<Vec<EvalCase>, AppError> {
    let raw = fs::read(path).map_err(|e| {
        AppError::new("EVAL_CASES_INVALID", "Failed to read evaluation cases")
            .with_details(format!("path={}; err={}", path.display(), e))
    })?;
    serde_json::from_slice(&raw).map_err(|e| {
        AppError::new("EVAL_CASES_INVALID", "Failed to decode evaluation cases")
            .with_details(format!("path={}; err={}", path.display(), e))
    })
}

/// One case as it ran: the classified row and, when the engine answered, its response.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseRun {
    pub result: EvalResult,
    pub response: Option<QueryResponse>,
}

/// A case that did not pass, with what the engine returned for it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvalFailure {
    pub case: EvalCase,
    pub result: EvalResult,
    pub model_response: Option<QueryResponse>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SuiteRun {
    pub results: Vec<EvalResult>,
    pub failures: Vec<EvalFailure>,
    pub summary: EvalSummary,
}

pub fn run_case(engine: &QueryEngine, case: &EvalCase) -> CaseRun {
    let mut result = EvalResult {
        id: case.id.clone(),
        difficulty: case.difficulty.clone(),
        category: case.category.clone(),
        expected_behavior: case.expected_behavior,
        refused: false,
        evidence_count: 0,
        retrieved: 0,
        outcome: EvalOutcome::Fail,
        error: None,
    };
    let response = match engine.run(&case.request) {
        Ok(run) => {
            result.refused = run.response.is_refusal();
            result.evidence_count = run.response.evidence.len();
            result.retrieved = run.trace.retrieved;
            result.outcome = classify_outcome(result.refused, run.trace.retrieved > 0, case.expected_behavior);
            Some(run.response)
        }
        Err(e) => {
            warn!(case = %case.id, error = %e, "evaluation case failed");
            result.error = Some(e.to_string());
            None
        }
    };
    CaseRun { result, response }
}

pub fn run_suite(engine: &QueryEngine, cases: &[EvalCase]) -> SuiteRun {
    let mut results = Vec::with_capacity(cases.len());
    let mut failures = Vec::new();
    for case in cases {
        let run = run_case(engine, case);
        if !run.result.outcome.passed() {
            failures.push(EvalFailure {
                case: case.clone(),
                result: run.result.clone(),
                model_response: run.response,
            });
        }
        results.push(run.result);
    }
    let summary = summarize(&results);
    info!(
        total = summary.total,
        pass = summary.pass,
        refuse_ok = summary.refuse_ok,
        fail = summary.fail,
        "evaluation finished"
    );
    SuiteRun {
        results,
        failures,
        summary,
    }
}

pub fn summarize(results: &[EvalResult]) -> EvalSummary {
    let mut s = EvalSummary {
        total: results.len(),
        ..EvalSummary::default()
    };
    for r in results {
        match r.outcome {
            EvalOutcome::Pass => s.pass += 1,
            EvalOutcome::RefuseOk => s.refuse_ok += 1,
            EvalOutcome::Fail => s.fail += 1,
        }
    }
    s
}

/// One row per case, header included.
pub fn write_csv_report(results: &[EvalResult], path: &Path) -> Result<(), AppError> {
    let mut w = csv::Writer::from_path(path).map_err(|e| {
        AppError::new("EVAL_REPORT_FAILED", "Failed to create evaluation report")
            .with_details(format!("path={}; err={}", path.display(), e))
    })?;
    for r in results {
        w.serialize(r).map_err(|e| {
            AppError::new("EVAL_REPORT_FAILED", "Failed to write evaluation row")
                .with_details(format!("id={}; err={}", r.id, e))
        })?;
    }
    w.flush().map_err(|e| {
        AppError::new("EVAL_REPORT_FAILED", "Failed to flush evaluation report")
            .with_details(e.to_string())
    })
}

/// Failing cases as pretty JSON, each with the engine's response (null on error).
pub fn write_failures_json(failures: &[EvalFailure], path: &Path) -> Result<(), AppError> {
    let json = serde_json::to_vec_pretty(failures).map_err(|e| {
        AppError::new("EVAL_REPORT_FAILED", "Failed to encode evaluation failures")
            .with_details(e.to_string())
    })?;
    fs::write(path, json).map_err(|e| {
        AppError::new("EVAL_REPORT_FAILED", "Failed to write evaluation failures")
            .with_details(format!("path={}; err={}", path.display(), e))
    })
}
