mod common;

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use common::*;
use fdis_ai::answer::GenerationSource;
use fdis_ai::engine::{Disposition, QueryEngine};
use fdis_core::confidence::{ConfidenceGate, GateReason};
use fdis_core::domain::{QueryRequest, REFUSAL_TEXT};
use pretty_assertions::assert_eq;

fn mixed_index() -> Vec<fdis_core::domain::ChunkRecord> {
    vec![
        chunk("hsbc-1", "HSBC", 2024, 0.91, &prose("HSBC funding")),
        chunk("barc-1", "Barclays", 2024, 0.89, &prose("Barclays credit")),
        chunk("barc-old", "Barclays", 2023, 0.85, &prose("Barclays 2023")),
        chunk("barc-2", "Barclays", 2024, 0.80, &prose("Barclays liquidity")),
        chunk("lloyds-1", "Lloyds Banking Group", 2024, 0.78, &prose("Lloyds")),
        chunk("barc-3", "Barclays", 2024, 0.74, &prose("Barclays conduct")),
        chunk("barc-4", "Barclays", 2024, 0.70, &prose("Barclays climate")),
        chunk("barc-5", "Barclays", 2024, 0.66, &prose("Barclays operational")),
        chunk("barc-6", "Barclays", 2024, 0.62, &prose("Barclays model risk")),
        chunk("barc-7", "Barclays", 2024, 0.60, &prose("Barclays cyber")),
    ]
}

#[test]
fn filtered_answer_only_cites_requested_company() {
    let llm = Arc::new(ScriptedLlm::answering(
        "Barclays highlighted that credit losses may rise if conditions deteriorate.",
    ));
    let engine = engine(mixed_index(), llm.clone());

    let request = QueryRequest::new("What risks did Barclays highlight in 2024?")
        .with_company("Barclays")
        .with_fiscal_year(2024)
        .with_top_k(5);
    let response = engine.answer_question(&request).expect("answer");

    assert_eq!(llm.calls(), 1);
    assert_ne!(response.answer, REFUSAL_TEXT);
    assert!(!response.evidence.is_empty());
    assert!(response.evidence.len() <= 5);
    for block in &response.evidence {
        assert_eq!(block.company, "Barclays");
        assert_eq!(block.document, "Annual Report 2024");
    }
}

#[test]
fn unknown_company_year_refuses_with_empty_evidence() {
    let llm = Arc::new(ScriptedLlm::answering("should never be produced by this test"));
    let engine = engine(mixed_index(), llm.clone());

    let request = QueryRequest::new("What were Lloyds' AI governance failures in 2015?")
        .with_company("Lloyds Banking Group")
        .with_fiscal_year(2015)
        .with_top_k(1);
    let run = engine.run(&request).expect("run");

    assert_eq!(run.response.answer, REFUSAL_TEXT);
    assert!(run.response.evidence.is_empty());
    assert_eq!(run.response.sources, None);
    assert_eq!(run.trace.disposition, Disposition::NoEvidence);
    assert_eq!(llm.calls(), 0);
}

#[test]
fn thin_evidence_never_reaches_generation() {
    // One short chunk renders to about 120 characters of context.
    let index = vec![chunk("barc-short", "Barclays", 2024, 0.9, "Capital ratios stayed strong.")];
    let llm = Arc::new(ScriptedLlm::answering("Capital ratios stayed strong in 2024 per the report."));
    let engine = engine(index, llm.clone());

    let run = engine
        .run(&QueryRequest::new("How strong was Barclays capital?").with_company("Barclays"))
        .expect("run");

    assert!(run.trace.context_chars < 400);
    assert_eq!(llm.calls(), 0);
    assert_eq!(run.trace.disposition, Disposition::Generator(GenerationSource::Gated));
    assert_eq!(run.response.answer, REFUSAL_TEXT);
    assert!(run.response.evidence.is_empty());
}

#[test]
fn evidence_is_numbered_in_rank_order() {
    let index = vec![
        chunk("a", "Barclays", 2024, 0.9, &prose("first")),
        chunk("b", "Barclays", 2024, 0.8, &prose("second")),
        chunk("c", "Barclays", 2024, 0.7, &prose("third")),
    ];
    // The model's own SOURCES block claims SOURCE [3] for someone else; it is ignored.
    let llm = Arc::new(ScriptedLlm::answering(
        "The Group may face heightened credit losses [3] if conditions deteriorate.",
    ));
    let engine = engine(index, llm.clone());

    let response = engine
        .answer_question(&QueryRequest::new("What credit risks?").with_top_k(3))
        .expect("answer");

    let ids: Vec<u32> = response.evidence.iter().map(|e| e.source_id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert!(response.evidence[0].text.starts_with("first"));
    assert!(response.evidence[1].text.starts_with("second"));
    assert!(response.evidence[2].text.starts_with("third"));

    assert_eq!(
        response.answer,
        "The Group may face heightened credit losses if conditions deteriorate."
    );
    let sources = response.sources.expect("sources");
    assert_eq!(sources.len(), 3);
    assert_eq!(sources[0], "SOURCE [1] — Barclays, Annual Report 2024, Pages 10–11");
    assert!(sources.iter().all(|s| !s.contains("Someone Else")));
}

#[test]
fn search_overfetches_twice_top_k() {
    let index = Arc::new(StaticIndex::new(mixed_index()));
    let engine = QueryEngine::new(
        Arc::new(FixedEmbedder::new()),
        index.clone(),
        generator(Arc::new(ScriptedLlm::answering("Barclays noted elevated credit risk in 2024."))),
        settings(),
    );
    engine
        .answer_question(&QueryRequest::new("risks?").with_company("Barclays").with_top_k(3))
        .expect("answer");
    assert_eq!(*index.requested_k.lock().unwrap(), vec![6]);
}

#[test]
fn oversized_overfetch_factor_saturates() {
    let index = Arc::new(StaticIndex::new(mixed_index()));
    let mut wide = settings();
    wide.overfetch_factor = usize::MAX;
    let engine = QueryEngine::new(
        Arc::new(FixedEmbedder::new()),
        index.clone(),
        generator(Arc::new(ScriptedLlm::answering("Barclays noted elevated credit risk in 2024."))),
        wide,
    );
    engine
        .answer_question(&QueryRequest::new("risks?").with_company("Barclays").with_top_k(3))
        .expect("answer");
    assert_eq!(*index.requested_k.lock().unwrap(), vec![usize::MAX]);
}

#[test]
fn filtering_happens_before_truncation() {
    let engine = engine(
        mixed_index(),
        Arc::new(ScriptedLlm::answering("Barclays noted elevated credit risk in 2024.")),
    );
    let response = engine
        .answer_question(
            &QueryRequest::new("risks?")
                .with_company("Barclays")
                .with_fiscal_year(2024)
                .with_top_k(2),
        )
        .expect("answer");
    // Candidates are the top 4; two of them are Barclays 2024.
    let texts: Vec<&str> = response.evidence.iter().map(|e| e.text.as_str()).collect();
    assert_eq!(texts.len(), 2);
    assert!(texts[0].starts_with("Barclays credit"));
    assert!(texts[1].starts_with("Barclays liquidity"));
}

#[test]
fn default_report_type_constraint_applies() {
    let index = vec![
        fdis_core::domain::ChunkRecord::new("esg", "Barclays", 2024, "esg_report", prose("esg"))
            .with_score(0.9),
        fdis_core::domain::ChunkRecord::new("esg2", "Barclays", 2024, "esg_report", prose("esg2"))
            .with_score(0.8),
    ];
    let llm = Arc::new(ScriptedLlm::answering("Barclays published climate targets for 2030."));
    let engine = engine(index, llm.clone());
    let response = engine.answer_question(&QueryRequest::new("climate?")).expect("answer");
    assert!(response.is_refusal());
    assert_eq!(llm.calls(), 0);
}

#[test]
fn model_refusal_returns_empty_evidence() {
    let llm = Arc::new(ScriptedLlm::new(format!("<ANSWER>{REFUSAL_TEXT}</ANSWER>")));
    let engine = engine(mixed_index(), llm.clone());
    let response = engine
        .answer_question(&QueryRequest::new("What was the CEO's favourite colour?").with_company("Barclays"))
        .expect("answer");
    assert_eq!(llm.calls(), 1);
    assert_eq!(response, fdis_core::domain::QueryResponse::refusal());
}

#[test]
fn untagged_model_output_is_refused() {
    let llm = Arc::new(ScriptedLlm::new("Barclays highlighted credit risk, but I forgot the tags."));
    let engine = engine(mixed_index(), llm.clone());
    let response = engine
        .answer_question(&QueryRequest::new("risks?").with_company("Barclays"))
        .expect("answer");
    assert!(response.is_refusal());
    assert!(response.evidence.is_empty());
}

#[test]
fn generation_failure_is_fatal() {
    let llm = Arc::new(FailingLlm {
        calls: AtomicUsize::new(0),
    });
    let engine = engine(mixed_index(), llm);
    let err = engine
        .answer_question(&QueryRequest::new("risks?").with_company("Barclays"))
        .expect_err("must propagate");
    assert_eq!(err.code, "GENERATION_FAILED");
}

#[test]
fn embedding_failure_is_fatal() {
    let engine = QueryEngine::new(
        Arc::new(FailingEmbedder),
        Arc::new(StaticIndex::new(mixed_index())),
        generator(Arc::new(ScriptedLlm::answering("unused answer text here"))),
        settings(),
    );
    let err = engine
        .answer_question(&QueryRequest::new("risks?"))
        .expect_err("must propagate");
    assert_eq!(err.code, "EMBEDDING_FAILED");
    assert!(err.retryable);
}

#[test]
fn invalid_requests_fail_before_embedding() {
    let embedder = Arc::new(FixedEmbedder::new());
    let engine = QueryEngine::new(
        embedder.clone(),
        Arc::new(StaticIndex::new(mixed_index())),
        generator(Arc::new(ScriptedLlm::answering("unused answer text here"))),
        settings(),
    );
    for bad in [
        QueryRequest::new("  "),
        QueryRequest::new("risks?").with_top_k(0),
        QueryRequest::new("risks?").with_top_k(21),
    ] {
        let err = engine.answer_question(&bad).expect_err("invalid");
        assert_eq!(err.code, "QUERY_INVALID");
    }
    assert_eq!(embedder.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[test]
fn flat_scores_are_advisory_unless_enforced() {
    let flat = vec![
        chunk("a", "Barclays", 2024, 0.90, &prose("first")),
        chunk("b", "Barclays", 2024, 0.89, &prose("second")),
    ];

    let llm = Arc::new(ScriptedLlm::answering("The Group may face heightened credit losses."));
    let advisory = engine(flat.clone(), llm.clone());
    let run = advisory.run(&QueryRequest::new("risks?")).expect("run");
    assert_eq!(run.trace.verdict.reason, GateReason::FlatDistribution);
    assert!(!run.response.is_refusal());
    assert_eq!(llm.calls(), 1);

    let strict_llm = Arc::new(ScriptedLlm::answering("The Group may face heightened credit losses."));
    let mut strict_settings = settings();
    strict_settings.enforce_confidence_gate = true;
    strict_settings.gate = ConfidenceGate::default();
    let strict = QueryEngine::new(
        Arc::new(FixedEmbedder::new()),
        Arc::new(StaticIndex::new(flat)),
        generator(strict_llm.clone()),
        strict_settings,
    );
    let run = strict.run(&QueryRequest::new("risks?")).expect("run");
    assert_eq!(run.trace.disposition, Disposition::LowConfidence);
    assert!(run.response.is_refusal());
    assert!(run.response.evidence.is_empty());
    assert_eq!(strict_llm.calls(), 0);
}

#[test]
fn dimension_mismatch_is_reported() {
    struct WideEmbedder;
    impl fdis_ai::embeddings::Embedder for WideEmbedder {
        fn embed(&self, _m: &str, _i: &str) -> Result<Vec<f32>, fdis_core::error::AppError> {
            Ok(vec![0.1; DIMS + 1])
        }
    }
    let engine = QueryEngine::new(
        Arc::new(WideEmbedder),
        Arc::new(StaticIndex::new(mixed_index())),
        generator(Arc::new(ScriptedLlm::answering("unused answer text here"))),
        settings(),
    );
    let err = engine.answer_question(&QueryRequest::new("risks?")).expect_err("dims");
    assert_eq!(err.code, "EMBEDDING_FAILED");
}
