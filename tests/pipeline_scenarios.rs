//! End-to-end scenario tests for `Coordinator::process_document` against
//! fake adapters and an in-memory `PersistenceGateway`, covering the
//! concrete scenarios from the canonical test-properties section.

mod common;

use std::sync::Arc;
use std::time::Duration;

use invoice_pipeline::models::{
    AdapterError, AdapterErrorKind, Document, DocumentStatus, LLMResult, ProcessingMode, RawOCRResult,
};
use tokio_util::sync::CancellationToken;

use common::{build_harness, build_harness_with_persistence, InMemoryPersistenceGateway, FakeLlmAdapter, FakeOcrAdapter};

const SAMPLE_INVOICE_TEXT: &str =
    "FAKTURA č. 2024-001\nDatum vystavení: 21.07.2024\nCelkem k úhradě: 24 200,00 Kč\nIČO: 12345678";

fn happy_path_llm_result() -> LLMResult {
    let body = serde_json::json!({
        "document_type": "invoice",
        "invoice_number": "2024-001",
        "date_issued": "2024-07-21",
        "total_amount": {"value": "24200.00", "currency": "CZK"},
        "vendor": {"name": "ABC s.r.o.", "registration_number": "12345678"},
        "customer": {},
        "line_items": [],
    })
    .to_string();
    LLMResult { text: body, tokens_in: 220, tokens_out: 90, cost_usd: 0.002, latency: Duration::from_millis(120), confidence_hint: 0.97, error: None }
}

#[tokio::test]
async fn happy_path_invoice_completes_with_high_confidence_fields() {
    let ocr_adapter = FakeOcrAdapter {
        id: "fake_ocr",
        result: RawOCRResult::success("fake_ocr", SAMPLE_INVOICE_TEXT.to_string(), 0.95, Duration::from_millis(50)),
    };
    let llm_adapter = FakeLlmAdapter { id: "fake_llm", result: happy_path_llm_result() };

    let harness = build_harness(ocr_adapter, llm_adapter, (10.0, 150.0), "http://127.0.0.1:0").await;

    let document = Document::new("owner-1", "invoice.png", "image/png", 4096, "hash-1", ProcessingMode::CostEffective);
    let document_id = document.id;
    let job = harness.job_manager.submit(document_id, "owner-1".into(), Default::default(), "job-1".into()).await;

    let result = harness
        .coordinator
        .process_document(document, SAMPLE_INVOICE_TEXT.as_bytes().to_vec(), &job.id, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, DocumentStatus::Completed);

    let fields = harness.persistence.get_fields("owner-1", document_id).await.unwrap();
    let field = |name: &str| fields.iter().find(|f| f.field_name == name).map(|f| f.field_value.clone());
    assert_eq!(field("invoice_number").as_deref(), Some("2024-001"));
    assert_eq!(field("total_amount.value").as_deref(), Some("24200.00"));
    assert_eq!(field("total_amount.currency").as_deref(), Some("CZK"));
    assert_eq!(field("vendor.name").as_deref(), Some("ABC s.r.o."));
    assert_eq!(field("vendor.registration_number").as_deref(), Some("12345678"));
    assert!(!fields.is_empty());
    assert!(fields.iter().all(|f| f.confidence >= 0.8), "extraction_confidence should be >= 0.8 on a clean LLM parse");

    harness.job_manager.shutdown();
}

#[tokio::test]
async fn identical_invoices_fingerprint_to_the_same_value() {
    let make_harness = || async {
        let ocr_adapter = FakeOcrAdapter {
            id: "fake_ocr",
            result: RawOCRResult::success("fake_ocr", SAMPLE_INVOICE_TEXT.to_string(), 0.95, Duration::from_millis(50)),
        };
        let llm_adapter = FakeLlmAdapter { id: "fake_llm", result: happy_path_llm_result() };
        build_harness(ocr_adapter, llm_adapter, (10.0, 150.0), "http://127.0.0.1:0").await
    };

    let first = make_harness().await;
    let doc_a = Document::new("owner-1", "invoice_a.png", "image/png", 4096, "hash-a", ProcessingMode::CostEffective);
    let doc_a_id = doc_a.id;
    let job_a = first.job_manager.submit(doc_a_id, "owner-1".into(), Default::default(), "job-a".into()).await;
    let result_a = first
        .coordinator
        .process_document(doc_a, SAMPLE_INVOICE_TEXT.as_bytes().to_vec(), &job_a.id, CancellationToken::new())
        .await
        .unwrap();

    let second = make_harness().await;
    let doc_b = Document::new("owner-1", "invoice_b.png", "image/png", 4096, "hash-b", ProcessingMode::CostEffective);
    let doc_b_id = doc_b.id;
    let job_b = second.job_manager.submit(doc_b_id, "owner-1".into(), Default::default(), "job-b".into()).await;
    let result_b = second
        .coordinator
        .process_document(doc_b, SAMPLE_INVOICE_TEXT.as_bytes().to_vec(), &job_b.id, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result_a.status, DocumentStatus::Completed);
    assert_eq!(result_b.status, DocumentStatus::Completed);
    assert!(result_a.dedup_fingerprint.is_some());
    assert_eq!(result_a.dedup_fingerprint, result_b.dedup_fingerprint, "same canonical record must fingerprint identically (exact-duplicate matching relies on this)");

    first.job_manager.shutdown();
    second.job_manager.shutdown();
}

#[tokio::test]
async fn near_duplicate_same_number_and_vendor_is_flagged_across_documents() {
    let persistence = Arc::new(InMemoryPersistenceGateway::new());

    let first_llm = LLMResult {
        text: serde_json::json!({
            "document_type": "invoice",
            "invoice_number": "2024-001",
            "date_issued": "2024-07-21",
            "total_amount": {"value": "24200.00", "currency": "CZK"},
            "vendor": {"name": "ABC s.r.o.", "registration_number": "12345678"},
            "customer": {},
            "line_items": [],
        })
        .to_string(),
        tokens_in: 220,
        tokens_out: 90,
        cost_usd: 0.002,
        latency: Duration::from_millis(120),
        confidence_hint: 0.97,
        error: None,
    };
    let first_ocr = FakeOcrAdapter {
        id: "fake_ocr",
        result: RawOCRResult::success("fake_ocr", SAMPLE_INVOICE_TEXT.to_string(), 0.95, Duration::from_millis(50)),
    };
    let first_llm_adapter = FakeLlmAdapter { id: "fake_llm", result: first_llm };
    let first = build_harness_with_persistence(persistence.clone(), first_ocr, first_llm_adapter, (10.0, 150.0), "http://127.0.0.1:0").await;

    let doc_a = Document::new("owner-1", "invoice_a.png", "image/png", 4096, "hash-a", ProcessingMode::CostEffective);
    let doc_a_id = doc_a.id;
    let job_a = first.job_manager.submit(doc_a_id, "owner-1".into(), Default::default(), "job-a".into()).await;
    let result_a = first
        .coordinator
        .process_document(doc_a, SAMPLE_INVOICE_TEXT.as_bytes().to_vec(), &job_a.id, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result_a.status, DocumentStatus::Completed);

    // Same invoice_number and vendor.name, but a different total_amount so
    // the fingerprint differs and only the number+vendor match fires.
    let second_llm = LLMResult {
        text: serde_json::json!({
            "document_type": "invoice",
            "invoice_number": "2024-001",
            "date_issued": "2024-07-22",
            "total_amount": {"value": "24300.00", "currency": "CZK"},
            "vendor": {"name": "ABC s.r.o.", "registration_number": "12345678"},
            "customer": {},
            "line_items": [],
        })
        .to_string(),
        tokens_in: 220,
        tokens_out: 90,
        cost_usd: 0.002,
        latency: Duration::from_millis(120),
        confidence_hint: 0.97,
        error: None,
    };
    let second_ocr = FakeOcrAdapter {
        id: "fake_ocr",
        result: RawOCRResult::success("fake_ocr", SAMPLE_INVOICE_TEXT.to_string(), 0.95, Duration::from_millis(50)),
    };
    let second_llm_adapter = FakeLlmAdapter { id: "fake_llm", result: second_llm };
    let second = build_harness_with_persistence(persistence.clone(), second_ocr, second_llm_adapter, (10.0, 150.0), "http://127.0.0.1:0").await;

    let doc_b = Document::new("owner-1", "invoice_b.png", "image/png", 4096, "hash-b", ProcessingMode::CostEffective);
    let doc_b_id = doc_b.id;
    let job_b = second.job_manager.submit(doc_b_id, "owner-1".into(), Default::default(), "job-b".into()).await;
    let result_b = second
        .coordinator
        .process_document(doc_b, SAMPLE_INVOICE_TEXT.as_bytes().to_vec(), &job_b.id, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result_b.status, DocumentStatus::Completed);
    assert_ne!(result_a.dedup_fingerprint, result_b.dedup_fingerprint, "different total_amount must change the fingerprint");

    let fields_b = second.persistence.get_fields("owner-1", doc_b_id).await.unwrap();
    let notes = fields_b.iter().find(|f| f.field_name == "_notes").map(|f| f.field_value.clone()).unwrap_or_default();
    assert!(notes.contains("duplicate_detected"), "second document sharing invoice_number+vendor.name must be flagged: {notes}");

    first.job_manager.shutdown();
    second.job_manager.shutdown();
}

#[tokio::test]
async fn cost_ceiling_breach_falls_back_to_regex_baseline_and_still_completes() {
    let ocr_adapter = FakeOcrAdapter {
        id: "fake_ocr",
        result: RawOCRResult::success("fake_ocr", SAMPLE_INVOICE_TEXT.to_string(), 0.95, Duration::from_millis(50)),
    };
    // An adapter present in the registry but never reachable under a zero
    // budget — if it's called at all, its response would parse into a
    // full-coverage record, so a passing test here genuinely demonstrates
    // the cost gate short-circuits before any adapter call.
    let llm_adapter = FakeLlmAdapter { id: "fake_llm", result: happy_path_llm_result() };

    let harness = build_harness(ocr_adapter, llm_adapter, (0.0, 0.0), "http://127.0.0.1:0").await;

    let document = Document::new("owner-1", "invoice.png", "image/png", 4096, "hash-1", ProcessingMode::AccuracyFirst);
    let document_id = document.id;
    let job = harness.job_manager.submit(document_id, "owner-1".into(), Default::default(), "job-1".into()).await;

    let result = harness
        .coordinator
        .process_document(document, SAMPLE_INVOICE_TEXT.as_bytes().to_vec(), &job.id, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, DocumentStatus::Completed);
    let fields = harness.persistence.get_fields("owner-1", document_id).await.unwrap();
    // Regex baseline still recovers invoice_number/date/total/registration_number.
    assert!(fields.iter().any(|f| f.field_name == "invoice_number"));
    assert!(fields.iter().all(|f| f.confidence <= 0.6), "cost-denied structuring must cap confidence at the regex-baseline ceiling");

    harness.job_manager.shutdown();
}

#[tokio::test]
async fn ocr_failure_on_every_adapter_fails_the_document_without_persisting_fields() {
    let ocr_adapter = FakeOcrAdapter {
        id: "fake_ocr",
        result: RawOCRResult::failure(
            "fake_ocr",
            AdapterError::new(AdapterErrorKind::ProviderError, "scanner rejected the image"),
            Duration::from_millis(30),
        ),
    };
    let llm_adapter = FakeLlmAdapter { id: "fake_llm", result: happy_path_llm_result() };

    let harness = build_harness(ocr_adapter, llm_adapter, (10.0, 150.0), "http://127.0.0.1:0").await;

    let document = Document::new("owner-1", "invoice.png", "image/png", 4096, "hash-1", ProcessingMode::CostEffective);
    let document_id = document.id;
    let job = harness.job_manager.submit(document_id, "owner-1".into(), Default::default(), "job-1".into()).await;

    let result = harness
        .coordinator
        .process_document(document, b"irrelevant bytes".to_vec(), &job.id, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, DocumentStatus::Failed);
    assert_eq!(result.error_kind.as_deref(), Some("ocr_all_failed"));
    let fields = harness.persistence.get_fields("owner-1", document_id).await.unwrap();
    assert!(fields.is_empty());

    harness.job_manager.shutdown();
}

#[tokio::test]
async fn cancellation_short_circuits_before_ocr_and_persists_no_fields() {
    let ocr_adapter = FakeOcrAdapter {
        id: "fake_ocr",
        result: RawOCRResult::success("fake_ocr", SAMPLE_INVOICE_TEXT.to_string(), 0.95, Duration::from_millis(50)),
    };
    let llm_adapter = FakeLlmAdapter { id: "fake_llm", result: happy_path_llm_result() };

    let harness = build_harness(ocr_adapter, llm_adapter, (10.0, 150.0), "http://127.0.0.1:0").await;

    let document = Document::new("owner-1", "invoice.png", "image/png", 4096, "hash-1", ProcessingMode::CostEffective);
    let document_id = document.id;
    let job = harness.job_manager.submit(document_id, "owner-1".into(), Default::default(), "job-1".into()).await;

    // Cancelled ahead of dispatch: exercises the cancellation property at
    // the first stage boundary rather than racing the OCR fan-out itself,
    // which is cooperative cancellation `OcrOrchestrator` already covers
    // via its shared `CancellationToken` in `race_to_confidence`.
    let cancellation = CancellationToken::new();
    cancellation.cancel();

    let result = harness
        .coordinator
        .process_document(document, SAMPLE_INVOICE_TEXT.as_bytes().to_vec(), &job.id, cancellation)
        .await
        .unwrap();

    assert_eq!(result.status, DocumentStatus::Cancelled);
    let fields = harness.persistence.get_fields("owner-1", document_id).await.unwrap();
    assert!(fields.is_empty());
    assert!(!harness.job_manager.cancel(&job.id), "a terminal job is not cancellable again");

    harness.job_manager.shutdown();
}
