//! Pipeline Coordinator (C8, spec §4.8): composes Classifier -> OCR ->
//! LLM -> Enrichment -> Dedup, persists intermediate and final state,
//! reports progress.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use rust_decimal::Decimal;
use std::str::FromStr;

use crate::classifier;
use crate::context::PipelineContext;
use crate::dedup::{self, ExistingRecord};
use crate::enrichment;
use crate::error::{PipelineError, PipelineResult};
use crate::job_manager::JobManager;
use crate::llm_orchestrator::LlmOrchestrator;
use crate::metrics;
use crate::models::{DocType, Document, DocumentStatus, EnrichmentMeta, ExtractedField, LineItem, Money, Party, StructuredRecord, TaxInfo};
use crate::ocr_orchestrator::OcrOrchestrator;
use crate::persistence::{DocumentPatch, PersistenceGateway};

pub struct Coordinator {
    context: Arc<PipelineContext>,
    persistence: Arc<dyn PersistenceGateway>,
    ocr_orchestrator: Arc<OcrOrchestrator>,
    llm_orchestrator: Arc<LlmOrchestrator>,
    job_manager: Arc<JobManager>,
}

impl Coordinator {
    pub fn new(
        context: Arc<PipelineContext>,
        persistence: Arc<dyn PersistenceGateway>,
        ocr_orchestrator: Arc<OcrOrchestrator>,
        llm_orchestrator: Arc<LlmOrchestrator>,
        job_manager: Arc<JobManager>,
    ) -> Self {
        Self { context, persistence, ocr_orchestrator, llm_orchestrator, job_manager }
    }

    /// Runs the full §4.8 pipeline for one document. `job_id` drives
    /// progress reporting through the Job Manager.
    pub async fn process_document(
        &self,
        mut document: Document,
        content_bytes: Vec<u8>,
        job_id: &str,
        cancellation: CancellationToken,
    ) -> PipelineResult<Document> {
        self.job_manager.mark_started(job_id);
        Self::assert_transition(&document, DocumentStatus::Processing);
        document.mark_started();
        self.persist_status(&document, None).await;
        self.job_manager.update_progress(job_id, 10);

        if cancellation.is_cancelled() {
            return self.cancel_document(document, job_id).await;
        }

        let classification = classifier::classify(
            &String::from_utf8_lossy(&content_bytes[..content_bytes.len().min(4096)]),
            &document.filename,
        );
        self.job_manager.update_progress(job_id, 20);

        if cancellation.is_cancelled() {
            return self.cancel_document(document, job_id).await;
        }

        let ocr_outcome = match self
            .ocr_orchestrator
            .process(&document, &content_bytes, Some(classifier_language_hint(&classification)), &cancellation)
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => return self.fail_document(document, job_id, err).await,
        };
        self.job_manager.update_progress(job_id, 50);

        if cancellation.is_cancelled() {
            return self.cancel_document(document, job_id).await;
        }

        let cost_ceiling = match document.mode {
            crate::models::ProcessingMode::AccuracyFirst => self.context.config.cost_limits.max_daily_cost_usd,
            _ => self.context.config.cost_limits.max_daily_cost_usd.min(1.0),
        };
        let mut record: StructuredRecord = self
            .llm_orchestrator
            .structure(&ocr_outcome.chosen.text, &classification, &document.owner_id, cost_ceiling)
            .await;
        self.job_manager.update_progress(job_id, 80);

        if cancellation.is_cancelled() {
            return self.cancel_document(document, job_id).await;
        }

        if let Err(err) = enrichment::enrich(&mut record, &self.context.registry_client).await {
            if err.is_enrichment_non_fatal() {
                warn!(document_id = %document.id, "enrichment failed non-fatally: {err}");
                record.enrichment_meta.notes.push(err.kind().to_string());
                record.enrichment_meta.success = false;
            } else {
                return self.fail_document(document, job_id, err).await;
            }
        }
        self.job_manager.update_progress(job_id, 95);

        if cancellation.is_cancelled() {
            return self.cancel_document(document, job_id).await;
        }

        let fingerprint = dedup::fingerprint(&record);
        let existing = self.load_existing_fingerprints(&document.owner_id, document.id).await;
        let dup_check = dedup::check(&record, Some(document.id), &existing);
        if dup_check.is_duplicate {
            info!(document_id = %document.id, "duplicate detected, annotating only");
            record.enrichment_meta.notes.push("duplicate_detected".to_string());
            for m in &dup_check.matches {
                let match_type = match m.match_type {
                    dedup::MatchType::Exact => "exact",
                    dedup::MatchType::NumberVendor => "number_vendor",
                };
                metrics::DUPLICATES_DETECTED_TOTAL.with_label_values(&[match_type]).inc();
            }
        }

        let fields = flatten(&record, document.id);
        if let Err(err) = self.persistence.create_fields(&document.owner_id, document.id, fields).await {
            return self.fail_document(document, job_id, err).await;
        }

        Self::assert_transition(&document, DocumentStatus::Completed);
        document.mark_completed(fingerprint.clone());
        self.persist_status(
            &document,
            Some(DocumentPatch {
                status: Some(DocumentStatus::Completed),
                completed_at: document.completed_at,
                dedup_fingerprint: Some(fingerprint),
                ..Default::default()
            }),
        )
        .await;
        self.job_manager.update_progress(job_id, 100);
        self.job_manager.mark_completed(job_id, crate::models::JobStatus::Completed);

        Ok(document)
    }

    /// Logs, but never blocks on, an illegal §4.8 state transition: the
    /// coordinator's own call sequence is the real enforcement, this is a
    /// consistency check against it.
    fn assert_transition(document: &Document, next: DocumentStatus) {
        if !document.status.can_transition_to(next) {
            error!(document_id = %document.id, from = ?document.status, to = ?next, "illegal document status transition");
        }
    }

    /// Builds dedup candidates from each owner document's own persisted
    /// `ExtractedField` rows, so §4.7's `number_vendor` near-duplicate match
    /// (which compares `invoice_number`/`vendor_name`) has real data to
    /// compare against rather than always falling through to fingerprint-only
    /// matching.
    async fn load_existing_fingerprints(&self, owner_id: &str, exclude: Uuid) -> Vec<ExistingRecord> {
        let docs = match self.persistence.list_documents(owner_id, 1000, 0).await {
            Ok(docs) => docs,
            Err(_) => return Vec::new(),
        };

        let mut existing = Vec::with_capacity(docs.len());
        for doc in docs.into_iter().filter(|d| d.id != exclude) {
            let Some(fingerprint) = doc.dedup_fingerprint else { continue };
            let fields = self.persistence.get_fields(owner_id, doc.id).await.unwrap_or_default();
            let field = |name: &str| fields.iter().find(|f| f.field_name == name).map(|f| f.field_value.clone());
            existing.push(ExistingRecord {
                document_id: doc.id,
                fingerprint,
                invoice_number: field("invoice_number"),
                vendor_name: field("vendor.name"),
                total_amount: field("total_amount.value"),
                date_issued: field("date_issued"),
            });
        }
        existing
    }

    async fn fail_document(&self, mut document: Document, job_id: &str, err: PipelineError) -> PipelineResult<Document> {
        error!(document_id = %document.id, kind = err.kind(), "document processing failed: {err}");
        Self::assert_transition(&document, DocumentStatus::Failed);
        document.mark_failed(err.kind(), err.to_string());
        self.persist_status(
            &document,
            Some(DocumentPatch {
                status: Some(DocumentStatus::Failed),
                completed_at: document.completed_at,
                error_kind: document.error_kind.clone(),
                error_message: document.error_message.clone(),
                ..Default::default()
            }),
        )
        .await;
        self.job_manager.mark_completed(job_id, crate::models::JobStatus::Failed);
        Ok(document)
    }

    async fn cancel_document(&self, mut document: Document, job_id: &str) -> PipelineResult<Document> {
        info!(document_id = %document.id, "cancellation observed at stage boundary");
        Self::assert_transition(&document, DocumentStatus::Cancelled);
        document.mark_cancelled();
        self.persist_status(
            &document,
            Some(DocumentPatch { status: Some(DocumentStatus::Cancelled), completed_at: document.completed_at, ..Default::default() }),
        )
        .await;
        self.job_manager.mark_completed(job_id, crate::models::JobStatus::Cancelled);
        Ok(document)
    }

    async fn persist_status(&self, document: &Document, patch: Option<DocumentPatch>) {
        let patch = patch.unwrap_or(DocumentPatch {
            status: Some(document.status),
            started_at: document.started_at,
            ..Default::default()
        });
        if let Err(err) = self.persistence.update_document(&document.owner_id, document.id, patch).await {
            error!(document_id = %document.id, "failed to persist document status: {err}");
        }
    }
}

fn classifier_language_hint(classification: &classifier::ClassificationResult) -> &'static str {
    match classification.language {
        classifier::Language::Local => "cs",
        classifier::Language::En => "en",
    }
}

fn doc_type_to_str(doc_type: DocType) -> &'static str {
    match doc_type {
        DocType::Invoice => "invoice",
        DocType::Receipt => "receipt",
        DocType::Contract => "contract",
        DocType::Other => "other",
    }
}

fn str_to_doc_type(s: &str) -> Option<DocType> {
    match s {
        "invoice" => Some(DocType::Invoice),
        "receipt" => Some(DocType::Receipt),
        "contract" => Some(DocType::Contract),
        "other" => Some(DocType::Other),
        _ => None,
    }
}

fn flatten_party(fields: &mut Vec<ExtractedField>, document_id: Uuid, prefix: &str, party: &Party, confidence: f64) {
    if let Some(v) = &party.name {
        fields.push(ExtractedField::new(document_id, format!("{prefix}.name"), v, confidence, "string"));
    }
    if let Some(v) = &party.registration_number {
        fields.push(ExtractedField::new(document_id, format!("{prefix}.registration_number"), v, confidence, "string"));
    }
    if let Some(v) = &party.tax_number {
        fields.push(ExtractedField::new(document_id, format!("{prefix}.tax_number"), v, confidence, "string"));
    }
    if let Some(v) = &party.address {
        fields.push(ExtractedField::new(document_id, format!("{prefix}.address"), v, confidence, "string"));
    }
    fields.push(ExtractedField::new(document_id, format!("{prefix}._enriched"), party.enriched.to_string(), confidence, "bool"));
    if let Some(v) = party.active {
        fields.push(ExtractedField::new(document_id, format!("{prefix}._active"), v.to_string(), confidence, "bool"));
    }
    if let Some(v) = party.tax_registered {
        fields.push(ExtractedField::new(document_id, format!("{prefix}._tax_registered"), v.to_string(), confidence, "bool"));
    }
}

fn unflatten_party(get: &dyn Fn(&str) -> Option<String>, prefix: &str) -> Party {
    Party {
        name: get(&format!("{prefix}.name")),
        registration_number: get(&format!("{prefix}.registration_number")),
        tax_number: get(&format!("{prefix}.tax_number")),
        address: get(&format!("{prefix}.address")),
        enriched: get(&format!("{prefix}._enriched")).map(|v| v == "true").unwrap_or(false),
        active: get(&format!("{prefix}._active")).map(|v| v == "true"),
        tax_registered: get(&format!("{prefix}._tax_registered")).map(|v| v == "true"),
    }
}

/// Flattens a `StructuredRecord` into `ExtractedField` rows (spec §3).
/// Reassembling them with `unflatten` must yield an equal record modulo
/// ordering (spec §8).
fn flatten(record: &StructuredRecord, document_id: Uuid) -> Vec<ExtractedField> {
    let mut fields = Vec::new();
    let confidence = record.extraction_confidence;

    fields.push(ExtractedField::new(document_id, "extraction_confidence", confidence.to_string(), confidence, "float"));

    if let Some(v) = record.document_type {
        fields.push(ExtractedField::new(document_id, "document_type", doc_type_to_str(v), confidence, "string"));
    }
    if let Some(v) = &record.invoice_number {
        fields.push(ExtractedField::new(document_id, "invoice_number", v, confidence, "string"));
    }
    if let Some(v) = &record.date_issued {
        fields.push(ExtractedField::new(document_id, "date_issued", v.to_string(), confidence, "date"));
    }
    if let Some(v) = &record.due_date {
        fields.push(ExtractedField::new(document_id, "due_date", v.to_string(), confidence, "date"));
    }
    if let Some(amount) = &record.total_amount {
        fields.push(ExtractedField::new(document_id, "total_amount.value", amount.value.to_string(), confidence, "decimal"));
        fields.push(ExtractedField::new(document_id, "total_amount.currency", &amount.currency, confidence, "string"));
    }
    flatten_party(&mut fields, document_id, "vendor", &record.vendor, confidence);
    flatten_party(&mut fields, document_id, "customer", &record.customer, confidence);

    fields.push(ExtractedField::new(document_id, "line_items.count", record.line_items.len().to_string(), confidence, "int"));
    for (i, item) in record.line_items.iter().enumerate() {
        if let Some(desc) = &item.description {
            fields.push(ExtractedField::new(document_id, format!("line_items[{i}].description"), desc, confidence, "string"));
        }
        if let Some(v) = item.quantity {
            fields.push(ExtractedField::new(document_id, format!("line_items[{i}].quantity"), v.to_string(), confidence, "decimal"));
        }
        if let Some(v) = item.unit_price {
            fields.push(ExtractedField::new(document_id, format!("line_items[{i}].unit_price"), v.to_string(), confidence, "decimal"));
        }
        if let Some(v) = item.total_price {
            fields.push(ExtractedField::new(document_id, format!("line_items[{i}].total_price"), v.to_string(), confidence, "decimal"));
        }
    }

    if let Some(tax) = &record.tax_info {
        if let Some(v) = tax.rate {
            fields.push(ExtractedField::new(document_id, "tax_info.rate", v.to_string(), confidence, "decimal"));
        }
        if let Some(v) = tax.amount {
            fields.push(ExtractedField::new(document_id, "tax_info.amount", v.to_string(), confidence, "decimal"));
        }
        if let Some(v) = tax.base {
            fields.push(ExtractedField::new(document_id, "tax_info.base", v.to_string(), confidence, "decimal"));
        }
    }

    if let Ok(meta_json) = serde_json::to_string(&record.enrichment_meta) {
        fields.push(ExtractedField::new(document_id, "_enrichment_meta", meta_json, confidence, "json"));
    }
    if let Ok(notes_json) = serde_json::to_string(&record.notes) {
        fields.push(ExtractedField::new(document_id, "_notes", notes_json, confidence, "json"));
    }

    fields
}

/// Reassembles a `StructuredRecord` from its flattened `ExtractedField`
/// rows. Must be the exact inverse of `flatten` for spec §8's round-trip
/// invariant to hold.
fn unflatten(fields: &[ExtractedField]) -> StructuredRecord {
    let get = |name: &str| fields.iter().find(|f| f.field_name == name).map(|f| f.field_value.clone());

    let mut record = StructuredRecord::default();
    record.extraction_confidence = get("extraction_confidence").and_then(|v| v.parse().ok()).unwrap_or(0.0);
    record.document_type = get("document_type").as_deref().and_then(str_to_doc_type);
    record.invoice_number = get("invoice_number");
    record.date_issued = get("date_issued").and_then(|v| chrono::NaiveDate::from_str(&v).ok());
    record.due_date = get("due_date").and_then(|v| chrono::NaiveDate::from_str(&v).ok());

    record.total_amount = match (get("total_amount.value"), get("total_amount.currency")) {
        (Some(value), Some(currency)) => Decimal::from_str(&value).ok().map(|v| Money { value: v, currency }),
        _ => None,
    };

    record.vendor = unflatten_party(&get, "vendor");
    record.customer = unflatten_party(&get, "customer");

    let count: usize = get("line_items.count").and_then(|v| v.parse().ok()).unwrap_or(0);
    record.line_items = (0..count)
        .map(|i| LineItem {
            description: get(&format!("line_items[{i}].description")),
            quantity: get(&format!("line_items[{i}].quantity")).and_then(|v| Decimal::from_str(&v).ok()),
            unit_price: get(&format!("line_items[{i}].unit_price")).and_then(|v| Decimal::from_str(&v).ok()),
            total_price: get(&format!("line_items[{i}].total_price")).and_then(|v| Decimal::from_str(&v).ok()),
        })
        .collect();

    let tax_rate = get("tax_info.rate").and_then(|v| Decimal::from_str(&v).ok());
    let tax_amount = get("tax_info.amount").and_then(|v| Decimal::from_str(&v).ok());
    let tax_base = get("tax_info.base").and_then(|v| Decimal::from_str(&v).ok());
    record.tax_info = if tax_rate.is_some() || tax_amount.is_some() || tax_base.is_some() {
        Some(TaxInfo { rate: tax_rate, amount: tax_amount, base: tax_base })
    } else {
        None
    };

    record.enrichment_meta = get("_enrichment_meta").and_then(|v| serde_json::from_str(&v).ok()).unwrap_or_default();
    record.notes = get("_notes").and_then(|v| serde_json::from_str(&v).ok()).unwrap_or_default();

    record
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_emits_vendor_and_total_fields() {
        let mut record = StructuredRecord::default();
        record.invoice_number = Some("2024-001".to_string());
        record.total_amount = Some(Money::new(Decimal::from_str("100.00").unwrap(), "CZK"));
        record.vendor.name = Some("ABC s.r.o.".to_string());
        let fields = flatten(&record, Uuid::new_v4());
        assert!(fields.iter().any(|f| f.field_name == "invoice_number"));
        assert!(fields.iter().any(|f| f.field_name == "total_amount.value"));
        assert!(fields.iter().any(|f| f.field_name == "vendor.name"));
    }

    #[test]
    fn flatten_then_unflatten_round_trips() {
        let mut record = StructuredRecord::default();
        record.document_type = Some(DocType::Invoice);
        record.invoice_number = Some("2024-001".to_string());
        record.date_issued = Some(chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        record.due_date = Some(chrono::NaiveDate::from_ymd_opt(2024, 3, 31).unwrap());
        record.total_amount = Some(Money::new(Decimal::from_str("121.00").unwrap(), "CZK"));
        record.vendor = Party {
            name: Some("ABC s.r.o.".to_string()),
            registration_number: Some("12345678".to_string()),
            tax_number: Some("CZ12345678".to_string()),
            address: Some("Prague".to_string()),
            enriched: true,
            active: Some(true),
            tax_registered: Some(true),
        };
        record.customer = Party { name: Some("Acme".to_string()), ..Party::default() };
        record.line_items = vec![
            LineItem {
                description: Some("Widget".to_string()),
                quantity: Some(Decimal::from_str("2").unwrap()),
                unit_price: Some(Decimal::from_str("50.00").unwrap()),
                total_price: Some(Decimal::from_str("100.00").unwrap()),
            },
            LineItem { description: None, quantity: None, unit_price: None, total_price: None },
        ];
        record.tax_info = Some(TaxInfo {
            rate: Some(Decimal::from_str("0.21").unwrap()),
            amount: Some(Decimal::from_str("21.00").unwrap()),
            base: Some(Decimal::from_str("100.00").unwrap()),
        });
        record.enrichment_meta = EnrichmentMeta { enriched_at: None, success: true, notes: vec!["ico_verified".to_string()] };
        record.notes = vec!["looks fine".to_string()];

        let fields = flatten(&record, Uuid::new_v4());
        let rebuilt = unflatten(&fields);
        assert_eq!(record, rebuilt);
    }
}
