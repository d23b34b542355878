//! LLM Orchestrator (C5, spec §4.5): model selection under cost/accuracy
//! constraints, JSON-schema structuring with retry-then-fallback, and cost
//! accounting.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::adapters::AdapterRegistry;
use crate::classifier::{ClassificationResult, Complexity};
use crate::cost_tracker::CostTracker;
use crate::metrics;
use crate::models::StructuredRecord;
use crate::regex_baseline;

const MAX_TOKENS: u32 = 4096;

#[derive(Debug, Clone)]
pub struct ModelSelection {
    pub model_id: String,
    pub reason: String,
    pub score: f64,
}

pub struct LlmOrchestrator {
    registry: Arc<AdapterRegistry>,
    cost_tracker: Arc<CostTracker>,
    call_timeout: Duration,
}

impl LlmOrchestrator {
    pub fn new(registry: Arc<AdapterRegistry>, cost_tracker: Arc<CostTracker>, call_timeout: Duration) -> Self {
        Self { registry, cost_tracker, call_timeout }
    }

    /// Model-selection scoring per spec §4.5: weighted sum
    /// (accuracy 0.4, cost 0.25, speed 0.15, language 0.10, reasoning 0.10),
    /// complex documents multiply preferred (high-reasoning) tiers by 1.2,
    /// then a cost-ceiling filter removes models whose expected cost
    /// exceeds the remaining budget.
    pub fn select_model(&self, classification: &ClassificationResult, cost_ceiling: f64) -> Option<ModelSelection> {
        let mut scored: Vec<(String, f64, f64)> = self
            .registry
            .llm_adapters()
            .filter_map(|(id, _)| self.registry.llm_capability(id).map(|cap| (id.to_string(), cap)))
            .map(|(id, cap)| {
                let mut score = 0.4 * cap.accuracy
                    + 0.25 * (1.0 - (cap.cost_per_1k_tokens_usd / 1.0).min(1.0))
                    + 0.15 * cap.speed
                    + 0.10 * cap.language_support
                    + 0.10 * cap.reasoning;
                if classification.complexity == Complexity::Complex && cap.reasoning >= 0.7 {
                    score *= 1.2;
                }
                let expected_cost = estimated_call_cost(cap.cost_per_1k_tokens_usd);
                (id, score, expected_cost)
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());

        let within_budget: Vec<&(String, f64, f64)> = scored.iter().filter(|(_, _, cost)| *cost <= cost_ceiling).collect();
        let chosen = if let Some(best) = within_budget.first() {
            (*best).clone()
        } else {
            scored
                .iter()
                .min_by(|a, b| a.2.partial_cmp(&b.2).unwrap())
                .cloned()?
        };

        let reason = if within_budget.is_empty() {
            "no model within cost ceiling, fell back to cheapest available".to_string()
        } else {
            "highest weighted score within cost ceiling".to_string()
        };

        Some(ModelSelection { model_id: chosen.0, reason, score: chosen.1 })
    }

    /// Runs the §4.5 structuring contract for one document: regex priors,
    /// model selection, cost-ceiling enforcement, JSON parse with one
    /// retry, fallback to regex baseline on parse failure or cost denial.
    pub async fn structure(&self, raw_text: &str, classification: &ClassificationResult, owner_id: &str, cost_ceiling: f64) -> StructuredRecord {
        let priors = regex_baseline::extract(raw_text);

        let Some(selection) = self.select_model(classification, cost_ceiling) else {
            warn!(owner_id, "no llm adapter registered, using regex baseline");
            return finalize(priors, 0.0);
        };
        let Some(adapter) = self.registry.get_llm(&selection.model_id) else {
            return finalize(priors, 0.0);
        };

        let remaining = self.cost_tracker.remaining_budget(owner_id).max(0.0).min(cost_ceiling);
        if remaining <= 0.0 {
            info!(owner_id, model = %selection.model_id, "cost_limit_hit, falling back to regex baseline");
            return finalize(priors, 0.0);
        }

        let prompt = build_prompt(raw_text);
        let mut attempt_prompt = prompt.clone();

        for attempt in 0..2 {
            let call = tokio::time::timeout(self.call_timeout, adapter.structure(&attempt_prompt, MAX_TOKENS, remaining));
            let result = match call.await {
                Ok(result) => result,
                Err(_) => {
                    warn!(owner_id, attempt, "llm call timed out");
                    continue;
                }
            };

            let outcome = if result.error.is_some() { "failure" } else { "success" };
            metrics::record_adapter_call(&selection.model_id, outcome, result.latency.as_secs_f64());

            if let Some(error) = &result.error {
                warn!(owner_id, attempt, kind = ?error.kind, "llm adapter returned an error");
                continue;
            }

            if !self.cost_tracker.try_charge(owner_id, result.cost_usd) {
                info!(owner_id, "cost_limit_hit after call, falling back to regex baseline");
                return finalize(priors, 0.0);
            }
            metrics::LLM_COST_USD.with_label_values(&[&metrics::owner_bucket(owner_id)]).observe(result.cost_usd);

            match serde_json::from_str::<StructuredRecord>(&result.text) {
                Ok(mut record) => {
                    normalize(&mut record);
                    record.validate_invariants();
                    let adapter_confidence = result.confidence_hint;
                    let coverage = record.field_coverage();
                    record.extraction_confidence = (0.5 * adapter_confidence + 0.5 * coverage).clamp(0.0, 1.0);
                    return record;
                }
                Err(_) if attempt == 0 => {
                    attempt_prompt = format!("{prompt}\n\nYour previous response was not valid JSON matching the schema. Respond with JSON only, no prose.");
                    continue;
                }
                Err(_) => {
                    warn!(owner_id, "llm_parse_failed twice, falling back to regex baseline");
                    return finalize(priors, 0.0);
                }
            }
        }

        finalize(priors, 0.0)
    }
}

fn estimated_call_cost(cost_per_1k_tokens_usd: f64) -> f64 {
    let estimated_tokens = 2000.0;
    cost_per_1k_tokens_usd * (estimated_tokens / 1000.0)
}

fn build_prompt(raw_text: &str) -> String {
    format!(
        "Extract the following invoice/receipt/contract fields as a JSON object matching this schema: document_type, invoice_number, date_issued, due_date, total_amount{{value,currency}}, vendor{{name,registration_number,tax_number,address}}, customer{{name,registration_number,tax_number,address}}, line_items[{{description,quantity,unit_price,total_price}}], tax_info{{rate,amount,base}}.\n\nText:\n{raw_text}"
    )
}

fn normalize(record: &mut StructuredRecord) {
    if let Some(number) = &mut record.invoice_number {
        *number = number.trim().to_string();
    }
    if let Some(amount) = &mut record.total_amount {
        amount.value = amount.value.round_dp(2);
        amount.currency = amount.currency.to_uppercase();
    }
}

fn finalize(mut record: StructuredRecord, adapter_confidence: f64) -> StructuredRecord {
    record.validate_invariants();
    let coverage = record.field_coverage();
    record.extraction_confidence = (0.5 * adapter_confidence + 0.5 * coverage).clamp(0.0, 1.0);
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::LlmCapability;
    use crate::adapters::llm::OpenRouterAdapter;
    use crate::classifier::Language;
    use std::time::Duration as StdDuration;

    fn classification(complexity: Complexity) -> ClassificationResult {
        ClassificationResult { doc_type: crate::models::DocType::Invoice, complexity, language: Language::Local, confidence: 0.8 }
    }

    #[test]
    fn select_model_falls_back_to_cheapest_when_ceiling_excludes_all() {
        let mut registry = AdapterRegistry::new();
        let http = reqwest::Client::new();
        registry.register_llm(
            Arc::new(OpenRouterAdapter::qwen2_5_vl_72b("key".into(), http.clone())),
            LlmCapability { accuracy: 0.9, cost_per_1k_tokens_usd: 0.0007, speed: 0.5, language_support: 0.8, reasoning: 0.9, avg_latency: StdDuration::from_secs(2) },
        );
        let orchestrator = LlmOrchestrator::new(Arc::new(registry), Arc::new(CostTracker::new(10.0, 100.0)), StdDuration::from_secs(30));
        let selection = orchestrator.select_model(&classification(Complexity::Simple), 0.0).unwrap();
        assert_eq!(selection.model_id, "qwen/qwen2.5-vl-72b-instruct");
    }
}
