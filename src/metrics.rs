//! Process-wide instrumentation, grounded on the teacher's
//! `src/observability/metrics.rs` registration pattern. `lazy_static` is
//! replaced with `once_cell::sync::Lazy`, its direct successor already
//! present in the corpus. Pure instrumentation: no `/metrics` HTTP endpoint
//! is exposed here (that surface is external, spec §1).

use once_cell::sync::Lazy;
use prometheus::{register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, GaugeVec, HistogramVec};

pub static ADAPTER_CALLS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!("invoice_pipeline_adapter_calls_total", "Adapter calls by provider and outcome", &["provider", "outcome"])
        .expect("adapter_calls_total metric registration")
});

pub static ADAPTER_CALL_LATENCY_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!("invoice_pipeline_adapter_call_latency_seconds", "Adapter call latency by provider", &["provider"])
        .expect("adapter_call_latency_seconds metric registration")
});

pub static LLM_COST_USD: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!("invoice_pipeline_llm_cost_usd", "LLM call cost in USD by owner bucket", &["owner_bucket"])
        .expect("llm_cost_usd metric registration")
});

pub static JOB_QUEUE_DEPTH: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!("invoice_pipeline_job_queue_depth", "Pending jobs in the queue", &["owner_bucket"])
        .expect("job_queue_depth metric registration")
});

pub static WORKER_BUSY: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!("invoice_pipeline_worker_busy", "Workers currently processing a job", &["worker_id"])
        .expect("worker_busy metric registration")
});

pub static DUPLICATES_DETECTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!("invoice_pipeline_duplicates_detected_total", "Duplicate detections by match type", &["match_type"])
        .expect("duplicates_detected_total metric registration")
});

pub fn record_adapter_call(provider: &str, outcome: &str, latency_seconds: f64) {
    ADAPTER_CALLS_TOTAL.with_label_values(&[provider, outcome]).inc();
    ADAPTER_CALL_LATENCY_SECONDS.with_label_values(&[provider]).observe(latency_seconds);
}

/// Buckets owners into a small cardinality-bounded label so the histogram
/// doesn't grow one series per owner (the teacher's metrics avoid
/// unbounded label cardinality the same way).
pub fn owner_bucket(owner_id: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(owner_id.as_bytes());
    let digest = hasher.finalize();
    format!("bucket_{}", digest[0] % 16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_bucket_is_stable_for_the_same_owner() {
        assert_eq!(owner_bucket("owner-1"), owner_bucket("owner-1"));
    }
}
