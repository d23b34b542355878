//! OCR Orchestrator (C4, spec §4.4): converts input artifact to canonical
//! raster, dispatches to one or more adapters per processing mode, combines
//! results.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::adapters::{AdapterRegistry, PageRasterizer};
use crate::error::{PipelineError, PipelineResult};
use crate::metrics;
use crate::models::{Document, MediaType, ProcessingMode, RawOCRResult};

const HIGH_CONFIDENCE_THRESHOLD: f64 = 0.90;
const MAX_PARALLEL_ADAPTERS: usize = 3;

pub struct OcrOrchestrator {
    registry: Arc<AdapterRegistry>,
    rasterizer: Arc<dyn PageRasterizer>,
    adapter_timeout: Duration,
}

/// Outcome of an orchestrator run: the chosen result plus every per-provider
/// result, which is attached to the job as an observable diagnostic
/// artifact (spec §4.4 step 4).
pub struct OcrOutcome {
    pub chosen: RawOCRResult,
    pub all_results: Vec<RawOCRResult>,
}

impl OcrOrchestrator {
    pub fn new(registry: Arc<AdapterRegistry>, rasterizer: Arc<dyn PageRasterizer>, adapter_timeout: Duration) -> Self {
        Self { registry, rasterizer, adapter_timeout }
    }

    fn media_type_of(document: &Document) -> Option<MediaType> {
        MediaType::from_mime(&document.media_type)
    }

    /// Picks adapters to dispatch to for the given mode, in ascending
    /// adapter-id order for deterministic tie-breaks (spec §4.4). Adapters
    /// that don't declare support for `language_hint` are excluded before
    /// the cost/latency ranking runs.
    fn select_adapter_ids(&self, mode: ProcessingMode, media_type: MediaType, language_hint: Option<&str>) -> Vec<String> {
        let mut candidates: Vec<(String, f64, Duration)> = self
            .registry
            .ocr_adapters()
            .filter(|(_, adapter)| adapter.supports_media(media_type) || media_type == MediaType::Pdf)
            .filter_map(|(id, _)| {
                self.registry
                    .ocr_capability(id)
                    .map(|cap| (id.to_string(), cap.cost_per_page_usd, cap.avg_latency, cap.languages.clone()))
            })
            .filter(|(_, _, _, languages)| match language_hint {
                Some(lang) => languages.is_empty() || languages.iter().any(|l| l.eq_ignore_ascii_case(lang)),
                None => true,
            })
            .map(|(id, cost, latency, _)| (id, cost, latency))
            .collect();
        candidates.sort_by(|a, b| a.0.cmp(&b.0));

        match mode {
            ProcessingMode::CostEffective => candidates
                .iter()
                .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
                .map(|c| vec![c.0.clone()])
                .unwrap_or_default(),
            ProcessingMode::SpeedFirst => candidates
                .iter()
                .min_by_key(|c| c.2)
                .map(|c| vec![c.0.clone()])
                .unwrap_or_default(),
            ProcessingMode::AccuracyFirst => candidates.into_iter().take(MAX_PARALLEL_ADAPTERS).map(|c| c.0).collect(),
        }
    }

    /// Runs the full §4.4 algorithm for one input artifact.
    pub async fn process(
        &self,
        document: &Document,
        content_bytes: &[u8],
        language_hint: Option<&str>,
        cancellation: &CancellationToken,
    ) -> PipelineResult<OcrOutcome> {
        let media_type = Self::media_type_of(document)
            .ok_or_else(|| PipelineError::unsupported_media(document.media_type.clone()))?;

        let adapter_ids = self.select_adapter_ids(document.mode, media_type, language_hint);
        if adapter_ids.is_empty() {
            return Err(PipelineError::OcrAllFailed);
        }

        // Rasterize PDF input for adapters that don't document native PDF
        // support (spec §4.4 step 1, SPEC_FULL §10.8); pass originals to
        // adapters that do.
        let rasterized_page = if media_type == MediaType::Pdf {
            match self.rasterizer.rasterize_first_page(content_bytes).await {
                Ok(page) => Some(page),
                Err(err) => {
                    debug!(error = %err, "rasterization failed, relying on PDF-native adapters only");
                    None
                }
            }
        } else {
            None
        };

        let mut tasks = Vec::new();
        for id in &adapter_ids {
            let Some(adapter) = self.registry.get_ocr(id) else { continue };
            let wants_original = adapter.supports_media(MediaType::Pdf) && media_type == MediaType::Pdf;
            let bytes = if wants_original {
                content_bytes.to_vec()
            } else if let Some(page) = &rasterized_page {
                page.clone()
            } else {
                content_bytes.to_vec()
            };
            let dispatch_media = if wants_original { MediaType::Pdf } else { MediaType::Image };
            let cancellation = cancellation.clone();
            let deadline = self.adapter_timeout;
            let language_hint = language_hint.map(|s| s.to_string());
            let id = id.clone();
            tasks.push(async move {
                if cancellation.is_cancelled() {
                    return RawOCRResult::failure(
                        &id,
                        crate::models::AdapterError::new(crate::models::AdapterErrorKind::ProviderError, "cancelled before dispatch"),
                        Duration::ZERO,
                    );
                }
                let result = match timeout(deadline, adapter.extract(&bytes, dispatch_media, language_hint.as_deref())).await {
                    Ok(result) => result,
                    Err(_) => RawOCRResult::failure(
                        &id,
                        crate::models::AdapterError::new(crate::models::AdapterErrorKind::Timeout, "adapter call exceeded deadline"),
                        deadline,
                    ),
                };
                let outcome = if result.success { "success" } else { "failure" };
                metrics::record_adapter_call(&id, outcome, result.processing_time.as_secs_f64());
                result
            });
        }

        let results = if document.mode == ProcessingMode::AccuracyFirst {
            self.race_to_confidence(tasks, cancellation).await
        } else {
            join_all(tasks).await
        };

        let chosen = Self::combine(&results).ok_or(PipelineError::OcrAllFailed)?;
        info!(document_id = %document.id, provider = %chosen.provider_id, confidence = chosen.confidence, "ocr orchestrator selected result");
        Ok(OcrOutcome { chosen, all_results: results })
    }

    /// `accuracy_first` fan-out: launch up to N tasks, cancel stragglers
    /// once a high-confidence result arrives, else await all (spec §4.4,
    /// §9 "launch N tasks, await first-to-cross-threshold or all-complete").
    async fn race_to_confidence(
        &self,
        tasks: Vec<impl std::future::Future<Output = RawOCRResult>>,
        cancellation: &CancellationToken,
    ) -> Vec<RawOCRResult> {
        let mut pending: futures::stream::FuturesUnordered<_> = tasks.into_iter().collect();
        let mut results = Vec::new();
        use futures::StreamExt;
        while let Some(result) = pending.next().await {
            let hit_threshold = result.success && result.confidence >= HIGH_CONFIDENCE_THRESHOLD;
            results.push(result);
            if hit_threshold {
                cancellation.cancel();
                break;
            }
        }
        results
    }

    /// Combination rule per spec §4.4 step 3: if any successful result has
    /// confidence >= 0.90, pick the highest-confidence one among those;
    /// otherwise pick the one maximizing the weighted score. Ties break by
    /// ascending adapter id.
    fn combine(results: &[RawOCRResult]) -> Option<RawOCRResult> {
        let successful: Vec<&RawOCRResult> = results.iter().filter(|r| r.success).collect();

        let high_confidence: Vec<&RawOCRResult> =
            successful.iter().copied().filter(|r| r.confidence >= HIGH_CONFIDENCE_THRESHOLD).collect();

        let best = if !high_confidence.is_empty() {
            high_confidence
                .into_iter()
                .max_by(|a, b| a.confidence.partial_cmp(&b.confidence).unwrap().then_with(|| b.provider_id.cmp(&a.provider_id)))
        } else {
            successful.into_iter().max_by(|a, b| {
                a.combination_score()
                    .partial_cmp(&b.combination_score())
                    .unwrap()
                    .then_with(|| b.provider_id.cmp(&a.provider_id))
            })
        };

        best.cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AdapterError;
    use crate::models::AdapterErrorKind;

    fn ok(provider: &str, confidence: f64, text_len: usize) -> RawOCRResult {
        RawOCRResult::success(provider, "x".repeat(text_len), confidence, Duration::from_millis(100))
    }

    #[test]
    fn combine_prefers_highest_confidence_when_over_threshold() {
        let results = vec![ok("provider_a", 0.95, 500), ok("provider_b", 0.80, 2000)];
        let chosen = OcrOrchestrator::combine(&results).unwrap();
        assert_eq!(chosen.provider_id, "provider_a");
    }

    #[test]
    fn combine_uses_weighted_score_below_threshold() {
        let results = vec![ok("provider_a", 0.60, 100), ok("provider_b", 0.55, 5000)];
        let chosen = OcrOrchestrator::combine(&results).unwrap();
        assert_eq!(chosen.provider_id, "provider_b");
    }

    #[test]
    fn all_failed_returns_none() {
        let results = vec![RawOCRResult::failure(
            "provider_a",
            AdapterError::new(AdapterErrorKind::ProviderError, "boom"),
            Duration::from_millis(10),
        )];
        assert!(OcrOrchestrator::combine(&results).is_none());
    }

    #[test]
    fn tie_breaks_by_ascending_provider_id() {
        let results = vec![ok("provider_b", 0.95, 500), ok("provider_a", 0.95, 500)];
        let chosen = OcrOrchestrator::combine(&results).unwrap();
        assert_eq!(chosen.provider_id, "provider_a");
    }
}
