//! Provider Adapters (C1, spec §4.1): a uniform contract over OCR and LLM
//! providers, a capability table, and a registry where an uninitialized
//! adapter is absent rather than an error.

pub mod llm;
pub mod ocr;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::models::{LLMResult, MediaType, RawOCRResult};

#[async_trait]
pub trait OcrAdapter: Send + Sync {
    fn id(&self) -> &str;
    fn supports_media(&self, media_type: MediaType) -> bool;
    async fn extract(&self, content_bytes: &[u8], media_type: MediaType, language_hint: Option<&str>) -> RawOCRResult;
}

#[async_trait]
pub trait LlmAdapter: Send + Sync {
    fn id(&self) -> &str;
    async fn structure(&self, prompt: &str, max_tokens: u32, cost_ceiling: f64) -> LLMResult;
}

/// PDF rasterization is out of scope to implement (Non-goal: "rendering
/// documents"); callers inject a concrete rasterizer. See spec §9(c),
/// SPEC_FULL §10.8.
#[async_trait]
pub trait PageRasterizer: Send + Sync {
    async fn rasterize_first_page(&self, pdf_bytes: &[u8]) -> Result<Vec<u8>, String>;
    async fn rasterize_all_pages(&self, pdf_bytes: &[u8]) -> Result<Vec<Vec<u8>>, String>;
}

/// Capability row for an OCR adapter (spec §4.1: "confidence baseline and
/// per-page cost for OCR").
#[derive(Debug, Clone)]
pub struct OcrCapability {
    pub confidence_baseline: f64,
    pub cost_per_page_usd: f64,
    pub avg_latency: Duration,
    pub languages: Vec<String>,
}

/// Capability row for an LLM adapter (spec §4.1 + §4.5 scoring inputs).
#[derive(Debug, Clone)]
pub struct LlmCapability {
    pub accuracy: f64,
    pub cost_per_1k_tokens_usd: f64,
    pub speed: f64,
    pub language_support: f64,
    pub reasoning: f64,
    pub avg_latency: Duration,
}

/// Static start-up registry of initialized adapters plus their capability
/// table (spec §4.1). Adapters absent from the registry are simply not
/// dispatched to; this is not an error condition.
#[derive(Default)]
pub struct AdapterRegistry {
    ocr_adapters: HashMap<String, Arc<dyn OcrAdapter>>,
    ocr_capabilities: HashMap<String, OcrCapability>,
    llm_adapters: HashMap<String, Arc<dyn LlmAdapter>>,
    llm_capabilities: HashMap<String, LlmCapability>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_ocr(&mut self, adapter: Arc<dyn OcrAdapter>, capability: OcrCapability) {
        let id = adapter.id().to_string();
        self.ocr_adapters.insert(id.clone(), adapter);
        self.ocr_capabilities.insert(id, capability);
    }

    pub fn register_llm(&mut self, adapter: Arc<dyn LlmAdapter>, capability: LlmCapability) {
        let id = adapter.id().to_string();
        self.llm_adapters.insert(id.clone(), adapter);
        self.llm_capabilities.insert(id, capability);
    }

    pub fn ocr_adapters(&self) -> impl Iterator<Item = (&str, &Arc<dyn OcrAdapter>)> {
        self.ocr_adapters.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn llm_adapters(&self) -> impl Iterator<Item = (&str, &Arc<dyn LlmAdapter>)> {
        self.llm_adapters.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn ocr_capability(&self, id: &str) -> Option<&OcrCapability> {
        self.ocr_capabilities.get(id)
    }

    pub fn llm_capability(&self, id: &str) -> Option<&LlmCapability> {
        self.llm_capabilities.get(id)
    }

    pub fn get_ocr(&self, id: &str) -> Option<Arc<dyn OcrAdapter>> {
        self.ocr_adapters.get(id).cloned()
    }

    pub fn get_llm(&self, id: &str) -> Option<Arc<dyn LlmAdapter>> {
        self.llm_adapters.get(id).cloned()
    }

    pub fn is_empty_ocr(&self) -> bool {
        self.ocr_adapters.is_empty()
    }

    pub fn is_empty_llm(&self) -> bool {
        self.llm_adapters.is_empty()
    }
}
