use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Image,
    Pdf,
}

impl MediaType {
    pub fn from_mime(mime: &str) -> Option<Self> {
        if mime.starts_with("image/") {
            Some(Self::Image)
        } else if mime == "application/pdf" {
            Some(Self::Pdf)
        } else {
            None
        }
    }
}

/// Error taxonomy shared by OCR and LLM adapters (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterErrorKind {
    Auth,
    RateLimit,
    Timeout,
    UnsupportedMedia,
    ProviderError,
    TransientNetwork,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterError {
    pub kind: AdapterErrorKind,
    pub message: String,
}

impl AdapterError {
    pub fn new(kind: AdapterErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}

/// Result of a single OCR adapter call. Immutable once produced (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawOCRResult {
    pub provider_id: String,
    pub text: String,
    pub confidence: f64,
    pub processing_time: Duration,
    pub success: bool,
    pub error: Option<AdapterError>,
}

impl RawOCRResult {
    pub fn success(provider_id: impl Into<String>, text: String, confidence: f64, processing_time: Duration) -> Self {
        Self {
            provider_id: provider_id.into(),
            text,
            confidence: confidence.clamp(0.0, 1.0),
            processing_time,
            success: true,
            error: None,
        }
    }

    pub fn failure(provider_id: impl Into<String>, error: AdapterError, processing_time: Duration) -> Self {
        Self {
            provider_id: provider_id.into(),
            text: String::new(),
            confidence: 0.0,
            processing_time,
            success: false,
            error: Some(error),
        }
    }

    /// Combination score from spec §4.4: `0.7*confidence + 0.3*min(len/1000,1)`.
    pub fn combination_score(&self) -> f64 {
        let length_score = (self.text.chars().count() as f64 / 1000.0).min(1.0);
        0.7 * self.confidence + 0.3 * length_score
    }
}

/// Result of a single LLM adapter call (spec §4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMResult {
    pub text: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub cost_usd: f64,
    pub latency: Duration,
    pub confidence_hint: f64,
    pub error: Option<AdapterError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combination_score_caps_length_contribution() {
        let short = RawOCRResult::success("p1", "hi".into(), 0.5, Duration::from_secs(1));
        let long = RawOCRResult::success("p2", "x".repeat(5000), 0.5, Duration::from_secs(1));
        assert!(long.combination_score() > short.combination_score());
        assert!((long.combination_score() - 0.65).abs() < 1e-9);
    }
}
