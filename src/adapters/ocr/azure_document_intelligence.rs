use std::time::Instant;

use async_trait::async_trait;

use crate::adapters::OcrAdapter;
use crate::models::{AdapterError, AdapterErrorKind, MediaType, RawOCRResult};

/// Azure Document Intelligence ("Form Recognizer"). Documents PDF support
/// natively, so the OCR Orchestrator passes it original bytes instead of a
/// rasterized page (spec §4.4 step 1).
pub struct AzureDocumentIntelligenceAdapter {
    endpoint: String,
    api_key: String,
    http: reqwest::Client,
}

impl AzureDocumentIntelligenceAdapter {
    pub fn new(endpoint: String, api_key: String, http: reqwest::Client) -> Self {
        Self { endpoint, api_key, http }
    }
}

#[async_trait]
impl OcrAdapter for AzureDocumentIntelligenceAdapter {
    fn id(&self) -> &str {
        "azure_document_intelligence"
    }

    fn supports_media(&self, media_type: MediaType) -> bool {
        matches!(media_type, MediaType::Image | MediaType::Pdf)
    }

    async fn extract(&self, content_bytes: &[u8], _media_type: MediaType, _language_hint: Option<&str>) -> RawOCRResult {
        let started = Instant::now();
        let url = format!(
            "{}/formrecognizer/documentModels/prebuilt-invoice:analyze?api-version=2023-07-31",
            self.endpoint.trim_end_matches('/')
        );

        let response = self
            .http
            .post(&url)
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .header("Content-Type", "application/octet-stream")
            .body(content_bytes.to_vec())
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() || resp.status().as_u16() == 202 => {
                match resp.json::<serde_json::Value>().await {
                    Ok(payload) => {
                        let text = payload["analyzeResult"]["content"].as_str().unwrap_or_default().to_string();
                        if text.is_empty() {
                            RawOCRResult::failure(
                                self.id(),
                                AdapterError::new(AdapterErrorKind::ProviderError, "no content in analyze result"),
                                started.elapsed(),
                            )
                        } else {
                            RawOCRResult::success(self.id(), text, 0.88, started.elapsed())
                        }
                    }
                    Err(err) => RawOCRResult::failure(
                        self.id(),
                        AdapterError::new(AdapterErrorKind::ProviderError, err.to_string()),
                        started.elapsed(),
                    ),
                }
            }
            Ok(resp) if resp.status().as_u16() == 401 => RawOCRResult::failure(
                self.id(),
                AdapterError::new(AdapterErrorKind::Auth, "azure rejected subscription key"),
                started.elapsed(),
            ),
            Ok(resp) if resp.status().as_u16() == 429 => RawOCRResult::failure(
                self.id(),
                AdapterError::new(AdapterErrorKind::RateLimit, "azure rate limited"),
                started.elapsed(),
            ),
            Ok(resp) => RawOCRResult::failure(
                self.id(),
                AdapterError::new(AdapterErrorKind::ProviderError, format!("status {}", resp.status())),
                started.elapsed(),
            ),
            Err(err) if err.is_timeout() => RawOCRResult::failure(
                self.id(),
                AdapterError::new(AdapterErrorKind::Timeout, "azure document intelligence timed out"),
                started.elapsed(),
            ),
            Err(err) => RawOCRResult::failure(
                self.id(),
                AdapterError::new(AdapterErrorKind::TransientNetwork, err.to_string()),
                started.elapsed(),
            ),
        }
    }
}
