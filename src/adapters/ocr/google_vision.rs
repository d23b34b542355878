use std::time::Instant;

use async_trait::async_trait;
use base64::Engine;
use serde_json::json;

use crate::adapters::OcrAdapter;
use crate::models::{AdapterError, AdapterErrorKind, MediaType, RawOCRResult};

/// Google Cloud Vision `document_text_detection`, grounded on
/// `original_source/backend/ocr_manager.py`'s Vision client usage.
pub struct GoogleVisionAdapter {
    api_key: String,
    http: reqwest::Client,
}

impl GoogleVisionAdapter {
    pub fn new(api_key: String, http: reqwest::Client) -> Self {
        Self { api_key, http }
    }

    fn endpoint(&self) -> String {
        format!("https://vision.googleapis.com/v1/images:annotate?key={}", self.api_key)
    }
}

#[async_trait]
impl OcrAdapter for GoogleVisionAdapter {
    fn id(&self) -> &str {
        "google_vision"
    }

    fn supports_media(&self, media_type: MediaType) -> bool {
        matches!(media_type, MediaType::Image)
    }

    async fn extract(&self, content_bytes: &[u8], media_type: MediaType, _language_hint: Option<&str>) -> RawOCRResult {
        let started = Instant::now();
        if !self.supports_media(media_type) {
            return RawOCRResult::failure(
                self.id(),
                AdapterError::new(AdapterErrorKind::UnsupportedMedia, "google_vision only accepts raster images"),
                started.elapsed(),
            );
        }

        let encoded = base64::engine::general_purpose::STANDARD.encode(content_bytes);
        let body = json!({
            "requests": [{
                "image": {"content": encoded},
                "features": [{"type": "DOCUMENT_TEXT_DETECTION"}],
            }]
        });

        let response = self.http.post(self.endpoint()).json(&body).send().await;
        match response {
            Ok(resp) if resp.status().is_success() => match resp.json::<serde_json::Value>().await {
                Ok(payload) => {
                    let text = payload["responses"][0]["fullTextAnnotation"]["text"]
                        .as_str()
                        .unwrap_or_default()
                        .to_string();
                    if text.is_empty() {
                        RawOCRResult::failure(
                            self.id(),
                            AdapterError::new(AdapterErrorKind::ProviderError, "empty annotation"),
                            started.elapsed(),
                        )
                    } else {
                        RawOCRResult::success(self.id(), text, 0.92, started.elapsed())
                    }
                }
                Err(err) => RawOCRResult::failure(
                    self.id(),
                    AdapterError::new(AdapterErrorKind::ProviderError, err.to_string()),
                    started.elapsed(),
                ),
            },
            Ok(resp) if resp.status().as_u16() == 401 || resp.status().as_u16() == 403 => RawOCRResult::failure(
                self.id(),
                AdapterError::new(AdapterErrorKind::Auth, "google vision rejected credentials"),
                started.elapsed(),
            ),
            Ok(resp) if resp.status().as_u16() == 429 => RawOCRResult::failure(
                self.id(),
                AdapterError::new(AdapterErrorKind::RateLimit, "google vision rate limited"),
                started.elapsed(),
            ),
            Ok(resp) => RawOCRResult::failure(
                self.id(),
                AdapterError::new(AdapterErrorKind::ProviderError, format!("status {}", resp.status())),
                started.elapsed(),
            ),
            Err(err) if err.is_timeout() => RawOCRResult::failure(
                self.id(),
                AdapterError::new(AdapterErrorKind::Timeout, "google vision timed out"),
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
