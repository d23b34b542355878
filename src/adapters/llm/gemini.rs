use std::time::Instant;

use async_trait::async_trait;
use serde_json::json;

use crate::adapters::LlmAdapter;
use crate::models::{AdapterError, AdapterErrorKind, LLMResult};

/// `gemini-2.0-flash`, grounded on the teacher's
/// `src/services/ocr_service.rs::process_image_with_gemini` REST payload
/// shape, adapted here for text-only structuring calls.
pub struct GeminiAdapter {
    api_key: String,
    model: String,
    cost_per_1k_input_usd: f64,
    cost_per_1k_output_usd: f64,
    http: reqwest::Client,
}

impl GeminiAdapter {
    pub fn new(api_key: String, http: reqwest::Client) -> Self {
        Self {
            api_key,
            model: "gemini-2.0-flash".to_string(),
            cost_per_1k_input_usd: 0.000075,
            cost_per_1k_output_usd: 0.0003,
            http,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        )
    }
}

#[async_trait]
impl LlmAdapter for GeminiAdapter {
    fn id(&self) -> &str {
        "gemini-2.0-flash"
    }

    async fn structure(&self, prompt: &str, max_tokens: u32, cost_ceiling: f64) -> LLMResult {
        let started = Instant::now();
        let body = json!({
            "contents": [{"parts": [{"text": prompt}]}],
            "generationConfig": {"maxOutputTokens": max_tokens, "temperature": 0.0},
        });

        let response = self.http.post(self.endpoint()).json(&body).send().await;
        match response {
            Ok(resp) if resp.status().is_success() => match resp.json::<serde_json::Value>().await {
                Ok(payload) => {
                    let text = payload["candidates"][0]["content"]["parts"][0]["text"]
                        .as_str()
                        .unwrap_or_default()
                        .to_string();
                    let tokens_in = payload["usageMetadata"]["promptTokenCount"].as_u64().unwrap_or(0) as u32;
                    let tokens_out = payload["usageMetadata"]["candidatesTokenCount"].as_u64().unwrap_or(0) as u32;
                    let cost_usd = tokens_in as f64 / 1000.0 * self.cost_per_1k_input_usd
                        + tokens_out as f64 / 1000.0 * self.cost_per_1k_output_usd;
                    if cost_usd > cost_ceiling {
                        LLMResult {
                            text: String::new(),
                            tokens_in,
                            tokens_out,
                            cost_usd: 0.0,
                            latency: started.elapsed(),
                            confidence_hint: 0.0,
                            error: Some(AdapterError::new(AdapterErrorKind::ProviderError, "response exceeded cost ceiling")),
                        }
                    } else {
                        LLMResult {
                            text,
                            tokens_in,
                            tokens_out,
                            cost_usd,
                            latency: started.elapsed(),
                            confidence_hint: 0.85,
                            error: None,
                        }
                    }
                }
                Err(err) => error_result(started.elapsed(), AdapterErrorKind::ProviderError, err.to_string()),
            },
            Ok(resp) if resp.status().as_u16() == 401 || resp.status().as_u16() == 403 => {
                error_result(started.elapsed(), AdapterErrorKind::Auth, "gemini rejected credentials")
            }
            Ok(resp) if resp.status().as_u16() == 429 => {
                error_result(started.elapsed(), AdapterErrorKind::RateLimit, "gemini rate limited")
            }
            Ok(resp) => error_result(started.elapsed(), AdapterErrorKind::ProviderError, format!("status {}", resp.status())),
            Err(err) if err.is_timeout() => error_result(started.elapsed(), AdapterErrorKind::Timeout, "gemini timed out"),
            Err(err) => error_result(started.elapsed(), AdapterErrorKind::TransientNetwork, err.to_string()),
        }
    }
}

fn error_result(latency: std::time::Duration, kind: AdapterErrorKind, message: impl Into<String>) -> LLMResult {
    LLMResult {
        text: String::new(),
        tokens_in: 0,
        tokens_out: 0,
        cost_usd: 0.0,
        latency,
        confidence_hint: 0.0,
        error: Some(AdapterError::new(kind, message)),
    }
}
