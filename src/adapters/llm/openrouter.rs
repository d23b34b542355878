use std::time::Instant;

use async_trait::async_trait;
use serde_json::json;

use crate::adapters::LlmAdapter;
use crate::models::{AdapterError, AdapterErrorKind, LLMResult};

/// One cost/accuracy tier of the OpenRouter fallback cascade
/// (`qwen3-vl-8b` -> `qwen3-vl-30b` -> `qwen2.5-vl-72b`), grounded on
/// `original_source/backend/gemini_decision_engine.py`'s cascade and the
/// teacher's OpenRouter usage in `src/services/ocr_service.rs`.
pub struct OpenRouterAdapter {
    api_key: String,
    model: String,
    cost_per_1k_input_usd: f64,
    cost_per_1k_output_usd: f64,
    http: reqwest::Client,
}

impl OpenRouterAdapter {
    pub fn new(api_key: String, model: impl Into<String>, cost_per_1k_input_usd: f64, cost_per_1k_output_usd: f64, http: reqwest::Client) -> Self {
        Self { api_key, model: model.into(), cost_per_1k_input_usd, cost_per_1k_output_usd, http }
    }

    pub fn qwen3_vl_8b(api_key: String, http: reqwest::Client) -> Self {
        Self::new(api_key, "qwen/qwen3-vl-8b-instruct", 0.00003, 0.00009, http)
    }

    pub fn qwen3_vl_30b(api_key: String, http: reqwest::Client) -> Self {
        Self::new(api_key, "qwen/qwen3-vl-30b-instruct", 0.00012, 0.00036, http)
    }

    pub fn qwen2_5_vl_72b(api_key: String, http: reqwest::Client) -> Self {
        Self::new(api_key, "qwen/qwen2.5-vl-72b-instruct", 0.00035, 0.0007, http)
    }
}

#[async_trait]
impl LlmAdapter for OpenRouterAdapter {
    fn id(&self) -> &str {
        &self.model
    }

    async fn structure(&self, prompt: &str, max_tokens: u32, cost_ceiling: f64) -> LLMResult {
        let started = Instant::now();
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": max_tokens,
            "temperature": 0.0,
        });

        let response = self
            .http
            .post("https://openrouter.ai/api/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => match resp.json::<serde_json::Value>().await {
                Ok(payload) => {
                    let text = payload["choices"][0]["message"]["content"].as_str().unwrap_or_default().to_string();
                    let tokens_in = payload["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32;
                    let tokens_out = payload["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32;
                    let cost_usd = tokens_in as f64 / 1000.0 * self.cost_per_1k_input_usd
                        + tokens_out as f64 / 1000.0 * self.cost_per_1k_output_usd;
                    if cost_usd > cost_ceiling {
                        error_result(started.elapsed(), AdapterErrorKind::ProviderError, "response exceeded cost ceiling")
                    } else {
                        LLMResult { text, tokens_in, tokens_out, cost_usd, latency: started.elapsed(), confidence_hint: 0.75, error: None }
                    }
                }
                Err(err) => error_result(started.elapsed(), AdapterErrorKind::ProviderError, err.to_string()),
            },
            Ok(resp) if resp.status().as_u16() == 401 => error_result(started.elapsed(), AdapterErrorKind::Auth, "openrouter rejected credentials"),
            Ok(resp) if resp.status().as_u16() == 429 => error_result(started.elapsed(), AdapterErrorKind::RateLimit, "openrouter rate limited"),
            Ok(resp) => error_result(started.elapsed(), AdapterErrorKind::ProviderError, format!("status {}", resp.status())),
            Err(err) if err.is_timeout() => error_result(started.elapsed(), AdapterErrorKind::Timeout, "openrouter timed out"),
            Err(err) => error_result(started.elapsed(), AdapterErrorKind::TransientNetwork, err.to_string()),
        }
    }
}

fn error_result(latency: std::time::Duration, kind: AdapterErrorKind, message: impl Into<String>) -> LLMResult {
    LLMResult { text: String::new(), tokens_in: 0, tokens_out: 0, cost_usd: 0.0, latency, confidence_hint: 0.0, error: Some(AdapterError::new(kind, message)) }
}
