//! Environment-driven configuration, shaped like the teacher's
//! `shared/src/config.rs` `Config::from_env()`: nested sub-configs, each
//! field defaulted independently so a partial environment still produces a
//! usable config.

use std::env;

#[derive(Debug, Clone)]
pub struct JobManagerConfig {
    pub worker_count: usize,
    pub job_retention_hours: i64,
}

impl JobManagerConfig {
    fn from_env() -> Self {
        Self {
            worker_count: env::var("WORKER_COUNT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            job_retention_hours: env::var("JOB_RETENTION_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(24),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegistryClientConfig {
    pub base_url: String,
    pub cache_ttl_seconds: i64,
    pub cache_negative_ttl_seconds: i64,
    pub cache_max_entries: usize,
    pub retry_attempts: u32,
}

impl RegistryClientConfig {
    fn from_env() -> Self {
        Self {
            base_url: env::var("REGISTRY_BASE_URL")
                .unwrap_or_else(|_| "https://ares.gov.cz/ekonomicke-subjekty-v-be/rest/ekonomicke-subjekty".to_string()),
            cache_ttl_seconds: env::var("REGISTRY_CACHE_TTL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(24 * 3600),
            cache_negative_ttl_seconds: env::var("REGISTRY_CACHE_NEGATIVE_TTL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(600),
            cache_max_entries: env::var("REGISTRY_CACHE_MAX_ENTRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1000),
            retry_attempts: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CostLimitsConfig {
    pub max_daily_cost_usd: f64,
    pub max_monthly_cost_usd: f64,
}

impl CostLimitsConfig {
    fn from_env() -> Self {
        Self {
            max_daily_cost_usd: env::var("MAX_DAILY_COST_USD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10.0),
            max_monthly_cost_usd: env::var("MAX_MONTHLY_COST_USD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(150.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultMode {
    AccuracyFirst,
    CostEffective,
    SpeedFirst,
}

impl DefaultMode {
    fn from_str_or_default(s: &str) -> Self {
        match s {
            "accuracy_first" => Self::AccuracyFirst,
            "speed_first" => Self::SpeedFirst,
            _ => Self::CostEffective,
        }
    }

    pub fn into_processing_mode(self) -> crate::models::ProcessingMode {
        match self {
            Self::AccuracyFirst => crate::models::ProcessingMode::AccuracyFirst,
            Self::CostEffective => crate::models::ProcessingMode::CostEffective,
            Self::SpeedFirst => crate::models::ProcessingMode::SpeedFirst,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessingDefaults {
    pub default_mode: DefaultMode,
    pub ocr_timeout_seconds: u64,
    pub llm_timeout_seconds: u64,
}

impl ProcessingDefaults {
    fn from_env() -> Self {
        Self {
            default_mode: DefaultMode::from_str_or_default(
                &env::var("DEFAULT_PROCESSING_MODE").unwrap_or_else(|_| "cost_effective".to_string()),
            ),
            ocr_timeout_seconds: env::var("OCR_TIMEOUT_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(15),
            llm_timeout_seconds: env::var("LLM_TIMEOUT_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
        }
    }
}

/// Per-adapter provider API keys (spec §6: `OCR_PROVIDER_KEYS.*`,
/// `LLM_PROVIDER_KEY`). An absent key disables that adapter rather than
/// erroring (spec §4.1: "An uninitialized adapter is absent, not an error").
#[derive(Debug, Clone, Default)]
pub struct ProviderKeys {
    pub google_vision_key: Option<String>,
    pub azure_document_intelligence_key: Option<String>,
    pub azure_document_intelligence_endpoint: Option<String>,
    pub gemini_key: Option<String>,
    pub openrouter_key: Option<String>,
}

impl ProviderKeys {
    fn from_env() -> Self {
        Self {
            google_vision_key: env::var("OCR_PROVIDER_KEYS_GOOGLE_VISION").ok(),
            azure_document_intelligence_key: env::var("OCR_PROVIDER_KEYS_AZURE_DOCUMENT_INTELLIGENCE").ok(),
            azure_document_intelligence_endpoint: env::var("AZURE_DOCUMENT_INTELLIGENCE_ENDPOINT").ok(),
            gemini_key: env::var("LLM_PROVIDER_KEY").ok(),
            openrouter_key: env::var("OPENROUTER_API_KEY").ok(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub job_manager: JobManagerConfig,
    pub registry_client: RegistryClientConfig,
    pub cost_limits: CostLimitsConfig,
    pub processing: ProcessingDefaults,
    pub provider_keys: ProviderKeys,
    pub database_url: String,
    pub redis_url: String,
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        Self {
            job_manager: JobManagerConfig::from_env(),
            registry_client: RegistryClientConfig::from_env(),
            cost_limits: CostLimitsConfig::from_env(),
            processing: ProcessingDefaults::from_env(),
            provider_keys: ProviderKeys::from_env(),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/invoice_pipeline".to_string()),
            redis_url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_manager_defaults_match_spec() {
        let cfg = JobManagerConfig { worker_count: 5, job_retention_hours: 24 };
        assert_eq!(cfg.worker_count, 5);
        assert_eq!(cfg.job_retention_hours, 24);
    }

    #[test]
    fn unknown_mode_string_falls_back_to_cost_effective() {
        assert_eq!(DefaultMode::from_str_or_default("bogus"), DefaultMode::CostEffective);
    }
}
