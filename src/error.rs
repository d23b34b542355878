//! Crate-wide error type.
//!
//! One variant per error kind from the spec's error taxonomy. Each variant
//! carries a stable `kind()` identifier so a caller (or the status endpoint,
//! an external collaborator) can branch on it without string-matching
//! `Display` output.

use thiserror::Error;

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    #[error("unsupported media type: {media_type}")]
    UnsupportedMedia { media_type: String },

    #[error("all OCR providers failed")]
    OcrAllFailed,

    #[error("LLM response could not be parsed as structured data")]
    LlmParseFailed,

    #[error("LLM call would exceed cost ceiling for owner {owner_id}")]
    LlmCostCeiling { owner_id: String },

    #[error("registry lookup unavailable: {message}")]
    RegistryUnavailable { message: String },

    #[error("registry record not found for id {registration_id}")]
    RegistryNotFound { registration_id: String },

    #[error("operation timed out: {operation}")]
    Timeout { operation: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("transient network error: {message}")]
    TransientNetwork { message: String },

    #[error("provider authentication failed: {provider}")]
    ProviderAuth { provider: String },

    #[error("persistence error: {message}")]
    Persistence { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl PipelineError {
    /// Stable identifier from spec §7, suitable for exposing to callers.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "invalid_input",
            Self::UnsupportedMedia { .. } => "unsupported_media",
            Self::OcrAllFailed => "ocr_all_failed",
            Self::LlmParseFailed => "llm_parse_failed",
            Self::LlmCostCeiling { .. } => "llm_cost_ceiling",
            Self::RegistryUnavailable { .. } => "registry_unavailable",
            Self::RegistryNotFound { .. } => "registry_not_found",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled => "cancelled",
            Self::TransientNetwork { .. } => "transient_network",
            Self::ProviderAuth { .. } => "provider_auth",
            Self::Persistence { .. } => "persistence_error",
            Self::Internal { .. } => "internal",
        }
    }

    /// Whether the failure is transient and worth retrying (§7 propagation policy).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransientNetwork { .. } | Self::Timeout { .. }
        )
    }

    /// Whether the failure is non-fatal to the pipeline run (§7: registry
    /// failures only ever annotate enrichment, never fail the Document).
    /// `Timeout`/`TransientNetwork` are produced only by the Registry Client
    /// (see `registry_client.rs`), so they belong here alongside the two
    /// registry-specific variants.
    pub fn is_enrichment_non_fatal(&self) -> bool {
        matches!(
            self,
            Self::RegistryUnavailable { .. }
                | Self::RegistryNotFound { .. }
                | Self::Timeout { .. }
                | Self::TransientNetwork { .. }
        )
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput { message: message.into() }
    }

    pub fn unsupported_media(media_type: impl Into<String>) -> Self {
        Self::UnsupportedMedia { media_type: media_type.into() }
    }

    pub fn registry_unavailable(message: impl Into<String>) -> Self {
        Self::RegistryUnavailable { message: message.into() }
    }

    pub fn registry_not_found(registration_id: impl Into<String>) -> Self {
        Self::RegistryNotFound { registration_id: registration_id.into() }
    }

    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout { operation: operation.into() }
    }

    pub fn transient_network(message: impl Into<String>) -> Self {
        Self::TransientNetwork { message: message.into() }
    }

    pub fn provider_auth(provider: impl Into<String>) -> Self {
        Self::ProviderAuth { provider: provider.into() }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }
}

impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        Self::Persistence { message: err.to_string() }
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout { operation: "http_request".to_string() }
        } else {
            Self::TransientNetwork { message: err.to_string() }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_spec_identifiers() {
        assert_eq!(PipelineError::OcrAllFailed.kind(), "ocr_all_failed");
        assert_eq!(
            PipelineError::registry_not_found("00000000").kind(),
            "registry_not_found"
        );
        assert_eq!(PipelineError::Cancelled.kind(), "cancelled");
    }

    #[test]
    fn registry_failures_are_enrichment_non_fatal() {
        assert!(PipelineError::registry_unavailable("down").is_enrichment_non_fatal());
        assert!(PipelineError::registry_not_found("1").is_enrichment_non_fatal());
        assert!(!PipelineError::OcrAllFailed.is_enrichment_non_fatal());
    }

    #[test]
    fn transient_kinds_are_retryable() {
        assert!(PipelineError::timeout("ocr").is_retryable());
        assert!(PipelineError::transient_network("reset").is_retryable());
        assert!(!PipelineError::LlmParseFailed.is_retryable());
    }
}
