//! Registry Client (C2, spec §4.2), modeled on
//! `original_source/backend/ares_client.py`'s ARES economic-subjects lookup:
//! id validation, cache-before-call, linear-backoff retry, enrich-without-overwrite.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::cache::{CacheLookup, SharedRegistryCache};
use crate::error::{PipelineError, PipelineResult};
use crate::models::{Party, RegistryRecord};

const RETRY_DELAYS: [Duration; 3] = [Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(3)];

/// Validates and normalizes a registration id per spec §4.2: 1-8 decimal
/// digits after trimming and leading-zero strip.
pub fn normalize_registration_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let stripped = trimmed.trim_start_matches('0');
    let normalized = if stripped.is_empty() { "0" } else { stripped };
    if normalized.len() > 8 {
        return None;
    }
    Some(normalized.to_string())
}

#[derive(Debug, Deserialize, Default)]
struct AresResponse {
    ico: Option<String>,
    #[serde(rename = "obchodniJmeno")]
    obchodni_jmeno: Option<String>,
    dic: Option<String>,
    sidlo: Option<AresAddress>,
    #[serde(rename = "datumZaniku")]
    datum_zaniku: Option<String>,
    #[serde(rename = "seznamRegistraci")]
    seznam_registraci: Option<AresRegistrations>,
}

#[derive(Debug, Deserialize, Default)]
struct AresAddress {
    #[serde(rename = "textovaAdresa")]
    textova_adresa: Option<String>,
    #[serde(rename = "radkyAdresy")]
    radky_adresy: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct AresRegistrations {
    #[serde(rename = "stavZdrojeDph")]
    stav_zdroje_dph: Option<String>,
}

impl AresResponse {
    fn address(&self) -> Option<String> {
        let sidlo = self.sidlo.as_ref()?;
        if let Some(textual) = &sidlo.textova_adresa {
            if !textual.is_empty() {
                return Some(textual.clone());
            }
        }
        sidlo.radky_adresy.as_ref().map(|lines| lines.join(", "))
    }
}

pub struct RegistryClient {
    base_url: String,
    http: reqwest::Client,
    cache: SharedRegistryCache,
}

impl RegistryClient {
    pub fn new(base_url: impl Into<String>, http: reqwest::Client, cache: SharedRegistryCache) -> Self {
        Self { base_url: base_url.into(), http, cache }
    }

    /// `lookup` per spec §4.2. Returns `Ok(None)` for a definitive not-found
    /// (including invalid input, which skips the network call entirely).
    pub async fn lookup(&self, registration_id: &str) -> PipelineResult<Option<RegistryRecord>> {
        let Some(normalized) = normalize_registration_id(registration_id) else {
            return Ok(None);
        };

        match self.cache.get(&normalized).await {
            CacheLookup::Hit(record) => return Ok(Some(record)),
            CacheLookup::NegativeHit => return Ok(None),
            CacheLookup::Miss => {}
        }

        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), normalized);
        let mut last_error = None;

        for (attempt, delay) in std::iter::once(Duration::ZERO).chain(RETRY_DELAYS).enumerate() {
            if attempt > 0 {
                tokio::time::sleep(delay).await;
            }
            match self.http.get(&url).send().await {
                Ok(resp) if resp.status().as_u16() == 404 => {
                    self.cache.put_negative(&normalized).await;
                    return Ok(None);
                }
                Ok(resp) if resp.status().is_success() => {
                    let parsed: AresResponse = resp.json().await.unwrap_or_default();
                    let record = RegistryRecord {
                        registration_id: normalized.clone(),
                        name: parsed.obchodni_jmeno.clone(),
                        tax_id: parsed.dic.clone(),
                        address: parsed.address(),
                        active: parsed.datum_zaniku.is_none(),
                        tax_registered: parsed
                            .seznam_registraci
                            .as_ref()
                            .and_then(|r| r.stav_zdroje_dph.as_deref())
                            .map(|s| s.eq_ignore_ascii_case("AKTIVNI"))
                            .unwrap_or(false),
                        fetched_at: chrono::Utc::now(),
                    };
                    self.cache.put(&normalized, record.clone()).await;
                    return Ok(Some(record));
                }
                Ok(resp) if resp.status().is_server_error() => {
                    warn!(status = %resp.status(), registration_id = %normalized, "registry server error, retrying");
                    last_error = Some(PipelineError::registry_unavailable(format!("status {}", resp.status())));
                }
                Ok(resp) => {
                    last_error = Some(PipelineError::registry_unavailable(format!("unexpected status {}", resp.status())));
                }
                Err(err) if err.is_timeout() => {
                    debug!(registration_id = %normalized, attempt, "registry call timed out, retrying");
                    last_error = Some(PipelineError::timeout("registry_lookup"));
                }
                Err(err) => {
                    last_error = Some(PipelineError::transient_network(err.to_string()));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| PipelineError::registry_unavailable("retries exhausted")))
    }

    /// `enrich` per spec §4.2: copies only attributes the subject lacks;
    /// never overwrites caller-supplied values; always appends the
    /// `_enriched`/`_active`/`_tax_registered` flags when a record is found.
    pub async fn enrich(&self, subject: &mut Party) -> PipelineResult<Option<&'static str>> {
        let Some(registration_id) = subject.registration_number.clone() else {
            return Ok(None);
        };

        match self.lookup(&registration_id).await {
            Ok(Some(record)) => {
                if subject.name.is_none() {
                    subject.name = record.name;
                }
                if subject.tax_number.is_none() {
                    subject.tax_number = record.tax_id;
                }
                if subject.address.is_none() {
                    subject.address = record.address;
                }
                subject.enriched = true;
                subject.active = Some(record.active);
                subject.tax_registered = Some(record.tax_registered);
                Ok(Some("filled name/tax_id/address"))
            }
            Ok(None) => Ok(Some("registry record not found")),
            Err(err) if err.is_enrichment_non_fatal() => Ok(Some("registry_unavailable")),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_leading_zeros_and_bounds_length() {
        assert_eq!(normalize_registration_id(" 00012345 ").as_deref(), Some("12345"));
        assert_eq!(normalize_registration_id("123456789"), None);
        assert_eq!(normalize_registration_id("abc123"), None);
    }

    #[test]
    fn all_zero_id_normalizes_to_zero() {
        assert_eq!(normalize_registration_id("00000000").as_deref(), Some("0"));
    }
}
