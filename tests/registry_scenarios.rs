//! Registry Client boundary behaviors and the registry-timeout enrichment
//! scenario, exercised against a real HTTP mock server rather than a fake
//! adapter, since the retry/backoff/cache logic lives in the HTTP client
//! itself.

mod common;

use std::sync::Arc;
use std::time::Duration;

use invoice_pipeline::cache::RegistryCache;
use invoice_pipeline::models::{Party, StructuredRecord};
use invoice_pipeline::registry_client::{normalize_registration_id, RegistryClient};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fresh_cache() -> Arc<RegistryCache> {
    Arc::new(RegistryCache::new(10, 3600, 600, None))
}

#[tokio::test]
async fn all_zero_registration_id_is_not_found_without_error() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/0"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let client = RegistryClient::new(mock_server.uri(), reqwest::Client::new(), fresh_cache());
    let record = client.lookup("00000000").await.unwrap();
    assert!(record.is_none());
}

#[tokio::test]
async fn an_invalid_registration_id_never_reaches_the_network() {
    let mock_server = MockServer::start().await;
    // Deliberately no mocks mounted: any outbound call would hit wiremock's
    // default 404 responder, but `lookup` must return before building a URL.
    let client = RegistryClient::new(mock_server.uri(), reqwest::Client::new(), fresh_cache());

    assert!(normalize_registration_id("123456789").is_none());
    assert!(normalize_registration_id("not-a-number").is_none());

    let record = client.lookup("123456789").await.unwrap();
    assert!(record.is_none());
    let record = client.lookup("not-a-number").await.unwrap();
    assert!(record.is_none());

    let requests = mock_server.received_requests().await.expect("request recording is on by default");
    assert!(requests.is_empty(), "an invalid registration id must short-circuit before any HTTP call");
}

#[tokio::test]
async fn registry_found_record_fills_only_missing_vendor_attributes() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/12345678"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "ico": "12345678",
            "obchodniJmeno": "ABC s.r.o.",
            "dic": "CZ12345678",
            "sidlo": {"textovaAdresa": "Praha 1, Hlavní 10"},
        })))
        .mount(&mock_server)
        .await;

    let client = RegistryClient::new(mock_server.uri(), reqwest::Client::new(), fresh_cache());
    let mut vendor = Party { registration_number: Some("12345678".to_string()), address: Some("caller-supplied address".to_string()), ..Party::default() };
    let outcome = client.enrich(&mut vendor).await.unwrap();

    assert_eq!(outcome, Some("filled name/tax_id/address"));
    assert_eq!(vendor.name.as_deref(), Some("ABC s.r.o."));
    assert_eq!(vendor.tax_number.as_deref(), Some("CZ12345678"));
    // Caller-supplied address is never overwritten.
    assert_eq!(vendor.address.as_deref(), Some("caller-supplied address"));
    assert!(vendor.enriched);
    assert_eq!(vendor.active, Some(true));
}

/// Registry calls that keep timing out must never fail the document: the
/// enrichment stage annotates `_enrichment_meta` and leaves the
/// LLM-extracted vendor fields untouched. Runs the actual retry/backoff
/// path in `registry_client.rs`, so it pays the full ~1s+2s+3s retry
/// schedule in wall-clock time.
#[tokio::test]
async fn repeated_registry_timeouts_are_annotated_not_fatal() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/99999999"))
        .respond_with(ResponseTemplate::new(500).set_delay(Duration::from_secs(2)))
        .mount(&mock_server)
        .await;

    let http = reqwest::Client::builder().timeout(Duration::from_millis(150)).build().unwrap();
    let client = RegistryClient::new(mock_server.uri(), http, fresh_cache());

    let mut record = StructuredRecord::default();
    record.vendor.name = Some("ABC s.r.o.".to_string());
    record.vendor.registration_number = Some("99999999".to_string());

    invoice_pipeline::enrichment::enrich(&mut record, &client).await.unwrap();

    assert!(!record.enrichment_meta.success);
    assert!(record.enrichment_meta.notes.iter().any(|n| n == "registry_unavailable"));
    // The LLM-supplied vendor name survives a registry outage unchanged.
    assert_eq!(record.vendor.name.as_deref(), Some("ABC s.r.o."));
    assert!(!record.vendor.enriched);
}
