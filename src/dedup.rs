//! Duplicate Detector (C7, spec §4.7). Fingerprint shape grounded on
//! `original_source/backend/services/duplicate_detection_service.py`'s
//! sorted-field SHA-256 hash, implemented over a fixed field tuple rather
//! than a free-form dict so hashing is stable without depending on JSON key
//! ordering.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::StructuredRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    Exact,
    NumberVendor,
}

#[derive(Debug, Clone)]
pub struct DuplicateMatch {
    pub document_id: Uuid,
    pub match_type: MatchType,
}

#[derive(Debug, Clone)]
pub struct DuplicateCheckResult {
    pub is_duplicate: bool,
    pub matches: Vec<DuplicateMatch>,
}

/// A candidate row to compare against, as the Persistence Gateway would
/// return it for a given owner.
pub struct ExistingRecord {
    pub document_id: Uuid,
    pub fingerprint: String,
    pub invoice_number: Option<String>,
    pub vendor_name: Option<String>,
    pub total_amount: Option<String>,
    pub date_issued: Option<String>,
}

/// `fingerprint` per spec §3: 256-bit hex over normalized
/// {invoice_number, vendor.name lowercased/trimmed, total_amount.value
/// rounded to 2 places, date_issued, currency upper-cased}. Null inputs are
/// omitted before hashing.
pub fn fingerprint(record: &StructuredRecord) -> String {
    let mut parts = Vec::new();
    if let Some(number) = &record.invoice_number {
        parts.push(format!("invoice_number={}", number.trim()));
    }
    if let Some(name) = &record.vendor.name {
        parts.push(format!("vendor_name={}", name.trim().to_lowercase()));
    }
    if let Some(amount) = &record.total_amount {
        parts.push(format!("total_value={}", amount.value.round_dp(2)));
        parts.push(format!("currency={}", amount.currency.to_uppercase()));
    }
    if let Some(date) = &record.date_issued {
        parts.push(format!("date_issued={date}"));
    }
    parts.sort();

    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(b"\0");
    }
    hex::encode(hasher.finalize())
}

/// `check` per spec §4.7. Never blocks the pipeline; only annotates and
/// returns the match list.
pub fn check(record: &StructuredRecord, exclude_document_id: Option<Uuid>, existing: &[ExistingRecord]) -> DuplicateCheckResult {
    let fp = fingerprint(record);
    let invoice_number = record.invoice_number.as_deref().map(str::trim);
    let vendor_name = record.vendor.name.as_deref().map(|n| n.trim().to_lowercase());

    let mut matches = Vec::new();
    for row in existing {
        if Some(row.document_id) == exclude_document_id {
            continue;
        }
        if row.fingerprint == fp {
            matches.push(DuplicateMatch { document_id: row.document_id, match_type: MatchType::Exact });
            continue;
        }
        let same_number = invoice_number.is_some() && row.invoice_number.as_deref().map(str::trim) == invoice_number;
        let same_vendor = vendor_name.is_some() && row.vendor_name.as_ref().map(|n| n.trim().to_lowercase()) == vendor_name;
        if same_number && same_vendor {
            matches.push(DuplicateMatch { document_id: row.document_id, match_type: MatchType::NumberVendor });
        }
    }

    DuplicateCheckResult { is_duplicate: !matches.is_empty(), matches }
}

/// Statistics per spec §4.7: duplicate rate = sum(group_size-1) / total.
pub fn duplicate_rate(fingerprints: &[String]) -> f64 {
    if fingerprints.is_empty() {
        return 0.0;
    }
    use std::collections::HashMap;
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for fp in fingerprints {
        *counts.entry(fp.as_str()).or_insert(0) += 1;
    }
    let extra: usize = counts.values().map(|c| c.saturating_sub(1)).sum();
    extra as f64 / fingerprints.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Money;
    use std::str::FromStr;
    use rust_decimal::Decimal;

    fn record(invoice_number: &str, vendor: &str, amount: &str) -> StructuredRecord {
        let mut r = StructuredRecord::default();
        r.invoice_number = Some(invoice_number.to_string());
        r.vendor.name = Some(vendor.to_string());
        r.total_amount = Some(Money::new(Decimal::from_str(amount).unwrap(), "CZK"));
        r.date_issued = chrono::NaiveDate::from_ymd_opt(2024, 7, 21);
        r
    }

    #[test]
    fn fingerprint_is_stable_across_whitespace_and_case() {
        let a = record("2024-001", "ABC s.r.o.", "24200.00");
        let b = record("2024-001", "  abc S.R.O.  ", "24200.00");
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn fingerprint_differs_on_invoice_number() {
        let a = record("2024-001", "ABC s.r.o.", "24200.00");
        let b = record("2024-002", "ABC s.r.o.", "24200.00");
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn exact_duplicate_is_detected() {
        let a = record("2024-001", "ABC s.r.o.", "24200.00");
        let existing_id = Uuid::new_v4();
        let existing = vec![ExistingRecord {
            document_id: existing_id,
            fingerprint: fingerprint(&a),
            invoice_number: Some("2024-001".into()),
            vendor_name: Some("ABC s.r.o.".into()),
            total_amount: Some("24200.00".into()),
            date_issued: Some("2024-07-21".into()),
        }];
        let result = check(&a, None, &existing);
        assert!(result.is_duplicate);
        assert_eq!(result.matches[0].match_type, MatchType::Exact);
    }
}
