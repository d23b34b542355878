//! Regex baseline extractor (spec §4.5.1): a deterministic fallback that
//! fills invoice number, date, total, tax id, and registration id using
//! fixed patterns. Runs first for `cost_effective` mode and as a safety net
//! / priors source when the LLM step also runs.

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::models::{Money, Party, StructuredRecord};

static INVOICE_NUMBER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:faktura|invoice)\s*(?:č\.?|no\.?|#)?\s*([0-9][0-9\-/]{2,})").unwrap()
});

static DATE_DMY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{1,2})\.(\d{1,2})\.(\d{4})\b").unwrap());
static DATE_ISO_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").unwrap());

static TOTAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:celkem|total|k\s*úhradě)\D{0,25}?([0-9][0-9 .,]*[0-9])\s*(Kč|CZK|EUR|€|USD|\$)?").unwrap()
});

static TAX_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(?:DIČ|VAT|tax\s*id)\s*[:.]?\s*([A-Z]{2}[0-9A-Z]+)").unwrap());
static REGISTRATION_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(?:IČO?|ICO|reg(?:istration)?\s*(?:no|id)?)\s*[:.]?\s*([0-9]{1,8})").unwrap());

fn parse_amount(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let normalized = if cleaned.contains(',') && !cleaned.contains('.') {
        cleaned.replace(',', ".")
    } else {
        cleaned.replace(',', "")
    };
    Decimal::from_str(&normalized).ok()
}

fn detect_currency(symbol: Option<&str>) -> String {
    match symbol.map(|s| s.to_uppercase()) {
        Some(s) if s == "KČ" || s == "CZK" => "CZK".to_string(),
        Some(s) if s == "€" || s == "EUR" => "EUR".to_string(),
        Some(s) if s == "$" || s == "USD" => "USD".to_string(),
        _ => "CZK".to_string(),
    }
}

/// Extracts a `StructuredRecord` from raw OCR text using fixed patterns
/// only (spec §4.5.1). Never calls an LLM; deterministic given the same
/// input.
pub fn extract(raw_text: &str) -> StructuredRecord {
    let mut record = StructuredRecord::default();

    if let Some(caps) = INVOICE_NUMBER_RE.captures(raw_text) {
        record.invoice_number = Some(caps[1].trim_end_matches(['.', ',']).to_string());
    }

    if let Some(caps) = DATE_DMY_RE.captures(raw_text) {
        let (day, month, year) = (
            caps[1].parse::<u32>().ok(),
            caps[2].parse::<u32>().ok(),
            caps[3].parse::<i32>().ok(),
        );
        if let (Some(d), Some(m), Some(y)) = (day, month, year) {
            record.date_issued = chrono::NaiveDate::from_ymd_opt(y, m, d);
        }
    } else if let Some(caps) = DATE_ISO_RE.captures(raw_text) {
        let (year, month, day) = (
            caps[1].parse::<i32>().ok(),
            caps[2].parse::<u32>().ok(),
            caps[3].parse::<u32>().ok(),
        );
        if let (Some(y), Some(m), Some(d)) = (year, month, day) {
            record.date_issued = chrono::NaiveDate::from_ymd_opt(y, m, d);
        }
    }

    if let Some(caps) = TOTAL_RE.captures(raw_text) {
        if let Some(value) = parse_amount(&caps[1]) {
            let currency = detect_currency(caps.get(2).map(|m| m.as_str()));
            record.total_amount = Some(Money::new(value, currency));
        }
    }

    let mut vendor = Party::default();
    if let Some(caps) = TAX_ID_RE.captures(raw_text) {
        vendor.tax_number = Some(caps[1].to_uppercase());
    }
    if let Some(caps) = REGISTRATION_ID_RE.captures(raw_text) {
        vendor.registration_number = Some(caps[1].to_string());
    }
    record.vendor = vendor;

    record.extraction_confidence = 0.0;
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_invoice_number_date_and_total() {
        let text = "FAKTURA č. 2024-001\nDatum vystavení: 21.07.2024\nCelkem k úhradě: 24 200,00 Kč\nIČO: 12345678";
        let record = extract(text);
        assert_eq!(record.invoice_number.as_deref(), Some("2024-001"));
        assert_eq!(record.date_issued, chrono::NaiveDate::from_ymd_opt(2024, 7, 21));
        let total = record.total_amount.unwrap();
        assert_eq!(total.currency, "CZK");
        assert_eq!(total.value, Decimal::from_str("24200.00").unwrap());
        assert_eq!(record.vendor.registration_number.as_deref(), Some("12345678"));
    }

    #[test]
    fn missing_fields_are_left_none() {
        let record = extract("unrelated text with no structure");
        assert!(record.invoice_number.is_none());
        assert!(record.total_amount.is_none());
    }
}
