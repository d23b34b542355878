use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    Invoice,
    Receipt,
    Contract,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Money {
    pub value: Decimal,
    pub currency: String,
}

impl Money {
    pub fn new(value: Decimal, currency: impl Into<String>) -> Self {
        Self { value: value.round_dp(2), currency: currency.into().to_uppercase() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Party {
    pub name: Option<String>,
    pub registration_number: Option<String>,
    pub tax_number: Option<String>,
    pub address: Option<String>,
    #[serde(rename = "_enriched")]
    pub enriched: bool,
    #[serde(rename = "_active")]
    pub active: Option<bool>,
    #[serde(rename = "_tax_registered")]
    pub tax_registered: Option<bool>,
}

impl Party {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.registration_number.is_none()
            && self.tax_number.is_none()
            && self.address.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: Option<String>,
    pub quantity: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub total_price: Option<Decimal>,
}

impl LineItem {
    /// §3 invariant: `quantity * unit_price = total_price` within ±0.02.
    pub fn satisfies_total_invariant(&self) -> bool {
        match (self.quantity, self.unit_price, self.total_price) {
            (Some(q), Some(u), Some(t)) => (q * u - t).abs() <= Decimal::new(2, 2),
            _ => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxInfo {
    pub rate: Option<Decimal>,
    pub amount: Option<Decimal>,
    pub base: Option<Decimal>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentMeta {
    pub enriched_at: Option<chrono::DateTime<chrono::Utc>>,
    pub success: bool,
    pub notes: Vec<String>,
}

/// Canonical structured record (spec §3). All fields optional unless noted.
///
/// `extraction_confidence`, `_enrichment_meta` and `_notes` are internal
/// bookkeeping the LLM prompt never asks for (see `build_prompt` in
/// `llm_orchestrator.rs`), so they default on deserialization rather than
/// making every real LLM response fail to parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredRecord {
    #[serde(default)]
    pub document_type: Option<DocType>,
    #[serde(default)]
    pub invoice_number: Option<String>,
    #[serde(default)]
    pub date_issued: Option<NaiveDate>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub total_amount: Option<Money>,
    #[serde(default)]
    pub vendor: Party,
    #[serde(default)]
    pub customer: Party,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    #[serde(default)]
    pub tax_info: Option<TaxInfo>,
    #[serde(default)]
    pub extraction_confidence: f64,
    #[serde(rename = "_enrichment_meta", default)]
    pub enrichment_meta: EnrichmentMeta,
    /// Invariant-violation / fallback annotations, never silently correcting a field.
    #[serde(rename = "_notes", default)]
    pub notes: Vec<String>,
}

impl Default for StructuredRecord {
    fn default() -> Self {
        Self {
            document_type: None,
            invoice_number: None,
            date_issued: None,
            due_date: None,
            total_amount: None,
            vendor: Party::default(),
            customer: Party::default(),
            line_items: Vec::new(),
            tax_info: None,
            extraction_confidence: 0.0,
            enrichment_meta: EnrichmentMeta::default(),
            notes: Vec::new(),
        }
    }
}

impl StructuredRecord {
    /// Fraction of the fixed schema-field set that is populated, used by
    /// the LLM Orchestrator's confidence formula (spec §4.5).
    pub fn field_coverage(&self) -> f64 {
        let fields: [bool; 7] = [
            self.document_type.is_some(),
            self.invoice_number.is_some(),
            self.date_issued.is_some(),
            self.total_amount.is_some(),
            !self.vendor.is_empty(),
            !self.customer.is_empty(),
            !self.line_items.is_empty(),
        ];
        fields.iter().filter(|b| **b).count() as f64 / fields.len() as f64
    }

    /// Validates §3 cross-field invariants. Violations are appended to
    /// `_notes`; fields are never corrected in place.
    pub fn validate_invariants(&mut self) {
        if let (Some(tax), Some(total)) = (&self.tax_info, &self.total_amount) {
            if let (Some(base), Some(amount)) = (tax.base, tax.amount) {
                if (base + amount - total.value).abs() > Decimal::new(2, 2) {
                    self.notes.push("tax_info base+amount does not match total_amount".to_string());
                }
            }
        }
        if let (Some(issued), Some(due)) = (self.date_issued, self.due_date) {
            if issued > due {
                self.notes.push("date_issued is after due_date".to_string());
            }
        }
        for (i, item) in self.line_items.iter().enumerate() {
            if !item.satisfies_total_invariant() {
                self.notes.push(format!("line_items[{i}] quantity*unit_price does not match total_price"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn field_coverage_counts_populated_fields() {
        let mut record = StructuredRecord::default();
        record.invoice_number = Some("1".into());
        record.total_amount = Some(Money::new(Decimal::from_str("10.00").unwrap(), "czk"));
        let coverage = record.field_coverage();
        assert!(coverage > 0.0 && coverage < 1.0);
    }

    #[test]
    fn money_normalizes_currency_case_and_scale() {
        let m = Money::new(Decimal::from_str("24200.017").unwrap(), "czk");
        assert_eq!(m.currency, "CZK");
        assert_eq!(m.value, Decimal::from_str("24200.02").unwrap());
    }

    #[test]
    fn tax_mismatch_is_noted_not_corrected() {
        let mut record = StructuredRecord::default();
        record.total_amount = Some(Money::new(Decimal::from_str("100.00").unwrap(), "EUR"));
        record.tax_info = Some(TaxInfo {
            rate: Some(Decimal::from_str("0.21").unwrap()),
            amount: Some(Decimal::from_str("21.00").unwrap()),
            base: Some(Decimal::from_str("70.00").unwrap()),
        });
        record.validate_invariants();
        assert_eq!(record.tax_info.as_ref().unwrap().base, Some(Decimal::from_str("70.00").unwrap()));
        assert!(record.notes.iter().any(|n| n.contains("tax_info")));
    }
}
