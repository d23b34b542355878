//! Document Classifier (C3, spec §4.3): pure heuristic pre-classification
//! of document type, complexity and language from raw text and filename.

use crate::models::DocType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Local,
    En,
}

#[derive(Debug, Clone, Copy)]
pub struct ClassificationResult {
    pub doc_type: DocType,
    pub complexity: Complexity,
    pub language: Language,
    pub confidence: f64,
}

const INVOICE_KEYWORDS: &[&str] = &["invoice", "faktura", "daňový doklad", "dan. doklad"];
const RECEIPT_KEYWORDS: &[&str] = &["receipt", "účtenka", "paragon", "stvrzenka"];
const CONTRACT_KEYWORDS: &[&str] = &["contract", "smlouva", "agreement", "dohoda"];
const TAX_KEYWORDS: &[&str] = &["vat", "dph", "tax", "dan"];
const LINE_ITEM_KEYWORDS: &[&str] = &["quantity", "množství", "unit price", "jednotková cena", "qty"];

fn keyword_votes(lower_text: &str, keywords: &[&str]) -> usize {
    keywords.iter().filter(|k| lower_text.contains(*k)).count()
}

/// Classifies raw OCR text and filename into doc type/complexity/language
/// (spec §4.3). Pure function: no I/O, no shared state.
pub fn classify(raw_text: &str, filename: &str) -> ClassificationResult {
    let lower_text = raw_text.to_lowercase();
    let lower_filename = filename.to_lowercase();
    let combined = format!("{lower_text} {lower_filename}");

    let invoice_votes = keyword_votes(&combined, INVOICE_KEYWORDS);
    let receipt_votes = keyword_votes(&combined, RECEIPT_KEYWORDS);
    let contract_votes = keyword_votes(&combined, CONTRACT_KEYWORDS);

    let (doc_type, top_votes) = [
        (DocType::Invoice, invoice_votes),
        (DocType::Receipt, receipt_votes),
        (DocType::Contract, contract_votes),
    ]
    .into_iter()
    .max_by_key(|(_, votes)| *votes)
    .unwrap();
    let doc_type = if top_votes == 0 { DocType::Other } else { doc_type };

    let has_tax_keywords = keyword_votes(&lower_text, TAX_KEYWORDS) > 0;
    let has_line_item_keywords = keyword_votes(&lower_text, LINE_ITEM_KEYWORDS) > 0;
    let line_count = raw_text.lines().count();

    let signals = [
        raw_text.chars().count() > 2000,
        line_count > 50,
        has_tax_keywords,
        has_line_item_keywords,
    ];
    let complexity_score = signals.iter().filter(|s| **s).count() as f64 / signals.len() as f64;
    let complexity = if complexity_score > 0.6 {
        Complexity::Complex
    } else if complexity_score > 0.3 {
        Complexity::Medium
    } else {
        Complexity::Simple
    };

    let diacritic_count = raw_text
        .chars()
        .filter(|c| {
            matches!(
                c,
                'á' | 'č' | 'ď' | 'é' | 'ě' | 'í' | 'ň' | 'ó' | 'ř' | 'š' | 'ť' | 'ú' | 'ů' | 'ý' | 'ž'
                    | 'Á' | 'Č' | 'Ď' | 'É' | 'Ě' | 'Í' | 'Ň' | 'Ó' | 'Ř' | 'Š' | 'Ť' | 'Ú' | 'Ů' | 'Ý' | 'Ž'
            )
        })
        .count();
    let diacritic_ratio = if raw_text.is_empty() {
        0.0
    } else {
        diacritic_count as f64 / raw_text.chars().count() as f64
    };
    let language = if diacritic_ratio > 0.01 { Language::Local } else { Language::En };

    let confidence = if top_votes == 0 {
        0.3
    } else {
        (0.5 + 0.15 * top_votes as f64).min(1.0)
    };

    ClassificationResult { doc_type, complexity, language, confidence }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoice_keywords_classify_as_invoice() {
        let result = classify("FAKTURA č. 2024-001 DPH 21%", "faktura.pdf");
        assert_eq!(result.doc_type, DocType::Invoice);
        assert_eq!(result.language, Language::Local);
    }

    #[test]
    fn no_keyword_matches_default_to_other() {
        let result = classify("random unrelated text", "file.pdf");
        assert_eq!(result.doc_type, DocType::Other);
    }

    #[test]
    fn complexity_scales_with_signal_count() {
        let long_text = "quantity unit price dph ".repeat(100);
        let result = classify(&long_text, "doc.pdf");
        assert_eq!(result.complexity, Complexity::Complex);
    }
}
