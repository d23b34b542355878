use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Flat projection of a `StructuredRecord`, created by flattening it on
/// persistence (spec §3). Reassembling a document's fields must yield an
/// equal record modulo ordering (spec §8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedField {
    pub document_id: Uuid,
    pub field_name: String,
    pub field_value: String,
    pub confidence: f64,
    pub data_type: String,
}

impl ExtractedField {
    pub fn new(
        document_id: Uuid,
        field_name: impl Into<String>,
        field_value: impl Into<String>,
        confidence: f64,
        data_type: impl Into<String>,
    ) -> Self {
        Self {
            document_id,
            field_name: field_name.into(),
            field_value: field_value.into(),
            confidence,
            data_type: data_type.into(),
        }
    }
}
