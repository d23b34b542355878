//! Canonical data model (spec §3): `Document`, `RawOCRResult`,
//! `StructuredRecord`, `ExtractedField`, `Job`, `RegistryRecord` and the
//! dedup fingerprint type.

mod document;
mod extracted_field;
mod job;
mod ocr_result;
mod registry_record;
mod structured_record;

pub use document::{Document, DocumentStatus, ProcessingMode};
pub use extracted_field::ExtractedField;
pub use job::{Job, JobOptions, JobStatus};
pub use ocr_result::{AdapterError, AdapterErrorKind, LLMResult, MediaType, RawOCRResult};
pub use registry_record::RegistryRecord;
pub use structured_record::{
    DocType, EnrichmentMeta, LineItem, Money, Party, StructuredRecord, TaxInfo,
};
