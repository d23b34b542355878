mod azure_document_intelligence;
mod google_vision;
mod tesseract_local;

pub use azure_document_intelligence::AzureDocumentIntelligenceAdapter;
pub use google_vision::GoogleVisionAdapter;
pub use tesseract_local::TesseractLocalAdapter;
