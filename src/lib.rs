//! Document-processing pipeline: OCR, AI structuring, enrichment and
//! duplicate detection for scanned and digital business documents.
//!
//! This crate is the core engine only — the HTTP/CLI surface, auth, billing
//! and ERP export live outside it (see `DESIGN.md`). Consumers construct a
//! [`PipelineContext`], a [`JobManager`], and a [`PersistenceGateway`]
//! implementation, then submit documents through [`Coordinator::process_document`].

pub mod adapters;
pub mod cache;
pub mod classifier;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod cost_tracker;
pub mod dedup;
pub mod enrichment;
pub mod error;
pub mod job_manager;
pub mod llm_orchestrator;
pub mod metrics;
pub mod models;
pub mod ocr_orchestrator;
pub mod persistence;
pub mod regex_baseline;
pub mod registry_client;
pub mod telemetry;

pub use config::PipelineConfig;
pub use context::PipelineContext;
pub use coordinator::Coordinator;
pub use error::{PipelineError, PipelineResult};
pub use job_manager::JobManager;
