//! # cerberus-jobs
//!
//! Artifact processing for the cerberus pipeline.
//!
//! This crate provides:
//! - Extractors (text, spreadsheet, PDF, email, ZIP, OCR) and an ordered registry
//! - The analysis orchestrator with its claim discipline
//! - The embeddings side-pipeline
//! - A dual-trigger worker (event bus deliveries plus reconciliation poll)
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use cerberus_jobs::{AnalysisOrchestrator, ExtractorRegistry, WorkerBuilder, WorkerConfig};
//!
//! let orchestrator = AnalysisOrchestrator::new(
//!     artifacts, content, Arc::new(ExtractorRegistry::standard(vision)),
//!     analysis, bus.clone(), metrics,
//! );
//! let worker = WorkerBuilder::new(orchestrator, bus)
//!     .with_config(WorkerConfig::from_env())
//!     .build();
//!
//! let handle = worker.start().await?;
//! let mut events = handle.events();
//! // ...
//! handle.shutdown().await;
//! ```

pub mod adapters;
pub mod analysis;
pub mod content;
pub mod embeddings;
pub mod extraction;
pub mod handler;
pub mod worker;

// Re-export core types
pub use cerberus_core::*;

pub use adapters::{
    EmailExtractor, OcrExtractor, PdfExtractor, SpreadsheetExtractor, TextExtractor, ZipExtractor,
};
pub use analysis::{AnalysisOrchestrator, ProcessOutcome, Trigger};
pub use content::FilesystemContentStore;
pub use embeddings::EmbeddingsStage;
pub use extraction::ExtractorRegistry;
pub use handler::ArtifactUploadedHandler;
pub use worker::{TriggerWorker, WorkerBuilder, WorkerConfig, WorkerEvent, WorkerHandle};
