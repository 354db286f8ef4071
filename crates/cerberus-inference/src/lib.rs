//! # cerberus-inference
//!
//! AI provider backends for the artifact pipeline.
//!
//! This crate provides:
//! - Claude analysis backend (feature `anthropic`, default)
//! - Claude vision backend for OCR fallback (feature `anthropic`)
//! - OpenAI embeddings backend (feature `openai`, default)
//! - Per-model cost calculation
//! - Metrics tracker with latency percentiles and an optional usage sink
//! - Mock backends for tests (feature `mock`)

pub mod cost;
pub mod metrics;
pub mod prompts;

#[cfg(feature = "anthropic")]
pub mod anthropic;

#[cfg(feature = "openai")]
pub mod openai;

// Mock backends for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export core types
pub use cerberus_core::*;

#[cfg(feature = "anthropic")]
pub use anthropic::{ClaudeAnalysisBackend, ClaudeConfig, ClaudeVisionBackend};

#[cfg(feature = "openai")]
pub use openai::{OpenAIConfig, OpenAIEmbeddingBackend};

pub use cost::{CostCalculator, ModelPricing};
pub use metrics::{CallRecord, LatencyStats, MetricsSnapshot, MetricsTracker};
