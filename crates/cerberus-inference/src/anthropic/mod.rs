//! Anthropic Claude backends.
//!
//! - [`ClaudeAnalysisBackend`]: structured artifact analysis
//! - [`ClaudeVisionBackend`]: image transcription for OCR fallback
//!
//! Both share one [`ClaudeClient`], which sends `x-api-key` and
//! `anthropic-version` headers and retries rate limits, overloads, 5xx
//! responses, and transport failures with exponential backoff.
//!
//! # Example
//!
//! ```rust,no_run
//! use cerberus_inference::anthropic::ClaudeAnalysisBackend;
//! use cerberus_core::{AnalysisBackend, ProgramContext};
//!
//! #[tokio::main]
//! async fn main() -> cerberus_core::Result<()> {
//!     let backend = ClaudeAnalysisBackend::from_env()?;
//!     let response = backend
//!         .analyze("Budget approved for Q3.", &ProgramContext::fallback())
//!         .await?;
//!     println!("{}", response.result.summary.executive_summary);
//!     Ok(())
//! }
//! ```

mod analysis;
mod client;
mod error;
mod types;
mod vision;

pub use analysis::{strip_code_fences, ClaudeAnalysisBackend};
pub use client::{ClaudeClient, ClaudeConfig};
pub use error::{to_provider_error, AnthropicErrorCode};
pub use types::{
    CacheControl, ContentBlock, ImageSource, Message, MessagesRequest, MessagesResponse,
    ResponseContent, ResponseUsage,
};
pub use vision::ClaudeVisionBackend;
