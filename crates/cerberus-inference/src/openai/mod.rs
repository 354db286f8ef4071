//! OpenAI embeddings backend.
//!
//! Works with the OpenAI cloud API and any endpoint that implements the
//! same `/embeddings` contract.
//!
//! # Example
//!
//! ```rust,no_run
//! use cerberus_inference::openai::{OpenAIConfig, OpenAIEmbeddingBackend};
//! use cerberus_core::EmbeddingBackend;
//!
//! #[tokio::main]
//! async fn main() -> cerberus_core::Result<()> {
//!     let config = OpenAIConfig {
//!         api_key: "sk-...".to_string(),
//!         ..Default::default()
//!     };
//!     let backend = OpenAIEmbeddingBackend::new(config)?;
//!     let vectors = backend.embed_texts(&["Hello, world!".to_string()]).await?;
//!     assert_eq!(vectors.len(), 1);
//!     Ok(())
//! }
//! ```

mod backend;
mod error;
mod types;

pub use backend::{OpenAIConfig, OpenAIEmbeddingBackend};
pub use error::{to_embedding_error, OpenAIErrorCode};
pub use types::{EmbeddingData, EmbeddingRequest, EmbeddingResponse, EmbeddingUsage};
