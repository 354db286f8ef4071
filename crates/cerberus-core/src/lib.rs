//! # cerberus-core
//!
//! Core types, traits, and event contracts for the cerberus artifact pipeline.
//!
//! This crate provides the foundational data structures and trait definitions
//! that the storage, inference, and job crates depend on.

pub mod defaults;
pub mod error;
pub mod events;
pub mod models;
pub mod text;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use events::{
    ArtifactEvent, EventBus, EventEnvelope, EventHandler, EventKind, EventMetadata,
    InProcessEventBus,
};
pub use models::*;
pub use traits::*;

// Vector type shared with the storage and inference crates
pub use pgvector::Vector;
