//! Centralized default constants for the artifact pipeline.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates and the worker binary reference these constants instead of
//! defining their own magic numbers.

// =============================================================================
// TRIGGER WORKER
// =============================================================================

/// Interval between reconciliation polls for pending artifacts (seconds).
pub const WORKER_POLL_INTERVAL_SECS: u64 = 10;

/// Maximum pending artifacts fetched per poll tick.
pub const WORKER_POLL_BATCH_SIZE: usize = 10;

/// Maximum artifacts processed concurrently, event and poll paths combined.
pub const WORKER_MAX_CONCURRENT: usize = 4;

/// Bounded wait for in-flight work after a shutdown signal (seconds).
pub const WORKER_SHUTDOWN_GRACE_SECS: u64 = 2;

/// Upper bound on a single analysis call, retries included (seconds).
pub const ANALYSIS_TIMEOUT_SECS: u64 = 180;

/// Buffer size for the in-process event bus broadcast channel.
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Buffer size for worker lifecycle events.
pub const WORKER_EVENT_CAPACITY: usize = 64;

// =============================================================================
// EXTRACTION
// =============================================================================

/// Rows rendered per spreadsheet sheet before truncation.
pub const SPREADSHEET_MAX_ROWS: usize = 1000;

/// Timeout for external extraction commands (pdfinfo, pdftotext).
pub const EXTRACTION_CMD_TIMEOUT_SECS: u64 = 60;

/// Archive members read from one ZIP before the rest are skipped.
pub const ARCHIVE_MAX_ENTRIES: usize = 1000;

/// Decompressed bytes read from a single ZIP member.
pub const ARCHIVE_MAX_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

// =============================================================================
// ANALYSIS (Claude)
// =============================================================================

/// Anthropic Messages API base URL.
pub const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1";

/// Anthropic API version header value.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Model used for artifact analysis.
pub const ANALYSIS_MODEL: &str = "claude-sonnet-4-5-20250929";

/// Premium analysis model (priced separately by the cost calculator).
pub const ANALYSIS_MODEL_OPUS: &str = "claude-opus-4-5-20251101";

/// Output token budget for analysis responses.
pub const ANALYSIS_MAX_TOKENS: u32 = 8192;

/// Output token budget for vision transcription.
pub const VISION_MAX_TOKENS: u32 = 4096;

/// HTTP timeout for a single Claude request (seconds).
pub const ANTHROPIC_TIMEOUT_SECS: u64 = 120;

/// Attempts per Claude request (first try included).
pub const ANTHROPIC_MAX_ATTEMPTS: u32 = 3;

/// Backoff before the first retry; doubles for each further attempt.
pub const ANTHROPIC_RETRY_BASE_MS: u64 = 1000;

/// Character budget for text sent to the analysis model.
pub const ANALYSIS_MAX_INPUT_CHARS: usize = 400_000;

// =============================================================================
// EMBEDDINGS (OpenAI)
// =============================================================================

/// OpenAI API base URL.
pub const OPENAI_URL: &str = "https://api.openai.com/v1";

/// Default embedding model.
pub const EMBED_MODEL: &str = "text-embedding-3-small";

/// Vector dimension for text-embedding-3-small.
pub const EMBED_DIMENSION: usize = 1536;

/// HTTP timeout for embedding requests (seconds).
pub const EMBED_TIMEOUT_SECS: u64 = 60;

/// Characters of stored text sent to the embedding model
/// (about 8k tokens, the text-embedding-3 input limit).
pub const EMBED_MAX_INPUT_CHARS: usize = 24_000;

// =============================================================================
// CONTEXT & STORAGE
// =============================================================================

/// Program name used when no per-program context lookup is wired.
pub const FALLBACK_PROGRAM_NAME: &str = "Default Program";

/// Program code used when no per-program context lookup is wired.
pub const FALLBACK_PROGRAM_CODE: &str = "DEFAULT";

/// Root directory for artifact bytes on the local filesystem.
pub const ARTIFACT_STORAGE_PATH: &str = "/var/lib/cerberus/artifacts";

/// Event source label for artifact pipeline events.
pub const EVENT_SOURCE_ARTIFACTS: &str = "artifacts";

// =============================================================================
// METRICS
// =============================================================================

/// Latency samples retained per operation.
pub const METRICS_MAX_SAMPLES: usize = 1000;
