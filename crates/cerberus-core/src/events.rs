//! Artifact pipeline events, wire envelope, and the event bus contract.
//!
//! Events are typed in-process ([`ArtifactEvent`], one variant per kind) and
//! carried on the wire as an [`EventEnvelope`] whose shape is shared with
//! other services: `id`, `type`, `program_id`, `timestamp`, `source`, a
//! string-keyed `payload` map, and an optional `correlation_id`.
//!
//! Conversion between the two happens at the bus boundary:
//! [`EventEnvelope::from_event`] validates before publish and
//! [`EventEnvelope::decode`] validates on receipt.
//!
//! Delivery is at-least-once. Handlers must tolerate duplicates.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};

// ============================================================================
// Event kinds
// ============================================================================

/// Dot-namespaced event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ArtifactUploaded,
    ArtifactAnalyzed,
    ArtifactMetadataExtracted,
    ArtifactEmbeddingsCreated,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ArtifactUploaded => "artifact.uploaded",
            EventKind::ArtifactAnalyzed => "artifact.analyzed",
            EventKind::ArtifactMetadataExtracted => "artifact.metadata_extracted",
            EventKind::ArtifactEmbeddingsCreated => "artifact.embeddings_created",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "artifact.uploaded" => Ok(EventKind::ArtifactUploaded),
            "artifact.analyzed" => Ok(EventKind::ArtifactAnalyzed),
            "artifact.metadata_extracted" => Ok(EventKind::ArtifactMetadataExtracted),
            "artifact.embeddings_created" => Ok(EventKind::ArtifactEmbeddingsCreated),
            other => Err(Error::InvalidInput(format!("unknown event type: {}", other))),
        }
    }
}

// ============================================================================
// Typed events
// ============================================================================

/// Strongly-typed artifact event, one variant per kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArtifactEvent {
    /// A new artifact row exists and is waiting for analysis.
    Uploaded { artifact_id: Uuid, program_id: Uuid },
    /// Analysis finished and results are persisted.
    Analyzed { artifact_id: Uuid, program_id: Uuid },
    /// Structured metadata was extracted outside the main analysis.
    MetadataExtracted { artifact_id: Uuid, program_id: Uuid },
    /// An embedding vector was stored for the artifact.
    EmbeddingsCreated { artifact_id: Uuid, program_id: Uuid },
}

impl ArtifactEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ArtifactEvent::Uploaded { .. } => EventKind::ArtifactUploaded,
            ArtifactEvent::Analyzed { .. } => EventKind::ArtifactAnalyzed,
            ArtifactEvent::MetadataExtracted { .. } => EventKind::ArtifactMetadataExtracted,
            ArtifactEvent::EmbeddingsCreated { .. } => EventKind::ArtifactEmbeddingsCreated,
        }
    }

    pub fn artifact_id(&self) -> Uuid {
        match self {
            ArtifactEvent::Uploaded { artifact_id, .. }
            | ArtifactEvent::Analyzed { artifact_id, .. }
            | ArtifactEvent::MetadataExtracted { artifact_id, .. }
            | ArtifactEvent::EmbeddingsCreated { artifact_id, .. } => *artifact_id,
        }
    }

    pub fn program_id(&self) -> Uuid {
        match self {
            ArtifactEvent::Uploaded { program_id, .. }
            | ArtifactEvent::Analyzed { program_id, .. }
            | ArtifactEvent::MetadataExtracted { program_id, .. }
            | ArtifactEvent::EmbeddingsCreated { program_id, .. } => *program_id,
        }
    }

    fn from_parts(kind: EventKind, artifact_id: Uuid, program_id: Uuid) -> Self {
        match kind {
            EventKind::ArtifactUploaded => ArtifactEvent::Uploaded {
                artifact_id,
                program_id,
            },
            EventKind::ArtifactAnalyzed => ArtifactEvent::Analyzed {
                artifact_id,
                program_id,
            },
            EventKind::ArtifactMetadataExtracted => ArtifactEvent::MetadataExtracted {
                artifact_id,
                program_id,
            },
            EventKind::ArtifactEmbeddingsCreated => ArtifactEvent::EmbeddingsCreated {
                artifact_id,
                program_id,
            },
        }
    }
}

// ============================================================================
// Wire envelope
// ============================================================================

/// Optional provenance attached to AI-produced events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub ai_generated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifact_refs: Vec<Uuid>,
}

/// Wire representation of an event.
///
/// ## Wire Format
///
/// ```text
/// {"id":"0192...","type":"artifact.analyzed","program_id":"...","timestamp":"...",
///  "source":"artifacts","payload":{"artifact_id":"..."},"correlation_id":"..."}
/// ```
///
/// Identifiers inside `payload` are strings so non-Rust consumers can read them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event identifier (UUIDv7 for temporal ordering).
    pub id: Uuid,
    /// Namespaced event kind (e.g. `"artifact.uploaded"`).
    #[serde(rename = "type")]
    pub event_type: String,
    pub program_id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Publishing module.
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub payload: Map<String, JsonValue>,
    /// Carried unchanged from the causing event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EventMetadata>,
}

impl EventEnvelope {
    /// Build a validated envelope from a typed event.
    pub fn from_event(event: &ArtifactEvent) -> Result<Self> {
        let artifact_id = event.artifact_id();
        let program_id = event.program_id();
        if artifact_id.is_nil() {
            return Err(Error::InvalidInput(format!(
                "{} requires a non-nil artifact_id",
                event.kind()
            )));
        }
        if program_id.is_nil() {
            return Err(Error::InvalidInput(format!(
                "{} requires a non-nil program_id",
                event.kind()
            )));
        }

        let mut payload = Map::new();
        payload.insert(
            "artifact_id".to_string(),
            JsonValue::String(artifact_id.to_string()),
        );
        payload.insert(
            "program_id".to_string(),
            JsonValue::String(program_id.to_string()),
        );

        Ok(Self {
            id: Uuid::now_v7(),
            event_type: event.kind().as_str().to_string(),
            program_id,
            timestamp: Utc::now(),
            source: String::new(),
            payload,
            correlation_id: None,
            metadata: None,
        })
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: Option<String>) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    pub fn with_metadata(mut self, metadata: EventMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Parse the kind string.
    pub fn kind(&self) -> Result<EventKind> {
        self.event_type.parse()
    }

    /// Decode the loosely-typed payload into an [`ArtifactEvent`].
    ///
    /// `program_id` falls back to the envelope field when the payload omits it.
    pub fn decode(&self) -> Result<ArtifactEvent> {
        let kind = self.kind()?;
        let artifact_id = self
            .payload
            .get("artifact_id")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| {
                Error::InvalidInput(format!("{}: missing artifact_id in payload", kind))
            })
            .and_then(|s| {
                Uuid::parse_str(s).map_err(|e| {
                    Error::InvalidInput(format!("{}: invalid artifact_id {:?}: {}", kind, s, e))
                })
            })?;

        let program_id = match self.payload.get("program_id").and_then(JsonValue::as_str) {
            Some(s) => Uuid::parse_str(s).map_err(|e| {
                Error::InvalidInput(format!("{}: invalid program_id {:?}: {}", kind, s, e))
            })?,
            None => self.program_id,
        };

        Ok(ArtifactEvent::from_parts(kind, artifact_id, program_id))
    }
}

// ============================================================================
// Bus contract
// ============================================================================

/// Receives envelopes of the kinds it was subscribed to.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, envelope: &EventEnvelope) -> Result<()>;
}

/// Abstract publish/subscribe capability.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish an envelope to all subscribers of its kind.
    async fn publish(&self, envelope: EventEnvelope) -> Result<()>;

    /// Register a handler for one event kind.
    async fn subscribe(&self, kind: EventKind, handler: Arc<dyn EventHandler>) -> Result<()>;

    /// Dispatch deliveries until `shutdown` is cancelled.
    async fn start(&self, shutdown: CancellationToken) -> Result<()>;
}

// ============================================================================
// In-process implementation
// ============================================================================

/// Broadcast-based bus for single-process deployments and tests.
///
/// A receiver is created up front, so envelopes published before [`start`]
/// are buffered up to the channel capacity. Slow dispatch that falls behind
/// the buffer gets a `Lagged` error and the skipped envelopes are lost; the
/// reconciliation poll picks up whatever they referred to.
///
/// [`start`]: EventBus::start
pub struct InProcessEventBus {
    tx: broadcast::Sender<EventEnvelope>,
    rx: Mutex<Option<broadcast::Receiver<EventEnvelope>>>,
    handlers: RwLock<HashMap<EventKind, Vec<Arc<dyn EventHandler>>>>,
}

impl InProcessEventBus {
    /// Create a bus with the given buffer capacity.
    ///
    /// Recommended: 256 for production, 32 for tests.
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Tap the raw envelope stream (observers, tests).
    pub fn tap(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    async fn handlers_for(&self, kind: EventKind) -> Vec<Arc<dyn EventHandler>> {
        self.handlers
            .read()
            .await
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }
}

impl Default for InProcessEventBus {
    fn default() -> Self {
        Self::new(crate::defaults::EVENT_BUS_CAPACITY)
    }
}

#[async_trait]
impl EventBus for InProcessEventBus {
    async fn publish(&self, envelope: EventEnvelope) -> Result<()> {
        envelope.kind()?;
        debug!(
            event_type = %envelope.event_type,
            event_id = %envelope.id,
            correlation_id = envelope.correlation_id.as_deref().unwrap_or(""),
            "EventBus publish"
        );
        self.tx
            .send(envelope)
            .map(|_| ())
            .map_err(|_| Error::EventBus("no active receivers".to_string()))
    }

    async fn subscribe(&self, kind: EventKind, handler: Arc<dyn EventHandler>) -> Result<()> {
        self.handlers
            .write()
            .await
            .entry(kind)
            .or_default()
            .push(handler);
        debug!(event_type = %kind, "EventBus subscribe");
        Ok(())
    }

    async fn start(&self, shutdown: CancellationToken) -> Result<()> {
        let mut rx = self
            .rx
            .lock()
            .await
            .take()
            .ok_or_else(|| Error::EventBus("event bus already started".to_string()))?;

        info!(subsystem = "events", component = "in_process_bus", "Event dispatch started");
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        warn!(error = ?e, "Event handler task panicked");
                    }
                }
                received = rx.recv() => match received {
                    Ok(envelope) => {
                        let kind = match envelope.kind() {
                            Ok(kind) => kind,
                            Err(e) => {
                                debug!(error = %e, "Ignoring envelope with unknown type");
                                continue;
                            }
                        };
                        for handler in self.handlers_for(kind).await {
                            let envelope = envelope.clone();
                            in_flight.spawn(async move {
                                if let Err(e) = handler.handle(&envelope).await {
                                    warn!(
                                        event_type = %envelope.event_type,
                                        event_id = %envelope.id,
                                        error = %e,
                                        "Event handler failed"
                                    );
                                }
                            });
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event dispatch lagged, envelopes dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }

        // Deliveries already handed to handlers run to completion; callers
        // bound this wait with their own grace period.
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                warn!(error = ?e, "Event handler task panicked");
            }
        }
        *self.rx.lock().await = Some(rx);

        info!(subsystem = "events", component = "in_process_bus", "Event dispatch stopped");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
