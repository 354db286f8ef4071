//! Dual-trigger worker: event deliveries plus a reconciliation poll.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use cerberus_core::defaults::{
    ANALYSIS_TIMEOUT_SECS, WORKER_EVENT_CAPACITY, WORKER_MAX_CONCURRENT, WORKER_POLL_BATCH_SIZE,
    WORKER_POLL_INTERVAL_SECS, WORKER_SHUTDOWN_GRACE_SECS,
};
use cerberus_core::{EventBus, EventKind, Result};

use crate::analysis::{AnalysisOrchestrator, ProcessOutcome, Trigger, SHUTDOWN_INTERRUPTED};
use crate::handler::ArtifactUploadedHandler;

/// Configuration for the trigger worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Whether to run either trigger path.
    pub enabled: bool,
    /// Delay between reconciliation polls.
    pub poll_interval: Duration,
    /// Pending artifacts fetched per poll.
    pub poll_batch_size: usize,
    /// Artifacts processed at once across both trigger paths.
    pub max_concurrent: usize,
    /// Bounded wait for in-flight work on shutdown.
    pub shutdown_grace: Duration,
    /// Upper bound on one analysis call.
    pub analysis_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: Duration::from_secs(WORKER_POLL_INTERVAL_SECS),
            poll_batch_size: WORKER_POLL_BATCH_SIZE,
            max_concurrent: WORKER_MAX_CONCURRENT,
            shutdown_grace: Duration::from_secs(WORKER_SHUTDOWN_GRACE_SECS),
            analysis_timeout: Duration::from_secs(ANALYSIS_TIMEOUT_SECS),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `WORKER_ENABLED` | `true` | Enable/disable artifact processing |
    /// | `WORKER_POLL_INTERVAL_SECS` | `10` | Reconciliation poll interval |
    /// | `WORKER_POLL_BATCH_SIZE` | `10` | Pending artifacts per poll |
    /// | `WORKER_MAX_CONCURRENT` | `4` | Concurrent artifacts, events and poll combined |
    /// | `WORKER_SHUTDOWN_GRACE_SECS` | `2` | Wait for in-flight work on shutdown |
    /// | `WORKER_ANALYSIS_TIMEOUT_SECS` | `180` | Timeout for one analysis call |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: std::env::var("WORKER_ENABLED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            poll_interval: env_parse("WORKER_POLL_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
            poll_batch_size: env_parse::<usize>("WORKER_POLL_BATCH_SIZE")
                .unwrap_or(defaults.poll_batch_size)
                .max(1),
            max_concurrent: env_parse::<usize>("WORKER_MAX_CONCURRENT")
                .unwrap_or(defaults.max_concurrent)
                .max(1),
            shutdown_grace: env_parse("WORKER_SHUTDOWN_GRACE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_grace),
            analysis_timeout: env_parse("WORKER_ANALYSIS_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.analysis_timeout),
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_poll_batch_size(mut self, size: usize) -> Self {
        self.poll_batch_size = size.max(1);
        self
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_analysis_timeout(mut self, timeout: Duration) -> Self {
        self.analysis_timeout = timeout;
        self
    }
}

/// Event emitted by the trigger worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    WorkerStarted,
    /// This worker won the claim.
    ArtifactClaimed {
        artifact_id: Uuid,
        trigger: &'static str,
    },
    ArtifactCompleted {
        artifact_id: Uuid,
    },
    ArtifactFailed {
        artifact_id: Uuid,
        error: String,
    },
    /// Another trigger already held the claim.
    ClaimSkipped {
        artifact_id: Uuid,
    },
    /// A poll found this many pending artifacts.
    PollTick {
        pending: usize,
    },
    WorkerStopped,
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    grace: Duration,
    event_tx: broadcast::Sender<WorkerEvent>,
    orchestrator: Arc<AnalysisOrchestrator>,
}

impl WorkerHandle {
    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Token cancelled on shutdown; clones may trigger shutdown too.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop both trigger paths and wait up to the grace period.
    ///
    /// The event path stops taking deliveries and the poll loop finishes its
    /// current batch. Work still running after the grace period is aborted
    /// and its claimed artifacts are marked failed, so reanalysis can
    /// pick them up again.
    pub async fn shutdown(self) {
        self.shutdown.cancel();

        let mut tasks = self.tasks;
        if tokio::time::timeout(self.grace, join_all(tasks.iter_mut()))
            .await
            .is_err()
        {
            warn!(
                grace_ms = self.grace.as_millis() as u64,
                "Worker tasks still running after shutdown grace period"
            );
            for task in &tasks {
                task.abort();
            }
            join_all(tasks.iter_mut()).await;

            let stranded = self.orchestrator.fail_in_flight(SHUTDOWN_INTERRUPTED).await;
            if !stranded.is_empty() {
                warn!(
                    subsystem = "jobs",
                    component = "worker",
                    abandoned = stranded.len(),
                    "In-flight artifacts marked failed on shutdown"
                );
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!(subsystem = "jobs", component = "worker", "Trigger worker stopped");
    }
}

/// Processes artifacts from `artifact.uploaded` events and a periodic poll.
///
/// Both paths call the same orchestrator; its conditional claim keeps an
/// artifact from being processed twice.
#[derive(Clone)]
pub struct TriggerWorker {
    orchestrator: Arc<AnalysisOrchestrator>,
    bus: Arc<dyn EventBus>,
    config: WorkerConfig,
    event_tx: broadcast::Sender<WorkerEvent>,
    /// Shared by the event handler and the poll, bounding both together.
    permits: Arc<Semaphore>,
}

impl TriggerWorker {
    pub fn orchestrator(&self) -> &Arc<AnalysisOrchestrator> {
        &self.orchestrator
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Subscribe to uploads and spawn the event and poll tasks.
    pub async fn start(&self) -> Result<WorkerHandle> {
        let shutdown = CancellationToken::new();
        let mut handle = WorkerHandle {
            shutdown: shutdown.clone(),
            tasks: Vec::new(),
            grace: self.config.shutdown_grace,
            event_tx: self.event_tx.clone(),
            orchestrator: self.orchestrator.clone(),
        };

        if !self.config.enabled {
            info!("Trigger worker is disabled, not starting");
            return Ok(handle);
        }

        self.bus
            .subscribe(
                EventKind::ArtifactUploaded,
                Arc::new(
                    ArtifactUploadedHandler::new(self.orchestrator.clone())
                        .with_permits(self.permits.clone()),
                ),
            )
            .await?;

        let bus = self.bus.clone();
        let token = shutdown.clone();
        handle.tasks.push(tokio::spawn(async move {
            if let Err(e) = bus.start(token).await {
                error!(error = %e, "Event bus stopped with error");
            }
        }));

        let worker = self.clone();
        let token = shutdown.clone();
        handle
            .tasks
            .push(tokio::spawn(async move { worker.run_poll_loop(token).await }));

        info!(
            subsystem = "jobs",
            component = "worker",
            poll_interval_secs = self.config.poll_interval.as_secs(),
            poll_batch_size = self.config.poll_batch_size,
            max_concurrent = self.config.max_concurrent,
            embeddings = self.orchestrator.has_embeddings(),
            "Trigger worker started"
        );
        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        Ok(handle)
    }

    async fn run_poll_loop(&self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            if let Err(e) = self.poll_once().await {
                error!(error = %e, "Failed to poll pending artifacts");
            }
        }
        debug!("Poll loop stopped");
    }

    /// Fetch one batch of pending artifacts and process it to completion.
    ///
    /// Returns the number of artifacts fetched.
    pub async fn poll_once(&self) -> Result<usize> {
        let pending = self
            .orchestrator
            .artifacts()
            .list_pending(self.config.poll_batch_size)
            .await?;
        let fetched = pending.len().min(self.config.poll_batch_size);

        debug!(pending = fetched, "Poll tick");
        let _ = self.event_tx.send(WorkerEvent::PollTick { pending: fetched });
        if fetched == 0 {
            return Ok(0);
        }

        let mut tasks = JoinSet::new();

        for artifact in pending.into_iter().take(fetched) {
            let orchestrator = self.orchestrator.clone();
            let permits = self.permits.clone();
            tasks.spawn(async move {
                // The semaphore is never closed.
                let _permit = permits.acquire_owned().await.ok();
                let artifact_id = artifact.artifact_id;
                match orchestrator.process_artifact(&artifact, &Trigger::Poll).await {
                    Ok(ProcessOutcome::Failed { error }) => {
                        debug!(artifact_id = %artifact_id, error = %error, "Polled artifact failed");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(artifact_id = %artifact_id, error = %e, "Polled artifact aborted");
                    }
                }
            });
        }

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!(error = ?e, "Artifact task panicked");
            }
        }

        Ok(fetched)
    }
}

/// Builder for creating a trigger worker.
pub struct WorkerBuilder {
    orchestrator: AnalysisOrchestrator,
    bus: Arc<dyn EventBus>,
    config: WorkerConfig,
}

impl WorkerBuilder {
    /// `bus` should be the same bus the orchestrator publishes to.
    pub fn new(orchestrator: AnalysisOrchestrator, bus: Arc<dyn EventBus>) -> Self {
        Self {
            orchestrator,
            bus,
            config: WorkerConfig::default(),
        }
    }

    /// Set the worker configuration.
    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    /// Build and return the worker.
    pub fn build(self) -> TriggerWorker {
        let (event_tx, _) = broadcast::channel(WORKER_EVENT_CAPACITY);
        let orchestrator = self
            .orchestrator
            .with_analysis_timeout(self.config.analysis_timeout)
            .with_events(event_tx.clone());

        TriggerWorker {
            orchestrator: Arc::new(orchestrator),
            bus: self.bus,
            permits: Arc::new(Semaphore::new(self.config.max_concurrent.max(1))),
            config: self.config,
            event_tx,
        }
    }
}
