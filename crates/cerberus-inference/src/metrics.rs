//! AI call metrics and cost tracking.
//!
//! One [`MetricsTracker`] is built at startup and shared as
//! `Arc<MetricsTracker>`. Counters are atomics so concurrent workers never
//! lose increments; latency samples sit behind a lock and are bounded per
//! operation.
//!
//! Each call is also handed to an optional [`UsageSink`] for durable
//! accounting. Sink failures are logged and never reach the caller.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use cerberus_core::defaults::{EVENT_SOURCE_ARTIFACTS, METRICS_MAX_SAMPLES};
use cerberus_core::{Error, TokenUsage, UsageRecord, UsageSink};

use crate::cost::CostCalculator;

/// Latency statistics for an operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyStats {
    /// Median latency (P50) in milliseconds.
    pub p50_ms: u64,
    /// 95th percentile latency in milliseconds.
    pub p95_ms: u64,
    /// 99th percentile latency in milliseconds.
    pub p99_ms: u64,
    /// Maximum observed latency in milliseconds.
    pub max_ms: u64,
    /// Number of samples.
    pub samples: usize,
}

impl LatencyStats {
    /// Compute percentiles from unsorted samples.
    pub fn from_samples(mut latencies: Vec<u64>) -> Self {
        if latencies.is_empty() {
            return Self::default();
        }

        latencies.sort_unstable();
        let n = latencies.len();
        let at = |q: f64| latencies[((n as f64 * q) as usize).min(n - 1)];

        Self {
            p50_ms: latencies[n / 2],
            p95_ms: at(0.95),
            p99_ms: at(0.99),
            max_ms: latencies[n - 1],
            samples: n,
        }
    }
}

/// Point-in-time copy of all counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub calls_total: u64,
    pub calls_failed: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cached_tokens: u64,
    pub total_cost_usd: f64,
    pub latency: HashMap<String, LatencyStats>,
}

/// One AI invocation as seen by the caller.
#[derive(Debug, Clone)]
pub struct CallRecord<'a> {
    /// Logical operation ("analyze", "embed", "ocr").
    pub operation: &'a str,
    pub model: &'a str,
    pub program_id: Option<Uuid>,
    pub usage: TokenUsage,
    pub duration: Duration,
    /// `None` on success.
    pub error: Option<&'a Error>,
}

/// Records latency, outcome, tokens, and cost for every AI call.
pub struct MetricsTracker {
    module: String,
    calls_total: AtomicU64,
    calls_failed: AtomicU64,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
    cached_tokens: AtomicU64,
    cost_micro_usd: AtomicU64,
    latencies: RwLock<HashMap<String, VecDeque<u64>>>,
    max_samples: usize,
    cost: CostCalculator,
    sink: Option<Arc<dyn UsageSink>>,
}

impl Default for MetricsTracker {
    fn default() -> Self {
        Self::new(EVENT_SOURCE_ARTIFACTS)
    }
}

impl MetricsTracker {
    /// Tracker attributing calls to `module`.
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            calls_total: AtomicU64::new(0),
            calls_failed: AtomicU64::new(0),
            input_tokens: AtomicU64::new(0),
            output_tokens: AtomicU64::new(0),
            cached_tokens: AtomicU64::new(0),
            cost_micro_usd: AtomicU64::new(0),
            latencies: RwLock::new(HashMap::new()),
            max_samples: METRICS_MAX_SAMPLES,
            cost: CostCalculator::default(),
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn UsageSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_cost_calculator(mut self, cost: CostCalculator) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_max_samples(mut self, max_samples: usize) -> Self {
        self.max_samples = max_samples.max(1);
        self
    }

    pub fn cost_calculator(&self) -> &CostCalculator {
        &self.cost
    }

    /// Record one call. Returns the estimated cost in USD.
    pub async fn record(&self, call: CallRecord<'_>) -> f64 {
        let cost_usd = self.cost.cost(call.model, &call.usage);
        let duration_ms = call.duration.as_millis() as u64;

        self.calls_total.fetch_add(1, Ordering::Relaxed);
        if call.error.is_some() {
            self.calls_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.input_tokens
            .fetch_add(call.usage.input_tokens, Ordering::Relaxed);
        self.output_tokens
            .fetch_add(call.usage.output_tokens, Ordering::Relaxed);
        self.cached_tokens
            .fetch_add(call.usage.cache_read_input_tokens, Ordering::Relaxed);
        self.cost_micro_usd
            .fetch_add((cost_usd * 1_000_000.0).round() as u64, Ordering::Relaxed);

        if let Ok(mut samples) = self.latencies.write() {
            let entry = samples.entry(call.operation.to_string()).or_default();
            entry.push_back(duration_ms);
            while entry.len() > self.max_samples {
                entry.pop_front();
            }
        }

        debug!(
            operation = call.operation,
            model = call.model,
            success = call.error.is_none(),
            duration_ms,
            input_tokens = call.usage.input_tokens,
            output_tokens = call.usage.output_tokens,
            cost_usd,
            "AI call recorded"
        );

        if let Some(sink) = &self.sink {
            let record = UsageRecord {
                program_id: call.program_id,
                module: self.module.clone(),
                operation: call.operation.to_string(),
                model: call.model.to_string(),
                input_tokens: call.usage.input_tokens,
                output_tokens: call.usage.output_tokens,
                cached_tokens: call.usage.cache_read_input_tokens,
                cost_usd,
                duration_ms,
                success: call.error.is_none(),
                error_kind: call.error.map(|e| e.kind().to_string()),
                recorded_at: Utc::now(),
            };
            if let Err(e) = sink.record(&record).await {
                warn!(error = %e, operation = call.operation, "Failed to persist usage record");
            }
        }

        cost_usd
    }

    /// Latency statistics for one operation.
    pub fn latency(&self, operation: &str) -> LatencyStats {
        self.latencies
            .read()
            .ok()
            .and_then(|samples| samples.get(operation).map(|s| s.iter().copied().collect()))
            .map(LatencyStats::from_samples)
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let latency = self
            .latencies
            .read()
            .map(|samples| {
                samples
                    .iter()
                    .map(|(op, values)| (op.clone(), LatencyStats::from_samples(values.iter().copied().collect())))
                    .collect()
            })
            .unwrap_or_default();

        MetricsSnapshot {
            calls_total: self.calls_total.load(Ordering::Relaxed),
            calls_failed: self.calls_failed.load(Ordering::Relaxed),
            input_tokens: self.input_tokens.load(Ordering::Relaxed),
            output_tokens: self.output_tokens.load(Ordering::Relaxed),
            cached_tokens: self.cached_tokens.load(Ordering::Relaxed),
            total_cost_usd: self.cost_micro_usd.load(Ordering::Relaxed) as f64 / 1_000_000.0,
            latency,
        }
    }
}
