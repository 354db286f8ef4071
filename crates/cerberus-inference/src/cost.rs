//! Per-model pricing for AI calls.
//!
//! | Model | Input $/MTok | Output $/MTok |
//! |-------|--------------|---------------|
//! | `claude-opus-4-5-20251101` | 15.00 | 75.00 |
//! | `claude-sonnet-4-5-20250929` (default) | 3.00 | 15.00 |
//! | `text-embedding-3-small` | 0.02 | - |
//!
//! Cached input reads are billed at 10% of the input rate.

use std::collections::HashMap;

use cerberus_core::defaults::{ANALYSIS_MODEL, ANALYSIS_MODEL_OPUS, EMBED_MODEL};
use cerberus_core::TokenUsage;

const PER_MILLION: f64 = 1_000_000.0;

/// Fraction of the input rate charged for cache reads.
pub const CACHE_READ_DISCOUNT: f64 = 0.1;

/// USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
}

impl ModelPricing {
    pub const fn new(input_per_mtok: f64, output_per_mtok: f64) -> Self {
        Self {
            input_per_mtok,
            output_per_mtok,
        }
    }
}

/// Estimates the USD cost of a call from its token usage.
#[derive(Debug, Clone)]
pub struct CostCalculator {
    pricing: HashMap<String, ModelPricing>,
    fallback: ModelPricing,
}

impl Default for CostCalculator {
    fn default() -> Self {
        let sonnet = ModelPricing::new(3.0, 15.0);
        let mut pricing = HashMap::new();
        pricing.insert(ANALYSIS_MODEL_OPUS.to_string(), ModelPricing::new(15.0, 75.0));
        pricing.insert(ANALYSIS_MODEL.to_string(), sonnet);
        pricing.insert(EMBED_MODEL.to_string(), ModelPricing::new(0.02, 0.0));
        Self {
            pricing,
            fallback: sonnet,
        }
    }
}

impl CostCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace pricing for a model.
    pub fn with_pricing(mut self, model: impl Into<String>, pricing: ModelPricing) -> Self {
        self.pricing.insert(model.into(), pricing);
        self
    }

    /// Pricing for a model; unknown models use Sonnet rates.
    pub fn pricing_for(&self, model: &str) -> ModelPricing {
        self.pricing.get(model).copied().unwrap_or(self.fallback)
    }

    /// Estimated cost in USD.
    pub fn cost(&self, model: &str, usage: &TokenUsage) -> f64 {
        let pricing = self.pricing_for(model);
        let cached = usage.cache_read_input_tokens.min(usage.input_tokens);
        let uncached = usage.input_tokens - cached;

        let input = uncached as f64 * pricing.input_per_mtok / PER_MILLION;
        let cache = cached as f64 * pricing.input_per_mtok * CACHE_READ_DISCOUNT / PER_MILLION;
        let output = usage.output_tokens as f64 * pricing.output_per_mtok / PER_MILLION;
        input + cache + output
    }
}
