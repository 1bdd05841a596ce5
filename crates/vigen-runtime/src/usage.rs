//! Token usage and cost accounting.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::providers::TokenUsage;

/// Accumulated model usage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmUsage {
    pub total_tokens: u64,

    /// Prompt/input tokens, images included
    pub prompt_tokens: u64,

    /// Response tokens
    pub completion_tokens: u64,

    /// Number of model calls made
    pub llm_calls: u32,

    /// Estimated cost in USD
    pub estimated_cost: f64,
}

impl LlmUsage {
    /// Add one call's usage.
    pub fn add(&mut self, usage: &TokenUsage, model: &str) {
        self.prompt_tokens += u64::from(usage.prompt_tokens);
        self.completion_tokens += u64::from(usage.completion_tokens);
        self.total_tokens += u64::from(usage.total());
        self.llm_calls += 1;
        self.estimated_cost += Self::estimate_cost(usage, model);
    }

    /// Usage accrued since `earlier` was taken from the same tracker.
    pub fn since(&self, earlier: &LlmUsage) -> LlmUsage {
        LlmUsage {
            total_tokens: self.total_tokens.saturating_sub(earlier.total_tokens),
            prompt_tokens: self.prompt_tokens.saturating_sub(earlier.prompt_tokens),
            completion_tokens: self.completion_tokens.saturating_sub(earlier.completion_tokens),
            llm_calls: self.llm_calls.saturating_sub(earlier.llm_calls),
            estimated_cost: (self.estimated_cost - earlier.estimated_cost).max(0.0),
        }
    }

    fn estimate_cost(usage: &TokenUsage, model: &str) -> f64 {
        // USD per million tokens
        let (input_rate, output_rate) = match model {
            m if m.contains("image") => (2.0, 120.0),
            m if m.contains("flash-lite") => (0.1, 0.4),
            m if m.contains("flash") => (0.5, 3.0),
            m if m.contains("pro") => (2.0, 12.0),
            _ => (0.5, 3.0),
        };

        let input_cost = (usage.prompt_tokens as f64 / 1_000_000.0) * input_rate;
        let output_cost = (usage.completion_tokens as f64 / 1_000_000.0) * output_rate;
        input_cost + output_cost
    }
}

/// Shared usage counter for every client in a run.
#[derive(Debug, Default)]
pub struct UsageTracker {
    usage: RwLock<LlmUsage>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, usage: &TokenUsage, model: &str) {
        self.usage.write().add(usage, model);
    }

    pub fn snapshot(&self) -> LlmUsage {
        self.usage.read().clone()
    }

    pub fn reset(&self) {
        *self.usage.write() = LlmUsage::default();
    }
}
