//! Run metrics.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::Usage;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub model_steps: usize,
    pub model_errors: usize,
    pub tool_calls: usize,
    pub errors: usize,
    pub retries: u32,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub execution_time_ms: u64,
    pub tool_stats: HashMap<String, ToolStats>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolStats {
    pub calls: usize,
    pub total_time_ms: u64,
    pub errors: usize,
}

impl RunMetrics {
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }

    pub fn add_usage(&mut self, usage: &Usage) {
        self.input_tokens += usage.input_tokens;
        self.output_tokens += usage.output_tokens;
    }

    pub fn record_model_step(&mut self, usage: Option<&Usage>) {
        self.model_steps += 1;
        if let Some(usage) = usage {
            self.add_usage(usage);
        }
    }

    pub fn record_model_error(&mut self) {
        self.model_errors += 1;
    }

    pub fn record_tool(&mut self, name: &str, duration_ms: u64, is_error: bool, retries: u32) {
        self.tool_calls += 1;
        self.retries += retries;
        let stats = self.tool_stats.entry(name.to_string()).or_default();
        stats.calls += 1;
        stats.total_time_ms += duration_ms;
        if is_error {
            stats.errors += 1;
            self.errors += 1;
        }
    }

    pub fn avg_tool_time_ms(&self) -> f64 {
        if self.tool_calls == 0 {
            return 0.0;
        }
        let total: u64 = self.tool_stats.values().map(|s| s.total_time_ms).sum();
        total as f64 / self.tool_calls as f64
    }

    /// Folds another pass's metrics into this one.
    pub fn merge(&mut self, other: &RunMetrics) {
        self.model_steps += other.model_steps;
        self.model_errors += other.model_errors;
        self.tool_calls += other.tool_calls;
        self.errors += other.errors;
        self.retries += other.retries;
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.execution_time_ms += other.execution_time_ms;
        for (name, stats) in &other.tool_stats {
            let entry = self.tool_stats.entry(name.clone()).or_default();
            entry.calls += stats.calls;
            entry.total_time_ms += stats.total_time_ms;
            entry.errors += stats.errors;
        }
    }
}
