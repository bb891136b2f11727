//! Per-invocation usage accounting.

use serde::{Deserialize, Serialize};

/// Aggregate usage for one step-loop invocation.
///
/// Constructed fresh per call and returned to the caller; never persisted
/// as its own entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStatistics {
    pub completion_tokens: u64,
    pub prompt_tokens: u64,
    pub total_tokens: u64,
    pub step_count: u64,
}

impl UsageStatistics {
    /// Fold token counts from one provider call into the running total.
    pub fn add_tokens(&mut self, prompt: u64, completion: u64) {
        self.prompt_tokens += prompt;
        self.completion_tokens += completion;
        self.total_tokens += prompt + completion;
    }
}
