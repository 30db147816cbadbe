//! Workspace configuration.
//!
//! Plain serde structs with defaults; callers construct one and thread it
//! through the workspace constructor, no global state.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for the job queue, event bus and console bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Number of job workers. Jobs on disjoint resource keys run
    /// concurrently up to this bound.
    pub workers: usize,
    /// Capacity of each subscriber's event mailbox.
    pub mailbox_depth: usize,
    /// Per-subscriber delivery budget in milliseconds; a subscriber that
    /// does not accept an event within the budget has it dropped.
    pub delivery_budget_ms: u64,
    /// Job progress forwarding: minimum fraction change between events.
    pub progress_min_delta: f64,
    /// Job progress forwarding: minimum interval between events.
    pub progress_min_interval_ms: u64,
    /// How long `join_all` waits for the queue to stay drained, covering
    /// jobs that enqueue follow-up work on completion.
    pub join_grace_ms: u64,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            mailbox_depth: 256,
            delivery_budget_ms: 250,
            progress_min_delta: 0.02,
            progress_min_interval_ms: 100,
            join_grace_ms: 500,
        }
    }
}

impl WorkspaceConfig {
    pub fn delivery_budget(&self) -> Duration {
        Duration::from_millis(self.delivery_budget_ms)
    }

    pub fn progress_min_interval(&self) -> Duration {
        Duration::from_millis(self.progress_min_interval_ms)
    }

    pub fn join_grace(&self) -> Duration {
        Duration::from_millis(self.join_grace_ms)
    }

    /// Clamp nonsensical values rather than erroring: zero workers or a
    /// zero-depth mailbox would deadlock the pipeline.
    pub fn normalized(mut self) -> Self {
        if self.workers == 0 {
            self.workers = 1;
        }
        if self.mailbox_depth == 0 {
            self.mailbox_depth = 1;
        }
        self
    }
}
