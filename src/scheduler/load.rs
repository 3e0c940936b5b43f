//! Per-agent in-flight dispatch counters.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;

/// Count of in-flight dispatches per agent id.
///
/// Counters only move through [`LoadGuard`], so every increment is paired
/// with exactly one decrement, including on early return and unwinding.
/// Agents with nothing in flight have no entry.
#[derive(Debug, Clone, Default)]
pub struct LoadTracker {
    counts: Arc<DashMap<String, usize>>,
}

impl LoadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment `agent_id`'s counter until the returned guard drops
    pub fn acquire(&self, agent_id: &str) -> LoadGuard {
        *self.counts.entry(agent_id.to_string()).or_insert(0) += 1;
        LoadGuard {
            counts: Arc::clone(&self.counts),
            agent_id: agent_id.to_string(),
        }
    }

    pub fn load(&self, agent_id: &str) -> usize {
        self.counts.get(agent_id).map(|c| *c).unwrap_or(0)
    }

    pub fn snapshot(&self) -> HashMap<String, usize> {
        self.counts
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }
}

#[must_use = "the load counter is released as soon as the guard drops"]
#[derive(Debug)]
pub struct LoadGuard {
    counts: Arc<DashMap<String, usize>>,
    agent_id: String,
}

impl Drop for LoadGuard {
    fn drop(&mut self) {
        if let Some(mut count) = self.counts.get_mut(&self.agent_id) {
            *count = count.saturating_sub(1);
        }
        // re-checked under the shard lock, so a concurrent acquire keeps its entry
        self.counts.remove_if(&self.agent_id, |_, count| *count == 0);
    }
}
