//! Platform-level views handed to collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::registry::RegistryStats;
use crate::scheduler::SchedulerStats;

/// Features advertised in [`PlatformInfo`]
pub const PLATFORM_FEATURES: &[&str] = &[
    "agent_discovery",
    "task_scheduling",
    "load_balancing",
    "failover",
    "health_monitoring",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformStatus {
    Running,
    Stopped,
}

/// Summary served to callers asking what this platform is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub status: PlatformStatus,
    pub agents_count: usize,
    pub active_tasks: usize,
    pub features: Vec<String>,
}

/// Registry and scheduler counters taken together
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformSnapshot {
    pub status: PlatformStatus,
    pub registry: RegistryStats,
    pub scheduler: SchedulerStats,
    pub started_at: Option<DateTime<Utc>>,
    pub uptime_secs: u64,
    pub taken_at: DateTime<Utc>,
}
