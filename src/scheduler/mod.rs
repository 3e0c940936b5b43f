//! Task queueing, routing, failover and lifecycle.

pub mod load;
#[allow(clippy::module_inception)]
pub mod scheduler;
pub mod task;

pub use load::{LoadGuard, LoadTracker};
pub use scheduler::{SchedulerStats, TaskScheduler, NO_SUITABLE_AGENT};
pub use task::{Task, TaskState, TaskStatus};
