//! Coordination core for independently running A2A agents: an agent
//! registry, a bounded task scheduler with one-shot failover, and the
//! protocol client both of them use to talk to agents.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod registry;
pub mod scheduler;

pub use config::AppConfig;
pub use coordinator::{Coordinator, PlatformInfo, PlatformSnapshot, PlatformStatus};
pub use error::{ProtocolError, RegistrationError, Result, SchedulerError, SwitchboardError};
pub use protocol::{AgentCard, AgentTransport, Message, ProtocolClient, Role};
pub use registry::{AgentRecord, AgentRegistry, AgentStatus, RegistrationResponse, RegistryStats};
pub use scheduler::{SchedulerStats, Task, TaskScheduler, TaskState, TaskStatus};
