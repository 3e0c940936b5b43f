//! Agent discovery, health and lifecycle.

pub mod record;
#[allow(clippy::module_inception)]
pub mod registry;

pub use record::{agent_id, AgentRecord, AgentStatus, RegistrationResponse, RegistryStats};
pub use registry::AgentRegistry;
pub(crate) use registry::status_counts;
