//! Agent-facing wire contract: card discovery, task submission, status and health.

pub mod card;
pub mod client;
pub mod types;

pub use card::{has_http_scheme, normalize_url, parse_card, validate_card};
pub use client::{
    AgentTransport, ProtocolClient, AGENT_CARD_PATH, HEALTH_PATH, TASKS_PATH,
};
#[cfg(test)]
pub use client::MockAgentTransport;
pub use types::{
    AgentCard, Capability, Message, Part, PartKind, ProtocolBinding, ProtocolHeader, Provider,
    Role, TaskEnvelope, TaskPayload, TaskRequest, TASK_REQUEST,
};
