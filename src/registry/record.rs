//! Registry data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crate::protocol::{normalize_url, AgentCard, Capability};

const AGENT_ID_PREFIX: &str = "agent-";
const AGENT_ID_HEX_LEN: usize = 32;

/// Deterministic agent id: `agent-` + first 32 hex chars of sha256(normalized url)
pub fn agent_id(url: &str) -> String {
    let normalized = normalize_url(url);
    let digest = Sha256::digest(normalized.as_bytes());
    let hex = hex::encode(digest);
    format!("{}{}", AGENT_ID_PREFIX, &hex[..AGENT_ID_HEX_LEN])
}

/// Availability of a registered agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Active,
    Unhealthy,
    Error,
}

impl AgentStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, AgentStatus::Active)
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Active => write!(f, "active"),
            AgentStatus::Unhealthy => write!(f, "unhealthy"),
            AgentStatus::Error => write!(f, "error"),
        }
    }
}

/// Identity and capability snapshot of a remote agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: String,
    /// Normalized base URL the agent was registered under
    pub url: String,
    pub name: String,
    pub version: String,
    pub description: String,
    pub capabilities: Vec<Capability>,
    pub status: AgentStatus,
    pub last_seen: DateTime<Utc>,
    pub registered_at: DateTime<Utc>,
    pub metadata: HashMap<String, Value>,
    /// Card the record was built from, used for endpoint resolution on dispatch
    pub card: AgentCard,
    /// Insertion order, stable across re-registration
    #[serde(skip)]
    pub(crate) seq: u64,
}

impl AgentRecord {
    pub(crate) fn from_card(url: &str, card: AgentCard, seq: u64) -> Self {
        let now = Utc::now();
        let url = normalize_url(url);
        Self {
            id: agent_id(&url),
            name: card.name.clone(),
            version: card.version.clone(),
            description: card.description.clone().unwrap_or_default(),
            capabilities: card.capabilities.clone(),
            status: AgentStatus::Active,
            last_seen: now,
            registered_at: now,
            metadata: card.metadata.clone(),
            card,
            url,
            seq,
        }
    }

    /// Case-insensitive exact match on capability names
    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities
            .iter()
            .any(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Move `last_seen` forward, never backward
    pub(crate) fn touch(&mut self, at: DateTime<Utc>) {
        if at > self.last_seen {
            self.last_seen = at;
        }
    }
}

/// Collaborator-facing result of a registration attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationResponse {
    pub success: bool,
    pub agent_id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<AgentCard>,
}

/// Registry counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub total: usize,
    pub active: usize,
    pub unhealthy: usize,
    /// Keyed by lowercased capability name, matching `find_by_capability`
    pub per_capability_counts: HashMap<String, usize>,
}
