//! Wire shapes shared with remote agents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Envelope message type for task submission
pub const TASK_REQUEST: &str = "task_request";

/// Message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
    System,
}

/// Kind of a message part
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartKind {
    Text,
    Image,
    File,
    Data,
}

/// One piece of message content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    #[serde(rename = "type")]
    pub kind: PartKind,
    /// Text, base64 payload or structured data depending on `kind`
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, Value>>,
}

/// A message exchanged with an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub role: Role,
    pub parts: Vec<Part>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

impl Message {
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self {
            id: None,
            role,
            parts,
            timestamp: Utc::now(),
            context_id: None,
            task_id: None,
        }
    }

    /// Single text part message
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self::new(
            role,
            vec![Part {
                kind: PartKind::Text,
                content: Value::String(content.into()),
                metadata: None,
            }],
        )
    }

    /// Single image part; `data` is expected to be base64 encoded already
    pub fn image(role: Role, data: impl Into<String>) -> Self {
        Self::new(
            role,
            vec![Part {
                kind: PartKind::Image,
                content: Value::String(data.into()),
                metadata: None,
            }],
        )
    }

    /// Single file part carrying its filename in metadata
    pub fn file(role: Role, data: impl Into<String>, filename: &str) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("filename".to_string(), Value::String(filename.to_string()));
        Self::new(
            role,
            vec![Part {
                kind: PartKind::File,
                content: Value::String(data.into()),
                metadata: Some(metadata),
            }],
        )
    }

    /// Single structured data part
    pub fn data(role: Role, data: Value) -> Self {
        Self::new(
            role,
            vec![Part {
                kind: PartKind::Data,
                content: data,
                metadata: None,
            }],
        )
    }

    pub fn with_context(mut self, context_id: impl Into<String>) -> Self {
        self.context_id = Some(context_id.into());
        self
    }

    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }
}

/// Capability advertised on an agent card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input_types: Vec<String>,
    #[serde(default)]
    pub output_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<HashMap<String, Value>>,
}

impl Capability {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            input_types: vec!["text/plain".to_string()],
            output_types: vec!["text/plain".to_string()],
            parameters: None,
        }
    }
}

/// Agent provider information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
}

/// A protocol binding declared on a card (e.g. `protocols.a2a.endpoint`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtocolBinding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Agent card as served from `/.well-known/agent.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCard {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_card_version")]
    pub version: String,
    #[serde(default)]
    pub provider: Option<Provider>,
    #[serde(default)]
    pub documentation_url: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    #[serde(default)]
    pub protocols: HashMap<String, ProtocolBinding>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

pub(crate) fn default_card_version() -> String {
    "1.0.0".to_string()
}

impl AgentCard {
    /// Task endpoint declared under the `a2a` protocol binding, if any
    pub fn task_endpoint(&self) -> Option<&str> {
        self.protocols
            .get("a2a")
            .and_then(|p| p.endpoint.as_deref())
            .filter(|e| !e.trim().is_empty())
    }
}

/// What a caller hands the protocol client for submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub task_id: String,
    pub message: Message,
    #[serde(default)]
    pub context_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

/// `a2a_protocol` header of the envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolHeader {
    pub version: String,
    pub message_type: String,
    pub source_agent: String,
    pub target_agent: String,
    pub correlation_id: String,
    pub timestamp: DateTime<Utc>,
}

/// `payload` of the envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPayload {
    pub task_id: String,
    pub message: Message,
    pub metadata: HashMap<String, Value>,
    pub context_id: Option<String>,
    pub session_id: Option<String>,
}

/// Full body POSTed to an agent's task endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub a2a_protocol: ProtocolHeader,
    pub payload: TaskPayload,
}

impl TaskEnvelope {
    /// Wrap a request with a fresh correlation id
    pub fn task_request(
        version: &str,
        source_agent: &str,
        target_agent: &str,
        request: &TaskRequest,
    ) -> Self {
        Self {
            a2a_protocol: ProtocolHeader {
                version: version.to_string(),
                message_type: TASK_REQUEST.to_string(),
                source_agent: source_agent.to_string(),
                target_agent: target_agent.to_string(),
                correlation_id: uuid::Uuid::new_v4().to_string(),
                timestamp: Utc::now(),
            },
            payload: TaskPayload {
                task_id: request.task_id.clone(),
                message: request.message.clone(),
                metadata: request.metadata.clone(),
                context_id: request.context_id.clone(),
                session_id: request.session_id.clone(),
            },
        }
    }
}
