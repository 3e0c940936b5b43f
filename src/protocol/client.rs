//! Outbound HTTP client implementing the agent-facing wire contract.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::card::{normalize_url, parse_card};
use super::types::{AgentCard, TaskEnvelope, TaskRequest};
use crate::config::{PlatformConfig, ProtocolConfig};
use crate::error::{ProtocolError, SwitchboardError};

/// Discovery document path
pub const AGENT_CARD_PATH: &str = "/.well-known/agent.json";
/// Default task submission path
pub const TASKS_PATH: &str = "/api/tasks";
/// Health probe path
pub const HEALTH_PATH: &str = "/health";

/// Agent-facing operations used by the registry and scheduler.
///
/// `ProtocolClient` is the production implementation; tests substitute
/// mocks or point the real client at local fake agents.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AgentTransport: Send + Sync {
    /// Fetch and parse the agent card at `{url}/.well-known/agent.json`
    async fn fetch_card(&self, url: &str) -> Result<AgentCard, ProtocolError>;

    /// Submit a task to a registered agent, returning the decoded JSON
    /// body on 2xx
    async fn submit_task(
        &self,
        agent_url: &str,
        request: &TaskRequest,
        card: &AgentCard,
    ) -> Result<Value, ProtocolError>;

    /// Poll the agent for a task's status
    async fn get_status(&self, agent_url: &str, task_id: &str) -> Result<Value, ProtocolError>;

    /// `Ok(true)` on 2xx, `Ok(false)` on non-2xx or network failure,
    /// `Err` only for conditions that are not a plain failed ping
    async fn check_health(&self, agent_url: &str) -> Result<bool, ProtocolError>;
}

/// reqwest-backed protocol client
#[derive(Clone)]
pub struct ProtocolClient {
    http: Client,
    protocol_version: String,
    source_agent: String,
    request_timeout: Duration,
    health_timeout: Duration,
}

impl ProtocolClient {
    pub fn new(protocol: &ProtocolConfig, platform: &PlatformConfig) -> crate::Result<Self> {
        let http = Client::builder()
            .user_agent(protocol.user_agent.clone())
            .timeout(protocol.request_timeout())
            .build()
            .map_err(|e| {
                SwitchboardError::Internal(format!("failed to build agent HTTP client: {}", e))
            })?;

        Ok(Self {
            http,
            protocol_version: protocol.version.clone(),
            source_agent: platform.source_agent.clone(),
            request_timeout: protocol.request_timeout(),
            health_timeout: protocol.health_timeout(),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Health probe that never fails: anything but a 2xx is `false`
    pub async fn health_check(&self, agent_url: &str) -> bool {
        self.check_health(agent_url).await.unwrap_or(false)
    }

    /// Card-declared endpoint if present, else `{base}/api/tasks`
    pub fn task_endpoint(base: &str, card: Option<&AgentCard>) -> String {
        match card.and_then(AgentCard::task_endpoint) {
            Some(endpoint) => endpoint.to_string(),
            None => format!("{}{}", base, TASKS_PATH),
        }
    }

    /// POST a task envelope to `card`'s declared endpoint, or to
    /// `{agent_url}/api/tasks` when there is no card or no declared endpoint.
    pub async fn post_task(
        &self,
        agent_url: &str,
        request: &TaskRequest,
        card: Option<&AgentCard>,
    ) -> Result<Value, ProtocolError> {
        let base = normalize_url(agent_url);
        let task_url = Self::task_endpoint(&base, card);
        let target = card.map(|c| c.name.as_str()).unwrap_or("unknown");
        let envelope =
            TaskEnvelope::task_request(&self.protocol_version, &self.source_agent, target, request);

        debug!(
            url = %task_url,
            task_id = %request.task_id,
            correlation_id = %envelope.a2a_protocol.correlation_id,
            "Submitting task"
        );

        let resp = self
            .http
            .post(&task_url)
            .header(CONTENT_TYPE, "application/json")
            .json(&envelope)
            .send()
            .await
            .map_err(|e| ProtocolError::from_reqwest(&task_url, e))?
            .error_for_status()
            .map_err(|e| ProtocolError::from_reqwest(&task_url, e))?;

        let body = decode_json(&task_url, resp).await?;
        info!(url = %base, task_id = %request.task_id, "Task accepted by agent");
        Ok(body)
    }

    async fn get_json(&self, url: &str, timeout: Duration) -> Result<Value, ProtocolError> {
        let resp = self
            .http
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| ProtocolError::from_reqwest(url, e))?
            .error_for_status()
            .map_err(|e| ProtocolError::from_reqwest(url, e))?;

        decode_json(url, resp).await
    }
}

async fn decode_json(url: &str, resp: reqwest::Response) -> Result<Value, ProtocolError> {
    let text = resp
        .text()
        .await
        .map_err(|e| ProtocolError::from_reqwest(url, e))?;
    serde_json::from_str(&text).map_err(|e| ProtocolError::ResponseMalformed {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl AgentTransport for ProtocolClient {
    async fn fetch_card(&self, url: &str) -> Result<AgentCard, ProtocolError> {
        let base = normalize_url(url);
        let card_url = format!("{}{}", base, AGENT_CARD_PATH);
        debug!(url = %card_url, "Fetching agent card");

        let body = match self.get_json(&card_url, self.request_timeout).await {
            Ok(body) => body,
            Err(e) if e.is_network() => {
                warn!(url = %base, "Agent card unreachable: {}", e);
                return Err(e);
            }
            Err(e) => {
                warn!(url = %base, "Agent card request failed: {}", e);
                return Err(e);
            }
        };

        let card = parse_card(&base, body).ok_or_else(|| ProtocolError::ResponseMalformed {
            url: card_url.clone(),
            reason: "agent card is not a JSON object".to_string(),
        })?;

        info!(url = %base, name = %card.name, "Retrieved agent card");
        Ok(card)
    }

    async fn submit_task(
        &self,
        agent_url: &str,
        request: &TaskRequest,
        card: &AgentCard,
    ) -> Result<Value, ProtocolError> {
        self.post_task(agent_url, request, Some(card)).await
    }

    async fn get_status(&self, agent_url: &str, task_id: &str) -> Result<Value, ProtocolError> {
        let base = normalize_url(agent_url);
        let status_url = format!("{}{}/{}", base, TASKS_PATH, urlencoding::encode(task_id));
        self.get_json(&status_url, self.request_timeout).await
    }

    async fn check_health(&self, agent_url: &str) -> Result<bool, ProtocolError> {
        let base = normalize_url(agent_url);
        let health_url = format!("{}{}", base, HEALTH_PATH);
        if url::Url::parse(&health_url).is_err() {
            return Err(ProtocolError::InvalidUrl(health_url));
        }

        match self
            .http
            .get(&health_url)
            .timeout(self.health_timeout)
            .send()
            .await
        {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(e) if e.is_builder() => Err(ProtocolError::from_reqwest(&health_url, e)),
            Err(e) => {
                debug!(url = %base, "Health check failed: {}", e);
                Ok(false)
            }
        }
    }
}
