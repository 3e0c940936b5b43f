use thiserror::Error;

/// Main error type for the switchboard
#[derive(Error, Debug)]
pub enum SwitchboardError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Agent-facing wire errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    // Registry errors
    #[error("Registration failed: {0}")]
    Registration(#[from] RegistrationError),

    // Scheduler errors
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for SwitchboardError
pub type Result<T> = std::result::Result<T, SwitchboardError>;

/// Errors raised while talking to a remote agent.
///
/// The protocol client is the only layer that sees raw transport and
/// parse failures; everything it returns has been folded into one of these.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Agent unreachable at {url}: {reason}")]
    NetworkUnreachable { url: String, reason: String },

    #[error("Agent at {url} answered HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Malformed response from {url}: {reason}")]
    ResponseMalformed { url: String, reason: String },

    #[error("Invalid agent URL: {0}")]
    InvalidUrl(String),
}

impl ProtocolError {
    /// Connect/timeout class failures. Expected in normal operation.
    pub fn is_network(&self) -> bool {
        matches!(self, ProtocolError::NetworkUnreachable { .. })
    }

    /// Schema violations in an otherwise successful exchange
    pub fn is_malformed(&self) -> bool {
        matches!(self, ProtocolError::ResponseMalformed { .. })
    }

    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_decode() {
            return ProtocolError::ResponseMalformed {
                url: url.to_string(),
                reason: err.to_string(),
            };
        }
        if let Some(status) = err.status() {
            return ProtocolError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            };
        }
        if err.is_builder() {
            return ProtocolError::InvalidUrl(format!("{}: {}", url, err));
        }
        // connect, timeout, request and body errors all mean the agent
        // could not be reached within the bounded timeout
        ProtocolError::NetworkUnreachable {
            url: url.to_string(),
            reason: err.to_string(),
        }
    }
}

/// Typed failure of `AgentRegistry::register`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("agent card unreachable at {url}: {reason}")]
    CardUnreachable { url: String, reason: String },

    #[error("agent card at {url} is invalid: {reason}")]
    CardInvalid { url: String, reason: String },
}

impl RegistrationError {
    pub fn url(&self) -> &str {
        match self {
            RegistrationError::CardUnreachable { url, .. } => url,
            RegistrationError::CardInvalid { url, .. } => url,
        }
    }

    /// Fold a card-fetch failure into the registry's taxonomy.
    pub(crate) fn from_protocol(url: &str, err: ProtocolError) -> Self {
        match err {
            ProtocolError::NetworkUnreachable { reason, .. } => RegistrationError::CardUnreachable {
                url: url.to_string(),
                reason,
            },
            ProtocolError::HttpStatus { status, .. } => RegistrationError::CardUnreachable {
                url: url.to_string(),
                reason: format!("HTTP {}", status),
            },
            ProtocolError::ResponseMalformed { reason, .. } => RegistrationError::CardInvalid {
                url: url.to_string(),
                reason,
            },
            ProtocolError::InvalidUrl(reason) => RegistrationError::CardInvalid {
                url: url.to_string(),
                reason,
            },
        }
    }
}

/// Errors surfaced by `TaskScheduler::submit`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("scheduler saturated: queue capacity {capacity} reached")]
    Saturated { capacity: usize },

    #[error("scheduler is not running")]
    NotRunning,

    #[error("task id '{0}' is already tracked")]
    DuplicateTask(String),
}
