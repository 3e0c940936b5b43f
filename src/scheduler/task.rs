//! Task model and state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::protocol::{Message, TaskRequest};

/// Task lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Submitted,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    /// Completed, failed and cancelled tasks never change state again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled
        )
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskState::Submitted => write!(f, "submitted"),
            TaskState::InProgress => write!(f, "in_progress"),
            TaskState::Completed => write!(f, "completed"),
            TaskState::Failed => write!(f, "failed"),
            TaskState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Status snapshot. Replaced wholesale on every transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub state: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Fraction in `[0, 1]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl TaskStatus {
    fn new(state: TaskState) -> Self {
        Self {
            state,
            message: None,
            progress: None,
            error: None,
            updated_at: Utc::now(),
        }
    }

    pub fn submitted() -> Self {
        Self {
            progress: Some(0.0),
            ..Self::new(TaskState::Submitted)
        }
    }

    pub fn in_progress(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::new(TaskState::InProgress)
        }
    }

    pub fn completed(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            progress: Some(1.0),
            ..Self::new(TaskState::Completed)
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            message: Some(format!("Task failed: {}", error)),
            error: Some(error),
            ..Self::new(TaskState::Failed)
        }
    }

    pub fn cancelled() -> Self {
        Self {
            message: Some("Task cancelled".to_string()),
            ..Self::new(TaskState::Cancelled)
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// A unit of work submitted by a caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Empty until assigned by the scheduler, unless the caller picks one
    pub id: String,
    pub message: Message,
    #[serde(default)]
    pub context_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    pub status: TaskStatus,
    /// Append-only conversation, starting with the submitted message
    pub history: Vec<Message>,
    pub artifacts: Vec<Value>,
    pub metadata: HashMap<String, Value>,
    /// Agent that accepted the task
    #[serde(default)]
    pub assigned_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Submission number assigned by the scheduler, distinct per tracked id
    #[serde(skip)]
    pub(crate) generation: u64,
}

impl Task {
    pub fn new(message: Message) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            history: vec![message.clone()],
            message,
            context_id: None,
            session_id: None,
            status: TaskStatus::submitted(),
            artifacts: Vec::new(),
            metadata: HashMap::new(),
            assigned_agent: None,
            created_at: now,
            updated_at: now,
            generation: 0,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_context(mut self, context_id: impl Into<String>) -> Self {
        self.context_id = Some(context_id.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Replace the status unless the task is already terminal.
    ///
    /// Returns `false` (and leaves the task untouched) when rejected.
    pub(crate) fn transition(&mut self, mut status: TaskStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        let at = self.advance_clock();
        status.updated_at = at;
        self.status = status;
        true
    }

    pub(crate) fn append_history(&mut self, message: Message) {
        self.advance_clock();
        self.history.push(message);
    }

    pub(crate) fn append_artifacts(&mut self, artifacts: impl IntoIterator<Item = Value>) {
        self.advance_clock();
        self.artifacts.extend(artifacts);
    }

    /// Wire request for dispatch
    pub fn to_request(&self) -> TaskRequest {
        TaskRequest {
            task_id: self.id.clone(),
            message: self.message.clone(),
            context_id: self.context_id.clone(),
            session_id: self.session_id.clone(),
            metadata: self.metadata.clone(),
        }
    }

    // strictly increasing even when two mutations share a clock tick
    fn advance_clock(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        self.updated_at = if now > self.updated_at {
            now
        } else {
            self.updated_at + chrono::Duration::microseconds(1)
        };
        self.updated_at
    }
}
