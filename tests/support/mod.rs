//! In-process fake agents serving the discovery, task, status and health
//! endpoints on an ephemeral localhost port.

#![allow(dead_code)]

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use switchboard::config::AppConfig;
use switchboard::{Coordinator, TaskStatus};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

pub struct AgentState {
    pub name: String,
    pub base_url: String,
    pub capabilities: Vec<String>,
    pub fail_tasks: AtomicBool,
    pub healthy: AtomicBool,
    pub declare_endpoint: AtomicBool,
    pub task_hits: AtomicUsize,
    pub custom_hits: AtomicUsize,
    pub card_override: Mutex<Option<Value>>,
    pub last_envelope: Mutex<Option<Value>>,
    /// When set, task handlers wait for a permit before answering
    pub gate: Mutex<Option<Arc<Semaphore>>>,
}

pub struct FakeAgent {
    pub url: String,
    pub state: Arc<AgentState>,
    handle: JoinHandle<()>,
}

impl FakeAgent {
    pub async fn spawn(name: &str, capabilities: &[&str]) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake agent");
        let addr = listener.local_addr().expect("local addr");
        let url = format!("http://{}", addr);

        let state = Arc::new(AgentState {
            name: name.to_string(),
            base_url: url.clone(),
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
            fail_tasks: AtomicBool::new(false),
            healthy: AtomicBool::new(true),
            declare_endpoint: AtomicBool::new(false),
            task_hits: AtomicUsize::new(0),
            custom_hits: AtomicUsize::new(0),
            card_override: Mutex::new(None),
            last_envelope: Mutex::new(None),
            gate: Mutex::new(None),
        });

        let app = Router::new()
            .route("/.well-known/agent.json", get(card))
            .route("/api/tasks", post(accept_task))
            .route("/api/tasks/:task_id", get(task_status))
            .route("/custom/tasks", post(accept_custom_task))
            .route("/health", get(health))
            .with_state(Arc::clone(&state));

        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { url, state, handle }
    }

    pub fn failing(self) -> Self {
        self.state.fail_tasks.store(true, Ordering::SeqCst);
        self
    }

    pub fn set_card(&self, card: Value) {
        *self.state.card_override.lock().unwrap() = Some(card);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.state.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Hold every task request until a permit is added to the returned gate
    pub fn gate(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.state.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn task_hits(&self) -> usize {
        self.state.task_hits.load(Ordering::SeqCst)
    }

    pub fn last_envelope(&self) -> Option<Value> {
        self.state.last_envelope.lock().unwrap().clone()
    }

    /// Stop serving; later connections are refused
    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

impl Drop for FakeAgent {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn card(State(state): State<Arc<AgentState>>) -> Json<Value> {
    if let Some(card) = state.card_override.lock().unwrap().clone() {
        return Json(card);
    }
    let capabilities: Vec<Value> = state
        .capabilities
        .iter()
        .map(|c| json!({"name": c, "description": format!("{} capability", c)}))
        .collect();
    let mut card = json!({
        "name": state.name,
        "url": state.base_url,
        "version": "1.0.0",
        "description": "fake agent",
        "capabilities": capabilities,
    });
    if state.declare_endpoint.load(Ordering::SeqCst) {
        card["protocols"] = json!({"a2a": {"endpoint": format!("{}/custom/tasks", state.base_url)}});
    }
    Json(card)
}

async fn handle_task(state: &AgentState, envelope: Value) -> Response {
    state.task_hits.fetch_add(1, Ordering::SeqCst);
    *state.last_envelope.lock().unwrap() = Some(envelope.clone());

    let gate = state.gate.lock().unwrap().clone();
    if let Some(gate) = gate {
        if let Ok(permit) = gate.acquire().await {
            permit.forget();
        }
    }

    if state.fail_tasks.load(Ordering::SeqCst) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "agent failure"})),
        )
            .into_response();
    }

    let task_id = envelope["payload"]["task_id"].clone();
    Json(json!({
        "task_id": task_id,
        "status": "completed",
        "message": {
            "role": "agent",
            "parts": [{"type": "text", "content": format!("handled by {}", state.name)}]
        },
        "artifacts": [{"agent": state.name}]
    }))
    .into_response()
}

async fn accept_task(State(state): State<Arc<AgentState>>, Json(envelope): Json<Value>) -> Response {
    handle_task(&state, envelope).await
}

async fn accept_custom_task(
    State(state): State<Arc<AgentState>>,
    Json(envelope): Json<Value>,
) -> Response {
    state.custom_hits.fetch_add(1, Ordering::SeqCst);
    handle_task(&state, envelope).await
}

async fn task_status(Path(task_id): Path<String>) -> Json<Value> {
    Json(json!({"task_id": task_id, "status": "completed"}))
}

async fn health(State(state): State<Arc<AgentState>>) -> StatusCode {
    if state.healthy.load(Ordering::SeqCst) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Config with short timeouts and no background loops
pub fn test_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.protocol.request_timeout_ms = 2_000;
    cfg.protocol.health_timeout_ms = 500;
    cfg.registry.health_check_interval_secs = 0;
    cfg.registry.agent_timeout_ms = 1_000;
    cfg.metrics.enabled = false;
    cfg.scheduler.workers = 2;
    cfg.scheduler.queue_capacity = 16;
    cfg.scheduler.task_grace_period_ms = 60_000;
    cfg
}

pub async fn started(cfg: AppConfig) -> Coordinator {
    let coordinator = Coordinator::new(cfg).expect("build coordinator");
    coordinator.start().await;
    coordinator
}

pub async fn wait_terminal(coordinator: &Coordinator, task_id: &str) -> TaskStatus {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        if let Some(status) = coordinator.task_status(task_id) {
            if status.state.is_terminal() {
                return status;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "task {task_id} did not finish"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
