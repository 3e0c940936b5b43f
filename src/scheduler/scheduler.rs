//! Task Scheduler
//!
//! Tasks enter a bounded FIFO queue and are drained by a fixed pool of
//! workers. Each worker runs one task to a terminal state: route to the
//! least-loaded active agent, dispatch, and fail over once to an alternate
//! agent when the first dispatch fails.
//!
//! Status writes are compare-and-set under the task's map entry: once a task
//! is terminal, later writes from workers are dropped.

use dashmap::mapref::entry::Entry;
use dashmap::mapref::one::RefMut;
use dashmap::DashMap;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::load::LoadTracker;
use super::task::{Task, TaskStatus};
use crate::config::{SaturationPolicy, SchedulerConfig};
use crate::error::{ProtocolError, SchedulerError};
use crate::protocol::{AgentTransport, Message, TaskRequest};
use crate::registry::{AgentRecord, AgentRegistry};

/// Failure reason when routing finds no candidate
pub const NO_SUITABLE_AGENT: &str = "no suitable agent";

/// Scheduler counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// Tracked tasks not yet terminal
    pub active: usize,
    pub queued: usize,
    pub completed_total: u64,
    pub failed_total: u64,
    pub cancelled_total: u64,
    pub per_agent_load: HashMap<String, usize>,
    pub workers: usize,
}

struct SchedulerInner {
    registry: Arc<AgentRegistry>,
    transport: Arc<dyn AgentTransport>,
    tasks: DashMap<String, Task>,
    load: LoadTracker,
    config: SchedulerConfig,
    queued: AtomicUsize,
    generation: AtomicU64,
    completed_total: AtomicU64,
    failed_total: AtomicU64,
    cancelled_total: AtomicU64,
}

/// Queue entry naming one submission of a task id
struct Queued {
    task_id: String,
    generation: u64,
}

pub struct TaskScheduler {
    inner: Arc<SchedulerInner>,
    sender: StdMutex<Option<mpsc::Sender<Queued>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskScheduler {
    pub fn new(
        registry: Arc<AgentRegistry>,
        transport: Arc<dyn AgentTransport>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                registry,
                transport,
                tasks: DashMap::new(),
                load: LoadTracker::new(),
                config,
                queued: AtomicUsize::new(0),
                generation: AtomicU64::new(0),
                completed_total: AtomicU64::new(0),
                failed_total: AtomicU64::new(0),
                cancelled_total: AtomicU64::new(0),
            }),
            sender: StdMutex::new(None),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Open the queue and spawn the worker pool. No-op when already running.
    pub async fn start(&self) {
        let mut workers = self.workers.lock().await;
        let mut sender = self.sender.lock().unwrap_or_else(|e| e.into_inner());
        if sender.is_some() {
            return;
        }

        let capacity = self.inner.config.queue_capacity.max(1);
        let (tx, rx) = mpsc::channel::<Queued>(capacity);
        let rx = Arc::new(Mutex::new(rx));
        let count = self.inner.config.worker_count();

        for worker_id in 0..count {
            let inner = Arc::clone(&self.inner);
            let rx = Arc::clone(&rx);
            workers.push(tokio::spawn(worker_loop(worker_id, inner, rx)));
        }
        *sender = Some(tx);

        info!(
            workers = count,
            queue_capacity = capacity,
            saturation = ?self.inner.config.saturation,
            "Task scheduler started"
        );
    }

    /// Close the queue, let workers drain what is already queued, then join them.
    pub async fn stop(&self) {
        let mut workers = self.workers.lock().await;
        let closed = self
            .sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .is_some();
        if !closed {
            return;
        }

        for handle in workers.drain(..) {
            if let Err(e) = handle.await {
                error!("Scheduler worker terminated abnormally: {}", e);
            }
        }
        info!("Task scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.sender
            .lock()
            .map(|s| s.is_some())
            .unwrap_or(false)
    }

    /// Track `task` and queue it for processing; returns the task id.
    ///
    /// A full queue either rejects with `Saturated` or waits for space,
    /// depending on the configured saturation policy.
    pub async fn submit(&self, mut task: Task) -> Result<String, SchedulerError> {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(SchedulerError::NotRunning)?;

        // reserve queue space before the task becomes visible, so a caller
        // dropping a blocked submit leaves nothing behind
        let capacity = self.inner.config.queue_capacity.max(1);
        let permit = match self.inner.config.saturation {
            SaturationPolicy::Reject => sender.try_reserve().map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => SchedulerError::Saturated { capacity },
                mpsc::error::TrySendError::Closed(_) => SchedulerError::NotRunning,
            }),
            SaturationPolicy::Block => sender
                .reserve()
                .await
                .map_err(|_| SchedulerError::NotRunning),
        }
        .map_err(|e| {
            warn!("Task rejected: {}", e);
            e
        })?;

        if task.id.trim().is_empty() {
            task.id = uuid::Uuid::new_v4().to_string();
        }
        task.status = TaskStatus::submitted();
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        task.generation = generation;
        let task_id = task.id.clone();

        match self.inner.tasks.entry(task_id.clone()) {
            Entry::Occupied(_) => return Err(SchedulerError::DuplicateTask(task_id)),
            Entry::Vacant(slot) => {
                slot.insert(task);
            }
        }

        self.inner.queued.fetch_add(1, Ordering::SeqCst);
        permit.send(Queued {
            task_id: task_id.clone(),
            generation,
        });

        debug!(task_id = %task_id, "Task submitted");
        Ok(task_id)
    }

    pub fn status(&self, task_id: &str) -> Option<TaskStatus> {
        self.inner.tasks.get(task_id).map(|t| t.status.clone())
    }

    /// Full task snapshot, including history and artifacts
    pub fn task(&self, task_id: &str) -> Option<Task> {
        self.inner.tasks.get(task_id).map(|t| t.clone())
    }

    /// Cancel a non-terminal task. `false` for unknown or terminal tasks.
    pub fn cancel(&self, task_id: &str) -> bool {
        let generation = match self.inner.tasks.get_mut(task_id) {
            Some(mut task) => {
                if !task.transition(TaskStatus::cancelled()) {
                    return false;
                }
                task.generation
            }
            None => return false,
        };
        self.inner.cancelled_total.fetch_add(1, Ordering::Relaxed);
        info!(task_id = %task_id, "Task cancelled");
        self.inner.schedule_removal(task_id, generation);
        true
    }

    pub fn load(&self, agent_id: &str) -> usize {
        self.inner.load.load(agent_id)
    }

    pub fn stats(&self) -> SchedulerStats {
        let active = self
            .inner
            .tasks
            .iter()
            .filter(|t| !t.is_terminal())
            .count();
        SchedulerStats {
            active,
            queued: self.inner.queued.load(Ordering::SeqCst),
            completed_total: self.inner.completed_total.load(Ordering::Relaxed),
            failed_total: self.inner.failed_total.load(Ordering::Relaxed),
            cancelled_total: self.inner.cancelled_total.load(Ordering::Relaxed),
            per_agent_load: self.inner.load.snapshot(),
            workers: self.inner.config.worker_count(),
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    inner: Arc<SchedulerInner>,
    rx: Arc<Mutex<mpsc::Receiver<Queued>>>,
) {
    debug!(worker_id, "Scheduler worker started");
    loop {
        let next = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(Queued {
            task_id,
            generation,
        }) = next
        else {
            break;
        };
        inner.queued.fetch_sub(1, Ordering::SeqCst);

        let outcome = AssertUnwindSafe(inner.process(&task_id, generation))
            .catch_unwind()
            .await;
        if let Err(panic) = outcome {
            let reason = panic_message(panic.as_ref());
            error!(worker_id, task_id = %task_id, "Task processing panicked: {}", reason);
            inner.finish_failed(&task_id, generation, format!("internal error: {}", reason));
        }
        inner.schedule_removal(&task_id, generation);
    }
    debug!(worker_id, "Scheduler worker exiting");
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

impl SchedulerInner {
    /// Mutable access to one submission; `None` once the id was removed or reused
    fn tracked_mut(&self, task_id: &str, generation: u64) -> Option<RefMut<'_, String, Task>> {
        self.tasks
            .get_mut(task_id)
            .filter(|task| task.generation == generation)
    }

    async fn process(&self, task_id: &str, generation: u64) {
        let request = {
            let Some(mut task) = self.tracked_mut(task_id, generation) else {
                debug!(task_id = %task_id, "Skipping task removed while queued");
                return;
            };
            if !task.transition(TaskStatus::in_progress("Routing task")) {
                debug!(task_id = %task_id, state = %task.status.state, "Skipping terminal task");
                return;
            }
            task.to_request()
        };

        let Some(agent) = self.route(None) else {
            warn!(task_id = %task_id, "No suitable agent for task");
            self.finish_failed(task_id, generation, NO_SUITABLE_AGENT);
            return;
        };

        let first_error = match self.dispatch(&agent, &request).await {
            Ok(body) => {
                self.finish_completed(task_id, generation, &agent, body);
                return;
            }
            Err(e) => e,
        };
        self.registry.mark_unhealthy(&agent.id);

        // one failover attempt, never more
        let Some(alternate) = self.route(Some(agent.url.as_str())) else {
            self.finish_failed(
                task_id,
                generation,
                format!("dispatch to {} failed: {}", agent.name, first_error),
            );
            return;
        };

        info!(
            task_id = %task_id,
            failed_agent = %agent.id,
            alternate_agent = %alternate.id,
            "Failing over to alternate agent"
        );
        match self.dispatch(&alternate, &request).await {
            Ok(body) => self.finish_completed(task_id, generation, &alternate, body),
            Err(second_error) => {
                self.registry.mark_unhealthy(&alternate.id);
                self.finish_failed(
                    task_id,
                    generation,
                    format!(
                        "dispatch to {} failed: {}; failover to {} failed: {}",
                        agent.name, first_error, alternate.name, second_error
                    ),
                );
            }
        }
    }

    /// Least-loaded active agent, ties broken by registration order
    fn route(&self, exclude_url: Option<&str>) -> Option<AgentRecord> {
        self.registry
            .list()
            .into_iter()
            .filter(|a| a.status.is_active())
            .filter(|a| exclude_url != Some(a.url.as_str()))
            .min_by_key(|a| self.load.load(&a.id))
    }

    async fn dispatch(
        &self,
        agent: &AgentRecord,
        request: &TaskRequest,
    ) -> Result<Value, ProtocolError> {
        let _guard = self.load.acquire(&agent.id);
        debug!(task_id = %request.task_id, agent_id = %agent.id, "Dispatching task");
        let result = self
            .transport
            .submit_task(&agent.url, request, &agent.card)
            .await;
        if let Err(e) = &result {
            if e.is_network() {
                warn!(task_id = %request.task_id, agent_id = %agent.id, "Dispatch failed: {}", e);
            } else {
                error!(task_id = %request.task_id, agent_id = %agent.id, "Dispatch failed: {}", e);
            }
        }
        result
    }

    fn finish_completed(&self, task_id: &str, generation: u64, agent: &AgentRecord, body: Value) {
        let Some(mut task) = self.tracked_mut(task_id, generation) else {
            return;
        };
        if task.is_terminal() {
            debug!(task_id = %task_id, state = %task.status.state, "Dropping late completion");
            return;
        }

        if let Some(reply) = body
            .get("message")
            .and_then(|m| serde_json::from_value::<Message>(m.clone()).ok())
        {
            task.append_history(reply);
        }
        if let Some(artifacts) = body.get("artifacts").and_then(Value::as_array) {
            task.append_artifacts(artifacts.iter().cloned());
        }
        task.assigned_agent = Some(agent.id.clone());
        task.transition(TaskStatus::completed(format!(
            "Task completed by {}",
            agent.name
        )));
        drop(task);

        self.completed_total.fetch_add(1, Ordering::Relaxed);
        info!(task_id = %task_id, agent_id = %agent.id, "Task completed");
    }

    fn finish_failed(&self, task_id: &str, generation: u64, reason: impl Into<String>) {
        let reason = reason.into();
        let failed = match self.tracked_mut(task_id, generation) {
            Some(mut task) => task.transition(TaskStatus::failed(reason.clone())),
            None => false,
        };
        if failed {
            self.failed_total.fetch_add(1, Ordering::Relaxed);
            warn!(task_id = %task_id, "Task failed: {}", reason);
        }
    }

    /// Drop the task from the table once the grace period has passed.
    ///
    /// The timer only removes the submission it was armed for; a later task
    /// reusing the id keeps its own grace period.
    fn schedule_removal(self: &Arc<Self>, task_id: &str, generation: u64) {
        match self.tasks.get(task_id) {
            Some(task) if task.generation == generation && task.is_terminal() => {}
            _ => return,
        }

        let grace = self.config.task_grace_period();
        let task_id = task_id.to_string();
        let inner = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let Some(inner) = inner.upgrade() else { return };
            if inner
                .tasks
                .remove_if(&task_id, |_, t| t.generation == generation && t.is_terminal())
                .is_some()
            {
                debug!(task_id = %task_id, "Task removed after grace period");
            }
        });
    }
}
