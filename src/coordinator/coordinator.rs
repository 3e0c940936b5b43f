//! Platform Coordinator
//!
//! Wires one protocol client, the agent registry and the task scheduler
//! together and runs the periodic background loops:
//!
//! - health sweep every `registry.health_check_interval_secs`
//! - metrics log every `metrics.interval_secs`
//!
//! Start order is registry, scheduler, loops. Stop runs in reverse.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::state::{PlatformInfo, PlatformSnapshot, PlatformStatus, PLATFORM_FEATURES};
use crate::config::AppConfig;
use crate::error::{RegistrationError, Result, SchedulerError};
use crate::protocol::{AgentTransport, ProtocolClient};
use crate::registry::{status_counts, AgentRecord, AgentRegistry, RegistrationResponse};
use crate::scheduler::{Task, TaskScheduler, TaskStatus};

pub struct Coordinator {
    config: AppConfig,
    registry: Arc<AgentRegistry>,
    scheduler: Arc<TaskScheduler>,
    shutdown_tx: watch::Sender<bool>,
    loops: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
    started_at: StdMutex<Option<DateTime<Utc>>>,
}

impl Coordinator {
    /// Build a coordinator talking to agents over HTTP
    pub fn new(config: AppConfig) -> Result<Self> {
        let client = ProtocolClient::new(&config.protocol, &config.platform)?;
        Ok(Self::with_transport(config, Arc::new(client)))
    }

    /// Build a coordinator over any transport
    pub fn with_transport(config: AppConfig, transport: Arc<dyn AgentTransport>) -> Self {
        let registry = Arc::new(AgentRegistry::new(
            Arc::clone(&transport),
            &config.registry,
        ));
        let scheduler = Arc::new(TaskScheduler::new(
            Arc::clone(&registry),
            transport,
            config.scheduler.clone(),
        ));
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            config,
            registry,
            scheduler,
            shutdown_tx,
            loops: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
            started_at: StdMutex::new(None),
        }
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn scheduler(&self) -> &Arc<TaskScheduler> {
        &self.scheduler
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(name = %self.config.platform.name, "Starting platform");

        self.registry.start();
        self.scheduler.start().await;
        self.shutdown_tx.send_replace(false);

        let mut loops = self.loops.lock().await;
        let health_interval = self.config.registry.health_check_interval_secs;
        if health_interval > 0 {
            loops.push(tokio::spawn(health_loop(
                Arc::clone(&self.registry),
                Duration::from_secs(health_interval),
                Duration::from_secs(self.config.registry.health_retry_delay_secs),
                self.shutdown_tx.subscribe(),
            )));
        }
        if self.config.metrics.enabled && self.config.metrics.interval_secs > 0 {
            loops.push(tokio::spawn(metrics_loop(
                Arc::clone(&self.registry),
                Arc::clone(&self.scheduler),
                Duration::from_secs(self.config.metrics.interval_secs),
                self.shutdown_tx.subscribe(),
            )));
        }

        *self.started_at.lock().unwrap_or_else(|e| e.into_inner()) = Some(Utc::now());
        info!(background_loops = loops.len(), "Platform started");
    }

    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("Stopping platform");

        self.shutdown_tx.send_replace(true);
        let mut loops = self.loops.lock().await;
        for handle in loops.drain(..) {
            if let Err(e) = handle.await {
                error!("Background loop terminated abnormally: {}", e);
            }
        }

        self.scheduler.stop().await;
        self.registry.stop();
        *self.started_at.lock().unwrap_or_else(|e| e.into_inner()) = None;
        info!("Platform stopped");
    }

    pub async fn register_agent(
        &self,
        url: &str,
        force_refresh: bool,
    ) -> std::result::Result<AgentRecord, RegistrationError> {
        self.registry.register(url, force_refresh).await
    }

    /// Collaborator-facing registration shape
    pub async fn register_agent_response(
        &self,
        url: &str,
        force_refresh: bool,
    ) -> RegistrationResponse {
        self.registry.register_response(url, force_refresh).await
    }

    pub fn unregister_agent(&self, id: &str) -> bool {
        self.registry.unregister(id)
    }

    pub fn get_agent(&self, id: &str) -> Option<AgentRecord> {
        self.registry.get(id)
    }

    pub fn list_agents(&self) -> Vec<AgentRecord> {
        self.registry.list()
    }

    pub async fn submit_task(&self, task: Task) -> std::result::Result<String, SchedulerError> {
        self.scheduler.submit(task).await
    }

    pub fn task_status(&self, task_id: &str) -> Option<TaskStatus> {
        self.scheduler.status(task_id)
    }

    pub fn cancel_task(&self, task_id: &str) -> bool {
        self.scheduler.cancel(task_id)
    }

    fn status(&self) -> PlatformStatus {
        if self.is_running() {
            PlatformStatus::Running
        } else {
            PlatformStatus::Stopped
        }
    }

    pub fn info(&self) -> PlatformInfo {
        PlatformInfo {
            name: self.config.platform.name.clone(),
            version: self.config.platform.version.clone(),
            description: self.config.platform.description.clone(),
            status: self.status(),
            agents_count: self.registry.len(),
            active_tasks: self.scheduler.stats().active,
            features: PLATFORM_FEATURES.iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn snapshot(&self) -> PlatformSnapshot {
        let now = Utc::now();
        let started_at = *self.started_at.lock().unwrap_or_else(|e| e.into_inner());
        let uptime_secs = started_at
            .map(|t| (now - t).num_seconds().max(0) as u64)
            .unwrap_or(0);
        PlatformSnapshot {
            status: self.status(),
            registry: self.registry.stats(),
            scheduler: self.scheduler.stats(),
            started_at,
            uptime_secs,
            taken_at: now,
        }
    }
}

async fn health_loop(
    registry: Arc<AgentRegistry>,
    interval: Duration,
    retry_delay: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut tick = tokio::time::interval(interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // the first tick fires immediately; agents were just registered
    tick.tick().await;

    loop {
        tokio::select! {
            _ = tick.tick() => {
                match AssertUnwindSafe(registry.health_sweep()).catch_unwind().await {
                    Ok(evicted) => debug!(evicted, agents = registry.len(), "Health sweep finished"),
                    Err(_) => {
                        error!("Health sweep panicked, retrying in {:?}", retry_delay);
                        tokio::select! {
                            _ = tokio::time::sleep(retry_delay) => {}
                            _ = shutdown_rx.changed() => break,
                        }
                    }
                }
            }
            _ = shutdown_rx.changed() => break,
        }
        if *shutdown_rx.borrow() {
            break;
        }
    }
    debug!("Health loop exited");
}

async fn metrics_loop(
    registry: Arc<AgentRegistry>,
    scheduler: Arc<TaskScheduler>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut tick = tokio::time::interval(interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = tick.tick() => {
                let agents = registry.list();
                let by_status = status_counts(&agents);
                let stats = scheduler.stats();
                info!(
                    agents = agents.len(),
                    agent_status = ?by_status,
                    active_tasks = stats.active,
                    queued_tasks = stats.queued,
                    completed_total = stats.completed_total,
                    failed_total = stats.failed_total,
                    cancelled_total = stats.cancelled_total,
                    "Platform metrics"
                );
            }
            _ = shutdown_rx.changed() => break,
        }
        if *shutdown_rx.borrow() {
            break;
        }
    }
    debug!("Metrics loop exited");
}
