//! Agent Registry
//!
//! Owns the authoritative set of known agents. Records are keyed by a
//! deterministic id derived from the normalized URL and every mutation is a
//! single-entry update on the underlying `DashMap`, so `list()` always
//! hands out an independent snapshot.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::record::{agent_id, AgentRecord, AgentStatus, RegistrationResponse, RegistryStats};
use crate::config::RegistryConfig;
use crate::error::RegistrationError;
use crate::protocol::{normalize_url, validate_card, AgentTransport};

/// Outcome of a single health probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbeOutcome {
    Healthy,
    Unhealthy,
    Errored,
}

pub struct AgentRegistry {
    transport: Arc<dyn AgentTransport>,
    agents: DashMap<String, AgentRecord>,
    /// Insertion sequence counter
    next_seq: AtomicU64,
    staleness_window: Duration,
    probe_timeout: Duration,
    running: AtomicBool,
}

impl AgentRegistry {
    pub fn new(transport: Arc<dyn AgentTransport>, config: &RegistryConfig) -> Self {
        Self {
            transport,
            agents: DashMap::new(),
            next_seq: AtomicU64::new(0),
            staleness_window: config.staleness_window(),
            probe_timeout: Duration::from_millis(config.agent_timeout_ms.max(1)),
            running: AtomicBool::new(false),
        }
    }

    pub fn start(&self) {
        if !self.running.swap(true, Ordering::SeqCst) {
            info!("Agent registry started");
        }
    }

    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!(agents = self.agents.len(), "Agent registry stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Register the agent at `url`.
    ///
    /// A known URL without `force_refresh` only bumps `last_seen` and never
    /// contacts the agent.
    pub async fn register(
        &self,
        url: &str,
        force_refresh: bool,
    ) -> Result<AgentRecord, RegistrationError> {
        let url = normalize_url(url);
        let id = agent_id(&url);

        if !force_refresh {
            if let Some(mut existing) = self.agents.get_mut(&id) {
                existing.touch(Utc::now());
                debug!(agent_id = %id, url = %url, "Agent already registered");
                return Ok(existing.clone());
            }
        }

        let card = self
            .transport
            .fetch_card(&url)
            .await
            .map_err(|e| {
                if e.is_network() {
                    warn!(url = %url, "Registration failed, agent unreachable: {}", e);
                } else {
                    error!(url = %url, "Registration failed: {}", e);
                }
                RegistrationError::from_protocol(&url, e)
            })?;

        validate_card(&card).map_err(|reason| {
            warn!(url = %url, "Registration failed, invalid card: {}", reason);
            RegistrationError::CardInvalid {
                url: url.clone(),
                reason,
            }
        })?;

        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let fresh = AgentRecord::from_card(&url, card, seq);

        let record = self
            .agents
            .entry(id.clone())
            .and_modify(|existing| {
                // keep identity and position, refresh everything the card describes
                let (seq, registered_at, last_seen) =
                    (existing.seq, existing.registered_at, existing.last_seen);
                *existing = fresh.clone();
                existing.seq = seq;
                existing.registered_at = registered_at;
                existing.last_seen = last_seen;
                existing.touch(fresh.last_seen);
            })
            .or_insert_with(|| fresh.clone())
            .clone();

        info!(
            agent_id = %record.id,
            url = %record.url,
            name = %record.name,
            capabilities = record.capabilities.len(),
            "Agent registered"
        );
        Ok(record)
    }

    /// `register` folded into the collaborator-facing response shape
    pub async fn register_response(&self, url: &str, force_refresh: bool) -> RegistrationResponse {
        match self.register(url, force_refresh).await {
            Ok(record) => RegistrationResponse {
                success: true,
                agent_id: record.id.clone(),
                message: format!("Agent '{}' registered", record.name),
                card: Some(record.card),
            },
            Err(e) => RegistrationResponse {
                success: false,
                agent_id: agent_id(url),
                message: e.to_string(),
                card: None,
            },
        }
    }

    /// Remove a record; `false` when it was not present
    pub fn unregister(&self, id: &str) -> bool {
        match self.agents.remove(id) {
            Some((_, record)) => {
                info!(agent_id = %id, url = %record.url, "Agent unregistered");
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<AgentRecord> {
        self.agents.get(id).map(|r| r.clone())
    }

    pub fn get_by_url(&self, url: &str) -> Option<AgentRecord> {
        self.get(&agent_id(url))
    }

    /// Snapshot of all records in insertion order
    pub fn list(&self) -> Vec<AgentRecord> {
        let mut records: Vec<AgentRecord> = self.agents.iter().map(|r| r.value().clone()).collect();
        records.sort_by_key(|r| r.seq);
        records
    }

    pub fn find_by_capability(&self, name: &str) -> Vec<AgentRecord> {
        self.list()
            .into_iter()
            .filter(|r| r.has_capability(name))
            .collect()
    }

    /// Flag an agent unhealthy after a failed dispatch
    pub fn mark_unhealthy(&self, id: &str) -> bool {
        match self.agents.get_mut(id) {
            Some(mut record) => {
                if record.status != AgentStatus::Unhealthy {
                    warn!(agent_id = %id, url = %record.url, "Marking agent unhealthy");
                }
                record.status = AgentStatus::Unhealthy;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats::default();
        for record in self.agents.iter() {
            stats.total += 1;
            match record.status {
                AgentStatus::Active => stats.active += 1,
                AgentStatus::Unhealthy => stats.unhealthy += 1,
                AgentStatus::Error => {}
            }
            for cap in &record.capabilities {
                *stats
                    .per_capability_counts
                    .entry(cap.name.to_lowercase())
                    .or_insert(0) += 1;
            }
        }
        stats
    }

    /// Ping every agent concurrently, update statuses, then evict stale records.
    ///
    /// Returns the number of evicted records.
    pub async fn health_sweep(&self) -> usize {
        let targets: Vec<(String, String)> =
            self.list().into_iter().map(|r| (r.id, r.url)).collect();
        if targets.is_empty() {
            return 0;
        }

        let probes = targets.into_iter().map(|(id, url)| {
            let transport = Arc::clone(&self.transport);
            let timeout = self.probe_timeout;
            let probe_url = url.clone();
            let handle = tokio::spawn(async move {
                tokio::time::timeout(timeout, transport.check_health(&probe_url)).await
            });
            async move {
                let outcome = match handle.await {
                    Ok(Ok(Ok(true))) => ProbeOutcome::Healthy,
                    Ok(Ok(Ok(false))) => {
                        debug!(agent_id = %id, url = %url, "Health check failed");
                        ProbeOutcome::Unhealthy
                    }
                    Ok(Err(_elapsed)) => {
                        debug!(agent_id = %id, url = %url, "Health check timed out");
                        ProbeOutcome::Unhealthy
                    }
                    Ok(Ok(Err(e))) => {
                        error!(agent_id = %id, url = %url, "Health check error: {}", e);
                        ProbeOutcome::Errored
                    }
                    Err(e) => {
                        error!(agent_id = %id, url = %url, "Health check task aborted: {}", e);
                        ProbeOutcome::Errored
                    }
                };
                (id, outcome)
            }
        });

        let results = join_all(probes).await;
        let now = Utc::now();
        for (id, outcome) in results {
            // the record may have been removed while the probe was in flight
            if let Some(mut record) = self.agents.get_mut(&id) {
                match outcome {
                    ProbeOutcome::Healthy => {
                        record.status = AgentStatus::Active;
                        record.touch(now);
                    }
                    ProbeOutcome::Unhealthy => record.status = AgentStatus::Unhealthy,
                    ProbeOutcome::Errored => record.status = AgentStatus::Error,
                }
            }
        }

        self.evict_stale()
    }

    /// Drop records whose `last_seen` is older than the staleness window
    pub fn evict_stale(&self) -> usize {
        let cutoff = chrono::Duration::from_std(self.staleness_window)
            .ok()
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.evict_older_than(cutoff)
    }

    pub(crate) fn evict_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let stale: Vec<String> = self
            .agents
            .iter()
            .filter(|r| r.last_seen < cutoff)
            .map(|r| r.id.clone())
            .collect();

        let mut evicted = 0;
        for id in stale {
            // re-check under the entry lock so a concurrent refresh wins
            if let Some((_, record)) = self.agents.remove_if(&id, |_, r| r.last_seen < cutoff) {
                info!(agent_id = %id, url = %record.url, "Evicted stale agent");
                evicted += 1;
            }
        }
        evicted
    }
}

/// Count of records per status, for metrics logging
pub(crate) fn status_counts(records: &[AgentRecord]) -> HashMap<AgentStatus, usize> {
    let mut counts = HashMap::new();
    for record in records {
        *counts.entry(record.status).or_insert(0) += 1;
    }
    counts
}
