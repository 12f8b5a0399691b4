//! Orchestrator
//!
//! One tick: re-check networks missing from the registry, poll every healthy
//! network concurrently, then walk the results in configured order classifying
//! each vector and dispatching approvals, then give the gate a chance to
//! retrain and hand a report to the sink.
//!
//! Network trouble never ends the loop. A network that fails stays configured
//! and is retried on the next tick.

use ai_engine::{ClassifierGate, GateEvent};
use chrono::{DateTime, Utc};
use dispatcher::{Account, Dispatcher};
use futures_util::future::join_all;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use ultron_core::{poll, ClientFactory, Network, NetworkId, Registry, UltronError};
use uuid::Uuid;

use crate::error::AgentError;
use crate::notify::{notify_best_effort, Notifier};
use crate::report::{save_best_effort, ReportSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    Starting,
    Running,
    Degraded,
    ShuttingDown,
    Failed,
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub poll_interval: Duration,
    pub poll_timeout: Option<Duration>,
    pub check_timeout: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(300),
            poll_timeout: Some(Duration::from_secs(30)),
            check_timeout: Duration::from_secs(10),
        }
    }
}

/// Dispatcher plus the account it sends from
pub struct Execution {
    pub dispatcher: Dispatcher,
    pub account: Account,
}

/// Collaborators the orchestrator drives
pub struct Components {
    pub gate: Arc<ClassifierGate>,
    /// `None` runs observe-only: approvals are logged, never sent
    pub execution: Option<Execution>,
    pub notifier: Arc<dyn Notifier>,
    pub reports: Arc<dyn ReportSink>,
}

/// Per-network outcome of one tick
#[derive(Debug, Clone, Serialize)]
pub struct NetworkReport {
    pub network: NetworkId,
    pub polled: bool,
    pub transactions: usize,
    pub approved: usize,
    pub dispatched: usize,
    pub failed_dispatches: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tx_hashes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NetworkReport {
    fn new(network: NetworkId) -> Self {
        Self {
            network,
            polled: false,
            transactions: 0,
            approved: 0,
            dispatched: 0,
            failed_dispatches: 0,
            tx_hashes: Vec::new(),
            error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub run_id: Uuid,
    pub tick: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub state: OrchestratorState,
    pub configured_networks: usize,
    pub healthy_networks: usize,
    pub networks: Vec<NetworkReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrain: Option<GateEvent>,
    pub buffer_len: usize,
    pub model_generation: u64,
    pub cancelled: bool,
}

impl TickReport {
    pub fn approved(&self) -> usize {
        self.networks.iter().map(|n| n.approved).sum()
    }

    pub fn dispatched(&self) -> usize {
        self.networks.iter().map(|n| n.dispatched).sum()
    }
}

pub struct Orchestrator {
    run_id: Uuid,
    registry: Registry,
    gate: Arc<ClassifierGate>,
    execution: Option<Execution>,
    notifier: Arc<dyn Notifier>,
    reports: Arc<dyn ReportSink>,
    settings: OrchestratorSettings,
    state: RwLock<OrchestratorState>,
    ticks: AtomicU64,
}

impl Orchestrator {
    /// Check every network and build the orchestrator.
    ///
    /// Fails with `StartupFatal` when no network is healthy.
    pub async fn start(
        networks: Vec<Network>,
        factory: Arc<dyn ClientFactory>,
        components: Components,
        settings: OrchestratorSettings,
    ) -> Result<Self, AgentError> {
        let run_id = Uuid::new_v4();
        info!(%run_id, networks = networks.len(), "Orchestrator starting");

        let registry = match Registry::connect(networks, factory, settings.check_timeout).await {
            Ok(registry) => registry,
            Err(e) => {
                error!("❌ CRITICAL ERROR: No working RPC connections. Exiting.");
                return Err(AgentError::StartupFatal(e));
            }
        };

        let healthy = registry.healthy().await;
        let names: Vec<&str> = healthy.iter().map(|c| c.id().as_str()).collect();
        info!(
            healthy = healthy.len(),
            configured = registry.configured().len(),
            observe_only = components.execution.is_none(),
            "🚀 Ultron started successfully!"
        );
        notify_best_effort(
            components.notifier.as_ref(),
            &format!(
                "🚀 Ultron started on {}/{} networks: {}",
                healthy.len(),
                registry.configured().len(),
                names.join(", ")
            ),
        )
        .await;

        Ok(Self {
            run_id,
            registry,
            gate: components.gate,
            execution: components.execution,
            notifier: components.notifier,
            reports: components.reports,
            settings,
            state: RwLock::new(OrchestratorState::Running),
            ticks: AtomicU64::new(0),
        })
    }

    pub fn state(&self) -> OrchestratorState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn gate(&self) -> &ClassifierGate {
        &self.gate
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    fn set_state(&self, next: OrchestratorState) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if *state != next {
            info!(from = ?*state, to = ?next, "Orchestrator state change");
            *state = next;
        }
    }

    /// Run one poll, classify and dispatch cycle.
    pub async fn tick(&self, cancel: &CancellationToken) -> TickReport {
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
        let started_at = Utc::now();
        let configured = self.registry.configured().len();

        if cancel.is_cancelled() {
            self.set_state(OrchestratorState::ShuttingDown);
            return self.finish(tick, started_at, Vec::new(), None, true).await;
        }

        self.recover_missing().await;

        let connections = self.registry.healthy().await;
        debug!(tick, networks = connections.len(), "Tick started");

        let polls = join_all(
            connections
                .iter()
                .map(|connection| poll(connection, self.settings.poll_timeout)),
        )
        .await;

        let mut reports = Vec::with_capacity(connections.len());
        let mut poll_failed = false;
        let mut cancelled = false;

        'networks: for (connection, polled) in connections.iter().zip(polls) {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let mut report = NetworkReport::new(connection.id().clone());

            let vectors = match polled {
                Ok(vectors) => vectors,
                Err(e) => {
                    warn!("❌ Mempool error: {}", e);
                    poll_failed = true;
                    report.error = Some(e.to_string());
                    self.reverify(connection.id()).await;
                    reports.push(report);
                    continue;
                }
            };

            report.polled = true;
            report.transactions = vectors.len();

            for features in &vectors {
                if !self.gate.predict(features) {
                    continue;
                }
                report.approved += 1;

                if cancel.is_cancelled() {
                    cancelled = true;
                    reports.push(report);
                    break 'networks;
                }

                let Some(execution) = &self.execution else {
                    info!(
                        network = %connection.id(),
                        value = %features.value,
                        "Approved (observe-only)"
                    );
                    continue;
                };

                match execution
                    .dispatcher
                    .dispatch(connection, &execution.account, features)
                    .await
                {
                    Ok(hash) => {
                        report.dispatched += 1;
                        report.tx_hashes.push(hash.to_string());
                        notify_best_effort(
                            self.notifier.as_ref(),
                            &format!("✅ Trade executed: {}", hash),
                        )
                        .await;
                    }
                    Err(e) => {
                        report.failed_dispatches += 1;
                        warn!(stage = %e.stage, "❌ Trade failed: {}", e);
                    }
                }
            }

            info!(
                network = %report.network,
                transactions = report.transactions,
                approved = report.approved,
                dispatched = report.dispatched,
                "Network processed"
            );
            reports.push(report);
        }

        if cancelled {
            self.set_state(OrchestratorState::ShuttingDown);
            return self.finish(tick, started_at, reports, None, true).await;
        }

        let retrain = self.gate.maybe_retrain().await;
        if let Some(event @ GateEvent::ModelRetrained { .. }) = &retrain {
            notify_best_effort(self.notifier.as_ref(), &event.message()).await;
        }

        let healthy = self.registry.len().await;
        if healthy == 0 {
            warn!("⚠️ No healthy networks, retrying next tick");
        }

        if healthy < configured || poll_failed {
            self.set_state(OrchestratorState::Degraded);
        } else {
            self.set_state(OrchestratorState::Running);
        }

        self.finish(tick, started_at, reports, retrain, false).await
    }

    /// Tick until cancelled, sleeping `poll_interval` in between.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            run_id = %self.run_id,
            interval_secs = self.settings.poll_interval.as_secs(),
            "Main loop started"
        );

        while !cancel.is_cancelled() {
            let report = self.tick(&cancel).await;
            if report.cancelled {
                break;
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }

        self.set_state(OrchestratorState::ShuttingDown);
        info!("👋 Ultron shutting down");
    }

    /// Terminal state after the main loop died unexpectedly
    pub fn mark_failed(&self) {
        self.set_state(OrchestratorState::Failed);
    }

    async fn recover_missing(&self) {
        for (network, state) in self.registry.refresh_missing().await {
            if state.is_healthy() {
                info!(%network, "✅ {} back in the registry", network);
            } else {
                debug!(%network, "Still unreachable, retrying next tick");
            }
        }
    }

    async fn reverify(&self, id: &NetworkId) {
        match self.registry.reverify(id).await {
            Ok(state) if state.is_healthy() => {
                debug!(network = %id, "Network still healthy after poll failure")
            }
            Ok(_) => warn!(network = %id, "⚠️ {} dropped from registry until it answers again", id),
            Err(UltronError::NotFound(_)) => {}
            Err(e) => warn!(network = %id, error = %e, "Re-verification failed"),
        }
    }

    async fn finish(
        &self,
        tick: u64,
        started_at: DateTime<Utc>,
        networks: Vec<NetworkReport>,
        retrain: Option<GateEvent>,
        cancelled: bool,
    ) -> TickReport {
        let report = TickReport {
            run_id: self.run_id,
            tick,
            started_at,
            finished_at: Utc::now(),
            state: self.state(),
            configured_networks: self.registry.configured().len(),
            healthy_networks: self.registry.len().await,
            networks,
            retrain,
            buffer_len: self.gate.buffer_len(),
            model_generation: self.gate.generation(),
            cancelled,
        };

        save_best_effort(self.reports.as_ref(), &report).await;
        report
    }
}
