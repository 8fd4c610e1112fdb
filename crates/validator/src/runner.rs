//! # Validator Loop — Block-Driven Scheduling State Machine
//!
//! Drives the tick cadence from the external block height and sequences
//! the core components, owning lifecycle (start/stop/background task).
//!
//! ## Tick State Machine
//!
//! ```text
//! Idle ──(block delta > query_rate)──▶ Syncing ──▶ Probing ──▶ Reconciling ──▶ Idle
//!   │                                                                          │
//!   └──────────────────────── stop requested ──────────▶ Exiting ◀─────────────┘
//! ```
//!
//! - **Idle**: actively poll `current_block()` every `check_interval_ms`
//!   (a distinct knob from `query_rate`); a tick fires once the chain
//!   advanced more than `query_rate` blocks past the last tick.
//! - **Syncing**: registry resync before every probe cycle so probes
//!   never run against stale slot counts.
//! - **Probing**: K concurrent sub-cycles, joined before proceeding.
//! - **Reconciling**: record the tick's block, resync again to catch
//!   registry changes that landed during probing, reconcile weights,
//!   emit telemetry; the loop then advances the step counter and
//!   checkpoints the run state.
//!
//! ## Failure Semantics
//!
//! Any error escaping one tick is caught at the loop boundary, logged
//! with context, and the loop continues — a single bad tick never takes
//! the process down. The stop signal is the one exception: it exits the
//! loop immediately at the next tick boundary, with no ledger calls and
//! no half-done reconciliation.
//!
//! ## Lifecycle
//!
//! `start()` spawns the loop on a background tokio task and returns the
//! `JoinHandle`; `stop()` is cooperative, observed at tick boundaries —
//! an in-flight probe fan-out is never preempted.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use dsn_common::blob::BlobStore;
use dsn_common::config::{Config, ConfigError};
use dsn_common::ledger::{BlockHeightSource, LedgerAdapter};
use dsn_common::probe::ProbeClient;
use dsn_common::registry::RegistrySource;
use dsn_common::telemetry::{TelemetrySink, TickTelemetry};

use crate::dispatch::{CycleOutcome, ProbeDispatcher};
use crate::metrics::ValidatorMetrics;
use crate::persistence::{PersistedState, StateError, StateStore};
use crate::registry_sync::{RegistryError, RegistrySync};
use crate::state::RunState;
use crate::weights::{CommitStatus, WeightError, WeightReconciler};

// ════════════════════════════════════════════════════════════════════════════
// PHASE
// ════════════════════════════════════════════════════════════════════════════

/// Where the loop currently is in its tick state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TickPhase {
    Idle = 0,
    Syncing = 1,
    Probing = 2,
    Reconciling = 3,
    Exiting = 4,
}

impl TickPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TickPhase::Idle => "idle",
            TickPhase::Syncing => "syncing",
            TickPhase::Probing => "probing",
            TickPhase::Reconciling => "reconciling",
            TickPhase::Exiting => "exiting",
        }
    }

    fn from_u8(value: u8) -> TickPhase {
        match value {
            1 => TickPhase::Syncing,
            2 => TickPhase::Probing,
            3 => TickPhase::Reconciling,
            4 => TickPhase::Exiting,
            _ => TickPhase::Idle,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// ERROR
// ════════════════════════════════════════════════════════════════════════════

/// Errors that escape one tick and are caught at the loop boundary.
///
/// Collaborator failures (probe sub-cycles, weight commits, telemetry,
/// checkpoints) are isolated inside the tick and never appear here.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TickError {
    /// The registry did something this run cannot reconcile (shrinkage).
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

// ════════════════════════════════════════════════════════════════════════════
// COLLABORATORS
// ════════════════════════════════════════════════════════════════════════════

/// The external boundary, bundled for construction.
pub struct Collaborators {
    pub blocks: Arc<dyn BlockHeightSource>,
    pub registry: Arc<dyn RegistrySource>,
    pub probes: Arc<dyn ProbeClient>,
    pub ledger: Arc<dyn LedgerAdapter>,
    pub blob_store: Arc<dyn BlobStore>,
    pub telemetry: Arc<dyn TelemetrySink>,
}

// ════════════════════════════════════════════════════════════════════════════
// STATUS
// ════════════════════════════════════════════════════════════════════════════

/// Point-in-time view for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub running: bool,
    pub phase: &'static str,
    pub step: u64,
    pub last_queried_block: u64,
    pub registry_size: usize,
    pub scores: Vec<f64>,
}

// ════════════════════════════════════════════════════════════════════════════
// VALIDATOR
// ════════════════════════════════════════════════════════════════════════════

/// The validator control loop and its lifecycle controller.
pub struct Validator {
    config: Config,
    state: Arc<Mutex<RunState>>,
    dispatcher: ProbeDispatcher,
    registry_sync: RegistrySync,
    reconciler: WeightReconciler,
    checkpoint: StateStore,
    blocks: Arc<dyn BlockHeightSource>,
    telemetry: Arc<dyn TelemetrySink>,
    metrics: Arc<ValidatorMetrics>,
    shutdown: Arc<Notify>,
    running: AtomicBool,
    phase: AtomicU8,
}

impl Validator {
    /// Build a validator around an initial run state (fresh or
    /// recovered from a checkpoint). Rejects invalid configuration.
    pub fn new(
        config: Config,
        collaborators: Collaborators,
        state: RunState,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let dispatcher = ProbeDispatcher::new(
            Arc::clone(&collaborators.probes),
            config.num_concurrent_probes,
        );
        let registry_sync = RegistrySync::new(Arc::clone(&collaborators.registry));
        let reconciler = WeightReconciler::new(Arc::clone(&collaborators.ledger));
        let checkpoint = StateStore::new(
            Arc::clone(&collaborators.blob_store),
            config.state_key.clone(),
        );

        Ok(Validator {
            config,
            state: Arc::new(Mutex::new(state)),
            dispatcher,
            registry_sync,
            reconciler,
            checkpoint,
            blocks: collaborators.blocks,
            telemetry: collaborators.telemetry,
            metrics: Arc::new(ValidatorMetrics::new()),
            shutdown: Arc::new(Notify::new()),
            running: AtomicBool::new(false),
            phase: AtomicU8::new(TickPhase::Idle as u8),
        })
    }

    pub fn metrics(&self) -> &Arc<ValidatorMetrics> {
        &self.metrics
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn phase(&self) -> TickPhase {
        TickPhase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    pub fn status(&self) -> StatusSnapshot {
        let st = self.state.lock();
        StatusSnapshot {
            running: self.is_running(),
            phase: self.phase().as_str(),
            step: st.step,
            last_queried_block: st.last_queried_block,
            registry_size: st.registry.len(),
            scores: st.scores.to_vec(),
        }
    }

    /// Spawn the loop on a background task.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.running.store(true, Ordering::SeqCst);
            this.run().await;
            this.running.store(false, Ordering::SeqCst);
        })
    }

    /// Request a cooperative stop. Observed at the next tick boundary;
    /// an in-flight probe fan-out finishes first.
    pub fn stop(&self) {
        self.shutdown.notify_one();
    }

    /// Persist the current run state now.
    pub async fn save_state(&self) -> Result<(), StateError> {
        let snapshot = PersistedState::from_run_state(&self.state.lock());
        self.checkpoint.save(&snapshot).await
    }

    // ────────────────────────────────────────────────────────────────
    // LOOP
    // ────────────────────────────────────────────────────────────────

    async fn run(&self) {
        info!(
            query_rate = self.config.query_rate,
            check_interval_ms = self.config.check_interval_ms,
            concurrency = self.dispatcher.concurrency(),
            "validator loop started"
        );

        // Startup sync so the first tick never probes an empty registry.
        if let Err(e) = self.registry_sync.resync_lenient(&self.state).await {
            warn!(error = %e, "startup registry sync failed");
        }

        let check_interval = Duration::from_millis(self.config.check_interval_ms);
        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    self.set_phase(TickPhase::Exiting);
                    info!("stop requested; exiting validator loop");
                    break;
                }
                _ = sleep(check_interval) => {}
            }

            let current_block = match self.blocks.current_block().await {
                Ok(block) => block,
                Err(e) => {
                    warn!(error = %e, "block height poll failed");
                    continue;
                }
            };
            self.metrics.set_last_block(current_block);

            let due = {
                let st = self.state.lock();
                current_block.saturating_sub(st.last_queried_block) > self.config.query_rate
            };
            if !due {
                continue;
            }

            let started = Instant::now();
            match self.tick(current_block).await {
                Ok(()) => {
                    self.metrics.record_tick_completed();
                    self.metrics
                        .record_tick_duration_ms(started.elapsed().as_millis() as u64);
                }
                Err(e) => {
                    self.metrics.record_tick_failure();
                    error!(error = %e, block = current_block, "tick failed; continuing");
                }
            }

            self.state.lock().step += 1;
            if let Err(e) = self.save_state().await {
                warn!(error = %e, "state checkpoint failed");
            }
            self.set_phase(TickPhase::Idle);
        }
    }

    /// One full tick: sync → probe → reconcile → telemetry.
    async fn tick(&self, current_block: u64) -> Result<(), TickError> {
        {
            let st = self.state.lock();
            info!(step = st.step, block = current_block, "tick started");
        }

        // ── Syncing: never probe with stale slot counts ────────────────
        self.set_phase(TickPhase::Syncing);
        self.registry_sync.resync_lenient(&self.state).await?;

        // ── Probing: K concurrent sub-cycles, joined ───────────────────
        self.set_phase(TickPhase::Probing);
        let cycle = self.dispatcher.run_cycle(&self.state).await;
        self.metrics.record_probe_cycle(
            cycle.completed as u64,
            cycle.failed as u64,
            cycle.substituted,
        );

        // ── Reconciling ────────────────────────────────────────────────
        self.set_phase(TickPhase::Reconciling);
        self.state.lock().last_queried_block = current_block;

        // Catch registry changes that landed while probing.
        self.registry_sync.resync_lenient(&self.state).await?;

        let scores = self.state.lock().scores.to_vec();
        match self.reconciler.reconcile(&scores).await {
            Ok(CommitStatus::Submitted) => self.metrics.record_weights_submitted(),
            Ok(CommitStatus::Rejected(_)) => self.metrics.record_weight_rejection(),
            Ok(CommitStatus::SkippedAllZero) => {}
            Err(WeightError::Ledger(e)) => {
                self.metrics.record_commit_failure();
                warn!(error = %e, "weight commit failed; retrying next tick");
            }
        }

        self.emit_telemetry(current_block, &cycle);

        Ok(())
    }

    /// Best-effort telemetry emit with sink rollover bookkeeping.
    fn emit_telemetry(&self, block: u64, cycle: &CycleOutcome) {
        let (record, rollover_due) = {
            let mut st = self.state.lock();
            st.telemetry_log_count += 1;
            let due = st.telemetry_log_count >= self.config.telemetry_log_limit;
            if due {
                st.telemetry_log_count = 0;
            }
            (
                TickTelemetry {
                    step: st.step,
                    block,
                    scores: st.scores.to_vec(),
                    probe_failures: cycle.failed as u64,
                    nan_substitutions: cycle.substituted,
                },
                due,
            )
        };

        if let Err(e) = self.telemetry.log(&record) {
            warn!(error = %e, "telemetry log failed");
        }
        if rollover_due {
            debug!("telemetry log limit reached; rolling sink over");
            if let Err(e) = self.telemetry.rollover() {
                warn!(error = %e, "telemetry rollover failed");
            }
        }
    }

    fn set_phase(&self, phase: TickPhase) {
        self.phase.store(phase as u8, Ordering::SeqCst);
    }
}

// ════════════════════════════════════════════════════════════════════════════
// TESTS
// ════════════════════════════════════════════════════════════════════════════
