//! # DSN Validator Core
//!
//! Control loop of one validator in a decentralized scoring network:
//! probe participants, fold their rewards into smoothed per-slot trust
//! scores, keep local bookkeeping in step with the membership registry,
//! and periodically commit a normalized weight vector to the ledger.
//!
//! ## Modules
//! - `scores`: per-slot EMA trust vector
//! - `registry_sync`: membership reconciliation with score migration
//! - `dispatch`: concurrent probe fan-out
//! - `weights`: normalization + ledger submission
//! - `runner`: block-driven scheduling loop and lifecycle
//! - `persistence`: checkpoint save/load
//! - `state`: the mutable run state struct
//! - `metrics`: lock-free loop counters
//!
//! ## One Tick
//! ```text
//! block delta > query_rate
//!      │
//!      ▼ resync registry (cheap when unchanged)
//!      ▼ K concurrent probe-and-score sub-cycles → ScoreStore::update
//!      ▼ resync again, reconcile weights, commit to ledger
//!      ▼ telemetry + checkpoint
//! ```
//!
//! External collaborators (registry, probes, ledger, blob store,
//! telemetry) are trait-abstracted in `dsn_common`; this crate holds
//! only the loop and its invariants.

pub mod dispatch;
pub mod metrics;
pub mod persistence;
pub mod registry_sync;
pub mod runner;
pub mod scores;
pub mod state;
pub mod weights;

pub use dispatch::{CycleOutcome, ProbeDispatcher};
pub use metrics::{MetricsSnapshot, ValidatorMetrics};
pub use persistence::{PersistedState, StateError, StateStore};
pub use registry_sync::{apply_snapshot, RegistryError, RegistrySync, SyncError};
pub use runner::{Collaborators, StatusSnapshot, TickPhase, Validator};
pub use scores::{ScoreError, ScoreStore, ScoreUpdate};
pub use state::RunState;
pub use weights::{normalize, CommitStatus, WeightError, WeightReconciler};
