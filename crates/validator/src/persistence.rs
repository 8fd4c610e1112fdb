//! # State Persistence — Checkpoint Save/Load
//!
//! Serializes the minimal recoverable run state to the opaque blob
//! store and reloads it at startup.
//!
//! ## Persisted Layout
//!
//! ```text
//! { step, scores: [f64; N], registry_ids: [string; N], last_queried_block }
//! ```
//!
//! JSON-encoded. Endpoint metadata is not persisted — the first resync
//! after recovery repopulates it from the registry source.
//!
//! ## Failure Semantics
//!
//! `load` distinguishes a missing blob ([`StateError::NotFound`]) from
//! an unreadable one ([`StateError::Corrupt`]); the caller decides
//! whether a missing checkpoint means "start fresh" and a corrupt one
//! means "abort" — no silent defaulting here. Save failures during a
//! run are surfaced to the caller, who logs and carries on.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use dsn_common::blob::{BlobError, BlobStore};
use dsn_common::id::ParticipantId;
use dsn_common::registry::RegistrySnapshot;

use crate::scores::{ScoreError, ScoreStore};
use crate::state::RunState;

// ════════════════════════════════════════════════════════════════════════════
// ERROR
// ════════════════════════════════════════════════════════════════════════════

/// Errors from checkpoint save/load.
#[derive(Debug, Error)]
pub enum StateError {
    /// No checkpoint stored under the configured key.
    #[error("no persisted state found")]
    NotFound,

    /// Checkpoint bytes exist but cannot be decoded.
    #[error("persisted state is corrupt: {0}")]
    Corrupt(String),

    /// Blob store backend failure.
    #[error("state store backend error: {0}")]
    Backend(BlobError),

    /// Recovered fields are internally inconsistent.
    #[error("persisted state invalid: {0}")]
    Invalid(#[from] ScoreError),
}

// ════════════════════════════════════════════════════════════════════════════
// PERSISTED FORM
// ════════════════════════════════════════════════════════════════════════════

/// The wire form of a checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedState {
    pub step: u64,
    pub scores: Vec<f64>,
    pub registry_ids: Vec<ParticipantId>,
    pub last_queried_block: u64,
}

impl PersistedState {
    pub fn from_run_state(state: &RunState) -> Self {
        PersistedState {
            step: state.step,
            scores: state.scores.to_vec(),
            registry_ids: state.registry.ids().cloned().collect(),
            last_queried_block: state.last_queried_block,
        }
    }

    /// Rebuild a run state with the given smoothing factor.
    pub fn into_run_state(self, alpha: f64) -> Result<RunState, ScoreError> {
        let scores = ScoreStore::with_scores(alpha, self.scores)?;
        Ok(RunState {
            step: self.step,
            last_queried_block: self.last_queried_block,
            scores,
            registry: RegistrySnapshot::from_ids(self.registry_ids),
            telemetry_log_count: 0,
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════
// STATE STORE
// ════════════════════════════════════════════════════════════════════════════

/// Checkpoint reader/writer bound to one blob key.
pub struct StateStore {
    store: Arc<dyn BlobStore>,
    key: String,
}

impl StateStore {
    pub fn new(store: Arc<dyn BlobStore>, key: impl Into<String>) -> Self {
        StateStore {
            store,
            key: key.into(),
        }
    }

    /// Persist one checkpoint, overwriting any previous one.
    pub async fn save(&self, snapshot: &PersistedState) -> Result<(), StateError> {
        let bytes = serde_json::to_vec(snapshot)
            .map_err(|e| StateError::Corrupt(e.to_string()))?;
        self.store
            .put(&self.key, &bytes)
            .await
            .map_err(StateError::Backend)?;
        debug!(key = %self.key, step = snapshot.step, "state checkpoint saved");
        Ok(())
    }

    /// Load the checkpoint stored under the configured key.
    pub async fn load(&self) -> Result<PersistedState, StateError> {
        let bytes = match self.store.get(&self.key).await {
            Ok(bytes) => bytes,
            Err(BlobError::NotFound(_)) => return Err(StateError::NotFound),
            Err(e) => return Err(StateError::Backend(e)),
        };
        let snapshot: PersistedState = serde_json::from_slice(&bytes)
            .map_err(|e| StateError::Corrupt(e.to_string()))?;
        info!(
            key = %self.key,
            step = snapshot.step,
            slots = snapshot.scores.len(),
            "state checkpoint loaded"
        );
        Ok(snapshot)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// TESTS
// ════════════════════════════════════════════════════════════════════════════
