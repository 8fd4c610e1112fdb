//! # Registry Sync — Membership Reconciliation with Score Migration
//!
//! Reconciles local bookkeeping (score vector + stored snapshot) with
//! the authoritative membership list.
//!
//! ## Reconcile Steps
//!
//! 1. Compare incoming identities against the stored snapshot, position
//!    by position up to the old length. Identical ids and same length →
//!    `false`, nothing touched (the common case, cheap).
//! 2. Slot whose identity changed → zero that slot's score (replacement
//!    invalidates accumulated trust).
//! 3. Larger registry → grow the score vector, existing values keep
//!    their indices, new slots default to 0.
//! 4. Replace the stored snapshot.
//!
//! Shrinkage is not a supported transition within one run and is
//! surfaced as [`RegistryError::Shrunk`]; the tick logs it and leaves
//! state untouched. An empty incoming snapshot with an empty stored
//! snapshot is a valid no-op.

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use dsn_common::registry::{RegistrySnapshot, RegistrySource, RegistrySourceError};

use crate::scores::ScoreStore;
use crate::state::RunState;

// ════════════════════════════════════════════════════════════════════════════
// ERRORS
// ════════════════════════════════════════════════════════════════════════════

/// Errors from snapshot reconciliation itself.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The incoming snapshot is smaller than the stored one.
    #[error("registry shrank from {previous} to {current} slots; unsupported within one run")]
    Shrunk { previous: usize, current: usize },
}

/// Errors from a full resync (fetch + reconcile).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    /// The external registry source failed; local state is untouched.
    #[error(transparent)]
    Source(#[from] RegistrySourceError),

    /// The fetched snapshot could not be reconciled.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

// ════════════════════════════════════════════════════════════════════════════
// RECONCILE (PURE)
// ════════════════════════════════════════════════════════════════════════════

/// Reconcile one incoming snapshot into the local score vector and
/// stored snapshot. Returns whether anything changed.
///
/// On error nothing is mutated.
pub fn apply_snapshot(
    scores: &mut ScoreStore,
    stored: &mut RegistrySnapshot,
    incoming: RegistrySnapshot,
) -> Result<bool, RegistryError> {
    if incoming.len() < stored.len() {
        return Err(RegistryError::Shrunk {
            previous: stored.len(),
            current: incoming.len(),
        });
    }

    let same_ids = stored
        .ids()
        .zip(incoming.ids())
        .all(|(old, new)| old == new);
    if same_ids && incoming.len() == stored.len() {
        return Ok(false);
    }

    // Zero out every slot whose occupant was replaced.
    let mut replaced = 0usize;
    for (slot, old_id) in stored.ids().enumerate() {
        match incoming.id_at(slot) {
            Some(new_id) if new_id != old_id => {
                scores.reset_slot(slot);
                replaced += 1;
            }
            _ => {}
        }
    }
    if replaced > 0 {
        info!(replaced, "registry slots replaced; trust reset");
    }

    if incoming.len() > stored.len() {
        debug!(
            from = stored.len(),
            to = incoming.len(),
            "registry grew; extending score vector"
        );
        scores.grow_to(incoming.len());
    }

    *stored = incoming;
    Ok(true)
}

// ════════════════════════════════════════════════════════════════════════════
// SYNC COMPONENT
// ════════════════════════════════════════════════════════════════════════════

/// Fetches the current registry and reconciles it into the run state.
///
/// The fetch happens outside the state mutex; only the reconcile itself
/// holds the lock.
pub struct RegistrySync {
    source: Arc<dyn RegistrySource>,
}

impl RegistrySync {
    pub fn new(source: Arc<dyn RegistrySource>) -> Self {
        RegistrySync { source }
    }

    /// Fetch + reconcile. Returns whether anything changed.
    pub async fn resync(&self, state: &Mutex<RunState>) -> Result<bool, SyncError> {
        let incoming = self.source.current_registry().await?;

        let mut guard = state.lock();
        let st = &mut *guard;
        let changed = apply_snapshot(&mut st.scores, &mut st.registry, incoming)?;
        if changed {
            info!(slots = st.registry.len(), "registry snapshot updated");
        }
        Ok(changed)
    }

    /// Resync variant for call sites that tolerate a failing source:
    /// a source error is logged and reported as "nothing changed",
    /// reconcile errors still propagate.
    pub async fn resync_lenient(&self, state: &Mutex<RunState>) -> Result<bool, RegistryError> {
        match self.resync(state).await {
            Ok(changed) => Ok(changed),
            Err(SyncError::Source(e)) => {
                warn!(error = %e, "registry fetch failed; proceeding with last known snapshot");
                Ok(false)
            }
            Err(SyncError::Registry(e)) => Err(e),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// TESTS
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use dsn_common::id::ParticipantId;
    use dsn_common::mock::MockRegistrySource;

    fn ids(names: &[&str]) -> RegistrySnapshot {
        RegistrySnapshot::from_ids(names.iter().map(|n| ParticipantId::new(*n)))
    }

    fn store(scores: Vec<f64>) -> ScoreStore {
        ScoreStore::with_scores(0.2, scores).expect("store")
    }

    // ── Test 1: identical snapshot is a cheap no-op ─────────────────────

    #[test]
    fn identical_snapshot_noop() {
        let mut scores = store(vec![0.1, 0.2]);
        let mut stored = ids(&["a", "b"]);
        let before = scores.to_vec();

        let changed = apply_snapshot(&mut scores, &mut stored, ids(&["a", "b"])).expect("apply");
        assert!(!changed);
        assert_eq!(scores.as_slice(), before.as_slice());
    }

    // ── Test 2: no-op resync twice, vector bit-identical ────────────────

    #[test]
    fn second_resync_returns_false() {
        let mut scores = store(vec![]);
        let mut stored = RegistrySnapshot::default();

        let first = apply_snapshot(&mut scores, &mut stored, ids(&["a", "b"])).expect("apply");
        assert!(first);
        let bits_before: Vec<u64> = scores.as_slice().iter().map(|s| s.to_bits()).collect();

        let second = apply_snapshot(&mut scores, &mut stored, ids(&["a", "b"])).expect("apply");
        assert!(!second);
        let bits_after: Vec<u64> = scores.as_slice().iter().map(|s| s.to_bits()).collect();
        assert_eq!(bits_before, bits_after);
    }

    // ── Test 3: growth preserves existing slots ─────────────────────────

    #[test]
    fn growth_preserves_scores() {
        let mut scores = store(vec![0.1, 0.2, 0.3]);
        let mut stored = ids(&["a", "b", "c"]);

        let changed =
            apply_snapshot(&mut scores, &mut stored, ids(&["a", "b", "c", "d", "e"]))
                .expect("apply");
        assert!(changed);
        assert_eq!(scores.as_slice(), &[0.1, 0.2, 0.3, 0.0, 0.0]);
        assert_eq!(stored.len(), 5);
    }

    // ── Test 4: replacement resets trust ────────────────────────────────

    #[test]
    fn replacement_zeroes_slot() {
        let mut scores = store(vec![0.9, 0.8, 0.7]);
        let mut stored = ids(&["a", "b", "c"]);

        let changed = apply_snapshot(&mut scores, &mut stored, ids(&["a", "d", "c"]))
            .expect("apply");
        assert!(changed);
        assert_eq!(scores.as_slice(), &[0.9, 0.0, 0.7]);
        assert_eq!(stored.id_at(1), Some(&ParticipantId::new("d")));
    }

    // ── Test 5: replacement + growth in one snapshot ────────────────────

    #[test]
    fn replacement_and_growth_combined() {
        let mut scores = store(vec![0.5, 0.6]);
        let mut stored = ids(&["a", "b"]);

        let changed = apply_snapshot(&mut scores, &mut stored, ids(&["x", "b", "c"]))
            .expect("apply");
        assert!(changed);
        assert_eq!(scores.as_slice(), &[0.0, 0.6, 0.0]);
    }

    // ── Test 6: shrinkage is surfaced, state untouched ──────────────────

    #[test]
    fn shrinkage_rejected() {
        let mut scores = store(vec![0.5, 0.6]);
        let mut stored = ids(&["a", "b"]);
        let before = scores.to_vec();

        let result = apply_snapshot(&mut scores, &mut stored, ids(&["a"]));
        assert_eq!(
            result,
            Err(RegistryError::Shrunk {
                previous: 2,
                current: 1
            })
        );
        assert_eq!(scores.as_slice(), before.as_slice());
        assert_eq!(stored.len(), 2);
    }

    // ── Test 7: empty incoming over empty stored is a no-op ─────────────

    #[test]
    fn empty_over_empty_noop() {
        let mut scores = store(vec![]);
        let mut stored = RegistrySnapshot::default();
        let changed =
            apply_snapshot(&mut scores, &mut stored, RegistrySnapshot::default()).expect("apply");
        assert!(!changed);
    }

    // ── Test 8: lenient resync tolerates a failing source ───────────────

    #[tokio::test]
    async fn lenient_resync_survives_source_failure() {
        let source = Arc::new(MockRegistrySource::new(ids(&["a"])));
        source.fail_next(RegistrySourceError::Timeout);

        let sync = RegistrySync::new(source.clone());
        let state = Mutex::new(RunState::new(ScoreStore::new(0.2).expect("store")));

        let changed = sync.resync_lenient(&state).await.expect("lenient");
        assert!(!changed);
        assert!(state.lock().registry.is_empty());

        // next call succeeds and reconciles
        let changed = sync.resync_lenient(&state).await.expect("lenient");
        assert!(changed);
        assert_eq!(state.lock().registry.len(), 1);
        assert_eq!(state.lock().scores.len(), 1);
    }
}
