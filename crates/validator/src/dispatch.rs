//! # Probe Dispatcher — Concurrent Probe Fan-Out
//!
//! Runs K independent probe-and-score sub-cycles per tick and merges
//! each returned reward batch into the score store.
//!
//! ## Isolation Contract
//!
//! All K sub-cycles start logically together; `run_cycle` returns only
//! once every one of them has completed or failed. A single sub-cycle
//! failure — probe transport error or a rejected batch — is logged and
//! isolated; the other K−1 batches still land. No sub-cycle outlives
//! its tick.
//!
//! ## Locking
//!
//! The probe call itself runs without the state lock; only the batch
//! merge takes it, one critical section per batch. Concurrent
//! sub-cycles therefore serialize on merge order, which is intentional:
//! the EMA recomputation reads the full vector.

use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use tracing::{debug, warn};

use dsn_common::probe::ProbeClient;

use crate::state::RunState;

/// Aggregate outcome of one probe fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleOutcome {
    /// Sub-cycles whose batch merged successfully.
    pub completed: usize,
    /// Sub-cycles that failed (probe error or rejected batch).
    pub failed: usize,
    /// Non-finite rewards substituted with 0 across the whole cycle.
    pub substituted: u64,
}

/// Fans probe sub-cycles out across the configured concurrency.
pub struct ProbeDispatcher {
    client: Arc<dyn ProbeClient>,
    concurrency: usize,
}

impl ProbeDispatcher {
    pub fn new(client: Arc<dyn ProbeClient>, concurrency: usize) -> Self {
        ProbeDispatcher {
            client,
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run K concurrent sub-cycles to completion.
    pub async fn run_cycle(&self, state: &Arc<Mutex<RunState>>) -> CycleOutcome {
        let subcycles = (0..self.concurrency).map(|index| {
            let client = Arc::clone(&self.client);
            let state = Arc::clone(state);
            async move {
                match client.probe_and_score().await {
                    Ok(batch) => {
                        debug!(index, rewards = batch.len(), "probe sub-cycle returned");
                        let result = state.lock().scores.update(&batch);
                        match result {
                            Ok(update) => Ok(update.substituted as u64),
                            Err(e) => {
                                warn!(index, error = %e, "reward batch rejected");
                                Err(())
                            }
                        }
                    }
                    Err(e) => {
                        warn!(index, error = %e, "probe sub-cycle failed");
                        Err(())
                    }
                }
            }
        });

        let results = join_all(subcycles).await;

        let mut outcome = CycleOutcome::default();
        for result in results {
            match result {
                Ok(substituted) => {
                    outcome.completed += 1;
                    outcome.substituted += substituted;
                }
                Err(()) => outcome.failed += 1,
            }
        }
        outcome
    }
}

// ════════════════════════════════════════════════════════════════════════════
// TESTS
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use dsn_common::mock::MockProbeClient;
    use dsn_common::probe::{ProbeError, RewardBatch};

    use crate::scores::ScoreStore;

    fn state_with_slots(n: usize) -> Arc<Mutex<RunState>> {
        let scores = ScoreStore::with_scores(0.2, vec![0.0; n]).expect("store");
        Arc::new(Mutex::new(RunState::new(scores)))
    }

    // ── Test 1: all sub-cycles merge ────────────────────────────────────

    #[tokio::test]
    async fn all_subcycles_merge() {
        let client = Arc::new(MockProbeClient::new());
        client.push_batch(RewardBatch::from_pairs(vec![(0, 1.0)]));
        client.push_batch(RewardBatch::from_pairs(vec![(1, 1.0)]));

        let state = state_with_slots(2);
        let dispatcher = ProbeDispatcher::new(client, 2);

        let outcome = dispatcher.run_cycle(&state).await;
        assert_eq!(outcome.completed, 2);
        assert_eq!(outcome.failed, 0);

        let st = state.lock();
        assert!(st.scores.get(0).unwrap() > 0.0);
        assert!(st.scores.get(1).unwrap() > 0.0);
    }

    // ── Test 2: one failure does not block the others ───────────────────

    #[tokio::test]
    async fn failure_isolated_from_other_subcycles() {
        let client = Arc::new(MockProbeClient::new());
        client.push_batch(RewardBatch::from_pairs(vec![(0, 1.0)]));
        client.push_error(ProbeError::Timeout);
        client.push_batch(RewardBatch::from_pairs(vec![(2, 1.0)]));

        let state = state_with_slots(3);
        let dispatcher = ProbeDispatcher::new(client, 3);

        let outcome = dispatcher.run_cycle(&state).await;
        assert_eq!(outcome.completed, 2);
        assert_eq!(outcome.failed, 1);

        let st = state.lock();
        assert!((st.scores.get(0).unwrap() - 0.2).abs() < 1e-12);
        assert_eq!(st.scores.get(1), Some(0.0));
        assert!((st.scores.get(2).unwrap() - 0.2).abs() < 1e-12);
    }

    // ── Test 3: rejected batch counts as failed, rest land ──────────────

    #[tokio::test]
    async fn rejected_batch_isolated() {
        let client = Arc::new(MockProbeClient::new());
        // out-of-range slot: the score store rejects the whole batch
        client.push_batch(RewardBatch::from_pairs(vec![(9, 1.0)]));
        client.push_batch(RewardBatch::from_pairs(vec![(0, 0.5)]));

        let state = state_with_slots(1);
        let dispatcher = ProbeDispatcher::new(client, 2);

        let outcome = dispatcher.run_cycle(&state).await;
        assert_eq!(outcome.completed, 1);
        assert_eq!(outcome.failed, 1);
        assert!((state.lock().scores.get(0).unwrap() - 0.1).abs() < 1e-12);
    }

    // ── Test 4: substitutions aggregate across sub-cycles ───────────────

    #[tokio::test]
    async fn substitutions_aggregate() {
        let client = Arc::new(MockProbeClient::new());
        client.push_batch(RewardBatch::from_pairs(vec![(0, f64::NAN)]));
        client.push_batch(RewardBatch::from_pairs(vec![(1, f64::INFINITY)]));

        let state = state_with_slots(2);
        let dispatcher = ProbeDispatcher::new(client, 2);

        let outcome = dispatcher.run_cycle(&state).await;
        assert_eq!(outcome.substituted, 2);
        assert!(!state.lock().scores.has_non_finite());
    }
}
