//! Mutable run state for one validator instance.
//! A single owned struct, passed by reference into each component call —
//! no ambient globals. This is also the unit of persistence/recovery.

use dsn_common::registry::RegistrySnapshot;

use crate::scores::ScoreStore;

/// Everything one tick mutates.
///
/// Lives behind one mutex owned by the loop; probe sub-cycles lock it
/// only to merge a reward batch, the sequential tick phases lock it for
/// sync/reconcile reads and writes.
#[derive(Debug, Clone)]
pub struct RunState {
    /// Completed tick counter.
    pub step: u64,
    /// Block height at which the last tick fired.
    pub last_queried_block: u64,
    /// Per-slot smoothed trust scores.
    pub scores: ScoreStore,
    /// Last reconciled membership snapshot.
    pub registry: RegistrySnapshot,
    /// Telemetry emits since the last sink rollover.
    pub telemetry_log_count: u64,
}

impl RunState {
    /// Fresh state: zero counters, empty vectors.
    pub fn new(scores: ScoreStore) -> Self {
        RunState {
            step: 0,
            last_queried_block: 0,
            scores,
            registry: RegistrySnapshot::default(),
            telemetry_log_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_state() {
        let state = RunState::new(ScoreStore::new(0.1).expect("store"));
        assert_eq!(state.step, 0);
        assert_eq!(state.last_queried_block, 0);
        assert!(state.scores.is_empty());
        assert!(state.registry.is_empty());
    }
}
