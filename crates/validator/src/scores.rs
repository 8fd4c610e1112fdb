//! # ScoreStore — EMA Trust Accounting
//!
//! Owns the per-slot moving-average score vector and its invariants.
//!
//! ## Update Semantics
//!
//! ```text
//! RewardBatch {(slot, reward), ...}
//!      │
//!      ▼ validate: slots in range, no duplicates (batch rejected wholesale)
//!      ▼ sanitize: non-finite reward → 0 (counted, logged at warn)
//!      ▼ merge:    score[slot] = alpha * reward + (1 - alpha) * score[slot]
//! ```
//!
//! Slots absent from a batch keep their prior score unchanged — decay
//! only happens via presence, never via a global decay pass.
//!
//! ## Invariants
//!
//! 1. No non-finite value persists in the vector between updates.
//! 2. The vector only grows (`grow_to`), never shrinks.
//! 3. A rejected batch leaves the vector bit-identical.
//! 4. `alpha ∈ [0, 1]`, enforced at construction.

use thiserror::Error;
use tracing::warn;

use dsn_common::probe::RewardBatch;

// ════════════════════════════════════════════════════════════════════════════
// ERROR
// ════════════════════════════════════════════════════════════════════════════

/// Errors from score store construction and updates.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScoreError {
    /// Smoothing factor outside `[0, 1]` or non-finite.
    #[error("alpha must be in [0, 1], got {0}")]
    InvalidAlpha(f64),

    /// A batch references a slot beyond the current registry size.
    #[error("slot {slot} out of range (vector length {len})")]
    SlotOutOfRange { slot: usize, len: usize },

    /// The same slot appears twice in one batch.
    #[error("duplicate slot {0} in reward batch")]
    DuplicateSlot(usize),
}

// ════════════════════════════════════════════════════════════════════════════
// UPDATE SUMMARY
// ════════════════════════════════════════════════════════════════════════════

/// What one accepted batch did to the vector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreUpdate {
    /// Slots merged by this batch.
    pub merged: usize,
    /// Non-finite rewards replaced with 0 before merging.
    pub substituted: usize,
}

// ════════════════════════════════════════════════════════════════════════════
// SCORE STORE
// ════════════════════════════════════════════════════════════════════════════

/// Per-slot smoothed trust scores.
///
/// The vector length always equals the current registry size; growth is
/// driven by registry sync, never by reward batches.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreStore {
    scores: Vec<f64>,
    alpha: f64,
}

impl ScoreStore {
    /// Empty store with the given smoothing factor.
    pub fn new(alpha: f64) -> Result<Self, ScoreError> {
        Self::with_scores(alpha, Vec::new())
    }

    /// Store seeded with an existing vector (checkpoint recovery).
    ///
    /// Non-finite entries in the seed are zeroed so the no-NaN invariant
    /// holds from the first tick.
    pub fn with_scores(alpha: f64, mut scores: Vec<f64>) -> Result<Self, ScoreError> {
        if !alpha.is_finite() || !(0.0..=1.0).contains(&alpha) {
            return Err(ScoreError::InvalidAlpha(alpha));
        }
        for score in scores.iter_mut() {
            if !score.is_finite() {
                *score = 0.0;
            }
        }
        Ok(ScoreStore { scores, alpha })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.scores
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.scores.clone()
    }

    pub fn get(&self, slot: usize) -> Option<f64> {
        self.scores.get(slot).copied()
    }

    /// True if any entry is non-finite (data-quality guard for the
    /// weight reconciler; never true between well-formed updates).
    pub fn has_non_finite(&self) -> bool {
        self.scores.iter().any(|s| !s.is_finite())
    }

    /// Grow the vector to `len`, defaulting new slots to 0. Existing
    /// values keep their indices. Shrinking is not a supported
    /// transition; a smaller `len` is a no-op.
    pub fn grow_to(&mut self, len: usize) {
        if len > self.scores.len() {
            self.scores.resize(len, 0.0);
        }
    }

    /// Zero one slot (registry-detected replacement resets trust).
    pub fn reset_slot(&mut self, slot: usize) {
        if let Some(score) = self.scores.get_mut(slot) {
            *score = 0.0;
        }
    }

    /// Merge one reward batch into the vector via EMA.
    ///
    /// The whole batch is validated before any slot is touched: an
    /// out-of-range or duplicate slot rejects the batch wholesale and
    /// the vector is left bit-identical. An empty batch is a no-op.
    pub fn update(&mut self, batch: &RewardBatch) -> Result<ScoreUpdate, ScoreError> {
        if batch.is_empty() {
            return Ok(ScoreUpdate::default());
        }

        let len = self.scores.len();
        let mut seen = vec![false; len];
        for entry in batch.entries() {
            if entry.slot >= len {
                return Err(ScoreError::SlotOutOfRange {
                    slot: entry.slot,
                    len,
                });
            }
            if seen[entry.slot] {
                return Err(ScoreError::DuplicateSlot(entry.slot));
            }
            seen[entry.slot] = true;
        }

        let mut substituted = 0usize;
        for entry in batch.entries() {
            let reward = if entry.reward.is_finite() {
                entry.reward
            } else {
                substituted += 1;
                0.0
            };
            let old = self.scores[entry.slot];
            self.scores[entry.slot] = self.alpha * reward + (1.0 - self.alpha) * old;
        }

        if substituted > 0 {
            warn!(
                substituted,
                batch_len = batch.len(),
                "non-finite rewards replaced with 0 before merging"
            );
        }

        Ok(ScoreUpdate {
            merged: batch.len(),
            substituted,
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════
// TESTS
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn store(alpha: f64, scores: Vec<f64>) -> ScoreStore {
        ScoreStore::with_scores(alpha, scores).expect("valid store")
    }

    // ── Test 1: alpha validation ────────────────────────────────────────

    #[test]
    fn invalid_alpha_rejected() {
        assert!(matches!(
            ScoreStore::new(-0.1),
            Err(ScoreError::InvalidAlpha(_))
        ));
        assert!(matches!(
            ScoreStore::new(1.1),
            Err(ScoreError::InvalidAlpha(_))
        ));
        assert!(matches!(
            ScoreStore::new(f64::NAN),
            Err(ScoreError::InvalidAlpha(_))
        ));
        assert!(ScoreStore::new(0.0).is_ok());
        assert!(ScoreStore::new(1.0).is_ok());
    }

    // ── Test 2: empty batch is a no-op ──────────────────────────────────

    #[test]
    fn empty_batch_noop() {
        let mut s = store(0.2, vec![0.5, 0.7]);
        let before = s.to_vec();
        let update = s.update(&RewardBatch::default()).expect("empty ok");
        assert_eq!(update, ScoreUpdate::default());
        assert_eq!(s.as_slice(), before.as_slice());
    }

    // ── Test 3: EMA merge, absent slots untouched ───────────────────────

    #[test]
    fn ema_merge_present_slots_only() {
        let mut s = store(0.2, vec![0.0, 0.0, 0.9]);
        let batch = RewardBatch::from_pairs(vec![(0, 1.0), (1, 0.5)]);
        s.update(&batch).expect("update");
        assert!((s.get(0).unwrap() - 0.2).abs() < 1e-12);
        assert!((s.get(1).unwrap() - 0.1).abs() < 1e-12);
        // slot 2 absent from batch: unchanged
        assert_eq!(s.get(2), Some(0.9));
    }

    // ── Test 4: non-finite rewards substituted, never stored ────────────

    #[test]
    fn non_finite_rewards_substituted() {
        let mut s = store(0.5, vec![0.8, 0.8, 0.8]);
        let batch =
            RewardBatch::from_pairs(vec![(0, f64::NAN), (1, f64::INFINITY), (2, 1.0)]);
        let update = s.update(&batch).expect("update");
        assert_eq!(update.substituted, 2);
        assert!(!s.has_non_finite());
        // substituted rewards merge as 0: 0.5 * 0 + 0.5 * 0.8
        assert!((s.get(0).unwrap() - 0.4).abs() < 1e-12);
        assert!((s.get(1).unwrap() - 0.4).abs() < 1e-12);
        assert!((s.get(2).unwrap() - 0.9).abs() < 1e-12);
    }

    // ── Test 5: EMA idempotence on zero ─────────────────────────────────

    #[test]
    fn zero_reward_on_zero_slot_stays_zero() {
        let mut s = store(0.3, vec![0.0]);
        s.update(&RewardBatch::from_pairs(vec![(0, 0.0)]))
            .expect("update");
        assert_eq!(s.get(0), Some(0.0));
    }

    // ── Test 6: EMA convergence ─────────────────────────────────────────

    #[test]
    fn repeated_reward_converges_monotonically() {
        let mut s = store(0.2, vec![0.0]);
        let batch = RewardBatch::from_pairs(vec![(0, 1.0)]);
        let mut prev_err = 1.0;
        for _ in 0..100 {
            s.update(&batch).expect("update");
            let err = (1.0 - s.get(0).unwrap()).abs();
            assert!(err < prev_err, "error must shrink every step");
            prev_err = err;
        }
        assert!(prev_err < 1e-9);
    }

    // ── Test 7: duplicate slot rejects batch wholesale ──────────────────

    #[test]
    fn duplicate_slot_rejected_vector_untouched() {
        let mut s = store(0.2, vec![0.4, 0.6]);
        let before = s.to_vec();
        let batch = RewardBatch::from_pairs(vec![(0, 1.0), (1, 1.0), (0, 0.0)]);
        assert_eq!(s.update(&batch), Err(ScoreError::DuplicateSlot(0)));
        assert_eq!(s.as_slice(), before.as_slice());
    }

    // ── Test 8: out-of-range slot rejects batch wholesale ───────────────

    #[test]
    fn out_of_range_slot_rejected_vector_untouched() {
        let mut s = store(0.2, vec![0.4]);
        let before = s.to_vec();
        let batch = RewardBatch::from_pairs(vec![(0, 1.0), (5, 1.0)]);
        assert_eq!(
            s.update(&batch),
            Err(ScoreError::SlotOutOfRange { slot: 5, len: 1 })
        );
        assert_eq!(s.as_slice(), before.as_slice());
    }

    // ── Test 9: growth preserves values, reset zeroes one slot ──────────

    #[test]
    fn grow_and_reset() {
        let mut s = store(0.2, vec![0.1, 0.2, 0.3]);
        s.grow_to(5);
        assert_eq!(s.as_slice(), &[0.1, 0.2, 0.3, 0.0, 0.0]);
        s.grow_to(2); // shrink request ignored
        assert_eq!(s.len(), 5);
        s.reset_slot(1);
        assert_eq!(s.as_slice(), &[0.1, 0.0, 0.3, 0.0, 0.0]);
    }

    // ── Test 10: checkpoint seed sanitized ──────────────────────────────

    #[test]
    fn seed_vector_sanitized() {
        let s = store(0.2, vec![0.5, f64::NAN, f64::NEG_INFINITY]);
        assert_eq!(s.as_slice(), &[0.5, 0.0, 0.0]);
    }
}
