//! # Probe Collaborator — Rewards In
//!
//! The probe/reward collaborator owns the protocol payloads and the
//! scoring function; the core only consumes its output: a
//! [`RewardBatch`] of `(slot, reward)` pairs produced by one
//! probe-and-score sub-cycle.
//!
//! ## Contract
//!
//! - One `probe_and_score` call per concurrent sub-cycle per tick.
//! - The call must eventually return or fail; timeout enforcement is
//!   the implementation's concern, not the core's.
//! - Slots within one batch are expected to be mutually exclusive; the
//!   score store rejects batches violating this.

use async_trait::async_trait;
use thiserror::Error;

// ════════════════════════════════════════════════════════════════════════════
// REWARD BATCH
// ════════════════════════════════════════════════════════════════════════════

/// One scored probe response: a slot and its raw reward.
///
/// Rewards are raw collaborator output — they may be non-finite; the
/// score store sanitizes before merging.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardEntry {
    pub slot: usize,
    pub reward: f64,
}

/// Set of `(slot, reward)` pairs produced by one probe cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RewardBatch {
    entries: Vec<RewardEntry>,
}

impl RewardBatch {
    pub fn new(entries: Vec<RewardEntry>) -> Self {
        RewardBatch { entries }
    }

    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (usize, f64)>,
    {
        RewardBatch {
            entries: pairs
                .into_iter()
                .map(|(slot, reward)| RewardEntry { slot, reward })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[RewardEntry] {
        &self.entries
    }
}

// ════════════════════════════════════════════════════════════════════════════
// PROBE CLIENT TRAIT
// ════════════════════════════════════════════════════════════════════════════

/// Errors from one probe-and-score sub-cycle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProbeError {
    /// Transport-level failure reaching the probed participants.
    #[error("probe transport error: {0}")]
    Transport(String),

    /// Sub-cycle did not complete in time.
    #[error("probe timed out")]
    Timeout,

    /// Responses arrived but could not be scored.
    #[error("scoring failed: {0}")]
    Scoring(String),
}

/// One opaque probe-and-score sub-cycle.
///
/// ## Contract
///
/// - Implementations MUST NOT panic.
/// - Implementations MUST NOT retry internally.
/// - A failure affects only this sub-cycle; the dispatcher isolates it.
#[async_trait]
pub trait ProbeClient: Send + Sync {
    /// Probe a set of participants and score their responses.
    async fn probe_and_score(&self) -> Result<RewardBatch, ProbeError>;
}
