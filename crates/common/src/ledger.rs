//! # Ledger Boundary — Block Height and Weight Submission
//!
//! Traits abstracting the shared ledger: the block height source that
//! drives the scheduling cadence, and the adapter that makes a weight
//! vector ledger-legal and commits it.
//!
//! ## Submission Pipeline
//!
//! ```text
//! scores (f64, per slot)
//!      │
//!      ▼ L1 normalization (core)
//! NormalizedWeights (uid, weight) — sums to 1 over nonzero slots
//!      │
//!      ▼ legalize_and_quantize (adapter)
//! QuantizedWeights (uid, u16 fixed-point)
//!      │
//!      ▼ commit (adapter, no finalization wait)
//! CommitOutcome { accepted, message }
//! ```
//!
//! ## No Finalization Wait
//!
//! `commit` returns once the submission is handed to the ledger client.
//! It MUST NOT block on chain inclusion or finalization; a failed or
//! rejected submission is retried naturally on the next tick.

use async_trait::async_trait;
use thiserror::Error;

// ════════════════════════════════════════════════════════════════════════════
// WEIGHT TYPES
// ════════════════════════════════════════════════════════════════════════════

/// Normalized `(uid, weight)` pairs.
///
/// Produced by the core: weights are non-negative and sum to 1 over the
/// listed uids. Zero-score slots are omitted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedWeights {
    pub pairs: Vec<(u16, f64)>,
}

impl NormalizedWeights {
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Ledger-legal fixed-point `(uid, weight)` pairs ready for commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuantizedWeights {
    pub pairs: Vec<(u16, u16)>,
}

/// Ledger's response to a weight commit.
///
/// A rejected commit (`accepted == false`) is a business outcome, not a
/// transport failure — those are [`LedgerError`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    pub accepted: bool,
    pub message: String,
}

// ════════════════════════════════════════════════════════════════════════════
// ERROR
// ════════════════════════════════════════════════════════════════════════════

/// Transport/chain-level errors from the ledger boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// Ledger client unreachable.
    #[error("ledger network error: {0}")]
    Network(String),

    /// Request timed out before the ledger responded.
    #[error("ledger request timed out")]
    Timeout,

    /// The weight vector is structurally invalid for this ledger.
    #[error("invalid weights: {0}")]
    InvalidWeights(String),
}

// ════════════════════════════════════════════════════════════════════════════
// TRAITS
// ════════════════════════════════════════════════════════════════════════════

/// Polled source of the current ledger block height.
///
/// Heights are monotonically non-decreasing. The core polls this in its
/// idle state to decide when the next tick fires.
#[async_trait]
pub trait BlockHeightSource: Send + Sync {
    async fn current_block(&self) -> Result<u64, LedgerError>;
}

/// Adapter that makes weights ledger-legal and commits them.
///
/// ## Contract
///
/// - `legalize_and_quantize` applies ledger-imposed constraints (max
///   weight count, minimum stake, weight resolution) and converts to the
///   ledger's fixed-point representation. Pure with respect to chain
///   state known at call time; no submission happens here.
/// - `commit` submits and returns without waiting for finalization or
///   inclusion.
/// - Implementations MUST NOT retry internally and MUST NOT panic.
#[async_trait]
pub trait LedgerAdapter: Send + Sync {
    fn legalize_and_quantize(
        &self,
        weights: &NormalizedWeights,
    ) -> Result<QuantizedWeights, LedgerError>;

    async fn commit(&self, weights: &QuantizedWeights) -> Result<CommitOutcome, LedgerError>;
}
