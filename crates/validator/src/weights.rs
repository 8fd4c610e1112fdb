//! # Weight Reconciler — Scores Out, Ledger-Legal Weights In Flight
//!
//! Normalizes the score vector into a bounded weight vector and submits
//! it through the ledger adapter.
//!
//! ## Pipeline
//!
//! ```text
//! scores (f64 per slot)
//!      │  non-finite guard: warn + treat as 0, proceed
//!      ▼
//! L1 normalization over nonzero slots (sum == 1)
//!      │
//!      ▼
//! LedgerAdapter::legalize_and_quantize   (external constraints)
//!      │
//!      ▼
//! LedgerAdapter::commit                  (no finalization wait)
//! ```
//!
//! ## No Immediate Retry
//!
//! A failed or rejected submission is logged and reported in the
//! structured result; the next scheduled tick retries naturally. This
//! component never loops.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use dsn_common::ledger::{LedgerAdapter, LedgerError, NormalizedWeights};

// ════════════════════════════════════════════════════════════════════════════
// ERROR / OUTCOME
// ════════════════════════════════════════════════════════════════════════════

/// Transport-level reconcile failure. Business rejection is expressed
/// in [`CommitStatus::Rejected`] instead.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WeightError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Structured result of one reconcile pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitStatus {
    /// Weights submitted and accepted by the ledger client.
    Submitted,
    /// Ledger client rejected the submission (retried next tick).
    Rejected(String),
    /// Every score was zero; nothing to submit this tick.
    SkippedAllZero,
}

// ════════════════════════════════════════════════════════════════════════════
// NORMALIZATION (PURE)
// ════════════════════════════════════════════════════════════════════════════

/// L1-normalize a score vector into `(uid, weight)` pairs.
///
/// Non-finite scores are treated as 0. Zero-score slots are omitted;
/// the returned weights are non-negative and sum to 1 when any nonzero
/// score exists. Negative scores are clamped to 0 — trust never goes
/// below "none".
pub fn normalize(scores: &[f64]) -> NormalizedWeights {
    let sanitized: Vec<f64> = scores
        .iter()
        .map(|s| if s.is_finite() && *s > 0.0 { *s } else { 0.0 })
        .collect();

    let total: f64 = sanitized.iter().sum();
    if total <= 0.0 {
        return NormalizedWeights::default();
    }

    let pairs = sanitized
        .iter()
        .enumerate()
        .filter(|(_, s)| **s > 0.0)
        .map(|(slot, s)| (slot as u16, s / total))
        .collect();
    NormalizedWeights { pairs }
}

// ════════════════════════════════════════════════════════════════════════════
// RECONCILER
// ════════════════════════════════════════════════════════════════════════════

/// Turns the current scores into a ledger submission.
pub struct WeightReconciler {
    ledger: Arc<dyn LedgerAdapter>,
}

impl WeightReconciler {
    pub fn new(ledger: Arc<dyn LedgerAdapter>) -> Self {
        WeightReconciler { ledger }
    }

    /// Normalize, legalize, quantize and commit one score snapshot.
    ///
    /// The caller passes a snapshot taken under the state lock; this
    /// method runs lock-free and never blocks on chain finalization.
    pub async fn reconcile(&self, scores: &[f64]) -> Result<CommitStatus, WeightError> {
        if scores.iter().any(|s| !s.is_finite()) {
            warn!(
                "scores contain non-finite values; treating them as 0 for normalization. \
                 This may indicate a lack of responses or a bug in the reward path."
            );
        }

        let normalized = normalize(scores);
        if normalized.is_empty() {
            debug!("all scores zero; skipping weight submission this tick");
            return Ok(CommitStatus::SkippedAllZero);
        }

        let quantized = self.ledger.legalize_and_quantize(&normalized)?;
        debug!(pairs = quantized.pairs.len(), "weights legalized and quantized");

        let outcome = self.ledger.commit(&quantized).await?;
        if outcome.accepted {
            info!("weights committed to ledger");
            Ok(CommitStatus::Submitted)
        } else {
            error!(message = %outcome.message, "weight commit rejected");
            Ok(CommitStatus::Rejected(outcome.message))
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// TESTS
// ════════════════════════════════════════════════════════════════════════════
