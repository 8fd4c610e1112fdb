//! Mock Collaborator Implementations for Testing
//!
//! Deterministic, fully in-memory implementations of every boundary
//! trait in this crate. No network calls. Used by unit and integration
//! tests and by the local harness binary.
//!
//! # Features
//!
//! - FIFO response queues for scripted scenarios
//! - Configurable latency simulation (async, non-blocking)
//! - Configurable failure rate simulation
//! - Captured submissions/records for assertions

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rand::Rng;

use crate::ledger::{
    BlockHeightSource, CommitOutcome, LedgerAdapter, LedgerError, NormalizedWeights,
    QuantizedWeights,
};
use crate::probe::{ProbeClient, ProbeError, RewardBatch};
use crate::registry::{RegistrySnapshot, RegistrySource, RegistrySourceError};
use crate::telemetry::{TelemetryError, TelemetrySink, TickTelemetry};

// ════════════════════════════════════════════════════════════════════════════
// MOCK LEDGER
// ════════════════════════════════════════════════════════════════════════════

/// Mock ledger: block height counter plus a capturing weight endpoint.
///
/// Implements both [`BlockHeightSource`] and [`LedgerAdapter`]. Commit
/// outcomes are pre-loaded FIFO; when the queue is empty an accepted
/// outcome is returned. Every committed weight vector is captured for
/// assertions.
pub struct MockLedger {
    height: AtomicU64,
    /// Pre-loaded commit results, consumed FIFO.
    commit_results: Mutex<VecDeque<Result<CommitOutcome, LedgerError>>>,
    /// Every weight vector passed to `commit`, in order.
    submissions: Mutex<Vec<QuantizedWeights>>,
    /// Maximum pairs `legalize_and_quantize` keeps (highest weights win).
    max_weight_count: Option<usize>,
}

impl MockLedger {
    pub fn new() -> Self {
        MockLedger {
            height: AtomicU64::new(0),
            commit_results: Mutex::new(VecDeque::new()),
            submissions: Mutex::new(Vec::new()),
            max_weight_count: None,
        }
    }

    /// Cap the number of weight pairs the mock ledger accepts.
    pub fn with_max_weight_count(mut self, max: usize) -> Self {
        self.max_weight_count = Some(max);
        self
    }

    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }

    pub fn advance_blocks(&self, n: u64) {
        self.height.fetch_add(n, Ordering::SeqCst);
    }

    pub fn push_commit_result(&self, result: Result<CommitOutcome, LedgerError>) {
        self.commit_results.lock().push_back(result);
    }

    /// Captured submissions so far (clones).
    pub fn submissions(&self) -> Vec<QuantizedWeights> {
        self.submissions.lock().clone()
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().len()
    }
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlockHeightSource for MockLedger {
    async fn current_block(&self) -> Result<u64, LedgerError> {
        Ok(self.height.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl LedgerAdapter for MockLedger {
    fn legalize_and_quantize(
        &self,
        weights: &NormalizedWeights,
    ) -> Result<QuantizedWeights, LedgerError> {
        let mut pairs: Vec<(u16, f64)> = weights
            .pairs
            .iter()
            .copied()
            .filter(|(_, w)| *w > 0.0)
            .collect();

        if let Some(max) = self.max_weight_count {
            if pairs.len() > max {
                pairs.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
                pairs.truncate(max);
                let total: f64 = pairs.iter().map(|(_, w)| w).sum();
                if total > 0.0 {
                    for pair in pairs.iter_mut() {
                        pair.1 /= total;
                    }
                }
                pairs.sort_by_key(|(uid, _)| *uid);
            }
        }

        let quantized = pairs
            .into_iter()
            .map(|(uid, w)| (uid, (w * f64::from(u16::MAX)).round() as u16))
            .collect();
        Ok(QuantizedWeights { pairs: quantized })
    }

    async fn commit(&self, weights: &QuantizedWeights) -> Result<CommitOutcome, LedgerError> {
        self.submissions.lock().push(weights.clone());
        match self.commit_results.lock().pop_front() {
            Some(result) => result,
            None => Ok(CommitOutcome {
                accepted: true,
                message: "mock commit accepted".to_string(),
            }),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// MOCK REGISTRY SOURCE
// ════════════════════════════════════════════════════════════════════════════

/// Mock registry source backed by a settable snapshot.
pub struct MockRegistrySource {
    snapshot: RwLock<RegistrySnapshot>,
    /// One-shot error injected before the next fetch.
    fail_next: Mutex<Option<RegistrySourceError>>,
    fetches: AtomicU64,
}

impl MockRegistrySource {
    pub fn new(snapshot: RegistrySnapshot) -> Self {
        MockRegistrySource {
            snapshot: RwLock::new(snapshot),
            fail_next: Mutex::new(None),
            fetches: AtomicU64::new(0),
        }
    }

    pub fn set_snapshot(&self, snapshot: RegistrySnapshot) {
        *self.snapshot.write() = snapshot;
    }

    pub fn fail_next(&self, err: RegistrySourceError) {
        *self.fail_next.lock() = Some(err);
    }

    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegistrySource for MockRegistrySource {
    async fn current_registry(&self) -> Result<RegistrySnapshot, RegistrySourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.fail_next.lock().take() {
            return Err(err);
        }
        Ok(self.snapshot.read().clone())
    }
}

// ════════════════════════════════════════════════════════════════════════════
// MOCK PROBE CLIENT
// ════════════════════════════════════════════════════════════════════════════

/// Mock probe client with a FIFO queue of scripted results.
///
/// When the queue is empty, returns `ProbeError::Transport("no mock
/// response")`. Optional latency and failure-rate simulation mirror how
/// real probe transports behave under load.
pub struct MockProbeClient {
    responses: Mutex<VecDeque<Result<RewardBatch, ProbeError>>>,
    latency_ms: u64,
    failure_rate: f64,
}

impl MockProbeClient {
    pub fn new() -> Self {
        MockProbeClient {
            responses: Mutex::new(VecDeque::new()),
            latency_ms: 0,
            failure_rate: 0.0,
        }
    }

    /// Simulated per-call latency (async sleep, non-blocking).
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Probability in `[0, 1]` that a call fails regardless of the queue.
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn push_batch(&self, batch: RewardBatch) {
        self.responses.lock().push_back(Ok(batch));
    }

    pub fn push_error(&self, err: ProbeError) {
        self.responses.lock().push_back(Err(err));
    }

    pub fn pending(&self) -> usize {
        self.responses.lock().len()
    }
}

impl Default for MockProbeClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProbeClient for MockProbeClient {
    async fn probe_and_score(&self) -> Result<RewardBatch, ProbeError> {
        if self.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.latency_ms)).await;
        }
        if self.failure_rate > 0.0 && rand::thread_rng().gen::<f64>() < self.failure_rate {
            return Err(ProbeError::Transport("simulated failure".to_string()));
        }
        match self.responses.lock().pop_front() {
            Some(result) => result,
            None => Err(ProbeError::Transport("no mock response".to_string())),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// RECORDING TELEMETRY
// ════════════════════════════════════════════════════════════════════════════

/// Telemetry sink that records every emitted tick for assertions.
#[derive(Debug, Default)]
pub struct RecordingTelemetry {
    records: Mutex<Vec<TickTelemetry>>,
    rollovers: AtomicU64,
    fail_logs: AtomicBool,
}

impl RecordingTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `log` call fail (best-effort path testing).
    pub fn set_fail_logs(&self, fail: bool) {
        self.fail_logs.store(fail, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<TickTelemetry> {
        self.records.lock().clone()
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().len()
    }

    pub fn rollover_count(&self) -> u64 {
        self.rollovers.load(Ordering::SeqCst)
    }
}

impl TelemetrySink for RecordingTelemetry {
    fn log(&self, record: &TickTelemetry) -> Result<(), TelemetryError> {
        if self.fail_logs.load(Ordering::SeqCst) {
            return Err(TelemetryError::Sink("injected log failure".to_string()));
        }
        self.records.lock().push(record.clone());
        Ok(())
    }

    fn rollover(&self) -> Result<(), TelemetryError> {
        self.rollovers.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::ParticipantId;

    #[tokio::test]
    async fn test_ledger_height_advances() {
        let ledger = MockLedger::new();
        assert_eq!(ledger.current_block().await.expect("height"), 0);
        ledger.advance_blocks(3);
        assert_eq!(ledger.current_block().await.expect("height"), 3);
    }

    #[tokio::test]
    async fn test_ledger_captures_submissions() {
        let ledger = MockLedger::new();
        let normalized = NormalizedWeights {
            pairs: vec![(0, 1.0)],
        };
        let quantized = ledger.legalize_and_quantize(&normalized).expect("quantize");
        assert_eq!(quantized.pairs, vec![(0, u16::MAX)]);

        let outcome = ledger.commit(&quantized).await.expect("commit");
        assert!(outcome.accepted);
        assert_eq!(ledger.submission_count(), 1);
    }

    #[test]
    fn test_ledger_max_weight_count_keeps_heaviest() {
        let ledger = MockLedger::new().with_max_weight_count(2);
        let normalized = NormalizedWeights {
            pairs: vec![(0, 0.5), (1, 0.1), (2, 0.4)],
        };
        let quantized = ledger.legalize_and_quantize(&normalized).expect("quantize");
        let uids: Vec<u16> = quantized.pairs.iter().map(|(uid, _)| *uid).collect();
        assert_eq!(uids, vec![0, 2]);
        // renormalized over the surviving pairs
        let total: i64 = quantized.pairs.iter().map(|(_, w)| i64::from(*w)).sum();
        assert!((i64::from(u16::MAX) - total).abs() <= 2);
    }

    #[tokio::test]
    async fn test_registry_source_fail_next_is_one_shot() {
        let source = MockRegistrySource::new(RegistrySnapshot::from_ids(vec![
            ParticipantId::new("a"),
        ]));
        source.fail_next(RegistrySourceError::Timeout);
        assert!(source.current_registry().await.is_err());
        assert!(source.current_registry().await.is_ok());
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_probe_client_fifo_and_exhaustion() {
        let client = MockProbeClient::new();
        client.push_batch(RewardBatch::from_pairs(vec![(0, 1.0)]));
        client.push_error(ProbeError::Timeout);

        assert!(client.probe_and_score().await.is_ok());
        assert_eq!(client.probe_and_score().await, Err(ProbeError::Timeout));
        // queue drained
        assert!(matches!(
            client.probe_and_score().await,
            Err(ProbeError::Transport(_))
        ));
    }

    #[test]
    fn test_recording_telemetry_rollover() {
        let sink = RecordingTelemetry::new();
        sink.rollover().expect("rollover");
        assert_eq!(sink.rollover_count(), 1);
    }
}
