//! Validator Loop Metrics
//!
//! Lock-free, thread-safe counters for the control loop.
//!
//! ## Design Principles
//!
//! - **Lock-free**: all operations use atomic primitives only
//! - **Thread-safe**: all fields are `AtomicU64`, struct is `Send + Sync`
//! - **Prometheus-compatible**: `to_prometheus()` outputs valid exposition format
//!
//! ## avg_tick_ms
//!
//! Exponential moving average with `new_avg = (7 * old_avg + new) / 8`
//! (α = 1/8): power-of-2 division, no floating point, updated via
//! `compare_exchange` so concurrent recorders never lose a sample.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Point-in-time copy of every counter, JSON-serializable for the
/// status endpoint.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub ticks_completed: u64,
    pub tick_failures: u64,
    pub probe_subcycles_ok: u64,
    pub probe_subcycles_failed: u64,
    pub nan_substitutions: u64,
    pub weights_submitted: u64,
    pub weight_rejections: u64,
    pub commit_failures: u64,
    pub last_block: u64,
    pub avg_tick_ms: u64,
}

/// Control-loop metrics. All fields atomic; increments use `Relaxed`,
/// snapshot reads use `SeqCst`.
#[derive(Debug, Default)]
pub struct ValidatorMetrics {
    ticks_completed: AtomicU64,
    tick_failures: AtomicU64,
    probe_subcycles_ok: AtomicU64,
    probe_subcycles_failed: AtomicU64,
    nan_substitutions: AtomicU64,
    weights_submitted: AtomicU64,
    weight_rejections: AtomicU64,
    commit_failures: AtomicU64,
    last_block: AtomicU64,
    avg_tick_ms: AtomicU64,
}

impl ValidatorMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_tick_completed(&self) {
        self.ticks_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tick_failure(&self) {
        self.tick_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_probe_cycle(&self, ok: u64, failed: u64, substituted: u64) {
        self.probe_subcycles_ok.fetch_add(ok, Ordering::Relaxed);
        self.probe_subcycles_failed
            .fetch_add(failed, Ordering::Relaxed);
        self.nan_substitutions
            .fetch_add(substituted, Ordering::Relaxed);
    }

    pub fn record_weights_submitted(&self) {
        self.weights_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_weight_rejection(&self) {
        self.weight_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_commit_failure(&self) {
        self.commit_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_last_block(&self, block: u64) {
        self.last_block.store(block, Ordering::Relaxed);
    }

    /// Fold one tick duration into the EMA.
    pub fn record_tick_duration_ms(&self, duration_ms: u64) {
        loop {
            let old = self.avg_tick_ms.load(Ordering::SeqCst);
            let new = if old == 0 {
                duration_ms
            } else {
                (7 * old + duration_ms) / 8
            };
            if self
                .avg_tick_ms
                .compare_exchange(old, new, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                break;
            }
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ticks_completed: self.ticks_completed.load(Ordering::SeqCst),
            tick_failures: self.tick_failures.load(Ordering::SeqCst),
            probe_subcycles_ok: self.probe_subcycles_ok.load(Ordering::SeqCst),
            probe_subcycles_failed: self.probe_subcycles_failed.load(Ordering::SeqCst),
            nan_substitutions: self.nan_substitutions.load(Ordering::SeqCst),
            weights_submitted: self.weights_submitted.load(Ordering::SeqCst),
            weight_rejections: self.weight_rejections.load(Ordering::SeqCst),
            commit_failures: self.commit_failures.load(Ordering::SeqCst),
            last_block: self.last_block.load(Ordering::SeqCst),
            avg_tick_ms: self.avg_tick_ms.load(Ordering::SeqCst),
        }
    }

    /// Prometheus text exposition format.
    pub fn to_prometheus(&self) -> String {
        let s = self.snapshot();
        let mut out = String::with_capacity(1024);

        let counters: [(&str, &str, u64); 9] = [
            (
                "dsn_validator_ticks_completed",
                "Completed control-loop ticks",
                s.ticks_completed,
            ),
            (
                "dsn_validator_tick_failures",
                "Ticks aborted by an error caught at the loop boundary",
                s.tick_failures,
            ),
            (
                "dsn_validator_probe_subcycles_ok",
                "Probe sub-cycles whose reward batch merged",
                s.probe_subcycles_ok,
            ),
            (
                "dsn_validator_probe_subcycles_failed",
                "Probe sub-cycles that failed or were rejected",
                s.probe_subcycles_failed,
            ),
            (
                "dsn_validator_nan_substitutions",
                "Non-finite rewards replaced with 0",
                s.nan_substitutions,
            ),
            (
                "dsn_validator_weights_submitted",
                "Accepted weight submissions",
                s.weights_submitted,
            ),
            (
                "dsn_validator_weight_rejections",
                "Weight submissions rejected by the ledger",
                s.weight_rejections,
            ),
            (
                "dsn_validator_commit_failures",
                "Weight submissions that failed at the transport level",
                s.commit_failures,
            ),
            (
                "dsn_validator_last_block",
                "Last observed ledger block height",
                s.last_block,
            ),
        ];

        for (name, help, value) in counters {
            out.push_str(&format!(
                "# HELP {name} {help}\n# TYPE {name} {}\n{name} {value}\n",
                if name.ends_with("last_block") {
                    "gauge"
                } else {
                    "counter"
                },
            ));
        }
        out.push_str(&format!(
            "# HELP dsn_validator_avg_tick_ms EMA of tick duration in milliseconds\n\
             # TYPE dsn_validator_avg_tick_ms gauge\n\
             dsn_validator_avg_tick_ms {}\n",
            s.avg_tick_ms
        ));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let m = ValidatorMetrics::new();
        m.record_tick_completed();
        m.record_tick_completed();
        m.record_probe_cycle(3, 1, 2);
        m.set_last_block(77);

        let s = m.snapshot();
        assert_eq!(s.ticks_completed, 2);
        assert_eq!(s.probe_subcycles_ok, 3);
        assert_eq!(s.probe_subcycles_failed, 1);
        assert_eq!(s.nan_substitutions, 2);
        assert_eq!(s.last_block, 77);
    }

    #[test]
    fn test_tick_duration_ema() {
        let m = ValidatorMetrics::new();
        m.record_tick_duration_ms(80);
        // first sample seeds the average directly
        assert_eq!(m.snapshot().avg_tick_ms, 80);
        m.record_tick_duration_ms(160);
        // (7 * 80 + 160) / 8 = 90
        assert_eq!(m.snapshot().avg_tick_ms, 90);
    }

    #[test]
    fn test_prometheus_format() {
        let m = ValidatorMetrics::new();
        m.record_tick_completed();
        let out = m.to_prometheus();
        assert!(out.contains("# TYPE dsn_validator_ticks_completed counter"));
        assert!(out.contains("dsn_validator_ticks_completed 1"));
        assert!(out.contains("# TYPE dsn_validator_last_block gauge"));
        assert!(out.contains("dsn_validator_avg_tick_ms 0"));
    }

    #[test]
    fn test_prometheus_deterministic() {
        let m = ValidatorMetrics::new();
        assert_eq!(m.to_prometheus(), m.to_prometheus());
    }
}
