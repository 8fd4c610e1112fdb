//! Structured tick telemetry.
//! One record per tick, shipped best-effort: a sink failure is logged by
//! the caller and never aborts the tick that produced the record.

use thiserror::Error;
use tracing::info;

/// Telemetry payload for one completed tick.
///
/// Scores are a dense slot-indexed vector, not per-uid string keys; the
/// sink flattens them however its backend requires.
#[derive(Debug, Clone, PartialEq)]
pub struct TickTelemetry {
    pub step: u64,
    pub block: u64,
    /// Score per slot, length = registry size at emit time.
    pub scores: Vec<f64>,
    /// Sub-cycles that failed during this tick's probe fan-out.
    pub probe_failures: u64,
    /// Non-finite rewards replaced with 0 during this tick.
    pub nan_substitutions: u64,
}

/// Errors from a telemetry backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TelemetryError {
    #[error("telemetry sink error: {0}")]
    Sink(String),
}

/// Best-effort telemetry shipping.
///
/// `rollover` starts a fresh backend run (log rotation, new remote run);
/// the core calls it after a configured number of `log` calls.
pub trait TelemetrySink: Send + Sync {
    fn log(&self, record: &TickTelemetry) -> Result<(), TelemetryError>;
    fn rollover(&self) -> Result<(), TelemetryError>;
}

/// Sink that writes telemetry to the tracing log stream.
#[derive(Debug, Default)]
pub struct TracingTelemetry;

impl TracingTelemetry {
    pub fn new() -> Self {
        TracingTelemetry
    }
}

impl TelemetrySink for TracingTelemetry {
    fn log(&self, record: &TickTelemetry) -> Result<(), TelemetryError> {
        info!(
            step = record.step,
            block = record.block,
            slots = record.scores.len(),
            probe_failures = record.probe_failures,
            nan_substitutions = record.nan_substitutions,
            "tick telemetry"
        );
        Ok(())
    }

    fn rollover(&self) -> Result<(), TelemetryError> {
        Ok(())
    }
}
