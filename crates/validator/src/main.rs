//! Validator entrypoint for local runs.
//!
//! Wires the control loop to in-memory collaborators (a block producer,
//! a seeded registry, a jittered probe client) plus a filesystem-backed
//! checkpoint store, and serves `/status` and `/metrics` over HTTP.
//! Production transports plug in through the same `Collaborators`
//! bundle without touching the loop.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use rand::Rng;
use tracing::{info, warn};

use dsn_common::blob::FsBlobStore;
use dsn_common::config::Config;
use dsn_common::id::ParticipantId;
use dsn_common::ledger::BlockHeightSource;
use dsn_common::mock::{MockLedger, MockRegistrySource};
use dsn_common::probe::{ProbeClient, ProbeError, RewardBatch};
use dsn_common::registry::RegistrySnapshot;
use dsn_common::telemetry::TracingTelemetry;

use dsn_validator::{
    Collaborators, RunState, ScoreStore, StateError, StateStore, StatusSnapshot, Validator,
};

/// Registry size for local runs.
const HARNESS_PARTICIPANTS: usize = 8;

/// Probe client for local runs: scores every slot with a small jitter
/// around a fixed per-slot baseline, so weights settle to a visible
/// ranking after a few ticks.
struct LocalProbe {
    baselines: Vec<f64>,
}

#[async_trait]
impl ProbeClient for LocalProbe {
    async fn probe_and_score(&self) -> Result<RewardBatch, ProbeError> {
        let mut rng = rand::thread_rng();
        let pairs: Vec<(usize, f64)> = self
            .baselines
            .iter()
            .enumerate()
            .map(|(slot, base)| {
                let jitter: f64 = rng.gen_range(-0.05..0.05);
                (slot, (base + jitter).clamp(0.0, 1.0))
            })
            .collect();
        Ok(RewardBatch::from_pairs(pairs))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let config = match std::env::var("DSN_VALIDATOR_CONFIG") {
        Ok(path) => Config::load_from_file(&path)
            .with_context(|| format!("loading config from {path}"))?,
        Err(_) => Config::default(),
    };

    // ── Collaborators ──────────────────────────────────────────────────
    let ledger = Arc::new(MockLedger::new());
    let registry = Arc::new(MockRegistrySource::new(RegistrySnapshot::from_ids(
        (0..HARNESS_PARTICIPANTS)
            .map(|i| ParticipantId::derived(format!("participant-{i}").as_bytes())),
    )));
    let probes = Arc::new(LocalProbe {
        baselines: (0..HARNESS_PARTICIPANTS)
            .map(|i| (i + 1) as f64 / HARNESS_PARTICIPANTS as f64)
            .collect(),
    });
    let blob = Arc::new(FsBlobStore::new(&config.data_dir));

    // ── Recover checkpoint or start fresh ──────────────────────────────
    let loader = StateStore::new(blob.clone(), config.state_key.clone());
    let state = match loader.load().await {
        Ok(snapshot) => snapshot
            .into_run_state(config.moving_average_alpha)
            .context("rebuilding run state from checkpoint")?,
        Err(StateError::NotFound) => {
            info!("no checkpoint found; starting fresh");
            RunState::new(ScoreStore::new(config.moving_average_alpha)?)
        }
        // corrupt or backend failure: surfaced, startup aborts
        Err(e) => return Err(e).context("loading persisted state"),
    };

    let collaborators = Collaborators {
        blocks: ledger.clone(),
        registry,
        probes,
        ledger: ledger.clone(),
        blob_store: blob,
        telemetry: Arc::new(TracingTelemetry::new()),
    };
    let validator = Arc::new(Validator::new(config.clone(), collaborators, state)?);

    // Local block producer: one block per second.
    {
        let ledger = ledger.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(1)).await;
                ledger.advance_blocks(1);
            }
        });
    }

    let start_block = ledger.current_block().await.unwrap_or(0);
    info!(block = start_block, "starting validator");
    let handle = validator.start();

    // ── Status / metrics HTTP ──────────────────────────────────────────
    let app = Router::new()
        .route("/status", get(status_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(validator.clone());
    let listener = tokio::net::TcpListener::bind(&config.status_bind_addr)
        .await
        .with_context(|| format!("binding {}", config.status_bind_addr))?;
    info!("status listener on {}", config.status_bind_addr);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!(error = %e, "status server exited");
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("waiting for interrupt")?;
    info!("interrupt received; stopping validator");
    validator.stop();
    handle.await.context("joining validator loop")?;
    if let Err(e) = validator.save_state().await {
        warn!(error = %e, "final checkpoint failed");
    }
    info!("validator stopped");
    Ok(())
}

async fn status_handler(State(validator): State<Arc<Validator>>) -> Json<StatusSnapshot> {
    Json(validator.status())
}

async fn metrics_handler(State(validator): State<Arc<Validator>>) -> String {
    validator.metrics().to_prometheus()
}
