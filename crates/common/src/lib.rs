//! # DSN Common Crate
//!
//! Shared types and collaborator abstractions for the DSN validator.
//!
//! ## Modules
//! - `registry`: membership snapshot types + `RegistrySource` trait
//! - `probe`: reward batch types + `ProbeClient` trait
//! - `ledger`: block height / weight submission traits
//! - `blob`: opaque blob store trait + memory/fs backends
//! - `telemetry`: structured tick telemetry + `TelemetrySink` trait
//! - `config`: TOML configuration loading
//! - `id`: participant id helpers
//! - `mock`: deterministic in-memory collaborators for testing
//!
//! ## Collaborator Architecture
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 dsn_validator                │
//! └──────┬────────┬─────────┬─────────┬──────────┘
//!        │        │         │         │
//!   ┌────▼───┐ ┌──▼─────┐ ┌─▼──────┐ ┌▼─────────┐
//!   │Registry│ │ Probe  │ │ Ledger │ │BlobStore │  <- traits (this crate)
//!   │Source  │ │ Client │ │Adapter │ │          │
//!   └────────┘ └────────┘ └────────┘ └──────────┘
//!        mocks for every trait live in `mock`
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! let registry = MockRegistrySource::new(snapshot);
//! let current = registry.current_registry().await?;
//! ```

pub mod blob;
pub mod config;
pub mod id;
pub mod ledger;
pub mod mock;
pub mod probe;
pub mod registry;
pub mod telemetry;

pub use blob::{BlobError, BlobStore, FsBlobStore, MemoryBlobStore};
pub use config::{Config, ConfigError};
pub use id::ParticipantId;
pub use ledger::{
    BlockHeightSource, CommitOutcome, LedgerAdapter, LedgerError, NormalizedWeights,
    QuantizedWeights,
};
pub use mock::{MockLedger, MockProbeClient, MockRegistrySource, RecordingTelemetry};
pub use probe::{ProbeClient, ProbeError, RewardBatch, RewardEntry};
pub use registry::{PeerEndpoint, RegistryEntry, RegistrySnapshot, RegistrySource, RegistrySourceError};
pub use telemetry::{TelemetryError, TelemetrySink, TickTelemetry, TracingTelemetry};

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
