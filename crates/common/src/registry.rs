//! # Registry Snapshot — Authoritative Membership View
//!
//! Types describing the network's ordered membership list, plus the
//! [`RegistrySource`] trait for fetching the current snapshot from the
//! authoritative external registry.
//!
//! ## Slot Model
//!
//! A snapshot assigns each participant a dense slot index `[0, N)`. The
//! occupant of a slot can change between snapshots (replacement); the
//! slot count only grows within one validator run. All per-participant
//! vectors in the core are indexed by slot.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::ParticipantId;

// ════════════════════════════════════════════════════════════════════════════
// SNAPSHOT TYPES
// ════════════════════════════════════════════════════════════════════════════

/// Transport endpoint metadata for one participant.
///
/// Opaque to the core — only the probe transport interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerEndpoint {
    pub host: String,
    pub port: u16,
}

/// One slot's occupant: identity plus optional endpoint metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Stable identity of the occupant.
    pub id: ParticipantId,
    /// Endpoint to reach the occupant, if the registry publishes one.
    pub endpoint: Option<PeerEndpoint>,
}

impl RegistryEntry {
    pub fn new(id: ParticipantId) -> Self {
        RegistryEntry { id, endpoint: None }
    }
}

/// Ordered membership list: one entry per slot.
///
/// An empty snapshot is valid (length 0 network).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    entries: Vec<RegistryEntry>,
}

impl RegistrySnapshot {
    pub fn new(entries: Vec<RegistryEntry>) -> Self {
        RegistrySnapshot { entries }
    }

    /// Build a snapshot from bare ids, no endpoint metadata.
    pub fn from_ids<I>(ids: I) -> Self
    where
        I: IntoIterator<Item = ParticipantId>,
    {
        RegistrySnapshot {
            entries: ids.into_iter().map(RegistryEntry::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    /// Identity occupying `slot`, if the slot exists.
    pub fn id_at(&self, slot: usize) -> Option<&ParticipantId> {
        self.entries.get(slot).map(|e| &e.id)
    }

    /// All identities in slot order.
    pub fn ids(&self) -> impl Iterator<Item = &ParticipantId> {
        self.entries.iter().map(|e| &e.id)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// SOURCE TRAIT
// ════════════════════════════════════════════════════════════════════════════

/// Errors from the external registry source.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistrySourceError {
    /// Registry backend unreachable.
    #[error("registry unavailable: {0}")]
    Unavailable(String),

    /// Request timed out before the registry responded.
    #[error("registry request timed out")]
    Timeout,
}

/// Async source of the authoritative membership list.
///
/// ## Contract
///
/// - May be called at any time; not required to be cheap.
/// - Implementations MUST NOT panic.
/// - A returned snapshot is complete — the caller replaces, never merges.
#[async_trait]
pub trait RegistrySource: Send + Sync {
    /// Fetch the current registry snapshot.
    async fn current_registry(&self) -> Result<RegistrySnapshot, RegistrySourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_ids_preserves_order() {
        let snap = RegistrySnapshot::from_ids(vec![
            ParticipantId::new("a"),
            ParticipantId::new("b"),
            ParticipantId::new("c"),
        ]);
        assert_eq!(snap.len(), 3);
        assert_eq!(snap.id_at(1), Some(&ParticipantId::new("b")));
        assert_eq!(snap.id_at(3), None);
    }

    #[test]
    fn test_empty_snapshot_is_valid() {
        let snap = RegistrySnapshot::default();
        assert!(snap.is_empty());
        assert_eq!(snap.len(), 0);
    }
}
