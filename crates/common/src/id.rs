//! Participant identity helpers.
//! Ids are opaque strings (public-key-derived hex in practice) and stay
//! stable for as long as a participant occupies its registry slot.

use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

/// Opaque stable identity of one network participant.
///
/// Compared byte-for-byte; the core never interprets the contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        ParticipantId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive a deterministic id from seed bytes (SHA3-256, lowercase hex).
    /// Used by mocks and tests to fabricate key-shaped identities.
    pub fn derived(seed: &[u8]) -> Self {
        let mut hasher = Sha3_256::new();
        hasher.update(seed);
        ParticipantId(hex::encode(hasher.finalize()))
    }

    /// Short prefix form useful for logging (first 12 hex chars).
    pub fn short(&self) -> &str {
        self.0.get(0..12).unwrap_or(&self.0)
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        ParticipantId(s.to_string())
    }
}
