//! Save/load of the rules state with integrity verification
//!
//! A save is a versioned JSON envelope. The payload is the serialized
//! `RulesState`; the digest is the BLAKE3 hash of the payload text.

use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;
use crate::sim::RulesState;

/// Current envelope format
pub const SAVE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveEnvelope {
    pub version: u32,
    /// Hex BLAKE3 digest of `payload`
    pub digest: String,
    pub payload: String,
}

impl SaveEnvelope {
    fn digest(payload: &str) -> String {
        blake3::hash(payload.as_bytes()).to_hex().to_string()
    }

    /// Seal a rules state
    pub fn seal(state: &RulesState) -> Result<Self, PersistenceError> {
        let payload = serde_json::to_string(state)?;
        Ok(Self { version: SAVE_VERSION, digest: Self::digest(&payload), payload })
    }

    /// Check version and digest, then parse the payload
    pub fn open(&self) -> Result<RulesState, PersistenceError> {
        if self.version != SAVE_VERSION {
            return Err(PersistenceError::UnsupportedVersion { found: self.version, expected: SAVE_VERSION });
        }
        if Self::digest(&self.payload) != self.digest {
            log::warn!("Save digest mismatch, refusing to load");
            return Err(PersistenceError::DigestMismatch);
        }
        Ok(serde_json::from_str(&self.payload)?)
    }

    /// Rules state to save text
    pub fn encode(state: &RulesState) -> Result<String, PersistenceError> {
        let envelope = Self::seal(state)?;
        Ok(serde_json::to_string(&envelope)?)
    }

    /// Save text back to a rules state
    pub fn decode(text: &str) -> Result<RulesState, PersistenceError> {
        let envelope: Self = serde_json::from_str(text)?;
        let state = envelope.open()?;
        log::info!("Loaded save: {:?}, {:?} to act", state.state, state.active_team);
        Ok(state)
    }
}
