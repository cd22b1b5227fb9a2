use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

/// Deterministic identity of a unit of work, used for deduplication
///
/// Computed from the method, the canonical target and the canonical payload.
/// The remaining retry budget is not part of it; an item keeps
/// its fingerprint across retries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Computes the fingerprint of a work description
    ///
    /// `payload` is serialized through `serde_json`, whose object maps are
    /// key-ordered, so logically equal payloads hash equally.
    pub fn compute(method: &str, target: &str, payload: &Value) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(method.as_bytes());
        hasher.update(b";");
        hasher.update(target.as_bytes());
        hasher.update(b";");
        hasher.update(payload.to_string().as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Wraps an already computed fingerprint (read back from a snapshot)
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for log lines
    ///
    /// Values loaded from a snapshot are not checked to be hex; when the cut
    /// would split a character the whole value is returned.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
