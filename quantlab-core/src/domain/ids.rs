use serde::{Deserialize, Serialize};
use std::fmt;

/// Symbol master identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymbolId(pub u64);

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SymbolId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Order ID, unique within one run and assigned in submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "order_{}", self.0)
    }
}

/// Deterministic run ID (hash of the canonical run parameters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    /// Hash a canonical JSON value with BLAKE3.
    ///
    /// `serde_json::Value` objects serialize with sorted keys, so two equal
    /// values always produce the same ID.
    pub fn from_canonical(value: &serde_json::Value) -> Self {
        let hash = blake3::hash(value.to_string().as_bytes());
        Self(hash.to_hex().to_string())
    }

    /// First `n` hex characters, for directory names.
    pub fn short(&self, n: usize) -> &str {
        &self.0[..n.min(self.0.len())]
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
