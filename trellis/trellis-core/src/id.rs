//! Unique identifier type for Trellis entities.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A unique identifier for tenants, graphs, nodes, edges and subordinates.
///
/// Identifiers are generated client-side at creation time (UUIDv4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrellisId(Uuid);

impl TrellisId {
    /// Create a new random ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The all-zero identifier
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Create an ID from a UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Parse from a string
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for TrellisId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TrellisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for TrellisId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<TrellisId> for Uuid {
    fn from(id: TrellisId) -> Self {
        id.0
    }
}

impl std::str::FromStr for TrellisId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_creation() {
        let id1 = TrellisId::new();
        let id2 = TrellisId::new();
        assert_ne!(id1, id2);
        assert_ne!(id1, TrellisId::nil());
    }

    #[test]
    fn test_id_roundtrip() {
        let id = TrellisId::new();
        let parsed: TrellisId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_id_serializes_as_plain_string() {
        let id = TrellisId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
    }
}
