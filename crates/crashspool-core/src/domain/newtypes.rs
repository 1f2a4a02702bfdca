//! Domain newtypes with validation
//!
//! Strongly-typed wrappers for the identifiers used throughout the crash
//! spool. Each newtype ensures data validity at construction time.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Identifier of the application/component that produced a report.
///
/// Owners are encoded as a leading `{digits}_` prefix in report file names
/// and drive the per-owner storage quota. Reports whose names carry no such
/// prefix are unowned and excluded from per-owner accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(u32);

impl OwnerId {
    /// Create an OwnerId from a raw numeric id
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the inner numeric value
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl Display for OwnerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OwnerId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u32>()
            .map(Self)
            .map_err(|e| DomainError::InvalidOwner(format!("{s}: {e}")))
    }
}

impl From<u32> for OwnerId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Stable, state-independent identifier of a report.
///
/// A local id is matched as a suffix of a report's base name, so user-facing
/// surfaces can refer to a report without knowing its current lifecycle
/// marker or attempt count.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalId(String);

impl LocalId {
    /// Create a LocalId, rejecting empty or dot-containing values.
    ///
    /// A dot would make the id ambiguous against the state-marker segments
    /// of the naming grammar.
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.is_empty() {
            return Err(DomainError::InvalidLocalId("empty id".to_string()));
        }
        if id.contains('.') {
            return Err(DomainError::InvalidLocalId(id));
        }
        Ok(Self(id))
    }

    /// Get the inner string value
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for LocalId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LocalId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_id_roundtrip() {
        let owner = OwnerId::new(10007);
        assert_eq!(owner.value(), 10007);
        assert_eq!(owner.to_string(), "10007");
        assert_eq!("10007".parse::<OwnerId>().unwrap(), owner);
    }

    #[test]
    fn test_owner_id_rejects_garbage() {
        assert!("".parse::<OwnerId>().is_err());
        assert!("abc".parse::<OwnerId>().is_err());
        assert!("-1".parse::<OwnerId>().is_err());
    }

    #[test]
    fn test_local_id_validation() {
        let id = LocalId::new("f297dbcba7a2d0bb").unwrap();
        assert_eq!(id.as_str(), "f297dbcba7a2d0bb");

        assert!(LocalId::new("").is_err());
        assert!(LocalId::new("abc.dmp").is_err());
    }
}
