//! Peer endpoints.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// A dereferenceable peer: where to reach it and what it calls itself.
///
/// Both fields take part in equality, so the same identifier announced from
/// two addresses counts as two swarm members.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerEndpoint {
    address: String,
    identifier: String,
}

impl PeerEndpoint {
    pub fn new(address: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            identifier: identifier.into(),
        }
    }

    /// Routable address, typically `host:port`.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Swarm-unique label used in diagnostics and duplicate detection.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

impl fmt::Display for PeerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.identifier, self.address)
    }
}

/// Error returned when text is not of the form `identifier@address`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid peer endpoint {0:?}: expected identifier@address")]
pub struct InvalidEndpoint(pub String);

impl FromStr for PeerEndpoint {
    type Err = InvalidEndpoint;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('@') {
            Some((identifier, address)) if !identifier.is_empty() && !address.is_empty() => {
                Ok(Self::new(address, identifier))
            }
            _ => Err(InvalidEndpoint(s.to_string())),
        }
    }
}
