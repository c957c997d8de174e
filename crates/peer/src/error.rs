//! Errors surfaced by publish and acquire.

use std::{io, path::PathBuf};

use tinytorrent_api::TrackerError;
use tinytorrent_primitives::{ChunkIndex, DescriptorError, HashValue};

/// Error type for peer operations.
#[derive(Debug, thiserror::Error)]
pub enum TorrentError {
    /// A local file could not be read or written.
    #[error("io error on {}: {source}", path.display())]
    Io {
        /// File or directory involved.
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A descriptor could not be parsed.
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    /// The tracker knows no peer for a resource that still needs chunks.
    #[error("no peers in the swarm for resource {resource}")]
    SwarmEmpty {
        /// Requested resource.
        resource: HashValue,
    },

    /// Some chunks could not be obtained from any peer.
    #[error("resource {resource} unreachable: {} chunk(s) missing {missing:?}", missing.len())]
    ResourceUnreachable {
        /// Requested resource.
        resource: HashValue,
        /// Indices still missing after the last round.
        missing: Vec<ChunkIndex>,
    },

    /// Every chunk verified but the assembled file does not.
    #[error("assembled resource hashes to {actual}, expected {expected}")]
    CorruptAssembly {
        /// Identity from the descriptor.
        expected: HashValue,
        /// Hash of the merged file.
        actual: HashValue,
    },

    /// The tracker call failed.
    #[error(transparent)]
    Tracker(#[from] TrackerError),

    /// A caller-supplied value is unusable.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// What was wrong.
        message: String,
    },
}

impl TorrentError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

/// Result type for peer operations.
pub type TorrentResult<T> = Result<T, TorrentError>;
