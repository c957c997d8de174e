//! Error types for the remote protocols.
//!
//! Both enums are serializable so a server can hand them back to a client
//! unchanged.

use serde::{Deserialize, Serialize};
use tinytorrent_primitives::{ChunkIndex, HashValue};

/// Error returned by a [`RemotePeer`](crate::RemotePeer) call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum RemotePeerError {
    /// The peer does not hold the requested chunk.
    #[error("Chunk {index} of resource {resource} is not available.")]
    ChunkNotAvailable {
        /// Resource the chunk belongs to.
        resource: HashValue,
        /// Requested index.
        index: ChunkIndex,
    },

    /// The peer could not be reached or answered garbage.
    #[error("peer transport error: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
    },
}

impl RemotePeerError {
    pub fn transport(message: impl ToString) -> Self {
        Self::Transport {
            message: message.to_string(),
        }
    }
}

/// Error returned by a [`Tracker`](crate::Tracker) call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum TrackerError {
    /// The tracker could not be reached or answered garbage.
    #[error("tracker transport error: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
    },
}

impl TrackerError {
    pub fn transport(message: impl ToString) -> Self {
        Self::Transport {
            message: message.to_string(),
        }
    }
}

/// Result type for remote peer calls.
pub type RemotePeerResult<T> = Result<T, RemotePeerError>;

/// Result type for tracker calls.
pub type TrackerResult<T> = Result<T, TrackerError>;
