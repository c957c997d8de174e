//! Peer configuration (TOML-serializable).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::TorrentError;

/// Default maximum chunk size (1 MiB).
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// Largest accepted chunk size (8 MiB).
pub const MAX_CHUNK_SIZE_LIMIT: usize = 8 * 1024 * 1024;

/// Tuning knobs for publishing and acquiring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    /// Maximum chunk payload size used when publishing.
    pub max_chunk_size: usize,

    /// Upper bound on outstanding remote requests during an acquire.
    pub max_concurrent_requests: usize,

    /// Timeout applied to every remote request, in milliseconds.
    pub request_timeout_ms: u64,

    /// Tracker polls (retrieval rounds) before giving up on missing chunks.
    pub tracker_polls: u32,

    /// Pause between retrieval rounds, in milliseconds.
    pub retry_delay_ms: u64,

    /// Register with the tracker as soon as the first chunk is held.
    pub announce_partial: bool,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            max_concurrent_requests: 8,
            request_timeout_ms: 10_000,
            tracker_polls: 3,
            retry_delay_ms: 500,
            announce_partial: true,
        }
    }
}

impl PeerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Reject values outside their usable range.
    pub fn validate(&self) -> Result<(), TorrentError> {
        if !(1..=MAX_CHUNK_SIZE_LIMIT).contains(&self.max_chunk_size) {
            return Err(TorrentError::invalid_input(format!(
                "max_chunk_size must be between 1 and {MAX_CHUNK_SIZE_LIMIT}, got {}",
                self.max_chunk_size
            )));
        }
        if self.max_concurrent_requests == 0 {
            return Err(TorrentError::invalid_input(
                "max_concurrent_requests must be at least 1",
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(TorrentError::invalid_input(
                "request_timeout_ms must be positive",
            ));
        }
        if self.tracker_polls == 0 {
            return Err(TorrentError::invalid_input(
                "tracker_polls must be at least 1",
            ));
        }
        Ok(())
    }
}
