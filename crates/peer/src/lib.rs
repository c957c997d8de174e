//! TinyTorrent peer.
//!
//! A [`Peer`] publishes local files into a swarm, acquires resources from
//! other peers, and serves every chunk it holds through its
//! [`RemotePeer`](tinytorrent_api::RemotePeer) implementation.
//!
//! Everything it shares lives flat in one shared directory managed by
//! [`ChunkStore`]; what it holds is tracked in [`LocalShareState`].

mod acquire;
mod config;
mod error;
mod peer;
mod state;
mod store;

pub use config::{DEFAULT_MAX_CHUNK_SIZE, MAX_CHUNK_SIZE_LIMIT, PeerConfig};
pub use error::{TorrentError, TorrentResult};
pub use peer::Peer;
pub use state::LocalShareState;
pub use store::ChunkStore;
