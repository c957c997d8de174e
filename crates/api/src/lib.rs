//! TinyTorrent API - the two remote surfaces of a swarm.
//!
//! # Core Concepts
//!
//! - [`Tracker`] - swarm membership: who holds which resource
//! - [`RemotePeer`] - chunk exchange with one peer
//! - [`PeerConnector`] / [`TrackerConnector`] - turn an address into a handle
//!
//! Implementations live elsewhere: the registry in `tinytorrent-tracker`, the
//! local peer in `tinytorrent-peer`, and the TCP clients in
//! `tinytorrent-transport`. Nothing here knows how calls travel.

mod error;

use std::{collections::BTreeSet, sync::Arc};

use async_trait::async_trait;
use tinytorrent_primitives::{Chunk, ChunkIndex, HashValue, PeerEndpoint};

pub use error::*;

/// Swarm membership registry as seen by peers.
#[async_trait]
pub trait Tracker: Send + Sync {
    /// Record that `peer` participates in the swarm for `resource`.
    ///
    /// Registering the same pair twice has no further effect.
    async fn register(&self, resource: &HashValue, peer: &PeerEndpoint) -> TrackerResult<()>;

    /// Remove `peer` from the swarm for `resource`. Unknown pairs are ignored.
    async fn unregister(&self, resource: &HashValue, peer: &PeerEndpoint) -> TrackerResult<()>;

    /// Every resource the tracker has seen.
    async fn find_resource_hash_values(&self) -> TrackerResult<BTreeSet<HashValue>>;

    /// Resources `peer` is currently registered for.
    async fn find_resource_hash_values_for(
        &self,
        peer: &PeerEndpoint,
    ) -> TrackerResult<BTreeSet<HashValue>>;

    /// Current swarm for `resource`; empty when the resource is unknown.
    async fn find_clients(&self, resource: &HashValue) -> TrackerResult<BTreeSet<PeerEndpoint>>;
}

/// Chunk exchange with a single peer.
#[async_trait]
pub trait RemotePeer: Send + Sync {
    /// Fetch chunk `index` of `resource`.
    ///
    /// Fails with [`RemotePeerError::ChunkNotAvailable`] when the peer does not
    /// hold it.
    async fn leech(&self, resource: &HashValue, index: ChunkIndex) -> RemotePeerResult<Chunk>;

    /// Indices of `resource` the peer can serve right now. Possibly empty.
    async fn find_available_chunks(
        &self,
        resource: &HashValue,
    ) -> RemotePeerResult<BTreeSet<ChunkIndex>>;

    /// The peer's swarm identifier.
    async fn identifier(&self) -> RemotePeerResult<String>;
}

/// Resolves a peer endpoint to a callable handle.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    async fn connect(&self, endpoint: &PeerEndpoint) -> RemotePeerResult<Arc<dyn RemotePeer>>;
}

/// Resolves a tracker endpoint string to a callable handle.
#[async_trait]
pub trait TrackerConnector: Send + Sync {
    async fn connect(&self, tracker_endpoint: &str) -> TrackerResult<Arc<dyn Tracker>>;
}
