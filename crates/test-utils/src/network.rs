use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use parking_lot::RwLock;
use tinytorrent_api::{
    PeerConnector, RemotePeer, RemotePeerError, RemotePeerResult, Tracker, TrackerConnector,
    TrackerError, TrackerResult,
};
use tinytorrent_primitives::PeerEndpoint;
use tinytorrent_tracker::SwarmRegistry;

/// Connectors backed by in-memory maps.
///
/// Peers removed from the map become unreachable, which is how tests take a
/// peer offline.
#[derive(Default)]
pub struct InProcessNetwork {
    peers: RwLock<HashMap<PeerEndpoint, Arc<dyn RemotePeer>>>,
    trackers: RwLock<HashMap<String, Arc<dyn Tracker>>>,
}

impl InProcessNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Start a registry reachable at `endpoint`.
    pub fn add_registry(&self, endpoint: &str) -> Arc<SwarmRegistry> {
        let registry = Arc::new(SwarmRegistry::new());
        self.add_tracker(endpoint, registry.clone());
        registry
    }

    pub fn add_tracker(&self, endpoint: &str, tracker: Arc<dyn Tracker>) {
        self.trackers.write().insert(endpoint.to_string(), tracker);
    }

    /// Make `endpoint` unreachable as a tracker. The registry behind it is kept
    /// by whoever holds it and can be added back.
    pub fn remove_tracker(&self, endpoint: &str) {
        self.trackers.write().remove(endpoint);
    }

    pub fn add_peer(&self, endpoint: PeerEndpoint, peer: Arc<dyn RemotePeer>) {
        self.peers.write().insert(endpoint, peer);
    }

    pub fn remove_peer(&self, endpoint: &PeerEndpoint) {
        self.peers.write().remove(endpoint);
    }
}

#[async_trait]
impl PeerConnector for InProcessNetwork {
    async fn connect(&self, endpoint: &PeerEndpoint) -> RemotePeerResult<Arc<dyn RemotePeer>> {
        self.peers
            .read()
            .get(endpoint)
            .cloned()
            .ok_or_else(|| RemotePeerError::transport(format!("{endpoint} is unreachable")))
    }
}

#[async_trait]
impl TrackerConnector for InProcessNetwork {
    async fn connect(&self, tracker_endpoint: &str) -> TrackerResult<Arc<dyn Tracker>> {
        self.trackers
            .read()
            .get(tracker_endpoint)
            .cloned()
            .ok_or_else(|| TrackerError::transport(format!("{tracker_endpoint} is unreachable")))
    }
}
