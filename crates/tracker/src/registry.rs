//! Resource → swarm membership registry.

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tinytorrent_api::{Tracker, TrackerResult};
use tinytorrent_primitives::{HashValue, PeerEndpoint};
use tracing::debug;

type Swarm = Arc<Mutex<HashSet<PeerEndpoint>>>;

/// Counters reported for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Resources ever registered, including those with an empty swarm.
    pub resources: usize,
    /// Total (resource, peer) registrations currently held.
    pub registrations: usize,
}

/// Resource → peer set registry.
///
/// The outer map lock is held only to find or create a resource's entry.
/// Each swarm is then mutated under its own mutex, so traffic on one resource
/// never blocks another. Reads return snapshot copies.
///
/// Resources stay listed after their last peer unregisters.
#[derive(Debug, Default)]
pub struct SwarmRegistry {
    swarms: RwLock<HashMap<HashValue, Swarm>>,
}

impl SwarmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn swarm(&self, resource: &HashValue) -> Option<Swarm> {
        self.swarms.read().get(resource).cloned()
    }

    fn swarm_or_create(&self, resource: &HashValue) -> Swarm {
        if let Some(swarm) = self.swarm(resource) {
            return swarm;
        }
        self.swarms
            .write()
            .entry(resource.clone())
            .or_default()
            .clone()
    }

    /// Add `peer` to the swarm of `resource`. Returns `false` if already present.
    pub fn register(&self, resource: &HashValue, peer: &PeerEndpoint) -> bool {
        let added = self.swarm_or_create(resource).lock().insert(peer.clone());
        debug!(%resource, %peer, added, "register");
        added
    }

    /// Remove `peer` from the swarm of `resource`. Returns `false` if it was absent.
    pub fn unregister(&self, resource: &HashValue, peer: &PeerEndpoint) -> bool {
        let removed = self
            .swarm(resource)
            .is_some_and(|swarm| swarm.lock().remove(peer));
        debug!(%resource, %peer, removed, "unregister");
        removed
    }

    /// Every resource ever registered.
    pub fn list_resources(&self) -> BTreeSet<HashValue> {
        self.swarms.read().keys().cloned().collect()
    }

    /// Resources `peer` is currently registered for.
    pub fn list_resources_for(&self, peer: &PeerEndpoint) -> BTreeSet<HashValue> {
        self.entries()
            .into_iter()
            .filter(|(_, swarm)| swarm.lock().contains(peer))
            .map(|(resource, _)| resource)
            .collect()
    }

    /// Snapshot of the swarm for `resource`; empty when unknown.
    pub fn list_peers(&self, resource: &HashValue) -> BTreeSet<PeerEndpoint> {
        self.swarm(resource)
            .map(|swarm| swarm.lock().iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn stats(&self) -> RegistryStats {
        let entries = self.entries();
        RegistryStats {
            resources: entries.len(),
            registrations: entries.iter().map(|(_, swarm)| swarm.lock().len()).sum(),
        }
    }

    /// Copy of the outer map so per-resource locks are taken without the map lock.
    fn entries(&self) -> Vec<(HashValue, Swarm)> {
        self.swarms
            .read()
            .iter()
            .map(|(resource, swarm)| (resource.clone(), swarm.clone()))
            .collect()
    }
}

#[async_trait]
impl Tracker for SwarmRegistry {
    async fn register(&self, resource: &HashValue, peer: &PeerEndpoint) -> TrackerResult<()> {
        SwarmRegistry::register(self, resource, peer);
        Ok(())
    }

    async fn unregister(&self, resource: &HashValue, peer: &PeerEndpoint) -> TrackerResult<()> {
        SwarmRegistry::unregister(self, resource, peer);
        Ok(())
    }

    async fn find_resource_hash_values(&self) -> TrackerResult<BTreeSet<HashValue>> {
        Ok(self.list_resources())
    }

    async fn find_resource_hash_values_for(
        &self,
        peer: &PeerEndpoint,
    ) -> TrackerResult<BTreeSet<HashValue>> {
        Ok(self.list_resources_for(peer))
    }

    async fn find_clients(&self, resource: &HashValue) -> TrackerResult<BTreeSet<PeerEndpoint>> {
        Ok(self.list_peers(resource))
    }
}
