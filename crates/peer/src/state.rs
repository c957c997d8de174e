//! What this peer holds and can serve.

use std::collections::{BTreeSet, HashMap};

use parking_lot::RwLock;
use tinytorrent_primitives::{ChunkIndex, HashValue, TorrentDescriptor};

/// A resource this peer participates in.
#[derive(Debug, Clone)]
struct SharedResource {
    name: String,
    tracker_endpoint: String,
    chunk_hashes: Vec<HashValue>,
    held: BTreeSet<ChunkIndex>,
}

/// Lookup result for serving a held chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HeldChunk {
    pub(crate) resource_name: String,
    pub(crate) expected: HashValue,
}

/// Per-peer record of resources and held chunk indices.
///
/// Held sets only grow, except through [`LocalShareState::release`] for a
/// chunk found corrupt on disk and [`LocalShareState::forget`].
#[derive(Debug, Default)]
pub struct LocalShareState {
    resources: RwLock<HashMap<HashValue, SharedResource>>,
}

impl LocalShareState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking the resource `descriptor` describes. Returns `false` if
    /// it was already known, in which case the existing entry is kept.
    pub fn open(&self, descriptor: &TorrentDescriptor) -> bool {
        let mut resources = self.resources.write();
        if resources.contains_key(descriptor.resource_hash()) {
            return false;
        }
        resources.insert(
            descriptor.resource_hash().clone(),
            SharedResource {
                name: descriptor.resource_name().to_string(),
                tracker_endpoint: descriptor.tracker_endpoint().to_string(),
                chunk_hashes: descriptor.chunk_hashes().to_vec(),
                held: BTreeSet::new(),
            },
        );
        true
    }

    /// Record `index` as held. Unknown resources and out-of-range indices are
    /// ignored and return `false`.
    pub fn mark_held(&self, resource: &HashValue, index: ChunkIndex) -> bool {
        let mut resources = self.resources.write();
        match resources.get_mut(resource) {
            Some(entry) if (index as usize) < entry.chunk_hashes.len() => entry.held.insert(index),
            _ => false,
        }
    }

    /// Stop advertising a chunk whose stored copy went bad.
    pub(crate) fn release(&self, resource: &HashValue, index: ChunkIndex) {
        if let Some(entry) = self.resources.write().get_mut(resource) {
            entry.held.remove(&index);
        }
    }

    /// Snapshot of held indices; empty when the resource is unknown.
    pub fn held(&self, resource: &HashValue) -> BTreeSet<ChunkIndex> {
        self.resources
            .read()
            .get(resource)
            .map(|entry| entry.held.clone())
            .unwrap_or_default()
    }

    pub fn is_held(&self, resource: &HashValue, index: ChunkIndex) -> bool {
        self.resources
            .read()
            .get(resource)
            .is_some_and(|entry| entry.held.contains(&index))
    }

    /// Name and expected hash of a held chunk.
    pub(crate) fn held_chunk(&self, resource: &HashValue, index: ChunkIndex) -> Option<HeldChunk> {
        let resources = self.resources.read();
        let entry = resources.get(resource)?;
        if !entry.held.contains(&index) {
            return None;
        }
        Some(HeldChunk {
            resource_name: entry.name.clone(),
            expected: entry.chunk_hashes.get(index as usize)?.clone(),
        })
    }

    /// Tracker the resource was announced through.
    pub fn tracker_endpoint(&self, resource: &HashValue) -> Option<String> {
        self.resources
            .read()
            .get(resource)
            .map(|entry| entry.tracker_endpoint.clone())
    }

    /// Whether every chunk of `resource` is held.
    pub fn is_complete(&self, resource: &HashValue) -> bool {
        self.resources
            .read()
            .get(resource)
            .is_some_and(|entry| entry.held.len() == entry.chunk_hashes.len())
    }

    /// Drop `resource`. Returns `false` if it was unknown.
    pub fn forget(&self, resource: &HashValue) -> bool {
        self.resources.write().remove(resource).is_some()
    }

    pub fn resources(&self) -> BTreeSet<HashValue> {
        self.resources.read().keys().cloned().collect()
    }
}
