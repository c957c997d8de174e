//! The local peer: publishes resources and serves held chunks.

use std::{
    collections::BTreeSet,
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use tinytorrent_api::{
    PeerConnector, RemotePeer, RemotePeerError, RemotePeerResult, TrackerConnector,
};
use tinytorrent_primitives::{
    Chunk, ChunkIndex, HashValue, PeerEndpoint, StreamHasher, TorrentDescriptor, split,
};
use tracing::{debug, error, info, warn};

use crate::{ChunkStore, LocalShareState, PeerConfig, TorrentError, TorrentResult};

pub(crate) struct PeerInner {
    pub(crate) endpoint: PeerEndpoint,
    pub(crate) config: PeerConfig,
    pub(crate) store: ChunkStore,
    pub(crate) state: LocalShareState,
    pub(crate) peers: Arc<dyn PeerConnector>,
    pub(crate) trackers: Arc<dyn TrackerConnector>,
}

/// A swarm participant.
///
/// Cloning is cheap; clones share state, so one clone can serve remote
/// requests while another acquires.
#[derive(Clone)]
pub struct Peer {
    pub(crate) inner: Arc<PeerInner>,
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("endpoint", &self.inner.endpoint)
            .field("shared_dir", &self.inner.store.root())
            .finish_non_exhaustive()
    }
}

impl Peer {
    /// Create a peer serving from `shared_dir`, which is created if missing.
    pub fn new(
        endpoint: PeerEndpoint,
        shared_dir: impl Into<PathBuf>,
        config: PeerConfig,
        peers: Arc<dyn PeerConnector>,
        trackers: Arc<dyn TrackerConnector>,
    ) -> TorrentResult<Self> {
        config.validate()?;
        let store = ChunkStore::open(shared_dir)?;
        Ok(Self {
            inner: Arc::new(PeerInner {
                endpoint,
                config,
                store,
                state: LocalShareState::new(),
                peers,
                trackers,
            }),
        })
    }

    pub fn endpoint(&self) -> &PeerEndpoint {
        &self.inner.endpoint
    }

    pub fn config(&self) -> &PeerConfig {
        &self.inner.config
    }

    pub fn shared_dir(&self) -> &Path {
        self.inner.store.root()
    }

    pub fn state(&self) -> &LocalShareState {
        &self.inner.state
    }

    /// Run blocking file work off the async workers.
    pub(crate) async fn blocking<T, F>(&self, work: F) -> TorrentResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&PeerInner) -> TorrentResult<T> + Send + 'static,
    {
        let inner = self.inner.clone();
        let root = self.shared_dir().to_path_buf();
        tokio::task::spawn_blocking(move || work(&inner))
            .await
            .map_err(|e| TorrentError::io(root, io::Error::other(e)))?
    }

    /// Make the file at `path` available to the swarm behind `tracker_endpoint`.
    ///
    /// Chunks and the descriptor are written into the shared directory, every
    /// chunk is marked held, and only then is the peer registered with the
    /// tracker. Returns the descriptor path.
    ///
    /// If registration fails, a resource this call started tracking is
    /// dropped again so nothing is advertised.
    pub async fn publish(
        &self,
        path: impl AsRef<Path>,
        tracker_endpoint: &str,
    ) -> TorrentResult<PathBuf> {
        let path = path.as_ref().to_path_buf();
        let endpoint = tracker_endpoint.to_string();
        let (descriptor, descriptor_path, opened) = self
            .blocking(move |inner| inner.prepare_publish(&path, endpoint))
            .await?;

        let resource = descriptor.resource_hash();
        let registered = async {
            let tracker = self.inner.trackers.connect(tracker_endpoint).await?;
            tracker.register(resource, self.endpoint()).await
        }
        .await;
        if let Err(e) = registered {
            if opened {
                self.inner.state.forget(resource);
            }
            warn!(%resource, tracker = tracker_endpoint, error = %e, "registration failed, publish aborted");
            return Err(e.into());
        }

        info!(
            %resource,
            name = descriptor.resource_name(),
            chunks = descriptor.chunk_count(),
            descriptor = %descriptor_path.display(),
            "published"
        );
        Ok(descriptor_path)
    }

    /// Stop sharing `resource` and leave its swarm.
    ///
    /// Returns `false` if the resource was not shared. Files in the shared
    /// directory are left alone.
    pub async fn withdraw(&self, resource: &HashValue) -> TorrentResult<bool> {
        let Some(tracker_endpoint) = self.inner.state.tracker_endpoint(resource) else {
            return Ok(false);
        };

        // Forget only once the tracker has dropped us.
        let tracker = self.inner.trackers.connect(&tracker_endpoint).await?;
        tracker.unregister(resource, self.endpoint()).await?;
        self.inner.state.forget(resource);
        info!(%resource, "withdrawn");
        Ok(true)
    }

    /// Withdraw every shared resource.
    ///
    /// All resources are attempted; the first failure is returned.
    pub async fn shutdown(&self) -> TorrentResult<()> {
        let mut first_error = None;
        for resource in self.inner.state.resources() {
            if let Err(e) = self.withdraw(&resource).await {
                warn!(%resource, error = %e, "withdraw failed during shutdown");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl PeerInner {
    fn prepare_publish(
        &self,
        path: &Path,
        tracker_endpoint: String,
    ) -> TorrentResult<(TorrentDescriptor, PathBuf, bool)> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                TorrentError::invalid_input(format!("{} has no file name", path.display()))
            })?;
        // Validates the name before anything is written.
        self.store.resource_path(&name)?;

        // One pass: the resource hash is built from the same bytes the chunks hold.
        let mut hasher = StreamHasher::new();
        let mut chunk_hashes = Vec::new();
        for chunk in split(path, self.config.max_chunk_size).map_err(|e| TorrentError::io(path, e))? {
            let chunk = chunk.map_err(|e| TorrentError::io(path, e))?;
            hasher.update(chunk.payload());
            chunk_hashes.push(chunk.hash());
            self.store.write_chunk(&name, &chunk)?;
            debug!(%name, index = chunk.index(), len = chunk.len(), "stored chunk");
        }

        let descriptor =
            TorrentDescriptor::new(tracker_endpoint, name, hasher.finish(), chunk_hashes);
        let descriptor_path = self.store.write_descriptor(&descriptor)?;

        let resource = descriptor.resource_hash();
        let opened = self.state.open(&descriptor);
        for index in 0..descriptor.chunk_count() {
            self.state.mark_held(resource, index);
        }
        Ok((descriptor, descriptor_path, opened))
    }

    /// Re-read and verify a held chunk for serving.
    fn serve_chunk(&self, resource: &HashValue, index: ChunkIndex) -> RemotePeerResult<Chunk> {
        let not_available = || RemotePeerError::ChunkNotAvailable {
            resource: resource.clone(),
            index,
        };
        let held = self.state.held_chunk(resource, index).ok_or_else(not_available)?;

        match self.store.read_verified(&held.resource_name, index, &held.expected) {
            Ok(Some(chunk)) => Ok(chunk),
            Ok(None) => {
                error!(%resource, index, "stored chunk missing or corrupt, no longer serving it");
                self.state.release(resource, index);
                Err(not_available())
            }
            Err(e) => {
                error!(%resource, index, error = %e, "failed to read stored chunk");
                Err(not_available())
            }
        }
    }
}

#[async_trait]
impl RemotePeer for Peer {
    async fn leech(&self, resource: &HashValue, index: ChunkIndex) -> RemotePeerResult<Chunk> {
        let inner = self.inner.clone();
        let requested = resource.clone();
        let result = tokio::task::spawn_blocking(move || inner.serve_chunk(&requested, index))
            .await
            .unwrap_or_else(|e| {
                error!(%resource, index, error = %e, "chunk read task failed");
                Err(RemotePeerError::ChunkNotAvailable {
                    resource: resource.clone(),
                    index,
                })
            });
        debug!(%resource, index, served = result.is_ok(), "leech");
        result
    }

    async fn find_available_chunks(
        &self,
        resource: &HashValue,
    ) -> RemotePeerResult<BTreeSet<ChunkIndex>> {
        Ok(self.inner.state.held(resource))
    }

    async fn identifier(&self) -> RemotePeerResult<String> {
        Ok(self.inner.endpoint.identifier().to_string())
    }
}
