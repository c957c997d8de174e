//! Remote peers that misbehave in specific ways.

use std::{
    collections::BTreeSet,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use tinytorrent_api::{RemotePeer, RemotePeerError, RemotePeerResult};
use tinytorrent_primitives::{Chunk, ChunkIndex, HashValue};

/// Serves the inner peer's chunks with one bit flipped.
pub struct CorruptingPeer {
    inner: Arc<dyn RemotePeer>,
    leeches: AtomicUsize,
}

impl CorruptingPeer {
    pub fn new(inner: Arc<dyn RemotePeer>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            leeches: AtomicUsize::new(0),
        })
    }

    /// Number of leech calls answered so far.
    pub fn leeches(&self) -> usize {
        self.leeches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RemotePeer for CorruptingPeer {
    async fn leech(&self, resource: &HashValue, index: ChunkIndex) -> RemotePeerResult<Chunk> {
        self.leeches.fetch_add(1, Ordering::Relaxed);
        let (name, index, mut payload) = self.inner.leech(resource, index).await?.into_parts();
        match payload.first_mut() {
            Some(byte) => *byte ^= 0x01,
            None => payload.push(0),
        }
        Ok(Chunk::from_parts(name, index, payload))
    }

    async fn find_available_chunks(
        &self,
        resource: &HashValue,
    ) -> RemotePeerResult<BTreeSet<ChunkIndex>> {
        self.inner.find_available_chunks(resource).await
    }

    async fn identifier(&self) -> RemotePeerResult<String> {
        self.inner.identifier().await
    }
}

/// Advertises `chunks` but never answers a leech.
pub struct SilentPeer {
    identifier: String,
    chunks: BTreeSet<ChunkIndex>,
}

impl SilentPeer {
    pub fn new(identifier: impl Into<String>, chunks: BTreeSet<ChunkIndex>) -> Arc<Self> {
        Arc::new(Self {
            identifier: identifier.into(),
            chunks,
        })
    }
}

#[async_trait]
impl RemotePeer for SilentPeer {
    async fn leech(&self, _resource: &HashValue, _index: ChunkIndex) -> RemotePeerResult<Chunk> {
        futures::future::pending().await
    }

    async fn find_available_chunks(
        &self,
        _resource: &HashValue,
    ) -> RemotePeerResult<BTreeSet<ChunkIndex>> {
        Ok(self.chunks.clone())
    }

    async fn identifier(&self) -> RemotePeerResult<String> {
        Ok(self.identifier.clone())
    }
}

/// Fails every call with a transport error.
pub struct FailingPeer {
    calls: AtomicUsize,
}

impl FailingPeer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    fn fail<T>(&self) -> RemotePeerResult<T> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Err(RemotePeerError::transport("connection reset"))
    }
}

#[async_trait]
impl RemotePeer for FailingPeer {
    async fn leech(&self, _resource: &HashValue, _index: ChunkIndex) -> RemotePeerResult<Chunk> {
        self.fail()
    }

    async fn find_available_chunks(
        &self,
        _resource: &HashValue,
    ) -> RemotePeerResult<BTreeSet<ChunkIndex>> {
        self.fail()
    }

    async fn identifier(&self) -> RemotePeerResult<String> {
        self.fail()
    }
}

/// Serves only `chunks` of the inner peer.
pub struct PartialPeer {
    inner: Arc<dyn RemotePeer>,
    chunks: BTreeSet<ChunkIndex>,
}

impl PartialPeer {
    pub fn new(inner: Arc<dyn RemotePeer>, chunks: BTreeSet<ChunkIndex>) -> Arc<Self> {
        Arc::new(Self { inner, chunks })
    }
}

#[async_trait]
impl RemotePeer for PartialPeer {
    async fn leech(&self, resource: &HashValue, index: ChunkIndex) -> RemotePeerResult<Chunk> {
        if !self.chunks.contains(&index) {
            return Err(RemotePeerError::ChunkNotAvailable {
                resource: resource.clone(),
                index,
            });
        }
        self.inner.leech(resource, index).await
    }

    async fn find_available_chunks(
        &self,
        resource: &HashValue,
    ) -> RemotePeerResult<BTreeSet<ChunkIndex>> {
        let available = self.inner.find_available_chunks(resource).await?;
        Ok(available.intersection(&self.chunks).copied().collect())
    }

    async fn identifier(&self) -> RemotePeerResult<String> {
        self.inner.identifier().await
    }
}

/// Forwards to the inner peer after `delay`, recording how many calls were
/// in flight at once.
pub struct CountingPeer {
    inner: Arc<dyn RemotePeer>,
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl CountingPeer {
    pub fn new(inner: Arc<dyn RemotePeer>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner,
            delay,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        })
    }

    /// Highest number of concurrent calls observed.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn counted<T>(&self, call: impl Future<Output = T>) -> T {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        let result = call.await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[async_trait]
impl RemotePeer for CountingPeer {
    async fn leech(&self, resource: &HashValue, index: ChunkIndex) -> RemotePeerResult<Chunk> {
        self.counted(self.inner.leech(resource, index)).await
    }

    async fn find_available_chunks(
        &self,
        resource: &HashValue,
    ) -> RemotePeerResult<BTreeSet<ChunkIndex>> {
        self.counted(self.inner.find_available_chunks(resource)).await
    }

    async fn identifier(&self) -> RemotePeerResult<String> {
        self.inner.identifier().await
    }
}
