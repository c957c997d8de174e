//! Acquiring a resource from its swarm.
//!
//! Each round starts from a fresh tracker poll. Availability is queried from
//! every peer, then one task per missing chunk walks an ordered list of
//! candidate peers until a payload verifies. Chunks that no candidate could
//! deliver are retried in the next round.

use std::{
    collections::BTreeSet,
    io,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use tinytorrent_api::{RemotePeer, Tracker};
use tinytorrent_primitives::{ChunkIndex, HashValue, PeerEndpoint, TorrentDescriptor};
use tokio::{sync::Semaphore, task::JoinSet, time::timeout};
use tracing::{debug, error, info, warn};

use crate::{Peer, TorrentError, TorrentResult, peer::PeerInner};

/// A peer reachable in the current round.
struct Candidate {
    endpoint: PeerEndpoint,
    handle: Arc<dyn RemotePeer>,
    /// `None` when the availability query failed or timed out.
    available: Option<BTreeSet<ChunkIndex>>,
}

impl Candidate {
    fn responsive(&self) -> bool {
        self.available.is_some()
    }

    fn advertises(&self, index: ChunkIndex) -> bool {
        self.available
            .as_ref()
            .is_some_and(|chunks| chunks.contains(&index))
    }
}

/// Outcome of one leech attempt against one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    /// Payload matched the expected hash and was stored.
    Verified,
    /// Payload did not match.
    Rejected,
    /// Chunk not available, transport error or timeout.
    Unavailable,
}

/// Shared inputs of one round's chunk tasks.
struct Round {
    resource: HashValue,
    resource_name: String,
    chunk_hashes: Vec<HashValue>,
    limiter: Arc<Semaphore>,
    request_timeout: Duration,
}

impl Peer {
    /// Read the descriptor at `path` and acquire its resource.
    pub async fn acquire_from_path(&self, path: impl AsRef<Path>) -> TorrentResult<PathBuf> {
        let descriptor = TorrentDescriptor::read_from_path(path)?;
        self.acquire(&descriptor).await
    }

    /// Download, verify and assemble the resource `descriptor` describes.
    ///
    /// Chunks become servable as soon as they verify. On success the resource
    /// lives at `<shared>/<resourceName>` and the peer is registered as a
    /// seeder. Dropping the returned future aborts all outstanding requests.
    pub async fn acquire(&self, descriptor: &TorrentDescriptor) -> TorrentResult<PathBuf> {
        let resource = descriptor.resource_hash().clone();
        self.inner.store.resource_path(descriptor.resource_name())?;

        self.inner.state.open(descriptor);
        let adopted = {
            let descriptor = descriptor.clone();
            self.blocking(move |inner| inner.adopt_stored_chunks(&descriptor))
                .await?
        };
        if adopted > 0 {
            info!(%resource, adopted, "adopted chunks from an earlier run");
        }

        let tracker = self
            .inner
            .trackers
            .connect(descriptor.tracker_endpoint())
            .await?;

        let mut missing = self.missing(descriptor);
        let mut announced = false;
        let polls = self.inner.config.tracker_polls;

        for poll in 1..=polls {
            if missing.is_empty() {
                break;
            }

            let peers = self.swarm(tracker.as_ref(), &resource).await?;
            if peers.is_empty() {
                if poll == 1 {
                    return Err(TorrentError::SwarmEmpty { resource });
                }
                debug!(%resource, poll, "swarm currently empty");
            } else {
                info!(%resource, poll, peers = peers.len(), missing = missing.len(), "retrieval round");
                self.retrieval_round(descriptor, tracker.as_ref(), peers, &missing, &mut announced)
                    .await?;
                missing = self.missing(descriptor);
            }

            if !missing.is_empty() && poll < polls {
                tokio::time::sleep(self.inner.config.retry_delay()).await;
            }
        }

        if !missing.is_empty() {
            warn!(%resource, missing = missing.len(), "giving up on resource");
            return Err(TorrentError::ResourceUnreachable { resource, missing });
        }

        let path = {
            let name = descriptor.resource_name().to_string();
            let count = descriptor.chunk_count();
            let expected = resource.clone();
            self.blocking(move |inner| inner.store.assemble(&name, count, &expected))
                .await
                .inspect_err(|e| {
                    if let TorrentError::CorruptAssembly { expected, actual } = e {
                        error!(%expected, %actual, "assembled resource failed verification");
                    }
                })?
        };

        tracker.register(&resource, self.endpoint()).await?;
        info!(%resource, path = %path.display(), "acquired");
        Ok(path)
    }

    fn missing(&self, descriptor: &TorrentDescriptor) -> Vec<ChunkIndex> {
        let held = self.inner.state.held(descriptor.resource_hash());
        (0..descriptor.chunk_count())
            .filter(|index| !held.contains(index))
            .collect()
    }

    /// Current swarm without ourselves.
    async fn swarm(
        &self,
        tracker: &dyn Tracker,
        resource: &HashValue,
    ) -> TorrentResult<Vec<PeerEndpoint>> {
        let peers = tracker.find_clients(resource).await?;
        Ok(peers
            .into_iter()
            .filter(|peer| peer != self.endpoint())
            .collect())
    }

    async fn retrieval_round(
        &self,
        descriptor: &TorrentDescriptor,
        tracker: &dyn Tracker,
        peers: Vec<PeerEndpoint>,
        missing: &[ChunkIndex],
        announced: &mut bool,
    ) -> TorrentResult<()> {
        let config = &self.inner.config;
        let round = Arc::new(Round {
            resource: descriptor.resource_hash().clone(),
            resource_name: descriptor.resource_name().to_string(),
            chunk_hashes: descriptor.chunk_hashes().to_vec(),
            limiter: Arc::new(Semaphore::new(config.max_concurrent_requests)),
            request_timeout: config.request_timeout(),
        });

        let candidates = self.discover(&round, peers).await;
        if candidates.is_empty() {
            warn!(resource = %round.resource, "no peer reachable this round");
            return Ok(());
        }

        let mut tasks = JoinSet::new();
        for &index in missing {
            let order = candidate_order(&candidates, index);
            let inner = self.inner.clone();
            let round = round.clone();
            tasks.spawn(async move { fetch_chunk(inner, round, index, order).await });
        }

        let mut retrieved = 0usize;
        while let Some(joined) = tasks.join_next().await {
            let fetched = match joined {
                Ok(fetched) => fetched?,
                Err(e) => {
                    error!(resource = %round.resource, error = %e, "chunk task failed");
                    continue;
                }
            };
            let Some(index) = fetched else {
                continue;
            };
            retrieved += 1;
            if config.announce_partial && !*announced {
                tracker.register(&round.resource, self.endpoint()).await?;
                *announced = true;
                debug!(resource = %round.resource, index, "announced as partial provider");
            }
        }

        debug!(
            resource = %round.resource,
            retrieved,
            requested = missing.len(),
            "round finished"
        );
        Ok(())
    }

    /// Connect to every peer and query its availability concurrently.
    ///
    /// Unreachable peers are dropped; peers whose availability query fails
    /// are kept but tried last.
    async fn discover(&self, round: &Arc<Round>, peers: Vec<PeerEndpoint>) -> Vec<Arc<Candidate>> {
        let mut tasks = JoinSet::new();
        for endpoint in peers {
            let connector = self.inner.peers.clone();
            let round = round.clone();
            tasks.spawn(async move {
                let Ok(_permit) = round.limiter.acquire().await else {
                    return None;
                };
                let handle = match timeout(round.request_timeout, connector.connect(&endpoint)).await
                {
                    Ok(Ok(handle)) => handle,
                    Ok(Err(e)) => {
                        warn!(peer = %endpoint, error = %e, "peer unreachable");
                        return None;
                    }
                    Err(_) => {
                        warn!(peer = %endpoint, "connect timed out");
                        return None;
                    }
                };
                let available = match timeout(
                    round.request_timeout,
                    handle.find_available_chunks(&round.resource),
                )
                .await
                {
                    Ok(Ok(chunks)) => Some(chunks),
                    Ok(Err(e)) => {
                        warn!(peer = %endpoint, error = %e, "availability query failed");
                        None
                    }
                    Err(_) => {
                        warn!(peer = %endpoint, "availability query timed out");
                        None
                    }
                };
                Some(Arc::new(Candidate {
                    endpoint,
                    handle,
                    available,
                }))
            });
        }

        let mut candidates: Vec<Arc<Candidate>> =
            tasks.join_all().await.into_iter().flatten().collect();
        candidates.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        candidates
    }
}

impl PeerInner {
    /// Mark chunk files left by an earlier run as held if they still verify.
    fn adopt_stored_chunks(&self, descriptor: &TorrentDescriptor) -> TorrentResult<usize> {
        let resource = descriptor.resource_hash();
        let mut adopted = 0;
        for (index, expected) in (0..).zip(descriptor.chunk_hashes()) {
            if self.state.is_held(resource, index) {
                continue;
            }
            if self
                .store
                .read_verified(descriptor.resource_name(), index, expected)?
                .is_some()
                && self.state.mark_held(resource, index)
            {
                adopted += 1;
            }
        }
        Ok(adopted)
    }
}

/// Candidates for `index`: advertisers first, then other responsive peers,
/// then unresponsive ones. Each group is rotated by `index` so parallel
/// tasks start on different peers.
fn candidate_order(candidates: &[Arc<Candidate>], index: ChunkIndex) -> Vec<Arc<Candidate>> {
    let group = |keep: &dyn Fn(&Arc<Candidate>) -> bool| {
        let mut members: Vec<Arc<Candidate>> =
            candidates.iter().filter(|c| keep(*c)).cloned().collect();
        if !members.is_empty() {
            let shift = index as usize % members.len();
            members.rotate_left(shift);
        }
        members
    };

    let mut order = group(&|c| c.advertises(index));
    order.extend(group(&|c| c.responsive() && !c.advertises(index)));
    order.extend(group(&|c| !c.responsive()));
    order
}

/// Try candidates in order until one delivers a verified chunk.
///
/// Returns the index once the chunk is stored and held, `None` when every
/// candidate failed. Only local storage failures are errors.
async fn fetch_chunk(
    inner: Arc<PeerInner>,
    round: Arc<Round>,
    index: ChunkIndex,
    order: Vec<Arc<Candidate>>,
) -> TorrentResult<Option<ChunkIndex>> {
    let Some(expected) = round.chunk_hashes.get(index as usize) else {
        return Ok(None);
    };
    let resource = &round.resource;

    // Each candidate appears once, so a failed peer is not retried this round.
    for candidate in order {
        if inner.state.is_held(resource, index) {
            return Ok(Some(index));
        }
        let peer = &candidate.endpoint;

        let response = {
            let Ok(_permit) = round.limiter.acquire().await else {
                return Ok(None);
            };
            timeout(round.request_timeout, candidate.handle.leech(resource, index)).await
        };

        let attempt = match response {
            Ok(Ok(chunk)) if chunk.index() == index && chunk.verify(expected) => {
                let writer = inner.clone();
                let name = round.resource_name.clone();
                tokio::task::spawn_blocking(move || writer.store.write_chunk(&name, &chunk))
                    .await
                    .map_err(|e| TorrentError::io(inner.store.root(), io::Error::other(e)))??;
                inner.state.mark_held(resource, index);
                Attempt::Verified
            }
            Ok(Ok(chunk)) => {
                warn!(%resource, index, %peer, actual = %chunk.hash(), "rejected chunk");
                Attempt::Rejected
            }
            Ok(Err(e)) => {
                debug!(%resource, index, %peer, error = %e, "chunk unavailable");
                Attempt::Unavailable
            }
            Err(_) => {
                warn!(%resource, index, %peer, "leech timed out");
                Attempt::Unavailable
            }
        };

        if attempt == Attempt::Verified {
            debug!(%resource, index, %peer, "chunk verified");
            return Ok(Some(index));
        }
    }

    debug!(%resource, index, "no candidate delivered chunk this round");
    Ok(None)
}
