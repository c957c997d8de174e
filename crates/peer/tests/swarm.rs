//! Publish/acquire scenarios over the in-process network.

use std::{collections::BTreeSet, fs, path::PathBuf, sync::Arc, time::Duration};

use assert_matches::assert_matches;
use tempfile::TempDir;
use tinytorrent_api::{RemotePeer, RemotePeerError};
use tinytorrent_peer::{Peer, PeerConfig, TorrentError};
use tinytorrent_primitives::{TorrentDescriptor, chunk_file_name, hash_bytes};
use tinytorrent_test_utils::{
    CorruptingPeer, CountingPeer, FailingPeer, InProcessNetwork, PartialPeer, SilentPeer, TEST_TRACKER,
    peer_endpoint, random_bytes,
};
use tinytorrent_tracker::SwarmRegistry;

const MIB: usize = 1024 * 1024;

struct TestSwarm {
    dir: TempDir,
    network: Arc<InProcessNetwork>,
    registry: Arc<SwarmRegistry>,
}

impl TestSwarm {
    fn new() -> Self {
        let network = InProcessNetwork::new();
        let registry = network.add_registry(TEST_TRACKER);
        Self {
            dir: tempfile::tempdir().unwrap(),
            network,
            registry,
        }
    }

    /// Peer `n` with its own shared directory, reachable on the network.
    fn peer(&self, n: usize, config: PeerConfig) -> Peer {
        let peer = self.offline_peer(n, config);
        self.network
            .add_peer(peer.endpoint().clone(), Arc::new(peer.clone()));
        peer
    }

    fn offline_peer(&self, n: usize, config: PeerConfig) -> Peer {
        Peer::new(
            peer_endpoint(n),
            self.dir.path().join(format!("peer-{n}")),
            config,
            self.network.clone(),
            self.network.clone(),
        )
        .unwrap()
    }

    fn source_file(&self, name: &str, data: &[u8]) -> PathBuf {
        let sources = self.dir.path().join("sources");
        fs::create_dir_all(&sources).unwrap();
        let path = sources.join(name);
        fs::write(&path, data).unwrap();
        path
    }
}

fn small_chunks() -> PeerConfig {
    PeerConfig {
        max_chunk_size: 1024,
        request_timeout_ms: 500,
        tracker_polls: 2,
        retry_delay_ms: 10,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_end_to_end_two_and_a_half_mib() {
    let swarm = TestSwarm::new();
    let data = random_bytes(2 * MIB + MIB / 2, 1);
    let source = swarm.source_file("video.mp4", &data);

    let seed = swarm.peer(1, PeerConfig::default());
    let descriptor_path = seed.publish(&source, TEST_TRACKER).await.unwrap();
    assert_eq!(descriptor_path, seed.shared_dir().join("video.mp4.tinytorrent"));

    let descriptor = TorrentDescriptor::read_from_path(&descriptor_path).unwrap();
    assert_eq!(descriptor.chunk_count(), 3);
    assert_eq!(descriptor.resource_hash(), &hash_bytes(&data));
    assert_eq!(descriptor.tracker_endpoint(), TEST_TRACKER);
    let sizes: Vec<usize> = (0..3)
        .map(|i| {
            fs::read(seed.shared_dir().join(chunk_file_name("video.mp4", i)))
                .unwrap()
                .len()
        })
        .collect();
    assert_eq!(sizes, vec![MIB, MIB, MIB / 2]);

    let leecher = swarm.peer(2, PeerConfig::default());
    let path = leecher.acquire_from_path(&descriptor_path).await.unwrap();

    assert_eq!(path, leecher.shared_dir().join("video.mp4"));
    assert_eq!(fs::read(&path).unwrap(), data);
    assert_eq!(
        swarm.registry.list_peers(descriptor.resource_hash()),
        BTreeSet::from([peer_endpoint(1), peer_endpoint(2)])
    );
    assert_eq!(
        leecher
            .find_available_chunks(descriptor.resource_hash())
            .await
            .unwrap(),
        BTreeSet::from([0, 1, 2])
    );
}

#[tokio::test]
async fn test_publish_writes_artifacts_then_registers() {
    let swarm = TestSwarm::new();
    let data = random_bytes(2500, 2);
    let source = swarm.source_file("notes.txt", &data);
    let seed = swarm.peer(1, small_chunks());

    let descriptor_path = seed.publish(&source, TEST_TRACKER).await.unwrap();
    let descriptor = TorrentDescriptor::read_from_path(&descriptor_path).unwrap();
    let resource = descriptor.resource_hash();

    for (i, expected) in descriptor.chunk_hashes().iter().enumerate() {
        let payload = fs::read(seed.shared_dir().join(format!("notes.txt.chunk{i}"))).unwrap();
        assert_eq!(&hash_bytes(&payload), expected);
    }
    assert_eq!(seed.state().held(resource), BTreeSet::from([0, 1, 2]));
    assert_eq!(
        swarm.registry.list_resources_for(&peer_endpoint(1)),
        BTreeSet::from([resource.clone()])
    );
}

#[tokio::test]
async fn test_publish_fails_without_tracker() {
    let swarm = TestSwarm::new();
    let source = swarm.source_file("a.bin", &random_bytes(10, 3));
    let seed = swarm.peer(1, small_chunks());

    let err = seed.publish(&source, "nowhere:1").await.unwrap_err();
    assert_matches!(err, TorrentError::Tracker(_));
    assert!(swarm.registry.list_resources().is_empty());

    // Nothing of the aborted publish is advertised or served.
    let resource = hash_bytes(&random_bytes(10, 3));
    assert!(seed.state().resources().is_empty());
    assert!(seed.find_available_chunks(&resource).await.unwrap().is_empty());
    assert_matches!(
        seed.leech(&resource, 0).await,
        Err(RemotePeerError::ChunkNotAvailable { .. })
    );
    seed.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_failed_republish_keeps_earlier_share() {
    let swarm = TestSwarm::new();
    let source = swarm.source_file("a.bin", &random_bytes(3000, 3));
    let seed = swarm.peer(1, small_chunks());

    let descriptor_path = seed.publish(&source, TEST_TRACKER).await.unwrap();
    let descriptor = TorrentDescriptor::read_from_path(&descriptor_path).unwrap();

    assert_matches!(
        seed.publish(&source, "nowhere:1").await,
        Err(TorrentError::Tracker(_))
    );
    assert_eq!(
        seed.state().held(descriptor.resource_hash()),
        BTreeSet::from([0, 1, 2])
    );
}

#[tokio::test]
async fn test_publish_missing_file() {
    let swarm = TestSwarm::new();
    let seed = swarm.peer(1, small_chunks());

    let err = seed
        .publish(swarm.dir.path().join("absent.bin"), TEST_TRACKER)
        .await
        .unwrap_err();
    assert_matches!(err, TorrentError::Io { .. });
    assert!(swarm.registry.list_resources().is_empty());
}

#[tokio::test]
async fn test_empty_resource() {
    let swarm = TestSwarm::new();
    let source = swarm.source_file("empty", b"");
    let seed = swarm.peer(1, small_chunks());
    let descriptor_path = seed.publish(&source, TEST_TRACKER).await.unwrap();

    let descriptor = TorrentDescriptor::read_from_path(&descriptor_path).unwrap();
    assert_eq!(descriptor.chunk_count(), 0);

    let leecher = swarm.peer(2, small_chunks());
    let path = leecher.acquire(&descriptor).await.unwrap();
    assert_eq!(fs::read(path).unwrap(), b"");
}

#[tokio::test]
async fn test_swarm_empty() {
    let swarm = TestSwarm::new();
    let descriptor = TorrentDescriptor::new(
        TEST_TRACKER,
        "ghost.bin",
        hash_bytes(b"ghost"),
        vec![hash_bytes(b"ghost")],
    );
    let leecher = swarm.peer(1, small_chunks());

    assert_matches!(
        leecher.acquire(&descriptor).await,
        Err(TorrentError::SwarmEmpty { resource }) if resource == hash_bytes(b"ghost")
    );
}

#[tokio::test]
async fn test_own_endpoint_not_a_source() {
    let swarm = TestSwarm::new();
    let descriptor = TorrentDescriptor::new(
        TEST_TRACKER,
        "ghost.bin",
        hash_bytes(b"ghost"),
        vec![hash_bytes(b"ghost")],
    );
    swarm
        .registry
        .register(descriptor.resource_hash(), &peer_endpoint(1));
    let leecher = swarm.peer(1, small_chunks());

    assert_matches!(
        leecher.acquire(&descriptor).await,
        Err(TorrentError::SwarmEmpty { .. })
    );
}

#[tokio::test]
async fn test_corrupting_peer_is_survived() {
    let swarm = TestSwarm::new();
    let data = random_bytes(4000, 4);
    let source = swarm.source_file("doc.pdf", &data);

    let seed = swarm.peer(1, small_chunks());
    let descriptor_path = seed.publish(&source, TEST_TRACKER).await.unwrap();
    let descriptor = TorrentDescriptor::read_from_path(&descriptor_path).unwrap();

    let liar = CorruptingPeer::new(Arc::new(seed.clone()));
    swarm.network.add_peer(peer_endpoint(9), liar.clone());
    swarm
        .registry
        .register(descriptor.resource_hash(), &peer_endpoint(9));

    let leecher = swarm.peer(2, small_chunks());
    let path = leecher.acquire(&descriptor).await.unwrap();

    assert_eq!(fs::read(path).unwrap(), data);
    assert!(liar.leeches() >= 1);
}

#[tokio::test]
async fn test_only_corrupt_sources_is_unreachable() {
    let swarm = TestSwarm::new();
    let source = swarm.source_file("doc.pdf", &random_bytes(3000, 5));

    let seed = swarm.offline_peer(1, small_chunks());
    swarm
        .network
        .add_peer(peer_endpoint(1), CorruptingPeer::new(Arc::new(seed.clone())));
    let descriptor_path = seed.publish(&source, TEST_TRACKER).await.unwrap();
    let descriptor = TorrentDescriptor::read_from_path(&descriptor_path).unwrap();

    let leecher = swarm.peer(2, small_chunks());
    assert_matches!(
        leecher.acquire(&descriptor).await,
        Err(TorrentError::ResourceUnreachable { missing, .. }) if missing == vec![0, 1, 2]
    );

    // Nothing rejected may be stored or served.
    let resource = descriptor.resource_hash();
    assert!(leecher.state().held(resource).is_empty());
    assert!(!leecher.shared_dir().join("doc.pdf").exists());
    assert!(!leecher.shared_dir().join("doc.pdf.chunk0").exists());
    assert!(!swarm.registry.list_peers(resource).contains(&peer_endpoint(2)));
}

#[tokio::test]
async fn test_offline_and_failing_peers_are_unreachable() {
    let swarm = TestSwarm::new();
    let source = swarm.source_file("a.bin", &random_bytes(1500, 6));

    let seed = swarm.offline_peer(1, small_chunks());
    let descriptor_path = seed.publish(&source, TEST_TRACKER).await.unwrap();
    let descriptor = TorrentDescriptor::read_from_path(&descriptor_path).unwrap();

    let failing = FailingPeer::new();
    swarm.network.add_peer(peer_endpoint(8), failing.clone());
    swarm
        .registry
        .register(descriptor.resource_hash(), &peer_endpoint(8));

    let leecher = swarm.peer(2, small_chunks());
    assert_matches!(
        leecher.acquire(&descriptor).await,
        Err(TorrentError::ResourceUnreachable { missing, .. }) if missing == vec![0, 1]
    );
    // Availability and leech attempts in each of the two rounds.
    assert!(failing.calls() >= 2);
}

#[tokio::test]
async fn test_silent_peer_times_out() {
    let swarm = TestSwarm::new();
    let data = random_bytes(2048, 7);
    let source = swarm.source_file("b.bin", &data);

    let seed = swarm.peer(1, small_chunks());
    let descriptor_path = seed.publish(&source, TEST_TRACKER).await.unwrap();
    let descriptor = TorrentDescriptor::read_from_path(&descriptor_path).unwrap();

    // Sorts before the seed and advertises everything.
    let silent = SilentPeer::new("peer-0", BTreeSet::from([0, 1]));
    swarm.network.add_peer(peer_endpoint(0), silent);
    swarm
        .registry
        .register(descriptor.resource_hash(), &peer_endpoint(0));

    let config = PeerConfig {
        request_timeout_ms: 100,
        ..small_chunks()
    };
    let leecher = swarm.peer(2, config);
    let path = leecher.acquire(&descriptor).await.unwrap();
    assert_eq!(fs::read(path).unwrap(), data);
}

#[tokio::test]
async fn test_partial_provider_serves_others() {
    let swarm = TestSwarm::new();
    let data = random_bytes(3000, 8);
    let source = swarm.source_file("c.bin", &data);

    // The seed is only ever reachable through partial views.
    let seed = swarm.offline_peer(1, small_chunks());
    swarm.network.add_peer(
        peer_endpoint(1),
        PartialPeer::new(Arc::new(seed.clone()), BTreeSet::from([0])),
    );
    let descriptor_path = seed.publish(&source, TEST_TRACKER).await.unwrap();
    let descriptor = TorrentDescriptor::read_from_path(&descriptor_path).unwrap();
    let resource = descriptor.resource_hash();

    let first = swarm.peer(2, small_chunks());
    assert_matches!(
        first.acquire(&descriptor).await,
        Err(TorrentError::ResourceUnreachable { missing, .. }) if missing == vec![1, 2]
    );
    assert!(swarm.registry.list_peers(resource).contains(&peer_endpoint(2)));
    assert_eq!(
        first.find_available_chunks(resource).await.unwrap(),
        BTreeSet::from([0])
    );

    // Swap the seed for one that only has the rest.
    swarm.network.remove_peer(&peer_endpoint(1));
    swarm.network.add_peer(
        peer_endpoint(3),
        PartialPeer::new(Arc::new(seed.clone()), BTreeSet::from([1, 2])),
    );
    swarm.registry.unregister(resource, &peer_endpoint(1));
    swarm.registry.register(resource, &peer_endpoint(3));

    let second = swarm.peer(4, small_chunks());
    let path = second.acquire(&descriptor).await.unwrap();
    assert_eq!(fs::read(path).unwrap(), data);
}

#[tokio::test]
async fn test_partial_announce_can_be_disabled() {
    let swarm = TestSwarm::new();
    let source = swarm.source_file("c.bin", &random_bytes(3000, 9));

    let seed = swarm.offline_peer(1, small_chunks());
    swarm.network.add_peer(
        peer_endpoint(1),
        PartialPeer::new(Arc::new(seed.clone()), BTreeSet::from([0])),
    );
    let descriptor_path = seed.publish(&source, TEST_TRACKER).await.unwrap();
    let descriptor = TorrentDescriptor::read_from_path(&descriptor_path).unwrap();

    let config = PeerConfig {
        announce_partial: false,
        ..small_chunks()
    };
    let leecher = swarm.peer(2, config);
    assert!(leecher.acquire(&descriptor).await.is_err());
    assert!(
        !swarm
            .registry
            .list_peers(descriptor.resource_hash())
            .contains(&peer_endpoint(2))
    );
}

#[tokio::test]
async fn test_adopts_chunks_from_earlier_run() {
    let swarm = TestSwarm::new();
    let data = random_bytes(2500, 10);
    let source = swarm.source_file("d.bin", &data);

    let seed = swarm.offline_peer(1, small_chunks());
    let descriptor_path = seed.publish(&source, TEST_TRACKER).await.unwrap();
    let descriptor = TorrentDescriptor::read_from_path(&descriptor_path).unwrap();

    // The seed is offline; the leecher already has every chunk on disk.
    let leecher = swarm.peer(2, small_chunks());
    for i in 0..descriptor.chunk_count() {
        let name = chunk_file_name("d.bin", i);
        fs::copy(seed.shared_dir().join(&name), leecher.shared_dir().join(&name)).unwrap();
    }

    let path = leecher.acquire(&descriptor).await.unwrap();
    assert_eq!(fs::read(path).unwrap(), data);
}

#[tokio::test]
async fn test_stale_chunk_file_is_not_adopted() {
    let swarm = TestSwarm::new();
    let data = random_bytes(2048, 11);
    let source = swarm.source_file("e.bin", &data);

    let seed = swarm.peer(1, small_chunks());
    let descriptor_path = seed.publish(&source, TEST_TRACKER).await.unwrap();
    let descriptor = TorrentDescriptor::read_from_path(&descriptor_path).unwrap();

    let leecher = swarm.peer(2, small_chunks());
    fs::write(leecher.shared_dir().join("e.bin.chunk0"), b"garbage").unwrap();

    let path = leecher.acquire(&descriptor).await.unwrap();
    assert_eq!(fs::read(path).unwrap(), data);
}

#[tokio::test]
async fn test_corrupt_stored_chunk_not_served() {
    let swarm = TestSwarm::new();
    let source = swarm.source_file("f.bin", &random_bytes(2048, 12));
    let seed = swarm.peer(1, small_chunks());
    let descriptor_path = seed.publish(&source, TEST_TRACKER).await.unwrap();
    let descriptor = TorrentDescriptor::read_from_path(&descriptor_path).unwrap();
    let resource = descriptor.resource_hash();

    assert!(seed.leech(resource, 1).await.is_ok());
    fs::write(seed.shared_dir().join("f.bin.chunk1"), b"bitrot").unwrap();

    assert_matches!(
        seed.leech(resource, 1).await,
        Err(RemotePeerError::ChunkNotAvailable { index: 1, .. })
    );
    assert_eq!(
        seed.find_available_chunks(resource).await.unwrap(),
        BTreeSet::from([0])
    );
}

#[tokio::test]
async fn test_leech_unknown_chunk() {
    let swarm = TestSwarm::new();
    let peer = swarm.peer(1, small_chunks());
    let resource = hash_bytes(b"unknown");

    assert_matches!(
        peer.leech(&resource, 0).await,
        Err(RemotePeerError::ChunkNotAvailable { index: 0, .. })
    );
    assert!(peer.find_available_chunks(&resource).await.unwrap().is_empty());
    assert_eq!(peer.identifier().await.unwrap(), "peer-1");
}

#[tokio::test]
async fn test_withdraw_and_shutdown() {
    let swarm = TestSwarm::new();
    let a = swarm.source_file("a.txt", b"first resource");
    let b = swarm.source_file("b.txt", b"second resource");
    let seed = swarm.peer(1, small_chunks());

    seed.publish(&a, TEST_TRACKER).await.unwrap();
    seed.publish(&b, TEST_TRACKER).await.unwrap();
    let hash_a = hash_bytes(b"first resource");
    let hash_b = hash_bytes(b"second resource");

    assert!(seed.withdraw(&hash_a).await.unwrap());
    assert!(!seed.withdraw(&hash_a).await.unwrap());
    assert!(swarm.registry.list_peers(&hash_a).is_empty());
    assert!(seed.find_available_chunks(&hash_a).await.unwrap().is_empty());
    assert_eq!(swarm.registry.list_peers(&hash_b).len(), 1);

    seed.shutdown().await.unwrap();
    assert!(swarm.registry.list_resources_for(&peer_endpoint(1)).is_empty());
    assert!(seed.state().resources().is_empty());
}

#[tokio::test]
async fn test_withdraw_keeps_resource_when_tracker_unreachable() {
    let swarm = TestSwarm::new();
    let source = swarm.source_file("c.txt", b"kept until unregistered");
    let seed = swarm.peer(1, small_chunks());
    seed.publish(&source, TEST_TRACKER).await.unwrap();
    let resource = hash_bytes(b"kept until unregistered");

    swarm.network.remove_tracker(TEST_TRACKER);
    assert_matches!(seed.withdraw(&resource).await, Err(TorrentError::Tracker(_)));
    assert_eq!(seed.state().resources(), BTreeSet::from([resource.clone()]));
    assert_eq!(swarm.registry.list_peers(&resource), BTreeSet::from([peer_endpoint(1)]));

    swarm.network.add_tracker(TEST_TRACKER, swarm.registry.clone());
    assert!(seed.withdraw(&resource).await.unwrap());
    assert!(seed.state().resources().is_empty());
    assert!(swarm.registry.list_peers(&resource).is_empty());
}

#[tokio::test]
async fn test_outstanding_requests_are_bounded() {
    let swarm = TestSwarm::new();
    let data = random_bytes(20 * 1024, 17);
    let source = swarm.source_file("h.bin", &data);
    let seed = swarm.peer(1, small_chunks());
    let descriptor_path = seed.publish(&source, TEST_TRACKER).await.unwrap();
    let descriptor = TorrentDescriptor::read_from_path(&descriptor_path).unwrap();

    let slow = CountingPeer::new(Arc::new(seed.clone()), Duration::from_millis(20));
    swarm.network.add_peer(peer_endpoint(1), slow.clone());

    let config = PeerConfig {
        max_concurrent_requests: 3,
        ..small_chunks()
    };
    let leecher = swarm.peer(2, config);
    let path = leecher.acquire(&descriptor).await.unwrap();

    assert_eq!(fs::read(path).unwrap(), data);
    // One availability query plus one leech per chunk.
    assert_eq!(slow.calls(), 21);
    assert_eq!(slow.peak(), 3);
}

#[tokio::test]
async fn test_dropped_acquire_leaves_nothing_behind() {
    let swarm = TestSwarm::new();
    let data = random_bytes(4096, 19);
    let chunk_hashes: Vec<_> = data.chunks(1024).map(hash_bytes).collect();
    let descriptor = TorrentDescriptor::new(
        TEST_TRACKER,
        "i.bin",
        hash_bytes(&data),
        chunk_hashes,
    );

    let silent = SilentPeer::new("peer-0", BTreeSet::from([0, 1, 2, 3]));
    swarm.network.add_peer(peer_endpoint(0), silent);
    swarm
        .registry
        .register(descriptor.resource_hash(), &peer_endpoint(0));

    let leecher = swarm.peer(2, small_chunks());
    let acquired = tokio::time::timeout(Duration::from_millis(200), leecher.acquire(&descriptor)).await;
    assert!(acquired.is_err());

    let leftovers: Vec<_> = fs::read_dir(leecher.shared_dir())
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    assert!(leftovers.is_empty(), "unexpected files: {leftovers:?}");
    assert!(leecher.state().held(descriptor.resource_hash()).is_empty());
    assert_eq!(
        swarm.registry.list_peers(descriptor.resource_hash()),
        BTreeSet::from([peer_endpoint(0)])
    );
}

#[tokio::test]
async fn test_many_leechers_concurrently() {
    let swarm = TestSwarm::new();
    let data = random_bytes(10_000, 13);
    let source = swarm.source_file("g.bin", &data);
    let seed = swarm.peer(1, small_chunks());
    let descriptor_path = seed.publish(&source, TEST_TRACKER).await.unwrap();
    let descriptor = TorrentDescriptor::read_from_path(&descriptor_path).unwrap();

    let mut handles = Vec::new();
    for n in 2..6 {
        let leecher = swarm.peer(n, small_chunks());
        let descriptor = descriptor.clone();
        handles.push(tokio::spawn(async move { leecher.acquire(&descriptor).await }));
    }
    for handle in handles {
        let path = handle.await.unwrap().unwrap();
        assert_eq!(fs::read(path).unwrap(), data);
    }
    assert_eq!(swarm.registry.list_peers(descriptor.resource_hash()).len(), 5);
}

#[tokio::test]
async fn test_rejects_invalid_config() {
    let swarm = TestSwarm::new();
    let result = Peer::new(
        peer_endpoint(1),
        swarm.dir.path().join("x"),
        PeerConfig {
            max_chunk_size: 0,
            ..Default::default()
        },
        swarm.network.clone(),
        swarm.network.clone(),
    );
    assert_matches!(result, Err(TorrentError::InvalidInput { .. }));
}
