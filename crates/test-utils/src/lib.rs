//! Test utilities for TinyTorrent crates.
//!
//! - [`InProcessNetwork`] - connectors that resolve endpoints to in-memory handles
//! - [`CorruptingPeer`], [`SilentPeer`], [`FailingPeer`], [`PartialPeer`] - misbehaving remote peers
//! - [`CountingPeer`] - a slow peer that records call concurrency
//! - [`random_bytes`], [`peer_endpoint`] - fixtures

mod faulty;
mod network;

pub use faulty::{CorruptingPeer, CountingPeer, FailingPeer, PartialPeer, SilentPeer};
pub use network::InProcessNetwork;

use rand::{Rng, SeedableRng, rngs::StdRng};
use tinytorrent_primitives::PeerEndpoint;

/// Tracker endpoint used by tests that need only one.
pub const TEST_TRACKER: &str = "tracker.test:6969";

/// Deterministic pseudo-random payload.
pub fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    StdRng::seed_from_u64(seed).fill(bytes.as_mut_slice());
    bytes
}

/// Endpoint `peer-<n>@peer-<n>.test:7000`.
pub fn peer_endpoint(n: usize) -> PeerEndpoint {
    PeerEndpoint::new(format!("peer-{n}.test:7000"), format!("peer-{n}"))
}
