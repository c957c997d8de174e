//! Wire messages for the tracker and peer protocols.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tinytorrent_api::{RemotePeerError, TrackerError};
use tinytorrent_primitives::{Chunk, ChunkIndex, HashValue, PeerEndpoint};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackerRequest {
    Register {
        resource: HashValue,
        peer: PeerEndpoint,
    },
    Unregister {
        resource: HashValue,
        peer: PeerEndpoint,
    },
    FindResourceHashValues,
    FindResourceHashValuesFor {
        peer: PeerEndpoint,
    },
    FindClients {
        resource: HashValue,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackerResponse {
    /// Register/unregister done.
    Ack,
    Resources(BTreeSet<HashValue>),
    Clients(BTreeSet<PeerEndpoint>),
    Error(TrackerError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerRequest {
    Leech {
        resource: HashValue,
        index: ChunkIndex,
    },
    FindAvailableChunks {
        resource: HashValue,
    },
    Identifier,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerResponse {
    Chunk(Chunk),
    Available(BTreeSet<ChunkIndex>),
    Identifier(String),
    Error(RemotePeerError),
}
