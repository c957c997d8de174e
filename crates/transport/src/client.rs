//! TCP clients for the tracker and peer protocols.
//!
//! Every call opens a fresh connection, sends one request and reads one
//! response.

use std::{collections::BTreeSet, sync::Arc};

use asynchronous_codec::Framed;
use async_trait::async_trait;
use futures::{SinkExt, TryStreamExt};
use serde::{Serialize, de::DeserializeOwned};
use tinytorrent_api::{
    PeerConnector, RemotePeer, RemotePeerError, RemotePeerResult, Tracker, TrackerConnector,
    TrackerError, TrackerResult,
};
use tinytorrent_primitives::{Chunk, ChunkIndex, HashValue, PeerEndpoint};
use tokio::net::TcpStream;
use tokio_util::compat::TokioAsyncReadCompatExt;
use tracing::trace;

use crate::{
    CodecError, MAX_FRAME_SIZE, MessageCodec, PeerRequest, PeerResponse, TrackerRequest,
    TrackerResponse,
};

/// One request/response exchange over a new connection.
async fn exchange<Req, Resp>(
    address: &str,
    request: Req,
    max_frame_size: usize,
) -> Result<Resp, CodecError>
where
    Req: Serialize,
    Resp: DeserializeOwned,
{
    let stream = TcpStream::connect(address).await?;
    stream.set_nodelay(true)?;
    let mut framed = Framed::new(
        stream.compat(),
        MessageCodec::<Resp, Req>::new(max_frame_size),
    );
    framed.send(request).await?;
    framed.try_next().await?.ok_or(CodecError::ConnectionClosed)
}

fn unexpected(response: impl std::fmt::Debug) -> String {
    format!("unexpected response: {response:?}")
}

/// Tracker reached over TCP.
#[derive(Debug, Clone)]
pub struct TcpTrackerClient {
    address: String,
    max_frame_size: usize,
}

impl TcpTrackerClient {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    async fn call(&self, request: TrackerRequest) -> TrackerResult<TrackerResponse> {
        trace!(address = %self.address, ?request, "tracker call");
        match exchange(&self.address, request, self.max_frame_size).await {
            Ok(TrackerResponse::Error(e)) => Err(e),
            Ok(response) => Ok(response),
            Err(e) => Err(TrackerError::transport(format!("{}: {e}", self.address))),
        }
    }

    async fn ack(&self, request: TrackerRequest) -> TrackerResult<()> {
        match self.call(request).await? {
            TrackerResponse::Ack => Ok(()),
            other => Err(TrackerError::transport(unexpected(other))),
        }
    }

    async fn resources(&self, request: TrackerRequest) -> TrackerResult<BTreeSet<HashValue>> {
        match self.call(request).await? {
            TrackerResponse::Resources(resources) => Ok(resources),
            other => Err(TrackerError::transport(unexpected(other))),
        }
    }
}

#[async_trait]
impl Tracker for TcpTrackerClient {
    async fn register(&self, resource: &HashValue, peer: &PeerEndpoint) -> TrackerResult<()> {
        self.ack(TrackerRequest::Register {
            resource: resource.clone(),
            peer: peer.clone(),
        })
        .await
    }

    async fn unregister(&self, resource: &HashValue, peer: &PeerEndpoint) -> TrackerResult<()> {
        self.ack(TrackerRequest::Unregister {
            resource: resource.clone(),
            peer: peer.clone(),
        })
        .await
    }

    async fn find_resource_hash_values(&self) -> TrackerResult<BTreeSet<HashValue>> {
        self.resources(TrackerRequest::FindResourceHashValues).await
    }

    async fn find_resource_hash_values_for(
        &self,
        peer: &PeerEndpoint,
    ) -> TrackerResult<BTreeSet<HashValue>> {
        self.resources(TrackerRequest::FindResourceHashValuesFor { peer: peer.clone() })
            .await
    }

    async fn find_clients(&self, resource: &HashValue) -> TrackerResult<BTreeSet<PeerEndpoint>> {
        match self
            .call(TrackerRequest::FindClients {
                resource: resource.clone(),
            })
            .await?
        {
            TrackerResponse::Clients(clients) => Ok(clients),
            other => Err(TrackerError::transport(unexpected(other))),
        }
    }
}

/// Remote peer reached over TCP.
#[derive(Debug, Clone)]
pub struct TcpPeerClient {
    address: String,
    max_frame_size: usize,
}

impl TcpPeerClient {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    async fn call(&self, request: PeerRequest) -> RemotePeerResult<PeerResponse> {
        trace!(address = %self.address, ?request, "peer call");
        match exchange(&self.address, request, self.max_frame_size).await {
            Ok(PeerResponse::Error(e)) => Err(e),
            Ok(response) => Ok(response),
            Err(e) => Err(RemotePeerError::transport(format!("{}: {e}", self.address))),
        }
    }
}

#[async_trait]
impl RemotePeer for TcpPeerClient {
    async fn leech(&self, resource: &HashValue, index: ChunkIndex) -> RemotePeerResult<Chunk> {
        match self
            .call(PeerRequest::Leech {
                resource: resource.clone(),
                index,
            })
            .await?
        {
            PeerResponse::Chunk(chunk) => Ok(chunk),
            other => Err(RemotePeerError::transport(unexpected(other))),
        }
    }

    async fn find_available_chunks(
        &self,
        resource: &HashValue,
    ) -> RemotePeerResult<BTreeSet<ChunkIndex>> {
        match self
            .call(PeerRequest::FindAvailableChunks {
                resource: resource.clone(),
            })
            .await?
        {
            PeerResponse::Available(chunks) => Ok(chunks),
            other => Err(RemotePeerError::transport(unexpected(other))),
        }
    }

    async fn identifier(&self) -> RemotePeerResult<String> {
        match self.call(PeerRequest::Identifier).await? {
            PeerResponse::Identifier(identifier) => Ok(identifier),
            other => Err(RemotePeerError::transport(unexpected(other))),
        }
    }
}

/// Connector resolving endpoints to TCP clients.
///
/// Connecting is free; the socket is opened per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl PeerConnector for TcpConnector {
    async fn connect(&self, endpoint: &PeerEndpoint) -> RemotePeerResult<Arc<dyn RemotePeer>> {
        Ok(Arc::new(TcpPeerClient::new(endpoint.address())))
    }
}

#[async_trait]
impl TrackerConnector for TcpConnector {
    async fn connect(&self, tracker_endpoint: &str) -> TrackerResult<Arc<dyn Tracker>> {
        Ok(Arc::new(TcpTrackerClient::new(tracker_endpoint)))
    }
}
