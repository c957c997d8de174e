//! TCP servers for the tracker and peer protocols.
//!
//! Each accepted connection is served on its own task and may carry any
//! number of sequential request/response pairs.

use std::{future::Future, io, net::SocketAddr, sync::Arc, time::Duration};

use asynchronous_codec::Framed;
use async_trait::async_trait;
use futures::{SinkExt, TryStreamExt};
use serde::{Serialize, de::DeserializeOwned};
use tinytorrent_api::{RemotePeer, Tracker};
use tokio::{
    net::{TcpListener, TcpStream},
    task::JoinSet,
};
use tokio_util::compat::TokioAsyncReadCompatExt;
use tracing::{debug, info, warn};

use crate::{
    CodecError, MessageCodec, PeerRequest, PeerResponse, TrackerRequest, TrackerResponse,
};

/// Pause after a failed `accept` before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Answers one decoded request.
#[async_trait]
trait Handler: Send + Sync + 'static {
    type Request: DeserializeOwned + Send;
    type Response: Serialize + Send;

    async fn handle(&self, request: Self::Request) -> Self::Response;
}

struct TrackerHandler(Arc<dyn Tracker>);

#[async_trait]
impl Handler for TrackerHandler {
    type Request = TrackerRequest;
    type Response = TrackerResponse;

    async fn handle(&self, request: TrackerRequest) -> TrackerResponse {
        let tracker = &self.0;
        let result = match request {
            TrackerRequest::Register { resource, peer } => tracker
                .register(&resource, &peer)
                .await
                .map(|()| TrackerResponse::Ack),
            TrackerRequest::Unregister { resource, peer } => tracker
                .unregister(&resource, &peer)
                .await
                .map(|()| TrackerResponse::Ack),
            TrackerRequest::FindResourceHashValues => tracker
                .find_resource_hash_values()
                .await
                .map(TrackerResponse::Resources),
            TrackerRequest::FindResourceHashValuesFor { peer } => tracker
                .find_resource_hash_values_for(&peer)
                .await
                .map(TrackerResponse::Resources),
            TrackerRequest::FindClients { resource } => tracker
                .find_clients(&resource)
                .await
                .map(TrackerResponse::Clients),
        };
        result.unwrap_or_else(TrackerResponse::Error)
    }
}

struct PeerHandler(Arc<dyn RemotePeer>);

#[async_trait]
impl Handler for PeerHandler {
    type Request = PeerRequest;
    type Response = PeerResponse;

    async fn handle(&self, request: PeerRequest) -> PeerResponse {
        let peer = &self.0;
        let result = match request {
            PeerRequest::Leech { resource, index } => {
                peer.leech(&resource, index).await.map(PeerResponse::Chunk)
            }
            PeerRequest::FindAvailableChunks { resource } => peer
                .find_available_chunks(&resource)
                .await
                .map(PeerResponse::Available),
            PeerRequest::Identifier => peer.identifier().await.map(PeerResponse::Identifier),
        };
        result.unwrap_or_else(PeerResponse::Error)
    }
}

/// Serve the tracker protocol on `listener` until `shutdown` resolves.
pub async fn serve_tracker(
    listener: TcpListener,
    tracker: Arc<dyn Tracker>,
    shutdown: impl Future<Output = ()>,
) -> io::Result<()> {
    info!(addr = %listener.local_addr()?, "tracker listening");
    serve(listener, Arc::new(TrackerHandler(tracker)), shutdown).await
}

/// Serve the peer protocol on `listener` until `shutdown` resolves.
pub async fn serve_peer(
    listener: TcpListener,
    peer: Arc<dyn RemotePeer>,
    shutdown: impl Future<Output = ()>,
) -> io::Result<()> {
    info!(addr = %listener.local_addr()?, "peer listening");
    serve(listener, Arc::new(PeerHandler(peer)), shutdown).await
}

async fn serve<H: Handler>(
    listener: TcpListener,
    handler: Arc<H>,
    shutdown: impl Future<Output = ()>,
) -> io::Result<()> {
    tokio::pin!(shutdown);
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            () = &mut shutdown => break,
            accepted = listener.accept() => {
                let (stream, remote) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        // EMFILE and similar persist until open connections close.
                        warn!(error = %e, "accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                        continue;
                    }
                };
                let handler = handler.clone();
                connections.spawn(async move {
                    if let Err(e) = handle_connection(stream, remote, handler).await {
                        debug!(%remote, error = %e, "connection ended with error");
                    }
                });
            }
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    info!(open = connections.len(), "server shutting down");
    connections.shutdown().await;
    Ok(())
}

async fn handle_connection<H: Handler>(
    stream: TcpStream,
    remote: SocketAddr,
    handler: Arc<H>,
) -> Result<(), CodecError> {
    let codec = MessageCodec::<H::Request, H::Response>::default();
    let mut framed = Framed::new(stream.compat(), codec);

    while let Some(request) = framed.try_next().await? {
        let response = handler.handle(request).await;
        framed.send(response).await?;
    }
    debug!(%remote, "connection closed");
    Ok(())
}
