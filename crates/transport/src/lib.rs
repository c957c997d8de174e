//! TCP transport for TinyTorrent.
//!
//! Both protocols use the same framing ([`MessageCodec`]): a 4-byte
//! big-endian length followed by a postcard-encoded message. Servers run until
//! a shutdown future resolves; clients open one connection per call.

mod client;
mod codec;
mod message;
mod server;

pub use client::{TcpConnector, TcpPeerClient, TcpTrackerClient};
pub use codec::{CodecError, MAX_FRAME_SIZE, MessageCodec};
pub use message::{PeerRequest, PeerResponse, TrackerRequest, TrackerResponse};
pub use server::{serve_peer, serve_tracker};
