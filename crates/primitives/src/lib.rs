//! Core primitive types for TinyTorrent.
//!
//! # Types
//!
//! - [`HashValue`] - SHA-1 digest in fixed-width uppercase hex; identifies
//!   resources and chunks across the swarm
//! - [`Chunk`] - an indexed slice of a resource's bytes
//! - [`PeerEndpoint`] - routable address plus swarm-unique identifier
//! - [`TorrentDescriptor`] - the `.tinytorrent` manifest
//!
//! # Integrity engine
//!
//! - [`hash_bytes`], [`hash_file`], [`StreamHasher`] - content hashing
//! - [`split`] - deterministic chunking of a file
//! - [`merge`] - ordered concatenation of chunk files

mod chunk;
mod descriptor;
mod endpoint;
mod hash;
mod split;

pub use chunk::{Chunk, ChunkIndex, chunk_file_name};
pub use descriptor::{DESCRIPTOR_EXTENSION, DescriptorError, TorrentDescriptor};
pub use endpoint::{InvalidEndpoint, PeerEndpoint};
pub use hash::{
    HASH_HEX_LEN, HashValue, InvalidHashValue, StreamHasher, hash_bytes, hash_file, hash_reader,
};
pub use split::{ChunkSplitter, merge, split};
