//! Resource chunks.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::HashValue;

/// Position of a chunk within its resource, dense from 0.
pub type ChunkIndex = u32;

/// File name of a chunk artifact: `<resourceFileName>.chunk<index>`.
pub fn chunk_file_name(resource_name: &str, index: ChunkIndex) -> String {
    format!("{resource_name}.chunk{index}")
}

/// An indexed, immutable slice of a resource.
///
/// The chunk's integrity hash covers [`Chunk::payload`] only; name and index
/// are positional metadata.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    name: String,
    index: ChunkIndex,
    payload: Vec<u8>,
}

impl Chunk {
    /// Create the chunk at `index` of the resource named `resource_name`.
    pub fn new(resource_name: &str, index: ChunkIndex, payload: Vec<u8>) -> Self {
        Self {
            name: chunk_file_name(resource_name, index),
            index,
            payload,
        }
    }

    /// Reassemble a chunk from a name already in artifact form.
    pub fn from_parts(name: String, index: ChunkIndex, payload: Vec<u8>) -> Self {
        Self {
            name,
            index,
            payload,
        }
    }

    /// Artifact name, `<resourceFileName>.chunk<index>`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> ChunkIndex {
        self.index
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Integrity hash of the payload.
    pub fn hash(&self) -> HashValue {
        HashValue::of_bytes(&self.payload)
    }

    /// Whether the payload hashes to `expected`.
    pub fn verify(&self, expected: &HashValue) -> bool {
        self.hash() == *expected
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    pub fn into_parts(self) -> (String, ChunkIndex, Vec<u8>) {
        (self.name, self.index, self.payload)
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("name", &self.name)
            .field("index", &self.index)
            .field("len", &self.payload.len())
            .finish()
    }
}
