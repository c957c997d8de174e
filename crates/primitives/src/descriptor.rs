//! The `.tinytorrent` descriptor.
//!
//! The artifact is newline-delimited text in a fixed order:
//!
//! ```text
//! <resource name>
//! <resource hash>
//! <tracker endpoint>
//! <chunk 0 hash>
//! <chunk 1 hash>
//! ...
//! ```
//!
//! Nothing is escaped. Resource names and tracker endpoints must not contain a
//! line break; this is not checked on write.

use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
    str::FromStr,
};

use crate::{ChunkIndex, HashValue, InvalidHashValue};

/// File extension of descriptor artifacts.
pub const DESCRIPTOR_EXTENSION: &str = "tinytorrent";

/// Number of header lines preceding the chunk hashes.
const HEADER_LINES: usize = 3;

/// Errors from reading a descriptor.
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    /// Fewer than the three header lines are present.
    #[error("malformed descriptor: expected at least 3 header lines, found {lines}")]
    Malformed {
        /// Number of lines actually present.
        lines: usize,
    },

    /// A hash line does not hold a valid hash.
    #[error("malformed descriptor: line {line}: {source}")]
    InvalidHash {
        /// 1-based line number.
        line: usize,
        #[source]
        source: InvalidHashValue,
    },

    /// The artifact could not be read.
    #[error("descriptor io error: {0}")]
    Io(#[from] io::Error),
}

/// Manifest binding a resource's identity to its chunk layout and tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentDescriptor {
    tracker_endpoint: String,
    resource_name: String,
    resource_hash: HashValue,
    chunk_hashes: Vec<HashValue>,
}

impl TorrentDescriptor {
    pub fn new(
        tracker_endpoint: impl Into<String>,
        resource_name: impl Into<String>,
        resource_hash: HashValue,
        chunk_hashes: Vec<HashValue>,
    ) -> Self {
        Self {
            tracker_endpoint: tracker_endpoint.into(),
            resource_name: resource_name.into(),
            resource_hash,
            chunk_hashes,
        }
    }

    pub fn tracker_endpoint(&self) -> &str {
        &self.tracker_endpoint
    }

    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }

    /// Identity of the resource across the swarm.
    pub fn resource_hash(&self) -> &HashValue {
        &self.resource_hash
    }

    /// Per-chunk hashes; position is the chunk index.
    pub fn chunk_hashes(&self) -> &[HashValue] {
        &self.chunk_hashes
    }

    pub fn chunk_hash(&self, index: ChunkIndex) -> Option<&HashValue> {
        self.chunk_hashes.get(index as usize)
    }

    pub fn chunk_count(&self) -> ChunkIndex {
        self.chunk_hashes.len() as ChunkIndex
    }

    /// Artifact file name, `<resourceName>.tinytorrent`.
    pub fn file_name(&self) -> String {
        format!("{}.{DESCRIPTOR_EXTENSION}", self.resource_name)
    }

    /// Serialize to the textual artifact.
    pub fn to_artifact(&self) -> String {
        let mut out = String::with_capacity(
            self.resource_name.len()
                + self.tracker_endpoint.len()
                + (self.chunk_hashes.len() + 1) * (crate::HASH_HEX_LEN + 1)
                + 2,
        );
        for line in [
            self.resource_name.as_str(),
            self.resource_hash.as_str(),
            self.tracker_endpoint.as_str(),
        ]
        .into_iter()
        .chain(self.chunk_hashes.iter().map(HashValue::as_str))
        {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    /// Parse the textual artifact.
    pub fn from_artifact(artifact: &str) -> Result<Self, DescriptorError> {
        let lines: Vec<&str> = artifact.lines().collect();
        let [resource_name, resource_hash, tracker_endpoint, chunk_lines @ ..] = lines.as_slice()
        else {
            return Err(DescriptorError::Malformed { lines: lines.len() });
        };

        let parse_hash = |line: usize, text: &str| {
            text.parse::<HashValue>()
                .map_err(|source| DescriptorError::InvalidHash { line, source })
        };

        let resource_hash = parse_hash(2, *resource_hash)?;
        let chunk_hashes = chunk_lines
            .iter()
            .enumerate()
            .map(|(i, text)| parse_hash(HEADER_LINES + i + 1, *text))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            tracker_endpoint: (*tracker_endpoint).to_string(),
            resource_name: (*resource_name).to_string(),
            resource_hash,
            chunk_hashes,
        })
    }

    /// Write `<dir>/<resourceName>.tinytorrent`, returning its path.
    pub fn write_to_dir(&self, dir: impl AsRef<Path>) -> io::Result<PathBuf> {
        let path = dir.as_ref().join(self.file_name());
        fs::write(&path, self.to_artifact())?;
        Ok(path)
    }

    /// Read a descriptor artifact from disk.
    pub fn read_from_path(path: impl AsRef<Path>) -> Result<Self, DescriptorError> {
        Self::from_artifact(&fs::read_to_string(path)?)
    }
}

impl FromStr for TorrentDescriptor {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_artifact(s)
    }
}

impl fmt::Display for TorrentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_artifact())
    }
}
