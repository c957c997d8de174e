//! Chunk and resource files in the shared directory.
//!
//! Layout, all flat under the shared directory:
//! - `<resourceName>` - an assembled resource
//! - `<resourceName>.chunk<index>` - raw chunk payloads
//! - `<resourceName>.tinytorrent` - descriptors
//!
//! Every write lands under a hidden temporary name first and is renamed into
//! place, so a final name always refers to a complete file.

use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use tinytorrent_primitives::{
    Chunk, ChunkIndex, HashValue, TorrentDescriptor, chunk_file_name, hash_file, merge,
};
use tracing::{debug, trace};

use crate::{TorrentError, TorrentResult};

/// File-backed chunk store rooted at a peer's shared directory.
#[derive(Debug)]
pub struct ChunkStore {
    root: PathBuf,
    temp_seq: AtomicU64,
}

impl ChunkStore {
    /// Open the store, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> TorrentResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| TorrentError::io(&root, e))?;
        Ok(Self {
            root,
            temp_seq: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the assembled resource.
    pub fn resource_path(&self, resource_name: &str) -> TorrentResult<PathBuf> {
        check_resource_name(resource_name)?;
        Ok(self.root.join(resource_name))
    }

    pub fn chunk_path(&self, resource_name: &str, index: ChunkIndex) -> TorrentResult<PathBuf> {
        check_resource_name(resource_name)?;
        Ok(self.root.join(chunk_file_name(resource_name, index)))
    }

    fn temp_path(&self, final_name: &str) -> PathBuf {
        let seq = self.temp_seq.fetch_add(1, Ordering::Relaxed);
        self.root
            .join(format!(".{final_name}.{}-{seq}.tmp", std::process::id()))
    }

    /// Write `bytes` to `path` through a temporary file in the same directory.
    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> TorrentResult<()> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp = self.temp_path(&name);
        fs::write(&temp, bytes).map_err(|e| TorrentError::io(&temp, e))?;
        fs::rename(&temp, path).map_err(|e| {
            let _ = fs::remove_file(&temp);
            TorrentError::io(path, e)
        })
    }

    /// Persist a chunk of `resource_name` under its final name.
    pub fn write_chunk(&self, resource_name: &str, chunk: &Chunk) -> TorrentResult<PathBuf> {
        let path = self.chunk_path(resource_name, chunk.index())?;
        self.write_atomic(&path, chunk.payload())?;
        trace!(path = %path.display(), len = chunk.len(), "wrote chunk");
        Ok(path)
    }

    pub fn read_chunk(&self, resource_name: &str, index: ChunkIndex) -> TorrentResult<Chunk> {
        let path = self.chunk_path(resource_name, index)?;
        let payload = fs::read(&path).map_err(|e| TorrentError::io(&path, e))?;
        Ok(Chunk::new(resource_name, index, payload))
    }

    /// Read a stored chunk if it exists and hashes to `expected`.
    ///
    /// A missing file is `Ok(None)`; any other read failure is an error.
    pub fn read_verified(
        &self,
        resource_name: &str,
        index: ChunkIndex,
        expected: &HashValue,
    ) -> TorrentResult<Option<Chunk>> {
        match self.read_chunk(resource_name, index) {
            Ok(chunk) if chunk.verify(expected) => Ok(Some(chunk)),
            Ok(_) => Ok(None),
            Err(TorrentError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Write a descriptor as `<resourceName>.tinytorrent`.
    pub fn write_descriptor(&self, descriptor: &TorrentDescriptor) -> TorrentResult<PathBuf> {
        check_resource_name(descriptor.resource_name())?;
        let path = self.root.join(descriptor.file_name());
        self.write_atomic(&path, descriptor.to_artifact().as_bytes())?;
        Ok(path)
    }

    /// Merge chunks `0..count` of `resource_name` and move the result into
    /// place if it hashes to `expected`.
    ///
    /// On mismatch the merged file is removed and nothing is left behind.
    pub fn assemble(
        &self,
        resource_name: &str,
        count: ChunkIndex,
        expected: &HashValue,
    ) -> TorrentResult<PathBuf> {
        let path = self.resource_path(resource_name)?;
        let parts = (0..count)
            .map(|index| self.chunk_path(resource_name, index))
            .collect::<TorrentResult<Vec<_>>>()?;

        let temp = self.temp_path(resource_name);
        let written = merge(&temp, &parts).map_err(|e| {
            let _ = fs::remove_file(&temp);
            TorrentError::io(&temp, e)
        })?;
        let actual = hash_file(&temp).map_err(|e| TorrentError::io(&temp, e))?;

        if actual != *expected {
            let _ = fs::remove_file(&temp);
            return Err(TorrentError::CorruptAssembly {
                expected: expected.clone(),
                actual,
            });
        }

        fs::rename(&temp, &path).map_err(|e| {
            let _ = fs::remove_file(&temp);
            TorrentError::io(&path, e)
        })?;
        debug!(path = %path.display(), bytes = written, "assembled resource");
        Ok(path)
    }
}

/// Resource names become file names directly, so they must be a single
/// plain path component.
fn check_resource_name(name: &str) -> TorrentResult<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0']);
    if valid {
        Ok(())
    } else {
        Err(TorrentError::invalid_input(format!(
            "resource name {name:?} is not a plain file name"
        )))
    }
}
