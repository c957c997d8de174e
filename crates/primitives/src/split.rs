//! Deterministic chunking and ordered reassembly.

use std::{
    fs::File,
    io::{self, BufReader, Read, Write},
    path::Path,
};

use crate::{Chunk, ChunkIndex};

/// Split the file at `path` into chunks of at most `max_chunk_size` bytes.
///
/// Every chunk except the last is exactly `max_chunk_size` bytes; the last
/// holds the remainder. An empty file yields no chunks. Chunks are produced
/// lazily so only one payload is held in memory at a time.
pub fn split(path: impl AsRef<Path>, max_chunk_size: usize) -> io::Result<ChunkSplitter<File>> {
    let path = path.as_ref();
    let resource_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} has no file name", path.display()),
            )
        })?;
    ChunkSplitter::new(resource_name, File::open(path)?, max_chunk_size)
}

/// Iterator over the chunks of a resource, in index order.
#[derive(Debug)]
pub struct ChunkSplitter<R> {
    resource_name: String,
    reader: R,
    max_chunk_size: usize,
    next_index: ChunkIndex,
    done: bool,
}

impl<R: Read> ChunkSplitter<R> {
    /// Chunk everything `reader` yields, naming chunks after `resource_name`.
    pub fn new(
        resource_name: impl Into<String>,
        reader: R,
        max_chunk_size: usize,
    ) -> io::Result<Self> {
        if max_chunk_size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "max chunk size must be positive",
            ));
        }
        Ok(Self {
            resource_name: resource_name.into(),
            reader,
            max_chunk_size,
            next_index: 0,
            done: false,
        })
    }

    /// Fill up to `max_chunk_size` bytes, tolerating short reads.
    fn read_payload(&mut self) -> io::Result<Vec<u8>> {
        let mut payload = Vec::with_capacity(self.max_chunk_size);
        (&mut self.reader)
            .take(self.max_chunk_size as u64)
            .read_to_end(&mut payload)?;
        Ok(payload)
    }
}

impl<R: Read> Iterator for ChunkSplitter<R> {
    type Item = io::Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_payload() {
            Ok(payload) if payload.is_empty() => {
                self.done = true;
                None
            }
            Ok(payload) => {
                if payload.len() < self.max_chunk_size {
                    self.done = true;
                }
                let chunk = Chunk::new(&self.resource_name, self.next_index, payload);
                self.next_index += 1;
                Some(Ok(chunk))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Concatenate `parts` in order into a new file at `output`.
///
/// The output is created or truncated. Returns the number of bytes written.
pub fn merge<P: AsRef<Path>>(
    output: impl AsRef<Path>,
    parts: impl IntoIterator<Item = P>,
) -> io::Result<u64> {
    let mut out = io::BufWriter::new(File::create(output)?);
    let mut written = 0;
    for part in parts {
        let mut reader = BufReader::new(File::open(part)?);
        written += io::copy(&mut reader, &mut out)?;
    }
    out.flush()?;
    Ok(written)
}
