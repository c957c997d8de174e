//! SHA-1 content hashes.

use std::{
    fmt,
    fs::File,
    io::{self, Read},
    path::Path,
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

/// Length of a hash in its textual form (20 bytes, two hex digits each).
pub const HASH_HEX_LEN: usize = 40;

/// Read buffer used when streaming a file through the hasher.
const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// A SHA-1 digest rendered as 40 uppercase hexadecimal characters.
///
/// The textual form is the canonical one: it is used as a map key, in the
/// descriptor artifact and on the wire, and equality is plain string equality.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HashValue(String);

impl HashValue {
    /// Hash an in-memory payload.
    pub fn of_bytes(payload: &[u8]) -> Self {
        Self::from_digest(Sha1::digest(payload).as_slice())
    }

    fn from_digest(digest: &[u8]) -> Self {
        Self(hex::encode_upper(digest))
    }

    /// The 40-character uppercase hex form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Hash an in-memory payload.
pub fn hash_bytes(payload: &[u8]) -> HashValue {
    HashValue::of_bytes(payload)
}

/// Incremental hasher for content that arrives in pieces.
///
/// Feeding the chunks of a resource in order yields the resource hash.
#[derive(Clone, Default)]
pub struct StreamHasher(Sha1);

impl StreamHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    pub fn finish(self) -> HashValue {
        HashValue::from_digest(self.0.finalize().as_slice())
    }
}

impl fmt::Debug for StreamHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamHasher").finish_non_exhaustive()
    }
}

/// Hash everything a reader yields, holding at most one buffer in memory.
pub fn hash_reader<R: Read>(mut reader: R) -> io::Result<HashValue> {
    let mut hasher = StreamHasher::new();
    let mut buf = vec![0u8; HASH_BUFFER_SIZE];
    loop {
        let read = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(buf.get(..read).unwrap_or_default());
    }
    Ok(hasher.finish())
}

/// Hash a file by streaming it once.
pub fn hash_file(path: impl AsRef<Path>) -> io::Result<HashValue> {
    hash_reader(File::open(path)?)
}

/// Error returned when text is not a valid hash.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid hash value {value:?}: expected 40 hexadecimal digits")]
pub struct InvalidHashValue {
    /// The rejected input.
    pub value: String,
}

impl FromStr for HashValue {
    type Err = InvalidHashValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != HASH_HEX_LEN || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(InvalidHashValue {
                value: s.to_string(),
            });
        }
        Ok(Self(s.to_ascii_uppercase()))
    }
}

impl TryFrom<String> for HashValue {
    type Error = InvalidHashValue;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HashValue> for String {
    fn from(hash: HashValue) -> Self {
        hash.0
    }
}

impl AsRef<str> for HashValue {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HashValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for HashValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HashValue({})", self.0)
    }
}
