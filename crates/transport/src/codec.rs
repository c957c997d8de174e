//! Length-prefixed postcard frames.
//!
//! A frame is a 4-byte big-endian payload length followed by the payload.

use std::marker::PhantomData;

use bytes::{Buf, BufMut, BytesMut};
use serde::{Serialize, de::DeserializeOwned};

/// Default upper bound on a frame payload (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

const LENGTH_PREFIX: usize = 4;

/// Error type for frame encoding and decoding.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Socket failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] postcard::Error),

    /// Frame exceeds the configured maximum.
    #[error("frame of {size} bytes exceeds maximum of {max}")]
    FrameTooLarge {
        /// Announced or encoded payload size.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// The remote closed the connection before answering.
    #[error("connection closed")]
    ConnectionClosed,
}

/// Codec that decodes `In` and encodes `Out`.
///
/// A server uses `MessageCodec<Request, Response>`, its client the mirror
/// image.
pub struct MessageCodec<In, Out> {
    max_frame_size: usize,
    _marker: PhantomData<fn(Out) -> In>,
}

impl<In, Out> MessageCodec<In, Out> {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            max_frame_size,
            _marker: PhantomData,
        }
    }
}

impl<In, Out> Default for MessageCodec<In, Out> {
    fn default() -> Self {
        Self::new(MAX_FRAME_SIZE)
    }
}

impl<In, Out: Serialize> asynchronous_codec::Encoder for MessageCodec<In, Out> {
    type Item<'a> = Out;
    type Error = CodecError;

    fn encode(&mut self, item: Self::Item<'_>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = postcard::to_allocvec(&item)?;
        let size = payload.len();
        if size > self.max_frame_size {
            return Err(CodecError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            });
        }
        let prefix = u32::try_from(size).map_err(|_| CodecError::FrameTooLarge {
            size,
            max: self.max_frame_size,
        })?;
        dst.reserve(LENGTH_PREFIX + size);
        dst.put_u32(prefix);
        dst.extend_from_slice(&payload);
        Ok(())
    }
}

impl<In: DeserializeOwned, Out> asynchronous_codec::Decoder for MessageCodec<In, Out> {
    type Item = In;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(prefix) = src.get(..LENGTH_PREFIX) else {
            return Ok(None);
        };
        let mut length = [0u8; LENGTH_PREFIX];
        length.copy_from_slice(prefix);
        let size = u32::from_be_bytes(length) as usize;

        if size > self.max_frame_size {
            return Err(CodecError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            });
        }
        if src.len() < LENGTH_PREFIX + size {
            src.reserve(LENGTH_PREFIX + size - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX);
        let payload = src.split_to(size);
        Ok(Some(postcard::from_bytes(&payload)?))
    }
}
