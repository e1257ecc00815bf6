//! Length-prefixed frame codec.
//!
//! Each frame is a 4-byte big-endian length followed by the payload. The
//! length is validated against [`MAX_MESSAGE_SIZE`] before any
//! allocation; oversized frames fail the stream.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::NetError;

/// Upper bound on a single protocol message: a chunk plus envelope
/// headroom.
pub const MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

const HEADER_LEN: usize = 4;

/// Frame codec used with [`tokio_util::codec::Framed`] over any
/// [`crate::Stream`].
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            max_frame_size: MAX_MESSAGE_SIZE,
        }
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = NetError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > self.max_frame_size {
            return Err(NetError::FrameTooLarge(item.len()));
        }
        dst.reserve(HEADER_LEN + item.len());
        dst.put_u32(item.len() as u32);
        dst.put_slice(&item);
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = BytesMut;
    type Error = NetError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let len = u32::from_be_bytes(src[..HEADER_LEN].try_into().expect("header is 4 bytes"))
            as usize;
        if len > self.max_frame_size {
            return Err(NetError::FrameTooLarge(len));
        }

        if src.len() < HEADER_LEN + len {
            src.reserve(HEADER_LEN + len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        Ok(Some(src.split_to(len)))
    }
}
