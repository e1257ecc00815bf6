//! Abstract stream plumbing for the wire protocols.
//!
//! The forwarding protocols are specified over bidirectional framed
//! message streams; this crate provides the stream and streamer
//! abstractions, the length-prefixed frame codec, and prost message
//! helpers. The concrete transport is the embedding node's concern.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use prost::Message;
use tokio_util::codec::Framed;

mod framing;
pub use framing::{FrameCodec, MAX_MESSAGE_SIZE};

mod stream;
pub use stream::{Stream, Streamer};

pub mod testing;

#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("net: i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("net: frame of {0} bytes exceeds limit")]
    FrameTooLarge(usize),

    #[error("net: decode: {0}")]
    Decode(#[from] prost::DecodeError),

    /// The remote closed the stream mid-exchange.
    #[error("net: connection closed")]
    ConnectionClosed,

    #[error("net: peer is blocklisted")]
    Blocklisted,

    #[error("net: no route to peer")]
    NoRoute,
}

/// A raw stream under the length-prefixed frame codec.
pub type FramedStream<S> = Framed<S, FrameCodec>;

/// Wraps a raw stream with the length-prefixed frame codec.
pub fn framed<S: Stream>(stream: S) -> FramedStream<S> {
    Framed::new(stream, FrameCodec::new())
}

/// Encodes and sends one prost message as a frame.
pub async fn send_message<S: Stream, M: Message>(
    framed: &mut Framed<S, FrameCodec>,
    message: &M,
) -> Result<(), NetError> {
    let mut buf = Vec::with_capacity(message.encoded_len());
    message.encode(&mut buf).expect("vec write is infallible");
    framed.send(Bytes::from(buf)).await
}

/// Receives and decodes one framed prost message.
pub async fn recv_message<S: Stream, M: Message + Default>(
    framed: &mut Framed<S, FrameCodec>,
) -> Result<M, NetError> {
    match framed.next().await {
        Some(Ok(frame)) => Ok(M::decode(frame.freeze())?),
        Some(Err(e)) => Err(e),
        None => Err(NetError::ConnectionClosed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, PartialEq, prost::Message)]
    struct Ping {
        #[prost(bytes = "vec", tag = "1")]
        payload: Vec<u8>,
    }

    #[tokio::test]
    async fn test_message_roundtrip() {
        let (a, b) = tokio::io::duplex(1 << 16);
        let mut sender = framed(a);
        let mut receiver = framed(b);

        let message = Ping {
            payload: vec![1, 2, 3],
        };
        send_message(&mut sender, &message).await.unwrap();
        let received: Ping = recv_message(&mut receiver).await.unwrap();
        assert_eq!(received, message);
    }

    #[tokio::test]
    async fn test_closed_stream() {
        let (a, b) = tokio::io::duplex(1 << 16);
        drop(a);
        let mut receiver = framed(b);
        assert!(matches!(
            recv_message::<_, Ping>(&mut receiver).await,
            Err(NetError::ConnectionClosed)
        ));
    }
}
