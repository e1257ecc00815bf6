use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use weft_primitives::SwarmAddress;

use crate::NetError;

/// A bidirectional byte stream to a peer. Anything the transport hands us
/// qualifies; closing either half resets the exchange.
pub trait Stream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Stream for T {}

/// Opens streams to peers and maintains the transport blocklist.
#[async_trait]
pub trait Streamer: Send + Sync {
    type Stream: Stream;

    /// Opens a fresh protocol stream to `peer`.
    async fn new_stream(&self, peer: &SwarmAddress) -> Result<Self::Stream, NetError>;

    /// Refuses streams to and from `peer` for `duration`.
    fn blocklist(&self, peer: &SwarmAddress, duration: Duration);

    fn is_blocklisted(&self, peer: &SwarmAddress) -> bool;
}
