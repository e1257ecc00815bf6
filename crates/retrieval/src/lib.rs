//! Chunk retrieval: single-hop request/delivery exchange with the peer
//! closest to the wanted address.
//!
//! The client asks the closest connected peer, reserves the receipt price
//! for the duration of the exchange and credits the peer on delivery. The
//! serving handler answers from the local store and debits the requester.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, trace};
use weft_accounting::{Accounting, AccountingError, Pricer};
use weft_net::{framed, recv_message, send_message, NetError, Stream, Streamer};
use weft_primitives::SwarmAddress;
use weft_storage::{ModeGet, StorageError, Storer};
use weft_topology::{Peerer, TopologyError};

mod messages;
pub use messages::{Delivery, Request};

/// Deadline for one request/delivery exchange.
pub const RETRIEVE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Net(#[from] NetError),

    #[error(transparent)]
    Accounting(#[from] AccountingError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("retrieval: deadline exceeded")]
    Timeout,

    #[error("retrieval: malformed request")]
    MalformedRequest,
}

/// Fetches chunk bytes for an address from the overlay.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, address: &SwarmAddress) -> Result<Bytes, RetrievalError>;
}

/// The retrieval protocol client and server.
pub struct Retrieval<S: Streamer> {
    streamer: Arc<S>,
    topology: Arc<dyn Peerer>,
    storer: Arc<dyn Storer>,
    accounting: Arc<dyn Accounting>,
    pricer: Arc<dyn Pricer>,
}

impl<S: Streamer> std::fmt::Debug for Retrieval<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retrieval").finish_non_exhaustive()
    }
}

impl<S: Streamer> Retrieval<S> {
    pub fn new(
        streamer: Arc<S>,
        topology: Arc<dyn Peerer>,
        storer: Arc<dyn Storer>,
        accounting: Arc<dyn Accounting>,
        pricer: Arc<dyn Pricer>,
    ) -> Self {
        Self {
            streamer,
            topology,
            storer,
            accounting,
            pricer,
        }
    }

    /// Serves one inbound retrieval stream: read the request, answer from
    /// the local store, debit the requester. Any error resets the stream
    /// by dropping it.
    pub async fn handle<T: Stream>(
        &self,
        peer: SwarmAddress,
        stream: T,
    ) -> Result<(), RetrievalError> {
        let mut framed = framed(stream);

        let request: Request = recv_message(&mut framed).await?;
        let address = request
            .swarm_address()
            .ok_or(RetrievalError::MalformedRequest)?;
        trace!(%peer, %address, "serving retrieval request");

        let chunk = self.storer.get(ModeGet::Request, &address)?;
        send_message(
            &mut framed,
            &Delivery {
                data: chunk.data().to_vec(),
            },
        )
        .await?;

        self.accounting.debit(&peer, self.pricer.price(&address))?;
        Ok(())
    }
}

#[async_trait]
impl<S: Streamer> Retriever for Retrieval<S> {
    async fn retrieve(&self, address: &SwarmAddress) -> Result<Bytes, RetrievalError> {
        let peer = self.topology.closest_peer(address, &[])?;
        let price = self.pricer.peer_price(&peer, address);

        self.accounting.reserve(&peer, price).await?;
        let result = self.exchange(&peer, address).await;
        self.accounting.release(&peer, price);

        let data = result?;
        self.accounting.credit(&peer, price)?;
        debug!(%address, %peer, "retrieved chunk");
        Ok(data)
    }
}

impl<S: Streamer> Retrieval<S> {
    async fn exchange(
        &self,
        peer: &SwarmAddress,
        address: &SwarmAddress,
    ) -> Result<Bytes, RetrievalError> {
        let stream = self.streamer.new_stream(peer).await?;
        let mut framed = framed(stream);

        send_message(&mut framed, &Request::new(address)).await?;
        let delivery: Delivery = tokio::time::timeout(RETRIEVE_TIMEOUT, recv_message(&mut framed))
            .await
            .map_err(|_| RetrievalError::Timeout)??;

        Ok(Bytes::from(delivery.data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_accounting::{FixedPricer, MemAccounting};
    use weft_net::testing::TestStreamer;
    use weft_primitives::ContentChunk;
    use weft_storage::{MemStorer, ModePut};
    use weft_topology::{metrics::Direction, Topology};

    struct Node {
        streamer: Arc<TestStreamer>,
        topology: Arc<Topology>,
        storer: MemStorer,
        accounting: Arc<MemAccounting>,
    }

    fn node(base: SwarmAddress) -> (Node, Arc<Retrieval<TestStreamer>>) {
        let streamer = Arc::new(TestStreamer::new());
        let topology = Arc::new(Topology::new(base));
        let storer = MemStorer::new(base);
        let accounting = Arc::new(MemAccounting::default());
        let retrieval = Arc::new(Retrieval::new(
            Arc::clone(&streamer),
            topology.clone() as Arc<dyn Peerer>,
            Arc::new(storer.clone()) as Arc<dyn Storer>,
            accounting.clone() as Arc<dyn Accounting>,
            Arc::new(FixedPricer::default()) as Arc<dyn Pricer>,
        ));
        (
            Node {
                streamer,
                topology,
                storer,
                accounting,
            },
            retrieval,
        )
    }

    #[tokio::test]
    async fn test_retrieve_from_serving_peer() {
        let chunk = ContentChunk::new(b"remote bytes".to_vec()).unwrap().to_chunk();

        // peer one bit off the chunk address, local base far from it
        let mut peer_bytes = chunk.address().0;
        peer_bytes[31] ^= 0x01;
        let peer = SwarmAddress::from(peer_bytes);
        let mut base_bytes = chunk.address().0;
        base_bytes[0] ^= 0x80;

        let (client, retrieval) = node(SwarmAddress::from(base_bytes));
        let (server, server_retrieval) = node(peer);
        server.storer.put(ModePut::Upload, &[chunk.clone()]).unwrap();

        client
            .topology
            .connected(peer, Direction::Outbound)
            .unwrap();
        client.streamer.register(peer, move |from, stream| {
            let retrieval = Arc::clone(&server_retrieval);
            Box::pin(async move {
                let _ = retrieval.handle(from, stream).await;
            })
        });

        let data = retrieval.retrieve(chunk.address()).await.unwrap();
        assert_eq!(&data, chunk.data());

        // requester credited the server for the service
        assert!(client.accounting.balance(&peer) < 0);
        let _ = server;
    }

    #[tokio::test]
    async fn test_retrieve_no_peer() {
        let (_, retrieval) = node(SwarmAddress::ZERO);
        assert!(matches!(
            retrieval.retrieve(&SwarmAddress::repeat_byte(1)).await,
            Err(RetrievalError::Topology(TopologyError::NotFound))
        ));
    }

    #[tokio::test]
    async fn test_serving_miss_resets_stream() {
        let (client, retrieval) = node(SwarmAddress::ZERO);
        let (server, server_retrieval) = node(SwarmAddress::repeat_byte(0x80));

        let peer = *server.storer.base();
        client
            .topology
            .connected(peer, Direction::Outbound)
            .unwrap();
        client.streamer.register(peer, move |from, stream| {
            let retrieval = Arc::clone(&server_retrieval);
            Box::pin(async move {
                // serving fails on the local miss; the stream just drops
                assert!(matches!(
                    retrieval.handle(from, stream).await,
                    Err(RetrievalError::Storage(StorageError::NotFound))
                ));
            })
        });

        // target next to the serving peer so the lookup resolves to it
        assert!(matches!(
            retrieval.retrieve(&SwarmAddress::repeat_byte(0x81)).await,
            Err(RetrievalError::Net(NetError::ConnectionClosed))
        ));
        let _ = server;
    }
}
