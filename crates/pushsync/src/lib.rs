//! Push-sync: forwarding freshly stored chunks toward the node closest to
//! their address, acknowledged by receipts.
//!
//! The originator pushes a chunk to its closest connected peer and waits
//! for a receipt, retrying through the next-closest peers and
//! blocklisting unresponsive ones. Every intermediate node either stores
//! the chunk (when it is the closest) or forwards it one hop further,
//! relaying the receipt back and settling the exchange through the
//! accounting hooks.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

use std::{cmp::Ordering, sync::Arc, time::Duration};

use bytes::Bytes;
use tracing::{debug, trace, warn};
use weft_accounting::{Accounting, AccountingError, Pricer};
use weft_net::{framed, recv_message, send_message, FramedStream, NetError, Stream, Streamer};
use weft_primitives::{distance_cmp, Chunk, DeliveryCallback, SwarmAddress, ValidatorWithCallback};
use weft_storage::{ModePut, StorageError, Storer, TagState, Tags};
use weft_topology::{BinVisit, Peerer, TopologyError};

mod messages;
pub use messages::{Delivery, Receipt as ReceiptMsg};

/// Attempted peers per push before giving up.
pub const MAX_PEERS: usize = 5;

/// Deadline for sending a delivery or awaiting its receipt.
pub const RECEIPT_TIMEOUT: Duration = Duration::from_secs(3);

/// How long an unresponsive peer is refused streams.
pub const BLOCKLIST_DURATION: Duration = Duration::from_secs(60);

/// A collected storage acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    pub address: SwarmAddress,
}

#[derive(Debug, thiserror::Error)]
pub enum PushSyncError {
    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Net(#[from] NetError),

    #[error(transparent)]
    Accounting(#[from] AccountingError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("pushsync: invalid chunk")]
    InvalidChunk,

    /// The receipt named a different address than the pushed chunk.
    #[error("pushsync: invalid receipt from peer {0}")]
    InvalidReceipt(SwarmAddress),

    #[error("pushsync: deadline exceeded")]
    Timeout,

    #[error("pushsync: malformed message")]
    MalformedMessage,
}

/// The push-sync protocol: originator surface and forwarder handler.
pub struct PushSync<S: Streamer> {
    streamer: Arc<S>,
    topology: Arc<dyn Peerer>,
    storer: Arc<dyn Storer>,
    validator: Arc<dyn ValidatorWithCallback>,
    accounting: Arc<dyn Accounting>,
    pricer: Arc<dyn Pricer>,
    tags: Arc<Tags>,
}

impl<S: Streamer> std::fmt::Debug for PushSync<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushSync").finish_non_exhaustive()
    }
}

impl<S: Streamer> PushSync<S> {
    pub fn new(
        streamer: Arc<S>,
        topology: Arc<dyn Peerer>,
        storer: Arc<dyn Storer>,
        validator: Arc<dyn ValidatorWithCallback>,
        accounting: Arc<dyn Accounting>,
        pricer: Arc<dyn Pricer>,
        tags: Arc<Tags>,
    ) -> Self {
        Self {
            streamer,
            topology,
            storer,
            validator,
            accounting,
            pricer,
            tags,
        }
    }

    /// Pushes `chunk` to the connected peer closest to its address and
    /// returns the collected receipt.
    ///
    /// Up to [`MAX_PEERS`] peers are attempted; peers that time out are
    /// blocklisted for [`BLOCKLIST_DURATION`]. When the local node itself
    /// is the closest, a synthetic receipt is returned without opening a
    /// stream.
    pub async fn push_chunk_to_closest(&self, chunk: &Chunk) -> Result<Receipt, PushSyncError> {
        let mut skip_peers: Vec<SwarmAddress> = Vec::new();
        let mut last_err: Option<PushSyncError> = None;

        for attempt in 0..MAX_PEERS {
            let peer = if attempt == 0 {
                match self.topology.closest_peer(chunk.address(), &[]) {
                    Ok(peer) => peer,
                    // no candidate yet; the next round may see one
                    Err(TopologyError::NotFound) => continue,
                    Err(TopologyError::WantSelf) => {
                        // the local node is the closest: acknowledge
                        // locally, no stream involved
                        self.bump_sent(chunk);
                        return Ok(Receipt {
                            address: *chunk.address(),
                        });
                    }
                    Err(e) => return Err(e.into()),
                }
            } else {
                self.closest_skipping(chunk.address(), &skip_peers)?
            };
            skip_peers.push(peer);

            let price = self.pricer.peer_price(&peer, chunk.address());
            self.accounting.reserve(&peer, price).await?;
            let result = self.exchange(&peer, chunk).await;
            self.accounting.release(&peer, price);

            match result {
                Ok(receipt_address) => {
                    if receipt_address != *chunk.address() {
                        return Err(PushSyncError::InvalidReceipt(peer));
                    }
                    self.accounting.credit(&peer, price)?;
                    self.bump_sent(chunk);
                    debug!(address = %chunk.address(), %peer, "chunk pushed");
                    return Ok(Receipt {
                        address: receipt_address,
                    });
                }
                Err(e) => {
                    if matches!(e, PushSyncError::Timeout) {
                        warn!(%peer, "peer unresponsive, blocklisting");
                        self.streamer.blocklist(&peer, BLOCKLIST_DURATION);
                    }
                    debug!(%peer, error = %e, "push attempt failed");
                    last_err = Some(e);
                }
            }
        }

        trace!(address = %chunk.address(), "push failed, max peers reached");
        Err(last_err.unwrap_or(PushSyncError::Topology(TopologyError::NotFound)))
    }

    /// Handles one inbound push stream: validate, then store locally when
    /// this node (or the sender) is the closest, otherwise forward one hop
    /// and relay the receipt. Errors reset the stream by dropping it.
    pub async fn handle<T: Stream>(
        &self,
        sender: SwarmAddress,
        stream: T,
    ) -> Result<(), PushSyncError> {
        let mut inbound = framed(stream);

        let delivery: Delivery = recv_message(&mut inbound).await?;
        let address = delivery
            .swarm_address()
            .ok_or(PushSyncError::MalformedMessage)?;
        let chunk = Chunk::new(address, Bytes::from(delivery.data));
        trace!(%address, %sender, "push delivery received");

        let (valid, callback) = self.validator.validate_with_callback(&chunk);
        if !valid {
            return Err(PushSyncError::InvalidChunk);
        }

        let peer = match self.topology.closest_peer(&address, &[]) {
            Err(TopologyError::WantSelf) => {
                return self.store_and_ack(&mut inbound, sender, chunk, callback).await;
            }
            // the sender believes we are the closest and we believe the
            // sender is: store rather than bounce the chunk back
            Ok(peer) if peer == sender => {
                return self.store_and_ack(&mut inbound, sender, chunk, callback).await;
            }
            Ok(peer) => peer,
            Err(e) => return Err(e.into()),
        };

        let price = self.pricer.peer_price(&peer, &address);
        self.accounting.reserve(&peer, price).await?;
        let result = self.exchange(&peer, &chunk).await;
        self.accounting.release(&peer, price);

        let receipt_address = result?;
        if receipt_address != address {
            return Err(PushSyncError::InvalidReceipt(peer));
        }
        self.accounting.credit(&peer, price)?;

        self.send_receipt(&mut inbound, &receipt_address).await?;
        self.accounting.debit(&sender, self.pricer.price(&address))?;
        debug!(%address, %peer, "chunk forwarded");
        Ok(())
    }

    /// Stores the chunk as the terminal node and acknowledges the sender.
    async fn store_and_ack<T: Stream>(
        &self,
        inbound: &mut FramedStream<T>,
        sender: SwarmAddress,
        chunk: Chunk,
        callback: Option<DeliveryCallback>,
    ) -> Result<(), PushSyncError> {
        let address = *chunk.address();
        self.storer.put(ModePut::Sync, &[chunk])?;
        if let Some(callback) = callback {
            callback();
        }

        self.send_receipt(inbound, &address).await?;
        self.accounting.debit(&sender, self.pricer.price(&address))?;
        debug!(%address, %sender, "chunk stored, receipt sent");
        Ok(())
    }

    /// One outbound delivery/receipt exchange under the receipt deadline.
    async fn exchange(
        &self,
        peer: &SwarmAddress,
        chunk: &Chunk,
    ) -> Result<SwarmAddress, PushSyncError> {
        let stream = self.streamer.new_stream(peer).await?;
        let mut outbound = framed(stream);

        tokio::time::timeout(
            RECEIPT_TIMEOUT,
            send_message(&mut outbound, &Delivery::new(chunk)),
        )
        .await
        .map_err(|_| PushSyncError::Timeout)??;

        let receipt: ReceiptMsg =
            tokio::time::timeout(RECEIPT_TIMEOUT, recv_message(&mut outbound))
                .await
                .map_err(|_| PushSyncError::Timeout)??;

        receipt
            .swarm_address()
            .ok_or(PushSyncError::MalformedMessage)
    }

    async fn send_receipt<T: Stream>(
        &self,
        inbound: &mut FramedStream<T>,
        address: &SwarmAddress,
    ) -> Result<(), PushSyncError> {
        tokio::time::timeout(
            RECEIPT_TIMEOUT,
            send_message(inbound, &ReceiptMsg::new(address)),
        )
        .await
        .map_err(|_| PushSyncError::Timeout)?
        .map_err(Into::into)
    }

    /// Next-closest peer by reverse bin scan, ignoring `skip`.
    fn closest_skipping(
        &self,
        address: &SwarmAddress,
        skip: &[SwarmAddress],
    ) -> Result<SwarmAddress, PushSyncError> {
        let mut closest: Option<SwarmAddress> = None;
        self.topology.each_peer_rev(&mut |peer, _| {
            if skip.contains(&peer) {
                return Ok(BinVisit::Continue);
            }
            match &closest {
                None => closest = Some(peer),
                Some(current) => {
                    if distance_cmp(address, &peer, current) == Ordering::Greater {
                        closest = Some(peer);
                    }
                }
            }
            Ok(BinVisit::Continue)
        })?;
        closest.ok_or(PushSyncError::Topology(TopologyError::NotFound))
    }

    /// Best-effort bump of the chunk's tag "sent" counter.
    fn bump_sent(&self, chunk: &Chunk) {
        if let Some(tag) = chunk.tag_id().and_then(|uid| self.tags.get(uid)) {
            tag.inc(TagState::Sent);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
    use tokio::io::AsyncReadExt;
    use weft_accounting::{FixedPricer, MemAccounting};
    use weft_net::testing::TestStreamer;
    use weft_primitives::{CallbackValidator, ContentChunk, ValidatorSet};
    use weft_storage::MemStorer;
    use weft_topology::{metrics::Direction, Topology};

    struct Harness {
        streamer: Arc<TestStreamer>,
        topology: Arc<Topology>,
        storer: MemStorer,
        accounting: Arc<MemAccounting>,
        tags: Arc<Tags>,
        pushsync: Arc<PushSync<TestStreamer>>,
    }

    fn harness(base: SwarmAddress) -> Harness {
        harness_with_validator(base, Arc::new(ValidatorSet::standard()))
    }

    fn harness_with_validator(
        base: SwarmAddress,
        validator: Arc<dyn ValidatorWithCallback>,
    ) -> Harness {
        let streamer = Arc::new(TestStreamer::new());
        let topology = Arc::new(Topology::new(base));
        let storer = MemStorer::new(base);
        let accounting = Arc::new(MemAccounting::default());
        let tags = Tags::new();
        let pushsync = Arc::new(PushSync::new(
            Arc::clone(&streamer),
            Arc::clone(&topology) as Arc<dyn Peerer>,
            Arc::new(storer.clone()) as Arc<dyn Storer>,
            validator,
            Arc::clone(&accounting) as Arc<dyn Accounting>,
            Arc::new(FixedPricer::default()) as Arc<dyn Pricer>,
            Arc::clone(&tags),
        ));
        Harness {
            streamer,
            topology,
            storer,
            accounting,
            tags,
            pushsync,
        }
    }

    fn flip(address: &SwarmAddress, byte: usize, mask: u8) -> SwarmAddress {
        let mut bytes = address.0;
        bytes[byte] ^= mask;
        SwarmAddress::from(bytes)
    }

    /// Responder that acknowledges the delivered address.
    fn ack_handler(
        streamer: &TestStreamer,
        peer: SwarmAddress,
    ) {
        streamer.register(peer, |_, stream| {
            Box::pin(async move {
                let mut framed = framed(stream);
                let delivery: Delivery = recv_message(&mut framed).await.unwrap();
                let address = delivery.swarm_address().unwrap();
                send_message(&mut framed, &ReceiptMsg::new(&address))
                    .await
                    .unwrap();
            })
        });
    }

    #[tokio::test]
    async fn test_push_self_closest_returns_synthetic_receipt() {
        let content = ContentChunk::new(b"self stored".to_vec()).unwrap();
        let address = content.address();

        // base one bit off the chunk, the only peer far away
        let harness = harness(flip(&address, 31, 0x01));
        let far_peer = flip(&address, 0, 0x80);
        harness
            .topology
            .connected(far_peer, Direction::Outbound)
            .unwrap();
        // no handler registered: opening any stream would fail the push

        let tag = harness.tags.create();
        let chunk = content.to_chunk().with_tag_id(tag.uid());
        let receipt = harness.pushsync.push_chunk_to_closest(&chunk).await.unwrap();

        assert_eq!(receipt.address, *chunk.address());
        assert_eq!(tag.get(TagState::Sent), 1);
        assert!(harness.streamer.blocklisted_peers().is_empty());
    }

    #[tokio::test]
    async fn test_push_no_peers_gives_not_found() {
        let content = ContentChunk::new(b"lonely".to_vec()).unwrap();
        let harness = harness(flip(&content.address(), 0, 0x80));

        assert!(matches!(
            harness.pushsync.push_chunk_to_closest(&content.to_chunk()).await,
            Err(PushSyncError::Topology(TopologyError::NotFound))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_retry_blocklists_unresponsive_peer() {
        let content = ContentChunk::new(b"retry chunk".to_vec()).unwrap();
        let address = content.address();
        let chunk = content.to_chunk();

        let harness = harness(flip(&address, 0, 0x80));
        let peer_a = flip(&address, 31, 0x01); // closest, unresponsive
        let peer_b = flip(&address, 31, 0x02); // next closest, healthy
        harness.topology.connected(peer_a, Direction::Outbound).unwrap();
        harness.topology.connected(peer_b, Direction::Outbound).unwrap();

        harness.streamer.register(peer_a, |_, mut stream| {
            Box::pin(async move {
                // swallow the delivery and stall past the receipt deadline
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await;
                tokio::time::sleep(Duration::from_secs(600)).await;
            })
        });
        ack_handler(&harness.streamer, peer_b);

        let receipt = harness.pushsync.push_chunk_to_closest(&chunk).await.unwrap();
        assert_eq!(receipt.address, *chunk.address());
        assert_eq!(harness.streamer.blocklisted_peers(), vec![peer_a]);

        // the healthy peer was credited for the receipt
        assert!(harness.accounting.balance(&peer_b) < 0);
    }

    #[tokio::test]
    async fn test_push_invalid_receipt_fails_permanently() {
        let content = ContentChunk::new(b"mismatched".to_vec()).unwrap();
        let address = content.address();

        let harness = harness(flip(&address, 0, 0x80));
        let peer_a = flip(&address, 31, 0x01);
        let peer_b = flip(&address, 31, 0x02);
        harness.topology.connected(peer_a, Direction::Outbound).unwrap();
        harness.topology.connected(peer_b, Direction::Outbound).unwrap();

        harness.streamer.register(peer_a, |_, stream| {
            Box::pin(async move {
                let mut framed = framed(stream);
                let _: Delivery = recv_message(&mut framed).await.unwrap();
                send_message(&mut framed, &ReceiptMsg::new(&SwarmAddress::ZERO))
                    .await
                    .unwrap();
            })
        });
        let contacted = Arc::new(AtomicBool::new(false));
        let contacted_flag = Arc::clone(&contacted);
        harness.streamer.register(peer_b, move |_, _| {
            let contacted = Arc::clone(&contacted_flag);
            Box::pin(async move {
                contacted.store(true, AtomicOrdering::SeqCst);
            })
        });

        assert!(matches!(
            harness.pushsync.push_chunk_to_closest(&content.to_chunk()).await,
            Err(PushSyncError::InvalidReceipt(peer)) if peer == peer_a
        ));
        assert!(!contacted.load(AtomicOrdering::SeqCst), "no further attempts");
    }

    #[tokio::test]
    async fn test_handler_stores_when_closest() {
        let content = ContentChunk::new(b"terminal".to_vec()).unwrap();
        let address = content.address();

        let delivered = Arc::new(AtomicBool::new(false));
        let delivered_flag = Arc::clone(&delivered);
        let validator = Arc::new(CallbackValidator::new(
            ValidatorSet::standard(),
            Arc::new(move |_chunk| delivered_flag.store(true, AtomicOrdering::SeqCst)),
        ));

        // the local node is closest; the sender is the only peer
        let harness = harness_with_validator(flip(&address, 31, 0x01), validator);
        let sender = flip(&address, 0, 0x80);
        harness.topology.connected(sender, Direction::Inbound).unwrap();

        let (client, server) = tokio::io::duplex(1 << 20);
        let pushsync = Arc::clone(&harness.pushsync);
        let handler = tokio::spawn(async move { pushsync.handle(sender, server).await });

        let mut framed_client = framed(client);
        send_message(&mut framed_client, &Delivery::new(&content.to_chunk()))
            .await
            .unwrap();
        let receipt: ReceiptMsg = recv_message(&mut framed_client).await.unwrap();

        assert_eq!(receipt.swarm_address().unwrap(), address);
        handler.await.unwrap().unwrap();

        // stored under sync mode, delivery callback fired, sender debited
        assert!(harness.storer.has(&address).unwrap());
        assert!(delivered.load(AtomicOrdering::SeqCst));
        assert!(harness.accounting.balance(&sender) > 0);
    }

    #[tokio::test]
    async fn test_handler_forwards_toward_closer_peer() {
        let content = ContentChunk::new(b"pass it on".to_vec()).unwrap();
        let address = content.address();

        let harness = harness(flip(&address, 0, 0x80));
        let next_hop = flip(&address, 31, 0x01);
        let sender = flip(&address, 1, 0x40);
        harness.topology.connected(next_hop, Direction::Outbound).unwrap();
        harness.topology.connected(sender, Direction::Inbound).unwrap();
        ack_handler(&harness.streamer, next_hop);

        let (client, server) = tokio::io::duplex(1 << 20);
        let pushsync = Arc::clone(&harness.pushsync);
        let handler = tokio::spawn(async move { pushsync.handle(sender, server).await });

        let mut framed_client = framed(client);
        send_message(&mut framed_client, &Delivery::new(&content.to_chunk()))
            .await
            .unwrap();
        let receipt: ReceiptMsg = recv_message(&mut framed_client).await.unwrap();

        assert_eq!(receipt.swarm_address().unwrap(), address);
        handler.await.unwrap().unwrap();

        // relayed, not stored; accounting settled both ways
        assert!(!harness.storer.has(&address).unwrap());
        assert!(harness.accounting.balance(&next_hop) < 0, "next hop credited");
        assert!(harness.accounting.balance(&sender) > 0, "sender debited");
    }

    #[tokio::test]
    async fn test_handler_rejects_invalid_chunk() {
        let harness = harness(SwarmAddress::ZERO);
        let sender = SwarmAddress::repeat_byte(0x80);

        let (client, server) = tokio::io::duplex(1 << 20);
        let pushsync = Arc::clone(&harness.pushsync);
        let handler = tokio::spawn(async move { pushsync.handle(sender, server).await });

        let forged = Chunk::new(SwarmAddress::repeat_byte(0x55), vec![0u8; 64]);
        let mut framed_client = framed(client);
        send_message(&mut framed_client, &Delivery::new(&forged))
            .await
            .unwrap();

        assert!(matches!(
            handler.await.unwrap(),
            Err(PushSyncError::InvalidChunk)
        ));
        // the stream was reset without a receipt
        assert!(matches!(
            recv_message::<_, ReceiptMsg>(&mut framed_client).await,
            Err(NetError::ConnectionClosed)
        ));
    }
}
