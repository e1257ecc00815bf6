use std::{cmp::Ordering, sync::Arc, time::SystemTime};

use tracing::debug;
use weft_primitives::{distance_cmp, proximity, SwarmAddress, MAX_BINS};

use crate::{
    metrics::{Collector, Direction, RecordOp},
    BinVisit, PSlice, Peerer, TopologyError,
};

/// The connected-peer topology of the local node.
///
/// Owns the proximity-bucketed peer set and answers closest-peer queries
/// against the local base address. Connection churn is mirrored into the
/// optional peer metrics collector.
#[derive(Debug)]
pub struct Topology {
    base: SwarmAddress,
    peers: PSlice,
    metrics: Option<Arc<Collector>>,
}

impl Topology {
    pub fn new(base: SwarmAddress) -> Self {
        Self {
            base,
            peers: PSlice::new(MAX_BINS),
            metrics: None,
        }
    }

    /// Mirrors connect/disconnect into `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<Collector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn base(&self) -> &SwarmAddress {
        &self.base
    }

    pub fn peers(&self) -> &PSlice {
        &self.peers
    }

    /// Registers a newly connected peer in its proximity bin.
    pub fn connected(&self, peer: SwarmAddress, direction: Direction) -> Result<(), TopologyError> {
        let po = proximity(&self.base, &peer);
        if !self.peers.add(peer, po) {
            return Err(TopologyError::AlreadyConnected);
        }
        debug!(%peer, po, "peer connected");

        if let Some(metrics) = &self.metrics {
            metrics.record(&peer, &[RecordOp::LogIn(SystemTime::now(), direction)]);
        }
        Ok(())
    }

    /// Drops a disconnected peer from its bin. Metrics counters survive
    /// the disconnect.
    pub fn disconnected(&self, peer: &SwarmAddress) -> Result<(), TopologyError> {
        let po = proximity(&self.base, peer);
        if !self.peers.remove(peer, po) {
            return Err(TopologyError::PeerNotFound);
        }
        debug!(%peer, po, "peer disconnected");

        if let Some(metrics) = &self.metrics {
            metrics.record(peer, &[RecordOp::LogOut(SystemTime::now())]);
        }
        Ok(())
    }
}

impl Peerer for Topology {
    fn closest_peer(
        &self,
        target: &SwarmAddress,
        skip: &[SwarmAddress],
    ) -> Result<SwarmAddress, TopologyError> {
        let mut closest: Option<SwarmAddress> = None;

        self.peers.each_bin::<TopologyError>(|peer, _| {
            if skip.contains(&peer) {
                return Ok(BinVisit::Continue);
            }
            match &closest {
                None => closest = Some(peer),
                Some(current) => {
                    if distance_cmp(target, &peer, current) == Ordering::Greater {
                        closest = Some(peer);
                    }
                }
            }
            Ok(BinVisit::Continue)
        })?;

        let closest = closest.ok_or(TopologyError::NotFound)?;

        // the local node wins only when strictly closer
        match distance_cmp(target, &self.base, &closest) {
            Ordering::Greater => Err(TopologyError::WantSelf),
            _ => Ok(closest),
        }
    }

    fn each_peer_rev(
        &self,
        f: &mut dyn FnMut(SwarmAddress, u8) -> Result<BinVisit, TopologyError>,
    ) -> Result<(), TopologyError> {
        self.peers.each_bin_rev(f)
    }
}
