//! Proximity-ordered peer storage.
//!
//! Peers are organized into bins by their proximity order to the base
//! address. Bins preserve insertion order and hold no duplicates.

use parking_lot::RwLock;
use weft_primitives::SwarmAddress;

use crate::BinVisit;

/// The ordered, proximity-bucketed set of connected peer addresses.
#[derive(Debug)]
pub struct PSlice {
    bins: Vec<RwLock<Vec<SwarmAddress>>>,
}

impl PSlice {
    /// Creates a pslice with `max_bins` buckets; proximity orders beyond
    /// the deepest bin saturate into it.
    pub fn new(max_bins: u8) -> Self {
        Self {
            bins: (0..max_bins).map(|_| RwLock::new(Vec::new())).collect(),
        }
    }

    fn clamp(&self, po: u8) -> usize {
        (po as usize).min(self.bins.len() - 1)
    }

    /// Adds `peer` to the bin for `po`. Returns false if already present.
    pub fn add(&self, peer: SwarmAddress, po: u8) -> bool {
        let mut bin = self.bins[self.clamp(po)].write();
        if bin.contains(&peer) {
            return false;
        }
        bin.push(peer);
        true
    }

    /// Removes `peer` from the bin for `po`. Returns false if absent.
    pub fn remove(&self, peer: &SwarmAddress, po: u8) -> bool {
        let mut bin = self.bins[self.clamp(po)].write();
        match bin.iter().position(|p| p == peer) {
            Some(idx) => {
                bin.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Whether `peer` is present in any bin.
    pub fn exists(&self, peer: &SwarmAddress) -> bool {
        self.bins.iter().any(|bin| bin.read().contains(peer))
    }

    pub fn bin_size(&self, po: u8) -> usize {
        self.bins[self.clamp(po)].read().len()
    }

    pub fn len(&self) -> usize {
        self.bins.iter().map(|bin| bin.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.iter().all(|bin| bin.read().is_empty())
    }

    /// The smallest bin index holding no peers; the boolean is true iff
    /// every bin is populated.
    pub fn shallowest_empty(&self) -> (u8, bool) {
        for (po, bin) in self.bins.iter().enumerate() {
            if bin.read().is_empty() {
                return (po as u8, false);
            }
        }
        (0, true)
    }

    /// Visits peers from the deepest bin down to bin 0, insertion order
    /// within each bin.
    pub fn each_bin<E>(
        &self,
        mut f: impl FnMut(SwarmAddress, u8) -> Result<BinVisit, E>,
    ) -> Result<(), E> {
        for po in (0..self.bins.len()).rev() {
            if self.visit_bin(po, &mut f)? {
                return Ok(());
            }
        }
        Ok(())
    }

    /// Visits peers from bin 0 upward.
    pub fn each_bin_rev<E>(
        &self,
        mut f: impl FnMut(SwarmAddress, u8) -> Result<BinVisit, E>,
    ) -> Result<(), E> {
        for po in 0..self.bins.len() {
            if self.visit_bin(po, &mut f)? {
                return Ok(());
            }
        }
        Ok(())
    }

    /// Returns true when iteration should stop entirely.
    fn visit_bin<E>(
        &self,
        po: usize,
        f: &mut impl FnMut(SwarmAddress, u8) -> Result<BinVisit, E>,
    ) -> Result<bool, E> {
        // snapshot so the callback can mutate the pslice
        let peers = self.bins[po].read().clone();
        for peer in peers {
            match f(peer, po as u8)? {
                BinVisit::Continue => {}
                BinVisit::NextBin => return Ok(false),
                BinVisit::Stop => return Ok(true),
            }
        }
        Ok(false)
    }
}
