//! Peer topology: the proximity-bucketed peer set and closest-peer
//! selection.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

use weft_primitives::SwarmAddress;

mod pslice;
pub use pslice::PSlice;

mod driver;
pub use driver::Topology;

pub mod metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TopologyError {
    /// The local node is closer to the target than any connected peer.
    /// A signal, not a failure: the caller acts locally.
    #[error("topology: want self")]
    WantSelf,

    /// No eligible peer.
    #[error("topology: no peer found")]
    NotFound,

    #[error("topology: already connected")]
    AlreadyConnected,

    #[error("topology: peer not found")]
    PeerNotFound,
}

/// Verdict returned by bin iteration callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinVisit {
    /// Proceed to the next peer.
    Continue,
    /// Skip the rest of the current bin.
    NextBin,
    /// Terminate the iteration.
    Stop,
}

/// Peer suggestion surface consumed by the forwarding protocols.
pub trait Peerer: Send + Sync {
    /// The connected peer whose address is closest to `target` by XOR
    /// distance, excluding `skip`.
    ///
    /// [`TopologyError::WantSelf`] when the local node is strictly closer
    /// than every candidate, [`TopologyError::NotFound`] when no candidate
    /// exists.
    fn closest_peer(
        &self,
        target: &SwarmAddress,
        skip: &[SwarmAddress],
    ) -> Result<SwarmAddress, TopologyError>;

    /// Visits peers from bin 0 upward to the deepest bin.
    fn each_peer_rev(
        &self,
        f: &mut dyn FnMut(SwarmAddress, u8) -> Result<BinVisit, TopologyError>,
    ) -> Result<(), TopologyError>;
}
