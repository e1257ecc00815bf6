//! Retrieval wire messages: one request, one delivery.

use weft_primitives::SwarmAddress;

/// Asks the remote for the chunk at `address`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Request {
    #[prost(bytes = "vec", tag = "1")]
    pub address: Vec<u8>,
}

impl Request {
    pub fn new(address: &SwarmAddress) -> Self {
        Self {
            address: address.to_vec(),
        }
    }

    /// The requested address; `None` if the field is malformed.
    pub fn swarm_address(&self) -> Option<SwarmAddress> {
        (self.address.len() == 32).then(|| SwarmAddress::from_slice(&self.address))
    }
}

/// Carries the chunk bytes answering a [`Request`].
#[derive(Clone, PartialEq, prost::Message)]
pub struct Delivery {
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
}
