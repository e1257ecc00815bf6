//! Push-sync wire messages.

use weft_primitives::{Chunk, SwarmAddress};

/// Delivery of a chunk to be stored by the receiver.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Delivery {
    #[prost(bytes = "vec", tag = "1")]
    pub address: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub data: Vec<u8>,
}

impl Delivery {
    pub fn new(chunk: &Chunk) -> Self {
        Self {
            address: chunk.address().to_vec(),
            data: chunk.data().to_vec(),
        }
    }

    /// The claimed address; `None` if the field is malformed.
    pub fn swarm_address(&self) -> Option<SwarmAddress> {
        (self.address.len() == 32).then(|| SwarmAddress::from_slice(&self.address))
    }
}

/// Acknowledges storage of the chunk at `address`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Receipt {
    #[prost(bytes = "vec", tag = "1")]
    pub address: Vec<u8>,
}

impl Receipt {
    pub fn new(address: &SwarmAddress) -> Self {
        Self {
            address: address.to_vec(),
        }
    }

    pub fn swarm_address(&self) -> Option<SwarmAddress> {
        (self.address.len() == 32).then(|| SwarmAddress::from_slice(&self.address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_delivery_roundtrip() {
        let chunk = Chunk::new(SwarmAddress::repeat_byte(0x42), vec![1, 2, 3, 4]);
        let delivery = Delivery::new(&chunk);
        let decoded = Delivery::decode(delivery.encode_to_vec().as_slice()).unwrap();

        assert_eq!(decoded, delivery);
        assert_eq!(decoded.swarm_address().unwrap(), *chunk.address());
        assert_eq!(decoded.data, chunk.data().as_ref());
    }

    #[test]
    fn test_receipt_roundtrip() {
        let receipt = Receipt::new(&SwarmAddress::repeat_byte(0x17));
        let decoded = Receipt::decode(receipt.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded.swarm_address().unwrap(), SwarmAddress::repeat_byte(0x17));
    }

    #[test]
    fn test_malformed_address_rejected() {
        let receipt = Receipt {
            address: vec![0; 31],
        };
        assert!(receipt.swarm_address().is_none());
    }
}
