//! Bandwidth accounting hooks and chunk pricing.
//!
//! The forwarding protocols reserve the price of a receipt before opening
//! a stream, credit the serving peer once the exchange succeeds, and debit
//! the requesting peer for the service rendered. Settlement of accumulated
//! balances is outside this crate; only the hooks are defined here.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::trace;
use weft_primitives::{proximity, SwarmAddress, MAX_PO};

/// Default base price of a chunk in accounting units, the price at
/// maximum proximity.
pub const BASE_PRICE: u64 = 10_000;

/// Default payment threshold in accounting units.
pub const PAYMENT_THRESHOLD: u64 = 10_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AccountingError {
    /// Granting the reservation would push the peer past the payment
    /// threshold.
    #[error("accounting: reservation overdraws peer balance")]
    Overdraw,
}

/// Accounting hooks invoked by the forwarding protocols.
///
/// All hooks are side-effecting and idempotent per invocation site: a
/// reservation is paired with exactly one release, a credit or debit is
/// applied once per exchange.
#[async_trait]
pub trait Accounting: Send + Sync {
    /// Reserves `price` against the peer's balance for the duration of an
    /// exchange.
    async fn reserve(&self, peer: &SwarmAddress, price: u64) -> Result<(), AccountingError>;

    /// Returns a reservation. Must follow every `reserve`, on all paths.
    fn release(&self, peer: &SwarmAddress, price: u64);

    /// Records that the peer earned `price` by serving us.
    fn credit(&self, peer: &SwarmAddress, price: u64) -> Result<(), AccountingError>;

    /// Records that the peer owes `price` for being served.
    fn debit(&self, peer: &SwarmAddress, price: u64) -> Result<(), AccountingError>;
}

/// Prices a chunk exchange.
pub trait Pricer: Send + Sync {
    /// The price we charge for serving `chunk`.
    fn price(&self, chunk: &SwarmAddress) -> u64;

    /// The price `peer` charges us for `chunk`, scaled by how close the
    /// peer is to it.
    fn peer_price(&self, peer: &SwarmAddress, chunk: &SwarmAddress) -> u64;
}

/// Proximity-scaled fixed pricing:
/// `price = (MAX_PO - proximity + 1) * base_price`.
#[derive(Debug, Clone)]
pub struct FixedPricer {
    base_price: u64,
}

impl FixedPricer {
    pub fn new(base_price: u64) -> Self {
        Self { base_price }
    }

    pub fn base_price(&self) -> u64 {
        self.base_price
    }
}

impl Default for FixedPricer {
    fn default() -> Self {
        Self::new(BASE_PRICE)
    }
}

impl Pricer for FixedPricer {
    fn price(&self, _chunk: &SwarmAddress) -> u64 {
        self.base_price
    }

    fn peer_price(&self, peer: &SwarmAddress, chunk: &SwarmAddress) -> u64 {
        let factor = (MAX_PO as u64) - (proximity(peer, chunk) as u64) + 1;
        factor * self.base_price
    }
}

#[derive(Debug, Default)]
struct Balance {
    /// positive: the peer owes us; negative: we owe the peer
    balance: i64,
    reserved: u64,
}

/// In-memory [`Accounting`] with per-peer balances, each entry guarded by
/// its own lock.
#[derive(Debug)]
pub struct MemAccounting {
    payment_threshold: u64,
    balances: Mutex<HashMap<SwarmAddress, Arc<Mutex<Balance>>>>,
}

impl MemAccounting {
    pub fn new(payment_threshold: u64) -> Self {
        Self {
            payment_threshold,
            balances: Mutex::new(HashMap::new()),
        }
    }

    pub fn balance(&self, peer: &SwarmAddress) -> i64 {
        self.entry(peer).lock().balance
    }

    fn entry(&self, peer: &SwarmAddress) -> Arc<Mutex<Balance>> {
        Arc::clone(self.balances.lock().entry(*peer).or_default())
    }
}

impl Default for MemAccounting {
    fn default() -> Self {
        Self::new(PAYMENT_THRESHOLD)
    }
}

#[async_trait]
impl Accounting for MemAccounting {
    async fn reserve(&self, peer: &SwarmAddress, price: u64) -> Result<(), AccountingError> {
        let entry = self.entry(peer);
        let mut balance = entry.lock();

        // expected debt towards the peer if the exchange goes through
        let expected = balance.reserved + price;
        let owed = (-balance.balance).max(0) as u64;
        if owed + expected > self.payment_threshold {
            return Err(AccountingError::Overdraw);
        }
        balance.reserved += price;
        trace!(%peer, price, reserved = balance.reserved, "reserved");
        Ok(())
    }

    fn release(&self, peer: &SwarmAddress, price: u64) {
        let entry = self.entry(peer);
        let mut balance = entry.lock();
        balance.reserved = balance.reserved.saturating_sub(price);
    }

    fn credit(&self, peer: &SwarmAddress, price: u64) -> Result<(), AccountingError> {
        let entry = self.entry(peer);
        let mut balance = entry.lock();
        balance.balance -= price as i64;
        trace!(%peer, price, balance = balance.balance, "credited peer");
        Ok(())
    }

    fn debit(&self, peer: &SwarmAddress, price: u64) -> Result<(), AccountingError> {
        let entry = self.entry(peer);
        let mut balance = entry.lock();
        balance.balance += price as i64;
        trace!(%peer, price, balance = balance.balance, "debited peer");
        Ok(())
    }
}
