//! Proof-of-trust registry: latest reported uptime per node.

use crate::types::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Uptime is a percentage.
pub const MAX_UPTIME: u64 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustRecord {
    pub address: Address,
    /// 0..=100, last write wins
    pub uptime: u64,
    pub last_update_block: u64,
}

#[derive(Debug, Clone, Default)]
pub struct TrustRegistry {
    records: BTreeMap<Address, TrustRecord>,
}

impl TrustRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the uptime of `address`, clamped to 100. Returns the stored value.
    pub fn update_trust(&mut self, address: Address, uptime: u64, block_number: u64) -> u64 {
        let uptime = uptime.min(MAX_UPTIME);
        self.records.insert(
            address,
            TrustRecord {
                address,
                uptime,
                last_update_block: block_number,
            },
        );
        uptime
    }

    pub fn get(&self, address: &Address) -> Option<&TrustRecord> {
        self.records.get(address)
    }

    /// Current uptime of `address`; zero when unseen.
    pub fn uptime(&self, address: &Address) -> u64 {
        self.records.get(address).map_or(0, |r| r.uptime)
    }

    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.records.keys()
    }

    pub fn records(&self) -> Vec<TrustRecord> {
        self.records.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
