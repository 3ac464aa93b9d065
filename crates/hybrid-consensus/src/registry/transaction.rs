//! Proof-of-transaction registry: lifetime transaction counts per address.

use crate::types::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub address: Address,
    pub transaction_count: u64,
    pub last_transaction_block: u64,
}

#[derive(Debug, Clone, Default)]
pub struct TransactionRegistry {
    records: BTreeMap<Address, TransactionRecord>,
    total_transactions: u64,
}

impl TransactionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one transaction by `address` in `block_number`.
    pub fn record_transaction(&mut self, address: Address, block_number: u64) {
        let record = self.records.entry(address).or_insert(TransactionRecord {
            address,
            transaction_count: 0,
            last_transaction_block: block_number,
        });
        record.transaction_count = record.transaction_count.saturating_add(1);
        record.last_transaction_block = block_number;
        self.total_transactions = self.total_transactions.saturating_add(1);
    }

    pub fn get(&self, address: &Address) -> Option<&TransactionRecord> {
        self.records.get(address)
    }

    /// Lifetime transactions of `address`; zero when unseen.
    pub fn count_of(&self, address: &Address) -> u64 {
        self.records.get(address).map_or(0, |r| r.transaction_count)
    }

    pub fn total_transactions(&self) -> u64 {
        self.total_transactions
    }

    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.records.keys()
    }

    pub fn records(&self) -> Vec<TransactionRecord> {
        self.records.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
