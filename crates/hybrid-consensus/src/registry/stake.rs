//! Proof-of-stake registry: one validator record per staking address.

use crate::types::Address;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Staking participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub address: Address,
    /// Cumulative stake, in wei
    pub stake: BigUint,
    /// Block of the most recent stake update
    pub last_reward_block: u64,
    /// Uptime percentage mirrored from the trust registry
    pub uptime: u64,
    pub active: bool,
}

/// Owns every validator record and the network-wide stake total.
///
/// Records are never removed; retiring a validator clears its `active` flag.
#[derive(Debug, Clone, Default)]
pub struct StakeRegistry {
    validators: BTreeMap<Address, Validator>,
    total_stake: BigUint,
}

impl StakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `amount` to the validator's stake, creating an active validator on first sight.
    pub fn update_stake(&mut self, address: Address, amount: &BigUint, block_number: u64) {
        let validator = self.validators.entry(address).or_insert_with(|| Validator {
            address,
            stake: BigUint::default(),
            last_reward_block: block_number,
            uptime: 0,
            active: true,
        });
        validator.stake += amount;
        validator.last_reward_block = block_number;
        self.total_stake += amount;
    }

    /// Mark a validator active or inactive. Returns false for unknown addresses.
    pub fn set_active(&mut self, address: &Address, active: bool) -> bool {
        match self.validators.get_mut(address) {
            Some(validator) => {
                validator.active = active;
                true
            }
            None => false,
        }
    }

    pub(crate) fn mirror_uptime(&mut self, address: &Address, uptime: u64) {
        if let Some(validator) = self.validators.get_mut(address) {
            validator.uptime = uptime;
        }
    }

    pub fn get(&self, address: &Address) -> Option<&Validator> {
        self.validators.get(address)
    }

    /// Stake counted towards rewards: zero for unknown or inactive validators.
    pub fn effective_stake(&self, address: &Address) -> BigUint {
        self.validators
            .get(address)
            .filter(|v| v.active)
            .map(|v| v.stake.clone())
            .unwrap_or_default()
    }

    pub fn total_stake(&self) -> &BigUint {
        &self.total_stake
    }

    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.validators.keys()
    }

    /// Snapshot of every validator in address order.
    pub fn validators(&self) -> Vec<Validator> {
        self.validators.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}
