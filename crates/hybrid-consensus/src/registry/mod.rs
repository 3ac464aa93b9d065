// PARTICIPANT REGISTRIES
// Stake, transaction and trust contribution history per address.
//
// SAFETY INVARIANTS:
// 1. Each registry exclusively owns its records; callers receive copies
// 2. No operation fails for a well-formed address and nothing is ever removed
// 3. Stake and transaction counts only accumulate; uptime is last-write-wins
// 4. Iteration order is ascending address order

pub mod stake;
pub mod transaction;
pub mod trust;

pub use stake::{StakeRegistry, Validator};
pub use transaction::{TransactionRecord, TransactionRegistry};
pub use trust::{TrustRecord, TrustRegistry};

use crate::types::Address;
use num_bigint::BigUint;
use std::collections::BTreeSet;

/// One participant's inputs to the hybrid reward weight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contribution {
    pub address: Address,
    /// Zero for inactive or unknown validators
    pub stake: BigUint,
    pub transactions: u64,
    pub uptime: u64,
}

/// The three registries, updated together by chain-processing hooks.
#[derive(Debug, Clone, Default)]
pub struct ParticipantRegistries {
    pub stake: StakeRegistry,
    pub transactions: TransactionRegistry,
    pub trust: TrustRegistry,
}

impl ParticipantRegistries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_stake(&mut self, address: Address, amount: &BigUint, block_number: u64) {
        self.stake.update_stake(address, amount, block_number);
    }

    pub fn record_transaction(&mut self, address: Address, block_number: u64) {
        self.transactions.record_transaction(address, block_number);
    }

    /// Overwrite the node's uptime and mirror it into its validator record, if any.
    pub fn update_trust(&mut self, address: Address, uptime: u64, block_number: u64) {
        let stored = self.trust.update_trust(address, uptime, block_number);
        self.stake.mirror_uptime(&address, stored);
    }

    pub fn set_validator_active(&mut self, address: &Address, active: bool) -> bool {
        self.stake.set_active(address, active)
    }

    /// Every address present in any registry, ascending.
    pub fn participants(&self) -> Vec<Address> {
        let all: BTreeSet<Address> = self
            .stake
            .addresses()
            .chain(self.transactions.addresses())
            .chain(self.trust.addresses())
            .copied()
            .collect();
        all.into_iter().collect()
    }

    pub fn contribution(&self, address: &Address) -> Contribution {
        Contribution {
            address: *address,
            stake: self.stake.effective_stake(address),
            transactions: self.transactions.count_of(address),
            uptime: self.trust.uptime(address),
        }
    }

    /// Contributions of every participant in ascending address order.
    pub fn contributions(&self) -> Vec<Contribution> {
        self.participants().iter().map(|a| self.contribution(a)).collect()
    }
}
