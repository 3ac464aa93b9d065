// REWARD DISTRIBUTION
// Block, uncle and hybrid participant rewards applied at finalization.
//
// SAFETY INVARIANTS:
// 1. Both reward streams are computed before any balance is written
// 2. The state root is taken only after every payout is applied
// 3. Hybrid payouts never exceed the pool remaining at the time of payout
// 4. Participants are paid in ascending address order

use crate::config::RewardConfig;
use crate::engine::StateDb;
use crate::registry::{Contribution, ParticipantRegistries};
use crate::types::{Address, ChainHeader, Hash};
use log::{debug, info};
use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Uncle rewards are expressed in eighths of the block reward.
const UNCLE_REWARD_DENOMINATOR: u64 = 8;
/// The block beneficiary earns 1/32 of the block reward per included uncle.
const UNCLE_INCLUSION_DENOMINATOR: u64 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RewardKind {
    /// Static reward plus uncle-inclusion bonus to the block beneficiary
    Block,
    /// Reward to an included uncle's beneficiary
    Uncle,
    /// Share of the hybrid stake/transaction/trust pool
    Hybrid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub address: Address,
    pub amount: BigUint,
    pub kind: RewardKind,
}

/// Everything finalization credited, plus the resulting root.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RewardSummary {
    pub payouts: Vec<Payout>,
    /// Hybrid pool left undistributed
    pub hybrid_remaining: BigUint,
    pub state_root: Hash,
}

impl RewardSummary {
    pub fn total_by_kind(&self) -> BTreeMap<RewardKind, BigUint> {
        let mut totals = BTreeMap::new();
        for payout in &self.payouts {
            *totals.entry(payout.kind).or_insert_with(BigUint::zero) += &payout.amount;
        }
        totals
    }

    /// Sum credited to `address` across all streams.
    pub fn credited_to(&self, address: &Address) -> BigUint {
        self.payouts
            .iter()
            .filter(|p| p.address == *address)
            .map(|p| &p.amount)
            .sum()
    }
}

#[derive(Debug, Clone)]
pub struct RewardDistributor {
    config: RewardConfig,
}

impl RewardDistributor {
    pub fn new(config: RewardConfig) -> Self {
        RewardDistributor { config }
    }

    pub fn config(&self) -> &RewardConfig {
        &self.config
    }

    /// Block and uncle rewards for `header`.
    pub fn pow_rewards(&self, header: &ChainHeader, uncles: &[ChainHeader]) -> Vec<Payout> {
        let block_reward = BigUint::from(self.config.block_reward);
        let inclusion_bonus = &block_reward / UNCLE_INCLUSION_DENOMINATOR;

        let mut payouts = Vec::with_capacity(uncles.len() + 1);
        let mut beneficiary = block_reward.clone();
        for uncle in uncles {
            // (uncle + 8 - number) / 8 of the block reward; stale uncles earn nothing
            let eighths = uncle
                .number
                .saturating_add(UNCLE_REWARD_DENOMINATOR)
                .saturating_sub(header.number);
            let amount = &block_reward * BigUint::from(eighths) / UNCLE_REWARD_DENOMINATOR;
            if !amount.is_zero() {
                payouts.push(Payout {
                    address: uncle.coinbase,
                    amount,
                    kind: RewardKind::Uncle,
                });
            }
            beneficiary += &inclusion_bonus;
        }
        payouts.insert(
            0,
            Payout {
                address: header.coinbase,
                amount: beneficiary,
                kind: RewardKind::Block,
            },
        );
        payouts
    }

    /// `stake × transactions × uptime / normalizer`.
    pub fn hybrid_weight(&self, contribution: &Contribution) -> BigUint {
        if self.config.hybrid_normalizer == 0 {
            return BigUint::zero();
        }
        &contribution.stake * BigUint::from(contribution.transactions) * BigUint::from(contribution.uptime)
            / BigUint::from(self.config.hybrid_normalizer)
    }

    /// Split the hybrid pool across registry participants.
    ///
    /// Returns the payouts and the pool left over.
    pub fn hybrid_rewards(&self, registries: &ParticipantRegistries) -> (Vec<Payout>, BigUint) {
        let mut remaining = BigUint::from(self.config.hybrid_pool);
        let mut payouts = Vec::new();

        for contribution in registries.contributions() {
            if remaining.is_zero() {
                break;
            }
            let weight = self.hybrid_weight(&contribution);
            if weight.is_zero() {
                continue;
            }
            let amount = weight.min(remaining.clone());
            remaining -= &amount;
            payouts.push(Payout {
                address: contribution.address,
                amount,
                kind: RewardKind::Hybrid,
            });
        }
        (payouts, remaining)
    }

    /// Apply both reward streams to `state`, then write the state root into `header`.
    pub fn finalize(
        &self,
        header: &mut ChainHeader,
        state: &mut dyn StateDb,
        uncles: &[ChainHeader],
        registries: &ParticipantRegistries,
        delete_empty: bool,
    ) -> RewardSummary {
        let mut payouts = self.pow_rewards(header, uncles);
        let (hybrid, hybrid_remaining) = self.hybrid_rewards(registries);
        payouts.extend(hybrid);

        for payout in &payouts {
            state.add_balance(&payout.address, &payout.amount);
        }
        let state_root = state.intermediate_root(delete_empty);
        header.root = state_root;

        debug!(
            "Finalized block #{}: {} payouts, hybrid pool remaining {}",
            header.number,
            payouts.len(),
            hybrid_remaining
        );
        let summary = RewardSummary {
            payouts,
            hybrid_remaining,
            state_root,
        };
        if let Some(hybrid_total) = summary.total_by_kind().get(&RewardKind::Hybrid) {
            info!("Block #{} distributed {} wei of hybrid rewards", header.number, hybrid_total);
        }
        summary
    }
}
