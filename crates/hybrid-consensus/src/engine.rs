// CONSENSUS ENGINE TRAIT
// Unified interface of the hybrid engine and the collaborators it consumes.
//
// SAFETY: This trait enforces a contract that the engine must follow:
// 1. Verification is deterministic (same header + same parent → same verdict)
// 2. Rejections are protocol-fatal and never retried
// 3. Finalization is the only operation that writes state or the header root

use crate::batch::AbortHandle;
use crate::reward::RewardSummary;
use crate::types::{Address, Block, ChainHeader, Hash};
use num_bigint::BigUint;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use thiserror::Error;

/// Header and uncle verification errors.
///
/// SAFETY: Every variant identifies exactly which check failed so that
/// chain-sync diagnostics can report it; none of them is recoverable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsensusError {
    #[error("unknown ancestor")]
    UnknownAncestor,

    #[error("block in the future: time {time}, now {now}")]
    FutureBlock { time: u64, now: i64 },

    #[error("extra-data too long: {have} > {max}")]
    ExtraDataTooLong { have: usize, max: usize },

    #[error("timestamp older than parent: {time} <= {parent_time}")]
    OlderBlockTime { time: u64, parent_time: u64 },

    #[error("invalid difficulty: have {have}, want {want}")]
    InvalidDifficulty { have: BigUint, want: BigUint },

    #[error("invalid gas limit: have {have}, max {max}")]
    InvalidGasLimit { have: u64, max: u64 },

    #[error("invalid gas used: have {used}, gas limit {limit}")]
    InvalidGasUsed { used: u64, limit: u64 },

    #[error("invalid gas limit: have {have}, want {parent} +-= {bound}")]
    GasLimitBound { have: u64, parent: u64, bound: u64 },

    #[error("invalid gas limit below {min}: have {have}")]
    GasLimitTooLow { have: u64, min: u64 },

    #[error("invalid base fee before fork: have {0}, expected none")]
    BaseFeeBeforeFork(BigUint),

    #[error("header is missing base fee")]
    MissingBaseFee,

    #[error("invalid base fee: have {have}, want {want}")]
    InvalidBaseFee { have: BigUint, want: BigUint },

    #[error("invalid block number: {number} is not parent {parent} + 1")]
    InvalidNumber { number: u64, parent: u64 },

    #[error("non-positive difficulty")]
    NonPositiveDifficulty,

    #[error("invalid mix digest")]
    InvalidMixDigest,

    #[error("invalid proof-of-work")]
    InvalidPoW,

    #[error("too many uncles: {have} > {max}")]
    TooManyUncles { have: usize, max: usize },

    #[error("duplicate uncle {0}")]
    DuplicateUncle(Hash),

    #[error("uncle {0} is ancestor")]
    UncleIsAncestor(Hash),

    #[error("uncle {0}'s parent is not ancestor")]
    DanglingUncle(Hash),

    #[error("bad DAO fork extra-data")]
    InvalidDaoExtraData,

    #[error("fork hash mismatch at block {number}: have {have}, want {want}")]
    ForkHashMismatch { number: u64, have: Hash, want: Hash },
}

/// Read access to canonical and side-chain headers.
pub trait ChainHeaderReader: Send + Sync {
    fn get_header(&self, hash: &Hash, number: u64) -> Option<ChainHeader>;
}

/// Header reader that can also return full blocks, needed for uncle checks.
pub trait ChainReader: ChainHeaderReader {
    fn get_block(&self, hash: &Hash, number: u64) -> Option<Block>;
}

/// Account state written by finalization.
pub trait StateDb {
    fn add_balance(&mut self, address: &Address, amount: &BigUint);

    /// Root of the state after pending changes; `delete_empty` drops empty accounts (EIP-158).
    fn intermediate_root(&mut self, delete_empty: bool) -> Hash;
}

/// Consensus engine: the only block validation and finalization gate.
///
/// SAFETY INVARIANTS:
/// 1. verify_header is idempotent
/// 2. verify_headers emits exactly one result per header, in input order
/// 3. finalize computes the state root after every reward is applied
pub trait ConsensusEngine: Send + Sync {
    /// Address credited with the block reward.
    fn author(&self, header: &ChainHeader) -> Address;

    /// Verify a single header against its parent fetched from `chain`.
    fn verify_header(
        &self,
        chain: &dyn ChainHeaderReader,
        header: &ChainHeader,
        seal: bool,
    ) -> Result<(), ConsensusError>;

    /// Verify a contiguous header run in parallel.
    ///
    /// # Returns
    /// - An abort handle that stops dispatch and emission when triggered
    /// - A receiver yielding one result per header, in input order
    fn verify_headers(
        &self,
        chain: Arc<dyn ChainHeaderReader>,
        headers: Vec<ChainHeader>,
        seals: Vec<bool>,
    ) -> (AbortHandle, Receiver<Result<(), ConsensusError>>);

    /// Verify the uncles included in `block`.
    fn verify_uncles(&self, chain: &dyn ChainReader, block: &Block) -> Result<(), ConsensusError>;

    /// Set the header's difficulty from its parent.
    fn prepare(&self, chain: &dyn ChainHeaderReader, header: &mut ChainHeader) -> Result<(), ConsensusError>;

    /// Credit block, uncle and hybrid rewards, then write the state root into the header.
    fn finalize(
        &self,
        header: &mut ChainHeader,
        state: &mut dyn StateDb,
        uncles: &[ChainHeader],
    ) -> RewardSummary;

    /// Hash of the header prior to sealing.
    fn seal_hash(&self, header: &ChainHeader) -> Hash;

    /// Difficulty a block created at `time` on top of `parent` must carry.
    fn calc_difficulty(&self, time: u64, parent: &ChainHeader) -> BigUint;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_check() {
        let err = ConsensusError::InvalidDifficulty {
            have: BigUint::from(1u32),
            want: BigUint::from(2u32),
        };
        assert_eq!(err.to_string(), "invalid difficulty: have 1, want 2");

        let err = ConsensusError::TooManyUncles { have: 3, max: 2 };
        assert_eq!(err.to_string(), "too many uncles: 3 > 2");

        let err = ConsensusError::DuplicateUncle(Hash::ZERO);
        assert!(err.to_string().starts_with("duplicate uncle 0x0000"));
    }
}
