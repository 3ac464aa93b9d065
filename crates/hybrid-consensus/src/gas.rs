//! Gas-limit bounds and EIP-1559 base fee rules applied during header verification.

use crate::config::ChainConfig;
use crate::engine::ConsensusError;
use crate::types::ChainHeader;
use num_bigint::BigUint;
use num_traits::Zero;

/// Largest gas limit a header may declare (2^63 - 1).
pub const MAX_GAS_LIMIT: u64 = 0x7fff_ffff_ffff_ffff;
/// Smallest gas limit a header may declare.
pub const MIN_GAS_LIMIT: u64 = 5000;
/// The gas limit may move by strictly less than parent / 1024 per block.
pub const GAS_LIMIT_BOUND_DIVISOR: u64 = 1024;
/// Bounds the base fee change between blocks.
pub const BASE_FEE_CHANGE_DENOMINATOR: u64 = 8;
/// London doubles the gas limit to keep the target usage unchanged.
pub const ELASTICITY_MULTIPLIER: u64 = 2;
/// Base fee of the first London block, in wei.
pub const INITIAL_BASE_FEE: u64 = 1_000_000_000;

/// Check the gas limit moved within bounds of the parent's.
pub fn verify_gas_limit(parent_gas_limit: u64, header_gas_limit: u64) -> Result<(), ConsensusError> {
    let diff = parent_gas_limit.abs_diff(header_gas_limit);
    let bound = parent_gas_limit / GAS_LIMIT_BOUND_DIVISOR;
    if diff >= bound {
        return Err(ConsensusError::GasLimitBound {
            have: header_gas_limit,
            parent: parent_gas_limit,
            bound: bound.saturating_sub(1),
        });
    }
    if header_gas_limit < MIN_GAS_LIMIT {
        return Err(ConsensusError::GasLimitTooLow {
            have: header_gas_limit,
            min: MIN_GAS_LIMIT,
        });
    }
    Ok(())
}

/// Gas-limit and base fee checks for a header at or after London.
pub fn verify_eip1559_header(
    config: &ChainConfig,
    parent: &ChainHeader,
    header: &ChainHeader,
) -> Result<(), ConsensusError> {
    let parent_gas_limit = if config.is_london(parent.number) {
        parent.gas_limit
    } else {
        parent.gas_limit.saturating_mul(ELASTICITY_MULTIPLIER)
    };
    verify_gas_limit(parent_gas_limit, header.gas_limit)?;

    let Some(have) = &header.base_fee else {
        return Err(ConsensusError::MissingBaseFee);
    };
    let want = calc_base_fee(config, parent);
    if *have != want {
        return Err(ConsensusError::InvalidBaseFee {
            have: have.clone(),
            want,
        });
    }
    Ok(())
}

/// Base fee the child of `parent` must carry.
pub fn calc_base_fee(config: &ChainConfig, parent: &ChainHeader) -> BigUint {
    if !config.is_london(parent.number) {
        return BigUint::from(INITIAL_BASE_FEE);
    }

    let parent_base_fee = parent.base_fee.clone().unwrap_or_default();
    let target = parent.gas_limit / ELASTICITY_MULTIPLIER;
    if target == 0 || parent.gas_used == target {
        return parent_base_fee;
    }

    let scaled = |delta: u64| {
        &parent_base_fee * BigUint::from(delta) / BigUint::from(target) / BigUint::from(BASE_FEE_CHANGE_DENOMINATOR)
    };

    if parent.gas_used > target {
        // Increase by at least one wei.
        let delta = scaled(parent.gas_used - target).max(BigUint::from(1u32));
        &parent_base_fee + delta
    } else {
        let delta = scaled(target - parent.gas_used);
        if delta > parent_base_fee {
            BigUint::zero()
        } else {
            &parent_base_fee - delta
        }
    }
}
