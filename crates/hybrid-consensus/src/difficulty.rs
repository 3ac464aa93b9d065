// DIFFICULTY ORACLE
// Epoch-dispatching difficulty adjustment plus the hybrid weighting stage.
//
// SAFETY INVARIANTS:
// 1. Every formula is a pure function of (time, parent, schedule)
// 2. Output is never below the configured minimum difficulty
// 3. The bomb-delay subtraction clamps at zero
// 4. The hybrid stage never changes epoch selection or the epoch formula

use crate::config::{ChainConfig, ConfigError, DifficultyConfig, HybridWeights};
use crate::epoch::{DifficultyEpoch, EpochSchedule};
use crate::types::ChainHeader;
use num_bigint::{BigInt, BigUint};
use num_traits::One;

/// Blocks after the EthPoW fork at which the start difficulty is installed.
const ETHPOW_START_OFFSET: u64 = 2048;
/// Width of the word the bomb term is computed in.
const MAX_BOMB_EXPONENT: u64 = 256;

/// Per-mechanism adjustment factors fed into the hybrid stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HybridFactors {
    pub pos: BigUint,
    pub pot: BigUint,
    pub trust: BigUint,
}

impl HybridFactors {
    pub fn new(pos: impl Into<BigUint>, pot: impl Into<BigUint>, trust: impl Into<BigUint>) -> Self {
        HybridFactors {
            pos: pos.into(),
            pot: pot.into(),
            trust: trust.into(),
        }
    }

    /// Factor one for every mechanism: each term becomes its weighted share of the base.
    pub fn unit() -> Self {
        HybridFactors::new(1u32, 1u32, 1u32)
    }
}

/// Computes the difficulty a block must carry given its parent.
#[derive(Debug, Clone)]
pub struct DifficultyOracle {
    schedule: EpochSchedule,
    params: DifficultyConfig,
    ethpow_fork_block: Option<u64>,
}

impl DifficultyOracle {
    /// Rejects a zero minimum difficulty or a zero bomb period.
    pub fn new(chain: &ChainConfig, params: DifficultyConfig) -> Result<Self, ConfigError> {
        params.validate()?;
        Ok(DifficultyOracle {
            schedule: EpochSchedule::new(chain),
            params,
            ethpow_fork_block: chain.ethpow_fork_block,
        })
    }

    pub fn schedule(&self) -> &EpochSchedule {
        &self.schedule
    }

    pub fn minimum_difficulty(&self) -> BigUint {
        BigUint::from(self.params.minimum_difficulty)
    }

    /// Epoch whose rules govern the child of `parent`.
    pub fn epoch_for_child(&self, parent: &ChainHeader) -> DifficultyEpoch {
        self.schedule.epoch_at(parent.number.saturating_add(1))
    }

    /// Difficulty a block created at `time` on top of `parent` must declare.
    ///
    /// The EthPoW fork block itself resets to the configured minimum
    /// difficulty rather than to one, so the floor holds on every block.
    pub fn compute_difficulty(&self, time: u64, parent: &ChainHeader) -> BigUint {
        let next = parent.number.saturating_add(1);
        match self.schedule.epoch_at(next) {
            DifficultyEpoch::Frontier => self.frontier(time, parent),
            DifficultyEpoch::Homestead => self.homestead(time, parent),
            DifficultyEpoch::EthPoW => self.ethpow(time, parent, next),
            epoch => self.byzantium_family(time, parent, epoch.bomb_delay()),
        }
    }

    /// Layer the stake/transaction/trust terms over a base PoW difficulty.
    ///
    /// Each term is `base × weight × factor / total_weight`; the result is
    /// `base` plus all three terms, floored at the minimum difficulty.
    pub fn compute_hybrid_difficulty(
        &self,
        base: &BigUint,
        factors: &HybridFactors,
        weights: &HybridWeights,
    ) -> BigUint {
        let mut total = base.clone();
        total += hybrid_term(base, weights.stake, &factors.pos, weights);
        total += hybrid_term(base, weights.transaction, &factors.pot, weights);
        total += hybrid_term(base, weights.trust, &factors.trust, weights);
        total.max(self.minimum_difficulty())
    }

    /// Epoch difficulty followed by the hybrid stage.
    pub fn compute_custom_difficulty(
        &self,
        time: u64,
        parent: &ChainHeader,
        factors: &HybridFactors,
        weights: &HybridWeights,
    ) -> BigUint {
        let base = self.compute_difficulty(time, parent);
        self.compute_hybrid_difficulty(&base, factors, weights)
    }

    fn frontier(&self, time: u64, parent: &ChainHeader) -> BigUint {
        let parent_diff = BigInt::from(parent.difficulty.clone());
        let adjust = &parent_diff >> self.params.bound_divisor_shift;

        let mut diff = if time_delta(time, parent) < i128::from(self.params.frontier_duration_limit) {
            parent_diff + adjust
        } else {
            parent_diff - adjust
        };
        diff = self.floor(diff);

        let periods = parent.number.saturating_add(1) / self.params.exp_diff_period;
        if let Some(bomb) = bomb_term(periods) {
            diff += BigInt::from(bomb);
            diff = self.floor(diff);
        }
        self.into_unsigned(diff)
    }

    fn homestead(&self, time: u64, parent: &ChainHeader) -> BigUint {
        // 1 - (time - parent_time) / 10, clamped
        let x = clamp_adjustment(1 - time_delta(time, parent).div_euclid(10));
        let diff = self.floor(self.step(parent, x));

        let periods = parent.number.saturating_add(1) / self.params.exp_diff_period;
        self.into_unsigned(self.with_bomb(diff, periods))
    }

    fn byzantium_family(&self, time: u64, parent: &ChainHeader, bomb_delay: Option<u64>) -> BigUint {
        // (1 or 2) - (time - parent_time) / 9, clamped; 2 when the parent included uncles
        let uncle_term = if parent.has_uncles() { 2 } else { 1 };
        let x = clamp_adjustment(uncle_term - time_delta(time, parent).div_euclid(9));
        let diff = self.floor(self.step(parent, x));

        let Some(delay) = bomb_delay else {
            return self.into_unsigned(diff);
        };
        // The bomb counts from the child's number, so compare against delay - 1 on the parent.
        let delay_from_parent = delay.saturating_sub(1);
        let fake_number = parent.number.saturating_sub(delay_from_parent);
        let periods = fake_number / self.params.exp_diff_period;
        self.into_unsigned(self.with_bomb(diff, periods))
    }

    // The fork block installs the minimum, not one; fork + 2048 installs the start difficulty.
    fn ethpow(&self, time: u64, parent: &ChainHeader, next: u64) -> BigUint {
        if let Some(fork) = self.ethpow_fork_block {
            if fork.checked_add(ETHPOW_START_OFFSET) == Some(next) {
                return BigUint::from(self.params.ethpow_start_difficulty).max(self.minimum_difficulty());
            }
            if fork == next {
                return self.minimum_difficulty();
            }
        }
        self.byzantium_family(time, parent, None)
    }

    // parent + (parent >> shift) * x
    fn step(&self, parent: &ChainHeader, x: i128) -> BigInt {
        let parent_diff = BigInt::from(parent.difficulty.clone());
        let adjust = &parent_diff >> self.params.bound_divisor_shift;
        parent_diff + adjust * BigInt::from(x)
    }

    fn with_bomb(&self, diff: BigInt, periods: u64) -> BigInt {
        match bomb_term(periods) {
            Some(bomb) => diff + BigInt::from(bomb),
            None => diff,
        }
    }

    fn floor(&self, diff: BigInt) -> BigInt {
        diff.max(BigInt::from(self.params.minimum_difficulty))
    }

    fn into_unsigned(&self, diff: BigInt) -> BigUint {
        diff.to_biguint().unwrap_or_else(|| self.minimum_difficulty())
    }
}

fn time_delta(time: u64, parent: &ChainHeader) -> i128 {
    i128::from(time) - i128::from(parent.time)
}

fn clamp_adjustment(x: i128) -> i128 {
    x.clamp(-99, 99)
}

/// `2^(periods - 2)` once two full bomb periods have elapsed.
///
/// The term lives in 256-bit arithmetic: an exponent of 256 or more shifts
/// the bit out and contributes nothing.
pub fn bomb_term(periods: u64) -> Option<BigUint> {
    let exponent = periods.checked_sub(2)?;
    if exponent >= MAX_BOMB_EXPONENT {
        return None;
    }
    Some(BigUint::one() << exponent)
}

fn hybrid_term(base: &BigUint, weight: u64, factor: &BigUint, weights: &HybridWeights) -> BigUint {
    let total = weights.total();
    if total == 0 || weight == 0 {
        return BigUint::default();
    }
    base * BigUint::from(weight) * factor / BigUint::from(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Hash, EMPTY_UNCLE_HASH};
    use proptest::prelude::*;

    fn parent(number: u64, time: u64, difficulty: u64) -> ChainHeader {
        ChainHeader {
            number,
            time,
            difficulty: BigUint::from(difficulty),
            uncle_hash: EMPTY_UNCLE_HASH,
            ..Default::default()
        }
    }

    fn oracle(chain: ChainConfig) -> DifficultyOracle {
        DifficultyOracle::new(&chain, DifficultyConfig::default()).unwrap()
    }

    fn homestead_only() -> ChainConfig {
        ChainConfig {
            homestead_block: Some(0),
            ..Default::default()
        }
    }

    fn byzantium_only() -> ChainConfig {
        ChainConfig {
            homestead_block: Some(0),
            byzantium_block: Some(0),
            ..Default::default()
        }
    }

    #[test]
    fn test_frontier_slow_block_floors_at_minimum() {
        // 1000 >> 11 == 0, so the difficulty stays 1000 and is floored
        let oracle = oracle(ChainConfig::default());
        let result = oracle.compute_difficulty(2000, &parent(1, 1000, 1000));
        assert_eq!(result, BigUint::from(131_072u32));
    }

    #[test]
    fn test_frontier_fast_block_increases() {
        let oracle = oracle(ChainConfig::default());
        let result = oracle.compute_difficulty(1005, &parent(1, 1000, 2_048_000));
        assert_eq!(result, BigUint::from(2_049_000u32));
    }

    #[test]
    fn test_frontier_slow_block_decreases() {
        let oracle = oracle(ChainConfig::default());
        let result = oracle.compute_difficulty(1013, &parent(1, 1000, 2_048_000));
        assert_eq!(result, BigUint::from(2_047_000u32));
    }

    #[test]
    fn test_homestead_long_gap_clamps_at_minus_99() {
        let oracle = oracle(homestead_only());
        let result = oracle.compute_difficulty(2000, &parent(1, 1000, 10_000_000));
        // 10_000_000 - (10_000_000 >> 11) * 99
        assert_eq!(result, BigUint::from(10_000_000u64 - 4882 * 99));
    }

    #[test]
    fn test_homestead_bomb_boundary() {
        let oracle = oracle(homestead_only());
        // next = 199_999 → one period, no bomb
        let before = oracle.compute_difficulty(1010, &parent(199_998, 1000, 2_048_000));
        assert_eq!(before, BigUint::from(2_048_000u32));
        // next = 200_000 → two periods, bomb 2^0
        let first = oracle.compute_difficulty(1010, &parent(199_999, 1000, 2_048_000));
        assert_eq!(first, BigUint::from(2_048_001u32));
        // next = 300_000 → three periods, bomb 2^1
        let second = oracle.compute_difficulty(1010, &parent(299_999, 1000, 2_048_000));
        assert_eq!(second, BigUint::from(2_048_002u32));
    }

    #[test]
    fn test_byzantium_uncle_sensitivity() {
        let oracle = oracle(byzantium_only());
        let plain = parent(10, 1000, 2_048_000);
        assert_eq!(oracle.compute_difficulty(1009, &plain), BigUint::from(2_048_000u32));
        assert_eq!(oracle.compute_difficulty(1000, &plain), BigUint::from(2_049_000u32));

        let with_uncles = ChainHeader {
            uncle_hash: Hash([1u8; 32]),
            ..plain
        };
        assert_eq!(oracle.compute_difficulty(1009, &with_uncles), BigUint::from(2_049_000u32));
    }

    #[test]
    fn test_byzantium_lower_clamp() {
        let oracle = oracle(byzantium_only());
        let result = oracle.compute_difficulty(2000, &parent(10, 1000, 2_048_000));
        assert_eq!(result, BigUint::from(2_048_000u32 - 99_000));
    }

    #[test]
    fn test_byzantium_bomb_delay_boundary() {
        let oracle = oracle(byzantium_only());
        // delay 3_000_000: fake number = parent - 2_999_999
        let quiet = oracle.compute_difficulty(1009, &parent(3_199_998, 1000, 2_048_000));
        assert_eq!(quiet, BigUint::from(2_048_000u32));
        let armed = oracle.compute_difficulty(1009, &parent(3_199_999, 1000, 2_048_000));
        assert_eq!(armed, BigUint::from(2_048_001u32));
    }

    #[test]
    fn test_bomb_delay_underflow_clamps_to_zero() {
        let oracle = oracle(byzantium_only());
        let result = oracle.compute_difficulty(1009, &parent(5, 1000, 2_048_000));
        assert_eq!(result, BigUint::from(2_048_000u32));
    }

    #[test]
    fn test_bomb_term_boundaries() {
        assert_eq!(bomb_term(0), None);
        assert_eq!(bomb_term(1), None);
        assert_eq!(bomb_term(2), Some(BigUint::one()));
        assert_eq!(bomb_term(10), Some(BigUint::from(256u32)));
        assert_eq!(bomb_term(257), Some(BigUint::one() << 255u32));
        assert_eq!(bomb_term(258), None);
        assert_eq!(bomb_term(u64::MAX), None);
    }

    #[test]
    fn test_parent_near_max_number_stays_bounded() {
        // periods far past 256: the bomb bit is shifted out
        let far = parent(u64::MAX - 1, 1000, 2_048_000);
        assert_eq!(
            oracle(ChainConfig::default()).compute_difficulty(1010, &far),
            BigUint::from(2_049_000u32)
        );
        assert_eq!(
            oracle(homestead_only()).compute_difficulty(1010, &far),
            BigUint::from(2_048_000u32)
        );
        assert_eq!(
            oracle(byzantium_only()).compute_difficulty(1010, &far),
            BigUint::from(2_048_000u32)
        );
        let last = parent(u64::MAX, 1000, 2_048_000);
        assert_eq!(
            oracle(ChainConfig::all_forks_at_genesis()).compute_difficulty(1010, &last),
            BigUint::from(2_048_000u32)
        );
    }

    #[test]
    fn test_invalid_params_rejected() {
        let zero_period = DifficultyConfig {
            exp_diff_period: 0,
            ..DifficultyConfig::default()
        };
        assert!(matches!(
            DifficultyOracle::new(&ChainConfig::default(), zero_period),
            Err(ConfigError::ZeroDifficultyPeriod)
        ));
        let zero_minimum = DifficultyConfig {
            minimum_difficulty: 0,
            ..DifficultyConfig::default()
        };
        assert!(matches!(
            DifficultyOracle::new(&ChainConfig::default(), zero_minimum),
            Err(ConfigError::ZeroMinimumDifficulty)
        ));
    }

    #[test]
    fn test_ethpow_resets_and_drops_bomb() {
        let chain = ChainConfig {
            ethpow_fork_block: Some(20_000_000),
            ..ChainConfig::mainnet()
        };
        let oracle = oracle(chain);

        let at_fork = oracle.compute_difficulty(1009, &parent(19_999_999, 1000, 9_000_000_000));
        assert_eq!(at_fork, BigUint::from(131_072u32));

        let start = oracle.compute_difficulty(1009, &parent(20_002_047, 1000, 131_072));
        assert_eq!(start, BigUint::from(1u64 << 46));

        // Gray Glacier would add 2^(86 - 2) here; EthPoW adds nothing
        let later = oracle.compute_difficulty(1009, &parent(20_100_000, 1000, 2_048_000));
        assert_eq!(later, BigUint::from(2_048_000u32));
    }

    #[test]
    fn test_hybrid_matches_weighted_terms() {
        let oracle = oracle(ChainConfig::default());
        let weights = HybridWeights::default();
        let factors = HybridFactors::new(50u32, 30u32, 20u32);

        // Frontier base floors to 131072, then
        // + 131072*50*50/200 + 131072*30*30/200 + 131072*20*20/200
        let result = oracle.compute_custom_difficulty(2000, &parent(1, 1000, 1000), &factors, &weights);
        assert_eq!(result, BigUint::from(2_621_440u32));
    }

    #[test]
    fn test_hybrid_zero_weights_is_identity() {
        let oracle = oracle(ChainConfig::default());
        let weights = HybridWeights::new(100, 0, 0, 0).unwrap();
        let base = BigUint::from(5_000_000u32);
        let factors = HybridFactors::new(7u32, 8u32, 9u32);
        assert_eq!(oracle.compute_hybrid_difficulty(&base, &factors, &weights), base);
    }

    #[test]
    fn test_hybrid_floors_small_base() {
        let oracle = oracle(ChainConfig::default());
        let result = oracle.compute_hybrid_difficulty(
            &BigUint::from(10u32),
            &HybridFactors::default(),
            &HybridWeights::default(),
        );
        assert_eq!(result, BigUint::from(131_072u32));
    }

    fn any_chain() -> impl Strategy<Value = ChainConfig> {
        prop_oneof![
            Just(ChainConfig::default()),
            Just(homestead_only()),
            Just(ChainConfig::mainnet()),
            Just(ChainConfig::all_forks_at_genesis()),
            Just(ChainConfig {
                ethpow_fork_block: Some(16_000_000),
                ..ChainConfig::mainnet()
            }),
        ]
    }

    proptest! {
        #[test]
        fn prop_never_below_minimum(
            chain in any_chain(),
            number in 0u64..30_000_000,
            parent_time in 0u64..2_000_000_000,
            gap in 0u64..100_000,
            difficulty in 0u64..u64::MAX,
            has_uncles in any::<bool>(),
        ) {
            let oracle = oracle(chain);
            let mut p = parent(number, parent_time, difficulty);
            if has_uncles {
                p.uncle_hash = Hash([3u8; 32]);
            }
            let result = oracle.compute_difficulty(parent_time + gap, &p);
            prop_assert!(result >= oracle.minimum_difficulty());
        }
    }
}
