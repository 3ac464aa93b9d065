// ENGINE CONFIGURATION
// Fork schedule, difficulty constants, hybrid weights and reward parameters.
//
// INVARIANTS:
// 1. Configuration is fixed at engine construction; nothing here is mutated afterwards
// 2. Fork activation numbers are non-decreasing in protocol order
// 3. Hybrid weights have a non-zero total

use crate::seal::PowMode;
use crate::types::Hash;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("fork {later} at block {later_block} activates before {earlier} at block {earlier_block}")]
    ForkOrder {
        earlier: &'static str,
        earlier_block: u64,
        later: &'static str,
        later_block: u64,
    },
    #[error("hybrid weights must not all be zero")]
    ZeroTotalWeight,
    #[error("minimum difficulty must be > 0")]
    ZeroMinimumDifficulty,
    #[error("difficulty period must be > 0")]
    ZeroDifficultyPeriod,
    #[error("hybrid reward normalizer must be > 0")]
    ZeroNormalizer,
    #[error("proof-of-work mode {0} requires a dataset provider")]
    MissingDataset(&'static str),
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// Fork activation block numbers. `None` means the fork never activates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub homestead_block: Option<u64>,
    pub dao_fork_block: Option<u64>,
    pub dao_fork_support: bool,
    pub eip150_block: Option<u64>,
    pub eip150_hash: Option<Hash>,
    pub eip158_block: Option<u64>,
    pub byzantium_block: Option<u64>,
    pub constantinople_block: Option<u64>,
    pub muir_glacier_block: Option<u64>,
    pub london_block: Option<u64>,
    pub arrow_glacier_block: Option<u64>,
    pub gray_glacier_block: Option<u64>,
    pub ethpow_fork_block: Option<u64>,
}

fn is_forked(fork: Option<u64>, number: u64) -> bool {
    fork.map_or(false, |activation| activation <= number)
}

impl ChainConfig {
    /// Ethereum mainnet activation numbers up to Gray Glacier, no EthPoW fork.
    pub fn mainnet() -> Self {
        ChainConfig {
            chain_id: 1,
            homestead_block: Some(1_150_000),
            dao_fork_block: Some(1_920_000),
            dao_fork_support: true,
            eip150_block: Some(2_463_000),
            eip150_hash: None,
            eip158_block: Some(2_675_000),
            byzantium_block: Some(4_370_000),
            constantinople_block: Some(7_280_000),
            muir_glacier_block: Some(9_200_000),
            london_block: Some(12_965_000),
            arrow_glacier_block: Some(13_773_000),
            gray_glacier_block: Some(15_050_000),
            ethpow_fork_block: None,
        }
    }

    /// Every fork through Gray Glacier active from genesis.
    pub fn all_forks_at_genesis() -> Self {
        ChainConfig {
            chain_id: 1337,
            homestead_block: Some(0),
            dao_fork_block: None,
            dao_fork_support: false,
            eip150_block: Some(0),
            eip150_hash: None,
            eip158_block: Some(0),
            byzantium_block: Some(0),
            constantinople_block: Some(0),
            muir_glacier_block: Some(0),
            london_block: Some(0),
            arrow_glacier_block: Some(0),
            gray_glacier_block: Some(0),
            ethpow_fork_block: None,
        }
    }

    pub fn is_homestead(&self, number: u64) -> bool {
        is_forked(self.homestead_block, number)
    }

    pub fn is_eip158(&self, number: u64) -> bool {
        is_forked(self.eip158_block, number)
    }

    pub fn is_byzantium(&self, number: u64) -> bool {
        is_forked(self.byzantium_block, number)
    }

    pub fn is_constantinople(&self, number: u64) -> bool {
        is_forked(self.constantinople_block, number)
    }

    pub fn is_muir_glacier(&self, number: u64) -> bool {
        is_forked(self.muir_glacier_block, number)
    }

    pub fn is_london(&self, number: u64) -> bool {
        is_forked(self.london_block, number)
    }

    pub fn is_arrow_glacier(&self, number: u64) -> bool {
        is_forked(self.arrow_glacier_block, number)
    }

    pub fn is_gray_glacier(&self, number: u64) -> bool {
        is_forked(self.gray_glacier_block, number)
    }

    pub fn is_ethpow_fork(&self, number: u64) -> bool {
        is_forked(self.ethpow_fork_block, number)
    }

    /// Check that activated forks appear in protocol order.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ordered = [
            ("homestead", self.homestead_block),
            ("byzantium", self.byzantium_block),
            ("constantinople", self.constantinople_block),
            ("muirGlacier", self.muir_glacier_block),
            ("london", self.london_block),
            ("arrowGlacier", self.arrow_glacier_block),
            ("grayGlacier", self.gray_glacier_block),
            ("ethpow", self.ethpow_fork_block),
        ];

        let mut last: Option<(&'static str, u64)> = None;
        for (name, block) in ordered {
            let Some(block) = block else { continue };
            if let Some((earlier, earlier_block)) = last {
                if block < earlier_block {
                    return Err(ConfigError::ForkOrder {
                        earlier,
                        earlier_block,
                        later: name,
                        later_block: block,
                    });
                }
            }
            last = Some((name, block));
        }
        Ok(())
    }
}

/// Protocol constants of the historical difficulty formulas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DifficultyConfig {
    /// Floor applied by every formula
    pub minimum_difficulty: u64,
    /// Right shift standing in for the 2048 bound divisor
    pub bound_divisor_shift: u32,
    /// Blocks per difficulty-bomb period
    pub exp_diff_period: u64,
    /// Frontier decision boundary on block time, in seconds
    pub frontier_duration_limit: u64,
    /// Difficulty installed 2048 blocks after the EthPoW fork
    pub ethpow_start_difficulty: u64,
}

impl DifficultyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.minimum_difficulty == 0 {
            return Err(ConfigError::ZeroMinimumDifficulty);
        }
        if self.exp_diff_period == 0 {
            return Err(ConfigError::ZeroDifficultyPeriod);
        }
        Ok(())
    }
}

impl Default for DifficultyConfig {
    fn default() -> Self {
        DifficultyConfig {
            minimum_difficulty: 131_072,
            bound_divisor_shift: 11,
            exp_diff_period: 100_000,
            frontier_duration_limit: 13,
            ethpow_start_difficulty: 1 << 46,
        }
    }
}

/// Weights blending PoW with the stake, transaction and trust adjustments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridWeights {
    pub pow: u64,
    pub stake: u64,
    pub transaction: u64,
    pub trust: u64,
}

impl Default for HybridWeights {
    fn default() -> Self {
        HybridWeights {
            pow: 100,
            stake: 50,
            transaction: 30,
            trust: 20,
        }
    }
}

impl HybridWeights {
    pub fn new(pow: u64, stake: u64, transaction: u64, trust: u64) -> Result<Self, ConfigError> {
        let weights = HybridWeights { pow, stake, transaction, trust };
        if weights.total() == 0 {
            return Err(ConfigError::ZeroTotalWeight);
        }
        Ok(weights)
    }

    /// Sum of all four weights.
    pub fn total(&self) -> u64 {
        self.pow
            .saturating_add(self.stake)
            .saturating_add(self.transaction)
            .saturating_add(self.trust)
    }
}

/// Reward amounts in wei.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Static reward credited to the block beneficiary
    pub block_reward: u64,
    /// Pool split across stake/transaction/trust participants each block
    pub hybrid_pool: u64,
    /// Divisor applied to stake × transactions × uptime
    pub hybrid_normalizer: u64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        RewardConfig {
            block_reward: 1_000_000_000_000_000_000,
            hybrid_pool: 1_000_000_000_000_000_000,
            hybrid_normalizer: 10_000,
        }
    }
}

/// Structural limits on headers and uncles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderLimits {
    pub allowed_future_block_secs: i64,
    pub max_extra_data_size: usize,
    pub max_uncles: usize,
    /// How many ancestors an uncle's parent may be drawn from
    pub uncle_generations: u64,
}

impl Default for HeaderLimits {
    fn default() -> Self {
        HeaderLimits {
            allowed_future_block_secs: 15,
            max_extra_data_size: 32,
            max_uncles: 2,
            uncle_generations: 7,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub chain: ChainConfig,
    pub difficulty: DifficultyConfig,
    pub weights: HybridWeights,
    pub rewards: RewardConfig,
    pub limits: HeaderLimits,
    pub pow_mode: PowMode,
}

impl EngineConfig {
    pub fn new(chain: ChainConfig) -> Self {
        EngineConfig {
            chain,
            ..Default::default()
        }
    }

    /// Load from a TOML, YAML or JSON file, with `HYBRID__SECTION__FIELD`
    /// environment variables taking precedence.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(config::Environment::with_prefix("HYBRID").separator("__"))
            .build()?;
        let loaded: EngineConfig = settings.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chain.validate()?;
        if self.weights.total() == 0 {
            return Err(ConfigError::ZeroTotalWeight);
        }
        self.difficulty.validate()?;
        if self.rewards.hybrid_normalizer == 0 {
            return Err(ConfigError::ZeroNormalizer);
        }
        Ok(())
    }
}
