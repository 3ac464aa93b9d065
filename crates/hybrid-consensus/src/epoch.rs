// DIFFICULTY EPOCHS
// Fork-scoped difficulty rule sets, selected by block number.
//
// SAFETY INVARIANTS:
// 1. The epoch for a block number is a pure function of the fork schedule
// 2. Selection picks the latest-activated epoch at or below the block number
// 3. The schedule is immutable once built

use crate::config::ChainConfig;
use serde::{Deserialize, Serialize};

/// Historical difficulty rule sets, in activation order.
///
/// SAFETY: The derive order of this enum is the protocol order. Selection
/// relies on later variants superseding earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DifficultyEpoch {
    Frontier,
    Homestead,
    Byzantium,
    Constantinople,
    MuirGlacier,
    London,
    ArrowGlacier,
    GrayGlacier,
    /// Post-merge proof-of-work continuation: Byzantium shape, no bomb
    EthPoW,
}

impl DifficultyEpoch {
    pub const ALL: [DifficultyEpoch; 9] = [
        DifficultyEpoch::Frontier,
        DifficultyEpoch::Homestead,
        DifficultyEpoch::Byzantium,
        DifficultyEpoch::Constantinople,
        DifficultyEpoch::MuirGlacier,
        DifficultyEpoch::London,
        DifficultyEpoch::ArrowGlacier,
        DifficultyEpoch::GrayGlacier,
        DifficultyEpoch::EthPoW,
    ];

    /// Return a human-readable name for logging and diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            DifficultyEpoch::Frontier => "FRONTIER",
            DifficultyEpoch::Homestead => "HOMESTEAD",
            DifficultyEpoch::Byzantium => "BYZANTIUM",
            DifficultyEpoch::Constantinople => "CONSTANTINOPLE",
            DifficultyEpoch::MuirGlacier => "MUIR_GLACIER",
            DifficultyEpoch::London => "LONDON",
            DifficultyEpoch::ArrowGlacier => "ARROW_GLACIER",
            DifficultyEpoch::GrayGlacier => "GRAY_GLACIER",
            DifficultyEpoch::EthPoW => "ETHPOW",
        }
    }

    /// Bomb delay, in blocks, of the Byzantium-family formulas.
    ///
    /// `None` for epochs that either use the undelayed bomb (Frontier,
    /// Homestead) or have no bomb at all (EthPoW).
    pub fn bomb_delay(&self) -> Option<u64> {
        match self {
            DifficultyEpoch::Byzantium => Some(3_000_000),      // EIP-649
            DifficultyEpoch::Constantinople => Some(5_000_000), // EIP-1234
            DifficultyEpoch::MuirGlacier => Some(9_000_000),    // EIP-2384
            DifficultyEpoch::London => Some(9_700_000),         // EIP-3554
            DifficultyEpoch::ArrowGlacier => Some(10_700_000),  // EIP-4345
            DifficultyEpoch::GrayGlacier => Some(11_400_000),   // EIP-5133
            DifficultyEpoch::Frontier | DifficultyEpoch::Homestead | DifficultyEpoch::EthPoW => None,
        }
    }

    fn activation(&self, config: &ChainConfig) -> Option<u64> {
        match self {
            DifficultyEpoch::Frontier => Some(0),
            DifficultyEpoch::Homestead => config.homestead_block,
            DifficultyEpoch::Byzantium => config.byzantium_block,
            DifficultyEpoch::Constantinople => config.constantinople_block,
            DifficultyEpoch::MuirGlacier => config.muir_glacier_block,
            DifficultyEpoch::London => config.london_block,
            DifficultyEpoch::ArrowGlacier => config.arrow_glacier_block,
            DifficultyEpoch::GrayGlacier => config.gray_glacier_block,
            DifficultyEpoch::EthPoW => config.ethpow_fork_block,
        }
    }
}

/// Activation table derived from a chain configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochSchedule {
    activations: Vec<(DifficultyEpoch, u64)>,
}

impl EpochSchedule {
    pub fn new(config: &ChainConfig) -> Self {
        let activations = DifficultyEpoch::ALL
            .iter()
            .filter_map(|epoch| epoch.activation(config).map(|block| (*epoch, block)))
            .collect();
        EpochSchedule { activations }
    }

    /// Epoch governing a block with the given number.
    ///
    /// SAFETY: Deterministic. Walks from the latest epoch down so that a
    /// later fork wins whenever it is active.
    pub fn epoch_at(&self, number: u64) -> DifficultyEpoch {
        self.activations
            .iter()
            .rev()
            .find(|(_, block)| *block <= number)
            .map(|(epoch, _)| *epoch)
            .unwrap_or(DifficultyEpoch::Frontier)
    }

    /// Configured epochs with their activation block, in protocol order.
    pub fn activations(&self) -> &[(DifficultyEpoch, u64)] {
        &self.activations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frontier_only_schedule() {
        let schedule = EpochSchedule::new(&ChainConfig::default());
        assert_eq!(schedule.activations(), &[(DifficultyEpoch::Frontier, 0)]);
        assert_eq!(schedule.epoch_at(0), DifficultyEpoch::Frontier);
        assert_eq!(schedule.epoch_at(u64::MAX), DifficultyEpoch::Frontier);
    }

    #[test]
    fn test_mainnet_epoch_boundaries() {
        let schedule = EpochSchedule::new(&ChainConfig::mainnet());
        assert_eq!(schedule.epoch_at(1_149_999), DifficultyEpoch::Frontier);
        assert_eq!(schedule.epoch_at(1_150_000), DifficultyEpoch::Homestead);
        assert_eq!(schedule.epoch_at(4_370_000), DifficultyEpoch::Byzantium);
        assert_eq!(schedule.epoch_at(7_280_000), DifficultyEpoch::Constantinople);
        assert_eq!(schedule.epoch_at(9_200_000), DifficultyEpoch::MuirGlacier);
        assert_eq!(schedule.epoch_at(12_965_000), DifficultyEpoch::London);
        assert_eq!(schedule.epoch_at(13_773_000), DifficultyEpoch::ArrowGlacier);
        assert_eq!(schedule.epoch_at(15_050_000), DifficultyEpoch::GrayGlacier);
        assert_eq!(schedule.epoch_at(u64::MAX), DifficultyEpoch::GrayGlacier);
    }

    #[test]
    fn test_same_block_activation_latest_wins() {
        let schedule = EpochSchedule::new(&ChainConfig::all_forks_at_genesis());
        assert_eq!(schedule.epoch_at(0), DifficultyEpoch::GrayGlacier);
    }

    #[test]
    fn test_ethpow_takes_over() {
        let config = ChainConfig {
            ethpow_fork_block: Some(1000),
            ..ChainConfig::all_forks_at_genesis()
        };
        let schedule = EpochSchedule::new(&config);
        assert_eq!(schedule.epoch_at(999), DifficultyEpoch::GrayGlacier);
        assert_eq!(schedule.epoch_at(1000), DifficultyEpoch::EthPoW);
    }

    #[test]
    fn test_bomb_delays() {
        assert_eq!(DifficultyEpoch::Byzantium.bomb_delay(), Some(3_000_000));
        assert_eq!(DifficultyEpoch::GrayGlacier.bomb_delay(), Some(11_400_000));
        assert_eq!(DifficultyEpoch::Homestead.bomb_delay(), None);
        assert_eq!(DifficultyEpoch::EthPoW.bomb_delay(), None);
    }

    #[test]
    fn test_epoch_str() {
        assert_eq!(DifficultyEpoch::MuirGlacier.as_str(), "MUIR_GLACIER");
        assert_eq!(DifficultyEpoch::EthPoW.as_str(), "ETHPOW");
    }
}
