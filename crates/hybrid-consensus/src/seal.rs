// PROOF-OF-WORK SEAL VERIFICATION
// Checks a header's nonce/mix-digest pair against its difficulty target.
//
// SAFETY INVARIANTS:
// 1. Hashing is delegated to an external dataset provider keyed by block number
// 2. A seal is valid iff the mix digest matches exactly and result <= 2^256 / difficulty
// 3. Fake modes only exist in test and simulator builds

use crate::config::ConfigError;
use crate::engine::ConsensusError;
use crate::types::{ChainHeader, Hash};
use num_bigint::BigUint;
use num_traits::{One, Zero};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(any(test, feature = "simulator"))]
use std::time::Duration;

/// Blocks per Ethash epoch; the seed hash advances once per epoch.
pub const EPOCH_LENGTH: u64 = 30_000;

/// How seals are checked.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowMode {
    /// Full verification against the dataset provider
    #[default]
    Normal,
    /// Full verification, light cache only
    Test,
    /// Accept every seal after `delay_ms`, except the one at `fail_block`
    #[cfg(any(test, feature = "simulator"))]
    Fake { delay_ms: u64, fail_block: Option<u64> },
    /// Accept every header, batch and uncle set without checking anything
    #[cfg(any(test, feature = "simulator"))]
    FullFake,
}

impl PowMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PowMode::Normal => "normal",
            PowMode::Test => "test",
            #[cfg(any(test, feature = "simulator"))]
            PowMode::Fake { .. } => "fake",
            #[cfg(any(test, feature = "simulator"))]
            PowMode::FullFake => "full_fake",
        }
    }

    pub fn is_full_fake(&self) -> bool {
        #[cfg(any(test, feature = "simulator"))]
        {
            matches!(self, PowMode::FullFake)
        }
        #[cfg(not(any(test, feature = "simulator")))]
        {
            false
        }
    }

    fn needs_dataset(&self) -> bool {
        matches!(self, PowMode::Normal | PowMode::Test)
    }
}

/// Output of one hashimoto run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowOutput {
    pub mix_digest: Hash,
    pub result: Hash,
}

/// A loaded dataset or cache able to run hashimoto.
pub trait Hashimoto: Send + Sync {
    fn compute(&self, seal_hash: &Hash, nonce: u64) -> PowOutput;
}

/// Source of Ethash datasets and caches.
pub trait DatasetProvider: Send + Sync {
    /// Full dataset for the epoch of `number`, if it has been generated.
    fn dataset(&self, number: u64) -> Option<Arc<dyn Hashimoto>>;

    /// Verification cache for the epoch of `number`.
    fn cache(&self, number: u64) -> Arc<dyn Hashimoto>;
}

enum Backend {
    Hashing {
        provider: Arc<dyn DatasetProvider>,
        light_only: bool,
    },
    #[cfg(any(test, feature = "simulator"))]
    Fake {
        delay: Duration,
        fail_block: Option<u64>,
    },
}

pub struct SealVerifier {
    mode: PowMode,
    backend: Backend,
}

impl SealVerifier {
    /// Build a verifier for `mode`. Normal and test modes require a provider.
    pub fn new(mode: PowMode, provider: Option<Arc<dyn DatasetProvider>>) -> Result<Self, ConfigError> {
        let backend = match (&mode, provider) {
            #[cfg(any(test, feature = "simulator"))]
            (PowMode::Fake { delay_ms, fail_block }, _) => Backend::Fake {
                delay: Duration::from_millis(*delay_ms),
                fail_block: *fail_block,
            },
            #[cfg(any(test, feature = "simulator"))]
            (PowMode::FullFake, _) => Backend::Fake {
                delay: Duration::ZERO,
                fail_block: None,
            },
            (mode, Some(provider)) if mode.needs_dataset() => Backend::Hashing {
                provider,
                light_only: *mode == PowMode::Test,
            },
            (mode, _) => return Err(ConfigError::MissingDataset(mode.as_str())),
        };
        Ok(SealVerifier { mode, backend })
    }

    pub fn mode(&self) -> &PowMode {
        &self.mode
    }

    /// Check the header's proof-of-work. `fulldag` prefers the full dataset when available.
    pub fn verify_seal(&self, header: &ChainHeader, fulldag: bool) -> Result<(), ConsensusError> {
        let (provider, light_only) = match &self.backend {
            Backend::Hashing { provider, light_only } => (provider, *light_only),
            #[cfg(any(test, feature = "simulator"))]
            Backend::Fake { delay, fail_block } => {
                if !delay.is_zero() {
                    std::thread::sleep(*delay);
                }
                if *fail_block == Some(header.number) {
                    return Err(ConsensusError::InvalidPoW);
                }
                return Ok(());
            }
        };

        let Some(target) = target_for(&header.difficulty) else {
            return Err(ConsensusError::NonPositiveDifficulty);
        };

        let seal_hash = header.seal_hash();
        let nonce = header.nonce.as_u64();
        let full = if fulldag && !light_only {
            provider.dataset(header.number)
        } else {
            None
        };
        let output = match full {
            Some(dataset) => dataset.compute(&seal_hash, nonce),
            None => provider.cache(header.number).compute(&seal_hash, nonce),
        };

        if output.mix_digest != header.mix_digest {
            return Err(ConsensusError::InvalidMixDigest);
        }
        if BigUint::from_bytes_be(output.result.as_bytes()) > target {
            return Err(ConsensusError::InvalidPoW);
        }
        Ok(())
    }
}

/// `2^256 / difficulty`, or `None` for a zero difficulty.
pub fn target_for(difficulty: &BigUint) -> Option<BigUint> {
    if difficulty.is_zero() {
        return None;
    }
    Some((BigUint::one() << 256u32) / difficulty)
}

/// Target as a 32-byte word; a difficulty of one wraps to zero like a 256-bit truncation.
pub fn target_hash(difficulty: &BigUint) -> Hash {
    let target = target_for(difficulty).unwrap_or_default();
    let bytes = target.to_bytes_be();
    let tail = &bytes[bytes.len().saturating_sub(32)..];
    let mut out = [0u8; 32];
    out[32 - tail.len()..].copy_from_slice(tail);
    Hash(out)
}

/// Seed hash of the epoch containing `number`.
pub fn seed_hash(number: u64) -> Hash {
    let mut seed = Hash::ZERO;
    for _ in 0..number / EPOCH_LENGTH {
        seed = Hash::keccak(seed.as_bytes());
    }
    seed
}
