// HEADER VALIDATOR
// Sequential, batch and uncle verification of candidate headers.
//
// SAFETY INVARIANTS:
// 1. Checks run in a fixed order; the first failing check is reported
// 2. Uncles skip the future-time and fork-hash checks and always check the seal
// 3. Batch verification shares a single wall-clock snapshot across the batch
// 4. Batch results are emitted in input order

use crate::batch::{self, AbortHandle};
use crate::config::{ChainConfig, ConfigError, EngineConfig, HeaderLimits};
use crate::difficulty::DifficultyOracle;
use crate::engine::{ChainHeaderReader, ChainReader, ConsensusError};
use crate::gas::{self, MAX_GAS_LIMIT};
use crate::seal::SealVerifier;
use crate::types::{Block, ChainHeader, Hash};
use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use std::sync::mpsc::Receiver;
use std::sync::Arc;

/// Extra-data required on the DAO fork blocks by nodes that support the fork.
pub const DAO_FORK_BLOCK_EXTRA: &[u8] = b"dao-hard-fork";
/// Number of blocks from the DAO fork that must carry the fork extra-data.
pub const DAO_FORK_EXTRA_RANGE: u64 = 10;

pub type VerifyResult = Result<(), ConsensusError>;

pub struct HeaderValidator {
    chain: ChainConfig,
    limits: HeaderLimits,
    oracle: DifficultyOracle,
    sealer: SealVerifier,
}

impl HeaderValidator {
    pub fn new(config: &EngineConfig, sealer: SealVerifier) -> Result<Self, ConfigError> {
        Ok(HeaderValidator {
            chain: config.chain.clone(),
            limits: config.limits.clone(),
            oracle: DifficultyOracle::new(&config.chain, config.difficulty.clone())?,
            sealer,
        })
    }

    pub fn oracle(&self) -> &DifficultyOracle {
        &self.oracle
    }

    pub fn sealer(&self) -> &SealVerifier {
        &self.sealer
    }

    pub fn chain_config(&self) -> &ChainConfig {
        &self.chain
    }

    /// Verify a header against its parent looked up in `chain`.
    ///
    /// Headers the chain already holds are accepted without re-checking.
    pub fn verify_header(&self, chain: &dyn ChainHeaderReader, header: &ChainHeader, seal: bool) -> VerifyResult {
        if self.sealer.mode().is_full_fake() {
            return Ok(());
        }
        if chain.get_header(&header.hash(), header.number).is_some() {
            return Ok(());
        }
        let parent = parent_of(chain, header).ok_or(ConsensusError::UnknownAncestor)?;

        self.verify_against_parent(header, &parent, false, seal, unix_now())
            .map_err(|e| {
                warn!("Rejected header #{}: {}", header.number, e);
                e
            })
    }

    /// Verify a contiguous run of headers in parallel.
    ///
    /// `headers[0]`'s parent comes from `chain`; every later header's parent
    /// is its predecessor in `headers`. A missing `seals` entry means no seal check.
    pub fn verify_headers(
        self: &Arc<Self>,
        chain: Arc<dyn ChainHeaderReader>,
        headers: Vec<ChainHeader>,
        seals: Vec<bool>,
    ) -> (AbortHandle, Receiver<VerifyResult>) {
        if self.sealer.mode().is_full_fake() || headers.is_empty() {
            return batch::completed(headers.iter().map(|_| Ok(())).collect());
        }

        let now = unix_now();
        let len = headers.len();
        let validator = Arc::clone(self);
        let headers = Arc::new(headers);
        let seals = Arc::new(seals);
        batch::run_ordered(len, move |index| {
            validator.verify_batch_entry(chain.as_ref(), &headers, &seals, index, now)
        })
    }

    fn verify_batch_entry(
        &self,
        chain: &dyn ChainHeaderReader,
        headers: &[ChainHeader],
        seals: &[bool],
        index: usize,
        now: i64,
    ) -> VerifyResult {
        let header = &headers[index];
        let parent = if index == 0 {
            parent_of(chain, header)
        } else {
            let previous = &headers[index - 1];
            if previous.hash() != header.parent_hash {
                None
            } else if previous.number.checked_add(1) != Some(header.number) {
                // linked by hash but not by number; reject before any difficulty math
                return Err(ConsensusError::InvalidNumber {
                    number: header.number,
                    parent: previous.number,
                });
            } else {
                Some(previous.clone())
            }
        };
        let Some(parent) = parent else {
            debug!("Batch entry {} (#{}) has no known parent", index, header.number);
            return Err(ConsensusError::UnknownAncestor);
        };
        let seal = seals.get(index).copied().unwrap_or(false);
        self.verify_against_parent(header, &parent, false, seal, now)
    }

    /// Verify the uncles of `block`: count, uniqueness, ancestry, then each as a header.
    pub fn verify_uncles(&self, chain: &dyn ChainReader, block: &Block) -> VerifyResult {
        if self.sealer.mode().is_full_fake() {
            return Ok(());
        }
        if block.uncles.len() > self.limits.max_uncles {
            return Err(ConsensusError::TooManyUncles {
                have: block.uncles.len(),
                max: self.limits.max_uncles,
            });
        }
        if block.uncles.is_empty() {
            return Ok(());
        }

        let (mut ancestors, mut seen) = self.collect_ancestry(chain, block);
        let block_hash = block.hash();
        ancestors.insert(block_hash, block.header.clone());
        seen.insert(block_hash);

        let now = unix_now();
        for uncle in &block.uncles {
            let hash = uncle.hash();
            if !seen.insert(hash) {
                warn!("Block #{} includes duplicate uncle {}", block.number(), hash);
                return Err(ConsensusError::DuplicateUncle(hash));
            }
            if ancestors.contains_key(&hash) {
                return Err(ConsensusError::UncleIsAncestor(hash));
            }
            let Some(parent) = ancestors.get(&uncle.parent_hash) else {
                return Err(ConsensusError::DanglingUncle(hash));
            };
            if uncle.parent_hash == block.parent_hash() {
                return Err(ConsensusError::DanglingUncle(hash));
            }
            self.verify_against_parent(uncle, parent, true, true, now)?;
        }
        Ok(())
    }

    // Walk back up to `uncle_generations` ancestors collecting their headers
    // and every uncle they already included.
    fn collect_ancestry(&self, chain: &dyn ChainReader, block: &Block) -> (HashMap<Hash, ChainHeader>, HashSet<Hash>) {
        let mut ancestors = HashMap::new();
        let mut included = HashSet::new();

        let mut hash = block.parent_hash();
        let mut number = block.number().checked_sub(1);
        for _ in 0..self.limits.uncle_generations {
            let Some(current) = number else { break };
            let Some(ancestor) = chain.get_header(&hash, current) else {
                break;
            };
            if ancestor.has_uncles() {
                let Some(full) = chain.get_block(&hash, current) else {
                    break;
                };
                included.extend(full.uncles.iter().map(ChainHeader::hash));
            }
            hash = ancestor.parent_hash;
            number = current.checked_sub(1);
            ancestors.insert(ancestor.hash(), ancestor);
        }
        (ancestors, included)
    }

    /// Every header check, in protocol order, against an already-resolved parent.
    pub fn verify_against_parent(
        &self,
        header: &ChainHeader,
        parent: &ChainHeader,
        uncle: bool,
        seal: bool,
        now: i64,
    ) -> VerifyResult {
        if header.extra.len() > self.limits.max_extra_data_size {
            return Err(ConsensusError::ExtraDataTooLong {
                have: header.extra.len(),
                max: self.limits.max_extra_data_size,
            });
        }
        if !uncle {
            let latest = i128::from(now) + i128::from(self.limits.allowed_future_block_secs);
            if i128::from(header.time) > latest {
                return Err(ConsensusError::FutureBlock { time: header.time, now });
            }
        }
        if header.time <= parent.time {
            return Err(ConsensusError::OlderBlockTime {
                time: header.time,
                parent_time: parent.time,
            });
        }

        let want = self.oracle.compute_difficulty(header.time, parent);
        if want != header.difficulty {
            return Err(ConsensusError::InvalidDifficulty {
                have: header.difficulty.clone(),
                want,
            });
        }

        if header.gas_limit > MAX_GAS_LIMIT {
            return Err(ConsensusError::InvalidGasLimit {
                have: header.gas_limit,
                max: MAX_GAS_LIMIT,
            });
        }
        if header.gas_used > header.gas_limit {
            return Err(ConsensusError::InvalidGasUsed {
                used: header.gas_used,
                limit: header.gas_limit,
            });
        }

        if !self.chain.is_london(header.number) {
            if let Some(base_fee) = &header.base_fee {
                return Err(ConsensusError::BaseFeeBeforeFork(base_fee.clone()));
            }
            gas::verify_gas_limit(parent.gas_limit, header.gas_limit)?;
        } else {
            gas::verify_eip1559_header(&self.chain, parent, header)?;
        }

        if parent.number.checked_add(1) != Some(header.number) {
            return Err(ConsensusError::InvalidNumber {
                number: header.number,
                parent: parent.number,
            });
        }

        if seal {
            self.sealer.verify_seal(header, false)?;
        }

        self.verify_dao_extra_data(header)?;
        self.verify_fork_hashes(header, uncle)
    }

    fn verify_dao_extra_data(&self, header: &ChainHeader) -> VerifyResult {
        let Some(fork) = self.chain.dao_fork_block else {
            return Ok(());
        };
        let end = fork.saturating_add(DAO_FORK_EXTRA_RANGE);
        if header.number < fork || header.number >= end {
            return Ok(());
        }
        let marked = header.extra == DAO_FORK_BLOCK_EXTRA;
        if marked != self.chain.dao_fork_support {
            return Err(ConsensusError::InvalidDaoExtraData);
        }
        Ok(())
    }

    fn verify_fork_hashes(&self, header: &ChainHeader, uncle: bool) -> VerifyResult {
        if uncle {
            return Ok(());
        }
        if self.chain.eip150_block != Some(header.number) {
            return Ok(());
        }
        match self.chain.eip150_hash {
            Some(want) if !want.is_zero() => {
                let have = header.hash();
                if have != want {
                    return Err(ConsensusError::ForkHashMismatch {
                        number: header.number,
                        have,
                        want,
                    });
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

fn parent_of(chain: &dyn ChainHeaderReader, header: &ChainHeader) -> Option<ChainHeader> {
    let number = header.number.checked_sub(1)?;
    chain.get_header(&header.parent_hash, number)
}

fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}
