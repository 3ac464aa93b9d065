// HYBRID ETHASH ENGINE
// Owns the difficulty oracle, header validator, reward distributor and
// participant registries, and exposes them through ConsensusEngine.
//
// SAFETY INVARIANTS:
// 1. Configuration is validated once, at construction
// 2. Registries are mutated only through the update hooks below
// 3. Readers receive snapshots, never references into locked state
// 4. Finalization reads the registries under a single read lock

use crate::batch::AbortHandle;
use crate::config::{ConfigError, EngineConfig};
use crate::difficulty::{DifficultyOracle, HybridFactors};
use crate::engine::{ChainHeaderReader, ChainReader, ConsensusEngine, ConsensusError, StateDb};
use crate::registry::{ParticipantRegistries, TransactionRecord, TrustRecord, Validator};
use crate::reward::{RewardDistributor, RewardSummary};
use crate::seal::{DatasetProvider, SealVerifier};
use crate::types::{Address, Block, ChainHeader, Hash};
use crate::verifier::HeaderValidator;
use log::{debug, info};
use num_bigint::BigUint;
use parking_lot::RwLock;
use std::sync::mpsc::Receiver;
use std::sync::Arc;

pub struct HybridEthash {
    config: EngineConfig,
    validator: Arc<HeaderValidator>,
    rewards: RewardDistributor,
    registries: RwLock<ParticipantRegistries>,
    head: RwLock<Option<ChainHeader>>,
}

impl HybridEthash {
    /// Build the engine. `provider` is required unless a fake seal mode is configured.
    pub fn new(config: EngineConfig, provider: Option<Arc<dyn DatasetProvider>>) -> Result<Self, ConfigError> {
        config.validate()?;
        let sealer = SealVerifier::new(config.pow_mode.clone(), provider)?;
        let validator = Arc::new(HeaderValidator::new(&config, sealer)?);
        let rewards = RewardDistributor::new(config.rewards.clone());

        info!(
            "Hybrid engine ready: chain {}, seal mode {}, weights pow={} stake={} tx={} trust={}",
            config.chain.chain_id,
            config.pow_mode.as_str(),
            config.weights.pow,
            config.weights.stake,
            config.weights.transaction,
            config.weights.trust
        );

        Ok(HybridEthash {
            config,
            validator,
            rewards,
            registries: RwLock::new(ParticipantRegistries::new()),
            head: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn oracle(&self) -> &DifficultyOracle {
        self.validator.oracle()
    }

    pub fn header_validator(&self) -> &Arc<HeaderValidator> {
        &self.validator
    }

    pub fn verify_seal(&self, header: &ChainHeader, fulldag: bool) -> Result<(), ConsensusError> {
        self.validator.sealer().verify_seal(header, fulldag)
    }

    /// Epoch difficulty followed by the hybrid stage with the configured weights.
    pub fn calc_custom_difficulty(&self, time: u64, parent: &ChainHeader, factors: &HybridFactors) -> BigUint {
        self.oracle()
            .compute_custom_difficulty(time, parent, factors, &self.config.weights)
    }

    // Registry hooks

    pub fn update_stake(&self, address: Address, amount: &BigUint, block_number: u64) {
        self.registries.write().update_stake(address, amount, block_number);
        debug!("Stake of {} increased by {} at #{}", address, amount, block_number);
    }

    pub fn record_transaction(&self, address: Address, block_number: u64) {
        self.registries.write().record_transaction(address, block_number);
    }

    pub fn update_trust(&self, address: Address, uptime: u64, block_number: u64) {
        self.registries.write().update_trust(address, uptime, block_number);
    }

    pub fn set_validator_active(&self, address: &Address, active: bool) -> bool {
        self.registries.write().set_validator_active(address, active)
    }

    // Read-only queries

    pub fn registries(&self) -> ParticipantRegistries {
        self.registries.read().clone()
    }

    pub fn validators(&self) -> Vec<Validator> {
        self.registries.read().stake.validators()
    }

    pub fn transaction_records(&self) -> Vec<TransactionRecord> {
        self.registries.read().transactions.records()
    }

    pub fn trust_records(&self) -> Vec<TrustRecord> {
        self.registries.read().trust.records()
    }

    pub fn uptime(&self, address: &Address) -> u64 {
        self.registries.read().trust.uptime(address)
    }

    /// Record the current chain head; difficulty components are derived from it.
    pub fn set_head(&self, header: ChainHeader) {
        *self.head.write() = Some(header);
    }

    pub fn head(&self) -> Option<ChainHeader> {
        self.head.read().clone()
    }

    /// Difficulty of the current head, or the minimum before any head is known.
    pub fn pow_difficulty(&self) -> BigUint {
        self.head
            .read()
            .as_ref()
            .map(|h| h.difficulty.clone())
            .unwrap_or_else(|| self.oracle().minimum_difficulty())
    }

    pub fn pos_difficulty(&self) -> BigUint {
        self.component(self.config.weights.stake)
    }

    pub fn pot_difficulty(&self) -> BigUint {
        self.component(self.config.weights.transaction)
    }

    pub fn trust_difficulty(&self) -> BigUint {
        self.component(self.config.weights.trust)
    }

    /// Hybrid difficulty of the current head under the given factors.
    pub fn custom_difficulty(&self, factors: &HybridFactors) -> BigUint {
        self.oracle()
            .compute_hybrid_difficulty(&self.pow_difficulty(), factors, &self.config.weights)
    }

    // base × weight / total, the term a factor of one contributes
    fn component(&self, weight: u64) -> BigUint {
        let total = self.config.weights.total();
        if total == 0 {
            return BigUint::default();
        }
        self.pow_difficulty() * BigUint::from(weight) / BigUint::from(total)
    }
}

impl ConsensusEngine for HybridEthash {
    fn author(&self, header: &ChainHeader) -> Address {
        header.coinbase
    }

    fn verify_header(&self, chain: &dyn ChainHeaderReader, header: &ChainHeader, seal: bool) -> Result<(), ConsensusError> {
        self.validator.verify_header(chain, header, seal)
    }

    fn verify_headers(
        &self,
        chain: Arc<dyn ChainHeaderReader>,
        headers: Vec<ChainHeader>,
        seals: Vec<bool>,
    ) -> (AbortHandle, Receiver<Result<(), ConsensusError>>) {
        self.validator.verify_headers(chain, headers, seals)
    }

    fn verify_uncles(&self, chain: &dyn ChainReader, block: &Block) -> Result<(), ConsensusError> {
        self.validator.verify_uncles(chain, block)
    }

    fn prepare(&self, chain: &dyn ChainHeaderReader, header: &mut ChainHeader) -> Result<(), ConsensusError> {
        let number = header.number.checked_sub(1).ok_or(ConsensusError::UnknownAncestor)?;
        let parent = chain
            .get_header(&header.parent_hash, number)
            .ok_or(ConsensusError::UnknownAncestor)?;
        header.difficulty = self.oracle().compute_difficulty(header.time, &parent);
        Ok(())
    }

    fn finalize(&self, header: &mut ChainHeader, state: &mut dyn StateDb, uncles: &[ChainHeader]) -> RewardSummary {
        let delete_empty = self.config.chain.is_eip158(header.number);
        let registries = self.registries.read();
        self.rewards
            .finalize(header, state, uncles, &registries, delete_empty)
    }

    fn seal_hash(&self, header: &ChainHeader) -> Hash {
        header.seal_hash()
    }

    fn calc_difficulty(&self, time: u64, parent: &ChainHeader) -> BigUint {
        self.oracle().compute_difficulty(time, parent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChainConfig;
    use crate::seal::PowMode;
    use std::collections::HashMap;

    struct EmptyChain;

    impl ChainHeaderReader for EmptyChain {
        fn get_header(&self, _hash: &Hash, _number: u64) -> Option<ChainHeader> {
            None
        }
    }

    impl ChainReader for EmptyChain {
        fn get_block(&self, _hash: &Hash, _number: u64) -> Option<Block> {
            None
        }
    }

    #[derive(Default)]
    struct Balances {
        credited: HashMap<Address, BigUint>,
        delete_empty: Option<bool>,
    }

    impl StateDb for Balances {
        fn add_balance(&mut self, address: &Address, amount: &BigUint) {
            *self.credited.entry(*address).or_default() += amount;
        }

        fn intermediate_root(&mut self, delete_empty: bool) -> Hash {
            self.delete_empty = Some(delete_empty);
            Hash([0x11; 32])
        }
    }

    fn engine(mode: PowMode) -> HybridEthash {
        let config = EngineConfig {
            pow_mode: mode,
            ..EngineConfig::new(ChainConfig::all_forks_at_genesis())
        };
        HybridEthash::new(config, None).unwrap()
    }

    #[test]
    fn test_full_fake_accepts_everything() {
        let engine = engine(PowMode::FullFake);
        let orphan = ChainHeader { number: 9, ..Default::default() };
        assert_eq!(engine.verify_header(&EmptyChain, &orphan, true), Ok(()));

        let block = Block::new(orphan.clone(), vec![orphan.clone(), orphan.clone(), orphan]);
        assert_eq!(engine.verify_uncles(&EmptyChain, &block), Ok(()));
    }

    #[test]
    fn test_missing_provider_rejected() {
        let config = EngineConfig::new(ChainConfig::default());
        assert!(matches!(
            HybridEthash::new(config, None),
            Err(ConfigError::MissingDataset(_))
        ));
    }

    #[test]
    fn test_invalid_weights_rejected() {
        let mut config = EngineConfig::new(ChainConfig::default());
        config.pow_mode = PowMode::FullFake;
        config.weights.pow = 0;
        config.weights.stake = 0;
        config.weights.transaction = 0;
        config.weights.trust = 0;
        assert!(matches!(HybridEthash::new(config, None), Err(ConfigError::ZeroTotalWeight)));
    }

    #[test]
    fn test_prepare_requires_parent() {
        let engine = engine(PowMode::FullFake);
        let mut header = ChainHeader { number: 1, ..Default::default() };
        assert_eq!(engine.prepare(&EmptyChain, &mut header), Err(ConsensusError::UnknownAncestor));
        let mut genesis = ChainHeader::default();
        assert_eq!(engine.prepare(&EmptyChain, &mut genesis), Err(ConsensusError::UnknownAncestor));
    }

    #[test]
    fn test_difficulty_components_follow_head() {
        let engine = engine(PowMode::FullFake);
        assert_eq!(engine.pow_difficulty(), BigUint::from(131_072u32));

        engine.set_head(ChainHeader {
            difficulty: BigUint::from(2_000_000u32),
            ..Default::default()
        });
        assert_eq!(engine.pow_difficulty(), BigUint::from(2_000_000u32));
        assert_eq!(engine.pos_difficulty(), BigUint::from(500_000u32));
        assert_eq!(engine.pot_difficulty(), BigUint::from(300_000u32));
        assert_eq!(engine.trust_difficulty(), BigUint::from(200_000u32));
        assert_eq!(
            engine.custom_difficulty(&HybridFactors::unit()),
            BigUint::from(3_000_000u32)
        );
    }

    #[test]
    fn test_finalize_pays_registry_participants() {
        let engine = engine(PowMode::FullFake);
        let staker = Address([5; 20]);
        engine.update_stake(staker, &BigUint::from(100u32), 1);
        engine.record_transaction(staker, 1);
        engine.update_trust(staker, 100, 1);

        let miner = Address([1; 20]);
        let mut header = ChainHeader { number: 2, coinbase: miner, ..Default::default() };
        let mut state = Balances::default();
        let summary = engine.finalize(&mut header, &mut state, &[]);

        assert_eq!(header.root, Hash([0x11; 32]));
        assert_eq!(state.delete_empty, Some(true));
        assert_eq!(state.credited[&miner], BigUint::from(1_000_000_000_000_000_000u64));
        // 100 * 1 * 100 / 10000
        assert_eq!(state.credited[&staker], BigUint::from(1u32));
        assert_eq!(summary.payouts.len(), 2);
        assert_eq!(engine.validators()[0].uptime, 100);
        assert_eq!(engine.uptime(&staker), 100);
    }

    #[test]
    fn test_author_and_seal_hash() {
        let engine = engine(PowMode::FullFake);
        let header = ChainHeader { coinbase: Address([8; 20]), ..Default::default() };
        assert_eq!(engine.author(&header), Address([8; 20]));
        assert_eq!(engine.seal_hash(&header), header.seal_hash());
    }
}
