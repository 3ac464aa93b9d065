// Shared fixtures for the integration tests: an in-memory chain, an account
// ledger and a dataset provider whose "solution" for any seal hash is known.

#![allow(dead_code)]

use hybrid_consensus::gas::calc_base_fee;
use hybrid_consensus::{
    Address, Block, ChainConfig, ChainHeader, ChainHeaderReader, ChainReader, DatasetProvider, EngineConfig,
    Hash, Hashimoto, HybridEthash, Nonce, PowOutput, StateDb,
};
use num_bigint::BigUint;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Default)]
pub struct MemoryChain {
    headers: RwLock<HashMap<Hash, ChainHeader>>,
    blocks: RwLock<HashMap<Hash, Block>>,
}

impl MemoryChain {
    pub fn insert(&self, block: Block) {
        let hash = block.hash();
        self.headers.write().insert(hash, block.header.clone());
        self.blocks.write().insert(hash, block);
    }

    pub fn insert_header(&self, header: ChainHeader) {
        self.insert(Block {
            header,
            uncles: Vec::new(),
        });
    }
}

impl ChainHeaderReader for MemoryChain {
    fn get_header(&self, hash: &Hash, number: u64) -> Option<ChainHeader> {
        self.headers.read().get(hash).filter(|h| h.number == number).cloned()
    }
}

impl ChainReader for MemoryChain {
    fn get_block(&self, hash: &Hash, number: u64) -> Option<Block> {
        self.blocks.read().get(hash).filter(|b| b.number() == number).cloned()
    }
}

#[derive(Default)]
pub struct MemoryState {
    pub balances: BTreeMap<Address, BigUint>,
    pub delete_empty: Vec<bool>,
}

impl MemoryState {
    pub fn balance(&self, address: &Address) -> BigUint {
        self.balances.get(address).cloned().unwrap_or_default()
    }
}

impl StateDb for MemoryState {
    fn add_balance(&mut self, address: &Address, amount: &BigUint) {
        *self.balances.entry(*address).or_default() += amount;
    }

    fn intermediate_root(&mut self, delete_empty: bool) -> Hash {
        self.delete_empty.push(delete_empty);
        let mut buf = Vec::new();
        for (address, balance) in &self.balances {
            buf.extend_from_slice(address.as_bytes());
            buf.extend_from_slice(&balance.to_bytes_be());
        }
        Hash::keccak(&buf)
    }
}

/// The winning nonce for a seal hash is its first eight bytes.
pub fn solution_nonce(seal_hash: &Hash) -> u64 {
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&seal_hash.as_bytes()[..8]);
    u64::from_be_bytes(prefix)
}

pub fn mix_for(seal_hash: &Hash) -> Hash {
    Hash::keccak(seal_hash.as_bytes())
}

/// Hashimoto stand-in: zero result for the winning nonce, all ones otherwise.
struct KnownSolution {
    delay: Duration,
    reject: bool,
}

impl Hashimoto for KnownSolution {
    fn compute(&self, seal_hash: &Hash, nonce: u64) -> PowOutput {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let result = if !self.reject && nonce == solution_nonce(seal_hash) {
            Hash::ZERO
        } else {
            Hash([0xff; 32])
        };
        PowOutput {
            mix_digest: mix_for(seal_hash),
            result,
        }
    }
}

#[derive(Default)]
pub struct MockDataset {
    pub full_dataset: bool,
    /// Hashing block `n` sleeps `n` times this long
    pub delay_per_block: Duration,
    /// Every odd-numbered block fails its seal check
    pub reject_odd: bool,
    pub dataset_calls: AtomicUsize,
    pub cache_calls: AtomicUsize,
}

impl MockDataset {
    fn solver(&self, number: u64) -> Arc<dyn Hashimoto> {
        let blocks = u32::try_from(number).unwrap_or(u32::MAX);
        Arc::new(KnownSolution {
            delay: self.delay_per_block.saturating_mul(blocks),
            reject: self.reject_odd && number % 2 == 1,
        })
    }
}

impl DatasetProvider for MockDataset {
    fn dataset(&self, number: u64) -> Option<Arc<dyn Hashimoto>> {
        if !self.full_dataset {
            return None;
        }
        self.dataset_calls.fetch_add(1, Ordering::SeqCst);
        Some(self.solver(number))
    }

    fn cache(&self, number: u64) -> Arc<dyn Hashimoto> {
        self.cache_calls.fetch_add(1, Ordering::SeqCst);
        self.solver(number)
    }
}

pub fn engine_from(config: EngineConfig, dataset: Arc<MockDataset>) -> Arc<HybridEthash> {
    init_logging();
    let provider: Arc<dyn DatasetProvider> = dataset;
    Arc::new(HybridEthash::new(config, Some(provider)).expect("valid engine config"))
}

pub fn engine_with(chain: ChainConfig, dataset: Arc<MockDataset>) -> Arc<HybridEthash> {
    engine_from(EngineConfig::new(chain), dataset)
}

pub fn engine(chain: ChainConfig) -> Arc<HybridEthash> {
    engine_with(chain, Arc::new(MockDataset::default()))
}

pub fn genesis() -> ChainHeader {
    ChainHeader {
        number: 0,
        time: 1_600_000_000,
        difficulty: BigUint::from(1_000_000u32),
        gas_limit: 15_000_000,
        base_fee: Some(BigUint::from(1_000_000_000u64)),
        ..Default::default()
    }
}

/// Write the winning nonce and mix digest into `header`.
pub fn seal(header: &mut ChainHeader) {
    let seal_hash = header.seal_hash();
    header.nonce = Nonce::from_u64(solution_nonce(&seal_hash));
    header.mix_digest = mix_for(&seal_hash);
}

/// A sealed, valid child of `parent` built `gap` seconds later.
pub fn child(engine: &HybridEthash, parent: &ChainHeader, gap: u64, coinbase: u8) -> ChainHeader {
    let chain = &engine.config().chain;
    let number = parent.number + 1;
    let time = parent.time + gap;
    let mut header = ChainHeader {
        parent_hash: parent.hash(),
        coinbase: Address([coinbase; 20]),
        number,
        time,
        difficulty: engine.oracle().compute_difficulty(time, parent),
        gas_limit: parent.gas_limit,
        base_fee: chain.is_london(number).then(|| calc_base_fee(chain, parent)),
        ..Default::default()
    };
    seal(&mut header);
    header
}

/// `len` sealed headers extending `parent`.
pub fn extend(engine: &HybridEthash, parent: &ChainHeader, len: usize) -> Vec<ChainHeader> {
    let mut headers = Vec::with_capacity(len);
    let mut tip = parent.clone();
    for _ in 0..len {
        let next = child(engine, &tip, 12, 1);
        tip = next.clone();
        headers.push(next);
    }
    headers
}
