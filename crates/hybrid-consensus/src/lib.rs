pub mod api;
pub mod batch;
pub mod config;
pub mod difficulty;
pub mod engine;
pub mod epoch;
pub mod ethash;
pub mod gas;
pub mod registry;
pub mod remote;
pub mod reward;
pub mod seal;
pub mod types;
pub mod verifier;

pub use api::{Api, ApiError};
pub use batch::AbortHandle;
pub use config::{ChainConfig, ConfigError, DifficultyConfig, EngineConfig, HeaderLimits, HybridWeights, RewardConfig};
pub use difficulty::{DifficultyOracle, HybridFactors};
pub use engine::{ChainHeaderReader, ChainReader, ConsensusEngine, ConsensusError, StateDb};
pub use epoch::{DifficultyEpoch, EpochSchedule};
pub use ethash::HybridEthash;
pub use registry::{ParticipantRegistries, TransactionRecord, TrustRecord, Validator};
pub use remote::{RemoteError, RemoteSealer, RemoteSealerHandle, WorkPackage};
pub use reward::{Payout, RewardDistributor, RewardKind, RewardSummary};
pub use seal::{DatasetProvider, Hashimoto, PowMode, PowOutput, SealVerifier};
pub use types::{Address, Block, ChainHeader, Hash, Nonce};
pub use verifier::HeaderValidator;
