//! Query and remote-mining surface exposed to RPC layers.
//!
//! Remote-mining calls report plain booleans or coarse errors; the reason a
//! submission was refused is logged by the sealer, not returned to the miner.

use crate::difficulty::HybridFactors;
use crate::ethash::HybridEthash;
use crate::registry::{TransactionRecord, TrustRecord, Validator};
use crate::remote::{RemoteError, RemoteSealerHandle, WorkPackage};
use crate::types::{Address, Hash, Nonce};
use num_bigint::BigUint;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("not supported")]
    NotSupported,
    #[error("engine stopped")]
    Stopped,
    #[error("no work available yet")]
    NoWork,
}

impl From<RemoteError> for ApiError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Stopped => ApiError::Stopped,
            _ => ApiError::NoWork,
        }
    }
}

pub struct Api {
    engine: Arc<HybridEthash>,
    remote: Option<RemoteSealerHandle>,
}

impl Api {
    /// `remote` is `None` when the node does not serve external miners.
    pub fn new(engine: Arc<HybridEthash>, remote: Option<RemoteSealerHandle>) -> Self {
        Api { engine, remote }
    }

    pub async fn get_work(&self) -> Result<WorkPackage, ApiError> {
        let remote = self.remote.as_ref().ok_or(ApiError::NotSupported)?;
        Ok(remote.get_work().await?)
    }

    /// True iff the solution was valid and for pending, non-stale work.
    pub async fn submit_work(&self, nonce: Nonce, hash: Hash, digest: Hash) -> bool {
        match &self.remote {
            Some(remote) => remote.submit_work(nonce, hash, digest).await.is_ok(),
            None => false,
        }
    }

    pub async fn submit_hashrate(&self, rate: u64, id: Hash) -> bool {
        match &self.remote {
            Some(remote) => remote.submit_hashrate(rate, id).await.is_ok(),
            None => false,
        }
    }

    /// Combined rate of remote miners; zero when unavailable.
    pub async fn get_hashrate(&self) -> u64 {
        match &self.remote {
            Some(remote) => remote.hashrate().await.unwrap_or(0),
            None => 0,
        }
    }

    pub fn get_pow_difficulty(&self) -> BigUint {
        self.engine.pow_difficulty()
    }

    pub fn get_pos_difficulty(&self) -> BigUint {
        self.engine.pos_difficulty()
    }

    pub fn get_pot_difficulty(&self) -> BigUint {
        self.engine.pot_difficulty()
    }

    pub fn get_trust_difficulty(&self) -> BigUint {
        self.engine.trust_difficulty()
    }

    pub fn get_custom_difficulty(&self, pos: BigUint, pot: BigUint, trust: BigUint) -> BigUint {
        self.engine.custom_difficulty(&HybridFactors { pos, pot, trust })
    }

    pub fn get_validators(&self) -> Vec<Validator> {
        self.engine.validators()
    }

    pub fn get_transaction_records(&self) -> Vec<TransactionRecord> {
        self.engine.transaction_records()
    }

    pub fn get_trust_records(&self) -> Vec<TrustRecord> {
        self.engine.trust_records()
    }

    pub fn get_uptime(&self, address: &Address) -> u64 {
        self.engine.uptime(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChainConfig, EngineConfig};
    use crate::remote::RemoteSealer;
    use crate::seal::PowMode;
    use tokio::sync::mpsc;

    fn engine() -> Arc<HybridEthash> {
        let config = EngineConfig {
            pow_mode: PowMode::FullFake,
            ..EngineConfig::new(ChainConfig::default())
        };
        Arc::new(HybridEthash::new(config, None).unwrap())
    }

    #[tokio::test]
    async fn test_without_remote_sealer() {
        let api = Api::new(engine(), None);
        assert_eq!(api.get_work().await, Err(ApiError::NotSupported));
        assert!(!api.submit_work(Nonce::default(), Hash::ZERO, Hash::ZERO).await);
        assert!(!api.submit_hashrate(10, Hash::ZERO).await);
        assert_eq!(api.get_hashrate().await, 0);
    }

    #[tokio::test]
    async fn test_remote_calls_report_booleans() {
        let engine = engine();
        let (results, _rx) = mpsc::channel(1);
        let sealer = RemoteSealer::spawn(Arc::clone(engine.header_validator()), results);
        let api = Api::new(engine, Some(sealer.handle()));

        assert_eq!(api.get_work().await, Err(ApiError::NoWork));
        assert!(!api.submit_work(Nonce::default(), Hash([1; 32]), Hash::ZERO).await);
        assert!(api.submit_hashrate(64, Hash([1; 32])).await);
        assert_eq!(api.get_hashrate().await, 64);

        sealer.stop().await;
        assert_eq!(api.get_work().await, Err(ApiError::Stopped));
        assert!(!api.submit_hashrate(64, Hash([1; 32])).await);
    }

    #[test]
    fn test_registry_queries() {
        let engine = engine();
        let node = Address([2; 20]);
        engine.update_trust(node, 97, 3);
        let api = Api::new(engine, None);
        assert_eq!(api.get_uptime(&node), 97);
        assert_eq!(api.get_trust_records().len(), 1);
        assert!(api.get_validators().is_empty());
        assert!(api.get_transaction_records().is_empty());
        assert_eq!(
            api.get_custom_difficulty(BigUint::from(0u32), BigUint::from(0u32), BigUint::from(0u32)),
            api.get_pow_difficulty()
        );
    }
}
