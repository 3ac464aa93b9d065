// REMOTE SEALER
// Work loop serving external miners: hands out work packages, verifies
// submitted solutions and tracks reported hash rates.
//
// SAFETY INVARIANTS:
// 1. All sealer state is owned by a single task; callers talk to it over channels
// 2. Every request either gets a reply or observes shutdown, never hangs
// 3. Submitted seals are checked with the engine's seal verifier before release
// 4. Work older than STALE_THRESHOLD blocks is discarded

use crate::seal::{seed_hash, target_hash};
use crate::types::{ChainHeader, Hash, Nonce};
use crate::verifier::HeaderValidator;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

/// Blocks after which pending work is considered stale.
pub const STALE_THRESHOLD: u64 = 7;
/// Reported hash rates expire after this long without a refresh.
pub const HASHRATE_TTL: Duration = Duration::from_secs(10);
const PURGE_INTERVAL: Duration = Duration::from_secs(5);

/// `[pow_hash, seed_hash, target, block_number]`, hex encoded.
pub type WorkPackage = [String; 4];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("remote sealer stopped")]
    Stopped,
    #[error("no mining work available yet")]
    NoWork,
    #[error("work submitted is stale or unknown")]
    StaleWork,
    #[error("invalid proof-of-work solution")]
    InvalidSolution,
}

struct Submission {
    nonce: Nonce,
    seal_hash: Hash,
    mix_digest: Hash,
    reply: oneshot::Sender<Result<(), RemoteError>>,
}

struct RateReport {
    id: Hash,
    rate: u64,
    done: oneshot::Sender<()>,
}

/// Cloneable client side of the sealer task.
#[derive(Clone)]
pub struct RemoteSealerHandle {
    work_tx: mpsc::Sender<ChainHeader>,
    fetch_tx: mpsc::Sender<oneshot::Sender<Result<WorkPackage, RemoteError>>>,
    submit_tx: mpsc::Sender<Submission>,
    rate_tx: mpsc::Sender<RateReport>,
    hashrate_tx: mpsc::Sender<oneshot::Sender<u64>>,
    shutdown: CancellationToken,
}

impl RemoteSealerHandle {
    /// Replace the current work with a freshly assembled header.
    pub async fn notify_work(&self, header: ChainHeader) -> Result<(), RemoteError> {
        self.send(&self.work_tx, header).await
    }

    pub async fn get_work(&self) -> Result<WorkPackage, RemoteError> {
        let (tx, rx) = oneshot::channel();
        self.send(&self.fetch_tx, tx).await?;
        rx.await.map_err(|_| RemoteError::Stopped)?
    }

    /// Submit a solution for the work identified by `seal_hash`.
    pub async fn submit_work(&self, nonce: Nonce, seal_hash: Hash, mix_digest: Hash) -> Result<(), RemoteError> {
        let (reply, rx) = oneshot::channel();
        let submission = Submission {
            nonce,
            seal_hash,
            mix_digest,
            reply,
        };
        self.send(&self.submit_tx, submission).await?;
        rx.await.map_err(|_| RemoteError::Stopped)?
    }

    /// Report the hash rate of miner `id`; blocks until recorded.
    pub async fn submit_hashrate(&self, rate: u64, id: Hash) -> Result<(), RemoteError> {
        let (done, rx) = oneshot::channel();
        self.send(&self.rate_tx, RateReport { id, rate, done }).await?;
        rx.await.map_err(|_| RemoteError::Stopped)
    }

    /// Combined rate of every miner that reported within the last 10 seconds.
    pub async fn hashrate(&self) -> Result<u64, RemoteError> {
        let (tx, rx) = oneshot::channel();
        self.send(&self.hashrate_tx, tx).await?;
        rx.await.map_err(|_| RemoteError::Stopped)
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    async fn send<T>(&self, channel: &mpsc::Sender<T>, value: T) -> Result<(), RemoteError> {
        tokio::select! {
            sent = channel.send(value) => sent.map_err(|_| RemoteError::Stopped),
            _ = self.shutdown.cancelled() => Err(RemoteError::Stopped),
        }
    }
}

/// Owner of the sealer task.
pub struct RemoteSealer {
    handle: RemoteSealerHandle,
    task: JoinHandle<()>,
}

impl RemoteSealer {
    /// Spawn the work loop on the current tokio runtime.
    ///
    /// Verified, sealed headers are delivered on `results`.
    pub fn spawn(validator: Arc<HeaderValidator>, results: mpsc::Sender<ChainHeader>) -> Self {
        let (work_tx, work_rx) = mpsc::channel(1);
        let (fetch_tx, fetch_rx) = mpsc::channel(1);
        let (submit_tx, submit_rx) = mpsc::channel(1);
        let (rate_tx, rate_rx) = mpsc::channel(1);
        let (hashrate_tx, hashrate_rx) = mpsc::channel(1);
        let shutdown = CancellationToken::new();

        let worker = SealerLoop {
            validator,
            results,
            current: None,
            works: HashMap::new(),
            rates: HashMap::new(),
        };
        let task = tokio::spawn(worker.run(
            Inbox {
                work_rx,
                fetch_rx,
                submit_rx,
                rate_rx,
                hashrate_rx,
            },
            shutdown.clone(),
        ));

        RemoteSealer {
            handle: RemoteSealerHandle {
                work_tx,
                fetch_tx,
                submit_tx,
                rate_tx,
                hashrate_tx,
                shutdown,
            },
            task,
        }
    }

    pub fn handle(&self) -> RemoteSealerHandle {
        self.handle.clone()
    }

    /// Signal shutdown and wait for the loop to exit.
    pub async fn stop(self) {
        self.handle.shutdown.cancel();
        if let Err(e) = self.task.await {
            warn!("Remote sealer task ended abnormally: {}", e);
        }
    }
}

struct Inbox {
    work_rx: mpsc::Receiver<ChainHeader>,
    fetch_rx: mpsc::Receiver<oneshot::Sender<Result<WorkPackage, RemoteError>>>,
    submit_rx: mpsc::Receiver<Submission>,
    rate_rx: mpsc::Receiver<RateReport>,
    hashrate_rx: mpsc::Receiver<oneshot::Sender<u64>>,
}

struct SealerLoop {
    validator: Arc<HeaderValidator>,
    results: mpsc::Sender<ChainHeader>,
    current: Option<ChainHeader>,
    works: HashMap<Hash, ChainHeader>,
    rates: HashMap<Hash, (u64, Instant)>,
}

impl SealerLoop {
    async fn run(mut self, mut inbox: Inbox, shutdown: CancellationToken) {
        let mut purge = time::interval(PURGE_INTERVAL);
        info!("Remote sealer started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(header) = inbox.work_rx.recv() => self.install_work(header),
                Some(reply) = inbox.fetch_rx.recv() => {
                    let _ = reply.send(self.current_work());
                }
                Some(submission) = inbox.submit_rx.recv() => {
                    let outcome = self.submit(submission.nonce, submission.seal_hash, submission.mix_digest);
                    let _ = submission.reply.send(outcome);
                }
                Some(report) = inbox.rate_rx.recv() => {
                    self.rates.insert(report.id, (report.rate, Instant::now()));
                    let _ = report.done.send(());
                }
                Some(reply) = inbox.hashrate_rx.recv() => {
                    let _ = reply.send(self.total_hashrate());
                }
                _ = purge.tick() => self.purge_rates(),
            }
        }
        info!("Remote sealer stopped");
    }

    fn install_work(&mut self, header: ChainHeader) {
        let number = header.number;
        self.works
            .retain(|_, work| work.number.saturating_add(STALE_THRESHOLD) > number);
        self.works.insert(header.seal_hash(), header.clone());
        self.current = Some(header);
        debug!("New remote work for block #{}", number);
    }

    fn current_work(&self) -> Result<WorkPackage, RemoteError> {
        let header = self.current.as_ref().ok_or(RemoteError::NoWork)?;
        Ok([
            header.seal_hash().to_string(),
            seed_hash(header.number).to_string(),
            target_hash(&header.difficulty).to_string(),
            format!("0x{:x}", header.number),
        ])
    }

    fn submit(&mut self, nonce: Nonce, seal_hash: Hash, mix_digest: Hash) -> Result<(), RemoteError> {
        let Some(current) = &self.current else {
            warn!("Solution submitted before any work was issued");
            return Err(RemoteError::NoWork);
        };
        let Some(work) = self.works.get(&seal_hash) else {
            warn!("Solution submitted for unknown work {}", seal_hash);
            return Err(RemoteError::StaleWork);
        };

        let mut sealed = work.clone();
        sealed.nonce = nonce;
        sealed.mix_digest = mix_digest;
        if let Err(e) = self.validator.sealer().verify_seal(&sealed, true) {
            warn!("Invalid remote solution for block #{}: {}", sealed.number, e);
            return Err(RemoteError::InvalidSolution);
        }

        if sealed.number.saturating_add(STALE_THRESHOLD) <= current.number {
            warn!("Stale remote solution for block #{} (head work #{})", sealed.number, current.number);
            return Err(RemoteError::StaleWork);
        }

        info!("Remote solution accepted for block #{}", sealed.number);
        if let Err(e) = self.results.try_send(sealed) {
            warn!("Sealed block not read by the miner: {}", e);
        }
        Ok(())
    }

    fn total_hashrate(&self) -> u64 {
        let now = Instant::now();
        self.rates
            .values()
            .filter(|(_, seen)| now.duration_since(*seen) <= HASHRATE_TTL)
            .fold(0u64, |sum, (rate, _)| sum.saturating_add(*rate))
    }

    fn purge_rates(&mut self) {
        let now = Instant::now();
        self.rates
            .retain(|_, (_, seen)| now.duration_since(*seen) <= HASHRATE_TTL);
    }
}
