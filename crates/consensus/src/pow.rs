//! Proof of Work (PoW) mining.
//!
//! A block is mined by searching for a nonce whose header hash starts with
//! `difficulty` zero hex digits. The search is split across worker threads
//! in round-robin fashion: worker `i` of `n` probes `i, i + n, i + 2n, ...`,
//! so no two workers ever test the same nonce.
//!
//! The first worker to find a valid nonce commits it into a write-once cell
//! and raises a shared stop flag. Every worker is joined before the call
//! returns. A search can also be stopped from outside through a
//! [`CancelToken`] or bounded by [`MiningConfig::timeout`].

use powchain_core::{Block, BlockError, BlockHeader, BlockTemplate, Hash, Seal, Transaction};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

/// Highest meaningful difficulty: every hex digit of a 256-bit hash is zero.
pub const MAX_DIFFICULTY: u32 = 64;

/// Upper bound on worker threads for one search.
pub const MAX_THREADS: usize = 1024;

/// How many nonces a worker tries between deadline checks.
const DEADLINE_CHECK_INTERVAL: u64 = 1024;

/// Errors that can occur while mining.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MiningError {
    #[error("invalid mining configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    InvalidBlock(#[from] BlockError),

    #[error("mining cancelled")]
    Cancelled,

    #[error("mining timed out after {elapsed:?}")]
    TimedOut { elapsed: Duration },

    #[error("nonce space exhausted without a valid hash")]
    NonceSpaceExhausted,

    #[error("failed to spawn mining worker: {0}")]
    ThreadSpawn(String),
}

pub type Result<T> = std::result::Result<T, MiningError>;

fn default_threads() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// Per-mine parameters, owned by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiningConfig {
    /// Required leading zero hex digits.
    pub difficulty: u32,
    /// Number of worker threads.
    pub threads: usize,
    /// Give up after this long. `None` searches until found or cancelled.
    #[serde(with = "millis")]
    pub timeout: Option<Duration>,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            difficulty: 4,
            threads: default_threads(),
            timeout: None,
        }
    }
}

impl MiningConfig {
    /// Create a configuration without a timeout.
    pub fn new(difficulty: u32, threads: usize) -> Self {
        Self {
            difficulty,
            threads,
            timeout: None,
        }
    }

    /// Set a timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Reject configurations that can never produce a block.
    pub fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            return Err(MiningError::InvalidConfig("thread count must be at least 1".into()));
        }
        if self.threads > MAX_THREADS {
            return Err(MiningError::InvalidConfig(format!(
                "thread count {} exceeds maximum of {}",
                self.threads, MAX_THREADS
            )));
        }
        if self.difficulty > MAX_DIFFICULTY {
            return Err(MiningError::InvalidConfig(format!(
                "difficulty {} exceeds maximum of {}",
                self.difficulty, MAX_DIFFICULTY
            )));
        }
        Ok(())
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        value.map(|d| d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}

/// External stop signal for an in-flight search.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a new, untriggered token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every search observing this token to stop.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Check whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Observability data about a finished search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MiningReport {
    pub difficulty: u32,
    pub threads: usize,
    pub nonce: u64,
    pub elapsed: Duration,
}

/// State shared by every worker of one search.
struct SearchState<'a> {
    winner: &'a OnceLock<(u64, Hash)>,
    stop: &'a AtomicBool,
    timed_out: &'a AtomicBool,
    cancel: &'a CancelToken,
    deadline: Option<Instant>,
}

impl SearchState<'_> {
    fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Relaxed) || self.cancel.is_cancelled()
    }
}

/// Parallel nonce search.
pub struct Miner;

impl Miner {
    /// Search for a nonce such that `header.pow_hash(nonce)` meets the
    /// configured difficulty.
    ///
    /// If a worker cannot be spawned, the workers already running are
    /// stopped and joined before the error is returned.
    pub fn mine(
        header: &BlockHeader,
        config: &MiningConfig,
        cancel: &CancelToken,
    ) -> Result<(Seal, MiningReport)> {
        config.validate()?;

        let started = Instant::now();
        let stride = config.threads as u64;
        let winner = OnceLock::new();
        let stop = AtomicBool::new(false);
        let timed_out = AtomicBool::new(false);
        let state = SearchState {
            winner: &winner,
            stop: &stop,
            timed_out: &timed_out,
            cancel,
            deadline: config.timeout.map(|t| started + t),
        };

        thread::scope(|scope| {
            for worker in 0..stride {
                let state = &state;
                let spawned = thread::Builder::new()
                    .name(format!("pow-worker-{}", worker))
                    .spawn_scoped(scope, move || {
                        search(header, worker, stride, config.difficulty, state)
                    });
                if let Err(e) = spawned {
                    stop.store(true, Ordering::SeqCst);
                    return Err(MiningError::ThreadSpawn(e.to_string()));
                }
            }
            Ok(())
        })?;

        let elapsed = started.elapsed();

        let Some((nonce, hash)) = winner.into_inner() else {
            if cancel.is_cancelled() {
                debug!(index = header.index, ?elapsed, "mining cancelled");
                return Err(MiningError::Cancelled);
            }
            if timed_out.load(Ordering::SeqCst) {
                debug!(index = header.index, ?elapsed, "mining timed out");
                return Err(MiningError::TimedOut { elapsed });
            }
            return Err(MiningError::NonceSpaceExhausted);
        };

        info!(
            index = header.index,
            difficulty = config.difficulty,
            threads = config.threads,
            nonce,
            elapsed_ms = elapsed.as_millis() as u64,
            "found proof of work"
        );

        let seal = Seal {
            hash,
            nonce,
            difficulty: config.difficulty,
            threads: config.threads,
        };
        let report = MiningReport {
            difficulty: config.difficulty,
            threads: config.threads,
            nonce,
            elapsed,
        };
        Ok((seal, report))
    }
}

fn search(
    header: &BlockHeader,
    worker: u64,
    stride: u64,
    difficulty: u32,
    state: &SearchState<'_>,
) {
    let mut nonce = worker;
    let mut attempts = 0u64;

    loop {
        if state.should_stop() {
            return;
        }

        attempts += 1;
        if attempts % DEADLINE_CHECK_INTERVAL == 0 {
            if let Some(deadline) = state.deadline {
                if Instant::now() >= deadline {
                    state.timed_out.store(true, Ordering::SeqCst);
                    state.stop.store(true, Ordering::SeqCst);
                    return;
                }
            }
        }

        let hash = header.pow_hash(nonce);
        if hash.meets_difficulty(difficulty) {
            if state.winner.set((nonce, hash)).is_ok() {
                debug!(worker, nonce, attempts, "worker won the search");
            }
            state.stop.store(true, Ordering::SeqCst);
            return;
        }

        nonce = match nonce.checked_add(stride) {
            Some(next) => next,
            None => return,
        };
    }
}

/// A freshly mined block and how it was found.
#[derive(Debug, Clone)]
pub struct MinedBlock {
    pub block: Block,
    pub report: MiningReport,
}

/// Builds blocks and mines them with a fixed configuration and reward.
#[derive(Debug, Clone)]
pub struct BlockMiner {
    config: MiningConfig,
    reward: u64,
}

impl BlockMiner {
    /// Create a new block miner.
    pub fn new(config: MiningConfig, reward: u64) -> Self {
        Self { config, reward }
    }

    /// Get the mining configuration.
    pub fn config(&self) -> &MiningConfig {
        &self.config
    }

    /// Get the fixed block reward.
    pub fn reward(&self) -> u64 {
        self.reward
    }

    /// Mine the genesis block.
    pub fn mine_genesis(&self, cancel: &CancelToken) -> Result<MinedBlock> {
        self.mine_template(BlockTemplate::genesis(), cancel)
    }

    /// Build and mine the block following `previous`.
    pub fn mine_block(
        &self,
        previous: &Block,
        candidates: Vec<Transaction>,
        miner: &str,
        cancel: &CancelToken,
    ) -> Result<MinedBlock> {
        let template = BlockTemplate::successor(previous, candidates, miner, self.reward)?;
        self.mine_template(template, cancel)
    }

    /// Mine an already assembled template.
    pub fn mine_template(
        &self,
        template: BlockTemplate,
        cancel: &CancelToken,
    ) -> Result<MinedBlock> {
        let (seal, report) = Miner::mine(&template.header, &self.config, cancel)?;
        Ok(MinedBlock {
            block: template.seal(seal),
            report,
        })
    }
}
