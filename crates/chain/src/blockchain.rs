//! In-memory chain orchestration.
//!
//! This module brings together the mempool, the block miner and the
//! validator. The chain only lives for the lifetime of the process.

use crate::mempool::{Mempool, MempoolConfig, MempoolError, MempoolStats};
use crate::policy::SelectionPolicy;
use powchain_consensus::{
    validate_chain, BlockMiner, CancelToken, MinedBlock, MiningConfig, MiningError,
    MiningReport, ValidationReport,
};
use powchain_core::{Block, Hash, Transaction};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;
use tracing::info;

/// Errors that can occur during blockchain operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("block does not extend the tip (expected prev_hash {expected}, got {got})")]
    Linkage { expected: Hash, got: Hash },

    #[error("transaction {0} is already in the chain")]
    AlreadyIncluded(Hash),

    #[error("mining error: {0}")]
    Mining(#[from] MiningError),

    #[error("mempool error: {0}")]
    Mempool(#[from] MempoolError),
}

pub type Result<T> = std::result::Result<T, ChainError>;

/// Blockchain configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Difficulty, thread count and timeout used for every block.
    pub mining: MiningConfig,
    /// Fixed reward per block, paid on top of the fees.
    pub block_reward: u64,
    /// Mempool capacity and batch size.
    pub mempool: MempoolConfig,
    /// Initial selection policy.
    pub policy: SelectionPolicy,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            mining: MiningConfig::default(),
            block_reward: 1,
            mempool: MempoolConfig::default(),
            policy: SelectionPolicy::default(),
        }
    }
}

/// Main blockchain struct: the blocks plus the pool feeding them.
#[derive(Debug)]
pub struct Blockchain {
    /// Blocks from genesis to tip. Never empty.
    blocks: Vec<Block>,
    /// Hashes of every transaction already in a block.
    included: HashSet<Hash>,
    /// Transaction mempool.
    mempool: Mempool,
    /// Configuration.
    config: ChainConfig,
    /// Report of the most recent successful mine.
    last_report: Option<MiningReport>,
}

impl Blockchain {
    /// Create a new blockchain, mining its genesis block.
    pub fn new(config: ChainConfig) -> Result<Self> {
        Self::with_cancel(config, &CancelToken::new())
    }

    /// Create a new blockchain; genesis mining observes `cancel`.
    pub fn with_cancel(config: ChainConfig, cancel: &CancelToken) -> Result<Self> {
        let miner = BlockMiner::new(config.mining.clone(), config.block_reward);
        let genesis = miner.mine_genesis(cancel)?;
        info!(hash = %genesis.block.hash, "mined genesis block");

        let mut mempool = Mempool::with_config(config.mempool.clone());
        mempool.set_policy(config.policy.clone());

        Ok(Self {
            blocks: vec![genesis.block],
            included: HashSet::new(),
            mempool,
            config,
            last_report: Some(genesis.report),
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Get the mining configuration used for the next block.
    pub fn mining_config(&self) -> &MiningConfig {
        &self.config.mining
    }

    /// Change difficulty, threads or timeout for future blocks.
    pub fn set_mining_config(&mut self, mining: MiningConfig) -> Result<()> {
        mining.validate()?;
        self.config.mining = mining;
        Ok(())
    }

    /// A block miner for the current configuration.
    pub fn block_miner(&self) -> BlockMiner {
        BlockMiner::new(self.config.mining.clone(), self.config.block_reward)
    }

    /// Get the current chain height (index of the tip).
    pub fn height(&self) -> u64 {
        self.tip().index()
    }

    /// All blocks, genesis first.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Get the latest block.
    pub fn tip(&self) -> &Block {
        &self.blocks[self.blocks.len() - 1]
    }

    /// Get a block by index. Out-of-range indices yield `None`.
    pub fn block(&self, index: u64) -> Option<&Block> {
        usize::try_from(index).ok().and_then(|i| self.blocks.get(i))
    }

    /// Append a mined block to the tip.
    ///
    /// Only linkage is checked here; proof of work and merkle root are left
    /// to [`Blockchain::validate`]. A rejected block leaves the chain as is.
    /// Transactions in the block are dropped from the mempool.
    pub fn append(&mut self, block: Block) -> Result<()> {
        let expected = self.tip().hash;
        if block.header.prev_hash != expected {
            return Err(ChainError::Linkage {
                expected,
                got: block.header.prev_hash,
            });
        }

        let block_hashes: HashSet<Hash> =
            block.transactions.iter().map(Transaction::hash).collect();
        self.mempool.remove_included(&block_hashes);
        self.included.extend(block_hashes);
        info!(
            index = block.index(),
            hash = %block.hash,
            txs = block.tx_count(),
            "appended block"
        );
        self.blocks.push(block);
        Ok(())
    }

    /// Balance of `address` over every transaction in the chain.
    ///
    /// Credits `amount` to recipients and debits `amount + fee` from
    /// senders. The issuance sender is never debited. May be negative.
    pub fn balance(&self, address: &str) -> i128 {
        self.blocks
            .iter()
            .flat_map(|block| &block.transactions)
            .fold(0i128, |mut balance, tx| {
                if tx.recipient == address {
                    balance += i128::from(tx.amount);
                }
                if tx.sender == address && !tx.is_reward() {
                    balance -= i128::from(tx.amount) + i128::from(tx.fee);
                }
                balance
            })
    }

    /// Validate the whole chain from genesis.
    pub fn validate(&self) -> ValidationReport {
        validate_chain(&self.blocks)
    }

    /// Submit a transaction to the mempool.
    ///
    /// Pending fees plus the block reward must fit in a `u64`, so every
    /// batch the pool hands out can be paid in one reward transaction.
    pub fn submit_transaction(&mut self, tx: Transaction) -> Result<Hash> {
        let tx_hash = tx.hash();
        if self.included.contains(&tx_hash) {
            return Err(ChainError::AlreadyIncluded(tx_hash));
        }
        self.mempool
            .total_fees()
            .checked_add(tx.fee)
            .and_then(|fees| fees.checked_add(self.config.block_reward))
            .ok_or(MempoolError::FeeOverflow(tx.fee))?;
        Ok(self.mempool.submit(tx)?)
    }

    /// Change the selection policy.
    pub fn set_policy(&mut self, policy: SelectionPolicy) {
        self.mempool.set_policy(policy);
    }

    /// Get the mempool.
    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    /// Pending transactions in priority order.
    pub fn pending_transactions(&self) -> &[Transaction] {
        self.mempool.pending()
    }

    /// Remove the next batch from the mempool.
    pub fn next_batch(&mut self) -> Vec<Transaction> {
        self.mempool.next_batch()
    }

    /// Put an unused batch back into the mempool.
    ///
    /// Transactions that reached the chain meanwhile are not restored.
    pub fn restore_transactions(&mut self, batch: Vec<Transaction>) {
        let batch = batch
            .into_iter()
            .filter(|tx| !self.included.contains(&tx.hash()))
            .collect();
        self.mempool.restore(batch);
    }

    /// Take the next batch, mine a block over it and append it.
    ///
    /// If mining fails or is cancelled, the batch goes back to the mempool.
    pub fn mine_block(&mut self, miner: &str, cancel: &CancelToken) -> Result<&Block> {
        let batch = self.next_batch();
        let result = self
            .block_miner()
            .mine_block(self.tip(), batch.clone(), miner, cancel);
        let mined = match result {
            Ok(mined) => mined,
            Err(e) => {
                self.restore_transactions(batch);
                return Err(e.into());
            }
        };

        self.commit_mined(mined, batch)?;
        Ok(self.tip())
    }

    /// Append a block mined from `batch`, restoring the batch on failure.
    pub fn commit_mined(&mut self, mined: MinedBlock, batch: Vec<Transaction>) -> Result<()> {
        match self.append(mined.block) {
            Ok(()) => {
                self.last_report = Some(mined.report);
                Ok(())
            }
            Err(e) => {
                self.restore_transactions(batch);
                Err(e)
            }
        }
    }

    /// Elapsed time, difficulty and threads of the most recent mine.
    pub fn last_mining_report(&self) -> Option<&MiningReport> {
        self.last_report.as_ref()
    }

    /// Get blockchain statistics.
    pub fn stats(&self) -> BlockchainStats {
        let tip = self.tip();
        BlockchainStats {
            height: tip.index(),
            latest_block_hash: tip.hash,
            latest_timestamp: tip.header.timestamp,
            mempool: self.mempool.stats(),
            difficulty: self.config.mining.difficulty,
            threads: self.config.mining.threads,
        }
    }
}

impl fmt::Display for Blockchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, block) in self.blocks.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", block)?;
        }
        Ok(())
    }
}

/// Blockchain statistics.
#[derive(Debug, Clone)]
pub struct BlockchainStats {
    /// Current chain height.
    pub height: u64,
    /// Hash of the latest block.
    pub latest_block_hash: Hash,
    /// Timestamp of the latest block.
    pub latest_timestamp: i64,
    /// Mempool statistics.
    pub mempool: MempoolStats,
    /// Difficulty for the next block.
    pub difficulty: u32,
    /// Threads for the next block.
    pub threads: usize,
}
