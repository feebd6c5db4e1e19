//! Thread-safe handle over a [`Blockchain`].
//!
//! All pool and chain mutation goes through one mutex. Mining does not hold
//! it: the batch and the parent block are taken under the lock, the nonce
//! search runs unlocked, and the result is appended under the lock again.

use crate::blockchain::{Blockchain, BlockchainStats, Result};
use crate::policy::SelectionPolicy;
use parking_lot::Mutex;
use powchain_consensus::{CancelToken, MiningConfig, MiningReport, ValidationReport};
use powchain_core::{Block, Hash, Transaction};
use std::sync::Arc;
use tracing::debug;

/// Cloneable, lock-protected chain shared between threads.
#[derive(Debug, Clone)]
pub struct SharedChain {
    inner: Arc<Mutex<Blockchain>>,
}

impl SharedChain {
    /// Wrap an existing chain.
    pub fn new(chain: Blockchain) -> Self {
        Self {
            inner: Arc::new(Mutex::new(chain)),
        }
    }

    /// Run `f` with read access to the chain.
    pub fn read<R>(&self, f: impl FnOnce(&Blockchain) -> R) -> R {
        f(&self.inner.lock())
    }

    /// Submit a transaction to the mempool.
    pub fn submit_transaction(&self, tx: Transaction) -> Result<Hash> {
        self.inner.lock().submit_transaction(tx)
    }

    /// Change the selection policy.
    pub fn set_policy(&self, policy: SelectionPolicy) {
        self.inner.lock().set_policy(policy);
    }

    /// Change the mining configuration for future blocks.
    pub fn set_mining_config(&self, mining: MiningConfig) -> Result<()> {
        self.inner.lock().set_mining_config(mining)
    }

    /// Remove the next batch from the mempool.
    pub fn next_batch(&self) -> Vec<Transaction> {
        self.inner.lock().next_batch()
    }

    /// Append a mined block to the tip.
    pub fn append(&self, block: Block) -> Result<()> {
        self.inner.lock().append(block)
    }

    /// Get a copy of a block by index.
    pub fn block(&self, index: u64) -> Option<Block> {
        self.inner.lock().block(index).cloned()
    }

    /// Get a copy of the latest block.
    pub fn tip(&self) -> Block {
        self.inner.lock().tip().clone()
    }

    /// Balance of `address`.
    pub fn balance(&self, address: &str) -> i128 {
        self.inner.lock().balance(address)
    }

    /// Validate the whole chain. Appends wait until the walk is done.
    pub fn validate(&self) -> ValidationReport {
        self.inner.lock().validate()
    }

    /// Report of the most recent mine.
    pub fn last_mining_report(&self) -> Option<MiningReport> {
        self.inner.lock().last_mining_report().copied()
    }

    /// Get blockchain statistics.
    pub fn stats(&self) -> BlockchainStats {
        self.inner.lock().stats()
    }

    /// Mine the next block without holding the lock during the search.
    ///
    /// If another block lands on the tip while searching, the append fails
    /// with a linkage error and the batch is returned to the mempool.
    pub fn mine_block(&self, miner: &str, cancel: &CancelToken) -> Result<Block> {
        let (parent, batch, block_miner) = {
            let mut chain = self.inner.lock();
            let batch = chain.next_batch();
            (chain.tip().clone(), batch, chain.block_miner())
        };

        let mined = match block_miner.mine_block(&parent, batch.clone(), miner, cancel) {
            Ok(mined) => mined,
            Err(e) => {
                self.inner.lock().restore_transactions(batch);
                return Err(e.into());
            }
        };

        let block = mined.block.clone();
        self.inner.lock().commit_mined(mined, batch).inspect_err(|e| {
            debug!(index = block.index(), error = %e, "mined block lost the race for the tip");
        })?;
        Ok(block)
    }
}
