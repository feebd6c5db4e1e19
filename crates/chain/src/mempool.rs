//! Transaction mempool for pending transactions.
//!
//! The pool is kept in priority order under the active [`SelectionPolicy`]:
//! it is re-ordered on every submission and policy change, so inspecting it
//! always shows what the next block would take. Extraction takes a batch from
//! the front and orders that batch once more before handing it out.

use crate::policy::SelectionPolicy;
use powchain_core::{Hash, Transaction};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur during mempool operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MempoolError {
    #[error("transaction already in mempool")]
    DuplicateTransaction,

    #[error("mempool is full (capacity: {0})")]
    MempoolFull(usize),

    #[error("reward transactions cannot be submitted")]
    ReservedSender,

    #[error("pending fees would overflow (fee: {0})")]
    FeeOverflow(u64),
}

pub type Result<T> = std::result::Result<T, MempoolError>;

/// Configuration for the mempool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MempoolConfig {
    /// Maximum number of transactions in the mempool.
    pub max_transactions: usize,
    /// Maximum transactions taken into one block, reward excluded.
    pub batch_size: usize,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_transactions: 10_000,
            batch_size: 5,
        }
    }
}

/// Transaction mempool.
#[derive(Debug, Clone)]
pub struct Mempool {
    /// Configuration.
    config: MempoolConfig,
    /// Active selection policy.
    policy: SelectionPolicy,
    /// Pending transactions in priority order.
    pending: Vec<Transaction>,
    /// Set of transaction hashes for fast lookup.
    tx_hashes: HashSet<Hash>,
    /// Sum of pending fees.
    total_fees: u64,
}

impl Mempool {
    /// Create a new mempool with default configuration.
    pub fn new() -> Self {
        Self::with_config(MempoolConfig::default())
    }

    /// Create a new mempool with the given configuration.
    pub fn with_config(config: MempoolConfig) -> Self {
        Self {
            config,
            policy: SelectionPolicy::default(),
            pending: Vec::new(),
            tx_hashes: HashSet::new(),
            total_fees: 0,
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &MempoolConfig {
        &self.config
    }

    /// Get the number of transactions in the mempool.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Check if the mempool is empty.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Check if a transaction is in the mempool.
    pub fn contains(&self, tx_hash: &Hash) -> bool {
        self.tx_hashes.contains(tx_hash)
    }

    /// Pending transactions in current priority order.
    pub fn pending(&self) -> &[Transaction] {
        &self.pending
    }

    /// Sum of pending fees.
    pub fn total_fees(&self) -> u64 {
        self.total_fees
    }

    /// Get the active selection policy.
    pub fn policy(&self) -> &SelectionPolicy {
        &self.policy
    }

    /// Switch policy and re-order the pool under it.
    pub fn set_policy(&mut self, policy: SelectionPolicy) {
        debug!(policy = %policy, "selection policy changed");
        self.policy = policy;
        self.reorder();
    }

    /// Add a transaction to the mempool.
    ///
    /// The sum of pending fees must fit in a `u64`, so any batch taken from
    /// the pool can be paid out in a single reward.
    pub fn submit(&mut self, tx: Transaction) -> Result<Hash> {
        if tx.is_reward() {
            return Err(MempoolError::ReservedSender);
        }

        let tx_hash = tx.hash();

        // Check if transaction already exists
        if self.contains(&tx_hash) {
            return Err(MempoolError::DuplicateTransaction);
        }

        // Check global capacity
        if self.pending.len() >= self.config.max_transactions {
            return Err(MempoolError::MempoolFull(self.config.max_transactions));
        }

        let total_fees = self
            .total_fees
            .checked_add(tx.fee)
            .ok_or(MempoolError::FeeOverflow(tx.fee))?;

        self.total_fees = total_fees;
        self.tx_hashes.insert(tx_hash);
        self.pending.push(tx);
        self.reorder();

        Ok(tx_hash)
    }

    /// Remove up to `max_count` transactions from the front of the pool.
    ///
    /// The removed slice is ordered by the policy again before it is
    /// returned. Removed transactions are gone from the pool for good.
    pub fn extract_batch(&mut self, max_count: usize) -> Vec<Transaction> {
        let n = max_count.min(self.pending.len());
        let batch: Vec<Transaction> = self.pending.drain(..n).collect();
        for tx in &batch {
            self.tx_hashes.remove(&tx.hash());
            self.total_fees = self.total_fees.saturating_sub(tx.fee);
        }
        debug!(taken = batch.len(), remaining = self.pending.len(), "extracted batch");
        self.policy.order(batch)
    }

    /// Extract a batch of the configured block size.
    pub fn next_batch(&mut self) -> Vec<Transaction> {
        self.extract_batch(self.config.batch_size)
    }

    /// Return an unused batch to the pool.
    ///
    /// Reward transactions and transactions already pending are skipped.
    /// Capacity is not enforced, since the batch was taken from this pool.
    /// The fee total saturates if submissions filled it in the meantime.
    pub fn restore(&mut self, batch: Vec<Transaction>) {
        let mut restored = 0usize;
        for tx in batch {
            if tx.is_reward() {
                continue;
            }
            if self.tx_hashes.insert(tx.hash()) {
                self.total_fees = self.total_fees.saturating_add(tx.fee);
                self.pending.push(tx);
                restored += 1;
            }
        }
        if restored > 0 {
            debug!(restored, "returned batch to mempool");
            self.reorder();
        }
    }

    /// Drop pending transactions whose hash is in `included`.
    ///
    /// Returns how many were removed.
    pub fn remove_included(&mut self, included: &HashSet<Hash>) -> usize {
        let before = self.pending.len();
        let mut removed_fees = 0u64;
        let tx_hashes = &mut self.tx_hashes;
        self.pending.retain(|tx| {
            let tx_hash = tx.hash();
            if included.contains(&tx_hash) {
                tx_hashes.remove(&tx_hash);
                removed_fees = removed_fees.saturating_add(tx.fee);
                false
            } else {
                true
            }
        });
        self.total_fees = self.total_fees.saturating_sub(removed_fees);

        let removed = before - self.pending.len();
        if removed > 0 {
            debug!(removed, "dropped pending transactions already in a block");
        }
        removed
    }

    /// Clear all transactions from the mempool.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.tx_hashes.clear();
        self.total_fees = 0;
    }

    /// Get mempool statistics.
    pub fn stats(&self) -> MempoolStats {
        MempoolStats {
            total_transactions: self.len(),
            total_fees: self.total_fees,
            capacity: self.config.max_transactions,
            batch_size: self.config.batch_size,
        }
    }

    fn reorder(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        self.pending = self.policy.order(pending);
    }
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new()
    }
}

/// Mempool statistics.
#[derive(Debug, Clone)]
pub struct MempoolStats {
    /// Total number of transactions.
    pub total_transactions: usize,
    /// Sum of pending fees.
    pub total_fees: u64,
    /// Mempool capacity.
    pub capacity: usize,
    /// Transactions taken per block.
    pub batch_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn tx(recipient: &str, fee: u64, timestamp: i64) -> Transaction {
        Transaction::with_timestamp("alice", recipient, 10, fee, timestamp)
    }

    fn fees(txs: &[Transaction]) -> Vec<u64> {
        txs.iter().map(|t| t.fee).collect()
    }

    #[test]
    fn test_mempool_submit_and_contains() {
        let mut mempool = Mempool::new();
        let t = tx("bob", 1, 1);
        let hash = mempool.submit(t.clone()).unwrap();

        assert_eq!(hash, t.hash());
        assert_eq!(mempool.len(), 1);
        assert!(mempool.contains(&hash));
        assert_eq!(mempool.pending()[0], t);
    }

    #[test]
    fn test_mempool_duplicate_rejected() {
        let mut mempool = Mempool::new();
        let t = tx("bob", 1, 1);

        assert!(mempool.submit(t.clone()).is_ok());
        assert_eq!(mempool.submit(t), Err(MempoolError::DuplicateTransaction));
    }

    #[test]
    fn test_mempool_reward_rejected() {
        let mut mempool = Mempool::new();
        assert_eq!(
            mempool.submit(Transaction::reward("miner", 5)),
            Err(MempoolError::ReservedSender)
        );
        assert!(mempool.is_empty());
    }

    #[test]
    fn test_mempool_capacity_limit() {
        let mut mempool = Mempool::with_config(MempoolConfig {
            max_transactions: 2,
            batch_size: 5,
        });

        assert!(mempool.submit(tx("b", 1, 1)).is_ok());
        assert!(mempool.submit(tx("b", 1, 2)).is_ok());
        assert_eq!(mempool.submit(tx("b", 1, 3)), Err(MempoolError::MempoolFull(2)));
    }

    #[test]
    fn test_pool_reordered_on_every_submit() {
        let mut mempool = Mempool::new();
        mempool.submit(tx("a", 1, 1)).unwrap();
        mempool.submit(tx("b", 5, 2)).unwrap();
        assert_eq!(fees(mempool.pending()), vec![5, 1]);
        mempool.submit(tx("c", 3, 3)).unwrap();
        assert_eq!(fees(mempool.pending()), vec![5, 3, 1]);
    }

    #[test]
    fn test_set_policy_reorders_immediately() {
        let mut mempool = Mempool::new();
        mempool.submit(tx("a", 1, 30)).unwrap();
        mempool.submit(tx("b", 5, 10)).unwrap();
        mempool.submit(tx("c", 3, 20)).unwrap();

        mempool.set_policy(SelectionPolicy::Altruistic);
        let stamps: Vec<i64> = mempool.pending().iter().map(|t| t.timestamp).collect();
        assert_eq!(stamps, vec![10, 20, 30]);
        assert_eq!(mempool.policy(), &SelectionPolicy::Altruistic);
    }

    #[test]
    fn test_extract_batch_removes_exactly_batch() {
        let mut mempool = Mempool::new();
        for i in 0..8 {
            mempool.submit(tx("b", i, i as i64)).unwrap();
        }

        let batch = mempool.extract_batch(5);
        assert_eq!(batch.len(), 5);
        assert_eq!(mempool.len(), 3);
        assert_eq!(fees(&batch), vec![7, 6, 5, 4, 3]);
        for t in &batch {
            assert!(!mempool.contains(&t.hash()));
        }

        let rest = mempool.extract_batch(5);
        assert_eq!(rest.len(), 3);
        assert!(mempool.is_empty());
        assert!(mempool.extract_batch(5).is_empty());

        let first: HashSet<Hash> = batch.iter().map(Transaction::hash).collect();
        assert!(rest.iter().all(|t| !first.contains(&t.hash())));
    }

    #[test]
    fn test_next_batch_uses_configured_size() {
        let mut mempool = Mempool::with_config(MempoolConfig {
            max_transactions: 100,
            batch_size: 2,
        });
        for i in 0..5 {
            mempool.submit(tx("b", 1, i)).unwrap();
        }
        assert_eq!(mempool.next_batch().len(), 2);
        assert_eq!(mempool.len(), 3);
    }

    #[test]
    fn test_address_preference_window_is_reordered() {
        let mut mempool = Mempool::new();
        mempool.set_policy(SelectionPolicy::AddressPreference {
            address: "me".into(),
        });
        mempool.submit(tx("x", 1, 1)).unwrap();
        mempool.submit(tx("me", 2, 2)).unwrap();
        mempool.submit(tx("y", 3, 3)).unwrap();
        mempool.submit(tx("me", 4, 4)).unwrap();
        assert_eq!(fees(mempool.pending()), vec![2, 4, 1, 3]);

        // Preferring another address re-orders the whole pool at once.
        mempool.set_policy(SelectionPolicy::AddressPreference {
            address: "y".into(),
        });
        assert_eq!(fees(mempool.pending()), vec![3, 2, 4, 1]);
        let batch = mempool.extract_batch(2);
        assert_eq!(fees(&batch), vec![3, 2]);
    }

    #[test]
    fn test_restore_returns_batch() {
        let mut mempool = Mempool::new();
        for i in 0..3 {
            mempool.submit(tx("b", i, i as i64)).unwrap();
        }
        let mut batch = mempool.extract_batch(2);
        assert_eq!(mempool.len(), 1);

        batch.push(Transaction::reward("miner", 1));
        mempool.restore(batch);
        assert_eq!(mempool.len(), 3);
        assert_eq!(fees(mempool.pending()), vec![2, 1, 0]);
        assert!(mempool.pending().iter().all(|t| !t.is_reward()));
    }

    #[test]
    fn test_fee_overflow_rejected() {
        let mut mempool = Mempool::new();
        mempool.submit(tx("big", u64::MAX, 1)).unwrap();

        assert_eq!(
            mempool.submit(tx("small", 1, 2)),
            Err(MempoolError::FeeOverflow(1))
        );
        assert_eq!(mempool.len(), 1);
        assert_eq!(mempool.stats().total_fees, u64::MAX);
    }

    #[test]
    fn test_stats_saturate_after_restore() {
        let mut mempool = Mempool::new();
        mempool.submit(tx("big", u64::MAX, 1)).unwrap();
        let batch = mempool.extract_batch(1);
        assert_eq!(mempool.total_fees(), 0);

        // The freed budget is taken while the batch is out.
        mempool.submit(tx("small", 1, 2)).unwrap();
        mempool.restore(batch);

        let stats = mempool.stats();
        assert_eq!(stats.total_transactions, 2);
        assert_eq!(stats.total_fees, u64::MAX);
    }

    #[test]
    fn test_remove_included() {
        let mut mempool = Mempool::new();
        let keep = tx("keep", 1, 1);
        let gone = tx("gone", 4, 2);
        mempool.submit(keep.clone()).unwrap();
        mempool.submit(gone.clone()).unwrap();

        let included: HashSet<Hash> = [gone.hash()].into_iter().collect();
        assert_eq!(mempool.remove_included(&included), 1);
        assert_eq!(mempool.pending(), &[keep.clone()]);
        assert!(!mempool.contains(&gone.hash()));
        assert_eq!(mempool.total_fees(), 1);

        // The removed transaction may be submitted again at pool level.
        assert!(mempool.submit(gone).is_ok());
        assert_eq!(mempool.remove_included(&HashSet::new()), 0);
    }

    #[test]
    fn test_mempool_clear_and_stats() {
        let mut mempool = Mempool::new();
        mempool.submit(tx("b", 2, 1)).unwrap();
        mempool.submit(tx("c", 3, 2)).unwrap();

        let stats = mempool.stats();
        assert_eq!(stats.total_transactions, 2);
        assert_eq!(stats.total_fees, 5);
        assert_eq!(stats.batch_size, 5);

        mempool.clear();
        assert!(mempool.is_empty());
        assert_eq!(mempool.total_fees(), 0);
    }
}
