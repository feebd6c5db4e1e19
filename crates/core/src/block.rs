//! Block, block header and block template structures.
//!
//! A block starts life as a [`BlockTemplate`]: header fields, the final
//! transaction list (reward included) and the Merkle root are fixed before
//! any proof of work is attempted. Sealing the template with a winning nonce
//! produces the immutable [`Block`].

use crate::hash::{hash_concat, Hash};
use crate::merkle::transactions_root;
use crate::transaction::Transaction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors that can occur while assembling a block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, BlockError>;

/// The fields covered by the proof of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Position in the chain (0 for genesis).
    pub index: u64,
    /// Creation time, Unix milliseconds.
    pub timestamp: i64,
    /// Hash of the previous block, zero for genesis.
    pub prev_hash: Hash,
    /// Merkle root of transactions, zero when there are none.
    pub merkle_root: Hash,
}

impl BlockHeader {
    /// Hash of this header combined with a candidate nonce.
    pub fn pow_hash(&self, nonce: u64) -> Hash {
        hash_concat(&[
            &self.timestamp.to_le_bytes(),
            &self.index.to_le_bytes(),
            self.prev_hash.as_ref(),
            &nonce.to_le_bytes(),
            self.merkle_root.as_ref(),
        ])
    }

    /// Get the current Unix timestamp in milliseconds.
    pub fn current_timestamp() -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Outcome of a successful nonce search, plus the parameters used to find it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seal {
    pub hash: Hash,
    pub nonce: u64,
    pub difficulty: u32,
    pub threads: usize,
}

/// A block whose contents are final but which has not been mined yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockTemplate {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
    pub miner: String,
    pub reward: u64,
}

impl BlockTemplate {
    /// Template for the genesis block: no transactions, no parent.
    pub fn genesis() -> Self {
        Self {
            header: BlockHeader {
                index: 0,
                timestamp: BlockHeader::current_timestamp(),
                prev_hash: Hash::ZERO,
                merkle_root: Hash::ZERO,
            },
            transactions: Vec::new(),
            miner: String::new(),
            reward: 0,
        }
    }

    /// Template for the block following `previous`.
    ///
    /// Appends the reward transaction paying `miner` the fixed `reward` plus
    /// every fee in `candidates`, then computes the Merkle root over the
    /// final list. The miner address is recorded verbatim.
    pub fn successor(
        previous: &Block,
        candidates: Vec<Transaction>,
        miner: impl Into<String>,
        reward: u64,
    ) -> Result<Self> {
        if previous.hash.is_zero() {
            return Err(BlockError::InvalidArgument(
                "previous block has not been sealed".into(),
            ));
        }

        let index = previous.header.index.checked_add(1).ok_or_else(|| {
            BlockError::InvalidArgument("block index would overflow".into())
        })?;

        let fees = candidates
            .iter()
            .try_fold(0u64, |acc, tx| acc.checked_add(tx.fee))
            .ok_or_else(|| BlockError::InvalidArgument("transaction fees overflow".into()))?;
        let payout = reward
            .checked_add(fees)
            .ok_or_else(|| BlockError::InvalidArgument("block reward overflows".into()))?;

        let miner = miner.into();
        let mut transactions = candidates;
        transactions.push(Transaction::reward(miner.clone(), payout));

        Ok(Self {
            header: BlockHeader {
                index,
                timestamp: BlockHeader::current_timestamp(),
                prev_hash: previous.hash,
                merkle_root: transactions_root(&transactions),
            },
            transactions,
            miner,
            reward,
        })
    }

    /// Finish the block with a mined seal.
    pub fn seal(self, seal: Seal) -> Block {
        Block {
            header: self.header,
            hash: seal.hash,
            nonce: seal.nonce,
            miner: self.miner,
            reward: self.reward,
            difficulty: seal.difficulty,
            threads: seal.threads,
            transactions: self.transactions,
        }
    }
}

/// A mined block. Never mutated once appended to a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block header.
    pub header: BlockHeader,
    /// Mined hash of the header and nonce.
    pub hash: Hash,
    /// Winning nonce.
    pub nonce: u64,
    /// Address credited with the reward.
    pub miner: String,
    /// Fixed reward, excluding fees.
    pub reward: u64,
    /// Leading zero hex digits required when mined.
    pub difficulty: u32,
    /// Worker threads used when mined.
    pub threads: usize,
    /// Transactions, reward last for non-genesis blocks.
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Get the block index.
    pub fn index(&self) -> u64 {
        self.header.index
    }

    /// Check if this is the genesis block.
    pub fn is_genesis(&self) -> bool {
        self.header.index == 0 && self.header.prev_hash.is_zero()
    }

    /// Recompute the hash from the stored header and nonce.
    pub fn compute_hash(&self) -> Hash {
        self.header.pow_hash(self.nonce)
    }

    /// Verify the stored hash matches the stored fields.
    pub fn verify_hash(&self) -> bool {
        self.compute_hash() == self.hash
    }

    /// Verify the stored hash satisfies the recorded difficulty.
    pub fn meets_difficulty(&self) -> bool {
        self.hash.meets_difficulty(self.difficulty)
    }

    /// Verify the merkle root matches the transactions.
    pub fn verify_merkle_root(&self) -> bool {
        transactions_root(&self.transactions) == self.header.merkle_root
    }

    /// Get the number of transactions in this block.
    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }

    /// Sum of fees over the non-reward transactions.
    pub fn total_fees(&self) -> u64 {
        self.transactions
            .iter()
            .filter(|tx| !tx.is_reward())
            .fold(0u64, |acc, tx| acc.saturating_add(tx.fee))
    }

    /// The trailing reward transaction, if present.
    pub fn reward_transaction(&self) -> Option<&Transaction> {
        self.transactions.last().filter(|tx| tx.is_reward())
    }
}

fn format_timestamp(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| millis.to_string())
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[BLOCK START]")?;
        writeln!(
            f,
            "Index: {}\tTimestamp: {}",
            self.header.index,
            format_timestamp(self.header.timestamp)
        )?;
        writeln!(f, "Previous Hash: {}", self.header.prev_hash.to_hex())?;
        writeln!(f, "-- PoW --")?;
        writeln!(f, "Difficulty Level: {}\tThreads: {}", self.difficulty, self.threads)?;
        writeln!(f, "Nonce: {}", self.nonce)?;
        writeln!(f, "Hash: {}", self.hash.to_hex())?;
        writeln!(f, "-- Rewards --")?;
        writeln!(f, "Reward: {}", self.reward)?;
        writeln!(f, "Miners Address: {}", self.miner)?;
        writeln!(f, "-- {} Transactions --", self.transactions.len())?;
        writeln!(f, "Merkle Root: {}", self.header.merkle_root.to_hex())?;
        for tx in &self.transactions {
            writeln!(f, "{}", tx)?;
        }
        write!(f, "[BLOCK END]")
    }
}
