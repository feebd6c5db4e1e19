//! Block and chain validation rules.
//!
//! Every check recomputes from stored fields and compares against stored
//! values; nothing is trusted from the block producer.

use powchain_core::Block;
use thiserror::Error;
use tracing::warn;

/// Errors that can occur during validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("block prev_hash does not match the previous block's hash")]
    InvalidPrevHash,

    #[error("stored hash does not match the recomputed hash")]
    HashMismatch,

    #[error("hash does not meet difficulty {difficulty}")]
    InsufficientWork { difficulty: u32 },

    #[error("block merkle root verification failed")]
    InvalidMerkleRoot,

    #[error("invalid reward transaction: {0}")]
    InvalidReward(String),
}

/// Which kind of check a [`ValidationError`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    Linkage,
    Hash,
    MerkleRoot,
    Reward,
}

impl ValidationError {
    /// Get the kind of check that failed.
    pub fn check(&self) -> Check {
        match self {
            ValidationError::InvalidPrevHash => Check::Linkage,
            ValidationError::HashMismatch | ValidationError::InsufficientWork { .. } => Check::Hash,
            ValidationError::InvalidMerkleRoot => Check::MerkleRoot,
            ValidationError::InvalidReward(_) => Check::Reward,
        }
    }
}

pub type Result<T> = std::result::Result<T, ValidationError>;

/// Block validator.
pub struct BlockValidator;

impl BlockValidator {
    /// Validate the genesis block: its hash must be reproducible and meet
    /// its recorded difficulty. It carries no transactions to check.
    pub fn validate_genesis(block: &Block) -> Result<()> {
        Self::validate_hash(block)
    }

    /// Validate the stored hash and its proof of work.
    pub fn validate_hash(block: &Block) -> Result<()> {
        if !block.verify_hash() {
            return Err(ValidationError::HashMismatch);
        }
        if !block.meets_difficulty() {
            return Err(ValidationError::InsufficientWork {
                difficulty: block.difficulty,
            });
        }
        Ok(())
    }

    /// Validate the block links to `parent`.
    pub fn validate_linkage(block: &Block, parent: &Block) -> Result<()> {
        if block.header.prev_hash != parent.hash {
            return Err(ValidationError::InvalidPrevHash);
        }
        Ok(())
    }

    /// Validate the trailing reward transaction.
    ///
    /// Exactly one issuance transaction, in last position, paying the
    /// recorded miner the fixed reward plus every fee in the block.
    pub fn validate_reward(block: &Block) -> Result<()> {
        let rewards = block.transactions.iter().filter(|tx| tx.is_reward()).count();
        if rewards != 1 {
            return Err(ValidationError::InvalidReward(format!(
                "expected 1 reward transaction, found {}",
                rewards
            )));
        }

        let reward = block.reward_transaction().ok_or_else(|| {
            ValidationError::InvalidReward("reward is not the last transaction".into())
        })?;

        if reward.recipient != block.miner {
            return Err(ValidationError::InvalidReward("reward not paid to miner".into()));
        }

        let expected = block.reward.saturating_add(block.total_fees());
        if reward.amount != expected || reward.fee != 0 {
            return Err(ValidationError::InvalidReward(format!(
                "expected payout {}, found {}",
                expected, reward.amount
            )));
        }

        Ok(())
    }

    /// Full validation of a non-genesis block against its parent.
    ///
    /// Order: linkage, hash and proof of work, merkle root, reward.
    pub fn validate_successor(block: &Block, parent: &Block) -> Result<()> {
        Self::validate_linkage(block, parent)?;
        Self::validate_hash(block)?;
        if !block.verify_merkle_root() {
            return Err(ValidationError::InvalidMerkleRoot);
        }
        Self::validate_reward(block)?;
        Ok(())
    }
}

/// Where and why a chain walk stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub index: usize,
    pub error: ValidationError,
}

/// Result of validating a whole chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    /// Blocks that passed before the walk stopped.
    pub blocks_checked: usize,
    /// First failure, if any.
    pub failure: Option<ValidationFailure>,
}

impl ValidationReport {
    /// Check if the chain is valid.
    pub fn is_valid(&self) -> bool {
        self.failure.is_none()
    }

    /// Index of the first invalid block.
    pub fn failed_index(&self) -> Option<usize> {
        self.failure.as_ref().map(|f| f.index)
    }
}

/// Walk `blocks` from genesis, stopping at the first invalid block.
pub fn validate_chain(blocks: &[Block]) -> ValidationReport {
    for (index, block) in blocks.iter().enumerate() {
        let outcome = match index {
            0 => BlockValidator::validate_genesis(block),
            _ => BlockValidator::validate_successor(block, &blocks[index - 1]),
        };

        if let Err(error) = outcome {
            warn!(index, %error, "chain validation failed");
            return ValidationReport {
                blocks_checked: index,
                failure: Some(ValidationFailure { index, error }),
            };
        }
    }

    ValidationReport {
        blocks_checked: blocks.len(),
        failure: None,
    }
}
