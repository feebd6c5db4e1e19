//! Transactions as consumed by the ledger.
//!
//! Key handling and signing belong to the wallet; a transaction reaches the
//! ledger already signed and the signature is carried as an opaque string.

use crate::hash::{hash, Hash};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved sender of reward transactions. It is never debited.
pub const ISSUANCE_ADDRESS: &str = "Mine Rewards";

/// A value transfer between two addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Sender's address.
    pub sender: String,
    /// Recipient's address.
    pub recipient: String,
    /// Value to transfer.
    pub amount: u64,
    /// Fee paid to the miner of the including block.
    pub fee: u64,
    /// Creation time, Unix milliseconds.
    pub timestamp: i64,
    /// Wallet-produced signature, hex encoded. Empty for rewards.
    pub signature: String,
}

impl Transaction {
    /// Create a transaction stamped with the current time.
    pub fn new(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: u64,
        fee: u64,
    ) -> Self {
        Self::with_timestamp(sender, recipient, amount, fee, Utc::now().timestamp_millis())
    }

    /// Create a transaction with an explicit timestamp.
    pub fn with_timestamp(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: u64,
        fee: u64,
        timestamp: i64,
    ) -> Self {
        Self {
            sender: sender.into(),
            recipient: recipient.into(),
            amount,
            fee,
            timestamp,
            signature: String::new(),
        }
    }

    /// Create the reward transaction crediting `miner`.
    pub fn reward(miner: impl Into<String>, amount: u64) -> Self {
        Self::new(ISSUANCE_ADDRESS, miner, amount, 0)
    }

    /// Attach the wallet's signature.
    pub fn signed(mut self, signature: impl Into<String>) -> Self {
        self.signature = signature.into();
        self
    }

    /// Check if this transaction was issued by the ledger itself.
    pub fn is_reward(&self) -> bool {
        self.sender == ISSUANCE_ADDRESS
    }

    /// Content hash over every field, signature included.
    pub fn hash(&self) -> Hash {
        let encoded = bincode::serialize(self).expect("serialization should not fail");
        hash(&encoded)
    }

    /// Total debited from the sender.
    pub fn total_cost(&self) -> u64 {
        self.amount.saturating_add(self.fee)
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[TX] {} -> {} amount={} fee={} ts={} hash={}",
            self.sender,
            self.recipient,
            self.amount,
            self.fee,
            self.timestamp,
            self.hash().to_hex()
        )
    }
}
