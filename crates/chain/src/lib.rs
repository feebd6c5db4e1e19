//! Chain orchestration for powchain.
//!
//! This crate brings together all components into a working in-memory ledger:
//! - **Policy**: transaction selection strategies (greedy, altruistic, random, address preference)
//! - **Mempool**: pool of pending transactions kept in policy order
//! - **Blockchain**: append-only chain with balances, validation and mining
//! - **Shared**: a lock-protected handle for use from several threads
//!
//! # Example
//!
//! ```rust,no_run
//! use powchain_chain::{Blockchain, ChainConfig, SelectionPolicy};
//! use powchain_consensus::{CancelToken, MiningConfig};
//! use powchain_core::Transaction;
//!
//! let config = ChainConfig {
//!     mining: MiningConfig::new(3, 4),
//!     ..ChainConfig::default()
//! };
//! let mut chain = Blockchain::new(config).unwrap();
//!
//! chain.set_policy(SelectionPolicy::Greedy);
//! chain.submit_transaction(Transaction::new("alice", "bob", 10, 2)).unwrap();
//! chain.mine_block("carol", &CancelToken::new()).unwrap();
//!
//! assert!(chain.validate().is_valid());
//! assert_eq!(chain.balance("bob"), 10);
//! ```

pub mod blockchain;
pub mod mempool;
pub mod policy;
pub mod shared;

// Re-export commonly used types
pub use blockchain::{Blockchain, BlockchainStats, ChainConfig, ChainError};
pub use mempool::{Mempool, MempoolConfig, MempoolError, MempoolStats};
pub use policy::{ParsePolicyError, SelectionPolicy};
pub use shared::SharedChain;
