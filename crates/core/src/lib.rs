//! Core ledger primitives for powchain.
//!
//! This crate provides the fundamental types used throughout the ledger:
//! - Hashing (Blake3, hex rendering, difficulty predicate)
//! - Transactions
//! - Blocks, block headers and block templates
//! - Merkle roots

pub mod block;
pub mod hash;
pub mod merkle;
pub mod transaction;

// Re-export commonly used types at the crate root
pub use block::{Block, BlockError, BlockHeader, BlockTemplate, Seal};
pub use hash::{hash, hash_concat, Hash, H256};
pub use merkle::{combine, merkle_root, transactions_root};
pub use transaction::{Transaction, ISSUANCE_ADDRESS};
