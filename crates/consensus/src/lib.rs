//! Proof of Work consensus for powchain.
//!
//! This crate provides:
//! - Parallel nonce search with first-writer-wins commit, cancellation and timeout
//! - Block mining on top of a previous block
//! - Block and chain validation (linkage, hash, proof of work, merkle root, reward)
//!
//! # Example
//!
//! ```rust,no_run
//! use powchain_consensus::{validate_chain, BlockMiner, CancelToken, MiningConfig};
//! use powchain_core::Transaction;
//!
//! let miner = BlockMiner::new(MiningConfig::new(3, 4), 1);
//! let cancel = CancelToken::new();
//!
//! let genesis = miner.mine_genesis(&cancel).unwrap().block;
//! let txs = vec![Transaction::new("alice", "bob", 10, 1)];
//! let mined = miner.mine_block(&genesis, txs, "carol", &cancel).unwrap();
//!
//! println!("mined in {:?}", mined.report.elapsed);
//! assert!(validate_chain(&[genesis, mined.block]).is_valid());
//! ```

pub mod pow;
pub mod validator;

// Re-export commonly used types
pub use pow::{
    BlockMiner, CancelToken, MinedBlock, Miner, MiningConfig, MiningError, MiningReport,
    MAX_DIFFICULTY, MAX_THREADS,
};
pub use validator::{
    validate_chain, BlockValidator, Check, ValidationError, ValidationFailure, ValidationReport,
};
