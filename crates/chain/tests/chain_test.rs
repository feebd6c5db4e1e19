use powchain_chain::{Blockchain, ChainConfig, ChainError, SelectionPolicy, SharedChain};
use powchain_consensus::{CancelToken, MiningConfig, MiningError, ValidationError};
use powchain_core::{Hash, Transaction};
use std::collections::HashSet;
use std::thread;
use std::time::Duration;

fn chain(difficulty: u32, threads: usize) -> Blockchain {
    let config = ChainConfig {
        mining: MiningConfig::new(difficulty, threads),
        ..ChainConfig::default()
    };
    Blockchain::new(config).unwrap()
}

#[test]
fn test_fresh_chain_validates() {
    let mut blockchain = chain(2, 4);
    let cancel = CancelToken::new();
    for i in 0..4u64 {
        blockchain
            .submit_transaction(Transaction::new("alice", "bob", i + 1, i))
            .unwrap();
        blockchain.mine_block("miner", &cancel).unwrap();
    }

    let report = blockchain.validate();
    assert!(report.is_valid());
    assert_eq!(report.blocks_checked, 5);
    for block in blockchain.blocks() {
        assert!(block.hash.to_hex().starts_with("00"));
    }
}

#[test]
fn test_tampering_detected_at_index() {
    let mut blockchain = chain(1, 2);
    let cancel = CancelToken::new();
    for _ in 0..3 {
        blockchain
            .submit_transaction(Transaction::new("alice", "bob", 5, 1))
            .unwrap();
        blockchain.mine_block("miner", &cancel).unwrap();
    }

    // Rebuild the chain from copies, altering block 2.
    let mut blocks = blockchain.blocks().to_vec();
    blocks[2].transactions[0].amount = 500;
    let report = powchain_consensus::validate_chain(&blocks);
    assert_eq!(report.failed_index(), Some(2));
    assert_eq!(
        report.failure.unwrap().error,
        ValidationError::InvalidMerkleRoot
    );

    let mut blocks = blockchain.blocks().to_vec();
    blocks[1].header.prev_hash = Hash::ZERO;
    let report = powchain_consensus::validate_chain(&blocks);
    assert_eq!(report.failed_index(), Some(1));
}

#[test]
fn test_greedy_block_order() {
    let mut blockchain = chain(1, 1);
    blockchain.set_policy(SelectionPolicy::Greedy);
    for fee in [1, 5, 3] {
        blockchain
            .submit_transaction(Transaction::new("alice", "bob", 1, fee))
            .unwrap();
    }

    let block = blockchain.mine_block("m", &CancelToken::new()).unwrap();
    let fees: Vec<u64> = block.transactions.iter().map(|t| t.fee).collect();
    assert_eq!(fees[..3], [5, 3, 1]);
    assert!(block.transactions[3].is_reward());
    assert_eq!(block.transactions[3].amount, 1 + 9);
}

#[test]
fn test_pool_shrinks_by_batch_size() {
    for n in [0usize, 3, 5, 12] {
        let mut blockchain = chain(1, 1);
        for i in 0..n {
            blockchain
                .submit_transaction(Transaction::new("a", "b", i as u64, 1))
                .unwrap();
        }
        blockchain.mine_block("m", &CancelToken::new()).unwrap();
        assert_eq!(blockchain.mempool().len(), n.saturating_sub(5));
    }
}

#[test]
fn test_balance_after_single_credit() {
    let mut blockchain = chain(1, 1);
    blockchain
        .submit_transaction(Transaction::new("faucet", "A", 10, 0))
        .unwrap();
    blockchain.mine_block("m", &CancelToken::new()).unwrap();
    assert_eq!(blockchain.balance("A"), 10);
}

#[test]
fn test_one_thread_and_many_threads_agree_on_validity() {
    for threads in [1, 8] {
        let mut blockchain = chain(3, threads);
        blockchain
            .submit_transaction(Transaction::new("a", "b", 1, 1))
            .unwrap();
        let block = blockchain.mine_block("m", &CancelToken::new()).unwrap();
        assert_eq!(block.threads, threads);
        assert!(block.hash.meets_difficulty(3));
        assert!(blockchain.validate().is_valid());
    }
}

#[test]
fn test_concurrent_miners_and_submitters() {
    let shared = SharedChain::new(chain(2, 2));
    let submitted_per_thread = 20u64;

    let mut handles = Vec::new();
    for s in 0..3u64 {
        let shared = shared.clone();
        handles.push(thread::spawn(move || {
            let mut hashes = Vec::new();
            for i in 0..submitted_per_thread {
                let tx = Transaction::new(format!("sender{}", s), "sink", i, s + 1);
                hashes.push(shared.submit_transaction(tx).unwrap());
            }
            hashes
        }));
    }

    let mut miners = Vec::new();
    for m in 0..2 {
        let shared = shared.clone();
        miners.push(thread::spawn(move || {
            let cancel = CancelToken::new();
            let mut won = 0;
            for _ in 0..6 {
                match shared.mine_block(&format!("miner{}", m), &cancel) {
                    Ok(_) => won += 1,
                    Err(ChainError::Linkage { .. }) => {}
                    Err(e) => panic!("unexpected error: {e}"),
                }
            }
            won
        }));
    }

    let submitted: HashSet<Hash> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    let won: u64 = miners.into_iter().map(|h| h.join().unwrap()).sum();

    let (in_chain, in_pool, height) = shared.read(|c| {
        let in_chain: Vec<Hash> = c
            .blocks()
            .iter()
            .flat_map(|b| &b.transactions)
            .filter(|t| !t.is_reward())
            .map(Transaction::hash)
            .collect();
        let in_pool: Vec<Hash> = c.pending_transactions().iter().map(Transaction::hash).collect();
        (in_chain, in_pool, c.height())
    });

    assert_eq!(height, won);
    assert!(shared.validate().is_valid());

    // Every submitted transaction lives in exactly one place.
    let mut seen = HashSet::new();
    for hash in in_chain.iter().chain(&in_pool) {
        assert!(seen.insert(*hash), "transaction {hash} appears twice");
    }
    assert_eq!(seen, submitted);
}

#[test]
fn test_cancel_from_another_thread() {
    let shared = SharedChain::new(chain(1, 2));
    shared.set_mining_config(MiningConfig::new(64, 4)).unwrap();
    shared
        .submit_transaction(Transaction::new("a", "b", 1, 1))
        .unwrap();

    let cancel = CancelToken::new();
    let miner = {
        let shared = shared.clone();
        let cancel = cancel.clone();
        thread::spawn(move || shared.mine_block("m", &cancel))
    };

    thread::sleep(Duration::from_millis(50));
    cancel.cancel();

    let err = miner.join().unwrap().unwrap_err();
    assert_eq!(err, ChainError::Mining(MiningError::Cancelled));
    assert_eq!(shared.stats().height, 0);
    assert_eq!(shared.stats().mempool.total_transactions, 1);
}

#[test]
fn test_timeout_restores_batch() {
    let mut blockchain = chain(1, 2);
    blockchain
        .set_mining_config(MiningConfig::new(64, 2).with_timeout(Duration::from_millis(20)))
        .unwrap();
    blockchain
        .submit_transaction(Transaction::new("a", "b", 1, 1))
        .unwrap();

    let err = blockchain.mine_block("m", &CancelToken::new()).unwrap_err();
    assert!(matches!(
        err,
        ChainError::Mining(MiningError::TimedOut { .. })
    ));
    assert_eq!(blockchain.mempool().len(), 1);
}
