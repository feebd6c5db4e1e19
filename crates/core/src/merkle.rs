//! Merkle root computation over transaction hashes.

use crate::hash::{hash_concat, Hash};
use crate::transaction::Transaction;

/// Combine two nodes into their parent: `blake3(left || right)`.
pub fn combine(left: &Hash, right: &Hash) -> Hash {
    hash_concat(&[left.as_ref(), right.as_ref()])
}

/// Compute the merkle root of a list of hashes.
///
/// Returns the zero hash if the list is empty. A lone hash is paired with
/// itself, so even a single-leaf tree yields a combined root, and the last
/// node of any odd-sized level is paired with itself as well.
pub fn merkle_root(hashes: &[Hash]) -> Hash {
    match hashes {
        [] => Hash::ZERO,
        [only] => combine(only, only),
        _ => {
            let mut current_level: Vec<Hash> = hashes.to_vec();

            while current_level.len() > 1 {
                current_level = current_level
                    .chunks(2)
                    .map(|pair| {
                        let left = &pair[0];
                        // Odd number of elements: hash the last one with itself
                        let right = pair.get(1).unwrap_or(left);
                        combine(left, right)
                    })
                    .collect();
            }

            current_level[0]
        }
    }
}

/// Merkle root over the content hashes of `transactions`, in order.
pub fn transactions_root(transactions: &[Transaction]) -> Hash {
    let tx_hashes: Vec<Hash> = transactions.iter().map(Transaction::hash).collect();
    merkle_root(&tx_hashes)
}
