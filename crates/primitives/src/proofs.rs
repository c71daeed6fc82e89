//! Merkle commitment helpers.

use crate::{hash256, Transaction, TxHash};

/// Computes the merkle root over the given transaction hashes.
///
/// Odd levels duplicate their last element, which is the source of the
/// mutated-tree ambiguity callers must screen for separately.
pub fn calculate_merkle_root(mut hashes: Vec<TxHash>) -> TxHash {
    if hashes.is_empty() {
        return TxHash::ZERO;
    }
    while hashes.len() > 1 {
        if hashes.len() % 2 != 0 {
            hashes.push(*hashes.last().expect("non-empty"));
        }
        hashes = hashes
            .chunks_exact(2)
            .map(|pair| {
                let mut buffer = [0u8; 64];
                buffer[..32].copy_from_slice(pair[0].as_slice());
                buffer[32..].copy_from_slice(pair[1].as_slice());
                hash256(&buffer)
            })
            .collect();
    }
    hashes[0]
}

/// Computes the merkle root of a transaction set.
pub fn calculate_transaction_root(transactions: &[Transaction]) -> TxHash {
    calculate_merkle_root(transactions.iter().map(Transaction::txid).collect())
}
