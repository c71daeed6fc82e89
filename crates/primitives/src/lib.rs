//! Commonly used types for the rbtc node.
//!
//! Headers, blocks and transactions here are consensus objects only: sealed
//! types cache their hash, proof-of-work values are derived from the compact
//! target encoding, and block level validation is split into the same phases
//! the organizers drive (`check`, `check_with_context`, `populate`, `accept`,
//! `connect`).

mod block;
mod error;
mod header;
pub mod proofs;
mod transaction;

pub use block::{Block, SealedBlock};
pub use error::{BlockError, HeaderError};
pub use header::{compact_to_target, proof, Header, SealedHeader};
pub use transaction::{OutPoint, Transaction, TxInput, TxOutput};

use alloy_primitives::B256;

/// A block hash.
pub type BlockHash = B256;

/// A transaction hash.
pub type TxHash = B256;

/// A block height.
pub type BlockNumber = u64;

/// Re-exported uint used for cumulative proof-of-work sums.
pub use alloy_primitives::U256;

/// Consensus context under which a block is validated.
///
/// Produced by the chain state for the block's own height and handed to the
/// contextual validation phases and to the store when the block is archived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Context {
    /// Active fork rule flags, see [`forks`].
    pub forks: u32,
    /// Height of the block being validated.
    pub height: BlockNumber,
    /// Median time past of the previous eleven blocks.
    pub median_time_past: u32,
    /// Minimum acceptable block version at this height.
    pub minimum_block_version: u32,
}

impl Context {
    /// Returns true if the given fork rule flag is active in this context.
    pub const fn is_enabled(&self, flag: u32) -> bool {
        self.forks & flag != 0
    }
}

/// Fork rule flags carried by [`Context`].
pub mod forks {
    /// Coinbase must commit to the block height (BIP34).
    pub const BIP34: u32 = 1 << 0;
    /// Strict DER signatures (BIP66).
    pub const BIP66: u32 = 1 << 1;
    /// `OP_CHECKLOCKTIMEVERIFY` (BIP65).
    pub const BIP65: u32 = 1 << 2;
}

/// Computes the double SHA-256 of `data`.
pub fn hash256(data: &[u8]) -> B256 {
    use sha2::{Digest, Sha256};
    let first = Sha256::digest(data);
    B256::from_slice(&Sha256::digest(first))
}
