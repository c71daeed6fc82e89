//! Block archive traits and the in-memory store for the rbtc node.
//!
//! The chasers consume the archive exclusively through [`StoreReader`] and
//! [`StoreWriter`]; byte level table layout is the store's concern. Writes
//! are serialized per table by the store itself and every call observes a
//! consistent snapshot.

mod error;
mod memory;
mod state;

pub use error::{SnapshotEvent, StoreError};
pub use memory::MemoryStore;
pub use state::BlockState;

use rbtc_primitives::{
    BlockHash, BlockNumber, Context, SealedBlock, SealedHeader, Transaction,
};

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Opaque identifier of an archived header.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    derive_more::Display,
    derive_more::From,
)]
#[display("link({_0})")]
pub struct Link(u64);

impl Link {
    /// The raw table index.
    pub const fn index(self) -> u64 {
        self.0
    }
}

/// Read half of the block archive.
#[auto_impl::auto_impl(&, Arc)]
pub trait StoreReader: Send + Sync {
    /// Height of the archived header.
    fn get_height(&self, link: Link) -> StoreResult<BlockNumber>;

    /// Compact target of the archived header.
    fn get_bits(&self, link: Link) -> StoreResult<u32>;

    /// Timestamp of the archived header.
    fn get_timestamp(&self, link: Link) -> StoreResult<u32>;

    /// Hash keying the archived header.
    fn get_header_key(&self, link: Link) -> StoreResult<BlockHash>;

    /// The archived header itself.
    fn get_header(&self, link: Link) -> StoreResult<SealedHeader>;

    /// The archived block, if a body is associated.
    fn get_block(&self, link: Link) -> StoreResult<Option<SealedBlock>>;

    /// Consensus context recorded when the header was archived.
    fn get_context(&self, link: Link) -> StoreResult<Context>;

    /// Looks up a header by hash.
    fn to_header(&self, hash: &BlockHash) -> Option<Link>;

    /// Parent link of the given header, `None` at genesis.
    fn to_parent(&self, link: Link) -> Option<Link>;

    /// Candidate chain entry at the given height.
    fn to_candidate(&self, height: BlockNumber) -> Option<Link>;

    /// Confirmed chain entry at the given height.
    fn to_confirmed(&self, height: BlockNumber) -> Option<Link>;

    /// Top height of the candidate chain.
    fn get_top_candidate(&self) -> BlockNumber;

    /// Top height of the confirmed chain.
    fn get_top_confirmed(&self) -> BlockNumber;

    /// Highest height shared by the candidate and confirmed chains.
    fn get_fork(&self) -> BlockNumber;

    /// Returns true if the link sits on the candidate chain at its height.
    fn is_candidate_header(&self, link: Link) -> bool;

    /// Returns true if the link sits on the confirmed chain at its height.
    fn is_confirmed_block(&self, link: Link) -> bool;

    /// Validation state of the archived block.
    fn get_block_state(&self, link: Link) -> StoreResult<BlockState>;

    /// Returns true if the block's transaction set is merkle ambiguous.
    fn is_malleable64(&self, link: Link) -> StoreResult<bool>;

    /// Fills unpopulated prevouts of `transactions` from archived bodies.
    ///
    /// Returns false if any spend remains unresolved.
    fn populate(&self, transactions: &mut [Transaction]) -> bool;

    /// Returns true if the store holds a genesis entry.
    fn is_initialized(&self) -> bool;

    /// Returns true if the store ran out of disk.
    fn is_full(&self) -> bool;

    /// Returns true if the store faulted.
    fn is_fault(&self) -> bool;

    /// The sticky fault code, if any.
    fn get_code(&self) -> Option<StoreError>;
}

/// Write half of the block archive.
pub trait StoreWriter: Send + Sync {
    /// Archives a header (no body) under the given context.
    fn set_header_link(&self, header: &SealedHeader, context: Context) -> StoreResult<Link>;

    /// Archives a full block under the given context.
    fn set_link(&self, block: &SealedBlock, context: Context) -> StoreResult<Link>;

    /// Associates a body with a previously archived header.
    fn set_associated(&self, link: Link, transactions: Vec<Transaction>) -> StoreResult<()>;

    /// Drops the body of an archived block, keeping the header.
    fn set_disassociated(&self, link: Link) -> StoreResult<()>;

    /// Appends to the candidate chain.
    fn push_candidate(&self, link: Link) -> StoreResult<()>;

    /// Pops the candidate tip.
    fn pop_candidate(&self) -> StoreResult<Link>;

    /// Appends to the confirmed chain.
    fn push_confirmed(&self, link: Link) -> StoreResult<()>;

    /// Pops the confirmed tip.
    fn pop_confirmed(&self) -> StoreResult<Link>;

    /// Marks a block confirmable, recording its fees.
    fn set_block_confirmable(&self, link: Link, fees: u64) -> StoreResult<()>;

    /// Marks a block unconfirmable.
    fn set_block_unconfirmable(&self, link: Link) -> StoreResult<()>;

    /// Marks the block's transactions strong (spendable by confirmed view).
    fn set_strong(&self, link: Link) -> StoreResult<()>;

    /// Reverts [`StoreWriter::set_strong`].
    fn set_unstrong(&self, link: Link) -> StoreResult<()>;

    /// Runs full confirmation validation of the block against the store.
    ///
    /// Returns `Ok(fees)` when the block can be confirmed. Rule failures are
    /// reported as non-fatal errors; [`StoreError::Integrity`] is fatal.
    fn block_confirmable(&self, link: Link) -> StoreResult<u64>;

    /// Compacts the archive, reporting progress to the observer.
    fn snapshot(&self, observer: &mut dyn FnMut(SnapshotEvent)) -> StoreResult<()>;

    /// Clears a disk-full condition after space was reclaimed.
    fn reset_full(&self);
}

/// Full store surface consumed by the node.
pub trait Store: StoreReader + StoreWriter {}

impl<T: StoreReader + StoreWriter> Store for T {}
