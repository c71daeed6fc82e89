use rbtc_primitives::{BlockError, BlockNumber, HeaderError};
use rbtc_storage_api::StoreError;

/// Rejections surfaced to the submitting peer by the organizers.
///
/// These are never fatal to the node; peers submitting garbage are the
/// network layer's scoring concern.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrganizeError {
    /// The block or header is already known.
    #[error("duplicate block")]
    Duplicate,
    /// The parent is unknown to the tree, the candidate chain and the store.
    #[error("orphan block")]
    Orphan,
    /// The hash disagrees with a configured checkpoint.
    #[error("checkpoint conflict at height {height}")]
    CheckpointConflict {
        /// The checkpointed height.
        height: BlockNumber,
    },
    /// The block was already found unconfirmable.
    #[error("block is unconfirmable")]
    Unconfirmable,
    /// A header consensus rule failed.
    #[error(transparent)]
    Header(#[from] HeaderError),
    /// A block consensus rule failed.
    #[error(transparent)]
    Block(#[from] BlockError),
    /// Prevout population failed; the submitting peer fed an unconnectable
    /// block.
    #[error("protocol violation")]
    ProtocolViolation,
    /// The store failed beneath the organizer.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Block memory could not stage the body.
    #[error(transparent)]
    Arena(#[from] ArenaError),
    /// The node is shutting down.
    #[error("service stopped")]
    ServiceStopped,
}

/// Node lifecycle and wiring failures.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// The store holds no genesis; run `initchain` first.
    #[error("store uninitialized")]
    StoreUninitialized,
    /// The node is not running.
    #[error("service stopped")]
    ServiceStopped,
    /// The node suspended on a fatal store fault.
    #[error("node faulted: {0}")]
    Fault(#[source] StoreError),
    /// A snapshot attempt failed.
    #[error("snapshot failed: {0}")]
    Snapshot(#[source] StoreError),
}

/// Block memory failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ArenaError {
    /// The arena cannot satisfy the allocation.
    #[error("arena exhausted: {requested} bytes requested, {remaining} remaining")]
    AllocationExhausted {
        /// Bytes requested.
        requested: usize,
        /// Bytes remaining in the arena.
        remaining: usize,
    },
    /// More worker threads requested arenas than were configured.
    #[error("all {workers} worker arenas are assigned")]
    WorkerExhausted {
        /// Configured worker count.
        workers: usize,
    },
}
