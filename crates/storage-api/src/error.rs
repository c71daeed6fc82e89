use rbtc_primitives::{BlockHash, BlockNumber, TxHash};

/// Store faults and signals.
///
/// `Integrity` is always fatal; `Unassociated` is a signal, not an error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The archive contradicted itself; operator intervention required.
    #[error("store integrity violation: {0}")]
    Integrity(&'static str),
    /// The disk is full; ingress must stop until space is reclaimed.
    #[error("disk full")]
    DiskFull,
    /// No entry under the requested link.
    #[error("unknown link {link}")]
    UnknownLink {
        /// The unresolvable link index.
        link: u64,
    },
    /// No chain entry at the requested height.
    #[error("no chain entry at height {height}")]
    UnknownHeight {
        /// The unresolvable height.
        height: BlockNumber,
    },
    /// The header is archived without a body.
    #[error("block {hash} is unassociated")]
    Unassociated {
        /// Hash of the body-less header.
        hash: BlockHash,
    },
    /// Confirmation found a spend of an unknown or unconfirmed output.
    #[error("confirmation missing prevout {txid}:{index}")]
    MissingPrevout {
        /// Funding transaction.
        txid: TxHash,
        /// Funding output index.
        index: u32,
    },
    /// Confirmation found an output spent twice.
    #[error("double spend of {txid}:{index}")]
    DoubleSpend {
        /// Funding transaction.
        txid: TxHash,
        /// Funding output index.
        index: u32,
    },
    /// The store is not initialized with a genesis entry.
    #[error("store uninitialized")]
    Uninitialized,
}

impl StoreError {
    /// Returns true if the error requires suspending the node.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Integrity(_))
    }

    /// Returns true if the error is a confirmation rule failure rather than
    /// a store fault.
    pub const fn is_confirmation_failure(&self) -> bool {
        matches!(self, Self::MissingPrevout { .. } | Self::DoubleSpend { .. })
    }
}

/// Progress report emitted during a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotEvent {
    /// Snapshot started.
    Begin,
    /// A table finished compacting.
    TableCompacted {
        /// Index of the compacted table.
        table: usize,
    },
    /// Snapshot finished.
    Complete,
}
