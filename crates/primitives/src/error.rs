use crate::{BlockHash, BlockNumber, TxHash};

/// Header rule violations surfaced by the organizers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HeaderError {
    /// The header hash does not satisfy its own compact target.
    #[error("header hash does not satisfy its target")]
    InvalidProofOfWork,
    /// The compact target differs from the required work at this height.
    #[error("incorrect proof of work target, got {got:#x} expected {expected:#x}")]
    IncorrectTarget {
        /// Compact target in the header.
        got: u32,
        /// Compact target required by the chain state.
        expected: u32,
    },
    /// The timestamp is not strictly past the median time past.
    #[error("timestamp {timestamp} is not past the median time past {median_time_past}")]
    TimestampTooOld {
        /// Header timestamp.
        timestamp: u32,
        /// Median time past at the parent.
        median_time_past: u32,
    },
    /// The timestamp is too far past the wall clock.
    #[error("timestamp {timestamp} exceeds the future limit {limit}")]
    FuturisticTimestamp {
        /// Header timestamp.
        timestamp: u32,
        /// Latest acceptable timestamp.
        limit: u32,
    },
    /// The version is below the minimum enforced at this height.
    #[error("block version {version} below minimum {minimum}")]
    InvalidVersion {
        /// Header version.
        version: u32,
        /// Minimum acceptable version.
        minimum: u32,
    },
}

/// Block rule violations surfaced by check/accept/connect.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlockError {
    /// The block carries no transactions.
    #[error("block has no transactions")]
    Empty,
    /// The first transaction is not a coinbase.
    #[error("first transaction is not a coinbase")]
    MissingCoinbase,
    /// A non-first transaction is a coinbase.
    #[error("extra coinbase at index {index}")]
    ExtraCoinbase {
        /// Offending transaction index.
        index: usize,
    },
    /// The merkle root does not commit to the transaction set.
    #[error("merkle root mismatch, header {header} computed {computed}")]
    MerkleMismatch {
        /// Root claimed by the header.
        header: BlockHash,
        /// Root computed over the transactions.
        computed: BlockHash,
    },
    /// Two transactions share a hash, a mutated-tree ambiguity.
    #[error("duplicate transaction {txid}")]
    DuplicateTransaction {
        /// Duplicated transaction hash.
        txid: TxHash,
    },
    /// The coinbase script does not commit to the block height.
    #[error("coinbase does not commit to height {height}")]
    UncommittedHeight {
        /// Expected committed height.
        height: BlockNumber,
    },
    /// A transaction is not final at this height.
    #[error("non-final transaction {txid}")]
    NonFinalTransaction {
        /// Offending transaction hash.
        txid: TxHash,
    },
    /// An input's funding output could not be located.
    #[error("missing prevout {txid}:{index}")]
    MissingPrevout {
        /// Funding transaction hash.
        txid: TxHash,
        /// Funding output index.
        index: u32,
    },
    /// A transaction spends more than its inputs provide.
    #[error("transaction {txid} overspends")]
    Overspend {
        /// Offending transaction hash.
        txid: TxHash,
    },
    /// The coinbase claims more than subsidy plus fees.
    #[error("coinbase claims {claimed} with only {allowed} allowed")]
    ExcessCoinbaseClaim {
        /// Claimed output total.
        claimed: u64,
        /// Subsidy plus fees.
        allowed: u64,
    },
}
