//! Fork-aware consensus cursor for the rbtc node.
//!
//! A [`ChainState`] describes the consensus context at one block: active
//! fork flags, the minimum acceptable version, the median time past window
//! and the required work for the next block. States are immutable; a child
//! is derived from its parent and a header, deterministically and without
//! I/O. Reconstruction from the archive walks parent links only.

use rbtc_chainspec::ChainSpec;
use rbtc_primitives::{compact_to_target, BlockHash, BlockNumber, Context, Header, U256};
use rbtc_storage_api::{Link, StoreError, StoreReader};

/// Number of timestamps in the median time past window.
const MTP_WINDOW: usize = 11;

/// Errors constructing a chain state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainStateError {
    /// The header does not extend the parent state.
    #[error("header parent {got} does not match state {expected}")]
    ParentMismatch {
        /// Parent hash in the header.
        got: BlockHash,
        /// Hash of the parent state.
        expected: BlockHash,
    },
    /// The archive could not supply the ancestry.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The consensus context at one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainState {
    height: BlockNumber,
    hash: BlockHash,
    version: u32,
    timestamp: u32,
    bits: u32,
    flags: u32,
    minimum_block_version: u32,
    median_time_past: u32,
    /// Trailing timestamps ending at this block, newest last.
    timestamps: Vec<u32>,
    /// Timestamp of the most recent retarget boundary block.
    retarget_timestamp: u32,
}

impl ChainState {
    /// The state of the genesis block.
    pub fn genesis(spec: &ChainSpec) -> Self {
        let header = &spec.genesis;
        Self {
            height: 0,
            hash: spec.genesis_hash(),
            version: header.version,
            timestamp: header.timestamp,
            bits: header.bits,
            flags: spec.fork_flags(0),
            minimum_block_version: spec.minimum_block_version(0),
            median_time_past: 0,
            timestamps: vec![header.timestamp],
            retarget_timestamp: header.timestamp,
        }
    }

    /// Derives the child state for `header` extending `parent`.
    pub fn from_parent(
        parent: &ChainState,
        header: &Header,
        spec: &ChainSpec,
    ) -> Result<Self, ChainStateError> {
        if header.previous_block_hash != parent.hash {
            return Err(ChainStateError::ParentMismatch {
                got: header.previous_block_hash,
                expected: parent.hash,
            });
        }

        let height = parent.height + 1;
        let mut timestamps = parent.timestamps.clone();
        timestamps.push(header.timestamp);
        if timestamps.len() > MTP_WINDOW {
            timestamps.remove(0);
        }
        let retarget_timestamp = if height % spec.pow.retarget_interval.max(1) == 0 {
            header.timestamp
        } else {
            parent.retarget_timestamp
        };

        Ok(Self {
            height,
            hash: header.hash_slow(),
            version: header.version,
            timestamp: header.timestamp,
            bits: header.bits,
            flags: spec.fork_flags(height),
            minimum_block_version: spec.minimum_block_version(height),
            median_time_past: parent.next_median_time_past(),
            timestamps,
            retarget_timestamp,
        })
    }

    /// Rebuilds the state of an archived header by walking parent links.
    pub fn from_store<S: StoreReader>(
        store: &S,
        spec: &ChainSpec,
        link: Link,
    ) -> Result<Self, ChainStateError> {
        let height = store.get_height(link)?;
        let header = store.get_header(link)?;

        // Walk back far enough for the parent's MTP window and the retarget
        // boundary: one extra entry past the window reproduces the parent's.
        let interval = spec.pow.retarget_interval.max(1);
        let boundary = height - height % interval;
        let mut collected = Vec::with_capacity(MTP_WINDOW + 1);
        let mut retarget_timestamp = None;
        let mut cursor = Some(link);
        let mut cursor_height = height;
        while let Some(current) = cursor {
            let timestamp = store.get_timestamp(current)?;
            if collected.len() <= MTP_WINDOW {
                collected.push(timestamp);
            }
            if cursor_height == boundary {
                retarget_timestamp = Some(timestamp);
            }
            if collected.len() > MTP_WINDOW && retarget_timestamp.is_some() {
                break;
            }
            cursor = store.to_parent(current);
            cursor_height = cursor_height.saturating_sub(1);
        }
        collected.reverse();

        // MTP of this block is the median over its parent's window.
        let median_time_past = if collected.len() > 1 {
            let parent_window = &collected[..collected.len() - 1];
            let start = parent_window.len().saturating_sub(MTP_WINDOW);
            median(&parent_window[start..])
        } else {
            0
        };
        let start = collected.len().saturating_sub(MTP_WINDOW);
        let timestamps = collected[start..].to_vec();

        Ok(Self {
            height,
            hash: header.hash(),
            version: header.version,
            timestamp: header.timestamp,
            bits: header.bits,
            flags: spec.fork_flags(height),
            minimum_block_version: spec.minimum_block_version(height),
            median_time_past,
            timestamps,
            retarget_timestamp: retarget_timestamp
                .ok_or(StoreError::Integrity("unreachable retarget boundary"))?,
        })
    }

    /// Height of this state.
    pub const fn height(&self) -> BlockNumber {
        self.height
    }

    /// Hash of the block this state describes.
    pub const fn hash(&self) -> BlockHash {
        self.hash
    }

    /// Compact target of the described block.
    pub const fn bits(&self) -> u32 {
        self.bits
    }

    /// Active fork flags at this height.
    pub const fn flags(&self) -> u32 {
        self.flags
    }

    /// Minimum acceptable block version at this height.
    pub const fn minimum_block_version(&self) -> u32 {
        self.minimum_block_version
    }

    /// Median time past governing this block's timestamp.
    pub const fn median_time_past(&self) -> u32 {
        self.median_time_past
    }

    /// Median time past a child of this block must exceed.
    pub fn next_median_time_past(&self) -> u32 {
        median(&self.timestamps)
    }

    /// Compact target required of a child of this block.
    pub fn work_required(&self, spec: &ChainSpec) -> u32 {
        if spec.pow.no_retargeting {
            return spec.pow.limit;
        }
        let next = self.height + 1;
        if next % spec.pow.retarget_interval.max(1) != 0 {
            return self.bits;
        }

        let target_timespan = spec.pow.retarget_timespan_secs;
        let actual = (self.timestamp.saturating_sub(self.retarget_timestamp))
            .clamp(target_timespan / 4, target_timespan.saturating_mul(4));

        let Some(old_target) = compact_to_target(self.bits) else { return spec.pow.limit };
        let limit = compact_to_target(spec.pow.limit).unwrap_or(U256::MAX);
        let adjusted = old_target
            .checked_mul(U256::from(actual))
            .map(|product| product / U256::from(target_timespan))
            .unwrap_or(limit);
        target_to_compact(adjusted.min(limit))
    }

    /// The validation context for this block.
    pub const fn context(&self) -> Context {
        Context {
            forks: self.flags,
            height: self.height,
            median_time_past: self.median_time_past,
            minimum_block_version: self.minimum_block_version,
        }
    }
}

/// Median of a non-empty timestamp window; zero for an empty one.
fn median(timestamps: &[u32]) -> u32 {
    if timestamps.is_empty() {
        return 0;
    }
    let mut sorted = timestamps.to_vec();
    sorted.sort_unstable();
    sorted[sorted.len() / 2]
}

/// Re-encodes a target as its compact form, rounding down.
fn target_to_compact(target: U256) -> u32 {
    if target.is_zero() {
        return 0;
    }
    let bits = 256 - target.leading_zeros();
    let mut exponent = bits.div_ceil(8);
    let mut mantissa: u32 = if exponent <= 3 {
        (target.to::<u64>() as u32) << (8 * (3 - exponent))
    } else {
        (target >> (8 * (exponent - 3))).to::<u64>() as u32
    };
    // Avoid setting the sign bit.
    if mantissa & 0x0080_0000 != 0 {
        mantissa >>= 8;
        exponent += 1;
    }
    ((exponent as u32) << 24) | (mantissa & 0x007f_ffff)
}
