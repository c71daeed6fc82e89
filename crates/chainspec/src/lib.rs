//! Consensus parameters, checkpoints and the milestone for the rbtc node.

use once_cell::sync::Lazy;
use rbtc_primitives::{BlockHash, BlockNumber, Header};
use serde::{Deserialize, Serialize};
use std::time::Duration;

mod checkpoint;
pub use checkpoint::Checkpoint;

/// The mainnet chain spec.
pub static MAINNET: Lazy<ChainSpec> = Lazy::new(|| {
    use hex_literal::hex;
    ChainSpec {
        name: "mainnet".into(),
        genesis: Header {
            version: 1,
            previous_block_hash: BlockHash::ZERO,
            merkle_root: BlockHash::new(hex!(
                "3ba3edfd7a7b12b27ac72c3e67768f617fc81bc3888a51323a9fb8aa4b1e5e4a"
            )),
            timestamp: 1231006505,
            bits: 0x1d00ffff,
            nonce: 2083236893,
        },
        checkpoints: vec![
            Checkpoint {
                height: 11111,
                hash: BlockHash::new(hex!(
                    "1d7c6eb2fd42f55925e92efad68b61edd22fba29fde8783df744e26900000000"
                )),
            },
            Checkpoint {
                height: 33333,
                hash: BlockHash::new(hex!(
                    "a6d0b5df7d0df069ceb1e736a216ad187a50b07aaa4e78748a58d52d00000000"
                )),
            },
            Checkpoint {
                height: 74000,
                hash: BlockHash::new(hex!(
                    "201a66b853f9e7814a820e2af5f5dc79c07144e31ce4c9a39339570000000000"
                )),
            },
        ],
        milestone: None,
        pow: PowParams {
            limit: 0x1d00ffff,
            target_spacing_secs: 600,
            retarget_interval: 2016,
            retarget_timespan_secs: 14 * 24 * 60 * 60,
            no_retargeting: false,
        },
        fork_heights: ForkHeights { bip34: 227931, bip66: 363725, bip65: 388381 },
        subsidy_interval_blocks: 210_000,
        initial_subsidy_sat: 50_0000_0000,
        timestamp_limit_seconds: 2 * 60 * 60,
    }
});

/// A development chain spec: trivial work, no retargeting, close forks.
pub static DEV: Lazy<ChainSpec> = Lazy::new(|| ChainSpec {
    name: "dev".into(),
    genesis: Header {
        version: 1,
        previous_block_hash: BlockHash::ZERO,
        merkle_root: BlockHash::ZERO,
        timestamp: 1296688602,
        bits: 0x207fffff,
        nonce: 2,
    },
    checkpoints: vec![],
    milestone: None,
    pow: PowParams {
        limit: 0x207fffff,
        target_spacing_secs: 600,
        retarget_interval: 2016,
        retarget_timespan_secs: 14 * 24 * 60 * 60,
        no_retargeting: true,
    },
    fork_heights: ForkHeights { bip34: 500, bip66: 1251, bip65: 1351 },
    subsidy_interval_blocks: 150,
    initial_subsidy_sat: 50_0000_0000,
    timestamp_limit_seconds: 2 * 60 * 60,
});

/// Consensus parameters for one chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSpec {
    /// Human readable chain name.
    pub name: String,
    /// The genesis header.
    pub genesis: Header,
    /// Hard checkpoints; candidate identity must match at these heights.
    pub checkpoints: Vec<Checkpoint>,
    /// Milestone under which full validation may be bypassed while on-chain.
    pub milestone: Option<Checkpoint>,
    /// Proof-of-work parameters.
    pub pow: PowParams,
    /// Soft fork activation heights.
    pub fork_heights: ForkHeights,
    /// Blocks between subsidy halvings.
    pub subsidy_interval_blocks: u64,
    /// Subsidy of the genesis era, in satoshis.
    pub initial_subsidy_sat: u64,
    /// How far a timestamp may run ahead of the wall clock.
    pub timestamp_limit_seconds: u32,
}

impl ChainSpec {
    /// The genesis block hash.
    pub fn genesis_hash(&self) -> BlockHash {
        self.genesis.hash_slow()
    }

    /// Height of the highest configured checkpoint, zero when none.
    pub fn top_checkpoint_height(&self) -> BlockNumber {
        self.checkpoints.iter().map(|checkpoint| checkpoint.height).max().unwrap_or_default()
    }

    /// Returns true if `hash` disagrees with a checkpoint at `height`.
    pub fn is_checkpoint_conflict(&self, hash: &BlockHash, height: BlockNumber) -> bool {
        Checkpoint::is_conflict(&self.checkpoints, hash, height)
    }

    /// Returns true if `height` is at or under the highest checkpoint.
    pub fn is_under_checkpoint(&self, height: BlockNumber) -> bool {
        height <= self.top_checkpoint_height()
    }

    /// Returns true if `height`/`hash` matches the configured milestone.
    pub fn is_milestone(&self, hash: &BlockHash, height: BlockNumber) -> bool {
        self.milestone
            .as_ref()
            .is_some_and(|milestone| milestone.height == height && &milestone.hash == hash)
    }

    /// Minimum acceptable block version at the given height.
    pub fn minimum_block_version(&self, height: BlockNumber) -> u32 {
        self.fork_heights.minimum_block_version(height)
    }

    /// Active fork rule flags at the given height.
    pub fn fork_flags(&self, height: BlockNumber) -> u32 {
        self.fork_heights.flags(height)
    }
}

/// Proof-of-work parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PowParams {
    /// Easiest permitted compact target.
    pub limit: u32,
    /// Seconds aimed between blocks.
    pub target_spacing_secs: u32,
    /// Blocks per retarget window.
    pub retarget_interval: u64,
    /// Seconds aimed per retarget window.
    pub retarget_timespan_secs: u32,
    /// Disables retargeting entirely (dev chains).
    pub no_retargeting: bool,
}

/// Soft fork activation heights.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ForkHeights {
    /// Coinbase height commitment.
    pub bip34: BlockNumber,
    /// Strict DER.
    pub bip66: BlockNumber,
    /// Checklocktimeverify.
    pub bip65: BlockNumber,
}

impl ForkHeights {
    /// Active fork flags at the given height.
    pub fn flags(&self, height: BlockNumber) -> u32 {
        use rbtc_primitives::forks;
        let mut flags = 0;
        if height >= self.bip34 {
            flags |= forks::BIP34;
        }
        if height >= self.bip66 {
            flags |= forks::BIP66;
        }
        if height >= self.bip65 {
            flags |= forks::BIP65;
        }
        flags
    }

    /// Version floor implied by the activated forks.
    pub fn minimum_block_version(&self, height: BlockNumber) -> u32 {
        if height >= self.bip65 {
            4
        } else if height >= self.bip66 {
            3
        } else if height >= self.bip34 {
            2
        } else {
            1
        }
    }
}

/// Node-local (non-consensus) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Organize headers first and download bodies, or organize whole blocks.
    pub headers_first: bool,
    /// Currency window; zero disables the check.
    pub currency_window_minutes: u32,
    /// Bound on outstanding body downloads per peer batch.
    pub maximum_concurrency: usize,
    /// Blocks between automatic snapshots; zero disables them.
    pub snapshot_interval_blocks: u64,
    /// Bytes per block arena.
    pub arena_bytes: usize,
    /// Worker threads served by the block arena.
    pub arena_workers: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            headers_first: true,
            currency_window_minutes: 60,
            maximum_concurrency: 5_000,
            snapshot_interval_blocks: 0,
            arena_bytes: 4 * 1024 * 1024,
            arena_workers: 4,
        }
    }
}

impl NodeConfig {
    /// The currency window as a duration, `None` when disabled.
    pub fn currency_window(&self) -> Option<Duration> {
        (self.currency_window_minutes != 0)
            .then(|| Duration::from_secs(u64::from(self.currency_window_minutes) * 60))
    }
}
