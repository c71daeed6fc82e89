use rbtc_primitives::{BlockHash, BlockNumber};
use serde::{Deserialize, Serialize};

/// A hard-coded `(height, hash)` identity constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Constrained height.
    pub height: BlockNumber,
    /// Required hash at that height.
    pub hash: BlockHash,
}

impl Checkpoint {
    /// Returns true if `hash` disagrees with a checkpoint at `height`.
    ///
    /// A height with no checkpoint never conflicts.
    pub fn is_conflict(
        checkpoints: &[Checkpoint],
        hash: &BlockHash,
        height: BlockNumber,
    ) -> bool {
        checkpoints
            .iter()
            .any(|checkpoint| checkpoint.height == height && &checkpoint.hash != hash)
    }

    /// Returns true if `height` is at or under the highest checkpoint.
    pub fn is_under(checkpoints: &[Checkpoint], height: BlockNumber) -> bool {
        checkpoints.iter().any(|checkpoint| height <= checkpoint.height)
    }
}
