use metrics::{counter, gauge, Counter, Gauge};

/// Organizer metrics.
#[derive(Debug)]
pub(crate) struct OrganizerMetrics {
    /// Candidates organized onto the chain.
    pub(crate) organized: Counter,
    /// Candidates reorganized out.
    pub(crate) reorganized: Counter,
    /// Disorganize passes taken.
    pub(crate) disorganized: Counter,
    /// Weak-branch tree entries held.
    pub(crate) tree_size: Gauge,
    /// Candidate chain height.
    pub(crate) candidate_height: Gauge,
}

impl Default for OrganizerMetrics {
    fn default() -> Self {
        Self {
            organized: counter!("node.candidates_organized"),
            reorganized: counter!("node.candidates_reorganized"),
            disorganized: counter!("node.disorganizations"),
            tree_size: gauge!("node.header_tree_entries"),
            candidate_height: gauge!("node.candidate_height"),
        }
    }
}

/// Confirm chaser metrics.
#[derive(Debug)]
pub(crate) struct ConfirmMetrics {
    /// Blocks confirmed.
    pub(crate) confirmed: Counter,
    /// Blocks reorganized out of the confirmed chain.
    pub(crate) reorganized: Counter,
    /// Rollbacks taken after confirmation failures.
    pub(crate) rollbacks: Counter,
    /// Confirmed chain height.
    pub(crate) confirmed_height: Gauge,
}

impl Default for ConfirmMetrics {
    fn default() -> Self {
        Self {
            confirmed: counter!("node.blocks_confirmed"),
            reorganized: counter!("node.blocks_reorganized"),
            rollbacks: counter!("node.confirm_rollbacks"),
            confirmed_height: gauge!("node.confirmed_height"),
        }
    }
}

/// Check chaser metrics.
#[derive(Debug)]
pub(crate) struct CheckMetrics {
    /// Bodies archived.
    pub(crate) checked: Counter,
    /// Bodies rejected by the structural check.
    pub(crate) unchecked: Counter,
    /// Heights awaiting download.
    pub(crate) pending: Gauge,
}

impl Default for CheckMetrics {
    fn default() -> Self {
        Self {
            checked: counter!("node.bodies_checked"),
            unchecked: counter!("node.bodies_unchecked"),
            pending: gauge!("node.downloads_pending"),
        }
    }
}

/// Snapshot chaser metrics.
#[derive(Debug)]
pub(crate) struct SnapshotMetrics {
    /// Snapshots completed.
    pub(crate) snapshots: Counter,
}

impl Default for SnapshotMetrics {
    fn default() -> Self {
        Self { snapshots: counter!("node.snapshots") }
    }
}
