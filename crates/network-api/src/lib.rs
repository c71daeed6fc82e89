//! Network traits consumed by the rbtc node.
//!
//! Peer handshake, wire framing and gossip are a separate stack's concern;
//! the chain core only needs to suspend and resume ingress, broadcast a few
//! outbound announcements and stop the service on shutdown.

use rbtc_primitives::BlockHash;

/// Reasons the node suspends or stops the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendReason {
    /// The store ran out of disk.
    DiskFull,
    /// A snapshot is being taken.
    Snapshot,
    /// The store faulted; operator intervention required.
    Fault,
}

/// Outbound announcements the chain core produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Announcement {
    /// A block was organized into the confirmed chain.
    BlockOrganized(BlockHash),
    /// A block was reorganized out of the confirmed chain.
    BlockReorganized(BlockHash),
}

/// The network surface the chain core drives.
#[auto_impl::auto_impl(&, Arc)]
pub trait Network: Send + Sync {
    /// Stops accepting and reading from peers.
    fn suspend(&self, reason: SuspendReason);

    /// Resumes peer ingress after a suspension.
    fn resume(&self);

    /// Broadcasts an announcement to connected peers.
    fn announce(&self, announcement: Announcement);

    /// Tears the service down.
    fn stop(&self);
}

/// A no-op network for tests and store-only runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNetwork;

impl Network for NoopNetwork {
    fn suspend(&self, reason: SuspendReason) {
        tracing::debug!(target: "net", ?reason, "suspend ignored by noop network");
    }

    fn resume(&self) {}

    fn announce(&self, _announcement: Announcement) {}

    fn stop(&self) {}
}
