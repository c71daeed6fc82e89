//! Handles disk-full recovery, periodic snapshots and suspension.

use crate::{
    chasers::Ctx,
    events::{Chase, ChaseEvent},
    metrics::SnapshotMetrics,
};
use rbtc_network_api::Network;
use rbtc_primitives::BlockNumber;
use rbtc_storage_api::{SnapshotEvent, Store, StoreError};
use tracing::{debug, info, warn};

/// Takes store snapshots on demand and by height interval.
///
/// On `Snapshot` (fired by disk-full handling or an operator) it compacts
/// the store and resumes network ingress when space came back. A hard
/// snapshot fault leaves the node suspended.
#[derive(Debug, Default)]
pub(crate) struct SnapshotChaser {
    /// Confirmed height at the last snapshot.
    last_snapshot: BlockNumber,
    metrics: SnapshotMetrics,
}

impl SnapshotChaser {
    pub(crate) fn handle_event<S: Store, N: Network>(
        &mut self,
        ctx: &mut Ctx<'_, S, N>,
        event: &ChaseEvent,
    ) {
        if ctx.faulted() {
            return;
        }
        match event.chase {
            Chase::Snapshot => self.do_snapshot(ctx),
            Chase::Confirmable => {
                let interval = ctx.config.snapshot_interval_blocks;
                if interval == 0 {
                    return;
                }
                if let Some(height) = event.value.height() {
                    if height.saturating_sub(self.last_snapshot) >= interval {
                        self.last_snapshot = height;
                        self.do_snapshot(ctx);
                    }
                }
            }
            Chase::Suspend => {
                debug!(target: "node::snapshot", "network ingress suspended");
            }
            _ => {}
        }
    }

    fn do_snapshot<S: Store, N: Network>(&mut self, ctx: &mut Ctx<'_, S, N>) {
        if ctx.store.is_fault() {
            warn!(target: "node::snapshot", "store faulted, snapshot refused");
            return;
        }

        let result = ctx.store.snapshot(&mut |event| match event {
            SnapshotEvent::Begin => debug!(target: "node::snapshot", "snapshot started"),
            SnapshotEvent::TableCompacted { table } => {
                debug!(target: "node::snapshot", table, "table compacted");
            }
            SnapshotEvent::Complete => debug!(target: "node::snapshot", "snapshot complete"),
        });

        match result {
            Ok(()) => {
                self.metrics.snapshots.increment(1);
                // Transient block memory is safe to reclaim wholesale here;
                // the strand holds no retainers across events.
                ctx.memory.reset_all();
                if ctx.store.is_full() {
                    warn!(target: "node::snapshot", "store still full after snapshot");
                    return;
                }
                info!(target: "node::snapshot", "snapshot reclaimed space, resuming network");
                ctx.network.resume();
            }
            Err(error) if error.is_fatal() => ctx.fault(error),
            Err(error) => {
                warn!(target: "node::snapshot", %error, "snapshot failed, node stays suspended");
                ctx.fault(StoreError::Integrity("snapshot failed"));
            }
        }
    }
}
