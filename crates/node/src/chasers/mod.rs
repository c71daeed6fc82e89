//! The chasers: event-driven state machines sharing the node strand.
//!
//! Each chaser owns its mutable state exclusively and communicates with the
//! others only through chase events. All transitions run on the strand, so
//! no chaser state needs locking.

pub(crate) mod check;
pub(crate) mod confirm;
pub(crate) mod organize;
pub(crate) mod snapshot;
pub(crate) mod transaction;
pub(crate) mod validate;

use crate::{
    block_memory::BlockMemory,
    clock::Clock,
    events::{Chase, ChaseEvent, EventValue},
};
use rbtc_chainspec::{ChainSpec, NodeConfig};
use rbtc_network_api::{Network, SuspendReason};
use rbtc_storage_api::StoreError;
use std::collections::VecDeque;
use tracing::error;

/// Strand context handed to every chaser transition.
///
/// Carries the shared collaborators plus the event queue the strand drains
/// after the transition returns. Events pushed here are observed by every
/// chaser, in order, before any later event.
pub(crate) struct Ctx<'a, S, N> {
    pub(crate) store: &'a S,
    pub(crate) spec: &'a ChainSpec,
    pub(crate) config: &'a NodeConfig,
    pub(crate) network: &'a N,
    pub(crate) clock: &'a dyn Clock,
    pub(crate) memory: &'a BlockMemory,
    pub(crate) events: &'a mut VecDeque<ChaseEvent>,
    pub(crate) fault: &'a mut Option<StoreError>,
}

impl<S, N: Network> Ctx<'_, S, N> {
    /// Queues a chase event for strand dispatch.
    pub(crate) fn notify(&mut self, chase: Chase, value: EventValue) {
        self.events.push_back(ChaseEvent::new(chase, value));
    }

    /// Records a fatal fault: suspend ingress, flag the node.
    ///
    /// The strand keeps draining queued work but handlers see `faulted` and
    /// bail; recovery requires operator intervention.
    pub(crate) fn fault(&mut self, error: StoreError) {
        error!(target: "node", %error, "fatal fault, suspending node");
        self.network.suspend(SuspendReason::Fault);
        *self.fault = Some(error);
        self.notify(Chase::Suspend, EventValue::Reason(SuspendReason::Fault));
    }

    /// Handles a disk-full condition: suspend ingress and chase a snapshot.
    pub(crate) fn disk_full(&mut self) {
        self.network.suspend(SuspendReason::DiskFull);
        self.notify(Chase::Snapshot, EventValue::None);
        self.notify(Chase::Suspend, EventValue::Reason(SuspendReason::DiskFull));
    }

    /// Returns true if the node is faulted.
    pub(crate) fn faulted(&self) -> bool {
        self.fault.is_some()
    }

    /// Returns true if the timestamp is within the currency window.
    ///
    /// A disabled window makes everything current.
    pub(crate) fn is_current(&self, timestamp: u32) -> bool {
        match self.config.currency_window() {
            None => true,
            Some(window) => {
                let now = self.clock.unix_now();
                u64::from(timestamp) + window.as_secs() >= now
            }
        }
    }
}
