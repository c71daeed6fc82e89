//! Relays confirmed-chain transitions to the transaction pool and peers.
//!
//! The mempool itself lives outside the core; this chaser is the
//! notification surface it and the template builder hang off of, and it
//! drives the network announcements for organized and reorganized blocks.

use crate::{
    chasers::Ctx,
    events::{Chase, ChaseEvent},
};
use rbtc_network_api::{Announcement, Network};
use rbtc_primitives::BlockNumber;
use rbtc_storage_api::Store;
use tracing::debug;

#[derive(Debug, Default)]
pub(crate) struct TransactionChaser {
    /// Top confirmed height observed, for template staleness decisions.
    top: BlockNumber,
}

impl TransactionChaser {
    pub(crate) fn handle_event<S: Store, N: Network>(
        &mut self,
        ctx: &mut Ctx<'_, S, N>,
        event: &ChaseEvent,
    ) {
        if ctx.faulted() {
            return;
        }
        match event.chase {
            Chase::Organized => {
                if let Some(link) = event.value.link() {
                    if let Ok(hash) = ctx.store.get_header_key(link) {
                        ctx.network.announce(Announcement::BlockOrganized(hash));
                    }
                }
            }
            Chase::Reorganized => {
                if let Some(link) = event.value.link() {
                    if let Ok(hash) = ctx.store.get_header_key(link) {
                        ctx.network.announce(Announcement::BlockReorganized(hash));
                    }
                }
            }
            Chase::Confirmable => {
                if let Some(height) = event.value.height() {
                    self.top = height;
                    debug!(target: "node::transaction", height, "template basis advanced");
                }
            }
            _ => {}
        }
    }

    /// The confirmed height the next block template builds on.
    pub(crate) fn template_height(&self) -> BlockNumber {
        self.top
    }
}
