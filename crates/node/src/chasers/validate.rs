//! Validates downloaded blocks against their chain state context.

use crate::{
    chasers::Ctx,
    events::{Chase, ChaseEvent, EventValue},
};
use rbtc_chain_state::ChainState;
use rbtc_network_api::Network;
use rbtc_primitives::BlockNumber;
use rbtc_storage_api::{BlockState, Store, StoreError};
use std::cmp::min;
use tracing::{debug, warn};

/// Walks checked candidate blocks upward, validating each in height order.
///
/// Emits `Valid` per passing height and `Unvalid` with the failing header
/// link otherwise; the organizer answers the latter with a disorganize.
/// Heights at or under the bypass skip contextual validation entirely, the
/// structural check having run on arrival.
#[derive(Debug, Default)]
pub(crate) struct ValidateChaser {
    /// Next height to validate.
    position: BlockNumber,
    /// Heights at or under this are bypassed.
    bypass: BlockNumber,
}

impl ValidateChaser {
    pub(crate) fn handle_event<S: Store, N: Network>(
        &mut self,
        ctx: &mut Ctx<'_, S, N>,
        event: &ChaseEvent,
    ) {
        // Blocks-first validates inline in the organizer.
        if ctx.faulted() || !ctx.config.headers_first {
            return;
        }
        match event.chase {
            Chase::Start => {
                self.position = ctx.store.get_fork() + 1;
                self.drain(ctx);
            }
            Chase::Checked | Chase::Bump => self.drain(ctx),
            Chase::Bypass => {
                if let Some(height) = event.value.height() {
                    self.bypass = height;
                    self.drain(ctx);
                }
            }
            Chase::Regressed | Chase::Disorganized => {
                if let Some(branch_point) = event.value.height() {
                    self.position = min(self.position, branch_point + 1);
                }
            }
            _ => {}
        }
    }

    /// Validates forward from the current position until a gap.
    fn drain<S: Store, N: Network>(&mut self, ctx: &mut Ctx<'_, S, N>) {
        loop {
            let height = self.position;
            if height > ctx.store.get_top_candidate() {
                return;
            }
            let Some(link) = ctx.store.to_candidate(height) else { return };
            let state = match ctx.store.get_block_state(link) {
                Ok(state) => state,
                Err(error) => return ctx.fault(error),
            };
            match state {
                // Await the body download.
                BlockState::Unassociated => return,
                // Known bad on the candidate chain; chase a disorganize.
                BlockState::Unconfirmable => {
                    ctx.notify(Chase::Unvalid, EventValue::Link(link));
                    return;
                }
                // Validated on a prior pass.
                BlockState::Confirmable => {
                    ctx.notify(Chase::Valid, EventValue::Height(height));
                }
                BlockState::Associated => {
                    if height <= self.bypass {
                        debug!(target: "node::validate", height, "validation bypassed");
                        ctx.notify(Chase::Valid, EventValue::Height(height));
                    } else if !self.validate_one(ctx, link, height) {
                        return;
                    }
                }
            }
            self.position = height + 1;
        }
    }

    /// Full contextual validation of one block. Returns false to stop the
    /// walk (failure or fault).
    fn validate_one<S: Store, N: Network>(
        &mut self,
        ctx: &mut Ctx<'_, S, N>,
        link: rbtc_storage_api::Link,
        height: BlockNumber,
    ) -> bool {
        let block = match ctx.store.get_block(link) {
            Ok(Some(block)) => block,
            Ok(None) => {
                ctx.fault(StoreError::Integrity("associated block without body"));
                return false;
            }
            Err(error) => {
                ctx.fault(error);
                return false;
            }
        };
        let state = match ChainState::from_store(ctx.store, ctx.spec, link) {
            Ok(state) => state,
            Err(_) => {
                ctx.fault(StoreError::Integrity("candidate state unreadable"));
                return false;
            }
        };
        let context = state.context();

        let mut block = block;
        block.populate();
        let populated = ctx.store.populate(&mut block.transactions);

        let result = if !populated {
            Err(())
        } else {
            block
                .check_with_context(&context)
                .and_then(|()| {
                    block.accept(
                        &context,
                        ctx.spec.subsidy_interval_blocks,
                        ctx.spec.initial_subsidy_sat,
                    )
                })
                .and_then(|()| block.connect(&context))
                .map_err(|error| {
                    warn!(target: "node::validate", height, %error, "block failed validation");
                })
        };

        match result {
            Ok(()) => {
                debug!(target: "node::validate", height, "block validated");
                ctx.notify(Chase::Valid, EventValue::Height(height));
                true
            }
            Err(()) => {
                if let Err(error) = ctx.store.set_block_unconfirmable(link) {
                    ctx.fault(error);
                    return false;
                }
                ctx.notify(Chase::Unvalid, EventValue::Link(link));
                false
            }
        }
    }
}
