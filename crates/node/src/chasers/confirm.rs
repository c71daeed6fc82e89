//! Walks validated candidates into the confirmed chain.

use crate::{
    chasers::Ctx,
    events::{Chase, ChaseEvent, EventValue},
    metrics::ConfirmMetrics,
};
use rbtc_network_api::Network;
use rbtc_primitives::{BlockNumber, U256};
use rbtc_storage_api::{BlockState, Link, Store, StoreError};
use tracing::{debug, info, warn};

/// Confirms validated candidate blocks by cumulative work.
///
/// Heights arrive out of order across reorganizations; each is treated
/// independently and only a fork stronger than the incumbent confirmed
/// chain advances it. A confirmation failure rolls the confirmed chain back
/// to its pre-call state.
#[derive(Debug, Default)]
pub(crate) struct ConfirmChaser {
    /// Heights at or under this are bypassed.
    bypass: BlockNumber,
    metrics: ConfirmMetrics,
}

impl ConfirmChaser {
    pub(crate) fn handle_event<S: Store, N: Network>(
        &mut self,
        ctx: &mut Ctx<'_, S, N>,
        event: &ChaseEvent,
    ) {
        if ctx.faulted() {
            return;
        }
        match event.chase {
            Chase::Valid => {
                if let Some(height) = event.value.height() {
                    self.do_validated(ctx, height);
                }
            }
            Chase::Blocks => {
                // The value is the branch point; everything above it up to
                // the candidate top is already block-validated.
                let top = ctx.store.get_top_candidate();
                self.do_validated(ctx, top);
            }
            Chase::Bypass => {
                if let Some(height) = event.value.height() {
                    self.bypass = height;
                }
            }
            _ => {}
        }
    }

    /// Considers the candidate fork ending at `height` for confirmation.
    fn do_validated<S: Store, N: Network>(&mut self, ctx: &mut Ctx<'_, S, N>, height: BlockNumber) {
        // Compute relative work of the candidate fork.
        let Some((fork, fork_work)) = self.get_fork_work(ctx, height) else { return };
        if fork.is_empty() {
            return;
        }
        let fork_point = height - fork.len() as BlockNumber;
        match self.is_strong(ctx, &fork_work, fork_point) {
            Some(true) => {}
            Some(false) => return,
            None => return,
        }

        // Reorganize the confirmed chain down to the fork point.
        let top = ctx.store.get_top_confirmed();
        if top < fork_point {
            return ctx.fault(StoreError::Integrity("fork point above confirmed top"));
        }
        let mut popped = Vec::new();
        for index in ((fork_point + 1)..=top).rev() {
            let Some(link) = ctx.store.to_confirmed(index) else {
                return ctx.fault(StoreError::Integrity("confirmed entry unreadable"));
            };
            if let Err(error) = self.set_reorganized(ctx, link, index) {
                return ctx.fault(error);
            }
            popped.push(link);
        }

        // Push the fork, validating each block against the store.
        let mut index = fork_point + 1;
        for link in fork.iter().rev().copied() {
            let state = match ctx.store.get_block_state(link) {
                Ok(state) => state,
                Err(error) => return ctx.fault(error),
            };
            if state == BlockState::Unconfirmable {
                ctx.notify(Chase::Unconfirmable, EventValue::Link(link));
                if let Err(error) = self.roll_back(ctx, &popped, fork_point, index - 1) {
                    return ctx.fault(error);
                }
                return;
            }

            let malleable = ctx.store.is_malleable64(link).unwrap_or(false);
            let already = state == BlockState::Confirmable;
            if already || (index <= self.bypass && !malleable) {
                if let Err(error) = self.set_organized(ctx, link, index) {
                    return ctx.fault(error);
                }
                index += 1;
                continue;
            }

            match ctx.store.block_confirmable(link) {
                Ok(fees) => {
                    if let Err(error) = ctx
                        .store
                        .set_block_confirmable(link, fees)
                        .and_then(|()| self.set_organized(ctx, link, index))
                    {
                        return ctx.fault(error);
                    }
                    index += 1;
                }
                Err(error) if error.is_fatal() => return ctx.fault(error),
                Err(error) => {
                    // Only malleable blocks reach here under bypass; their
                    // header identity may still be good, so disassociate
                    // rather than condemn.
                    if index <= self.bypass {
                        warn!(target: "node::confirm", height = index, %error, "malleated under bypass");
                        ctx.notify(Chase::Malleated, EventValue::Link(link));
                        return;
                    }
                    warn!(target: "node::confirm", height = index, %error, "block unconfirmable");
                    if let Err(error) = ctx.store.set_block_unconfirmable(link) {
                        return ctx.fault(error);
                    }
                    ctx.notify(Chase::Unconfirmable, EventValue::Link(link));
                    if let Err(error) = self.roll_back(ctx, &popped, fork_point, index - 1) {
                        return ctx.fault(error);
                    }
                    return;
                }
            }
        }
    }

    /// Walks the candidate chain down from `fork_top` to the first confirmed
    /// entry, collecting links and work. `None` stops the pass on fault.
    fn get_fork_work<S: Store, N: Network>(
        &self,
        ctx: &mut Ctx<'_, S, N>,
        fork_top: BlockNumber,
    ) -> Option<(Vec<Link>, U256)> {
        let mut fork = Vec::new();
        let mut work = U256::ZERO;
        let mut height = fork_top;
        loop {
            let Some(link) = ctx.store.to_candidate(height) else {
                // The reported height regressed out of the candidate chain;
                // the fork is simply no longer interesting.
                return Some((Vec::new(), U256::ZERO));
            };
            if ctx.store.is_confirmed_block(link) {
                return Some((fork, work));
            }
            match ctx.store.get_bits(link) {
                Ok(bits) => work += rbtc_primitives::proof(bits),
                Err(error) => {
                    ctx.fault(error);
                    return None;
                }
            }
            fork.push(link);
            height -= 1;
        }
    }

    /// True if the fork's work strictly exceeds the confirmed chain's over
    /// the same range. `None` stops the pass on fault.
    fn is_strong<S: Store, N: Network>(
        &self,
        ctx: &mut Ctx<'_, S, N>,
        fork_work: &U256,
        fork_point: BlockNumber,
    ) -> Option<bool> {
        let mut confirmed_work = U256::ZERO;
        for height in ((fork_point + 1)..=ctx.store.get_top_confirmed()).rev() {
            let bits = ctx
                .store
                .to_confirmed(height)
                .ok_or(StoreError::Integrity("confirmed walk"))
                .and_then(|link| ctx.store.get_bits(link));
            match bits {
                Ok(bits) => confirmed_work += rbtc_primitives::proof(bits),
                Err(error) => {
                    ctx.fault(error);
                    return None;
                }
            }
            if confirmed_work >= *fork_work {
                return Some(false);
            }
        }
        Some(true)
    }

    /// Confirms one link: strong, pushed, announced.
    fn set_organized<S: Store, N: Network>(
        &mut self,
        ctx: &mut Ctx<'_, S, N>,
        link: Link,
        height: BlockNumber,
    ) -> Result<(), StoreError> {
        ctx.store.set_strong(link)?;
        ctx.store.push_confirmed(link)?;
        ctx.notify(Chase::Confirmable, EventValue::Height(height));
        ctx.notify(Chase::Organized, EventValue::Link(link));
        self.metrics.confirmed.increment(1);
        self.metrics.confirmed_height.set(height as f64);
        info!(target: "node::confirm", height, "block confirmed and organized");
        Ok(())
    }

    /// Unconfirms one link: unstrong, popped, announced.
    fn set_reorganized<S: Store, N: Network>(
        &mut self,
        ctx: &mut Ctx<'_, S, N>,
        link: Link,
        height: BlockNumber,
    ) -> Result<(), StoreError> {
        ctx.store.set_unstrong(link)?;
        ctx.store.pop_confirmed()?;
        ctx.notify(Chase::Reorganized, EventValue::Link(link));
        self.metrics.reorganized.increment(1);
        debug!(target: "node::confirm", height, "block reorganized out");
        Ok(())
    }

    /// Restores the pre-call confirmed chain after a failed push.
    ///
    /// Unwinds the partial fork push from `top` down to the fork point,
    /// then replays the originally popped links in their original order.
    fn roll_back<S: Store, N: Network>(
        &mut self,
        ctx: &mut Ctx<'_, S, N>,
        popped: &[Link],
        fork_point: BlockNumber,
        top: BlockNumber,
    ) -> Result<(), StoreError> {
        self.metrics.rollbacks.increment(1);
        for height in ((fork_point + 1)..=top).rev() {
            let link = ctx
                .store
                .to_confirmed(height)
                .ok_or(StoreError::Integrity("rollback walk"))?;
            self.set_reorganized(ctx, link, height)?;
        }
        let mut height = fork_point;
        for link in popped.iter().rev() {
            height += 1;
            self.set_organized(ctx, *link, height)?;
        }
        Ok(())
    }
}
