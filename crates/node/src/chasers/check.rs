//! Chases down block bodies for candidate headers.

use crate::{
    chasers::Ctx,
    error::OrganizeError,
    events::{Chase, ChaseEvent, EventValue},
    metrics::CheckMetrics,
};
use rbtc_network_api::Network;
use rbtc_primitives::{BlockError, BlockHash, BlockNumber, SealedBlock};
use rbtc_storage_api::{Store, StoreError};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// A batch of hashes handed to a peer for download.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadMap {
    entries: Vec<(BlockNumber, BlockHash)>,
}

impl DownloadMap {
    /// The batched `(height, hash)` pairs, ascending by height.
    pub fn entries(&self) -> &[(BlockNumber, BlockHash)] {
        &self.entries
    }

    /// Number of batched downloads.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Downloads bodies for candidate headers and archives them.
///
/// Maintains the set of candidate heights lacking bodies; peers draw
/// batches with `get_hashes` and return unfetched ones with `put_hashes`
/// when their channel closes. Arrived bodies are checked structurally,
/// archived, and announced with `Checked`.
#[derive(Debug, Default)]
pub(crate) struct CheckChaser {
    /// Heights awaiting download, not yet handed out.
    pending: BTreeMap<BlockNumber, BlockHash>,
    /// Heights handed out to peers.
    outstanding: BTreeMap<BlockNumber, BlockHash>,
    /// Highest candidate height already scanned for gaps.
    scanned: BlockNumber,
    metrics: CheckMetrics,
}

impl CheckChaser {
    pub(crate) fn handle_event<S: Store, N: Network>(
        &mut self,
        ctx: &mut Ctx<'_, S, N>,
        event: &ChaseEvent,
    ) {
        if ctx.faulted() {
            return;
        }
        match event.chase {
            Chase::Start => {
                let fork = ctx.store.get_fork();
                self.refill(ctx, fork);
            }
            Chase::Header | Chase::Bump => {
                if let Some(height) = event.value.height() {
                    self.refill(ctx, height);
                }
            }
            Chase::Regressed | Chase::Disorganized => {
                if let Some(branch_point) = event.value.height() {
                    self.truncate(branch_point);
                }
            }
            _ => {}
        }
    }

    /// Hands out a batch of up to `max` downloads.
    pub(crate) fn get_hashes(&mut self, max: usize) -> DownloadMap {
        let mut entries = Vec::new();
        while entries.len() < max {
            let Some((height, hash)) = self.pending.pop_first() else { break };
            self.outstanding.insert(height, hash);
            entries.push((height, hash));
        }
        self.update_gauge();
        DownloadMap { entries }
    }

    /// Returns unfetched downloads from a closed peer channel.
    pub(crate) fn put_hashes(&mut self, map: DownloadMap) {
        for (height, hash) in map.entries {
            if self.outstanding.remove(&height).is_some() {
                self.pending.insert(height, hash);
            }
        }
        self.update_gauge();
    }

    /// Accepts an arrived body, archives it, and chases validation.
    pub(crate) fn put_block<S: Store, N: Network>(
        &mut self,
        ctx: &mut Ctx<'_, S, N>,
        block: SealedBlock,
    ) -> Result<BlockNumber, OrganizeError> {
        let hash = block.hash();
        let Some(link) = ctx.store.to_header(&hash) else {
            return Err(OrganizeError::Orphan);
        };
        if ctx.store.get_block_state(link)?.has_body() {
            return Err(OrganizeError::Duplicate);
        }

        // Stage the body in this worker's arena while it is inspected.
        let arena = ctx.memory.get_arena()?;
        let size = block.transactions.iter().map(|tx| tx.serialized_size()).sum::<usize>();
        let _staged = match arena.allocate(size, 16) {
            Ok(buffer) => buffer,
            Err(_) => {
                // Strand-local allocations are all released; reclaim and retry.
                arena.reset();
                arena.allocate(size, 16)?
            }
        };
        let _retainer = arena.retainer();

        // A body that does not hash to the header's commitment is peer
        // garbage; the height stays mapped for re-download.
        let computed =
            rbtc_primitives::proofs::calculate_transaction_root(&block.transactions);
        if computed != block.header.merkle_root {
            warn!(target: "node::check", height = ?self.height_of(ctx, link), "merkle mismatch from peer");
            return Err(OrganizeError::Block(BlockError::MerkleMismatch {
                header: block.header.merkle_root,
                computed,
            }));
        }

        // The body is identity-bound to the header; a structural failure is
        // the block's own.
        if let Err(error) = block.check() {
            self.metrics.unchecked.increment(1);
            ctx.store.set_block_unconfirmable(link)?;
            ctx.notify(Chase::Unchecked, EventValue::Link(link));
            return Err(error.into());
        }

        let height = ctx.store.get_height(link)?;
        match ctx.store.set_associated(link, block.transactions) {
            Ok(()) => {}
            Err(StoreError::DiskFull) => {
                // Keep the height mapped; the download retries after the
                // snapshot reclaims space.
                ctx.disk_full();
                return Err(OrganizeError::Store(StoreError::DiskFull));
            }
            Err(error) => return Err(error.into()),
        }

        self.pending.remove(&height);
        self.outstanding.remove(&height);
        self.update_gauge();
        self.metrics.checked.increment(1);
        debug!(target: "node::check", height, "body archived");

        if ctx.store.is_candidate_header(link) {
            ctx.notify(Chase::Checked, EventValue::Height(height));
        }
        Ok(height)
    }

    /// Number of heights currently mapped for download.
    pub(crate) fn mapped(&self) -> usize {
        self.pending.len() + self.outstanding.len()
    }

    /// Scans candidate headers above `from` for missing bodies.
    fn refill<S: Store, N: Network>(&mut self, ctx: &mut Ctx<'_, S, N>, from: BlockNumber) {
        if from < self.scanned {
            // A reorganization rewrote this range; rescan it.
            self.scanned = from;
        }
        let top = ctx.store.get_top_candidate();
        let mut height = self.scanned.max(from) + 1;
        while height <= top && self.mapped() < ctx.config.maximum_concurrency {
            let Some(link) = ctx.store.to_candidate(height) else { break };
            let unassociated = matches!(
                ctx.store.get_block_state(link),
                Ok(rbtc_storage_api::BlockState::Unassociated)
            );
            if unassociated && !self.outstanding.contains_key(&height) {
                match ctx.store.get_header_key(link) {
                    Ok(hash) => {
                        self.pending.insert(height, hash);
                    }
                    Err(error) => return ctx.fault(error),
                }
            }
            self.scanned = height;
            height += 1;
        }
        self.update_gauge();
    }

    /// Drops mapped downloads above a regression point.
    fn truncate(&mut self, branch_point: BlockNumber) {
        self.pending.retain(|height, _| *height <= branch_point);
        self.outstanding.retain(|height, _| *height <= branch_point);
        self.scanned = self.scanned.min(branch_point);
        self.update_gauge();
    }

    fn height_of<S: Store, N>(&self, ctx: &Ctx<'_, S, N>, link: rbtc_storage_api::Link) -> Option<BlockNumber> {
        ctx.store.get_height(link).ok()
    }

    fn update_gauge(&self) {
        self.metrics.pending.set(self.mapped() as f64);
    }
}
