//! The generic chain organizer behind the headers-first and blocks-first
//! chasers.
//!
//! `organize` accepts a candidate, places it into the header tree or the
//! candidate chain by cumulative work, and reorganizes the candidate chain
//! when a branch proves stronger. `do_disorganize` unwinds the candidate
//! chain when a lower chaser reports a failed block.

use crate::{
    chasers::Ctx,
    error::OrganizeError,
    events::{Chase, ChaseEvent, EventValue},
    metrics::OrganizerMetrics,
};
use rbtc_chain_state::ChainState;
use rbtc_network_api::Network;
use rbtc_primitives::{
    BlockHash, BlockNumber, Context, HeaderError, SealedBlock, SealedHeader, U256,
};
use rbtc_storage_api::{BlockState, Link, Store, StoreError, StoreResult};
use std::{collections::HashMap, marker::PhantomData, sync::Arc};
use tracing::{debug, info, warn};

/// A weak-branch entry: the candidate and its derived chain state.
#[derive(Debug)]
pub(crate) struct TreeEntry<I> {
    pub(crate) input: I,
    pub(crate) state: Arc<ChainState>,
}

/// The capability the organizer needs from a header or a block.
pub(crate) trait OrganizeMode: Send + Sized + 'static {
    /// What peers submit: a sealed header or a sealed block.
    type Input: Clone + std::fmt::Debug + Send;

    /// True for the blocks-first variant.
    const BLOCK_MODE: bool;

    /// The header of the input.
    fn header(input: &Self::Input) -> &SealedHeader;

    /// Reads an archived input back, for moving candidates into the tree.
    fn read<S: Store>(store: &S, link: Link) -> StoreResult<Self::Input>;

    /// Archives the input under the given context.
    fn archive<S: Store>(store: &S, input: &Self::Input, context: Context) -> StoreResult<Link>;

    /// Mode-specific validation against the derived chain state.
    fn validate<S: Store, N: Network>(
        input: &Self::Input,
        parent: &ChainState,
        state: &ChainState,
        tree: &HashMap<BlockHash, TreeEntry<Self::Input>>,
        bypass_height: BlockNumber,
        ctx: &Ctx<'_, S, N>,
    ) -> Result<(), OrganizeError>;

    /// Whether the input may be written to the store at this point.
    fn is_storable<S: Store, N: Network>(
        input: &Self::Input,
        state: &ChainState,
        bypass_height: BlockNumber,
        ctx: &Ctx<'_, S, N>,
    ) -> bool;
}

/// Branch summary produced by the work walk.
struct BranchWork {
    work: U256,
    branch_point: BlockNumber,
    /// Tree residents of the branch, child first.
    tree_branch: Vec<BlockHash>,
    /// Store residents of the branch, child first.
    store_branch: Vec<Link>,
}

/// The chain organizer for one mode.
#[derive(Debug)]
pub(crate) struct Organizer<M: OrganizeMode> {
    /// Weak branches: known candidates not on the candidate chain.
    tree: HashMap<BlockHash, TreeEntry<M::Input>>,
    /// Chain state at the candidate tip.
    state: Option<Arc<ChainState>>,
    /// Highest milestone-certified height on the candidate chain.
    active_milestone: BlockNumber,
    metrics: OrganizerMetrics,
    _mode: PhantomData<M>,
}

impl<M: OrganizeMode> Default for Organizer<M> {
    fn default() -> Self {
        Self {
            tree: HashMap::new(),
            state: None,
            active_milestone: 0,
            metrics: OrganizerMetrics::default(),
            _mode: PhantomData,
        }
    }
}

impl<M: OrganizeMode> Organizer<M> {
    /// Initializes the top state cache and milestone from the store.
    pub(crate) fn start<S: Store, N: Network>(
        &mut self,
        ctx: &mut Ctx<'_, S, N>,
    ) -> Result<(), StoreError> {
        let top = ctx.store.get_top_candidate();
        let link = ctx
            .store
            .to_candidate(top)
            .ok_or(StoreError::Integrity("candidate tip unreadable"))?;
        self.state = Some(Arc::new(ChainState::from_store(ctx.store, ctx.spec, link)
            .map_err(|_| StoreError::Integrity("candidate tip state unreadable"))?));

        if let Some(milestone) = &ctx.spec.milestone {
            let on_chain = ctx
                .store
                .to_candidate(milestone.height)
                .and_then(|link| ctx.store.get_header_key(link).ok())
                .is_some_and(|hash| hash == milestone.hash);
            if on_chain {
                self.active_milestone = milestone.height;
            }
        }
        ctx.notify(Chase::Bypass, EventValue::Height(self.bypass_height(ctx)));
        Ok(())
    }

    /// Reacts to failure reports from the lower chasers.
    pub(crate) fn handle_event<S: Store, N: Network>(
        &mut self,
        ctx: &mut Ctx<'_, S, N>,
        event: &ChaseEvent,
    ) {
        if ctx.faulted() {
            return;
        }
        match event.chase {
            Chase::Unchecked | Chase::Unvalid | Chase::Unconfirmable => {
                if let Some(link) = event.value.link() {
                    self.do_disorganize(ctx, link);
                }
            }
            Chase::Malleated => {
                if let Some(link) = event.value.link() {
                    self.do_malleated(ctx, link);
                }
            }
            _ => {}
        }
    }

    /// Organizes a submitted header or block.
    pub(crate) fn organize<S: Store, N: Network>(
        &mut self,
        ctx: &mut Ctx<'_, S, N>,
        input: M::Input,
    ) -> Result<BlockNumber, OrganizeError> {
        let header = M::header(&input).clone();
        let hash = header.hash();

        // Dedupe against the tree and the archive.
        if self.tree.contains_key(&hash) {
            return Err(OrganizeError::Duplicate);
        }
        if let Some(link) = ctx.store.to_header(&hash) {
            let state = ctx.store.get_block_state(link)?;
            if state == BlockState::Unconfirmable {
                return Err(OrganizeError::Unconfirmable);
            }
            if !M::BLOCK_MODE || state != BlockState::Unassociated {
                return Err(OrganizeError::Duplicate);
            }
        }

        // Locate the parent and roll the chain state forward.
        let Some(parent) = self.get_chain_state(ctx, &header.previous_block_hash) else {
            return Err(OrganizeError::Orphan);
        };
        let state = ChainState::from_parent(&parent, &header, ctx.spec)
            .map_err(|_| OrganizeError::Orphan)?;
        let height = state.height();
        self.log_transitions(&parent, &state, "organize");

        // Checkpoints are chain identity, not block validity.
        if ctx.spec.is_checkpoint_conflict(&hash, height) {
            return Err(OrganizeError::CheckpointConflict { height });
        }

        let bypass = self.bypass_height(ctx);
        M::validate(&input, &parent, &state, &self.tree, bypass, ctx)?;

        // Not yet storable: new top of a weak branch.
        let state = Arc::new(state);
        if !M::is_storable(&input, &state, bypass, ctx) {
            self.cache(input, state);
            return Ok(height);
        }

        let branch = self.get_branch_work(ctx, &header)?;
        if !self.is_strong(ctx, &branch)? {
            // Ties are not strong; the candidate chain stands.
            self.cache(input, state);
            return Ok(height);
        }

        self.reorganize(ctx, input, state, &branch)?;
        self.metrics.organized.increment(1);
        Ok(height)
    }

    /// Unwinds the candidate chain after a block failure at `link`.
    ///
    /// Candidates above the store's fork point move into the tree (forward,
    /// so their chain states derive), the candidate chain pops to the fork
    /// point and the confirmed chain above it is re-pushed, so the candidate
    /// never falls below confirmed.
    pub(crate) fn do_disorganize<S: Store, N: Network>(
        &mut self,
        ctx: &mut Ctx<'_, S, N>,
        link: Link,
    ) {
        // Already reorganized out; if it becomes candidate again its
        // unconfirmable state is handled on sight.
        if !ctx.store.is_candidate_header(link) {
            return;
        }
        let height = match ctx.store.get_height(link) {
            Ok(height) if height > 0 => height,
            Ok(_) => return ctx.fault(StoreError::Integrity("genesis cannot disorganize")),
            Err(error) => return ctx.fault(error),
        };
        let fork_point = ctx.store.get_fork();
        if height <= fork_point {
            return ctx.fault(StoreError::Integrity("failed block at or under fork point"));
        }

        let top_candidate = ctx.store.get_top_candidate();
        let previous = self.state.clone();

        // Copy candidates above the fork point into the tree.
        let mut state = match self.state_at_candidate(ctx, fork_point) {
            Ok(state) => state,
            Err(error) => return ctx.fault(error),
        };
        for index in (fork_point + 1)..=top_candidate {
            let entry = ctx
                .store
                .to_candidate(index)
                .ok_or(StoreError::Integrity("candidate entry unreadable"))
                .and_then(|link| M::read(ctx.store, link));
            let input = match entry {
                Ok(input) => input,
                Err(error) => return ctx.fault(error),
            };
            state = match ChainState::from_parent(&state, M::header(&input), ctx.spec) {
                Ok(derived) => Arc::new(derived),
                Err(_) => return ctx.fault(StoreError::Integrity("candidate chain broken")),
            };
            self.cache(input, state.clone());
        }

        // Pop candidates to the fork point.
        for index in ((fork_point + 1)..=top_candidate).rev() {
            debug!(target: "node::organize", height = index, "deorganizing candidate");
            if let Err(error) = ctx.store.pop_candidate() {
                return ctx.fault(error);
            }
        }

        // Keep the candidate chain at or above confirmed.
        let top_confirmed = ctx.store.get_top_confirmed();
        for index in (fork_point + 1)..=top_confirmed {
            let result = ctx
                .store
                .to_confirmed(index)
                .ok_or(StoreError::Integrity("confirmed entry unreadable"))
                .and_then(|link| ctx.store.push_candidate(link));
            if let Err(error) = result {
                return ctx.fault(error);
            }
        }

        // Reset the top state cache and milestone.
        let tip = ctx.store.get_top_candidate();
        self.state = match self.state_at_candidate(ctx, tip) {
            Ok(state) => Some(state),
            Err(error) => return ctx.fault(error),
        };
        if let (Some(previous), Some(current)) = (previous, self.state.as_ref()) {
            self.log_transitions(&previous, current, "disorganize");
        }
        if self.active_milestone > fork_point {
            self.active_milestone = 0;
            let bypass = self.bypass_height(ctx);
            ctx.notify(Chase::Bypass, EventValue::Height(bypass));
        }

        self.metrics.disorganized.increment(1);
        ctx.notify(Chase::Disorganized, EventValue::Height(fork_point));
    }

    /// Recovers from a malleated body: disassociate and chase a re-download.
    ///
    /// The header identity may still be valid with a different transaction
    /// set, so the block must not be marked unconfirmable.
    fn do_malleated<S: Store, N: Network>(&mut self, ctx: &mut Ctx<'_, S, N>, link: Link) {
        warn!(target: "node::organize", %link, "malleated body, disassociating");
        if let Err(error) = ctx.store.set_disassociated(link) {
            return ctx.fault(error);
        }
        if ctx.store.is_candidate_header(link) {
            match ctx.store.get_height(link) {
                Ok(height) => {
                    ctx.notify(Chase::Header, EventValue::Height(height.saturating_sub(1)));
                }
                Err(error) => ctx.fault(error),
            }
        }
    }

    /// Heights at or under this bypass full validation.
    pub(crate) fn bypass_height<S, N>(&self, ctx: &Ctx<'_, S, N>) -> BlockNumber {
        ctx.spec.top_checkpoint_height().max(self.active_milestone)
    }

    /// Chain state lookup: top cache, then tree, then store.
    fn get_chain_state<S: Store, N: Network>(
        &self,
        ctx: &Ctx<'_, S, N>,
        hash: &BlockHash,
    ) -> Option<Arc<ChainState>> {
        if let Some(state) = &self.state {
            if state.hash() == *hash {
                return Some(state.clone());
            }
        }
        if let Some(entry) = self.tree.get(hash) {
            return Some(entry.state.clone());
        }
        let link = ctx.store.to_header(hash)?;
        ChainState::from_store(ctx.store, ctx.spec, link).ok().map(Arc::new)
    }

    fn state_at_candidate<S: Store, N: Network>(
        &self,
        ctx: &Ctx<'_, S, N>,
        height: BlockNumber,
    ) -> Result<Arc<ChainState>, StoreError> {
        let link = ctx
            .store
            .to_candidate(height)
            .ok_or(StoreError::Integrity("candidate height unreadable"))?;
        ChainState::from_store(ctx.store, ctx.spec, link)
            .map(Arc::new)
            .map_err(|_| StoreError::Integrity("candidate state unreadable"))
    }

    fn cache(&mut self, input: M::Input, state: Arc<ChainState>) {
        let hash = M::header(&input).hash();
        self.tree.insert(hash, TreeEntry { input, state });
        self.metrics.tree_size.set(self.tree.len() as f64);
    }

    /// Sums branch work from the header back to the candidate chain.
    ///
    /// Walks the tree first, then store-archived headers, collecting the
    /// ordered branch identifiers for a subsequent reorganization. The
    /// walk's terminal candidate header is the branch point.
    fn get_branch_work<S: Store, N: Network>(
        &self,
        ctx: &Ctx<'_, S, N>,
        header: &SealedHeader,
    ) -> Result<BranchWork, OrganizeError> {
        let mut work = header.proof();
        let mut tree_branch = Vec::new();
        let mut store_branch = Vec::new();

        let mut previous = header.previous_block_hash;
        while let Some(entry) = self.tree.get(&previous) {
            let entry_header = M::header(&entry.input);
            tree_branch.push(entry_header.hash());
            work += entry_header.proof();
            previous = entry_header.previous_block_hash;
        }

        let mut link = ctx
            .store
            .to_header(&previous)
            .ok_or_else(|| integrity("branch point unreachable"))?;
        while !ctx.store.is_candidate_header(link) {
            let bits =
                ctx.store.get_bits(link).map_err(|_| integrity("branch bits"))?;
            store_branch.push(link);
            work += rbtc_primitives::proof(bits);
            link = ctx
                .store
                .to_parent(link)
                .ok_or_else(|| integrity("branch parent unreachable"))?;
        }

        let branch_point = ctx
            .store
            .get_height(link)
            .map_err(|_| integrity("branch point height"))?;
        Ok(BranchWork { work, branch_point, tree_branch, store_branch })
    }

    /// A branch reorganizes only if it is strictly stronger than the
    /// candidate chain over the same range.
    fn is_strong<S: Store, N: Network>(
        &self,
        ctx: &Ctx<'_, S, N>,
        branch: &BranchWork,
    ) -> Result<bool, OrganizeError> {
        let mut candidate_work = U256::ZERO;
        let top = ctx.store.get_top_candidate();
        for height in ((branch.branch_point + 1)..=top).rev() {
            let bits = ctx
                .store
                .to_candidate(height)
                .ok_or_else(|| integrity("candidate walk"))
                .and_then(|link| {
                    ctx.store.get_bits(link).map_err(|_| integrity("candidate bits"))
                })?;
            candidate_work += rbtc_primitives::proof(bits);
            if candidate_work >= branch.work {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Replaces the candidate chain above the branch point with the branch.
    fn reorganize<S: Store, N: Network>(
        &mut self,
        ctx: &mut Ctx<'_, S, N>,
        input: M::Input,
        state: Arc<ChainState>,
        branch: &BranchWork,
    ) -> Result<(), OrganizeError> {
        let header = M::header(&input).clone();
        let top = ctx.store.get_top_candidate();
        if top < branch.branch_point {
            return Err(integrity("branch point above candidate top"));
        }

        // Pop the candidate chain down to the branch point.
        for height in ((branch.branch_point + 1)..=top).rev() {
            ctx.store.pop_candidate().map_err(|_| integrity("pop candidate"))?;
            debug!(target: "node::organize", height, "candidate reorganized out");
            self.metrics.reorganized.increment(1);
        }
        let mut milestone_changed = false;
        if self.active_milestone > branch.branch_point {
            self.active_milestone = 0;
            milestone_changed = true;
        }

        // Push stored branch headers back onto the candidate chain.
        for link in branch.store_branch.iter().rev() {
            ctx.store.push_candidate(*link).map_err(|_| integrity("push stored"))?;
            let hash = ctx
                .store
                .get_header_key(*link)
                .map_err(|_| integrity("stored key"))?;
            let height = ctx
                .store
                .get_height(*link)
                .map_err(|_| integrity("stored height"))?;
            milestone_changed |= self.update_milestone(ctx, &hash, height);
        }

        // Move tree branch entries into the store and onto the chain.
        for hash in branch.tree_branch.iter().rev() {
            let entry = self
                .tree
                .remove(hash)
                .ok_or_else(|| integrity("tree branch entry missing"))?;
            let link = M::archive(ctx.store, &entry.input, entry.state.context())
                .map_err(|_| integrity("archive tree entry"))?;
            ctx.store.push_candidate(link).map_err(|_| integrity("push tree"))?;
            milestone_changed |= self.update_milestone(ctx, hash, entry.state.height());
        }
        self.metrics.tree_size.set(self.tree.len() as f64);

        // Push the new candidate as the top.
        let link = match M::archive(ctx.store, &input, state.context()) {
            Ok(link) => link,
            Err(StoreError::DiskFull)
                if branch.branch_point == top &&
                    branch.tree_branch.is_empty() &&
                    branch.store_branch.is_empty() =>
            {
                // Nothing was unwound; surface the condition and recover.
                ctx.disk_full();
                return Err(OrganizeError::Store(StoreError::DiskFull));
            }
            Err(_) => return Err(integrity("archive candidate")),
        };
        ctx.store.push_candidate(link).map_err(|_| integrity("push candidate"))?;
        milestone_changed |= self.update_milestone(ctx, &header.hash(), state.height());

        // Notify the downstream chasers.
        let new_top = state.height();
        if M::BLOCK_MODE || ctx.is_current(header.timestamp) {
            ctx.notify(Chase::Bump, EventValue::Height(branch.branch_point + 1));
            let chase = if M::BLOCK_MODE { Chase::Blocks } else { Chase::Header };
            ctx.notify(chase, EventValue::Height(branch.branch_point));
        }
        if new_top < top {
            ctx.notify(Chase::Regressed, EventValue::Height(branch.branch_point));
        }
        if milestone_changed {
            let bypass = self.bypass_height(ctx);
            ctx.notify(Chase::Bypass, EventValue::Height(bypass));
        }

        info!(
            target: "node::organize",
            height = new_top,
            branch_point = branch.branch_point,
            "candidate organized"
        );
        self.metrics.candidate_height.set(new_top as f64);
        self.state = Some(state);
        Ok(())
    }

    fn update_milestone<S, N>(
        &mut self,
        ctx: &Ctx<'_, S, N>,
        hash: &BlockHash,
        height: BlockNumber,
    ) -> bool {
        if ctx.spec.is_milestone(hash, height) {
            info!(target: "node::organize", height, "milestone certified");
            self.active_milestone = height;
            return true;
        }
        false
    }

    fn log_transitions(&self, previous: &ChainState, next: &ChainState, scope: &str) {
        if previous.flags() != next.flags() {
            info!(
                target: "node::organize",
                from = format_args!("{:#06x}", previous.flags()),
                to = format_args!("{:#06x}", next.flags()),
                height = next.height(),
                scope,
                "fork flags changed"
            );
        }
        if previous.minimum_block_version() != next.minimum_block_version() {
            info!(
                target: "node::organize",
                from = previous.minimum_block_version(),
                to = next.minimum_block_version(),
                height = next.height(),
                scope,
                "minimum block version changed"
            );
        }
    }
}

/// Store contradictions surface as organize errors; the supervisor faults
/// the node when it sees one.
fn integrity(reason: &'static str) -> OrganizeError {
    OrganizeError::Store(StoreError::Integrity(reason))
}

/// Shared header rule validation for both modes.
pub(crate) fn validate_header<S, N: Network>(
    header: &SealedHeader,
    parent: &ChainState,
    state: &ChainState,
    ctx: &Ctx<'_, S, N>,
) -> Result<(), HeaderError> {
    let expected = parent.work_required(ctx.spec);
    if header.bits != expected {
        return Err(HeaderError::IncorrectTarget { got: header.bits, expected });
    }
    if !header.is_valid_proof_of_work() {
        return Err(HeaderError::InvalidProofOfWork);
    }
    let median_time_past = parent.next_median_time_past();
    if header.timestamp <= median_time_past {
        return Err(HeaderError::TimestampTooOld { timestamp: header.timestamp, median_time_past });
    }
    let limit = ctx.clock.unix_now() + u64::from(ctx.spec.timestamp_limit_seconds);
    if u64::from(header.timestamp) > limit {
        return Err(HeaderError::FuturisticTimestamp {
            timestamp: header.timestamp,
            limit: limit.min(u64::from(u32::MAX)) as u32,
        });
    }
    if header.version < state.minimum_block_version() {
        return Err(HeaderError::InvalidVersion {
            version: header.version,
            minimum: state.minimum_block_version(),
        });
    }
    Ok(())
}

/// Headers-first: organize headers, bodies follow by download.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HeadersFirst;

impl OrganizeMode for HeadersFirst {
    type Input = SealedHeader;

    const BLOCK_MODE: bool = false;

    fn header(input: &Self::Input) -> &SealedHeader {
        input
    }

    fn read<S: Store>(store: &S, link: Link) -> StoreResult<Self::Input> {
        store.get_header(link)
    }

    fn archive<S: Store>(store: &S, input: &Self::Input, context: Context) -> StoreResult<Link> {
        store.set_header_link(input, context)
    }

    fn validate<S: Store, N: Network>(
        input: &Self::Input,
        parent: &ChainState,
        state: &ChainState,
        _tree: &HashMap<BlockHash, TreeEntry<Self::Input>>,
        _bypass_height: BlockNumber,
        ctx: &Ctx<'_, S, N>,
    ) -> Result<(), OrganizeError> {
        validate_header(input, parent, state, ctx).map_err(OrganizeError::from)
    }

    fn is_storable<S: Store, N: Network>(
        input: &Self::Input,
        state: &ChainState,
        bypass_height: BlockNumber,
        ctx: &Ctx<'_, S, N>,
    ) -> bool {
        // Certified by checkpoint or milestone, or near the wall clock.
        state.height() <= bypass_height ||
            ctx.spec.is_milestone(&input.hash(), state.height()) ||
            ctx.is_current(input.timestamp)
    }
}

/// Blocks-first: organize whole blocks, validating bodies inline.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BlocksFirst;

impl BlocksFirst {
    /// Populates prevouts from the weak-branch tree.
    ///
    /// The scan is linear in the tree size; weak branches are short in all
    /// typical operation.
    fn populate_from_tree(
        block: &mut SealedBlock,
        tree: &HashMap<BlockHash, TreeEntry<SealedBlock>>,
    ) {
        for tx in block.transactions.iter_mut().skip(1) {
            for input in &mut tx.inputs {
                if input.prevout.is_some() {
                    continue;
                }
                let point = input.previous_output;
                for entry in tree.values() {
                    if let Some(funding) = entry
                        .input
                        .transactions
                        .iter()
                        .find(|candidate| candidate.txid() == point.txid)
                    {
                        input.prevout = funding.outputs.get(point.index as usize).cloned();
                        break;
                    }
                }
            }
        }
    }
}

impl OrganizeMode for BlocksFirst {
    type Input = SealedBlock;

    const BLOCK_MODE: bool = true;

    fn header(input: &Self::Input) -> &SealedHeader {
        &input.header
    }

    fn read<S: Store>(store: &S, link: Link) -> StoreResult<Self::Input> {
        match store.get_block(link)? {
            Some(block) => Ok(block),
            // A disassociated candidate keeps its header identity.
            None => Ok(SealedBlock { header: store.get_header(link)?, transactions: vec![] }),
        }
    }

    fn archive<S: Store>(store: &S, input: &Self::Input, context: Context) -> StoreResult<Link> {
        store.set_link(input, context)
    }

    fn validate<S: Store, N: Network>(
        input: &Self::Input,
        parent: &ChainState,
        state: &ChainState,
        tree: &HashMap<BlockHash, TreeEntry<Self::Input>>,
        bypass_height: BlockNumber,
        ctx: &Ctx<'_, S, N>,
    ) -> Result<(), OrganizeError> {
        validate_header(&input.header, parent, state, ctx)?;

        // Body validation is bypassed at or under checkpoint/milestone.
        if state.height() <= bypass_height {
            return Ok(());
        }

        let context = state.context();
        input.check()?;
        input.check_with_context(&context)?;

        let mut block = input.clone();
        block.populate();
        Self::populate_from_tree(&mut block, tree);
        if !ctx.store.populate(&mut block.transactions) {
            return Err(OrganizeError::ProtocolViolation);
        }
        block.accept(
            &context,
            ctx.spec.subsidy_interval_blocks,
            ctx.spec.initial_subsidy_sat,
        )?;
        block.connect(&context)?;
        Ok(())
    }

    fn is_storable<S: Store, N: Network>(
        _input: &Self::Input,
        _state: &ChainState,
        _bypass_height: BlockNumber,
        _ctx: &Ctx<'_, S, N>,
    ) -> bool {
        // Blocks accumulate from genesis; currency gating would demand an
        // unbounded tree.
        true
    }
}
