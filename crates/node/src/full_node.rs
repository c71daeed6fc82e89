//! The full node supervisor: strand ownership, chaser wiring, lifecycle.

use crate::{
    block_memory::BlockMemory,
    chasers::{
        check::{CheckChaser, DownloadMap},
        confirm::ConfirmChaser,
        organize::{BlocksFirst, HeadersFirst, Organizer},
        snapshot::SnapshotChaser,
        transaction::TransactionChaser,
        validate::ValidateChaser,
        Ctx,
    },
    clock::{Clock, SystemClock},
    error::{NodeError, OrganizeError},
    events::{Chase, ChaseEvent, EventBus, EventValue, SubscriberKey},
};
use rbtc_chainspec::{ChainSpec, NodeConfig};
use rbtc_network_api::{Network, SuspendReason};
use rbtc_primitives::{BlockNumber, SealedBlock, SealedHeader};
use rbtc_storage_api::{Store, StoreError};
use std::{collections::VecDeque, sync::Arc};
use tokio::sync::{
    mpsc::{self, UnboundedReceiver, UnboundedSender},
    oneshot,
};
use tracing::{debug, info};

/// Messages posted onto the node strand.
enum NodeMessage {
    OrganizeHeader(SealedHeader, oneshot::Sender<Result<BlockNumber, OrganizeError>>),
    OrganizeBlock(SealedBlock, oneshot::Sender<Result<BlockNumber, OrganizeError>>),
    PutBlock(SealedBlock, oneshot::Sender<Result<BlockNumber, OrganizeError>>),
    GetHashes(usize, oneshot::Sender<DownloadMap>),
    PutHashes(DownloadMap, oneshot::Sender<()>),
    Subscribe(oneshot::Sender<(SubscriberKey, UnboundedReceiver<ChaseEvent>)>),
    Unsubscribe(SubscriberKey),
    Snapshot(oneshot::Sender<Result<(), NodeError>>),
    Run(oneshot::Sender<()>),
    Close,
}

/// Builds a strand context over the inner node's fields.
///
/// A macro so the borrows stay field-disjoint at every call site.
macro_rules! ctx {
    ($inner:ident) => {
        Ctx {
            store: $inner.store.as_ref(),
            spec: &$inner.spec,
            config: &$inner.config,
            network: &$inner.network,
            clock: $inner.clock.as_ref(),
            memory: &$inner.memory,
            events: &mut $inner.queue,
            fault: &mut $inner.fault,
        }
    };
}

/// The organizer variant selected by `node.headers_first`.
enum AnyOrganizer {
    Headers(Organizer<HeadersFirst>),
    Blocks(Organizer<BlocksFirst>),
}

/// Everything owned by the strand task.
struct NodeInner<S, N> {
    store: Arc<S>,
    spec: Arc<ChainSpec>,
    config: NodeConfig,
    network: N,
    clock: Arc<dyn Clock>,
    memory: BlockMemory,
    queue: VecDeque<ChaseEvent>,
    fault: Option<StoreError>,
    bus: EventBus,
    organizer: AnyOrganizer,
    check: CheckChaser,
    validate: ValidateChaser,
    confirm: ConfirmChaser,
    transaction: TransactionChaser,
    snapshot: SnapshotChaser,
}

impl<S: Store, N: Network> NodeInner<S, N> {
    /// Initializes the chasers in start order.
    fn start(&mut self) -> Result<(), StoreError> {
        let mut ctx = ctx!(self);
        match &mut self.organizer {
            AnyOrganizer::Headers(organizer) => organizer.start(&mut ctx)?,
            AnyOrganizer::Blocks(organizer) => organizer.start(&mut ctx)?,
        }
        // The check, validate, confirm, transaction and snapshot chasers
        // initialize from the Start event on the strand.
        drop(ctx);
        self.drain_events();
        Ok(())
    }

    /// Delivers every queued event to each chaser, in subscription order,
    /// then to external subscribers.
    fn drain_events(&mut self) {
        while let Some(event) = self.queue.pop_front() {
            {
                let mut ctx = ctx!(self);
                match &mut self.organizer {
                    AnyOrganizer::Headers(organizer) => organizer.handle_event(&mut ctx, &event),
                    AnyOrganizer::Blocks(organizer) => organizer.handle_event(&mut ctx, &event),
                }
                self.check.handle_event(&mut ctx, &event);
                self.validate.handle_event(&mut ctx, &event);
                self.confirm.handle_event(&mut ctx, &event);
                self.transaction.handle_event(&mut ctx, &event);
                self.snapshot.handle_event(&mut ctx, &event);
            }
            self.bus.notify(event);
        }
    }

    /// Handles one strand message; false ends the strand.
    ///
    /// Replies are sent after the event queue drains, so a caller that
    /// awaited an operation observes every event it caused.
    fn handle_message(&mut self, message: NodeMessage) -> bool {
        match message {
            NodeMessage::OrganizeHeader(header, reply) => {
                let result = self.organize_header(header);
                self.drain_events();
                let _ = reply.send(result);
            }
            NodeMessage::OrganizeBlock(block, reply) => {
                let result = self.organize_block(block);
                self.drain_events();
                let _ = reply.send(result);
            }
            NodeMessage::PutBlock(block, reply) => {
                let result = self.put_block(block);
                self.drain_events();
                let _ = reply.send(result);
            }
            NodeMessage::GetHashes(max, reply) => {
                let _ = reply.send(self.check.get_hashes(max));
            }
            NodeMessage::PutHashes(map, reply) => {
                self.check.put_hashes(map);
                let _ = reply.send(());
            }
            NodeMessage::Subscribe(reply) => {
                let _ = reply.send(self.bus.subscribe());
            }
            NodeMessage::Unsubscribe(key) => {
                self.bus.notify_one(key, ChaseEvent::new(Chase::Stop, EventValue::None));
                self.bus.unsubscribe(key);
            }
            NodeMessage::Snapshot(reply) => {
                let result = self.do_snapshot();
                self.drain_events();
                let _ = reply.send(result);
            }
            NodeMessage::Run(reply) => {
                // Bump sequential chasers to their starting heights; this
                // kicks off lagging validations even if not current.
                self.queue.push_back(ChaseEvent::new(Chase::Start, EventValue::None));
                self.drain_events();
                let _ = reply.send(());
            }
            NodeMessage::Close => return false,
        }
        true
    }

    fn guard(&self) -> Result<(), OrganizeError> {
        match &self.fault {
            Some(fault) => Err(OrganizeError::Store(fault.clone())),
            None => Ok(()),
        }
    }

    fn organize_header(&mut self, header: SealedHeader) -> Result<BlockNumber, OrganizeError> {
        self.guard()?;
        let mut ctx = ctx!(self);
        let result = match &mut self.organizer {
            AnyOrganizer::Headers(organizer) => organizer.organize(&mut ctx, header),
            // A blocks-first node has no use for bare headers.
            AnyOrganizer::Blocks(_) => Err(OrganizeError::ProtocolViolation),
        };
        self.fault_on_fatal(&result);
        result
    }

    fn organize_block(&mut self, block: SealedBlock) -> Result<BlockNumber, OrganizeError> {
        self.guard()?;
        let mut ctx = ctx!(self);
        let result = match &mut self.organizer {
            AnyOrganizer::Blocks(organizer) => organizer.organize(&mut ctx, block),
            // Headers-first receives bodies through the check chaser.
            AnyOrganizer::Headers(_) => self.check.put_block(&mut ctx, block),
        };
        self.fault_on_fatal(&result);
        result
    }

    fn put_block(&mut self, block: SealedBlock) -> Result<BlockNumber, OrganizeError> {
        self.guard()?;
        let mut ctx = ctx!(self);
        let result = self.check.put_block(&mut ctx, block);
        self.fault_on_fatal(&result);
        result
    }

    /// On-demand snapshot: suspend, compact, resume when space came back.
    fn do_snapshot(&mut self) -> Result<(), NodeError> {
        if let Some(fault) = &self.fault {
            return Err(NodeError::Fault(fault.clone()));
        }
        if self.store.is_fault() {
            return Err(NodeError::Fault(
                self.store.get_code().unwrap_or(StoreError::Integrity("store fault")),
            ));
        }

        let running = !self.store.is_full();
        self.network.suspend(SuspendReason::Snapshot);
        let result = self.store.snapshot(&mut |event| {
            debug!(target: "node", ?event, "snapshot progress");
        });
        // The store could have filled before the snapshot started and the
        // snapshot can still succeed; only resume into a store with room.
        if running && !self.store.is_full() {
            self.network.resume();
        }
        result.map_err(NodeError::Snapshot)
    }

    /// Promotes fatal store errors surfaced by an organize call to a fault.
    fn fault_on_fatal(&mut self, result: &Result<BlockNumber, OrganizeError>) {
        if let Err(OrganizeError::Store(error)) = result {
            if error.is_fatal() && self.fault.is_none() {
                let mut ctx = ctx!(self);
                let error = error.clone();
                ctx.fault(error);
            }
        }
    }

    /// Reverse-order teardown once the strand ends.
    fn shutdown(&mut self) {
        self.drain_events();
        self.bus.stop();
        self.network.stop();
        info!(target: "node", "node closed");
    }
}

/// The full node: owns the strand, the event bus, the chasers and the
/// network attachment.
///
/// All chain transitions run on the strand; this type is the handle the
/// embedder and the peer protocols drive.
pub struct FullNode<S, N> {
    store: Arc<S>,
    spec: Arc<ChainSpec>,
    config: NodeConfig,
    network: N,
    clock: Arc<dyn Clock>,
    to_strand: Option<UnboundedSender<NodeMessage>>,
    strand: Option<tokio::task::JoinHandle<()>>,
}

impl<S, N> FullNode<S, N>
where
    S: Store + 'static,
    N: Network + Clone + 'static,
{
    /// Assembles a node over its collaborators.
    pub fn new(store: Arc<S>, network: N, spec: ChainSpec, config: NodeConfig) -> Self {
        Self::with_clock(store, network, spec, config, Arc::new(SystemClock))
    }

    /// Assembles a node with an explicit clock.
    pub fn with_clock(
        store: Arc<S>,
        network: N,
        spec: ChainSpec,
        config: NodeConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            spec: Arc::new(spec),
            config,
            network,
            clock,
            to_strand: None,
            strand: None,
        }
    }

    /// Initializes the chasers and spawns the strand.
    pub fn start(&mut self) -> Result<(), NodeError> {
        if !self.store.is_initialized() {
            return Err(NodeError::StoreUninitialized);
        }

        let organizer = if self.config.headers_first {
            AnyOrganizer::Headers(Organizer::default())
        } else {
            AnyOrganizer::Blocks(Organizer::default())
        };
        let mut inner = NodeInner {
            store: self.store.clone(),
            spec: self.spec.clone(),
            config: self.config.clone(),
            network: self.network.clone(),
            clock: self.clock.clone(),
            memory: BlockMemory::new(self.config.arena_bytes, self.config.arena_workers),
            queue: VecDeque::new(),
            fault: None,
            bus: EventBus::new(),
            organizer,
            check: CheckChaser::default(),
            validate: ValidateChaser::default(),
            confirm: ConfirmChaser::default(),
            transaction: TransactionChaser::default(),
            snapshot: SnapshotChaser::default(),
        };
        inner.start().map_err(NodeError::Fault)?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        self.to_strand = Some(tx);
        self.strand = Some(tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if !inner.handle_message(message) {
                    break;
                }
            }
            inner.shutdown();
        }));
        info!(target: "node", chain = %self.spec.name, "node started");
        Ok(())
    }

    /// Kicks the chasers off from their stored heights.
    pub async fn run(&self) -> Result<(), NodeError> {
        let (tx, rx) = oneshot::channel();
        self.post(NodeMessage::Run(tx))?;
        rx.await.map_err(|_| NodeError::ServiceStopped)
    }

    /// Stops the strand and blocks until teardown completes.
    pub async fn close(mut self) -> Result<(), NodeError> {
        if let Some(to_strand) = self.to_strand.take() {
            let _ = to_strand.send(NodeMessage::Close);
        }
        if let Some(strand) = self.strand.take() {
            let _ = strand.await;
        }
        Ok(())
    }

    /// Submits a header to the headers-first organizer.
    pub async fn organize_header(
        &self,
        header: SealedHeader,
    ) -> Result<BlockNumber, OrganizeError> {
        self.request(|tx| NodeMessage::OrganizeHeader(header, tx)).await
    }

    /// Submits a block to the blocks-first organizer (or, headers-first, as
    /// a body arrival).
    pub async fn organize_block(&self, block: SealedBlock) -> Result<BlockNumber, OrganizeError> {
        self.request(|tx| NodeMessage::OrganizeBlock(block, tx)).await
    }

    /// Delivers a downloaded body to the check chaser.
    pub async fn put_block(&self, block: SealedBlock) -> Result<BlockNumber, OrganizeError> {
        self.request(|tx| NodeMessage::PutBlock(block, tx)).await
    }

    /// Draws a batch of body downloads for a peer.
    pub async fn get_hashes(&self, max: usize) -> Result<DownloadMap, NodeError> {
        let (tx, rx) = oneshot::channel();
        self.post(NodeMessage::GetHashes(max, tx))?;
        rx.await.map_err(|_| NodeError::ServiceStopped)
    }

    /// Returns unfetched downloads from a closed peer channel.
    pub async fn put_hashes(&self, map: DownloadMap) -> Result<(), NodeError> {
        let (tx, rx) = oneshot::channel();
        self.post(NodeMessage::PutHashes(map, tx))?;
        rx.await.map_err(|_| NodeError::ServiceStopped)
    }

    /// Subscribes to the chase event bus.
    pub async fn subscribe_events(
        &self,
    ) -> Result<(SubscriberKey, UnboundedReceiver<ChaseEvent>), NodeError> {
        let (tx, rx) = oneshot::channel();
        self.post(NodeMessage::Subscribe(tx))?;
        rx.await.map_err(|_| NodeError::ServiceStopped)
    }

    /// Drops a bus subscription, notifying it of the stop.
    pub fn unsubscribe_events(&self, key: SubscriberKey) {
        let _ = self.post(NodeMessage::Unsubscribe(key));
    }

    /// Takes a store snapshot, suspending ingress for the duration.
    pub async fn snapshot(&self) -> Result<(), NodeError> {
        let (tx, rx) = oneshot::channel();
        self.post(NodeMessage::Snapshot(tx))?;
        rx.await.map_err(|_| NodeError::ServiceStopped)?
    }

    /// Returns true if the candidate tip is within the currency window.
    pub fn is_current(&self) -> bool {
        let Some(window) = self.config.currency_window() else { return true };
        let top = self.store.get_top_candidate();
        let timestamp = self
            .store
            .to_candidate(top)
            .and_then(|link| self.store.get_timestamp(link).ok());
        match timestamp {
            Some(timestamp) => {
                u64::from(timestamp) + window.as_secs() >= self.clock.unix_now()
            }
            None => false,
        }
    }

    /// Returns true if the given timestamp is within the currency window.
    pub fn is_current_timestamp(&self, timestamp: u32) -> bool {
        match self.config.currency_window() {
            None => true,
            Some(window) => u64::from(timestamp) + window.as_secs() >= self.clock.unix_now(),
        }
    }

    /// The shared store handle.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The chain spec the node runs under.
    pub fn spec(&self) -> &ChainSpec {
        &self.spec
    }

    async fn request<F>(&self, build: F) -> Result<BlockNumber, OrganizeError>
    where
        F: FnOnce(oneshot::Sender<Result<BlockNumber, OrganizeError>>) -> NodeMessage,
    {
        let (tx, rx) = oneshot::channel();
        self.post(build(tx)).map_err(|_| OrganizeError::ServiceStopped)?;
        rx.await.map_err(|_| OrganizeError::ServiceStopped)?
    }

    fn post(&self, message: NodeMessage) -> Result<(), NodeError> {
        self.to_strand
            .as_ref()
            .ok_or(NodeError::ServiceStopped)?
            .send(message)
            .map_err(|_| NodeError::ServiceStopped)
    }
}
