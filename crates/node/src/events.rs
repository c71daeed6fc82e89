use rbtc_network_api::SuspendReason;
use rbtc_primitives::BlockNumber;
use rbtc_storage_api::Link;
use std::collections::HashMap;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::trace;

/// The chase events the chasers coordinate through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Chase {
    /// The node started; chasers bump to their starting heights.
    Start,
    /// Advance sequential work from the carried height.
    Bump,
    /// New candidate headers above the carried branch point.
    Header,
    /// New candidate blocks above the carried branch point (blocks first).
    Blocks,
    /// A block body was archived at the carried height.
    Checked,
    /// A body failed its structural check; carries the header link.
    Unchecked,
    /// A block validated at the carried height.
    Valid,
    /// A block failed validation; carries the header link.
    Unvalid,
    /// A block entered the confirmed chain at the carried height.
    Confirmable,
    /// A block failed confirmation; carries the header link.
    Unconfirmable,
    /// A stored body proved malleated; carries the header link.
    Malleated,
    /// The candidate chain shrank to the carried branch point.
    Regressed,
    /// Candidates above the carried fork point were set aside.
    Disorganized,
    /// A block left the confirmed chain; carries the header link.
    Reorganized,
    /// A block joined the confirmed chain; carries the header link.
    Organized,
    /// Validation bypass extends to the carried height.
    Bypass,
    /// A store snapshot is requested.
    Snapshot,
    /// The node suspended network ingress.
    Suspend,
    /// The node is stopping.
    Stop,
}

/// Value carried by a chase event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventValue {
    /// No payload.
    None,
    /// A chain height.
    Height(BlockNumber),
    /// An archived header link.
    Link(Link),
    /// A suspension reason.
    Reason(SuspendReason),
}

impl EventValue {
    /// The carried height, if any.
    pub const fn height(&self) -> Option<BlockNumber> {
        match self {
            Self::Height(height) => Some(*height),
            _ => None,
        }
    }

    /// The carried link, if any.
    pub const fn link(&self) -> Option<Link> {
        match self {
            Self::Link(link) => Some(*link),
            _ => None,
        }
    }
}

/// A chase event with its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChaseEvent {
    /// The event kind.
    pub chase: Chase,
    /// The payload.
    pub value: EventValue,
}

impl ChaseEvent {
    /// Assembles an event.
    pub const fn new(chase: Chase, value: EventValue) -> Self {
        Self { chase, value }
    }
}

/// Key identifying one bus subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberKey(u64);

/// Strand-owned broadcast of chase events to external subscribers.
///
/// Each subscriber gets its own unbounded queue, so delivery is FIFO per
/// subscriber in exactly the order the bus observed events. The bus is only
/// ever touched from the strand; it needs no locking of its own.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: HashMap<SubscriberKey, UnboundedSender<ChaseEvent>>,
    next_key: u64,
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber, returning its key and event stream.
    ///
    /// Keys are monotonic; wraparound after 2^64 subscriptions is a
    /// programming error and aborts.
    pub fn subscribe(&mut self) -> (SubscriberKey, UnboundedReceiver<ChaseEvent>) {
        self.next_key = self.next_key.checked_add(1).expect("subscriber key overflow");
        let key = SubscriberKey(self.next_key);
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.insert(key, tx);
        (key, rx)
    }

    /// Removes a subscriber.
    pub fn unsubscribe(&mut self, key: SubscriberKey) {
        self.subscribers.remove(&key);
    }

    /// Broadcasts an event to all subscribers.
    ///
    /// Subscribers whose receiver was dropped are pruned on the way.
    pub fn notify(&mut self, event: ChaseEvent) {
        trace!(target: "node::events", ?event, "notify");
        self.subscribers.retain(|_, tx| tx.send(event).is_ok());
    }

    /// Delivers an event to a single subscriber.
    pub fn notify_one(&mut self, key: SubscriberKey, event: ChaseEvent) {
        if let Some(tx) = self.subscribers.get(&key) {
            if tx.send(event).is_err() {
                self.subscribers.remove(&key);
            }
        }
    }

    /// Notifies all subscribers of shutdown and drops them.
    pub fn stop(&mut self) {
        for (_, tx) in self.subscribers.drain() {
            let _ = tx.send(ChaseEvent::new(Chase::Stop, EventValue::None));
        }
    }

    /// Number of live subscribers.
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Returns true if nobody is subscribed.
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}
