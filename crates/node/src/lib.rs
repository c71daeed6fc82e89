//! Chain organizer core of the rbtc node.
//!
//! A set of cooperating event-driven state machines (the chasers) share one
//! strand: the organizers place candidate headers and blocks by cumulative
//! work, the check chaser downloads bodies, the validate chaser runs
//! contextual validation, the confirm chaser advances the confirmed chain
//! and rolls it back on failure, and the snapshot chaser handles disk-full
//! recovery. The [`FullNode`] supervisor owns the strand and wires the
//! chasers to the store and the network.

mod block_memory;
mod chasers;
mod clock;
mod error;
mod events;
mod full_node;
mod metrics;

pub use block_memory::{BlockArena, BlockMemory, Retainer};
pub use chasers::check::DownloadMap;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ArenaError, NodeError, OrganizeError};
pub use events::{Chase, ChaseEvent, EventBus, EventValue, SubscriberKey};
pub use full_node::FullNode;
