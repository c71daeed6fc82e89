use crate::error::ArenaError;
use parking_lot::{Mutex, RwLock};
use std::{collections::HashMap, sync::Arc, thread::ThreadId};
use tracing::debug;

/// Per-worker block arenas with retainer-gated reclamation.
///
/// Each worker thread is assigned its own arena on first request, so
/// allocation never contends across workers. Deserialized blocks hold a
/// [`Retainer`] while in use; resetting an arena waits for every
/// outstanding retainer to drop.
#[derive(Debug)]
pub struct BlockMemory {
    arenas: Vec<BlockArena>,
    assignments: Mutex<HashMap<ThreadId, usize>>,
}

impl BlockMemory {
    /// Creates `workers` arenas of `bytes` each.
    pub fn new(bytes: usize, workers: usize) -> Self {
        Self {
            arenas: (0..workers).map(|_| BlockArena::new(bytes)).collect(),
            assignments: Mutex::new(HashMap::with_capacity(workers)),
        }
    }

    /// The arena assigned to the calling thread.
    ///
    /// Fails when more distinct threads request arenas than were configured.
    pub fn get_arena(&self) -> Result<&BlockArena, ArenaError> {
        let mut assignments = self.assignments.lock();
        let next = assignments.len();
        let index = *assignments.entry(std::thread::current().id()).or_insert(next);
        self.arenas.get(index).ok_or(ArenaError::WorkerExhausted { workers: self.arenas.len() })
    }

    /// A retainer over the calling thread's arena.
    pub fn get_retainer(&self) -> Result<Retainer, ArenaError> {
        Ok(self.get_arena()?.retainer())
    }

    /// Resets every arena, waiting out all retainers.
    pub fn reset_all(&self) {
        for arena in &self.arenas {
            arena.reset();
        }
    }
}

/// A bump arena for transient block memory.
///
/// `allocate` reserves from a fixed budget and hands out an owned buffer;
/// freeing individual buffers is a no-op, reclamation is the bulk
/// [`BlockArena::reset`] behind the retainer gate.
#[derive(Debug)]
pub struct BlockArena {
    gate: Arc<RwLock<()>>,
    bump: Mutex<Bump>,
}

#[derive(Debug)]
struct Bump {
    capacity: usize,
    offset: usize,
}

impl BlockArena {
    fn new(capacity: usize) -> Self {
        Self {
            gate: Arc::new(RwLock::new(())),
            bump: Mutex::new(Bump { capacity, offset: 0 }),
        }
    }

    /// Reserves `bytes` aligned to `align`, returning a buffer of that size.
    pub fn allocate(&self, bytes: usize, align: usize) -> Result<Vec<u8>, ArenaError> {
        let align = align.max(1);
        let mut bump = self.bump.lock();
        let aligned = bump.offset.next_multiple_of(align);
        let end = aligned.saturating_add(bytes);
        if end > bump.capacity {
            return Err(ArenaError::AllocationExhausted {
                requested: bytes,
                remaining: bump.capacity.saturating_sub(bump.offset),
            });
        }
        bump.offset = end;
        Ok(Vec::with_capacity(bytes))
    }

    /// Releasing an individual allocation is a no-op by design of the bump
    /// arena; only [`BlockArena::reset`] reclaims.
    pub fn deallocate(&self, _buffer: Vec<u8>) {}

    /// A shared handle keeping the arena contents alive.
    pub fn retainer(&self) -> Retainer {
        Retainer { _guard: RwLock::read_arc(&self.gate) }
    }

    /// Reclaims the whole arena.
    ///
    /// Blocks until every outstanding retainer has dropped.
    pub fn reset(&self) {
        let _exclusive = self.gate.write();
        let mut bump = self.bump.lock();
        if bump.offset != 0 {
            debug!(target: "node::memory", reclaimed = bump.offset, "arena reset");
        }
        bump.offset = 0;
    }

    /// Bytes currently reserved.
    pub fn used(&self) -> usize {
        self.bump.lock().offset
    }

    /// Total arena budget.
    pub fn capacity(&self) -> usize {
        self.bump.lock().capacity
    }
}

/// Scoped shared handle blocking arena reclamation while alive.
#[derive(Debug)]
pub struct Retainer {
    _guard: parking_lot::ArcRwLockReadGuard<parking_lot::RawRwLock, ()>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn allocation_draws_down_the_budget() {
        let memory = BlockMemory::new(100, 1);
        let arena = memory.get_arena().unwrap();

        let buffer = arena.allocate(60, 8).unwrap();
        assert_eq!(buffer.capacity(), 60);
        assert_eq!(arena.used(), 60);

        assert_matches::assert_matches!(
            arena.allocate(60, 8),
            Err(ArenaError::AllocationExhausted { requested: 60, remaining: 40 })
        );

        arena.reset();
        assert_eq!(arena.used(), 0);
        arena.allocate(100, 1).unwrap();
    }

    #[test]
    fn alignment_pads_the_offset() {
        let memory = BlockMemory::new(64, 1);
        let arena = memory.get_arena().unwrap();
        arena.allocate(3, 1).unwrap();
        arena.allocate(8, 8).unwrap();
        assert_eq!(arena.used(), 16);
    }

    #[test]
    fn deallocate_is_a_no_op() {
        let memory = BlockMemory::new(16, 1);
        let arena = memory.get_arena().unwrap();
        let buffer = arena.allocate(16, 1).unwrap();
        arena.deallocate(buffer);
        assert_eq!(arena.used(), 16);
    }

    #[test]
    fn threads_get_distinct_arenas_until_exhausted() {
        let memory = Arc::new(BlockMemory::new(16, 2));
        memory.get_arena().unwrap();

        let second = Arc::clone(&memory);
        std::thread::spawn(move || second.get_arena().map(|_| ()))
            .join()
            .unwrap()
            .unwrap();

        let third = Arc::clone(&memory);
        let result = std::thread::spawn(move || third.get_arena().map(|_| ())).join().unwrap();
        assert_matches::assert_matches!(result, Err(ArenaError::WorkerExhausted { workers: 2 }));
    }

    #[test]
    fn retainer_blocks_reset_until_dropped() {
        let memory = Arc::new(BlockMemory::new(16, 1));
        let retainer = memory.get_retainer().unwrap();

        let resetter = Arc::clone(&memory);
        let handle = std::thread::spawn(move || {
            resetter.arenas[0].reset();
        });

        // The reset must still be parked behind the retainer.
        std::thread::sleep(Duration::from_millis(50));
        assert!(!handle.is_finished());

        drop(retainer);
        handle.join().unwrap();
    }
}
