//! Build coordination across cooperating processes.
//!
//! A shared artifact is built by one leader while every other participant
//! waits on a barrier. The barrier has no timeout: a leader that never arrives
//! stalls all followers.

use std::sync::{Arc, Condvar, Mutex};

use crate::errors::SpanPackError;

/// Capability to elect a single builder and synchronize participants.
pub trait Coordinator: Send + Sync {
    /// True for the one participant that builds shared artifacts.
    fn is_leader(&self) -> bool;
    /// Number of participants expected at every barrier.
    fn world_size(&self) -> usize;
    /// Block until every participant arrives; returns how many checked in.
    fn barrier(&self) -> Result<usize, SpanPackError>;
}

/// Coordinator for a single process that is always the leader.
#[derive(Clone, Copy, Debug, Default)]
pub struct SingleProcess;

impl Coordinator for SingleProcess {
    fn is_leader(&self) -> bool {
        true
    }

    fn world_size(&self) -> usize {
        1
    }

    fn barrier(&self) -> Result<usize, SpanPackError> {
        Ok(1)
    }
}

#[derive(Debug, Default)]
struct BarrierState {
    arrived: usize,
    generation: u64,
    last_count: usize,
}

#[derive(Debug)]
struct GroupShared {
    size: usize,
    state: Mutex<BarrierState>,
    released: Condvar,
}

/// One participant of an in-process coordination group.
///
/// Members are created together by [`ThreadGroup::new`]; rank 0 leads. Each
/// member is typically moved onto its own thread.
#[derive(Clone, Debug)]
pub struct ThreadGroup {
    rank: usize,
    shared: Arc<GroupShared>,
}

impl ThreadGroup {
    /// Create `size` members sharing one barrier.
    pub fn new(size: usize) -> Result<Vec<Self>, SpanPackError> {
        if size == 0 {
            return Err(SpanPackError::Configuration(
                "coordination group needs at least one participant".into(),
            ));
        }
        let shared = Arc::new(GroupShared {
            size,
            state: Mutex::new(BarrierState::default()),
            released: Condvar::new(),
        });
        Ok((0..size)
            .map(|rank| Self {
                rank,
                shared: Arc::clone(&shared),
            })
            .collect())
    }

    /// Position of this member within the group.
    pub fn rank(&self) -> usize {
        self.rank
    }
}

impl Coordinator for ThreadGroup {
    fn is_leader(&self) -> bool {
        self.rank == 0
    }

    fn world_size(&self) -> usize {
        self.shared.size
    }

    fn barrier(&self) -> Result<usize, SpanPackError> {
        let poisoned = |_| SpanPackError::Coordination("barrier lock poisoned".into());
        let mut state = self.shared.state.lock().map_err(poisoned)?;
        let generation = state.generation;
        state.arrived += 1;
        if state.arrived == self.shared.size {
            state.last_count = state.arrived;
            state.arrived = 0;
            state.generation += 1;
            self.shared.released.notify_all();
            return Ok(state.last_count);
        }
        while state.generation == generation {
            state = self.shared.released.wait(state).map_err(poisoned)?;
        }
        Ok(state.last_count)
    }
}

/// Wait on the barrier and require every participant to have arrived.
pub fn synchronize(coordinator: &dyn Coordinator) -> Result<(), SpanPackError> {
    let arrived = coordinator.barrier()?;
    let expected = coordinator.world_size();
    if arrived != expected {
        return Err(SpanPackError::Coordination(format!(
            "barrier counted {arrived} participants, expected {expected}"
        )));
    }
    Ok(())
}
