//! The master/slave rendezvous primitive (spec.md §4.4).
//!
//! A single process-wide condition variable. The master loop player ticks it
//! once per iteration; slave players block on it when sync is active. "Sync
//! active" means a tick has happened since the last time the master was
//! cleaned.

use std::sync::{Condvar, Mutex};
use std::time::Instant;

struct SyncState {
    last_tick: Option<Instant>,
    generation: u64,
}

pub struct SyncBarrier {
    state: Mutex<SyncState>,
    condvar: Condvar,
}

impl Default for SyncBarrier {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncBarrier {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SyncState {
                last_tick: None,
                generation: 0,
            }),
            condvar: Condvar::new(),
        }
    }

    /// `last_loop_sync != None`.
    pub fn is_active(&self) -> bool {
        self.state.lock().unwrap().last_tick.is_some()
    }

    pub fn last_tick(&self) -> Option<Instant> {
        self.state.lock().unwrap().last_tick
    }

    /// Called by the master's loop player once per iteration: publishes a
    /// new boundary timestamp and wakes every waiting slave.
    pub fn master_tick(&self) -> Instant {
        let mut state = self.state.lock().unwrap();
        let now = crate::clock::now();
        state.last_tick = Some(now);
        state.generation = state.generation.wrapping_add(1);
        self.condvar.notify_all();
        now
    }

    /// Block until the next `master_tick()`, unless sync is already
    /// inactive, in which case this returns immediately (free-running).
    pub fn wait_for_tick(&self) {
        let state = self.state.lock().unwrap();
        if state.last_tick.is_none() {
            return;
        }
        let start_generation = state.generation;
        let _state = self
            .condvar
            .wait_while(state, |s| {
                s.generation == start_generation && s.last_tick.is_some()
            })
            .unwrap();
    }

    /// Deactivate sync (the master slot was cleaned): any slave currently
    /// blocked in `wait_for_tick` wakes up and free-runs instead of waiting
    /// forever.
    pub fn deactivate(&self) {
        let mut state = self.state.lock().unwrap();
        state.last_tick = None;
        state.generation = state.generation.wrapping_add(1);
        self.condvar.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn inactive_sync_does_not_block() {
        let barrier = SyncBarrier::new();
        barrier.wait_for_tick(); // must return immediately
    }

    #[test]
    fn slave_wakes_on_master_tick() {
        let barrier = Arc::new(SyncBarrier::new());
        barrier.master_tick();
        let slave_barrier = Arc::clone(&barrier);
        let handle = thread::spawn(move || {
            slave_barrier.wait_for_tick();
        });
        thread::sleep(Duration::from_millis(20));
        barrier.master_tick();
        handle.join().unwrap();
    }

    #[test]
    fn deactivate_wakes_waiting_slave() {
        let barrier = Arc::new(SyncBarrier::new());
        barrier.master_tick();
        let slave_barrier = Arc::clone(&barrier);
        let handle = thread::spawn(move || {
            slave_barrier.wait_for_tick();
        });
        thread::sleep(Duration::from_millis(20));
        barrier.deactivate();
        handle.join().unwrap();
        assert!(!barrier.is_active());
    }
}
