//! A reusable cyclic barrier: `n` threads call [`Barrier::wait`], none
//! return until all `n` have arrived, and the barrier resets for its next
//! use (the generation-counting trick avoids the classic bug where a fast
//! thread laps the barrier before slow stragglers have left the previous
//! round).
use super::condvar::ConditionVariable;
use super::lock::Lock;
use crate::thread::scheduler::Scheduler;
use std::sync::Arc;

struct State {
    count: usize,
    generation: u64,
}

pub struct Barrier {
    parties: usize,
    lock: Lock,
    cv: ConditionVariable,
    state: std::cell::UnsafeCell<State>,
}

unsafe impl Sync for Barrier {}
unsafe impl Send for Barrier {}

impl Barrier {
    pub fn new(scheduler: Arc<Scheduler>, parties: usize) -> Self {
        assert!(parties > 0, "barrier must have at least one party");
        Self {
            parties,
            lock: Lock::new(scheduler.clone()),
            cv: ConditionVariable::new(scheduler),
            state: std::cell::UnsafeCell::new(State {
                count: 0,
                generation: 0,
            }),
        }
    }

    /// Block until `parties` threads have called `wait` in the same
    /// generation. Returns `true` to exactly one caller per generation,
    /// the thread that observed the last arrival (mirroring
    /// `std::sync::Barrier::wait`'s `is_leader`).
    pub fn wait(&self) -> bool {
        self.lock.acquire();
        let my_generation = unsafe { (*self.state.get()).generation };
        unsafe { (*self.state.get()).count += 1 };
        let is_leader = unsafe { (*self.state.get()).count == self.parties };
        if is_leader {
            unsafe {
                let s = &mut *self.state.get();
                s.count = 0;
                s.generation += 1;
            }
            self.cv.broadcast(&self.lock);
        } else {
            while unsafe { (*self.state.get()).generation } == my_generation {
                self.cv.wait(&self.lock);
            }
        }
        self.lock.release();
        is_leader
    }
}
