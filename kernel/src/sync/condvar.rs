//! A Mesa-semantics condition variable, matching `Condition::Wait` /
//! `Signal` / `Broadcast`: waking a thread only moves it to the ready
//! queue, it does not hand it the associated lock or guarantee the
//! predicate still holds, so callers must always re-check their predicate
//! in a loop after `wait` returns.
use super::lock::Lock;
use crate::thread::{self, scheduler::Scheduler, Current, ThreadControl};
use machine::InterruptGuard;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub struct ConditionVariable {
    waiters: Mutex<VecDeque<Arc<ThreadControl>>>,
    scheduler: Arc<Scheduler>,
}

impl ConditionVariable {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self {
            waiters: Mutex::new(VecDeque::new()),
            scheduler,
        }
    }

    /// Release `lock`, block until signaled, then reacquire `lock`.
    ///
    /// `lock` must be held by the calling thread. Mesa semantics mean the
    /// condition this wait was guarding may no longer hold by the time
    /// control returns: callers must loop `while !predicate { cv.wait(&lock) }`.
    pub fn wait(&self, lock: &Lock) {
        let _guard = InterruptGuard::new();
        assert!(
            lock.is_held_by_current_thread(),
            "ConditionVariable::wait called without holding the lock"
        );
        let me = Current::control();
        self.waiters.lock().unwrap().push_back(me.clone());
        lock.release();
        thread::block_self(&self.scheduler, &me);
        lock.acquire();
    }

    /// Wake the longest-waiting thread, if any. `lock` must be held.
    pub fn signal(&self, lock: &Lock) {
        let _guard = InterruptGuard::new();
        assert!(
            lock.is_held_by_current_thread(),
            "ConditionVariable::signal called without holding the lock"
        );
        if let Some(t) = self.waiters.lock().unwrap().pop_front() {
            thread::wake(&self.scheduler, t);
        }
    }

    /// Wake every waiting thread. `lock` must be held.
    pub fn broadcast(&self, lock: &Lock) {
        let _guard = InterruptGuard::new();
        assert!(
            lock.is_held_by_current_thread(),
            "ConditionVariable::broadcast called without holding the lock"
        );
        let waiters = std::mem::take(&mut *self.waiters.lock().unwrap());
        for t in waiters {
            thread::wake(&self.scheduler, t);
        }
    }
}
