//! A counting semaphore built directly on interrupt disabling, the way the
//! original `Semaphore::P`/`Semaphore::V` are: a value, and a wait queue of
//! blocked threads that `V` wakes one of per call.
use crate::thread::{self, scheduler::Scheduler, Current, ThreadControl};
use machine::InterruptGuard;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

struct Inner {
    value: u32,
    waiters: VecDeque<Arc<ThreadControl>>,
}

/// A counting semaphore. `down` blocks while the value is zero; `up`
/// increments it and wakes one waiter.
pub struct Semaphore {
    inner: Mutex<Inner>,
    scheduler: Arc<Scheduler>,
}

impl Semaphore {
    pub fn new(scheduler: Arc<Scheduler>, initial: u32) -> Self {
        Self {
            inner: Mutex::new(Inner {
                value: initial,
                waiters: VecDeque::new(),
            }),
            scheduler,
        }
    }

    /// Wait until the value is positive, then decrement it.
    ///
    /// Loops rather than a single check-then-sleep, because a woken waiter
    /// only gets a chance to run again after other threads may have raced
    /// it to the same decrement.
    pub fn down(&self) {
        let _guard = InterruptGuard::new();
        loop {
            let me = Current::control();
            {
                let mut inner = self.inner.lock().unwrap();
                if inner.value > 0 {
                    inner.value -= 1;
                    return;
                }
                inner.waiters.push_back(me.clone());
            }
            thread::block_self(&self.scheduler, &me);
        }
    }

    /// Increment the value, waking the longest-waiting thread if any.
    pub fn up(&self) {
        let _guard = InterruptGuard::new();
        let mut inner = self.inner.lock().unwrap();
        let woken = inner.waiters.pop_front();
        inner.value += 1;
        drop(inner);
        if let Some(t) = woken {
            thread::wake(&self.scheduler, t);
        }
    }

    /// Current value, for diagnostics and tests only.
    pub fn value(&self) -> u32 {
        self.inner.lock().unwrap().value
    }
}
