//! A mutual-exclusion lock with an owner, built on [`Semaphore`] exactly as
//! the original `Lock` is built on `Semaphore`.
use super::semaphore::Semaphore;
use crate::thread::{scheduler::Scheduler, Current};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const NO_HOLDER: u64 = 0;

/// A lock that tracks its holder so [`Lock::is_held_by_current_thread`] can
/// assert ownership the way `Condition::Wait`/`Signal` require.
pub struct Lock {
    sem: Semaphore,
    holder: AtomicU64,
}

impl Lock {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self {
            sem: Semaphore::new(scheduler, 1),
            holder: AtomicU64::new(NO_HOLDER),
        }
    }

    pub fn acquire(&self) {
        self.sem.down();
        self.holder.store(Current::tid(), Ordering::SeqCst);
    }

    pub fn release(&self) {
        assert!(
            self.is_held_by_current_thread(),
            "Lock::release called by non-holder (fatal kernel invariant violated)"
        );
        self.holder.store(NO_HOLDER, Ordering::SeqCst);
        self.sem.up();
    }

    pub fn is_held_by_current_thread(&self) -> bool {
        self.holder.load(Ordering::SeqCst) == Current::tid()
    }
}

/// An RAII guard releasing a [`Lock`] on drop.
pub struct LockGuard<'a> {
    lock: &'a Lock,
}

impl Lock {
    pub fn lock(&self) -> LockGuard<'_> {
        self.acquire();
        LockGuard { lock: self }
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}
