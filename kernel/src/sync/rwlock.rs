//! A reader-writer lock, guarding the kernel's shared open-file entries
//! (spec requires concurrent readers, exclusive writers, no starvation
//! beyond what FIFO wakeup on a shared wait queue already avoids).
//!
//! Unlike the teacher's `keos::sync::rwlock::RwLock`, which spins on an
//! atomic state word because it has no scheduler to block through, this
//! one blocks waiters through a [`Lock`] + [`ConditionVariable`] pair:
//! spinning here would hold the run token forever and wedge every other
//! kernel thread.
use super::condvar::ConditionVariable;
use super::lock::Lock;
use crate::thread::scheduler::Scheduler;
use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

struct RwState {
    readers: u32,
    writer: bool,
}

pub struct RwLock<T: Send> {
    lock: Lock,
    available: ConditionVariable,
    state: UnsafeCell<RwState>,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Sync for RwLock<T> {}
unsafe impl<T: Send> Send for RwLock<T> {}

impl<T: Send> RwLock<T> {
    pub fn new(scheduler: Arc<Scheduler>, data: T) -> Self {
        Self {
            lock: Lock::new(scheduler.clone()),
            available: ConditionVariable::new(scheduler),
            state: UnsafeCell::new(RwState {
                readers: 0,
                writer: false,
            }),
            data: UnsafeCell::new(data),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.lock.acquire();
        while unsafe { (*self.state.get()).writer } {
            self.available.wait(&self.lock);
        }
        unsafe { (*self.state.get()).readers += 1 };
        self.lock.release();
        RwLockReadGuard { lock: self }
    }

    pub fn try_read(&self) -> Option<RwLockReadGuard<'_, T>> {
        self.lock.acquire();
        let ok = !unsafe { (*self.state.get()).writer };
        if ok {
            unsafe { (*self.state.get()).readers += 1 };
        }
        self.lock.release();
        ok.then_some(RwLockReadGuard { lock: self })
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.lock.acquire();
        while unsafe {
            let s = &*self.state.get();
            s.writer || s.readers > 0
        } {
            self.available.wait(&self.lock);
        }
        unsafe { (*self.state.get()).writer = true };
        self.lock.release();
        RwLockWriteGuard { lock: self }
    }

    pub fn try_write(&self) -> Option<RwLockWriteGuard<'_, T>> {
        self.lock.acquire();
        let ok = unsafe {
            let s = &*self.state.get();
            !s.writer && s.readers == 0
        };
        if ok {
            unsafe { (*self.state.get()).writer = true };
        }
        self.lock.release();
        ok.then_some(RwLockWriteGuard { lock: self })
    }
}

pub struct RwLockReadGuard<'a, T: Send> {
    lock: &'a RwLock<T>,
}

impl<T: Send> Deref for RwLockReadGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: Send> Drop for RwLockReadGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.lock.acquire();
        let readers = unsafe {
            let s = &mut *self.lock.state.get();
            s.readers -= 1;
            s.readers
        };
        if readers == 0 {
            self.lock.available.broadcast(&self.lock.lock);
        }
        self.lock.lock.release();
    }
}

impl<'a, T: Send> RwLockReadGuard<'a, T> {
    /// Release read access and block until exclusive write access is
    /// granted.
    pub fn upgrade(self) -> RwLockWriteGuard<'a, T> {
        let lock = self.lock;
        drop(self);
        lock.write()
    }
}

pub struct RwLockWriteGuard<'a, T: Send> {
    lock: &'a RwLock<T>,
}

impl<T: Send> Deref for RwLockWriteGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: Send> DerefMut for RwLockWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: Send> Drop for RwLockWriteGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.lock.acquire();
        unsafe { (*self.lock.state.get()).writer = false };
        self.lock.available.broadcast(&self.lock.lock);
        self.lock.lock.release();
    }
}

impl<'a, T: Send> RwLockWriteGuard<'a, T> {
    /// Release write access and reacquire as a shared reader.
    pub fn downgrade(self) -> RwLockReadGuard<'a, T> {
        let lock = self.lock;
        drop(self);
        lock.read()
    }
}
